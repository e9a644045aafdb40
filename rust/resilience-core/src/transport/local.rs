// rust/resilience-core/src/transport/local.rs

//! In-process transport for tests and drills.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::time::Duration;

use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use super::{Communicator, Transport};
use crate::config::TransportConfig;
use crate::error::{ResilienceError, Result};

#[derive(Debug)]
struct Envelope {
    src: i32,
    tag: i32,
    comm: Communicator,
    payload: Vec<u8>,
}

impl Envelope {
    fn matches(&self, src: i32, tag: i32, comm: Communicator) -> bool {
        self.src == src && self.tag == tag && self.comm == comm
    }
}

/// Builder for a set of connected [`LocalEndpoint`]s.
#[derive(Debug, Clone, Default)]
pub struct LocalFabric {
    recv_timeout: Option<Duration>,
}

impl LocalFabric {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &TransportConfig) -> Self {
        Self::new().with_recv_timeout(config.recv_timeout())
    }

    /// Fails a blocked receive after `timeout` instead of waiting forever.
    #[must_use]
    pub fn with_recv_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.recv_timeout = timeout;
        self
    }

    /// Creates `size` endpoints; endpoint `i` is rank `i`.
    ///
    /// # Errors
    ///
    /// Returns `Topology` if `size` is zero or does not fit a rank number.
    pub fn connect(&self, size: usize) -> Result<Vec<LocalEndpoint>> {
        let comm_size = i32::try_from(size)
            .ok()
            .filter(|&n| n > 0)
            .ok_or_else(|| {
                ResilienceError::topology(format!("cannot build a fabric of {size} ranks"))
            })?;

        let (senders, receivers): (Vec<Sender<Envelope>>, Vec<Receiver<Envelope>>) =
            (0..size).map(|_| unbounded()).unzip();

        Ok(receivers
            .into_iter()
            .zip(0..comm_size)
            .map(|(inbox, rank)| LocalEndpoint {
                rank,
                comm_size,
                peers: senders.clone(),
                inbox,
                stash: RefCell::new(VecDeque::new()),
                recv_timeout: self.recv_timeout,
            })
            .collect())
    }
}

/// One rank's view of a [`LocalFabric`].
///
/// Messages that arrive for a stream nobody is waiting on yet are stashed
/// in arrival order, so per-stream FIFO holds even when the receiver reads
/// streams in a different order than they were sent.
#[derive(Debug)]
pub struct LocalEndpoint {
    rank: i32,
    comm_size: i32,
    peers: Vec<Sender<Envelope>>,
    inbox: Receiver<Envelope>,
    stash: RefCell<VecDeque<Envelope>>,
    recv_timeout: Option<Duration>,
}

impl LocalEndpoint {
    pub fn rank(&self) -> i32 {
        self.rank
    }

    /// Messages received but not yet claimed.
    pub fn pending(&self) -> usize {
        self.stash.borrow().len() + self.inbox.len()
    }

    fn take_stashed(&self, src: i32, tag: i32, comm: Communicator) -> Option<Envelope> {
        let mut stash = self.stash.borrow_mut();
        let index = stash.iter().position(|e| e.matches(src, tag, comm))?;
        stash.remove(index)
    }

    fn next_envelope(&self, src: i32, tag: i32) -> Result<Envelope> {
        let received = match self.recv_timeout {
            Some(timeout) => self.inbox.recv_timeout(timeout),
            None => self.inbox.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        received.map_err(|e| match e {
            RecvTimeoutError::Timeout => ResilienceError::channel_with_source(
                src,
                tag,
                format!("rank {} gave up waiting", self.rank),
                e,
            ),
            RecvTimeoutError::Disconnected => {
                ResilienceError::channel_with_source(src, tag, "fabric shut down", e)
            }
        })
    }
}

impl Transport for LocalEndpoint {
    fn current_rank(&self, _comm: Communicator) -> Result<i32> {
        Ok(self.rank)
    }

    fn comm_size(&self, _comm: Communicator) -> Result<i32> {
        Ok(self.comm_size)
    }

    fn send(&self, dest: i32, tag: i32, comm: Communicator, bytes: &[u8]) -> Result<()> {
        let peer = usize::try_from(dest)
            .ok()
            .and_then(|index| self.peers.get(index))
            .ok_or_else(|| ResilienceError::channel(dest, tag, "no such rank"))?;

        let envelope = Envelope {
            src: self.rank,
            tag,
            comm,
            payload: bytes.to_vec(),
        };
        peer.send(envelope)
            .map_err(|_| ResilienceError::channel(dest, tag, "peer endpoint has shut down"))?;

        tracing::trace!(src = self.rank, dest, tag, len = bytes.len(), "queued message");
        Ok(())
    }

    fn recv(&self, src: i32, tag: i32, comm: Communicator, buf: &mut [u8]) -> Result<()> {
        let envelope = match self.take_stashed(src, tag, comm) {
            Some(envelope) => envelope,
            None => loop {
                let envelope = self.next_envelope(src, tag)?;
                if envelope.matches(src, tag, comm) {
                    break envelope;
                }
                self.stash.borrow_mut().push_back(envelope);
            },
        };

        if envelope.payload.len() != buf.len() {
            return Err(ResilienceError::protocol(format!(
                "message from rank {src} on tag {tag} is {} bytes, expected {}",
                envelope.payload.len(),
                buf.len()
            )));
        }
        buf.copy_from_slice(&envelope.payload);
        Ok(())
    }
}
