// rust/resilience-core/src/transport/mod.rs

//! Rank-addressed point-to-point messaging.
//!
//! The recovery protocol only needs blocking send and receive keyed by
//! `(peer rank, tag, communicator)` plus the caller's own rank and the
//! communicator size. Messages on one `(source, destination, tag,
//! communicator)` stream arrive in send order; nothing is promised across
//! different streams.
//!
//! [`LocalFabric`] implements the trait with in-process channels, one
//! endpoint per simulated rank.

mod local;

pub use local::{LocalEndpoint, LocalFabric};

use crate::error::Result;

/// Opaque communicator handle. Streams on different communicators never
/// match each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Communicator(pub i32);

impl Communicator {
    pub const WORLD: Communicator = Communicator(0);
}

/// Blocking byte transport between ranks.
///
/// # Object Safety
///
/// This trait is object-safe and can be used as `&dyn Transport`.
pub trait Transport {
    /// Rank of the caller within `comm`.
    fn current_rank(&self, comm: Communicator) -> Result<i32>;

    /// Number of ranks in `comm`.
    fn comm_size(&self, comm: Communicator) -> Result<i32>;

    /// Sends `bytes` to `dest`, blocking until the transport has taken them.
    ///
    /// # Errors
    ///
    /// Returns `Channel` if `dest` is unreachable.
    fn send(&self, dest: i32, tag: i32, comm: Communicator, bytes: &[u8]) -> Result<()>;

    /// Receives the next message from `src` on `tag` into `buf`.
    ///
    /// # Errors
    ///
    /// Returns `Channel` if the transport fails and `Protocol` if the message
    /// length differs from `buf.len()`.
    fn recv(&self, src: i32, tag: i32, comm: Communicator, buf: &mut [u8]) -> Result<()>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn current_rank(&self, comm: Communicator) -> Result<i32> {
        (**self).current_rank(comm)
    }

    fn comm_size(&self, comm: Communicator) -> Result<i32> {
        (**self).comm_size(comm)
    }

    fn send(&self, dest: i32, tag: i32, comm: Communicator, bytes: &[u8]) -> Result<()> {
        (**self).send(dest, tag, comm, bytes)
    }

    fn recv(&self, src: i32, tag: i32, comm: Communicator, buf: &mut [u8]) -> Result<()> {
        (**self).recv(src, tag, comm, buf)
    }
}
