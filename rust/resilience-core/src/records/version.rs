// rust/resilience-core/src/records/version.rs

use super::{local_len, wire_len, BufferEntry};
use crate::error::{ResilienceError, Result};
use crate::wire::VersionPacket;

/// Fixed-capacity history of a member's snapshots.
///
/// Each slot pairs a `local` entry (this rank's own data) with a `remote`
/// entry (the replica this rank keeps for its in-partner). `position` is
/// the slot the next snapshot will overwrite and is always a valid index
/// modulo the capacity.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VersionRing {
    count: usize,
    position: usize,
    num_copies: i32,
    local: Vec<BufferEntry>,
    remote: Vec<BufferEntry>,
}

impl VersionRing {
    /// Creates a ring of `capacity` empty slots.
    pub fn new(capacity: usize, num_copies: i32) -> Result<Self> {
        Ok(Self {
            count: 0,
            position: 0,
            num_copies,
            local: empty_slots(capacity)?,
            remote: empty_slots(capacity)?,
        })
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.local.len()
    }

    /// Versions stored so far, at most the capacity.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn num_copies(&self) -> i32 {
        self.num_copies
    }

    pub fn local(&self, slot: usize) -> Option<&BufferEntry> {
        self.local.get(slot)
    }

    pub fn remote(&self, slot: usize) -> Option<&BufferEntry> {
        self.remote.get(slot)
    }

    pub fn local_mut(&mut self, slot: usize) -> Option<&mut BufferEntry> {
        self.local.get_mut(slot)
    }

    pub fn remote_mut(&mut self, slot: usize) -> Option<&mut BufferEntry> {
        self.remote.get_mut(slot)
    }

    /// Stores one snapshot in the slot at `position` and advances it.
    /// Returns the slot written.
    ///
    /// # Errors
    ///
    /// `Protocol` if the ring has no slots.
    pub fn push(&mut self, local: BufferEntry, remote: BufferEntry) -> Result<usize> {
        let capacity = self.capacity();
        if capacity == 0 {
            return Err(ResilienceError::protocol("version ring has no slots"));
        }

        let slot = self.position;
        self.local[slot] = local;
        self.remote[slot] = remote;
        self.position = (slot + 1) % capacity;
        self.count = (self.count + 1).min(capacity);
        Ok(slot)
    }

    /// Slot holding the snapshot `back` versions before the newest one.
    pub fn offset_from_latest(&self, back: usize) -> Option<usize> {
        if back >= self.count {
            return None;
        }
        let capacity = self.capacity();
        Some((self.position + capacity - 1 - back) % capacity)
    }

    /// Slot of the newest snapshot.
    pub fn latest(&self) -> Option<usize> {
        self.offset_from_latest(0)
    }

    /// Discards every entry and reshapes the ring from a partner's summary.
    pub fn reinit(&mut self, packet: &VersionPacket) -> Result<()> {
        let capacity = local_len(packet.total_size, "version slot count")?;
        let count = local_len(packet.count, "version count")?;
        let position = local_len(packet.position, "version position")?;
        if count > capacity || (capacity > 0 && position >= capacity) {
            return Err(ResilienceError::protocol(format!(
                "version summary {packet:?} does not describe a ring"
            )));
        }

        *self = Self {
            count,
            position,
            num_copies: packet.num_copies,
            local: empty_slots(capacity)?,
            remote: empty_slots(capacity)?,
        };
        Ok(())
    }

    pub fn to_packet(&self) -> Result<VersionPacket> {
        Ok(VersionPacket {
            count: wire_len(self.count, "version count")?,
            total_size: wire_len(self.capacity(), "version slot count")?,
            position: wire_len(self.position, "version position")?,
            num_copies: self.num_copies,
        })
    }
}

fn empty_slots(capacity: usize) -> Result<Vec<BufferEntry>> {
    let mut slots = Vec::new();
    slots.try_reserve_exact(capacity).map_err(|e| {
        ResilienceError::exhausted(capacity.saturating_mul(std::mem::size_of::<BufferEntry>()), e)
    })?;
    slots.resize_with(capacity, BufferEntry::default);
    Ok(slots)
}
