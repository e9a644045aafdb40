// rust/resilience-core/src/records/member.rs

use super::{local_len, wire_len, BufferEntry, Datatype, Occupancy, VersionRing};
use crate::error::{ResilienceError, Result};
use crate::wire::{ContainerPacket, MemberEntryPacket};

/// One registered buffer of a group and its snapshot history.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemberEntry {
    pub member_id: i32,
    pub occupancy: Occupancy,
    /// Live user data.
    pub data: Vec<u8>,
    pub current_count: i32,
    pub datatype: Datatype,
    pub datatype_size: i32,
    /// `current_count * datatype_size` at the last snapshot.
    pub current_size: i32,
    pub current_rank: i32,
    pub remote_rank: i32,
    pub version: VersionRing,
}

impl MemberEntry {
    /// Registers `data` as `data.len() / datatype_size` elements with room
    /// for `slots` snapshots.
    pub fn new(
        member_id: i32,
        datatype: Datatype,
        datatype_size: i32,
        data: Vec<u8>,
        slots: usize,
    ) -> Result<Self> {
        let size = local_len(datatype_size, "element size")?;
        if size == 0 || data.len() % size != 0 {
            return Err(ResilienceError::protocol(format!(
                "member {member_id}: {} bytes are not a whole number of {size}-byte elements",
                data.len()
            )));
        }
        let current_count = wire_len(data.len() / size, "element count")?;
        let current_size = wire_len(data.len(), "member size")?;

        Ok(Self {
            member_id,
            occupancy: Occupancy::Occupied,
            data,
            current_count,
            datatype,
            datatype_size,
            current_size,
            current_rank: 0,
            remote_rank: 0,
            version: VersionRing::new(slots, 1)?,
        })
    }

    pub fn is_occupied(&self) -> bool {
        self.occupancy == Occupancy::Occupied
    }

    /// Records the current data as this rank's newest version, next to the
    /// replica received from the in-partner. Returns the slot written.
    pub fn snapshot(&mut self, replica: BufferEntry) -> Result<usize> {
        let local = BufferEntry::new(
            self.datatype,
            self.datatype_size,
            self.data.clone(),
            self.current_rank,
        )?;
        self.current_count = local.count;
        self.current_size = wire_len(local.byte_len(), "member size")?;
        self.version.push(local, replica)
    }

    /// Copies the newest local version back into the live data. Returns
    /// false when no version is stored.
    pub fn restore_latest(&mut self) -> bool {
        let Some(entry) = self.version.latest().and_then(|slot| self.version.local(slot)) else {
            return false;
        };
        self.data = entry.data().to_vec();
        self.current_count = entry.count;
        true
    }

    pub fn to_packet(&self) -> MemberEntryPacket {
        MemberEntryPacket {
            member_id: self.member_id,
            state: self.occupancy.into(),
            datatype: self.datatype,
            datatype_size: self.datatype_size,
            current_count: self.current_count,
            current_size: self.current_size,
            current_rank: self.current_rank,
            remote_rank: self.remote_rank,
        }
    }

    /// Overwrites the member fields from a partner's packet. Live data and
    /// the version ring are left alone.
    pub fn apply_packet(&mut self, packet: &MemberEntryPacket) -> Result<()> {
        self.occupancy = Occupancy::try_from(packet.state)?;
        self.member_id = packet.member_id;
        self.datatype = packet.datatype;
        self.datatype_size = packet.datatype_size;
        self.current_count = packet.current_count;
        self.current_size = packet.current_size;
        self.current_rank = packet.current_rank;
        self.remote_rank = packet.remote_rank;
        Ok(())
    }
}

/// A group's member slots.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemberTable {
    count: usize,
    slots: Vec<MemberEntry>,
}

impl MemberTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Occupied members.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Allocated slots, occupied or not.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn slots(&self) -> &[MemberEntry] {
        &self.slots
    }

    pub fn slots_mut(&mut self) -> &mut [MemberEntry] {
        &mut self.slots
    }

    pub fn get(&self, member_id: i32) -> Option<&MemberEntry> {
        self.slots
            .iter()
            .find(|m| m.is_occupied() && m.member_id == member_id)
    }

    pub fn get_mut(&mut self, member_id: i32) -> Option<&mut MemberEntry> {
        self.slots
            .iter_mut()
            .find(|m| m.is_occupied() && m.member_id == member_id)
    }

    /// Places `entry` in the first free slot, growing the table if needed.
    /// Returns the slot index.
    pub fn insert(&mut self, entry: MemberEntry) -> Result<usize> {
        if self.get(entry.member_id).is_some() {
            return Err(ResilienceError::protocol(format!(
                "member {} is already registered",
                entry.member_id
            )));
        }

        let index = match self.slots.iter().position(|m| !m.is_occupied()) {
            Some(index) => {
                self.slots[index] = entry;
                index
            }
            None => {
                self.slots.try_reserve(1).map_err(|e| {
                    ResilienceError::exhausted(std::mem::size_of::<MemberEntry>(), e)
                })?;
                self.slots.push(entry);
                self.slots.len() - 1
            }
        };
        self.count += 1;
        Ok(index)
    }

    /// Discards every member and reshapes the table from a partner's summary.
    pub fn reinit(&mut self, packet: &ContainerPacket) -> Result<()> {
        let total = local_len(packet.total_size, "member slot count")?;
        let count = local_len(packet.count, "member count")?;

        let mut slots = Vec::new();
        slots.try_reserve_exact(total).map_err(|e| {
            ResilienceError::exhausted(total.saturating_mul(std::mem::size_of::<MemberEntry>()), e)
        })?;
        slots.resize_with(total, MemberEntry::default);

        self.count = count;
        self.slots = slots;
        Ok(())
    }

    pub fn to_packet(&self) -> Result<ContainerPacket> {
        Ok(ContainerPacket {
            count: wire_len(self.count, "member count")?,
            total_size: wire_len(self.slots.len(), "member slot count")?,
        })
    }
}
