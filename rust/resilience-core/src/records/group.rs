// rust/resilience-core/src/records/group.rs

use super::{local_len, wire_len, Datatype, MemberEntry, MemberTable, Occupancy};
use crate::error::{ResilienceError, Result};
use crate::topology::PartnerTopology;
use crate::transport::{Communicator, Transport};
use crate::wire::{ContainerPacket, GroupEntryPacket};

/// A named set of members checkpointed together.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GroupEntry {
    pub group_id: i32,
    pub communicator: Communicator,
    pub start_timestamp: i32,
    pub current_timestamp: i32,
    /// Version slots per member: the configured history depth plus one.
    pub depth: i32,
    pub rank_separation: i32,
    pub occupancy: Occupancy,
    /// Partners on the ring, filled in by [`refresh_topology`](Self::refresh_topology).
    pub topology: Option<PartnerTopology>,
    pub members: MemberTable,
}

impl GroupEntry {
    /// Creates an occupied group keeping `depth` older versions besides the
    /// newest one.
    pub fn new(
        group_id: i32,
        communicator: Communicator,
        timestamp: i32,
        depth: i32,
        rank_separation: i32,
    ) -> Result<Self> {
        if depth < 0 {
            return Err(ResilienceError::config(format!(
                "group {group_id}: depth must not be negative, got {depth}"
            )));
        }
        let depth = depth.checked_add(1).ok_or_else(|| {
            ResilienceError::config(format!("group {group_id}: depth {depth} is too large"))
        })?;

        Ok(Self {
            group_id,
            communicator,
            start_timestamp: timestamp,
            current_timestamp: timestamp,
            depth,
            rank_separation,
            occupancy: Occupancy::Occupied,
            topology: None,
            members: MemberTable::new(),
        })
    }

    pub fn is_occupied(&self) -> bool {
        self.occupancy == Occupancy::Occupied
    }

    /// Re-derives this rank's partners from the transport and stamps them on
    /// every occupied member. Call again after the communicator changes size
    /// or after the group was rebuilt from a partner.
    pub fn refresh_topology<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
    ) -> Result<PartnerTopology> {
        let topology = PartnerTopology::derive(
            transport.current_rank(self.communicator)?,
            transport.comm_size(self.communicator)?,
            self.rank_separation,
        )?;
        for member in self.members.slots_mut() {
            if member.is_occupied() {
                member.current_rank = topology.current_rank;
                member.remote_rank = topology.out_rank;
            }
        }
        tracing::debug!(
            group_id = self.group_id,
            rank = topology.current_rank,
            in_rank = topology.in_rank,
            out_rank = topology.out_rank,
            "refreshed partner topology"
        );
        self.topology = Some(topology);
        Ok(topology)
    }

    /// Registers a member sized for this group's history.
    pub fn add_member(
        &mut self,
        member_id: i32,
        datatype: Datatype,
        datatype_size: i32,
        data: Vec<u8>,
    ) -> Result<usize> {
        let slots = local_len(self.depth, "group depth")?;
        let mut entry = MemberEntry::new(member_id, datatype, datatype_size, data, slots)?;
        if let Some(topology) = self.topology {
            entry.current_rank = topology.current_rank;
            entry.remote_rank = topology.out_rank;
        }
        self.members.insert(entry)
    }

    pub fn to_packet(&self) -> GroupEntryPacket {
        GroupEntryPacket {
            group_id: self.group_id,
            timestamp: self.current_timestamp,
            depth: self.depth,
            rank_separation: self.rank_separation,
            state: self.occupancy.into(),
        }
    }

    /// Overwrites the group fields from a partner's packet. The start
    /// timestamp, communicator and topology stay local.
    pub fn apply_packet(&mut self, packet: &GroupEntryPacket) -> Result<()> {
        self.occupancy = Occupancy::try_from(packet.state)?;
        self.group_id = packet.group_id;
        self.current_timestamp = packet.timestamp;
        self.depth = packet.depth;
        self.rank_separation = packet.rank_separation;
        Ok(())
    }
}

/// Every group registered on this rank.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GroupTable {
    count: usize,
    slots: Vec<GroupEntry>,
}

impl GroupTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn slots(&self) -> &[GroupEntry] {
        &self.slots
    }

    pub fn slots_mut(&mut self) -> &mut [GroupEntry] {
        &mut self.slots
    }

    pub fn get(&self, group_id: i32) -> Option<&GroupEntry> {
        self.slots
            .iter()
            .find(|g| g.is_occupied() && g.group_id == group_id)
    }

    pub fn get_mut(&mut self, group_id: i32) -> Option<&mut GroupEntry> {
        self.slots
            .iter_mut()
            .find(|g| g.is_occupied() && g.group_id == group_id)
    }

    /// Places `group` in the first free slot. Returns the slot index.
    pub fn insert(&mut self, group: GroupEntry) -> Result<usize> {
        if self.get(group.group_id).is_some() {
            return Err(ResilienceError::protocol(format!(
                "group {} is already registered",
                group.group_id
            )));
        }

        let index = match self.slots.iter().position(|g| !g.is_occupied()) {
            Some(index) => {
                self.slots[index] = group;
                index
            }
            None => {
                self.slots.try_reserve(1).map_err(|e| {
                    ResilienceError::exhausted(std::mem::size_of::<GroupEntry>(), e)
                })?;
                self.slots.push(group);
                self.slots.len() - 1
            }
        };
        self.count += 1;
        Ok(index)
    }

    /// Discards every group and reshapes the table from a partner's summary.
    pub fn reinit(&mut self, packet: &ContainerPacket) -> Result<()> {
        let total = local_len(packet.total_size, "group slot count")?;
        let count = local_len(packet.count, "group count")?;

        let mut slots = Vec::new();
        slots.try_reserve_exact(total).map_err(|e| {
            ResilienceError::exhausted(total.saturating_mul(std::mem::size_of::<GroupEntry>()), e)
        })?;
        slots.resize_with(total, GroupEntry::default);

        self.count = count;
        self.slots = slots;
        Ok(())
    }

    pub fn to_packet(&self) -> Result<ContainerPacket> {
        Ok(ContainerPacket {
            count: wire_len(self.count, "group count")?,
            total_size: wire_len(self.slots.len(), "group slot count")?,
        })
    }
}
