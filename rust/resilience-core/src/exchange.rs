// rust/resilience-core/src/exchange.rs

//! Partner recovery exchange.
//!
//! Each routine comes as a send/receive pair that the surviving partner and
//! the recovering rank run at the same time. Every exchange sends metadata
//! first and payload second, and the receiving side rebuilds its record
//! shapes from the metadata it just received before it touches any payload
//! buffer.
//!
//! Tags come from a [`TagSpace`]. Loops offset the tag by the loop index
//! (member index for member metadata, version slot for buffer headers and
//! payloads), so the pairs from different iterations travel on separate
//! streams and only per-stream ordering is relied upon.
//!
//! # Example
//!
//! ```
//! use resilience_core::exchange::RecoveryContext;
//! use resilience_core::records::{BufferEntry, Datatype, GroupEntry};
//! use resilience_core::transport::{Communicator, LocalFabric};
//! use resilience_core::wire::TagSpace;
//!
//! let mut endpoints = LocalFabric::new().connect(2).unwrap();
//! let survivor = RecoveryContext::new(endpoints.pop().unwrap(), TagSpace::default(), Communicator::WORLD).unwrap();
//! let recovering = RecoveryContext::new(endpoints.pop().unwrap(), TagSpace::default(), Communicator::WORLD).unwrap();
//!
//! let mut group = GroupEntry::new(1, Communicator::WORLD, 0, 1, 1).unwrap();
//! group.add_member(10, Datatype::BYTE, 1, vec![0; 4]).unwrap();
//! let replica = BufferEntry::new(Datatype::BYTE, 1, vec![7; 4], 0).unwrap();
//! group.members.get_mut(10).unwrap().snapshot(replica).unwrap();
//!
//! // The in-process fabric buffers sends, so one thread can drive both sides.
//! survivor.send_group(0, &group).unwrap();
//! let mut restored = GroupEntry::default();
//! recovering.recv_group(1, &mut restored).unwrap();
//!
//! let member = restored.members.get(10).unwrap();
//! let slot = member.version.latest().unwrap();
//! assert_eq!(member.version.local(slot).unwrap().data(), &[7; 4]);
//! ```

use crate::error::{ResilienceError, Result};
use crate::records::{
    BufferEntry, GroupEntry, GroupTable, MemberEntry, MemberTable, VersionRing,
};
use crate::transport::{Communicator, Transport};
use crate::wire::{
    BufferEntryPacket, ContainerPacket, GroupEntryPacket, MemberEntryPacket, TagKind, TagSpace,
    VersionPacket, WirePacket,
};

/// Everything an exchange needs: the transport, the agreed tag layout, the
/// communicator, and the caller's own rank.
#[derive(Debug)]
pub struct RecoveryContext<T: Transport> {
    transport: T,
    tags: TagSpace,
    comm: Communicator,
    rank: i32,
}

impl<T: Transport> RecoveryContext<T> {
    pub fn new(transport: T, tags: TagSpace, comm: Communicator) -> Result<Self> {
        let rank = transport.current_rank(comm)?;
        Ok(Self {
            transport,
            tags,
            comm,
            rank,
        })
    }

    pub fn rank(&self) -> i32 {
        self.rank
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn tags(&self) -> &TagSpace {
        &self.tags
    }

    pub fn communicator(&self) -> Communicator {
        self.comm
    }

    fn send_packet<P: WirePacket>(
        &self,
        peer: i32,
        kind: TagKind,
        offset: usize,
        packet: &P,
        step: &'static str,
    ) -> Result<()> {
        let tag = self.tags.tag(kind, offset)?;
        self.transport
            .send(peer, tag, self.comm, &packet.to_bytes())?;
        tracing::debug!(step, rank = self.rank, peer, tag, "sent {}", P::NAME);
        Ok(())
    }

    fn recv_packet<P: WirePacket>(
        &self,
        peer: i32,
        kind: TagKind,
        offset: usize,
        step: &'static str,
    ) -> Result<P> {
        let tag = self.tags.tag(kind, offset)?;
        let mut buf = vec![0u8; P::SIZE];
        self.transport.recv(peer, tag, self.comm, &mut buf)?;
        let packet = P::from_bytes(&buf)?;
        tracing::debug!(step, rank = self.rank, peer, tag, "received {}", P::NAME);
        Ok(packet)
    }

    /// Sends the group fields followed by its member container shape.
    pub fn send_group_entry(&self, peer: i32, group: &GroupEntry) -> Result<()> {
        let step = "send_group_entry";
        self.send_packet(peer, TagKind::GroupEntry, 0, &group.to_packet(), step)?;
        self.send_packet(peer, TagKind::Member, 0, &group.members.to_packet()?, step)?;
        tracing::debug!(
            step,
            group_id = group.group_id,
            timestamp = group.current_timestamp,
            members = group.members.len(),
            "group entry sent"
        );
        Ok(())
    }

    /// Overwrites `group` from the partner and empties its member table to
    /// the announced shape. `group` is untouched unless both packets arrive
    /// and decode.
    pub fn recv_group_entry(&self, peer: i32, group: &mut GroupEntry) -> Result<()> {
        let step = "recv_group_entry";
        let entry: GroupEntryPacket = self.recv_packet(peer, TagKind::GroupEntry, 0, step)?;
        let shape: ContainerPacket = self.recv_packet(peer, TagKind::Member, 0, step)?;

        let mut members = MemberTable::new();
        members.reinit(&shape)?;
        group.apply_packet(&entry)?;
        group.members = members;
        tracing::debug!(
            step,
            group_id = group.group_id,
            timestamp = group.current_timestamp,
            member_slots = group.members.slot_count(),
            "group entry restored"
        );
        Ok(())
    }

    /// Sends the shape of the whole group table.
    pub fn send_group_table(&self, peer: i32, table: &GroupTable) -> Result<()> {
        self.send_packet(peer, TagKind::Group, 0, &table.to_packet()?, "send_group_table")
    }

    /// Empties `table` to the partner's shape.
    pub fn recv_group_table(&self, peer: i32, table: &mut GroupTable) -> Result<()> {
        let shape: ContainerPacket =
            self.recv_packet(peer, TagKind::Group, 0, "recv_group_table")?;
        table.reinit(&shape)
    }

    /// Sends one member's fields and version ring shape.
    pub fn send_member_metadata(&self, peer: i32, member: &MemberEntry) -> Result<()> {
        self.send_member_metadata_at(peer, member, 0, "send_member_metadata")
    }

    /// Overwrites `member` from the partner and empties its version ring to
    /// the announced shape. `member` is untouched unless both packets arrive
    /// and decode.
    pub fn recv_member_metadata(&self, peer: i32, member: &mut MemberEntry) -> Result<()> {
        self.recv_member_metadata_at(peer, member, 0, "recv_member_metadata")
    }

    /// Sends every version slot of the replica this rank keeps for `peer`.
    pub fn send_member_payload(&self, peer: i32, member: &MemberEntry) -> Result<()> {
        self.send_slots(peer, member, "send_member_payload")
    }

    /// Receives the partner's replica into the local slots of `member`,
    /// whose ring must already have the partner's shape.
    pub fn recv_member_payload(&self, peer: i32, member: &mut MemberEntry) -> Result<()> {
        self.recv_slots(peer, member, "recv_member_payload")
    }

    /// Metadata and payload of every member slot, in slot order.
    pub fn send_members(&self, peer: i32, members: &MemberTable) -> Result<()> {
        let step = "send_members";
        for (index, member) in members.slots().iter().enumerate() {
            self.send_member_metadata_at(peer, member, index, step)?;
            self.send_slots(peer, member, step)?;
        }
        Ok(())
    }

    /// Receives into every slot of `members`, whose shape must already match
    /// the partner's.
    pub fn recv_members(&self, peer: i32, members: &mut MemberTable) -> Result<()> {
        let step = "recv_members";
        for (index, member) in members.slots_mut().iter_mut().enumerate() {
            self.recv_member_metadata_at(peer, member, index, step)?;
            self.recv_slots(peer, member, step)?;
        }
        Ok(())
    }

    /// Group entry followed by all members.
    pub fn send_group(&self, peer: i32, group: &GroupEntry) -> Result<()> {
        self.send_group_entry(peer, group)?;
        self.send_members(peer, &group.members)
    }

    /// Rebuilds `group` and all of its members from the partner.
    pub fn recv_group(&self, peer: i32, group: &mut GroupEntry) -> Result<()> {
        self.recv_group_entry(peer, group)?;
        self.recv_members(peer, &mut group.members)
    }

    fn send_member_metadata_at(
        &self,
        peer: i32,
        member: &MemberEntry,
        index: usize,
        step: &'static str,
    ) -> Result<()> {
        self.send_packet(peer, TagKind::MemberEntry, index, &member.to_packet(), step)?;
        self.send_packet(peer, TagKind::Version, index, &member.version.to_packet()?, step)
    }

    fn recv_member_metadata_at(
        &self,
        peer: i32,
        member: &mut MemberEntry,
        index: usize,
        step: &'static str,
    ) -> Result<()> {
        let entry: MemberEntryPacket = self.recv_packet(peer, TagKind::MemberEntry, index, step)?;
        let shape: VersionPacket = self.recv_packet(peer, TagKind::Version, index, step)?;

        let mut version = VersionRing::default();
        version.reinit(&shape)?;
        member.apply_packet(&entry)?;
        member.version = version;
        Ok(())
    }

    fn send_slots(&self, peer: i32, member: &MemberEntry, step: &'static str) -> Result<()> {
        for slot in 0..member.version.capacity() {
            let entry = member.version.remote(slot).ok_or_else(|| {
                ResilienceError::protocol(format!("member {} has no slot {slot}", member.member_id))
            })?;

            let header = entry.header();
            self.send_packet(peer, TagKind::Size, slot, &header, step)?;

            if header.count > 0 {
                let tag = self.tags.tag(TagKind::Data, slot)?;
                self.transport.send(peer, tag, self.comm, entry.data())?;
                tracing::debug!(
                    step,
                    rank = self.rank,
                    peer,
                    tag,
                    member_id = member.member_id,
                    slot,
                    bytes = entry.byte_len(),
                    "sent payload"
                );
            }
        }
        Ok(())
    }

    fn recv_slots(&self, peer: i32, member: &mut MemberEntry, step: &'static str) -> Result<()> {
        for slot in 0..member.version.capacity() {
            let header: BufferEntryPacket = self.recv_packet(peer, TagKind::Size, slot, step)?;
            let mut entry = BufferEntry::allocate(&header, self.rank)?;

            if header.count > 0 {
                let tag = self.tags.tag(TagKind::Data, slot)?;
                self.transport
                    .recv(peer, tag, self.comm, entry.data_mut())?;
                tracing::debug!(
                    step,
                    rank = self.rank,
                    peer,
                    tag,
                    member_id = member.member_id,
                    slot,
                    bytes = entry.byte_len(),
                    "received payload"
                );
            }

            let target = member.version.local_mut(slot).ok_or_else(|| {
                ResilienceError::protocol(format!("member {} has no slot {slot}", member.member_id))
            })?;
            *target = entry;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{Datatype, Occupancy};
    use crate::transport::{LocalEndpoint, LocalFabric};
    use std::time::Duration;

    const WORLD: Communicator = Communicator::WORLD;

    fn contexts(size: usize) -> Vec<RecoveryContext<LocalEndpoint>> {
        LocalFabric::new()
            .with_recv_timeout(Some(Duration::from_secs(5)))
            .connect(size)
            .unwrap()
            .into_iter()
            .map(|endpoint| RecoveryContext::new(endpoint, TagSpace::default(), WORLD).unwrap())
            .collect()
    }

    fn replica(fill: u8, elements: usize) -> BufferEntry {
        BufferEntry::new(Datatype::INT, 4, vec![fill; elements * 4], 0).unwrap()
    }

    /// Rank 1's group holding three versions of rank 0's replica for two
    /// members.
    fn survivor_group() -> GroupEntry {
        let mut group = GroupEntry::new(3, WORLD, 40, 2, 1).unwrap();
        group.current_timestamp = 42;
        group.add_member(100, Datatype::INT, 4, vec![1; 32]).unwrap();
        group.add_member(200, Datatype::DOUBLE, 8, vec![2; 64]).unwrap();
        for m in group.members.slots_mut() {
            m.current_rank = 1;
            m.remote_rank = 2;
        }

        for round in 0..3u8 {
            for (i, m) in group.members.slots_mut().iter_mut().enumerate() {
                m.snapshot(replica(round * 10 + i as u8, 2 + round as usize))
                    .unwrap();
            }
        }
        group
    }

    fn assert_restored(sent: &GroupEntry, restored: &GroupEntry, receiver_rank: i32) {
        assert_eq!(restored.to_packet(), sent.to_packet());
        assert_eq!(
            restored.members.to_packet().unwrap(),
            sent.members.to_packet().unwrap()
        );

        for (ours, theirs) in restored.members.slots().iter().zip(sent.members.slots()) {
            assert_eq!(ours.to_packet(), theirs.to_packet());
            assert_eq!(
                ours.version.to_packet().unwrap(),
                theirs.version.to_packet().unwrap()
            );
            for slot in 0..theirs.version.capacity() {
                let local = ours.version.local(slot).unwrap();
                let remote = theirs.version.remote(slot).unwrap();
                assert_eq!(local.header(), remote.header());
                assert_eq!(local.data(), remote.data());
                assert_eq!(local.origin_rank, receiver_rank);
            }
        }
    }

    #[test]
    fn test_group_round_trip_across_threads() {
        let mut ranks = contexts(2);
        let survivor = ranks.pop().unwrap();
        let recovering = ranks.pop().unwrap();
        let group = survivor_group();
        let sent = &group;

        let restored = std::thread::scope(|s| {
            let sender = s.spawn(move || survivor.send_group(0, sent));
            let receiver = s.spawn(move || {
                let mut restored = GroupEntry::default();
                recovering.recv_group(1, &mut restored).map(|_| restored)
            });
            sender.join().unwrap().unwrap();
            receiver.join().unwrap().unwrap()
        });

        assert_eq!(restored.occupancy, Occupancy::Occupied);
        assert_eq!(restored.current_timestamp, 42);
        assert_eq!(restored.depth, 3);
        assert_restored(&group, &restored, 0);

        let member = restored.members.get(200).unwrap();
        let latest = member.version.latest().unwrap();
        assert_eq!(member.version.local(latest).unwrap().data(), &[21; 16]);
    }

    #[test]
    fn test_single_member_exchange() {
        let ranks = contexts(2);
        let group = survivor_group();
        let sent = group.members.get(100).unwrap();

        ranks[1].send_member_metadata(0, sent).unwrap();
        ranks[1].send_member_payload(0, sent).unwrap();

        let mut member = MemberEntry::default();
        ranks[0].recv_member_metadata(1, &mut member).unwrap();
        assert_eq!(member.version.capacity(), 3);
        ranks[0].recv_member_payload(1, &mut member).unwrap();

        assert_eq!(member.to_packet(), sent.to_packet());
        assert_eq!(member.version.local(1).unwrap().data(), &[10; 12]);
        assert!(member.restore_latest());
        assert_eq!(member.data, vec![20; 16]);
    }

    #[test]
    fn test_receiver_ignores_stale_local_shape() {
        let ranks = contexts(2);
        let group = survivor_group();

        // A receiver that still holds an old, larger tree.
        let mut stale = GroupEntry::new(3, WORLD, 0, 5, 1).unwrap();
        for id in 0..4 {
            stale.add_member(id, Datatype::BYTE, 1, vec![9; 3]).unwrap();
        }

        ranks[1].send_group(0, &group).unwrap();
        ranks[0].recv_group(1, &mut stale).unwrap();
        assert_restored(&group, &stale, 0);
    }

    #[test]
    fn test_empty_slots_send_no_payload() {
        let ranks = contexts(2);
        let mut group = GroupEntry::new(1, WORLD, 0, 3, 1).unwrap();
        group.add_member(5, Datatype::BYTE, 1, vec![1; 8]).unwrap();
        group
            .members
            .get_mut(5)
            .unwrap()
            .snapshot(BufferEntry::new(Datatype::BYTE, 1, vec![4; 8], 0).unwrap())
            .unwrap();

        ranks[1].send_group(0, &group).unwrap();
        let mut restored = GroupEntry::default();
        ranks[0].recv_group(1, &mut restored).unwrap();

        let member = restored.members.get(5).unwrap();
        assert_eq!(member.version.capacity(), 4);
        assert_eq!(member.version.local(0).unwrap().data(), &[4; 8]);
        assert!(member.version.local(1).unwrap().is_empty());
        assert_eq!(ranks[0].transport().pending(), 0);
    }

    #[test]
    fn test_group_table_shape() {
        let ranks = contexts(2);
        let mut table = GroupTable::new();
        table.insert(GroupEntry::new(1, WORLD, 0, 1, 1).unwrap()).unwrap();
        table.insert(GroupEntry::new(2, WORLD, 0, 1, 1).unwrap()).unwrap();

        ranks[0].send_group_table(1, &table).unwrap();
        let mut restored = GroupTable::new();
        ranks[1].recv_group_table(0, &mut restored).unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.slot_count(), 2);
    }

    #[test]
    fn test_member_offsets_do_not_cross() {
        // With a tag span of 1 only version slot 0 has a tag.
        let mut endpoints = LocalFabric::new().connect(2).unwrap();
        let tags = TagSpace::new(0, 1).unwrap();
        let survivor = RecoveryContext::new(endpoints.pop().unwrap(), tags, WORLD).unwrap();

        let group = survivor_group();
        let err = survivor.send_members(0, &group.members).unwrap_err();
        assert!(matches!(err, ResilienceError::Protocol { .. }));
    }

    #[test]
    fn test_silent_partner_times_out() {
        let mut endpoints = LocalFabric::new()
            .with_recv_timeout(Some(Duration::from_millis(20)))
            .connect(2)
            .unwrap();
        endpoints.pop();
        let recovering =
            RecoveryContext::new(endpoints.pop().unwrap(), TagSpace::default(), WORLD).unwrap();

        let mut group = GroupEntry::default();
        let err = recovering.recv_group_entry(1, &mut group).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(group, GroupEntry::default());
    }

    #[test]
    fn test_failed_group_entry_leaves_group_intact() {
        let ranks = contexts(2);
        let incoming = GroupEntry::new(8, WORLD, 3, 2, 1).unwrap();
        ranks[1]
            .send_packet(0, TagKind::GroupEntry, 0, &incoming.to_packet(), "test")
            .unwrap();
        // member shape cut short
        let tag = ranks[1].tags().tag(TagKind::Member, 0).unwrap();
        ranks[1].transport().send(0, tag, WORLD, &[0; 4]).unwrap();

        let mut group = survivor_group();
        let before = group.clone();
        let err = ranks[0].recv_group_entry(1, &mut group).unwrap_err();
        assert!(matches!(err, ResilienceError::Protocol { .. }));
        assert_eq!(group, before);
    }

    #[test]
    fn test_failed_member_metadata_leaves_member_intact() {
        let ranks = contexts(2);
        let group = survivor_group();
        let incoming = group.members.get(200).unwrap();
        ranks[1]
            .send_packet(0, TagKind::MemberEntry, 0, &incoming.to_packet(), "test")
            .unwrap();
        // count larger than total_size
        let bad_shape = VersionPacket {
            count: 5,
            total_size: 2,
            position: 0,
            num_copies: 1,
        };
        let tag = ranks[1].tags().tag(TagKind::Version, 0).unwrap();
        ranks[1]
            .transport()
            .send(0, tag, WORLD, &bad_shape.to_bytes())
            .unwrap();

        let mut member = group.members.get(100).unwrap().clone();
        let before = member.clone();
        assert!(ranks[0].recv_member_metadata(1, &mut member).is_err());
        assert_eq!(member, before);
    }

    #[test]
    fn test_truncated_packet_is_protocol_error() {
        let ranks = contexts(2);
        let tag = ranks[0].tags().tag(TagKind::Group, 0).unwrap();
        ranks[0].transport().send(1, tag, WORLD, &[0; 4]).unwrap();

        let mut table = GroupTable::new();
        let err = ranks[1].recv_group_table(0, &mut table).unwrap_err();
        assert!(matches!(err, ResilienceError::Protocol { .. }));
    }
}
