// rust/resilience-core/src/wire/packets.rs

use bytes::{Buf, BufMut};

use super::WirePacket;
use crate::error::{ResilienceError, Result};
use crate::records::{Datatype, Occupancy};

const INT: usize = std::mem::size_of::<i32>();

fn non_negative(packet: &str, field: &str, value: i32) -> Result<()> {
    if value < 0 {
        return Err(ResilienceError::protocol(format!(
            "{packet}.{field} is negative ({value})"
        )));
    }
    Ok(())
}

fn known_state(packet: &str, state: i32) -> Result<()> {
    Occupancy::try_from(state)
        .map(|_| ())
        .map_err(|_| ResilienceError::protocol(format!("{packet}.state {state} is not a known state")))
}

/// Group fields sent ahead of the member container summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GroupEntryPacket {
    pub group_id: i32,
    pub timestamp: i32,
    pub depth: i32,
    pub rank_separation: i32,
    pub state: i32,
}

impl WirePacket for GroupEntryPacket {
    const SIZE: usize = 5 * INT;
    const NAME: &'static str = "GroupEntryPacket";

    fn encode(&self, buf: &mut impl BufMut) {
        buf.put_i32_ne(self.group_id);
        buf.put_i32_ne(self.timestamp);
        buf.put_i32_ne(self.depth);
        buf.put_i32_ne(self.rank_separation);
        buf.put_i32_ne(self.state);
    }

    fn decode(buf: &mut impl Buf) -> Self {
        Self {
            group_id: buf.get_i32_ne(),
            timestamp: buf.get_i32_ne(),
            depth: buf.get_i32_ne(),
            rank_separation: buf.get_i32_ne(),
            state: buf.get_i32_ne(),
        }
    }

    fn check(&self) -> Result<()> {
        non_negative(Self::NAME, "depth", self.depth)?;
        known_state(Self::NAME, self.state)
    }
}

/// Shape of a container: live entries and allocated slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContainerPacket {
    pub count: i32,
    pub total_size: i32,
}

impl WirePacket for ContainerPacket {
    const SIZE: usize = 2 * INT;
    const NAME: &'static str = "ContainerPacket";

    fn encode(&self, buf: &mut impl BufMut) {
        buf.put_i32_ne(self.count);
        buf.put_i32_ne(self.total_size);
    }

    fn decode(buf: &mut impl Buf) -> Self {
        Self {
            count: buf.get_i32_ne(),
            total_size: buf.get_i32_ne(),
        }
    }

    fn check(&self) -> Result<()> {
        non_negative(Self::NAME, "count", self.count)?;
        non_negative(Self::NAME, "total_size", self.total_size)?;
        if self.count > self.total_size {
            return Err(ResilienceError::protocol(format!(
                "ContainerPacket holds {} entries in {} slots",
                self.count, self.total_size
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemberEntryPacket {
    pub member_id: i32,
    pub state: i32,
    pub datatype: Datatype,
    pub datatype_size: i32,
    pub current_count: i32,
    pub current_size: i32,
    pub current_rank: i32,
    pub remote_rank: i32,
}

impl WirePacket for MemberEntryPacket {
    const SIZE: usize = 8 * INT;
    const NAME: &'static str = "MemberEntryPacket";

    fn encode(&self, buf: &mut impl BufMut) {
        buf.put_i32_ne(self.member_id);
        buf.put_i32_ne(self.state);
        buf.put_i32_ne(self.datatype.raw());
        buf.put_i32_ne(self.datatype_size);
        buf.put_i32_ne(self.current_count);
        buf.put_i32_ne(self.current_size);
        buf.put_i32_ne(self.current_rank);
        buf.put_i32_ne(self.remote_rank);
    }

    fn decode(buf: &mut impl Buf) -> Self {
        Self {
            member_id: buf.get_i32_ne(),
            state: buf.get_i32_ne(),
            datatype: Datatype::from_raw(buf.get_i32_ne()),
            datatype_size: buf.get_i32_ne(),
            current_count: buf.get_i32_ne(),
            current_size: buf.get_i32_ne(),
            current_rank: buf.get_i32_ne(),
            remote_rank: buf.get_i32_ne(),
        }
    }

    fn check(&self) -> Result<()> {
        known_state(Self::NAME, self.state)?;
        non_negative(Self::NAME, "datatype_size", self.datatype_size)?;
        non_negative(Self::NAME, "current_count", self.current_count)?;
        non_negative(Self::NAME, "current_size", self.current_size)
    }
}

/// Shape of a version ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VersionPacket {
    pub count: i32,
    pub total_size: i32,
    pub position: i32,
    pub num_copies: i32,
}

impl WirePacket for VersionPacket {
    const SIZE: usize = 4 * INT;
    const NAME: &'static str = "VersionPacket";

    fn encode(&self, buf: &mut impl BufMut) {
        buf.put_i32_ne(self.count);
        buf.put_i32_ne(self.total_size);
        buf.put_i32_ne(self.position);
        buf.put_i32_ne(self.num_copies);
    }

    fn decode(buf: &mut impl Buf) -> Self {
        Self {
            count: buf.get_i32_ne(),
            total_size: buf.get_i32_ne(),
            position: buf.get_i32_ne(),
            num_copies: buf.get_i32_ne(),
        }
    }

    fn check(&self) -> Result<()> {
        non_negative(Self::NAME, "count", self.count)?;
        non_negative(Self::NAME, "total_size", self.total_size)?;
        non_negative(Self::NAME, "position", self.position)?;
        non_negative(Self::NAME, "num_copies", self.num_copies)?;
        if self.count > self.total_size {
            return Err(ResilienceError::protocol(format!(
                "VersionPacket holds {} versions in {} slots",
                self.count, self.total_size
            )));
        }
        if self.position > 0 && self.position >= self.total_size {
            return Err(ResilienceError::protocol(format!(
                "VersionPacket position {} is outside {} slots",
                self.position, self.total_size
            )));
        }
        Ok(())
    }
}

/// Header for one version slot, followed on the wire by
/// [`payload_len`](Self::payload_len) raw bytes when `count > 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferEntryPacket {
    pub datatype: Datatype,
    pub count: i32,
    pub datatype_size: i32,
}

impl BufferEntryPacket {
    /// Number of payload bytes that follow this header.
    pub fn payload_len(&self) -> Result<usize> {
        payload_len(self.count, self.datatype_size)
    }
}

/// `count * datatype_size` as a byte length.
///
/// # Errors
///
/// `Protocol` if either factor is negative or the product overflows.
pub(crate) fn payload_len(count: i32, datatype_size: i32) -> Result<usize> {
    let count = usize::try_from(count)
        .map_err(|_| ResilienceError::protocol(format!("element count {count} is negative")))?;
    let size = usize::try_from(datatype_size).map_err(|_| {
        ResilienceError::protocol(format!("element size {datatype_size} is negative"))
    })?;
    count.checked_mul(size).ok_or_else(|| {
        ResilienceError::protocol(format!("{count} elements of {size} bytes overflow"))
    })
}

impl WirePacket for BufferEntryPacket {
    const SIZE: usize = 3 * INT;
    const NAME: &'static str = "BufferEntryPacket";

    fn encode(&self, buf: &mut impl BufMut) {
        buf.put_i32_ne(self.datatype.raw());
        buf.put_i32_ne(self.count);
        buf.put_i32_ne(self.datatype_size);
    }

    fn decode(buf: &mut impl Buf) -> Self {
        Self {
            datatype: Datatype::from_raw(buf.get_i32_ne()),
            count: buf.get_i32_ne(),
            datatype_size: buf.get_i32_ne(),
        }
    }

    fn check(&self) -> Result<()> {
        self.payload_len().map(|_| ())
    }
}

/// Summary of one stored buffer entry, optionally restricted to a subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemberStorePacket {
    pub rank: i32,
    pub datatype: Datatype,
    pub entry_count: i32,
    pub entry_size: i32,
    /// Elements actually carried: all of them, none, or those a subset selects.
    pub entry_real_count: i32,
    /// Block records of the subset, zero for full and empty stores.
    pub num_blocks: i32,
}

impl WirePacket for MemberStorePacket {
    const SIZE: usize = 6 * INT;
    const NAME: &'static str = "MemberStorePacket";

    fn encode(&self, buf: &mut impl BufMut) {
        buf.put_i32_ne(self.rank);
        buf.put_i32_ne(self.datatype.raw());
        buf.put_i32_ne(self.entry_count);
        buf.put_i32_ne(self.entry_size);
        buf.put_i32_ne(self.entry_real_count);
        buf.put_i32_ne(self.num_blocks);
    }

    fn decode(buf: &mut impl Buf) -> Self {
        Self {
            rank: buf.get_i32_ne(),
            datatype: Datatype::from_raw(buf.get_i32_ne()),
            entry_count: buf.get_i32_ne(),
            entry_size: buf.get_i32_ne(),
            entry_real_count: buf.get_i32_ne(),
            num_blocks: buf.get_i32_ne(),
        }
    }

    fn check(&self) -> Result<()> {
        non_negative(Self::NAME, "entry_count", self.entry_count)?;
        non_negative(Self::NAME, "entry_size", self.entry_size)?;
        non_negative(Self::NAME, "num_blocks", self.num_blocks)?;
        if !(0..=self.entry_count).contains(&self.entry_real_count) {
            return Err(ResilienceError::protocol(format!(
                "MemberStorePacket carries {} of {} elements",
                self.entry_real_count, self.entry_count
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes_have_no_padding() {
        assert_eq!(GroupEntryPacket::SIZE, 20);
        assert_eq!(ContainerPacket::SIZE, 8);
        assert_eq!(MemberEntryPacket::SIZE, 32);
        assert_eq!(VersionPacket::SIZE, 16);
        assert_eq!(BufferEntryPacket::SIZE, 12);
        assert_eq!(MemberStorePacket::SIZE, 24);

        assert_eq!(ContainerPacket::default().to_bytes().len(), ContainerPacket::SIZE);
        assert_eq!(MemberEntryPacket::default().to_bytes().len(), MemberEntryPacket::SIZE);
    }

    #[test]
    fn test_fields_are_native_endian_in_order() {
        let packet = VersionPacket {
            count: 2,
            total_size: 3,
            position: 1,
            num_copies: 1,
        };
        let bytes = packet.to_bytes();

        let mut expected = Vec::new();
        for v in [2i32, 3, 1, 1] {
            expected.extend_from_slice(&v.to_ne_bytes());
        }
        assert_eq!(&bytes[..], &expected[..]);
    }

    #[test]
    fn test_member_entry_decodes() {
        let packet = MemberEntryPacket {
            member_id: 7,
            state: Occupancy::Occupied.into(),
            datatype: Datatype::DOUBLE,
            datatype_size: 8,
            current_count: 16,
            current_size: 128,
            current_rank: 3,
            remote_rank: 0,
        };
        let decoded = MemberEntryPacket::from_bytes(&packet.to_bytes()).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_wrong_length_rejected() {
        let bytes = GroupEntryPacket::default().to_bytes();
        let err = GroupEntryPacket::from_bytes(&bytes[..12]).unwrap_err();
        assert!(matches!(err, ResilienceError::Protocol { .. }));

        let mut long = bytes.to_vec();
        long.push(0);
        assert!(GroupEntryPacket::from_bytes(&long).is_err());
    }

    #[test]
    fn test_negative_sizes_rejected() {
        let header = BufferEntryPacket {
            datatype: Datatype::INT,
            count: -1,
            datatype_size: 4,
        };
        assert!(BufferEntryPacket::from_bytes(&header.to_bytes()).is_err());

        let container = ContainerPacket {
            count: 0,
            total_size: -3,
        };
        assert!(ContainerPacket::from_bytes(&container.to_bytes()).is_err());
    }

    #[test]
    fn test_container_count_within_slots() {
        let packet = ContainerPacket {
            count: 4,
            total_size: 2,
        };
        assert!(ContainerPacket::from_bytes(&packet.to_bytes()).is_err());
    }

    #[test]
    fn test_version_position_within_slots() {
        let packet = VersionPacket {
            count: 1,
            total_size: 2,
            position: 2,
            num_copies: 1,
        };
        assert!(VersionPacket::from_bytes(&packet.to_bytes()).is_err());

        let empty_ring = VersionPacket::default();
        assert!(VersionPacket::from_bytes(&empty_ring.to_bytes()).is_ok());
    }

    #[test]
    fn test_unknown_state_rejected() {
        let packet = GroupEntryPacket {
            state: 9,
            ..Default::default()
        };
        assert!(GroupEntryPacket::from_bytes(&packet.to_bytes()).is_err());
    }

    #[test]
    fn test_payload_len() {
        let header = BufferEntryPacket {
            datatype: Datatype::DOUBLE,
            count: 5,
            datatype_size: 8,
        };
        assert_eq!(header.payload_len().unwrap(), 40);
        assert!(payload_len(i32::MAX, -1).is_err());
    }
}
