// rust/resilience-core/src/wire/mod.rs

//! Fixed-layout packets exchanged between partner ranks.
//!
//! Every packet is a run of native-endian 32-bit integers with no padding
//! and no framing. The receiver always knows which packet to expect from the
//! tag it receives on, so the byte length alone identifies a malformed
//! message.
//!
//! ```text
//! GroupEntryPacket   group_id | timestamp | depth | rank_separation | state
//! ContainerPacket    count | total_size
//! MemberEntryPacket  member_id | state | datatype | datatype_size
//!                    | current_count | current_size | current_rank | remote_rank
//! VersionPacket      count | total_size | position | num_copies
//! BufferEntryPacket  datatype | count | datatype_size      (+ payload bytes)
//! MemberStorePacket  rank | datatype | entry_count | entry_size
//!                    | entry_real_count | num_blocks
//! ```

mod packets;
mod tags;

pub use packets::{
    BufferEntryPacket, ContainerPacket, GroupEntryPacket, MemberEntryPacket, MemberStorePacket,
    VersionPacket,
};
pub use tags::{TagKind, TagSpace};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ResilienceError, Result};

/// A packet with a fixed encoded size.
pub trait WirePacket: Sized {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Short name used in error messages and logs.
    const NAME: &'static str;

    fn encode(&self, buf: &mut impl BufMut);

    /// Reads the fields back. `buf` must hold at least `SIZE` bytes.
    fn decode(buf: &mut impl Buf) -> Self;

    /// Rejects field values that cannot describe a real record.
    fn check(&self) -> Result<()> {
        Ok(())
    }

    fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        self.encode(&mut buf);
        buf.freeze()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::SIZE {
            return Err(ResilienceError::protocol(format!(
                "{} must be {} bytes, got {}",
                Self::NAME,
                Self::SIZE,
                bytes.len()
            )));
        }
        let mut cursor = bytes;
        let packet = Self::decode(&mut cursor);
        packet.check()?;
        Ok(packet)
    }
}
