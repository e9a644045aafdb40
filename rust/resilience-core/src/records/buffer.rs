// rust/resilience-core/src/records/buffer.rs

use super::{local_len, wire_len, Datatype};
use crate::error::{ResilienceError, Result};
use crate::subset::RegionDescriptor;
use crate::wire::{BufferEntryPacket, MemberStorePacket};

/// One stored snapshot of a member buffer.
///
/// The owned byte buffer is always exactly `count * datatype_size` long.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BufferEntry {
    pub datatype: Datatype,
    pub count: i32,
    pub datatype_size: i32,
    /// Rank whose data this entry holds.
    pub origin_rank: i32,
    data: Vec<u8>,
}

/// Which part of an entry a [`MemberStorePacket`] describes.
#[derive(Debug, Clone, Copy)]
pub enum StoreMode<'a> {
    /// Every element.
    Full,
    /// No elements; only the shape.
    Empty,
    /// Elements fully covered by the descriptor.
    Subset(&'a RegionDescriptor),
}

impl BufferEntry {
    /// Wraps `data` as `data.len() / datatype_size` elements.
    ///
    /// # Errors
    ///
    /// `Protocol` if `data` is not a whole number of elements or the count
    /// does not fit on the wire.
    pub fn new(
        datatype: Datatype,
        datatype_size: i32,
        data: Vec<u8>,
        origin_rank: i32,
    ) -> Result<Self> {
        let size = local_len(datatype_size, "element size")?;
        let count = match (data.len(), size) {
            (0, _) => 0,
            (len, size) if size > 0 && len % size == 0 => len / size,
            (len, size) => {
                return Err(ResilienceError::protocol(format!(
                    "{len} bytes are not a whole number of {size}-byte elements"
                )))
            }
        };

        Ok(Self {
            datatype,
            count: wire_len(count, "element count")?,
            datatype_size,
            origin_rank,
            data,
        })
    }

    /// Allocates a zeroed entry of exactly the size `header` announces.
    ///
    /// # Errors
    ///
    /// `Protocol` for negative or overflowing sizes, `ResourceExhausted` if
    /// the buffer cannot be allocated.
    pub fn allocate(header: &BufferEntryPacket, origin_rank: i32) -> Result<Self> {
        let len = header.payload_len()?;
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|e| ResilienceError::exhausted(len, e))?;
        data.resize(len, 0);

        Ok(Self {
            datatype: header.datatype,
            count: header.count,
            datatype_size: header.datatype_size,
            origin_rank,
            data,
        })
    }

    pub fn header(&self) -> BufferEntryPacket {
        BufferEntryPacket {
            datatype: self.datatype,
            count: self.count,
            datatype_size: self.datatype_size,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Describes this entry for storage, restricted according to `mode`.
    ///
    /// # Errors
    ///
    /// `Protocol` if the subset's block count does not fit on the wire.
    pub fn store_packet(&self, mode: StoreMode<'_>) -> Result<MemberStorePacket> {
        let (entry_real_count, num_blocks) = match mode {
            StoreMode::Full => (self.count, 0),
            StoreMode::Empty => (0, 0),
            StoreMode::Subset(subset) => (
                wire_len(self.whole_elements(subset), "selected element count")?,
                wire_len(subset.block_count(), "block count")?,
            ),
        };

        Ok(MemberStorePacket {
            rank: self.origin_rank,
            datatype: self.datatype,
            entry_count: self.count,
            entry_size: self.datatype_size,
            entry_real_count,
            num_blocks,
        })
    }

    /// Elements whose every byte is selected by `subset`.
    fn whole_elements(&self, subset: &RegionDescriptor) -> usize {
        let size = match u64::try_from(self.datatype_size) {
            Ok(size) if size > 0 => size,
            _ => return 0,
        };
        subset
            .extents(self.data.len() as u64)
            .iter()
            .map(|range| (range.end / size).saturating_sub(range.start.div_ceil(size)))
            .sum::<u64>() as usize
    }
}
