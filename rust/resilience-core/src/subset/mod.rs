// rust/resilience-core/src/subset/mod.rs

//! Region descriptors: which bytes of a member buffer take part in a
//! checkpoint.
//!
//! A descriptor is one of:
//!
//! - `Full`: every byte of the buffer
//! - `Empty`: no bytes
//! - `Strided`: blocks that repeat every `stride` bytes
//! - `Explicit`: a plain list of blocks, each occurring once
//! - `Undefined`: a released descriptor that no longer selects anything
//!
//! Block ranges are inclusive on both ends.
//!
//! # Example
//!
//! ```
//! use resilience_core::subset::RegionDescriptor;
//!
//! // Bytes [0,2], [8,10], [16,18], [24,26]
//! let low = RegionDescriptor::create(4, 0, 2, 8).unwrap();
//! // Bytes [4,6], [12,14], [20,22], [28,30]
//! let high = RegionDescriptor::create(4, 4, 6, 8).unwrap();
//!
//! let both = low.merge(&high).unwrap();
//! assert_eq!(both.block_count(), 2);
//! assert!(both.contains(13));
//! assert!(!both.contains(3));
//! ```

mod blocks;
mod simplify;

pub use blocks::{Block, BlockList};

use std::ops::Range;

use crate::error::{ResilienceError, Result};

/// Descriptor variant, without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubsetKind {
    Full,
    Empty,
    Strided,
    Explicit,
    Undefined,
}

/// Selection of bytes within a linear buffer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RegionDescriptor {
    /// The whole buffer.
    Full,
    /// Nothing.
    Empty,
    /// Blocks repeating at a fixed stride.
    Strided { stride: u64, blocks: BlockList },
    /// Blocks listed one by one.
    Explicit { blocks: BlockList },
    /// Released; selects nothing and refuses to merge.
    #[default]
    Undefined,
}

impl RegionDescriptor {
    /// An explicit descriptor of `block_count` zeroed blocks, to be filled in
    /// by the caller. See [`BlockList::init`].
    pub fn init(block_count: i64) -> Result<Self> {
        Ok(Self::Explicit {
            blocks: BlockList::init(block_count)?,
        })
    }

    /// Builds a single strided block repeated `num_repeats_total` times in
    /// total, starting at `[start, end]` and advancing by `stride`.
    ///
    /// # Errors
    ///
    /// Checked in this order: `NonPositiveBlockCount`,
    /// `NegativeStartOffset`, `NonPositiveEndOffset`, `NonPositiveStride`,
    /// `StartAfterEnd`, and `OffsetOverflow` if the last repetition does not
    /// fit in a signed 64-bit offset.
    pub fn create(num_repeats_total: i64, start: i64, end: i64, stride: i64) -> Result<Self> {
        if num_repeats_total <= 0 {
            return Err(ResilienceError::NonPositiveBlockCount {
                count: num_repeats_total,
            });
        }
        if start < 0 {
            return Err(ResilienceError::NegativeStartOffset { offset: start });
        }
        if end <= 0 {
            return Err(ResilienceError::NonPositiveEndOffset { offset: end });
        }
        if stride <= 0 {
            return Err(ResilienceError::NonPositiveStride { stride });
        }
        if start > end {
            return Err(ResilienceError::StartAfterEnd {
                index: 0,
                start,
                end,
            });
        }

        let repeats = num_repeats_total - 1;
        repeats
            .checked_mul(stride)
            .and_then(|shift| shift.checked_add(end))
            .ok_or(ResilienceError::OffsetOverflow { index: 0 })?;

        let mut blocks = BlockList::init(1)?;
        blocks.set(0, Block::new(start as u64, end as u64, repeats as u64));

        Ok(Self::Strided {
            stride: stride as u64,
            blocks,
        })
    }

    /// Builds an explicit descriptor with one block per `(starts[i], ends[i])`
    /// pair.
    ///
    /// # Errors
    ///
    /// `EmptyBlockList` if either list is empty, `MismatchedBlockLists` if
    /// their lengths differ, `NegativeStartOffset` for a negative start, and
    /// `StartAfterEnd` naming the first index where `starts[i] > ends[i]`.
    pub fn create_explicit(starts: &[i64], ends: &[i64]) -> Result<Self> {
        if starts.is_empty() || ends.is_empty() {
            return Err(ResilienceError::EmptyBlockList);
        }
        if starts.len() != ends.len() {
            return Err(ResilienceError::MismatchedBlockLists {
                starts: starts.len(),
                ends: ends.len(),
            });
        }

        if let Some((index, (&start, &end))) = starts
            .iter()
            .zip(ends)
            .enumerate()
            .find(|(_, (start, end))| start > end)
        {
            return Err(ResilienceError::StartAfterEnd { index, start, end });
        }
        if let Some(&offset) = starts.iter().find(|&&start| start < 0) {
            return Err(ResilienceError::NegativeStartOffset { offset });
        }

        let mut blocks = BlockList::with_capacity(starts.len())?;
        for (&start, &end) in starts.iter().zip(ends) {
            blocks.push(Block::once(start as u64, end as u64))?;
        }

        Ok(Self::Explicit { blocks })
    }

    pub fn kind(&self) -> SubsetKind {
        match self {
            Self::Full => SubsetKind::Full,
            Self::Empty => SubsetKind::Empty,
            Self::Strided { .. } => SubsetKind::Strided,
            Self::Explicit { .. } => SubsetKind::Explicit,
            Self::Undefined => SubsetKind::Undefined,
        }
    }

    /// Block list, if this variant carries one.
    pub fn blocks(&self) -> Option<&BlockList> {
        match self {
            Self::Strided { blocks, .. } | Self::Explicit { blocks } => Some(blocks),
            _ => None,
        }
    }

    /// Number of block records. Zero for full, empty and undefined.
    pub fn block_count(&self) -> usize {
        self.blocks().map_or(0, BlockList::len)
    }

    /// Stride of a strided descriptor.
    pub fn stride(&self) -> Option<u64> {
        match self {
            Self::Strided { stride, .. } => Some(*stride),
            _ => None,
        }
    }

    /// Removes redundant overlap in place. The selected byte set is unchanged.
    ///
    /// # Errors
    ///
    /// `ResourceExhausted` if a strided split needs more blocks than can be
    /// allocated.
    pub fn simplify(&mut self) -> Result<()> {
        match self {
            Self::Strided { stride, blocks } => simplify::simplify_strided(blocks, *stride),
            Self::Explicit { blocks } => {
                simplify::simplify_explicit(blocks);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Returns a descriptor selecting the union of both selections.
    ///
    /// Strided descriptors with equal strides stay strided. Any other mix of
    /// strided and explicit descriptors produces an explicit descriptor with
    /// every strided repetition spelled out.
    ///
    /// # Errors
    ///
    /// `UndefinedSubset` if either side was released; `ResourceExhausted` if
    /// expanding strided repetitions cannot be allocated.
    pub fn merge(&self, other: &RegionDescriptor) -> Result<RegionDescriptor> {
        match (self, other) {
            (Self::Undefined, _) | (_, Self::Undefined) => Err(ResilienceError::UndefinedSubset),
            (Self::Full, _) | (_, Self::Full) => Ok(Self::Full),
            (Self::Empty, kept) | (kept, Self::Empty) => Ok(kept.clone()),
            (
                Self::Strided {
                    stride: first_stride,
                    blocks: first,
                },
                Self::Strided {
                    stride: second_stride,
                    blocks: second,
                },
            ) if first_stride == second_stride => {
                let mut blocks = BlockList::with_capacity(first.len() + second.len())?;
                blocks.extend_from(first)?;
                blocks.extend_from(second)?;

                let mut merged = Self::Strided {
                    stride: *first_stride,
                    blocks,
                };
                merged.simplify()?;
                Ok(merged)
            }
            (first, second) => {
                let mut blocks = BlockList::new();
                first.expand_into(&mut blocks)?;
                second.expand_into(&mut blocks)?;

                let mut merged = Self::Explicit { blocks };
                merged.simplify()?;
                Ok(merged)
            }
        }
    }

    /// Releases every block and marks the descriptor undefined. The
    /// descriptor itself stays usable as an empty container.
    pub fn release(&mut self) {
        *self = Self::Undefined;
    }

    /// Releases the descriptor and its own storage.
    pub fn delete(self: Box<Self>) {
        drop(self);
    }

    /// Iterates every selected inclusive range, repetition by repetition.
    /// Full, empty and undefined descriptors yield nothing.
    pub fn ranges(&self) -> Ranges<'_> {
        let (blocks, stride) = match self {
            Self::Strided { stride, blocks } => (blocks.as_slice(), *stride),
            Self::Explicit { blocks } => (blocks.as_slice(), 0),
            _ => (&[][..], 0),
        };
        Ranges {
            blocks,
            stride,
            block: 0,
            repetition: 0,
        }
    }

    /// Returns true if byte `offset` is selected.
    pub fn contains(&self, offset: u64) -> bool {
        match self {
            Self::Full => true,
            Self::Empty | Self::Undefined => false,
            Self::Explicit { blocks } => blocks
                .iter()
                .any(|b| b.start <= offset && offset <= b.end),
            Self::Strided { stride, blocks } => blocks.iter().any(|b| {
                if offset < b.start {
                    return false;
                }
                // Repetitions r with start + r*stride <= offset <= end + r*stride.
                let last = ((offset - b.start) / stride).min(b.repeats);
                let first = offset.saturating_sub(b.end).div_ceil(*stride);
                first <= last
            }),
        }
    }

    /// Sorted, non-adjacent half-open byte ranges selected within a buffer of
    /// `buffer_len` bytes. Anything past the buffer end is dropped.
    pub fn extents(&self, buffer_len: u64) -> Vec<Range<u64>> {
        if buffer_len == 0 {
            return Vec::new();
        }
        let mut ranges: Vec<Range<u64>> = match self {
            Self::Full => return vec![0..buffer_len],
            Self::Empty | Self::Undefined => return Vec::new(),
            Self::Explicit { blocks } => blocks
                .iter()
                .filter(|b| b.start < buffer_len)
                .map(|b| b.start..(b.end + 1).min(buffer_len))
                .collect(),
            Self::Strided { stride, blocks } => blocks
                .iter()
                .filter(|b| b.start < buffer_len)
                .flat_map(|b| {
                    let visible = ((buffer_len - 1 - b.start) / stride).min(b.repeats);
                    (0..=visible).map(move |r| {
                        let (start, end) = b.occurrence(r, *stride);
                        start..(end + 1).min(buffer_len)
                    })
                })
                .collect(),
        };

        ranges.sort_by_key(|r| r.start);
        let mut coalesced: Vec<Range<u64>> = Vec::with_capacity(ranges.len());
        for range in ranges {
            match coalesced.last_mut() {
                Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
                _ => coalesced.push(range),
            }
        }
        coalesced
    }

    /// Number of bytes selected within a buffer of `buffer_len` bytes.
    pub fn selected_len(&self, buffer_len: u64) -> u64 {
        self.extents(buffer_len)
            .iter()
            .map(|r| r.end - r.start)
            .sum()
    }

    /// Copies the selected bytes of `buffer` into one packed vector, in
    /// offset order.
    pub fn gather(&self, buffer: &[u8]) -> Result<Vec<u8>> {
        let extents = self.extents(buffer.len() as u64);
        let total: u64 = extents.iter().map(|r| r.end - r.start).sum();

        let mut packed = Vec::new();
        packed
            .try_reserve_exact(total as usize)
            .map_err(|e| ResilienceError::exhausted(total as usize, e))?;
        for range in extents {
            packed.extend_from_slice(&buffer[range.start as usize..range.end as usize]);
        }
        Ok(packed)
    }

    /// Writes a packed vector produced by [`gather`](Self::gather) back into
    /// the selected bytes of `buffer`.
    ///
    /// # Errors
    ///
    /// `Protocol` if `packed` does not hold exactly the selected byte count.
    pub fn scatter(&self, packed: &[u8], buffer: &mut [u8]) -> Result<()> {
        let extents = self.extents(buffer.len() as u64);
        let total: u64 = extents.iter().map(|r| r.end - r.start).sum();
        if total != packed.len() as u64 {
            return Err(ResilienceError::protocol(format!(
                "packed subset holds {} bytes but the selection covers {}",
                packed.len(),
                total
            )));
        }

        let mut cursor = 0usize;
        for range in extents {
            let len = (range.end - range.start) as usize;
            buffer[range.start as usize..range.end as usize]
                .copy_from_slice(&packed[cursor..cursor + len]);
            cursor += len;
        }
        Ok(())
    }

    /// Appends this descriptor's ranges as single-occurrence blocks.
    fn expand_into(&self, out: &mut BlockList) -> Result<()> {
        match self {
            Self::Explicit { blocks } => out.extend_from(blocks),
            Self::Strided { stride, blocks } => {
                let total = blocks
                    .iter()
                    .try_fold(0usize, |acc, b| {
                        usize::try_from(b.occurrences())
                            .ok()
                            .and_then(|n| acc.checked_add(n))
                    })
                    .ok_or(ResilienceError::ResourceExhausted {
                        requested: usize::MAX,
                        source: None,
                    })?;
                out.reserve(total)?;
                for block in blocks {
                    for r in 0..block.occurrences() {
                        let (start, end) = block.occurrence(r, *stride);
                        out.push(Block::once(start, end))?;
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Iterator over the inclusive ranges of a descriptor.
#[derive(Debug, Clone)]
pub struct Ranges<'a> {
    blocks: &'a [Block],
    stride: u64,
    block: usize,
    repetition: u64,
}

impl Iterator for Ranges<'_> {
    type Item = (u64, u64);

    fn next(&mut self) -> Option<Self::Item> {
        let block = self.blocks.get(self.block)?;
        let range = block.occurrence(self.repetition, self.stride);

        if self.repetition >= block.repeats {
            self.block += 1;
            self.repetition = 0;
        } else {
            self.repetition += 1;
        }
        Some(range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn selected(subset: &RegionDescriptor) -> BTreeSet<u64> {
        subset.ranges().flat_map(|(start, end)| start..=end).collect()
    }

    fn assert_no_strict_overlap(subset: &RegionDescriptor) {
        let ranges: Vec<_> = subset.ranges().collect();
        for (i, a) in ranges.iter().enumerate() {
            for b in &ranges[i + 1..] {
                assert!(
                    !simplify::strictly_overlaps(*a, *b),
                    "{:?} and {:?} still overlap in {:?}",
                    a,
                    b,
                    subset
                );
            }
        }
    }

    #[test]
    fn test_init_allocates_zeroed_blocks() {
        let subset = RegionDescriptor::init(3).unwrap();
        assert_eq!(subset.kind(), SubsetKind::Explicit);
        assert_eq!(subset.block_count(), 3);
        let blocks = subset.blocks().unwrap();
        assert!(blocks.iter().all(|b| *b == Block::default()));

        assert!(matches!(
            RegionDescriptor::init(0),
            Err(ResilienceError::NonPositiveBlockCount { count: 0 })
        ));
        assert!(RegionDescriptor::init(-2).is_err());
    }

    #[test]
    fn test_create_strided_ranges() {
        let subset = RegionDescriptor::create(4, 0, 2, 8).unwrap();
        assert_eq!(subset.kind(), SubsetKind::Strided);
        assert_eq!(subset.block_count(), 1);
        assert_eq!(subset.stride(), Some(8));
        assert_eq!(
            subset.ranges().collect::<Vec<_>>(),
            vec![(0, 2), (8, 10), (16, 18), (24, 26)]
        );
    }

    #[test]
    fn test_create_validation_order() {
        assert!(matches!(
            RegionDescriptor::create(0, 0, 10, 4),
            Err(ResilienceError::NonPositiveBlockCount { count: 0 })
        ));
        assert!(matches!(
            RegionDescriptor::create(2, -1, 10, 4),
            Err(ResilienceError::NegativeStartOffset { offset: -1 })
        ));
        assert!(matches!(
            RegionDescriptor::create(2, 0, 0, 4),
            Err(ResilienceError::NonPositiveEndOffset { offset: 0 })
        ));
        assert!(matches!(
            RegionDescriptor::create(2, 0, 10, 0),
            Err(ResilienceError::NonPositiveStride { stride: 0 })
        ));
        assert!(matches!(
            RegionDescriptor::create(3, 5, 2, 4),
            Err(ResilienceError::StartAfterEnd { index: 0, start: 5, end: 2 })
        ));
        assert!(matches!(
            RegionDescriptor::create(i64::MAX, 0, 2, 4),
            Err(ResilienceError::OffsetOverflow { index: 0 })
        ));
    }

    #[test]
    fn test_create_explicit() {
        let subset = RegionDescriptor::create_explicit(&[0, 20], &[9, 29]).unwrap();
        assert_eq!(subset.kind(), SubsetKind::Explicit);
        assert!(subset.blocks().unwrap().iter().all(|b| b.repeats == 0));
        assert_eq!(subset.ranges().collect::<Vec<_>>(), vec![(0, 9), (20, 29)]);
    }

    #[test]
    fn test_create_explicit_reports_first_bad_index() {
        let err = RegionDescriptor::create_explicit(&[5, 0], &[2, 9]).unwrap_err();
        assert!(matches!(err, ResilienceError::StartAfterEnd { index: 0, .. }));
        assert!(err.is_validation());

        let err = RegionDescriptor::create_explicit(&[0, 7, 9], &[4, 3, 1]).unwrap_err();
        assert!(matches!(err, ResilienceError::StartAfterEnd { index: 1, .. }));
    }

    #[test]
    fn test_create_explicit_rejects_bad_lists() {
        assert!(matches!(
            RegionDescriptor::create_explicit(&[], &[]),
            Err(ResilienceError::EmptyBlockList)
        ));
        assert!(matches!(
            RegionDescriptor::create_explicit(&[1, 2], &[3]),
            Err(ResilienceError::MismatchedBlockLists { starts: 2, ends: 1 })
        ));
        assert!(matches!(
            RegionDescriptor::create_explicit(&[-3], &[3]),
            Err(ResilienceError::NegativeStartOffset { offset: -3 })
        ));
    }

    #[test]
    fn test_deep_copy_is_independent() {
        let original = RegionDescriptor::create_explicit(&[0, 10, 20], &[5, 15, 25]).unwrap();
        let mut copy = original.clone();
        assert_eq!(copy, original);
        assert_eq!(copy.block_count(), 3);

        copy.release();
        assert_eq!(copy.kind(), SubsetKind::Undefined);
        assert_eq!(original.block_count(), 3);
    }

    #[test]
    fn test_release_and_delete() {
        let mut subset = RegionDescriptor::create(2, 0, 3, 8).unwrap();
        subset.release();
        assert_eq!(subset, RegionDescriptor::Undefined);
        assert_eq!(subset.block_count(), 0);
        assert!(!subset.contains(0));

        let boxed = Box::new(RegionDescriptor::create(2, 0, 3, 8).unwrap());
        boxed.delete();
    }

    #[test]
    fn test_merge_disjoint_slots_keeps_two_blocks() {
        let low = RegionDescriptor::create(4, 0, 2, 8).unwrap();
        let high = RegionDescriptor::create(4, 4, 6, 8).unwrap();
        let mut merged = low.merge(&high).unwrap();

        assert_eq!(merged.kind(), SubsetKind::Strided);
        assert_eq!(merged.block_count(), 2);

        let before = merged.clone();
        merged.simplify().unwrap();
        assert_eq!(merged, before);
    }

    #[test]
    fn test_merge_overlapping_strided() {
        let first = RegionDescriptor::create(2, 0, 6, 10).unwrap();
        let second = RegionDescriptor::create(2, 4, 12, 10).unwrap();
        let merged = first.merge(&second).unwrap();

        let expected: BTreeSet<u64> = (0..=22).collect();
        assert_eq!(selected(&merged), expected);
        assert!(merged.block_count() <= 3);
        assert_no_strict_overlap(&merged);
    }

    #[test]
    fn test_merge_full_and_empty() {
        let strided = RegionDescriptor::create(3, 1, 2, 5).unwrap();

        assert_eq!(
            strided.merge(&RegionDescriptor::Full).unwrap(),
            RegionDescriptor::Full
        );
        assert_eq!(
            RegionDescriptor::Full.merge(&RegionDescriptor::Empty).unwrap(),
            RegionDescriptor::Full
        );
        assert_eq!(strided.merge(&RegionDescriptor::Empty).unwrap(), strided);
        assert_eq!(RegionDescriptor::Empty.merge(&strided).unwrap(), strided);
        assert_eq!(
            RegionDescriptor::Empty.merge(&RegionDescriptor::Empty).unwrap(),
            RegionDescriptor::Empty
        );
    }

    #[test]
    fn test_merge_undefined_rejected() {
        let strided = RegionDescriptor::create(3, 1, 2, 5).unwrap();
        assert!(matches!(
            strided.merge(&RegionDescriptor::Undefined),
            Err(ResilienceError::UndefinedSubset)
        ));
        assert!(matches!(
            RegionDescriptor::Undefined.merge(&RegionDescriptor::Full),
            Err(ResilienceError::UndefinedSubset)
        ));
    }

    #[test]
    fn test_merge_mixed_variants_expands() {
        let strided = RegionDescriptor::create(3, 0, 1, 10).unwrap();
        let explicit = RegionDescriptor::create_explicit(&[0], &[12]).unwrap();
        let merged = strided.merge(&explicit).unwrap();

        assert_eq!(merged.kind(), SubsetKind::Explicit);
        assert_eq!(
            merged.ranges().collect::<Vec<_>>(),
            vec![(0, 12), (20, 21)]
        );
    }

    #[test]
    fn test_merge_different_strides_expands() {
        let a = RegionDescriptor::create(2, 0, 1, 4).unwrap();
        let b = RegionDescriptor::create(2, 0, 1, 6).unwrap();
        let merged = a.merge(&b).unwrap();

        assert_eq!(merged.kind(), SubsetKind::Explicit);
        let mut sets = selected(&a);
        sets.extend(selected(&b));
        assert_eq!(selected(&merged), sets);
    }

    #[test]
    fn test_contains() {
        let subset = RegionDescriptor::create(3, 2, 4, 10).unwrap();
        assert!(subset.contains(2));
        assert!(subset.contains(14));
        assert!(subset.contains(24));
        assert!(!subset.contains(5));
        assert!(!subset.contains(32));
        assert!(!subset.contains(1));
        assert!(RegionDescriptor::Full.contains(u64::MAX));
        assert!(!RegionDescriptor::Empty.contains(0));
    }

    #[test]
    fn test_extents_clip_and_coalesce() {
        let subset = RegionDescriptor::create_explicit(&[0, 4, 10], &[3, 6, 40]).unwrap();
        assert_eq!(subset.extents(16), vec![0..7, 10..16]);
        assert_eq!(subset.selected_len(16), 13);

        assert_eq!(RegionDescriptor::Full.extents(8), vec![0..8]);
        assert!(RegionDescriptor::Empty.extents(8).is_empty());
    }

    #[test]
    fn test_gather_scatter() {
        let buffer: Vec<u8> = (0..32).collect();
        let subset = RegionDescriptor::create(3, 1, 2, 10).unwrap();

        let packed = subset.gather(&buffer).unwrap();
        assert_eq!(packed, vec![1, 2, 11, 12, 21, 22]);

        let mut restored = vec![0u8; 32];
        subset.scatter(&packed, &mut restored).unwrap();
        assert_eq!(restored[11], 11);
        assert_eq!(restored[3], 0);

        assert!(subset.scatter(&packed[..4], &mut restored).is_err());
    }

    fn strided_strategy(stride: u64) -> impl Strategy<Value = RegionDescriptor> {
        prop::collection::vec((0u64..40, 0u64..16, 0u64..5), 1..5).prop_map(move |raw| {
            let blocks = raw
                .into_iter()
                .map(|(start, span, repeats)| Block::new(start, start + span, repeats))
                .collect::<Vec<_>>();
            RegionDescriptor::Strided {
                stride,
                blocks: BlockList::from(blocks),
            }
        })
    }

    fn explicit_strategy() -> impl Strategy<Value = RegionDescriptor> {
        prop::collection::vec((0u64..80, 0u64..20), 1..6).prop_map(|raw| {
            let blocks = raw
                .into_iter()
                .map(|(start, span)| Block::once(start, start + span))
                .collect::<Vec<_>>();
            RegionDescriptor::Explicit {
                blocks: BlockList::from(blocks),
            }
        })
    }

    fn any_subset() -> impl Strategy<Value = RegionDescriptor> {
        prop_oneof![
            (1u64..12).prop_flat_map(strided_strategy),
            explicit_strategy(),
            Just(RegionDescriptor::Empty),
        ]
    }

    proptest! {
        #[test]
        fn prop_simplify_preserves_coverage(subset in any_subset()) {
            let before = selected(&subset);
            let mut simplified = subset.clone();
            simplified.simplify().unwrap();
            prop_assert_eq!(selected(&simplified), before);
        }

        #[test]
        fn prop_simplify_is_idempotent(subset in any_subset()) {
            let mut once = subset.clone();
            once.simplify().unwrap();
            assert_no_strict_overlap(&once);

            let mut twice = once.clone();
            twice.simplify().unwrap();
            prop_assert_eq!(selected(&twice), selected(&once));
            prop_assert_eq!(twice.block_count(), once.block_count());
        }

        #[test]
        fn prop_merge_is_union(a in any_subset(), b in any_subset()) {
            let mut expected = selected(&a);
            expected.extend(selected(&b));

            let ab = a.merge(&b).unwrap();
            let ba = b.merge(&a).unwrap();
            prop_assert_eq!(selected(&ab), expected.clone());
            prop_assert_eq!(selected(&ba), expected);
        }

        #[test]
        fn prop_merge_same_stride_stays_strided(
            (a, b) in (1u64..12).prop_flat_map(|s| (strided_strategy(s), strided_strategy(s)))
        ) {
            let merged = a.merge(&b).unwrap();
            prop_assert_eq!(merged.kind(), SubsetKind::Strided);
            assert_no_strict_overlap(&merged);
        }

        #[test]
        fn prop_merge_is_associative(a in any_subset(), b in any_subset(), c in any_subset()) {
            let left = a.merge(&b).unwrap().merge(&c).unwrap();
            let right = a.merge(&b.merge(&c).unwrap()).unwrap();
            prop_assert_eq!(selected(&left), selected(&right));
        }

        #[test]
        fn prop_gather_matches_contains(subset in any_subset(), len in 0u64..120) {
            let buffer: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let packed = subset.gather(&buffer).unwrap();
            let expected: Vec<u8> = (0..len)
                .filter(|&i| subset.contains(i))
                .map(|i| i as u8)
                .collect();
            prop_assert_eq!(packed, expected);
        }
    }
}
