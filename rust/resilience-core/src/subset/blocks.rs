// rust/resilience-core/src/subset/blocks.rs

//! Block records and the growable sequence that holds them.

use crate::error::{ResilienceError, Result};

/// One selected block of a subset.
///
/// Repetition `r` (`0 <= r <= repeats`) selects the inclusive byte range
/// `[start + r * stride, end + r * stride]`. Explicit subsets always carry
/// `repeats == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Block {
    /// First selected byte of the first repetition.
    pub start: u64,
    /// Last selected byte of the first repetition.
    pub end: u64,
    /// Additional repetitions beyond the first.
    pub repeats: u64,
}

impl Block {
    /// Creates a repeating block.
    pub fn new(start: u64, end: u64, repeats: u64) -> Self {
        Self { start, end, repeats }
    }

    /// Creates a block that occurs exactly once.
    pub fn once(start: u64, end: u64) -> Self {
        Self::new(start, end, 0)
    }

    /// Distance from the first to the last selected byte of one repetition.
    pub fn span(&self) -> u64 {
        self.end - self.start
    }

    /// Number of repetitions, including the first.
    pub fn occurrences(&self) -> u64 {
        self.repeats.saturating_add(1)
    }

    /// Inclusive byte range of repetition `r`.
    pub fn occurrence(&self, r: u64, stride: u64) -> (u64, u64) {
        let shift = r.saturating_mul(stride);
        (
            self.start.saturating_add(shift),
            self.end.saturating_add(shift),
        )
    }

    /// Last byte selected by the final repetition.
    pub fn last_byte(&self, stride: u64) -> u64 {
        self.occurrence(self.repeats, stride).1
    }
}

/// Ordered, growable sequence of [`Block`] records.
///
/// Start, end and repeat count live together in one record so they can never
/// drift out of step. Removal compacts the sequence by shifting later blocks
/// down.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlockList {
    blocks: Vec<Block>,
}

impl BlockList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self { blocks: Vec::new() }
    }

    /// Allocates `block_count` zeroed blocks.
    ///
    /// # Errors
    ///
    /// Returns `NonPositiveBlockCount` if `block_count <= 0`, or
    /// `ResourceExhausted` if the allocation fails.
    pub fn init(block_count: i64) -> Result<Self> {
        if block_count <= 0 {
            return Err(ResilienceError::NonPositiveBlockCount { count: block_count });
        }
        let count = usize::try_from(block_count).map_err(|_| {
            ResilienceError::ResourceExhausted {
                requested: usize::MAX,
                source: None,
            }
        })?;
        let mut list = Self::with_capacity(count)?;
        list.blocks.resize(count, Block::default());
        Ok(list)
    }

    /// Creates an empty list with room for `capacity` blocks.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let mut blocks = Vec::new();
        blocks.try_reserve_exact(capacity).map_err(|e| {
            ResilienceError::exhausted(capacity.saturating_mul(std::mem::size_of::<Block>()), e)
        })?;
        Ok(Self { blocks })
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Block> {
        self.blocks.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Block> {
        self.blocks.iter()
    }

    pub fn as_slice(&self) -> &[Block] {
        &self.blocks
    }

    /// Overwrites the block at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn set(&mut self, index: usize, block: Block) {
        self.blocks[index] = block;
    }

    /// Appends a block, doubling the capacity when the list is full.
    pub fn push(&mut self, block: Block) -> Result<()> {
        if self.blocks.len() == self.blocks.capacity() {
            let additional = self.blocks.capacity().max(1);
            self.blocks.try_reserve_exact(additional).map_err(|e| {
                ResilienceError::exhausted(
                    additional.saturating_mul(std::mem::size_of::<Block>()),
                    e,
                )
            })?;
        }
        self.blocks.push(block);
        Ok(())
    }

    /// Removes the block at `index`, shifting every later block down by one.
    pub fn remove(&mut self, index: usize) -> Block {
        self.blocks.remove(index)
    }

    /// Appends copies of every block in `other`.
    pub fn extend_from(&mut self, other: &BlockList) -> Result<()> {
        self.reserve(other.len())?;
        self.blocks.extend_from_slice(&other.blocks);
        Ok(())
    }

    pub(crate) fn reserve(&mut self, additional: usize) -> Result<()> {
        self.blocks.try_reserve(additional).map_err(|e| {
            ResilienceError::exhausted(additional.saturating_mul(std::mem::size_of::<Block>()), e)
        })
    }
}

impl From<Vec<Block>> for BlockList {
    fn from(blocks: Vec<Block>) -> Self {
        Self { blocks }
    }
}

impl<'a> IntoIterator for &'a BlockList {
    type Item = &'a Block;
    type IntoIter = std::slice::Iter<'a, Block>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_allocates_zeroed_blocks() {
        let list = BlockList::init(3).unwrap();
        assert_eq!(list.len(), 3);
        assert!(list.iter().all(|b| *b == Block::default()));
    }

    #[test]
    fn test_init_rejects_non_positive_count() {
        assert!(matches!(
            BlockList::init(0),
            Err(ResilienceError::NonPositiveBlockCount { count: 0 })
        ));
        assert!(matches!(
            BlockList::init(-4),
            Err(ResilienceError::NonPositiveBlockCount { count: -4 })
        ));
    }

    #[test]
    fn test_remove_compacts() {
        let mut list = BlockList::from(vec![
            Block::once(0, 1),
            Block::once(4, 5),
            Block::once(8, 9),
        ]);
        let removed = list.remove(1);
        assert_eq!(removed, Block::once(4, 5));
        assert_eq!(list.as_slice(), &[Block::once(0, 1), Block::once(8, 9)]);
    }

    #[test]
    fn test_push_grows_past_initial_capacity() {
        let mut list = BlockList::with_capacity(1).unwrap();
        for i in 0..9 {
            list.push(Block::once(i, i + 1)).unwrap();
        }
        assert_eq!(list.len(), 9);
        assert_eq!(list.get(8), Some(&Block::once(8, 9)));
    }

    #[test]
    fn test_occurrence_math() {
        let block = Block::new(2, 5, 3);
        assert_eq!(block.occurrences(), 4);
        assert_eq!(block.occurrence(0, 10), (2, 5));
        assert_eq!(block.occurrence(2, 10), (22, 25));
        assert_eq!(block.last_byte(10), 35);
        assert_eq!(block.span(), 3);
    }
}
