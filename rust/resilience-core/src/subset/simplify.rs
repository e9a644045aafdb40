// rust/resilience-core/src/subset/simplify.rs

//! Overlap removal for strided and explicit block lists.
//!
//! Both passes keep the selected byte set unchanged. Only strict interior
//! overlap (`max(start) < min(end)`) triggers a merge; blocks that merely
//! touch at a boundary byte are left as two blocks.
//!
//! # Strided blocks
//!
//! Every block is viewed in "region" space: repetition `r` of a block lives in
//! region `r`, offset by `r * stride` bytes. For a pair of blocks `a` and `b`
//! we look for a pairing `k` such that repetition `r` of `a` and repetition
//! `r + k` of `b` strictly overlap. Such a pairing is the same for every `r`,
//! so in the regions where both blocks are present their union is a single
//! block. The pair is then rewritten as at most three blocks:
//!
//! ```text
//!   leading   regions where only the block that starts first is present
//!   merged    regions where both are present, one block covering both
//!   trailing  regions where only the block that ends last is present
//! ```
//!
//! The scan restarts at the same outer index after every merge so merged
//! blocks are re-checked transitively.

use crate::error::Result;

use super::blocks::{Block, BlockList};

/// Returns true if two inclusive ranges share more than a boundary byte.
pub(crate) fn strictly_overlaps(a: (u64, u64), b: (u64, u64)) -> bool {
    a.0.max(b.0) < a.1.min(b.1)
}

/// Removes overlap between the blocks of an explicit subset.
pub(crate) fn simplify_explicit(blocks: &mut BlockList) {
    let mut i = 0;
    while i + 1 < blocks.len() {
        let mut did_merge = false;
        let mut j = i + 1;

        while j < blocks.len() {
            let a = blocks.as_slice()[i];
            let b = blocks.as_slice()[j];

            if strictly_overlaps((a.start, a.end), (b.start, b.end)) {
                blocks.set(i, Block::once(a.start.min(b.start), a.end.max(b.end)));
                blocks.remove(j);
                did_merge = true;
            } else {
                j += 1;
            }
        }

        if !did_merge {
            i += 1;
        }
    }
}

/// Removes overlap between the blocks of a strided subset.
///
/// # Errors
///
/// Returns `ResourceExhausted` if the block list cannot grow to hold a split.
pub(crate) fn simplify_strided(blocks: &mut BlockList, stride: u64) -> Result<()> {
    for index in 0..blocks.len() {
        let block = blocks.as_slice()[index];
        blocks.set(index, collapse(block, stride));
    }

    let mut i = 0;
    while i + 1 < blocks.len() {
        let mut did_merge = false;
        let mut j = i + 1;

        while j < blocks.len() {
            let a = blocks.as_slice()[i];
            let b = blocks.as_slice()[j];

            let Some(k) = pairing(&a, &b, stride) else {
                j += 1;
                continue;
            };

            let split = split_pair(&a, &b, k, stride);
            blocks.set(i, collapse(split.merged, stride));

            match (split.leading, split.trailing) {
                (None, None) => {
                    blocks.remove(j);
                }
                (Some(piece), None) | (None, Some(piece)) => {
                    blocks.set(j, piece);
                    j += 1;
                }
                (Some(leading), Some(trailing)) => {
                    blocks.set(j, leading);
                    blocks.push(trailing)?;
                    j += 1;
                }
            }
            did_merge = true;
        }

        if !did_merge {
            i += 1;
        }
    }
    Ok(())
}

/// Folds a block whose own repetitions strictly overlap into one range.
fn collapse(block: Block, stride: u64) -> Block {
    if block.repeats > 0 && block.span() > stride {
        Block::once(block.start, block.last_byte(stride))
    } else {
        block
    }
}

/// Finds the smallest `k` such that repetition `r` of `a` strictly overlaps
/// repetition `r + k` of `b` for some valid `r`.
fn pairing(a: &Block, b: &Block, stride: u64) -> Option<i128> {
    let s = stride as i128;
    let (p1, l1, n1) = (a.start as i128, a.span() as i128, a.repeats as i128);
    let (p2, l2, n2) = (b.start as i128, b.span() as i128, b.repeats as i128);

    // Single-byte blocks can only touch.
    if l1 == 0 || l2 == 0 {
        return None;
    }

    // Repetition r of a and r + k of b overlap iff -l2 < d + k*s < l1.
    let d = p2 - p1;
    let k_lo = (-l2 - d).div_euclid(s) + 1;
    let k_hi = (l1 - d - 1).div_euclid(s);

    // The repetition ranges [0, n1] and [-k, n2 - k] must intersect.
    let k_lo = k_lo.max(-n1);
    let k_hi = k_hi.min(n2);

    (k_lo <= k_hi).then_some(k_lo)
}

struct Split {
    leading: Option<Block>,
    merged: Block,
    trailing: Option<Block>,
}

fn split_pair(a: &Block, b: &Block, k: i128, stride: u64) -> Split {
    let s = stride as i128;
    let (p1, l1, n1) = (a.start as i128, a.span() as i128, a.repeats as i128);
    let (p2, l2, n2) = (b.start as i128, b.span() as i128, b.repeats as i128);

    // Base of b when indexed by a's repetition number. May be negative; the
    // merged block below never uses it before region `lo`.
    let q = p2 + k * s;
    let lo = 0.max(-k);
    let hi = n1.min(n2 - k);

    let merged = to_block(
        p1.min(q) + lo * s,
        (p1 + l1).max(q + l2) + lo * s,
        hi - lo,
    );

    let leading = if k < 0 {
        Some(to_block(p1, p1 + l1, lo - 1))
    } else if k > 0 {
        Some(to_block(p2, p2 + l2, k - 1))
    } else {
        None
    };

    let trailing = if n1 > n2 - k {
        let first = hi + 1;
        Some(to_block(p1 + first * s, p1 + l1 + first * s, n1 - first))
    } else if n2 - k > n1 {
        let first = hi + 1 + k;
        Some(to_block(p2 + first * s, p2 + l2 + first * s, n2 - first))
    } else {
        None
    };

    Split {
        leading,
        merged,
        trailing,
    }
}

// Every piece lies inside the byte span of its parents, so it fits in u64.
fn to_block(start: i128, end: i128, repeats: i128) -> Block {
    debug_assert!(start >= 0 && end >= start && repeats >= 0);
    Block::new(start as u64, end as u64, repeats as u64)
}
