// rust/resilience-core/src/wire/tags.rs

use crate::error::{ResilienceError, Result};

/// Message kinds of the recovery protocol. Each kind owns a contiguous band
/// of `span` tags so loop offsets never collide across kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKind {
    /// Group table summary.
    Group = 0,
    /// Group entry fields.
    GroupEntry = 1,
    /// Member container summary.
    Member = 2,
    /// Member entry fields.
    MemberEntry = 3,
    /// Version ring summary.
    Version = 4,
    /// Buffer entry header.
    Size = 5,
    /// Buffer entry payload.
    Data = 6,
}

impl TagKind {
    pub const ALL: [TagKind; 7] = [
        TagKind::Group,
        TagKind::GroupEntry,
        TagKind::Member,
        TagKind::MemberEntry,
        TagKind::Version,
        TagKind::Size,
        TagKind::Data,
    ];
}

/// Maps `(kind, offset)` to a message tag: `base + kind * span + offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagSpace {
    base: i32,
    span: i32,
}

impl TagSpace {
    pub const DEFAULT_BASE: i32 = 1900;
    pub const DEFAULT_SPAN: i32 = 1000;

    /// # Errors
    ///
    /// `Config` if `span` is not positive, `base` is negative, or the last
    /// tag of the last kind does not fit in an `i32`.
    pub fn new(base: i32, span: i32) -> Result<Self> {
        if span <= 0 {
            return Err(ResilienceError::config(format!(
                "tag span must be positive, got {span}"
            )));
        }
        if base < 0 {
            return Err(ResilienceError::config(format!(
                "tag base must not be negative, got {base}"
            )));
        }
        let bands = TagKind::ALL.len() as i64;
        let last = base as i64 + bands * span as i64 - 1;
        if last > i32::MAX as i64 {
            return Err(ResilienceError::config(format!(
                "tags from {base} with span {span} run past {}",
                i32::MAX
            )));
        }
        Ok(Self { base, span })
    }

    pub fn base(&self) -> i32 {
        self.base
    }

    pub fn span(&self) -> i32 {
        self.span
    }

    /// Tag for the first exchange of `kind`.
    pub fn base_tag(&self, kind: TagKind) -> i32 {
        self.base + kind as i32 * self.span
    }

    /// Tag for the exchange of `kind` at loop index `offset`.
    ///
    /// # Errors
    ///
    /// `Protocol` if `offset` does not fit in the kind's band.
    pub fn tag(&self, kind: TagKind, offset: usize) -> Result<i32> {
        match i32::try_from(offset) {
            Ok(offset) if offset < self.span => Ok(self.base_tag(kind) + offset),
            _ => Err(ResilienceError::protocol(format!(
                "{kind:?} offset {offset} exceeds the tag span {}",
                self.span
            ))),
        }
    }
}

impl Default for TagSpace {
    fn default() -> Self {
        Self {
            base: Self::DEFAULT_BASE,
            span: Self::DEFAULT_SPAN,
        }
    }
}
