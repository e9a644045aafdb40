// rust/resilience-core/src/records/mod.rs

//! In-memory checkpoint records.
//!
//! Ownership is strictly hierarchical:
//!
//! ```text
//! GroupTable ─▶ GroupEntry ─▶ MemberTable ─▶ MemberEntry ─▶ VersionRing ─▶ BufferEntry
//! ```
//!
//! Ranks stored in the records are plain integers used for addressing.

mod buffer;
mod group;
mod member;
mod version;

pub use buffer::{BufferEntry, StoreMode};
pub use group::{GroupEntry, GroupTable};
pub use member::{MemberEntry, MemberTable};
pub use version::VersionRing;

use crate::error::{ResilienceError, Result};

/// Whether a record slot holds live data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Occupancy {
    #[default]
    Empty,
    Occupied,
}

impl From<Occupancy> for i32 {
    fn from(state: Occupancy) -> Self {
        match state {
            Occupancy::Empty => 0,
            Occupancy::Occupied => 1,
        }
    }
}

impl TryFrom<i32> for Occupancy {
    type Error = ResilienceError;

    fn try_from(raw: i32) -> Result<Self> {
        match raw {
            0 => Ok(Occupancy::Empty),
            1 => Ok(Occupancy::Occupied),
            other => Err(ResilienceError::protocol(format!(
                "unknown occupancy state {other}"
            ))),
        }
    }
}

/// Element type handle carried alongside buffer sizes.
///
/// The handle is opaque to the protocol; `datatype_size` always travels
/// with it. The constants cover the common element types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Datatype(i32);

impl Datatype {
    pub const BYTE: Datatype = Datatype(1);
    pub const INT: Datatype = Datatype(2);
    pub const LONG: Datatype = Datatype(3);
    pub const FLOAT: Datatype = Datatype(4);
    pub const DOUBLE: Datatype = Datatype(5);

    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> i32 {
        self.0
    }

    /// Element size in bytes for the well-known handles.
    pub fn element_size(self) -> Option<i32> {
        match self {
            Self::BYTE => Some(1),
            Self::INT | Self::FLOAT => Some(4),
            Self::LONG | Self::DOUBLE => Some(8),
            _ => None,
        }
    }
}

/// Converts a length to the wire's `i32`.
pub(crate) fn wire_len(len: usize, what: &str) -> Result<i32> {
    i32::try_from(len)
        .map_err(|_| ResilienceError::protocol(format!("{what} {len} does not fit on the wire")))
}

/// Converts a wire `i32` to a length.
pub(crate) fn local_len(raw: i32, what: &str) -> Result<usize> {
    usize::try_from(raw)
        .map_err(|_| ResilienceError::protocol(format!("{what} {raw} is negative")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_occupancy_codes() {
        assert_eq!(i32::from(Occupancy::Empty), 0);
        assert_eq!(i32::from(Occupancy::Occupied), 1);
        assert_eq!(Occupancy::try_from(1).unwrap(), Occupancy::Occupied);
        assert!(Occupancy::try_from(2).is_err());
    }

    #[test]
    fn test_element_sizes() {
        assert_eq!(Datatype::BYTE.element_size(), Some(1));
        assert_eq!(Datatype::DOUBLE.element_size(), Some(8));
        assert_eq!(Datatype::from_raw(99).element_size(), None);
    }
}
