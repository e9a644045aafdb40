// rust/resilience-core/src/lib.rs

//! Partner-replica resilience core.
//!
//! This crate lets a rank-parallel computation describe which bytes of its
//! buffers matter for recovery, keep versioned replicas on a partner rank,
//! and rebuild a failed rank's checkpoint records from that partner.

pub mod config;
pub mod error;

// Re-export commonly used types for convenience
pub use config::ResilienceConfig;
pub use error::{ResilienceError, Result};

pub mod subset;
pub use subset::{Block, BlockList, RegionDescriptor, SubsetKind};

pub mod wire;
pub use wire::{TagKind, TagSpace, WirePacket};

pub mod topology;
pub use topology::PartnerTopology;

pub mod records;
pub use records::{
    BufferEntry, Datatype, GroupEntry, GroupTable, MemberEntry, MemberTable, Occupancy,
    StoreMode, VersionRing,
};

pub mod transport;
pub use transport::{Communicator, LocalEndpoint, LocalFabric, Transport};

pub mod exchange;
pub use exchange::RecoveryContext;
