// rust/resilience-core/src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResilienceError {

    #[error("block count {count} must be positive")]
    NonPositiveBlockCount {
        count: i64,
    },

    #[error("start offset {offset} must not be negative")]
    NegativeStartOffset {
        offset: i64,
    },

    #[error("end offset {offset} must be positive")]
    NonPositiveEndOffset {
        offset: i64,
    },

    #[error("stride {stride} must be positive")]
    NonPositiveStride {
        stride: i64,
    },

    #[error("block {index}: start offset {start} is past end offset {end}")]
    StartAfterEnd {
        index: usize,
        start: i64,
        end: i64,
    },

    #[error("block {index} reaches past the largest addressable offset")]
    OffsetOverflow {
        index: usize,
    },

    #[error("explicit subset needs at least one block")]
    EmptyBlockList,

    #[error("explicit subset has {starts} start offsets but {ends} end offsets")]
    MismatchedBlockLists {
        starts: usize,
        ends: usize,
    },

    #[error("subset has been released and no longer describes any bytes")]
    UndefinedSubset,

    #[error("channel failure with rank {rank} (tag {tag}): {message}")]
    Channel {
        rank: i32,
        tag: i32,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("resource exhausted: could not allocate {requested} bytes")]
    ResourceExhausted {
        requested: usize,
        #[source]
        source: Option<std::collections::TryReserveError>,
    },

    #[error("Protocol error: {message}")]
    Protocol {
        message: String,
    },

    #[error("Topology error: {message}")]
    Topology {
        message: String,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

pub type Result<T> = std::result::Result<T, ResilienceError>;

// Convenience constructors
impl ResilienceError {

    pub fn channel(rank: i32, tag: i32, message: impl Into<String>) -> Self {
        Self::Channel {
            rank,
            tag,
            message: message.into(),
            source: None,
        }
    }

    pub fn channel_with_source(
        rank: i32,
        tag: i32,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Channel {
            rank,
            tag,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn exhausted(requested: usize, source: std::collections::TryReserveError) -> Self {
        Self::ResourceExhausted {
            requested,
            source: Some(source),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn topology(message: impl Into<String>) -> Self {
        Self::Topology {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns true for the argument-validation kinds raised by subset
    /// constructors. These never leave partially built output behind.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::NonPositiveBlockCount { .. }
                | Self::NegativeStartOffset { .. }
                | Self::NonPositiveEndOffset { .. }
                | Self::NonPositiveStride { .. }
                | Self::StartAfterEnd { .. }
                | Self::OffsetOverflow { .. }
                | Self::EmptyBlockList
                | Self::MismatchedBlockLists { .. }
        )
    }

    /// Returns true when the resilience mechanism itself cannot proceed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Channel { .. } | Self::ResourceExhausted { .. } | Self::Protocol { .. }
        )
    }
}
