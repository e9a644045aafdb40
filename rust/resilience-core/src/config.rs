// rust/resilience-core/src/config.rs

//! Configuration for the resilience layer.
//!
//! This module provides configuration parsing from TOML files, environment
//! variable overrides, and validation of configuration values.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ResilienceError, Result};
use crate::wire::TagSpace;

// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub exchange: ExchangeConfig,
    pub topology: TopologyConfig,
    pub transport: TransportConfig,
    pub logging: LoggingConfig,
}

/// Message tag layout shared by both partners of an exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// First tag of the recovery protocol.
    pub tag_base: i32,
    /// Tags reserved per message kind; bounds the loop offsets.
    pub tag_span: i32,
}

// Partner placement and history depth.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    /// Hops between a rank and the partner holding its replica.
    pub rank_separation: i32,
    /// Older versions kept besides the newest one.
    pub depth: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Receive timeout in milliseconds for the in-process fabric. Unset
    /// means wait forever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recv_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter level when `RUST_LOG` is not set.
    pub level: String,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            tag_base: TagSpace::DEFAULT_BASE,
            tag_span: TagSpace::DEFAULT_SPAN,
        }
    }
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            rank_separation: 1,
            depth: 1,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ExchangeConfig {
    pub fn tag_space(&self) -> Result<TagSpace> {
        TagSpace::new(self.tag_base, self.tag_span)
    }
}

impl TransportConfig {
    pub fn recv_timeout(&self) -> Option<Duration> {
        self.recv_timeout_ms.map(Duration::from_millis)
    }
}

impl FromStr for ResilienceConfig {
    type Err = ResilienceError;

    /// Parse configuration from a TOML string.
    fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s)
            .map_err(|e| ResilienceError::config_with_source("failed to parse TOML config", e))
    }
}

impl ResilienceConfig {
    // Load configuration from a TOML file.
    //
    // # Errors
    //
    // Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ResilienceError::config_with_source(
                format!("failed to read config file {}", path.display()),
                e,
            )
        })?;
        let config: Self = content.parse()?;
        config.validate()?;
        Ok(config)
    }

    // Apply environment variable overrides.
    //
    // Environment variables are prefixed with `RESILIENCE_` and use
    // underscores to separate nested fields. For example:
    // - `RESILIENCE_EXCHANGE_TAG_BASE` overrides `exchange.tag_base`
    // - `RESILIENCE_TOPOLOGY_DEPTH` overrides `topology.depth`
    // - `RESILIENCE_TRANSPORT_RECV_TIMEOUT_MS` overrides `transport.recv_timeout_ms`
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        // Exchange overrides
        if let Ok(val) = std::env::var("RESILIENCE_EXCHANGE_TAG_BASE") {
            if let Ok(v) = val.parse() {
                self.exchange.tag_base = v;
            }
        }
        if let Ok(val) = std::env::var("RESILIENCE_EXCHANGE_TAG_SPAN") {
            if let Ok(v) = val.parse() {
                self.exchange.tag_span = v;
            }
        }

        // Topology overrides
        if let Ok(val) = std::env::var("RESILIENCE_TOPOLOGY_RANK_SEPARATION") {
            if let Ok(v) = val.parse() {
                self.topology.rank_separation = v;
            }
        }
        if let Ok(val) = std::env::var("RESILIENCE_TOPOLOGY_DEPTH") {
            if let Ok(v) = val.parse() {
                self.topology.depth = v;
            }
        }

        // Transport overrides
        if let Ok(val) = std::env::var("RESILIENCE_TRANSPORT_RECV_TIMEOUT_MS") {
            if let Ok(v) = val.parse() {
                self.transport.recv_timeout_ms = Some(v);
            }
        }

        if let Ok(val) = std::env::var("RESILIENCE_LOGGING_LEVEL") {
            self.logging.level = val;
        }

        self
    }

    pub fn validate(&self) -> Result<()> {
        // Exchange validation
        if self.exchange.tag_span <= 0 {
            return Err(ResilienceError::config(
                "exchange.tag_span must be greater than 0",
            ));
        }
        self.exchange.tag_space()?;

        // Topology validation
        if self.topology.rank_separation < 1 {
            return Err(ResilienceError::config(
                "topology.rank_separation must be at least 1",
            ));
        }
        if self.topology.depth < 0 || self.topology.depth == i32::MAX {
            return Err(ResilienceError::config(format!(
                "topology.depth must be between 0 and {}",
                i32::MAX - 1
            )));
        }

        if self.transport.recv_timeout_ms == Some(0) {
            return Err(ResilienceError::config(
                "transport.recv_timeout_ms must be greater than 0 when set",
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ResilienceError::config(format!(
                "logging.level must be one of: {}",
                valid_levels.join(", ")
            )));
        }

        Ok(())
    }
}
