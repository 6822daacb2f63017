//! Error types.
//!
//! Refused operations (spawn at capacity, removing an absent unit, writing a
//! non-resident cell) are not errors; they come back as sentinel values.

use crate::{SettlementId, UnitId};

/// Errors from loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Errors that can occur during save/load.
#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Bincode(#[from] Box<bincode::ErrorKind>),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Save version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("Corrupt unit id {unit} in settlement {settlement}")]
    CorruptUnitId { settlement: SettlementId, unit: UnitId },
    #[error("Duplicate settlement id {0}")]
    DuplicateSettlement(SettlementId),
}

/// Problems found while advancing a tick. These are reported, not fatal:
/// the offending check is skipped and the rest of the tick still runs.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TickError {
    #[error("respawn interval for settlement {settlement} is {interval} ticks at anchor level {anchor_level}")]
    RespawnIntervalUnderflow {
        settlement: SettlementId,
        anchor_level: u32,
        interval: i64,
    },
}
