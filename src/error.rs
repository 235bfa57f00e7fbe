//! Error types for the tagstats engine.

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, TagStatsError>;

/// Errors produced by the aggregation engine.
#[derive(Error, Debug)]
pub enum TagStatsError {
    /// Invalid configuration detected at construction time. Never recovered.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The persistence sink failed while the finalized statistics were being
    /// written. The surrounding transaction must be rolled back.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// I/O error, e.g. while growing a memory-mapped location store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
