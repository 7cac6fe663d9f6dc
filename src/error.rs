//! Error types for doomscope

use thiserror::Error;

/// Errors surfaced by the fallible edges of the detector.
///
/// The sample/tick hot path never produces these; it degrades to no-ops instead.
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Invalid configuration: {}", .0.join("; "))]
    InvalidConfiguration(Vec<String>),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Failed to parse replay record: {0}")]
    ParseError(String),

    #[error("Unknown preset: {0}")]
    UnknownPreset(String),

    #[error("Runtime error: {0}")]
    RuntimeError(String),
}
