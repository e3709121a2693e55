//! Error types for the ballistics engine.
//!
//! Simulation outcomes are never errors: they travel through
//! [`ExitCode`](crate::types::ExitCode) on the task result. The variants here
//! cover invalid inputs rejected before a task exists and wire decoding
//! failures.

use thiserror::Error;

/// Errors surfaced by fallible engine functions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BallisticsError {
    /// A pure function received an argument outside its domain
    /// (e.g. non-positive pressure or absolute temperature).
    #[error("bad input: {0}")]
    BadInput(&'static str),

    /// The projectile description is unusable (zero mass or radius, NaN).
    #[error("invalid projectile: {0}")]
    InvalidProjectile(String),

    /// Launch parameters are unusable (non-finite transform, zero direction).
    #[error("invalid launch params: {0}")]
    InvalidLaunchParams(String),

    /// The engine refuses new work because it is shutting down.
    #[error("engine is shutting down")]
    ShuttingDown,

    /// A bit-packed buffer ended early or held an out-of-range value.
    #[error("wire format error: {0}")]
    Wire(String),

    /// Envelope (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<bincode::Error> for BallisticsError {
    fn from(err: bincode::Error) -> Self {
        BallisticsError::Serialization(err.to_string())
    }
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, BallisticsError>;
