//! Error types for infrastructure failures
//!
//! Compiler findings about DSL source are [`Diagnostic`](crate::Diagnostic)s,
//! never `Error`s. This type covers the few operations that can fail for
//! reasons outside the source text: bad configuration, serialization.

use thiserror::Error;

/// Infrastructure error
#[derive(Debug, Error)]
pub enum Error {
    /// Compile options could not be read
    #[error("invalid configuration: {0}")]
    Config(String),

    /// IR could not be serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for fallible infrastructure operations
pub type Result<T> = std::result::Result<T, Error>;
