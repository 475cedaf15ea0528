use thiserror::Error;

/// Crate-wide error type shared by all three index engines.
///
/// `NotFound` is deliberately absent: per the engine contract a missing key
/// is `Ok(None)` from `search` and `Ok(false)` from `remove`, never an
/// error. A slot that fails to decode (`DecodeError` in the design) is also
/// absent here because it is handled by tolerant scans inside the engines
/// rather than propagated.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("failed to encode record: {0}")]
    Encode(String),

    #[error("internal invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
