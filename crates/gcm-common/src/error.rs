//! Error types shared across the postprocessor crates.

use thiserror::Error;

/// Result type alias defaulting to [`PostError`].
pub type Result<T, E = PostError> = std::result::Result<T, E>;

/// Primary error type for postprocessing operations.
///
/// Every variant is fatal at the point of detection: nothing is retried
/// internally, and a failed decode or derivation returns no partial dataset.
#[derive(Debug, Error)]
pub enum PostError {
    /// Unparseable or corrupt input: bad record markers, an ambiguous
    /// endianness/word-width sniff, or an unsupported FFT factorization.
    #[error("format error: {0}")]
    Format(String),

    /// Not enough coordinate information to compute a spatial quantity.
    #[error("dimension error: {0}")]
    Dimension(String),

    /// Ambiguous time or level slicing argument.
    #[error("unit error: {0}")]
    Unit(String),

    /// Requested code or name is neither in the variable library nor derivable.
    #[error("unknown variable: {0}")]
    UnknownVariable(String),

    /// Read past the end of the input buffer.
    #[error("exhausted buffer: {0}")]
    ExhaustedBuffer(String),

    /// Invalid postprocessing configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl PostError {
    /// Create a Format error.
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    /// Create a Dimension error.
    pub fn dimension(msg: impl Into<String>) -> Self {
        Self::Dimension(msg.into())
    }

    /// Create a Unit error.
    pub fn unit(msg: impl Into<String>) -> Self {
        Self::Unit(msg.into())
    }

    /// Create an UnknownVariable error.
    pub fn unknown_variable(msg: impl Into<String>) -> Self {
        Self::UnknownVariable(msg.into())
    }

    /// Create an ExhaustedBuffer error.
    pub fn exhausted_buffer(msg: impl Into<String>) -> Self {
        Self::ExhaustedBuffer(msg.into())
    }

    /// Create a Config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<std::io::Error> for PostError {
    fn from(err: std::io::Error) -> Self {
        Self::Format(err.to_string())
    }
}
