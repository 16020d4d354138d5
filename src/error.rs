//! Custom error types for the application.
//!
//! `DaqError` covers the infrastructure concerns (configuration, I/O,
//! storage, instruments). Expected experiment outcomes — target resistance
//! reached, negative fitted slope, abort — are *not* errors; they are
//! reported through [`crate::procedures::SessionOutcome`]. The procedure
//! layer itself works in `anyhow::Result` and only hard failures (hardware
//! communication, storage) propagate out of a session.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Application-level error categories.
#[derive(Error, Debug)]
pub enum DaqError {
    /// Configuration file or environment parsing failed.
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Configuration parsed but contains logically invalid values.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// File or directory I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Instrument driver failure (communication, invalid command).
    #[error("Instrument error: {0}")]
    Instrument(String),

    /// Failure while writing measurement records.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Failure serializing metadata.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_category_and_message() {
        let err = DaqError::Instrument("source-meter timed out".into());
        assert_eq!(err.to_string(), "Instrument error: source-meter timed out");

        let err = DaqError::Storage("disk full".into());
        assert!(err.to_string().starts_with("Storage error:"));
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: DaqError = io.into();
        assert!(matches!(err, DaqError::Io(_)));
    }
}
