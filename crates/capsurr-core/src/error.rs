//! Error types shared by the capsurr pipeline stages.
//!
//! Library functions mostly return `anyhow::Result` with context attached at
//! each file boundary. [`CapsurrError`] names the failures callers may want to
//! match on (a missing baseline, a capacity that cannot be rescaled, a
//! malformed dataset) and converts into `anyhow::Error` through `?`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CapsurrError {
    /// I/O errors (file access, directory moves)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Data validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failures reported by, or about, the external simulator
    #[error("Simulation error: {0}")]
    Simulation(String),

    /// Surrogate training errors
    #[error("Training error: {0}")]
    Training(String),

    #[error("{0}")]
    Other(String),
}

pub type CapsurrResult<T> = Result<T, CapsurrError>;

impl From<serde_json::Error> for CapsurrError {
    fn from(err: serde_json::Error) -> Self {
        CapsurrError::Parse(err.to_string())
    }
}

impl From<String> for CapsurrError {
    fn from(s: String) -> Self {
        CapsurrError::Other(s)
    }
}

impl From<&str> for CapsurrError {
    fn from(s: &str) -> Self {
        CapsurrError::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CapsurrError::Validation("zero installed capacity".into());
        assert!(err.to_string().contains("Validation error"));
        assert!(err.to_string().contains("zero installed capacity"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CapsurrError = io_err.into();
        assert!(matches!(err, CapsurrError::Io(_)));
    }

    #[test]
    fn test_converts_into_anyhow() {
        fn inner() -> CapsurrResult<()> {
            Err(CapsurrError::Config("missing baseline".into()))
        }

        fn outer() -> anyhow::Result<()> {
            inner()?;
            Ok(())
        }

        let err = outer().unwrap_err();
        assert!(err.to_string().contains("missing baseline"));
    }
}
