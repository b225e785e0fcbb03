//! Error types for bufcache.
//!
//! Only conditions a caller can reasonably recover from are represented here.
//! Broken checkout discipline and pool exhaustion are programming defects in
//! the consumer and abort via panic instead.

use std::io;
use thiserror::Error;

/// The result type used throughout bufcache.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for bufcache operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The block device failed a read or write.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// An invalid argument was provided.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The cache and the device disagree on the block size.
    #[error("Block size mismatch: cache uses {cache} bytes, device uses {device} bytes")]
    BlockSizeMismatch {
        /// Block size configured for the cache.
        cache: usize,
        /// Block size reported by the device.
        device: usize,
    },

    /// A configuration document could not be parsed.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Creates a new configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Creates an I/O error of the given kind.
    pub fn io(kind: io::ErrorKind, msg: impl Into<String>) -> Self {
        Error::Io(io::Error::new(kind, msg.into()))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::invalid_argument("nbuf must be > 0");
        assert_eq!(err.to_string(), "Invalid argument: nbuf must be > 0");

        let err = Error::BlockSizeMismatch { cache: 1024, device: 512 };
        assert!(err.to_string().contains("1024"));
        assert!(err.to_string().contains("512"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::UnexpectedEof, "short read");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Config(_)));
    }
}
