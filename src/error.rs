//! Error types for shardwire

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for shardwire
#[derive(Error, Debug)]
pub enum Error {
    // Field and matrix errors
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Matrix is singular")]
    Singular,

    #[error("Index {index} out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Division by zero in GF(2^8)")]
    DivideByZero,

    // Erasure coding errors
    #[error("Insufficient shards: {present} present, {required} required")]
    InsufficientShards { present: usize, required: usize },

    #[error("Shard geometry mismatch: {0}")]
    GeometryMismatch(String),

    #[error("Invalid erasure configuration: {0}")]
    InvalidErasureConfig(String),

    // Crypto errors
    #[error("Integrity tag mismatch: {0}")]
    IntegrityTagMismatch(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Decryption error: {0}")]
    Decryption(String),

    #[error("Key derivation error: {0}")]
    KeyDerivation(String),

    #[error("Invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    // Config errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // Transport errors
    #[error("Transport error: {0}")]
    Transport(String),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the caller can recover by waiting for more input.
    ///
    /// Only a shortage of shards is an expected state; everything else is
    /// either misuse or a rejected envelope.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::InsufficientShards { .. })
    }

    /// Whether this error is a security-relevant rejection of received data
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            Error::IntegrityTagMismatch(_) | Error::Decryption(_) | Error::GeometryMismatch(_)
        )
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_insufficient_shards_is_recoverable() {
        assert!(Error::InsufficientShards { present: 1, required: 3 }.is_recoverable());
        assert!(!Error::Singular.is_recoverable());
        assert!(!Error::DivideByZero.is_recoverable());
        assert!(!Error::IntegrityTagMismatch("outer".to_string()).is_recoverable());
    }

    #[test]
    fn test_authentication_failures() {
        assert!(Error::IntegrityTagMismatch("outer".to_string()).is_authentication_failure());
        assert!(Error::Decryption("bad tag".to_string()).is_authentication_failure());
        assert!(!Error::InsufficientShards { present: 1, required: 3 }.is_authentication_failure());
    }

    #[test]
    fn test_display() {
        let err = Error::IndexOutOfRange { index: 7, len: 4 };
        assert_eq!(err.to_string(), "Index 7 out of range for length 4");
    }
}
