#![forbid(unsafe_code)]

//! Error types for cart and session-storage operations.
//!
//! Every failure here is non-fatal to the host page: cart errors are
//! logged and the operation abandoned, storage errors degrade to default
//! state. Nothing is surfaced to the end user beyond what the host chooses
//! to render.

use std::fmt;

/// Errors from the external cart API.
#[derive(Debug)]
pub enum CartError {
    /// Transport-level failure (connect, timeout, TLS).
    Network(String),
    /// Non-success HTTP status.
    Status(u16),
    /// Response body did not decode as the expected shape.
    Decode(String),
    /// No cart API is configured (headless/test operation).
    Unavailable(String),
}

impl fmt::Display for CartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CartError::Network(reason) => write!(f, "cart network error: {reason}"),
            CartError::Status(code) => write!(f, "cart API returned status {code}"),
            CartError::Decode(reason) => write!(f, "cart response decode error: {reason}"),
            CartError::Unavailable(reason) => write!(f, "cart API unavailable: {reason}"),
        }
    }
}

impl std::error::Error for CartError {}

/// Result type for cart operations.
pub type CartResult<T> = Result<T, CartError>;

/// Errors from session-scoped storage.
#[derive(Debug)]
pub enum StorageError {
    /// I/O failure in a file-backed store.
    Io(std::io::Error),
    /// JSON encode/decode failure for a record.
    Serialization(String),
    /// Stored data is present but unusable.
    Corruption(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Io(e) => write!(f, "I/O error: {e}"),
            StorageError::Serialization(msg) => write!(f, "serialization error: {msg}"),
            StorageError::Corruption(msg) => write!(f, "storage corruption: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e)
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
