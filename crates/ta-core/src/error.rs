//! Shared error taxonomy for the Trust Authority client.
//!
//! Individual crates (`ta-tpm`, `ta-evidence`, `ta-connector`, `ta-verifier`)
//! define their own `thiserror` enums for domain-specific failures and wrap
//! this crate's [`CoreError`] via `#[from]` where a shared failure (bad
//! handle range, malformed config, I/O) can originate below them.

use thiserror::Error;

/// Result alias used throughout `ta-core`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors shared across every Trust Authority client crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A 32-bit handle fell outside every recognized TPM handle range.
    #[error("handle {0:#010x} is out of range for this operation")]
    HandleOutOfRange(u32),

    /// A handle exists but does not belong to the domain the caller expected
    /// (e.g. an NV index handed to a persistent-object operation).
    #[error("handle {0:#010x} is not valid for this operation")]
    InvalidHandle(u32),

    /// A PCR selection string failed to parse.
    #[error("invalid PCR selection string: {0}")]
    InvalidPcrSelection(String),

    /// Malformed or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Base64 decoding failed.
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O failure reading configuration or other local files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A supplied URL did not parse, or used a disallowed scheme.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// A file path contained a `..` component.
    #[error("path traversal rejected: {0}")]
    PathTraversal(String),

    /// A file path resolved to (or through) a symbolic link.
    #[error("symlink rejected: {0}")]
    SymlinkNotAllowed(String),
}
