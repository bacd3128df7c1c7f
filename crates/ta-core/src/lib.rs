//! Shared primitives for the Trust Authority client workspace.
//!
//! This crate has no knowledge of TPMs, TEEs, or HTTP — it holds the data
//! model, error taxonomy, configuration, and logging setup that
//! every other crate in the workspace (`ta-tpm`, `ta-evidence`,
//! `ta-connector`, `ta-verifier`) depends on.

pub mod b64;
pub mod config;
pub mod error;
pub mod fs;
pub mod logging;
pub mod types;

pub use config::TrustAuthorityConfig;
pub use error::{CoreError, Result};
pub use fs::read_file;
pub use types::{
    Handle, HandleDomain, HashAlg, PcrSelection, Quote, RetryPolicy, VerifierNonce,
    MAX_PCR_INDEX, NV_INDEX_MAX, NV_INDEX_MIN, PERSISTENT_HANDLE_MAX, PERSISTENT_HANDLE_MIN,
};
