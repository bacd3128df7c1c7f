//! ITA REST connector: nonce, attest (v1/v2), AK provisioning, and
//! certificate retrieval, with exponential-backoff retry.

pub mod client;
pub mod error;

pub use client::{AkProvisioningRequest, AkProvisioningResponse, ItaClient, TokenRequest};
pub use error::{ConnectorError, Result};
