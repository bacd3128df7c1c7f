//! Evidence collection and composition: the Azure-TDX state
//! machine, per-TEE adapters, and the evidence builder.

pub mod adapters;
pub mod azure_tdx;
pub mod builder;
pub mod error;
pub mod nonce;

pub use adapters::{
    AzureTdxAdapter, CompositeEvidence, EvidenceKind, LegacyEvidence, LegacyEvidenceSource,
    SevSnpAdapter, SgxAdapter, TdxAdapter, TpmAdapter,
};
pub use azure_tdx::{AzureTdxCollector, RuntimeData, TdxEvidence};
pub use builder::{EvidenceBuilder, TokenSigningAlg};
pub use error::{EvidenceError, Result};
