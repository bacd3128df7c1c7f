//! Evidence-collection error taxonomy, including the per-step failure
//! model of the Azure-TDX collector.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EvidenceError>;

#[derive(Debug, Error)]
pub enum EvidenceError {
    #[error(transparent)]
    Core(#[from] ta_core::CoreError),

    #[error(transparent)]
    Tpm(#[from] ta_tpm::TpmError),

    #[error("Azure TDX collector: NV define failed: {0}")]
    NvDefine(String),
    #[error("Azure TDX collector: NV write failed: {0}")]
    NvWrite(String),
    #[error("Azure TDX collector: NV read failed: {0}")]
    NvRead(String),

    #[error("Azure TDX runtime-data blob shorter than required fixed offsets")]
    RuntimeDataTruncated,

    #[error("Azure TDX runtime-data JSON decode failed: {0}")]
    RuntimeDataJson(#[from] serde_json::Error),

    #[error("Azure TDX runtime-data user-data mismatch: expected {expected}, got {got}")]
    RuntimeDataMismatch { expected: String, got: String },

    #[error("paravisor HTTP request failed: {0}")]
    ParavisorHttp(String),

    #[error("paravisor returned non-2xx status {status}: {body}")]
    ParavisorStatus { status: u16, body: String },

    #[error("paravisor response base64url decode failed: {0}")]
    ParavisorDecode(#[from] base64::DecodeError),

    #[error("no composite adapter was registered with the evidence builder")]
    NoAdapters,

    #[error("hardware DCAP support was not compiled in; rebuild with --features hardware-dcap")]
    DcapNotCompiledIn,

    #[error("hardware SEV-SNP support was not compiled in; rebuild with --features hardware-sev-snp")]
    SevSnpNotCompiledIn,

    #[error("DCAP quote generation failed: {0}")]
    DcapQuoteFailed(String),

    #[error("SEV-SNP guest request failed: {0}")]
    SevSnpRequestFailed(String),
}
