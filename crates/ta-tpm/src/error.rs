//! TPM façade error taxonomy: handle errors and underlying TPM errors.

use thiserror::Error;

/// Result alias used throughout `ta-tpm`.
pub type Result<T> = std::result::Result<T, TpmError>;

#[derive(Debug, Error)]
pub enum TpmError {
    #[error(transparent)]
    Core(#[from] ta_core::CoreError),

    #[error("handle {0} already has an object defined")]
    ExistingHandle(ta_core::Handle),

    #[error("no NV index defined at handle {0}")]
    NvIndexAbsent(ta_core::Handle),

    #[error("invalid NV size: {0}")]
    NvInvalidSize(String),

    #[error("handle {0} does not exist")]
    HandleDoesNotExist(ta_core::Handle),

    #[error("quote generation failed: {0}")]
    QuoteFailed(String),

    #[error("PCR read failed: {0}")]
    PcrReadFailed(String),

    #[error("NV define failed: {0}")]
    NvDefineFailed(String),

    #[error("NV write failed: {0}")]
    NvWriteFailed(String),

    #[error("NV read failed: {0}")]
    NvReadFailed(String),

    #[error("NV delete failed: {0}")]
    NvDeleteFailed(String),

    #[error("ActivateCredential failed: {0}")]
    ActivateCredentialFailed(String),

    #[error("EK certificate parse failed: {0}")]
    CertificateParse(String),

    #[error("hardware TPM support was not compiled in; rebuild with --features hardware-tpm")]
    HardwareNotCompiledIn,

    #[error("TPM device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("event log parse error: {0}")]
    EventLog(String),
}
