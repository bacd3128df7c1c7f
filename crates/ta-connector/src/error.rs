//! ITA REST connector error taxonomy.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConnectorError>;

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error(transparent)]
    Core(#[from] ta_core::CoreError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    DeadlineExceeded,

    #[error("ITA returned status {status}: {body}")]
    NonSuccessStatus { status: u16, body: String },

    #[error("response JSON decode failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("retries exhausted after {attempts} attempts")]
    RetryExhausted { attempts: u32 },

    #[error("invalid request-id: must match ^[A-Za-z0-9_ /.-]{{1,128}}$")]
    InvalidRequestId,
}
