//! Token verifier error taxonomy: certificate errors and verification
//! state-machine transition failures.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, VerifierError>;

#[derive(Debug, Error)]
pub enum VerifierError {
    #[error(transparent)]
    Core(#[from] ta_core::CoreError),

    #[error(transparent)]
    Connector(#[from] ta_connector::ConnectorError),

    #[error("JWT header malformed: {0}")]
    MalformedHeader(String),

    #[error("unsupported token-signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("JWKS fetch failed: {0}")]
    JwksFetch(String),

    #[error("no JWK found for kid {0}")]
    KeyNotFound(String),

    #[error("x5c certificate chain length {0} exceeds maximum of 10")]
    ChainTooLong(usize),

    #[error("DER parse failure: {0}")]
    DerParse(String),

    #[error("x5c chain is missing a recognizable leaf, intermediate, or root certificate")]
    ChainSortFailed,

    #[error("CRL download failed: {0}")]
    CrlDownload(String),

    #[error("CRL signature verification failed")]
    CrlSignatureInvalid,

    #[error("CRL has expired (NextUpdate in the past)")]
    CrlExpired,

    #[error("certificate with serial {0} is revoked")]
    CertificateRevoked(String),

    #[error("X.509 path verification failed: {0}")]
    PathVerificationFailed(String),

    #[error("JWT signature verification failed: {0}")]
    SignatureInvalid(String),
}
