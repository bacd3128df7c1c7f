//! ITA attestation-token verification: JWKS lookup, x5c chain sorting,
//! CRL-based revocation checks, and JWT signature verification.

pub mod chain;
pub mod crl;
pub mod error;
pub mod jwks;
pub mod verifier;

pub use chain::SortedChain;
pub use error::{Result, VerifierError};
pub use jwks::Jwk;
pub use verifier::{verify_token, VerifiedToken};
