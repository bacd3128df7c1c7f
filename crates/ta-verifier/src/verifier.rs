//! JWT/JWKS/X.509/CRL token verification state machine:
//!
//! `parsed -> header_ok -> jwk_located -> chain_sorted -> root_crl_ok ->
//!  leaf_crl_ok -> path_verified -> signature_verified`

use crate::chain::{self, SortedChain};
use crate::crl;
use crate::error::{Result, VerifierError};
use crate::jwks::{self, Jwk};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::de::DeserializeOwned;
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;

const SUPPORTED_ALGORITHMS: &[Algorithm] = &[Algorithm::RS256, Algorithm::PS384];

fn algorithm_from_header(alg: &str) -> Result<Algorithm> {
    match alg {
        "RS256" => Ok(Algorithm::RS256),
        "PS384" => Ok(Algorithm::PS384),
        other => Err(VerifierError::UnsupportedAlgorithm(other.to_string())),
    }
}

/// A verified ITA attestation token: claims plus the leaf certificate the
/// signature was checked against.
#[derive(Debug)]
pub struct VerifiedToken<C> {
    pub claims: C,
    pub leaf_serial_hex: String,
}

/// Verify a JWT against the given JWKS document, per the state-machine
/// stages above. `http_client` is used to download the root and leaf CRLs.
pub fn verify_token<C: DeserializeOwned>(
    token: &str,
    jwks_document: &serde_json::Value,
    http_client: &reqwest::blocking::Client,
) -> Result<VerifiedToken<C>> {
    // parsed
    let header = decode_header(token).map_err(|e| VerifierError::MalformedHeader(e.to_string()))?;

    // header_ok
    let kid = header
        .kid
        .ok_or_else(|| VerifierError::MalformedHeader("missing kid".to_string()))?;
    let alg = algorithm_from_header(
        match header.alg {
            Algorithm::RS256 => "RS256",
            Algorithm::PS384 => "PS384",
            _ => return Err(VerifierError::UnsupportedAlgorithm(format!("{:?}", header.alg))),
        },
    )?;
    if !SUPPORTED_ALGORITHMS.contains(&alg) {
        return Err(VerifierError::UnsupportedAlgorithm(format!("{alg:?}")));
    }

    // jwk_located
    let keys = jwks::parse_jwks(jwks_document)?;
    let jwk: &Jwk = jwks::find_key(&keys, &kid)?;
    let der_chain = jwks::decode_x5c(jwk)?;

    // chain_sorted
    let sorted: SortedChain<'_> = chain::sort_chain(&der_chain)?;

    let (_, root_cert) = X509Certificate::from_der(sorted.root_der)
        .map_err(|e: x509_parser::nom::Err<_>| VerifierError::DerParse(e.to_string()))?;
    let (_, leaf_cert) = X509Certificate::from_der(sorted.leaf_der)
        .map_err(|e: x509_parser::nom::Err<_>| VerifierError::DerParse(e.to_string()))?;

    let issuer_for_leaf_crl = sorted
        .intermediate_der
        .first()
        .copied()
        .unwrap_or(sorted.root_der);
    let (_, issuer_cert) = X509Certificate::from_der(issuer_for_leaf_crl)
        .map_err(|e: x509_parser::nom::Err<_>| VerifierError::DerParse(e.to_string()))?;

    // root_crl_ok: every intermediate is checked against the root's CRL.
    for intermediate_der in &sorted.intermediate_der {
        let (_, intermediate_cert) = X509Certificate::from_der(intermediate_der)
            .map_err(|e: x509_parser::nom::Err<_>| VerifierError::DerParse(e.to_string()))?;
        let root_crl = crl::fetch_crl(http_client, &intermediate_cert)?;
        crl::check_not_revoked(
            &root_crl,
            &root_cert,
            &intermediate_cert.raw_serial_as_string(),
        )?;
    }

    // leaf_crl_ok
    let leaf_crl = crl::fetch_crl(http_client, &leaf_cert)?;
    let leaf_serial_hex = leaf_cert.raw_serial_as_string();
    crl::check_not_revoked(&leaf_crl, &issuer_cert, &leaf_serial_hex)?;

    // path_verified
    chain::verify_path(&sorted)?;

    // signature_verified
    let decoding_key = DecodingKey::from_rsa_der(leaf_cert.public_key().raw);
    let mut validation = Validation::new(alg);
    validation.validate_exp = true;
    let data = decode::<C>(token, &decoding_key, &validation)
        .map_err(|e| VerifierError::SignatureInvalid(e.to_string()))?;

    Ok(VerifiedToken {
        claims: data.claims,
        leaf_serial_hex,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_token_rejected_before_jwks_fetch() {
        let client = crate::crl::new_http_client().unwrap();
        let document = serde_json::json!({"keys": []});
        let result = verify_token::<serde_json::Value>("not-a-jwt", &document, &client);
        assert!(matches!(result, Err(VerifierError::MalformedHeader(_))));
    }
}
