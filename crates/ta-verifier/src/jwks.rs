//! JWKS fetch and `kid`-based key lookup.

use crate::error::{Result, VerifierError};
use serde::Deserialize;
use serde_json::Value;

/// One entry of a JWKS `keys` array, carrying the `x5c` certificate chain
/// ITA publishes for its token-signing keys.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    pub kid: String,
    #[serde(default)]
    pub alg: Option<String>,
    #[serde(default)]
    pub x5c: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct JwksDocument {
    keys: Vec<Jwk>,
}

/// Parse a JWKS document fetched via `GET {base_url}/certs`.
pub fn parse_jwks(document: &Value) -> Result<Vec<Jwk>> {
    let parsed: JwksDocument = serde_json::from_value(document.clone())
        .map_err(|e| VerifierError::JwksFetch(format!("malformed JWKS document: {e}")))?;
    Ok(parsed.keys)
}

/// Locate the JWK matching `kid`.
pub fn find_key<'a>(keys: &'a [Jwk], kid: &str) -> Result<&'a Jwk> {
    keys.iter()
        .find(|k| k.kid == kid)
        .ok_or_else(|| VerifierError::KeyNotFound(kid.to_string()))
}

/// Decode a JWK's `x5c` entries (base64-standard, no line wrapping) into
/// raw DER certificate bytes, leaf-first as published.
pub fn decode_x5c(jwk: &Jwk) -> Result<Vec<Vec<u8>>> {
    use base64::Engine as _;
    let engine = base64::engine::general_purpose::STANDARD;
    jwk.x5c
        .iter()
        .map(|entry| {
            engine
                .decode(entry)
                .map_err(|e| VerifierError::DerParse(format!("x5c base64 decode: {e}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_jwks_extracts_keys() {
        let doc = serde_json::json!({
            "keys": [
                {"kid": "abc", "alg": "PS384", "x5c": ["Zm9v"]},
            ]
        });
        let keys = parse_jwks(&doc).unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].kid, "abc");
    }

    #[test]
    fn find_key_fails_for_unknown_kid() {
        let keys = vec![Jwk {
            kid: "a".to_string(),
            alg: None,
            x5c: vec![],
        }];
        assert!(matches!(
            find_key(&keys, "b"),
            Err(VerifierError::KeyNotFound(_))
        ));
    }

    #[test]
    fn decode_x5c_round_trips_base64() {
        let jwk = Jwk {
            kid: "a".to_string(),
            alg: None,
            x5c: vec!["Zm9v".to_string()],
        };
        let der = decode_x5c(&jwk).unwrap();
        assert_eq!(der[0], b"foo");
    }
}
