//! Configuration for the Trust Authority client.
//!
//! No environment variable is part of the core contract — every value the
//! library needs is threaded through this struct, constructed by the
//! caller (CLI or otherwise).

use crate::error::{CoreError, Result};
use crate::types::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level client configuration, matching the recognized fields of
/// ITA's `config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustAuthorityConfig {
    /// Portal base URL, used for `/certs` (JWKS) lookups.
    pub trustauthority_url: String,
    /// API base URL, used for nonce/attest/ak-provisioning.
    pub trustauthority_api_url: String,
    /// Base64url-decodable opaque API key, sent as `x-api-key`.
    pub trustauthority_api_key: String,
    /// Retry policy for the REST connector; sensible defaults when omitted.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Default `request-id` header value when the caller does not supply one.
    #[serde(default)]
    pub request_id: Option<String>,
}

impl TrustAuthorityConfig {
    /// Load configuration from a JSON file on disk.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse configuration from an in-memory JSON document.
    pub fn from_json(content: &str) -> Result<Self> {
        let mut config: TrustAuthorityConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate required fields and URL schemes, normalizing both URLs in
    /// place by stripping any trailing slash.
    pub fn validate(&mut self) -> Result<()> {
        if self.trustauthority_api_key.trim().is_empty() {
            return Err(CoreError::Config(
                "trustauthority_api_key must not be empty".to_string(),
            ));
        }
        self.trustauthority_url = validate_https_url(&self.trustauthority_url)?;
        self.trustauthority_api_url = validate_https_url(&self.trustauthority_api_url)?;
        Ok(())
    }
}

/// Validate that `url` parses and uses the `https` scheme.
/// Returns the URL with any trailing slash stripped.
pub fn validate_https_url(url: &str) -> Result<String> {
    let parsed = url::Url::parse(url).map_err(|e| CoreError::InvalidUrl(e.to_string()))?;
    if parsed.scheme() != "https" {
        return Err(CoreError::InvalidUrl(format!(
            "scheme '{}' is not allowed; only https is permitted",
            parsed.scheme()
        )));
    }
    Ok(url.trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> String {
        serde_json::json!({
            "trustauthority_url": "https://portal.trustauthority.intel.com/",
            "trustauthority_api_url": "https://api.trustauthority.intel.com",
            "trustauthority_api_key": "dGVzdC1rZXk=",
        })
        .to_string()
    }

    #[test]
    fn parses_minimal_config() {
        let cfg = TrustAuthorityConfig::from_json(&sample_json()).unwrap();
        assert_eq!(cfg.trustauthority_api_key, "dGVzdC1rZXk=");
        assert_eq!(cfg.retry, RetryPolicy::default());
    }

    #[test]
    fn rejects_non_https_scheme() {
        let mut value: serde_json::Value = serde_json::from_str(&sample_json()).unwrap();
        value["trustauthority_url"] = serde_json::json!("http://portal.example.com");
        let result = TrustAuthorityConfig::from_json(&value.to_string());
        assert!(result.is_err());
    }

    #[test]
    fn rejects_empty_api_key() {
        let mut value: serde_json::Value = serde_json::from_str(&sample_json()).unwrap();
        value["trustauthority_api_key"] = serde_json::json!("");
        let result = TrustAuthorityConfig::from_json(&value.to_string());
        assert!(result.is_err());
    }

    #[test]
    fn strips_trailing_slash() {
        let stripped = validate_https_url("https://example.com/").unwrap();
        assert_eq!(stripped, "https://example.com");
    }

    #[test]
    fn from_json_strips_trailing_slashes_on_both_urls() {
        let mut value: serde_json::Value = serde_json::from_str(&sample_json()).unwrap();
        value["trustauthority_url"] = serde_json::json!("https://portal.example.com/");
        value["trustauthority_api_url"] = serde_json::json!("https://api.example.com/");
        let cfg = TrustAuthorityConfig::from_json(&value.to_string()).unwrap();
        assert_eq!(cfg.trustauthority_url, "https://portal.example.com");
        assert_eq!(cfg.trustauthority_api_url, "https://api.example.com");
    }
}
