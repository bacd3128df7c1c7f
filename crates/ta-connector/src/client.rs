//! ITA REST connector: nonce retrieval, attest (v1/v2), AK provisioning,
//! and token-signing-certificate retrieval, with exponential-backoff retry.

use crate::error::{ConnectorError, Result};
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use ta_core::{RetryPolicy, TrustAuthorityConfig, VerifierNonce};

/// The `tokenRequest` body for legacy single-TEE attest.
#[derive(Debug, Clone, Serialize, Default)]
pub struct TokenRequest {
    #[serde(with = "ta_core::b64")]
    pub quote: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verifier_nonce: Option<VerifierNonce>,
    #[serde(skip_serializing_if = "Option::is_none", with = "ta_core::b64::opt")]
    pub runtime_data: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_ids: Option<Vec<uuid::Uuid>>,
    #[serde(skip_serializing_if = "Option::is_none", with = "ta_core::b64::opt")]
    pub event_log: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_signing_alg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_must_match: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

/// Input/output of `POST /ak-provisioning/v1/ak-certs`.
#[derive(Debug, Clone, Serialize)]
pub struct AkProvisioningRequest {
    #[serde(with = "ta_core::b64")]
    pub ek_certificate_der: Vec<u8>,
    #[serde(with = "ta_core::b64")]
    pub ak_tpmt_public: Vec<u8>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AkProvisioningResponse {
    #[serde(with = "ta_core::b64")]
    pub credential_blob: Vec<u8>,
    #[serde(with = "ta_core::b64")]
    pub secret: Vec<u8>,
    #[serde(with = "ta_core::b64")]
    pub encrypted_ak_cert_der: Vec<u8>,
}

/// ITA REST connector; a shared, reference-counted collaborator.
pub struct ItaClient {
    http: Client,
    config: TrustAuthorityConfig,
}

fn is_valid_request_id(id: &str) -> bool {
    if id.is_empty() || id.len() > 128 {
        return false;
    }
    id.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | ' ' | '/' | '.' | '-'))
}

impl ItaClient {
    pub fn new(config: TrustAuthorityConfig) -> Self {
        ItaClient {
            http: Client::new(),
            config,
        }
    }

    pub fn get_nonce(&self) -> Result<VerifierNonce> {
        let url = format!("{}/appraisal/v2/nonce", self.config.trustauthority_api_url);
        let nonce: VerifierNonce = self.send_with_retry(|| self.http.get(&url))?;
        tracing::info!("fetched verifier nonce");
        Ok(nonce)
    }

    pub fn attest_v1(&self, request: &TokenRequest) -> Result<String> {
        let url = format!("{}/appraisal/v1/attest", self.config.trustauthority_api_url);
        let resp: TokenResponse = self.send_with_retry(|| self.http.post(&url).json(request))?;
        tracing::info!("attest v1 succeeded");
        Ok(resp.token)
    }

    /// `cloud_provider` maps to the optional `/appraisal/v2/attest/<cloud_provider>`
    /// URL suffix: pass `None` for the bare composite endpoint, or e.g.
    /// `Some("azure")` to route TPM-only Azure attestation.
    pub fn attest_v2(&self, evidence: &Value, cloud_provider: Option<&str>) -> Result<String> {
        let mut url = format!("{}/appraisal/v2/attest", self.config.trustauthority_api_url);
        if let Some(provider) = cloud_provider {
            url.push('/');
            url.push_str(provider);
        }
        let resp: TokenResponse = self.send_with_retry(|| self.http.post(&url).json(evidence))?;
        tracing::info!(cloud_provider, "attest v2 succeeded");
        Ok(resp.token)
    }

    pub fn provision_ak(&self, request: &AkProvisioningRequest) -> Result<AkProvisioningResponse> {
        let url = format!(
            "{}/ak-provisioning/v1/ak-certs",
            self.config.trustauthority_api_url
        );
        let resp = self.send_with_retry(|| self.http.post(&url).json(request))?;
        tracing::info!("AK provisioning succeeded");
        Ok(resp)
    }

    pub fn get_jwks(&self) -> Result<Value> {
        let url = format!("{}/certs", self.config.trustauthority_url);
        let jwks = self.send_with_retry(|| self.http.get(&url))?;
        tracing::info!("fetched JWKS");
        Ok(jwks)
    }

    fn send_with_retry<T, F>(&self, build_request: F) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
        F: Fn() -> reqwest::blocking::RequestBuilder,
    {
        let policy = self.config.retry;
        let mut attempt = 0u32;

        loop {
            let mut request = build_request()
                .header("x-api-key", &self.config.trustauthority_api_key)
                .header("Accept", "application/json");
            if let Some(request_id) = &self.config.request_id {
                if !is_valid_request_id(request_id) {
                    return Err(ConnectorError::InvalidRequestId);
                }
                request = request.header("request-id", request_id);
            }

            let outcome = request.send();
            match self.classify(outcome) {
                Classification::Success(response) => {
                    return self.decode(response);
                }
                Classification::Retryable(err) => {
                    if attempt >= policy.max_retries {
                        return Err(ConnectorError::RetryExhausted {
                            attempts: attempt + 1,
                        });
                    }
                    tracing::warn!(attempt, %err, "retrying ITA request");
                    std::thread::sleep(policy.backoff_for_attempt(attempt));
                    attempt += 1;
                }
                Classification::Fatal(err) => return Err(err),
            }
        }
    }

    fn classify(&self, outcome: reqwest::Result<Response>) -> Classification {
        match outcome {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Classification::Success(response);
                }
                if RetryPolicy::is_retryable_status(status.as_u16()) {
                    return Classification::Retryable(ConnectorError::NonSuccessStatus {
                        status: status.as_u16(),
                        body: "(retryable status)".to_string(),
                    });
                }
                let body = response.text().unwrap_or_default();
                Classification::Fatal(ConnectorError::NonSuccessStatus {
                    status: status.as_u16(),
                    body,
                })
            }
            Err(e) => {
                if e.is_timeout() {
                    return Classification::Retryable(ConnectorError::DeadlineExceeded);
                }
                // the "service unavailable" string-match heuristic is
                // preserved bug-for-bug alongside the typed status check.
                if e.to_string().to_ascii_lowercase().contains("service unavailable") {
                    return Classification::Retryable(ConnectorError::Transport(e.to_string()));
                }
                Classification::Fatal(ConnectorError::Transport(e.to_string()))
            }
        }
    }

    fn decode<T: for<'de> Deserialize<'de>>(&self, response: Response) -> Result<T> {
        let status = response.status();
        let text = response
            .text()
            .map_err(|e| ConnectorError::Transport(e.to_string()))?;
        if status == StatusCode::NO_CONTENT || text.is_empty() {
            return serde_json::from_str("null").map_err(ConnectorError::from);
        }
        serde_json::from_str(&text).map_err(ConnectorError::from)
    }
}

enum Classification {
    Success(Response),
    Retryable(ConnectorError),
    Fatal(ConnectorError),
}

#[allow(dead_code)]
fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ta_core::RetryPolicy;

    fn test_config(api_url: String, base_url: String) -> TrustAuthorityConfig {
        TrustAuthorityConfig {
            trustauthority_url: base_url,
            trustauthority_api_url: api_url,
            trustauthority_api_key: "test-key".to_string(),
            retry: RetryPolicy {
                wait_min_ms: 1,
                wait_max_ms: 2,
                max_retries: 2,
            },
            request_id: None,
        }
    }

    #[test]
    fn get_nonce_parses_response() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/appraisal/v2/nonce")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"val":"AQID","iat":"BAUG","signature":"Bwg="}"#)
            .create();

        let client = ItaClient::new(test_config(server.url(), server.url()));
        let nonce = client.get_nonce().unwrap();
        mock.assert();
        assert_eq!(nonce.val, vec![1, 2, 3]);
    }

    #[test]
    fn attest_retries_on_503_then_succeeds() {
        let mut server = mockito::Server::new();
        let fail_mock = server
            .mock("POST", "/appraisal/v1/attest")
            .with_status(503)
            .expect(2)
            .create();
        let ok_mock = server
            .mock("POST", "/appraisal/v1/attest")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"token":"JWT"}"#)
            .create();

        let client = ItaClient::new(test_config(server.url(), server.url()));
        let token = client.attest_v1(&TokenRequest::default()).unwrap();

        fail_mock.assert();
        ok_mock.assert();
        assert_eq!(token, "JWT");
    }

    #[test]
    fn attest_fails_immediately_on_4xx() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/appraisal/v1/attest")
            .with_status(400)
            .with_body("bad request")
            .expect(1)
            .create();

        let client = ItaClient::new(test_config(server.url(), server.url()));
        let err = client.attest_v1(&TokenRequest::default()).unwrap_err();
        mock.assert();
        assert!(matches!(err, ConnectorError::NonSuccessStatus { status: 400, .. }));
    }

    #[test]
    fn attest_v2_appends_cloud_provider_suffix() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/appraisal/v2/attest/azure")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"token":"JWT"}"#)
            .create();

        let client = ItaClient::new(test_config(server.url(), server.url()));
        let token = client
            .attest_v2(&serde_json::json!({}), Some("azure"))
            .unwrap();
        mock.assert();
        assert_eq!(token, "JWT");
    }

    #[test]
    fn retry_exhausted_after_max_retries() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/appraisal/v2/nonce")
            .with_status(500)
            .expect(3) // initial attempt + 2 retries
            .create();

        let client = ItaClient::new(test_config(server.url(), server.url()));
        let err = client.get_nonce().unwrap_err();
        mock.assert();
        assert!(matches!(err, ConnectorError::RetryExhausted { attempts: 3 }));
    }

    #[test]
    fn invalid_request_id_rejected_before_sending() {
        let mut config = test_config("http://example.invalid".into(), "http://example.invalid".into());
        config.request_id = Some("bad\nid".to_string());
        let client = ItaClient::new(config);
        let err = client.get_nonce().unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidRequestId));
    }

    #[test]
    fn request_id_validation_accepts_and_rejects() {
        assert!(is_valid_request_id("abc_123 / .-"));
        assert!(!is_valid_request_id(""));
        assert!(!is_valid_request_id(&"a".repeat(129)));
        assert!(!is_valid_request_id("bad\nid"));
    }
}
