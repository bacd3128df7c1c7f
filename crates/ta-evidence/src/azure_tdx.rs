//! Azure-TDX evidence-collection state machine: couples a TDX report
//! with Azure's vTPM-produced runtime data via a shared NV index.

use crate::error::{EvidenceError, Result};
use crate::nonce::sha512_report_data;
use base64::Engine;
use serde::{Deserialize, Serialize};
use ta_core::{Handle, VerifierNonce};
use ta_tpm::TpmDevice;

const TD_REPORT_OFFSET: usize = 32;
const TD_REPORT_SIZE: usize = 1024;
const RUNTIME_DATA_SIZE_OFFSET: usize = 1232;
const RUNTIME_DATA_JSON_OFFSET: usize = 1236;

const NV_WRITE_INDEX: u32 = 0x0140_0002;
const NV_READ_INDEX: u32 = 0x0140_0001;
const NV_WRITE_SIZE: u16 = 64;

const DEFAULT_PARAVISOR_URL: &str = "http://169.254.169.254/acc/tdquote";

/// Runtime-data JSON as published by the Azure paravisor alongside a TD
/// report. Deserialization is strict: unknown fields are rejected so a
/// paravisor schema change surfaces immediately instead of being silently
/// ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct RuntimeData {
    pub user_data: String,
}

/// Azure-variant TDX evidence: the paravisor's signed quote alongside the
/// runtime-data JSON it vouches for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TdxEvidence {
    #[serde(with = "ta_core::b64")]
    pub quote: Vec<u8>,
    pub runtime_data: RuntimeData,
    #[serde(with = "ta_core::b64::opt")]
    pub user_data: Option<Vec<u8>>,
    pub verifier_nonce: Option<VerifierNonce>,
}

#[derive(Serialize)]
struct ParavisorRequest {
    report: String,
}

#[derive(Deserialize)]
struct ParavisorResponse {
    quote: String,
}

/// Collects Azure-TDX evidence through a TPM façade and the local paravisor.
pub struct AzureTdxCollector<'a> {
    device: &'a mut TpmDevice,
    paravisor_url: String,
    http: reqwest::blocking::Client,
}

impl<'a> AzureTdxCollector<'a> {
    pub fn new(device: &'a mut TpmDevice) -> Self {
        AzureTdxCollector {
            device,
            paravisor_url: DEFAULT_PARAVISOR_URL.to_string(),
            http: reqwest::blocking::Client::new(),
        }
    }

    /// Override the paravisor URL (used by tests against a mock server).
    pub fn with_paravisor_url(mut self, url: impl Into<String>) -> Self {
        self.paravisor_url = url.into();
        self
    }

    pub fn collect(
        &mut self,
        nonce: Option<&VerifierNonce>,
        user_data: Option<&[u8]>,
    ) -> Result<TdxEvidence> {
        let h = sha512_report_data(nonce, user_data);
        tracing::info!(digest_len = h.len(), "computed Azure TDX report-data hash");

        let write_handle = Handle::new(NV_WRITE_INDEX);
        let read_handle = Handle::new(NV_READ_INDEX);

        if !self.device.nv_exists(write_handle) {
            self.device
                .nv_define(write_handle, NV_WRITE_SIZE)
                .map_err(|e| EvidenceError::NvDefine(e.to_string()))?;
        }
        self.device
            .nv_write(write_handle, &h)
            .map_err(|e| EvidenceError::NvWrite(e.to_string()))?;
        tracing::info!("wrote report-data hash to NV index {write_handle}");

        let runtime_blob = self
            .device
            .nv_read(read_handle)
            .map_err(|e| EvidenceError::NvRead(e.to_string()))?;
        tracing::info!(len = runtime_blob.len(), "read runtime-data blob from NV index {read_handle}");

        let (td_report, runtime_data) = parse_runtime_blob(&runtime_blob)?;

        let expected_hex = hex::encode(&h);
        if !runtime_data.user_data.eq_ignore_ascii_case(&expected_hex) {
            return Err(EvidenceError::RuntimeDataMismatch {
                expected: expected_hex,
                got: runtime_data.user_data.clone(),
            });
        }

        let quote = self.fetch_quote(td_report)?;
        tracing::info!(quote_len = quote.len(), "fetched TD quote from paravisor");

        Ok(TdxEvidence {
            quote,
            runtime_data,
            user_data: user_data.map(|d| d.to_vec()),
            verifier_nonce: nonce.cloned(),
        })
    }

    fn fetch_quote(&self, td_report: &[u8]) -> Result<Vec<u8>> {
        let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let body = ParavisorRequest {
            report: engine.encode(td_report),
        };

        let response = self
            .http
            .post(&self.paravisor_url)
            .json(&body)
            .send()
            .map_err(|e| EvidenceError::ParavisorHttp(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(EvidenceError::ParavisorStatus {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ParavisorResponse = response
            .json()
            .map_err(|e| EvidenceError::ParavisorHttp(e.to_string()))?;
        Ok(engine.decode(parsed.quote)?)
    }
}

fn parse_runtime_blob(blob: &[u8]) -> Result<(&[u8], RuntimeData)> {
    if blob.len() < RUNTIME_DATA_JSON_OFFSET {
        return Err(EvidenceError::RuntimeDataTruncated);
    }
    let td_report_end = TD_REPORT_OFFSET + TD_REPORT_SIZE;
    if blob.len() < td_report_end {
        return Err(EvidenceError::RuntimeDataTruncated);
    }
    let td_report = &blob[TD_REPORT_OFFSET..td_report_end];

    let size = u32::from_le_bytes(
        blob[RUNTIME_DATA_SIZE_OFFSET..RUNTIME_DATA_SIZE_OFFSET + 4]
            .try_into()
            .unwrap(),
    ) as usize;
    let json_end = RUNTIME_DATA_JSON_OFFSET
        .checked_add(size)
        .filter(|&end| end <= blob.len())
        .ok_or(EvidenceError::RuntimeDataTruncated)?;
    let json_bytes = &blob[RUNTIME_DATA_JSON_OFFSET..json_end];

    let runtime_data: RuntimeData = serde_json::from_slice(json_bytes)?;
    Ok((td_report, runtime_data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ta_tpm::{TpmDevice, TpmKind};

    fn build_runtime_blob(user_data_hex: &str, extra_json: &str) -> Vec<u8> {
        let mut blob = vec![0u8; RUNTIME_DATA_JSON_OFFSET];
        let json = format!(r#"{{"user-data":"{user_data_hex}"{extra_json}}}"#);
        let json_bytes = json.as_bytes();
        blob[RUNTIME_DATA_SIZE_OFFSET..RUNTIME_DATA_SIZE_OFFSET + 4]
            .copy_from_slice(&(json_bytes.len() as u32).to_le_bytes());
        blob.extend_from_slice(json_bytes);
        blob
    }

    #[test]
    fn collect_rejects_runtime_data_mismatch() {
        let mut device = TpmDevice::open(TpmKind::Simulator, vec![]).unwrap();
        let blob = build_runtime_blob("deadbeef", "");
        device
            .nv_define(Handle::new(NV_READ_INDEX), blob.len() as u16)
            .unwrap();
        device.nv_write(Handle::new(NV_READ_INDEX), &blob).unwrap();

        let mut collector = AzureTdxCollector::new(&mut device);
        let err = collector.collect(None, Some(b"abc")).unwrap_err();
        assert!(matches!(err, EvidenceError::RuntimeDataMismatch { .. }));
    }

    #[test]
    fn collect_succeeds_against_mock_paravisor() {
        let nonce = VerifierNonce {
            val: vec![1u8; 32],
            iat: vec![2u8; 16],
            signature: vec![],
        };
        let h = sha512_report_data(Some(&nonce), Some(b"abc"));
        let expected_hex = hex::encode(&h);
        let blob = build_runtime_blob(&expected_hex, "");

        let mut device = TpmDevice::open(TpmKind::Simulator, vec![]).unwrap();
        device
            .nv_define(Handle::new(NV_READ_INDEX), blob.len() as u16)
            .unwrap();
        device.nv_write(Handle::new(NV_READ_INDEX), &blob).unwrap();

        let mut server = mockito::Server::new();
        let quote_b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(b"fake-quote");
        let mock = server
            .mock("POST", "/acc/tdquote")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(r#"{{"quote":"{quote_b64}"}}"#))
            .create();

        let mut collector =
            AzureTdxCollector::new(&mut device).with_paravisor_url(format!("{}/acc/tdquote", server.url()));
        let evidence = collector.collect(Some(&nonce), Some(b"abc")).unwrap();

        mock.assert();
        assert_eq!(evidence.quote, b"fake-quote");
        assert_eq!(evidence.runtime_data.user_data, expected_hex);
    }

    #[test]
    fn td_report_slice_has_correct_length() {
        let blob = build_runtime_blob("00", "");
        let (td_report, _) = parse_runtime_blob(&blob).unwrap();
        assert_eq!(td_report.len(), TD_REPORT_SIZE);
    }

    #[test]
    fn sha512_of_absent_inputs_matches_report_data_contract() {
        let h = sha512_report_data(None, None);
        assert_eq!(h, vec![0u8; 64]);
    }
}
