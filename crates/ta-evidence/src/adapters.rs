//! Per-TEE evidence adapters: a capability interface rather than an
//! inheritance hierarchy.

use crate::azure_tdx::AzureTdxCollector;
use crate::error::{EvidenceError, Result};
use crate::nonce::{sha256_report_data, sha512_report_data};
use serde::Serialize;
use serde_json::Value;
use ta_core::{Handle, PcrSelection, VerifierNonce};
use ta_tpm::TpmDevice;

/// The legacy per-TEE tag carried in `Evidence.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EvidenceKind {
    Sgx,
    Tdx,
    AzTdx,
}

/// The pre-composite shape some callers still expect.
#[derive(Debug, Clone, Serialize)]
pub struct LegacyEvidence {
    #[serde(with = "ta_core::b64")]
    pub quote: Vec<u8>,
    #[serde(with = "ta_core::b64::opt")]
    pub user_data: Option<Vec<u8>>,
    #[serde(with = "ta_core::b64::opt")]
    pub event_log: Option<Vec<u8>>,
    #[serde(with = "ta_core::b64::opt")]
    pub runtime_data: Option<Vec<u8>>,
    #[serde(rename = "type")]
    pub kind: EvidenceKind,
}

/// The capability the evidence builder invokes: an opaque, JSON-serializable
/// evidence object keyed by a stable adapter identifier.
pub trait CompositeEvidence {
    fn identifier(&self) -> &'static str;
    fn get_evidence(&mut self, nonce: Option<&VerifierNonce>, user_data: Option<&[u8]>) -> Result<Value>;
}

/// Anything that can still produce the legacy single-TEE evidence shape.
pub trait LegacyEvidenceSource {
    fn collect_evidence(&mut self, nonce_bytes: &[u8]) -> Result<LegacyEvidence>;
}

/// TPM adapter: uses the façade and event-log filter directly.
pub struct TpmAdapter<'a> {
    device: &'a mut TpmDevice,
    ak_handle: Handle,
    ek_cert_nv: Option<Handle>,
    pcr_selection: PcrSelection,
    uefi_log: Option<Vec<u8>>,
    ima_log: Option<Vec<u8>>,
}

impl<'a> TpmAdapter<'a> {
    pub fn new(device: &'a mut TpmDevice, ak_handle: Handle) -> Self {
        TpmAdapter {
            device,
            ak_handle,
            ek_cert_nv: None,
            pcr_selection: PcrSelection::default_selection(),
            uefi_log: None,
            ima_log: None,
        }
    }

    pub fn with_ek_certificate_nv(mut self, handle: Handle) -> Self {
        self.ek_cert_nv = Some(handle);
        self
    }

    pub fn with_pcr_selection(mut self, selection: PcrSelection) -> Self {
        self.pcr_selection = selection;
        self
    }

    pub fn with_raw_uefi_log(mut self, log: Vec<u8>) -> Self {
        self.uefi_log = Some(log);
        self
    }

    pub fn with_ima_log(mut self, log: Vec<u8>) -> Self {
        self.ima_log = Some(log);
        self
    }
}

impl<'a> CompositeEvidence for TpmAdapter<'a> {
    fn identifier(&self) -> &'static str {
        "tpm"
    }

    fn get_evidence(&mut self, nonce: Option<&VerifierNonce>, user_data: Option<&[u8]>) -> Result<Value> {
        let report_data = sha256_report_data(nonce, user_data);
        let quote = self
            .device
            .get_quote(self.ak_handle, &report_data, Some(&self.pcr_selection))?;
        let pcrs = self.device.get_pcrs(Some(&self.pcr_selection))?;

        let filtered_uefi_log = self
            .uefi_log
            .as_ref()
            .map(|log| ta_tpm::filter_event_log(log, &self.pcr_selection))
            .transpose()?;

        let ak_cert = match self.ek_cert_nv {
            Some(handle) => Some(self.device.get_ek_certificate(handle)?),
            None => None,
        };

        tracing::info!(
            pcr_len = pcrs.len(),
            has_uefi_log = filtered_uefi_log.is_some(),
            "collected TPM composite evidence"
        );

        Ok(serde_json::json!({
            "quote": ta_core::b64::encode(&quote.signed),
            "signature": ta_core::b64::encode(&quote.signature),
            "pcrs": ta_core::b64::encode(&pcrs),
            "event_log": filtered_uefi_log.map(|b| ta_core::b64::encode(&b)),
            "ima_log": self.ima_log.as_ref().map(|b| ta_core::b64::encode(b)),
            "ak_certificate": ak_cert.map(|b| ta_core::b64::encode(&b)),
            "user_data": user_data.map(|b| ta_core::b64::encode(b)),
            "verifier_nonce": nonce,
        }))
    }
}

/// Azure-TDX adapter: thin wrapper over [`AzureTdxCollector`].
pub struct AzureTdxAdapter<'a> {
    device: &'a mut TpmDevice,
    paravisor_url: Option<String>,
}

impl<'a> AzureTdxAdapter<'a> {
    pub fn new(device: &'a mut TpmDevice) -> Self {
        AzureTdxAdapter {
            device,
            paravisor_url: None,
        }
    }

    pub fn with_paravisor_url(mut self, url: impl Into<String>) -> Self {
        self.paravisor_url = Some(url.into());
        self
    }
}

impl<'a> CompositeEvidence for AzureTdxAdapter<'a> {
    fn identifier(&self) -> &'static str {
        "aztdx"
    }

    fn get_evidence(&mut self, nonce: Option<&VerifierNonce>, user_data: Option<&[u8]>) -> Result<Value> {
        let mut collector = AzureTdxCollector::new(self.device);
        if let Some(url) = &self.paravisor_url {
            collector = collector.with_paravisor_url(url.clone());
        }
        let evidence = collector.collect(nonce, user_data)?;
        Ok(serde_json::to_value(evidence).expect("TdxEvidence always serializes"))
    }
}

/// SGX adapter via DCAP. The caller-provided report-data callback keeps the
/// ABI boundary with enclave code as a plain closure over the 64 report bytes.
pub struct SgxAdapter {
    report_callback: Box<dyn FnMut(&[u8; 64]) -> Result<Vec<u8>> + Send>,
}

impl SgxAdapter {
    pub fn new(report_callback: impl FnMut(&[u8; 64]) -> Result<Vec<u8>> + Send + 'static) -> Self {
        SgxAdapter {
            report_callback: Box::new(report_callback),
        }
    }
}

impl CompositeEvidence for SgxAdapter {
    fn identifier(&self) -> &'static str {
        "sgx"
    }

    fn get_evidence(&mut self, nonce: Option<&VerifierNonce>, user_data: Option<&[u8]>) -> Result<Value> {
        let report_data = sha512_report_data(nonce, user_data);
        let mut fixed = [0u8; 64];
        fixed.copy_from_slice(&report_data);

        let quote = (self.report_callback)(&fixed)?;
        tracing::info!(quote_len = quote.len(), "collected SGX DCAP quote");

        Ok(serde_json::json!({
            "quote": ta_core::b64::encode(&quote),
            "user_data": user_data.map(|b| ta_core::b64::encode(b)),
            "verifier_nonce": nonce,
        }))
    }
}

#[cfg(feature = "hardware-dcap")]
pub fn dcap_report_callback(report_data: &[u8; 64]) -> Result<Vec<u8>> {
    dcap_ql::target_info()
        .and_then(|ti| dcap_ql::ecdsa_quote(&ti, report_data))
        .map_err(|e| EvidenceError::DcapQuoteFailed(e.to_string()))
}

#[cfg(not(feature = "hardware-dcap"))]
pub fn dcap_report_callback(_report_data: &[u8; 64]) -> Result<Vec<u8>> {
    Err(EvidenceError::DcapNotCompiledIn)
}

/// Native (non-Azure) TDX adapter via DCAP.
pub struct TdxAdapter;

impl CompositeEvidence for TdxAdapter {
    fn identifier(&self) -> &'static str {
        "tdx"
    }

    fn get_evidence(&mut self, nonce: Option<&VerifierNonce>, user_data: Option<&[u8]>) -> Result<Value> {
        let report_data = sha512_report_data(nonce, user_data);
        let mut fixed = [0u8; 64];
        fixed.copy_from_slice(&report_data);
        let quote = dcap_report_callback(&fixed)?;

        Ok(serde_json::json!({
            "quote": ta_core::b64::encode(&quote),
            "user_data": user_data.map(|b| ta_core::b64::encode(b)),
            "verifier_nonce": nonce,
        }))
    }
}

/// AMD SEV-SNP adapter: configfs-tsm when available, else ioctl
/// `SEV_SNP_GUEST_MSG_REPORT` on `/dev/sev-guest` with `msg_version=1`,
/// VMPL 0.
pub struct SevSnpAdapter;

impl CompositeEvidence for SevSnpAdapter {
    fn identifier(&self) -> &'static str {
        "sevsnp"
    }

    fn get_evidence(&mut self, nonce: Option<&VerifierNonce>, user_data: Option<&[u8]>) -> Result<Value> {
        let report_data = sha512_report_data(nonce, user_data);
        let mut fixed = [0u8; 64];
        fixed.copy_from_slice(&report_data);
        let report = sev_snp::get_report(&fixed)?;

        Ok(serde_json::json!({
            "quote": ta_core::b64::encode(&report),
            "user_data": user_data.map(|b| ta_core::b64::encode(b)),
            "verifier_nonce": nonce,
        }))
    }
}

mod sev_snp {
    use super::{EvidenceError, Result};

    const VMPL: u8 = 0;
    const MSG_VERSION: u8 = 1;

    #[cfg(feature = "hardware-sev-snp")]
    pub fn get_report(report_data: &[u8; 64]) -> Result<Vec<u8>> {
        use std::fs::OpenOptions;
        use std::os::unix::io::AsRawFd;

        if std::path::Path::new("/sys/kernel/config/tsm/report").exists() {
            return Err(EvidenceError::SevSnpRequestFailed(
                "configfs-tsm path selected but not implemented in this build".to_string(),
            ));
        }

        let device = OpenOptions::new()
            .read(true)
            .write(true)
            .open("/dev/sev-guest")
            .map_err(|e| EvidenceError::SevSnpRequestFailed(format!("open /dev/sev-guest: {e}")))?;

        #[repr(C)]
        struct SnpReportReq {
            report_data: [u8; 64],
            vmpl: u32,
            reserved: [u8; 28],
        }
        #[repr(C)]
        struct SnpGuestRequestIoctl {
            msg_version: u8,
            req_data: u64,
            resp_data: u64,
            fw_error: u64,
        }

        let req = SnpReportReq {
            report_data: *report_data,
            vmpl: VMPL as u32,
            reserved: [0u8; 28],
        };
        let mut resp = vec![0u8; 4000];
        let ioctl_arg = SnpGuestRequestIoctl {
            msg_version: MSG_VERSION,
            req_data: &req as *const _ as u64,
            resp_data: resp.as_mut_ptr() as u64,
            fw_error: 0,
        };

        const SEV_GUEST_IOC_TYPE: u8 = b'S';
        const SNP_GET_REPORT_NR: u8 = 0x0;
        nix::ioctl_readwrite!(snp_get_report, SEV_GUEST_IOC_TYPE, SNP_GET_REPORT_NR, SnpGuestRequestIoctl);
        unsafe {
            snp_get_report(device.as_raw_fd(), &ioctl_arg as *const _ as *mut _)
                .map_err(|e| EvidenceError::SevSnpRequestFailed(format!("ioctl failed: {e}")))?;
        }

        Ok(resp)
    }

    #[cfg(not(feature = "hardware-sev-snp"))]
    pub fn get_report(_report_data: &[u8; 64]) -> Result<Vec<u8>> {
        Err(EvidenceError::SevSnpNotCompiledIn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ta_tpm::TpmKind;

    #[test]
    fn tpm_adapter_identifier_is_stable() {
        let mut device = TpmDevice::open(TpmKind::Simulator, vec![]).unwrap();
        let ek = Handle::new(0x8100_0F20);
        let ak = Handle::new(0x8100_0F21);
        device.create_ek(ek).unwrap();
        device.create_ak(ak, ek).unwrap();

        let adapter = TpmAdapter::new(&mut device, ak);
        assert_eq!(adapter.identifier(), "tpm");
    }

    #[test]
    fn tpm_adapter_get_evidence_embeds_quote_and_pcrs() {
        let mut device = TpmDevice::open(TpmKind::Simulator, vec![]).unwrap();
        let ek = Handle::new(0x8100_0F22);
        let ak = Handle::new(0x8100_0F23);
        device.create_ek(ek).unwrap();
        device.create_ak(ak, ek).unwrap();

        let mut adapter = TpmAdapter::new(&mut device, ak);
        let evidence = adapter.get_evidence(None, Some(b"payload")).unwrap();
        assert!(evidence["quote"].is_string());
        assert!(evidence["pcrs"].is_string());
    }

    #[test]
    fn sgx_adapter_invokes_report_callback_with_64_byte_buffer() {
        let mut adapter = SgxAdapter::new(|data| {
            assert_eq!(data.len(), 64);
            Ok(b"quote-bytes".to_vec())
        });
        let evidence = adapter.get_evidence(None, Some(b"x")).unwrap();
        assert!(evidence["quote"].is_string());
    }

    #[test]
    fn dcap_adapters_fail_without_hardware_feature() {
        #[cfg(not(feature = "hardware-dcap"))]
        {
            let mut adapter = TdxAdapter;
            let err = adapter.get_evidence(None, None).unwrap_err();
            assert!(matches!(err, EvidenceError::DcapNotCompiledIn));
        }
    }

    #[test]
    fn sev_snp_adapter_fails_without_hardware_feature() {
        #[cfg(not(feature = "hardware-sev-snp"))]
        {
            let mut adapter = SevSnpAdapter;
            let err = adapter.get_evidence(None, None).unwrap_err();
            assert!(matches!(err, EvidenceError::SevSnpNotCompiledIn));
        }
    }
}
