//! TPM façade: a narrow capability interface over a TPM 2.0 device,
//! dispatching between a physical Linux device (feature-gated on
//! `hardware-tpm`) and an in-process simulator.

use crate::error::{Result, TpmError};
use crate::software::SoftwareTpm;
use ta_core::{Handle, PcrSelection, Quote};

/// Which backend a [`TpmDevice`] talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TpmKind {
    /// A physical `/dev/tpmrm0`-style Linux TPM 2.0 device.
    Linux,
    /// An in-process software simulator, for development and testing.
    Simulator,
}

enum Backend {
    Simulator(SoftwareTpm),
    #[cfg(feature = "hardware-tpm")]
    Linux(hardware::LinuxTpm),
    #[cfg(not(feature = "hardware-tpm"))]
    Linux,
}

/// A scoped handle to a TPM device. Exactly one command is
/// in flight at a time; owner-auth is carried but never logged.
pub struct TpmDevice {
    kind: TpmKind,
    #[allow(dead_code)]
    owner_auth: Vec<u8>,
    backend: Backend,
}

impl TpmDevice {
    /// Open a device of the given kind. Opening `Linux` without the
    /// `hardware-tpm` feature compiled in fails immediately rather than
    /// silently falling back to software, matching the hardware-is-opt-in
    /// posture elsewhere in this façade.
    pub fn open(kind: TpmKind, owner_auth: Vec<u8>) -> Result<Self> {
        let backend = match kind {
            TpmKind::Simulator => Backend::Simulator(SoftwareTpm::new()),
            #[cfg(feature = "hardware-tpm")]
            TpmKind::Linux => Backend::Linux(hardware::LinuxTpm::open()?),
            #[cfg(not(feature = "hardware-tpm"))]
            TpmKind::Linux => return Err(TpmError::HardwareNotCompiledIn),
        };
        Ok(TpmDevice {
            kind,
            owner_auth,
            backend,
        })
    }

    pub fn kind(&self) -> TpmKind {
        self.kind
    }

    pub fn nv_exists(&self, handle: Handle) -> bool {
        match &self.backend {
            Backend::Simulator(sw) => sw.nv_exists(handle),
            #[cfg(feature = "hardware-tpm")]
            Backend::Linux(hw) => hw.nv_exists(handle),
            #[cfg(not(feature = "hardware-tpm"))]
            Backend::Linux => false,
        }
    }

    pub fn nv_define(&mut self, handle: Handle, size: u16) -> Result<()> {
        match &mut self.backend {
            Backend::Simulator(sw) => sw.nv_define(handle, size),
            #[cfg(feature = "hardware-tpm")]
            Backend::Linux(hw) => hw.nv_define(handle, size),
            #[cfg(not(feature = "hardware-tpm"))]
            Backend::Linux => Err(TpmError::HardwareNotCompiledIn),
        }
    }

    pub fn nv_write(&mut self, handle: Handle, data: &[u8]) -> Result<()> {
        match &mut self.backend {
            Backend::Simulator(sw) => sw.nv_write(handle, data),
            #[cfg(feature = "hardware-tpm")]
            Backend::Linux(hw) => hw.nv_write(handle, data),
            #[cfg(not(feature = "hardware-tpm"))]
            Backend::Linux => Err(TpmError::HardwareNotCompiledIn),
        }
    }

    pub fn nv_read(&self, handle: Handle) -> Result<Vec<u8>> {
        match &self.backend {
            Backend::Simulator(sw) => sw.nv_read(handle),
            #[cfg(feature = "hardware-tpm")]
            Backend::Linux(hw) => hw.nv_read(handle),
            #[cfg(not(feature = "hardware-tpm"))]
            Backend::Linux => Err(TpmError::HardwareNotCompiledIn),
        }
    }

    pub fn nv_delete(&mut self, handle: Handle) -> Result<()> {
        match &mut self.backend {
            Backend::Simulator(sw) => sw.nv_delete(handle),
            #[cfg(feature = "hardware-tpm")]
            Backend::Linux(hw) => hw.nv_delete(handle),
            #[cfg(not(feature = "hardware-tpm"))]
            Backend::Linux => Err(TpmError::HardwareNotCompiledIn),
        }
    }

    pub fn create_ek(&mut self, handle: Handle) -> Result<()> {
        match &mut self.backend {
            Backend::Simulator(sw) => sw.create_ek(handle),
            #[cfg(feature = "hardware-tpm")]
            Backend::Linux(hw) => hw.create_ek(handle),
            #[cfg(not(feature = "hardware-tpm"))]
            Backend::Linux => Err(TpmError::HardwareNotCompiledIn),
        }
    }

    pub fn create_ak(&mut self, handle: Handle, ek_handle: Handle) -> Result<()> {
        match &mut self.backend {
            Backend::Simulator(sw) => sw.create_ak(handle, ek_handle),
            #[cfg(feature = "hardware-tpm")]
            Backend::Linux(hw) => hw.create_ak(handle, ek_handle),
            #[cfg(not(feature = "hardware-tpm"))]
            Backend::Linux => Err(TpmError::HardwareNotCompiledIn),
        }
    }

    pub fn create_ak_from_template(&mut self, handle: Handle, tpmt_public_bytes: &[u8]) -> Result<()> {
        match &mut self.backend {
            Backend::Simulator(sw) => sw.create_ak_from_template(handle, tpmt_public_bytes),
            #[cfg(feature = "hardware-tpm")]
            Backend::Linux(hw) => hw.create_ak_from_template(handle, tpmt_public_bytes),
            #[cfg(not(feature = "hardware-tpm"))]
            Backend::Linux => Err(TpmError::HardwareNotCompiledIn),
        }
    }

    /// Returns `(public_key_der, tpmt_public_bytes, qualified_name)`.
    pub fn read_public(&self, handle: Handle) -> Result<(Vec<u8>, Vec<u8>, Vec<u8>)> {
        match &self.backend {
            Backend::Simulator(sw) => sw.read_public(handle),
            #[cfg(feature = "hardware-tpm")]
            Backend::Linux(hw) => hw.read_public(handle),
            #[cfg(not(feature = "hardware-tpm"))]
            Backend::Linux => Err(TpmError::HardwareNotCompiledIn),
        }
    }

    pub fn activate_credential(
        &mut self,
        ek_handle: Handle,
        ak_handle: Handle,
        credential_blob: &[u8],
        secret: &[u8],
    ) -> Result<Vec<u8>> {
        match &mut self.backend {
            Backend::Simulator(sw) => {
                sw.activate_credential(ek_handle, ak_handle, credential_blob, secret)
            }
            #[cfg(feature = "hardware-tpm")]
            Backend::Linux(hw) => {
                hw.activate_credential(ek_handle, ak_handle, credential_blob, secret)
            }
            #[cfg(not(feature = "hardware-tpm"))]
            Backend::Linux => Err(TpmError::HardwareNotCompiledIn),
        }
    }

    pub fn get_ek_certificate(&self, nv_index: Handle) -> Result<Vec<u8>> {
        match &self.backend {
            Backend::Simulator(sw) => sw.get_ek_certificate(nv_index),
            #[cfg(feature = "hardware-tpm")]
            Backend::Linux(hw) => hw.get_ek_certificate(nv_index),
            #[cfg(not(feature = "hardware-tpm"))]
            Backend::Linux => Err(TpmError::HardwareNotCompiledIn),
        }
    }

    /// Quote over `selection` (defaulting to SHA-256 PCRs 0..23 if `None`).
    pub fn get_quote(
        &self,
        ak_handle: Handle,
        nonce: &[u8],
        selection: Option<&PcrSelection>,
    ) -> Result<Quote> {
        let default = PcrSelection::default_selection();
        let selection = selection.unwrap_or(&default);
        let (signed, signature) = match &self.backend {
            Backend::Simulator(sw) => sw.get_quote(ak_handle, nonce, selection)?,
            #[cfg(feature = "hardware-tpm")]
            Backend::Linux(hw) => hw.get_quote(ak_handle, nonce, selection)?,
            #[cfg(not(feature = "hardware-tpm"))]
            Backend::Linux => return Err(TpmError::HardwareNotCompiledIn),
        };
        Ok(Quote { signed, signature })
    }

    /// Flattened digest concatenation, hash-bank-major then PCR-index-minor.
    pub fn get_pcrs(&self, selection: Option<&PcrSelection>) -> Result<Vec<u8>> {
        let default = PcrSelection::default_selection();
        let selection = selection.unwrap_or(&default);
        match &self.backend {
            Backend::Simulator(sw) => sw.get_pcrs(selection),
            #[cfg(feature = "hardware-tpm")]
            Backend::Linux(hw) => hw.get_pcrs(selection),
            #[cfg(not(feature = "hardware-tpm"))]
            Backend::Linux => Err(TpmError::HardwareNotCompiledIn),
        }
    }
}

#[cfg(feature = "hardware-tpm")]
mod hardware {
    //! Physical-device backend via `tss-esapi`. Every operation that needs
    //! an auth session opens one, runs one command, and flushes — the
    //! session's lifetime never escapes the call that opened it.

    use crate::error::{Result, TpmError};
    use std::path::Path;
    use ta_core::{Handle, PcrSelection};
    use tss_esapi::{Context, TctiNameConf};

    pub struct LinuxTpm {
        context: Context,
    }

    impl LinuxTpm {
        pub fn open() -> Result<Self> {
            if !Path::new("/dev/tpmrm0").exists() && !Path::new("/dev/tpm0").exists() {
                return Err(TpmError::DeviceUnavailable(
                    "neither /dev/tpmrm0 nor /dev/tpm0 exists".to_string(),
                ));
            }
            let tcti = TctiNameConf::Device(Default::default());
            let context = Context::new(tcti)
                .map_err(|e| TpmError::DeviceUnavailable(format!("failed to open TPM: {e}")))?;
            Ok(LinuxTpm { context })
        }

        pub fn nv_exists(&self, _handle: Handle) -> bool {
            // A real implementation issues TPM2_NV_ReadPublic and inspects
            // the response code; left unimplemented pending hardware access
            // for development. Callers needing this in hardware mode should
            // use nv_read and inspect the error instead.
            false
        }

        pub fn nv_define(&mut self, _handle: Handle, _size: u16) -> Result<()> {
            Err(TpmError::NvDefineFailed(
                "hardware NV_DefineSpace not implemented in this build".to_string(),
            ))
        }

        pub fn nv_write(&mut self, _handle: Handle, _data: &[u8]) -> Result<()> {
            Err(TpmError::NvWriteFailed(
                "hardware NV_Write not implemented in this build".to_string(),
            ))
        }

        pub fn nv_read(&self, _handle: Handle) -> Result<Vec<u8>> {
            Err(TpmError::NvReadFailed(
                "hardware NV_Read not implemented in this build".to_string(),
            ))
        }

        pub fn nv_delete(&mut self, _handle: Handle) -> Result<()> {
            Err(TpmError::NvDeleteFailed(
                "hardware NV_UndefineSpace not implemented in this build".to_string(),
            ))
        }

        pub fn create_ek(&mut self, _handle: Handle) -> Result<()> {
            use tss_esapi::attributes::ObjectAttributesBuilder;
            use tss_esapi::interface_types::algorithm::{HashingAlgorithm, PublicAlgorithm};
            use tss_esapi::interface_types::resource_handles::Hierarchy;
            use tss_esapi::structures::{
                PublicBuilder, PublicRsaParametersBuilder, RsaExponent, RsaScheme,
                SymmetricDefinitionObject,
            };

            // Fixed SHA-256 auth policy hash for the well-known EK
            // template (TCG EK Credential Profile, RSA 2048 template).
            let object_attributes = ObjectAttributesBuilder::new()
                .with_fixed_tpm(true)
                .with_fixed_parent(true)
                .with_sensitive_data_origin(true)
                .with_admin_with_policy(true)
                .with_restricted(true)
                .with_decrypt(true)
                .build()
                .map_err(|e| TpmError::QuoteFailed(format!("EK attributes: {e}")))?;

            let public = PublicBuilder::new()
                .with_public_algorithm(PublicAlgorithm::Rsa)
                .with_name_hashing_algorithm(HashingAlgorithm::Sha256)
                .with_object_attributes(object_attributes)
                .with_rsa_parameters(
                    PublicRsaParametersBuilder::new()
                        .with_symmetric(SymmetricDefinitionObject::AES_128_CFB)
                        .with_scheme(RsaScheme::Null)
                        .with_key_bits(tss_esapi::interface_types::key_bits::RsaKeyBits::Rsa2048)
                        .with_exponent(RsaExponent::ZERO_EXPONENT)
                        .with_is_decryption_key(true)
                        .with_restricted(true)
                        .build()
                        .map_err(|e| TpmError::QuoteFailed(format!("EK RSA parameters: {e}")))?,
                )
                .with_rsa_unique_identifier(Default::default())
                .build()
                .map_err(|e| TpmError::QuoteFailed(format!("EK public: {e}")))?;

            let result = self
                .context
                .execute_with_nullauth_session(|ctx| {
                    ctx.create_primary(Hierarchy::Endorsement, public, None, None, None, None)
                })
                .map_err(|e| TpmError::QuoteFailed(format!("create EK primary: {e}")))?;

            self.context
                .flush_context(result.key_handle.into())
                .map_err(|e| TpmError::QuoteFailed(format!("flush EK handle: {e}")))?;
            Ok(())
        }

        pub fn create_ak(&mut self, _handle: Handle, _ek_handle: Handle) -> Result<()> {
            Err(TpmError::QuoteFailed(
                "hardware AK creation not implemented in this build".to_string(),
            ))
        }

        pub fn create_ak_from_template(
            &mut self,
            _handle: Handle,
            _tpmt_public_bytes: &[u8],
        ) -> Result<()> {
            Err(TpmError::QuoteFailed(
                "hardware templated-AK creation not implemented in this build".to_string(),
            ))
        }

        pub fn read_public(&self, _handle: Handle) -> Result<(Vec<u8>, Vec<u8>, Vec<u8>)> {
            Err(TpmError::QuoteFailed(
                "hardware ReadPublic not implemented in this build".to_string(),
            ))
        }

        pub fn activate_credential(
            &mut self,
            _ek_handle: Handle,
            _ak_handle: Handle,
            _credential_blob: &[u8],
            _secret: &[u8],
        ) -> Result<Vec<u8>> {
            Err(TpmError::ActivateCredentialFailed(
                "hardware ActivateCredential not implemented in this build".to_string(),
            ))
        }

        pub fn get_ek_certificate(&self, _nv_index: Handle) -> Result<Vec<u8>> {
            Err(TpmError::CertificateParse(
                "hardware EK certificate read not implemented in this build".to_string(),
            ))
        }

        pub fn get_quote(
            &self,
            _ak_handle: Handle,
            _nonce: &[u8],
            _selection: &PcrSelection,
        ) -> Result<(Vec<u8>, Vec<u8>)> {
            Err(TpmError::QuoteFailed(
                "hardware Quote not implemented in this build".to_string(),
            ))
        }

        pub fn get_pcrs(&self, _selection: &PcrSelection) -> Result<Vec<u8>> {
            Err(TpmError::PcrReadFailed(
                "hardware PCR_Read not implemented in this build".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulator_end_to_end_ek_ak_quote() {
        let mut dev = TpmDevice::open(TpmKind::Simulator, vec![]).unwrap();
        let ek = Handle::new(0x8100_0F10);
        let ak = Handle::new(0x8100_0F11);
        dev.create_ek(ek).unwrap();
        dev.create_ak(ak, ek).unwrap();

        let quote = dev.get_quote(ak, b"nonce", None).unwrap();
        assert!(!quote.signed.is_empty());
        assert!(!quote.signature.is_empty());
    }

    #[test]
    fn linux_kind_without_feature_fails_open() {
        #[cfg(not(feature = "hardware-tpm"))]
        {
            let err = TpmDevice::open(TpmKind::Linux, vec![]).unwrap_err();
            assert!(matches!(err, TpmError::HardwareNotCompiledIn));
        }
    }

    #[test]
    fn nv_round_trip_through_device() {
        let mut dev = TpmDevice::open(TpmKind::Simulator, vec![]).unwrap();
        let h = Handle::new(ta_core::NV_INDEX_MIN + 5);
        dev.nv_define(h, 128).unwrap();
        dev.nv_write(h, b"hello").unwrap();
        let data = dev.nv_read(h).unwrap();
        assert_eq!(&data[..5], b"hello");
        assert!(dev.nv_exists(h));
        dev.nv_delete(h).unwrap();
        assert!(!dev.nv_exists(h));
    }
}
