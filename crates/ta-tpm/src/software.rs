//! In-process TPM simulator backend (`TpmKind::Simulator`).
//!
//! Stands in for a physical device during development and testing: an
//! in-memory NV store and object table, real RSA keys, and a quote scheme
//! that genuinely verifies (RSA-PSS/SHA-256), so property and E2E tests can
//! exercise the façade end to end without hardware.

use crate::credential;
use crate::error::{Result, TpmError};
use rsa::pkcs8::EncodePublicKey;
use rsa::{Pss, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use ta_core::{Handle, HandleDomain, PcrSelection};

const MAX_NV_SIZE: usize = 8 * 1024;
const RSA_KEY_BITS: usize = 2048;

struct NvSlot {
    size: u16,
    data: Vec<u8>,
}

enum Object {
    Ek {
        private: RsaPrivateKey,
        public: RsaPublicKey,
    },
    Ak {
        private: RsaPrivateKey,
        public: RsaPublicKey,
        #[allow(dead_code)]
        parent: Handle,
    },
}

impl Object {
    fn public_key(&self) -> &RsaPublicKey {
        match self {
            Object::Ek { public, .. } => public,
            Object::Ak { public, .. } => public,
        }
    }
}

/// Software-only TPM simulator: everything the façade needs, held in memory.
pub struct SoftwareTpm {
    nv: HashMap<u32, NvSlot>,
    objects: HashMap<u32, Object>,
    pcrs: HashMap<(ta_core::HashAlg, u8), Vec<u8>>,
}

impl SoftwareTpm {
    pub fn new() -> Self {
        SoftwareTpm {
            nv: HashMap::new(),
            objects: HashMap::new(),
            pcrs: HashMap::new(),
        }
    }

    pub fn nv_exists(&self, handle: Handle) -> bool {
        self.nv.contains_key(&handle.raw())
    }

    pub fn nv_define(&mut self, handle: Handle, size: u16) -> Result<()> {
        handle.require_domain(HandleDomain::NvIndex)?;
        if self.nv_exists(handle) {
            return Err(TpmError::ExistingHandle(handle));
        }
        if size == 0 || size as usize > MAX_NV_SIZE {
            return Err(TpmError::NvInvalidSize(format!(
                "size {size} outside (0, {MAX_NV_SIZE}]"
            )));
        }
        self.nv.insert(
            handle.raw(),
            NvSlot {
                size,
                data: vec![0u8; size as usize],
            },
        );
        Ok(())
    }

    pub fn nv_write(&mut self, handle: Handle, data: &[u8]) -> Result<()> {
        handle.require_domain(HandleDomain::NvIndex)?;
        if data.is_empty() || data.len() > MAX_NV_SIZE {
            return Err(TpmError::NvInvalidSize(format!(
                "len {} outside (0, {MAX_NV_SIZE}]",
                data.len()
            )));
        }
        let slot = self
            .nv
            .get_mut(&handle.raw())
            .ok_or(TpmError::NvIndexAbsent(handle))?;
        if data.len() > slot.size as usize {
            return Err(TpmError::NvInvalidSize(format!(
                "write of {} bytes exceeds defined size {}",
                data.len(),
                slot.size
            )));
        }
        slot.data[..data.len()].copy_from_slice(data);
        Ok(())
    }

    pub fn nv_read(&self, handle: Handle) -> Result<Vec<u8>> {
        handle.require_domain(HandleDomain::NvIndex)?;
        let slot = self
            .nv
            .get(&handle.raw())
            .ok_or(TpmError::NvIndexAbsent(handle))?;
        Ok(slot.data.clone())
    }

    pub fn nv_delete(&mut self, handle: Handle) -> Result<()> {
        handle.require_domain(HandleDomain::NvIndex)?;
        self.nv.remove(&handle.raw());
        Ok(())
    }

    pub fn create_ek(&mut self, handle: Handle) -> Result<()> {
        handle.require_domain(HandleDomain::Persistent)?;
        if self.objects.contains_key(&handle.raw()) {
            return Err(TpmError::ExistingHandle(handle));
        }
        let mut rng = rand::thread_rng();
        let private = RsaPrivateKey::new(&mut rng, RSA_KEY_BITS)
            .map_err(|e| TpmError::QuoteFailed(format!("EK keygen failed: {e}")))?;
        let public = RsaPublicKey::from(&private);
        self.objects
            .insert(handle.raw(), Object::Ek { private, public });
        Ok(())
    }

    pub fn create_ak(&mut self, handle: Handle, ek_handle: Handle) -> Result<()> {
        handle.require_domain(HandleDomain::Persistent)?;
        if self.objects.contains_key(&handle.raw()) {
            return Err(TpmError::ExistingHandle(handle));
        }
        match self.objects.get(&ek_handle.raw()) {
            Some(Object::Ek { .. }) => {}
            Some(_) => return Err(TpmError::HandleDoesNotExist(ek_handle)),
            None => return Err(TpmError::HandleDoesNotExist(ek_handle)),
        }
        let mut rng = rand::thread_rng();
        let private = RsaPrivateKey::new(&mut rng, RSA_KEY_BITS)
            .map_err(|e| TpmError::QuoteFailed(format!("AK keygen failed: {e}")))?;
        let public = RsaPublicKey::from(&private);
        self.objects.insert(
            handle.raw(),
            Object::Ak {
                private,
                public,
                parent: ek_handle,
            },
        );
        Ok(())
    }

    pub fn create_ak_from_template(&mut self, handle: Handle, tpmt_public_bytes: &[u8]) -> Result<()> {
        handle.require_domain(HandleDomain::Persistent)?;
        if self.objects.contains_key(&handle.raw()) {
            return Err(TpmError::ExistingHandle(handle));
        }
        // A real TPMT_PUBLIC carries RSA modulus/exponent; this simulator
        // only needs a deterministic keypair derived from the template so
        // re-provisioning with the same template is idempotent in content
        // (not handle occupancy, which is still guarded above).
        let seed = Sha256::digest(tpmt_public_bytes);
        let mut rng = DeterministicRng::from_seed(seed.into());
        let private = RsaPrivateKey::new(&mut rng, RSA_KEY_BITS)
            .map_err(|e| TpmError::QuoteFailed(format!("templated AK keygen failed: {e}")))?;
        let public = RsaPublicKey::from(&private);
        self.objects.insert(
            handle.raw(),
            Object::Ak {
                private,
                public,
                parent: handle,
            },
        );
        Ok(())
    }

    pub fn read_public(&self, handle: Handle) -> Result<(Vec<u8>, Vec<u8>, Vec<u8>)> {
        let object = self
            .objects
            .get(&handle.raw())
            .ok_or(TpmError::HandleDoesNotExist(handle))?;
        let der = object
            .public_key()
            .to_public_key_der()
            .map_err(|e| TpmError::QuoteFailed(format!("DER encode failed: {e}")))?
            .into_vec();
        let qualified_name = credential::object_name(&der);
        // `tpmt_public_bytes` stands in for a marshaled TPMT_PUBLIC; callers
        // only ever round-trip it back through this façade (e.g. to
        // `create_ak_from_template`), so the DER encoding is sufficient.
        Ok((der.clone(), der, qualified_name))
    }

    pub fn activate_credential(
        &self,
        ek_handle: Handle,
        ak_handle: Handle,
        credential_blob: &[u8],
        secret: &[u8],
    ) -> Result<Vec<u8>> {
        let ek_private = match self.objects.get(&ek_handle.raw()) {
            Some(Object::Ek { private, .. }) => private,
            _ => return Err(TpmError::HandleDoesNotExist(ek_handle)),
        };
        let ak_public = self
            .objects
            .get(&ak_handle.raw())
            .ok_or(TpmError::HandleDoesNotExist(ak_handle))?
            .public_key();
        let ak_der = ak_public
            .to_public_key_der()
            .map_err(|e| TpmError::ActivateCredentialFailed(e.to_string()))?
            .into_vec();
        let ak_name = credential::object_name(&ak_der);

        credential::activate_credential(ek_private, &ak_name, credential_blob, secret)
            .map_err(TpmError::ActivateCredentialFailed)
    }

    pub fn get_ek_certificate(&self, nv_index: Handle) -> Result<Vec<u8>> {
        let raw = self.nv_read(nv_index)?;
        der_sequence_slice(&raw)
            .ok_or_else(|| TpmError::CertificateParse("not a well-formed DER SEQUENCE".to_string()))
            .map(|len| raw[..len].to_vec())
    }

    pub fn get_quote(
        &self,
        ak_handle: Handle,
        nonce: &[u8],
        selection: &PcrSelection,
    ) -> Result<(Vec<u8>, Vec<u8>)> {
        let (private, public) = match self.objects.get(&ak_handle.raw()) {
            Some(Object::Ak { private, public, .. }) => (private, public),
            _ => return Err(TpmError::HandleDoesNotExist(ak_handle)),
        };
        let _ = public;
        let pcr_digest = self.pcr_digest(selection);

        // TPMS_ATTEST stand-in: magic || pcrDigest || nonce, length-prefixed.
        let mut signed = Vec::new();
        signed.extend_from_slice(b"TPMS_ATTEST_QUOTE");
        signed.extend_from_slice(&(pcr_digest.len() as u32).to_be_bytes());
        signed.extend_from_slice(&pcr_digest);
        signed.extend_from_slice(&(nonce.len() as u32).to_be_bytes());
        signed.extend_from_slice(nonce);

        let digest = Sha256::digest(&signed);
        let mut rng = rand::thread_rng();
        let signature = private
            .sign_with_rng(&mut rng, Pss::new::<Sha256>(), &digest)
            .map_err(|e| TpmError::QuoteFailed(e.to_string()))?;
        Ok((signed, signature))
    }

    /// Verify a quote produced by [`Self::get_quote`]. Exposed so callers
    /// (and tests) can check signatures without re-deriving the scheme.
    pub fn verify_quote(ak_public_der: &[u8], signed: &[u8], signature: &[u8]) -> Result<bool> {
        use rsa::pkcs8::DecodePublicKey;
        let public = RsaPublicKey::from_public_key_der(ak_public_der)
            .map_err(|e| TpmError::QuoteFailed(e.to_string()))?;
        let digest = Sha256::digest(signed);
        Ok(public
            .verify(Pss::new::<Sha256>(), &digest, signature)
            .is_ok())
    }

    fn pcr_digest(&self, selection: &PcrSelection) -> Vec<u8> {
        let mut hasher = Sha256::new();
        for (alg, indices) in selection.banks() {
            for idx in indices {
                let value = self
                    .pcrs
                    .get(&(*alg, *idx))
                    .cloned()
                    .unwrap_or_else(|| vec![0u8; alg.digest_size()]);
                hasher.update(&value);
            }
        }
        hasher.finalize().to_vec()
    }

    pub fn get_pcrs(&self, selection: &PcrSelection) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for (alg, indices) in selection.banks() {
            for idx in indices {
                let value = self
                    .pcrs
                    .get(&(*alg, *idx))
                    .cloned()
                    .unwrap_or_else(|| vec![0u8; alg.digest_size()]);
                out.extend_from_slice(&value);
            }
        }
        Ok(out)
    }
}

impl Default for SoftwareTpm {
    fn default() -> Self {
        Self::new()
    }
}

fn der_sequence_slice(bytes: &[u8]) -> Option<usize> {
    if bytes.len() < 2 || bytes[0] != 0x30 {
        return None;
    }
    let len_byte = bytes[1];
    if len_byte & 0x80 == 0 {
        let content_len = len_byte as usize;
        let total = 2 + content_len;
        (total <= bytes.len()).then_some(total)
    } else {
        let num_octets = (len_byte & 0x7F) as usize;
        if num_octets == 0 || num_octets > 4 || bytes.len() < 2 + num_octets {
            return None;
        }
        let mut content_len = 0usize;
        for b in &bytes[2..2 + num_octets] {
            content_len = (content_len << 8) | *b as usize;
        }
        let total = 2 + num_octets + content_len;
        (total <= bytes.len()).then_some(total)
    }
}

/// Minimal seeded RNG so templated AK derivation is a pure function of the
/// template bytes. Not cryptographically independent across calls with
/// related seeds; only used for the software simulator's determinism.
struct DeterministicRng {
    state: [u8; 32],
    counter: u64,
}

impl DeterministicRng {
    fn from_seed(seed: [u8; 32]) -> Self {
        DeterministicRng { state: seed, counter: 0 }
    }
}

impl rand::RngCore for DeterministicRng {
    fn next_u32(&mut self) -> u32 {
        let mut buf = [0u8; 4];
        self.fill_bytes(&mut buf);
        u32::from_le_bytes(buf)
    }

    fn next_u64(&mut self) -> u64 {
        let mut buf = [0u8; 8];
        self.fill_bytes(&mut buf);
        u64::from_le_bytes(buf)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        let mut offset = 0;
        while offset < dest.len() {
            let mut hasher = Sha256::new();
            hasher.update(self.state);
            hasher.update(self.counter.to_be_bytes());
            self.counter += 1;
            let block = hasher.finalize();
            let n = (dest.len() - offset).min(block.len());
            dest[offset..offset + n].copy_from_slice(&block[..n]);
            offset += n;
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}
