//! KDFa and the MakeCredential/ActivateCredential wrap used by the software
//! simulator backend's `activate_credential`.
//!
//! Real hardware TPMs run this protocol internally; ITA's AK-provisioning
//! endpoint constructs the credential blob and secret externally (it holds
//! the EK certificate's public key but never the TPM's private key). The
//! software simulator backend implements both directions so it can stand in
//! for hardware during development and testing.

use hmac::{Hmac, Mac};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;
type Aes256Cfb = cfb_mode::Encryptor<aes::Aes256>;
type Aes256CfbDec = cfb_mode::Decryptor<aes::Aes256>;

use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};

/// KDFa per TPM 2.0 Part 1 Annex B: counter-mode HMAC-based key derivation.
/// Returns `bits / 8` bytes of derived key material.
pub fn kdfa(key: &[u8], label: &str, context_u: &[u8], context_v: &[u8], bits: u32) -> Vec<u8> {
    let digest_size = 32usize; // SHA-256
    let n = ((bits as usize) + digest_size * 8 - 1) / (digest_size * 8);
    let mut out = Vec::with_capacity(n * digest_size);

    for i in 1..=n as u32 {
        let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
        mac.update(&i.to_be_bytes());
        mac.update(label.as_bytes());
        mac.update(&[0u8]);
        mac.update(context_u);
        mac.update(context_v);
        mac.update(&bits.to_be_bytes());
        out.extend_from_slice(&mac.finalize().into_bytes());
    }

    out.truncate((bits / 8) as usize);
    out
}

const OAEP_LABEL: &str = "IDENTITY\0";

/// Wrap `credential` for delivery to `ak_name`'s TPM, encrypting under
/// `ek_public`. Returns `(credential_blob, secret)` ready for activation.
pub fn make_credential(
    ek_public: &RsaPublicKey,
    ak_name: &[u8],
    credential: &[u8],
) -> (Vec<u8>, Vec<u8>) {
    let mut seed = [0u8; 32];
    rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut seed);

    let mut rng = rand::thread_rng();
    let padding = Oaep::new_with_label::<Sha256, _>(OAEP_LABEL);
    let secret = ek_public
        .encrypt(&mut rng, padding, &seed)
        .expect("RSA-OAEP encryption of a 32-byte seed never fails for a valid key");

    let sym_key = kdfa(&seed, "STORAGE", ak_name, &[], 256);
    let mut plaintext = (credential.len() as u32).to_be_bytes().to_vec();
    plaintext.extend_from_slice(credential);
    let mut enc_identity = plaintext.clone();
    Aes256Cfb::new(sym_key.as_slice().into(), &[0u8; 16].into()).encrypt(&mut enc_identity);

    let hmac_key = kdfa(&seed, "INTEGRITY", &[], &[], 256);
    let mut mac = HmacSha256::new_from_slice(&hmac_key).unwrap();
    mac.update(&enc_identity);
    mac.update(ak_name);
    let integrity = mac.finalize().into_bytes();

    let mut blob = integrity.to_vec();
    blob.extend_from_slice(&enc_identity);
    (blob, secret)
}

/// Unwrap a credential blob produced by [`make_credential`], verifying
/// integrity before returning the plaintext credential.
pub fn activate_credential(
    ek_private: &RsaPrivateKey,
    ak_name: &[u8],
    credential_blob: &[u8],
    secret: &[u8],
) -> Result<Vec<u8>, String> {
    let padding = Oaep::new_with_label::<Sha256, _>(OAEP_LABEL);
    let seed = ek_private
        .decrypt(padding, secret)
        .map_err(|e| format!("failed to unwrap seed: {e}"))?;

    if credential_blob.len() < 32 {
        return Err("credential blob shorter than an HMAC digest".to_string());
    }
    let (integrity, enc_identity) = credential_blob.split_at(32);

    let hmac_key = kdfa(&seed, "INTEGRITY", &[], &[], 256);
    let mut mac = HmacSha256::new_from_slice(&hmac_key).unwrap();
    mac.update(enc_identity);
    mac.update(ak_name);
    mac.verify_slice(integrity)
        .map_err(|_| "credential integrity HMAC mismatch".to_string())?;

    let sym_key = kdfa(&seed, "STORAGE", ak_name, &[], 256);
    let mut plaintext = enc_identity.to_vec();
    Aes256CfbDec::new(sym_key.as_slice().into(), &[0u8; 16].into()).decrypt(&mut plaintext);

    if plaintext.len() < 4 {
        return Err("decrypted credential missing length prefix".to_string());
    }
    let len = u32::from_be_bytes(plaintext[..4].try_into().unwrap()) as usize;
    let body = plaintext.get(4..4 + len).ok_or_else(|| {
        "decrypted credential length prefix exceeds blob size".to_string()
    })?;
    Ok(body.to_vec())
}

/// Compute a TPM-style "name" for an object: here, the SHA-256 of its
/// DER-encoded public key. Real TPMs name objects by hashing their
/// marshaled `TPMT_PUBLIC`; this simulator only ever needs a stable,
/// collision-resistant identifier for KDFa context binding.
pub fn object_name(public_key_der: &[u8]) -> Vec<u8> {
    Sha256::digest(public_key_der).to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::EncodePublicKey;
    use rsa::traits::PublicKeyParts;

    fn test_keypair() -> (RsaPrivateKey, RsaPublicKey) {
        let mut rng = rand::thread_rng();
        let priv_key = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let pub_key = RsaPublicKey::from(&priv_key);
        (priv_key, pub_key)
    }

    #[test]
    fn make_and_activate_round_trip() {
        let (ek_priv, ek_pub) = test_keypair();
        let ak_name = object_name(b"fake-ak-public");
        let credential = b"decafbad";

        let (blob, secret) = make_credential(&ek_pub, &ak_name, credential);
        let recovered = activate_credential(&ek_priv, &ak_name, &blob, &secret).unwrap();

        assert_eq!(recovered, credential);
    }

    #[test]
    fn activate_rejects_tampered_blob() {
        let (ek_priv, ek_pub) = test_keypair();
        let ak_name = object_name(b"fake-ak-public");
        let (mut blob, secret) = make_credential(&ek_pub, &ak_name, b"decafbad");
        let last = blob.len() - 1;
        blob[last] ^= 0xFF;

        assert!(activate_credential(&ek_priv, &ak_name, &blob, &secret).is_err());
    }

    #[test]
    fn activate_rejects_wrong_name() {
        let (ek_priv, ek_pub) = test_keypair();
        let ak_name = object_name(b"fake-ak-public");
        let other_name = object_name(b"different-ak-public");
        let (blob, secret) = make_credential(&ek_pub, &ak_name, b"decafbad");

        assert!(activate_credential(&ek_priv, &other_name, &blob, &secret).is_err());
    }

    #[test]
    fn kdfa_is_deterministic() {
        let key = b"some key material";
        let a = kdfa(key, "STORAGE", b"ctx", &[], 256);
        let b = kdfa(key, "STORAGE", b"ctx", &[], 256);
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn object_name_is_stable() {
        let (_, pub_key) = test_keypair();
        let der = pub_key.to_public_key_der().unwrap();
        let n1 = object_name(der.as_bytes());
        let n2 = object_name(der.as_bytes());
        assert_eq!(n1, n2);
    }
}
