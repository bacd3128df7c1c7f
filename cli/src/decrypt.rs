//! `decrypt`: RSA-OAEP decryption of a ciphertext using the private key
//! produced by `create-key-pair`. Not part of the core attestation pipeline.

use anyhow::{Context, Result};
use rsa::pkcs8::DecodePrivateKey;
use rsa::{Oaep, RsaPrivateKey};
use sha2::Sha256;

/// Decrypt base64-encoded `ciphertext` with the PEM private key at `key_path`.
pub fn decrypt(key_path: &str, ciphertext_b64: &str) -> Result<Vec<u8>> {
    let pem = std::fs::read_to_string(key_path).context("reading private key file")?;
    let private_key = RsaPrivateKey::from_pkcs8_pem(&pem).context("parsing private key")?;

    let ciphertext = {
        use base64::Engine as _;
        base64::engine::general_purpose::STANDARD
            .decode(ciphertext_b64.trim())
            .context("decoding base64 ciphertext")?
    };

    let padding = Oaep::new::<Sha256>();
    private_key
        .decrypt(padding, &ciphertext)
        .context("RSA-OAEP decryption failed")
}
