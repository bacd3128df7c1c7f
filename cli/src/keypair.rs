//! `create-key-pair`: RSA keypair generation and PEM I/O. Not part of the
//! core attestation pipeline; only the CLI links against `rsa`/`pem`.

use anyhow::{Context, Result};
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::RsaPrivateKey;

const KEY_BITS: usize = 2048;

/// Generate a 2048-bit RSA keypair and write PEM-encoded public/private keys
/// to `pub_path`/`key_path`.
pub fn create_key_pair(pub_path: &str, key_path: &str) -> Result<()> {
    let mut rng = rand::thread_rng();
    let private_key = RsaPrivateKey::new(&mut rng, KEY_BITS).context("generating RSA key")?;
    let public_key = private_key.to_public_key();

    let private_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .context("encoding private key")?;
    let public_pem = public_key
        .to_public_key_pem(LineEnding::LF)
        .context("encoding public key")?;

    std::fs::write(key_path, private_pem.as_bytes()).context("writing private key file")?;
    std::fs::write(pub_path, public_pem).context("writing public key file")?;

    Ok(())
}
