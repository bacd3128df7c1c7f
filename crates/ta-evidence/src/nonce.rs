//! Nonce/user-data hashing contract: every adapter binds
//! its report-data the same way, varying only the digest algorithm.

use sha2::{Digest, Sha256, Sha512};
use ta_core::VerifierNonce;

fn concatenated(nonce: Option<&VerifierNonce>, user_data: Option<&[u8]>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(n) = nonce {
        buf.extend_from_slice(&n.val);
        buf.extend_from_slice(&n.iat);
    }
    if let Some(ud) = user_data {
        buf.extend_from_slice(ud);
    }
    buf
}

/// SHA-256 of `nonce.val || nonce.iat || user_data`, used by the TPM adapter.
pub fn sha256_report_data(nonce: Option<&VerifierNonce>, user_data: Option<&[u8]>) -> Vec<u8> {
    Sha256::digest(concatenated(nonce, user_data)).to_vec()
}

/// SHA-512 of `nonce.val || nonce.iat || user_data`, used by TDX/SGX/SEV-SNP
/// and the Azure-TDX collector. With both absent, the contract is the
/// literal 64 zero bytes, not `SHA-512("")`.
pub fn sha512_report_data(nonce: Option<&VerifierNonce>, user_data: Option<&[u8]>) -> Vec<u8> {
    if nonce.is_none() && user_data.is_none() {
        return vec![0u8; 64];
    }
    Sha512::digest(concatenated(nonce, user_data)).to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha512_report_data_is_reproducible() {
        let nonce = VerifierNonce {
            val: vec![1u8; 32],
            iat: vec![2u8; 16],
            signature: vec![],
        };
        let a = sha512_report_data(Some(&nonce), Some(b"abc"));
        let b = sha512_report_data(Some(&nonce), Some(b"abc"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn sha512_report_data_absent_inputs_is_sixty_four_zero_bytes() {
        let all_absent = sha512_report_data(None, None);
        assert_eq!(all_absent, vec![0u8; 64]);
    }

    #[test]
    fn sha256_and_sha512_differ_for_same_input() {
        let nonce = VerifierNonce {
            val: vec![9u8; 8],
            iat: vec![],
            signature: vec![],
        };
        let a = sha256_report_data(Some(&nonce), None);
        let b = sha512_report_data(Some(&nonce), None);
        assert_ne!(a.len(), b.len());
    }
}
