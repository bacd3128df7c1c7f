//! CRL download and revocation check.

use crate::chain::crl_distribution_point;
use crate::error::{Result, VerifierError};
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::{CertificateRevocationList, FromDer};
use x509_parser::revocation_list::CertificateRevocationList as ParsedCrl;

/// Build an HTTP client suitable for CRL downloads, enforcing TLS 1.2 as
/// the minimum negotiated protocol version.
pub fn new_http_client() -> reqwest::Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .min_tls_version(reqwest::tls::Version::TLS_1_2)
        .build()
}

/// Download the CRL named by `cert`'s CRLDistributionPoints extension.
pub fn fetch_crl(client: &reqwest::blocking::Client, cert: &X509Certificate<'_>) -> Result<Vec<u8>> {
    let url = crl_distribution_point(cert)
        .ok_or_else(|| VerifierError::CrlDownload("certificate has no CRL distribution point".to_string()))?;

    let response = client
        .get(&url)
        .send()
        .map_err(|e| VerifierError::CrlDownload(e.to_string()))?;

    if !response.status().is_success() {
        return Err(VerifierError::CrlDownload(format!(
            "unexpected status {} fetching {url}",
            response.status()
        )));
    }

    response
        .bytes()
        .map(|b| b.to_vec())
        .map_err(|e| VerifierError::CrlDownload(e.to_string()))
}

/// Verify a CRL was signed by `issuer`, has not expired, and does not list
/// `subject_serial_hex` as revoked.
pub fn check_not_revoked(
    crl_der: &[u8],
    issuer: &X509Certificate<'_>,
    subject_serial_hex: &str,
) -> Result<()> {
    let (_, crl): (_, ParsedCrl) = CertificateRevocationList::from_der(crl_der)
        .map_err(|e: x509_parser::nom::Err<_>| VerifierError::DerParse(e.to_string()))?;

    crl.verify_signature(issuer.public_key())
        .map_err(|_| VerifierError::CrlSignatureInvalid)?;

    let next_update = crl
        .next_update()
        .ok_or(VerifierError::CrlExpired)?;
    if next_update.to_datetime() < x509_parser::time::ASN1Time::now() {
        return Err(VerifierError::CrlExpired);
    }

    let revoked = crl.iter_revoked_certificates().any(|entry| {
        let serial_hex = entry.raw_serial_as_string().to_lowercase();
        serial_hex == subject_serial_hex.to_lowercase()
    });
    if revoked {
        return Err(VerifierError::CertificateRevoked(subject_serial_hex.to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_crl_fails_without_distribution_point() {
        let leaf = rcgen::generate_simple_self_signed(vec!["example.com".into()]).unwrap();
        let der = leaf.serialize_der().unwrap();
        let (_, cert) = X509Certificate::from_der(&der).unwrap();
        let client = new_http_client().unwrap();
        assert!(matches!(
            fetch_crl(&client, &cert),
            Err(VerifierError::CrlDownload(_))
        ));
    }
}
