//! X.509 chain sorting and path verification.

use crate::error::{Result, VerifierError};
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::ParsedExtension;
use x509_parser::nom;
use x509_parser::prelude::{FromDer, X509Error};

const MAX_CHAIN_LEN: usize = 10;

/// A sorted `x5c` chain: leaf, zero or more intermediates, and a root.
pub struct SortedChain<'a> {
    pub leaf_der: &'a [u8],
    pub intermediate_der: Vec<&'a [u8]>,
    pub root_der: &'a [u8],
}

fn common_name_contains(cert: &X509Certificate<'_>, needle: &str) -> bool {
    cert.subject()
        .iter_common_name()
        .filter_map(|cn| cn.as_str().ok())
        .any(|cn| cn.contains(needle))
}

fn is_ca_with_valid_basic_constraints(cert: &X509Certificate<'_>) -> bool {
    match cert.basic_constraints() {
        Ok(Some(bc)) => bc.value.ca,
        _ => false,
    }
}

/// Parse and sort an x5c chain into leaf, intermediates, and root.
pub fn sort_chain(der_chain: &[Vec<u8>]) -> Result<SortedChain<'_>> {
    if der_chain.len() > MAX_CHAIN_LEN {
        return Err(VerifierError::ChainTooLong(der_chain.len()));
    }
    if der_chain.is_empty() {
        return Err(VerifierError::ChainSortFailed);
    }

    let parsed: Vec<(&[u8], X509Certificate<'_>)> = der_chain
        .iter()
        .map(|der| {
            let (_, cert) = X509Certificate::from_der(der)
                .map_err(|e: nom::Err<X509Error>| VerifierError::DerParse(e.to_string()))?;
            Ok((der.as_slice(), cert))
        })
        .collect::<Result<_>>()?;

    let root_idx = parsed
        .iter()
        .position(|(_, cert)| {
            common_name_contains(cert, "Root CA") && is_ca_with_valid_basic_constraints(cert)
        })
        .ok_or(VerifierError::ChainSortFailed)?;

    let intermediate_idxs: Vec<usize> = parsed
        .iter()
        .enumerate()
        .filter(|(i, (_, cert))| *i != root_idx && common_name_contains(cert, "Signing CA"))
        .map(|(i, _)| i)
        .collect();

    let leaf_idx = parsed
        .iter()
        .enumerate()
        .find(|(i, _)| *i != root_idx && !intermediate_idxs.contains(i))
        .map(|(i, _)| i)
        .ok_or(VerifierError::ChainSortFailed)?;

    Ok(SortedChain {
        leaf_der: parsed[leaf_idx].0,
        intermediate_der: intermediate_idxs.into_iter().map(|i| parsed[i].0).collect(),
        root_der: parsed[root_idx].0,
    })
}

/// Extract the first CRL distribution-point URI, if present.
pub fn crl_distribution_point(cert: &X509Certificate<'_>) -> Option<String> {
    cert.extensions().iter().find_map(|ext| {
        if let ParsedExtension::CRLDistributionPoints(points) = ext.parsed_extension() {
            points.iter().find_map(|point| {
                point.distribution_point.as_ref().and_then(|name| {
                    use x509_parser::extensions::DistributionPointName;
                    match name {
                        DistributionPointName::FullName(names) => names.iter().find_map(|gn| {
                            use x509_parser::extensions::GeneralName;
                            match gn {
                                GeneralName::URI(uri) => Some(uri.to_string()),
                                _ => None,
                            }
                        }),
                        _ => None,
                    }
                })
            })
        } else {
            None
        }
    })
}

/// Verify `leaf`'s signature was produced by `issuer`'s public key.
pub fn verify_signed_by(leaf_der: &[u8], issuer_der: &[u8]) -> Result<()> {
    let (_, leaf) = X509Certificate::from_der(leaf_der)
        .map_err(|e: nom::Err<X509Error>| VerifierError::DerParse(e.to_string()))?;
    let (_, issuer) = X509Certificate::from_der(issuer_der)
        .map_err(|e: nom::Err<X509Error>| VerifierError::DerParse(e.to_string()))?;

    leaf.verify_signature(Some(issuer.public_key()))
        .map_err(|e| VerifierError::PathVerificationFailed(e.to_string()))
}

/// Build and verify the full leaf -> intermediates -> root path.
pub fn verify_path(chain: &SortedChain<'_>) -> Result<()> {
    let mut current = chain.leaf_der;
    for intermediate in &chain.intermediate_der {
        verify_signed_by(current, intermediate)?;
        current = intermediate;
    }
    verify_signed_by(current, chain.root_der)?;

    let (_, root) = X509Certificate::from_der(chain.root_der)
        .map_err(|e: nom::Err<X509Error>| VerifierError::DerParse(e.to_string()))?;
    root.verify_signature(None)
        .map_err(|e| VerifierError::PathVerificationFailed(format!("root self-signature: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_cert(cn: &str, is_ca: bool) -> rcgen::Certificate {
        let mut params = rcgen::CertificateParams::new(vec![]);
        params.distinguished_name = rcgen::DistinguishedName::new();
        params
            .distinguished_name
            .push(rcgen::DnType::CommonName, cn);
        if is_ca {
            params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        }
        rcgen::Certificate::from_params(params).unwrap()
    }

    #[test]
    fn sort_chain_identifies_leaf_intermediate_root() {
        let leaf = make_cert("ITA Signing Key", false);
        let intermediate = make_cert("ITA Signing CA", true);
        let root = make_cert("ITA Root CA", true);

        let der_chain = vec![
            leaf.serialize_der().unwrap(),
            intermediate.serialize_der().unwrap(),
            root.serialize_der().unwrap(),
        ];
        let sorted = sort_chain(&der_chain).unwrap();
        assert_eq!(sorted.intermediate_der.len(), 1);
    }

    #[test]
    fn sort_chain_rejects_oversized_chain() {
        let certs = vec![vec![0u8]; 11];
        assert!(matches!(
            sort_chain(&certs),
            Err(VerifierError::ChainTooLong(11))
        ));
    }

    #[test]
    fn sort_chain_rejects_empty_chain() {
        assert!(matches!(sort_chain(&[]), Err(VerifierError::ChainSortFailed)));
    }
}
