//! Shared data-model types used across every Trust Authority client crate.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Lower bound (inclusive) of the TPM persistent-object handle range.
pub const PERSISTENT_HANDLE_MIN: u32 = 0x8100_0000;
/// Upper bound (inclusive) of the TPM persistent-object handle range.
pub const PERSISTENT_HANDLE_MAX: u32 = 0x81FF_FFFF;
/// Lower bound (inclusive) of the TPM NV-index handle range.
pub const NV_INDEX_MIN: u32 = 0x0100_0000;
/// Upper bound (inclusive) of the TPM NV-index handle range.
pub const NV_INDEX_MAX: u32 = 0x01C2_FFFF;

/// The domain a [`Handle`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleDomain {
    /// `0x81000000..=0x81FFFFFF` — persistent objects (EK, AK).
    Persistent,
    /// `0x01000000..=0x01C2FFFF` — NV-RAM indices.
    NvIndex,
}

/// A 32-bit TPM handle, range-checked on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(pub u32);

impl Handle {
    /// Wrap a raw handle value without range-checking it.
    pub const fn new(raw: u32) -> Self {
        Handle(raw)
    }

    /// Raw handle value.
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Determine which handle domain this value falls in, if any.
    pub fn domain(self) -> Option<HandleDomain> {
        if (PERSISTENT_HANDLE_MIN..=PERSISTENT_HANDLE_MAX).contains(&self.0) {
            Some(HandleDomain::Persistent)
        } else if (NV_INDEX_MIN..=NV_INDEX_MAX).contains(&self.0) {
            Some(HandleDomain::NvIndex)
        } else {
            None
        }
    }

    /// Validate that this handle belongs to `expected`, failing with a
    /// typed error on handle-range violations.
    pub fn require_domain(self, expected: HandleDomain) -> Result<()> {
        match self.domain() {
            Some(d) if d == expected => Ok(()),
            Some(_) => Err(CoreError::InvalidHandle(self.0)),
            None => Err(CoreError::HandleOutOfRange(self.0)),
        }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// TPM hash algorithms recognized by PCR selections and quotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HashAlg {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlg {
    /// Digest size in bytes for this algorithm.
    pub const fn digest_size(self) -> usize {
        match self {
            HashAlg::Sha1 => 20,
            HashAlg::Sha256 => 32,
            HashAlg::Sha384 => 48,
            HashAlg::Sha512 => 64,
        }
    }

    /// TCG 2.0 `algId` value for this algorithm (used by the event-log filter).
    pub const fn tcg_alg_id(self) -> u16 {
        match self {
            HashAlg::Sha1 => 0x4,
            HashAlg::Sha256 => 0xB,
            HashAlg::Sha384 => 0xC,
            HashAlg::Sha512 => 0xD,
        }
    }

    /// Resolve a TCG 2.0 `algId` back into a [`HashAlg`].
    pub fn from_tcg_alg_id(id: u16) -> Option<Self> {
        match id {
            0x4 => Some(HashAlg::Sha1),
            0xB => Some(HashAlg::Sha256),
            0xC => Some(HashAlg::Sha384),
            0xD => Some(HashAlg::Sha512),
            _ => None,
        }
    }

    fn parse_token(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sha1" => Some(HashAlg::Sha1),
            "sha256" => Some(HashAlg::Sha256),
            "sha384" => Some(HashAlg::Sha384),
            "sha512" => Some(HashAlg::Sha512),
            _ => None,
        }
    }
}

impl fmt::Display for HashAlg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HashAlg::Sha1 => "sha1",
            HashAlg::Sha256 => "sha256",
            HashAlg::Sha384 => "sha384",
            HashAlg::Sha512 => "sha512",
        };
        f.write_str(s)
    }
}

/// Maximum valid PCR index (platforms expose PCR 0..23).
pub const MAX_PCR_INDEX: u8 = 23;

/// A parsed selection of `{ hash algorithm -> set of PCR indices }` bank
/// entries, per the grammar `ALG:(all | N[,N]*) (+ ALG:...)*`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcrSelection {
    banks: Vec<(HashAlg, BTreeSet<u8>)>,
}

impl PcrSelection {
    /// The default selection used when a caller requests a quote without
    /// specifying PCRs: SHA-256, PCRs 0..23.
    pub fn default_selection() -> Self {
        let all: BTreeSet<u8> = (0..=MAX_PCR_INDEX).collect();
        PcrSelection {
            banks: vec![(HashAlg::Sha256, all)],
        }
    }

    /// Construct directly from bank entries (used by adapters building a
    /// selection programmatically rather than parsing a grammar string).
    pub fn from_banks(banks: Vec<(HashAlg, BTreeSet<u8>)>) -> Self {
        PcrSelection { banks }
    }

    /// Iterate `(algorithm, pcr indices)` pairs in canonical (algorithm-sorted)
    /// order.
    pub fn banks(&self) -> &[(HashAlg, BTreeSet<u8>)] {
        &self.banks
    }

    /// True if `pcr` is selected under `alg`.
    pub fn contains(&self, alg: HashAlg, pcr: u8) -> bool {
        self.banks
            .iter()
            .any(|(a, set)| *a == alg && set.contains(&pcr))
    }

    /// Parse a selection string such as `"sha256:1,3,7"` or
    /// `"sha1:all+sha256:0,1,2"`.
    pub fn parse(s: &str) -> Result<Self> {
        if s.trim().is_empty() {
            return Err(CoreError::InvalidPcrSelection(
                "empty PCR selection".to_string(),
            ));
        }

        let mut banks: Vec<(HashAlg, BTreeSet<u8>)> = Vec::new();
        for clause in s.split('+') {
            let clause = clause.trim();
            let (alg_str, pcrs_str) = clause.split_once(':').ok_or_else(|| {
                CoreError::InvalidPcrSelection(format!("missing ':' in clause '{clause}'"))
            })?;
            let alg = HashAlg::parse_token(alg_str).ok_or_else(|| {
                CoreError::InvalidPcrSelection(format!("unknown hash algorithm '{alg_str}'"))
            })?;

            let indices: BTreeSet<u8> = if pcrs_str.eq_ignore_ascii_case("all") {
                (0..=MAX_PCR_INDEX).collect()
            } else {
                let mut set = BTreeSet::new();
                for tok in pcrs_str.split(',') {
                    let tok = tok.trim();
                    if tok.is_empty() {
                        return Err(CoreError::InvalidPcrSelection(format!(
                            "empty PCR index in clause '{clause}'"
                        )));
                    }
                    let idx: u8 = tok.parse().map_err(|_| {
                        CoreError::InvalidPcrSelection(format!("not a PCR index: '{tok}'"))
                    })?;
                    if idx > MAX_PCR_INDEX {
                        return Err(CoreError::InvalidPcrSelection(format!(
                            "PCR index {idx} exceeds maximum of {MAX_PCR_INDEX}"
                        )));
                    }
                    set.insert(idx);
                }
                set
            };

            if indices.is_empty() {
                return Err(CoreError::InvalidPcrSelection(format!(
                    "no PCR indices in clause '{clause}'"
                )));
            }

            match banks.iter_mut().find(|(a, _)| *a == alg) {
                Some((_, set)) => set.extend(indices),
                None => banks.push((alg, indices)),
            }
        }

        banks.sort_by_key(|(alg, _)| *alg);
        Ok(PcrSelection { banks })
    }
}

impl fmt::Display for PcrSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let clauses: Vec<String> = self
            .banks
            .iter()
            .map(|(alg, pcrs)| {
                let list: Vec<String> = pcrs.iter().map(|p| p.to_string()).collect();
                format!("{alg}:{}", list.join(","))
            })
            .collect();
        write!(f, "{}", clauses.join("+"))
    }
}

/// A verifier-issued challenge, bound into evidence by every TEE adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierNonce {
    /// Opaque challenge bytes.
    #[serde(with = "crate::b64")]
    pub val: Vec<u8>,
    /// Issued-at timestamp bytes, consumed unmodified alongside `val`.
    #[serde(with = "crate::b64")]
    pub iat: Vec<u8>,
    /// ITA's signature over `val || iat`.
    #[serde(with = "crate::b64")]
    pub signature: Vec<u8>,
}

/// A TPM-produced quote: opaque signed attestation bytes plus its signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// TPMS_ATTEST-encoded signed bytes.
    pub signed: Vec<u8>,
    /// TPMT_SIGNATURE-encoded signature bytes.
    pub signature: Vec<u8>,
}

/// Retry policy governing the ITA REST connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Minimum backoff wait, in milliseconds.
    pub wait_min_ms: u64,
    /// Maximum backoff wait, in milliseconds.
    pub wait_max_ms: u64,
    /// Maximum number of retries (not counting the initial attempt).
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            wait_min_ms: 2_000,
            wait_max_ms: 10_000,
            max_retries: 2,
        }
    }
}

impl RetryPolicy {
    /// HTTP status codes the connector treats as retryable.
    pub const RETRYABLE_STATUS: [u16; 3] = [500, 503, 504];

    /// True if `status` is one of [`Self::RETRYABLE_STATUS`].
    pub fn is_retryable_status(status: u16) -> bool {
        Self::RETRYABLE_STATUS.contains(&status)
    }

    /// Exponential backoff wait for retry attempt `attempt` (0-indexed),
    /// clamped to `[wait_min_ms, wait_max_ms]`.
    pub fn backoff_for_attempt(self, attempt: u32) -> std::time::Duration {
        let scaled = self.wait_min_ms.saturating_mul(1u64 << attempt.min(16));
        std::time::Duration::from_millis(scaled.min(self.wait_max_ms).max(self.wait_min_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn handle_domain_detection() {
        assert_eq!(
            Handle::new(0x8100_0F00).domain(),
            Some(HandleDomain::Persistent)
        );
        assert_eq!(Handle::new(0x0140_0001).domain(), Some(HandleDomain::NvIndex));
        assert_eq!(Handle::new(0x0000_0001).domain(), None);
    }

    #[test]
    fn handle_require_domain_rejects_wrong_domain() {
        let h = Handle::new(0x8100_0F00);
        assert!(h.require_domain(HandleDomain::Persistent).is_ok());
        match h.require_domain(HandleDomain::NvIndex) {
            Err(CoreError::InvalidHandle(_)) => {}
            other => panic!("expected InvalidHandle, got {other:?}"),
        }
    }

    #[test]
    fn handle_require_domain_rejects_out_of_range() {
        let h = Handle::new(0x0000_0001);
        match h.require_domain(HandleDomain::NvIndex) {
            Err(CoreError::HandleOutOfRange(_)) => {}
            other => panic!("expected HandleOutOfRange, got {other:?}"),
        }
    }

    #[test]
    fn pcr_selection_parses_basic_clause() {
        let sel = PcrSelection::parse("sha256:1,3,7").unwrap();
        assert!(sel.contains(HashAlg::Sha256, 1));
        assert!(sel.contains(HashAlg::Sha256, 3));
        assert!(sel.contains(HashAlg::Sha256, 7));
        assert!(!sel.contains(HashAlg::Sha256, 2));
        assert!(!sel.contains(HashAlg::Sha1, 1));
    }

    #[test]
    fn pcr_selection_parses_all_and_multi_bank() {
        let sel = PcrSelection::parse("sha1:all+sha256:0,1,2").unwrap();
        assert!(sel.contains(HashAlg::Sha1, 23));
        assert!(sel.contains(HashAlg::Sha256, 0));
        assert!(!sel.contains(HashAlg::Sha256, 23));
    }

    #[test]
    fn pcr_selection_rejects_bad_algorithm() {
        assert!(PcrSelection::parse("rot13:1,2").is_err());
    }

    #[test]
    fn pcr_selection_rejects_out_of_range_pcr() {
        assert!(PcrSelection::parse("sha256:24").is_err());
    }

    #[test]
    fn pcr_selection_rejects_malformed_string() {
        assert!(PcrSelection::parse("sha256").is_err());
        assert!(PcrSelection::parse("").is_err());
        assert!(PcrSelection::parse("sha256:").is_err());
    }

    #[test]
    fn pcr_selection_display_round_trips_canonically() {
        let sel = PcrSelection::parse("sha256:7,3,1").unwrap();
        assert_eq!(sel.to_string(), "sha256:1,3,7");
    }

    proptest! {
        #[test]
        fn pcr_selection_format_parse_round_trip(
            indices in proptest::collection::btree_set(0u8..=MAX_PCR_INDEX, 1..10),
        ) {
            let list: Vec<String> = indices.iter().map(|i| i.to_string()).collect();
            let s = format!("sha256:{}", list.join(","));
            let parsed = PcrSelection::parse(&s).unwrap();
            let canonical = parsed.to_string();
            let reparsed = PcrSelection::parse(&canonical).unwrap();
            prop_assert_eq!(reparsed.to_string(), canonical);
        }
    }

    #[test]
    fn retry_policy_default_matches_spec() {
        let p = RetryPolicy::default();
        assert_eq!(p.wait_min_ms, 2_000);
        assert_eq!(p.wait_max_ms, 10_000);
        assert_eq!(p.max_retries, 2);
    }

    #[test]
    fn retry_policy_retryable_status_set() {
        assert!(RetryPolicy::is_retryable_status(500));
        assert!(RetryPolicy::is_retryable_status(503));
        assert!(RetryPolicy::is_retryable_status(504));
        assert!(!RetryPolicy::is_retryable_status(404));
        assert!(!RetryPolicy::is_retryable_status(200));
    }

    #[test]
    fn retry_policy_backoff_is_clamped() {
        let p = RetryPolicy::default();
        assert_eq!(p.backoff_for_attempt(0).as_millis(), 2_000);
        assert_eq!(p.backoff_for_attempt(10).as_millis(), 10_000);
    }
}
