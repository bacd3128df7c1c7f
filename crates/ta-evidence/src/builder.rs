//! Evidence builder: composes a map `{adapter_id -> evidence}` plus
//! the optional policy/signing-algorithm fields ITA's wire schema expects.

use crate::adapters::CompositeEvidence;
use crate::error::{EvidenceError, Result};
use serde_json::{Map, Value};
use ta_core::VerifierNonce;
use uuid::Uuid;

/// Token-signing algorithm requested for the resulting attestation token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSigningAlg {
    Rs256,
    Ps384,
}

impl TokenSigningAlg {
    fn as_str(self) -> &'static str {
        match self {
            TokenSigningAlg::Rs256 => "RS256",
            TokenSigningAlg::Ps384 => "PS384",
        }
    }
}

/// Builds an `EvidenceRequest` from zero or more registered adapters.
#[derive(Default)]
pub struct EvidenceBuilder<'a> {
    adapters: Vec<Box<dyn CompositeEvidence + 'a>>,
    verifier_nonce: Option<VerifierNonce>,
    user_data: Option<Vec<u8>>,
    policy_ids: Option<Vec<Uuid>>,
    token_signing_alg: Option<TokenSigningAlg>,
    policy_must_match: Option<bool>,
}

impl<'a> EvidenceBuilder<'a> {
    pub fn new() -> Self {
        EvidenceBuilder::default()
    }

    pub fn with_adapter(mut self, adapter: Box<dyn CompositeEvidence + 'a>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn with_verifier_nonce(mut self, nonce: VerifierNonce) -> Self {
        self.verifier_nonce = Some(nonce);
        self
    }

    pub fn with_user_data(mut self, data: Vec<u8>) -> Self {
        self.user_data = Some(data);
        self
    }

    pub fn with_policy_ids(mut self, ids: Vec<Uuid>) -> Self {
        self.policy_ids = Some(ids);
        self
    }

    pub fn with_token_signing_alg(mut self, alg: TokenSigningAlg) -> Self {
        self.token_signing_alg = Some(alg);
        self
    }

    pub fn with_policy_must_match(mut self, must_match: bool) -> Self {
        self.policy_must_match = Some(must_match);
        self
    }

    /// Invokes every registered adapter exactly once with the same nonce
    /// and user-data (order between adapters is unspecified).
    pub fn build(mut self) -> Result<Value> {
        if self.adapters.is_empty() {
            return Err(EvidenceError::NoAdapters);
        }

        let mut map = Map::new();
        for adapter in &mut self.adapters {
            let id = adapter.identifier().to_string();
            let evidence = adapter.get_evidence(self.verifier_nonce.as_ref(), self.user_data.as_deref())?;
            map.insert(id, evidence);
        }

        if let Some(ids) = &self.policy_ids {
            map.insert(
                "policy_ids".to_string(),
                Value::Array(ids.iter().map(|id| Value::String(id.to_string())).collect()),
            );
        }
        if let Some(alg) = self.token_signing_alg {
            map.insert("token_signing_alg".to_string(), Value::String(alg.as_str().to_string()));
        }
        if let Some(flag) = self.policy_must_match {
            map.insert("policy_must_match".to_string(), Value::Bool(flag));
        }

        tracing::info!(adapter_count = map.len(), "built composite evidence request");
        Ok(Value::Object(map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::SgxAdapter;

    #[test]
    fn build_fails_with_no_adapters() {
        let err = EvidenceBuilder::new().build().unwrap_err();
        assert!(matches!(err, EvidenceError::NoAdapters));
    }

    #[test]
    fn build_includes_optional_fields_only_when_set() {
        let adapter = SgxAdapter::new(|_| Ok(b"q".to_vec()));
        let value = EvidenceBuilder::new()
            .with_adapter(Box::new(adapter))
            .build()
            .unwrap();
        let obj = value.as_object().unwrap();
        assert!(obj.contains_key("sgx"));
        assert!(!obj.contains_key("policy_ids"));
        assert!(!obj.contains_key("token_signing_alg"));
        assert!(!obj.contains_key("policy_must_match"));
    }

    #[test]
    fn build_sets_optional_fields_when_provided() {
        let adapter = SgxAdapter::new(|_| Ok(b"q".to_vec()));
        let id = Uuid::nil();
        let value = EvidenceBuilder::new()
            .with_adapter(Box::new(adapter))
            .with_policy_ids(vec![id])
            .with_token_signing_alg(TokenSigningAlg::Ps384)
            .with_policy_must_match(true)
            .build()
            .unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj["token_signing_alg"], "PS384");
        assert_eq!(obj["policy_must_match"], true);
        assert_eq!(obj["policy_ids"][0], id.to_string());
    }

    #[test]
    fn every_registered_adapter_is_invoked_exactly_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let adapter = SgxAdapter::new(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            Ok(b"q".to_vec())
        });

        EvidenceBuilder::new()
            .with_adapter(Box::new(adapter))
            .build()
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
