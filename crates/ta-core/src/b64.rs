//! `serde_with`-style helper for (de)serializing byte buffers as standard
//! base64 strings, matching the wire shape ITA expects for every `<b64>`
//! field in ITA's wire protocol.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Deserializer, Serializer};

/// Standalone base64 encode, for building ad hoc `serde_json::Value`
/// payloads (e.g. composite-evidence JSON) where a typed field with
/// `#[serde(with = "...")]` isn't available.
pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Standalone base64 decode, the inverse of [`encode`].
pub fn decode(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(s.as_bytes())
}

pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(bytes))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let s = String::deserialize(deserializer)?;
    STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
}

/// Same as the module above, but for `Option<Vec<u8>>` fields that should be
/// omitted from JSON entirely when absent rather than serialized as `null`.
pub mod opt {
    use super::*;

    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => serializer.serialize_str(&STANDARD.encode(b)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let opt = Option::<String>::deserialize(deserializer)?;
        opt.map(|s| STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Wrapper {
        #[serde(with = "super")]
        data: Vec<u8>,
    }

    #[test]
    fn round_trips_through_json() {
        let w = Wrapper {
            data: vec![0xde, 0xad, 0xbe, 0xef],
        };
        let json = serde_json::to_string(&w).unwrap();
        assert_eq!(json, "{\"data\":\"3q2+7w==\"}");
        let back: Wrapper = serde_json::from_str(&json).unwrap();
        assert_eq!(back.data, w.data);
    }
}
