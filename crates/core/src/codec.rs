//! Decoding of raw `token_metadata` big-map values.
//!
//! A big-map update carries a single-entry JSON object mapping the token
//! id (a decimal string, the big-map key) to a string-to-string metadata
//! mapping. Values are usually hex-encoded Michelson bytes; decoding to
//! UTF-8 text is best-effort except for the reserved empty-string key,
//! which holds the off-chain link and must be valid hex.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::DecodeError;

/// Reserved big-map key holding the hex-encoded off-chain link.
const LINK_KEY: &str = "";

/// Decoded token info from one big-map update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    /// Token id parsed from the big-map key.
    pub token_id: u64,

    /// Metadata key/value mapping with hex values decoded where possible.
    pub token_info: BTreeMap<String, String>,

    /// Off-chain link extracted from the reserved empty-string key, when
    /// present and decodable to UTF-8 text.
    pub link: Option<String>,
}

/// Best-effort hex-to-text decoding.
///
/// Returns `Some(text)` only when `value` is valid hex whose decoded
/// bytes are valid UTF-8; callers keep the original value on `None`.
pub fn decode_hex_text(value: &str) -> Option<String> {
    let bytes = hex::decode(value).ok()?;
    String::from_utf8(bytes).ok()
}

impl TokenInfo {
    /// Decode a raw big-map update payload.
    ///
    /// The payload must be a JSON object with exactly one entry: the
    /// decimal token-id key mapped to an object of string values, e.g.
    /// `{"1": {"": "<hex link>", "name": "<hex>"}}`.
    pub fn from_value(payload: &Value) -> Result<Self, DecodeError> {
        let entries = payload
            .as_object()
            .ok_or_else(|| DecodeError::Malformed("payload is not a JSON object".to_string()))?;

        let mut iter = entries.iter();
        let (raw_id, raw_info) = match (iter.next(), iter.next()) {
            (Some(entry), None) => entry,
            _ => {
                return Err(DecodeError::Malformed(format!(
                    "expected a single token entry, got {}",
                    entries.len()
                )))
            }
        };

        let token_id: u64 = raw_id
            .parse()
            .map_err(|_| DecodeError::InvalidTokenId(raw_id.clone()))?;

        let raw_map = raw_info.as_object().ok_or_else(|| {
            DecodeError::Malformed(format!("entry for token {} is not an object", token_id))
        })?;

        let mut token_info = BTreeMap::new();
        for (key, value) in raw_map {
            let text = value.as_str().ok_or_else(|| {
                DecodeError::Malformed(format!("value for key `{}` is not a string", key))
            })?;
            token_info.insert(key.clone(), text.to_string());
        }

        // The reserved key is removed whether or not it yields a link.
        let link = match token_info.remove(LINK_KEY) {
            Some(raw_link) => {
                let bytes = hex::decode(&raw_link)?;
                String::from_utf8(bytes).ok()
            }
            None => None,
        };

        for value in token_info.values_mut() {
            if let Some(decoded) = decode_hex_text(value) {
                *value = decoded;
            }
        }

        Ok(TokenInfo {
            token_id,
            token_info,
            link,
        })
    }

    /// Decode a raw big-map update payload from bytes.
    pub fn from_slice(payload: &[u8]) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_slice(payload)
            .map_err(|e| DecodeError::Malformed(e.to_string()))?;
        Self::from_value(&value)
    }
}
