//! The base64 envelope shared by every payment header.
//!
//! `X-PAYMENT`, `PAYMENT-SIGNATURE`, `PAYMENT-REQUIRED` and the settlement
//! receipts all carry one JSON document, base64-encoded with the standard
//! alphabet. [`Base64Bytes`] holds that header form as raw bytes.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;

/// A header value in its encoded form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Base64Bytes(pub Vec<u8>);

impl Base64Bytes {
    /// Base64 of `value`'s JSON serialization.
    ///
    /// # Errors
    ///
    /// Fails only if `value` cannot be serialized.
    pub fn encode_json<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_vec(value)?;
        Ok(Self(STANDARD.encode(json).into_bytes()))
    }

    /// The bytes behind the encoding.
    ///
    /// Whitespace around the value, as some proxies leave it, is ignored.
    ///
    /// # Errors
    ///
    /// Returns the decoder's error when the value is not standard base64.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(self.0.trim_ascii())
    }
}

impl From<&[u8]> for Base64Bytes {
    fn from(header: &[u8]) -> Self {
        Self(header.to_vec())
    }
}

impl fmt::Display for Base64Bytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn carries_a_json_document() {
        let receipt = json!({ "success": true, "transaction": "0xabc" });
        let header = Base64Bytes::encode_json(&receipt).unwrap().to_string();
        assert!(header.bytes().all(|b| b.is_ascii_graphic()));

        let decoded = Base64Bytes::from(header.as_bytes()).decode().unwrap();
        assert_eq!(serde_json::from_slice::<Value>(&decoded).unwrap(), receipt);
    }

    #[test]
    fn surrounding_whitespace_is_tolerated() {
        let header = format!(" {}\t", Base64Bytes::encode_json(&json!(1)).unwrap());
        assert_eq!(Base64Bytes::from(header.as_bytes()).decode().unwrap(), b"1");
    }

    #[test]
    fn rejects_invalid_base64() {
        assert!(Base64Bytes::from(&b"not base64!"[..]).decode().is_err());
    }
}
