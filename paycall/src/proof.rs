//! Signed payment proofs.

use std::fmt;

use serde::Serialize;

use crate::challenge::ProtocolVersion;
use crate::encoding::Base64Bytes;

/// An opaque, signed payment authorization produced by a [`Signer`](crate::Signer).
///
/// The proof is attached to exactly one retried request. It is neither
/// `Clone` nor `Copy`: attaching it consumes it via [`Self::into_header_value`].
pub struct PaymentProof {
    version: ProtocolVersion,
    encoded: String,
}

impl PaymentProof {
    /// Wraps an already-encoded header value.
    pub fn new(version: ProtocolVersion, encoded: impl Into<String>) -> Self {
        Self {
            version,
            encoded: encoded.into(),
        }
    }

    /// Encodes `payload` as base64 JSON, the wire form of x402 payment headers.
    ///
    /// # Errors
    ///
    /// Returns an error if `payload` fails to serialize.
    pub fn from_payload<T: Serialize + ?Sized>(
        version: ProtocolVersion,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        let encoded = Base64Bytes::encode_json(payload)?;
        Ok(Self::new(version, encoded.to_string()))
    }

    /// Protocol version of the challenge this proof answers. Decides the
    /// header the proof travels in.
    #[must_use]
    pub const fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// The encoded header value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    /// Consumes the proof, returning the header value.
    #[must_use]
    pub fn into_header_value(self) -> String {
        self.encoded
    }
}

impl fmt::Debug for PaymentProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentProof")
            .field("version", &self.version)
            .field("len", &self.encoded.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_does_not_leak_the_signed_payload() {
        let proof = PaymentProof::new(ProtocolVersion::V1, "c2VjcmV0");
        let debug = format!("{proof:?}");
        assert!(!debug.contains("c2VjcmV0"), "{debug}");
        assert!(debug.contains("len: 8"), "{debug}");
    }
}
