//! Payment challenges carried by `402 Payment Required` responses.
//!
//! A paid endpoint answers an unpaid request with a JSON body listing the
//! payment options it accepts:
//!
//! ```json
//! {
//!   "x402Version": 1,
//!   "error": "X-PAYMENT header is required",
//!   "accepts": [{
//!     "scheme": "exact",
//!     "network": "base",
//!     "maxAmountRequired": "10000",
//!     "resource": "https://api.example.com/v1/llm/gpt-4o-mini",
//!     "description": "LLM chat completion",
//!     "mimeType": "application/json",
//!     "payTo": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
//!     "maxTimeoutSeconds": 60,
//!     "asset": "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913",
//!     "extra": { "name": "USD Coin", "version": "2" }
//!   }]
//! }
//! ```
//!
//! Version 2 bodies use `amount` instead of `maxAmountRequired` and carry the
//! resource description at the top level. [`PaymentChallenge::from_body`]
//! accepts both and selects the first complete option.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::encoding::Base64Bytes;
use crate::error::Error;
use crate::timestamp::UnixTimestamp;

/// Scheme assumed when a requirement omits it.
pub const DEFAULT_SCHEME: &str = "exact";

/// Authorization window assumed when a requirement omits `maxTimeoutSeconds`.
pub const DEFAULT_MAX_TIMEOUT_SECONDS: u64 = 60;

/// x402 protocol version declared by a 402 body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ProtocolVersion {
    /// Network names (`base`), `X-PAYMENT` header.
    #[default]
    V1,
    /// CAIP-2 network ids (`eip155:8453`), `PAYMENT-SIGNATURE` header.
    V2,
}

impl TryFrom<u8> for ProtocolVersion {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::V1),
            2 => Ok(Self::V2),
            other => Err(format!("unsupported x402Version {other}")),
        }
    }
}

impl From<ProtocolVersion> for u8 {
    fn from(value: ProtocolVersion) -> Self {
        match value {
            ProtocolVersion::V1 => 1,
            ProtocolVersion::V2 => 2,
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", u8::from(*self))
    }
}

/// A single payment option the server is willing to accept.
///
/// Built from one entry of a 402 body's `accepts` list and scoped to the
/// request attempt that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentChallenge {
    /// Protocol version of the enclosing 402 body.
    pub version: ProtocolVersion,
    /// Payment scheme, e.g. `"exact"`.
    pub scheme: String,
    /// Network identifier, either a name (`"base"`) or CAIP-2 (`"eip155:8453"`).
    pub network: String,
    /// Required amount in the asset's smallest unit.
    pub amount: Decimal,
    /// Asset identifier, typically a token contract address.
    pub asset: String,
    /// Address that receives the payment.
    pub recipient: String,
    /// The resource being paid for.
    pub resource: Option<String>,
    /// Human-readable description of the resource.
    pub description: Option<String>,
    /// MIME type of the paid response.
    pub mime_type: Option<String>,
    /// Validity window of the signed authorization, in seconds.
    pub max_timeout_seconds: u64,
    /// Server-issued nonce, when the scheme uses one.
    pub nonce: Option<String>,
    /// Instant after which the server no longer honours this challenge.
    pub expires_at: Option<UnixTimestamp>,
    /// Scheme-specific data (EIP-712 domain name/version for EVM tokens).
    pub extra: Option<Value>,
    /// The `error` message of the 402 body.
    pub server_message: Option<String>,
    /// The selected `accepts` entry exactly as received.
    pub requirements: Value,
    /// Top-level resource object of a version 2 body.
    pub resource_info: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPaymentRequired {
    #[serde(default)]
    x402_version: Option<u8>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    resource: Option<Value>,
    #[serde(default)]
    accepts: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRequirements {
    scheme: Option<String>,
    network: Option<String>,
    #[serde(alias = "amount")]
    max_amount_required: Option<Value>,
    pay_to: Option<String>,
    asset: Option<String>,
    // Optional fields stay untyped: a value of the wrong shape is dropped
    // instead of disqualifying an otherwise complete option.
    resource: Option<Value>,
    description: Option<Value>,
    mime_type: Option<Value>,
    max_timeout_seconds: Option<Value>,
    nonce: Option<Value>,
    expires_at: Option<Value>,
    extra: Option<Value>,
}

impl PaymentChallenge {
    /// Parses a 402 response body.
    ///
    /// The first `accepts` entry that carries an amount, an asset, a network
    /// and a recipient is selected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedChallenge`] if the body is not JSON, declares
    /// an unknown protocol version, or has no complete payment option.
    pub fn from_body(body: &[u8]) -> Result<Self, Error> {
        let raw: RawPaymentRequired = serde_json::from_slice(body)
            .map_err(|e| Error::MalformedChallenge(format!("402 body is not valid JSON: {e}")))?;
        let version = raw
            .x402_version
            .map_or(Ok(ProtocolVersion::V1), ProtocolVersion::try_from)
            .map_err(Error::MalformedChallenge)?;

        let mut first_error = None;
        for (index, entry) in raw.accepts.into_iter().enumerate() {
            match Self::from_requirements(version, entry) {
                Ok(mut challenge) => {
                    #[cfg(feature = "telemetry")]
                    tracing::debug!(
                        index,
                        network = %challenge.network,
                        amount = %challenge.amount,
                        "Selected payment option"
                    );
                    challenge.server_message = raw.error;
                    if challenge.resource.is_none() {
                        challenge.resource = raw
                            .resource
                            .as_ref()
                            .and_then(|r| r.get("url"))
                            .and_then(Value::as_str)
                            .map(str::to_owned);
                    }
                    challenge.resource_info = raw.resource;
                    return Ok(challenge);
                }
                Err(reason) => {
                    first_error.get_or_insert(format!("accepts[{index}]: {reason}"));
                }
            }
        }

        Err(Error::MalformedChallenge(first_error.unwrap_or_else(|| {
            "402 body lists no payment requirements".to_owned()
        })))
    }

    /// Parses the base64 JSON carried in a version 2 `PAYMENT-REQUIRED` header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedChallenge`] if the value is not base64 or
    /// the decoded JSON fails [`Self::from_body`].
    pub fn from_header(value: &[u8]) -> Result<Self, Error> {
        let decoded = Base64Bytes::from(value).decode().map_err(|e| {
            Error::MalformedChallenge(format!("PAYMENT-REQUIRED header is not base64: {e}"))
        })?;
        Self::from_body(&decoded)
    }

    fn from_requirements(version: ProtocolVersion, entry: Value) -> Result<Self, String> {
        let raw: RawRequirements =
            serde_json::from_value(entry.clone()).map_err(|e| e.to_string())?;

        let mut missing = Vec::new();
        if raw.max_amount_required.is_none() {
            missing.push(match version {
                ProtocolVersion::V1 => "maxAmountRequired",
                ProtocolVersion::V2 => "amount",
            });
        }
        if non_empty(raw.asset.as_deref()).is_none() {
            missing.push("asset");
        }
        if non_empty(raw.network.as_deref()).is_none() {
            missing.push("network");
        }
        if non_empty(raw.pay_to.as_deref()).is_none() {
            missing.push("payTo");
        }
        if !missing.is_empty() {
            return Err(format!("missing {}", missing.join(", ")));
        }

        let amount = parse_amount(raw.max_amount_required.as_ref())?;

        Ok(Self {
            version,
            scheme: raw.scheme.unwrap_or_else(|| DEFAULT_SCHEME.to_owned()),
            network: raw.network.unwrap_or_default(),
            amount,
            asset: raw.asset.unwrap_or_default(),
            recipient: raw.pay_to.unwrap_or_default(),
            resource: raw.resource.as_ref().and_then(lenient_string),
            description: raw.description.as_ref().and_then(lenient_string),
            mime_type: raw.mime_type.as_ref().and_then(lenient_string),
            max_timeout_seconds: raw
                .max_timeout_seconds
                .as_ref()
                .and_then(lenient_u64)
                .unwrap_or(DEFAULT_MAX_TIMEOUT_SECONDS),
            nonce: raw.nonce.as_ref().and_then(lenient_string),
            expires_at: raw
                .expires_at
                .and_then(|v| serde_json::from_value::<UnixTimestamp>(v).ok()),
            extra: raw.extra,
            server_message: None,
            requirements: entry,
            resource_info: None,
        })
    }

    /// Converts [`Self::amount`] into whole units of an asset with
    /// `decimals` decimal places (`10000` with 6 decimals is `0.01`).
    #[must_use]
    pub fn display_amount(&self, decimals: u32) -> Decimal {
        let mut amount = self.amount;
        // set_scale only fails above 28 decimal places
        if amount.set_scale(amount.scale() + decimals).is_err() {
            return self.amount;
        }
        amount.normalize()
    }

    /// Returns `true` if the challenge carries an expiry that has passed.
    #[must_use]
    pub fn is_expired(&self, now: UnixTimestamp) -> bool {
        self.expires_at.is_some_and(|at| at.has_passed(now))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Strings as-is, numbers in their decimal form, anything else dropped.
fn lenient_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn lenient_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_amount(value: Option<&Value>) -> Result<Decimal, String> {
    let text = match value {
        Some(Value::String(s)) => s.trim().to_owned(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => return Err(format!("amount must be a string or number, got {other}")),
        None => return Err("missing amount".to_owned()),
    };
    let amount = Decimal::from_str(&text).map_err(|e| format!("invalid amount '{text}': {e}"))?;
    if amount.is_sign_negative() {
        return Err(format!("amount must not be negative, got {text}"));
    }
    Ok(amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn v1_body() -> Value {
        json!({
            "x402Version": 1,
            "error": "X-PAYMENT header is required",
            "accepts": [{
                "scheme": "exact",
                "network": "base",
                "maxAmountRequired": "1200000",
                "resource": "https://api.example.com/v1/sora/generate",
                "description": "Sora-2 video, 8 seconds",
                "mimeType": "application/json",
                "payTo": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
                "maxTimeoutSeconds": 300,
                "asset": "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913",
                "extra": { "name": "USD Coin", "version": "2" }
            }]
        })
    }

    fn parse(body: &Value) -> Result<PaymentChallenge, Error> {
        PaymentChallenge::from_body(&serde_json::to_vec(body).unwrap())
    }

    #[test]
    fn parses_v1_body() {
        let challenge = parse(&v1_body()).unwrap();
        assert_eq!(challenge.version, ProtocolVersion::V1);
        assert_eq!(challenge.scheme, "exact");
        assert_eq!(challenge.network, "base");
        assert_eq!(challenge.amount, Decimal::from(1_200_000));
        assert_eq!(
            challenge.recipient,
            "0x209693Bc6afc0C5328bA36FaF03C514EF312287C"
        );
        assert_eq!(challenge.max_timeout_seconds, 300);
        assert_eq!(
            challenge.server_message.as_deref(),
            Some("X-PAYMENT header is required")
        );
        assert_eq!(challenge.display_amount(6).to_string(), "1.2");
    }

    #[test]
    fn parses_v2_body_with_top_level_resource() {
        let body = json!({
            "x402Version": 2,
            "resource": { "url": "https://api.example.com/v1/veo3/fast/generate" },
            "accepts": [{
                "scheme": "exact",
                "network": "eip155:8453",
                "amount": 2_000_000,
                "payTo": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
                "asset": "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913",
                "maxTimeoutSeconds": 60,
                "expiresAt": "1900000000"
            }]
        });
        let challenge = parse(&body).unwrap();
        assert_eq!(challenge.version, ProtocolVersion::V2);
        assert_eq!(challenge.amount, Decimal::from(2_000_000));
        assert_eq!(
            challenge.resource.as_deref(),
            Some("https://api.example.com/v1/veo3/fast/generate")
        );
        assert!(challenge.resource_info.is_some());
        assert!(!challenge.is_expired(UnixTimestamp::from_secs(1_800_000_000)));
        assert!(challenge.is_expired(UnixTimestamp::from_secs(1_900_000_000)));
    }

    #[test]
    fn parses_base64_header() {
        let body = json!({
            "x402Version": 2,
            "accepts": [{
                "scheme": "exact",
                "network": "eip155:8453",
                "amount": "10000",
                "payTo": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
                "asset": "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"
            }]
        });
        let header = Base64Bytes::encode_json(&body).unwrap();
        let challenge = PaymentChallenge::from_header(&header.0).unwrap();
        assert_eq!(challenge.version, ProtocolVersion::V2);
        assert_eq!(challenge.network, "eip155:8453");

        assert!(matches!(
            PaymentChallenge::from_header(b"%%%"),
            Err(Error::MalformedChallenge(_))
        ));
    }

    #[test]
    fn skips_incomplete_options() {
        let mut body = v1_body();
        let complete = body["accepts"][0].clone();
        body["accepts"] = json!([{ "scheme": "exact", "network": "solana" }, complete]);
        let challenge = parse(&body).unwrap();
        assert_eq!(challenge.network, "base");
    }

    #[test]
    fn missing_required_fields_are_malformed() {
        let mut body = v1_body();
        body["accepts"][0]
            .as_object_mut()
            .unwrap()
            .remove("payTo");
        body["accepts"][0]
            .as_object_mut()
            .unwrap()
            .remove("maxAmountRequired");
        let err = parse(&body).unwrap_err();
        let Error::MalformedChallenge(reason) = err else {
            panic!("expected MalformedChallenge, got {err:?}");
        };
        assert!(reason.contains("maxAmountRequired"), "{reason}");
        assert!(reason.contains("payTo"), "{reason}");
    }

    #[test]
    fn empty_or_non_json_bodies_are_malformed() {
        assert!(matches!(
            parse(&json!({ "x402Version": 1, "accepts": [] })),
            Err(Error::MalformedChallenge(_))
        ));
        assert!(matches!(
            PaymentChallenge::from_body(b"Payment Required"),
            Err(Error::MalformedChallenge(_))
        ));
        assert!(matches!(
            parse(&json!({ "x402Version": 7, "accepts": [] })),
            Err(Error::MalformedChallenge(_))
        ));
    }

    #[test]
    fn odd_optional_fields_do_not_disqualify_an_option() {
        let mut body = v1_body();
        body["accepts"][0]["maxTimeoutSeconds"] = json!("120");
        body["accepts"][0]["nonce"] = json!(12345);
        body["accepts"][0]["expiresAt"] = json!("2030-01-01T00:00:00Z");
        body["accepts"][0]["description"] = json!({ "en": "video" });
        let challenge = parse(&body).unwrap();
        assert_eq!(challenge.max_timeout_seconds, 120);
        assert_eq!(challenge.nonce.as_deref(), Some("12345"));
        assert_eq!(challenge.expires_at, None);
        assert_eq!(challenge.description, None);

        body["accepts"][0]["maxTimeoutSeconds"] = json!(-1);
        let challenge = parse(&body).unwrap();
        assert_eq!(challenge.max_timeout_seconds, DEFAULT_MAX_TIMEOUT_SECONDS);
    }

    #[test]
    fn rejects_negative_and_garbage_amounts() {
        let mut body = v1_body();
        body["accepts"][0]["maxAmountRequired"] = json!("-5");
        assert!(parse(&body).is_err());
        body["accepts"][0]["maxAmountRequired"] = json!("ten");
        assert!(parse(&body).is_err());
    }
}
