//! Wire types of the EIP-155 "exact" scheme.
//!
//! The proof sent to the server is the base64 encoding of a JSON
//! [`PaymentPayloadV1`] or [`PaymentPayloadV2`] wrapping an
//! [`Eip3009Payload`].

use alloy_primitives::{Address, B256, Bytes};
use alloy_sol_types::sol;
use paycall::timestamp::UnixTimestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::networks::{DEFAULT_USDC_NAME, DEFAULT_USDC_VERSION};

/// The only scheme this crate signs for.
pub const EXACT_SCHEME: &str = "exact";

sol!(
    /// ERC-3009 `transferWithAuthorization` message, as hashed under EIP-712.
    struct TransferWithAuthorization {
        address from;
        address to;
        uint256 value;
        uint256 validAfter;
        uint256 validBefore;
        bytes32 nonce;
    }
);

/// The authorization that was signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eip3009Authorization {
    /// Token owner.
    pub from: Address,
    /// Recipient.
    pub to: Address,
    /// Amount in the token's smallest unit, as a decimal string.
    pub value: String,
    /// Not valid before this instant.
    pub valid_after: UnixTimestamp,
    /// Not valid at or after this instant.
    pub valid_before: UnixTimestamp,
    /// Random 32-byte nonce.
    pub nonce: B256,
}

/// Signature plus the authorization it covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eip3009Payload {
    /// 65-byte EOA signature.
    pub signature: Bytes,
    /// The signed authorization.
    pub authorization: Eip3009Authorization,
}

/// EIP-712 domain overrides carried in a challenge's `extra` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequirementsExtra {
    /// Token name used in the EIP-712 domain.
    pub name: String,
    /// Token version used in the EIP-712 domain.
    pub version: String,
}

/// The domain of the USDC deployments in [`EVM_NETWORKS`](crate::networks::EVM_NETWORKS).
impl Default for PaymentRequirementsExtra {
    fn default() -> Self {
        Self {
            name: DEFAULT_USDC_NAME.to_owned(),
            version: DEFAULT_USDC_VERSION.to_owned(),
        }
    }
}

impl PaymentRequirementsExtra {
    /// Reads the domain from a challenge's `extra`, if it carries one.
    #[must_use]
    pub fn from_extra(extra: Option<&Value>) -> Option<Self> {
        extra.and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Version 1 payment payload, sent in `X-PAYMENT`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayloadV1 {
    /// Always `1`.
    pub x402_version: u8,
    /// Always `"exact"`.
    pub scheme: String,
    /// Network name as given by the challenge.
    pub network: String,
    /// The signed authorization.
    pub payload: Eip3009Payload,
}

/// Version 2 payment payload, sent in `PAYMENT-SIGNATURE`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayloadV2 {
    /// Always `2`.
    pub x402_version: u8,
    /// The accepted requirements, echoed verbatim.
    pub accepted: Value,
    /// The resource object of the 402 body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Value>,
    /// The signed authorization.
    pub payload: Eip3009Payload,
}
