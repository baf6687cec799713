//! Local private-key signer for ERC-3009 `transferWithAuthorization` payments.

use std::str::FromStr;

use alloy_primitives::{Address, FixedBytes, U256};
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{SolStruct, eip712_domain};
use paycall::timestamp::UnixTimestamp;
use paycall::{PaymentChallenge, PaymentProof, ProtocolVersion, Signer, SignerError};
use rand::RngExt;
use rand::rng;
use rust_decimal::Decimal;
#[cfg(feature = "telemetry")]
use tracing::{debug, instrument};

use crate::networks::{ChainId, EVM_NETWORKS, caip2, network_by_chain_id, resolve_chain_id};
use crate::types::{
    EXACT_SCHEME, Eip3009Authorization, Eip3009Payload, PaymentPayloadV1, PaymentPayloadV2,
    PaymentRequirementsExtra, TransferWithAuthorization,
};

/// How far in the past `validAfter` is placed, to tolerate clock skew.
const VALID_AFTER_SKEW_SECS: u64 = 10 * 60;

/// Signs "exact" EVM challenges with a local private key.
///
/// Optionally restricted to a set of chains and capped per payment. The cap
/// is in the asset's smallest unit and is checked before anything is signed.
pub struct LocalEvmSigner {
    signer: PrivateKeySigner,
    chain_ids: Option<Vec<ChainId>>,
    max_amount: Option<Decimal>,
}

impl std::fmt::Debug for LocalEvmSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalEvmSigner")
            .field("address", &self.signer.address())
            .field("chain_ids", &self.chain_ids)
            .field("max_amount", &self.max_amount)
            .finish()
    }
}

impl LocalEvmSigner {
    /// Wraps an existing key.
    #[must_use]
    pub const fn new(signer: PrivateKeySigner) -> Self {
        Self {
            signer,
            chain_ids: None,
            max_amount: None,
        }
    }

    /// Parses a hex private key, with or without `0x`.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::Unavailable`] if the key does not parse.
    pub fn from_hex_key(key: &str) -> Result<Self, SignerError> {
        PrivateKeySigner::from_str(key.trim())
            .map(Self::new)
            .map_err(|e| SignerError::Unavailable(format!("invalid private key: {e}")))
    }

    /// Generates a fresh random key, e.g. for a new throwaway wallet.
    #[must_use]
    pub fn random() -> Self {
        Self::new(PrivateKeySigner::random())
    }

    /// Restricts signing to the given chains.
    #[must_use]
    pub fn with_networks(mut self, chain_ids: impl IntoIterator<Item = ChainId>) -> Self {
        self.chain_ids = Some(chain_ids.into_iter().collect());
        self
    }

    /// Refuses payments above `max_amount` (smallest unit).
    #[must_use]
    pub const fn with_max_amount(mut self, max_amount: Decimal) -> Self {
        self.max_amount = Some(max_amount);
        self
    }

    /// Address payments are made from.
    #[must_use]
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    fn supported_networks(&self) -> String {
        match &self.chain_ids {
            Some(ids) => ids.iter().map(|id| caip2(*id)).collect::<Vec<_>>().join(", "),
            None => EVM_NETWORKS
                .iter()
                .map(|n| n.name)
                .chain(["eip155:*"])
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    fn chain_id_for(&self, network: &str) -> Result<ChainId, SignerError> {
        let allowed = |id: &ChainId| {
            self.chain_ids
                .as_ref()
                .is_none_or(|ids| ids.contains(id))
        };
        resolve_chain_id(network)
            .filter(allowed)
            .ok_or_else(|| SignerError::NetworkMismatch {
                required: network.to_owned(),
                supported: self.supported_networks(),
            })
    }

    fn check_amount(&self, amount: Decimal) -> Result<U256, SignerError> {
        if amount.is_sign_negative() || !amount.fract().is_zero() {
            return Err(SignerError::Rejected(format!(
                "amount {amount} is not a whole number of base units"
            )));
        }
        if let Some(cap) = self.max_amount.filter(|cap| amount > *cap) {
            return Err(SignerError::InsufficientFunds(format!(
                "payment of {amount} exceeds the spending cap of {cap}"
            )));
        }
        U256::from_str(&amount.trunc().normalize().to_string())
            .map_err(|e| SignerError::Rejected(format!("amount {amount}: {e}")))
    }

    /// Signs the ERC-3009 authorization for `challenge`.
    async fn authorize(
        &self,
        chain_id: ChainId,
        challenge: &PaymentChallenge,
        amount: U256,
    ) -> Result<Eip3009Payload, SignerError> {
        let asset = parse_address("asset", &challenge.asset)?;
        let pay_to = parse_address("payTo", &challenge.recipient)?;
        let extra = domain_for(chain_id, asset, challenge.extra.as_ref())?;

        let domain = eip712_domain! {
            name: extra.name,
            version: extra.version,
            chain_id: chain_id,
            verifying_contract: asset,
        };

        let now = UnixTimestamp::now();
        let valid_after = UnixTimestamp::from_secs(now.as_secs().saturating_sub(VALID_AFTER_SKEW_SECS));
        let valid_before = now + challenge.max_timeout_seconds;
        let nonce: [u8; 32] = rng().random();
        let nonce = FixedBytes(nonce);

        let message = TransferWithAuthorization {
            from: self.signer.address(),
            to: pay_to,
            value: amount,
            validAfter: U256::from(valid_after.as_secs()),
            validBefore: U256::from(valid_before.as_secs()),
            nonce,
        };

        let hash = message.eip712_signing_hash(&domain);
        let signature = alloy_signer::Signer::sign_hash(&self.signer, &hash)
            .await
            .map_err(|e| SignerError::Unavailable(format!("signing failed: {e}")))?;

        Ok(Eip3009Payload {
            signature: signature.as_bytes().into(),
            authorization: Eip3009Authorization {
                from: message.from,
                to: message.to,
                value: amount.to_string(),
                valid_after,
                valid_before,
                nonce,
            },
        })
    }
}

/// EIP-712 domain of the token: from the challenge's `extra`, or USDC's when
/// the asset is the known USDC deployment of the chain.
fn domain_for(
    chain_id: ChainId,
    asset: Address,
    extra: Option<&serde_json::Value>,
) -> Result<PaymentRequirementsExtra, SignerError> {
    if let Some(domain) = PaymentRequirementsExtra::from_extra(extra) {
        return Ok(domain);
    }
    match network_by_chain_id(chain_id) {
        Some(network) if network.usdc == asset => Ok(PaymentRequirementsExtra::default()),
        _ => Err(SignerError::Rejected(format!(
            "no EIP-712 domain given for asset {asset} on {}",
            caip2(chain_id)
        ))),
    }
}

fn parse_address(field: &str, value: &str) -> Result<Address, SignerError> {
    Address::from_str(value.trim())
        .map_err(|e| SignerError::Rejected(format!("invalid {field} address '{value}': {e}")))
}

#[async_trait::async_trait]
impl Signer for LocalEvmSigner {
    #[cfg_attr(
        feature = "telemetry",
        instrument(
            name = "paycall.evm.sign",
            skip_all,
            fields(network = %challenge.network, amount = %challenge.amount),
            err
        )
    )]
    async fn sign(&self, challenge: &PaymentChallenge) -> Result<PaymentProof, SignerError> {
        if challenge.scheme != EXACT_SCHEME {
            return Err(SignerError::Rejected(format!(
                "unsupported scheme '{}'",
                challenge.scheme
            )));
        }
        if challenge.is_expired(UnixTimestamp::now()) {
            return Err(SignerError::Rejected("challenge has expired".to_owned()));
        }
        let chain_id = self.chain_id_for(&challenge.network)?;
        let amount = self.check_amount(challenge.amount)?;
        let payload = self.authorize(chain_id, challenge, amount).await?;

        #[cfg(feature = "telemetry")]
        debug!(chain_id, from = %payload.authorization.from, "Signed transferWithAuthorization");

        let encoded = match challenge.version {
            ProtocolVersion::V1 => PaymentProof::from_payload(
                ProtocolVersion::V1,
                &PaymentPayloadV1 {
                    x402_version: 1,
                    scheme: EXACT_SCHEME.to_owned(),
                    network: challenge.network.clone(),
                    payload,
                },
            ),
            ProtocolVersion::V2 => PaymentProof::from_payload(
                ProtocolVersion::V2,
                &PaymentPayloadV2 {
                    x402_version: 2,
                    accepted: challenge.requirements.clone(),
                    resource: challenge.resource_info.clone(),
                    payload,
                },
            ),
        };
        encoded.map_err(|e| SignerError::Rejected(format!("cannot encode payment payload: {e}")))
    }
}
