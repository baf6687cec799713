//! Known EVM networks and their USDC deployments.
//!
//! Challenges name networks either by a short name (`"base"`) or by a CAIP-2
//! identifier (`"eip155:8453"`). [`resolve_chain_id`] accepts both.

use alloy_primitives::{Address, address};

/// An EIP-155 chain ID (e.g., 8453 for Base, 137 for Polygon).
pub type ChainId = u64;

/// Default EIP-712 domain name for USDC.
pub const DEFAULT_USDC_NAME: &str = "USD Coin";

/// Default EIP-712 domain version for USDC.
pub const DEFAULT_USDC_VERSION: &str = "2";

/// A known EVM network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvmNetwork {
    /// Short name used by version 1 challenges.
    pub name: &'static str,
    /// EIP-155 chain ID.
    pub chain_id: ChainId,
    /// USDC contract address.
    pub usdc: Address,
}

impl EvmNetwork {
    /// CAIP-2 identifier of this network.
    #[must_use]
    pub fn caip2(&self) -> String {
        caip2(self.chain_id)
    }
}

/// Networks this crate knows by name.
pub const EVM_NETWORKS: &[EvmNetwork] = &[
    EvmNetwork {
        name: "base",
        chain_id: 8453,
        usdc: address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"),
    },
    EvmNetwork {
        name: "base-sepolia",
        chain_id: 84532,
        usdc: address!("036CbD53842c5426634e7929541eC2318f3dCF7e"),
    },
    EvmNetwork {
        name: "ethereum",
        chain_id: 1,
        usdc: address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
    },
    EvmNetwork {
        name: "polygon",
        chain_id: 137,
        usdc: address!("3c499c542cEF5E3811e1192ce70d8cC03d5c3359"),
    },
    EvmNetwork {
        name: "polygon-amoy",
        chain_id: 80002,
        usdc: address!("41E94Eb71Ef8C9fAE0235d1e472b21E21B5a4dbF"),
    },
    EvmNetwork {
        name: "avalanche",
        chain_id: 43114,
        usdc: address!("B97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E"),
    },
    EvmNetwork {
        name: "avalanche-fuji",
        chain_id: 43113,
        usdc: address!("5425890298aed601595a70AB815c96711a31Bc65"),
    },
    EvmNetwork {
        name: "celo",
        chain_id: 42220,
        usdc: address!("cebA9300f2b948710d2653dD7B07f33A8B32118C"),
    },
];

/// Formats a chain ID as a CAIP-2 identifier.
///
/// Example: `caip2(8453)` returns `"eip155:8453"`.
#[must_use]
pub fn caip2(chain_id: ChainId) -> String {
    format!("eip155:{chain_id}")
}

/// Parses a CAIP-2 identifier into an EIP-155 chain ID.
///
/// Returns `None` if the input is not a valid `eip155:` prefixed string.
#[must_use]
pub fn parse_caip2(caip: &str) -> Option<ChainId> {
    caip.strip_prefix("eip155:").and_then(|s| s.parse().ok())
}

/// Looks up a known network by short name or CAIP-2 identifier.
#[must_use]
pub fn network_by_name(network: &str) -> Option<&'static EvmNetwork> {
    let chain_id = parse_caip2(network);
    EVM_NETWORKS
        .iter()
        .find(|n| n.name.eq_ignore_ascii_case(network) || Some(n.chain_id) == chain_id)
}

/// Looks up a known network by chain ID.
#[must_use]
pub fn network_by_chain_id(chain_id: ChainId) -> Option<&'static EvmNetwork> {
    EVM_NETWORKS.iter().find(|n| n.chain_id == chain_id)
}

/// Resolves a challenge's network to a chain ID.
///
/// Short names must be known; any well-formed `eip155:<id>` is accepted.
#[must_use]
pub fn resolve_chain_id(network: &str) -> Option<ChainId> {
    network_by_name(network)
        .map(|n| n.chain_id)
        .or_else(|| parse_caip2(network))
}
