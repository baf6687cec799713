#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! EIP-155 (EVM) payment signer for paycall.
//!
//! [`LocalEvmSigner`] answers "exact" scheme challenges with an ERC-3009
//! `transferWithAuthorization` signed under EIP-712 by a local private key.
//! Version 1 challenges name networks (`"base"`), version 2 challenges use
//! CAIP-2 ids (`"eip155:8453"`); both are supported.
//!
//! # Modules
//!
//! - [`networks`] - Known chains and their USDC deployments
//! - [`types`] - Wire format of the signed payload
//! - [`signer`] - The [`LocalEvmSigner`]
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation

pub mod networks;
pub mod signer;
pub mod types;

pub use networks::{ChainId, EVM_NETWORKS, EvmNetwork, caip2, parse_caip2, resolve_chain_id};
pub use signer::LocalEvmSigner;
