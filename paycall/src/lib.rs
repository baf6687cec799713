#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for consuming pay-per-call HTTP APIs.
//!
//! Paid endpoints answer an unpaid request with `402 Payment Required` and a
//! machine-readable challenge. A client signs a payment proof for that
//! challenge and replays the request with the proof attached. Long-running
//! work (media generation) then completes asynchronously and is observed
//! through a free status endpoint.
//!
//! This crate holds the transport-agnostic pieces of that flow; the reqwest
//! client and the status poller live in `paycall-http`.
//!
//! # Modules
//!
//! - [`challenge`] - Parsing of 402 bodies into a [`PaymentChallenge`]
//! - [`proof`] - The signed [`PaymentProof`] attached to the retry
//! - [`signer`] - The [`Signer`] seam to wallet/key-management collaborators
//! - [`job`] - Job handles, status payloads and the job state machine
//! - [`config`] - Explicit client and polling configuration
//! - [`error`] - The typed error taxonomy shared by all crates
//! - [`encoding`] - Base64 helpers for header payloads
//! - [`timestamp`] - Unix timestamps used in payment authorization windows
//!
//! # Feature Flags
//!
//! - `env` - Enables [`ClientConfig::from_env`] (reads `.env` via `dotenvy`)
//! - `telemetry` - Enables tracing instrumentation

pub mod challenge;
pub mod config;
pub mod encoding;
pub mod error;
pub mod job;
pub mod proof;
pub mod signer;
pub mod timestamp;

pub use challenge::{PaymentChallenge, ProtocolVersion};
pub use config::{ClientConfig, PollConfig};
pub use error::{BoxError, Error, SignerError};
pub use job::{JobHandle, JobResult, JobState, JobStatus};
pub use proof::PaymentProof;
pub use signer::Signer;
