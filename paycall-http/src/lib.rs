#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! reqwest transport for paycall.
//!
//! - [`client`] - [`PaymentRetryClient`] and the [`PaymentMiddleware`] it is
//!   built on: turn a `402 Payment Required` into one signed retry
//! - [`poller`] - [`JobPoller`]: wait for an asynchronous job through its free
//!   status endpoint
//! - [`constants`] - header names and status codes
//!
//! # Example
//!
//! ```no_run
//! # async fn run(signer: impl paycall::Signer + 'static) -> Result<(), paycall::Error> {
//! use paycall::{ClientConfig, JobHandle};
//! use paycall_http::{JobPoller, PaymentRetryClient};
//!
//! let config = ClientConfig::default();
//! let client = PaymentRetryClient::new(signer);
//! let url = config.endpoint("v1/sora/generate").map_err(paycall::Error::transport)?;
//! let response = client
//!     .post_json(url, &serde_json::json!({ "prompt": "jellyfish", "duration": 8 }))
//!     .await?;
//! let body: serde_json::Value = response.json().await.map_err(paycall::Error::transport)?;
//!
//! if let Some(handle) = JobHandle::from_response(&body) {
//!     let result = JobPoller::new()
//!         .wait_for_job(&handle, &config, |_, _, _| {})
//!         .await?;
//!     println!("{:?}", result.video_url());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation

pub mod client;
pub mod constants;
pub mod poller;

pub use client::{PaymentHooks, PaymentMiddleware, PaymentRetryClient};
pub use poller::JobPoller;
