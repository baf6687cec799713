//! Fixed-interval polling of job status endpoints.
//!
//! Status reads are free: no payment is attached and a 402 from a status
//! endpoint is reported as [`Error::UnexpectedStatus`].
//!
//! Each attempt sleeps for the configured interval, reads the status, invokes
//! the caller's callback, then checks for a terminal state. Unknown states
//! keep the poll running until the attempt budget is spent.

use std::time::{Duration, Instant};

use paycall::{ClientConfig, Error, JobHandle, JobResult, JobState, JobStatus, PollConfig};
use reqwest::Client;
use tokio_util::sync::CancellationToken;
#[cfg(feature = "telemetry")]
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Polls a job status URL until the job completes, fails, or the attempt
/// budget runs out.
///
/// Stateless apart from the HTTP client; a single poller can drive any number
/// of concurrent waits.
#[derive(Debug, Clone, Default)]
pub struct JobPoller {
    client: Client,
}

/// Per-wait bookkeeping.
struct PollSession {
    attempts: u32,
    max_attempts: u32,
    interval: Duration,
    started: Instant,
}

impl PollSession {
    fn new(config: &PollConfig) -> Self {
        Self {
            attempts: 0,
            max_attempts: config.max_attempts,
            interval: config.interval,
            started: Instant::now(),
        }
    }

    const fn exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    fn timeout(&self) -> Error {
        Error::PollTimeout {
            attempts: self.attempts,
            elapsed: self.started.elapsed(),
        }
    }

    const fn cancelled(&self) -> Error {
        Error::Cancelled {
            attempts: self.attempts,
        }
    }
}

impl JobPoller {
    /// Creates a poller with a default reqwest client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a poller that reads through `client`.
    #[must_use]
    pub const fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Reads a status URL once.
    ///
    /// # Errors
    ///
    /// - [`Error::Transport`] if the request fails or the body is not a status object
    /// - [`Error::UnexpectedStatus`] for a non-success HTTP status
    #[cfg_attr(feature = "telemetry", instrument(name = "paycall.status", skip_all, fields(url = %url), err))]
    pub async fn fetch_status(&self, url: &Url) -> Result<JobStatus, Error> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(Error::transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.map_err(Error::transport)?;
            return Err(Error::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await.map_err(Error::transport)?;
        serde_json::from_slice(&bytes).map_err(Error::transport)
    }

    /// Polls `url` until a terminal state is observed.
    ///
    /// `on_status` receives every status read together with the 1-based
    /// attempt number and the attempt budget, before the terminal check.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidPollConfig`] before any request if the budget is invalid
    /// - [`Error::GenerationFailed`] when the job reports `failed`
    /// - [`Error::PollTimeout`] when `max_attempts` reads saw no terminal state
    /// - any error from [`Self::fetch_status`]
    pub async fn wait<F>(
        &self,
        url: &Url,
        config: &PollConfig,
        on_status: F,
    ) -> Result<JobResult, Error>
    where
        F: FnMut(&JobStatus, u32, u32),
    {
        self.wait_with_cancel(url, config, on_status, &CancellationToken::new())
            .await
    }

    /// Same as [`Self::wait`], stopping early with [`Error::Cancelled`] once
    /// `cancel` fires. Cancellation interrupts both the sleep and an
    /// in-flight status read.
    ///
    /// # Errors
    ///
    /// See [`Self::wait`].
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "paycall.poll", skip_all, fields(url = %url, max_attempts = config.max_attempts))
    )]
    pub async fn wait_with_cancel<F>(
        &self,
        url: &Url,
        config: &PollConfig,
        mut on_status: F,
        cancel: &CancellationToken,
    ) -> Result<JobResult, Error>
    where
        F: FnMut(&JobStatus, u32, u32),
    {
        config.validate()?;
        let mut session = PollSession::new(config);

        while !session.exhausted() {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(session.cancelled()),
                () = tokio::time::sleep(session.interval) => {}
            }

            session.attempts += 1;
            let status = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(session.cancelled()),
                status = self.fetch_status(url) => status?,
            };

            #[cfg(feature = "telemetry")]
            debug!(
                attempt = session.attempts,
                max_attempts = session.max_attempts,
                state = %status.status,
                "Polled job status"
            );

            on_status(&status, session.attempts, session.max_attempts);

            match status.status {
                JobState::Completed => {
                    #[cfg(feature = "telemetry")]
                    info!(attempts = session.attempts, "Job completed");
                    return Ok(JobResult {
                        status,
                        attempts: session.attempts,
                        elapsed: session.started.elapsed(),
                    });
                }
                JobState::Failed => {
                    let reason = status.failure_message();
                    #[cfg(feature = "telemetry")]
                    warn!(attempts = session.attempts, %reason, "Job failed");
                    return Err(Error::GenerationFailed(reason));
                }
                JobState::Pending
                | JobState::InQueue
                | JobState::InProgress
                | JobState::Unknown(_) => {}
            }
        }

        #[cfg(feature = "telemetry")]
        warn!(attempts = session.attempts, "Job did not finish within the attempt budget");
        Err(session.timeout())
    }

    /// Polls the status URL of `handle` under `config`.
    ///
    /// # Errors
    ///
    /// See [`Self::wait`]. A base URL that cannot carry a path is reported as
    /// [`Error::Transport`].
    pub async fn wait_for_job<F>(
        &self,
        handle: &JobHandle,
        config: &ClientConfig,
        on_status: F,
    ) -> Result<JobResult, Error>
    where
        F: FnMut(&JobStatus, u32, u32),
    {
        let url = config.status_url(handle).map_err(Error::transport)?;
        #[cfg(feature = "telemetry")]
        info!(job = %handle, url = %url, "Waiting for job");
        self.wait(&url, &config.poll, on_status).await
    }
}
