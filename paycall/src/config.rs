//! Client configuration.
//!
//! Everything a client needs is passed in explicitly through
//! [`ClientConfig`]; nothing in the library reads process-wide state.
//! Applications that keep settings in the environment can opt into
//! [`ClientConfig::from_env`] (feature `env`).
//!
//! # Example
//!
//! ```toml
//! base_url = "https://beatsx402.ai"
//!
//! [poll]
//! interval = 5.0
//! max_attempts = 60
//! ```
//!
//! # Environment Variables (feature `env`)
//!
//! - `API_BASE_URL` - base URL of the paid API (default: `https://beatsx402.ai`)
//! - `PAYCALL_POLL_INTERVAL_SECS` - seconds between status reads (default: `5`)
//! - `PAYCALL_POLL_MAX_ATTEMPTS` - status reads before giving up (default: `60`)

use std::env::VarError;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{DurationSecondsWithFrac, serde_as};
use url::Url;

use crate::error::Error;
use crate::job::JobHandle;

/// Base URL used when none is configured.
pub const DEFAULT_BASE_URL: &str = "https://beatsx402.ai";

/// Default delay between status reads.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default number of status reads.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 60;

/// Environment variable holding the API base URL.
pub const API_BASE_URL_ENV: &str = "API_BASE_URL";

/// Environment variable holding the poll interval in seconds.
pub const POLL_INTERVAL_ENV: &str = "PAYCALL_POLL_INTERVAL_SECS";

/// Environment variable holding the poll attempt budget.
pub const POLL_MAX_ATTEMPTS_ENV: &str = "PAYCALL_POLL_MAX_ATTEMPTS";

/// Errors raised while building a [`ClientConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The base URL does not parse.
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),

    /// An environment variable holds an unusable value.
    #[error("invalid value for {name}: '{value}'")]
    InvalidVar {
        /// Variable name.
        name: &'static str,
        /// The offending value.
        value: String,
    },

    /// A `.env` file exists but could not be loaded.
    #[cfg(feature = "env")]
    #[error("failed to load .env file: {0}")]
    DotEnv(#[source] dotenvy::Error),
}

/// Fixed-interval polling budget.
///
/// The total wait is bounded by `interval * max_attempts` counted attempts,
/// not by a wall-clock deadline.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Delay before each status read.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub interval: Duration,
    /// Maximum number of status reads.
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl PollConfig {
    /// Creates a polling budget.
    #[must_use]
    pub const fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Checks that both the interval and the attempt count are positive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPollConfig`] otherwise.
    pub fn validate(&self) -> Result<(), Error> {
        if self.interval.is_zero() {
            return Err(Error::InvalidPollConfig(
                "interval must be greater than zero".to_owned(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(Error::InvalidPollConfig(
                "max_attempts must be greater than zero".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Connection settings for a paid API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL the `/v1/...` paths are resolved against.
    #[serde(default = "default_base_url")]
    pub base_url: Url,
    /// Status polling budget.
    #[serde(default)]
    pub poll: PollConfig,
}

fn default_base_url() -> Url {
    Url::parse(DEFAULT_BASE_URL).expect("default base URL is valid")
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(default_base_url())
    }
}

impl ClientConfig {
    /// Creates a configuration with default polling.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            poll: PollConfig::default(),
        }
    }

    /// Parses `base_url` and creates a configuration with default polling.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBaseUrl`] if the URL does not parse.
    pub fn parse(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self::new(Url::parse(base_url)?))
    }

    /// Replaces the polling budget.
    #[must_use]
    pub const fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Resolves an API path such as `v1/sora/generate` against the base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the joined URL does not parse.
    pub fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        base.join(path.trim_start_matches('/'))
    }

    /// Status URL of a job.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL cannot carry a path.
    pub fn status_url(&self, handle: &JobHandle) -> Result<Url, url::ParseError> {
        handle.status_url(&self.base_url)
    }

    /// Loads the configuration from the environment, reading a `.env` file
    /// first if one exists. Unset variables fall back to the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DotEnv`] if a `.env` file exists but cannot be
    /// read or parsed, and [`ConfigError::InvalidVar`] if a variable is set
    /// to an unusable value.
    #[cfg(feature = "env")]
    pub fn from_env() -> Result<Self, ConfigError> {
        ignore_missing(dotenvy::dotenv())?;
        Self::from_vars(std::env::var)
    }

    /// Builds the configuration from a variable lookup shaped like
    /// [`std::env::var`]. Variables that are not present fall back to the
    /// defaults; values that are not valid unicode are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set to an unusable value.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Result<String, VarError>,
    {
        let read = |name: &'static str| match lookup(name) {
            Ok(value) => Ok(Some(value)),
            Err(VarError::NotPresent) => Ok(None),
            Err(VarError::NotUnicode(raw)) => Err(ConfigError::InvalidVar {
                name,
                value: raw.to_string_lossy().into_owned(),
            }),
        };

        let base_url = match read(API_BASE_URL_ENV)? {
            Some(value) => Url::parse(value.trim())?,
            None => default_base_url(),
        };

        let mut poll = PollConfig::default();
        if let Some(value) = read(POLL_INTERVAL_ENV)? {
            poll.interval = value
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
                .ok_or(ConfigError::InvalidVar {
                    name: POLL_INTERVAL_ENV,
                    value,
                })?;
        }
        if let Some(value) = read(POLL_MAX_ATTEMPTS_ENV)? {
            poll.max_attempts = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidVar {
                    name: POLL_MAX_ATTEMPTS_ENV,
                    value,
                })?;
        }

        #[cfg(feature = "telemetry")]
        tracing::debug!(base_url = %base_url, ?poll, "Loaded client configuration");

        Ok(Self { base_url, poll })
    }
}

/// A missing `.env` file is fine; an unreadable or malformed one is not.
#[cfg(feature = "env")]
fn ignore_missing<T>(loaded: Result<T, dotenvy::Error>) -> Result<(), ConfigError> {
    match loaded {
        Ok(_) => Ok(()),
        Err(dotenvy::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ConfigError::DotEnv(e)),
    }
}
