//! Asynchronous jobs started by paid requests.
//!
//! A paid generation endpoint either returns its result directly or a
//! `generation_id`. The id becomes a [`JobHandle`], from which the free
//! status URL `{base}/v1/status/{id}` is derived. Each status read parses
//! into a [`JobStatus`].
//!
//! ```text
//! Start ─▶ {Pending, InQueue, InProgress}* ─▶ Completed | Failed
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use url::Url;

/// Message used when the server reports a failure without saying why.
pub const UNKNOWN_FAILURE_MESSAGE: &str = "Unknown error";

/// Identifier of an asynchronous job, as returned by a paid generation request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    /// Wraps a job identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extracts the `generation_id` of a generation response.
    ///
    /// Returns `None` when the response carries its result directly.
    #[must_use]
    pub fn from_response(response: &Value) -> Option<Self> {
        response
            .get("generation_id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(Self::new)
    }

    /// Derives `{base}/v1/status/{id}`. The id is percent-encoded as a single
    /// path segment.
    ///
    /// # Errors
    ///
    /// Returns an error if `base` cannot carry a path (e.g. `mailto:`).
    pub fn status_url(&self, base: &Url) -> Result<Url, url::ParseError> {
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|()| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(["v1", "status", self.as_str()]);
        Ok(url)
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state reported by a status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JobState {
    /// Accepted, not yet queued.
    Pending,
    /// Waiting for a worker.
    InQueue,
    /// Being processed.
    InProgress,
    /// Finished successfully. Terminal.
    Completed,
    /// Finished with an error. Terminal.
    Failed,
    /// A state this client does not know. Treated as still running.
    Unknown(String),
}

impl JobState {
    /// Wire name of the state.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::InQueue => "in_queue",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Unknown(other) => other,
        }
    }

    /// `true` for [`JobState::Completed`] and [`JobState::Failed`].
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl FromStr for JobState {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pending" => Self::Pending,
            "in_queue" => Self::InQueue,
            "in_progress" => Self::InProgress,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            other => Self::Unknown(other.to_owned()),
        })
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for JobState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for JobState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let Ok(state) = s.parse::<Self>();
        Ok(state)
    }
}

/// Body of a status read: `{status, error?, video_url?, duration?, resolution?, ...}`.
///
/// Fields this type does not name are kept in [`Self::extra`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    /// Current state.
    pub status: JobState,
    /// Failure reason, when `status` is `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Result artifact of a completed video job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    /// Duration of the generated media, as the server reports it (`8` or `"8s"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<Value>,
    /// Resolution of the generated media.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    /// Everything else the server sent.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JobStatus {
    /// Failure reason, falling back to [`UNKNOWN_FAILURE_MESSAGE`].
    #[must_use]
    pub fn failure_message(&self) -> String {
        self.error
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(UNKNOWN_FAILURE_MESSAGE)
            .to_owned()
    }
}

/// A job observed in the `completed` state.
#[derive(Debug, Clone, PartialEq)]
pub struct JobResult {
    /// The completed status body.
    pub status: JobStatus,
    /// Status fetches it took to observe completion.
    pub attempts: u32,
    /// Time spent polling.
    pub elapsed: Duration,
}

impl JobResult {
    /// Convenience accessor for the result artifact.
    #[must_use]
    pub fn video_url(&self) -> Option<&str> {
        self.status.video_url.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_url_appends_segments() {
        let handle = JobHandle::new("gen_123");
        let base = Url::parse("https://api.example.com").unwrap();
        assert_eq!(
            handle.status_url(&base).unwrap().as_str(),
            "https://api.example.com/v1/status/gen_123"
        );

        let nested = Url::parse("https://api.example.com/proxy/").unwrap();
        assert_eq!(
            handle.status_url(&nested).unwrap().as_str(),
            "https://api.example.com/proxy/v1/status/gen_123"
        );
    }

    #[test]
    fn status_url_encodes_the_id() {
        let handle = JobHandle::new("a/b c");
        let base = Url::parse("https://api.example.com").unwrap();
        assert_eq!(
            handle.status_url(&base).unwrap().as_str(),
            "https://api.example.com/v1/status/a%2Fb%20c"
        );
    }

    #[test]
    fn handle_from_generation_response() {
        let queued = json!({ "generation_id": "gen_9", "status": "pending" });
        assert_eq!(JobHandle::from_response(&queued), Some(JobHandle::new("gen_9")));

        let direct = json!({ "video_url": "https://cdn.example.com/v.mp4" });
        assert_eq!(JobHandle::from_response(&direct), None);
    }

    #[test]
    fn parses_status_bodies() {
        let status: JobStatus = serde_json::from_value(json!({
            "status": "completed",
            "video_url": "https://cdn.example.com/v.mp4",
            "duration": "8s",
            "resolution": "1080p",
            "model": "veo3-fast"
        }))
        .unwrap();
        assert_eq!(status.status, JobState::Completed);
        assert!(status.status.is_terminal());
        assert_eq!(status.video_url.as_deref(), Some("https://cdn.example.com/v.mp4"));
        assert_eq!(status.extra.get("model"), Some(&json!("veo3-fast")));
    }

    #[test]
    fn unknown_states_are_not_terminal() {
        let status: JobStatus = serde_json::from_value(json!({ "status": "rendering" })).unwrap();
        assert_eq!(status.status, JobState::Unknown("rendering".into()));
        assert!(!status.status.is_terminal());
        assert_eq!(status.status.to_string(), "rendering");
    }

    #[test]
    fn failure_message_falls_back() {
        let with_reason: JobStatus =
            serde_json::from_value(json!({ "status": "failed", "error": "quota exceeded" }))
                .unwrap();
        assert_eq!(with_reason.failure_message(), "quota exceeded");

        let without: JobStatus = serde_json::from_value(json!({ "status": "failed" })).unwrap();
        assert_eq!(without.failure_message(), UNKNOWN_FAILURE_MESSAGE);
    }
}
