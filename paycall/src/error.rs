//! Error types for paid calls and job polling.
//!
//! Every failure a caller can observe is a variant of [`Error`], so callers
//! branch on the kind instead of inspecting message text. Signing failures
//! keep their own [`SignerError`] type and pass through unchanged.

use std::time::Duration;

/// Boxed error used for transport failures of any origin.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures reported by a [`Signer`](crate::Signer).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignerError {
    /// The wallet cannot cover the requested amount.
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    /// The signer or its key material could not be reached.
    #[error("signer unavailable: {0}")]
    Unavailable(String),

    /// The challenge targets a network the signer does not operate on.
    #[error("network mismatch: challenge requires '{required}', signer supports {supported}")]
    NetworkMismatch {
        /// Network named by the challenge.
        required: String,
        /// Human-readable list of networks the signer accepts.
        supported: String,
    },

    /// The signer understood the challenge but refused to sign it
    /// (unsupported scheme, unparsable address or amount).
    #[error("signer refused challenge: {0}")]
    Rejected(String),
}

impl SignerError {
    /// Returns `true` for [`SignerError::InsufficientFunds`].
    #[must_use]
    pub const fn is_insufficient_funds(&self) -> bool {
        matches!(self, Self::InsufficientFunds(_))
    }

    /// Returns `true` for [`SignerError::Unavailable`].
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// Returns `true` for [`SignerError::NetworkMismatch`].
    #[must_use]
    pub const fn is_network_mismatch(&self) -> bool {
        matches!(self, Self::NetworkMismatch { .. })
    }
}

/// Errors returned by the payment-retry client and the job poller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The 402 response did not carry the required payment fields.
    #[error("malformed payment challenge: {0}")]
    MalformedChallenge(String),

    /// Signing the payment failed. The signer's error is passed through as-is.
    #[error(transparent)]
    Signer(#[from] SignerError),

    /// The signer returned a proof that cannot be sent as an HTTP header.
    #[error("invalid payment proof: {0}")]
    InvalidProof(String),

    /// The server answered the paid retry with another 402.
    #[error("payment rejected: server returned 402 for the paid retry{}", reason_suffix(.server_message.as_deref()))]
    PaymentRejected {
        /// The `error` field of the second 402 body, if any.
        server_message: Option<String>,
    },

    /// A before-payment hook vetoed the payment.
    #[error("payment aborted: {0}")]
    PaymentAborted(String),

    /// The request body is a stream and cannot be replayed for the paid retry.
    #[error("request is not cloneable, cannot retry with payment")]
    RequestNotCloneable,

    /// Poll interval or attempt count is zero.
    #[error("invalid poll configuration: {0}")]
    InvalidPollConfig(String),

    /// The server reported the job as failed.
    #[error("generation failed: {0}")]
    GenerationFailed(String),

    /// The attempt budget ran out while the job was still running.
    #[error("polling timed out after {attempts} attempts ({elapsed:?})")]
    PollTimeout {
        /// Number of status fetches performed.
        attempts: u32,
        /// Wall-clock time spent in the poll loop.
        elapsed: Duration,
    },

    /// The caller's cancellation token fired during a poll.
    #[error("polling cancelled after {attempts} attempts")]
    Cancelled {
        /// Number of status fetches completed before cancellation.
        attempts: u32,
    },

    /// A free endpoint answered with a non-success status.
    #[error("unexpected HTTP status {status}: {body}")]
    UnexpectedStatus {
        /// The HTTP status code.
        status: u16,
        /// The response body, lossily decoded.
        body: String,
    },

    /// Connection, I/O or decoding failure.
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),
}

fn reason_suffix(message: Option<&str>) -> String {
    message.map(|m| format!(" ({m})")).unwrap_or_default()
}

impl Error {
    /// Wraps any error as [`Error::Transport`].
    pub fn transport<E: Into<BoxError>>(err: E) -> Self {
        Self::Transport(err.into())
    }

    /// Returns `true` when the server could not be talked to properly, as
    /// opposed to a protocol-level rejection.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::UnexpectedStatus { .. })
    }

    /// Returns the signing error, if this is one.
    #[must_use]
    pub const fn as_signer_error(&self) -> Option<&SignerError> {
        match self {
            Self::Signer(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signer_errors_pass_through_verbatim() {
        let inner = SignerError::InsufficientFunds("need 1.20 USDC".into());
        let err = Error::from(inner.clone());
        assert_eq!(err.to_string(), inner.to_string());
        assert_eq!(err.as_signer_error(), Some(&inner));
        assert!(!err.is_transport());
    }

    #[test]
    fn transport_classification() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(Error::transport(io).is_transport());
        assert!(
            Error::UnexpectedStatus {
                status: 500,
                body: String::new()
            }
            .is_transport()
        );
        assert!(!Error::PaymentRejected { server_message: None }.is_transport());
        assert!(!Error::GenerationFailed("x".into()).is_transport());
    }

    #[test]
    fn payment_rejected_message_includes_server_reason() {
        let err = Error::PaymentRejected {
            server_message: Some("nonce already used".into()),
        };
        assert_eq!(
            err.to_string(),
            "payment rejected: server returned 402 for the paid retry (nonce already used)"
        );
    }
}
