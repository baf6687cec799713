//! Reqwest middleware that answers `402 Payment Required` with one signed retry.

use std::sync::Arc;

use http::{Extensions, HeaderName, HeaderValue, StatusCode};
use paycall::{Error, PaymentChallenge, PaymentProof, ProtocolVersion, Signer};
use reqwest::{Request, Response};
use reqwest_middleware as rqm;
#[cfg(feature = "telemetry")]
use tracing::{debug, info, instrument, trace, warn};

use super::hooks::{HookDecision, PaymentHooks, PaymentSignedContext};
use crate::constants::{PAYMENT_REQUIRED_HEADER, PAYMENT_SIGNATURE_HEADER, X_PAYMENT_HEADER};

/// Middleware that pays for requests answered with `402 Payment Required`.
///
/// For every request passing through it:
///
/// 1. The request is sent as given. Anything but a 402 is returned untouched.
/// 2. The 402 body is parsed into a [`PaymentChallenge`].
/// 3. The [`Signer`] is asked for a [`PaymentProof`], once.
/// 4. The original request is replayed once with the proof in its header.
/// 5. A second 402 fails with [`Error::PaymentRejected`]; any other response
///    is returned as-is.
///
/// Errors leave the middleware as `reqwest_middleware::Error::Middleware`
/// wrapping a [`paycall::Error`]; [`PaymentRetryClient`](super::PaymentRetryClient)
/// unwraps them back into the typed error.
#[derive(Clone)]
pub struct PaymentMiddleware {
    signer: Arc<dyn Signer>,
    hooks: PaymentHooks,
}

impl std::fmt::Debug for PaymentMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentMiddleware")
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

impl PaymentMiddleware {
    /// Creates a middleware that signs with `signer`.
    pub fn new<S: Signer + 'static>(signer: S) -> Self {
        Self::from_arc(Arc::new(signer))
    }

    /// Creates a middleware from a shared signer.
    #[must_use]
    pub fn from_arc(signer: Arc<dyn Signer>) -> Self {
        Self {
            signer,
            hooks: PaymentHooks::default(),
        }
    }

    /// Installs lifecycle hooks around signing.
    #[must_use]
    pub fn with_hooks(mut self, hooks: PaymentHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Header a proof of the given version travels in.
    #[must_use]
    pub const fn header_for(version: ProtocolVersion) -> &'static str {
        match version {
            ProtocolVersion::V1 => X_PAYMENT_HEADER,
            ProtocolVersion::V2 => PAYMENT_SIGNATURE_HEADER,
        }
    }

    /// Turns a 402 response into a payment proof.
    ///
    /// The challenge is read from the `PAYMENT-REQUIRED` header when it holds
    /// one, otherwise from the body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the body cannot be read,
    /// [`Error::MalformedChallenge`] if it lacks payment fields,
    /// [`Error::PaymentAborted`] if a hook vetoes the payment, and the
    /// signer's error unchanged if signing fails.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "paycall.authorize", skip_all, err)
    )]
    pub async fn authorize(&self, res: Response) -> Result<PaymentProof, Error> {
        let challenge = match challenge_from_header(&res) {
            Some(challenge) => challenge,
            None => {
                let body = res.bytes().await.map_err(Error::transport)?;
                PaymentChallenge::from_body(&body)?
            }
        };

        #[cfg(feature = "telemetry")]
        debug!(
            scheme = %challenge.scheme,
            network = %challenge.network,
            amount = %challenge.amount,
            recipient = %challenge.recipient,
            "Parsed payment challenge"
        );

        if let HookDecision::Abort(reason) = self.hooks.before(&challenge).await {
            return Err(Error::PaymentAborted(reason));
        }

        let proof = self.signer.sign(&challenge).await?;

        if !self.hooks.after_payment.is_empty() {
            let version = proof.version();
            self.hooks
                .after(PaymentSignedContext {
                    challenge,
                    version,
                    header: Self::header_for(version),
                })
                .await;
        }

        Ok(proof)
    }
}

fn challenge_from_header(res: &Response) -> Option<PaymentChallenge> {
    let header = res.headers().get(PAYMENT_REQUIRED_HEADER)?;
    let parsed = PaymentChallenge::from_header(header.as_bytes());
    #[cfg(feature = "telemetry")]
    if let Err(err) = &parsed {
        debug!(error = %err, "Unusable PAYMENT-REQUIRED header, falling back to body");
    }
    parsed.ok()
}

/// Converts a proof into the header that carries it. Consumes the proof.
fn payment_header(proof: PaymentProof) -> Result<(HeaderName, HeaderValue), Error> {
    let name = HeaderName::from_static(PaymentMiddleware::header_for(proof.version()));
    let value = HeaderValue::from_str(&proof.into_header_value())
        .map_err(|e| Error::InvalidProof(e.to_string()))?;
    Ok((name, value))
}

/// Reads the `error` field of a 402 body, if there is one.
async fn rejection_message(res: Response) -> Option<String> {
    let body = res.bytes().await.ok()?;
    let value: serde_json::Value = serde_json::from_slice(&body).ok()?;
    value.get("error")?.as_str().map(str::to_owned)
}

fn middleware_error(err: Error) -> rqm::Error {
    rqm::Error::Middleware(err.into())
}

/// Runs the next middleware or HTTP client with optional telemetry instrumentation.
#[cfg_attr(feature = "telemetry", instrument(name = "paycall.next", skip_all))]
async fn run_next(
    next: rqm::Next<'_>,
    req: Request,
    extensions: &mut Extensions,
) -> rqm::Result<Response> {
    next.run(req, extensions).await
}

#[async_trait::async_trait]
impl rqm::Middleware for PaymentMiddleware {
    #[cfg_attr(feature = "telemetry", instrument(name = "paycall.handle", skip_all, err))]
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: rqm::Next<'_>,
    ) -> rqm::Result<Response> {
        let retry_req = req.try_clone();
        let res = run_next(next.clone(), req, extensions).await?;

        if res.status() != StatusCode::PAYMENT_REQUIRED {
            #[cfg(feature = "telemetry")]
            trace!(status = ?res.status(), "No payment required, returning response");
            return Ok(res);
        }

        #[cfg(feature = "telemetry")]
        info!(url = %res.url(), "Received 402 Payment Required, processing payment");

        let Some(mut retry) = retry_req else {
            return Err(middleware_error(Error::RequestNotCloneable));
        };

        let proof = self.authorize(res).await.map_err(middleware_error)?;
        let (name, value) = payment_header(proof).map_err(middleware_error)?;
        retry.headers_mut().insert(name, value);

        #[cfg(feature = "telemetry")]
        trace!(url = %retry.url(), "Retrying request with payment header");

        let res = run_next(next, retry, extensions).await?;
        if res.status() == StatusCode::PAYMENT_REQUIRED {
            let server_message = rejection_message(res).await;
            #[cfg(feature = "telemetry")]
            warn!(?server_message, "Paid retry answered with 402, giving up");
            return Err(middleware_error(Error::PaymentRejected { server_message }));
        }

        Ok(res)
    }
}
