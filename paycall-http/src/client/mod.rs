//! Client-side payment handling for reqwest.
//!
//! [`PaymentMiddleware`] plugs into any `reqwest_middleware` stack.
//! [`PaymentRetryClient`] wraps it into a ready-made client whose calls
//! return the typed [`paycall::Error`] instead of the middleware's
//! type-erased error.

pub mod hooks;
mod middleware;

pub use hooks::{HookDecision, PaymentHooks, PaymentSignedContext};
pub use middleware::PaymentMiddleware;

use http::{HeaderMap, Method};
use paycall::encoding::Base64Bytes;
use paycall::{Error, Signer};
use reqwest::{Request, Response};
use reqwest_middleware as rqm;
use serde::Serialize;
use url::Url;

use crate::constants::{PAYMENT_RESPONSE_HEADER, X_PAYMENT_RESPONSE_HEADER};

/// HTTP client that makes a single logical request succeed despite a payment gate.
///
/// Each call costs one network round trip, or two when the server demands
/// payment. At most one payment is authorized per call.
///
/// The underlying reqwest client (connection pool, TLS) carries no payment
/// state and can be shared freely; clones share it too.
#[derive(Clone)]
pub struct PaymentRetryClient {
    inner: rqm::ClientWithMiddleware,
}

impl std::fmt::Debug for PaymentRetryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentRetryClient").finish_non_exhaustive()
    }
}

impl PaymentRetryClient {
    /// Creates a client with a default reqwest transport.
    pub fn new<S: Signer + 'static>(signer: S) -> Self {
        Self::with_client(reqwest::Client::new(), PaymentMiddleware::new(signer))
    }

    /// Creates a client on top of an existing reqwest client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, middleware: PaymentMiddleware) -> Self {
        Self {
            inner: rqm::ClientBuilder::new(client).with(middleware).build(),
        }
    }

    /// Wraps a middleware client that already contains a [`PaymentMiddleware`].
    #[must_use]
    pub const fn from_middleware_client(inner: rqm::ClientWithMiddleware) -> Self {
        Self { inner }
    }

    /// The underlying middleware client.
    #[must_use]
    pub const fn inner(&self) -> &rqm::ClientWithMiddleware {
        &self.inner
    }

    /// Sends `method url` with optional JSON `body` and extra `headers`,
    /// paying once if the server asks for it.
    ///
    /// # Errors
    ///
    /// - [`Error::MalformedChallenge`] if a 402 carries no usable challenge
    /// - [`Error::Signer`] if signing fails
    /// - [`Error::PaymentRejected`] if the paid retry is answered with 402
    /// - [`Error::Transport`] for connection failures
    pub async fn send<T: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: Option<&T>,
        headers: HeaderMap,
    ) -> Result<Response, Error> {
        let mut request = self.inner.request(method, url).headers(headers);
        if let Some(body) = body {
            request = request.json(body);
        }
        request.send().await.map_err(from_middleware_error)
    }

    /// Sends a GET request.
    ///
    /// # Errors
    ///
    /// See [`Self::send`].
    pub async fn get(&self, url: Url) -> Result<Response, Error> {
        self.send::<()>(Method::GET, url, None, HeaderMap::new())
            .await
    }

    /// Sends a POST request with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`Self::send`].
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: Url,
        body: &T,
    ) -> Result<Response, Error> {
        self.send(Method::POST, url, Some(body), HeaderMap::new())
            .await
    }

    /// Executes a prepared request.
    ///
    /// # Errors
    ///
    /// See [`Self::send`].
    pub async fn execute(&self, request: Request) -> Result<Response, Error> {
        self.inner
            .execute(request)
            .await
            .map_err(from_middleware_error)
    }
}

/// Recovers the typed error from a middleware stack error.
fn from_middleware_error(err: rqm::Error) -> Error {
    match err {
        rqm::Error::Middleware(err) => match err.downcast::<Error>() {
            Ok(err) => err,
            Err(other) => Error::Transport(other.into()),
        },
        rqm::Error::Reqwest(err) => Error::transport(err),
    }
}

/// Decodes the settlement receipt a server attaches to a paid response.
///
/// Looks at `PAYMENT-RESPONSE` first, then the version 1 `X-PAYMENT-RESPONSE`.
/// Returns `None` when neither is present or decodable.
#[must_use]
pub fn payment_receipt(response: &Response) -> Option<serde_json::Value> {
    let header = response
        .headers()
        .get(PAYMENT_RESPONSE_HEADER)
        .or_else(|| response.headers().get(X_PAYMENT_RESPONSE_HEADER))?;
    let bytes = Base64Bytes::from(header.as_bytes()).decode().ok()?;
    serde_json::from_slice(&bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use paycall::{PaymentChallenge, PaymentProof, ProtocolVersion, SignerError};
    use rust_decimal::Decimal;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Clone, Default)]
    struct RecordingSigner {
        calls: Arc<AtomicUsize>,
        seen: Arc<Mutex<Vec<PaymentChallenge>>>,
        failure: Option<SignerError>,
        encoded: Option<&'static str>,
    }

    impl RecordingSigner {
        fn producing(encoded: &'static str) -> Self {
            Self {
                encoded: Some(encoded),
                ..Self::default()
            }
        }

        fn failing(err: SignerError) -> Self {
            Self {
                failure: Some(err),
                ..Self::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl Signer for RecordingSigner {
        async fn sign(&self, challenge: &PaymentChallenge) -> Result<PaymentProof, SignerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(challenge.clone());
            match &self.failure {
                Some(err) => Err(err.clone()),
                None => Ok(PaymentProof::new(
                    challenge.version,
                    self.encoded.unwrap_or("signed-proof"),
                )),
            }
        }
    }

    fn challenge_body(version: u8) -> Value {
        json!({
            "x402Version": version,
            "error": "X-PAYMENT header is required",
            "accepts": [{
                "scheme": "exact",
                "network": "base",
                "maxAmountRequired": "1200000",
                "resource": "https://api.example.com/v1/sora/generate",
                "description": "Sora-2 video",
                "mimeType": "application/json",
                "payTo": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
                "maxTimeoutSeconds": 300,
                "asset": "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"
            }]
        })
    }

    fn endpoint(server: &MockServer) -> Url {
        Url::parse(&format!("{}/v1/sora/generate", server.uri())).unwrap()
    }

    #[tokio::test]
    async fn free_endpoint_passes_through_with_one_call() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/status/gen_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "pending" })))
            .expect(1)
            .mount(&server)
            .await;

        let signer = RecordingSigner::default();
        let client = PaymentRetryClient::new(signer.clone());
        let url = Url::parse(&format!("{}/v1/status/gen_1", server.uri())).unwrap();
        let res = client.get(url).await.unwrap();

        assert_eq!(res.status(), 200);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body, json!({ "status": "pending" }));
        assert_eq!(signer.calls(), 0);
    }

    #[tokio::test]
    async fn non_402_errors_are_returned_unchanged() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/sora/generate"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(&server)
            .await;

        let signer = RecordingSigner::default();
        let client = PaymentRetryClient::new(signer.clone());
        let res = client
            .post_json(endpoint(&server), &json!({ "prompt": "x" }))
            .await
            .unwrap();

        assert_eq!(res.status(), 500);
        assert_eq!(res.text().await.unwrap(), "boom");
        assert_eq!(signer.calls(), 0);
    }

    #[tokio::test]
    async fn single_402_is_paid_and_retried_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/sora/generate"))
            .and(header("x-payment", "signed-proof"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "generation_id": "gen_42" })),
            )
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/sora/generate"))
            .respond_with(ResponseTemplate::new(402).set_body_json(challenge_body(1)))
            .expect(1)
            .mount(&server)
            .await;

        let signer = RecordingSigner::default();
        let client = PaymentRetryClient::new(signer.clone());
        let res = client
            .post_json(endpoint(&server), &json!({ "prompt": "jellyfish", "duration": 8 }))
            .await
            .unwrap();

        assert_eq!(res.status(), 200);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["generation_id"], "gen_42");

        assert_eq!(signer.calls(), 1);
        let seen = signer.seen.lock().unwrap();
        assert_eq!(seen[0].network, "base");
        assert_eq!(seen[0].amount, Decimal::from(1_200_000));
        assert_eq!(
            seen[0].recipient,
            "0x209693Bc6afc0C5328bA36FaF03C514EF312287C"
        );
    }

    #[tokio::test]
    async fn retry_replays_body_and_caller_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/sora/generate"))
            .and(header_exists("x-payment"))
            .and(header("x-request-id", "abc"))
            .and(wiremock::matchers::body_json(json!({ "prompt": "jellyfish" })))
            .respond_with(ResponseTemplate::new(200))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(402).set_body_json(challenge_body(1)))
            .expect(1)
            .mount(&server)
            .await;

        let mut headers = HeaderMap::new();
        headers.insert("x-request-id", "abc".parse().unwrap());
        let client = PaymentRetryClient::new(RecordingSigner::default());
        let res = client
            .send(
                Method::POST,
                endpoint(&server),
                Some(&json!({ "prompt": "jellyfish" })),
                headers,
            )
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
    }

    #[tokio::test]
    async fn v2_challenges_are_answered_in_payment_signature() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("payment-signature", "signed-proof"))
            .respond_with(ResponseTemplate::new(200))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        let mut body = challenge_body(2);
        body["accepts"][0]["network"] = json!("eip155:8453");
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(402).set_body_json(body))
            .expect(1)
            .mount(&server)
            .await;

        let signer = RecordingSigner::default();
        let client = PaymentRetryClient::new(signer.clone());
        let res = client
            .post_json(endpoint(&server), &json!({}))
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        assert_eq!(signer.seen.lock().unwrap()[0].version, ProtocolVersion::V2);
    }

    #[tokio::test]
    async fn second_402_is_a_rejection_after_exactly_two_calls() {
        let server = MockServer::start().await;
        let mut body = challenge_body(1);
        body["error"] = json!("payment already used");
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(402).set_body_json(body))
            .expect(2)
            .mount(&server)
            .await;

        let signer = RecordingSigner::default();
        let client = PaymentRetryClient::new(signer.clone());
        let err = client
            .post_json(endpoint(&server), &json!({ "prompt": "x" }))
            .await
            .unwrap_err();

        match err {
            Error::PaymentRejected { server_message } => {
                assert_eq!(server_message.as_deref(), Some("payment already used"));
            }
            other => panic!("expected PaymentRejected, got {other:?}"),
        }
        assert_eq!(signer.calls(), 1);
    }

    #[tokio::test]
    async fn malformed_challenge_is_not_signed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(402)
                    .set_body_json(json!({ "x402Version": 1, "accepts": [{ "network": "base" }] })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let signer = RecordingSigner::default();
        let client = PaymentRetryClient::new(signer.clone());
        let err = client
            .post_json(endpoint(&server), &json!({}))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::MalformedChallenge(_)), "{err:?}");
        assert_eq!(signer.calls(), 0);
    }

    #[tokio::test]
    async fn signer_errors_propagate_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(402).set_body_json(challenge_body(1)))
            .expect(1)
            .mount(&server)
            .await;

        let signer = RecordingSigner::failing(SignerError::InsufficientFunds(
            "balance 0.50 USDC".into(),
        ));
        let client = PaymentRetryClient::new(signer.clone());
        let err = client
            .post_json(endpoint(&server), &json!({}))
            .await
            .unwrap_err();

        assert_eq!(
            err.as_signer_error(),
            Some(&SignerError::InsufficientFunds("balance 0.50 USDC".into()))
        );
        assert_eq!(signer.calls(), 1);
    }

    #[tokio::test]
    async fn before_hook_can_abort_payment() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(402).set_body_json(challenge_body(1)))
            .expect(1)
            .mount(&server)
            .await;

        let signer = RecordingSigner::default();
        let hooks = PaymentHooks::default().on_before_payment(|challenge: PaymentChallenge| async move {
            if challenge.display_amount(6) > Decimal::ONE {
                HookDecision::Abort("over budget".into())
            } else {
                HookDecision::Continue
            }
        });
        let client = PaymentRetryClient::with_client(
            reqwest::Client::new(),
            PaymentMiddleware::new(signer.clone()).with_hooks(hooks),
        );
        let err = client
            .post_json(endpoint(&server), &json!({}))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::PaymentAborted(ref r) if r == "over budget"), "{err:?}");
        assert_eq!(signer.calls(), 0);
    }

    #[tokio::test]
    async fn after_hook_observes_header_name() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header_exists("x-payment"))
            .respond_with(ResponseTemplate::new(200))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(402).set_body_json(challenge_body(1)))
            .mount(&server)
            .await;

        let observed = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&observed);
        let hooks = PaymentHooks::default().on_after_payment(move |ctx: PaymentSignedContext| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().unwrap().push(ctx.header);
            }
        });
        let client = PaymentRetryClient::with_client(
            reqwest::Client::new(),
            PaymentMiddleware::new(RecordingSigner::default()).with_hooks(hooks),
        );
        client
            .post_json(endpoint(&server), &json!({}))
            .await
            .unwrap();

        assert_eq!(*observed.lock().unwrap(), vec!["x-payment"]);
    }

    #[tokio::test]
    async fn connection_failures_are_transport_errors() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let signer = RecordingSigner::default();
        let client = PaymentRetryClient::new(signer.clone());
        let url = Url::parse(&format!("http://127.0.0.1:{port}/v1/sora/generate")).unwrap();
        let err = client.post_json(url, &json!({})).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)), "{err:?}");
        assert!(err.is_transport());
        assert_eq!(signer.calls(), 0);
    }

    #[tokio::test]
    async fn v2_challenge_is_read_from_payment_required_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("payment-signature", "signed-proof"))
            .respond_with(ResponseTemplate::new(200))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        let mut challenge = challenge_body(2);
        challenge["accepts"][0]["network"] = json!("eip155:8453");
        let encoded = Base64Bytes::encode_json(&challenge).unwrap().to_string();
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(402)
                    .insert_header("PAYMENT-REQUIRED", encoded.as_str())
                    .set_body_json(json!({})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let signer = RecordingSigner::default();
        let client = PaymentRetryClient::new(signer.clone());
        let res = client
            .post_json(endpoint(&server), &json!({}))
            .await
            .unwrap();

        assert_eq!(res.status(), 200);
        assert_eq!(signer.calls(), 1);
        let seen = signer.seen.lock().unwrap();
        assert_eq!(seen[0].version, ProtocolVersion::V2);
        assert_eq!(seen[0].network, "eip155:8453");
    }

    #[tokio::test]
    async fn garbage_payment_required_header_falls_back_to_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header_exists("x-payment"))
            .respond_with(ResponseTemplate::new(200))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(402)
                    .insert_header("PAYMENT-REQUIRED", "not-base64!")
                    .set_body_json(challenge_body(1)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = PaymentRetryClient::new(RecordingSigner::default());
        let res = client
            .post_json(endpoint(&server), &json!({}))
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
    }

    #[tokio::test]
    async fn streaming_body_cannot_be_retried_and_is_not_signed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(402).set_body_json(challenge_body(1)))
            .expect(1)
            .mount(&server)
            .await;

        let chunks: Vec<Result<&'static str, std::io::Error>> = vec![Ok("{\"prompt\":"), Ok("\"x\"}")];
        let request = reqwest::Client::new()
            .post(endpoint(&server))
            .body(reqwest::Body::wrap_stream(futures_util::stream::iter(chunks)))
            .build()
            .unwrap();

        let signer = RecordingSigner::default();
        let client = PaymentRetryClient::new(signer.clone());
        let err = client.execute(request).await.unwrap_err();

        assert!(matches!(err, Error::RequestNotCloneable), "{err:?}");
        assert_eq!(signer.calls(), 0);
    }

    #[tokio::test]
    async fn proof_unfit_for_a_header_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(402).set_body_json(challenge_body(1)))
            .expect(1)
            .mount(&server)
            .await;

        let signer = RecordingSigner::producing("line\nbreak");
        let client = PaymentRetryClient::new(signer.clone());
        let err = client
            .post_json(endpoint(&server), &json!({}))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidProof(_)), "{err:?}");
        assert_eq!(signer.calls(), 1);
    }

    #[tokio::test]
    async fn decodes_settlement_receipt() {
        let server = MockServer::start().await;
        let receipt = json!({ "success": true, "transaction": "0xabc", "network": "base" });
        let encoded = Base64Bytes::encode_json(&receipt).unwrap().to_string();
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).insert_header("X-PAYMENT-RESPONSE", encoded.as_str()))
            .mount(&server)
            .await;

        let client = PaymentRetryClient::new(RecordingSigner::default());
        let res = client
            .get(Url::parse(&server.uri()).unwrap())
            .await
            .unwrap();
        assert_eq!(payment_receipt(&res), Some(receipt));
    }
}
