//! Lifecycle hooks around payment signing.
//!
//! - **Before hooks** run once the challenge is parsed and before the signer
//!   is called. The first hook that aborts stops the payment.
//! - **After hooks** run once the proof is produced, right before the paid
//!   retry is sent. They observe only.
//!
//! Hooks never cause a second signing or a second retry.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use paycall::{PaymentChallenge, ProtocolVersion};

/// Decision returned by a before-payment hook.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HookDecision {
    /// Go ahead and sign.
    #[default]
    Continue,
    /// Do not pay. The call fails with `Error::PaymentAborted(reason)`.
    Abort(String),
}

/// Context passed to after-payment hooks.
#[derive(Debug, Clone)]
pub struct PaymentSignedContext {
    /// The challenge that was signed.
    pub challenge: PaymentChallenge,
    /// Version of the produced proof.
    pub version: ProtocolVersion,
    /// Name of the header the proof is sent in.
    pub header: &'static str,
}

type BoxFut<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Type alias for a before-payment hook callback.
pub type BeforePaymentHookFn = dyn Fn(PaymentChallenge) -> BoxFut<'static, HookDecision> + Send + Sync;

/// Type alias for an after-payment hook callback.
pub type AfterPaymentHookFn = dyn Fn(PaymentSignedContext) -> BoxFut<'static, ()> + Send + Sync;

/// Hooks around the signing step, executed in registration order.
#[derive(Clone, Default)]
pub struct PaymentHooks {
    pub(crate) before_payment: Vec<Arc<BeforePaymentHookFn>>,
    pub(crate) after_payment: Vec<Arc<AfterPaymentHookFn>>,
}

impl std::fmt::Debug for PaymentHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentHooks")
            .field("before_payment", &self.before_payment.len())
            .field("after_payment", &self.after_payment.len())
            .finish()
    }
}

impl PaymentHooks {
    /// Registers a hook that may veto a payment, e.g. to enforce a budget.
    #[must_use]
    pub fn on_before_payment<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(PaymentChallenge) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookDecision> + Send + 'static,
    {
        self.before_payment
            .push(Arc::new(move |challenge| Box::pin(hook(challenge))));
        self
    }

    /// Registers a hook that observes a produced proof.
    #[must_use]
    pub fn on_after_payment<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(PaymentSignedContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.after_payment
            .push(Arc::new(move |ctx| Box::pin(hook(ctx))));
        self
    }

    /// Runs before hooks; the first abort wins.
    pub(crate) async fn before(&self, challenge: &PaymentChallenge) -> HookDecision {
        for hook in &self.before_payment {
            if let HookDecision::Abort(reason) = hook(challenge.clone()).await {
                return HookDecision::Abort(reason);
            }
        }
        HookDecision::Continue
    }

    pub(crate) async fn after(&self, ctx: PaymentSignedContext) {
        for hook in &self.after_payment {
            hook(ctx.clone()).await;
        }
    }
}
