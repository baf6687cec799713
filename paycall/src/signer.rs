//! The signing seam.
//!
//! Key material never enters this crate. A [`Signer`] receives a parsed
//! [`PaymentChallenge`] and returns a [`PaymentProof`], or one of the
//! [`SignerError`] kinds. `paycall-evm` ships a local-key implementation;
//! hardware wallets, remote KMS or custodial APIs plug in the same way.

use std::sync::Arc;

use crate::challenge::PaymentChallenge;
use crate::error::SignerError;
use crate::proof::PaymentProof;

/// Produces payment proofs for challenges.
///
/// Called at most once per paid request. Implementations must not retry
/// internally in a way that could authorize more than one payment.
#[async_trait::async_trait]
pub trait Signer: Send + Sync {
    /// Signs a payment authorizing `challenge`.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::InsufficientFunds`], [`SignerError::Unavailable`],
    /// [`SignerError::NetworkMismatch`] or [`SignerError::Rejected`].
    async fn sign(&self, challenge: &PaymentChallenge) -> Result<PaymentProof, SignerError>;
}

#[async_trait::async_trait]
impl<T: Signer + ?Sized> Signer for Arc<T> {
    async fn sign(&self, challenge: &PaymentChallenge) -> Result<PaymentProof, SignerError> {
        (**self).sign(challenge).await
    }
}

#[async_trait::async_trait]
impl<T: Signer + ?Sized> Signer for Box<T> {
    async fn sign(&self, challenge: &PaymentChallenge) -> Result<PaymentProof, SignerError> {
        (**self).sign(challenge).await
    }
}
