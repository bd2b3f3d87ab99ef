//! Verification of gateway-produced payment confirmations.
//!
//! Two modes, both HMAC-SHA256 with a server-held secret and a constant-time
//! comparison:
//!
//! * webhook: `HMAC(webhook_secret, raw_body)` against `X-Razorpay-Signature`
//! * client callback: `HMAC(key_secret, order_id + "|" + payment_id)`
//!
//! Both fail closed: an unset secret rejects the request.

use secrecy::{ExposeSecret, Secret};
use service_core::utils::signature::verify_hmac_sha256;

use crate::error::SubscriptionError;

pub const WEBHOOK_SIGNATURE_HEADER: &str = "X-Razorpay-Signature";

/// Fields returned by the checkout widget after a successful payment.
#[derive(Debug, Clone)]
pub struct PaymentConfirmation {
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
}

#[derive(Clone)]
pub struct SignatureVerifier {
    key_secret: Secret<String>,
    webhook_secret: Secret<String>,
}

impl SignatureVerifier {
    pub fn new(key_secret: Secret<String>, webhook_secret: Secret<String>) -> Self {
        Self {
            key_secret,
            webhook_secret,
        }
    }

    /// Verify a webhook delivery over the exact bytes received.
    pub fn verify_webhook(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<(), SubscriptionError> {
        let secret = self.webhook_secret.expose_secret();
        if secret.is_empty() {
            return Err(SubscriptionError::Configuration("Webhook secret"));
        }

        let signature = signature
            .filter(|s| !s.trim().is_empty())
            .ok_or(SubscriptionError::Authentication("Missing webhook signature"))?;

        let valid = verify_hmac_sha256(secret.as_bytes(), raw_body, signature)
            .map_err(|_| SubscriptionError::Configuration("Webhook secret"))?;

        if !valid {
            tracing::warn!("Webhook signature verification failed");
            return Err(SubscriptionError::Authentication("Invalid webhook signature"));
        }

        Ok(())
    }

    /// Verify the order/payment/signature triple from the checkout callback.
    pub fn verify_payment(
        &self,
        confirmation: &PaymentConfirmation,
    ) -> Result<(), SubscriptionError> {
        let secret = self.key_secret.expose_secret();
        if secret.is_empty() {
            return Err(SubscriptionError::Configuration("Gateway key secret"));
        }

        let payload = format!("{}|{}", confirmation.order_id, confirmation.payment_id);
        let valid = verify_hmac_sha256(secret.as_bytes(), payload.as_bytes(), &confirmation.signature)
            .map_err(|_| SubscriptionError::Configuration("Gateway key secret"))?;

        if !valid {
            tracing::warn!(
                order_id = %confirmation.order_id,
                payment_id = %confirmation.payment_id,
                "Payment signature verification failed"
            );
            return Err(SubscriptionError::Authentication("Invalid signature"));
        }

        tracing::info!(
            order_id = %confirmation.order_id,
            payment_id = %confirmation.payment_id,
            "Payment signature verified"
        );
        Ok(())
    }
}
