//! Errors raised by the subscription lifecycle.

use service_core::error::AppError;
use thiserror::Error;

use crate::models::UnknownPlan;
use crate::services::razorpay::GatewayError;

#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// A secret or key the request needs is not configured. Fatal to the
    /// request only.
    #[error("{0} is not configured")]
    Configuration(&'static str),

    /// Signature missing or mismatched.
    #[error("{0}")]
    Authentication(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    UnknownPlan(#[from] UnknownPlan),

    #[error("Company not found")]
    CompanyNotFound,

    #[error("Payment gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Storage error: {0}")]
    Store(anyhow::Error),
}

/// Mapping for first-party endpoints, where descriptive errors help a
/// legitimate buyer retry.
impl From<SubscriptionError> for AppError {
    fn from(err: SubscriptionError) -> Self {
        match err {
            SubscriptionError::Configuration(what) => {
                tracing::error!(missing = what, "Payment configuration missing");
                AppError::ConfigError(anyhow::anyhow!("{} is not configured", what))
            }
            SubscriptionError::Authentication(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            SubscriptionError::Validation(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            SubscriptionError::UnknownPlan(_) => {
                AppError::BadRequest(anyhow::anyhow!("Invalid plan"))
            }
            SubscriptionError::CompanyNotFound => {
                AppError::NotFound(anyhow::anyhow!("Company not found"))
            }
            SubscriptionError::Gateway(e) => {
                tracing::error!(error = %e, "Payment gateway call failed");
                AppError::Opaque("Failed to create payment order".to_string())
            }
            SubscriptionError::Store(e) => AppError::DatabaseError(e),
        }
    }
}
