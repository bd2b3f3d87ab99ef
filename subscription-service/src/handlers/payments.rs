//! Payment endpoints: checkout config, order creation, client verification
//! and the gateway webhook.

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use service_core::error::AppError;
use validator::Validate;

use crate::dtos::{
    CreateOrderRequest, CreateOrderResponse, PaymentConfigResponse, VerifyPaymentRequest,
    VerifyPaymentResponse, WebhookAck,
};
use crate::error::SubscriptionError;
use crate::models::Plan;
use crate::services::{PaymentConfirmation, WEBHOOK_SIGNATURE_HEADER};
use crate::startup::AppState;

/// Public key id for the checkout widget. Never exposes secrets.
pub async fn payment_config(State(state): State<AppState>) -> Json<PaymentConfigResponse> {
    Json(PaymentConfigResponse {
        key_id: state.engine.key_id().to_string(),
    })
}

pub async fn list_plans(State(state): State<AppState>) -> Json<Vec<Plan>> {
    Json(state.engine.catalog().list().to_vec())
}

pub async fn create_order(
    State(state): State<AppState>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<CreateOrderResponse>, AppError> {
    payload.validate()?;

    let outcome = state
        .engine
        .create_order(
            payload.email.as_deref().unwrap_or_default(),
            payload.plan.as_deref().unwrap_or_default(),
        )
        .await?;

    Ok(Json(CreateOrderResponse::from(outcome)))
}

/// Checkout callback. A valid signature answers `success: true` whether or
/// not the payment was already applied.
pub async fn verify_payment(
    State(state): State<AppState>,
    Json(payload): Json<VerifyPaymentRequest>,
) -> Result<Json<VerifyPaymentResponse>, AppError> {
    let confirmation = PaymentConfirmation {
        order_id: payload.order_id.unwrap_or_default(),
        payment_id: payload.payment_id.unwrap_or_default(),
        signature: payload.signature.unwrap_or_default(),
    };

    let outcome = state
        .engine
        .verify_client_payment(
            &confirmation,
            payload.email.as_deref(),
            payload.plan.as_deref(),
        )
        .await
        .map_err(|e| processing_error(e, "Verification failed"))?;

    tracing::info!(
        order_id = %confirmation.order_id,
        outcome = outcome.label(),
        "Client payment verification handled"
    );

    Ok(Json(VerifyPaymentResponse { success: true }))
}

/// Gateway webhook. Takes the body as raw bytes: the signature covers the
/// exact bytes sent.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    let signature = headers
        .get(WEBHOOK_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let outcome = state
        .engine
        .handle_webhook(&body, signature)
        .await
        .map_err(|e| processing_error(e, "Webhook processing failed"))?;

    tracing::debug!(outcome = outcome.label(), "Webhook handled");
    Ok(Json(WebhookAck { status: "ok" }))
}

/// Unauthenticated callers get a fixed message; storage causes are logged
/// only.
fn processing_error(err: SubscriptionError, failure: &'static str) -> AppError {
    match err {
        SubscriptionError::Configuration(what) => {
            tracing::error!(missing = what, "Payment configuration missing");
            AppError::Opaque(format!("{} not set", what))
        }
        SubscriptionError::Authentication(msg) => {
            tracing::warn!(reason = msg, "Rejected payment signature");
            AppError::BadRequest(anyhow::anyhow!(msg))
        }
        SubscriptionError::Store(e) => {
            tracing::error!(error = %e, "{}", failure);
            AppError::Opaque(failure.to_string())
        }
        other => AppError::from(other),
    }
}
