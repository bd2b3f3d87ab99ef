use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use service_core::error::AppError;

use crate::dtos::{SubscriptionQuery, SubscriptionResponse};
use crate::services::subscription::days_remaining;
use crate::startup::AppState;

/// Current plan, derived dates and the activation history of one company.
pub async fn get_subscription(
    State(state): State<AppState>,
    Query(query): Query<SubscriptionQuery>,
) -> Result<Json<SubscriptionResponse>, AppError> {
    let (company, subscription) = state
        .engine
        .subscription_of(query.email.as_deref().unwrap_or_default())
        .await?;

    let remaining = days_remaining(&subscription, Utc::now());

    Ok(Json(SubscriptionResponse::new(
        company.email,
        &subscription,
        remaining,
        company.subscription_history,
    )))
}
