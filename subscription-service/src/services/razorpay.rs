//! Razorpay client and webhook payload types.
//!
//! Order creation goes through the Orders API with key-id/secret basic auth.
//! Webhook types only require the fields the lifecycle reads; everything
//! else is optional or ignored.

use std::collections::HashMap;

use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Deserializer, Serialize};
use service_core::observability::TracedClientExt;
use thiserror::Error;

use crate::config::RazorpayConfig;

pub const PROVIDER_NAME: &str = "razorpay";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Razorpay credentials not configured")]
    NotConfigured,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Razorpay error: {code} - {description}")]
    Api { code: String, description: String },

    #[error("Unexpected Razorpay response: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Clone)]
pub struct RazorpayClient {
    client: Client,
    config: RazorpayConfig,
}

/// Buyer identity attached to an order so asynchronous events can be
/// attributed without any server-side order table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderNotes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateOrderRequest<'a> {
    /// Smallest currency unit.
    pub amount: i64,
    pub currency: &'a str,
    pub receipt: &'a str,
    pub notes: &'a OrderNotes,
}

#[derive(Debug, Deserialize)]
pub struct RazorpayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RazorpayErrorBody {
    error: RazorpayErrorDetail,
}

#[derive(Debug, Deserialize)]
struct RazorpayErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl RazorpayClient {
    pub fn new(config: RazorpayConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.config.key_id.is_empty() && !self.config.key_secret.expose_secret().is_empty()
    }

    /// Public key id handed to the checkout widget.
    pub fn key_id(&self) -> &str {
        &self.config.key_id
    }

    pub async fn create_order(
        &self,
        amount: i64,
        currency: &str,
        receipt: &str,
        notes: &OrderNotes,
    ) -> Result<RazorpayOrder, GatewayError> {
        if !self.is_configured() {
            return Err(GatewayError::NotConfigured);
        }

        let request = CreateOrderRequest {
            amount,
            currency,
            receipt,
            notes,
        };

        let url = format!("{}/orders", self.config.api_base_url.trim_end_matches('/'));

        let response = self
            .client
            .traced_post(&url)
            .basic_auth(
                &self.config.key_id,
                Some(self.config.key_secret.expose_secret()),
            )
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        tracing::debug!(status = %status, "Razorpay create_order response");

        if status.is_success() {
            let order: RazorpayOrder = serde_json::from_str(&body)?;
            tracing::info!(
                order_id = %order.id,
                amount = order.amount,
                currency = %order.currency,
                "Razorpay order created"
            );
            Ok(order)
        } else {
            let (code, description) = match serde_json::from_str::<RazorpayErrorBody>(&body) {
                Ok(parsed) => (
                    parsed.error.code.unwrap_or_else(|| "UNKNOWN".to_string()),
                    parsed.error.description.unwrap_or_default(),
                ),
                Err(_) => ("UNKNOWN".to_string(), body),
            };
            tracing::error!(
                status = %status,
                code = %code,
                description = %description,
                "Razorpay order creation failed"
            );
            Err(GatewayError::Api { code, description })
        }
    }
}

/// A webhook delivery. Only `event` is required.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    #[serde(default)]
    pub payload: WebhookPayload,
    #[serde(default)]
    pub created_at: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub payment: Option<EntityWrapper<PaymentEntity>>,
    #[serde(default)]
    pub order: Option<EntityWrapper<OrderEntity>>,
}

#[derive(Debug, Deserialize)]
pub struct EntityWrapper<T> {
    pub entity: T,
}

#[derive(Debug, Deserialize)]
pub struct PaymentEntity {
    pub id: String,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default, deserialize_with = "lenient_notes")]
    pub notes: OrderNotes,
}

#[derive(Debug, Deserialize)]
pub struct OrderEntity {
    pub id: String,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default, deserialize_with = "lenient_notes")]
    pub notes: OrderNotes,
}

/// Events that carry a captured payment.
pub const ACTIVATING_EVENTS: [&str; 2] = ["payment.captured", "order.paid"];

impl WebhookEvent {
    pub fn is_activating(&self) -> bool {
        ACTIVATING_EVENTS.contains(&self.event.as_str())
    }

    pub fn payment_id(&self) -> Option<&str> {
        self.payload
            .payment
            .as_ref()
            .map(|p| p.entity.id.as_str())
            .filter(|id| !id.is_empty())
    }

    /// Order entity id, falling back to the payment's order id.
    pub fn order_id(&self) -> Option<&str> {
        self.payload
            .order
            .as_ref()
            .map(|o| o.entity.id.as_str())
            .filter(|id| !id.is_empty())
            .or_else(|| {
                self.payload
                    .payment
                    .as_ref()
                    .and_then(|p| p.entity.order_id.as_deref())
                    .filter(|id| !id.is_empty())
            })
    }

    /// Field-wise notes: payment notes first, order notes as fallback.
    pub fn notes(&self) -> OrderNotes {
        let payment = self.payload.payment.as_ref().map(|p| &p.entity.notes);
        let order = self.payload.order.as_ref().map(|o| &o.entity.notes);
        OrderNotes {
            email: first_non_blank(payment.map(|n| &n.email), order.map(|n| &n.email)),
            plan: first_non_blank(payment.map(|n| &n.plan), order.map(|n| &n.plan)),
        }
    }
}

fn first_non_blank(
    primary: Option<&Option<String>>,
    fallback: Option<&Option<String>>,
) -> Option<String> {
    primary
        .and_then(non_blank)
        .or_else(|| fallback.and_then(non_blank))
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Razorpay sends `"notes": []` when an entity has no notes.
fn lenient_notes<'de, D>(deserializer: D) -> Result<OrderNotes, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Notes {
        Map(HashMap<String, serde_json::Value>),
        Other(serde_json::Value),
    }

    let text = |map: &HashMap<String, serde_json::Value>, key: &str| {
        map.get(key).and_then(|v| v.as_str()).map(str::to_string)
    };

    Ok(match Notes::deserialize(deserializer)? {
        Notes::Map(map) => OrderNotes {
            email: text(&map, "email"),
            plan: text(&map, "plan"),
        },
        Notes::Other(_) => OrderNotes::default(),
    })
}
