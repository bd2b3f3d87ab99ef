use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use validator::Validate;

use crate::models::{HistoryStatus, PlanId, SubscriptionHistoryEntry, SubscriptionState};
use crate::services::{CreatedOrder, OrderOutcome};

/// Missing fields deserialize to `None` so the handler can answer 400 with
/// a message instead of a body rejection.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(email(message = "Invalid email"))]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(length(max = 32, message = "Invalid plan"))]
    pub plan: Option<String>,
}

/// Surrounding whitespace is dropped before validation.
fn trimmed<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.map(|s| s.trim().to_string()))
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CreateOrderResponse {
    #[serde(rename_all = "camelCase")]
    Created {
        order_id: String,
        amount: i64,
        currency: String,
        email: String,
        plan: PlanId,
        key_id: String,
    },
    Free { message: String, plan: PlanId },
}

impl From<OrderOutcome> for CreateOrderResponse {
    fn from(outcome: OrderOutcome) -> Self {
        match outcome {
            OrderOutcome::FreeActivated(subscription) => CreateOrderResponse::Free {
                message: "Free plan activated".to_string(),
                plan: subscription.plan,
            },
            OrderOutcome::Created(CreatedOrder {
                order_id,
                amount,
                currency,
                email,
                plan,
                key_id,
            }) => CreateOrderResponse::Created {
                order_id,
                amount,
                currency,
                email,
                plan,
                key_id,
            },
        }
    }
}

/// Checkout callback body. Accepts the gateway's field names and the
/// shorter camelCase ones.
#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    #[serde(default, rename = "razorpay_order_id", alias = "orderId")]
    pub order_id: Option<String>,
    #[serde(default, rename = "razorpay_payment_id", alias = "paymentId")]
    pub payment_id: Option<String>,
    #[serde(default, rename = "razorpay_signature", alias = "signature")]
    pub signature: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub plan: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VerifyPaymentResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentConfigResponse {
    pub key_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionQuery {
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntryResponse {
    pub plan: PlanId,
    pub status: HistoryStatus,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
    pub amount: i64,
    pub currency: String,
    pub invoice_id: String,
    pub payment_id: Option<String>,
    pub order_id: Option<String>,
    pub payment_provider: String,
}

impl From<SubscriptionHistoryEntry> for HistoryEntryResponse {
    fn from(entry: SubscriptionHistoryEntry) -> Self {
        Self {
            plan: entry.plan,
            status: entry.status,
            start_at: entry.start_at.to_chrono(),
            end_at: entry.end_at.map(|d| d.to_chrono()),
            amount: entry.amount,
            currency: entry.currency,
            invoice_id: entry.invoice_id,
            payment_id: entry.payment_id,
            order_id: entry.order_id,
            payment_provider: entry.payment_provider,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResponse {
    pub email: String,
    pub plan: PlanId,
    pub started_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub job_limit: i32,
    pub days_remaining: Option<i64>,
    pub paid: bool,
    pub history: Vec<HistoryEntryResponse>,
}

impl SubscriptionResponse {
    pub fn new(
        email: String,
        state: &SubscriptionState,
        days_remaining: Option<i64>,
        history: Vec<SubscriptionHistoryEntry>,
    ) -> Self {
        Self {
            email,
            plan: state.plan(),
            started_at: state.started_at(),
            ends_at: state.ends_at(),
            job_limit: state.job_limit(),
            days_remaining,
            paid: state.is_paid(),
            history: history.into_iter().map(HistoryEntryResponse::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Subscription;

    #[test]
    fn verify_request_accepts_both_field_styles() {
        let gateway: VerifyPaymentRequest = serde_json::from_str(
            r#"{"razorpay_order_id":"o1","razorpay_payment_id":"p1","razorpay_signature":"s"}"#,
        )
        .unwrap();
        let short: VerifyPaymentRequest = serde_json::from_str(
            r#"{"orderId":"o1","paymentId":"p1","signature":"s","email":"c@x.com","plan":"paid3m"}"#,
        )
        .unwrap();

        assert_eq!(gateway.order_id.as_deref(), Some("o1"));
        assert_eq!(short.order_id.as_deref(), Some("o1"));
        assert_eq!(short.payment_id.as_deref(), Some("p1"));
        assert_eq!(short.signature.as_deref(), Some("s"));
        assert_eq!(short.email.as_deref(), Some("c@x.com"));
    }

    #[test]
    fn free_order_response_shape() {
        let response = CreateOrderResponse::from(OrderOutcome::FreeActivated(Subscription {
            plan: PlanId::Free,
            started_at: Utc::now(),
            ends_at: None,
            job_limit: 3,
        }));
        assert_eq!(
            serde_json::to_value(response).unwrap(),
            serde_json::json!({ "message": "Free plan activated", "plan": "free" })
        );
    }

    #[test]
    fn created_order_response_is_camel_case() {
        let response = CreateOrderResponse::from(OrderOutcome::Created(CreatedOrder {
            order_id: "order_1".to_string(),
            amount: 99_900,
            currency: "INR".to_string(),
            email: "c@x.com".to_string(),
            plan: PlanId::Paid3Months,
            key_id: "rzp_test".to_string(),
        }));
        assert_eq!(
            serde_json::to_value(response).unwrap(),
            serde_json::json!({
                "orderId": "order_1",
                "amount": 99900,
                "currency": "INR",
                "email": "c@x.com",
                "plan": "paid3m",
                "keyId": "rzp_test"
            })
        );
    }

    #[test]
    fn order_request_validates_email_format() {
        let request = CreateOrderRequest {
            email: Some("not-an-email".to_string()),
            plan: Some("paid3m".to_string()),
        };
        assert!(request.validate().is_err());

        let missing = CreateOrderRequest {
            email: None,
            plan: None,
        };
        assert!(missing.validate().is_ok());
    }

    #[test]
    fn order_request_trims_before_validation() {
        let request: CreateOrderRequest = serde_json::from_str(
            r#"{"email":"  hiring@acme.test ","plan":" paid3m "}"#,
        )
        .unwrap();
        assert_eq!(request.email.as_deref(), Some("hiring@acme.test"));
        assert_eq!(request.plan.as_deref(), Some("paid3m"));
        assert!(request.validate().is_ok());

        let absent: CreateOrderRequest = serde_json::from_str("{}").unwrap();
        assert!(absent.email.is_none());
    }
}
