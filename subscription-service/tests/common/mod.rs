#![allow(dead_code)]

use std::sync::Arc;

use secrecy::Secret;
use service_core::utils::signature::hmac_sha256_hex;
use subscription_service::config::RazorpayConfig;
use subscription_service::models::Company;
use subscription_service::services::{
    HtmlInvoiceRenderer, InMemorySubscriptionStore, InvoiceNotifier, LifecycleEngine,
    MockEmailProvider, PlanCatalog, RazorpayClient, SignatureVerifier, SubscriptionStore,
    WEBHOOK_SIGNATURE_HEADER,
};
use subscription_service::{build_router, AppState};
use tokio::net::TcpListener;
use wiremock::MockServer;

pub const TEST_EMAIL: &str = "hiring@acme.test";
pub const TEST_KEY_ID: &str = "rzp_test_key";
pub const TEST_KEY_SECRET: &str = "test_key_secret";
pub const TEST_WEBHOOK_SECRET: &str = "test_webhook_secret";

/// In-process server over the in-memory store, with a mock mailbox and a
/// mock gateway.
pub struct TestApp {
    pub address: String,
    pub engine: LifecycleEngine,
    pub store: Arc<InMemorySubscriptionStore>,
    pub email: Arc<MockEmailProvider>,
    pub gateway: MockServer,
    pub client: reqwest::Client,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_webhook_secret(TEST_WEBHOOK_SECRET).await
    }

    pub async fn spawn_with_webhook_secret(webhook_secret: &str) -> Self {
        let gateway = MockServer::start().await;

        let store = Arc::new(InMemorySubscriptionStore::new());
        store
            .insert_company(Company::new(TEST_EMAIL, Some("Acme Hiring".to_string())))
            .await;

        let email = Arc::new(MockEmailProvider::new());
        let notifier = Arc::new(InvoiceNotifier::new(
            email.clone(),
            Arc::new(HtmlInvoiceRenderer),
            Some("kGamify".to_string()),
        ));

        let engine = LifecycleEngine::new(
            Arc::new(PlanCatalog::standard()),
            SignatureVerifier::new(
                Secret::new(TEST_KEY_SECRET.to_string()),
                Secret::new(webhook_secret.to_string()),
            ),
            RazorpayClient::new(RazorpayConfig {
                key_id: TEST_KEY_ID.to_string(),
                key_secret: Secret::new(TEST_KEY_SECRET.to_string()),
                webhook_secret: Secret::new(webhook_secret.to_string()),
                api_base_url: gateway.uri(),
            }),
            store.clone(),
            notifier,
            "INR",
            "kGamify",
        );

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let port = listener.local_addr().unwrap().port();
        let router = build_router(AppState::new(engine.clone()));

        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });

        TestApp {
            address: format!("http://127.0.0.1:{}", port),
            engine,
            store,
            email,
            gateway,
            client: reqwest::Client::new(),
        }
    }

    pub async fn company(&self, email: &str) -> Company {
        self.store
            .find_company(email)
            .await
            .expect("store error")
            .expect("company missing")
    }

    pub async fn post_json(&self, path: &str, body: &serde_json::Value) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.address, path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Deliver `body` to the webhook endpoint with an optional signature
    /// header.
    pub async fn post_webhook(&self, body: &[u8], signature: Option<&str>) -> reqwest::Response {
        let mut request = self
            .client
            .post(format!("{}/payments/webhook", self.address))
            .header("content-type", "application/json")
            .body(body.to_vec());
        if let Some(signature) = signature {
            request = request.header(WEBHOOK_SIGNATURE_HEADER, signature);
        }
        request.send().await.expect("Failed to execute request")
    }

    pub async fn get_subscription(&self, email: &str) -> reqwest::Response {
        self.client
            .get(format!("{}/payments/subscription", self.address))
            .query(&[("email", email)])
            .send()
            .await
            .expect("Failed to execute request")
    }
}

pub fn sign_webhook(body: &[u8]) -> String {
    hmac_sha256_hex(TEST_WEBHOOK_SECRET.as_bytes(), body).unwrap()
}

pub fn sign_payment(order_id: &str, payment_id: &str) -> String {
    let payload = format!("{}|{}", order_id, payment_id);
    hmac_sha256_hex(TEST_KEY_SECRET.as_bytes(), payload.as_bytes()).unwrap()
}

/// A gateway event body with the buyer's email and plan in the payment
/// notes.
pub fn webhook_body(event: &str, payment_id: &str, order_id: &str, plan: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "entity": "event",
        "event": event,
        "payload": {
            "payment": {
                "entity": {
                    "id": payment_id,
                    "order_id": order_id,
                    "amount": 99900,
                    "currency": "INR",
                    "notes": { "email": TEST_EMAIL, "plan": plan }
                }
            }
        },
        "created_at": 1736935800
    }))
    .unwrap()
}
