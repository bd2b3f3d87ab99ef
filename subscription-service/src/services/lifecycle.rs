//! Subscription lifecycle orchestration.
//!
//! Order creation, and the two activation entry paths (gateway webhook and
//! checkout callback). Both paths normalise into an [`ActivationEvent`] and
//! go through [`LifecycleEngine::apply`], which owns the ledger append and the
//! state transition. Notices are sent on a detached task after the write
//! commits; their outcome never reaches the caller.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::task::TaskTracker;

use super::invoice::InvoiceDetails;
use super::ledger::SubscriptionLedger;
use super::metrics::{record_activation, record_notification, record_webhook_event};
use super::notifier::Notifier;
use super::plans::PlanCatalog;
use super::razorpay::{OrderNotes, RazorpayClient, WebhookEvent, PROVIDER_NAME};
use super::repository::{AppendOutcome, SubscriptionStore};
use super::signature::{PaymentConfirmation, SignatureVerifier};
use super::subscription::{state_of, transition};
use crate::error::SubscriptionError;
use crate::models::{
    ActivationEvent, ActivationSource, Company, Plan, PlanId, Subscription,
    SubscriptionHistoryEntry, SubscriptionState,
};

/// Result of `POST /payments/order`.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderOutcome {
    /// Free plan applied directly; no payment step.
    FreeActivated(Subscription),
    Created(CreatedOrder),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedOrder {
    pub order_id: String,
    pub amount: i64,
    pub currency: String,
    pub email: String,
    pub plan: PlanId,
    pub key_id: String,
}

/// Why a verified activation was acknowledged without effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    UnhandledEvent,
    MissingEmail,
    UnknownPlan,
    MissingPaymentKey,
    CompanyNotFound,
}

impl IgnoreReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            IgnoreReason::UnhandledEvent => "unhandled_event",
            IgnoreReason::MissingEmail => "missing_email",
            IgnoreReason::UnknownPlan => "unknown_plan",
            IgnoreReason::MissingPaymentKey => "missing_payment_key",
            IgnoreReason::CompanyNotFound => "company_not_found",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActivationOutcome {
    Applied(Subscription),
    /// Payment already recorded; reported to callers as success.
    Duplicate,
    Ignored(IgnoreReason),
}

impl ActivationOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ActivationOutcome::Applied(_) => "applied",
            ActivationOutcome::Duplicate => "duplicate",
            ActivationOutcome::Ignored(_) => "ignored",
        }
    }
}

#[derive(Clone)]
pub struct LifecycleEngine {
    catalog: Arc<PlanCatalog>,
    verifier: SignatureVerifier,
    gateway: RazorpayClient,
    ledger: SubscriptionLedger,
    store: Arc<dyn SubscriptionStore>,
    notifier: Arc<dyn Notifier>,
    brand: String,
    tasks: TaskTracker,
}

impl LifecycleEngine {
    pub fn new(
        catalog: Arc<PlanCatalog>,
        verifier: SignatureVerifier,
        gateway: RazorpayClient,
        store: Arc<dyn SubscriptionStore>,
        notifier: Arc<dyn Notifier>,
        currency: impl Into<String>,
        brand: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            verifier,
            gateway,
            ledger: SubscriptionLedger::new(store.clone(), currency),
            store,
            notifier,
            brand: brand.into(),
            tasks: TaskTracker::new(),
        }
    }

    pub fn catalog(&self) -> &PlanCatalog {
        &self.catalog
    }

    pub fn key_id(&self) -> &str {
        self.gateway.key_id()
    }

    pub fn store(&self) -> &Arc<dyn SubscriptionStore> {
        &self.store
    }

    /// Validate the request and either activate the free plan or open a
    /// gateway order tagged with the buyer's email and plan.
    pub async fn create_order(
        &self,
        email: &str,
        plan: &str,
    ) -> Result<OrderOutcome, SubscriptionError> {
        let email = email.trim();
        if email.is_empty() || plan.trim().is_empty() {
            return Err(SubscriptionError::Validation(
                "email and plan required".to_string(),
            ));
        }
        let plan = self.catalog.get(plan)?;

        if self
            .store
            .find_company(email)
            .await
            .map_err(SubscriptionError::Store)?
            .is_none()
        {
            return Err(SubscriptionError::CompanyNotFound);
        }

        if plan.id.is_free() {
            return self.activate_free(email).await;
        }

        let now = Utc::now();
        let receipt = format!("rcpt_{}", now.timestamp_millis());
        let notes = OrderNotes {
            email: Some(email.to_string()),
            plan: Some(plan.id.as_str().to_string()),
        };

        let order = self
            .gateway
            .create_order(plan.price_minor_units, self.ledger.currency(), &receipt, &notes)
            .await?;

        tracing::info!(
            email = %email,
            plan = %plan.id,
            order_id = %order.id,
            "Payment order created"
        );

        Ok(OrderOutcome::Created(CreatedOrder {
            order_id: order.id,
            amount: order.amount,
            currency: order.currency,
            email: email.to_string(),
            plan: plan.id,
            key_id: self.gateway.key_id().to_string(),
        }))
    }

    async fn activate_free(&self, email: &str) -> Result<OrderOutcome, SubscriptionError> {
        let subscription = transition(&self.catalog, PlanId::Free, Utc::now());
        let updated = self
            .store
            .set_subscription(email, &subscription)
            .await
            .map_err(SubscriptionError::Store)?;
        if !updated {
            return Err(SubscriptionError::CompanyNotFound);
        }

        record_activation(PlanId::Free.as_str(), "applied");
        tracing::info!(email = %email, "Free plan activated");
        Ok(OrderOutcome::FreeActivated(subscription))
    }

    /// Gateway webhook path. `raw_body` must be the bytes exactly as
    /// received; it is parsed only after the signature checks out.
    pub async fn handle_webhook(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<ActivationOutcome, SubscriptionError> {
        self.verifier.verify_webhook(raw_body, signature)?;

        let webhook: WebhookEvent = serde_json::from_slice(raw_body).map_err(|e| {
            tracing::warn!(error = %e, "Verified webhook with unparseable payload");
            SubscriptionError::Validation("Invalid webhook payload".to_string())
        })?;

        if !webhook.is_activating() {
            tracing::debug!(event = %webhook.event, "Ignoring webhook event");
            record_webhook_event("other", "ignored");
            return Ok(ActivationOutcome::Ignored(IgnoreReason::UnhandledEvent));
        }

        let notes = webhook.notes();
        let outcome = match self.activation_event(
            notes.email.as_deref(),
            notes.plan.as_deref(),
            webhook.payment_id(),
            webhook.order_id(),
            ActivationSource::Webhook,
        ) {
            Ok(event) => self.apply(event).await?,
            Err(reason) => ActivationOutcome::Ignored(reason),
        };

        record_webhook_event(&webhook.event, outcome.label());
        Ok(outcome)
    }

    /// Checkout callback path. A valid signature is success for the caller;
    /// activation additionally needs `email` and `plan`.
    pub async fn verify_client_payment(
        &self,
        confirmation: &PaymentConfirmation,
        email: Option<&str>,
        plan: Option<&str>,
    ) -> Result<ActivationOutcome, SubscriptionError> {
        if confirmation.order_id.trim().is_empty()
            || confirmation.payment_id.trim().is_empty()
            || confirmation.signature.trim().is_empty()
        {
            return Err(SubscriptionError::Validation(
                "Missing payment verification fields".to_string(),
            ));
        }

        self.verifier.verify_payment(confirmation)?;

        match self.activation_event(
            email,
            plan,
            Some(&confirmation.payment_id),
            Some(&confirmation.order_id),
            ActivationSource::ClientVerify,
        ) {
            Ok(event) => self.apply(event).await,
            Err(reason) => Ok(ActivationOutcome::Ignored(reason)),
        }
    }

    fn activation_event(
        &self,
        email: Option<&str>,
        plan: Option<&str>,
        payment_id: Option<&str>,
        order_id: Option<&str>,
        source: ActivationSource,
    ) -> Result<ActivationEvent, IgnoreReason> {
        let email = email.map(str::trim).filter(|e| !e.is_empty()).ok_or_else(|| {
            tracing::info!(source = source.as_str(), "Verified payment without email, not activating");
            IgnoreReason::MissingEmail
        })?;

        let plan = plan
            .ok_or(IgnoreReason::UnknownPlan)
            .and_then(|p| p.parse::<PlanId>().map_err(|_| IgnoreReason::UnknownPlan))
            .map_err(|reason| {
                tracing::warn!(
                    email = %email,
                    plan = ?plan,
                    source = source.as_str(),
                    "Verified payment for unknown plan, not activating"
                );
                reason
            })?;

        Ok(ActivationEvent {
            email: email.to_string(),
            plan,
            payment_id: payment_id.map(str::to_string),
            order_id: order_id.map(str::to_string),
            provider: PROVIDER_NAME.to_string(),
            source,
            occurred_at: Utc::now(),
        })
    }

    /// Apply a verified activation at most once per payment key.
    pub async fn apply(
        &self,
        event: ActivationEvent,
    ) -> Result<ActivationOutcome, SubscriptionError> {
        if !event.has_payment_key() {
            tracing::warn!(
                email = %event.email,
                source = event.source.as_str(),
                "Activation without payment or order id cannot be de-duplicated, ignoring"
            );
            record_activation(event.plan.as_str(), "ignored");
            return Ok(ActivationOutcome::Ignored(IgnoreReason::MissingPaymentKey));
        }

        let plan = self.catalog.plan(event.plan);
        let subscription = transition(&self.catalog, plan.id, event.occurred_at);
        let dates = self.catalog.subscription_dates(event.occurred_at, plan.id);
        let entry = self.ledger.new_entry(&event, plan, dates);

        let outcome = match self
            .ledger
            .append(&event.email, &entry, &subscription)
            .await
            .map_err(SubscriptionError::Store)?
        {
            AppendOutcome::Applied => {
                tracing::info!(
                    email = %event.email,
                    plan = %plan.id,
                    source = event.source.as_str(),
                    payment_id = ?event.payment_id,
                    order_id = ?event.order_id,
                    "Subscription activated"
                );
                self.spawn_notice(event.email.clone(), plan.clone(), entry);
                ActivationOutcome::Applied(subscription)
            }
            AppendOutcome::Duplicate => ActivationOutcome::Duplicate,
            AppendOutcome::CompanyNotFound => {
                ActivationOutcome::Ignored(IgnoreReason::CompanyNotFound)
            }
        };

        record_activation(plan.id.as_str(), outcome.label());
        Ok(outcome)
    }

    fn spawn_notice(&self, email: String, plan: Plan, entry: SubscriptionHistoryEntry) {
        let store = self.store.clone();
        let notifier = self.notifier.clone();
        let brand = self.brand.clone();

        self.tasks.spawn(async move {
            let company = match store.find_company(&email).await {
                Ok(Some(company)) => company,
                Ok(None) => Company::new(email.clone(), None),
                Err(e) => {
                    tracing::warn!(email = %email, error = %e, "Company lookup for notice failed");
                    Company::new(email.clone(), None)
                }
            };

            let details = InvoiceDetails {
                invoice_id: entry.invoice_id.clone(),
                brand,
                issued_at: Utc::now(),
                company_name: company.display_name().to_string(),
                company_email: company.email.clone(),
                billing_address: company.billing_address(),
                plan: plan.id,
                plan_label: plan.label.to_string(),
                job_limit: plan.job_limit,
                period_start: entry.start_at.to_chrono(),
                period_end: entry.end_at.map(|d| d.to_chrono()),
                amount_minor_units: entry.amount,
                currency: entry.currency.clone(),
                payment_id: entry.payment_id.clone(),
                order_id: entry.order_id.clone(),
            };

            match notifier.subscription_activated(&details).await {
                Ok(()) => record_notification("sent"),
                Err(e) => {
                    record_notification("failed");
                    tracing::error!(
                        email = %email,
                        invoice_id = %details.invoice_id,
                        error = %e,
                        "Failed to send subscription activation notice"
                    );
                }
            }
        });
    }

    /// Wait for every in-flight notice. Used on shutdown and by tests.
    pub async fn drain_notifications(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    /// Company record and its derived subscription state.
    pub async fn subscription_of(
        &self,
        email: &str,
    ) -> Result<(Company, SubscriptionState), SubscriptionError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(SubscriptionError::Validation("email required".to_string()));
        }

        let company = self
            .store
            .find_company(email)
            .await
            .map_err(SubscriptionError::Store)?
            .ok_or(SubscriptionError::CompanyNotFound)?;

        let state = state_of(&self.catalog, &company);
        Ok((company, state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RazorpayConfig;
    use crate::services::email::MockEmailProvider;
    use crate::services::invoice::HtmlInvoiceRenderer;
    use crate::services::memory::InMemorySubscriptionStore;
    use crate::services::notifier::InvoiceNotifier;
    use secrecy::Secret;
    use service_core::utils::signature::hmac_sha256_hex;

    const WEBHOOK_SECRET: &str = "webhook_secret";
    const KEY_SECRET: &str = "key_secret";

    struct Harness {
        engine: LifecycleEngine,
        store: Arc<InMemorySubscriptionStore>,
        email: Arc<MockEmailProvider>,
    }

    async fn harness() -> Harness {
        let store = Arc::new(InMemorySubscriptionStore::new());
        store
            .insert_company(Company::new("c@x.com", Some("Acme".to_string())))
            .await;
        let email = Arc::new(MockEmailProvider::new());
        let notifier = Arc::new(InvoiceNotifier::new(
            email.clone(),
            Arc::new(HtmlInvoiceRenderer),
            None,
        ));
        let engine = LifecycleEngine::new(
            Arc::new(PlanCatalog::standard()),
            SignatureVerifier::new(
                Secret::new(KEY_SECRET.to_string()),
                Secret::new(WEBHOOK_SECRET.to_string()),
            ),
            RazorpayClient::new(RazorpayConfig {
                key_id: String::new(),
                key_secret: Secret::new(String::new()),
                webhook_secret: Secret::new(String::new()),
                api_base_url: "http://127.0.0.1:1".to_string(),
            }),
            store.clone(),
            notifier,
            "INR",
            "kGamify",
        );
        Harness {
            engine,
            store,
            email,
        }
    }

    fn captured(payment_id: &str, order_id: &str, plan: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "event": "payment.captured",
            "payload": {
                "payment": {
                    "entity": {
                        "id": payment_id,
                        "order_id": order_id,
                        "notes": { "email": "c@x.com", "plan": plan }
                    }
                }
            }
        }))
        .unwrap()
    }

    fn sign(body: &[u8]) -> String {
        hmac_sha256_hex(WEBHOOK_SECRET.as_bytes(), body).unwrap()
    }

    fn confirmation(order_id: &str, payment_id: &str) -> PaymentConfirmation {
        let payload = format!("{}|{}", order_id, payment_id);
        PaymentConfirmation {
            order_id: order_id.to_string(),
            payment_id: payment_id.to_string(),
            signature: hmac_sha256_hex(KEY_SECRET.as_bytes(), payload.as_bytes()).unwrap(),
        }
    }

    async fn company(h: &Harness) -> Company {
        h.store.find_company("c@x.com").await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn webhook_applies_once() {
        let h = harness().await;
        let body = captured("pay_1", "order_1", "paid3m");

        let first = h.engine.handle_webhook(&body, Some(&sign(&body))).await.unwrap();
        assert!(matches!(first, ActivationOutcome::Applied(_)));
        let after_first = company(&h).await;

        let second = h.engine.handle_webhook(&body, Some(&sign(&body))).await.unwrap();
        assert_eq!(second, ActivationOutcome::Duplicate);

        let after_second = company(&h).await;
        assert_eq!(after_second.subscription_history.len(), 1);
        assert_eq!(
            after_second.subscription_started_at,
            after_first.subscription_started_at
        );

        h.engine.drain_notifications().await;
        assert_eq!(h.email.send_count(), 1);
    }

    #[tokio::test]
    async fn webhook_then_client_verify_applies_once() {
        let h = harness().await;
        let body = captured("pay_1", "order_1", "paid6m");
        h.engine.handle_webhook(&body, Some(&sign(&body))).await.unwrap();

        let outcome = h
            .engine
            .verify_client_payment(&confirmation("order_1", "pay_1"), Some("c@x.com"), Some("paid6m"))
            .await
            .unwrap();

        assert_eq!(outcome, ActivationOutcome::Duplicate);
        assert_eq!(company(&h).await.subscription_history.len(), 1);
    }

    #[tokio::test]
    async fn tampered_webhook_changes_nothing() {
        let h = harness().await;
        // Signed for the 3-month plan, delivered claiming the 12-month plan.
        let signature = sign(&captured("pay_1", "order_1", "paid3m"));
        let tampered = captured("pay_1", "order_1", "paid12m");

        let err = h
            .engine
            .handle_webhook(&tampered, Some(&signature))
            .await
            .unwrap_err();
        assert!(matches!(err, SubscriptionError::Authentication(_)));

        let company = company(&h).await;
        assert!(company.subscription_history.is_empty());
        assert_eq!(company.subscription_plan, None);
    }

    #[tokio::test]
    async fn unknown_plan_in_notes_is_ignored() {
        let h = harness().await;
        let body = captured("pay_1", "order_1", "platinum");
        let outcome = h.engine.handle_webhook(&body, Some(&sign(&body))).await.unwrap();
        assert_eq!(outcome, ActivationOutcome::Ignored(IgnoreReason::UnknownPlan));
        assert!(company(&h).await.subscription_history.is_empty());
    }

    #[tokio::test]
    async fn client_verify_without_details_only_checks_signature() {
        let h = harness().await;
        let outcome = h
            .engine
            .verify_client_payment(&confirmation("order_1", "pay_1"), None, None)
            .await
            .unwrap();
        assert_eq!(outcome, ActivationOutcome::Ignored(IgnoreReason::MissingEmail));
        assert!(company(&h).await.subscription_history.is_empty());
    }

    #[tokio::test]
    async fn client_verify_for_unknown_company_is_ignored() {
        let h = harness().await;
        let outcome = h
            .engine
            .verify_client_payment(
                &confirmation("order_1", "pay_1"),
                Some("nobody@x.com"),
                Some("paid3m"),
            )
            .await
            .unwrap();
        assert_eq!(outcome, ActivationOutcome::Ignored(IgnoreReason::CompanyNotFound));
    }

    #[tokio::test]
    async fn activation_without_payment_key_is_ignored() {
        let h = harness().await;
        let outcome = h
            .engine
            .apply(ActivationEvent {
                email: "c@x.com".to_string(),
                plan: PlanId::Paid3Months,
                payment_id: None,
                order_id: Some(String::new()),
                provider: PROVIDER_NAME.to_string(),
                source: ActivationSource::Webhook,
                occurred_at: Utc::now(),
            })
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ActivationOutcome::Ignored(IgnoreReason::MissingPaymentKey)
        );
    }

    #[tokio::test]
    async fn free_order_activates_without_gateway() {
        let h = harness().await;
        let outcome = h.engine.create_order("c@x.com", "free").await.unwrap();
        assert!(matches!(outcome, OrderOutcome::FreeActivated(ref s) if s.ends_at.is_none()));

        let company = company(&h).await;
        assert_eq!(company.subscription_plan, Some(PlanId::Free));
        assert_eq!(company.subscription_ends_at, None);
        assert_eq!(company.subscription_job_limit, Some(3));
        assert!(company.subscription_history.is_empty());
    }

    #[tokio::test]
    async fn order_validation_errors() {
        let h = harness().await;
        assert!(matches!(
            h.engine.create_order("", "paid3m").await,
            Err(SubscriptionError::Validation(_))
        ));
        assert!(matches!(
            h.engine.create_order("c@x.com", "gold").await,
            Err(SubscriptionError::UnknownPlan(_))
        ));
        assert!(matches!(
            h.engine.create_order("nobody@x.com", "paid3m").await,
            Err(SubscriptionError::CompanyNotFound)
        ));
        // Paid order with an unconfigured gateway.
        assert!(matches!(
            h.engine.create_order("c@x.com", "paid3m").await,
            Err(SubscriptionError::Gateway(_))
        ));
    }

    #[tokio::test]
    async fn notice_failure_does_not_fail_activation() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        store.insert_company(Company::new("c@x.com", None)).await;
        let provider = Arc::new(MockEmailProvider::failing());
        let engine = LifecycleEngine::new(
            Arc::new(PlanCatalog::standard()),
            SignatureVerifier::new(
                Secret::new(KEY_SECRET.to_string()),
                Secret::new(WEBHOOK_SECRET.to_string()),
            ),
            RazorpayClient::new(RazorpayConfig {
                key_id: String::new(),
                key_secret: Secret::new(String::new()),
                webhook_secret: Secret::new(String::new()),
                api_base_url: String::new(),
            }),
            store.clone(),
            Arc::new(InvoiceNotifier::new(
                provider.clone(),
                Arc::new(HtmlInvoiceRenderer),
                None,
            )),
            "INR",
            "kGamify",
        );

        let body = captured("pay_1", "order_1", "paid3m");
        let outcome = engine.handle_webhook(&body, Some(&sign(&body))).await.unwrap();
        engine.drain_notifications().await;

        assert!(matches!(outcome, ActivationOutcome::Applied(_)));
        assert_eq!(provider.send_count(), 1);
        let company = store.find_company("c@x.com").await.unwrap().unwrap();
        assert_eq!(company.subscription_plan, Some(PlanId::Paid3Months));
    }
}
