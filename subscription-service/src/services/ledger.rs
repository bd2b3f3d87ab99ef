//! Per-company append-only history of applied activations.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use mongodb::bson::DateTime as BsonDateTime;
use rand::Rng;

use super::plans::SubscriptionDates;
use super::repository::{AppendOutcome, SubscriptionStore};
use crate::models::{
    ActivationEvent, HistoryStatus, Plan, Subscription, SubscriptionHistoryEntry,
};

const INVOICE_SUFFIX_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// `INV-<unix millis>-<6 uppercase alphanumerics>`.
pub fn generate_invoice_id(now: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..6)
        .map(|_| {
            let idx = rng.gen_range(0..INVOICE_SUFFIX_CHARSET.len());
            INVOICE_SUFFIX_CHARSET[idx] as char
        })
        .collect();
    format!("INV-{}-{}", now.timestamp_millis(), suffix)
}

#[derive(Clone)]
pub struct SubscriptionLedger {
    store: Arc<dyn SubscriptionStore>,
    currency: String,
}

impl SubscriptionLedger {
    pub fn new(store: Arc<dyn SubscriptionStore>, currency: impl Into<String>) -> Self {
        Self {
            store,
            currency: currency.into(),
        }
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// History entry for `event`, with a fresh invoice id.
    pub fn new_entry(
        &self,
        event: &ActivationEvent,
        plan: &Plan,
        dates: SubscriptionDates,
    ) -> SubscriptionHistoryEntry {
        SubscriptionHistoryEntry {
            plan: plan.id,
            status: HistoryStatus::Active,
            start_at: BsonDateTime::from_chrono(dates.started_at),
            end_at: dates.ends_at.map(BsonDateTime::from_chrono),
            amount: plan.price_minor_units,
            currency: self.currency.clone(),
            invoice_id: generate_invoice_id(event.occurred_at),
            payment_id: event.payment_id.clone().filter(|id| !id.is_empty()),
            order_id: event.order_id.clone().filter(|id| !id.is_empty()),
            payment_provider: event.provider.clone(),
        }
    }

    /// Record `entry` and commit `subscription` unless the payment key is
    /// already in the company's history.
    pub async fn append(
        &self,
        email: &str,
        entry: &SubscriptionHistoryEntry,
        subscription: &Subscription,
    ) -> anyhow::Result<AppendOutcome> {
        let outcome = self
            .store
            .append_activation(email, entry, subscription)
            .await?;

        match outcome {
            AppendOutcome::Applied => tracing::info!(
                email = %email,
                invoice_id = %entry.invoice_id,
                payment_id = ?entry.payment_id,
                order_id = ?entry.order_id,
                "Subscription history entry appended"
            ),
            AppendOutcome::Duplicate => tracing::info!(
                email = %email,
                payment_id = ?entry.payment_id,
                order_id = ?entry.order_id,
                "Payment already recorded, skipping"
            ),
            AppendOutcome::CompanyNotFound => {
                tracing::warn!(email = %email, "No company for activation")
            }
        }

        Ok(outcome)
    }
}
