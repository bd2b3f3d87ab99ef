//! In-process store for tests and local runs without MongoDB.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use mongodb::bson::DateTime as BsonDateTime;
use tokio::sync::RwLock;

use super::repository::{AppendOutcome, SubscriptionStore};
use crate::models::{Company, Subscription, SubscriptionHistoryEntry};

/// Companies keyed by email. Appends take the single write lock, so the
/// duplicate check and the push are one step, as in the Mongo store.
#[derive(Default)]
pub struct InMemorySubscriptionStore {
    companies: RwLock<HashMap<String, Company>>,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_company(&self, company: Company) {
        self.companies
            .write()
            .await
            .insert(company.email.clone(), company);
    }
}

fn apply_subscription(company: &mut Company, subscription: &Subscription) {
    company.subscription_plan = Some(subscription.plan);
    company.subscription_started_at = Some(BsonDateTime::from_chrono(subscription.started_at));
    company.subscription_ends_at = subscription.ends_at.map(BsonDateTime::from_chrono);
    company.subscription_job_limit = Some(subscription.job_limit);
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn find_company(&self, email: &str) -> Result<Option<Company>> {
        Ok(self.companies.read().await.get(email).cloned())
    }

    async fn set_subscription(&self, email: &str, subscription: &Subscription) -> Result<bool> {
        let mut companies = self.companies.write().await;
        match companies.get_mut(email) {
            Some(company) => {
                apply_subscription(company, subscription);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn append_activation(
        &self,
        email: &str,
        entry: &SubscriptionHistoryEntry,
        subscription: &Subscription,
    ) -> Result<AppendOutcome> {
        let mut companies = self.companies.write().await;
        let Some(company) = companies.get_mut(email) else {
            return Ok(AppendOutcome::CompanyNotFound);
        };

        if company
            .subscription_history
            .iter()
            .any(|existing| existing.shares_payment_key(entry))
        {
            return Ok(AppendOutcome::Duplicate);
        }

        company.subscription_history.push(entry.clone());
        apply_subscription(company, subscription);
        Ok(AppendOutcome::Applied)
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
