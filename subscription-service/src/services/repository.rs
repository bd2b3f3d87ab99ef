use anyhow::Result;
use async_trait::async_trait;
use mongodb::bson::{doc, to_bson, DateTime as BsonDateTime, Document};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, Database, IndexModel};

use crate::models::{Company, Subscription, SubscriptionHistoryEntry};

/// Result of a conditional history append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Entry pushed and subscription fields overwritten, in one write.
    Applied,
    /// An entry with the same payment id or order id already exists.
    Duplicate,
    CompanyNotFound,
}

/// Persistence for the subscription fields and history of a company.
///
/// `append_activation` is the only operation that must be atomic: the
/// duplicate check, the push and the subscription overwrite either all
/// happen or none do, across every instance sharing the store.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn find_company(&self, email: &str) -> Result<Option<Company>>;

    /// Overwrite the subscription fields without touching history.
    /// Returns false when no company has this email.
    async fn set_subscription(&self, email: &str, subscription: &Subscription) -> Result<bool>;

    async fn append_activation(
        &self,
        email: &str,
        entry: &SubscriptionHistoryEntry,
        subscription: &Subscription,
    ) -> Result<AppendOutcome>;

    async fn health_check(&self) -> Result<()>;
}

#[derive(Clone)]
pub struct MongoSubscriptionStore {
    client: Client,
    companies: Collection<Company>,
}

impl MongoSubscriptionStore {
    pub fn new(client: Client, db: &Database) -> Self {
        Self {
            client,
            companies: db.collection("companies"),
        }
    }

    pub async fn init_indexes(&self) -> Result<()> {
        let email_index = IndexModel::builder()
            .keys(doc! { "email": 1 })
            .options(
                IndexOptions::builder()
                    .name("company_email_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();

        self.companies.create_index(email_index, None).await?;

        tracing::info!("Subscription store indexes initialized");
        Ok(())
    }
}

/// `$set`/`$unset` pair that overwrites every subscription field.
fn subscription_update(subscription: &Subscription) -> Document {
    let mut set = doc! {
        "subscriptionPlan": subscription.plan.as_str(),
        "subscriptionStartedAt": BsonDateTime::from_chrono(subscription.started_at),
        "subscriptionJobLimit": subscription.job_limit,
    };

    let mut update = Document::new();
    match subscription.ends_at {
        Some(ends_at) => {
            set.insert("subscriptionEndsAt", BsonDateTime::from_chrono(ends_at));
        }
        None => {
            update.insert("$unset", doc! { "subscriptionEndsAt": "" });
        }
    }
    update.insert("$set", set);
    update
}

/// Matches the company only while no history entry shares a non-empty
/// payment id or order id with `entry`.
fn append_filter(email: &str, entry: &SubscriptionHistoryEntry) -> Document {
    let mut filter = doc! { "email": email };
    if let Some(payment_id) = entry.payment_id.as_deref().filter(|id| !id.is_empty()) {
        filter.insert("subscriptionHistory.paymentId", doc! { "$ne": payment_id });
    }
    if let Some(order_id) = entry.order_id.as_deref().filter(|id| !id.is_empty()) {
        filter.insert("subscriptionHistory.orderId", doc! { "$ne": order_id });
    }
    filter
}

#[async_trait]
impl SubscriptionStore for MongoSubscriptionStore {
    async fn find_company(&self, email: &str) -> Result<Option<Company>> {
        let company = self.companies.find_one(doc! { "email": email }, None).await?;
        Ok(company)
    }

    async fn set_subscription(&self, email: &str, subscription: &Subscription) -> Result<bool> {
        let result = self
            .companies
            .update_one(doc! { "email": email }, subscription_update(subscription), None)
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn append_activation(
        &self,
        email: &str,
        entry: &SubscriptionHistoryEntry,
        subscription: &Subscription,
    ) -> Result<AppendOutcome> {
        let mut update = subscription_update(subscription);
        update.insert("$push", doc! { "subscriptionHistory": to_bson(entry)? });

        let result = self
            .companies
            .update_one(append_filter(email, entry), update, None)
            .await?;

        if result.matched_count > 0 {
            return Ok(AppendOutcome::Applied);
        }

        // Nothing matched: either the key is already recorded or there is
        // no such company.
        let exists = self
            .companies
            .count_documents(doc! { "email": email }, None)
            .await?
            > 0;

        Ok(if exists {
            AppendOutcome::Duplicate
        } else {
            AppendOutcome::CompanyNotFound
        })
    }

    async fn health_check(&self) -> Result<()> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HistoryStatus, PlanId};
    use chrono::{TimeZone, Utc};

    fn entry(payment_id: Option<&str>, order_id: Option<&str>) -> SubscriptionHistoryEntry {
        SubscriptionHistoryEntry {
            plan: PlanId::Paid3Months,
            status: HistoryStatus::Active,
            start_at: BsonDateTime::now(),
            end_at: None,
            amount: 99_900,
            currency: "INR".to_string(),
            invoice_id: "INV-1-ABCDEF".to_string(),
            payment_id: payment_id.map(str::to_string),
            order_id: order_id.map(str::to_string),
            payment_provider: "razorpay".to_string(),
        }
    }

    #[test]
    fn append_filter_guards_both_keys() {
        let filter = append_filter("c@x.com", &entry(Some("pay_1"), Some("order_1")));
        assert_eq!(
            filter,
            doc! {
                "email": "c@x.com",
                "subscriptionHistory.paymentId": { "$ne": "pay_1" },
                "subscriptionHistory.orderId": { "$ne": "order_1" },
            }
        );
    }

    #[test]
    fn append_filter_skips_empty_keys() {
        let filter = append_filter("c@x.com", &entry(Some(""), Some("order_1")));
        assert!(!filter.contains_key("subscriptionHistory.paymentId"));
        assert!(filter.contains_key("subscriptionHistory.orderId"));
    }

    #[test]
    fn free_subscription_unsets_end_date() {
        let started_at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let update = subscription_update(&Subscription {
            plan: PlanId::Free,
            started_at,
            ends_at: None,
            job_limit: 3,
        });

        assert_eq!(update.get_document("$unset").unwrap(), &doc! { "subscriptionEndsAt": "" });
        let set = update.get_document("$set").unwrap();
        assert_eq!(set.get_str("subscriptionPlan").unwrap(), "free");
        assert!(!set.contains_key("subscriptionEndsAt"));
    }

    #[test]
    fn paid_subscription_sets_every_field() {
        let started_at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let ends_at = started_at + chrono::Duration::days(90);
        let update = subscription_update(&Subscription {
            plan: PlanId::Paid3Months,
            started_at,
            ends_at: Some(ends_at),
            job_limit: 15,
        });

        assert!(!update.contains_key("$unset"));
        let set = update.get_document("$set").unwrap();
        assert_eq!(set.get_str("subscriptionPlan").unwrap(), "paid3m");
        assert_eq!(set.get_i32("subscriptionJobLimit").unwrap(), 15);
        assert_eq!(
            set.get_datetime("subscriptionEndsAt").unwrap(),
            &BsonDateTime::from_chrono(ends_at)
        );
    }
}
