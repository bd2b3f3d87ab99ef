//! Company document as stored in the `companies` collection.
//!
//! Only the fields this service reads or writes are modelled; the rest of
//! the document (jobs, profile, approval state) is left untouched because
//! every write is a targeted `$set`/`$push`.

use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

use super::plan::PlanId;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub email: String,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub address_line1: Option<String>,
    #[serde(default)]
    pub address_line2: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub subscription_plan: Option<PlanId>,
    #[serde(default)]
    pub subscription_started_at: Option<DateTime>,
    #[serde(default)]
    pub subscription_ends_at: Option<DateTime>,
    #[serde(default)]
    pub subscription_job_limit: Option<i32>,
    #[serde(default)]
    pub subscription_history: Vec<SubscriptionHistoryEntry>,
}

impl Company {
    /// A freshly registered company: no subscription fields yet, which
    /// reads as the free plan.
    pub fn new(email: impl Into<String>, company_name: Option<String>) -> Self {
        Self {
            id: None,
            email: email.into(),
            company_name,
            address_line1: None,
            address_line2: None,
            address: None,
            subscription_plan: None,
            subscription_started_at: None,
            subscription_ends_at: None,
            subscription_job_limit: None,
            subscription_history: Vec::new(),
        }
    }

    /// Address lines joined for the invoice "billed to" block.
    pub fn billing_address(&self) -> String {
        [&self.address_line1, &self.address_line2, &self.address]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn display_name(&self) -> &str {
        self.company_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.email)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryStatus {
    Active,
}

/// One applied activation. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionHistoryEntry {
    pub plan: PlanId,
    pub status: HistoryStatus,
    pub start_at: DateTime,
    #[serde(default)]
    pub end_at: Option<DateTime>,
    /// Smallest currency unit.
    pub amount: i64,
    pub currency: String,
    pub invoice_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    pub payment_provider: String,
}

impl SubscriptionHistoryEntry {
    /// True when `other` carries the same non-empty payment id or the same
    /// non-empty order id.
    pub fn shares_payment_key(&self, other: &SubscriptionHistoryEntry) -> bool {
        fn same(a: &Option<String>, b: &Option<String>) -> bool {
            matches!((a.as_deref(), b.as_deref()), (Some(x), Some(y)) if !x.is_empty() && x == y)
        }
        same(&self.payment_id, &other.payment_id) || same(&self.order_id, &other.order_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(payment_id: Option<&str>, order_id: Option<&str>) -> SubscriptionHistoryEntry {
        SubscriptionHistoryEntry {
            plan: PlanId::Paid3Months,
            status: HistoryStatus::Active,
            start_at: DateTime::now(),
            end_at: None,
            amount: 99_900,
            currency: "INR".to_string(),
            invoice_id: "INV-1".to_string(),
            payment_id: payment_id.map(str::to_string),
            order_id: order_id.map(str::to_string),
            payment_provider: "razorpay".to_string(),
        }
    }

    #[test]
    fn payment_key_matches_on_either_id() {
        let a = entry(Some("pay_1"), Some("order_1"));
        assert!(a.shares_payment_key(&entry(Some("pay_1"), Some("order_2"))));
        assert!(a.shares_payment_key(&entry(Some("pay_2"), Some("order_1"))));
        assert!(a.shares_payment_key(&entry(None, Some("order_1"))));
        assert!(!a.shares_payment_key(&entry(Some("pay_2"), Some("order_2"))));
    }

    #[test]
    fn empty_ids_never_match() {
        let a = entry(Some(""), None);
        assert!(!a.shares_payment_key(&entry(Some(""), None)));
        assert!(!entry(None, None).shares_payment_key(&entry(None, None)));
    }

    #[test]
    fn deserializes_camel_case_document() {
        let doc = mongodb::bson::doc! {
            "email": "c@x.com",
            "companyName": "Acme",
            "subscriptionPlan": "paid6m",
            "subscriptionJobLimit": 20,
            "subscriptionHistory": [],
            "jobs": ["ignored"],
        };
        let company: Company = mongodb::bson::from_document(doc).unwrap();
        assert_eq!(company.subscription_plan, Some(PlanId::Paid6Months));
        assert_eq!(company.subscription_job_limit, Some(20));
        assert_eq!(company.display_name(), "Acme");
    }

    #[test]
    fn billing_address_skips_blank_lines() {
        let mut company = Company::new("c@x.com", None);
        company.address_line1 = Some("12 MG Road".to_string());
        company.address_line2 = Some("  ".to_string());
        company.address = Some("Pune".to_string());
        assert_eq!(company.billing_address(), "12 MG Road, Pune");
        assert_eq!(company.display_name(), "c@x.com");
    }
}
