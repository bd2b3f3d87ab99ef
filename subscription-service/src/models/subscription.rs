//! Subscription model.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::plan::PlanId;

/// Current subscription fields of a company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub plan: PlanId,
    pub started_at: DateTime<Utc>,
    /// Absent iff `plan` is free.
    pub ends_at: Option<DateTime<Utc>>,
    /// Copied from the catalog at activation; not recomputed afterwards.
    pub job_limit: i32,
}

/// Derived view of a company's subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionState {
    Free {
        started_at: Option<DateTime<Utc>>,
        job_limit: i32,
    },
    Active {
        plan: PlanId,
        started_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
        job_limit: i32,
    },
}

impl SubscriptionState {
    pub fn plan(&self) -> PlanId {
        match self {
            SubscriptionState::Free { .. } => PlanId::Free,
            SubscriptionState::Active { plan, .. } => *plan,
        }
    }

    pub fn job_limit(&self) -> i32 {
        match self {
            SubscriptionState::Free { job_limit, .. }
            | SubscriptionState::Active { job_limit, .. } => *job_limit,
        }
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        match self {
            SubscriptionState::Free { started_at, .. } => *started_at,
            SubscriptionState::Active { started_at, .. } => Some(*started_at),
        }
    }

    pub fn ends_at(&self) -> Option<DateTime<Utc>> {
        match self {
            SubscriptionState::Free { .. } => None,
            SubscriptionState::Active { ends_at, .. } => Some(*ends_at),
        }
    }

    pub fn is_paid(&self) -> bool {
        matches!(self, SubscriptionState::Active { .. })
    }
}

/// Which entry path produced an activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationSource {
    Webhook,
    ClientVerify,
}

impl ActivationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivationSource::Webhook => "webhook",
            ActivationSource::ClientVerify => "client_verify",
        }
    }
}

/// Signature-verified fact that a payment buys `plan` for `email`.
///
/// Never persisted as such; applying it produces at most one history entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationEvent {
    pub email: String,
    pub plan: PlanId,
    pub payment_id: Option<String>,
    pub order_id: Option<String>,
    pub provider: String,
    pub source: ActivationSource,
    pub occurred_at: DateTime<Utc>,
}

impl ActivationEvent {
    /// An event with neither id cannot be de-duplicated.
    pub fn has_payment_key(&self) -> bool {
        let non_empty = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        non_empty(&self.payment_id) || non_empty(&self.order_id)
    }
}
