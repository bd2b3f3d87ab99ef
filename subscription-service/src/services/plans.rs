//! Plan catalog.
//!
//! Built once at startup and shared read-only; every lookup is a plain
//! array index, so it is safe to use from any task without locking.

use chrono::{DateTime, Duration, Utc};

use crate::models::{Plan, PlanId, UnknownPlan};

/// Dates a plan activation covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionDates {
    pub started_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("catalog slot {slot} holds {found}, expected {expected}")]
    OutOfOrder {
        slot: usize,
        expected: PlanId,
        found: PlanId,
    },
    #[error("free plan must have no price and no duration")]
    PricedFreePlan,
    #[error("plan {0} must have a positive duration")]
    MissingDuration(PlanId),
    #[error("plan {0} has a negative job limit or price")]
    NegativeValue(PlanId),
}

#[derive(Debug, Clone)]
pub struct PlanCatalog {
    plans: [Plan; 4],
}

impl PlanCatalog {
    /// The production catalog.
    pub fn standard() -> Self {
        Self {
            plans: [
                Plan {
                    id: PlanId::Free,
                    price_minor_units: 0,
                    duration_days: None,
                    job_limit: 3,
                    label: "Free",
                },
                Plan {
                    id: PlanId::Paid3Months,
                    price_minor_units: 99_900,
                    duration_days: Some(90),
                    job_limit: 15,
                    label: "3 Months",
                },
                Plan {
                    id: PlanId::Paid6Months,
                    price_minor_units: 179_900,
                    duration_days: Some(180),
                    job_limit: 20,
                    label: "6 Months",
                },
                Plan {
                    id: PlanId::Paid12Months,
                    price_minor_units: 299_900,
                    duration_days: Some(365),
                    job_limit: 30,
                    label: "12 Months",
                },
            ],
        }
    }

    /// Build a catalog from explicit entries, one per plan id in catalog
    /// order.
    pub fn with_plans(plans: [Plan; 4]) -> Result<Self, CatalogError> {
        for (slot, (plan, expected)) in plans.iter().zip(PlanId::ALL).enumerate() {
            if plan.id != expected {
                return Err(CatalogError::OutOfOrder {
                    slot,
                    expected,
                    found: plan.id,
                });
            }
            if plan.job_limit < 0 || plan.price_minor_units < 0 {
                return Err(CatalogError::NegativeValue(plan.id));
            }
            match (plan.id.is_free(), plan.duration_days) {
                (true, Some(_)) => return Err(CatalogError::PricedFreePlan),
                (true, None) if plan.price_minor_units != 0 => {
                    return Err(CatalogError::PricedFreePlan)
                }
                (false, None) => return Err(CatalogError::MissingDuration(plan.id)),
                (false, Some(days)) if days <= 0 => {
                    return Err(CatalogError::MissingDuration(plan.id))
                }
                _ => {}
            }
        }
        Ok(Self { plans })
    }

    pub fn plan(&self, id: PlanId) -> &Plan {
        &self.plans[id.index()]
    }

    /// Look up a plan by its wire id.
    pub fn get(&self, id: &str) -> Result<&Plan, UnknownPlan> {
        let id: PlanId = id.parse()?;
        Ok(self.plan(id))
    }

    pub fn list(&self) -> &[Plan] {
        &self.plans
    }

    pub fn subscription_dates(&self, now: DateTime<Utc>, id: PlanId) -> SubscriptionDates {
        SubscriptionDates {
            started_at: now,
            ends_at: self
                .plan(id)
                .duration_days
                .map(|days| now + Duration::days(days)),
        }
    }
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self::standard()
    }
}
