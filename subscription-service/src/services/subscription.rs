//! Subscription state machine.
//!
//! Two states, `Free` and `Active`. Every applied activation overwrites the
//! current subscription with the new plan's parameters; there is no
//! upgrade/downgrade comparison, the latest applied activation wins.

use chrono::{DateTime, Utc};

use super::plans::PlanCatalog;
use crate::models::{Company, PlanId, Subscription, SubscriptionState};

/// Subscription a company moves to when `plan` is activated at `now`.
pub fn transition(catalog: &PlanCatalog, plan: PlanId, now: DateTime<Utc>) -> Subscription {
    let dates = catalog.subscription_dates(now, plan);
    Subscription {
        plan,
        started_at: dates.started_at,
        ends_at: dates.ends_at,
        job_limit: catalog.plan(plan).job_limit,
    }
}

/// Current state of `company`. A company with no subscription fields is on
/// the free plan with catalog defaults.
pub fn state_of(catalog: &PlanCatalog, company: &Company) -> SubscriptionState {
    let plan = company.subscription_plan.unwrap_or(PlanId::Free);
    let started_at = company.subscription_started_at.map(|d| d.to_chrono());
    let job_limit = company
        .subscription_job_limit
        .unwrap_or_else(|| catalog.plan(plan).job_limit);

    match (plan, started_at, company.subscription_ends_at) {
        (PlanId::Free, _, _) => SubscriptionState::Free {
            started_at,
            job_limit,
        },
        (plan, Some(started_at), Some(ends_at)) => SubscriptionState::Active {
            plan,
            started_at,
            ends_at: ends_at.to_chrono(),
            job_limit,
        },
        // A paid plan without dates cannot be honoured; read it as free.
        _ => {
            tracing::warn!(
                email = %company.email,
                plan = %plan,
                "Paid subscription without dates, treating as free"
            );
            SubscriptionState::Free {
                started_at,
                job_limit: catalog.plan(PlanId::Free).job_limit,
            }
        }
    }
}

/// Whole days left on a paid plan, rounded up and never negative. `None` on
/// the free plan.
pub fn days_remaining(state: &SubscriptionState, now: DateTime<Utc>) -> Option<i64> {
    let ends_at = state.ends_at()?;
    let remaining_secs = (ends_at - now).num_seconds();
    if remaining_secs <= 0 {
        return Some(0);
    }
    Some((remaining_secs + 86_399) / 86_400)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use mongodb::bson::DateTime as BsonDateTime;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 10, 30, 0).unwrap()
    }

    fn apply(company: &mut Company, subscription: &Subscription) {
        company.subscription_plan = Some(subscription.plan);
        company.subscription_started_at =
            Some(BsonDateTime::from_chrono(subscription.started_at));
        company.subscription_ends_at = subscription.ends_at.map(BsonDateTime::from_chrono);
        company.subscription_job_limit = Some(subscription.job_limit);
    }

    #[test]
    fn new_company_reads_as_free() {
        let catalog = PlanCatalog::standard();
        let state = state_of(&catalog, &Company::new("c@x.com", None));
        assert_eq!(
            state,
            SubscriptionState::Free {
                started_at: None,
                job_limit: 3
            }
        );
        assert_eq!(days_remaining(&state, t0()), None);
    }

    #[test]
    fn paid_transition_copies_catalog_values() {
        let catalog = PlanCatalog::standard();
        let subscription = transition(&catalog, PlanId::Paid6Months, t0());
        assert_eq!(subscription.started_at, t0());
        assert_eq!(subscription.ends_at, Some(t0() + Duration::days(180)));
        assert_eq!(subscription.job_limit, 20);
    }

    #[test]
    fn free_transition_has_no_end() {
        let catalog = PlanCatalog::standard();
        let subscription = transition(&catalog, PlanId::Free, t0());
        assert_eq!(subscription.ends_at, None);
        assert_eq!(subscription.job_limit, 3);
    }

    #[test]
    fn latest_activation_wins_even_when_smaller() {
        let catalog = PlanCatalog::standard();
        let mut company = Company::new("c@x.com", None);

        apply(&mut company, &transition(&catalog, PlanId::Paid12Months, t0()));
        let later = t0() + Duration::days(10);
        apply(&mut company, &transition(&catalog, PlanId::Paid3Months, later));

        assert_eq!(
            state_of(&catalog, &company),
            SubscriptionState::Active {
                plan: PlanId::Paid3Months,
                started_at: later,
                ends_at: later + Duration::days(90),
                job_limit: 15,
            }
        );
    }

    #[test]
    fn stored_job_limit_is_not_recomputed() {
        let catalog = PlanCatalog::standard();
        let mut company = Company::new("c@x.com", None);
        apply(&mut company, &transition(&catalog, PlanId::Paid3Months, t0()));
        company.subscription_job_limit = Some(12);

        assert_eq!(state_of(&catalog, &company).job_limit(), 12);
    }

    #[test]
    fn days_remaining_rounds_up_and_floors_at_zero() {
        let catalog = PlanCatalog::standard();
        let mut company = Company::new("c@x.com", None);
        apply(&mut company, &transition(&catalog, PlanId::Paid3Months, t0()));
        let state = state_of(&catalog, &company);

        assert_eq!(days_remaining(&state, t0()), Some(90));
        assert_eq!(days_remaining(&state, t0() + Duration::hours(1)), Some(90));
        assert_eq!(days_remaining(&state, t0() + Duration::days(89)), Some(1));
        assert_eq!(days_remaining(&state, t0() + Duration::days(120)), Some(0));
    }

    #[test]
    fn paid_plan_without_dates_reads_as_free() {
        let catalog = PlanCatalog::standard();
        let mut company = Company::new("c@x.com", None);
        company.subscription_plan = Some(PlanId::Paid6Months);

        let state = state_of(&catalog, &company);
        assert!(!state.is_paid());
        assert_eq!(state.job_limit(), 3);
    }
}
