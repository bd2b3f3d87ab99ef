pub mod company;
pub mod plan;
pub mod subscription;

pub use company::{Company, HistoryStatus, SubscriptionHistoryEntry};
pub use plan::{Plan, PlanId, UnknownPlan};
pub use subscription::{ActivationEvent, ActivationSource, Subscription, SubscriptionState};
