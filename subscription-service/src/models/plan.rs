//! Subscription plan model.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of plan identifiers.
///
/// Stored and returned using the short ids (`paid3m`); the long forms
/// (`paid-3-month`) are accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlanId {
    #[serde(rename = "free")]
    Free,
    #[serde(rename = "paid3m", alias = "paid-3-month")]
    Paid3Months,
    #[serde(rename = "paid6m", alias = "paid-6-month")]
    Paid6Months,
    #[serde(rename = "paid12m", alias = "paid-12-month")]
    Paid12Months,
}

impl PlanId {
    /// Catalog order.
    pub const ALL: [PlanId; 4] = [
        PlanId::Free,
        PlanId::Paid3Months,
        PlanId::Paid6Months,
        PlanId::Paid12Months,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanId::Free => "free",
            PlanId::Paid3Months => "paid3m",
            PlanId::Paid6Months => "paid6m",
            PlanId::Paid12Months => "paid12m",
        }
    }

    pub fn is_free(&self) -> bool {
        matches!(self, PlanId::Free)
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            PlanId::Free => 0,
            PlanId::Paid3Months => 1,
            PlanId::Paid6Months => 2,
            PlanId::Paid12Months => 3,
        }
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPlan(pub String);

impl fmt::Display for UnknownPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown plan '{}'", self.0)
    }
}

impl std::error::Error for UnknownPlan {}

impl FromStr for PlanId {
    type Err = UnknownPlan;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "free" => Ok(PlanId::Free),
            "paid3m" | "paid-3-month" => Ok(PlanId::Paid3Months),
            "paid6m" | "paid-6-month" => Ok(PlanId::Paid6Months),
            "paid12m" | "paid-12-month" => Ok(PlanId::Paid12Months),
            other => Err(UnknownPlan(other.to_string())),
        }
    }
}

/// Catalog entry. Immutable once the catalog is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: PlanId,
    /// Price in the smallest currency unit (paise for INR).
    pub price_minor_units: i64,
    /// `None` for the free plan, which never expires.
    pub duration_days: Option<i64>,
    pub job_limit: i32,
    pub label: &'static str,
}
