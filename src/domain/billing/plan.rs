//! Plan and billing interval reference data.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::Module;
use crate::domain::foundation::{BillingIntervalId, PlanId, ValidationError};

/// A named offering scoped to one product module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub name: String,
    pub module: Module,
    /// Inclusive upper bound on residents. Resident module only.
    pub capacity_limit: Option<u32>,
}

impl Plan {
    pub fn new(
        name: impl Into<String>,
        module: Module,
        capacity_limit: Option<u32>,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::empty_field("name"));
        }
        if capacity_limit.is_some() && module != Module::Resident {
            return Err(ValidationError::invalid_format(
                "capacity_limit",
                "only resident plans carry a capacity limit",
            ));
        }
        Ok(Self {
            id: PlanId::new(),
            name,
            module,
            capacity_limit,
        })
    }

    /// Returns true if `residents` fits within the plan's capacity.
    pub fn admits_residents(&self, residents: u32) -> bool {
        self.capacity_limit.map_or(true, |limit| residents <= limit)
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Unit of a recurring billing cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalUnit {
    Day,
    Week,
    Month,
    Year,
}

impl IntervalUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntervalUnit::Day => "day",
            IntervalUnit::Week => "week",
            IntervalUnit::Month => "month",
            IntervalUnit::Year => "year",
        }
    }
}

impl FromStr for IntervalUnit {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(IntervalUnit::Day),
            "week" => Ok(IntervalUnit::Week),
            "month" => Ok(IntervalUnit::Month),
            "year" => Ok(IntervalUnit::Year),
            other => Err(ValidationError::invalid_format(
                "interval",
                format!("unknown interval '{}'", other),
            )),
        }
    }
}

/// A (plan, cadence) pair with its recurring price.
///
/// Unique per `(plan, interval, interval_count)`. The processor plan id is what
/// the gateway bills against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingInterval {
    pub id: BillingIntervalId,
    pub plan: Plan,
    pub amount: Decimal,
    pub interval: IntervalUnit,
    pub interval_count: u32,
    pub processor_plan_id: String,
}

impl BillingInterval {
    pub fn new(
        plan: Plan,
        amount: Decimal,
        interval: IntervalUnit,
        interval_count: u32,
        processor_plan_id: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let processor_plan_id = processor_plan_id.into();
        if processor_plan_id.trim().is_empty() {
            return Err(ValidationError::empty_field("processor_plan_id"));
        }
        if interval_count == 0 {
            return Err(ValidationError::below_minimum("interval_count", 1, 0));
        }
        if amount.is_sign_negative() {
            return Err(ValidationError::invalid_format("amount", "must not be negative"));
        }
        Ok(Self {
            id: BillingIntervalId::new(),
            plan,
            amount: amount.round_dp(2),
            interval,
            interval_count,
            processor_plan_id,
        })
    }

    pub fn module(&self) -> Module {
        self.plan.module
    }

    /// Cadence key used for the uniqueness rule.
    pub fn cadence(&self) -> (IntervalUnit, u32) {
        (self.interval, self.interval_count)
    }
}

impl fmt::Display for BillingInterval {
    /// `$12.25 every month`, `$14.00 every 4 months`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut amount = self.amount;
        amount.rescale(2);
        if self.interval_count == 1 {
            write!(f, "${} every {}", amount, self.interval.as_str())
        } else {
            write!(
                f,
                "${} every {} {}s",
                amount,
                self.interval_count,
                self.interval.as_str()
            )
        }
    }
}

/// Orders a catalog listing the way it is presented: cheapest first.
pub fn sort_by_amount(intervals: &mut [BillingInterval]) {
    intervals.sort_by(|a, b| a.amount.cmp(&b.amount));
}
