//! Product modules a facility subscribes to independently.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::ValidationError;

/// One of the independently-subscribed product lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Module {
    Resident,
    Staff,
    Trainings,
}

impl Module {
    pub const ALL: [Module; 3] = [Module::Resident, Module::Staff, Module::Trainings];

    pub fn as_str(&self) -> &'static str {
        match self {
            Module::Resident => "resident",
            Module::Staff => "staff",
            Module::Trainings => "trainings",
        }
    }

    /// Whether billing this module needs a signed business agreement on file.
    pub fn requires_business_agreement(&self) -> bool {
        matches!(self, Module::Resident)
    }

    /// Staff trials must capture a payment method unless explicitly waived.
    pub fn trial_requires_payment(&self) -> bool {
        matches!(self, Module::Staff)
    }
}

impl Default for Module {
    fn default() -> Self {
        Module::Resident
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Module {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resident" => Ok(Module::Resident),
            "staff" => Ok(Module::Staff),
            "trainings" => Ok(Module::Trainings),
            other => Err(ValidationError::invalid_format(
                "module",
                format!("unknown module '{}'", other),
            )),
        }
    }
}
