//! Subscription plans a Worksage account can be on.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::foundation::ValidationError;

/// Worksage plan.
///
/// Ordered by rank: `Free < Pro < Vantage`. Only strictly higher plans are
/// valid upgrade targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Pro,
    Vantage,
}

impl Plan {
    /// Returns true if this plan must be paid for.
    pub fn is_paid(&self) -> bool {
        !matches!(self, Plan::Free)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Pro => "pro",
            Plan::Vantage => "vantage",
        }
    }

    /// Human-readable name, used as the purchase order name at the gateway.
    pub fn display_name(&self) -> &'static str {
        match self {
            Plan::Free => "Free",
            Plan::Pro => "Pro",
            Plan::Vantage => "Vantage",
        }
    }

    /// Numeric rank for comparison. Higher rank = more features.
    pub fn rank(&self) -> u8 {
        match self {
            Plan::Free => 0,
            Plan::Pro => 1,
            Plan::Vantage => 2,
        }
    }

    /// Returns true if moving from `self` to `target` is an upgrade.
    pub fn can_upgrade_to(&self, target: Plan) -> bool {
        target.rank() > self.rank()
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Plan {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Plan::Free),
            "pro" => Ok(Plan::Pro),
            "vantage" => Ok(Plan::Vantage),
            other => Err(ValidationError::invalid_format(
                "plan",
                format!("unknown plan '{}'", other),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_are_strictly_ordered() {
        assert!(Plan::Free.rank() < Plan::Pro.rank());
        assert!(Plan::Pro.rank() < Plan::Vantage.rank());
    }

    #[test]
    fn upgrade_requires_higher_rank() {
        assert!(Plan::Free.can_upgrade_to(Plan::Pro));
        assert!(Plan::Free.can_upgrade_to(Plan::Vantage));
        assert!(Plan::Pro.can_upgrade_to(Plan::Vantage));

        assert!(!Plan::Pro.can_upgrade_to(Plan::Pro));
        assert!(!Plan::Vantage.can_upgrade_to(Plan::Pro));
        assert!(!Plan::Pro.can_upgrade_to(Plan::Free));
    }

    #[test]
    fn only_free_is_unpaid() {
        assert!(!Plan::Free.is_paid());
        assert!(Plan::Pro.is_paid());
        assert!(Plan::Vantage.is_paid());
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("Pro".parse::<Plan>().unwrap(), Plan::Pro);
        assert_eq!(" vantage ".parse::<Plan>().unwrap(), Plan::Vantage);
        assert!("enterprise".parse::<Plan>().is_err());
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Plan::Vantage).unwrap(), "\"vantage\"");
        let plan: Plan = serde_json::from_str("\"pro\"").unwrap();
        assert_eq!(plan, Plan::Pro);
    }
}
