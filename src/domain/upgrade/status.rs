//! Upgrade status state machine.
//!
//! ```text
//! Pending   -> Pending (gateway ref attached), Verifying, Completed,
//!              Failed, Expired, Cancelled
//! Verifying -> Verifying, Completed, Failed, Expired, Cancelled
//! ```
//!
//! `Completed`, `Failed`, `Expired` and `Cancelled` are terminal.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::foundation::{StateMachine, ValidationError};

/// Lifecycle status of an upgrade attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeStatus {
    /// Created; waiting for the user to pay at the gateway.
    Pending,

    /// Gateway reported the payment as still in progress.
    Verifying,

    /// Payment confirmed and the plan applied.
    Completed,

    Failed,
    Expired,
    Cancelled,
}

impl UpgradeStatus {
    /// Statuses that count towards the one-active-upgrade-per-user rule.
    pub const ACTIVE: [UpgradeStatus; 2] = [UpgradeStatus::Pending, UpgradeStatus::Verifying];

    pub const ALL: [UpgradeStatus; 6] = [
        UpgradeStatus::Pending,
        UpgradeStatus::Verifying,
        UpgradeStatus::Completed,
        UpgradeStatus::Failed,
        UpgradeStatus::Expired,
        UpgradeStatus::Cancelled,
    ];

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    /// Storage and wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            UpgradeStatus::Pending => "pending",
            UpgradeStatus::Verifying => "verifying",
            UpgradeStatus::Completed => "completed",
            UpgradeStatus::Failed => "failed",
            UpgradeStatus::Expired => "expired",
            UpgradeStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for UpgradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for UpgradeStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UpgradeStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                ValidationError::invalid_format("status", format!("unknown upgrade status '{}'", s))
            })
    }
}

impl StateMachine for UpgradeStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use UpgradeStatus::*;
        matches!(
            (self, target),
            // From PENDING
            (Pending, Pending)
                | (Pending, Verifying)
                | (Pending, Completed)
                | (Pending, Failed)
                | (Pending, Expired)
                | (Pending, Cancelled)
            // From VERIFYING
                | (Verifying, Verifying)
                | (Verifying, Completed)
                | (Verifying, Failed)
                | (Verifying, Expired)
                | (Verifying, Cancelled)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use UpgradeStatus::*;
        match self {
            Pending => vec![Pending, Verifying, Completed, Failed, Expired, Cancelled],
            Verifying => vec![Verifying, Completed, Failed, Expired, Cancelled],
            Completed | Failed | Expired | Cancelled => vec![],
        }
    }
}
