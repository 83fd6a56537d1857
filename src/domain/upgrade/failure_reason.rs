//! Why an upgrade ended without applying the plan.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::foundation::ValidationError;

/// Recorded on `Failed` and gateway-driven `Expired` records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Gateway refused to initiate the payment.
    GatewayRejected,

    /// Gateway reported a different amount than the record holds.
    AmountMismatch,

    UserCanceled,
    Refunded,

    /// Gateway reported the payment session as expired.
    GatewayExpired,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::GatewayRejected => "gateway_rejected",
            FailureReason::AmountMismatch => "amount_mismatch",
            FailureReason::UserCanceled => "user_canceled",
            FailureReason::Refunded => "refunded",
            FailureReason::GatewayExpired => "gateway_expired",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FailureReason {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gateway_rejected" => Ok(FailureReason::GatewayRejected),
            "amount_mismatch" => Ok(FailureReason::AmountMismatch),
            "user_canceled" => Ok(FailureReason::UserCanceled),
            "refunded" => Ok(FailureReason::Refunded),
            "gateway_expired" => Ok(FailureReason::GatewayExpired),
            other => Err(ValidationError::invalid_format(
                "failure_reason",
                format!("unknown failure reason '{}'", other),
            )),
        }
    }
}
