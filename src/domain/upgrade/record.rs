//! UpgradeRecord entity.
//!
//! One record per upgrade attempt. Records are never deleted; terminal
//! records stay behind as the audit trail of what was charged and why.
//!
//! # Invariants
//!
//! - `amount > 0` and never changes after creation
//! - `gateway_ref` is set at most once
//! - `completed_at` is set exactly when `status == Completed`
//! - status changes follow [`UpgradeStatus`]'s state machine

use serde::{Deserialize, Serialize};

use super::{FailureReason, Plan, UpgradeStatus};
use crate::domain::foundation::{StateMachine, Timestamp, UpgradeId, UserId, ValidationError};

/// A single plan upgrade attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeRecord {
    pub id: UpgradeId,
    pub user_id: UserId,
    pub from_plan: Plan,
    pub to_plan: Plan,

    /// Amount charged, in paisa.
    pub amount: i64,

    /// Order id sent to the gateway, `upgrade-<id>`.
    pub purchase_order_id: String,

    /// Gateway payment session id (Khalti `pidx`).
    pub gateway_ref: Option<String>,

    /// Where the user completes payment. Set together with `gateway_ref`.
    pub payment_url: Option<String>,

    pub status: UpgradeStatus,
    pub failure_reason: Option<FailureReason>,

    /// Last lookup response from the gateway, kept for audit.
    pub raw_gateway_response: Option<serde_json::Value>,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub expires_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl UpgradeRecord {
    /// Builds the initial `Pending` record from a creation request.
    pub fn from_new(new: NewUpgradeRecord, now: Timestamp) -> Self {
        Self {
            purchase_order_id: new.id.purchase_order_id(),
            id: new.id,
            user_id: new.user_id,
            from_plan: new.from_plan,
            to_plan: new.to_plan,
            amount: new.amount,
            gateway_ref: None,
            payment_url: None,
            status: UpgradeStatus::Pending,
            failure_reason: None,
            raw_gateway_response: None,
            created_at: now,
            updated_at: now,
            expires_at: new.expires_at,
            completed_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// True once `now` has passed `expires_at`.
    pub fn is_past_expiry(&self, now: Timestamp) -> bool {
        now.is_after(&self.expires_at)
    }

    /// An active record whose payment window has closed.
    pub fn is_stale(&self, now: Timestamp) -> bool {
        self.is_active() && self.is_past_expiry(now)
    }

    pub fn is_owned_by(&self, user_id: &UserId) -> bool {
        &self.user_id == user_id
    }

    /// Applies a status change in place.
    ///
    /// Stores call this after their compare step succeeded; it is the one
    /// place that decides `completed_at` and rejects forbidden edges.
    pub fn apply_transition(
        &mut self,
        to: UpgradeStatus,
        extra: &TransitionExtra,
        now: Timestamp,
    ) -> Result<(), ValidationError> {
        self.status = self.status.transition_to(to)?;
        if let Some(reason) = extra.failure_reason {
            self.failure_reason = Some(reason);
        }
        if let Some(raw) = &extra.raw_gateway_response {
            self.raw_gateway_response = Some(raw.clone());
        }
        if to == UpgradeStatus::Completed {
            self.completed_at = Some(now);
        }
        self.updated_at = now;
        Ok(())
    }
}

/// Data needed to create an upgrade record.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUpgradeRecord {
    pub id: UpgradeId,
    pub user_id: UserId,
    pub from_plan: Plan,
    pub to_plan: Plan,
    pub amount: i64,
    pub expires_at: Timestamp,
}

impl NewUpgradeRecord {
    /// Validates the request shape: positive amount, strictly higher plan.
    pub fn new(
        user_id: UserId,
        from_plan: Plan,
        to_plan: Plan,
        amount: i64,
        expires_at: Timestamp,
    ) -> Result<Self, ValidationError> {
        if amount <= 0 {
            return Err(ValidationError::out_of_range("amount", 1, i64::MAX, amount));
        }
        if !from_plan.can_upgrade_to(to_plan) {
            return Err(ValidationError::invalid_format(
                "to_plan",
                format!("{} is not an upgrade from {}", to_plan, from_plan),
            ));
        }
        Ok(Self {
            id: UpgradeId::new(),
            user_id,
            from_plan,
            to_plan,
            amount,
            expires_at,
        })
    }
}

/// Extra fields written alongside a status transition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionExtra {
    pub failure_reason: Option<FailureReason>,
    pub raw_gateway_response: Option<serde_json::Value>,
}

impl TransitionExtra {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn failed(reason: FailureReason) -> Self {
        Self {
            failure_reason: Some(reason),
            raw_gateway_response: None,
        }
    }

    pub fn with_raw_response(mut self, raw: serde_json::Value) -> Self {
        self.raw_gateway_response = Some(raw);
        self
    }
}
