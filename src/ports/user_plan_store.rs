//! User plan store port.
//!
//! The only part of the user account this service touches: which plan the
//! user is on, and the single mutation that moves them to a paid plan.

use crate::domain::foundation::{DomainError, UpgradeId, UserId};
use crate::domain::upgrade::Plan;
use async_trait::async_trait;

#[async_trait]
pub trait UserPlanStore: Send + Sync {
    /// Current plan. Users without a stored plan are on `Free`.
    async fn current_plan(&self, user_id: &UserId) -> Result<Plan, DomainError>;

    /// Moves the user to `plan` as the result of `upgrade_id`.
    ///
    /// Idempotent on `upgrade_id`: applying the same upgrade twice leaves
    /// the user exactly as after the first call. Returns `true` if this call
    /// changed anything.
    async fn apply_upgrade(
        &self,
        user_id: &UserId,
        plan: Plan,
        upgrade_id: &UpgradeId,
    ) -> Result<bool, DomainError>;
}
