//! In-memory user plan store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, UpgradeId, UserId};
use crate::domain::upgrade::Plan;
use crate::ports::UserPlanStore;

#[derive(Debug, Clone)]
struct PlanEntry {
    plan: Plan,
    last_upgrade_id: Option<UpgradeId>,
    /// Every upgrade ever applied, for idempotency checks.
    applied: Vec<UpgradeId>,
}

/// Unknown users are on `Free`.
#[derive(Debug, Default, Clone)]
pub struct InMemoryUserPlanStore {
    plans: Arc<RwLock<HashMap<UserId, PlanEntry>>>,
}

impl InMemoryUserPlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a user's plan.
    pub async fn set_plan(&self, user_id: &UserId, plan: Plan) {
        let mut plans = self.plans.write().await;
        let entry = plans.entry(user_id.clone()).or_insert(PlanEntry {
            plan,
            last_upgrade_id: None,
            applied: Vec::new(),
        });
        entry.plan = plan;
    }

    /// Number of distinct upgrades applied to the user.
    pub async fn applied_count(&self, user_id: &UserId) -> usize {
        self.plans
            .read()
            .await
            .get(user_id)
            .map_or(0, |entry| entry.applied.len())
    }

    pub async fn last_upgrade_id(&self, user_id: &UserId) -> Option<UpgradeId> {
        self.plans
            .read()
            .await
            .get(user_id)
            .and_then(|entry| entry.last_upgrade_id)
    }
}

#[async_trait]
impl UserPlanStore for InMemoryUserPlanStore {
    async fn current_plan(&self, user_id: &UserId) -> Result<Plan, DomainError> {
        Ok(self
            .plans
            .read()
            .await
            .get(user_id)
            .map_or(Plan::Free, |entry| entry.plan))
    }

    async fn apply_upgrade(
        &self,
        user_id: &UserId,
        plan: Plan,
        upgrade_id: &UpgradeId,
    ) -> Result<bool, DomainError> {
        let mut plans = self.plans.write().await;
        let entry = plans.entry(user_id.clone()).or_insert(PlanEntry {
            plan: Plan::Free,
            last_upgrade_id: None,
            applied: Vec::new(),
        });

        if entry.applied.contains(upgrade_id) {
            return Ok(false);
        }
        entry.plan = plan;
        entry.last_upgrade_id = Some(*upgrade_id);
        entry.applied.push(*upgrade_id);
        Ok(true)
    }
}
