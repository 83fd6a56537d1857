//! PostgreSQL implementation of UserPlanStore.

use crate::domain::foundation::{DomainError, ErrorCode, UpgradeId, UserId};
use crate::domain::upgrade::Plan;
use crate::ports::UserPlanStore;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;

pub struct PostgresUserPlanStore {
    pool: PgPool,
}

impl PostgresUserPlanStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserPlanStore for PostgresUserPlanStore {
    async fn current_plan(&self, user_id: &UserId) -> Result<Plan, DomainError> {
        let plan: Option<String> =
            sqlx::query_scalar("SELECT plan FROM user_plans WHERE user_id = $1")
                .bind(user_id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    DomainError::new(ErrorCode::DatabaseError, format!("Failed to load plan: {}", e))
                })?;

        match plan {
            Some(raw) => raw.parse().map_err(|_| {
                DomainError::new(ErrorCode::DatabaseError, format!("Invalid plan value: {}", raw))
            }),
            None => Ok(Plan::Free),
        }
    }

    async fn apply_upgrade(
        &self,
        user_id: &UserId,
        plan: Plan,
        upgrade_id: &UpgradeId,
    ) -> Result<bool, DomainError> {
        // The conditional upsert makes a replay of the same upgrade a no-op.
        let result = sqlx::query(
            r#"
            INSERT INTO user_plans (user_id, plan, last_upgrade_id, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE SET
                plan = EXCLUDED.plan,
                last_upgrade_id = EXCLUDED.last_upgrade_id,
                updated_at = EXCLUDED.updated_at
            WHERE user_plans.last_upgrade_id IS DISTINCT FROM EXCLUDED.last_upgrade_id
            "#,
        )
        .bind(user_id.as_str())
        .bind(plan.as_str())
        .bind(upgrade_id.as_uuid())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Failed to apply upgrade: {}", e))
        })?;

        Ok(result.rows_affected() > 0)
    }
}
