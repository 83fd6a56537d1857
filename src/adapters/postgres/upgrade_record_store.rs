//! PostgreSQL implementation of UpgradeRecordStore.
//!
//! `transition` is a single conditional `UPDATE ... WHERE id = $1 AND
//! status = ANY($2) RETURNING ...`; no row back means the CAS lost. The
//! one-active-upgrade rule is the partial unique index
//! `plan_upgrades_one_active_per_user`.

use crate::domain::foundation::{
    DomainError, ErrorCode, StateMachine, Timestamp, UpgradeId, UserId,
};
use crate::domain::upgrade::{
    FailureReason, NewUpgradeRecord, Plan, TransitionExtra, UpgradeRecord, UpgradeStatus,
};
use crate::ports::{HistoryFilter, UpgradePage, UpgradeRecordStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

const ACTIVE_INDEX: &str = "plan_upgrades_one_active_per_user";
const GATEWAY_REF_INDEX: &str = "plan_upgrades_gateway_ref_key";

const COLUMNS: &str = r#"
    id, user_id, from_plan, to_plan, amount, purchase_order_id, gateway_ref, payment_url,
    status, failure_reason, raw_gateway_response, created_at, updated_at, expires_at, completed_at
"#;

pub struct PostgresUpgradeRecordStore {
    pool: PgPool,
}

impl PostgresUpgradeRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of an upgrade record.
#[derive(Debug, sqlx::FromRow)]
struct UpgradeRow {
    id: Uuid,
    user_id: String,
    from_plan: String,
    to_plan: String,
    amount: i64,
    purchase_order_id: String,
    gateway_ref: Option<String>,
    payment_url: Option<String>,
    status: String,
    failure_reason: Option<String>,
    raw_gateway_response: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<UpgradeRow> for UpgradeRecord {
    type Error = DomainError;

    fn try_from(row: UpgradeRow) -> Result<Self, Self::Error> {
        Ok(UpgradeRecord {
            id: UpgradeId::from_uuid(row.id),
            user_id: UserId::new(row.user_id).map_err(|e| {
                DomainError::new(ErrorCode::DatabaseError, format!("Invalid user_id: {}", e))
            })?,
            from_plan: parse_plan(&row.from_plan)?,
            to_plan: parse_plan(&row.to_plan)?,
            amount: row.amount,
            purchase_order_id: row.purchase_order_id,
            gateway_ref: row.gateway_ref,
            payment_url: row.payment_url,
            status: parse_status(&row.status)?,
            failure_reason: row
                .failure_reason
                .as_deref()
                .map(parse_failure_reason)
                .transpose()?,
            raw_gateway_response: row.raw_gateway_response,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
            expires_at: Timestamp::from_datetime(row.expires_at),
            completed_at: row.completed_at.map(Timestamp::from_datetime),
        })
    }
}

fn parse_plan(s: &str) -> Result<Plan, DomainError> {
    s.parse().map_err(|_| {
        DomainError::new(ErrorCode::DatabaseError, format!("Invalid plan value: {}", s))
    })
}

fn parse_status(s: &str) -> Result<UpgradeStatus, DomainError> {
    s.parse().map_err(|_| {
        DomainError::new(ErrorCode::DatabaseError, format!("Invalid status value: {}", s))
    })
}

fn parse_failure_reason(s: &str) -> Result<FailureReason, DomainError> {
    s.parse().map_err(|_| {
        DomainError::new(
            ErrorCode::DatabaseError,
            format!("Invalid failure_reason value: {}", s),
        )
    })
}

/// Statuses from `from` that may legally move to `to`.
fn allowed_sources(from: &[UpgradeStatus], to: UpgradeStatus) -> Vec<String> {
    from.iter()
        .filter(|status| status.can_transition_to(&to))
        .map(|status| status.as_str().to_string())
        .collect()
}

fn db_error(context: &str, e: sqlx::Error) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, format!("{}: {}", context, e))
}

fn violated_index(e: &sqlx::Error) -> Option<String> {
    match e {
        sqlx::Error::Database(db_err) => db_err.constraint().map(str::to_string),
        _ => None,
    }
}

#[async_trait]
impl UpgradeRecordStore for PostgresUpgradeRecordStore {
    async fn create(&self, new: NewUpgradeRecord) -> Result<UpgradeRecord, DomainError> {
        let record = UpgradeRecord::from_new(new, Timestamp::now());

        let row: UpgradeRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO plan_upgrades (
                id, user_id, from_plan, to_plan, amount, purchase_order_id,
                status, created_at, updated_at, expires_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8, $9)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(record.id.as_uuid())
        .bind(record.user_id.as_str())
        .bind(record.from_plan.as_str())
        .bind(record.to_plan.as_str())
        .bind(record.amount)
        .bind(&record.purchase_order_id)
        .bind(record.status.as_str())
        .bind(record.created_at.as_datetime())
        .bind(record.expires_at.as_datetime())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if violated_index(&e).as_deref() == Some(ACTIVE_INDEX) {
                return DomainError::active_upgrade_exists(&record.user_id);
            }
            db_error("Failed to create upgrade", e)
        })?;

        UpgradeRecord::try_from(row)
    }

    async fn attach_gateway_ref(
        &self,
        id: &UpgradeId,
        gateway_ref: &str,
        payment_url: &str,
        expires_at: Timestamp,
    ) -> Result<UpgradeRecord, DomainError> {
        let row: Option<UpgradeRow> = sqlx::query_as(&format!(
            r#"
            UPDATE plan_upgrades SET
                gateway_ref = $2,
                payment_url = $3,
                expires_at = LEAST(expires_at, $4),
                updated_at = $5
            WHERE id = $1 AND status = 'pending' AND gateway_ref IS NULL
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(gateway_ref)
        .bind(payment_url)
        .bind(expires_at.as_datetime())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            if violated_index(&e).as_deref() == Some(GATEWAY_REF_INDEX) {
                return DomainError::validation(
                    "gateway_ref",
                    "Gateway reference already belongs to another upgrade",
                );
            }
            db_error("Failed to attach gateway reference", e)
        })?;

        match row {
            Some(row) => UpgradeRecord::try_from(row),
            None => match self.find_by_id(id).await? {
                Some(current) => Err(DomainError::invalid_transition(
                    current.status.as_str(),
                    "attach gateway reference",
                )),
                None => Err(DomainError::upgrade_not_found(id)),
            },
        }
    }

    async fn transition(
        &self,
        id: &UpgradeId,
        from: &[UpgradeStatus],
        to: UpgradeStatus,
        extra: TransitionExtra,
    ) -> Result<Option<UpgradeRecord>, DomainError> {
        let sources = allowed_sources(from, to);
        if sources.is_empty() {
            return Ok(None);
        }

        let row: Option<UpgradeRow> = sqlx::query_as(&format!(
            r#"
            UPDATE plan_upgrades SET
                status = $3,
                failure_reason = COALESCE($4, failure_reason),
                raw_gateway_response = COALESCE($5, raw_gateway_response),
                completed_at = CASE WHEN $3 = 'completed' THEN $6 ELSE completed_at END,
                updated_at = $6
            WHERE id = $1 AND status = ANY($2)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(&sources)
        .bind(to.as_str())
        .bind(extra.failure_reason.map(|r| r.as_str()))
        .bind(extra.raw_gateway_response)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to transition upgrade", e))?;

        row.map(UpgradeRecord::try_from).transpose()
    }

    async fn find_active_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<UpgradeRecord>, DomainError> {
        let row: Option<UpgradeRow> = sqlx::query_as(&format!(
            r#"
            SELECT {COLUMNS}
            FROM plan_upgrades
            WHERE user_id = $1 AND status IN ('pending', 'verifying')
            "#
        ))
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find active upgrade", e))?;

        row.map(UpgradeRecord::try_from).transpose()
    }

    async fn find_by_id(&self, id: &UpgradeId) -> Result<Option<UpgradeRecord>, DomainError> {
        let row: Option<UpgradeRow> =
            sqlx::query_as(&format!("SELECT {COLUMNS} FROM plan_upgrades WHERE id = $1"))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("Failed to find upgrade", e))?;

        row.map(UpgradeRecord::try_from).transpose()
    }

    async fn find_by_gateway_ref(
        &self,
        gateway_ref: &str,
    ) -> Result<Option<UpgradeRecord>, DomainError> {
        let row: Option<UpgradeRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM plan_upgrades WHERE gateway_ref = $1"
        ))
        .bind(gateway_ref)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find upgrade by gateway reference", e))?;

        row.map(UpgradeRecord::try_from).transpose()
    }

    async fn list_for_user(
        &self,
        user_id: &UserId,
        filter: &HistoryFilter,
    ) -> Result<UpgradePage, DomainError> {
        let status = filter.status.map(|s| s.as_str());

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM plan_upgrades
            WHERE user_id = $1 AND ($2::TEXT IS NULL OR status = $2)
            "#,
        )
        .bind(user_id.as_str())
        .bind(status)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to count upgrades", e))?;

        let rows: Vec<UpgradeRow> = sqlx::query_as(&format!(
            r#"
            SELECT {COLUMNS}
            FROM plan_upgrades
            WHERE user_id = $1 AND ($2::TEXT IS NULL OR status = $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(user_id.as_str())
        .bind(status)
        .bind(i64::from(filter.limit))
        .bind(i64::from(filter.offset()))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list upgrades", e))?;

        let items = rows
            .into_iter()
            .map(UpgradeRecord::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let total = total.max(0) as u64;
        let has_more = u64::from(filter.offset()) + (items.len() as u64) < total;

        Ok(UpgradePage {
            items,
            total,
            has_more,
        })
    }

    async fn find_stale_active(
        &self,
        now: Timestamp,
        limit: u32,
    ) -> Result<Vec<UpgradeRecord>, DomainError> {
        let rows: Vec<UpgradeRow> = sqlx::query_as(&format!(
            r#"
            SELECT {COLUMNS}
            FROM plan_upgrades
            WHERE status IN ('pending', 'verifying') AND expires_at < $1
            ORDER BY expires_at ASC
            LIMIT $2
            "#
        ))
        .bind(now.as_datetime())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find stale upgrades", e))?;

        rows.into_iter().map(UpgradeRecord::try_from).collect()
    }
}
