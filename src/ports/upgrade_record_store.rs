//! Upgrade record store port.
//!
//! Persists `UpgradeRecord`s and owns the only mutation primitive the flow
//! relies on: a compare-and-swap status transition.
//!
//! # Contract
//!
//! - At most one `Pending`/`Verifying` record per user; `create` enforces it
//!   atomically (unique index, or a single lock in memory)
//! - `transition` is one atomic conditional update keyed on id + status
//! - A CAS that does not match returns `Ok(None)`, never an error
//!
//! ```ignore
//! let won = store
//!     .transition(&id, &UpgradeStatus::ACTIVE, UpgradeStatus::Completed, TransitionExtra::none())
//!     .await?;
//! if let Some(record) = won {
//!     // only this caller may apply the plan
//! }
//! ```

use crate::domain::foundation::{DomainError, Timestamp, UpgradeId, UserId};
use crate::domain::upgrade::{NewUpgradeRecord, TransitionExtra, UpgradeRecord, UpgradeStatus};
use async_trait::async_trait;

#[async_trait]
pub trait UpgradeRecordStore: Send + Sync {
    /// Creates a `Pending` record.
    ///
    /// # Errors
    ///
    /// - `ConflictActiveUpgrade` if the user already has an active record
    /// - `DatabaseError` on persistence failure
    async fn create(&self, new: NewUpgradeRecord) -> Result<UpgradeRecord, DomainError>;

    /// Records the gateway session on a fresh `Pending` record.
    ///
    /// The stored `expires_at` becomes the earlier of its current value and
    /// `expires_at`.
    ///
    /// # Errors
    ///
    /// - `UpgradeNotFound` if no record has this id
    /// - `InvalidStateTransition` if the record is not `Pending` or already
    ///   has a gateway ref
    async fn attach_gateway_ref(
        &self,
        id: &UpgradeId,
        gateway_ref: &str,
        payment_url: &str,
        expires_at: Timestamp,
    ) -> Result<UpgradeRecord, DomainError>;

    /// Compare-and-swap status transition.
    ///
    /// Moves the record to `to` only if its current status is in `from` and
    /// the state machine allows the edge. Returns the updated record, or
    /// `None` when the precondition did not hold.
    async fn transition(
        &self,
        id: &UpgradeId,
        from: &[UpgradeStatus],
        to: UpgradeStatus,
        extra: TransitionExtra,
    ) -> Result<Option<UpgradeRecord>, DomainError>;

    /// The user's `Pending`/`Verifying` record, if any.
    async fn find_active_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<UpgradeRecord>, DomainError>;

    async fn find_by_id(&self, id: &UpgradeId) -> Result<Option<UpgradeRecord>, DomainError>;

    async fn find_by_gateway_ref(
        &self,
        gateway_ref: &str,
    ) -> Result<Option<UpgradeRecord>, DomainError>;

    /// The user's records, newest first.
    async fn list_for_user(
        &self,
        user_id: &UserId,
        filter: &HistoryFilter,
    ) -> Result<UpgradePage, DomainError>;

    /// Active records whose `expires_at` is before `now`, oldest first.
    async fn find_stale_active(
        &self,
        now: Timestamp,
        limit: u32,
    ) -> Result<Vec<UpgradeRecord>, DomainError>;
}

/// Options for listing a user's upgrade history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryFilter {
    pub status: Option<UpgradeStatus>,

    /// 1-based page number.
    pub page: u32,

    pub limit: u32,
}

impl HistoryFilter {
    /// Create a filter for a page of results.
    pub fn paginated(page: u32, limit: u32) -> Self {
        Self {
            status: None,
            page,
            limit,
        }
    }

    /// Filter to a specific status.
    pub fn with_status(mut self, status: UpgradeStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Rows to skip before this page.
    pub fn offset(&self) -> u32 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}

/// One page of upgrade history.
#[derive(Debug, Clone, PartialEq)]
pub struct UpgradePage {
    pub items: Vec<UpgradeRecord>,

    /// Total matching records across all pages.
    pub total: u64,

    pub has_more: bool,
}
