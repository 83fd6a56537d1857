//! ListUpgradeHistoryHandler - Query handler for a user's upgrade attempts.

use std::sync::Arc;

use crate::domain::foundation::UserId;
use crate::domain::upgrade::{UpgradeError, UpgradeRecord, UpgradeStatus};
use crate::ports::{HistoryFilter, UpgradeRecordStore};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 50;

/// Query for a page of history.
#[derive(Debug, Clone)]
pub struct ListUpgradeHistoryQuery {
    pub user_id: UserId,
    pub status: Option<UpgradeStatus>,

    /// 1-based; defaults to 1.
    pub page: Option<u32>,

    /// Defaults to 10, clamped to 1..=50.
    pub limit: Option<u32>,
}

/// One page of history plus the paging that produced it.
#[derive(Debug, Clone)]
pub struct UpgradeHistoryPage {
    pub items: Vec<UpgradeRecord>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub has_more: bool,
}

pub struct ListUpgradeHistoryHandler {
    records: Arc<dyn UpgradeRecordStore>,
}

impl ListUpgradeHistoryHandler {
    pub fn new(records: Arc<dyn UpgradeRecordStore>) -> Self {
        Self { records }
    }

    pub async fn handle(
        &self,
        query: ListUpgradeHistoryQuery,
    ) -> Result<UpgradeHistoryPage, UpgradeError> {
        let page = query.page.unwrap_or(1).max(1);
        let limit = query
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);

        let mut filter = HistoryFilter::paginated(page, limit);
        if let Some(status) = query.status {
            filter = filter.with_status(status);
        }

        let result = self.records.list_for_user(&query.user_id, &filter).await?;

        Ok(UpgradeHistoryPage {
            items: result.items,
            total: result.total,
            page,
            limit,
            has_more: result.has_more,
        })
    }
}
