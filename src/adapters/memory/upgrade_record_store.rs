//! In-memory upgrade record store for tests and local development.
//!
//! Every mutation runs under one `RwLock` write guard, which is what makes
//! `create` and `transition` atomic here.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::foundation::{
    DomainError, ErrorCode, StateMachine, Timestamp, UpgradeId, UserId,
};
use crate::domain::upgrade::{NewUpgradeRecord, TransitionExtra, UpgradeRecord, UpgradeStatus};
use crate::ports::{HistoryFilter, UpgradePage, UpgradeRecordStore};

#[derive(Debug, Default, Clone)]
pub struct InMemoryUpgradeRecordStore {
    records: Arc<RwLock<HashMap<UpgradeId, UpgradeRecord>>>,
}

impl InMemoryUpgradeRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record as-is. Test setup only; skips every invariant check.
    pub async fn insert_raw(&self, record: UpgradeRecord) {
        self.records.write().await.insert(record.id, record);
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl UpgradeRecordStore for InMemoryUpgradeRecordStore {
    async fn create(&self, new: NewUpgradeRecord) -> Result<UpgradeRecord, DomainError> {
        let mut records = self.records.write().await;

        if records
            .values()
            .any(|r| r.user_id == new.user_id && r.is_active())
        {
            return Err(DomainError::active_upgrade_exists(&new.user_id));
        }

        let record = UpgradeRecord::from_new(new, Timestamp::now());
        records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn attach_gateway_ref(
        &self,
        id: &UpgradeId,
        gateway_ref: &str,
        payment_url: &str,
        expires_at: Timestamp,
    ) -> Result<UpgradeRecord, DomainError> {
        let mut records = self.records.write().await;

        if records
            .values()
            .any(|r| r.id != *id && r.gateway_ref.as_deref() == Some(gateway_ref))
        {
            return Err(DomainError::validation(
                "gateway_ref",
                "Gateway reference already belongs to another upgrade",
            ));
        }

        let record = records
            .get_mut(id)
            .ok_or_else(|| DomainError::upgrade_not_found(id))?;
        if record.status != UpgradeStatus::Pending || record.gateway_ref.is_some() {
            return Err(DomainError::invalid_transition(
                record.status.as_str(),
                "attach gateway reference",
            ));
        }

        record.gateway_ref = Some(gateway_ref.to_string());
        record.payment_url = Some(payment_url.to_string());
        record.expires_at = record.expires_at.earliest(expires_at);
        record.updated_at = Timestamp::now();
        Ok(record.clone())
    }

    async fn transition(
        &self,
        id: &UpgradeId,
        from: &[UpgradeStatus],
        to: UpgradeStatus,
        extra: TransitionExtra,
    ) -> Result<Option<UpgradeRecord>, DomainError> {
        let mut records = self.records.write().await;

        let Some(record) = records.get_mut(id) else {
            return Ok(None);
        };
        if !from.contains(&record.status) || !record.status.can_transition_to(&to) {
            return Ok(None);
        }

        record
            .apply_transition(to, &extra, Timestamp::now())
            .map_err(|e| DomainError::new(ErrorCode::InvalidStateTransition, e.to_string()))?;
        Ok(Some(record.clone()))
    }

    async fn find_active_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<UpgradeRecord>, DomainError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .find(|r| &r.user_id == user_id && r.is_active())
            .cloned())
    }

    async fn find_by_id(&self, id: &UpgradeId) -> Result<Option<UpgradeRecord>, DomainError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn find_by_gateway_ref(
        &self,
        gateway_ref: &str,
    ) -> Result<Option<UpgradeRecord>, DomainError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .find(|r| r.gateway_ref.as_deref() == Some(gateway_ref))
            .cloned())
    }

    async fn list_for_user(
        &self,
        user_id: &UserId,
        filter: &HistoryFilter,
    ) -> Result<UpgradePage, DomainError> {
        let records = self.records.read().await;
        let mut matching: Vec<&UpgradeRecord> = records
            .values()
            .filter(|r| &r.user_id == user_id)
            .filter(|r| filter.status.map_or(true, |s| r.status == s))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as u64;
        let offset = filter.offset() as usize;
        let items: Vec<UpgradeRecord> = matching
            .into_iter()
            .skip(offset)
            .take(filter.limit as usize)
            .cloned()
            .collect();
        let has_more = (offset + items.len()) < total as usize;

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
        let records = self.records.read().await;
        let mut stale: Vec<UpgradeRecord> =
            records.values().filter(|r| r.is_stale(now)).cloned().collect();
        stale.sort_by(|a, b| a.expires_at.cmp(&b.expires_at));
        stale.truncate(limit as usize);
        Ok(stale)
    }
}
