//! CancelUpgradeHandler - Command handler for abandoning an upgrade.

use std::sync::Arc;

use crate::domain::foundation::{UpgradeId, UserId};
use crate::domain::upgrade::{TransitionExtra, UpgradeError, UpgradeRecord, UpgradeStatus};
use crate::ports::UpgradeRecordStore;

/// Command to cancel an upgrade.
#[derive(Debug, Clone)]
pub struct CancelUpgradeCommand {
    pub upgrade_id: UpgradeId,
    pub user_id: UserId,
}

/// Result of a cancel request.
#[derive(Debug, Clone)]
pub struct CancelOutcome {
    pub record: UpgradeRecord,

    /// False when the record was already decided; `record` then shows how.
    pub cancelled: bool,
}

pub struct CancelUpgradeHandler {
    records: Arc<dyn UpgradeRecordStore>,
}

impl CancelUpgradeHandler {
    pub fn new(records: Arc<dyn UpgradeRecordStore>) -> Self {
        Self { records }
    }

    pub async fn handle(
        &self,
        cmd: CancelUpgradeCommand,
    ) -> Result<CancelOutcome, UpgradeError> {
        let record = self
            .records
            .find_by_id(&cmd.upgrade_id)
            .await?
            .filter(|r| r.is_owned_by(&cmd.user_id))
            .ok_or_else(|| UpgradeError::not_found(cmd.upgrade_id))?;

        if record.is_terminal() {
            return Ok(CancelOutcome {
                record,
                cancelled: false,
            });
        }

        let won = self
            .records
            .transition(
                &record.id,
                &UpgradeStatus::ACTIVE,
                UpgradeStatus::Cancelled,
                TransitionExtra::none(),
            )
            .await?;

        match won {
            Some(updated) => {
                tracing::info!(
                    upgrade_id = %updated.id,
                    user_id = %updated.user_id,
                    "Upgrade cancelled"
                );
                Ok(CancelOutcome {
                    record: updated,
                    cancelled: true,
                })
            }
            None => {
                tracing::debug!(upgrade_id = %record.id, "Cancel lost to a concurrent decision");
                let current = self.records.find_by_id(&record.id).await?;
                Ok(CancelOutcome {
                    record: current.unwrap_or(record),
                    cancelled: false,
                })
            }
        }
    }
}
