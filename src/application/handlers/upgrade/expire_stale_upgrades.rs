//! ExpireStaleUpgradesHandler - Cleans up active upgrades past their expiry.
//!
//! Records with a gateway reference are re-verified rather than expired
//! blindly: a payment that completed just before expiry is still honored.
//! Records that never reached the gateway are expired directly, as are
//! records whose session the gateway no longer knows.

use std::sync::Arc;

use crate::domain::foundation::Timestamp;
use crate::domain::upgrade::{TransitionExtra, UpgradeError, UpgradeStatus};
use crate::ports::UpgradeRecordStore;

use super::verify_and_apply::{VerifyAndApplyHandler, VerifyPaymentCommand};

const DEFAULT_BATCH_SIZE: u32 = 100;

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub expired: usize,
    pub completed: usize,
    pub errors: usize,
}

pub struct ExpireStaleUpgradesHandler {
    records: Arc<dyn UpgradeRecordStore>,
    verifier: VerifyAndApplyHandler,
    batch_size: u32,
}

impl ExpireStaleUpgradesHandler {
    pub fn new(records: Arc<dyn UpgradeRecordStore>, verifier: VerifyAndApplyHandler) -> Self {
        Self {
            records,
            verifier,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Runs one sweep. Per-record failures are logged and counted, not
    /// returned.
    pub async fn handle(&self, now: Timestamp) -> Result<SweepReport, UpgradeError> {
        let stale = self.records.find_stale_active(now, self.batch_size).await?;
        let mut report = SweepReport {
            examined: stale.len(),
            ..SweepReport::default()
        };

        for record in stale {
            let status = match record.gateway_ref.as_deref() {
                Some(gateway_ref) => match self
                    .verifier
                    .handle(VerifyPaymentCommand {
                        gateway_ref: gateway_ref.to_string(),
                        requested_by: None,
                    })
                    .await
                {
                    Ok(outcome) => Some(outcome.record.status),
                    Err(e) => {
                        tracing::warn!(
                            upgrade_id = %record.id,
                            error = %e,
                            "Could not verify stale upgrade"
                        );
                        report.errors += 1;
                        None
                    }
                },
                None => match self
                    .records
                    .transition(
                        &record.id,
                        &UpgradeStatus::ACTIVE,
                        UpgradeStatus::Expired,
                        TransitionExtra::none(),
                    )
                    .await
                {
                    Ok(updated) => updated.map(|r| r.status),
                    Err(e) => {
                        tracing::warn!(
                            upgrade_id = %record.id,
                            error = %e,
                            "Could not expire stale upgrade"
                        );
                        report.errors += 1;
                        None
                    }
                },
            };

            match status {
                Some(UpgradeStatus::Expired) => report.expired += 1,
                Some(UpgradeStatus::Completed) => report.completed += 1,
                _ => {}
            }
        }

        if report.examined > 0 {
            tracing::info!(
                examined = report.examined,
                expired = report.expired,
                completed = report.completed,
                errors = report.errors,
                "Stale upgrade sweep finished"
            );
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::khalti::MockPaymentGateway;
    use crate::adapters::memory::{InMemoryUpgradeRecordStore, InMemoryUserPlanStore};
    use crate::application::handlers::upgrade::RetryPolicy;
    use crate::domain::foundation::UserId;
    use crate::domain::upgrade::{NewUpgradeRecord, Plan, UpgradeRecord};
    use crate::ports::{GatewayStatus, PaymentError, UserPlanStore};

    struct Fixture {
        records: InMemoryUpgradeRecordStore,
        plans: InMemoryUserPlanStore,
        gateway: MockPaymentGateway,
        handler: ExpireStaleUpgradesHandler,
    }

    fn fixture() -> Fixture {
        let records = InMemoryUpgradeRecordStore::new();
        let plans = InMemoryUserPlanStore::new();
        let gateway = MockPaymentGateway::new();
        let verifier = VerifyAndApplyHandler::new(
            Arc::new(records.clone()),
            Arc::new(plans.clone()),
            Arc::new(gateway.clone()),
        )
        .with_retry_policy(RetryPolicy::none());
        let handler = ExpireStaleUpgradesHandler::new(Arc::new(records.clone()), verifier);
        Fixture {
            records,
            plans,
            gateway,
            handler,
        }
    }

    /// Inserts a Pending record that expired a minute ago.
    async fn stale(f: &Fixture, user: &str, gateway_ref: Option<&str>) -> UpgradeRecord {
        let now = Timestamp::now();
        let mut record = UpgradeRecord::from_new(
            NewUpgradeRecord::new(
                UserId::new(user).unwrap(),
                Plan::Free,
                Plan::Pro,
                300_000,
                now.add_minutes(-1),
            )
            .unwrap(),
            now.add_minutes(-31),
        );
        record.gateway_ref = gateway_ref.map(str::to_string);
        f.records.insert_raw(record.clone()).await;
        record
    }

    #[tokio::test]
    async fn expires_record_without_gateway_ref() {
        let f = fixture();
        let record = stale(&f, "alice", None).await;

        let report = f.handler.handle(Timestamp::now()).await.unwrap();

        assert_eq!(report.examined, 1);
        assert_eq!(report.expired, 1);
        let stored = f.records.find_by_id(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, UpgradeStatus::Expired);
        assert_eq!(f.gateway.call_count("lookup"), 0);
    }

    #[tokio::test]
    async fn pending_at_gateway_is_expired() {
        let f = fixture();
        stale(&f, "alice", Some("pidx-a")).await;
        f.gateway.set_lookup("pidx-a", GatewayStatus::Pending, 300_000);

        let report = f.handler.handle(Timestamp::now()).await.unwrap();

        assert_eq!(report.expired, 1);
    }

    #[tokio::test]
    async fn late_completed_payment_is_honored() {
        let f = fixture();
        stale(&f, "alice", Some("pidx-a")).await;
        f.gateway.complete("pidx-a", 300_000);

        let report = f.handler.handle(Timestamp::now()).await.unwrap();

        assert_eq!(report.completed, 1);
        assert_eq!(report.expired, 0);
        let alice = UserId::new("alice").unwrap();
        assert_eq!(f.plans.current_plan(&alice).await.unwrap(), Plan::Pro);
    }

    #[tokio::test]
    async fn gateway_failure_leaves_record_for_next_sweep() {
        let f = fixture();
        let record = stale(&f, "alice", Some("pidx-a")).await;
        f.gateway
            .set_method_error("lookup", PaymentError::unreachable("timeout"));

        let report = f.handler.handle(Timestamp::now()).await.unwrap();

        assert_eq!(report.errors, 1);
        let stored = f.records.find_by_id(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, UpgradeStatus::Pending);
    }

    #[tokio::test]
    async fn purged_gateway_session_is_expired() {
        let f = fixture();
        // No lookup scripted, so the gateway answers "not found"
        let purged = stale(&f, "alice", Some("pidx-gone")).await;
        let waiting = stale(&f, "bob", Some("pidx-b")).await;
        f.gateway.set_lookup("pidx-b", GatewayStatus::Pending, 300_000);

        let report = f.handler.with_batch_size(2).handle(Timestamp::now()).await.unwrap();

        assert_eq!(report.expired, 2);
        assert_eq!(report.errors, 0);
        for id in [&purged.id, &waiting.id] {
            let stored = f.records.find_by_id(id).await.unwrap().unwrap();
            assert_eq!(stored.status, UpgradeStatus::Expired);
        }
    }

    #[tokio::test]
    async fn fresh_records_are_not_touched() {
        let f = fixture();
        f.records
            .create(
                NewUpgradeRecord::new(
                    UserId::new("bob").unwrap(),
                    Plan::Free,
                    Plan::Pro,
                    300_000,
                    Timestamp::now().add_minutes(30),
                )
                .unwrap(),
            )
            .await
            .unwrap();

        let report = f.handler.handle(Timestamp::now()).await.unwrap();

        assert_eq!(report, SweepReport::default());
    }
}
