//! RequestUpgradeHandler - Command handler for starting a plan upgrade.
//!
//! Creates a `Pending` record, opens a Khalti payment session for it and
//! returns where to send the user. A gateway failure moves the fresh record
//! straight to `Failed`, so no `Pending` record is ever left without a
//! gateway reference.
//!
//! A stale active upgrade that reached the gateway is verified before it is
//! replaced, so a payment made inside the window is applied, not dropped.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::upgrade::{
    FailureReason, NewUpgradeRecord, Plan, PlanPriceTable, TransitionExtra, UpgradeError,
    UpgradeRecord, UpgradeStatus,
};
use crate::ports::{
    InitiatePaymentRequest, PaymentErrorCode, PaymentGateway, UpgradeRecordStore, UserPlanStore,
};

use super::verify_and_apply::{RetryPolicy, VerifyAndApplyHandler, VerifyPaymentCommand};

/// Static inputs for starting upgrades, loaded from configuration.
#[derive(Debug, Clone)]
pub struct UpgradeSettings {
    pub prices: PlanPriceTable,

    /// Where Khalti sends the user after payment.
    pub return_url: String,

    pub website_url: String,

    /// Payment window for a new upgrade.
    pub ttl_minutes: i64,
}

impl Default for UpgradeSettings {
    fn default() -> Self {
        Self {
            prices: PlanPriceTable::default(),
            return_url: "http://localhost:3000/api/plans/payment-callback".to_string(),
            website_url: "http://localhost:3000".to_string(),
            ttl_minutes: 30,
        }
    }
}

/// Command to start an upgrade.
#[derive(Debug, Clone)]
pub struct RequestUpgradeCommand {
    pub user_id: UserId,
    pub target_plan: Plan,
}

/// Result of a started upgrade.
#[derive(Debug, Clone)]
pub struct RequestUpgradeResult {
    pub record: UpgradeRecord,
    pub payment_url: String,
}

pub struct RequestUpgradeHandler {
    records: Arc<dyn UpgradeRecordStore>,
    plans: Arc<dyn UserPlanStore>,
    gateway: Arc<dyn PaymentGateway>,
    verifier: VerifyAndApplyHandler,
    settings: UpgradeSettings,
}

impl RequestUpgradeHandler {
    pub fn new(
        records: Arc<dyn UpgradeRecordStore>,
        plans: Arc<dyn UserPlanStore>,
        gateway: Arc<dyn PaymentGateway>,
        settings: UpgradeSettings,
    ) -> Self {
        let verifier = VerifyAndApplyHandler::new(records.clone(), plans.clone(), gateway.clone());
        Self {
            records,
            plans,
            gateway,
            verifier,
            settings,
        }
    }

    /// Retry policy for verifying a stale upgrade before replacing it.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.verifier = self.verifier.with_retry_policy(retry);
        self
    }

    pub async fn handle(
        &self,
        cmd: RequestUpgradeCommand,
    ) -> Result<RequestUpgradeResult, UpgradeError> {
        let now = Timestamp::now();

        // 1. Target must be strictly above the current plan
        let mut current = self.plans.current_plan(&cmd.user_id).await?;
        if !current.can_upgrade_to(cmd.target_plan) {
            return Err(UpgradeError::invalid_plan_transition(current, cmd.target_plan));
        }

        // 2. One active upgrade per user; a stale one is settled on the spot
        if let Some(active) = self.records.find_active_for_user(&cmd.user_id).await? {
            if !active.is_stale(now) {
                return Err(UpgradeError::conflict_active_upgrade(cmd.user_id));
            }
            let settled = self.settle_stale(active).await?;
            if settled.status == UpgradeStatus::Completed {
                current = self.plans.current_plan(&cmd.user_id).await?;
                if !current.can_upgrade_to(cmd.target_plan) {
                    return Err(UpgradeError::invalid_plan_transition(current, cmd.target_plan));
                }
            }
        }

        let amount = self.settings.prices.price_of(cmd.target_plan).ok_or_else(|| {
            UpgradeError::validation("target_plan", "Plan has no price configured")
        })?;

        // 3. Persist the Pending record; the store enforces the active rule atomically
        let new = NewUpgradeRecord::new(
            cmd.user_id.clone(),
            current,
            cmd.target_plan,
            amount,
            now.add_minutes(self.settings.ttl_minutes),
        )?;
        let record = self.records.create(new).await?;

        // 4. Open the payment session
        let mut metadata = HashMap::new();
        metadata.insert("upgrade_id".to_string(), record.id.to_string());
        metadata.insert("user_id".to_string(), record.user_id.to_string());

        let initiated = match self
            .gateway
            .initiate(InitiatePaymentRequest {
                amount,
                purchase_order_id: record.purchase_order_id.clone(),
                purchase_order_name: format!("Worksage {} plan", cmd.target_plan.display_name()),
                return_url: self.settings.return_url.clone(),
                website_url: self.settings.website_url.clone(),
                metadata,
            })
            .await
        {
            Ok(initiated) => initiated,
            Err(e) => {
                tracing::warn!(
                    upgrade_id = %record.id,
                    error_code = %e.code,
                    error = %e.message,
                    "Payment initiation failed"
                );
                let extra = if e.code == PaymentErrorCode::GatewayRejected {
                    TransitionExtra::failed(FailureReason::GatewayRejected)
                } else {
                    TransitionExtra::none()
                };
                self.fail_fresh_record(&record, extra).await;
                return Err(e.into());
            }
        };

        // 5. Attach the gateway session to the record
        let record = match self
            .records
            .attach_gateway_ref(
                &record.id,
                &initiated.gateway_ref,
                &initiated.payment_url,
                initiated.expires_at,
            )
            .await
        {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(
                    upgrade_id = %record.id,
                    pidx = %initiated.gateway_ref,
                    error = %e,
                    "Failed to attach gateway reference"
                );
                self.fail_fresh_record(&record, TransitionExtra::none()).await;
                return Err(e.into());
            }
        };

        tracing::info!(
            upgrade_id = %record.id,
            user_id = %record.user_id,
            to_plan = %record.to_plan,
            amount = record.amount,
            "Upgrade requested"
        );

        Ok(RequestUpgradeResult {
            record,
            payment_url: initiated.payment_url,
        })
    }

    /// Brings a stale active upgrade to a terminal status.
    ///
    /// With a gateway reference the gateway decides, which may complete it.
    /// Without one the payment never started and the record is expired.
    async fn settle_stale(&self, active: UpgradeRecord) -> Result<UpgradeRecord, UpgradeError> {
        let settled = match active.gateway_ref.clone() {
            Some(gateway_ref) => {
                self.verifier
                    .handle(VerifyPaymentCommand {
                        gateway_ref,
                        requested_by: Some(active.user_id.clone()),
                    })
                    .await?
                    .record
            }
            None => {
                let expired = self
                    .records
                    .transition(
                        &active.id,
                        &UpgradeStatus::ACTIVE,
                        UpgradeStatus::Expired,
                        TransitionExtra::none(),
                    )
                    .await?;
                match expired {
                    Some(record) => record,
                    None => self.records.find_by_id(&active.id).await?.unwrap_or(active),
                }
            }
        };

        if !settled.is_terminal() {
            return Err(UpgradeError::conflict_active_upgrade(settled.user_id));
        }

        tracing::info!(
            upgrade_id = %settled.id,
            user_id = %settled.user_id,
            status = %settled.status.as_str(),
            "Settled stale upgrade before starting a new one"
        );
        Ok(settled)
    }

    /// Best effort: the caller already has an error to report.
    async fn fail_fresh_record(&self, record: &UpgradeRecord, extra: TransitionExtra) {
        if let Err(e) = self
            .records
            .transition(&record.id, &[UpgradeStatus::Pending], UpgradeStatus::Failed, extra)
            .await
        {
            tracing::error!(
                upgrade_id = %record.id,
                error = %e,
                "Failed to mark upgrade as failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::khalti::MockPaymentGateway;
    use crate::adapters::memory::{InMemoryUpgradeRecordStore, InMemoryUserPlanStore};
    use crate::domain::foundation::ErrorCode;
    use crate::ports::{InitiatedPayment, PaymentError};

    struct Fixture {
        records: InMemoryUpgradeRecordStore,
        plans: InMemoryUserPlanStore,
        gateway: MockPaymentGateway,
        handler: RequestUpgradeHandler,
    }

    fn fixture() -> Fixture {
        let records = InMemoryUpgradeRecordStore::new();
        let plans = InMemoryUserPlanStore::new();
        let gateway = MockPaymentGateway::new();
        let handler = RequestUpgradeHandler::new(
            Arc::new(records.clone()),
            Arc::new(plans.clone()),
            Arc::new(gateway.clone()),
            UpgradeSettings::default(),
        )
        .with_retry_policy(RetryPolicy::none());
        Fixture {
            records,
            plans,
            gateway,
            handler,
        }
    }

    fn alice() -> UserId {
        UserId::new("alice").unwrap()
    }

    fn upgrade_to(plan: Plan) -> RequestUpgradeCommand {
        RequestUpgradeCommand {
            user_id: alice(),
            target_plan: plan,
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Success
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn creates_pending_record_with_gateway_ref() {
        let f = fixture();

        let result = f.handler.handle(upgrade_to(Plan::Pro)).await.unwrap();

        assert_eq!(result.record.status, UpgradeStatus::Pending);
        assert_eq!(result.record.amount, 300_000);
        assert_eq!(result.record.from_plan, Plan::Free);
        assert_eq!(result.record.to_plan, Plan::Pro);
        assert!(result.record.gateway_ref.is_some());
        assert_eq!(result.record.payment_url.as_deref(), Some(result.payment_url.as_str()));
    }

    #[tokio::test]
    async fn sends_traceable_purchase_order_id() {
        let f = fixture();

        let result = f.handler.handle(upgrade_to(Plan::Vantage)).await.unwrap();

        let call = &f.gateway.calls()[0];
        assert_eq!(call.method, "initiate");
        assert_eq!(call.args[0], format!("upgrade-{}", result.record.id));
        assert_eq!(call.args[1], "500000");
    }

    #[tokio::test]
    async fn keeps_earlier_gateway_expiry() {
        let f = fixture();
        let soon = Timestamp::now().add_minutes(5);
        f.gateway.set_initiate_response(InitiatedPayment {
            gateway_ref: "pidx-soon".to_string(),
            payment_url: "https://pay/pidx-soon".to_string(),
            expires_at: soon,
        });

        let result = f.handler.handle(upgrade_to(Plan::Pro)).await.unwrap();

        assert_eq!(result.record.expires_at, soon);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Validation
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn rejects_same_plan() {
        let f = fixture();
        f.plans.set_plan(&alice(), Plan::Pro).await;

        let err = f.handler.handle(upgrade_to(Plan::Pro)).await.unwrap_err();

        assert_eq!(err, UpgradeError::invalid_plan_transition(Plan::Pro, Plan::Pro));
        assert!(f.records.is_empty().await);
        assert_eq!(f.gateway.call_count("initiate"), 0);
    }

    #[tokio::test]
    async fn rejects_downgrade() {
        let f = fixture();
        f.plans.set_plan(&alice(), Plan::Vantage).await;

        let err = f.handler.handle(upgrade_to(Plan::Pro)).await.unwrap_err();

        assert_eq!(err.code(), ErrorCode::InvalidPlanTransition);
    }

    #[tokio::test]
    async fn rejects_free_as_target() {
        let f = fixture();
        let err = f.handler.handle(upgrade_to(Plan::Free)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidPlanTransition);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Active upgrade
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn second_request_while_pending_conflicts() {
        let f = fixture();
        f.handler.handle(upgrade_to(Plan::Pro)).await.unwrap();

        let err = f.handler.handle(upgrade_to(Plan::Vantage)).await.unwrap_err();

        assert_eq!(err, UpgradeError::conflict_active_upgrade(alice()));
        assert_eq!(f.records.len().await, 1);
    }

    #[tokio::test]
    async fn stale_active_upgrade_is_expired_and_replaced() {
        let f = fixture();
        let mut stale = UpgradeRecord::from_new(
            NewUpgradeRecord::new(alice(), Plan::Free, Plan::Pro, 300_000, Timestamp::now())
                .unwrap(),
            Timestamp::now().add_minutes(-60),
        );
        stale.expires_at = Timestamp::now().add_minutes(-30);
        f.records.insert_raw(stale.clone()).await;

        let result = f.handler.handle(upgrade_to(Plan::Pro)).await.unwrap();

        assert_ne!(result.record.id, stale.id);
        let old = f.records.find_by_id(&stale.id).await.unwrap().unwrap();
        assert_eq!(old.status, UpgradeStatus::Expired);
    }

    /// Pending Pro upgrade for alice whose window closed half an hour ago.
    async fn stale_pro_upgrade(f: &Fixture, gateway_ref: Option<&str>) -> UpgradeRecord {
        let mut stale = UpgradeRecord::from_new(
            NewUpgradeRecord::new(alice(), Plan::Free, Plan::Pro, 300_000, Timestamp::now())
                .unwrap(),
            Timestamp::now().add_minutes(-60),
        );
        stale.expires_at = Timestamp::now().add_minutes(-30);
        stale.gateway_ref = gateway_ref.map(str::to_string);
        f.records.insert_raw(stale.clone()).await;
        stale
    }

    #[tokio::test]
    async fn stale_upgrade_paid_at_gateway_is_applied_first() {
        let f = fixture();
        let stale = stale_pro_upgrade(&f, Some("pidx-paid")).await;
        f.gateway.complete("pidx-paid", 300_000);

        let result = f.handler.handle(upgrade_to(Plan::Vantage)).await.unwrap();

        let old = f.records.find_by_id(&stale.id).await.unwrap().unwrap();
        assert_eq!(old.status, UpgradeStatus::Completed);
        assert_eq!(f.gateway.call_count("lookup"), 1);
        assert_eq!(f.plans.current_plan(&alice()).await.unwrap(), Plan::Pro);
        assert_eq!(result.record.from_plan, Plan::Pro);
        assert_eq!(result.record.to_plan, Plan::Vantage);
    }

    #[tokio::test]
    async fn stale_upgrade_paid_for_same_target_blocks_new_request() {
        let f = fixture();
        let stale = stale_pro_upgrade(&f, Some("pidx-paid")).await;
        f.gateway.complete("pidx-paid", 300_000);

        let err = f.handler.handle(upgrade_to(Plan::Pro)).await.unwrap_err();

        assert_eq!(err, UpgradeError::invalid_plan_transition(Plan::Pro, Plan::Pro));
        let old = f.records.find_by_id(&stale.id).await.unwrap().unwrap();
        assert_eq!(old.status, UpgradeStatus::Completed);
        assert_eq!(f.plans.current_plan(&alice()).await.unwrap(), Plan::Pro);
        assert_eq!(f.gateway.call_count("initiate"), 0);
    }

    #[tokio::test]
    async fn stale_upgrade_unpaid_at_gateway_is_expired_and_replaced() {
        let f = fixture();
        let stale = stale_pro_upgrade(&f, Some("pidx-old")).await;
        f.gateway
            .set_lookup("pidx-old", crate::ports::GatewayStatus::Pending, 300_000);

        let result = f.handler.handle(upgrade_to(Plan::Vantage)).await.unwrap();

        let old = f.records.find_by_id(&stale.id).await.unwrap().unwrap();
        assert_eq!(old.status, UpgradeStatus::Expired);
        assert_eq!(result.record.from_plan, Plan::Free);
        assert_eq!(f.plans.current_plan(&alice()).await.unwrap(), Plan::Free);
    }

    #[tokio::test]
    async fn stale_upgrade_unverifiable_keeps_user_waiting() {
        let f = fixture();
        let stale = stale_pro_upgrade(&f, Some("pidx-old")).await;
        f.gateway
            .set_method_error("lookup", PaymentError::unreachable("timed out"));

        let err = f.handler.handle(upgrade_to(Plan::Vantage)).await.unwrap_err();

        assert_eq!(err.code(), ErrorCode::GatewayUnreachable);
        let old = f.records.find_by_id(&stale.id).await.unwrap().unwrap();
        assert_eq!(old.status, UpgradeStatus::Pending);
        assert_eq!(f.gateway.call_count("initiate"), 0);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Gateway failures
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn gateway_rejection_fails_record_with_reason() {
        let f = fixture();
        f.gateway
            .set_method_error("initiate", PaymentError::rejected("Amount too small"));

        let err = f.handler.handle(upgrade_to(Plan::Pro)).await.unwrap_err();

        assert_eq!(err.code(), ErrorCode::GatewayRejected);
        assert!(!err.is_retryable());
        let page = f
            .records
            .list_for_user(&alice(), &crate::ports::HistoryFilter::paginated(1, 10))
            .await
            .unwrap();
        assert_eq!(page.items[0].status, UpgradeStatus::Failed);
        assert_eq!(page.items[0].failure_reason, Some(FailureReason::GatewayRejected));
        assert!(page.items[0].gateway_ref.is_none());
    }

    #[tokio::test]
    async fn gateway_timeout_fails_record_and_frees_user() {
        let f = fixture();
        f.gateway.set_error(PaymentError::unreachable("timed out"));

        let err = f.handler.handle(upgrade_to(Plan::Pro)).await.unwrap_err();

        assert_eq!(err.code(), ErrorCode::GatewayUnreachable);
        assert!(err.is_retryable());
        assert!(f.records.find_active_for_user(&alice()).await.unwrap().is_none());

        // Retrying after the outage works.
        assert!(f.handler.handle(upgrade_to(Plan::Pro)).await.is_ok());
    }
}
