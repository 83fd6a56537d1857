//! VerifyAndApplyHandler - Decides an upgrade from the gateway's verdict.
//!
//! The gateway lookup is the only source of truth; client-supplied status is
//! never consulted here. Every status change goes through the store's CAS
//! transition and only the caller whose transition lands on `Completed`
//! applies the plan, so concurrent verifications for the same payment apply
//! it at most once.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::upgrade::{
    FailureReason, TransitionExtra, UpgradeError, UpgradeRecord, UpgradeStatus,
};
use crate::ports::{
    GatewayStatus, PaymentError, PaymentGateway, PaymentLookup, UpgradeRecordStore,
    UserPlanStore,
};

/// How often a failed lookup is retried before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total lookup attempts, including the first.
    pub max_attempts: u32,

    /// Pause between attempts.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Single attempt, no pause.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff: Duration::from_millis(200),
        }
    }
}

/// Command to verify a payment.
#[derive(Debug, Clone)]
pub struct VerifyPaymentCommand {
    /// Gateway session id (Khalti `pidx`).
    pub gateway_ref: String,

    /// When set, the record must belong to this user.
    pub requested_by: Option<UserId>,
}

/// Result of a verification.
#[derive(Debug, Clone)]
pub struct VerifyOutcome {
    /// The record after this call, whoever decided it.
    pub record: UpgradeRecord,

    /// True only for the call that applied the plan.
    pub applied: bool,
}

/// Handler for verifying payments and applying upgrades.
#[derive(Clone)]
pub struct VerifyAndApplyHandler {
    records: Arc<dyn UpgradeRecordStore>,
    plans: Arc<dyn UserPlanStore>,
    gateway: Arc<dyn PaymentGateway>,
    retry: RetryPolicy,
}

impl VerifyAndApplyHandler {
    pub fn new(
        records: Arc<dyn UpgradeRecordStore>,
        plans: Arc<dyn UserPlanStore>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            records,
            plans,
            gateway,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn handle(&self, cmd: VerifyPaymentCommand) -> Result<VerifyOutcome, UpgradeError> {
        let gateway_ref = cmd.gateway_ref.trim();
        if gateway_ref.is_empty() {
            return Err(UpgradeError::missing_payment_reference());
        }

        // 1. Load and authorize
        let record = self
            .records
            .find_by_gateway_ref(gateway_ref)
            .await?
            .ok_or_else(|| UpgradeError::not_found_for_gateway_ref(gateway_ref))?;

        if let Some(user_id) = &cmd.requested_by {
            if !record.is_owned_by(user_id) {
                // Same answer as a missing record
                return Err(UpgradeError::not_found_for_gateway_ref(gateway_ref));
            }
        }

        // 2. Decided records stay decided
        if record.is_terminal() {
            return Ok(VerifyOutcome {
                record,
                applied: false,
            });
        }

        // 3. Ask the gateway
        let now = Timestamp::now();
        let lookup = match self.lookup_with_retry(&record, gateway_ref).await {
            Ok(lookup) => lookup,
            Err(e) if e.unknown_reference && record.is_past_expiry(now) => {
                // Purged sessions never completed; the window is closed anyway
                tracing::warn!(
                    upgrade_id = %record.id,
                    pidx = %gateway_ref,
                    "Gateway no longer knows the payment, expiring upgrade"
                );
                return self
                    .settle(
                        record,
                        &UpgradeStatus::ACTIVE,
                        UpgradeStatus::Expired,
                        TransitionExtra::none(),
                    )
                    .await;
            }
            Err(e) => return Err(e.into()),
        };

        // 4. Decide and apply
        self.decide(record, lookup, now).await
    }

    async fn lookup_with_retry(
        &self,
        record: &UpgradeRecord,
        gateway_ref: &str,
    ) -> Result<PaymentLookup, PaymentError> {
        let attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.gateway.lookup(gateway_ref).await {
                Ok(lookup) => return Ok(lookup),
                Err(e) if e.retryable && attempt < attempts => {
                    tracing::warn!(
                        upgrade_id = %record.id,
                        pidx = %gateway_ref,
                        attempt,
                        error_code = %e.code,
                        error = %e.message,
                        "Payment lookup failed, retrying"
                    );
                    attempt += 1;
                    if !self.retry.backoff.is_zero() {
                        tokio::time::sleep(self.retry.backoff).await;
                    }
                }
                Err(e) => {
                    log_lookup_failure(record, gateway_ref, &e);
                    return Err(e);
                }
            }
        }
    }

    async fn decide(
        &self,
        record: UpgradeRecord,
        lookup: PaymentLookup,
        now: Timestamp,
    ) -> Result<VerifyOutcome, UpgradeError> {
        let raw = lookup.raw_response.clone();

        // Amount is checked before anything else the gateway says
        if lookup.amount != record.amount {
            tracing::error!(
                security = "amount_mismatch",
                upgrade_id = %record.id,
                user_id = %record.user_id,
                expected = record.amount,
                received = lookup.amount,
                gateway_status = ?lookup.gateway_status,
                "Gateway amount does not match upgrade amount"
            );
            return self
                .settle(
                    record,
                    &UpgradeStatus::ACTIVE,
                    UpgradeStatus::Failed,
                    TransitionExtra::failed(FailureReason::AmountMismatch).with_raw_response(raw),
                )
                .await;
        }

        let (to, extra) = match lookup.gateway_status {
            GatewayStatus::Completed => (UpgradeStatus::Completed, TransitionExtra::none()),
            GatewayStatus::Pending if record.is_past_expiry(now) => {
                (UpgradeStatus::Expired, TransitionExtra::none())
            }
            GatewayStatus::Pending => (UpgradeStatus::Verifying, TransitionExtra::none()),
            GatewayStatus::Expired => (
                UpgradeStatus::Expired,
                TransitionExtra::failed(FailureReason::GatewayExpired),
            ),
            GatewayStatus::UserCanceled => (
                UpgradeStatus::Failed,
                TransitionExtra::failed(FailureReason::UserCanceled),
            ),
            GatewayStatus::Refunded => (
                UpgradeStatus::Failed,
                TransitionExtra::failed(FailureReason::Refunded),
            ),
        };

        self.settle(
            record,
            &UpgradeStatus::ACTIVE,
            to,
            extra.with_raw_response(raw),
        )
        .await
    }

    /// Runs the CAS and, for the winner of a `Completed` transition, applies
    /// the plan.
    async fn settle(
        &self,
        record: UpgradeRecord,
        from: &[UpgradeStatus],
        to: UpgradeStatus,
        extra: TransitionExtra,
    ) -> Result<VerifyOutcome, UpgradeError> {
        let won = self.records.transition(&record.id, from, to, extra).await?;

        let Some(updated) = won else {
            tracing::debug!(
                upgrade_id = %record.id,
                attempted = %to.as_str(),
                "Lost status transition race"
            );
            let current = self.records.find_by_id(&record.id).await?;
            return Ok(VerifyOutcome {
                record: current.unwrap_or(record),
                applied: false,
            });
        };

        if updated.status != UpgradeStatus::Completed {
            tracing::info!(
                upgrade_id = %updated.id,
                status = %updated.status.as_str(),
                failure_reason = ?updated.failure_reason,
                "Upgrade status updated from gateway lookup"
            );
            return Ok(VerifyOutcome {
                record: updated,
                applied: false,
            });
        }

        if let Err(e) = self
            .plans
            .apply_upgrade(&updated.user_id, updated.to_plan, &updated.id)
            .await
        {
            tracing::error!(
                upgrade_id = %updated.id,
                user_id = %updated.user_id,
                to_plan = %updated.to_plan,
                error = %e,
                "Upgrade completed but plan could not be applied"
            );
            return Err(e.into());
        }

        tracing::info!(
            upgrade_id = %updated.id,
            user_id = %updated.user_id,
            to_plan = %updated.to_plan,
            amount = updated.amount,
            "Plan upgrade applied"
        );

        Ok(VerifyOutcome {
            record: updated,
            applied: true,
        })
    }
}

fn log_lookup_failure(record: &UpgradeRecord, gateway_ref: &str, e: &PaymentError) {
    tracing::warn!(
        upgrade_id = %record.id,
        pidx = %gateway_ref,
        error_code = %e.code,
        provider_code = ?e.provider_code,
        error = %e.message,
        "Payment lookup failed"
    );
}
