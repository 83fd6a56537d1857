//! HandlePaymentCallbackHandler - Handles the gateway's return redirect.
//!
//! The query string Khalti appends to `return_url` is untrusted: only the
//! `pidx` is used, to run the same verification as the explicit endpoint.
//! The status hint is consulted only to answer the user when the gateway
//! cannot be reached, and never changes a record.

use crate::domain::foundation::ErrorCode;
use crate::domain::upgrade::{UpgradeError, UpgradeRecord, UpgradeStatus};

use super::verify_and_apply::{VerifyAndApplyHandler, VerifyPaymentCommand};

/// Parameters from the gateway redirect.
#[derive(Debug, Clone, Default)]
pub struct PaymentCallback {
    pub gateway_ref: Option<String>,

    /// Gateway-reported status. Untrusted.
    pub status_hint: Option<String>,

    pub transaction_id: Option<String>,
    pub purchase_order_id: Option<String>,
}

/// Coarse outcome shown to the returning user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    Success,
    PendingRetry,
    Failed,
}

impl PaymentOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentOutcome::Success => "success",
            PaymentOutcome::PendingRetry => "pending-retry",
            PaymentOutcome::Failed => "failed",
        }
    }

    /// Outcome for a record's status after verification.
    pub fn from_status(status: UpgradeStatus) -> Self {
        match status {
            UpgradeStatus::Completed => PaymentOutcome::Success,
            UpgradeStatus::Pending | UpgradeStatus::Verifying => PaymentOutcome::PendingRetry,
            UpgradeStatus::Failed | UpgradeStatus::Expired | UpgradeStatus::Cancelled => {
                PaymentOutcome::Failed
            }
        }
    }
}

impl std::fmt::Display for PaymentOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of handling a callback.
#[derive(Debug, Clone)]
pub struct CallbackResult {
    pub outcome: PaymentOutcome,

    /// The record, when verification reached the gateway.
    pub record: Option<UpgradeRecord>,
}

pub struct HandlePaymentCallbackHandler {
    verifier: VerifyAndApplyHandler,
}

impl HandlePaymentCallbackHandler {
    pub fn new(verifier: VerifyAndApplyHandler) -> Self {
        Self { verifier }
    }

    pub async fn handle(&self, callback: PaymentCallback) -> Result<CallbackResult, UpgradeError> {
        let gateway_ref = callback
            .gateway_ref
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(UpgradeError::missing_payment_reference)?;

        tracing::debug!(
            pidx = %gateway_ref,
            status_hint = ?callback.status_hint,
            transaction_id = ?callback.transaction_id,
            purchase_order_id = ?callback.purchase_order_id,
            "Payment callback received"
        );

        let verified = self
            .verifier
            .handle(VerifyPaymentCommand {
                gateway_ref: gateway_ref.to_string(),
                requested_by: None,
            })
            .await;

        match verified {
            Ok(outcome) => {
                if let Some(expected) = &callback.purchase_order_id {
                    if expected != &outcome.record.purchase_order_id {
                        tracing::warn!(
                            pidx = %gateway_ref,
                            callback_order = %expected,
                            record_order = %outcome.record.purchase_order_id,
                            "Callback purchase order does not match record"
                        );
                    }
                }
                Ok(CallbackResult {
                    outcome: PaymentOutcome::from_status(outcome.record.status),
                    record: Some(outcome.record),
                })
            }
            Err(UpgradeError::Gateway { code, .. })
                if code == ErrorCode::GatewayUnreachable
                    && is_cancel_hint(callback.status_hint.as_deref()) =>
            {
                Ok(CallbackResult {
                    outcome: PaymentOutcome::Failed,
                    record: None,
                })
            }
            Err(e) => Err(e),
        }
    }
}

fn is_cancel_hint(hint: Option<&str>) -> bool {
    hint.map(|h| h.trim().eq_ignore_ascii_case("user canceled"))
        .unwrap_or(false)
}
