//! HTTP DTOs (Data Transfer Objects) for plan upgrade endpoints.
//!
//! Request and response bodies are camelCase JSON. Raw gateway responses are
//! kept server-side and never serialized here.

use serde::{Deserialize, Serialize};

use crate::application::handlers::upgrade::{
    CallbackResult, CancelOutcome, PaymentOutcome, RequestUpgradeResult, UpgradeHistoryPage,
    VerifyOutcome,
};
use crate::domain::foundation::Timestamp;
use crate::domain::upgrade::{UpgradeRecord, UpgradeStatus};

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Request to start an upgrade.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateUpgradeRequest {
    /// `pro` or `vantage`.
    pub target_plan: String,
}

/// Request to re-check a payment.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    /// Khalti `pidx`.
    #[serde(default)]
    pub gateway_ref: String,
}

/// Request to cancel an upgrade.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelUpgradeRequest {
    pub upgrade_id: String,
}

/// Query string Khalti appends to the return URL.
///
/// Field names are Khalti's; only `pidx` is trusted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentCallbackParams {
    pub pidx: Option<String>,
    pub status: Option<String>,
    pub transaction_id: Option<String>,
    pub purchase_order_id: Option<String>,
}

/// Query parameters for upgrade history.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Response for a started upgrade.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateUpgradeResponse {
    pub upgrade_id: String,
    pub payment_url: String,
    pub expires_at: Timestamp,
}

impl From<RequestUpgradeResult> for InitiateUpgradeResponse {
    fn from(result: RequestUpgradeResult) -> Self {
        Self {
            upgrade_id: result.record.id.to_string(),
            payment_url: result.payment_url,
            expires_at: result.record.expires_at,
        }
    }
}

/// Response for the callback and verify endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOutcomeResponse {
    /// `success`, `pending-retry` or `failed`.
    pub outcome: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub upgrade_id: Option<String>,

    /// Plan the user is on after a successful upgrade.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
}

impl PaymentOutcomeResponse {
    fn new(outcome: PaymentOutcome, record: Option<&UpgradeRecord>) -> Self {
        Self {
            outcome: outcome.to_string(),
            upgrade_id: record.map(|r| r.id.to_string()),
            plan: record
                .filter(|r| r.status == UpgradeStatus::Completed)
                .map(|r| r.to_plan.as_str().to_string()),
        }
    }
}

impl From<CallbackResult> for PaymentOutcomeResponse {
    fn from(result: CallbackResult) -> Self {
        Self::new(result.outcome, result.record.as_ref())
    }
}

impl From<VerifyOutcome> for PaymentOutcomeResponse {
    fn from(outcome: VerifyOutcome) -> Self {
        Self::new(
            PaymentOutcome::from_status(outcome.record.status),
            Some(&outcome.record),
        )
    }
}

/// Response for a cancel request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelUpgradeResponse {
    pub cancelled: bool,
    pub upgrade_id: String,
    pub status: String,
}

impl From<CancelOutcome> for CancelUpgradeResponse {
    fn from(outcome: CancelOutcome) -> Self {
        Self {
            cancelled: outcome.cancelled,
            upgrade_id: outcome.record.id.to_string(),
            status: outcome.record.status.as_str().to_string(),
        }
    }
}

/// One upgrade attempt as shown to its owner.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeRecordResponse {
    pub id: String,
    pub from_plan: String,
    pub to_plan: String,
    pub amount: i64,
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_ref: Option<String>,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub expires_at: Timestamp,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
}

impl From<UpgradeRecord> for UpgradeRecordResponse {
    fn from(record: UpgradeRecord) -> Self {
        Self {
            id: record.id.to_string(),
            from_plan: record.from_plan.as_str().to_string(),
            to_plan: record.to_plan.as_str().to_string(),
            amount: record.amount,
            status: record.status.as_str().to_string(),
            failure_reason: record.failure_reason.map(|r| r.as_str().to_string()),
            gateway_ref: record.gateway_ref,
            created_at: record.created_at,
            updated_at: record.updated_at,
            expires_at: record.expires_at,
            completed_at: record.completed_at,
        }
    }
}

/// One page of upgrade history.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeHistoryResponse {
    pub items: Vec<UpgradeRecordResponse>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub has_more: bool,
}

impl From<UpgradeHistoryPage> for UpgradeHistoryResponse {
    fn from(page: UpgradeHistoryPage) -> Self {
        Self {
            items: page.items.into_iter().map(Into::into).collect(),
            total: page.total,
            page: page.page,
            limit: page.limit,
            has_more: page.has_more,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Response DTO
// ════════════════════════════════════════════════════════════════════════════════

/// Standard error response for API errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub error_code: String,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
        }
    }
}
