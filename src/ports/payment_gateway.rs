//! Payment gateway port.
//!
//! Two operations: open a payment session for an amount, and look up what
//! happened to it. Lookups are read-only on the gateway side and safe to
//! repeat. Implementations carry their own timeout and never retry
//! internally; retry policy belongs to the caller.

use std::collections::HashMap;

use crate::domain::foundation::{ErrorCode, Timestamp};
use crate::domain::upgrade::UpgradeError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Port for hosted-checkout payment gateways (Khalti ePayment).
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a payment session and returns where to send the user.
    async fn initiate(&self, request: InitiatePaymentRequest)
        -> Result<InitiatedPayment, PaymentError>;

    /// Reports the current state of a payment session.
    async fn lookup(&self, gateway_ref: &str) -> Result<PaymentLookup, PaymentError>;
}

/// Request to open a payment session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitiatePaymentRequest {
    /// Amount in paisa.
    pub amount: i64,

    /// Merchant-side order id, unique per upgrade attempt.
    pub purchase_order_id: String,

    pub purchase_order_name: String,

    /// Where the gateway redirects the user after payment.
    pub return_url: String,

    pub website_url: String,

    /// Free-form context forwarded to the gateway.
    pub metadata: HashMap<String, String>,
}

/// Payment session opened at the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitiatedPayment {
    /// Gateway session id (Khalti `pidx`).
    pub gateway_ref: String,

    pub payment_url: String,

    /// When the gateway will stop accepting payment for this session.
    pub expires_at: Timestamp,
}

/// Gateway's view of a payment session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentLookup {
    pub gateway_status: GatewayStatus,

    /// Amount the gateway recorded, in paisa.
    pub amount: i64,

    /// Unparsed response body, kept for audit.
    pub raw_response: serde_json::Value,
}

/// Payment status as reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayStatus {
    Completed,

    /// Initiated or still being processed.
    Pending,

    Expired,
    UserCanceled,

    /// Fully or partially refunded.
    Refunded,
}

impl GatewayStatus {
    /// True for statuses that end the payment without success.
    pub fn is_definitive_failure(&self) -> bool {
        matches!(
            self,
            GatewayStatus::Expired | GatewayStatus::UserCanceled | GatewayStatus::Refunded
        )
    }
}

/// Errors from gateway operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentError {
    /// Error code for categorization.
    pub code: PaymentErrorCode,

    /// Human-readable message.
    pub message: String,

    /// Gateway's own error key, when the response carried one.
    pub provider_code: Option<String>,

    /// Whether the operation can be retried.
    pub retryable: bool,

    /// The gateway does not know the payment reference at all.
    #[serde(default)]
    pub unknown_reference: bool,
}

impl PaymentError {
    pub fn new(code: PaymentErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider_code: None,
            retryable: code.is_retryable(),
            unknown_reference: false,
        }
    }

    pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    /// Network failure or timeout.
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::GatewayUnreachable, message)
    }

    /// Well-formed error response from the gateway.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::GatewayRejected, message)
    }

    /// Rejection because the gateway has no session for the reference.
    ///
    /// A session that ever completed stays visible to lookups, so this
    /// rules out a successful payment.
    pub fn unknown_reference(message: impl Into<String>) -> Self {
        Self {
            unknown_reference: true,
            ..Self::rejected(message)
        }
    }

    /// Response could not be understood.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::GatewayProtocolError, message)
    }
}

impl std::fmt::Display for PaymentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for PaymentError {}

impl From<PaymentError> for UpgradeError {
    fn from(err: PaymentError) -> Self {
        UpgradeError::gateway(err.code.error_code(), err.message)
    }
}

/// Gateway error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentErrorCode {
    /// Network failure or timeout.
    GatewayUnreachable,

    /// Gateway refused the request (bad amount, bad key, unknown pidx).
    GatewayRejected,

    /// Unparsable response or unknown status.
    GatewayProtocolError,
}

impl PaymentErrorCode {
    /// Check if this error type is typically retryable.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, PaymentErrorCode::GatewayRejected)
    }

    /// Matching domain error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            PaymentErrorCode::GatewayUnreachable => ErrorCode::GatewayUnreachable,
            PaymentErrorCode::GatewayRejected => ErrorCode::GatewayRejected,
            PaymentErrorCode::GatewayProtocolError => ErrorCode::GatewayProtocolError,
        }
    }
}

impl std::fmt::Display for PaymentErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentErrorCode::GatewayUnreachable => "gateway_unreachable",
            PaymentErrorCode::GatewayRejected => "gateway_rejected",
            PaymentErrorCode::GatewayProtocolError => "gateway_protocol_error",
        };
        write!(f, "{}", s)
    }
}
