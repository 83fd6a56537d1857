//! Upgrade-specific error types.
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | ValidationFailed | 400 |
//! | InvalidPlanTransition | 400 |
//! | ConflictActiveUpgrade | 409 |
//! | NotFound | 404 |
//! | NotFoundForGatewayRef | 404 |
//! | MissingPaymentReference | 400 |
//! | Gateway (unreachable) | 503 |
//! | Gateway (rejected, protocol) | 502 |
//! | InvalidStateTransition | 500 |
//! | Infrastructure | 500 |
//!
//! An amount mismatch is deliberately absent: it ends as a `Failed` record,
//! not as an error.

use super::Plan;
use crate::domain::foundation::{DomainError, ErrorCode, UpgradeId, UserId, ValidationError};

/// Errors from the upgrade flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeError {
    ValidationFailed {
        field: String,
        message: String,
    },

    /// Target plan is not strictly above the current plan.
    InvalidPlanTransition {
        current: Plan,
        target: Plan,
    },

    /// User already has a `Pending`/`Verifying` upgrade.
    ConflictActiveUpgrade(UserId),

    NotFound(UpgradeId),

    NotFoundForGatewayRef(String),

    /// Callback arrived without a gateway reference.
    MissingPaymentReference,

    /// Gateway call failed. `code` is one of the gateway error codes.
    Gateway {
        code: ErrorCode,
        message: String,
    },

    /// A store precondition was not met. Indicates a caller bypassing the
    /// handlers.
    InvalidStateTransition {
        current: String,
        attempted: String,
    },

    Infrastructure(String),
}

impl UpgradeError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        UpgradeError::ValidationFailed {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn invalid_plan_transition(current: Plan, target: Plan) -> Self {
        UpgradeError::InvalidPlanTransition { current, target }
    }

    pub fn conflict_active_upgrade(user_id: UserId) -> Self {
        UpgradeError::ConflictActiveUpgrade(user_id)
    }

    pub fn not_found(id: UpgradeId) -> Self {
        UpgradeError::NotFound(id)
    }

    pub fn not_found_for_gateway_ref(gateway_ref: impl Into<String>) -> Self {
        UpgradeError::NotFoundForGatewayRef(gateway_ref.into())
    }

    pub fn missing_payment_reference() -> Self {
        UpgradeError::MissingPaymentReference
    }

    pub fn gateway(code: ErrorCode, message: impl Into<String>) -> Self {
        UpgradeError::Gateway {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_state(current: impl Into<String>, attempted: impl Into<String>) -> Self {
        UpgradeError::InvalidStateTransition {
            current: current.into(),
            attempted: attempted.into(),
        }
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        UpgradeError::Infrastructure(message.into())
    }

    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            UpgradeError::ValidationFailed { .. } => ErrorCode::ValidationFailed,
            UpgradeError::InvalidPlanTransition { .. } => ErrorCode::InvalidPlanTransition,
            UpgradeError::ConflictActiveUpgrade(_) => ErrorCode::ConflictActiveUpgrade,
            UpgradeError::NotFound(_) | UpgradeError::NotFoundForGatewayRef(_) => {
                ErrorCode::UpgradeNotFound
            }
            UpgradeError::MissingPaymentReference => ErrorCode::MissingPaymentReference,
            UpgradeError::Gateway { code, .. } => *code,
            UpgradeError::InvalidStateTransition { .. } => ErrorCode::InvalidStateTransition,
            UpgradeError::Infrastructure(_) => ErrorCode::DatabaseError,
        }
    }

    /// Returns a user-friendly error message.
    pub fn message(&self) -> String {
        match self {
            UpgradeError::ValidationFailed { field, message } => {
                format!("Validation failed for '{}': {}", field, message)
            }
            UpgradeError::InvalidPlanTransition { current, target } => format!(
                "Cannot upgrade from {} to {}",
                current.display_name(),
                target.display_name()
            ),
            UpgradeError::ConflictActiveUpgrade(_) => {
                "An upgrade is already in progress; complete or cancel it first".to_string()
            }
            UpgradeError::NotFound(id) => format!("Upgrade not found: {}", id),
            UpgradeError::NotFoundForGatewayRef(gateway_ref) => {
                format!("No upgrade found for payment reference: {}", gateway_ref)
            }
            UpgradeError::MissingPaymentReference => {
                "Payment reference (pidx) is missing".to_string()
            }
            UpgradeError::Gateway { message, .. } => format!("Payment gateway error: {}", message),
            UpgradeError::InvalidStateTransition { current, attempted } => {
                format!("Cannot {} upgrade in {} state", attempted, current)
            }
            UpgradeError::Infrastructure(msg) => format!("Error: {}", msg),
        }
    }

    /// Returns true if the same request may succeed when retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            UpgradeError::Gateway { code, .. } => *code != ErrorCode::GatewayRejected,
            UpgradeError::Infrastructure(_) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for UpgradeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for UpgradeError {}

impl From<ValidationError> for UpgradeError {
    fn from(err: ValidationError) -> Self {
        let field = match &err {
            ValidationError::EmptyField { field }
            | ValidationError::OutOfRange { field, .. }
            | ValidationError::InvalidFormat { field, .. } => field.clone(),
        };
        UpgradeError::ValidationFailed {
            field,
            message: err.to_string(),
        }
    }
}

impl From<DomainError> for UpgradeError {
    fn from(err: DomainError) -> Self {
        let user_id = err
            .details
            .get("user_id")
            .and_then(|raw| UserId::new(raw.as_str()).ok());
        let upgrade_id = err
            .details
            .get("upgrade_id")
            .and_then(|raw| raw.parse::<UpgradeId>().ok());

        match (err.code, user_id, upgrade_id) {
            (ErrorCode::ConflictActiveUpgrade, Some(user_id), _) => {
                UpgradeError::ConflictActiveUpgrade(user_id)
            }
            (ErrorCode::UpgradeNotFound, _, Some(upgrade_id)) => UpgradeError::NotFound(upgrade_id),
            (ErrorCode::InvalidStateTransition, _, _) => UpgradeError::InvalidStateTransition {
                current: err
                    .details
                    .get("current")
                    .cloned()
                    .unwrap_or_else(|| "unknown".to_string()),
                attempted: err.message,
            },
            (ErrorCode::ValidationFailed, _, _) => UpgradeError::ValidationFailed {
                field: err
                    .details
                    .get("field")
                    .cloned()
                    .unwrap_or_else(|| "unknown".to_string()),
                message: err.message,
            },
            (_, _, _) => UpgradeError::Infrastructure(err.to_string()),
        }
    }
}

impl From<UpgradeError> for DomainError {
    fn from(err: UpgradeError) -> Self {
        DomainError::new(err.code(), err.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user_id() -> UserId {
        UserId::new("user-test-123").unwrap()
    }

    // ============================================================
    // Codes
    // ============================================================

    #[test]
    fn conflict_maps_to_conflict_code() {
        let err = UpgradeError::conflict_active_upgrade(test_user_id());
        assert_eq!(err.code(), ErrorCode::ConflictActiveUpgrade);
    }

    #[test]
    fn both_not_found_variants_share_code() {
        assert_eq!(
            UpgradeError::not_found(UpgradeId::new()).code(),
            ErrorCode::UpgradeNotFound
        );
        assert_eq!(
            UpgradeError::not_found_for_gateway_ref("pidx-1").code(),
            ErrorCode::UpgradeNotFound
        );
    }

    #[test]
    fn gateway_error_keeps_gateway_code() {
        let err = UpgradeError::gateway(ErrorCode::GatewayUnreachable, "timeout");
        assert_eq!(err.code(), ErrorCode::GatewayUnreachable);
    }

    // ============================================================
    // Messages
    // ============================================================

    #[test]
    fn invalid_plan_transition_message_names_both_plans() {
        let msg = UpgradeError::invalid_plan_transition(Plan::Vantage, Plan::Pro).message();
        assert!(msg.contains("Vantage"));
        assert!(msg.contains("Pro"));
    }

    #[test]
    fn not_found_for_gateway_ref_message_includes_ref() {
        let msg = UpgradeError::not_found_for_gateway_ref("pidx-xyz").message();
        assert!(msg.contains("pidx-xyz"));
    }

    // ============================================================
    // Retryable
    // ============================================================

    #[test]
    fn unreachable_and_protocol_errors_are_retryable() {
        assert!(UpgradeError::gateway(ErrorCode::GatewayUnreachable, "x").is_retryable());
        assert!(UpgradeError::gateway(ErrorCode::GatewayProtocolError, "x").is_retryable());
    }

    #[test]
    fn rejected_and_client_errors_are_not_retryable() {
        assert!(!UpgradeError::gateway(ErrorCode::GatewayRejected, "x").is_retryable());
        assert!(!UpgradeError::conflict_active_upgrade(test_user_id()).is_retryable());
        assert!(!UpgradeError::missing_payment_reference().is_retryable());
    }

    // ============================================================
    // Conversions
    // ============================================================

    #[test]
    fn validation_error_converts_with_field() {
        let err: UpgradeError = ValidationError::empty_field("target_plan").into();
        assert!(matches!(
            err,
            UpgradeError::ValidationFailed { ref field, .. } if field == "target_plan"
        ));
    }

    #[test]
    fn database_domain_error_becomes_infrastructure() {
        let err: UpgradeError = DomainError::database("connection reset").into();
        assert!(matches!(err, UpgradeError::Infrastructure(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn state_domain_error_becomes_invalid_state() {
        let domain = DomainError::new(ErrorCode::InvalidStateTransition, "attach gateway ref")
            .with_detail("current", "completed");
        let err: UpgradeError = domain.into();
        assert_eq!(
            err,
            UpgradeError::invalid_state("completed", "attach gateway ref")
        );
    }

    #[test]
    fn conflict_domain_error_keeps_user() {
        let domain = DomainError::new(ErrorCode::ConflictActiveUpgrade, "active upgrade exists")
            .with_detail("user_id", "user-test-123");
        let err: UpgradeError = domain.into();
        assert_eq!(err, UpgradeError::conflict_active_upgrade(test_user_id()));
    }

    #[test]
    fn not_found_domain_error_keeps_id() {
        let id = UpgradeId::new();
        let domain = DomainError::new(ErrorCode::UpgradeNotFound, "missing")
            .with_detail("upgrade_id", id.to_string());
        let err: UpgradeError = domain.into();
        assert_eq!(err, UpgradeError::not_found(id));
    }

    #[test]
    fn converts_back_to_domain_error() {
        let domain: DomainError = UpgradeError::missing_payment_reference().into();
        assert_eq!(domain.code, ErrorCode::MissingPaymentReference);
    }
}
