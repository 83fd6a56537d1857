//! Error types for the domain layer.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use thiserror::Error;

use super::{UpgradeId, UserId};

/// Errors that occur during value object construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Field '{field}' cannot be empty")]
    EmptyField { field: String },

    #[error("Field '{field}' must be between {min} and {max}, got {actual}")]
    OutOfRange {
        field: String,
        min: i64,
        max: i64,
        actual: i64,
    },

    #[error("Field '{field}' has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

impl ValidationError {
    /// Creates an empty field validation error.
    pub fn empty_field(field: impl Into<String>) -> Self {
        ValidationError::EmptyField { field: field.into() }
    }

    /// Creates an out of range validation error.
    pub fn out_of_range(field: impl Into<String>, min: i64, max: i64, actual: i64) -> Self {
        ValidationError::OutOfRange {
            field: field.into(),
            min,
            max,
            actual,
        }
    }

    /// Creates an invalid format validation error.
    pub fn invalid_format(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidFormat {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Error codes organized by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Validation errors
    ValidationFailed,
    InvalidPlanTransition,
    MissingPaymentReference,

    // Not found errors
    NotFound,
    UpgradeNotFound,

    // State errors
    ConflictActiveUpgrade,
    InvalidStateTransition,

    // Authorization errors
    Unauthorized,
    Forbidden,

    // Gateway errors
    GatewayUnreachable,
    GatewayRejected,
    GatewayProtocolError,

    // Infrastructure errors
    DatabaseError,
    InternalError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::ValidationFailed => "VALIDATION_FAILED",
            ErrorCode::InvalidPlanTransition => "INVALID_PLAN_TRANSITION",
            ErrorCode::MissingPaymentReference => "MISSING_PAYMENT_REFERENCE",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::UpgradeNotFound => "UPGRADE_NOT_FOUND",
            ErrorCode::ConflictActiveUpgrade => "CONFLICT_ACTIVE_UPGRADE",
            ErrorCode::InvalidStateTransition => "INVALID_STATE_TRANSITION",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::GatewayUnreachable => "GATEWAY_UNREACHABLE",
            ErrorCode::GatewayRejected => "GATEWAY_REJECTED",
            ErrorCode::GatewayProtocolError => "GATEWAY_PROTOCOL_ERROR",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        };
        write!(f, "{}", s)
    }
}

/// Standard domain error with code, message, and optional details.
#[derive(Debug, Clone)]
pub struct DomainError {
    pub code: ErrorCode,
    pub message: String,
    pub details: HashMap<String, String>,
}

impl DomainError {
    /// Creates a new domain error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: HashMap::new(),
        }
    }

    /// Creates a validation error for a specific field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message).with_detail("field", field.into())
    }

    /// Creates a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    /// No upgrade record with this id.
    pub fn upgrade_not_found(id: &UpgradeId) -> Self {
        Self::new(ErrorCode::UpgradeNotFound, format!("Upgrade not found: {}", id))
            .with_detail("upgrade_id", id.to_string())
    }

    /// The user already has a `Pending` or `Verifying` upgrade.
    pub fn active_upgrade_exists(user_id: &UserId) -> Self {
        Self::new(
            ErrorCode::ConflictActiveUpgrade,
            "User already has an active upgrade",
        )
        .with_detail("user_id", user_id.to_string())
    }

    /// A store precondition on the record's status did not hold.
    pub fn invalid_transition(current: &str, attempted: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidStateTransition, attempted).with_detail("current", current)
    }

    /// Adds a detail to the error.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl Error for DomainError {}
