//! Foundation module - Shared domain primitives.
//!
//! Identifiers, timestamps, error types and the state machine trait used
//! by the upgrade domain.

mod auth;
mod errors;
mod ids;
mod state_machine;
mod timestamp;

pub use auth::{AuthError, AuthenticatedUser};
pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{UpgradeId, UserId};
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
