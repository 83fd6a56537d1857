//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Payment
//!
//! - `PaymentGateway` - Hosted checkout gateway (initiate + lookup)
//!
//! ## Persistence
//!
//! - `UpgradeRecordStore` - Upgrade attempts with CAS status transitions
//! - `UserPlanStore` - The user's current plan
//!
//! ## Auth
//!
//! - `SessionValidator` - Bearer token validation

mod payment_gateway;
mod session_validator;
mod upgrade_record_store;
mod user_plan_store;

pub use payment_gateway::{
    GatewayStatus, InitiatePaymentRequest, InitiatedPayment, PaymentError, PaymentErrorCode,
    PaymentGateway, PaymentLookup,
};
pub use session_validator::SessionValidator;
pub use upgrade_record_store::{HistoryFilter, UpgradePage, UpgradeRecordStore};
pub use user_plan_store::UserPlanStore;
