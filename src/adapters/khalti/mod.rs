//! Khalti payment gateway adapter.
//!
//! - `KhaltiGateway` talks to the ePayment v2 API over HTTPS
//! - `MockPaymentGateway` is a scriptable stand-in for tests
//!
//! Khalti does not sign callbacks; every verdict comes from a server-side
//! lookup.

mod khalti_gateway;
mod mock_payment_gateway;
mod wire_types;

pub use khalti_gateway::{KhaltiConfig, KhaltiGateway};
pub use mock_payment_gateway::{MethodCall, MockPaymentGateway};
pub use wire_types::parse_lookup_status;
