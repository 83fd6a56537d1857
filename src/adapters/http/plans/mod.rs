//! HTTP adapter for plan upgrades.
//!
//! - `POST /api/plans/initiate-upgrade` - Start an upgrade, get a payment URL
//! - `GET|POST /api/plans/payment-callback` - Khalti return URL
//! - `POST /api/plans/verify-payment` - Re-check a payment
//! - `POST /api/plans/cancel-upgrade` - Cancel an in-flight upgrade
//! - `GET /api/plans/upgrade-history` - Paginated upgrade history

pub mod dto;
pub mod handlers;
pub mod routes;

pub use handlers::{PlansApiError, PlansAppState};
pub use routes::plans_router;
