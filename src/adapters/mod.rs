//! Adapters - Implementations of port interfaces.
//!
//! - `auth` - JWT session validation
//! - `http` - Axum REST API
//! - `khalti` - Khalti ePayment gateway client
//! - `memory` - In-memory stores for tests and local runs
//! - `postgres` - PostgreSQL stores
//! - `sweeper` - Background expiry of stale upgrades

pub mod auth;
pub mod http;
pub mod khalti;
pub mod memory;
pub mod postgres;
pub mod sweeper;

pub use sweeper::ExpirySweeper;
