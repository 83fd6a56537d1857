//! PostgreSQL adapters - Database implementations for persistence ports.
//!
//! - `PostgresUpgradeRecordStore` - Upgrade attempts; CAS via conditional UPDATE
//! - `PostgresUserPlanStore` - Current plan per user

mod upgrade_record_store;
mod user_plan_store;

pub use upgrade_record_store::PostgresUpgradeRecordStore;
pub use user_plan_store::PostgresUserPlanStore;
