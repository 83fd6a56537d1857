//! In-memory store adapters.
//!
//! Used by tests and by local runs without a database. Not suitable for
//! multi-process deployments.

mod upgrade_record_store;
mod user_plan_store;

pub use upgrade_record_store::InMemoryUpgradeRecordStore;
pub use user_plan_store::InMemoryUserPlanStore;
