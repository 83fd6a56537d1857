//! Plan upgrade domain module.
//!
//! # Module Structure
//!
//! - `plan` - Plan levels and their ordering
//! - `price_table` - Paid plan prices in paisa
//! - `status` - UpgradeStatus state machine
//! - `record` - UpgradeRecord entity and its creation/transition inputs
//! - `failure_reason` - Why an attempt ended without applying the plan
//! - `errors` - UpgradeError

mod errors;
mod failure_reason;
mod plan;
mod price_table;
mod record;
mod status;

pub use errors::UpgradeError;
pub use failure_reason::FailureReason;
pub use plan::Plan;
pub use price_table::PlanPriceTable;
pub use record::{NewUpgradeRecord, TransitionExtra, UpgradeRecord};
pub use status::UpgradeStatus;
