//! Worksage - Plan upgrade and payment verification service
//!
//! Moves Worksage users from the Free plan to Pro or Vantage through Khalti
//! ePayment. Every upgrade is an `UpgradeRecord` whose status only ever moves
//! through compare-and-set transitions, so a payment is applied at most once
//! no matter how many callbacks, retries or sweeps observe it.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
