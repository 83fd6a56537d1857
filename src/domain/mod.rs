//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, errors, state machine)
//! - `upgrade` - Plans, upgrade records and their lifecycle

pub mod foundation;
pub mod upgrade;
