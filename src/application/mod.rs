//! Application layer - Commands, Queries, and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Command handlers own every status change; query handlers only read.

pub mod handlers;

pub use handlers::{
    CancelUpgradeCommand, CancelUpgradeHandler, ExpireStaleUpgradesHandler,
    HandlePaymentCallbackHandler, ListUpgradeHistoryHandler, ListUpgradeHistoryQuery,
    PaymentCallback, PaymentOutcome, RequestUpgradeCommand, RequestUpgradeHandler, RetryPolicy,
    UpgradeSettings, VerifyAndApplyHandler, VerifyPaymentCommand,
};
