//! Application handlers.
//!
//! Command and query handlers that orchestrate domain operations.

pub mod upgrade;

pub use upgrade::{
    // Commands and Results
    CancelOutcome,
    CancelUpgradeCommand,
    RequestUpgradeCommand,
    RequestUpgradeResult,
    VerifyOutcome,
    VerifyPaymentCommand,
    // Queries
    ListUpgradeHistoryQuery,
    UpgradeHistoryPage,
    // Callback
    CallbackResult,
    PaymentCallback,
    PaymentOutcome,
    // Handlers
    CancelUpgradeHandler,
    ExpireStaleUpgradesHandler,
    HandlePaymentCallbackHandler,
    ListUpgradeHistoryHandler,
    RequestUpgradeHandler,
    VerifyAndApplyHandler,
    // Settings
    RetryPolicy,
    SweepReport,
    UpgradeSettings,
};
