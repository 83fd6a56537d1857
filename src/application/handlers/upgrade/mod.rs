//! Plan upgrade command and query handlers.

mod cancel_upgrade;
mod expire_stale_upgrades;
mod handle_payment_callback;
mod list_upgrade_history;
mod request_upgrade;
mod verify_and_apply;

pub use cancel_upgrade::{CancelOutcome, CancelUpgradeCommand, CancelUpgradeHandler};
pub use expire_stale_upgrades::{ExpireStaleUpgradesHandler, SweepReport};
pub use handle_payment_callback::{
    CallbackResult, HandlePaymentCallbackHandler, PaymentCallback, PaymentOutcome,
};
pub use list_upgrade_history::{
    ListUpgradeHistoryHandler, ListUpgradeHistoryQuery, UpgradeHistoryPage, DEFAULT_PAGE_SIZE,
    MAX_PAGE_SIZE,
};
pub use request_upgrade::{
    RequestUpgradeCommand, RequestUpgradeHandler, RequestUpgradeResult, UpgradeSettings,
};
pub use verify_and_apply::{
    RetryPolicy, VerifyAndApplyHandler, VerifyOutcome, VerifyPaymentCommand,
};
