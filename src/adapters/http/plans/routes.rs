//! Axum router configuration for plan upgrade endpoints.

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use super::handlers::{
    cancel_upgrade, initiate_upgrade, payment_callback, upgrade_history, verify_payment,
    PlansAppState,
};
use crate::adapters::http::middleware::{auth_middleware, AuthState};

/// Routes that act on behalf of a signed-in user.
///
/// # Routes
/// - `POST /initiate-upgrade` - Start an upgrade
/// - `POST /verify-payment` - Re-check a payment
/// - `POST /cancel-upgrade` - Cancel an in-flight upgrade
/// - `GET /upgrade-history` - List the caller's upgrades
pub fn plans_routes() -> Router<PlansAppState> {
    Router::new()
        .route("/initiate-upgrade", post(initiate_upgrade))
        .route("/verify-payment", post(verify_payment))
        .route("/cancel-upgrade", post(cancel_upgrade))
        .route("/upgrade-history", get(upgrade_history))
}

/// The Khalti return URL.
///
/// No user authentication: the browser arrives straight from Khalti and
/// the `pidx` is checked against the gateway.
pub fn callback_routes() -> Router<PlansAppState> {
    Router::new().route(
        "/payment-callback",
        get(payment_callback).post(payment_callback),
    )
}

/// Complete plans router, suitable for mounting at `/api/plans`.
pub fn plans_router(validator: AuthState) -> Router<PlansAppState> {
    Router::new()
        .merge(
            plans_routes()
                .route_layer(middleware::from_fn_with_state(validator, auth_middleware)),
        )
        .merge(callback_routes())
}
