//! HTTP handlers for plan upgrade endpoints.
//!
//! These handlers connect Axum routes to the upgrade command and query
//! handlers.

use std::sync::Arc;

use axum::extract::{Json, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::adapters::http::middleware::RequireAuth;
use crate::application::handlers::upgrade::{
    CancelUpgradeCommand, CancelUpgradeHandler, HandlePaymentCallbackHandler,
    ListUpgradeHistoryHandler, ListUpgradeHistoryQuery, PaymentCallback, RequestUpgradeCommand,
    RequestUpgradeHandler, RetryPolicy, UpgradeSettings, VerifyAndApplyHandler,
    VerifyPaymentCommand,
};
use crate::domain::foundation::{DomainError, ErrorCode, UpgradeId};
use crate::domain::upgrade::{Plan, UpgradeError, UpgradeStatus};
use crate::ports::{PaymentGateway, UpgradeRecordStore, UserPlanStore};

use super::dto::{
    CancelUpgradeRequest, CancelUpgradeResponse, ErrorResponse, HistoryParams,
    InitiateUpgradeRequest, InitiateUpgradeResponse, PaymentCallbackParams,
    PaymentOutcomeResponse, UpgradeHistoryResponse, VerifyPaymentRequest,
};

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared state for the plan endpoints.
///
/// Cloned per request; dependencies are Arc-wrapped.
#[derive(Clone)]
pub struct PlansAppState {
    pub records: Arc<dyn UpgradeRecordStore>,
    pub plans: Arc<dyn UserPlanStore>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub settings: UpgradeSettings,
    pub retry: RetryPolicy,
}

impl PlansAppState {
    pub fn new(
        records: Arc<dyn UpgradeRecordStore>,
        plans: Arc<dyn UserPlanStore>,
        gateway: Arc<dyn PaymentGateway>,
        settings: UpgradeSettings,
    ) -> Self {
        Self {
            records,
            plans,
            gateway,
            settings,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Create handlers on demand from the shared state.
    pub fn request_upgrade_handler(&self) -> RequestUpgradeHandler {
        RequestUpgradeHandler::new(
            self.records.clone(),
            self.plans.clone(),
            self.gateway.clone(),
            self.settings.clone(),
        )
        .with_retry_policy(self.retry)
    }

    pub fn verify_handler(&self) -> VerifyAndApplyHandler {
        VerifyAndApplyHandler::new(
            self.records.clone(),
            self.plans.clone(),
            self.gateway.clone(),
        )
        .with_retry_policy(self.retry)
    }

    pub fn callback_handler(&self) -> HandlePaymentCallbackHandler {
        HandlePaymentCallbackHandler::new(self.verify_handler())
    }

    pub fn cancel_handler(&self) -> CancelUpgradeHandler {
        CancelUpgradeHandler::new(self.records.clone())
    }

    pub fn history_handler(&self) -> ListUpgradeHistoryHandler {
        ListUpgradeHistoryHandler::new(self.records.clone())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Command Handlers (POST endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/plans/initiate-upgrade - Start an upgrade and get a payment URL
pub async fn initiate_upgrade(
    State(state): State<PlansAppState>,
    RequireAuth(user): RequireAuth,
    Json(request): Json<InitiateUpgradeRequest>,
) -> Result<impl IntoResponse, PlansApiError> {
    let target_plan = request
        .target_plan
        .parse::<Plan>()
        .map_err(UpgradeError::from)?;

    let result = state
        .request_upgrade_handler()
        .handle(RequestUpgradeCommand {
            user_id: user.id,
            target_plan,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(InitiateUpgradeResponse::from(result))))
}

/// POST /api/plans/verify-payment - Re-check a payment the caller started
pub async fn verify_payment(
    State(state): State<PlansAppState>,
    RequireAuth(user): RequireAuth,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<impl IntoResponse, PlansApiError> {
    let outcome = state
        .verify_handler()
        .handle(VerifyPaymentCommand {
            gateway_ref: request.gateway_ref,
            requested_by: Some(user.id),
        })
        .await?;

    Ok(Json(PaymentOutcomeResponse::from(outcome)))
}

/// POST /api/plans/cancel-upgrade - Abandon an in-flight upgrade
pub async fn cancel_upgrade(
    State(state): State<PlansAppState>,
    RequireAuth(user): RequireAuth,
    Json(request): Json<CancelUpgradeRequest>,
) -> Result<impl IntoResponse, PlansApiError> {
    let upgrade_id = request
        .upgrade_id
        .parse::<UpgradeId>()
        .map_err(|_| UpgradeError::validation("upgradeId", "Must be a UUID"))?;

    let outcome = state
        .cancel_handler()
        .handle(CancelUpgradeCommand {
            upgrade_id,
            user_id: user.id,
        })
        .await?;

    Ok(Json(CancelUpgradeResponse::from(outcome)))
}

/// GET|POST /api/plans/payment-callback - Khalti return redirect
///
/// Unauthenticated: the `pidx` is verified against the gateway, and the
/// rest of the query string is only advisory.
pub async fn payment_callback(
    State(state): State<PlansAppState>,
    Query(params): Query<PaymentCallbackParams>,
) -> Result<impl IntoResponse, PlansApiError> {
    let result = state
        .callback_handler()
        .handle(PaymentCallback {
            gateway_ref: params.pidx,
            status_hint: params.status,
            transaction_id: params.transaction_id,
            purchase_order_id: params.purchase_order_id,
        })
        .await?;

    Ok(Json(PaymentOutcomeResponse::from(result)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Query Handlers (GET endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// GET /api/plans/upgrade-history - The caller's upgrade attempts
pub async fn upgrade_history(
    State(state): State<PlansAppState>,
    RequireAuth(user): RequireAuth,
    Query(params): Query<HistoryParams>,
) -> Result<impl IntoResponse, PlansApiError> {
    let status = params
        .status
        .as_deref()
        .map(str::parse::<UpgradeStatus>)
        .transpose()
        .map_err(UpgradeError::from)?;

    let page = state
        .history_handler()
        .handle(ListUpgradeHistoryQuery {
            user_id: user.id,
            status,
            page: params.page,
            limit: params.limit,
        })
        .await?;

    Ok(Json(UpgradeHistoryResponse::from(page)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts upgrade errors to HTTP responses.
#[derive(Debug)]
pub struct PlansApiError(UpgradeError);

impl From<UpgradeError> for PlansApiError {
    fn from(err: UpgradeError) -> Self {
        Self(err)
    }
}

impl From<DomainError> for PlansApiError {
    fn from(err: DomainError) -> Self {
        Self(UpgradeError::from(err))
    }
}

impl PlansApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            UpgradeError::ValidationFailed { .. }
            | UpgradeError::InvalidPlanTransition { .. }
            | UpgradeError::MissingPaymentReference => StatusCode::BAD_REQUEST,
            UpgradeError::ConflictActiveUpgrade(_) => StatusCode::CONFLICT,
            UpgradeError::NotFound(_) | UpgradeError::NotFoundForGatewayRef(_) => {
                StatusCode::NOT_FOUND
            }
            UpgradeError::Gateway { code, .. } if *code == ErrorCode::GatewayUnreachable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            UpgradeError::Gateway { .. } => StatusCode::BAD_GATEWAY,
            UpgradeError::InvalidStateTransition { .. } | UpgradeError::Infrastructure(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for PlansApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();

        // Internal details stay in the logs
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "Plan request failed");
            "An internal error occurred".to_string()
        } else {
            self.0.message()
        };

        let body = ErrorResponse::new(self.0.code().to_string(), message);
        (status, Json(body)).into_response()
    }
}
