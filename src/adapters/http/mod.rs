//! HTTP adapters - REST API implementations.
//!
//! `api_router` assembles the whole public surface under `/api`, with
//! tracing, timeout and CORS layers applied once at the top.

pub mod health;
pub mod middleware;
pub mod plans;

use axum::extract::Request;
use axum::http::{header, HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;

pub use middleware::AuthState;
pub use plans::{plans_router, PlansAppState};

/// Build the application router.
///
/// # Routes
/// - `/api/plans/*` - Plan upgrades
/// - `GET /api/health` - Liveness
pub fn api_router(state: PlansAppState, validator: AuthState, server: &ServerConfig) -> Router {
    Router::new()
        .nest("/api/plans", plans_router(validator))
        .route("/api/health", get(health::health_check))
        .fallback(health::not_found)
        .with_state(state)
        .layer(TimeoutLayer::new(server.request_timeout()))
        .layer(cors_layer(server))
        .layer(
            // Path only: the query string carries payment references
            TraceLayer::new_for_http().make_span_with(|request: &Request| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    user_id = tracing::field::Empty,
                )
            }),
        )
}

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = server
        .cors_origins_list()
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(allow_origin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::adapters::auth::MockSessionValidator;
    use crate::adapters::khalti::MockPaymentGateway;
    use crate::adapters::memory::{InMemoryUpgradeRecordStore, InMemoryUserPlanStore};
    use crate::application::handlers::upgrade::{RetryPolicy, UpgradeSettings};
    use crate::domain::foundation::UserId;
    use crate::domain::upgrade::Plan;
    use crate::ports::{GatewayStatus, UserPlanStore};

    // ════════════════════════════════════════════════════════════════════════════
    // Test Fixtures
    // ════════════════════════════════════════════════════════════════════════════

    const PRO_PRICE: i64 = 300_000;

    struct Fixture {
        plans: Arc<InMemoryUserPlanStore>,
        gateway: Arc<MockPaymentGateway>,
        app: Router,
    }

    impl Fixture {
        fn new() -> Self {
            let records = Arc::new(InMemoryUpgradeRecordStore::new());
            let plans = Arc::new(InMemoryUserPlanStore::new());
            let gateway = Arc::new(MockPaymentGateway::new());
            let validator: AuthState = Arc::new(
                MockSessionValidator::new()
                    .with_test_user("alice-token", "alice")
                    .with_test_user("bob-token", "bob"),
            );

            let state = PlansAppState::new(
                records,
                plans.clone(),
                gateway.clone(),
                UpgradeSettings::default(),
            )
            .with_retry_policy(RetryPolicy::none());

            let app = api_router(state, validator, &ServerConfig::default());
            Self {
                plans,
                gateway,
                app,
            }
        }

        async fn send(
            &self,
            method: &str,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut builder = HttpRequest::builder().method(method).uri(uri);
            if let Some(token) = token {
                builder = builder.header("Authorization", format!("Bearer {}", token));
            }
            let request = match body {
                Some(body) => builder
                    .header("Content-Type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };

            let response = self.app.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let json = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap_or(Value::Null)
            };
            (status, json)
        }

        async fn initiate(&self, token: &str, plan: &str) -> (StatusCode, Value) {
            self.send(
                "POST",
                "/api/plans/initiate-upgrade",
                Some(token),
                Some(json!({ "targetPlan": plan })),
            )
            .await
        }

        /// Starts an upgrade for alice and returns (upgradeId, pidx).
        async fn started_upgrade(&self) -> (String, String) {
            let (status, body) = self.initiate("alice-token", "pro").await;
            assert_eq!(status, StatusCode::CREATED);
            let upgrade_id = body["upgradeId"].as_str().unwrap().to_string();
            let pidx = body["paymentUrl"]
                .as_str()
                .unwrap()
                .rsplit("pidx=")
                .next()
                .unwrap()
                .to_string();
            (upgrade_id, pidx)
        }
    }

    fn alice() -> UserId {
        UserId::new("alice").unwrap()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Health and Routing
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn health_returns_ok() {
        let fixture = Fixture::new();
        let (status, body) = fixture.send("GET", "/api/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn unknown_route_returns_404_json() {
        let fixture = Fixture::new();
        let (status, body) = fixture.send("GET", "/api/nope", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["errorCode"], "NOT_FOUND");
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Initiate Upgrade
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn initiate_requires_auth() {
        let fixture = Fixture::new();
        let (status, body) = fixture
            .send(
                "POST",
                "/api/plans/initiate-upgrade",
                None,
                Some(json!({ "targetPlan": "pro" })),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["errorCode"], "UNAUTHORIZED");
        assert_eq!(fixture.gateway.call_count("initiate"), 0);
    }

    #[tokio::test]
    async fn initiate_returns_201_with_payment_url() {
        let fixture = Fixture::new();
        let (status, body) = fixture.initiate("alice-token", "pro").await;

        assert_eq!(status, StatusCode::CREATED);
        assert!(body["upgradeId"].is_string());
        assert!(body["paymentUrl"]
            .as_str()
            .unwrap()
            .starts_with("https://test-pay.khalti.com/"));
        assert!(body["expiresAt"].is_string());
    }

    #[tokio::test]
    async fn initiate_rejects_unknown_plan() {
        let fixture = Fixture::new();
        let (status, body) = fixture.initiate("alice-token", "platinum").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errorCode"], "VALIDATION_FAILED");
    }

    #[tokio::test]
    async fn initiate_rejects_non_upgrade() {
        let fixture = Fixture::new();
        fixture.plans.set_plan(&alice(), Plan::Vantage).await;

        let (status, body) = fixture.initiate("alice-token", "pro").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errorCode"], "INVALID_PLAN_TRANSITION");
    }

    #[tokio::test]
    async fn second_initiate_conflicts() {
        let fixture = Fixture::new();
        fixture.started_upgrade().await;

        let (status, body) = fixture.initiate("alice-token", "vantage").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["errorCode"], "CONFLICT_ACTIVE_UPGRADE");
    }

    #[tokio::test]
    async fn gateway_outage_returns_503() {
        let fixture = Fixture::new();
        fixture.gateway.set_method_error(
            "initiate",
            crate::ports::PaymentError::unreachable("connect timeout"),
        );

        let (status, body) = fixture.initiate("alice-token", "pro").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["errorCode"], "GATEWAY_UNREACHABLE");
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Payment Callback
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn callback_without_pidx_is_400() {
        let fixture = Fixture::new();
        let (status, body) = fixture
            .send("GET", "/api/plans/payment-callback?status=Completed", None, None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errorCode"], "MISSING_PAYMENT_REFERENCE");
    }

    #[tokio::test]
    async fn callback_for_unknown_pidx_is_404() {
        let fixture = Fixture::new();
        let (status, _) = fixture
            .send("GET", "/api/plans/payment-callback?pidx=ghost", None, None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn completed_callback_upgrades_user_without_auth() {
        let fixture = Fixture::new();
        let (upgrade_id, pidx) = fixture.started_upgrade().await;
        fixture.gateway.complete(&pidx, PRO_PRICE);

        let uri = format!(
            "/api/plans/payment-callback?pidx={}&status=Completed&transaction_id=txn-1",
            pidx
        );
        let (status, body) = fixture.send("GET", &uri, None, None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "success");
        assert_eq!(body["upgradeId"], upgrade_id.as_str());
        assert_eq!(body["plan"], "pro");
        assert_eq!(
            fixture.plans.current_plan(&alice()).await.unwrap(),
            Plan::Pro
        );
    }

    #[tokio::test]
    async fn callback_accepts_post() {
        let fixture = Fixture::new();
        let (_, pidx) = fixture.started_upgrade().await;
        fixture.gateway.set_lookup(&pidx, GatewayStatus::Pending, PRO_PRICE);

        let uri = format!("/api/plans/payment-callback?pidx={}", pidx);
        let (status, body) = fixture.send("POST", &uri, None, None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "pending-retry");
        assert!(body.get("plan").is_none());
    }

    #[tokio::test]
    async fn callback_ignores_forged_status_hint() {
        let fixture = Fixture::new();
        let (_, pidx) = fixture.started_upgrade().await;
        fixture.gateway.set_lookup(&pidx, GatewayStatus::Pending, PRO_PRICE);

        let uri = format!("/api/plans/payment-callback?pidx={}&status=Completed", pidx);
        let (_, body) = fixture.send("GET", &uri, None, None).await;

        assert_eq!(body["outcome"], "pending-retry");
        assert_eq!(
            fixture.plans.current_plan(&alice()).await.unwrap(),
            Plan::Free
        );
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Verify, Cancel, History
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn verify_by_another_user_is_404() {
        let fixture = Fixture::new();
        let (_, pidx) = fixture.started_upgrade().await;
        fixture.gateway.complete(&pidx, PRO_PRICE);

        let (status, _) = fixture
            .send(
                "POST",
                "/api/plans/verify-payment",
                Some("bob-token"),
                Some(json!({ "gatewayRef": pidx })),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(fixture.gateway.call_count("lookup"), 0);
    }

    #[tokio::test]
    async fn verify_by_owner_applies_upgrade() {
        let fixture = Fixture::new();
        let (_, pidx) = fixture.started_upgrade().await;
        fixture.gateway.complete(&pidx, PRO_PRICE);

        let (status, body) = fixture
            .send(
                "POST",
                "/api/plans/verify-payment",
                Some("alice-token"),
                Some(json!({ "gatewayRef": pidx })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "success");
        assert_eq!(fixture.plans.applied_count(&alice()).await, 1);
    }

    #[tokio::test]
    async fn cancel_with_malformed_id_is_400() {
        let fixture = Fixture::new();
        let (status, body) = fixture
            .send(
                "POST",
                "/api/plans/cancel-upgrade",
                Some("alice-token"),
                Some(json!({ "upgradeId": "not-a-uuid" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errorCode"], "VALIDATION_FAILED");
    }

    #[tokio::test]
    async fn cancel_then_history_shows_cancelled() {
        let fixture = Fixture::new();
        let (upgrade_id, _) = fixture.started_upgrade().await;

        let (status, body) = fixture
            .send(
                "POST",
                "/api/plans/cancel-upgrade",
                Some("alice-token"),
                Some(json!({ "upgradeId": upgrade_id })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cancelled"], true);
        assert_eq!(body["status"], "cancelled");

        let (status, body) = fixture
            .send(
                "GET",
                "/api/plans/upgrade-history?status=cancelled",
                Some("alice-token"),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["page"], 1);
        assert_eq!(body["limit"], 10);
        assert_eq!(body["hasMore"], false);
        assert_eq!(body["items"][0]["id"], upgrade_id.as_str());
    }

    #[tokio::test]
    async fn history_rejects_unknown_status() {
        let fixture = Fixture::new();
        let (status, _) = fixture
            .send(
                "GET",
                "/api/plans/upgrade-history?status=bogus",
                Some("alice-token"),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn history_is_scoped_to_caller() {
        let fixture = Fixture::new();
        fixture.started_upgrade().await;

        let (_, body) = fixture
            .send("GET", "/api/plans/upgrade-history", Some("bob-token"), None)
            .await;
        assert_eq!(body["total"], 0);
        assert_eq!(body["items"], json!([]));
    }
}
