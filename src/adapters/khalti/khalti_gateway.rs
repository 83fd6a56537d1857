//! Khalti ePayment gateway adapter.
//!
//! Implements `PaymentGateway` against Khalti's ePayment v2 API:
//!
//! - `POST {base}/epayment/initiate/` opens a session and returns `pidx`
//! - `POST {base}/epayment/lookup/` reports the session's status
//!
//! Every request carries `Authorization: Key <secret>` and the client-wide
//! timeout. Timeouts and connection failures map to `GatewayUnreachable`;
//! nothing is retried here.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};

use crate::domain::foundation::Timestamp;
use crate::ports::{
    InitiatePaymentRequest, InitiatedPayment, PaymentError, PaymentErrorCode, PaymentGateway,
    PaymentLookup,
};

use super::wire_types::{
    parse_lookup_status, KhaltiErrorResponse, KhaltiInitiateRequest, KhaltiInitiateResponse,
    KhaltiLookupRequest, KhaltiLookupResponse,
};

/// Khalti API configuration.
#[derive(Clone)]
pub struct KhaltiConfig {
    /// Live or test secret key.
    secret_key: SecretString,

    /// API root, e.g. `https://khalti.com/api/v2`.
    base_url: String,

    /// Per-request timeout.
    timeout: Duration,
}

impl KhaltiConfig {
    pub fn new(secret_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            secret_key: SecretString::new(secret_key.into()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn authorization(&self) -> String {
        format!("Key {}", self.secret_key.expose_secret())
    }
}

impl std::fmt::Debug for KhaltiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KhaltiConfig")
            .field("secret_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Khalti payment gateway adapter.
pub struct KhaltiGateway {
    config: KhaltiConfig,
    client: Client,
}

impl KhaltiGateway {
    /// Builds the adapter and its HTTP client.
    pub fn new(config: KhaltiConfig) -> Result<Self, PaymentError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PaymentError::unreachable(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn initiate_url(&self) -> String {
        format!("{}/epayment/initiate/", self.config.base_url)
    }

    fn lookup_url(&self) -> String {
        format!("{}/epayment/lookup/", self.config.base_url)
    }

    fn map_send_error(&self, operation: &str, e: reqwest::Error) -> PaymentError {
        if e.is_timeout() {
            tracing::warn!(
                operation,
                timeout_secs = self.config.timeout.as_secs(),
                "Khalti request timed out"
            );
            PaymentError::unreachable(format!(
                "Khalti {} timed out after {}s",
                operation,
                self.config.timeout.as_secs()
            ))
        } else if e.is_connect() {
            tracing::warn!(operation, error = %e, "Khalti connection failed");
            PaymentError::unreachable(format!("Connection failed: {}", e))
        } else {
            tracing::warn!(operation, error = %e, "Khalti request failed");
            PaymentError::unreachable(e.to_string())
        }
    }

    /// Sends a JSON POST and returns the status code and body text.
    async fn post<B: serde::Serialize + Sync>(
        &self,
        operation: &str,
        url: String,
        body: &B,
    ) -> Result<(StatusCode, String), PaymentError> {
        let response = self
            .client
            .post(url)
            .header(reqwest::header::AUTHORIZATION, self.config.authorization())
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_send_error(operation, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.map_send_error(operation, e))?;
        Ok((status, text))
    }
}

#[async_trait]
impl PaymentGateway for KhaltiGateway {
    async fn initiate(
        &self,
        request: InitiatePaymentRequest,
    ) -> Result<InitiatedPayment, PaymentError> {
        let body = KhaltiInitiateRequest {
            return_url: request.return_url,
            website_url: request.website_url,
            amount: request.amount,
            purchase_order_id: request.purchase_order_id.clone(),
            purchase_order_name: request.purchase_order_name,
            merchant_extra: request
                .metadata
                .into_iter()
                .map(|(key, value)| (format!("merchant_{}", key), value))
                .collect(),
        };

        let (status, text) = self.post("initiate", self.initiate_url(), &body).await?;
        let result = interpret_initiate(status, &text, Timestamp::now());

        match &result {
            Ok(initiated) => tracing::info!(
                purchase_order_id = %request.purchase_order_id,
                pidx = %initiated.gateway_ref,
                "Khalti payment initiated"
            ),
            Err(e) => tracing::warn!(
                purchase_order_id = %request.purchase_order_id,
                http_status = status.as_u16(),
                error = %e,
                "Khalti initiate failed"
            ),
        }
        result
    }

    async fn lookup(&self, gateway_ref: &str) -> Result<PaymentLookup, PaymentError> {
        let body = KhaltiLookupRequest { pidx: gateway_ref };
        let (status, text) = self.post("lookup", self.lookup_url(), &body).await?;
        let result = interpret_lookup(status, &text);

        if let Err(e) = &result {
            tracing::warn!(
                pidx = %gateway_ref,
                http_status = status.as_u16(),
                error = %e,
                "Khalti lookup failed"
            );
        }
        result
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Response interpretation
// ════════════════════════════════════════════════════════════════════════════════

/// Classifies a non-success response that is not a usable payload.
fn classify_error(status: StatusCode, text: &str) -> PaymentError {
    if status.is_server_error() {
        return PaymentError::unreachable(format!("Khalti returned {}", status.as_u16()));
    }
    match serde_json::from_str::<KhaltiErrorResponse>(text) {
        Ok(error) if status.is_client_error() => {
            let mut err = PaymentError::rejected(error.summary());
            if let Some(key) = error.error_key {
                err = err.with_provider_code(key);
            }
            err
        }
        _ => PaymentError::protocol(format!(
            "Unexpected Khalti response ({}): {}",
            status.as_u16(),
            truncate(text, 200)
        )),
    }
}

fn interpret_initiate(
    status: StatusCode,
    text: &str,
    now: Timestamp,
) -> Result<InitiatedPayment, PaymentError> {
    if !status.is_success() {
        return Err(classify_error(status, text));
    }

    let parsed: KhaltiInitiateResponse = serde_json::from_str(text)
        .map_err(|e| PaymentError::protocol(format!("Failed to parse initiate response: {}", e)))?;

    let expires_at = match parsed
        .expires_at
        .as_deref()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
    {
        Some(dt) => Timestamp::from_datetime(dt.with_timezone(&Utc)),
        None => {
            let secs = parsed
                .expires_in
                .ok_or_else(|| PaymentError::protocol("Initiate response carries no expiry"))?;
            now.checked_plus_secs(secs).ok_or_else(|| {
                PaymentError::protocol(format!("Initiate expires_in out of range: {}", secs))
            })?
        }
    };

    if parsed.pidx.trim().is_empty() || parsed.payment_url.trim().is_empty() {
        return Err(PaymentError::protocol("Initiate response missing pidx or payment_url"));
    }

    Ok(InitiatedPayment {
        gateway_ref: parsed.pidx,
        payment_url: parsed.payment_url,
        expires_at,
    })
}

fn interpret_lookup(status: StatusCode, text: &str) -> Result<PaymentLookup, PaymentError> {
    // Khalti answers expired/canceled sessions with a lookup body under 400,
    // so try the payload first regardless of status.
    let raw: Option<serde_json::Value> = serde_json::from_str(text).ok();
    let parsed = raw
        .as_ref()
        .and_then(|value| serde_json::from_value::<KhaltiLookupResponse>(value.clone()).ok());

    match (parsed, raw) {
        (Some(lookup), Some(raw)) if !status.is_server_error() => {
            let gateway_status = parse_lookup_status(&lookup.status).ok_or_else(|| {
                PaymentError::protocol(format!("Unknown Khalti status '{}'", lookup.status))
            })?;
            Ok(PaymentLookup {
                gateway_status,
                amount: lookup.total_amount,
                raw_response: raw,
            })
        }
        _ if status.is_success() => Err(PaymentError::protocol(format!(
            "Failed to parse lookup response: {}",
            truncate(text, 200)
        ))),
        _ => {
            let err = classify_error(status, text);
            if status == StatusCode::NOT_FOUND && err.code == PaymentErrorCode::GatewayRejected {
                Err(PaymentError {
                    unknown_reference: true,
                    ..err
                })
            } else {
                Err(err)
            }
        }
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::GatewayStatus;

    // ════════════════════════════════════════════════════════════════════════════
    // Initiate
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn initiate_success_parses_nepal_offset_expiry() {
        let body = r#"{
            "pidx": "bZQLD9wRVWo4CdESSfuSsB",
            "payment_url": "https://test-pay.khalti.com/?pidx=bZQLD9wRVWo4CdESSfuSsB",
            "expires_at": "2023-05-25T16:26:16.471649+05:45",
            "expires_in": 1800
        }"#;

        let initiated = interpret_initiate(StatusCode::OK, body, Timestamp::now()).unwrap();

        assert_eq!(initiated.gateway_ref, "bZQLD9wRVWo4CdESSfuSsB");
        assert!(initiated.payment_url.contains("pidx="));
        assert_eq!(
            initiated.expires_at.to_rfc3339(),
            "2023-05-25T10:41:16.471649+00:00"
        );
    }

    #[test]
    fn initiate_falls_back_to_expires_in() {
        let now = Timestamp::now();
        let body = r#"{"pidx":"p1","payment_url":"https://pay/p1","expires_in":1800}"#;

        let initiated = interpret_initiate(StatusCode::OK, body, now).unwrap();

        assert_eq!(initiated.expires_at, now.checked_plus_secs(1800).unwrap());
    }

    #[test]
    fn initiate_huge_expires_in_is_protocol_error() {
        let body = r#"{"pidx":"p1","payment_url":"https://pay/p1","expires_in":9000000000000000000}"#;

        let err = interpret_initiate(StatusCode::OK, body, Timestamp::now()).unwrap_err();

        assert_eq!(err.code, PaymentErrorCode::GatewayProtocolError);
        assert!(err.message.contains("out of range"));
    }

    #[test]
    fn initiate_without_any_expiry_is_protocol_error() {
        let body = r#"{"pidx":"p1","payment_url":"https://pay/p1"}"#;

        let err = interpret_initiate(StatusCode::OK, body, Timestamp::now()).unwrap_err();

        assert_eq!(err.code, PaymentErrorCode::GatewayProtocolError);
    }

    #[test]
    fn initiate_validation_error_is_rejected() {
        let body = r#"{"amount":["Amount should be greater than Rs. 10, that is 1000 paisa."],"error_key":"validation_error"}"#;

        let err = interpret_initiate(StatusCode::BAD_REQUEST, body, Timestamp::now()).unwrap_err();

        assert_eq!(err.code, PaymentErrorCode::GatewayRejected);
        assert_eq!(err.provider_code.as_deref(), Some("validation_error"));
        assert!(!err.retryable);
    }

    #[test]
    fn initiate_bad_key_is_rejected() {
        let body = r#"{"detail":"Invalid token.","status_code":401}"#;

        let err = interpret_initiate(StatusCode::UNAUTHORIZED, body, Timestamp::now()).unwrap_err();

        assert_eq!(err.code, PaymentErrorCode::GatewayRejected);
        assert_eq!(err.message, "Invalid token.");
    }

    #[test]
    fn initiate_html_error_page_is_protocol_error() {
        let err = interpret_initiate(StatusCode::BAD_REQUEST, "<html>oops</html>", Timestamp::now())
            .unwrap_err();
        assert_eq!(err.code, PaymentErrorCode::GatewayProtocolError);
    }

    #[test]
    fn initiate_server_error_is_unreachable() {
        let err = interpret_initiate(StatusCode::BAD_GATEWAY, "", Timestamp::now()).unwrap_err();
        assert_eq!(err.code, PaymentErrorCode::GatewayUnreachable);
        assert!(err.retryable);
    }

    #[test]
    fn initiate_garbage_success_body_is_protocol_error() {
        let err = interpret_initiate(StatusCode::OK, "{}", Timestamp::now()).unwrap_err();
        assert_eq!(err.code, PaymentErrorCode::GatewayProtocolError);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Lookup
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn lookup_completed() {
        let body = r#"{"pidx":"p1","total_amount":300000,"status":"Completed","transaction_id":"GFq9PFS7b2iYvL8Lir9oXe","fee":0,"refunded":false}"#;

        let lookup = interpret_lookup(StatusCode::OK, body).unwrap();

        assert_eq!(lookup.gateway_status, GatewayStatus::Completed);
        assert_eq!(lookup.amount, 300_000);
        assert_eq!(lookup.raw_response["transaction_id"], "GFq9PFS7b2iYvL8Lir9oXe");
    }

    #[test]
    fn lookup_expired_under_400_is_still_a_lookup() {
        let body = r#"{"pidx":"p1","total_amount":300000,"status":"Expired","transaction_id":null,"fee":0,"refunded":false}"#;

        let lookup = interpret_lookup(StatusCode::BAD_REQUEST, body).unwrap();

        assert_eq!(lookup.gateway_status, GatewayStatus::Expired);
    }

    #[test]
    fn lookup_unknown_status_is_protocol_error() {
        let body = r#"{"pidx":"p1","total_amount":300000,"status":"Ambiguous"}"#;

        let err = interpret_lookup(StatusCode::OK, body).unwrap_err();

        assert_eq!(err.code, PaymentErrorCode::GatewayProtocolError);
    }

    #[test]
    fn lookup_not_found_is_rejected() {
        let body = r#"{"detail":"Not found.","error_key":"validation_error"}"#;

        let err = interpret_lookup(StatusCode::NOT_FOUND, body).unwrap_err();

        assert_eq!(err.code, PaymentErrorCode::GatewayRejected);
        assert!(err.unknown_reference);
    }

    #[test]
    fn lookup_bad_key_is_not_an_unknown_reference() {
        let body = r#"{"detail":"Invalid token.","status_code":401}"#;

        let err = interpret_lookup(StatusCode::UNAUTHORIZED, body).unwrap_err();

        assert_eq!(err.code, PaymentErrorCode::GatewayRejected);
        assert!(!err.unknown_reference);
    }

    #[test]
    fn lookup_server_error_is_unreachable() {
        let err = interpret_lookup(StatusCode::SERVICE_UNAVAILABLE, "busy").unwrap_err();
        assert_eq!(err.code, PaymentErrorCode::GatewayUnreachable);
    }

    #[test]
    fn lookup_unparsable_success_is_protocol_error() {
        let err = interpret_lookup(StatusCode::OK, "not json").unwrap_err();
        assert_eq!(err.code, PaymentErrorCode::GatewayProtocolError);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Config
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn config_debug_redacts_secret() {
        let config = KhaltiConfig::new("live_secret_key_abc", "https://khalti.com/api/v2/");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("live_secret_key_abc"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn urls_are_built_without_double_slash() {
        let gateway =
            KhaltiGateway::new(KhaltiConfig::new("k", "https://dev.khalti.com/api/v2/")).unwrap();
        assert_eq!(gateway.initiate_url(), "https://dev.khalti.com/api/v2/epayment/initiate/");
        assert_eq!(gateway.lookup_url(), "https://dev.khalti.com/api/v2/epayment/lookup/");
    }

    #[test]
    fn authorization_header_uses_key_scheme() {
        let config = KhaltiConfig::new("test_secret", "https://dev.khalti.com/api/v2");
        assert_eq!(config.authorization(), "Key test_secret");
    }
}
