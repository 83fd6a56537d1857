//! Khalti ePayment request and response bodies.
//!
//! These mirror the JSON the Khalti API sends and accepts. Conversion into
//! port types happens in the adapter.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ports::GatewayStatus;

// ════════════════════════════════════════════════════════════════════════════════
// Initiate
// ════════════════════════════════════════════════════════════════════════════════

/// Body of `POST /epayment/initiate/`.
#[derive(Debug, Clone, Serialize)]
pub struct KhaltiInitiateRequest {
    pub return_url: String,
    pub website_url: String,

    /// Amount in paisa.
    pub amount: i64,

    pub purchase_order_id: String,
    pub purchase_order_name: String,

    /// Extra fields. Khalti echoes keys starting with `merchant_` back on
    /// the return URL.
    #[serde(flatten)]
    pub merchant_extra: HashMap<String, String>,
}

/// Successful initiate response.
#[derive(Debug, Clone, Deserialize)]
pub struct KhaltiInitiateResponse {
    pub pidx: String,
    pub payment_url: String,

    /// RFC 3339 with Nepal offset, e.g. `2023-05-25T16:26:16.471649+05:45`.
    #[serde(default)]
    pub expires_at: Option<String>,

    /// Seconds until expiry.
    #[serde(default)]
    pub expires_in: Option<i64>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Lookup
// ════════════════════════════════════════════════════════════════════════════════

/// Body of `POST /epayment/lookup/`.
#[derive(Debug, Clone, Serialize)]
pub struct KhaltiLookupRequest<'a> {
    pub pidx: &'a str,
}

/// Lookup response. Khalti also answers expired and canceled sessions with
/// this shape, sometimes under a 4xx status.
#[derive(Debug, Clone, Deserialize)]
pub struct KhaltiLookupResponse {
    pub pidx: String,
    pub total_amount: i64,
    pub status: String,

    #[serde(default)]
    pub transaction_id: Option<String>,

    #[serde(default)]
    pub fee: Option<i64>,

    #[serde(default)]
    pub refunded: Option<bool>,
}

/// Maps Khalti's lookup status string. `None` means a status we do not know.
pub fn parse_lookup_status(status: &str) -> Option<GatewayStatus> {
    match status {
        "Completed" => Some(GatewayStatus::Completed),
        "Pending" | "Initiated" => Some(GatewayStatus::Pending),
        "Expired" => Some(GatewayStatus::Expired),
        "User canceled" => Some(GatewayStatus::UserCanceled),
        "Refunded" | "Partially Refunded" => Some(GatewayStatus::Refunded),
        _ => None,
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Errors
// ════════════════════════════════════════════════════════════════════════════════

/// Error body. Validation errors carry per-field arrays alongside these.
#[derive(Debug, Clone, Deserialize)]
pub struct KhaltiErrorResponse {
    #[serde(default)]
    pub detail: Option<String>,

    #[serde(default)]
    pub error_key: Option<String>,

    #[serde(flatten)]
    pub fields: HashMap<String, serde_json::Value>,
}

impl KhaltiErrorResponse {
    /// One-line summary for logs and error messages.
    pub fn summary(&self) -> String {
        if let Some(detail) = &self.detail {
            return detail.clone();
        }
        let mut parts: Vec<String> = self
            .fields
            .iter()
            .filter(|(key, _)| key.as_str() != "status_code")
            .map(|(key, value)| match value {
                serde_json::Value::Array(items) => {
                    let joined: Vec<String> = items
                        .iter()
                        .map(|item| item.as_str().map(str::to_string).unwrap_or_else(|| item.to_string()))
                        .collect();
                    format!("{}: {}", key, joined.join(", "))
                }
                other => format!("{}: {}", key, other),
            })
            .collect();
        parts.sort();
        if parts.is_empty() {
            "request rejected".to_string()
        } else {
            parts.join("; ")
        }
    }
}
