//! Scriptable payment gateway for tests and local development.
//!
//! Supports:
//! - Sticky lookup responses per `pidx`, plus queued one-shot responses
//! - Error injection (next call, or every call to one method)
//! - Call tracking

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::domain::foundation::Timestamp;
use crate::ports::{
    GatewayStatus, InitiatePaymentRequest, InitiatedPayment, PaymentError, PaymentGateway,
    PaymentLookup,
};

/// Mock payment gateway.
///
/// ```ignore
/// let gateway = MockPaymentGateway::new();
/// let initiated = gateway.initiate(request).await?;
/// gateway.complete(&initiated.gateway_ref, 300_000);
/// gateway.set_method_error("lookup", PaymentError::unreachable("timeout"));
/// ```
#[derive(Default, Clone)]
pub struct MockPaymentGateway {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    /// Sequence for generated pidx values.
    next_id: u64,

    /// Next initiate result, overriding the generated one.
    next_initiate: Option<InitiatedPayment>,

    /// Sticky lookup results by pidx.
    lookups: HashMap<String, PaymentLookup>,

    /// One-shot results consumed before the sticky one.
    queued: HashMap<String, VecDeque<Result<PaymentLookup, PaymentError>>>,

    /// Error to return on next call (consumed).
    next_error: Option<PaymentError>,

    /// Errors returned on every call to a method.
    method_errors: HashMap<String, PaymentError>,

    call_log: Vec<MethodCall>,
}

/// Recorded method call for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodCall {
    pub method: String,
    pub args: Vec<String>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Methods
    // ════════════════════════════════════════════════════════════════════════════

    /// Result for the next `initiate` call.
    pub fn set_initiate_response(&self, initiated: InitiatedPayment) {
        self.state().next_initiate = Some(initiated);
    }

    /// Sticky lookup result for `pidx`.
    pub fn set_lookup(&self, pidx: &str, status: GatewayStatus, amount: i64) {
        let lookup = PaymentLookup {
            gateway_status: status,
            amount,
            raw_response: serde_json::json!({
                "pidx": pidx,
                "total_amount": amount,
                "status": format!("{:?}", status),
            }),
        };
        self.state().lookups.insert(pidx.to_string(), lookup);
    }

    /// Shorthand for a completed payment of `amount`.
    pub fn complete(&self, pidx: &str, amount: i64) {
        self.set_lookup(pidx, GatewayStatus::Completed, amount);
    }

    /// Queues a one-shot lookup result for `pidx`.
    pub fn push_lookup_result(&self, pidx: &str, result: Result<PaymentLookup, PaymentError>) {
        self.state()
            .queued
            .entry(pidx.to_string())
            .or_default()
            .push_back(result);
    }

    /// Set an error to return on the next call to any method.
    pub fn set_error(&self, error: PaymentError) {
        self.state().next_error = Some(error);
    }

    /// Set an error for every call to a specific method.
    pub fn set_method_error(&self, method: &str, error: PaymentError) {
        self.state().method_errors.insert(method.to_string(), error);
    }

    pub fn clear_errors(&self) {
        let mut state = self.state();
        state.next_error = None;
        state.method_errors.clear();
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Call Tracking
    // ════════════════════════════════════════════════════════════════════════════

    pub fn calls(&self) -> Vec<MethodCall> {
        self.state().call_log.clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state()
            .call_log
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    fn record_call(&self, method: &str, args: Vec<String>) {
        self.state().call_log.push(MethodCall {
            method: method.to_string(),
            args,
        });
    }

    fn check_error(&self, method: &str) -> Result<(), PaymentError> {
        let mut state = self.state();

        if let Some(error) = state.method_errors.get(method) {
            return Err(error.clone());
        }
        if let Some(error) = state.next_error.take() {
            return Err(error);
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn initiate(
        &self,
        request: InitiatePaymentRequest,
    ) -> Result<InitiatedPayment, PaymentError> {
        self.record_call(
            "initiate",
            vec![request.purchase_order_id.clone(), request.amount.to_string()],
        );
        self.check_error("initiate")?;

        let mut state = self.state();
        if let Some(initiated) = state.next_initiate.take() {
            return Ok(initiated);
        }

        state.next_id += 1;
        let pidx = format!("pidx_mock_{}", state.next_id);
        Ok(InitiatedPayment {
            payment_url: format!("https://test-pay.khalti.com/?pidx={}", pidx),
            gateway_ref: pidx,
            expires_at: Timestamp::now().add_minutes(60),
        })
    }

    async fn lookup(&self, gateway_ref: &str) -> Result<PaymentLookup, PaymentError> {
        self.record_call("lookup", vec![gateway_ref.to_string()]);
        self.check_error("lookup")?;

        let mut state = self.state();
        if let Some(result) = state
            .queued
            .get_mut(gateway_ref)
            .and_then(|queue| queue.pop_front())
        {
            return result;
        }

        state
            .lookups
            .get(gateway_ref)
            .cloned()
            .ok_or_else(|| PaymentError::unknown_reference(format!("Unknown pidx: {}", gateway_ref)))
    }
}
