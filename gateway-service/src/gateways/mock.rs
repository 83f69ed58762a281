//! In-process mock gateway.
//!
//! Used by tests and local development: behavior is scripted per call, and
//! every call is counted. Defaults to a redirect-dispatch gateway that
//! supports every optional feature.

use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use crate::models::{GatewayMode, Payment, PaymentStatus, Refund};

use super::{DispatchMethod, Gateway, GatewayError};

#[derive(Default)]
struct MockState {
    fail_next_start: Option<GatewayError>,
    fail_next_update: Option<GatewayError>,
    status_on_update: Option<PaymentStatus>,
    refund_results: VecDeque<Result<(), GatewayError>>,
    start_calls: u32,
    update_calls: u32,
    refund_calls: u32,
}

pub struct MockGateway {
    mode: GatewayMode,
    dispatch: DispatchMethod,
    features: HashSet<String>,
    state: Mutex<MockState>,
}

impl MockGateway {
    pub fn new(mode: GatewayMode) -> Self {
        let features = ["payment_status_request", "recurring", "refunds"]
            .into_iter()
            .map(String::from)
            .collect();
        Self {
            mode,
            dispatch: DispatchMethod::HttpRedirect,
            features,
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn with_dispatch_method(mut self, dispatch: DispatchMethod) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn with_features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.features = features.into_iter().map(Into::into).collect();
        self
    }

    /// Script the next `start` call to fail.
    pub fn fail_next_start(&self, error: GatewayError) {
        self.state.lock().unwrap().fail_next_start = Some(error);
    }

    /// Script the next `update_status` call to fail.
    pub fn fail_next_update(&self, error: GatewayError) {
        self.state.lock().unwrap().fail_next_update = Some(error);
    }

    /// Script the status every `update_status` call reports.
    pub fn set_status_on_update(&self, status: PaymentStatus) {
        self.state.lock().unwrap().status_on_update = Some(status);
    }

    /// Script the outcome of the next `create_refund` call. Unscripted
    /// calls succeed.
    pub fn push_refund_result(&self, result: Result<(), GatewayError>) {
        self.state.lock().unwrap().refund_results.push_back(result);
    }

    pub fn start_calls(&self) -> u32 {
        self.state.lock().unwrap().start_calls
    }

    pub fn update_calls(&self) -> u32 {
        self.state.lock().unwrap().update_calls
    }

    pub fn refund_calls(&self) -> u32 {
        self.state.lock().unwrap().refund_calls
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn start(&self, payment: &mut Payment) -> Result<(), GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.start_calls += 1;
        if let Some(error) = state.fail_next_start.take() {
            return Err(error);
        }
        payment.action_url = Some(format!("https://pay.example/checkout/{}", payment.id));
        payment
            .meta
            .insert("mock_reference".to_string(), payment.id.to_string());
        Ok(())
    }

    async fn update_status(&self, payment: &mut Payment) -> Result<(), GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.update_calls += 1;
        if let Some(error) = state.fail_next_update.take() {
            return Err(error);
        }
        if let Some(status) = state.status_on_update {
            payment.transition(status);
        }
        Ok(())
    }

    async fn create_refund(
        &self,
        _payment: &Payment,
        refund: &mut Refund,
    ) -> Result<(), GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.refund_calls += 1;
        match state.refund_results.pop_front() {
            Some(Err(error)) => Err(error),
            _ => {
                refund.provider_refund_id = Some(format!("re_{}", refund.id.simple()));
                Ok(())
            }
        }
    }

    fn dispatch_method(&self) -> DispatchMethod {
        self.dispatch
    }

    fn supports(&self, feature: &str) -> bool {
        self.features.contains(feature)
    }

    fn mode(&self) -> GatewayMode {
        self.mode
    }
}
