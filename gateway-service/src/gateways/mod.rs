//! Gateway contract.
//!
//! A gateway is the strategy object for one payment provider. The
//! orchestrator drives every provider through this one trait; providers
//! plug in via the registry.

pub mod hosted;
pub mod mock;
pub mod registry;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{GatewayMode, Payment, Refund};

pub use hosted::HostedPageGateway;
pub use mock::MockGateway;
pub use registry::GatewayRegistry;

/// How the payer is handed off to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMethod {
    /// Auto-submitting HTML form posted to the action URL.
    HtmlForm,
    /// 303 redirect to the action URL.
    HttpRedirect,
}

/// The terminal HTTP action of a payment hand-off. Whoever holds the
/// request turns this into the final response; nothing else runs after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectAction {
    HttpRedirect(String),
    HtmlForm(String),
}

/// Failure reported by a provider call, with the provider's numeric code
/// when it gave one.
#[derive(Debug, Clone, Error)]
#[error("{}", self.note())]
pub struct GatewayError {
    pub code: Option<i64>,
    pub message: String,
}

impl GatewayError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: i64, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }

    /// Human-readable note, `"<code>: <message>"` when a code is present.
    pub fn note(&self) -> String {
        match self.code {
            Some(code) => format!("{}: {}", code, self.message),
            None => self.message.clone(),
        }
    }
}

/// Per-provider strategy.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Start the payment at the provider. On success the payment carries
    /// an action URL the payer must be sent to.
    async fn start(&self, payment: &mut Payment) -> Result<(), GatewayError>;

    /// Re-query the provider for the payment's current status and apply
    /// any transition.
    async fn update_status(&self, payment: &mut Payment) -> Result<(), GatewayError>;

    /// Create a refund at the provider.
    async fn create_refund(
        &self,
        payment: &Payment,
        refund: &mut Refund,
    ) -> Result<(), GatewayError>;

    /// Dispatch method, fixed per gateway instance at construction.
    fn dispatch_method(&self) -> DispatchMethod;

    fn supports(&self, feature: &str) -> bool;

    fn mode(&self) -> GatewayMode;

    /// The terminal hand-off action for a started payment.
    fn redirect(&self, payment: &Payment) -> RedirectAction {
        let url = payment.action_url.clone().unwrap_or_default();
        match self.dispatch_method() {
            DispatchMethod::HttpRedirect => RedirectAction::HttpRedirect(url),
            DispatchMethod::HtmlForm => RedirectAction::HtmlForm(auto_submit_form(&url)),
        }
    }
}

/// Minimal auto-submitting form page for `HtmlForm` dispatch.
fn auto_submit_form(action_url: &str) -> String {
    format!(
        concat!(
            "<!doctype html><html><head><title>Redirecting…</title></head><body ",
            "onload=\"document.forms[0].submit()\">",
            "<form method=\"post\" action=\"{}\">",
            "<noscript><button type=\"submit\">Continue to payment</button></noscript>",
            "</form></body></html>"
        ),
        action_url
    )
}
