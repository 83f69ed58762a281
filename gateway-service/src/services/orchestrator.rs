//! Payment lifecycle orchestrator.
//!
//! Provider-agnostic driver of the payment lifecycle. Gateways implement
//! provider specifics; the orchestrator owns the invariants around them:
//! a payment touched by a provider call is persisted no matter how the
//! call ended, refunds never exceed the refundable remainder, and status
//! only moves along the state machine.

use async_trait::async_trait;
use service_core::error::AppError;
use std::sync::Arc;
use uuid::Uuid;

use crate::gateways::{Gateway, GatewayRegistry, RedirectAction};
use crate::models::{GatewayConfig, Payment, PaymentStatus, Refund};

use super::metrics;
use super::risk::RiskClient;
use super::status_checker::StatusChecker;
use super::store::RecordStore;

/// Where an update call is running from. HTTP callers get the refreshed
/// payment back for redirect handling; background callers just persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunContext {
    Http,
    Background,
}

/// Request-scoped facts used to complement a freshly created payment.
#[derive(Debug, Clone, Default)]
pub struct RequestOrigin {
    pub page_url: Option<String>,
    pub referer: Option<String>,
    pub remote_ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Result of starting a payment: the persisted record plus the hand-off
/// action the HTTP layer must turn into its final response.
#[derive(Debug)]
pub struct StartOutcome {
    pub payment: Payment,
    pub redirect: Option<RedirectAction>,
}

/// Hook for callers that pick a gateway configuration by their own rules
/// before the default-configuration fallback applies.
#[async_trait]
pub trait ConfigSelector: Send + Sync {
    async fn select(&self, payment: &Payment) -> Result<Option<GatewayConfig>, AppError>;
}

pub struct Orchestrator {
    store: Arc<dyn RecordStore>,
    registry: GatewayRegistry,
    checker: Arc<StatusChecker>,
    risk: Option<RiskClient>,
    selector: Option<Arc<dyn ConfigSelector>>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        registry: GatewayRegistry,
        checker: Arc<StatusChecker>,
        risk: Option<RiskClient>,
    ) -> Self {
        Self {
            store,
            registry,
            checker,
            risk,
            selector: None,
        }
    }

    pub fn with_selector(mut self, selector: Arc<dyn ConfigSelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn checker(&self) -> &Arc<StatusChecker> {
        &self.checker
    }

    /// Start a payment at its provider.
    ///
    /// The payment is inserted before the provider is called and saved
    /// again after, whether the call succeeded or not, so no provider
    /// outcome is ever lost. A provider failure is recorded as a note on
    /// the payment and then surfaced to the caller; an unresolvable
    /// gateway is a recorded `failure`, not an error.
    pub async fn start_payment(&self, mut payment: Payment) -> Result<StartOutcome, AppError> {
        if payment.key.is_none() {
            payment.key = Some(generate_key());
        }
        if payment.version.is_none() {
            payment.version = Some(env!("CARGO_PKG_VERSION").to_string());
        }

        self.bind_gateway_config(&mut payment).await?;
        self.store.insert_payment(&payment).await?;
        self.settle_periods(&payment).await?;

        let gateway = match self.gateway_for(&payment).await? {
            Some((_, gateway)) => gateway,
            None => {
                let label = config_label(&payment);
                payment.add_note(format!("Gateway configuration {} does not exist", label));
                payment.transition(PaymentStatus::Failure);
                self.store.save_payment(&payment).await?;
                metrics::observe_payment(payment.status);
                tracing::error!(payment_id = %payment.id, label = %label, "No gateway for payment");
                return Ok(StartOutcome {
                    payment,
                    redirect: None,
                });
            }
        };

        payment.mode = Some(gateway.mode());

        if let Some(risk) = &self.risk {
            risk.pre_check(&payment).await;
        }

        let start_result = gateway.start(&mut payment).await;
        if let Err(err) = &start_result {
            payment.add_note(err.note());
            payment.transition(PaymentStatus::Failure);
        }
        self.store.save_payment(&payment).await?;

        if let Err(err) = start_result {
            tracing::warn!(
                payment_id = %payment.id,
                error = %err,
                "Provider rejected payment start"
            );
            return Err(AppError::BadGateway(err.note()));
        }

        if gateway.supports("payment_status_request") {
            self.checker.schedule_event(&payment, false).await?;
        }

        metrics::observe_payment(payment.status);
        tracing::info!(
            payment_id = %payment.id,
            amount_minor = payment.amount_minor,
            currency = %payment.currency,
            "Payment started"
        );

        let redirect = Some(gateway.redirect(&payment));
        Ok(StartOutcome { payment, redirect })
    }

    /// Refresh a payment's status from its provider and persist the
    /// result. Reconciliation is best effort: a missing gateway leaves
    /// the payment as-is, and a provider failure becomes a note, never an
    /// error. The returned redirect points at the payment's onward URL
    /// and is only produced for HTTP callers that asked for one.
    pub async fn update_payment(
        &self,
        payment_id: Uuid,
        ctx: RunContext,
        can_redirect: bool,
    ) -> Result<(Payment, Option<RedirectAction>), AppError> {
        let Some(mut payment) = self.store.get_payment(payment_id).await? else {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "payment {}",
                payment_id
            )));
        };

        if !payment.status.is_terminal() {
            let Some((_, gateway)) = self.gateway_for(&payment).await? else {
                tracing::debug!(payment_id = %payment.id, "No gateway to reconcile against");
                return Ok((payment, None));
            };

            let previous = payment.status;
            if let Err(err) = gateway.update_status(&mut payment).await {
                tracing::warn!(payment_id = %payment.id, error = %err, "Status update failed");
                payment.add_note(err.note());
            }
            self.store.save_payment(&payment).await?;

            if payment.status != previous {
                metrics::observe_payment(payment.status);
                tracing::info!(
                    payment_id = %payment.id,
                    from = previous.as_str(),
                    to = payment.status.as_str(),
                    ctx = ?ctx,
                    "Payment status changed"
                );
            }
        }

        let redirect = if can_redirect && ctx == RunContext::Http {
            payment
                .return_redirect_url
                .clone()
                .map(RedirectAction::HttpRedirect)
        } else {
            None
        };
        Ok((payment, redirect))
    }

    /// Fill in request-scoped and derivable fields a caller left empty.
    /// Existing values always win; the callback key in particular is
    /// write-once.
    pub fn complement_payment(&self, payment: &mut Payment, origin: &RequestOrigin) {
        if payment.key.is_none() {
            payment.key = Some(generate_key());
        }
        if payment.origin.is_none() {
            payment.origin = origin.page_url.clone().or_else(|| origin.referer.clone());
        }
        if payment.version.is_none() {
            payment.version = Some(env!("CARGO_PKG_VERSION").to_string());
        }

        // An issuer without a method implies an issuer-selection flow.
        if payment.method.is_none() && payment.issuer.is_some() {
            payment.method = Some("ideal".to_string());
        }

        let customer = payment.customer.get_or_insert_with(Default::default);
        if customer.user_agent.is_none() {
            customer.user_agent = origin.user_agent.clone();
        }
        if customer.ip_address.is_none() {
            customer.ip_address = origin.remote_ip.clone();
        }
        let customer_name = customer.name.clone();
        let customer_email = customer.email.clone();

        for address in [
            payment.billing_address.as_mut(),
            payment.shipping_address.as_mut(),
        ]
        .into_iter()
        .flatten()
        {
            if address.name.is_none() {
                address.name = customer_name.clone();
            }
            if address.email.is_none() {
                address.email = customer_email.clone();
            }
        }

        // Providers may report bank details as loose meta keys; fold
        // them into the structured field. Structured values win.
        let meta_name = payment.meta.get("consumer_name").cloned();
        let meta_iban = payment.meta.get("consumer_iban").cloned();
        let meta_bic = payment.meta.get("consumer_bic").cloned();
        if payment.consumer_bank_details.is_some()
            || meta_name.is_some()
            || meta_iban.is_some()
            || meta_bic.is_some()
        {
            let details = payment
                .consumer_bank_details
                .get_or_insert_with(Default::default);
            if details.name.is_none() {
                details.name = meta_name.or(customer_name);
            }
            if details.iban.is_none() {
                details.iban = meta_iban;
            }
            if details.bic.is_none() {
                details.bic = meta_bic;
            }
        }

        let payment_id = payment.id;
        for line in &mut payment.lines {
            if line.payment_id.is_none() {
                line.payment_id = Some(payment_id);
            }
        }
    }

    /// Create a refund at the provider.
    ///
    /// Refuses up front when the amount would push the refunded total past
    /// the payment amount. Like the other provider calls, the payment is
    /// saved whether the provider accepted the refund or not.
    pub async fn create_refund(
        &self,
        payment_id: Uuid,
        amount_minor: i64,
        description: Option<String>,
    ) -> Result<Refund, AppError> {
        let Some(mut payment) = self.store.get_payment(payment_id).await? else {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "payment {}",
                payment_id
            )));
        };

        if amount_minor <= 0 {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "refund amount must be positive"
            )));
        }
        if payment.refunded_amount_minor + amount_minor > payment.amount_minor {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "refund of {} exceeds refundable remainder {}",
                amount_minor,
                payment.amount_minor - payment.refunded_amount_minor
            )));
        }

        let (_, gateway) = match self.gateway_for(&payment).await? {
            Some(found) => found,
            None => {
                let note = format!(
                    "Gateway configuration {} does not exist",
                    config_label(&payment)
                );
                payment.add_note(note.clone());
                self.store.save_payment(&payment).await?;
                return Err(AppError::BadGateway(note));
            }
        };

        let mut refund = Refund::new(payment.id, amount_minor, &payment.currency);
        refund.description = description;

        let refund_result = gateway.create_refund(&payment, &mut refund).await;
        match &refund_result {
            Ok(()) => {
                payment.refunded_amount_minor += refund.amount_minor;
                payment.refunds.push(refund.clone());
            }
            Err(err) => payment.add_note(err.note()),
        }
        self.store.save_payment(&payment).await?;

        match refund_result {
            Ok(()) => {
                tracing::info!(
                    payment_id = %payment.id,
                    refund_id = %refund.id,
                    amount_minor = refund.amount_minor,
                    "Refund created"
                );
                Ok(refund)
            }
            Err(err) => {
                tracing::warn!(payment_id = %payment.id, error = %err, "Provider rejected refund");
                Err(AppError::BadGateway(err.note()))
            }
        }
    }

    /// Settle every pending subscription period this payment carries:
    /// advance the subscription's next payment date and count the period
    /// against its phase. The ratchet only moves forward, so replayed or
    /// out-of-order settlements change nothing.
    async fn settle_periods(&self, payment: &Payment) -> Result<(), AppError> {
        for period in &payment.periods {
            let Some(mut subscription) =
                self.store.get_subscription(period.subscription_id).await?
            else {
                tracing::warn!(
                    payment_id = %payment.id,
                    subscription_id = %period.subscription_id,
                    "Settled period references unknown subscription"
                );
                continue;
            };
            if !subscription.ratchet_next_payment_date(period.end_date) {
                continue;
            }
            subscription.confirm_period(period.phase_seq);
            self.store.save_subscription(&subscription).await?;
            tracing::info!(
                subscription_id = %subscription.id,
                next_payment_date = %subscription.next_payment_date,
                status = subscription.status.as_str(),
                "Subscription advanced"
            );
        }
        Ok(())
    }

    /// Gateway bound to a payment's resolved configuration.
    async fn gateway_for(
        &self,
        payment: &Payment,
    ) -> Result<Option<(GatewayConfig, Arc<dyn Gateway>)>, AppError> {
        let Some(config_id) = payment.config_id else {
            return Ok(None);
        };
        let Some(config) = self.store.get_gateway_config(config_id).await? else {
            return Ok(None);
        };
        Ok(self.registry.resolve(&config).map(|g| (config, g)))
    }

    /// Bind a configuration id to the payment when it has none: the
    /// store default first, then the selector hook may override.
    async fn bind_gateway_config(&self, payment: &mut Payment) -> Result<(), AppError> {
        if payment.config_id.is_none() {
            if let Some(config) = self.store.default_gateway_config().await? {
                payment.config_id = Some(config.id);
            }
        }
        if let Some(selector) = &self.selector {
            if let Some(config) = selector.select(payment).await? {
                payment.config_id = Some(config.id);
            }
        }
        Ok(())
    }
}

fn config_label(payment: &Payment) -> String {
    payment
        .config_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "default".to_string())
}

/// Opaque 32-character hex callback key.
fn generate_key() -> String {
    let bytes: [u8; 16] = rand::random();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_orchestrator() -> Orchestrator {
        let checker = Arc::new(StatusChecker::new(Arc::new(
            crate::services::queue::MemoryTaskQueue::new(),
        )));
        let store = Arc::new(crate::services::store::MemoryRecordStore::new());
        Orchestrator::new(store, GatewayRegistry::with_builtins(), checker, None)
    }

    #[test]
    fn generated_keys_are_32_hex_and_unique() {
        let a = generate_key();
        let b = generate_key();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn complement_never_overwrites() {
        let orchestrator = test_orchestrator();

        let mut payment = Payment::new(1000, "EUR");
        payment.key = Some("existing-key".to_string());
        payment.origin = Some("https://shop.example/cart".to_string());

        let origin = RequestOrigin {
            page_url: Some("https://other.example".to_string()),
            referer: None,
            remote_ip: Some("10.0.0.1".to_string()),
            user_agent: Some("test-agent".to_string()),
        };
        orchestrator.complement_payment(&mut payment, &origin);

        assert_eq!(payment.key.as_deref(), Some("existing-key"));
        assert_eq!(payment.origin.as_deref(), Some("https://shop.example/cart"));
        let customer = payment.customer.as_ref().unwrap();
        assert_eq!(customer.ip_address.as_deref(), Some("10.0.0.1"));
        assert_eq!(customer.user_agent.as_deref(), Some("test-agent"));
    }

    #[test]
    fn complement_builds_bank_details_from_meta() {
        let orchestrator = test_orchestrator();

        let mut payment = Payment::new(1000, "EUR");
        payment
            .meta
            .insert("consumer_name".to_string(), "J. Doe".to_string());
        payment
            .meta
            .insert("consumer_iban".to_string(), "NL02ABNA0123456789".to_string());
        payment
            .meta
            .insert("consumer_bic".to_string(), "ABNANL2A".to_string());

        orchestrator.complement_payment(&mut payment, &RequestOrigin::default());

        let details = payment.consumer_bank_details.as_ref().unwrap();
        assert_eq!(details.name.as_deref(), Some("J. Doe"));
        assert_eq!(details.iban.as_deref(), Some("NL02ABNA0123456789"));
        assert_eq!(details.bic.as_deref(), Some("ABNANL2A"));

        // A structured value, once set, survives later meta changes.
        payment
            .meta
            .insert("consumer_iban".to_string(), "NL99FAKE0000000000".to_string());
        orchestrator.complement_payment(&mut payment, &RequestOrigin::default());
        assert_eq!(
            payment.consumer_bank_details.as_ref().unwrap().iban.as_deref(),
            Some("NL02ABNA0123456789")
        );
    }
}
