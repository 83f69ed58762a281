//! Risk pre-check client.
//!
//! Optional external validation service consulted before a payment is
//! handed to the provider. Strictly best-effort: a slow or failing risk
//! service must never block payment creation, so every failure is logged
//! and swallowed.

use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde_json::json;
use std::time::Duration;

use crate::config::RiskConfig;
use crate::models::Payment;

#[derive(Clone)]
pub struct RiskClient {
    client: Client,
    endpoint: String,
    api_key: Secret<String>,
}

impl RiskClient {
    /// Build a client when an endpoint is configured.
    pub fn from_config(config: &RiskConfig) -> Option<Self> {
        let endpoint = config.endpoint.clone()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .unwrap_or_default();
        Some(Self {
            client,
            endpoint,
            api_key: config.api_key.clone(),
        })
    }

    /// Submit the payment for validation. Never fails.
    pub async fn pre_check(&self, payment: &Payment) {
        let body = json!({
            "payment_id": payment.id,
            "amount_minor": payment.amount_minor,
            "currency": payment.currency,
            "method": payment.method,
            "ip_address": payment.customer.as_ref().and_then(|c| c.ip_address.clone()),
        });

        let result = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                tracing::debug!(payment_id = %payment.id, "Risk pre-check passed");
            }
            Ok(response) => {
                tracing::warn!(
                    payment_id = %payment.id,
                    status = %response.status(),
                    "Risk pre-check returned non-success, continuing"
                );
            }
            Err(e) => {
                tracing::warn!(
                    payment_id = %payment.id,
                    error = %e,
                    "Risk pre-check failed, continuing"
                );
            }
        }
    }
}
