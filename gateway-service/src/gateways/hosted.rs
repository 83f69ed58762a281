//! Hosted payment page provider.
//!
//! Drives a provider that hosts the checkout itself: we create a checkout
//! resource over its JSON API, send the payer to the returned pay URL, and
//! re-query the resource for status afterwards. Requests are authenticated
//! with basic auth plus an HMAC-SHA256 body signature.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::models::{GatewayConfig, GatewayMode, Payment, PaymentStatus, Refund};

use super::{DispatchMethod, Gateway, GatewayError};

const CHECKOUT_ID_META: &str = "hosted_checkout_id";
const SIGNATURE_HEADER: &str = "x-signature";

pub struct HostedPageGateway {
    client: Client,
    key_id: String,
    key_secret: Secret<String>,
    api_base_url: String,
    mode: GatewayMode,
}

/// Request to create a hosted checkout.
#[derive(Debug, Serialize)]
struct CreateCheckoutRequest {
    /// Amount in smallest currency unit.
    amount: i64,
    currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    return_url: Option<String>,
}

/// A checkout resource as the provider reports it.
#[derive(Debug, Deserialize)]
struct CheckoutResource {
    id: String,
    status: String,
    #[serde(default)]
    pay_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateRefundRequest {
    amount: i64,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct RefundResource {
    id: String,
}

/// Provider API error body.
#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    code: Option<i64>,
    description: String,
}

impl HostedPageGateway {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            client: Client::new(),
            key_id: config.setting("key_id").unwrap_or_default().to_string(),
            key_secret: Secret::new(
                config.setting("key_secret").unwrap_or_default().to_string(),
            ),
            api_base_url: config
                .setting("api_base_url")
                .unwrap_or("https://api.hostedpay.example/v1")
                .to_string(),
            mode: config.mode,
        }
    }

    /// Check whether credentials are set.
    pub fn is_configured(&self) -> bool {
        !self.key_id.is_empty() && !self.key_secret.expose_secret().is_empty()
    }

    /// HMAC-SHA256 signature over the request body.
    fn sign(&self, body: &str) -> Result<String, GatewayError> {
        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(self.key_secret.expose_secret().as_bytes())
            .map_err(|_| GatewayError::new("Invalid signing key length"))?;
        mac.update(body.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> Result<T, GatewayError> {
        let url = format!("{}{}", self.api_base_url, path);
        let payload = serde_json::to_string(body)
            .map_err(|e| GatewayError::new(format!("Failed to encode request: {}", e)))?;
        let signature = self.sign(&payload)?;

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.key_id, Some(self.key_secret.expose_secret()))
            .header(SIGNATURE_HEADER, signature)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
            .map_err(|e| GatewayError::new(format!("Provider request failed: {}", e)))?;

        Self::decode(response).await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<T, GatewayError> {
        let url = format!("{}{}", self.api_base_url, path);
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.key_id, Some(self.key_secret.expose_secret()))
            .send()
            .await
            .map_err(|e| GatewayError::new(format!("Provider request failed: {}", e)))?;

        Self::decode(response).await
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::new(format!("Failed to read provider response: {}", e)))?;

        tracing::debug!(status = %status, body = %body, "Hosted provider response");

        if status.is_success() {
            serde_json::from_str(&body)
                .map_err(|e| GatewayError::new(format!("Unexpected provider response: {}", e)))
        } else {
            let err = serde_json::from_str::<ApiError>(&body)
                .map(|e| match e.error.code {
                    Some(code) => GatewayError::with_code(code, e.error.description),
                    None => GatewayError::new(e.error.description),
                })
                .unwrap_or_else(|_| GatewayError::new(body));
            Err(err)
        }
    }

    fn checkout_id(payment: &Payment) -> Result<String, GatewayError> {
        payment
            .meta
            .get(CHECKOUT_ID_META)
            .cloned()
            .ok_or_else(|| GatewayError::new("Payment has no provider checkout id"))
    }

    fn apply_provider_status(payment: &mut Payment, provider_status: &str) {
        let next = match provider_status {
            "paid" => Some(PaymentStatus::Success),
            "authorized" => Some(PaymentStatus::Authorized),
            "on_hold" => Some(PaymentStatus::OnHold),
            "cancelled" => Some(PaymentStatus::Cancelled),
            "expired" => Some(PaymentStatus::Expired),
            "failed" => Some(PaymentStatus::Failure),
            _ => None,
        };
        if let Some(next) = next {
            payment.transition(next);
        }
    }
}

#[async_trait]
impl Gateway for HostedPageGateway {
    async fn start(&self, payment: &mut Payment) -> Result<(), GatewayError> {
        if !self.is_configured() {
            return Err(GatewayError::new("Provider credentials not configured"));
        }

        let request = CreateCheckoutRequest {
            amount: payment.amount_minor,
            currency: payment.currency.clone(),
            description: payment.description.clone(),
            reference: payment.id.to_string(),
            return_url: payment.return_redirect_url.clone(),
        };

        let checkout: CheckoutResource = self.post_json("/checkouts", &request).await?;

        tracing::info!(
            payment_id = %payment.id,
            checkout_id = %checkout.id,
            "Hosted checkout created"
        );

        payment
            .meta
            .insert(CHECKOUT_ID_META.to_string(), checkout.id);
        payment.action_url = checkout.pay_url;
        Ok(())
    }

    async fn update_status(&self, payment: &mut Payment) -> Result<(), GatewayError> {
        let checkout_id = Self::checkout_id(payment)?;
        let checkout: CheckoutResource = self
            .get_json(&format!("/checkouts/{}", checkout_id))
            .await?;

        tracing::debug!(
            payment_id = %payment.id,
            checkout_id = %checkout.id,
            provider_status = %checkout.status,
            "Hosted checkout status"
        );

        Self::apply_provider_status(payment, &checkout.status);
        Ok(())
    }

    async fn create_refund(
        &self,
        payment: &Payment,
        refund: &mut Refund,
    ) -> Result<(), GatewayError> {
        let checkout_id = Self::checkout_id(payment)?;
        let request = CreateRefundRequest {
            amount: refund.amount_minor,
            currency: refund.currency.clone(),
        };
        let resource: RefundResource = self
            .post_json(&format!("/checkouts/{}/refunds", checkout_id), &request)
            .await?;

        refund.provider_refund_id = Some(resource.id);
        Ok(())
    }

    fn dispatch_method(&self) -> DispatchMethod {
        DispatchMethod::HttpRedirect
    }

    fn supports(&self, feature: &str) -> bool {
        matches!(feature, "payment_status_request" | "refunds")
    }

    fn mode(&self) -> GatewayMode {
        self.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Provider;

    fn test_gateway() -> HostedPageGateway {
        let mut config = GatewayConfig::new(Provider::Hosted, GatewayMode::Test);
        config
            .settings
            .insert("key_id".to_string(), "hp_test_123".to_string());
        config
            .settings
            .insert("key_secret".to_string(), "test_secret".to_string());
        HostedPageGateway::from_config(&config)
    }

    #[test]
    fn is_configured_requires_credentials() {
        assert!(test_gateway().is_configured());

        let empty = GatewayConfig::new(Provider::Hosted, GatewayMode::Test);
        assert!(!HostedPageGateway::from_config(&empty).is_configured());
    }

    #[test]
    fn signature_is_deterministic() {
        let gateway = test_gateway();
        let a = gateway.sign(r#"{"amount":1000}"#).unwrap();
        let b = gateway.sign(r#"{"amount":1000}"#).unwrap();
        let c = gateway.sign(r#"{"amount":1001}"#).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn provider_status_mapping_respects_state_machine() {
        let mut payment = Payment::new(1000, "EUR");
        HostedPageGateway::apply_provider_status(&mut payment, "paid");
        assert_eq!(payment.status, PaymentStatus::Success);

        // A late "expired" report never reopens a settled payment.
        HostedPageGateway::apply_provider_status(&mut payment, "expired");
        assert_eq!(payment.status, PaymentStatus::Success);

        let mut payment = Payment::new(1000, "EUR");
        HostedPageGateway::apply_provider_status(&mut payment, "something_new");
        assert_eq!(payment.status, PaymentStatus::Open);
    }
}
