//! Hosted provider client tests against a stubbed HTTP API.

use wiremock::matchers::{basic_auth, body_json_string, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gateway_service::gateways::{Gateway, HostedPageGateway};
use gateway_service::models::{
    GatewayConfig, GatewayMode, Payment, PaymentStatus, Provider, Refund,
};

async fn gateway_for(server: &MockServer) -> HostedPageGateway {
    let mut config = GatewayConfig::new(Provider::Hosted, GatewayMode::Test);
    config
        .settings
        .insert("key_id".to_string(), "hp_test_123".to_string());
    config
        .settings
        .insert("key_secret".to_string(), "test_secret".to_string());
    config
        .settings
        .insert("api_base_url".to_string(), server.uri());
    HostedPageGateway::from_config(&config)
}

#[tokio::test]
async fn start_creates_checkout_and_stores_reference() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/checkouts"))
        .and(basic_auth("hp_test_123", "test_secret"))
        .and(header_exists("x-signature"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": "chk_42",
            "status": "open",
            "pay_url": "https://pay.hostedpay.example/chk_42"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway_for(&server).await;
    let mut payment = Payment::new(1000, "EUR");
    gateway.start(&mut payment).await.unwrap();

    assert_eq!(
        payment.meta.get("hosted_checkout_id").map(String::as_str),
        Some("chk_42")
    );
    assert_eq!(
        payment.action_url.as_deref(),
        Some("https://pay.hostedpay.example/chk_42")
    );
}

#[tokio::test]
async fn provider_error_decodes_code_and_description() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/checkouts"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": { "code": 101, "description": "Invalid API key" }
        })))
        .mount(&server)
        .await;

    let gateway = gateway_for(&server).await;
    let mut payment = Payment::new(1000, "EUR");
    let err = gateway.start(&mut payment).await.unwrap_err();

    assert_eq!(err.code, Some(101));
    assert_eq!(err.note(), "101: Invalid API key");
}

#[tokio::test]
async fn update_status_applies_provider_report() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/checkouts/chk_42"))
        .and(basic_auth("hp_test_123", "test_secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "chk_42",
            "status": "paid"
        })))
        .mount(&server)
        .await;

    let gateway = gateway_for(&server).await;
    let mut payment = Payment::new(1000, "EUR");
    payment
        .meta
        .insert("hosted_checkout_id".to_string(), "chk_42".to_string());

    gateway.update_status(&mut payment).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Success);
}

#[tokio::test]
async fn update_without_checkout_reference_fails() {
    let server = MockServer::start().await;
    let gateway = gateway_for(&server).await;

    let mut payment = Payment::new(1000, "EUR");
    let err = gateway.update_status(&mut payment).await.unwrap_err();
    assert!(err.note().contains("no provider checkout id"));
}

#[tokio::test]
async fn refund_posts_signed_body_and_records_provider_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/checkouts/chk_42/refunds"))
        .and(body_json_string(r#"{"amount":250,"currency":"EUR"}"#))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(serde_json::json!({ "id": "rf_7" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway_for(&server).await;
    let mut payment = Payment::new(1000, "EUR");
    payment
        .meta
        .insert("hosted_checkout_id".to_string(), "chk_42".to_string());
    let mut refund = Refund::new(payment.id, 250, "EUR");

    gateway.create_refund(&payment, &mut refund).await.unwrap();
    assert_eq!(refund.provider_refund_id.as_deref(), Some("rf_7"));
}
