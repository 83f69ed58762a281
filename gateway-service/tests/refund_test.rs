//! Refund invariant tests.

mod common;

use uuid::Uuid;

use common::TestApp;
use gateway_service::gateways::GatewayError;
use gateway_service::models::Payment;
use gateway_service::services::RecordStore;

#[tokio::test]
async fn refund_totals_stay_consistent_and_bounded() {
    let app = TestApp::spawn().await;
    let outcome = app
        .orchestrator
        .start_payment(Payment::new(1000, "EUR"))
        .await
        .unwrap();
    let payment_id = outcome.payment.id;

    app.orchestrator
        .create_refund(payment_id, 300, None)
        .await
        .unwrap();
    app.orchestrator
        .create_refund(payment_id, 400, Some("partial".to_string()))
        .await
        .unwrap();

    let stored = app.store.get_payment(payment_id).await.unwrap().unwrap();
    assert_eq!(stored.refunded_amount_minor, 700);
    assert_eq!(
        stored.refunds.iter().map(|r| r.amount_minor).sum::<i64>(),
        stored.refunded_amount_minor
    );

    // Only 300 is left; 400 must be refused before the provider is asked.
    let refund_calls = app.gateway.refund_calls();
    let err = app
        .orchestrator
        .create_refund(payment_id, 400, None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("exceeds"));
    assert_eq!(app.gateway.refund_calls(), refund_calls);

    let stored = app.store.get_payment(payment_id).await.unwrap().unwrap();
    assert_eq!(stored.refunded_amount_minor, 700);
}

#[tokio::test]
async fn failed_second_refund_keeps_the_first_intact() {
    let app = TestApp::spawn().await;
    let outcome = app
        .orchestrator
        .start_payment(Payment::new(1000, "EUR"))
        .await
        .unwrap();
    let payment_id = outcome.payment.id;

    app.gateway.push_refund_result(Ok(()));
    app.gateway
        .push_refund_result(Err(GatewayError::new("refund window closed")));

    let first = app
        .orchestrator
        .create_refund(payment_id, 500, None)
        .await
        .unwrap();
    assert!(first.provider_refund_id.is_some());

    let err = app
        .orchestrator
        .create_refund(payment_id, 300, None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("refund window closed"));

    let stored = app.store.get_payment(payment_id).await.unwrap().unwrap();
    assert_eq!(stored.refunds.len(), 1);
    assert_eq!(stored.refunded_amount_minor, 500);
    assert!(stored
        .notes
        .contains(&"refund window closed".to_string()));
}

#[tokio::test]
async fn refund_without_gateway_is_rejected_and_noted() {
    let app = TestApp::spawn().await;
    let mut payment = Payment::new(1000, "EUR");
    payment.config_id = Some(Uuid::new_v4());
    app.store.insert_payment(&payment).await.unwrap();

    let err = app
        .orchestrator
        .create_refund(payment.id, 100, None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("does not exist"));

    let stored = app.store.get_payment(payment.id).await.unwrap().unwrap();
    assert!(stored.notes.iter().any(|n| n.contains("does not exist")));
    assert!(stored.refunds.is_empty());
}

#[tokio::test]
async fn non_positive_refund_is_rejected() {
    let app = TestApp::spawn().await;
    let outcome = app
        .orchestrator
        .start_payment(Payment::new(1000, "EUR"))
        .await
        .unwrap();

    let err = app
        .orchestrator
        .create_refund(outcome.payment.id, 0, None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("positive"));
    assert_eq!(app.gateway.refund_calls(), 0);
}
