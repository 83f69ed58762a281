//! Payment lifecycle integration tests.

mod common;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use mongodb::bson::DateTime;
use std::sync::Arc;
use uuid::Uuid;

use common::TestApp;
use gateway_service::dtos::ReturnQuery;
use gateway_service::handlers::payments::return_callback;
use gateway_service::models::{
    Payment, PaymentStatus, PeriodRef, Phase, PhaseInterval, PhaseIntervalUnit, Subscription,
    SubscriptionStatus,
};
use gateway_service::services::{RecordStore, RequestOrigin, RunContext, SchedulerSet};

fn app_state(app: &TestApp) -> gateway_service::AppState {
    common::app_state(app, Arc::new(SchedulerSet::new()))
}

#[tokio::test]
async fn complement_assigns_key_once() {
    let app = TestApp::spawn().await;
    let mut payment = Payment::new(1000, "EUR");
    let origin = RequestOrigin {
        page_url: Some("https://shop.example/cart".to_string()),
        ..Default::default()
    };

    app.orchestrator.complement_payment(&mut payment, &origin);
    let key = payment.key.clone().expect("key assigned");
    assert_eq!(key.len(), 32);

    app.orchestrator.complement_payment(&mut payment, &origin);
    assert_eq!(payment.key.as_ref(), Some(&key));
    assert_eq!(payment.origin.as_deref(), Some("https://shop.example/cart"));
}

#[tokio::test]
async fn start_persists_and_schedules_status_check() {
    let app = TestApp::spawn().await;
    let payment = Payment::new(2500, "EUR");

    let outcome = app.orchestrator.start_payment(payment).await.unwrap();
    assert_eq!(outcome.payment.status, PaymentStatus::Open);
    assert!(outcome.redirect.is_some());
    assert_eq!(outcome.payment.config_id, Some(app.config.id));

    let stored = app
        .store
        .get_payment(outcome.payment.id)
        .await
        .unwrap()
        .expect("payment persisted");
    assert!(stored.action_url.is_some());

    // The mock supports status requests, so a delayed check is queued.
    assert_eq!(app.queue.pending_count(), 1);
    assert_eq!(app.queue.actions()[0].hook, "payment_status_check");
}

#[tokio::test]
async fn missing_gateway_records_failure_without_error() {
    let app = TestApp::spawn().await;
    let mut payment = Payment::new(1000, "EUR");
    // A dangling configuration reference, nothing to fall back to.
    payment.config_id = Some(Uuid::new_v4());

    let outcome = app.orchestrator.start_payment(payment).await.unwrap();
    assert_eq!(outcome.payment.status, PaymentStatus::Failure);
    assert!(outcome.redirect.is_none());
    assert!(outcome
        .payment
        .notes
        .iter()
        .any(|n| n.contains("does not exist")));

    let stored = app
        .store
        .get_payment(outcome.payment.id)
        .await
        .unwrap()
        .expect("failed payment persisted");
    assert_eq!(stored.status, PaymentStatus::Failure);
    assert_eq!(app.gateway.start_calls(), 0);
}

#[tokio::test]
async fn provider_error_persists_note_and_propagates() {
    let app = TestApp::spawn().await;
    app.gateway
        .fail_next_start(gateway_service::gateways::GatewayError::with_code(
            101,
            "Invalid API key",
        ));

    let payment = Payment::new(1000, "EUR");
    let payment_id = payment.id;
    let err = app.orchestrator.start_payment(payment).await.unwrap_err();
    assert!(err.to_string().contains("101: Invalid API key"));

    let stored = app
        .store
        .get_payment(payment_id)
        .await
        .unwrap()
        .expect("payment persisted despite provider failure");
    assert_eq!(stored.status, PaymentStatus::Failure);
    assert!(stored.notes.contains(&"101: Invalid API key".to_string()));
}

#[tokio::test]
async fn started_payment_ratchets_subscription_forward() {
    let app = TestApp::spawn().await;

    let phase = Phase {
        seq: 1,
        start_date: DateTime::from_millis(1_700_000_000_000),
        interval: PhaseInterval::new(PhaseIntervalUnit::Month, 1),
        amount_minor: 999,
        total_periods: None,
        periods_created: 0,
    };
    let subscription = Subscription::new("EUR", vec![phase]);
    app.store.insert_subscription(&subscription).await.unwrap();
    let original_date = subscription.next_payment_date;

    let period_end = DateTime::from_millis(1_710_000_000_000);
    let mut payment = Payment::new(999, "EUR");
    payment.periods.push(PeriodRef {
        subscription_id: subscription.id,
        phase_seq: 1,
        start_date: original_date,
        end_date: period_end,
    });
    app.orchestrator.start_payment(payment).await.unwrap();

    let advanced = app
        .store
        .get_subscription(subscription.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(advanced.next_payment_date, period_end);

    // A late start for an earlier period must not pull the date back.
    let mut late = Payment::new(999, "EUR");
    late.periods.push(PeriodRef {
        subscription_id: subscription.id,
        phase_seq: 1,
        start_date: original_date,
        end_date: DateTime::from_millis(1_705_000_000_000),
    });
    app.orchestrator.start_payment(late).await.unwrap();

    let unchanged = app
        .store
        .get_subscription(subscription.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(unchanged.next_payment_date, period_end);
}

#[tokio::test]
async fn settling_the_last_period_completes_the_subscription() {
    let app = TestApp::spawn().await;

    let phase = Phase {
        seq: 1,
        start_date: DateTime::from_millis(1_700_000_000_000),
        interval: PhaseInterval::new(PhaseIntervalUnit::Month, 1),
        amount_minor: 999,
        total_periods: Some(1),
        periods_created: 0,
    };
    let subscription = Subscription::new("EUR", vec![phase]);
    app.store.insert_subscription(&subscription).await.unwrap();

    let mut payment = Payment::new(999, "EUR");
    payment.periods.push(PeriodRef {
        subscription_id: subscription.id,
        phase_seq: 1,
        start_date: subscription.next_payment_date,
        end_date: DateTime::from_millis(1_710_000_000_000),
    });
    app.orchestrator.start_payment(payment).await.unwrap();

    let settled = app
        .store
        .get_subscription(subscription.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(settled.phases[0].periods_created, 1);
    assert_eq!(settled.status, SubscriptionStatus::Completed);
}

#[tokio::test]
async fn terminal_payment_update_is_a_noop() {
    let app = TestApp::spawn().await;
    let outcome = app
        .orchestrator
        .start_payment(Payment::new(1000, "EUR"))
        .await
        .unwrap();

    app.gateway.set_status_on_update(PaymentStatus::Success);
    app.orchestrator
        .update_payment(outcome.payment.id, RunContext::Background, false)
        .await
        .unwrap();
    let updates_before = app.gateway.update_calls();

    // Already terminal, the provider must not be consulted again.
    let (refreshed, redirect) = app
        .orchestrator
        .update_payment(outcome.payment.id, RunContext::Background, false)
        .await
        .unwrap();
    assert_eq!(refreshed.status, PaymentStatus::Success);
    assert!(redirect.is_none());
    assert_eq!(app.gateway.update_calls(), updates_before);
}

#[tokio::test]
async fn update_failure_becomes_a_note_not_an_error() {
    let app = TestApp::spawn().await;
    let outcome = app
        .orchestrator
        .start_payment(Payment::new(1000, "EUR"))
        .await
        .unwrap();

    app.gateway
        .fail_next_update(gateway_service::gateways::GatewayError::new(
            "provider timed out",
        ));

    let (updated, _) = app
        .orchestrator
        .update_payment(outcome.payment.id, RunContext::Background, false)
        .await
        .unwrap();
    assert_eq!(updated.status, PaymentStatus::Open);
    assert!(updated.notes.contains(&"provider timed out".to_string()));

    let stored = app
        .store
        .get_payment(outcome.payment.id)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.notes.contains(&"provider timed out".to_string()));
}

#[tokio::test]
async fn return_callback_with_wrong_key_skips_reconciliation() {
    let app = TestApp::spawn().await;
    let outcome = app
        .orchestrator
        .start_payment(Payment::new(1000, "EUR"))
        .await
        .unwrap();
    let state = app_state(&app);

    let response = return_callback(
        State(state),
        Path(outcome.payment.id),
        Query(ReturnQuery {
            key: "not-the-key".to_string(),
        }),
    )
    .await
    .unwrap()
    .into_response();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers().get("location").unwrap(),
        "https://shop.example"
    );
    assert_eq!(app.gateway.update_calls(), 0);
}

#[tokio::test]
async fn return_callback_with_valid_key_reconciles() {
    let app = TestApp::spawn().await;
    let mut payment = Payment::new(1000, "EUR");
    payment.return_redirect_url = Some("https://shop.example/thanks".to_string());
    app.orchestrator
        .complement_payment(&mut payment, &RequestOrigin::default());
    let key = payment.key.clone().unwrap();
    let outcome = app.orchestrator.start_payment(payment).await.unwrap();

    app.gateway.set_status_on_update(PaymentStatus::Success);
    let state = app_state(&app);

    let response = return_callback(State(state), Path(outcome.payment.id), Query(ReturnQuery { key }))
        .await
        .unwrap()
        .into_response();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers().get("location").unwrap(),
        "https://shop.example/thanks"
    );

    let stored = app
        .store
        .get_payment(outcome.payment.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, PaymentStatus::Success);
}
