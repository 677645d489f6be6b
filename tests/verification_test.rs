mod common;

use common::{transaction_body, TestApp};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use checkout_core::models::{PendingPayment, ProviderPayload};
use checkout_core::services::VerifyOutcome;
use checkout_core::txid::ClientTxnId;

fn pending(order_id: Uuid, txn: &str) -> PendingPayment {
    PendingPayment {
        order_id,
        client_txn_id: ClientTxnId::new(txn),
        provider_payload: ProviderPayload::none(),
    }
}

fn gateway_status(code: i32) -> serde_json::Value {
    json!({ "statusCode": code, "transactionStatus": if code == 3 { "Approved" } else { "Pending" } })
}

async fn mount_status(app: &TestApp, txn: &str, code: i32) {
    Mock::given(method("GET"))
        .and(path(format!("/api/sale/client/{}", txn)))
        .respond_with(ResponseTemplate::new(200).set_body_json(gateway_status(code)))
        .mount(&app.gateway)
        .await;
}

async fn mount_status_update(app: &TestApp, txn: &str, expected_calls: u64) {
    Mock::given(method("PATCH"))
        .and(path(format!("/payments/{}/status", txn)))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(transaction_body(txn, "completed")),
        )
        .expect(expected_calls)
        .mount(&app.backend)
        .await;
}

#[tokio::test]
async fn completed_gateway_status_updates_the_backend() {
    let app = TestApp::new().await;
    app.seed_session(true, 3600).await;

    mount_status(&app, "txn-1", 3).await;
    mount_status_update(&app, "txn-1", 1).await;

    let outcome = app
        .services
        .verifier
        .verify(&ClientTxnId::new("txn-1"), None)
        .await
        .unwrap();
    assert_eq!(outcome, VerifyOutcome::Completed);
}

#[tokio::test]
async fn incomplete_status_has_no_side_effects() {
    let app = TestApp::new().await;
    app.seed_session(true, 3600).await;

    mount_status(&app, "txn-2", 1).await;
    mount_status_update(&app, "txn-2", 0).await;

    let outcome = app
        .services
        .verifier
        .verify(&ClientTxnId::new("txn-2"), None)
        .await
        .unwrap();
    assert_eq!(outcome, VerifyOutcome::Pending);
}

#[tokio::test]
async fn link_transactions_are_never_polled() {
    let app = TestApp::new().await;
    app.seed_session(true, 3600).await;

    let payload = ProviderPayload::link("pp-9".into(), "https://gateway.test/pay/pp-9".into());
    let outcome = app
        .services
        .verifier
        .verify(&ClientTxnId::new("txn-link"), Some(&payload))
        .await
        .unwrap();

    assert_eq!(outcome, VerifyOutcome::NotApplicable);
    assert!(app.gateway.received_requests().await.unwrap().is_empty());
    assert!(app.backend.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn sweep_updates_completed_orders_and_guards_the_signature() {
    let app = TestApp::new().await;
    app.seed_session(true, 3600).await;

    let orders: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
    let batch = vec![
        pending(orders[0], "txn-a"),
        pending(orders[1], "txn-b"),
        pending(orders[2], "txn-c"),
    ];

    // Two of three report completion at the gateway.
    mount_status(&app, "txn-a", 3).await;
    mount_status(&app, "txn-b", 3).await;
    mount_status(&app, "txn-c", 1).await;
    mount_status_update(&app, "txn-a", 1).await;
    mount_status_update(&app, "txn-b", 1).await;
    mount_status_update(&app, "txn-c", 0).await;

    let report = app.services.verifier.sweep(batch.clone()).await.unwrap();
    assert_eq!(report.completed, 2);
    assert_eq!(report.pending, 1);
    assert_eq!(report.failed, 0);
    assert!(!report.skipped);

    // Same orders-changed signature: the guard suppresses the re-trigger,
    // so the expect(1) counts above still hold.
    let second = app.services.verifier.sweep(batch).await.unwrap();
    assert!(second.skipped);
    assert_eq!(second.completed, 0);

    // A different order set is a new signature and sweeps normally.
    let other_order = Uuid::new_v4();
    mount_status(&app, "txn-d", 1).await;
    let report = app
        .services
        .verifier
        .sweep(vec![pending(other_order, "txn-d")])
        .await
        .unwrap();
    assert!(!report.skipped);
    assert_eq!(report.pending, 1);
}

#[tokio::test]
async fn sweep_mixes_link_and_phone_transactions() {
    let app = TestApp::new().await;
    app.seed_session(true, 3600).await;

    let link_order = Uuid::new_v4();
    let phone_order = Uuid::new_v4();
    let batch = vec![
        PendingPayment {
            order_id: link_order,
            client_txn_id: ClientTxnId::new("txn-link"),
            provider_payload: ProviderPayload::link("pp-1".into(), "https://pay/1".into()),
        },
        pending(phone_order, "txn-phone"),
    ];

    mount_status(&app, "txn-phone", 3).await;
    mount_status_update(&app, "txn-phone", 1).await;

    let report = app.services.verifier.sweep(batch).await.unwrap();
    assert_eq!(report.completed, 1);
    assert_eq!(report.not_applicable, 1);

    // Only the phone transaction reached the gateway.
    assert_eq!(app.gateway.received_requests().await.unwrap().len(), 1);
}
