mod common;

use assert_matches::assert_matches;
use common::TestApp;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use checkout_core::errors::ServiceError;
use common::{enveloped, make_jwt};

fn refresh_body(ttl_secs: i64) -> serde_json::Value {
    enveloped(json!({
        "token": make_jwt(ttl_secs),
        "refreshToken": "refresh-2"
    }))
}

#[tokio::test]
async fn renews_once_and_replays_the_original_request() {
    let app = TestApp::new().await;
    app.seed_session(true, 3600).await;

    // First attempt is rejected, the replay after renewal succeeds.
    Mock::given(method("GET"))
        .and(path("/cart"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&app.backend)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(refresh_body(3600)))
        .expect(1)
        .mount(&app.backend)
        .await;
    Mock::given(method("GET"))
        .and(path("/cart"))
        .respond_with(ResponseTemplate::new(200).set_body_json(enveloped(json!([]))))
        .expect(1)
        .mount(&app.backend)
        .await;

    let items = app.services.backend.server_cart().await.unwrap();
    assert!(items.is_empty());

    // The renewed session was swapped in as one unit.
    let session = app.services.session.current().await.unwrap();
    assert_eq!(session.refresh_token, "refresh-2");
    assert!(session.keep_session);
}

#[tokio::test]
async fn second_401_forces_logout_without_a_second_renewal() {
    let app = TestApp::new().await;
    app.seed_session(true, 3600).await;

    Mock::given(method("GET"))
        .and(path("/cart"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&app.backend)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(refresh_body(3600)))
        .expect(1)
        .mount(&app.backend)
        .await;

    let err = app.services.backend.server_cart().await.unwrap_err();
    assert_matches!(err, ServiceError::SessionExpired);

    assert!(app.services.session.current().await.is_none());
    // Not on the checkout page, so the forced logout navigates home.
    assert_eq!(app.browser.navigations(), vec!["/".to_string()]);
}

#[tokio::test]
async fn expired_token_fails_locally_without_a_request() {
    let app = TestApp::new().await;
    app.seed_session(true, -60).await;

    Mock::given(method("GET"))
        .and(path("/cart"))
        .respond_with(ResponseTemplate::new(200).set_body_json(enveloped(json!([]))))
        .expect(0)
        .mount(&app.backend)
        .await;

    let err = app.services.backend.server_cart().await.unwrap_err();
    assert_matches!(err, ServiceError::SessionExpired);
    assert!(app.services.session.current().await.is_none());
}

#[tokio::test]
async fn bad_gateway_destroys_the_session_and_navigates_home() {
    let app = TestApp::new().await;
    app.seed_session(true, 3600).await;

    Mock::given(method("GET"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(502))
        .expect(1)
        .mount(&app.backend)
        .await;

    let err = app.services.backend.list_orders(1).await.unwrap_err();
    assert_matches!(err, ServiceError::InfrastructureFailure);
    assert!(app.services.session.current().await.is_none());
    assert_eq!(app.browser.navigations(), vec!["/".to_string()]);
}

#[tokio::test]
async fn non_renewable_401_skips_redirect_on_checkout_page() {
    let app = TestApp::new().await;
    // keep_session disabled: renewal preconditions are not met.
    app.seed_session(false, 3600).await;
    app.browser.set_route("/checkout");

    Mock::given(method("GET"))
        .and(path("/cart"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&app.backend)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(refresh_body(3600)))
        .expect(0)
        .mount(&app.backend)
        .await;

    let err = app.services.backend.server_cart().await.unwrap_err();
    assert_matches!(err, ServiceError::SessionExpired);
    assert!(app.services.session.current().await.is_none());
    // The checkout page shows the failure in context instead of redirecting.
    assert!(app.browser.navigations().is_empty());
}

#[tokio::test]
async fn failed_renewal_forces_logout() {
    let app = TestApp::new().await;
    app.seed_session(true, 3600).await;

    Mock::given(method("GET"))
        .and(path("/cart"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&app.backend)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh-token"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&app.backend)
        .await;

    let err = app.services.backend.server_cart().await.unwrap_err();
    assert_matches!(err, ServiceError::AuthError(_));
    assert!(app.services.session.current().await.is_none());
}

#[tokio::test]
async fn login_installs_a_session_with_decoded_expiry() {
    let app = TestApp::new().await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(enveloped(json!({
            "token": make_jwt(1800),
            "refreshToken": "refresh-login",
            "role": "customer"
        }))))
        .expect(1)
        .mount(&app.backend)
        .await;

    let session = app
        .services
        .backend
        .login("user@example.com", "hunter2", true)
        .await
        .unwrap();

    assert_eq!(session.refresh_token, "refresh-login");
    assert!(session.keep_session);
    assert!(session.expires_at > chrono::Utc::now());
    assert!(app.services.session.is_authenticated().await);
}

#[tokio::test]
async fn backend_error_message_is_surfaced() {
    let app = TestApp::new().await;
    app.seed_session(true, 3600).await;

    Mock::given(method("GET"))
        .and(path("/cart"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({ "message": "cart is locked" })),
        )
        .mount(&app.backend)
        .await;

    let err = app.services.backend.server_cart().await.unwrap_err();
    assert_matches!(err, ServiceError::BackendError(message) => {
        assert_eq!(message, "cart is locked");
    });
}
