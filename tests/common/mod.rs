#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{Duration, Utc};
use serde_json::json;
use tokio::sync::mpsc;
use uuid::Uuid;
use wiremock::MockServer;

use checkout_core::browser::BrowserPort;
use checkout_core::config::{AppConfig, GatewayConfig};
use checkout_core::errors::ServiceError;
use checkout_core::events::Event;
use checkout_core::session::{Role, Session};
use checkout_core::AppServices;

pub const CHROME_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
pub const SAFARI_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15";

/// Browser double that records navigations and opened contexts.
pub struct RecordingBrowser {
    user_agent: Mutex<String>,
    route: Mutex<String>,
    opened: Mutex<Vec<String>>,
    navigations: Mutex<Vec<String>>,
}

impl RecordingBrowser {
    pub fn new() -> Self {
        Self {
            user_agent: Mutex::new(CHROME_UA.to_string()),
            route: Mutex::new("/".to_string()),
            opened: Mutex::new(Vec::new()),
            navigations: Mutex::new(Vec::new()),
        }
    }

    pub fn set_user_agent(&self, ua: &str) {
        *self.user_agent.lock().unwrap() = ua.to_string();
    }

    pub fn set_route(&self, route: &str) {
        *self.route.lock().unwrap() = route.to_string();
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrowserPort for RecordingBrowser {
    fn user_agent(&self) -> String {
        self.user_agent.lock().unwrap().clone()
    }

    fn current_route(&self) -> String {
        self.route.lock().unwrap().clone()
    }

    async fn open_in_new_context(&self, url: &str) -> Result<(), ServiceError> {
        self.opened.lock().unwrap().push(url.to_string());
        Ok(())
    }

    async fn navigate(&self, route: &str) {
        self.navigations.lock().unwrap().push(route.to_string());
    }
}

/// Full service graph wired against two wiremock servers.
pub struct TestApp {
    pub backend: MockServer,
    pub gateway: MockServer,
    pub services: AppServices,
    pub events: mpsc::Receiver<Event>,
    pub browser: Arc<RecordingBrowser>,
}

impl TestApp {
    pub async fn new() -> Self {
        let backend = MockServer::start().await;
        let gateway = MockServer::start().await;

        let config = AppConfig::new(
            backend.uri(),
            "http://storefront.test/payment-response".into(),
            GatewayConfig {
                base_url: gateway.uri(),
                token: "test_gateway_token_long_enough".into(),
                store_id: "store-1".into(),
            },
        );

        let browser = Arc::new(RecordingBrowser::new());
        let (services, events) = AppServices::build(config, browser.clone() as Arc<dyn BrowserPort>)
            .expect("service graph");

        Self {
            backend,
            gateway,
            services,
            events,
            browser,
        }
    }

    /// Installs a session directly, bypassing the login endpoint.
    pub async fn seed_session(&self, keep_session: bool, ttl_secs: i64) -> Session {
        let session = Session {
            access_token: make_jwt(ttl_secs),
            refresh_token: "refresh-1".into(),
            expires_at: Utc::now() + Duration::seconds(ttl_secs),
            keep_session,
            role: Role::Customer,
        };
        self.services.session.replace(session.clone()).await;
        session
    }
}

/// Unsigned JWT carrying only the exp claim, the shape the session layer
/// decodes expiry from.
pub fn make_jwt(ttl_secs: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let exp = (Utc::now() + Duration::seconds(ttl_secs)).timestamp();
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"user-1","exp":{}}}"#, exp));
    format!("{}.{}.testsig", header, payload)
}

/// Wraps a payload in the backend's response envelope.
pub fn enveloped(content: serde_json::Value) -> serde_json::Value {
    json!({ "content": content })
}

/// Backend body for a persisted order + transaction.
pub fn persisted_payment_body(order_id: Uuid, client_txn_id: &str) -> serde_json::Value {
    enveloped(json!({
        "orderId": order_id,
        "transaction": {
            "clientTxnId": client_txn_id,
            "orderId": order_id,
            "addressId": Uuid::new_v4(),
            "provider": "payphone",
            "providerPayload": {},
            "amount": "25.50",
            "status": "pending"
        }
    }))
}

/// Backend body for a transaction status update.
pub fn transaction_body(client_txn_id: &str, status: &str) -> serde_json::Value {
    enveloped(json!({
        "clientTxnId": client_txn_id,
        "addressId": Uuid::new_v4(),
        "provider": "payphone",
        "providerPayload": {},
        "amount": "25.50",
        "status": status
    }))
}

/// A local cart item payload.
pub fn cart_item(product_id: Uuid, quantity: u32) -> checkout_core::models::CartItem {
    checkout_core::models::CartItem {
        id: None,
        product_id,
        quantity,
        unit_price: rust_decimal_macros::dec!(10.00),
        discount: rust_decimal_macros::dec!(0),
    }
}
