//! Backend REST client.
//!
//! Every call to the storefront backend flows through [`BackendClient::request`],
//! which owns the token-guard contract:
//!
//! - a bearer token is attached when a session exists, and a request is
//!   never dispatched with a token already known to be expired;
//! - any 502 is an infrastructure failure: the session is destroyed and
//!   the browser is sent to the home route;
//! - a 401 triggers at most one silent renewal per original request, after
//!   which the request is re-issued with the new token; a second 401, or a
//!   failed renewal, destroys the session.
//!
//! Responses arrive in the documented envelope `{ "content": ..., "message": ... }`
//! (`data` is accepted as a legacy alias for `content`).

use chrono::Utc;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::browser::BrowserPort;
use crate::cache::{keys, QueryCache};
use crate::config::AppConfig;
use crate::errors::{ServiceError, GENERIC_FAILURE_MESSAGE};
use crate::events::{Event, EventSender};
use crate::models::{
    CartItem, Order, OrderStatus, PaymentStatus, PaymentTransaction, PersistPaymentRequest,
    PersistedPayment,
};
use crate::session::{self, Role, Session, SessionStore};
use crate::txid::ClientTxnId;

/// Documented response envelope used by the backend.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(alias = "data")]
    pub content: T,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenPair {
    token: String,
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    token: String,
    refresh_token: String,
    role: Role,
}

pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    session: Arc<SessionStore>,
    browser: Arc<dyn BrowserPort>,
    events: EventSender,
    cache: Arc<QueryCache>,
    home_route: String,
    checkout_route: String,
}

impl BackendClient {
    pub fn new(
        config: &AppConfig,
        session: Arc<SessionStore>,
        browser: Arc<dyn BrowserPort>,
        events: EventSender,
        cache: Arc<QueryCache>,
    ) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client: {}", e)))?;
        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            session,
            browser,
            events,
            cache,
            home_route: config.home_route.clone(),
            checkout_route: config.checkout_route.clone(),
        })
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Destroys the session as one atomic clear and announces it.
    async fn force_logout(&self, reason: &str) {
        warn!(reason = %reason, "forcing logout");
        self.session.clear().await;
        self.events
            .send_or_log(Event::SessionRevoked {
                reason: reason.to_string(),
            })
            .await;
    }

    /// Forced-logout redirect, skipped on the checkout page so the user can
    /// read the in-context failure message instead of being yanked away.
    async fn redirect_home_unless_checkout(&self) {
        if self.browser.current_route() != self.checkout_route {
            self.browser.navigate(&self.home_route).await;
        }
    }

    /// Renews the session: one refresh call, new expiry decoded from the
    /// new access token, whole session swapped atomically.
    async fn renew(&self) -> Result<String, ServiceError> {
        let current = self
            .session
            .current()
            .await
            .ok_or(ServiceError::SessionExpired)?;

        let response = self
            .http
            .post(self.url("auth/refresh-token"))
            .json(&json!({ "refreshToken": current.refresh_token }))
            .send()
            .await
            .map_err(|e| ServiceError::AuthError(format!("refresh call failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ServiceError::AuthError(format!(
                "refresh rejected with {}",
                response.status()
            )));
        }

        let envelope: Envelope<TokenPair> = response
            .json()
            .await
            .map_err(|e| ServiceError::AuthError(format!("malformed refresh response: {}", e)))?;

        let pair = envelope.content;
        let expires_at = session::decode_expiry(&pair.token)?;
        let renewed = Session {
            access_token: pair.token.clone(),
            refresh_token: pair.refresh_token,
            expires_at,
            keep_session: current.keep_session,
            role: current.role,
        };
        self.session.replace(renewed).await;
        self.events.send_or_log(Event::SessionRenewed).await;
        info!("access token renewed");
        Ok(pair.token)
    }

    /// Core guarded request path. See the module docs for the contract.
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T, ServiceError> {
        let mut bearer = match self.session.current().await {
            Some(current) if current.is_expired(Utc::now()) => {
                self.force_logout("access token expired before dispatch")
                    .await;
                return Err(ServiceError::SessionExpired);
            }
            Some(current) => Some(current.access_token),
            None => None,
        };

        // At most one renewal per original request.
        let mut retried = false;

        loop {
            let mut request = self.http.request(method.clone(), self.url(path));
            if let Some(token) = &bearer {
                request = request.bearer_auth(token);
            }
            if let Some(body) = &body {
                request = request.json(body);
            }

            let response = request
                .send()
                .await
                .map_err(|e| ServiceError::BackendError(e.to_string()))?;

            match response.status() {
                StatusCode::BAD_GATEWAY => {
                    self.force_logout("backend returned 502").await;
                    self.browser.navigate(&self.home_route).await;
                    return Err(ServiceError::InfrastructureFailure);
                }
                StatusCode::UNAUTHORIZED => {
                    let renewable = !retried
                        && self
                            .session
                            .current()
                            .await
                            .map_or(false, |s| s.is_renewable());
                    if renewable {
                        retried = true;
                        match self.renew().await {
                            Ok(token) => {
                                bearer = Some(token);
                                continue;
                            }
                            Err(err) => {
                                self.force_logout("token renewal failed").await;
                                return Err(err);
                            }
                        }
                    }
                    self.force_logout("unauthorized and not renewable").await;
                    self.redirect_home_unless_checkout().await;
                    return Err(ServiceError::SessionExpired);
                }
                status if status.is_success() => {
                    return response.json::<Envelope<T>>().await.map(|e| e.content).map_err(
                        |e| ServiceError::SerializationError(format!("response decode: {}", e)),
                    );
                }
                status => {
                    let message = response
                        .json::<ErrorBody>()
                        .await
                        .ok()
                        .and_then(|body| body.message)
                        .unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string());
                    warn!(status = %status, path = %path, "backend call failed");
                    return Err(if status == StatusCode::NOT_FOUND {
                        ServiceError::NotFound(message)
                    } else {
                        ServiceError::BackendError(message)
                    });
                }
            }
        }
    }

    // ---- auth ----

    /// Authenticates and installs the session.
    #[instrument(skip(self, password))]
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        keep_session: bool,
    ) -> Result<Session, ServiceError> {
        let response = self
            .http
            .post(self.url("auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| ServiceError::BackendError(e.to_string()))?;

        if !response.status().is_success() {
            let message = response
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|body| body.message)
                .unwrap_or_else(|| "invalid credentials".to_string());
            return Err(ServiceError::AuthError(message));
        }

        let envelope: Envelope<LoginResponse> = response
            .json()
            .await
            .map_err(|e| ServiceError::SerializationError(format!("login decode: {}", e)))?;
        let login = envelope.content;

        let session = Session {
            expires_at: session::decode_expiry(&login.token)?,
            access_token: login.token,
            refresh_token: login.refresh_token,
            keep_session,
            role: login.role,
        };
        self.session.replace(session.clone()).await;
        Ok(session)
    }

    /// Explicit logout: best-effort backend call, then local clear.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        if let Some(current) = self.session.current().await {
            let _ = self
                .http
                .post(self.url("auth/logout"))
                .bearer_auth(&current.access_token)
                .send()
                .await;
        }
        self.force_logout("user logout").await;
    }

    // ---- cart ----

    pub async fn server_cart(&self) -> Result<Vec<CartItem>, ServiceError> {
        if let Some(cached) = self.cache.get::<Vec<CartItem>>(keys::SERVER_CART) {
            return Ok(cached);
        }
        let items: Vec<CartItem> = self.request(Method::GET, "cart", None).await?;
        self.cache.put(keys::SERVER_CART, &items);
        Ok(items)
    }

    pub async fn upsert_cart_item(&self, item: &CartItem) -> Result<CartItem, ServiceError> {
        let body = serde_json::to_value(item)
            .map_err(|e| ServiceError::SerializationError(e.to_string()))?;
        self.request(Method::POST, "cart/items", Some(body)).await
    }

    // ---- orders ----

    pub async fn list_orders(&self, page: u32) -> Result<Vec<Order>, ServiceError> {
        let key = format!("{}:{}", keys::ORDERS, page);
        if let Some(cached) = self.cache.get::<Vec<Order>>(&key) {
            return Ok(cached);
        }
        let orders: Vec<Order> = self
            .request(Method::GET, &format!("orders?page={}", page), None)
            .await?;
        self.cache.put(&key, &orders);
        Ok(orders)
    }

    /// Raw status write. Callers go through
    /// `services::order_status::OrderStatusService`, which gates the
    /// transition against the table before this call is made.
    pub async fn update_order_status(
        &self,
        order_id: Uuid,
        status: &OrderStatus,
    ) -> Result<Order, ServiceError> {
        self.request(
            Method::PATCH,
            &format!("orders/{}/status", order_id),
            Some(json!({ "status": status })),
        )
        .await
    }

    // ---- payments ----

    /// Creates a new order together with its first transaction attempt.
    #[instrument(skip(self, request), fields(client_txn_id = %request.client_txn_id))]
    pub async fn create_order_with_payment(
        &self,
        request: &PersistPaymentRequest,
    ) -> Result<PersistedPayment, ServiceError> {
        let body = serde_json::to_value(request)
            .map_err(|e| ServiceError::SerializationError(e.to_string()))?;
        self.request(Method::POST, "orders/payments", Some(body))
            .await
    }

    /// Attaches a new transaction attempt to an existing order without
    /// creating a duplicate order.
    #[instrument(skip(self, request), fields(order_id = %order_id, client_txn_id = %request.client_txn_id))]
    pub async fn regenerate_payment(
        &self,
        order_id: Uuid,
        request: &PersistPaymentRequest,
    ) -> Result<PersistedPayment, ServiceError> {
        let body = serde_json::to_value(request)
            .map_err(|e| ServiceError::SerializationError(e.to_string()))?;
        self.request(
            Method::POST,
            &format!("orders/{}/payments", order_id),
            Some(body),
        )
        .await
    }

    /// Pending transactions awaiting verification (admin sweep input).
    pub async fn pending_payments(&self) -> Result<Vec<PaymentTransaction>, ServiceError> {
        if let Some(cached) = self
            .cache
            .get::<Vec<PaymentTransaction>>(keys::PENDING_PAYMENTS)
        {
            return Ok(cached);
        }
        let payments: Vec<PaymentTransaction> =
            self.request(Method::GET, "payments/pending", None).await?;
        self.cache.put(keys::PENDING_PAYMENTS, &payments);
        Ok(payments)
    }

    /// Marks a payment's status; the backend cascades the owning order into
    /// its next valid status.
    #[instrument(skip(self), fields(client_txn_id = %txn))]
    pub async fn update_payment_status(
        &self,
        txn: &ClientTxnId,
        status: PaymentStatus,
    ) -> Result<PaymentTransaction, ServiceError> {
        self.request(
            Method::PATCH,
            &format!("payments/{}/status", txn),
            Some(json!({ "status": status })),
        )
        .await
    }
}
