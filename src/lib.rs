//! Checkout Core
//!
//! Payment orchestration and order-lifecycle services for the storefront:
//! gateway integration (link, phone push, manual deposits), idempotent
//! transaction identity, the order status state machine, anonymous-cart
//! reconciliation on login, and silent access-token renewal.
//!
//! The rendering layers (storefront and admin UI) sit on top of
//! [`AppServices`]. Everything else they need (catalog, addresses, user
//! administration) talks to the backend directly and is out of scope here.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod browser;
pub mod cache;
pub mod client;
pub mod config;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod models;
pub mod services;
pub mod session;
pub mod txid;

use std::sync::Arc;
use tokio::sync::mpsc;

use browser::BrowserPort;
use cache::QueryCache;
use client::BackendClient;
use config::AppConfig;
use errors::ServiceError;
use events::outbox::ChargeOutbox;
use events::{Event, EventSender};
use gateway::PayphoneClient;
use models::LocalCart;
use services::{CartReconciler, OrderStatusService, PaymentFlowService, PaymentStatusVerifier};
use session::SessionStore;

/// Wired service graph for one storefront process.
#[derive(Clone)]
pub struct AppServices {
    pub config: Arc<AppConfig>,
    pub session: Arc<SessionStore>,
    pub local_cart: Arc<LocalCart>,
    pub cache: Arc<QueryCache>,
    pub backend: Arc<BackendClient>,
    pub gateway: Arc<PayphoneClient>,
    pub outbox: Arc<ChargeOutbox>,
    pub checkout: Arc<PaymentFlowService>,
    pub cart_sync: Arc<CartReconciler>,
    pub verifier: Arc<PaymentStatusVerifier>,
    pub order_status: Arc<OrderStatusService>,
    pub events: EventSender,
}

impl AppServices {
    /// Builds the full service graph.
    ///
    /// Returns the receiving half of the event channel so the embedder can
    /// forward domain events to its own notification surface.
    pub fn build(
        config: AppConfig,
        browser: Arc<dyn BrowserPort>,
    ) -> Result<(Self, mpsc::Receiver<Event>), ServiceError> {
        let (events, event_rx) = EventSender::channel(config.event_channel_capacity);

        let session = Arc::new(SessionStore::new());
        let local_cart = Arc::new(LocalCart::new());
        let cache = Arc::new(QueryCache::new(config.cache_ttl()));

        let backend = Arc::new(BackendClient::new(
            &config,
            Arc::clone(&session),
            Arc::clone(&browser),
            events.clone(),
            Arc::clone(&cache),
        )?);
        let gateway = Arc::new(PayphoneClient::new(&config)?);
        let outbox = Arc::new(ChargeOutbox::new(
            config.outbox_max_attempts,
            events.clone(),
        ));

        let checkout = Arc::new(PaymentFlowService::new(
            Arc::clone(&backend),
            Arc::clone(&gateway),
            Arc::clone(&browser),
            Arc::clone(&local_cart),
            Arc::clone(&cache),
            events.clone(),
            Arc::clone(&outbox),
            config.max_proof_bytes,
        ));
        let cart_sync = Arc::new(CartReconciler::new(
            Arc::clone(&backend),
            Arc::clone(&local_cart),
            Arc::clone(&cache),
            events.clone(),
        ));
        let verifier = Arc::new(PaymentStatusVerifier::new(
            Arc::clone(&backend),
            Arc::clone(&gateway),
            Arc::clone(&cache),
            events.clone(),
        ));
        let order_status = Arc::new(OrderStatusService::new(
            Arc::clone(&backend),
            events.clone(),
        ));

        let services = Self {
            config: Arc::new(config),
            session,
            local_cart,
            cache,
            backend,
            gateway,
            outbox,
            checkout,
            cart_sync,
            verifier,
            order_status,
            events,
        };
        Ok((services, event_rx))
    }

    /// Starts the background outbox worker. The handle aborts the worker
    /// when dropped by the embedder's shutdown path.
    pub fn start_outbox_worker(&self) -> tokio::task::JoinHandle<()> {
        ChargeOutbox::start_worker(
            Arc::clone(&self.outbox),
            Arc::clone(&self.backend),
            std::time::Duration::from_secs(self.config.outbox_poll_secs),
        )
    }
}

pub mod prelude {
    pub use crate::browser::{BrowserPort, NoopBrowser};
    pub use crate::client::BackendClient;
    pub use crate::config::{load_config, AppConfig};
    pub use crate::errors::ServiceError;
    pub use crate::events::{Event, EventSender};
    pub use crate::models::*;
    pub use crate::services::*;
    pub use crate::session::{Session, SessionStore};
    pub use crate::txid::ClientTxnId;
    pub use crate::AppServices;
}
