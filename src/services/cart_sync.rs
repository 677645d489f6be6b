//! Anonymous-cart reconciliation.
//!
//! When authentication appears and local items exist, each local item is
//! upserted into the server cart in parallel. The local cart is cleared
//! only when every upsert succeeds; a partial failure keeps the local
//! items so nothing the visitor picked is lost.
//!
//! The reconciliation runs exactly once per login session. The guard is an
//! explicit `idle -> in_flight(key) -> settled(key)` state machine keyed on
//! the session's access token, so re-observations of the same auth state
//! (or re-renders upstream) can never start a second pass.

use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::cache::{keys, QueryCache};
use crate::client::BackendClient;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::LocalCart;

#[derive(Debug, Clone, PartialEq, Eq)]
enum SyncState {
    Idle,
    InFlight(String),
    Settled(String),
}

/// Why a trigger did not start a reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Unauthenticated,
    EmptyLocalCart,
    AlreadySynced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Synced { item_count: usize },
    Skipped(SkipReason),
}

pub struct CartReconciler {
    backend: Arc<BackendClient>,
    local_cart: Arc<LocalCart>,
    cache: Arc<QueryCache>,
    events: EventSender,
    state: Mutex<SyncState>,
}

impl CartReconciler {
    pub fn new(
        backend: Arc<BackendClient>,
        local_cart: Arc<LocalCart>,
        cache: Arc<QueryCache>,
        events: EventSender,
    ) -> Self {
        Self {
            backend,
            local_cart,
            cache,
            events,
            state: Mutex::new(SyncState::Idle),
        }
    }

    /// Trigger point, called whenever the authentication state is observed.
    ///
    /// Does nothing while unauthenticated, when the local cart is empty,
    /// or when this login session already has a pass in flight or settled.
    #[instrument(skip(self))]
    pub async fn observe_auth(&self) -> Result<SyncOutcome, ServiceError> {
        let Some(session) = self.backend.session().current().await else {
            return Ok(SyncOutcome::Skipped(SkipReason::Unauthenticated));
        };

        let items = self.local_cart.items().await;
        if items.is_empty() {
            return Ok(SyncOutcome::Skipped(SkipReason::EmptyLocalCart));
        }

        let session_key = session.access_token;
        {
            let mut state = self.state.lock().await;
            match &*state {
                SyncState::InFlight(key) | SyncState::Settled(key) if *key == session_key => {
                    return Ok(SyncOutcome::Skipped(SkipReason::AlreadySynced));
                }
                _ => *state = SyncState::InFlight(session_key.clone()),
            }
        }

        let item_count = items.len();
        let results = join_all(
            items
                .iter()
                .map(|item| self.backend.upsert_cart_item(item)),
        )
        .await;

        if let Some(err) = results.into_iter().find_map(Result::err) {
            // Partial failure: local items stay put, and the guard returns
            // to idle so a later auth observation may retry.
            warn!("cart reconciliation failed, keeping local cart: {}", err);
            *self.state.lock().await = SyncState::Idle;
            return Err(err);
        }

        self.local_cart.clear().await;
        self.cache.invalidate(keys::SERVER_CART);
        *self.state.lock().await = SyncState::Settled(session_key);

        self.events
            .send_or_log(Event::CartSynced { item_count })
            .await;
        info!(item_count, "local cart reconciled into server cart");
        Ok(SyncOutcome::Synced { item_count })
    }
}
