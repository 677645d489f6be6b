//! Orphaned-charge outbox.
//!
//! When the gateway accepts a charge and the backend write that should
//! record it fails, money has moved with no local record. The orchestrator
//! never retries the gateway; instead the pending backend write is parked
//! here and a background worker retries it with exponential backoff until
//! it lands or exhausts its attempts.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::client::BackendClient;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::PersistPaymentRequest;

const BASE_BACKOFF_SECS: i64 = 2; // exponential backoff base

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxStatus {
    Pending,
    Processing,
    Delivered,
    Failed,
}

#[derive(Debug, Clone)]
pub struct OrphanedCharge {
    pub id: Uuid,
    /// Present when the failed write was a regeneration on an existing order.
    pub order_id: Option<Uuid>,
    pub request: PersistPaymentRequest,
    pub attempts: u32,
    pub status: OutboxStatus,
    pub last_error: Option<String>,
    pub recorded_at: DateTime<Utc>,
    pub available_at: DateTime<Utc>,
}

/// In-memory outbox store with a retry worker.
pub struct ChargeOutbox {
    entries: DashMap<Uuid, OrphanedCharge>,
    max_attempts: u32,
    events: EventSender,
}

impl ChargeOutbox {
    pub fn new(max_attempts: u32, events: EventSender) -> Self {
        Self {
            entries: DashMap::new(),
            max_attempts,
            events,
        }
    }

    /// Parks a backend write that failed after gateway success.
    ///
    /// Logged at error level on purpose: this is the state operators page on.
    pub fn enqueue(&self, order_id: Option<Uuid>, request: PersistPaymentRequest) -> Uuid {
        let id = Uuid::new_v4();
        error!(
            client_txn_id = %request.client_txn_id,
            provider = %request.provider,
            "gateway charge has no backend record; parked in outbox for recovery"
        );
        let now = Utc::now();
        self.entries.insert(
            id,
            OrphanedCharge {
                id,
                order_id,
                request,
                attempts: 0,
                status: OutboxStatus::Pending,
                last_error: None,
                recorded_at: now,
                available_at: now,
            },
        );
        id
    }

    pub fn pending(&self) -> Vec<OrphanedCharge> {
        self.by_status(OutboxStatus::Pending)
    }

    pub fn failed(&self) -> Vec<OrphanedCharge> {
        self.by_status(OutboxStatus::Failed)
    }

    fn by_status(&self, status: OutboxStatus) -> Vec<OrphanedCharge> {
        self.entries
            .iter()
            .filter(|entry| entry.status == status)
            .map(|entry| entry.clone())
            .collect()
    }

    fn due(&self, now: DateTime<Utc>) -> Vec<OrphanedCharge> {
        self.entries
            .iter()
            .filter(|entry| entry.status == OutboxStatus::Pending && entry.available_at <= now)
            .map(|entry| {
                let mut charge = entry.clone();
                charge.status = OutboxStatus::Processing;
                charge.attempts += 1;
                charge
            })
            .collect()
    }

    /// Applies the outcome of one persistence attempt.
    fn record_attempt(&self, id: Uuid, outcome: Result<(), String>) {
        let Some(mut entry) = self.entries.get_mut(&id) else {
            return;
        };
        match outcome {
            Ok(()) => {
                entry.status = OutboxStatus::Delivered;
                entry.last_error = None;
                info!(client_txn_id = %entry.request.client_txn_id, "orphaned charge recovered");
            }
            Err(message) => {
                entry.last_error = Some(message);
                if entry.attempts >= self.max_attempts {
                    entry.status = OutboxStatus::Failed;
                    warn!(
                        client_txn_id = %entry.request.client_txn_id,
                        attempts = entry.attempts,
                        "orphaned charge exhausted retries; manual recovery required"
                    );
                } else {
                    let backoff = BASE_BACKOFF_SECS.saturating_pow(entry.attempts);
                    entry.status = OutboxStatus::Pending;
                    entry.available_at = Utc::now() + ChronoDuration::seconds(backoff);
                }
            }
        }
    }

    /// One pass over the due entries, retrying the parked backend writes.
    /// Returns the number of charges recovered in this pass.
    pub async fn drain_once(&self, client: &BackendClient) -> Result<usize, ServiceError> {
        let mut recovered = 0;
        for charge in self.due(Utc::now()) {
            // Claim the entry before awaiting so a concurrent pass skips it.
            {
                let Some(mut entry) = self.entries.get_mut(&charge.id) else {
                    continue;
                };
                if entry.status != OutboxStatus::Pending {
                    continue;
                }
                entry.status = OutboxStatus::Processing;
                entry.attempts = charge.attempts;
            }

            let result = match charge.order_id {
                Some(order_id) => client
                    .regenerate_payment(order_id, &charge.request)
                    .await
                    .map(|_| ()),
                None => client
                    .create_order_with_payment(&charge.request)
                    .await
                    .map(|_| ()),
            };

            let txn = charge.request.client_txn_id.to_string();
            match result {
                Ok(()) => {
                    recovered += 1;
                    self.record_attempt(charge.id, Ok(()));
                    self.events
                        .send_or_log(Event::ChargeRecovered { client_txn_id: txn })
                        .await;
                }
                Err(err) => {
                    self.record_attempt(charge.id, Err(err.to_string()));
                }
            }
        }
        Ok(recovered)
    }

    /// Background worker polling the outbox until the handle is dropped.
    pub fn start_worker(
        outbox: Arc<Self>,
        client: Arc<BackendClient>,
        poll_interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                if let Err(e) = outbox.drain_once(&client).await {
                    error!("outbox worker error: {}", e);
                }
                sleep(poll_interval).await;
            }
        })
    }
}
