//! Payment status verification.
//!
//! Polls the gateway for pending transactions and promotes the ones the
//! gateway reports complete. Link transactions are never polled: they are
//! confirmed exclusively by the gateway's out-of-band callback, so asking
//! the phone-status endpoint about them is a recognized "not applicable"
//! outcome, not an error.
//!
//! Batch sweeps are guarded per "orders changed" signature with an
//! explicit `in_flight -> settled` marker, never a time-based debounce: a
//! second trigger for the same set of orders while the first sweep is
//! settling (or already settled) is a no-op.

use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::cache::{keys, QueryCache};
use crate::client::BackendClient;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::gateway::PayphoneClient;
use crate::models::{PaymentStatus, PendingPayment, ProviderPayload};
use crate::txid::ClientTxnId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SweepState {
    InFlight,
    Settled,
}

/// Result of verifying a single transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Gateway confirmed completion; the backend was updated.
    Completed,
    /// Gateway has not completed the transaction; nothing changed.
    Pending,
    /// Link-modality transaction; confirmation is out-of-band.
    NotApplicable,
}

/// Tally of one batch sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub completed: usize,
    pub pending: usize,
    pub not_applicable: usize,
    pub failed: usize,
    /// True when the sweep guard suppressed the run entirely.
    pub skipped: bool,
}

pub struct PaymentStatusVerifier {
    backend: Arc<BackendClient>,
    gateway: Arc<PayphoneClient>,
    cache: Arc<QueryCache>,
    events: EventSender,
    sweeps: DashMap<String, SweepState>,
}

impl PaymentStatusVerifier {
    pub fn new(
        backend: Arc<BackendClient>,
        gateway: Arc<PayphoneClient>,
        cache: Arc<QueryCache>,
        events: EventSender,
    ) -> Self {
        Self {
            backend,
            gateway,
            cache,
            events,
            sweeps: DashMap::new(),
        }
    }

    /// Verifies one transaction against the gateway.
    #[instrument(skip(self, payload), fields(client_txn_id = %txn))]
    pub async fn verify(
        &self,
        txn: &ClientTxnId,
        payload: Option<&ProviderPayload>,
    ) -> Result<VerifyOutcome, ServiceError> {
        if payload.map_or(false, ProviderPayload::is_link) {
            return Ok(VerifyOutcome::NotApplicable);
        }

        let status = self.gateway.transaction_status(txn).await?;
        if !status.is_completed() {
            return Ok(VerifyOutcome::Pending);
        }

        self.backend
            .update_payment_status(txn, PaymentStatus::Completed)
            .await?;
        self.cache.invalidate_prefix(keys::PENDING_PAYMENTS);
        self.cache.invalidate_prefix(keys::ORDERS);
        self.events
            .send_or_log(Event::PaymentCompleted {
                client_txn_id: txn.to_string(),
            })
            .await;
        info!("payment confirmed by gateway and marked completed");
        Ok(VerifyOutcome::Completed)
    }

    /// Signature of a batch: the sorted order ids it covers.
    pub fn sweep_signature(batch: &[PendingPayment]) -> String {
        let mut ids: Vec<String> = batch.iter().map(|p| p.order_id.to_string()).collect();
        ids.sort();
        ids.join(",")
    }

    /// Verifies a batch of pending transactions in parallel.
    ///
    /// Each item's effect is independent and commutative, so per-item
    /// failures are tallied rather than aborting the sweep.
    #[instrument(skip(self, batch), fields(batch_len = batch.len()))]
    pub async fn sweep(&self, batch: Vec<PendingPayment>) -> Result<SweepReport, ServiceError> {
        let signature = Self::sweep_signature(&batch);

        match self.sweeps.entry(signature.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                info!(signature = %signature, "sweep already ran for this signature; skipping");
                return Ok(SweepReport {
                    skipped: true,
                    ..SweepReport::default()
                });
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(SweepState::InFlight);
            }
        }
        // The orders-changed signature supersedes older ones; drop settled
        // markers that no longer describe the current order set.
        self.sweeps
            .retain(|key, state| key == &signature || *state == SweepState::InFlight);

        let results = join_all(batch.iter().map(|payment| {
            self.verify(&payment.client_txn_id, Some(&payment.provider_payload))
        }))
        .await;

        let mut report = SweepReport::default();
        for result in results {
            match result {
                Ok(VerifyOutcome::Completed) => report.completed += 1,
                Ok(VerifyOutcome::Pending) => report.pending += 1,
                Ok(VerifyOutcome::NotApplicable) => report.not_applicable += 1,
                Err(err) => {
                    warn!("sweep item failed: {}", err);
                    report.failed += 1;
                }
            }
        }

        self.sweeps.insert(signature, SweepState::Settled);
        info!(
            completed = report.completed,
            pending = report.pending,
            not_applicable = report.not_applicable,
            failed = report.failed,
            "verification sweep settled"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn pending(order_id: Uuid) -> PendingPayment {
        PendingPayment {
            order_id,
            client_txn_id: ClientTxnId::new(format!("txn-{}", order_id)),
            provider_payload: ProviderPayload::none(),
        }
    }

    #[test]
    fn signature_is_order_insensitive() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let sig_ab = PaymentStatusVerifier::sweep_signature(&[pending(a), pending(b)]);
        let sig_ba = PaymentStatusVerifier::sweep_signature(&[pending(b), pending(a)]);
        assert_eq!(sig_ab, sig_ba);
    }

    #[test]
    fn signature_changes_with_the_order_set() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let sig_a = PaymentStatusVerifier::sweep_signature(&[pending(a)]);
        let sig_ab = PaymentStatusVerifier::sweep_signature(&[pending(a), pending(b)]);
        assert_ne!(sig_a, sig_ab);
    }
}
