use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

pub mod outbox;

/// Events emitted by the payment and order-lifecycle services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Session events
    SessionRenewed,
    SessionRevoked {
        reason: String,
    },

    // Cart events
    CartSynced {
        item_count: usize,
    },

    // Order events
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },

    // Payment events
    PaymentCreated {
        client_txn_id: String,
        order_id: Uuid,
    },
    PaymentCompleted {
        client_txn_id: String,
    },
    /// Gateway accepted a charge the backend failed to record.
    ChargeOrphaned {
        client_txn_id: String,
    },
    /// A previously orphaned charge was persisted by the outbox worker.
    ChargeRecovered {
        client_txn_id: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a bounded channel and the sender half wrapped for services.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when no receiver is left.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("event dropped: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_are_delivered_in_order() {
        let (sender, mut rx) = EventSender::channel(8);
        sender.send(Event::SessionRenewed).await.unwrap();
        sender
            .send(Event::CartSynced { item_count: 2 })
            .await
            .unwrap();

        assert!(matches!(rx.recv().await, Some(Event::SessionRenewed)));
        assert!(matches!(
            rx.recv().await,
            Some(Event::CartSynced { item_count: 2 })
        ));
    }

    #[tokio::test]
    async fn send_or_log_swallows_closed_channel() {
        let (sender, rx) = EventSender::channel(1);
        drop(rx);
        sender.send_or_log(Event::SessionRenewed).await;
    }
}
