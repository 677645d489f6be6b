//! Order status state machine.
//!
//! The single source of truth for which status transitions an operator may
//! request. Both the admin order-detail surface and the payment verifier
//! consult this table; a transition outside it is rejected before any
//! backend call is issued.

use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::client::BackendClient;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{Order, OrderStatus};

/// Canonical non-terminal statuses, the targets available to statuses the
/// table does not constrain.
const NON_TERMINAL: [OrderStatus; 3] = [
    OrderStatus::Pending,
    OrderStatus::PaidPendingReview,
    OrderStatus::Shipping,
];

/// Returns the transition targets allowed from `from`.
pub fn allowed_targets(from: &OrderStatus) -> Vec<OrderStatus> {
    match from {
        OrderStatus::Pending => vec![OrderStatus::Cancelled],
        OrderStatus::PaidPendingReview => vec![OrderStatus::Shipping, OrderStatus::Cancelled],
        OrderStatus::Shipping => vec![OrderStatus::Completed, OrderStatus::Cancelled],
        OrderStatus::Completed | OrderStatus::Cancelled => vec![],
        // Unknown statuses are unconstrained: any canonical non-terminal
        // status except themselves.
        OrderStatus::Other(_) => NON_TERMINAL.to_vec(),
    }
}

/// Whether a transition request may be issued at all.
pub fn can_transition(from: &OrderStatus, to: &OrderStatus) -> bool {
    if from == to {
        return false;
    }
    match from {
        OrderStatus::Other(_) => !to.is_terminal(),
        _ => allowed_targets(from).contains(to),
    }
}

#[derive(Clone)]
pub struct OrderStatusService {
    client: Arc<BackendClient>,
    events: EventSender,
}

impl OrderStatusService {
    pub fn new(client: Arc<BackendClient>, events: EventSender) -> Self {
        Self { client, events }
    }

    /// Requests a status transition, enforcing the table locally first.
    #[instrument(skip(self), fields(order_id = %order_id, from = %from, to = %to))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        from: &OrderStatus,
        to: &OrderStatus,
    ) -> Result<Order, ServiceError> {
        if !can_transition(from, to) {
            return Err(ServiceError::InvalidStatus(format!(
                "cannot transition order from '{}' to '{}'",
                from, to
            )));
        }

        let order = self.client.update_order_status(order_id, to).await?;

        self.events
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: from.to_string(),
                new_status: to.to_string(),
            })
            .await;

        info!("order {} status updated from '{}' to '{}'", order_id, from, to);
        Ok(order)
    }
}
