use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::cart::CartItem;
use super::payment::PaymentTransaction;

/// Order status as tracked by the backend.
///
/// The canonical statuses drive the transition table in
/// `services::order_status`; anything else the backend reports is carried
/// verbatim in `Other` and treated as unconstrained.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, strum::Display, strum::EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(from = "String", into = "String")]
pub enum OrderStatus {
    Pending,
    PaidPendingReview,
    Shipping,
    Completed,
    Cancelled,
    #[strum(default, to_string = "{0}")]
    Other(String),
}

impl OrderStatus {
    /// Terminal statuses accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl From<String> for OrderStatus {
    fn from(raw: String) -> Self {
        raw.parse().unwrap_or(Self::Other(raw))
    }
}

impl From<OrderStatus> for String {
    fn from(status: OrderStatus) -> Self {
        status.to_string()
    }
}

/// Order as returned by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub status: OrderStatus,
    pub total: Decimal,
    pub address_id: Uuid,
    #[serde(default)]
    pub items: Vec<CartItem>,
    /// Transaction attempts, oldest first. Regeneration appends, it never
    /// deletes history.
    #[serde(default)]
    pub payments: Vec<PaymentTransaction>,
}
