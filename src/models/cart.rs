use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Cart line item.
///
/// Lives in two disjoint stores: the in-memory [`LocalCart`] while the
/// visitor is anonymous, and the server cart once authenticated. Local
/// items carry no server `id` until they are reconciled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub product_id: Uuid,
    pub quantity: u32,
    /// Unit price captured at the time the item was added.
    pub unit_price: Decimal,
    /// Discount captured at the time the item was added.
    #[serde(default)]
    pub discount: Decimal,
}

impl CartItem {
    pub fn line_total(&self) -> Decimal {
        (self.unit_price - self.discount) * Decimal::from(self.quantity)
    }
}

/// Anonymous (unauthenticated) cart store.
///
/// Authoritative only while no session exists; cleared after a successful
/// reconciliation into the server cart or after a completed purchase.
#[derive(Debug, Default)]
pub struct LocalCart {
    items: RwLock<Vec<CartItem>>,
}

impl LocalCart {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn items(&self) -> Vec<CartItem> {
        self.items.read().await.clone()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    /// Adds an item, merging quantities when the product is already present.
    pub async fn add(&self, item: CartItem) {
        let mut items = self.items.write().await;
        if let Some(existing) = items
            .iter_mut()
            .find(|existing| existing.product_id == item.product_id)
        {
            existing.quantity += item.quantity;
        } else {
            items.push(item);
        }
    }

    pub async fn clear(&self) {
        self.items.write().await.clear();
    }
}
