use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::txid::ClientTxnId;

/// Canonical hyphenated UUID shape accepted for `payment_method_id`.
///
/// The storefront historically used the sentinel `"payphone-default"` for
/// the gateway's built-in method; that value (and any other non-UUID) must
/// be dropped from outgoing payloads rather than rejected.
static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("uuid regex")
});

/// Parses a payment method id, silently dropping sentinels and other
/// non-UUID values.
pub fn payment_method_uuid(raw: &str) -> Option<Uuid> {
    if !UUID_RE.is_match(raw) {
        return None;
    }
    Uuid::parse_str(raw).ok()
}

/// Payment transaction status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Awaiting gateway confirmation.
    Pending,
    /// Manual-review state for deposit proofs.
    PendingReview,
    Completed,
}

/// Where the money moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentProvider {
    Payphone,
    CashDeposit,
    CryptoDeposit,
    MercadoPago,
}

/// Opaque gateway data persisted alongside a transaction.
///
/// Link payments carry the gateway `payment_id` and the hosted-page URL;
/// the presence of a `payment_id` is what marks a transaction as
/// link-modality for the verifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
}

impl ProviderPayload {
    pub fn link(payment_id: String, redirect_url: String) -> Self {
        Self {
            payment_id: Some(payment_id),
            redirect_url: Some(redirect_url),
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    /// Link transactions are confirmed out-of-band, never polled.
    pub fn is_link(&self) -> bool {
        self.payment_id.is_some()
    }
}

/// Payment transaction as persisted by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentTransaction {
    pub client_txn_id: ClientTxnId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<Uuid>,
    pub address_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method_id: Option<Uuid>,
    pub provider: PaymentProvider,
    #[serde(default)]
    pub provider_payload: ProviderPayload,
    pub amount: Decimal,
    pub status: PaymentStatus,
}

/// Backend write issued after (and only after) the gateway call succeeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistPaymentRequest {
    pub client_txn_id: ClientTxnId,
    pub address_id: Uuid,
    /// Only present when the caller supplied a valid UUID; sentinels are
    /// dropped before this struct is built.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method_id: Option<Uuid>,
    pub provider: PaymentProvider,
    pub amount: Decimal,
    #[serde(default)]
    pub provider_payload: ProviderPayload,
    pub status: PaymentStatus,
}

/// Backend response to a create or regenerate call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedPayment {
    pub order_id: Uuid,
    pub transaction: PaymentTransaction,
}

/// Image proof attached to a manual deposit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositProof {
    pub filename: String,
    pub content_type: String,
    pub size_bytes: usize,
}

impl DepositProof {
    /// Client-side validation run before any network call.
    pub fn validate(&self, max_bytes: usize) -> Result<(), ServiceError> {
        if !self.content_type.starts_with("image/") {
            return Err(ServiceError::ValidationError(format!(
                "deposit proof must be an image, got {}",
                self.content_type
            )));
        }
        if self.size_bytes > max_bytes {
            return Err(ServiceError::ValidationError(format!(
                "deposit proof exceeds the {} byte limit",
                max_bytes
            )));
        }
        Ok(())
    }
}

/// Payment modality chosen at checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentModality {
    /// Redirect the payer to a gateway-hosted page in a new context.
    Link,
    /// Push a charge to the payer's phone inside the gateway app.
    Phone { number: String },
    /// Manual bank deposit backed by an image proof.
    CashDeposit { proof: DepositProof },
    /// Manual crypto deposit backed by an image proof.
    CryptoDeposit { proof: DepositProof },
}

impl PaymentModality {
    /// Whether this modality charges through the external gateway.
    pub fn uses_gateway(&self) -> bool {
        matches!(self, Self::Link | Self::Phone { .. })
    }

    pub fn provider(&self) -> PaymentProvider {
        match self {
            Self::Link | Self::Phone { .. } => PaymentProvider::Payphone,
            Self::CashDeposit { .. } => PaymentProvider::CashDeposit,
            Self::CryptoDeposit { .. } => PaymentProvider::CryptoDeposit,
        }
    }

    /// Initial transaction status persisted for this modality.
    pub fn initial_status(&self) -> PaymentStatus {
        match self {
            Self::Link | Self::Phone { .. } => PaymentStatus::Pending,
            Self::CashDeposit { .. } | Self::CryptoDeposit { .. } => PaymentStatus::PendingReview,
        }
    }
}

/// One pending transaction inside a verification sweep.
#[derive(Debug, Clone)]
pub struct PendingPayment {
    pub order_id: Uuid,
    pub client_txn_id: ClientTxnId,
    pub provider_payload: ProviderPayload,
}
