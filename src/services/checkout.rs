//! Payment flow orchestration.
//!
//! One entry point, [`PaymentFlowService::execute_payment_flow`], drives a
//! purchase or a regeneration end to end. The ordering is load-bearing:
//! the gateway is charged first, and the backend write happens only after
//! the gateway call resolves successfully. The reverse would record orders
//! nobody paid for; parallelizing would risk both.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::browser::{is_safari_family, BrowserPort};
use crate::cache::{keys, QueryCache};
use crate::client::BackendClient;
use crate::errors::{ServiceError, UNSUPPORTED_BROWSER_MESSAGE};
use crate::events::outbox::ChargeOutbox;
use crate::events::{Event, EventSender};
use crate::gateway::PayphoneClient;
use crate::models::payment::payment_method_uuid;
use crate::models::{
    LocalCart, PaymentModality, PersistPaymentRequest, PersistedPayment, ProviderPayload,
};
use crate::txid::{self, ClientTxnId};

/// Payment modality selector entry, rendered by the checkout surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentMethodOption {
    pub kind: PaymentMethodKind,
    pub label: &'static str,
    /// Unavailable options are rendered but not invokable.
    pub available: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMethodKind {
    Link,
    Phone,
    CashDeposit,
    CryptoDeposit,
    MercadoPago,
}

/// The uniform selection surface over the supported modalities.
///
/// Link is unavailable on Safari-family browsers; MercadoPago is listed
/// but not yet wired to a gateway.
pub fn payment_methods(user_agent: &str) -> Vec<PaymentMethodOption> {
    vec![
        PaymentMethodOption {
            kind: PaymentMethodKind::Link,
            label: "Pay by card",
            available: !is_safari_family(user_agent),
        },
        PaymentMethodOption {
            kind: PaymentMethodKind::Phone,
            label: "Pay with your phone",
            available: true,
        },
        PaymentMethodOption {
            kind: PaymentMethodKind::CashDeposit,
            label: "Bank deposit",
            available: true,
        },
        PaymentMethodOption {
            kind: PaymentMethodKind::CryptoDeposit,
            label: "Crypto deposit",
            available: true,
        },
        PaymentMethodOption {
            kind: PaymentMethodKind::MercadoPago,
            label: "MercadoPago",
            available: false,
        },
    ]
}

fn validate_positive_decimal(value: &Decimal) -> Result<(), validator::ValidationError> {
    if *value > Decimal::ZERO {
        Ok(())
    } else {
        let mut err = validator::ValidationError::new("range");
        err.message = Some("Amount must be greater than 0".into());
        Err(err)
    }
}

/// Input to a payment flow.
#[derive(Debug, Clone, Validate)]
pub struct PaymentFlowRequest {
    #[validate(custom = "validate_positive_decimal")]
    pub amount: Decimal,
    pub address_id: Uuid,
    /// Reference string shown on the gateway's hosted page.
    #[validate(length(min = 1))]
    pub reference: String,
    /// Raw payment method id; forwarded only when it is a valid UUID.
    pub payment_method_id: Option<String>,
    /// Present when regenerating the transaction of an existing order.
    pub order_id: Option<Uuid>,
    /// Reused verbatim when supplied (regeneration); otherwise a fresh id
    /// is minted before any network call.
    pub client_txn_id: Option<ClientTxnId>,
}

/// Result of a completed flow.
#[derive(Debug, Clone)]
pub struct PaymentFlowOutcome {
    pub order_id: Uuid,
    pub client_txn_id: ClientTxnId,
    pub persisted: PersistedPayment,
}

#[derive(Clone)]
pub struct PaymentFlowService {
    backend: Arc<BackendClient>,
    gateway: Arc<PayphoneClient>,
    browser: Arc<dyn BrowserPort>,
    local_cart: Arc<LocalCart>,
    cache: Arc<QueryCache>,
    events: EventSender,
    outbox: Arc<ChargeOutbox>,
    max_proof_bytes: usize,
}

impl PaymentFlowService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        backend: Arc<BackendClient>,
        gateway: Arc<PayphoneClient>,
        browser: Arc<dyn BrowserPort>,
        local_cart: Arc<LocalCart>,
        cache: Arc<QueryCache>,
        events: EventSender,
        outbox: Arc<ChargeOutbox>,
        max_proof_bytes: usize,
    ) -> Self {
        Self {
            backend,
            gateway,
            browser,
            local_cart,
            cache,
            events,
            outbox,
            max_proof_bytes,
        }
    }

    /// Drives one purchase or regeneration attempt.
    ///
    /// Sequencing: local validation, then the gateway call, then the
    /// backend write, then cache/cart cleanup. A gateway rejection stops
    /// the flow with nothing persisted; a backend failure after gateway
    /// success parks the write in the outbox and is never retried against
    /// the gateway.
    #[instrument(skip(self, request, modality), fields(order_id = ?request.order_id))]
    pub async fn execute_payment_flow(
        &self,
        request: PaymentFlowRequest,
        modality: PaymentModality,
    ) -> Result<PaymentFlowOutcome, ServiceError> {
        request.validate()?;

        // Identity first: the id exists before any network call so the
        // whole flow can be retried under the same identity.
        let txn_id = request
            .client_txn_id
            .clone()
            .unwrap_or_else(txid::generate);

        let provider_payload = self.charge_gateway(&txn_id, &request, &modality).await?;

        let persist = PersistPaymentRequest {
            client_txn_id: txn_id.clone(),
            address_id: request.address_id,
            payment_method_id: request
                .payment_method_id
                .as_deref()
                .and_then(payment_method_uuid),
            provider: modality.provider(),
            amount: request.amount,
            provider_payload,
            status: modality.initial_status(),
        };

        let persisted = match request.order_id {
            Some(order_id) => self.backend.regenerate_payment(order_id, &persist).await,
            None => self.backend.create_order_with_payment(&persist).await,
        };

        let persisted = match persisted {
            Ok(persisted) => persisted,
            Err(err) if modality.uses_gateway() => {
                // Money moved at the gateway with no backend record. Park
                // the write for recovery and surface the failure.
                self.outbox.enqueue(request.order_id, persist);
                self.events
                    .send_or_log(Event::ChargeOrphaned {
                        client_txn_id: txn_id.to_string(),
                    })
                    .await;
                return Err(ServiceError::OrphanedCharge(err.user_message()));
            }
            Err(err) => return Err(err),
        };

        self.cache.invalidate_prefix(keys::PENDING_PAYMENTS);
        self.cache.invalidate_prefix(keys::ORDERS);
        self.local_cart.clear().await;

        if request.order_id.is_none() {
            self.events
                .send_or_log(Event::OrderCreated(persisted.order_id))
                .await;
        }
        self.events
            .send_or_log(Event::PaymentCreated {
                client_txn_id: txn_id.to_string(),
                order_id: persisted.order_id,
            })
            .await;

        info!(
            client_txn_id = %txn_id,
            order_id = %persisted.order_id,
            "payment flow persisted"
        );

        Ok(PaymentFlowOutcome {
            order_id: persisted.order_id,
            client_txn_id: txn_id,
            persisted,
        })
    }

    /// Gateway leg of the flow. Deposit modalities validate their proof
    /// and skip the gateway entirely.
    async fn charge_gateway(
        &self,
        txn_id: &ClientTxnId,
        request: &PaymentFlowRequest,
        modality: &PaymentModality,
    ) -> Result<ProviderPayload, ServiceError> {
        match modality {
            PaymentModality::Link => {
                let user_agent = self.browser.user_agent();
                if is_safari_family(&user_agent) {
                    return Err(ServiceError::UnsupportedBrowser(
                        UNSUPPORTED_BROWSER_MESSAGE.to_string(),
                    ));
                }
                let link = self
                    .gateway
                    .create_link(txn_id, &request.reference, request.amount)
                    .await?;
                // The hosted page opens immediately; the payer completes
                // there and the gateway calls back out-of-band.
                self.browser.open_in_new_context(&link.redirect_url).await?;
                Ok(ProviderPayload::link(link.payment_id, link.redirect_url))
            }
            PaymentModality::Phone { number } => {
                self.gateway
                    .phone_sale(txn_id, number, request.amount)
                    .await?;
                Ok(ProviderPayload::none())
            }
            PaymentModality::CashDeposit { proof } | PaymentModality::CryptoDeposit { proof } => {
                proof.validate(self.max_proof_bytes)?;
                Ok(ProviderPayload::none())
            }
        }
    }
}
