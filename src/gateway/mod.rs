//! Payment gateway client (Payphone).
//!
//! Three calls: link generation (hosted payment page), phone-push "sale",
//! and transaction-status lookup. Every amount crossing this boundary is
//! an integer number of cents; the backend deals in decimals.

use reqwest::StatusCode;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use url::Url;

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::txid::ClientTxnId;

/// Gateway status code meaning the transaction completed.
pub const COMPLETED_STATUS_CODE: i32 = 3;

/// Converts a decimal amount to integer cents, rounding half-up on the
/// cent boundary. No fractional-cent value ever reaches the gateway.
pub fn to_cents(amount: Decimal) -> Result<i64, ServiceError> {
    if amount <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "amount must be greater than 0".into(),
        ));
    }
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| ServiceError::ValidationError("amount out of range".into()))
}

/// Phone number normalized for the gateway: digits only, a single leading
/// `0` stripped, and the configured country code prefixed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedPhone {
    /// National number without the trunk `0`.
    pub national: String,
    /// Country code + national number, as submitted to the gateway.
    pub full: String,
}

pub fn normalize_phone(raw: &str, country_code: &str) -> Result<NormalizedPhone, ServiceError> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    let national = digits.strip_prefix('0').unwrap_or(&digits).to_string();
    if national.len() < 8 {
        return Err(ServiceError::ValidationError(format!(
            "phone number '{}' is too short",
            raw
        )));
    }
    let full = format!("{}{}", country_code, national);
    Ok(NormalizedPhone { national, full })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LinkRequest<'a> {
    client_transaction_id: &'a str,
    reference: &'a str,
    amount: i64,
    store_id: &'a str,
    response_url: String,
}

/// Gateway response to a link-generation request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkResponse {
    pub payment_id: String,
    pub redirect_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SaleRequest<'a> {
    client_transaction_id: &'a str,
    phone_number: String,
    amount: i64,
    store_id: &'a str,
}

/// Gateway response to a phone-push sale request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleResponse {
    pub transaction_id: i64,
}

/// Gateway transaction-status lookup result.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStatus {
    pub status_code: i32,
    #[serde(default)]
    pub transaction_status: Option<String>,
}

impl TransactionStatus {
    pub fn is_completed(&self) -> bool {
        self.status_code == COMPLETED_STATUS_CODE
    }
}

#[derive(Debug, Deserialize)]
struct GatewayErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// HTTP client for the Payphone gateway.
#[derive(Clone)]
pub struct PayphoneClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
    store_id: String,
    country_code: String,
    callback_base: Url,
}

impl PayphoneClient {
    pub fn new(config: &AppConfig) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client: {}", e)))?;
        let base_url = Url::parse(&config.gateway.base_url)
            .map_err(|e| ServiceError::InternalError(format!("gateway base url: {}", e)))?;
        let callback_base = Url::parse(&config.payment_callback_url)
            .map_err(|e| ServiceError::InternalError(format!("callback url: {}", e)))?;
        Ok(Self {
            http,
            base_url,
            token: config.gateway.token.clone(),
            store_id: config.gateway.store_id.clone(),
            country_code: config.phone_country_code.clone(),
            callback_base,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ServiceError> {
        self.base_url
            .join(path)
            .map_err(|e| ServiceError::InternalError(format!("gateway url: {}", e)))
    }

    /// Callback URL the gateway redirects to, carrying the transaction id.
    fn callback_url(&self, txn: &ClientTxnId) -> Url {
        let mut url = self.callback_base.clone();
        url.query_pairs_mut().append_pair("id", txn.as_str());
        url
    }

    /// Requests a hosted payment link for the given amount.
    #[instrument(skip(self), fields(client_txn_id = %txn))]
    pub async fn create_link(
        &self,
        txn: &ClientTxnId,
        reference: &str,
        amount: Decimal,
    ) -> Result<LinkResponse, ServiceError> {
        let body = LinkRequest {
            client_transaction_id: txn.as_str(),
            reference,
            amount: to_cents(amount)?,
            store_id: &self.store_id,
            response_url: self.callback_url(txn).to_string(),
        };

        let response = self
            .http
            .post(self.endpoint("api/links")?)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::GatewayUnavailable(e.to_string()))?;

        let link: LinkResponse = Self::decode(response).await?;
        info!(payment_id = %link.payment_id, "gateway link created");
        Ok(link)
    }

    /// Pushes a charge to the payer's phone inside the gateway app.
    #[instrument(skip(self, phone), fields(client_txn_id = %txn))]
    pub async fn phone_sale(
        &self,
        txn: &ClientTxnId,
        phone: &str,
        amount: Decimal,
    ) -> Result<SaleResponse, ServiceError> {
        let normalized = normalize_phone(phone, &self.country_code)?;
        let body = SaleRequest {
            client_transaction_id: txn.as_str(),
            phone_number: normalized.full,
            amount: to_cents(amount)?,
            store_id: &self.store_id,
        };

        let response = self
            .http
            .post(self.endpoint("api/sale")?)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::GatewayUnavailable(e.to_string()))?;

        let sale: SaleResponse = Self::decode(response).await?;
        info!(transaction_id = sale.transaction_id, "gateway sale pushed");
        Ok(sale)
    }

    /// Looks up the gateway-side status of a transaction by client id.
    #[instrument(skip(self), fields(client_txn_id = %txn))]
    pub async fn transaction_status(
        &self,
        txn: &ClientTxnId,
    ) -> Result<TransactionStatus, ServiceError> {
        let response = self
            .http
            .get(self.endpoint(&format!("api/sale/client/{}", txn))?)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| ServiceError::GatewayUnavailable(e.to_string()))?;

        Self::decode(response).await
    }

    /// Decodes a gateway response, preferring the gateway's own error
    /// description when the request was rejected.
    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ServiceError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| ServiceError::GatewayUnavailable(format!("malformed response: {}", e)));
        }

        let message = response
            .json::<GatewayErrorBody>()
            .await
            .ok()
            .and_then(|body| body.message)
            .unwrap_or_else(|| format!("gateway returned {}", status));

        if status == StatusCode::UNAUTHORIZED {
            warn!("gateway rejected our credential");
        }
        Err(ServiceError::GatewayRejected(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn cents_round_half_up() {
        assert_eq!(to_cents(dec!(19.995)).unwrap(), 2000);
        assert_eq!(to_cents(dec!(10.00)).unwrap(), 1000);
        assert_eq!(to_cents(dec!(0.01)).unwrap(), 1);
        assert_eq!(to_cents(dec!(125.554)).unwrap(), 12555);
    }

    #[test]
    fn cents_reject_non_positive_amounts() {
        assert!(to_cents(Decimal::ZERO).is_err());
        assert!(to_cents(dec!(-5)).is_err());
    }

    #[test]
    fn phone_strips_leading_zero_and_formatting() {
        let phone = normalize_phone("0987654321", "593").unwrap();
        assert_eq!(phone.national, "987654321");
        assert_eq!(phone.full, "593987654321");

        let phone = normalize_phone("098-765 4321", "593").unwrap();
        assert_eq!(phone.national, "987654321");
    }

    #[test]
    fn phone_without_trunk_zero_is_kept() {
        let phone = normalize_phone("987654321", "593").unwrap();
        assert_eq!(phone.national, "987654321");
    }

    #[test]
    fn short_phone_is_rejected() {
        assert!(normalize_phone("012345", "593").is_err());
    }

    #[test]
    fn completed_status_code() {
        let status = TransactionStatus {
            status_code: 3,
            transaction_status: Some("Approved".into()),
        };
        assert!(status.is_completed());
        let status = TransactionStatus {
            status_code: 2,
            transaction_status: None,
        };
        assert!(!status.is_completed());
    }

    proptest! {
        /// Two-decimal amounts convert to cents exactly.
        #[test]
        fn two_decimal_amounts_are_exact(units in 1i64..1_000_000, cents in 0i64..100) {
            let amount = Decimal::new(units * 100 + cents, 2);
            prop_assert_eq!(to_cents(amount).unwrap(), units * 100 + cents);
        }

        /// Normalization never leaves a leading zero or non-digits.
        #[test]
        fn normalized_phone_is_digits(raw in "0?9[0-9]{8}") {
            let phone = normalize_phone(&raw, "593").unwrap();
            prop_assert!(phone.national.chars().all(|c| c.is_ascii_digit()));
            prop_assert!(!phone.national.starts_with('0'));
            prop_assert!(phone.full.starts_with("593"));
        }
    }
}
