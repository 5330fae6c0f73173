//! Payment gateway client.
//!
//! The reconciliation service only ever talks to the gateway through the
//! [`PaymentGateway`] trait; the HTTP implementation below is one provider
//! behind it.

use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use mockall::automock;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;

use crate::domain::orders::records::OrderUuid;

/// Authoritative payment state as reported by the gateway.
///
/// The verify path treats anything that is not [`Self::Success`] as a
/// failure; webhooks drive completion, so "still pending" is not retried
/// from here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayPaymentStatus {
    Success,
    Pending,
    Failed,
}

impl GatewayPaymentStatus {
    fn from_raw(raw: &str) -> Self {
        match raw {
            "success" | "captured" => Self::Success,
            "created" | "pending" | "authorized" => Self::Pending,
            _ => Self::Failed,
        }
    }
}

/// A gateway payment as seen from outside.
#[derive(Debug, Clone)]
pub struct GatewayPayment {
    pub id: String,
    pub status: GatewayPaymentStatus,
    pub amount: u64,

    /// The gateway's own settlement reference, present once processed.
    pub transaction_id: Option<String>,

    /// Order correlation read back from the payment's metadata; attached at
    /// initiation time.
    pub order_uuid: Option<OrderUuid>,

    /// Raw payment payload, persisted on the transaction record.
    pub metadata: serde_json::Value,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The gateway has no record of this payment id.
    #[error("payment not found at gateway")]
    NotFound,

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response from gateway: {0}")]
    UnexpectedResponse(String),
}

#[automock]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a payment at the gateway, embedding the order id as the
    /// correlation token to be read back at verification time.
    async fn create_payment(
        &self,
        amount: u64,
        order: OrderUuid,
    ) -> Result<GatewayPayment, GatewayError>;

    /// Fetch the authoritative state of a payment by its gateway id.
    async fn fetch_payment(&self, gateway_payment_id: &str) -> Result<GatewayPayment, GatewayError>;
}

/// Configuration for the HTTP payment gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Gateway API base address, e.g. `"https://api.gateway.example"`.
    pub base_url: String,

    /// API key id for basic authentication.
    pub key_id: String,

    /// API key secret for basic authentication.
    pub key_secret: String,

    /// Upper bound on any single gateway call. A timed-out verification
    /// marks the payment neither way.
    pub timeout: Duration,
}

/// HTTP client for the payment gateway API.
#[derive(Debug, Clone)]
pub struct HttpPaymentGateway {
    config: GatewayConfig,
    http: Client,
}

impl HttpPaymentGateway {
    /// Create a new client from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying HTTP client cannot be built.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let http = Client::builder().timeout(config.timeout).build()?;

        Ok(Self { config, http })
    }

    fn auth_header(&self) -> String {
        let credentials = format!("{}:{}", self.config.key_id, self.config.key_secret);

        format!("Basic {}", BASE64.encode(credentials))
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_payment(
        &self,
        amount: u64,
        order: OrderUuid,
    ) -> Result<GatewayPayment, GatewayError> {
        let url = format!("{}/v1/payments", self.config.base_url);

        let body = serde_json::json!({
            "amount": amount,
            "notes": { "order_uuid": order.into_uuid() },
        });

        let response = self
            .http
            .post(&url)
            .header("Authorization", self.auth_header())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();

            return Err(GatewayError::UnexpectedResponse(format!(
                "create payment failed with status {status}: {text}"
            )));
        }

        let parsed: PaymentResponse = response.json().await?;

        Ok(parsed.into_payment())
    }

    async fn fetch_payment(&self, gateway_payment_id: &str) -> Result<GatewayPayment, GatewayError> {
        let url = format!("{}/v1/payments/{gateway_payment_id}", self.config.base_url);

        let response = self
            .http
            .get(&url)
            .header("Authorization", self.auth_header())
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound);
        }

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();

            return Err(GatewayError::UnexpectedResponse(format!(
                "fetch payment failed with status {status}: {text}"
            )));
        }

        let parsed: PaymentResponse = response.json().await?;

        Ok(parsed.into_payment())
    }
}

#[derive(Debug, Deserialize)]
struct PaymentResponse {
    id: String,
    status: String,
    amount: u64,
    #[serde(default)]
    transaction_id: Option<String>,
    #[serde(default)]
    notes: PaymentNotes,
}

#[derive(Debug, Default, Deserialize)]
struct PaymentNotes {
    #[serde(default)]
    order_uuid: Option<uuid::Uuid>,
}

impl PaymentResponse {
    fn into_payment(self) -> GatewayPayment {
        let metadata = serde_json::json!({
            "id": self.id,
            "status": self.status,
            "amount": self.amount,
            "transaction_id": self.transaction_id,
            "order_uuid": self.notes.order_uuid,
        });

        GatewayPayment {
            id: self.id,
            status: GatewayPaymentStatus::from_raw(&self.status),
            amount: self.amount,
            transaction_id: self.transaction_id,
            order_uuid: self.notes.order_uuid.map(OrderUuid::from_uuid),
            metadata,
        }
    }
}
