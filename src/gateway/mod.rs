use crate::error::{AppError, Result};
use crate::models::PaymentMethod;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Outcome reported by the card/PIX gateway for a charge or refund.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayStatus {
    Approved,
    Declined,
}

/// Instrument handed to the gateway; the wire protocol itself is the
/// gateway's concern, this crate only carries an opaque token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInstrument {
    pub method: PaymentMethod,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeResult {
    pub gateway_ref: String,
    pub status: GatewayStatus,
    pub auth_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundResult {
    pub status: GatewayStatus,
}

/// External payment gateway collaborator. Calls have unbounded latency and
/// must happen outside any held lock or open database transaction; callers
/// retry failures with the same idempotency key, which is forwarded on
/// every charge so the gateway can dedupe on its side too.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(
        &self,
        amount: Decimal,
        instrument: &PaymentInstrument,
        idempotency_key: &str,
    ) -> Result<ChargeResult>;
    async fn refund(&self, gateway_ref: &str, amount: Decimal) -> Result<RefundResult>;
    async fn query_status(&self, gateway_ref: &str) -> Result<GatewayStatus>;
}

/// HTTP client for the hosted gateway.
pub struct HttpPaymentGateway {
    http: reqwest::Client,
    base_url: String,
}

impl HttpPaymentGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChargeRequest<'a> {
    amount: Decimal,
    method: PaymentMethod,
    token: &'a str,
    idempotency_key: &'a str,
}

#[derive(Debug, Serialize)]
struct RefundRequest<'a> {
    gateway_ref: &'a str,
    amount: Decimal,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: GatewayStatus,
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn charge(
        &self,
        amount: Decimal,
        instrument: &PaymentInstrument,
        idempotency_key: &str,
    ) -> Result<ChargeResult> {
        let response = self
            .http
            .post(format!("{}/charges", self.base_url))
            .json(&ChargeRequest {
                amount,
                method: instrument.method,
                token: &instrument.token,
                idempotency_key,
            })
            .send()
            .await
            .map_err(|e| AppError::PaymentGateway(format!("charge request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::PaymentGateway(format!(
                "charge rejected upstream with status {}",
                response.status()
            )));
        }

        response
            .json::<ChargeResult>()
            .await
            .map_err(|e| AppError::PaymentGateway(format!("malformed charge response: {}", e)))
    }

    async fn refund(&self, gateway_ref: &str, amount: Decimal) -> Result<RefundResult> {
        let response = self
            .http
            .post(format!("{}/refunds", self.base_url))
            .json(&RefundRequest {
                gateway_ref,
                amount,
            })
            .send()
            .await
            .map_err(|e| AppError::PaymentGateway(format!("refund request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::PaymentGateway(format!(
                "refund rejected upstream with status {}",
                response.status()
            )));
        }

        response
            .json::<RefundResult>()
            .await
            .map_err(|e| AppError::PaymentGateway(format!("malformed refund response: {}", e)))
    }

    async fn query_status(&self, gateway_ref: &str) -> Result<GatewayStatus> {
        let response = self
            .http
            .get(format!("{}/charges/{}", self.base_url, gateway_ref))
            .send()
            .await
            .map_err(|e| AppError::PaymentGateway(format!("status query failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::PaymentGateway(format!(
                "status query rejected upstream with status {}",
                response.status()
            )));
        }

        let body = response
            .json::<StatusResponse>()
            .await
            .map_err(|e| AppError::PaymentGateway(format!("malformed status response: {}", e)))?;

        Ok(body.status)
    }
}
