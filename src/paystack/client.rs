// marketplace_payments/src/paystack/client.rs
// Outbound Paystack API calls over HTTPS, no business logic

use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{Authorization, GatewayError, InitializeRequest, PaymentGateway, VerifiedTransaction};
use crate::config::PaystackConfig;
use crate::error::PaymentError;

// ═══════════════════════════════════════════════════════════════════════════════
// WIRE TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
struct Envelope {
    status: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    status: String,
    amount: i64,
    currency: String,
    #[serde(default)]
    paid_at: Option<String>,
    #[serde(default)]
    customer: Option<Customer>,
    #[serde(default)]
    gateway_response: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Customer {
    #[serde(default)]
    email: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// CLIENT
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct PaystackClient {
    base_url: String,
    secret_key: String,
    http_client: Client,
}

impl PaystackClient {
    pub fn new(config: &PaystackConfig) -> Result<Self, PaymentError> {
        let secret_key = config
            .secret_key
            .clone()
            .ok_or_else(|| PaymentError::Config("PAYSTACK_SECRET_KEY is not set".to_string()))?;

        let http_client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| PaymentError::Config(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.clone(),
            secret_key,
            http_client,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| GatewayError::Unreachable(format!("invalid gateway base url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| GatewayError::Unreachable("invalid gateway base url".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.secret_key)
    }

    /// Unwraps the `{status, message, data}` envelope.
    async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
        let status_code = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Unreachable(format!("failed to read response: {}", e)))?;

        let envelope: Envelope = serde_json::from_str(&body).map_err(|e| {
            GatewayError::Unreachable(format!(
                "undecodable gateway response (status {}): {}",
                status_code, e
            ))
        })?;

        if status_code >= 400 || !envelope.status {
            return Err(GatewayError::Rejected {
                status_code,
                message: envelope
                    .message
                    .unwrap_or_else(|| "Payment gateway rejected the request".to_string()),
                details: envelope.data,
            });
        }

        let data = envelope
            .data
            .ok_or_else(|| GatewayError::Unreachable("gateway response has no data".to_string()))?;
        serde_json::from_value(data)
            .map_err(|e| GatewayError::Unreachable(format!("malformed gateway data: {}", e)))
    }
}

fn transport_error(error: reqwest::Error) -> GatewayError {
    // Strip the URL so nothing request-specific leaks into messages.
    let error = error.without_url();
    if error.is_timeout() {
        GatewayError::Unreachable(format!("gateway timed out: {}", error))
    } else {
        GatewayError::Unreachable(format!("request failed: {}", error))
    }
}

#[async_trait]
impl PaymentGateway for PaystackClient {
    async fn initialize_transaction(
        &self,
        request: &InitializeRequest,
    ) -> Result<Authorization, GatewayError> {
        let url = self.endpoint(&["transaction", "initialize"])?;
        let amount = request.amount_minor.to_string();
        let metadata = request.metadata.to_string();
        let form = [
            ("email", request.email.as_str()),
            ("amount", amount.as_str()),
            ("reference", request.gateway_reference.as_str()),
            ("callback_url", request.callback_url.as_str()),
            ("currency", request.currency.as_str()),
            ("metadata", metadata.as_str()),
        ];

        let response = self
            .http_client
            .post(url)
            .header("Authorization", self.bearer())
            .form(&form)
            .send()
            .await
            .map_err(transport_error)?;

        Self::handle_response(response).await
    }

    async fn verify_transaction(
        &self,
        gateway_reference: &str,
    ) -> Result<VerifiedTransaction, GatewayError> {
        let url = self.endpoint(&["transaction", "verify", gateway_reference])?;
        let response = self
            .http_client
            .get(url)
            .header("Authorization", self.bearer())
            .send()
            .await
            .map_err(transport_error)?;

        let raw: serde_json::Value = Self::handle_response(response).await?;
        let data: VerifyData = serde_json::from_value(raw.clone())
            .map_err(|e| GatewayError::Unreachable(format!("malformed verify data: {}", e)))?;

        Ok(VerifiedTransaction {
            status: data.status,
            amount: data.amount,
            currency: data.currency,
            paid_at: data.paid_at,
            customer_email: data.customer.and_then(|c| c.email),
            gateway_message: data.gateway_response,
            raw,
        })
    }
}
