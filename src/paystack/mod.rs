// marketplace_payments/src/paystack/mod.rs
// Gateway seam: what the engine needs from Paystack, independent of HTTP

pub mod client;
pub mod webhook;

pub use client::PaystackClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::PaymentError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// Transport failure, timeout or a response we could not decode.
    #[error("gateway unreachable: {0}")]
    Unreachable(String),

    #[error("gateway rejected request (status {status_code}): {message}")]
    Rejected {
        status_code: u16,
        message: String,
        details: Option<serde_json::Value>,
    },
}

impl From<GatewayError> for PaymentError {
    fn from(error: GatewayError) -> Self {
        match error {
            GatewayError::Unreachable(message) => PaymentError::GatewayUnreachable(message),
            GatewayError::Rejected {
                status_code,
                message,
                details,
            } => PaymentError::GatewayRejected {
                status_code,
                message,
                details,
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct InitializeRequest {
    pub email: String,
    pub amount_minor: i64,
    pub gateway_reference: String,
    pub callback_url: String,
    pub currency: String,
    pub metadata: serde_json::Value,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Authorization {
    pub authorization_url: String,
    #[serde(default)]
    pub access_code: Option<String>,
    #[serde(rename = "reference")]
    pub gateway_reference: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VerifiedTransaction {
    /// Raw gateway status, e.g. `success`, `failed`, `abandoned`, `ongoing`.
    pub status: String,
    pub amount: i64,
    pub currency: String,
    pub paid_at: Option<String>,
    pub customer_email: Option<String>,
    pub gateway_message: Option<String>,
    /// The `data` object as the gateway sent it, kept for the audit log.
    pub raw: serde_json::Value,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initialize_transaction(
        &self,
        request: &InitializeRequest,
    ) -> Result<Authorization, GatewayError>;

    async fn verify_transaction(
        &self,
        gateway_reference: &str,
    ) -> Result<VerifiedTransaction, GatewayError>;
}
