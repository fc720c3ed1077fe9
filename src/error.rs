// marketplace_payments/src/error.rs
// Error taxonomy shared by the engine, the gateway client and the HTTP layer

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Tells the caller whether a retry makes sense.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ErrorType {
    /// Bad input or misconfiguration; retrying the same request will not help.
    Developer,
    /// The gateway refused the request.
    Paystack,
    /// Transient network or storage trouble; safe to retry.
    User,
}

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Gateway unreachable: {0}")]
    GatewayUnreachable(String),

    #[error("Gateway rejected request (status {status_code}): {message}")]
    GatewayRejected {
        status_code: u16,
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl PaymentError {
    pub fn error_type(&self) -> ErrorType {
        match self {
            PaymentError::Validation(_) | PaymentError::Config(_) => ErrorType::Developer,
            PaymentError::GatewayRejected { .. } => ErrorType::Paystack,
            PaymentError::GatewayUnreachable(_) | PaymentError::StoreUnavailable(_) => {
                ErrorType::User
            }
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            PaymentError::Validation(_) => StatusCode::BAD_REQUEST,
            PaymentError::GatewayRejected { status_code, .. } if *status_code >= 400 => {
                StatusCode::from_u16(*status_code).unwrap_or(StatusCode::BAD_REQUEST)
            }
            PaymentError::GatewayRejected { .. } => StatusCode::BAD_REQUEST,
            PaymentError::Config(_)
            | PaymentError::GatewayUnreachable(_)
            | PaymentError::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message safe to hand to a client. Internal detail stays in the logs.
    pub fn public_message(&self) -> String {
        match self {
            PaymentError::Validation(message) => message.clone(),
            PaymentError::Config(_) => "Payment service is not configured".to_string(),
            PaymentError::GatewayUnreachable(_) => {
                "Payment gateway is unreachable, please retry".to_string()
            }
            PaymentError::GatewayRejected { message, .. } => message.clone(),
            PaymentError::StoreUnavailable(_) => {
                "Payment records are temporarily unavailable".to_string()
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    status: &'static str,
    message: String,
    #[serde(rename = "type")]
    error_type: ErrorType,
}

impl IntoResponse for PaymentError {
    fn into_response(self) -> Response {
        match &self {
            PaymentError::Validation(_) => tracing::debug!(error = %self, "request rejected"),
            PaymentError::GatewayRejected { details, .. } => {
                tracing::warn!(error = %self, details = ?details, "gateway rejected request")
            }
            _ => tracing::error!(error = %self, "payment request failed"),
        }

        let body = ErrorBody {
            status: "error",
            message: self.public_message(),
            error_type: self.error_type(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}
