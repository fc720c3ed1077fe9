// marketplace_payments/src/routes.rs
// HTTP surface: checkout initialize, verify, webhook and the audit view

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::engine::{InitializePayment, ReconciliationEngine};
use crate::error::PaymentError;
use crate::mailer::{HttpReceiptMailer, LogReceiptMailer, ReceiptMailer};
use crate::paystack::webhook::paystack_webhook_handler;
use crate::paystack::PaystackClient;
use crate::store::{InMemoryPaymentStore, PaymentStore, RedisPaymentStore};

// ═══════════════════════════════════════════════════════════════════════════════
// SHARED STATE
// ═══════════════════════════════════════════════════════════════════════════════

pub struct AppState {
    engine: Option<ReconciliationEngine>,
    store: Arc<dyn PaymentStore>,
    webhook_secret: Option<String>,
    config_error: Option<String>,
}

impl AppState {
    pub fn new(engine: ReconciliationEngine, webhook_secret: impl Into<String>) -> Self {
        Self {
            store: engine.store().clone(),
            engine: Some(engine),
            webhook_secret: Some(webhook_secret.into()),
            config_error: None,
        }
    }

    /// State for a process that is up but cannot reach the gateway; payment
    /// routes answer with a configuration error.
    pub fn unconfigured(store: Arc<dyn PaymentStore>, reason: impl Into<String>) -> Self {
        Self {
            engine: None,
            store,
            webhook_secret: None,
            config_error: Some(reason.into()),
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, PaymentError> {
        let store: Arc<dyn PaymentStore> = match &config.redis_url {
            Some(url) => Arc::new(RedisPaymentStore::new(url, config.store_timeout)?),
            None => {
                tracing::warn!("REDIS_URL not set, payment records are kept in memory");
                Arc::new(InMemoryPaymentStore::new())
            }
        };

        let mailer: Arc<dyn ReceiptMailer> = match &config.mail {
            Some(mail) => Arc::new(HttpReceiptMailer::new(mail.clone()).map_err(PaymentError::Config)?),
            None => {
                tracing::warn!("MAIL_API_URL not set, receipts are only logged");
                Arc::new(LogReceiptMailer)
            }
        };

        let paystack = &config.paystack;
        let client = match PaystackClient::new(paystack) {
            Ok(client) => client,
            Err(error) => {
                tracing::error!(error = %error, "paystack is not configured");
                return Ok(Self::unconfigured(store, error.to_string()));
            }
        };
        let Some(callback_url) = paystack.callback_url.clone() else {
            tracing::error!("PAYSTACK_CALLBACK_URL is not set");
            return Ok(Self::unconfigured(store, "PAYSTACK_CALLBACK_URL is not set"));
        };
        let webhook_secret = paystack.secret_key.clone().unwrap_or_default();

        let engine = ReconciliationEngine::new(
            Arc::new(client),
            store,
            mailer,
            callback_url,
            paystack.currency.clone(),
        );
        Ok(Self::new(engine, webhook_secret))
    }

    pub fn engine(&self) -> Result<&ReconciliationEngine, PaymentError> {
        self.engine.as_ref().ok_or_else(|| self.not_configured())
    }

    pub fn webhook_secret(&self) -> Result<&str, PaymentError> {
        self.webhook_secret
            .as_deref()
            .ok_or_else(|| self.not_configured())
    }

    fn not_configured(&self) -> PaymentError {
        PaymentError::Config(
            self.config_error
                .clone()
                .unwrap_or_else(|| "payment gateway is not configured".to_string()),
        )
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    let paystack_router = Router::new()
        .route("/initialize", post(initialize_handler))
        .route("/verify", get(verify_handler))
        .route("/webhook", post(paystack_webhook_handler))
        .route("/payments/:gateway_reference", get(payment_record_handler))
        .with_state(state);

    Router::new()
        .nest("/paystack", paystack_router)
        .route("/health", get(|| async { "OK" }))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

// ═══════════════════════════════════════════════════════════════════════════════
// HANDLERS
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn initialize_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<InitializePayment>, JsonRejection>,
) -> Result<impl IntoResponse, PaymentError> {
    let Json(request) =
        payload.map_err(|e| PaymentError::Validation(format!("Invalid request body: {}", e.body_text())))?;
    let outcome = state.engine()?.initialize(request).await?;

    Ok(Json(json!({
        "status": "success",
        "data": {
            "authorization_url": outcome.authorization_url,
            "reference": outcome.gateway_reference,
            "amount_naira": outcome.amount_naira,
            "our_reference": outcome.our_reference,
        }
    })))
}

#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    #[serde(default)]
    pub reference: Option<String>,
}

pub async fn verify_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<VerifyParams>,
) -> Result<impl IntoResponse, PaymentError> {
    let reference = params
        .reference
        .filter(|reference| !reference.trim().is_empty())
        .ok_or_else(|| PaymentError::Validation("Payment reference is required".to_string()))?;

    let outcome = state.engine()?.verify(&reference).await?;
    let transaction = &outcome.transaction;

    Ok(Json(json!({
        "status": "success",
        "payment_status": outcome.payment_status,
        "data": {
            "reference": reference,
            "our_reference": outcome.our_reference,
            "gateway_status": transaction.status,
            "amount": transaction.amount,
            "currency": transaction.currency,
            "paid_at": transaction.paid_at,
            "customer_email": transaction.customer_email,
            "gateway_response": transaction.gateway_message,
        }
    })))
}

pub async fn payment_record_handler(
    State(state): State<Arc<AppState>>,
    Path(gateway_reference): Path<String>,
) -> Result<impl IntoResponse, PaymentError> {
    match state.store.get_by_gateway_reference(&gateway_reference).await? {
        Some(record) => Ok((StatusCode::OK, Json(json!({ "status": "success", "data": record })))),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "status": "error", "message": "Payment not found", "type": "developer" })),
        )),
    }
}
