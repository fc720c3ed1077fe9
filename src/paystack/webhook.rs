// marketplace_payments/src/paystack/webhook.rs
// Paystack webhook ingestion with HMAC-SHA512 verification

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use hmac::{Hmac, Mac};
use sha2::Sha512;
use std::sync::Arc;

use crate::engine::WebhookEvent;
use crate::routes::AppState;

pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

type HmacSha512 = Hmac<Sha512>;

/// Checks `x-paystack-signature`: hex HMAC-SHA512 of the raw body keyed with
/// the secret key. The comparison is constant-time.
pub fn verify_webhook_signature(
    payload: &[u8],
    signature_header: &str,
    secret: &str,
) -> Result<(), String> {
    let expected = hex::decode(signature_header.trim()).map_err(|_| "Malformed signature")?;
    let mut mac =
        HmacSha512::new_from_slice(secret.as_bytes()).map_err(|_| "Invalid webhook secret")?;
    mac.update(payload);
    mac.verify_slice(&expected)
        .map_err(|_| "Invalid webhook signature".to_string())
}

pub fn sign_payload(payload: &[u8], secret: &str) -> Result<String, String> {
    let mut mac =
        HmacSha512::new_from_slice(secret.as_bytes()).map_err(|_| "Invalid webhook secret")?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub async fn paystack_webhook_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    let (engine, secret) = match (state.engine(), state.webhook_secret()) {
        (Ok(engine), Ok(secret)) => (engine, secret),
        (Err(error), _) | (_, Err(error)) => return error.into_response(),
    };

    let signature = match headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) {
        Some(signature) => signature,
        None => {
            tracing::warn!("webhook without signature header");
            return (StatusCode::BAD_REQUEST, "Missing signature").into_response();
        }
    };

    if let Err(e) = verify_webhook_signature(body.as_bytes(), signature, secret) {
        tracing::warn!(error = %e, "webhook signature verification failed");
        return (StatusCode::UNAUTHORIZED, "Invalid signature").into_response();
    }

    let event: WebhookEvent = match serde_json::from_str(&body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "failed to parse webhook event");
            return (StatusCode::BAD_REQUEST, "Invalid event").into_response();
        }
    };

    tracing::info!(event = %event.event, "webhook received");

    // Acknowledge regardless: a later verify call recovers anything missed here.
    match engine.reconcile_webhook(&event).await {
        Ok(Some(outcome)) => tracing::info!(
            event = %event.event,
            status = %outcome.payment_status,
            "webhook reconciled"
        ),
        Ok(None) => {}
        Err(error) => tracing::error!(event = %event.event, error = %error, "webhook processing failed"),
    }

    (StatusCode::OK, "Received").into_response()
}
