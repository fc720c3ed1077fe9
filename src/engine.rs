// marketplace_payments/src/engine.rs
// Reconciliation: records, gateway calls and status transitions in one place

use serde::Deserialize;
use std::sync::Arc;

use crate::error::PaymentError;
use crate::mailer::{Receipt, ReceiptMailer};
use crate::models::{PaymentRecord, PaymentStatus, StatusUpdate};
use crate::paystack::{GatewayError, InitializeRequest, PaymentGateway, VerifiedTransaction};
use crate::pricing::{gateway_amount, parse_amount_minor};
use crate::store::PaymentStore;

const MAX_REFERENCE_LEN: usize = 100;
const MAX_EMAIL_LEN: usize = 254;

// ═══════════════════════════════════════════════════════════════════════════════
// REQUESTS & OUTCOMES
// ═══════════════════════════════════════════════════════════════════════════════

/// Checkout request as the storefront sends it.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct InitializePayment {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub amount: Option<serde_json::Value>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub reference_stat: Option<serde_json::Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InitializeOutcome {
    pub authorization_url: String,
    pub gateway_reference: String,
    /// Fee-inclusive amount in whole currency units.
    pub amount_naira: i64,
    pub our_reference: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VerifyOutcome {
    /// What the caller should believe: the stored status when the record is
    /// frozen, otherwise the gateway's status. `Pending` while unsettled.
    pub payment_status: PaymentStatus,
    pub transaction: VerifiedTransaction,
    pub our_reference: Option<String>,
    pub receipt_sent: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

// ═══════════════════════════════════════════════════════════════════════════════
// VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

pub fn validate_email(raw: &str) -> Result<String, PaymentError> {
    let email = raw.trim();
    let invalid = || PaymentError::Validation("A valid email address is required".to_string());

    if email.is_empty() || email.len() > MAX_EMAIL_LEN || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|label| label.is_empty()) {
        return Err(invalid());
    }
    Ok(email.to_string())
}

pub fn validate_reference(raw: &str) -> Result<String, PaymentError> {
    let reference = raw.trim();
    if reference.is_empty() {
        return Err(PaymentError::Validation("Payment reference is required".to_string()));
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '=');
    if reference.len() > MAX_REFERENCE_LEN || !reference.chars().all(allowed) {
        return Err(PaymentError::Validation("Payment reference is malformed".to_string()));
    }
    Ok(reference.to_string())
}

/// Maps the gateway's transaction status onto ours; `None` means not settled.
pub fn map_gateway_status(status: &str) -> Option<PaymentStatus> {
    match status {
        "success" => Some(PaymentStatus::Success),
        "failed" => Some(PaymentStatus::Failed),
        "abandoned" => Some(PaymentStatus::Abandoned),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

pub struct ReconciliationEngine {
    gateway: Arc<dyn PaymentGateway>,
    store: Arc<dyn PaymentStore>,
    mailer: Arc<dyn ReceiptMailer>,
    callback_url: String,
    currency: String,
}

impl ReconciliationEngine {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        store: Arc<dyn PaymentStore>,
        mailer: Arc<dyn ReceiptMailer>,
        callback_url: impl Into<String>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            store,
            mailer,
            callback_url: callback_url.into(),
            currency: currency.into(),
        }
    }

    pub fn store(&self) -> &Arc<dyn PaymentStore> {
        &self.store
    }

    /// Creates (or reuses) the record for a checkout and opens the
    /// transaction at the gateway.
    pub async fn initialize(
        &self,
        request: InitializePayment,
    ) -> Result<InitializeOutcome, PaymentError> {
        let email = validate_email(request.email.as_deref().unwrap_or_default())?;
        let amount_minor = match &request.amount {
            Some(raw) => parse_amount_minor(raw)?,
            None => return Err(PaymentError::Validation("Amount is required".to_string())),
        };
        let gateway_reference = validate_reference(request.reference.as_deref().unwrap_or_default())?;
        let amount = gateway_amount(amount_minor);

        let record = self
            .store
            .create_or_get(&gateway_reference, &email, amount.minor_units)
            .await?;

        if record.status == PaymentStatus::Success {
            return Err(PaymentError::Validation(
                "Payment for this reference is already complete".to_string(),
            ));
        }
        if record.amount_minor_units != amount.minor_units {
            return Err(PaymentError::Validation(
                "Reference already used for a different amount".to_string(),
            ));
        }

        tracing::info!(
            reference = %record.reference,
            gateway_reference = %gateway_reference,
            amount_minor = record.amount_minor_units,
            "initializing payment"
        );

        let gateway_request = InitializeRequest {
            email: record.email.clone(),
            amount_minor: record.amount_minor_units,
            gateway_reference: gateway_reference.clone(),
            callback_url: self.callback_url.clone(),
            currency: self.currency.clone(),
            metadata: serde_json::json!({
                "our_reference": record.reference,
                "reference_stat": request.reference_stat,
            }),
        };

        match self.gateway.initialize_transaction(&gateway_request).await {
            Ok(authorization) => {
                self.store
                    .append_log_and_set_status(
                        &record.reference,
                        PaymentStatus::Initialized,
                        "sent to gateway",
                    )
                    .await?;

                Ok(InitializeOutcome {
                    authorization_url: authorization.authorization_url,
                    gateway_reference: authorization.gateway_reference,
                    amount_naira: amount.major_units,
                    our_reference: record.reference,
                })
            }
            Err(error) => {
                tracing::warn!(
                    reference = %record.reference,
                    gateway_reference = %gateway_reference,
                    error = %error,
                    "gateway initialization failed"
                );
                let detail = match &error {
                    GatewayError::Rejected { message, .. } => format!("gateway rejected: {}", message),
                    GatewayError::Unreachable(message) => format!("gateway unreachable: {}", message),
                };
                if let Err(store_error) = self
                    .store
                    .append_log_and_set_status(&record.reference, PaymentStatus::FailedInit, &detail)
                    .await
                {
                    tracing::error!(
                        reference = %record.reference,
                        error = %store_error,
                        "could not record failed initialization"
                    );
                }
                Err(error.into())
            }
        }
    }

    /// Asks the gateway for the truth about a transaction and applies it.
    pub async fn verify(&self, raw_reference: &str) -> Result<VerifyOutcome, PaymentError> {
        let gateway_reference = validate_reference(raw_reference)?;

        let transaction = match self.gateway.verify_transaction(&gateway_reference).await {
            Ok(transaction) => transaction,
            Err(error) => {
                self.record_verification_failure(&gateway_reference, &error).await;
                return Err(error.into());
            }
        };

        let record = self.store.get_by_gateway_reference(&gateway_reference).await?;
        let mapped = map_gateway_status(&transaction.status);

        let Some(record) = record else {
            tracing::warn!(
                gateway_reference = %gateway_reference,
                gateway_status = %transaction.status,
                "verified a transaction with no local record"
            );
            return Ok(VerifyOutcome {
                payment_status: mapped.unwrap_or(PaymentStatus::Pending),
                transaction,
                our_reference: None,
                receipt_sent: false,
            });
        };

        let update = match mapped {
            Some(status) => Some(
                self.store
                    .append_log_and_set_status(
                        &record.reference,
                        status,
                        &transition_detail(status, &transaction),
                    )
                    .await?,
            ),
            None => None,
        };

        let payment_status = reported_status(&record, mapped, update);
        tracing::info!(
            reference = %record.reference,
            gateway_reference = %gateway_reference,
            gateway_status = %transaction.status,
            status = %payment_status,
            update = ?update,
            "payment verified"
        );

        let mut receipt_sent = false;
        if mapped == Some(PaymentStatus::Success) && update.is_some_and(|u| u.is_applied()) {
            receipt_sent = self.send_receipt(&record, &transaction).await;
        }

        Ok(VerifyOutcome {
            payment_status,
            transaction,
            our_reference: Some(record.reference),
            receipt_sent,
        })
    }

    /// Webhooks only tell us which reference to look at; the status always
    /// comes from a fresh verify.
    pub async fn reconcile_webhook(
        &self,
        event: &WebhookEvent,
    ) -> Result<Option<VerifyOutcome>, PaymentError> {
        if event.event != "charge.success" {
            tracing::info!(event = %event.event, "ignoring webhook event");
            return Ok(None);
        }
        let reference = event
            .data
            .get("reference")
            .and_then(|value| value.as_str())
            .ok_or_else(|| PaymentError::Validation("Webhook event has no reference".to_string()))?;

        self.verify(reference).await.map(Some)
    }

    async fn record_verification_failure(&self, gateway_reference: &str, error: &GatewayError) {
        tracing::warn!(gateway_reference = %gateway_reference, error = %error, "verification failed");

        let record = match self.store.get_by_gateway_reference(gateway_reference).await {
            Ok(Some(record)) => record,
            Ok(None) => return,
            Err(store_error) => {
                tracing::error!(
                    gateway_reference = %gateway_reference,
                    error = %store_error,
                    "could not load record after verification failure"
                );
                return;
            }
        };

        if let Err(store_error) = self
            .store
            .append_log_and_set_status(
                &record.reference,
                PaymentStatus::VerificationFailed,
                &error.to_string(),
            )
            .await
        {
            tracing::error!(
                reference = %record.reference,
                error = %store_error,
                "could not record verification failure"
            );
        }
    }

    /// Mail failures are logged and never undo the transition.
    async fn send_receipt(&self, record: &PaymentRecord, transaction: &VerifiedTransaction) -> bool {
        let receipt = Receipt {
            email: record.email.clone(),
            reference: record.gateway_reference.clone(),
            amount_minor: transaction.amount,
            currency: transaction.currency.clone(),
        };
        match self.mailer.send_receipt(&receipt).await {
            Ok(()) => {
                tracing::info!(reference = %record.reference, email = %record.email, "receipt sent");
                true
            }
            Err(error) => {
                tracing::error!(reference = %record.reference, error = %error, "receipt delivery failed");
                false
            }
        }
    }
}

fn transition_detail(status: PaymentStatus, transaction: &VerifiedTransaction) -> String {
    match status {
        PaymentStatus::Success => transaction.raw.to_string(),
        PaymentStatus::Failed => format!(
            "gateway reported failure: {}; {}",
            transaction.gateway_message.as_deref().unwrap_or("no message"),
            transaction.raw
        ),
        PaymentStatus::Abandoned => "customer abandoned the transaction".to_string(),
        other => format!("gateway reported {}", other),
    }
}

fn reported_status(
    record: &PaymentRecord,
    mapped: Option<PaymentStatus>,
    update: Option<StatusUpdate>,
) -> PaymentStatus {
    match (update, mapped) {
        (Some(StatusUpdate::Rejected { current }), _) => current,
        (_, Some(status)) => status,
        (_, None) if record.status.is_terminal() => record.status,
        (_, None) => PaymentStatus::Pending,
    }
}
