// marketplace_payments/src/mailer.rs
// Receipt delivery for completed payments

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use crate::config::MailConfig;

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Receipt {
    pub email: String,
    pub reference: String,
    pub amount_minor: i64,
    pub currency: String,
}

#[async_trait]
pub trait ReceiptMailer: Send + Sync {
    async fn send_receipt(&self, receipt: &Receipt) -> Result<(), String>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// HTTP MAIL API
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Serialize)]
struct MailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: String,
    text: String,
}

/// Posts receipts to a transactional mail HTTP API.
pub struct HttpReceiptMailer {
    config: MailConfig,
    http_client: Client,
}

impl HttpReceiptMailer {
    pub fn new(config: MailConfig) -> Result<Self, String> {
        let http_client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| format!("mail client setup failed: {}", e))?;
        Ok(Self {
            config,
            http_client,
        })
    }
}

pub fn render_receipt(receipt: &Receipt) -> (String, String) {
    let subject = format!("Payment receipt {}", receipt.reference);
    let text = format!(
        "Thank you for your purchase.\n\nReference: {}\nAmount paid: {}.{:02} {}\n",
        receipt.reference,
        receipt.amount_minor / 100,
        receipt.amount_minor % 100,
        receipt.currency,
    );
    (subject, text)
}

#[async_trait]
impl ReceiptMailer for HttpReceiptMailer {
    async fn send_receipt(&self, receipt: &Receipt) -> Result<(), String> {
        let (subject, text) = render_receipt(receipt);
        let request = MailRequest {
            from: &self.config.from,
            to: &receipt.email,
            subject,
            text,
        };

        let response = self
            .http_client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| format!("mail request failed: {}", e.without_url()))?;

        if !response.status().is_success() {
            return Err(format!("mail API returned {}", response.status()));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOG-ONLY FALLBACK
// ═══════════════════════════════════════════════════════════════════════════════

/// Used when no mail API is configured.
#[derive(Clone, Default)]
pub struct LogReceiptMailer;

#[async_trait]
impl ReceiptMailer for LogReceiptMailer {
    async fn send_receipt(&self, receipt: &Receipt) -> Result<(), String> {
        tracing::info!(
            email = %receipt.email,
            reference = %receipt.reference,
            amount_minor = receipt.amount_minor,
            currency = %receipt.currency,
            "receipt not mailed (no mail API configured)"
        );
        Ok(())
    }
}
