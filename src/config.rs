// marketplace_payments/src/config.rs
// Environment-backed configuration, loaded once and passed into constructors

use std::fmt;
use std::time::Duration;

const DEFAULT_PAYSTACK_BASE_URL: &str = "https://api.paystack.co";
const MAX_CONNECT_TIMEOUT_SECS: u64 = 10;
const MAX_TOTAL_TIMEOUT_SECS: u64 = 15;

// ═══════════════════════════════════════════════════════════════════════════════
// PAYSTACK CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct PaystackConfig {
    pub secret_key: Option<String>,
    pub base_url: String,
    pub callback_url: Option<String>,
    pub currency: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl PaystackConfig {
    pub fn from_env() -> Self {
        let connect_secs = env_u64("PAYSTACK_CONNECT_TIMEOUT_SECS", MAX_CONNECT_TIMEOUT_SECS)
            .clamp(1, MAX_CONNECT_TIMEOUT_SECS);
        let total_secs = env_u64("PAYSTACK_TIMEOUT_SECS", MAX_TOTAL_TIMEOUT_SECS)
            .clamp(1, MAX_TOTAL_TIMEOUT_SECS);

        Self {
            secret_key: env_non_empty("PAYSTACK_SECRET_KEY"),
            base_url: env_non_empty("PAYSTACK_BASE_URL")
                .unwrap_or_else(|| DEFAULT_PAYSTACK_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            callback_url: env_non_empty("PAYSTACK_CALLBACK_URL"),
            currency: env_non_empty("PAYSTACK_CURRENCY").unwrap_or_else(|| "NGN".to_string()),
            connect_timeout: Duration::from_secs(connect_secs),
            request_timeout: Duration::from_secs(total_secs),
        }
    }

    /// Config pointing at an arbitrary base URL, used by tests and sandboxes.
    pub fn for_base_url(base_url: &str, secret_key: &str) -> Self {
        Self {
            secret_key: Some(secret_key.to_string()),
            base_url: base_url.trim_end_matches('/').to_string(),
            callback_url: Some("http://localhost:3000/payment/callback".to_string()),
            currency: "NGN".to_string(),
            connect_timeout: Duration::from_secs(MAX_CONNECT_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(MAX_TOTAL_TIMEOUT_SECS),
        }
    }
}

// The secret must never end up in logs.
impl fmt::Debug for PaystackConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaystackConfig")
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("callback_url", &self.callback_url)
            .field("currency", &self.currency)
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MAIL CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct MailConfig {
    pub api_url: String,
    pub api_key: String,
    pub from: String,
}

impl MailConfig {
    /// `None` when no mail API is configured; receipts are then only logged.
    pub fn from_env() -> Option<Self> {
        let api_url = env_non_empty("MAIL_API_URL")?;
        Some(Self {
            api_url,
            api_key: env_non_empty("MAIL_API_KEY").unwrap_or_default(),
            from: env_non_empty("MAIL_FROM")
                .unwrap_or_else(|| "receipts@marketplace.local".to_string()),
        })
    }
}

impl fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"<redacted>")
            .field("from", &self.from)
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// APPLICATION CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub redis_url: Option<String>,
    pub store_timeout: Duration,
    pub paystack: PaystackConfig,
    pub mail: Option<MailConfig>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env_u64("PORT", 3000).try_into().unwrap_or(3000),
            redis_url: env_non_empty("REDIS_URL"),
            store_timeout: Duration::from_millis(env_u64("STORE_TIMEOUT_MS", 5000)),
            paystack: PaystackConfig::from_env(),
            mail: MailConfig::from_env(),
        }
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_u64(key: &str, default: u64) -> u64 {
    match env_non_empty(key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, default, "ignoring unparsable setting");
            default
        }),
        None => default,
    }
}
