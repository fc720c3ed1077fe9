// marketplace_payments/src/store/mod.rs
// Durable storage of payment records and their audit log

pub mod memory;
pub mod redis_store;

pub use memory::InMemoryPaymentStore;
pub use redis_store::RedisPaymentStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::PaymentError;
use crate::models::{PaymentRecord, PaymentStatus, StatusUpdate};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("store operation timed out")]
    Timeout,

    #[error("corrupt payment record {reference}: {message}")]
    Corrupt { reference: String, message: String },

    #[error("payment record {0} not found")]
    NotFound(String),
}

impl From<StoreError> for PaymentError {
    fn from(error: StoreError) -> Self {
        PaymentError::StoreUnavailable(error.to_string())
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(error: redis::RedisError) -> Self {
        StoreError::Backend(error.to_string())
    }
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Returns the record for `gateway_reference`, creating a `pending` one
    /// with a fresh local reference if none exists. Never duplicates.
    async fn create_or_get(
        &self,
        gateway_reference: &str,
        email: &str,
        amount_minor_units: i64,
    ) -> Result<PaymentRecord, StoreError>;

    /// Atomically appends one log entry and moves `status`, provided the
    /// current status may advance to `new_status`. Concurrent callers on the
    /// same reference each get their entry in.
    async fn append_log_and_set_status(
        &self,
        reference: &str,
        new_status: PaymentStatus,
        detail: &str,
    ) -> Result<StatusUpdate, StoreError>;

    async fn get_by_gateway_reference(
        &self,
        gateway_reference: &str,
    ) -> Result<Option<PaymentRecord>, StoreError>;
}

/// Local references are ours alone and never derived from the gateway's.
pub fn new_local_reference() -> String {
    format!("mk_{}", uuid::Uuid::new_v4().simple())
}
