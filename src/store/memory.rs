use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{new_local_reference, PaymentStore, StoreError};
use crate::models::{LogEntry, PaymentRecord, PaymentStatus, StatusUpdate};

#[derive(Default)]
struct Records {
    by_reference: HashMap<String, PaymentRecord>,
    by_gateway_reference: HashMap<String, String>,
}

/// Process-local store for development and tests. One write lock per
/// mutation serializes concurrent updates.
#[derive(Clone, Default)]
pub struct InMemoryPaymentStore {
    records: Arc<RwLock<Records>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.by_reference.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn create_or_get(
        &self,
        gateway_reference: &str,
        email: &str,
        amount_minor_units: i64,
    ) -> Result<PaymentRecord, StoreError> {
        let mut records = self.records.write().await;

        if let Some(reference) = records.by_gateway_reference.get(gateway_reference) {
            return records
                .by_reference
                .get(reference)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(reference.clone()));
        }

        let record = PaymentRecord::new_pending(
            new_local_reference(),
            gateway_reference,
            email,
            amount_minor_units,
        );
        records
            .by_gateway_reference
            .insert(gateway_reference.to_string(), record.reference.clone());
        records
            .by_reference
            .insert(record.reference.clone(), record.clone());
        Ok(record)
    }

    async fn append_log_and_set_status(
        &self,
        reference: &str,
        new_status: PaymentStatus,
        detail: &str,
    ) -> Result<StatusUpdate, StoreError> {
        let mut records = self.records.write().await;
        let record = records
            .by_reference
            .get_mut(reference)
            .ok_or_else(|| StoreError::NotFound(reference.to_string()))?;

        let previous = record.status;
        if previous == new_status {
            return Ok(StatusUpdate::Unchanged);
        }
        if !previous.can_advance_to(new_status) {
            return Ok(StatusUpdate::Rejected { current: previous });
        }

        record.status = new_status;
        record.updated_at = Utc::now();
        record.transaction_log.push(LogEntry {
            status: new_status,
            detail: detail.to_string(),
            timestamp: record.updated_at,
        });
        Ok(StatusUpdate::Applied { previous })
    }

    async fn get_by_gateway_reference(
        &self,
        gateway_reference: &str,
    ) -> Result<Option<PaymentRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .by_gateway_reference
            .get(gateway_reference)
            .and_then(|reference| records.by_reference.get(reference))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_or_get_is_idempotent() {
        let store = InMemoryPaymentStore::new();
        let first = store.create_or_get("gw_1", "a@b.co", 101_500).await.unwrap();
        let second = store.create_or_get("gw_1", "other@b.co", 5).await.unwrap();

        assert_eq!(first.reference, second.reference);
        assert_eq!(second.email, "a@b.co");
        assert_eq!(second.amount_minor_units, 101_500);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_append_applies_and_logs() {
        let store = InMemoryPaymentStore::new();
        let record = store.create_or_get("gw_2", "a@b.co", 100).await.unwrap();

        let update = store
            .append_log_and_set_status(&record.reference, PaymentStatus::Initialized, "sent")
            .await
            .unwrap();
        assert_eq!(update, StatusUpdate::Applied { previous: PaymentStatus::Pending });

        let stored = store.get_by_gateway_reference("gw_2").await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Initialized);
        assert_eq!(stored.transaction_log.len(), 2);
        assert_eq!(stored.transaction_log[1].detail, "sent");
    }

    #[tokio::test]
    async fn test_success_is_frozen() {
        let store = InMemoryPaymentStore::new();
        let record = store.create_or_get("gw_3", "a@b.co", 100).await.unwrap();
        store
            .append_log_and_set_status(&record.reference, PaymentStatus::Success, "paid")
            .await
            .unwrap();

        let update = store
            .append_log_and_set_status(&record.reference, PaymentStatus::Failed, "late")
            .await
            .unwrap();
        assert_eq!(update, StatusUpdate::Rejected { current: PaymentStatus::Success });

        let same = store
            .append_log_and_set_status(&record.reference, PaymentStatus::Success, "again")
            .await
            .unwrap();
        assert_eq!(same, StatusUpdate::Unchanged);

        let stored = store.get_by_gateway_reference("gw_3").await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Success);
        assert_eq!(stored.transaction_log.len(), 2);
    }

    #[tokio::test]
    async fn test_append_to_unknown_reference() {
        let store = InMemoryPaymentStore::new();
        let result = store
            .append_log_and_set_status("mk_missing", PaymentStatus::Failed, "x")
            .await;
        assert_eq!(result, Err(StoreError::NotFound("mk_missing".to_string())));
    }

    #[tokio::test]
    async fn test_concurrent_appends_lose_no_entries() {
        let store = InMemoryPaymentStore::new();
        let record = store.create_or_get("gw_4", "a@b.co", 100).await.unwrap();
        store
            .append_log_and_set_status(&record.reference, PaymentStatus::Initialized, "sent")
            .await
            .unwrap();

        let outcomes = [
            PaymentStatus::Failed,
            PaymentStatus::Abandoned,
            PaymentStatus::VerificationFailed,
            PaymentStatus::Failed,
        ];
        let mut handles = Vec::new();
        for (i, status) in outcomes.into_iter().enumerate() {
            let store = store.clone();
            let reference = record.reference.clone();
            handles.push(tokio::spawn(async move {
                store
                    .append_log_and_set_status(&reference, status, &format!("report {}", i))
                    .await
                    .unwrap()
            }));
        }
        let mut applied = 0;
        for handle in handles {
            if handle.await.unwrap().is_applied() {
                applied += 1;
            }
        }

        let stored = store.get_by_gateway_reference("gw_4").await.unwrap().unwrap();
        assert_eq!(stored.transaction_log.len(), 2 + applied);
        assert_eq!(stored.transaction_log.last().unwrap().status, stored.status);
    }
}
