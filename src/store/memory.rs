use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::RecordStore;
use crate::error::StoreError;
use crate::model::{Address, RecordPatch, UserRecord};

/// Process-local record store. Contents are lost on restart.
#[derive(Default)]
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<Address, UserRecord>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get(&self, address: &Address) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.records.read().await.get(address).cloned())
    }

    async fn create(&self, record: UserRecord) -> Result<UserRecord, StoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.address) {
            return Err(StoreError::Conflict {
                address: record.address.to_string(),
            });
        }
        records.insert(record.address.clone(), record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        address: &Address,
        patch: RecordPatch,
    ) -> Result<UserRecord, StoreError> {
        let mut records = self.records.write().await;
        match records.get_mut(address) {
            Some(record) if record.visit_count == patch.expected_visit_count => {
                record.apply(&patch);
                Ok(record.clone())
            }
            _ => Err(StoreError::Conflict {
                address: address.to_string(),
            }),
        }
    }

    async fn list_all(&self) -> Result<Vec<UserRecord>, StoreError> {
        Ok(self.records.read().await.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn address() -> Address {
        Address::parse("0x1111111111111111111111111111111111111111").unwrap()
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let store = InMemoryRecordStore::new();
        assert!(store.get(&address()).await.unwrap().is_none());

        let record = UserRecord::first_visit(address(), dec!(1.5));
        store.create(record.clone()).await.unwrap();
        assert_eq!(store.get(&address()).await.unwrap(), Some(record));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_duplicate_create_conflicts() {
        let store = InMemoryRecordStore::new();
        store
            .create(UserRecord::first_visit(address(), dec!(1)))
            .await
            .unwrap();
        let err = store
            .create(UserRecord::first_visit(address(), dec!(9)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        let stored = store.get(&address()).await.unwrap().unwrap();
        assert_eq!(stored.balance_snapshot, dec!(1));
    }

    #[tokio::test]
    async fn test_update_checks_expected_visit_count() {
        let store = InMemoryRecordStore::new();
        let record = store
            .create(UserRecord::first_visit(address(), dec!(1)))
            .await
            .unwrap();

        let patch = RecordPatch::next_visit(&record, dec!(4));
        let updated = store.update(&address(), patch.clone()).await.unwrap();
        assert_eq!(updated.visit_count, 2);
        assert_eq!(updated.balance_snapshot, dec!(4));

        // Replaying the same patch is stale now.
        let err = store.update(&address(), patch).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_update_missing_record_conflicts() {
        let store = InMemoryRecordStore::new();
        let patch = RecordPatch {
            balance_snapshot: dec!(1),
            visit_count: 2,
            expected_visit_count: 1,
        };
        assert!(store.update(&address(), patch).await.is_err());
        assert!(store.is_empty().await);
    }
}
