//! Persistent user records.
//!
//! Provides the [`RecordStore`] port with an in-memory implementation and a
//! Postgres implementation. Both implement conditional writes so concurrent
//! updates to one address cannot lose an increment.

mod memory;
mod postgres;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::{Address, RecordPatch, UserRecord};

pub use memory::InMemoryRecordStore;
pub use postgres::PostgresRecordStore;

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, address: &Address) -> Result<Option<UserRecord>, StoreError>;

    /// Insert a new record. Fails with [`StoreError::Conflict`] if the
    /// address already exists.
    async fn create(&self, record: UserRecord) -> Result<UserRecord, StoreError>;

    /// Apply `patch` if the stored visit count still equals
    /// `patch.expected_visit_count`, otherwise [`StoreError::Conflict`].
    async fn update(&self, address: &Address, patch: RecordPatch)
        -> Result<UserRecord, StoreError>;

    async fn list_all(&self) -> Result<Vec<UserRecord>, StoreError>;
}
