use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use super::RecordStore;
use crate::error::StoreError;
use crate::model::{Address, RecordPatch, UserRecord};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    address          TEXT PRIMARY KEY,
    display_name     TEXT NOT NULL,
    balance_snapshot NUMERIC NOT NULL CHECK (balance_snapshot >= 0),
    visit_count      BIGINT NOT NULL CHECK (visit_count >= 1)
)
"#;

const COLUMNS: &str = "address, display_name, balance_snapshot, visit_count";

/// Postgres-backed record store.
pub struct PostgresRecordStore {
    pool: PgPool,
}

impl PostgresRecordStore {
    /// Connect and make sure the `users` table exists.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        let store = Self::from_pool(pool);
        store.initialize_schema().await?;
        tracing::info!("connected to postgres record store");
        Ok(store)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn initialize_schema(&self) -> Result<(), StoreError> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }
}

fn record_from_row(row: &PgRow) -> Result<UserRecord, StoreError> {
    let address: String = row.try_get("address")?;
    let display_name: String = row.try_get("display_name")?;
    let balance_snapshot: Decimal = row.try_get("balance_snapshot")?;
    let visit_count: i64 = row.try_get("visit_count")?;

    let address = Address::parse(&address)
        .map_err(|e| StoreError::Corrupt(format!("stored address: {}", e)))?;
    let visit_count = u64::try_from(visit_count)
        .ok()
        .filter(|count| *count >= 1)
        .ok_or_else(|| {
            StoreError::Corrupt(format!("visit_count {} for {}", visit_count, address))
        })?;

    Ok(UserRecord {
        address,
        display_name,
        balance_snapshot,
        visit_count,
    })
}

fn to_db_count(count: u64) -> Result<i64, StoreError> {
    i64::try_from(count).map_err(|_| StoreError::Corrupt(format!("visit_count {} overflows", count)))
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    async fn get(&self, address: &Address) -> Result<Option<UserRecord>, StoreError> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE address = $1", COLUMNS))
            .bind(address.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn create(&self, record: UserRecord) -> Result<UserRecord, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO users ({cols}) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (address) DO NOTHING RETURNING {cols}",
            cols = COLUMNS
        ))
        .bind(record.address.as_str())
        .bind(&record.display_name)
        .bind(record.balance_snapshot)
        .bind(to_db_count(record.visit_count)?)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => record_from_row(&row),
            None => Err(StoreError::Conflict {
                address: record.address.to_string(),
            }),
        }
    }

    async fn update(
        &self,
        address: &Address,
        patch: RecordPatch,
    ) -> Result<UserRecord, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE users SET balance_snapshot = $2, visit_count = $3 \
             WHERE address = $1 AND visit_count = $4 RETURNING {}",
            COLUMNS
        ))
        .bind(address.as_str())
        .bind(patch.balance_snapshot)
        .bind(to_db_count(patch.visit_count)?)
        .bind(to_db_count(patch.expected_visit_count)?)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => record_from_row(&row),
            None => Err(StoreError::Conflict {
                address: address.to_string(),
            }),
        }
    }

    async fn list_all(&self) -> Result<Vec<UserRecord>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {} FROM users", COLUMNS))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(record_from_row).collect()
    }
}
