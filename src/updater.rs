//! Per-address state update: balance lookup, record upsert, score
//! computation and write-through to the score cache.

use std::sync::Arc;
use std::time::Instant;

use rust_decimal::Decimal;

use crate::cache::{ScoreCache, SCORE_TTL};
use crate::error::{OracleError, ServiceError, StoreError};
use crate::model::{Address, RecordPatch, ScoreSnapshot, UpdateOutcome, UserRecord};
use crate::oracle::BalanceOracle;
use crate::store::RecordStore;

/// Default number of read-modify-write rounds before giving up on a
/// contended address.
pub const DEFAULT_MAX_STORE_ATTEMPTS: u32 = 3;

/// Orchestrates a single visit for an address.
///
/// The oracle is consulted exactly once per call. Record writes are
/// conditional on the visit count that was read, and a lost race re-reads
/// the record and re-applies the same balance. The cache write is best
/// effort: its failure is logged and counted, never returned.
#[derive(Clone)]
pub struct UserStateUpdater {
    oracle: Arc<dyn BalanceOracle>,
    store: Arc<dyn RecordStore>,
    cache: Arc<dyn ScoreCache>,
    max_store_attempts: u32,
}

impl UserStateUpdater {
    pub fn new(
        oracle: Arc<dyn BalanceOracle>,
        store: Arc<dyn RecordStore>,
        cache: Arc<dyn ScoreCache>,
    ) -> Self {
        Self {
            oracle,
            store,
            cache,
            max_store_attempts: DEFAULT_MAX_STORE_ATTEMPTS,
        }
    }

    pub fn with_max_store_attempts(mut self, attempts: u32) -> Self {
        self.max_store_attempts = attempts.max(1);
        self
    }

    /// Record a visit for `raw_address` and return its fresh score.
    pub async fn update(&self, raw_address: &str) -> Result<UpdateOutcome, ServiceError> {
        let start = Instant::now();
        let address = Address::parse(raw_address)?;

        let balance = self.oracle.get_balance(&address).await?;
        if balance.is_sign_negative() && !balance.is_zero() {
            return Err(OracleError::NegativeBalance {
                address: address.to_string(),
                balance: balance.to_string(),
            }
            .into());
        }

        let (record, created) = self.upsert(&address, balance).await?;
        let snapshot = ScoreSnapshot::from(&record);

        match self
            .cache
            .set_with_ttl(address.as_str(), &snapshot, SCORE_TTL)
            .await
        {
            Ok(()) => crate::metrics::record_cache_write(true),
            Err(e) => {
                crate::metrics::record_cache_write(false);
                tracing::warn!(%address, error = %e, "score cache write failed");
            }
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        crate::metrics::record_update(if created { "created" } else { "updated" }, duration_ms);
        tracing::info!(
            %address,
            visit_count = record.visit_count,
            score = %snapshot.score,
            created,
            duration_ms,
            "user state updated"
        );

        Ok(UpdateOutcome::from(&record))
    }

    /// Create or bump the record. Returns the stored record and whether it
    /// was newly created.
    async fn upsert(
        &self,
        address: &Address,
        balance: Decimal,
    ) -> Result<(UserRecord, bool), StoreError> {
        for attempt in 1..=self.max_store_attempts {
            let result = match self.store.get(address).await? {
                None => self
                    .store
                    .create(UserRecord::first_visit(address.clone(), balance))
                    .await
                    .map(|record| (record, true)),
                Some(existing) => self
                    .store
                    .update(address, RecordPatch::next_visit(&existing, balance))
                    .await
                    .map(|record| (record, false)),
            };

            match result {
                Err(StoreError::Conflict { .. }) => {
                    crate::metrics::record_store_conflict();
                    tracing::debug!(%address, attempt, "record write conflict, re-reading");
                }
                other => return other,
            }
        }

        Err(StoreError::Contended {
            address: address.to_string(),
            attempts: self.max_store_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    use crate::cache::MokaScoreCache;
    use crate::error::{CacheError, ErrorKind};
    use crate::store::InMemoryRecordStore;

    const ADDR: &str = "0xABCDEF0123456789abcdef0123456789ABCDEF01";

    struct FixedOracle(Decimal);

    #[async_trait]
    impl BalanceOracle for FixedOracle {
        async fn get_balance(&self, _address: &Address) -> Result<Decimal, OracleError> {
            Ok(self.0)
        }
    }

    /// Always reports a conflict, as if another writer always wins.
    struct AlwaysConflicting {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl RecordStore for AlwaysConflicting {
        async fn get(&self, _address: &Address) -> Result<Option<UserRecord>, StoreError> {
            Ok(None)
        }

        async fn create(&self, record: UserRecord) -> Result<UserRecord, StoreError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Conflict {
                address: record.address.to_string(),
            })
        }

        async fn update(
            &self,
            address: &Address,
            _patch: RecordPatch,
        ) -> Result<UserRecord, StoreError> {
            Err(StoreError::Conflict {
                address: address.to_string(),
            })
        }

        async fn list_all(&self) -> Result<Vec<UserRecord>, StoreError> {
            Ok(Vec::new())
        }
    }

    struct BrokenCache;

    #[async_trait]
    impl ScoreCache for BrokenCache {
        async fn set_with_ttl(
            &self,
            _key: &str,
            _snapshot: &ScoreSnapshot,
            _ttl: Duration,
        ) -> Result<(), CacheError> {
            Err(serde_json::from_str::<u8>("x").unwrap_err().into())
        }

        async fn get(&self, _key: &str) -> Result<Option<ScoreSnapshot>, CacheError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_first_visit_then_repeat() {
        let store = Arc::new(InMemoryRecordStore::new());
        let cache = Arc::new(MokaScoreCache::new(16));

        let updater = UserStateUpdater::new(
            Arc::new(FixedOracle(dec!(2.0))),
            store.clone(),
            cache.clone(),
        );
        let first = updater.update(ADDR).await.unwrap();
        assert_eq!(first.display_name, "UserABCD");
        assert_eq!(first.score, dec!(2.0));
        assert_eq!(first.visit_multiplier, 1);

        let updater = UserStateUpdater::new(Arc::new(FixedOracle(dec!(3.0))), store, cache.clone());
        let second = updater.update(ADDR).await.unwrap();
        assert_eq!(second.score, dec!(6.0));
        assert_eq!(second.visit_multiplier, 2);

        let cached = cache.get(&ADDR.to_ascii_lowercase()).await.unwrap().unwrap();
        assert_eq!(cached.score, dec!(6.0));
        assert_eq!(cached.visit_count, 2);
    }

    #[tokio::test]
    async fn test_negative_balance_rejected() {
        let store = Arc::new(InMemoryRecordStore::new());
        let updater = UserStateUpdater::new(
            Arc::new(FixedOracle(dec!(-1))),
            store.clone(),
            Arc::new(MokaScoreCache::new(16)),
        );
        let err = updater.update(ADDR).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Oracle);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_invalid_address_rejected() {
        let updater = UserStateUpdater::new(
            Arc::new(FixedOracle(dec!(1))),
            Arc::new(InMemoryRecordStore::new()),
            Arc::new(MokaScoreCache::new(16)),
        );
        let err = updater.update("0x12").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Input);
    }

    #[tokio::test]
    async fn test_cache_failure_is_not_fatal() {
        let updater = UserStateUpdater::new(
            Arc::new(FixedOracle(dec!(5))),
            Arc::new(InMemoryRecordStore::new()),
            Arc::new(BrokenCache),
        );
        let outcome = updater.update(ADDR).await.unwrap();
        assert_eq!(outcome.score, dec!(5));
        assert_eq!(outcome.visit_multiplier, 1);
    }

    #[tokio::test]
    async fn test_contention_gives_up_after_max_attempts() {
        let store = Arc::new(AlwaysConflicting {
            attempts: AtomicUsize::new(0),
        });
        let cache = Arc::new(MokaScoreCache::new(16));
        let updater = UserStateUpdater::new(
            Arc::new(FixedOracle(dec!(1))),
            store.clone(),
            cache.clone(),
        )
        .with_max_store_attempts(4);

        let err = updater.update(ADDR).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Store(StoreError::Contended { attempts: 4, .. })
        ));
        assert_eq!(store.attempts.load(Ordering::SeqCst), 4);
        assert!(cache.get(&ADDR.to_ascii_lowercase()).await.unwrap().is_none());
    }
}
