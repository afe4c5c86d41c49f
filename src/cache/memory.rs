use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::sync::Cache;
use moka::Expiry;

use super::ScoreCache;
use crate::error::CacheError;
use crate::model::ScoreSnapshot;

#[derive(Clone)]
struct Entry {
    snapshot: ScoreSnapshot,
    ttl: Duration,
}

/// Expires each entry after the TTL it was written with.
struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Entry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process score cache with bounded capacity.
#[derive(Clone)]
pub struct MokaScoreCache {
    inner: Arc<Cache<String, Entry>>,
}

impl MokaScoreCache {
    /// Create a new cache holding at most `max_entries` snapshots.
    pub fn new(max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(PerEntryTtl)
            .build();

        Self {
            inner: Arc::new(cache),
        }
    }
}

#[async_trait]
impl ScoreCache for MokaScoreCache {
    async fn set_with_ttl(
        &self,
        key: &str,
        snapshot: &ScoreSnapshot,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.inner.insert(
            key.to_string(),
            Entry {
                snapshot: snapshot.clone(),
                ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<ScoreSnapshot>, CacheError> {
        Ok(self.inner.get(key).map(|entry| entry.snapshot))
    }
}
