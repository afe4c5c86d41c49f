//! Expiring score snapshot cache.
//!
//! The updater writes a [`ScoreSnapshot`] per address after every successful
//! update. The cache is an accelerator for readers, never a source of truth:
//! write failures are reported and swallowed by the caller.

mod memory;
mod redis_cache;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::CacheError;
use crate::model::ScoreSnapshot;

pub use memory::MokaScoreCache;
pub use redis_cache::RedisScoreCache;

/// Lifetime of a cached snapshot.
pub const SCORE_TTL: Duration = Duration::from_secs(3600);

#[async_trait]
pub trait ScoreCache: Send + Sync {
    /// Store `snapshot` under `key`, replacing any previous value.
    async fn set_with_ttl(
        &self,
        key: &str,
        snapshot: &ScoreSnapshot,
        ttl: Duration,
    ) -> Result<(), CacheError>;

    /// `None` once the entry has expired.
    async fn get(&self, key: &str) -> Result<Option<ScoreSnapshot>, CacheError>;
}
