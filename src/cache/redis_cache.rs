use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;

use super::ScoreCache;
use crate::error::CacheError;
use crate::model::ScoreSnapshot;

/// Redis score cache. Snapshots are stored as JSON with `SET .. EX`.
#[derive(Clone)]
pub struct RedisScoreCache {
    conn: MultiplexedConnection,
}

impl RedisScoreCache {
    pub async fn connect(redis_url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        tracing::info!("connected to redis score cache");
        Ok(Self { conn })
    }
}

/// Redis rejects `EX 0`, so round sub-second TTLs up.
fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

fn encode_snapshot(snapshot: &ScoreSnapshot) -> Result<String, CacheError> {
    Ok(serde_json::to_string(snapshot)?)
}

fn decode_snapshot(json: Option<String>) -> Result<Option<ScoreSnapshot>, CacheError> {
    json.map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(CacheError::from)
}

#[async_trait]
impl ScoreCache for RedisScoreCache {
    async fn set_with_ttl(
        &self,
        key: &str,
        snapshot: &ScoreSnapshot,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let json = encode_snapshot(snapshot)?;
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(json)
            .arg("EX")
            .arg(ttl_seconds(ttl))
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<ScoreSnapshot>, CacheError> {
        let mut conn = self.conn.clone();
        let json: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await?;
        decode_snapshot(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn snapshot() -> ScoreSnapshot {
        ScoreSnapshot {
            display_name: "UserABCD".to_string(),
            score: dec!(6.5),
            visit_count: 2,
        }
    }

    #[test]
    fn test_ttl_seconds() {
        assert_eq!(ttl_seconds(Duration::from_secs(3600)), 3600);
        assert_eq!(ttl_seconds(Duration::from_millis(10)), 1);
    }

    #[test]
    fn test_snapshot_encoding() {
        let json = encode_snapshot(&snapshot()).unwrap();
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&json).unwrap(),
            serde_json::json!({"displayName": "UserABCD", "score": 6.5, "visitCount": 2})
        );
        assert_eq!(decode_snapshot(Some(json)).unwrap(), Some(snapshot()));
    }

    #[test]
    fn test_decode_missing_and_garbage() {
        assert_eq!(decode_snapshot(None).unwrap(), None);
        assert!(matches!(
            decode_snapshot(Some("not json".to_string())),
            Err(CacheError::Encoding(_))
        ));
    }

    /// Needs a running server: `REDIS_URL=redis://127.0.0.1/ cargo test`.
    #[tokio::test]
    async fn test_live_set_get_and_expiry() {
        let Ok(url) = std::env::var("REDIS_URL") else {
            eprintln!("REDIS_URL not set, skipping");
            return;
        };
        let cache = RedisScoreCache::connect(&url).await.unwrap();
        let key = format!(
            "worthboard-test-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        );

        assert!(cache.get(&key).await.unwrap().is_none());
        cache
            .set_with_ttl(&key, &snapshot(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), Some(snapshot()));

        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert!(cache.get(&key).await.unwrap().is_none());
    }
}
