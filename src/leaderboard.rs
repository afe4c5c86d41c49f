//! Net worth leaderboard.

use std::sync::Arc;

use crate::error::StoreError;
use crate::model::{LeaderboardEntry, UserRecord};
use crate::store::RecordStore;

/// Ranks every stored record by score. Scores are recomputed from the store
/// on each call and never read from the score cache.
#[derive(Clone)]
pub struct LeaderboardRanker {
    store: Arc<dyn RecordStore>,
}

impl LeaderboardRanker {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn rank(&self) -> Result<Vec<LeaderboardEntry>, StoreError> {
        let records = self.store.list_all().await?;
        let entries = rank_records(records);
        crate::metrics::record_leaderboard(entries.len());
        Ok(entries)
    }
}

/// Order records by score descending, then address ascending so equal
/// scores always come back in the same order.
pub fn rank_records(records: Vec<UserRecord>) -> Vec<LeaderboardEntry> {
    let mut scored: Vec<_> = records
        .into_iter()
        .map(|record| (record.score(), record))
        .collect();
    scored.sort_by(|(a_score, a), (b_score, b)| {
        b_score.cmp(a_score).then_with(|| a.address.cmp(&b.address))
    });
    scored
        .iter()
        .map(|(_, record)| LeaderboardEntry::from(record))
        .collect()
}
