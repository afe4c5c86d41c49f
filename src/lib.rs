//! worthboard: per-address net worth scores and leaderboard
//!
//! Each visit for an address fetches its current native balance, bumps a
//! persistent visit counter and scores the address as `balance * visits`.
//! The latest score is written through to an expiring cache, and the
//! leaderboard ranks every stored address by score.
//!
//! # Components
//!
//! - [`oracle::BalanceOracle`]: balance lookup (JSON-RPC `eth_getBalance`)
//! - [`store::RecordStore`]: persistent user records (in-memory or Postgres)
//! - [`cache::ScoreCache`]: expiring score snapshots (moka or Redis)
//! - [`updater::UserStateUpdater`]: oracle + upsert + score + cache write
//! - [`leaderboard::LeaderboardRanker`]: score-ordered view of all records

pub mod cache;
pub mod config;
pub mod error;
pub mod leaderboard;
pub mod metrics;
pub mod model;
pub mod oracle;
pub mod server;
pub mod store;
pub mod updater;

pub use error::{CacheError, ErrorKind, InputError, OracleError, ServiceError, StoreError};
pub use leaderboard::LeaderboardRanker;
pub use model::{display_name, Address, LeaderboardEntry, ScoreSnapshot, UpdateOutcome, UserRecord};
pub use updater::UserStateUpdater;
