//! Core data types for per-address net worth scoring.
//!
//! Defines validated addresses, the display name rule, persistent user
//! records, cached score snapshots and derived leaderboard entries.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::InputError;

/// Characters of the address (after `0x`) that make up the display name.
const NAME_SLICE: std::ops::Range<usize> = 2..6;

/// Hex digits expected after the `0x` prefix.
const ADDRESS_HEX_LEN: usize = 40;

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// A validated account address.
///
/// The key is the lowercase hex form, so case variants of one account are
/// the same address. The display name is taken from the input as supplied.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address {
    key: String,
    name: String,
}

impl Address {
    /// Parse and validate a raw address string.
    pub fn parse(raw: &str) -> Result<Self, InputError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(InputError::Missing);
        }
        // Run the name rule first so short input reports TooShort.
        let name = display_name(trimmed)?;

        let hex = trimmed
            .strip_prefix("0x")
            .ok_or_else(|| InputError::Malformed {
                address: trimmed.to_string(),
                reason: "missing 0x prefix".to_string(),
            })?;
        if hex.len() != ADDRESS_HEX_LEN {
            return Err(InputError::Malformed {
                address: trimmed.to_string(),
                reason: format!("expected {} hex digits, got {}", ADDRESS_HEX_LEN, hex.len()),
            });
        }
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(InputError::Malformed {
                address: trimmed.to_string(),
                reason: "non-hex character".to_string(),
            });
        }

        Ok(Self {
            key: format!("0x{}", hex.to_ascii_lowercase()),
            name,
        })
    }

    /// Lowercase key used by the stores, the cache and the oracle.
    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// Display name derived from the address as it was supplied.
    pub fn display_name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Address {}

impl Hash for Address {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Address {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl TryFrom<String> for Address {
    type Error = InputError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.key
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.key
    }
}

/// Derive a display name from an address: `"User"` plus the four characters
/// following the `0x` prefix.
///
/// Two addresses sharing those four characters get the same name. Input
/// shorter than six characters is rejected rather than truncated.
pub fn display_name(address: &str) -> Result<String, InputError> {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() < NAME_SLICE.end {
        return Err(InputError::TooShort {
            address: address.to_string(),
            len: chars.len(),
            min: NAME_SLICE.end,
        });
    }
    let slice: String = chars[NAME_SLICE].iter().collect();
    Ok(format!("User{}", slice))
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Persistent per-address record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub address: Address,
    /// Fixed at creation.
    pub display_name: String,
    pub balance_snapshot: Decimal,
    /// Always >= 1.
    pub visit_count: u64,
}

impl UserRecord {
    /// First sighting of an address.
    pub fn first_visit(address: Address, balance: Decimal) -> Self {
        let display_name = address.display_name().to_string();
        Self {
            address,
            display_name,
            balance_snapshot: balance,
            visit_count: 1,
        }
    }

    /// Net worth: balance times visit count. Saturates instead of overflowing.
    pub fn score(&self) -> Decimal {
        self.balance_snapshot
            .saturating_mul(Decimal::from(self.visit_count))
    }

    /// Apply a patch in place.
    pub fn apply(&mut self, patch: &RecordPatch) {
        self.balance_snapshot = patch.balance_snapshot;
        self.visit_count = patch.visit_count;
    }
}

/// Conditional update of an existing record.
///
/// Stores apply it only while the stored `visit_count` still equals
/// `expected_visit_count`, and report [`StoreError::Conflict`] otherwise.
///
/// [`StoreError::Conflict`]: crate::error::StoreError::Conflict
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPatch {
    pub balance_snapshot: Decimal,
    pub visit_count: u64,
    pub expected_visit_count: u64,
}

impl RecordPatch {
    /// The patch for one more visit on top of `current`.
    pub fn next_visit(current: &UserRecord, balance: Decimal) -> Self {
        Self {
            balance_snapshot: balance,
            visit_count: current.visit_count.saturating_add(1),
            expected_visit_count: current.visit_count,
        }
    }
}

// ---------------------------------------------------------------------------
// Derived views
// ---------------------------------------------------------------------------

/// Cached result of the latest update for one address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSnapshot {
    pub display_name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub score: Decimal,
    pub visit_count: u64,
}

impl From<&UserRecord> for ScoreSnapshot {
    fn from(record: &UserRecord) -> Self {
        Self {
            display_name: record.display_name.clone(),
            score: record.score(),
            visit_count: record.visit_count,
        }
    }
}

/// Response to an update request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOutcome {
    pub display_name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub score: Decimal,
    pub visit_multiplier: u64,
}

impl From<&UserRecord> for UpdateOutcome {
    fn from(record: &UserRecord) -> Self {
        Self {
            display_name: record.display_name.clone(),
            score: record.score(),
            visit_multiplier: record.visit_count,
        }
    }
}

/// One leaderboard row, computed at query time and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub display_name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub score: Decimal,
    pub visit_multiplier: u64,
}

impl From<&UserRecord> for LeaderboardEntry {
    fn from(record: &UserRecord) -> Self {
        Self {
            display_name: record.display_name.clone(),
            score: record.score(),
            visit_multiplier: record.visit_count,
        }
    }
}
