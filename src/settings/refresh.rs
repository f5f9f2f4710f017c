//! Refresh rules and latest-data bookkeeping for data sources.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// How a data source's latest-data boundary is kept fresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "lowercase")]
pub enum RefreshRule {
    /// The boundary is pinned to a fixed instant and never re-derived.
    Fixed { time: DateTime<Utc> },

    /// The boundary is re-derived by querying the backend whenever the last
    /// check is older than `check_every_ms`.
    Query { check_every_ms: u64 },
}

impl RefreshRule {
    pub fn fixed(time: DateTime<Utc>) -> Self {
        RefreshRule::Fixed { time }
    }

    pub fn query(check_every_ms: u64) -> Self {
        RefreshRule::Query { check_every_ms }
    }

    /// Whether the periodic sweep should re-derive the boundary now.
    ///
    /// A query-driven source with no recorded boundary is always stale.
    pub fn should_update(&self, max_time: Option<&MaxTime>, now: DateTime<Utc>) -> bool {
        match self {
            RefreshRule::Fixed { .. } => false,
            RefreshRule::Query { check_every_ms } => match max_time {
                None => true,
                Some(max_time) => {
                    now - max_time.updated >= Duration::milliseconds(*check_every_ms as i64)
                }
            },
        }
    }
}

impl Default for RefreshRule {
    fn default() -> Self {
        RefreshRule::Query {
            check_every_ms: 60_000,
        }
    }
}

/// A source's latest-data boundary and when it was last derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaxTime {
    /// The latest instant for which the source has data.
    pub time: DateTime<Utc>,

    /// When `time` was last derived.
    pub updated: DateTime<Utc>,
}

impl MaxTime {
    pub fn updated_now(time: DateTime<Utc>) -> Self {
        Self {
            time,
            updated: Utc::now(),
        }
    }
}
