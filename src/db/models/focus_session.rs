//! Persisted focus-time records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timer::FocusSessionRecord;

/// A [`FocusSessionRecord`] once the store has accepted it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredFocusSession {
    pub id: String,
    #[serde(flatten)]
    pub record: FocusSessionRecord,
    pub created_at: DateTime<Utc>,
}

/// Time per project over some window, for summaries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectTotal {
    pub project_id: String,
    pub total_sec: u64,
    pub session_count: u32,
}

/// Narrows a session listing. Empty filter means everything, newest first.
#[derive(Debug, Clone, Default)]
pub struct FocusSessionFilter {
    pub project_id: Option<String>,
    /// Inclusive lower bound on session start.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on session start.
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: usize,
}
