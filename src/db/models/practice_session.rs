//! Practice session ledger rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PracticeStatus {
    Active,
    Completed,
    Abandoned,
    Interrupted,
}

impl PracticeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PracticeStatus::Active => "Active",
            PracticeStatus::Completed => "Completed",
            PracticeStatus::Abandoned => "Abandoned",
            PracticeStatus::Interrupted => "Interrupted",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticeSessionRecord {
    pub id: String,
    pub user_id: String,
    pub video_id: i64,
    pub status: PracticeStatus,
    /// Display points (accuracy scaled up); 0 until finished.
    pub score: u32,
    /// 0-100.
    pub accuracy: u8,
    pub duration_played_secs: u64,
    pub feedback: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl PracticeSessionRecord {
    pub fn completed(&self) -> bool {
        self.status == PracticeStatus::Completed
    }
}

/// Results written once when a session finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishedSession {
    pub score: u32,
    pub accuracy: u8,
    pub duration_played_secs: u64,
    pub feedback: Option<String>,
    pub finished_at: DateTime<Utc>,
}

/// History row: a session joined with the title of the video practiced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticeHistoryEntry {
    pub session: PracticeSessionRecord,
    pub video_title: String,
    pub video_category: String,
}

/// Totals over a user's completed sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticeStats {
    pub total_sessions: u64,
    pub total_duration_secs: u64,
    /// Whole minutes, rounded to nearest.
    pub total_minutes: u64,
    /// Mean accuracy, rounded; 0 with no sessions.
    pub average_accuracy: u8,
}
