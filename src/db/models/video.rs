use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DIFFICULTIES: [&str; 3] = ["beginner", "intermediate", "advanced"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DanceVideo {
    pub id: i64,
    pub title: String,
    pub artist: Option<String>,
    pub description: Option<String>,
    pub video_url: String,
    pub thumbnail_url: Option<String>,
    /// beginner, intermediate or advanced
    pub difficulty: String,
    pub duration_secs: u32,
    pub category: String,
    pub bpm: Option<u32>,
    pub steps: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when adding a video; id and timestamp are assigned on insert.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewDanceVideo {
    pub title: String,
    pub artist: Option<String>,
    pub description: Option<String>,
    pub video_url: String,
    pub thumbnail_url: Option<String>,
    pub difficulty: String,
    pub duration_secs: u32,
    pub category: String,
    pub bpm: Option<u32>,
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoFilter {
    pub category: Option<String>,
    pub difficulty: Option<String>,
    /// Case-insensitive match against title, artist and description.
    pub search: Option<String>,
}
