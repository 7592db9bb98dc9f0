use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name given to a profile created on first use.
pub const DEFAULT_DISPLAY_NAME: &str = "Dancer";

/// Look of the dancer's avatar. Unset parts use the renderer's defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AvatarConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hair_style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hair_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bottom_style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bottom_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shoes_style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skin_color: Option<String>,
}

impl AvatarConfig {
    /// Overlay the parts set in `other`.
    pub fn merge(&mut self, other: AvatarConfig) {
        fn overlay(slot: &mut Option<String>, value: Option<String>) {
            if value.is_some() {
                *slot = value;
            }
        }
        overlay(&mut self.hair_style, other.hair_style);
        overlay(&mut self.hair_color, other.hair_color);
        overlay(&mut self.top_style, other.top_style);
        overlay(&mut self.top_color, other.top_color);
        overlay(&mut self.bottom_style, other.bottom_style);
        overlay(&mut self.bottom_color, other.bottom_color);
        overlay(&mut self.shoes_style, other.shoes_style);
        overlay(&mut self.skin_color, other.skin_color);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i64,
    pub user_id: String,
    pub display_name: String,
    pub bio: Option<String>,
    pub level: u32,
    pub xp: u32,
    pub avatar_config: AvatarConfig,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial profile update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    /// `Some(None)` clears the bio.
    pub bio: Option<Option<String>>,
    pub level: Option<u32>,
    pub xp: Option<u32>,
    /// Merged into the stored avatar part by part.
    pub avatar_config: Option<AvatarConfig>,
}
