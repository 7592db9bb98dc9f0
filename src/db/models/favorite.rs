use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::video::DanceVideo;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteVideo {
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub video: DanceVideo,
}
