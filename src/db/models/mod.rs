pub mod favorite;
pub mod practice_session;
pub mod profile;
pub mod video;

pub use favorite::FavoriteVideo;
pub use practice_session::{
    FinishedSession, PracticeHistoryEntry, PracticeSessionRecord, PracticeStats, PracticeStatus,
};
pub use profile::{AvatarConfig, ProfileUpdate, UserProfile, DEFAULT_DISPLAY_NAME};
pub use video::{DanceVideo, NewDanceVideo, VideoFilter, DIFFICULTIES};
