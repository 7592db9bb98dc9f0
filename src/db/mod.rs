//! SQLite storage: the practice session ledger, the video library and
//! favorites.

mod connection;
mod helpers;
mod migrations;
pub mod models;
mod repositories;

pub use connection::Database;
pub use models::{
    AvatarConfig, DanceVideo, FavoriteVideo, FinishedSession, NewDanceVideo, PracticeHistoryEntry,
    PracticeSessionRecord, PracticeStats, PracticeStatus, ProfileUpdate, UserProfile, VideoFilter,
    DEFAULT_DISPLAY_NAME, DIFFICULTIES,
};
