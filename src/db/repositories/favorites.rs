use anyhow::{anyhow, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::db::{connection::Database, helpers::parse_datetime, models::FavoriteVideo};

use super::videos::row_to_video;

impl Database {
    /// Flip a video in or out of the user's favorites. Returns true when the
    /// video is a favorite afterwards.
    pub async fn toggle_favorite(&self, user_id: &str, video_id: i64) -> Result<bool> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let tx = conn.transaction()?;

            let video_exists: Option<i64> = tx
                .query_row(
                    "SELECT id FROM dance_videos WHERE id = ?1",
                    params![video_id],
                    |row| row.get(0),
                )
                .optional()?;
            if video_exists.is_none() {
                return Err(anyhow!("video {video_id} not found"));
            }

            let removed = tx.execute(
                "DELETE FROM user_favorites WHERE user_id = ?1 AND video_id = ?2",
                params![user_id, video_id],
            )?;

            let is_favorite = if removed > 0 {
                false
            } else {
                tx.execute(
                    "INSERT INTO user_favorites (user_id, video_id, created_at) VALUES (?1, ?2, ?3)",
                    params![user_id, video_id, Utc::now().to_rfc3339()],
                )?;
                true
            };

            tx.commit()?;
            Ok(is_favorite)
        })
        .await
    }

    pub async fn list_favorites(&self, user_id: &str) -> Result<Vec<FavoriteVideo>> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT f.user_id, f.created_at AS favorited_at,
                        v.id, v.title, v.artist, v.description, v.video_url, v.thumbnail_url,
                        v.difficulty, v.duration_secs, v.category, v.bpm, v.steps, v.created_at
                 FROM user_favorites f
                 INNER JOIN dance_videos v ON v.id = f.video_id
                 WHERE f.user_id = ?1
                 ORDER BY f.created_at DESC",
            )?;

            let mut rows = stmt.query(params![user_id])?;
            let mut favorites = Vec::new();
            while let Some(row) = rows.next()? {
                let favorited_at: String = row.get("favorited_at")?;
                favorites.push(FavoriteVideo {
                    user_id: row.get("user_id")?,
                    created_at: parse_datetime(&favorited_at, "favorited_at")?,
                    video: row_to_video(row)?,
                });
            }
            Ok(favorites)
        })
        .await
    }
}
