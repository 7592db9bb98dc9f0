use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, to_u32},
    models::{DanceVideo, NewDanceVideo, VideoFilter},
};

/// Escape `LIKE` wildcards so a search matches them literally. Pair with
/// `ESCAPE '\'`.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

const VIDEO_COLUMNS: &str = "id, title, artist, description, video_url, thumbnail_url, difficulty, duration_secs, category, bpm, steps, created_at";

pub(super) fn row_to_video(row: &Row) -> Result<DanceVideo> {
    let duration_secs: i64 = row.get("duration_secs")?;
    let bpm: Option<i64> = row.get("bpm")?;
    let steps: String = row.get("steps")?;
    let created_at: String = row.get("created_at")?;

    Ok(DanceVideo {
        id: row.get("id")?,
        title: row.get("title")?,
        artist: row.get("artist")?,
        description: row.get("description")?,
        video_url: row.get("video_url")?,
        thumbnail_url: row.get("thumbnail_url")?,
        difficulty: row.get("difficulty")?,
        duration_secs: to_u32(duration_secs, "duration_secs")?,
        category: row.get("category")?,
        bpm: bpm.map(|value| to_u32(value, "bpm")).transpose()?,
        steps: serde_json::from_str(&steps).context("failed to parse video steps")?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

impl Database {
    pub async fn insert_video(&self, video: &NewDanceVideo) -> Result<DanceVideo> {
        let record = video.clone();
        self.execute(move |conn| {
            let created_at = Utc::now();
            let steps = serde_json::to_string(&record.steps)?;
            conn.execute(
                "INSERT INTO dance_videos (title, artist, description, video_url, thumbnail_url, difficulty, duration_secs, category, bpm, steps, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    record.title,
                    record.artist,
                    record.description,
                    record.video_url,
                    record.thumbnail_url,
                    record.difficulty,
                    record.duration_secs,
                    record.category,
                    record.bpm,
                    steps,
                    created_at.to_rfc3339(),
                ],
            )
            .context("failed to insert video")?;

            Ok(DanceVideo {
                id: conn.last_insert_rowid(),
                title: record.title,
                artist: record.artist,
                description: record.description,
                video_url: record.video_url,
                thumbnail_url: record.thumbnail_url,
                difficulty: record.difficulty,
                duration_secs: record.duration_secs,
                category: record.category,
                bpm: record.bpm,
                steps: record.steps,
                created_at,
            })
        })
        .await
    }

    pub async fn get_video(&self, video_id: i64) -> Result<Option<DanceVideo>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {VIDEO_COLUMNS} FROM dance_videos WHERE id = ?1"
            ))?;
            let video = stmt
                .query_row(params![video_id], |row| Ok(row_to_video(row)))
                .optional()?
                .transpose()?;
            Ok(video)
        })
        .await
    }

    pub async fn list_videos(&self, filter: &VideoFilter) -> Result<Vec<DanceVideo>> {
        let filter = filter.clone();
        self.execute(move |conn| {
            let mut clauses = Vec::new();
            let mut values: Vec<String> = Vec::new();

            if let Some(category) = filter.category.filter(|c| !c.is_empty()) {
                clauses.push("category = ?");
                values.push(category);
            }
            if let Some(difficulty) = filter.difficulty.filter(|d| !d.is_empty()) {
                clauses.push("difficulty = ?");
                values.push(difficulty);
            }
            if let Some(search) = filter.search.filter(|s| !s.trim().is_empty()) {
                clauses.push(
                    "(LOWER(title) LIKE ? ESCAPE '\\' OR LOWER(COALESCE(artist, '')) LIKE ? ESCAPE '\\' OR LOWER(COALESCE(description, '')) LIKE ? ESCAPE '\\')",
                );
                let pattern = format!("%{}%", escape_like(&search.trim().to_lowercase()));
                values.extend(std::iter::repeat(pattern).take(3));
            }

            let where_sql = if clauses.is_empty() {
                String::new()
            } else {
                format!("WHERE {}", clauses.join(" AND "))
            };

            let mut stmt = conn.prepare(&format!(
                "SELECT {VIDEO_COLUMNS} FROM dance_videos {where_sql} ORDER BY created_at DESC, id DESC"
            ))?;

            let mut rows = stmt.query(params_from_iter(values.iter()))?;
            let mut videos = Vec::new();
            while let Some(row) = rows.next()? {
                videos.push(row_to_video(row)?);
            }
            Ok(videos)
        })
        .await
    }

    pub async fn count_videos(&self) -> Result<u64> {
        self.execute(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM dance_videos", [], |row| row.get(0))?;
            Ok(count.max(0) as u64)
        })
        .await
    }

    /// Populate an empty library with the starter routines. Returns how many
    /// videos were added.
    pub async fn seed_sample_videos(&self) -> Result<usize> {
        if self.count_videos().await? > 0 {
            return Ok(0);
        }

        let samples = sample_videos();
        for video in &samples {
            self.insert_video(video).await?;
        }
        Ok(samples.len())
    }
}

fn sample_videos() -> Vec<NewDanceVideo> {
    #[allow(clippy::too_many_arguments)]
    fn video(
        title: &str,
        artist: &str,
        description: &str,
        video_url: &str,
        thumbnail_url: &str,
        difficulty: &str,
        duration_secs: u32,
        category: &str,
        steps: &[&str],
    ) -> NewDanceVideo {
        NewDanceVideo {
            title: title.into(),
            artist: Some(artist.into()),
            description: Some(description.into()),
            video_url: video_url.into(),
            thumbnail_url: Some(thumbnail_url.into()),
            difficulty: difficulty.into(),
            duration_secs,
            category: category.into(),
            bpm: None,
            steps: steps.iter().map(|step| step.to_string()).collect(),
        }
    }

    vec![
        video(
            "Hip Hop Basics: The Two-Step",
            "Dance Academy",
            "Learn the fundamental two-step move essential for all hip hop dance.",
            "https://www.youtube.com/embed/Z6q1wXqT7nU",
            "https://images.unsplash.com/photo-1535525153412-5a42439a210d?q=80&w=2070&auto=format&fit=crop",
            "beginner",
            180,
            "hip-hop",
            &["Step right", "Tap left", "Step left", "Tap right"],
        ),
        video(
            "Salsa 101: Basic Step",
            "Latin Flow",
            "Master the basic forward and backward step of Salsa.",
            "https://www.youtube.com/embed/0uM917-r16U",
            "https://images.unsplash.com/photo-1516641396056-0ce60a85d49f?q=80&w=2070&auto=format&fit=crop",
            "beginner",
            240,
            "latin",
            &[
                "Forward left",
                "Step in place right",
                "Together left",
                "Back right",
                "Step in place left",
                "Together right",
            ],
        ),
        video(
            "Contemporary Flow",
            "Modern Moves",
            "Expressive movements focusing on fluidity and emotion.",
            "https://www.youtube.com/embed/z1X_KzXyB6I",
            "https://images.unsplash.com/photo-1508700929628-666bc8bd84ea?q=80&w=2070&auto=format&fit=crop",
            "intermediate",
            300,
            "contemporary",
            &["Reach up", "Fall forward", "Roll up", "Spin"],
        ),
        video(
            "K-Pop Routine: Energy",
            "Seoul Star",
            "High energy routine inspired by popular K-Pop choreography.",
            "https://www.youtube.com/embed/z1X_KzXyB6I",
            "https://images.unsplash.com/photo-1524594152303-9fd13543fe6e?q=80&w=2070&auto=format&fit=crop",
            "advanced",
            210,
            "k-pop",
            &["Jump turn", "Arm wave", "Body roll", "Snap"],
        ),
    ]
}
