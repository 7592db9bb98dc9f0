use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, parse_optional_datetime, parse_status, to_i64, to_percent, to_u32, to_u64},
    models::{
        FinishedSession, PracticeHistoryEntry, PracticeSessionRecord, PracticeStats, PracticeStatus,
    },
};

const SESSION_COLUMNS: &str = "id, user_id, video_id, status, score, accuracy, duration_played_secs, feedback, created_at, finished_at";

fn row_to_session(row: &Row) -> Result<PracticeSessionRecord> {
    let status: String = row.get("status")?;
    let score: i64 = row.get("score")?;
    let accuracy: i64 = row.get("accuracy")?;
    let duration_played_secs: i64 = row.get("duration_played_secs")?;
    let created_at: String = row.get("created_at")?;
    let finished_at: Option<String> = row.get("finished_at")?;

    Ok(PracticeSessionRecord {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        video_id: row.get("video_id")?,
        status: parse_status(&status)?,
        score: to_u32(score, "score")?,
        accuracy: to_percent(accuracy, "accuracy")?,
        duration_played_secs: to_u64(duration_played_secs, "duration_played_secs")?,
        feedback: row.get("feedback")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        finished_at: parse_optional_datetime(finished_at, "finished_at")?,
    })
}

fn load_session(conn: &Connection, session_id: &str) -> Result<Option<PracticeSessionRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SESSION_COLUMNS} FROM practice_sessions WHERE id = ?1"
    ))?;
    let session = stmt
        .query_row(params![session_id], |row| Ok(row_to_session(row)))
        .optional()?
        .transpose()?;
    Ok(session)
}

/// Explain why a status update touched no rows.
fn missing_or_closed(conn: &Connection, session_id: &str) -> anyhow::Error {
    match load_session(conn, session_id) {
        Ok(Some(session)) => anyhow!(
            "practice session {session_id} is {} and cannot be changed",
            session.status.as_str()
        ),
        Ok(None) => anyhow!("practice session {session_id} not found"),
        Err(err) => err,
    }
}

impl Database {
    /// Open a ledger row for a new practice session and return it.
    pub async fn start_practice_session(
        &self,
        user_id: &str,
        video_id: i64,
    ) -> Result<PracticeSessionRecord> {
        let record = PracticeSessionRecord {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            video_id,
            status: PracticeStatus::Active,
            score: 0,
            accuracy: 0,
            duration_played_secs: 0,
            feedback: None,
            created_at: Utc::now(),
            finished_at: None,
        };

        let row = record.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO practice_sessions (id, user_id, video_id, status, score, accuracy, duration_played_secs, feedback, created_at, finished_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    row.id,
                    row.user_id,
                    row.video_id,
                    row.status.as_str(),
                    row.score,
                    row.accuracy,
                    to_i64(row.duration_played_secs)?,
                    row.feedback,
                    row.created_at.to_rfc3339(),
                    row.finished_at.map(|dt| dt.to_rfc3339()),
                ],
            )
            .context("failed to insert practice session")?;
            Ok(())
        })
        .await?;

        Ok(record)
    }

    /// Write final results. Only an `Active` session can be finished, so a
    /// second finish for the same id is an error rather than an overwrite.
    pub async fn finish_practice_session(
        &self,
        session_id: &str,
        result: &FinishedSession,
    ) -> Result<PracticeSessionRecord> {
        if result.accuracy > 100 {
            bail!("accuracy {} is not a percentage", result.accuracy);
        }

        let session_id = session_id.to_string();
        let result = result.clone();
        self.execute(move |conn| {
            let updated = conn
                .execute(
                    "UPDATE practice_sessions
                     SET status = ?1,
                         score = ?2,
                         accuracy = ?3,
                         duration_played_secs = ?4,
                         feedback = ?5,
                         finished_at = ?6
                     WHERE id = ?7 AND status = 'Active'",
                    params![
                        PracticeStatus::Completed.as_str(),
                        result.score,
                        result.accuracy,
                        to_i64(result.duration_played_secs)?,
                        result.feedback,
                        result.finished_at.to_rfc3339(),
                        session_id,
                    ],
                )
                .context("failed to finish practice session")?;

            if updated == 0 {
                return Err(missing_or_closed(conn, &session_id));
            }

            load_session(conn, &session_id)?
                .ok_or_else(|| anyhow!("practice session {session_id} vanished after update"))
        })
        .await
    }

    pub async fn abandon_practice_session(
        &self,
        session_id: &str,
        abandoned_at: DateTime<Utc>,
    ) -> Result<()> {
        self.close_practice_session(session_id, PracticeStatus::Abandoned, abandoned_at)
            .await
    }

    pub async fn mark_session_interrupted(
        &self,
        session_id: &str,
        stopped_at: DateTime<Utc>,
    ) -> Result<()> {
        self.close_practice_session(session_id, PracticeStatus::Interrupted, stopped_at)
            .await
    }

    async fn close_practice_session(
        &self,
        session_id: &str,
        status: PracticeStatus,
        closed_at: DateTime<Utc>,
    ) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let updated = conn.execute(
                "UPDATE practice_sessions
                 SET status = ?1,
                     finished_at = ?2
                 WHERE id = ?3 AND status = 'Active'",
                params![status.as_str(), closed_at.to_rfc3339(), session_id],
            )?;

            if updated == 0 {
                return Err(missing_or_closed(conn, &session_id));
            }
            Ok(())
        })
        .await
    }

    pub async fn get_practice_session(
        &self,
        session_id: &str,
    ) -> Result<Option<PracticeSessionRecord>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| load_session(conn, &session_id))
            .await
    }

    /// Sessions still `Active`, i.e. left open by a crash or a killed process.
    pub async fn get_incomplete_sessions(&self) -> Result<Vec<PracticeSessionRecord>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS}
                 FROM practice_sessions
                 WHERE status = 'Active'
                 ORDER BY created_at DESC"
            ))?;

            let mut rows = stmt.query([])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }
            Ok(sessions)
        })
        .await
    }

    /// Dashboard totals over the user's `Completed` sessions.
    pub async fn practice_stats(&self, user_id: &str) -> Result<PracticeStats> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let (count, duration, average): (i64, i64, Option<f64>) = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(duration_played_secs), 0), AVG(accuracy)
                 FROM practice_sessions
                 WHERE user_id = ?1 AND status = 'Completed'",
                params![user_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;

            let total_duration_secs = to_u64(duration, "duration_played_secs")?;
            Ok(PracticeStats {
                total_sessions: to_u64(count, "session count")?,
                total_duration_secs,
                total_minutes: (total_duration_secs + 30) / 60,
                average_accuracy: average
                    .map(|avg| avg.round().clamp(0.0, 100.0) as u8)
                    .unwrap_or(0),
            })
        })
        .await
    }

    /// A user's sessions, newest first, with the video each one practiced.
    pub async fn practice_history(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<PracticeHistoryEntry>> {
        let user_id = user_id.to_string();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT s.id, s.user_id, s.video_id, s.status, s.score, s.accuracy,
                        s.duration_played_secs, s.feedback, s.created_at, s.finished_at,
                        v.title AS video_title, v.category AS video_category
                 FROM practice_sessions s
                 INNER JOIN dance_videos v ON v.id = s.video_id
                 WHERE s.user_id = ?1
                 ORDER BY s.created_at DESC
                 LIMIT ?2",
            )?;

            let mut rows = stmt.query(params![user_id, limit])?;
            let mut history = Vec::new();
            while let Some(row) = rows.next()? {
                history.push(PracticeHistoryEntry {
                    session: row_to_session(row)?,
                    video_title: row.get("video_title")?,
                    video_category: row.get("video_category")?,
                });
            }
            Ok(history)
        })
        .await
    }
}
