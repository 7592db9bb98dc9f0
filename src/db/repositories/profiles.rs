use anyhow::{bail, Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, to_u32},
    models::{AvatarConfig, ProfileUpdate, UserProfile},
};

const PROFILE_COLUMNS: &str =
    "id, user_id, display_name, bio, level, xp, avatar_config, created_at, updated_at";

fn row_to_profile(row: &Row) -> Result<UserProfile> {
    let level: i64 = row.get("level")?;
    let xp: i64 = row.get("xp")?;
    let avatar_config: String = row.get("avatar_config")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(UserProfile {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        display_name: row.get("display_name")?,
        bio: row.get("bio")?,
        level: to_u32(level, "level")?,
        xp: to_u32(xp, "xp")?,
        avatar_config: serde_json::from_str(&avatar_config)
            .context("failed to parse avatar_config")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

fn load_profile(conn: &Connection, user_id: &str) -> Result<Option<UserProfile>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PROFILE_COLUMNS} FROM user_profiles WHERE user_id = ?1"
    ))?;
    let profile = stmt
        .query_row(params![user_id], |row| Ok(row_to_profile(row)))
        .optional()?
        .transpose()?;
    Ok(profile)
}

fn insert_default(conn: &Connection, user_id: &str, display_name: &str) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO user_profiles (user_id, display_name, level, xp, avatar_config, created_at, updated_at)
         VALUES (?1, ?2, 1, 0, '{}', ?3, ?3)
         ON CONFLICT(user_id) DO NOTHING",
        params![user_id, display_name, now],
    )?;
    Ok(())
}

fn load_existing(conn: &Connection, user_id: &str) -> Result<UserProfile> {
    match load_profile(conn, user_id)? {
        Some(profile) => Ok(profile),
        None => bail!("profile for {user_id} vanished after insert"),
    }
}

impl Database {
    pub async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let user_id = user_id.to_string();
        self.execute(move |conn| load_profile(conn, &user_id)).await
    }

    /// Load the user's profile, creating it with `display_name` on first use.
    pub async fn get_or_create_profile(
        &self,
        user_id: &str,
        display_name: &str,
    ) -> Result<UserProfile> {
        let user_id = user_id.to_string();
        let display_name = display_name.trim().to_string();
        if display_name.is_empty() {
            bail!("display name cannot be empty");
        }
        self.execute(move |conn| {
            insert_default(conn, &user_id, &display_name)?;
            load_existing(conn, &user_id)
        })
        .await
    }

    /// Apply `update` to the user's profile, creating it first if needed.
    /// Avatar parts are merged; other fields are replaced when given.
    pub async fn update_profile(
        &self,
        user_id: &str,
        default_display_name: &str,
        update: &ProfileUpdate,
    ) -> Result<UserProfile> {
        if let Some(name) = &update.display_name {
            if name.trim().is_empty() {
                bail!("display name cannot be empty");
            }
        }
        if update.level == Some(0) {
            bail!("level starts at 1");
        }

        let user_id = user_id.to_string();
        let default_display_name = default_display_name.to_string();
        let update = update.clone();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            insert_default(&tx, &user_id, &default_display_name)?;
            let mut profile = load_existing(&tx, &user_id)?;

            if let Some(name) = update.display_name {
                profile.display_name = name.trim().to_string();
            }
            if let Some(bio) = update.bio {
                profile.bio = bio.map(|text| text.trim().to_string()).filter(|text| !text.is_empty());
            }
            if let Some(level) = update.level {
                profile.level = level;
            }
            if let Some(xp) = update.xp {
                profile.xp = xp;
            }
            if let Some(avatar) = update.avatar_config {
                profile.avatar_config.merge(avatar);
            }
            profile.updated_at = Utc::now();

            let avatar_json = serde_json::to_string(&profile.avatar_config)?;
            tx.execute(
                "UPDATE user_profiles
                 SET display_name = ?1, bio = ?2, level = ?3, xp = ?4, avatar_config = ?5, updated_at = ?6
                 WHERE user_id = ?7",
                params![
                    profile.display_name,
                    profile.bio,
                    profile.level,
                    profile.xp,
                    avatar_json,
                    profile.updated_at.to_rfc3339(),
                    user_id
                ],
            )?;
            tx.commit()?;
            Ok(profile)
        })
        .await
    }
}
