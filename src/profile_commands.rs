//! Handlers for `dance-coach profile`.

use anyhow::{Context, Result};

use crate::{
    cli::ProfileCommand,
    db::{AvatarConfig, ProfileUpdate, UserProfile, DEFAULT_DISPLAY_NAME},
    AppState,
};

pub async fn handle_profile(state: &AppState, command: ProfileCommand) -> Result<UserProfile> {
    match command {
        ProfileCommand::Show => {
            state
                .db
                .get_or_create_profile(&state.user_id, DEFAULT_DISPLAY_NAME)
                .await
        }
        ProfileCommand::Set {
            display_name,
            bio,
            clear_bio,
            level,
            xp,
            avatar,
        } => {
            let avatar_config = avatar
                .map(|json| {
                    serde_json::from_str::<AvatarConfig>(&json)
                        .context("--avatar must be a JSON object of avatar parts")
                })
                .transpose()?;
            let bio = if clear_bio { Some(None) } else { bio.map(Some) };
            let update = ProfileUpdate {
                display_name,
                bio,
                level,
                xp,
                avatar_config,
            };
            state
                .db
                .update_profile(&state.user_id, DEFAULT_DISPLAY_NAME, &update)
                .await
        }
    }
}
