pub mod cli;
pub mod coaching;
pub mod db;
pub mod library;
pub mod pose;
pub mod practice;
mod profile_commands;
pub mod scoring;
pub mod settings;
mod settings_commands;
mod utils;

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use log::{info, warn};
use serde::Serialize;

use cli::{Cli, Command, VideosCommand};
use db::Database;
use settings::SettingsStore;

pub struct AppState {
    pub(crate) db: Database,
    pub(crate) settings: SettingsStore,
    pub(crate) user_id: String,
}

/// Close out sessions a crashed or killed run left `Active`.
async fn recover_incomplete_sessions(db: &Database) -> Result<usize> {
    let sessions = db.get_incomplete_sessions().await?;
    let now = Utc::now();
    for session in &sessions {
        warn!(
            "Recovered incomplete session {}; marking as Interrupted",
            session.id
        );
        db.mark_session_interrupted(&session.id, now).await?;
    }
    Ok(sessions.len())
}

async fn open_state(data_dir: &Path, user_id: String) -> Result<AppState> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

    let db = Database::new(data_dir.join("dance-coach.sqlite3"))?;
    recover_incomplete_sessions(&db).await?;

    let seeded = db.seed_sample_videos().await?;
    if seeded > 0 {
        info!("Seeded library with {seeded} sample videos");
    }

    let settings = SettingsStore::new(data_dir.join("settings.json"))?;

    Ok(AppState {
        db,
        settings,
        user_id,
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn dispatch(state: &AppState, command: Command) -> Result<()> {
    match command {
        Command::Practice(args) => print_json(&practice::commands::practice(state, args).await?),
        Command::Videos(args) => match args.command {
            Some(VideosCommand::Add(video)) => {
                print_json(&library::commands::add_video(state, video).await?)
            }
            None => print_json(&library::commands::list_videos(state, args.filter).await?),
        },
        Command::History { limit } => {
            print_json(&practice::commands::practice_history(state, limit).await?)
        }
        Command::Stats => print_json(&practice::commands::practice_stats(state).await?),
        Command::Favorite { video_id } => {
            print_json(&library::commands::toggle_favorite(state, video_id).await?)
        }
        Command::Favorites => print_json(&library::commands::list_favorites(state).await?),
        Command::Coach(args) => {
            print_json(&practice::commands::request_coaching(state, args).await?)
        }
        Command::Settings(command) => {
            print_json(&settings_commands::handle_settings(state, command)?)
        }
        Command::Profile(command) => {
            print_json(&profile_commands::handle_profile(state, command).await?)
        }
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    utils::logging::init_logging(cli.verbose || utils::logging::debug_mode());

    info!("dance-coach starting up...");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(async move {
        let state = open_state(&cli.data_dir, cli.user).await?;
        dispatch(&state, cli.command).await
    })
}

#[cfg(test)]
pub(crate) async fn test_state() -> AppState {
    let db = Database::in_memory().unwrap();
    db.seed_sample_videos().await.unwrap();
    let settings_path = std::env::temp_dir()
        .join(format!("dance-coach-{}", uuid::Uuid::new_v4()))
        .join("settings.json");

    AppState {
        db,
        settings: SettingsStore::new(settings_path).unwrap(),
        user_id: "dancer".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recovery_interrupts_open_sessions() {
        let state = test_state().await;
        let video_id = state.db.list_videos(&Default::default()).await.unwrap()[0].id;
        let open = state
            .db
            .start_practice_session("dancer", video_id)
            .await
            .unwrap();

        assert_eq!(recover_incomplete_sessions(&state.db).await.unwrap(), 1);
        let stored = state.db.get_practice_session(&open.id).await.unwrap().unwrap();
        assert_eq!(stored.status, db::PracticeStatus::Interrupted);
        assert_eq!(recover_incomplete_sessions(&state.db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_open_state_seeds_once() {
        let dir = std::env::temp_dir().join(format!("dance-coach-{}", uuid::Uuid::new_v4()));
        let state = open_state(&dir, "dancer".into()).await.unwrap();
        assert_eq!(state.db.count_videos().await.unwrap(), 4);
        drop(state);

        let reopened = open_state(&dir, "dancer".into()).await.unwrap();
        assert_eq!(reopened.db.count_videos().await.unwrap(), 4);
    }
}
