use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{
    db::DIFFICULTIES,
    practice::feed::frame_period,
    scoring::{ScoringConfig, SmoothingPolicy},
};

#[derive(Parser, Debug)]
#[command(name = "dance-coach")]
#[command(about = "Score dance practice from pose data, with coaching feedback")]
#[command(version)]
pub struct Cli {
    /// Directory holding the database and settings.json
    #[arg(long, env = "DANCE_COACH_DATA_DIR", default_value = ".dance-coach")]
    pub data_dir: PathBuf,

    /// Dancer the sessions and favorites belong to
    #[arg(short, long, default_value = "local")]
    pub user: String,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Score a recorded pose feed against a video and save the session
    Practice(PracticeArgs),

    /// List videos in the library, or add one
    Videos(VideosArgs),

    /// Show past practice sessions, newest first
    History {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Totals over completed sessions: count, minutes practiced, average accuracy
    Stats,

    /// Add a video to favorites, or remove it if already there
    Favorite { video_id: i64 },

    /// List favorite videos
    Favorites,

    /// Ask the coach for feedback once
    Coach(CoachArgs),

    /// Show or change persisted settings
    #[command(subcommand)]
    Settings(SettingsCommand),

    /// Show or edit the dancer's profile
    #[command(subcommand)]
    Profile(ProfileCommand),
}

#[derive(Args, Debug, Default)]
pub struct ScoringOverrides {
    /// Smoothing policy: exponential or running-max
    #[arg(long)]
    pub policy: Option<SmoothingPolicy>,

    /// Keypoint confidence a joint must exceed to count as visible
    #[arg(long)]
    pub threshold: Option<f32>,

    /// Keypoints expected for a fully visible body
    #[arg(long)]
    pub keypoints: Option<usize>,

    /// Per-frame probability of requesting coaching
    #[arg(long)]
    pub coach_probability: Option<f64>,
}

impl ScoringOverrides {
    /// Layer the flags that were given over `base`.
    pub fn apply(&self, base: ScoringConfig) -> ScoringConfig {
        ScoringConfig {
            confidence_threshold: self.threshold.unwrap_or(base.confidence_threshold),
            expected_keypoints: self.keypoints.unwrap_or(base.expected_keypoints),
            coaching_probability: self.coach_probability.unwrap_or(base.coaching_probability),
            policy: self.policy.unwrap_or(base.policy),
        }
        .sanitized()
    }
}

fn parse_fps(value: &str) -> Result<f64, String> {
    let fps: f64 = value
        .parse()
        .map_err(|err| format!("invalid fps '{value}': {err}"))?;
    frame_period(fps).map_err(|err| err.to_string())?;
    Ok(fps)
}

#[derive(Args, Debug)]
pub struct PracticeArgs {
    #[arg(long)]
    pub video_id: i64,

    /// JSON Lines pose feed; `-` reads stdin
    #[arg(long, default_value = "-")]
    pub poses: String,

    /// Replay rate in frames per second; 0 replays unpaced
    #[arg(long, default_value = "30", value_parser = parse_fps)]
    pub fps: f64,

    /// Log the running score every N frames
    #[arg(long, default_value = "30")]
    pub heartbeat: u64,

    /// Analyzer command overriding the saved one
    #[arg(long)]
    pub analyzer: Option<String>,

    #[command(flatten)]
    pub scoring: ScoringOverrides,
}

#[derive(Args, Debug, Default)]
#[command(args_conflicts_with_subcommands = true)]
pub struct VideosArgs {
    #[command(subcommand)]
    pub command: Option<VideosCommand>,

    #[command(flatten)]
    pub filter: VideoArgs,
}

#[derive(Subcommand, Debug)]
pub enum VideosCommand {
    /// Add a video to the library
    Add(AddVideoArgs),
}

#[derive(Args, Debug, Clone)]
pub struct AddVideoArgs {
    #[arg(long)]
    pub title: String,

    /// Embed or file URL of the routine
    #[arg(long)]
    pub url: String,

    #[arg(long, value_parser = DIFFICULTIES)]
    pub difficulty: String,

    #[arg(long)]
    pub duration_secs: u32,

    /// e.g. hip-hop, latin, contemporary, k-pop
    #[arg(long)]
    pub category: String,

    #[arg(long)]
    pub artist: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long)]
    pub thumbnail_url: Option<String>,

    #[arg(long)]
    pub bpm: Option<u32>,

    /// One step of the routine; repeat in order
    #[arg(long = "step")]
    pub steps: Vec<String>,
}

#[derive(Args, Debug, Default)]
pub struct VideoArgs {
    #[arg(long)]
    pub category: Option<String>,

    #[arg(long)]
    pub difficulty: Option<String>,

    /// Case-insensitive match on title, artist and description
    #[arg(long)]
    pub search: Option<String>,
}

#[derive(Args, Debug)]
pub struct CoachArgs {
    /// What should be happening, e.g. "User practicing Salsa 101"
    #[arg(long)]
    pub context: String,

    /// What the dancer is doing, e.g. "Accuracy score 72% with 12 visible joints"
    #[arg(long)]
    pub performance: String,

    #[arg(long)]
    pub analyzer: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum SettingsCommand {
    /// Print the current settings
    Show,

    /// Change one or more settings
    Set {
        #[command(flatten)]
        scoring: ScoringOverrides,

        #[arg(long, conflicts_with = "clear_analyzer")]
        analyzer: Option<String>,

        /// Forget the saved analyzer and use rule-based coaching
        #[arg(long)]
        clear_analyzer: bool,

        #[arg(long)]
        coach_timeout_secs: Option<u64>,
    },

    /// Restore defaults
    Reset,
}

#[derive(Subcommand, Debug)]
pub enum ProfileCommand {
    /// Print the profile, creating it on first use
    Show,

    /// Change one or more profile fields
    Set {
        #[arg(long)]
        display_name: Option<String>,

        #[arg(long, conflicts_with = "clear_bio")]
        bio: Option<String>,

        #[arg(long)]
        clear_bio: bool,

        #[arg(long)]
        level: Option<u32>,

        #[arg(long)]
        xp: Option<u32>,

        /// Avatar parts as JSON, e.g. '{"hairStyle":"bun"}'; merged into the saved avatar
        #[arg(long)]
        avatar: Option<String>,
    },
}
