use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    time::{Duration, Interval, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{pose::DetectedPose, utils::logging::debug_mode};

use super::controller::PracticeController;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

pub const DEFAULT_HEARTBEAT_EVERY: u64 = 30;

/// Fastest replay rate accepted; above this pacing is meaningless.
pub const MAX_FPS: f64 = 1000.0;

/// One line of a recorded pose feed.
///
/// `playing` mirrors the video player; frames recorded while the video was
/// paused are replayed but never scored.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedFrame {
    #[serde(default = "default_playing")]
    pub playing: bool,
    #[serde(flatten)]
    pub pose: DetectedPose,
}

fn default_playing() -> bool {
    true
}

#[derive(Debug, Clone, Copy)]
pub struct FeedOptions {
    /// Replay rate. Zero replays as fast as the input arrives.
    pub fps: f64,
    pub heartbeat_every: u64,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            fps: 30.0,
            heartbeat_every: DEFAULT_HEARTBEAT_EVERY,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedStats {
    pub frames_read: u64,
    pub frames_scored: u64,
    pub frames_paused: u64,
    pub malformed_lines: u64,
    pub coaching_requests: u64,
    pub cancelled: bool,
}

/// Frame period for `fps`, `None` when unpaced (zero).
pub fn frame_period(fps: f64) -> Result<Option<Duration>> {
    if fps == 0.0 {
        return Ok(None);
    }
    if !fps.is_finite() || fps < 0.0 || fps > MAX_FPS {
        bail!("fps must be 0 (unpaced) or between 0 and {MAX_FPS}, got {fps}");
    }
    let period = Duration::try_from_secs_f64(1.0 / fps)
        .map_err(|err| anyhow!("fps {fps} gives an unusable frame period: {err}"))?;
    if period.is_zero() {
        bail!("fps {fps} is too high to pace");
    }
    Ok(Some(period))
}

fn pacing(fps: f64) -> Result<Option<Interval>> {
    let Some(period) = frame_period(fps)? else {
        return Ok(None);
    };
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Ok(Some(ticker))
}

fn parse_frame(line: &str) -> Result<Option<FeedFrame>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let frame = serde_json::from_str(trimmed).context("invalid pose frame")?;
    Ok(Some(frame))
}

/// Replay a JSON Lines pose feed into the controller until the input ends or
/// `cancel_token` fires.
pub async fn run_pose_feed<R>(
    reader: R,
    controller: &PracticeController,
    options: FeedOptions,
    cancel_token: CancellationToken,
) -> Result<FeedStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut ticker = pacing(options.fps)?;
    let mut lines = reader.lines();
    let heartbeat_every = if debug_mode() {
        1
    } else {
        options.heartbeat_every.max(1)
    };

    let mut stats = FeedStats::default();
    let mut line_number: u64 = 0;

    loop {
        if let Some(ticker) = ticker.as_mut() {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = cancel_token.cancelled() => {
                    stats.cancelled = true;
                    break;
                }
            }
        }

        let next = tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                stats.cancelled = true;
                break;
            }
            next = lines.next_line() => next.context("failed to read pose feed")?,
        };
        let Some(line) = next else {
            break;
        };
        line_number += 1;

        let frame = match parse_frame(&line) {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(err) => {
                stats.malformed_lines += 1;
                log_warn!("skipping pose feed line {line_number}: {err:#}");
                continue;
            }
        };
        stats.frames_read += 1;

        match controller.on_pose_observed(&frame.pose, frame.playing) {
            Some(outcome) => {
                stats.frames_scored += 1;
                if outcome.coaching.is_some() {
                    stats.coaching_requests += 1;
                }
                if stats.frames_scored % heartbeat_every == 0 {
                    log_info!(
                        "heartbeat: frame {} score {} ({} visible joints)",
                        stats.frames_scored,
                        outcome.current_score,
                        outcome.frame.visible_count
                    );
                }
            }
            None => {
                stats.frames_paused += 1;
                log_debug!("frame {line_number} not scored");
            }
        }
    }

    log_info!(
        "pose feed ended: {} frames read, {} scored, {} skipped",
        stats.frames_read,
        stats.frames_scored,
        stats.malformed_lines
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coaching::RuleCoach;
    use crate::db::{Database, VideoFilter};
    use crate::scoring::ScoringConfig;
    use std::sync::Arc;

    const FULL_POSE: &str = r#"{"keypoints":[{"name":"nose","x":0.5,"y":0.1,"score":0.9},{"name":"left_eye","x":0.4,"y":0.1,"score":0.9}]}"#;

    async fn controller() -> PracticeController {
        let db = Database::in_memory().unwrap();
        db.seed_sample_videos().await.unwrap();
        let video = db.list_videos(&VideoFilter::default()).await.unwrap()[0].clone();
        let config = ScoringConfig {
            expected_keypoints: 2,
            coaching_probability: 0.0,
            ..ScoringConfig::default()
        };
        let controller =
            PracticeController::new(config, Arc::new(db), Arc::new(RuleCoach::new()));
        controller
            .start_session("dancer", video.id, &video.title)
            .await
            .unwrap();
        controller
    }

    fn unpaced() -> FeedOptions {
        FeedOptions {
            fps: 0.0,
            heartbeat_every: 1,
        }
    }

    #[test]
    fn test_parse_frame_defaults_to_playing() {
        let frame = parse_frame(FULL_POSE).unwrap().unwrap();
        assert!(frame.playing);
        assert_eq!(frame.pose.len(), 2);

        let paused = parse_frame(r#"{"playing":false,"keypoints":[]}"#)
            .unwrap()
            .unwrap();
        assert!(!paused.playing);
        assert!(paused.pose.is_empty());

        assert!(parse_frame("   ").unwrap().is_none());
        assert!(parse_frame("{not json").is_err());
    }

    #[tokio::test]
    async fn test_feed_scores_and_skips_bad_lines() {
        let controller = controller().await;
        let input = format!(
            "{FULL_POSE}\nnot json\n\n{{\"playing\":false,\"keypoints\":[]}}\n{FULL_POSE}\n"
        );

        let stats = run_pose_feed(
            input.as_bytes(),
            &controller,
            unpaced(),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(stats.frames_read, 3);
        assert_eq!(stats.frames_scored, 2);
        assert_eq!(stats.frames_paused, 1);
        assert_eq!(stats.malformed_lines, 1);
        assert!(!stats.cancelled);
        // 0 -> 10 -> 19 under exponential smoothing
        assert_eq!(controller.snapshot().current_score, 19);
    }

    #[test]
    fn test_frame_period_bounds() {
        assert_eq!(frame_period(0.0).unwrap(), None);
        assert_eq!(
            frame_period(50.0).unwrap(),
            Some(Duration::from_millis(20))
        );
        assert_eq!(frame_period(MAX_FPS).unwrap(), Some(Duration::from_millis(1)));

        assert!(frame_period(1e-300).is_err());
        assert!(frame_period(1e10).is_err());
        assert!(frame_period(-5.0).is_err());
        assert!(frame_period(f64::NAN).is_err());
        assert!(frame_period(f64::INFINITY).is_err());
    }

    #[tokio::test]
    async fn test_extreme_fps_is_an_error() {
        let controller = controller().await;
        for fps in [1e-300, 1e10] {
            let options = FeedOptions {
                fps,
                heartbeat_every: 1,
            };
            let result = run_pose_feed(
                FULL_POSE.as_bytes(),
                &controller,
                options,
                CancellationToken::new(),
            )
            .await;
            assert!(result.is_err(), "fps {fps} should be rejected");
        }
        assert_eq!(controller.snapshot().frames_observed, 0);
    }

    #[tokio::test]
    async fn test_cancelled_feed_stops_early() {
        let controller = controller().await;
        let token = CancellationToken::new();
        token.cancel();

        let stats = run_pose_feed(FULL_POSE.as_bytes(), &controller, unpaced(), token)
            .await
            .unwrap();
        assert!(stats.cancelled);
        assert_eq!(stats.frames_read, 0);
    }

    #[tokio::test]
    async fn test_paced_feed_replays_every_frame() {
        let controller = controller().await;
        let input = format!("{FULL_POSE}\n{FULL_POSE}\n{FULL_POSE}\n");
        let options = FeedOptions {
            fps: 500.0,
            heartbeat_every: 2,
        };

        let stats = run_pose_feed(
            input.as_bytes(),
            &controller,
            options,
            CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(stats.frames_scored, 3);
    }
}
