use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::io::{AsyncBufRead, BufReader};
use tokio_util::sync::CancellationToken;

use crate::{
    cli::{CoachArgs, PracticeArgs},
    coaching::{CoachingRequest, CoachingRequester, CoachingResponse, CommandCoach, RuleCoach},
    db::{PracticeHistoryEntry, PracticeSessionRecord, PracticeStats},
    library::commands::get_video,
    AppState,
};

use super::{
    controller::{PracticeController, PracticeSnapshot},
    feed::{frame_period, run_pose_feed, FeedOptions, FeedStats},
};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticeReport {
    pub session: Option<PracticeSessionRecord>,
    pub last_snapshot: PracticeSnapshot,
    pub feed: FeedStats,
}

/// Rule-based coaching, or the analyzer command with rule-based fallback.
pub fn build_coach(analyzer: Option<&str>) -> Result<Arc<dyn CoachingRequester>> {
    match analyzer.map(str::trim).filter(|command| !command.is_empty()) {
        Some(command) => Ok(Arc::new(CommandCoach::from_command_line(command)?)),
        None => Ok(Arc::new(RuleCoach::new())),
    }
}

async fn open_feed(source: &str) -> Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    if source == "-" {
        return Ok(Box::new(BufReader::new(tokio::io::stdin())));
    }
    let file = tokio::fs::File::open(source)
        .await
        .with_context(|| format!("failed to open pose feed {source}"))?;
    Ok(Box::new(BufReader::new(file)))
}

pub async fn practice(state: &AppState, args: PracticeArgs) -> Result<PracticeReport> {
    frame_period(args.fps)?;
    let video = get_video(state, args.video_id).await?;
    let config = args.scoring.apply(state.settings.scoring());
    let coaching = state.settings.coaching();
    let analyzer = args.analyzer.or(coaching.analyzer_command);
    let coach = build_coach(analyzer.as_deref())?;

    let controller = PracticeController::new(config, Arc::new(state.db.clone()), coach)
        .with_coaching_timeout(Duration::from_secs(coaching.timeout_secs.max(1)));

    let reader = open_feed(&args.poses).await?;
    controller
        .start_session(&state.user_id, video.id, &video.title)
        .await?;

    let cancel_token = CancellationToken::new();
    let interrupt = cancel_token.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log_info!("interrupt received; stopping practice");
            interrupt.cancel();
        }
    });

    let options = FeedOptions {
        fps: args.fps,
        heartbeat_every: args.heartbeat,
    };
    let fed = run_pose_feed(reader, &controller, options, cancel_token).await;
    ctrl_c.abort();

    let feed = match fed {
        Ok(stats) => stats,
        Err(err) => {
            if let Err(abandon_err) = controller.abandon_session().await {
                log_warn!("failed to abandon session after feed error: {abandon_err:#}");
            }
            return Err(err);
        }
    };

    let session = if feed.cancelled {
        let session_id = controller.snapshot().session_id;
        controller.abandon_session().await?;
        match session_id {
            Some(id) => state.db.get_practice_session(&id).await?,
            None => None,
        }
    } else {
        // Let pending feedback land so it is saved with the session.
        controller.drain_coaching().await;
        Some(controller.finish_session().await?)
    };

    Ok(PracticeReport {
        session,
        last_snapshot: controller.snapshot(),
        feed,
    })
}

pub async fn practice_history(state: &AppState, limit: usize) -> Result<Vec<PracticeHistoryEntry>> {
    state.db.practice_history(&state.user_id, limit).await
}

pub async fn practice_stats(state: &AppState) -> Result<PracticeStats> {
    state.db.practice_stats(&state.user_id).await
}

pub async fn request_coaching(state: &AppState, args: CoachArgs) -> Result<CoachingResponse> {
    let coaching = state.settings.coaching();
    let analyzer = args.analyzer.or(coaching.analyzer_command);
    let coach = build_coach(analyzer.as_deref())?;
    let timeout = Duration::from_secs(coaching.timeout_secs.max(1));

    tokio::time::timeout(
        timeout,
        coach.analyze(CoachingRequest::new(args.context, args.performance)),
    )
    .await
    .with_context(|| format!("{} coach did not answer within {}s", coach.name(), timeout.as_secs()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::ScoringOverrides;
    use crate::db::PracticeStatus;
    use crate::test_state;

    fn pose_line(score: f32) -> String {
        let keypoints: Vec<String> = crate::pose::COCO_KEYPOINTS
            .iter()
            .map(|name| format!(r#"{{"name":"{name}","x":0.5,"y":0.5,"score":{score}}}"#))
            .collect();
        format!(r#"{{"keypoints":[{}]}}"#, keypoints.join(","))
    }

    #[test]
    fn test_build_coach_picks_requester() {
        assert_eq!(build_coach(None).unwrap().name(), "rules");
        assert_eq!(build_coach(Some("   ")).unwrap().name(), "rules");
        assert_eq!(build_coach(Some("python3 analyze.py")).unwrap().name(), "command");
    }

    #[tokio::test]
    async fn test_practice_from_file_records_session() {
        let state = test_state().await;
        let video = state.db.list_videos(&Default::default()).await.unwrap()[0].clone();

        let path = std::env::temp_dir().join(format!("poses-{}.jsonl", uuid::Uuid::new_v4()));
        let feed = format!("{}\n{}\n", pose_line(0.9), pose_line(0.9));
        std::fs::write(&path, feed).unwrap();

        let args = PracticeArgs {
            video_id: video.id,
            poses: path.display().to_string(),
            fps: 0.0,
            heartbeat: 1,
            analyzer: None,
            scoring: ScoringOverrides {
                coach_probability: Some(0.0),
                ..ScoringOverrides::default()
            },
        };

        let report = practice(&state, args).await.unwrap();
        let session = report.session.unwrap();
        assert_eq!(session.status, PracticeStatus::Completed);
        assert_eq!(session.accuracy, 19);
        assert_eq!(session.score, 1_900);
        assert_eq!(report.feed.frames_scored, 2);

        let history = practice_history(&state, 5).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].video_title, video.title);

        let stats = practice_stats(&state).await.unwrap();
        assert_eq!(stats.total_sessions, 1);
        assert_eq!(stats.average_accuracy, 19);
    }

    #[tokio::test]
    async fn test_practice_unknown_video() {
        let state = test_state().await;
        let args = PracticeArgs {
            video_id: 404,
            poses: "-".into(),
            fps: 0.0,
            heartbeat: 30,
            analyzer: None,
            scoring: ScoringOverrides::default(),
        };
        assert!(practice(&state, args).await.is_err());
        assert!(practice_history(&state, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_practice_rejects_bad_fps_before_opening_session() {
        let state = test_state().await;
        let video = state.db.list_videos(&Default::default()).await.unwrap()[0].clone();
        let args = PracticeArgs {
            video_id: video.id,
            poses: "-".into(),
            fps: 1e10,
            heartbeat: 30,
            analyzer: None,
            scoring: ScoringOverrides::default(),
        };
        assert!(practice(&state, args).await.is_err());
        assert!(practice_history(&state, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_request_coaching_uses_rules() {
        let state = test_state().await;
        let response = request_coaching(
            &state,
            CoachArgs {
                context: "User practicing Salsa".into(),
                performance: "Accuracy score 90% with 16 visible joints".into(),
                analyzer: None,
            },
        )
        .await
        .unwrap();
        assert!(response.feedback.starts_with("Excellent"));
    }
}
