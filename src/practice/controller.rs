use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::{Duration, Instant},
};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde::Serialize;
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    coaching::{CoachingRequest, CoachingRequester},
    db::{FinishedSession, PracticeSessionRecord},
    pose::DetectedPose,
    scoring::{PoseOutcome, ScorerStatus, ScoringConfig, SessionScorer},
};

use super::ledger::SessionLedger;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Shown in the coaching panel until the first response arrives.
pub const DEFAULT_FEEDBACK: &str = "Get ready to move!";

pub const DEFAULT_COACHING_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticeSnapshot {
    pub status: ScorerStatus,
    pub session_id: Option<String>,
    pub video_id: Option<i64>,
    pub current_score: u8,
    pub feedback: String,
    pub elapsed_ms: u64,
    pub frames_observed: u64,
}

impl PracticeSnapshot {
    fn of(scorer: &SessionScorer) -> Self {
        Self {
            status: scorer.status(),
            session_id: scorer.session_id().map(str::to_string),
            video_id: scorer.video_id(),
            current_score: scorer.current_score(),
            feedback: scorer
                .last_feedback()
                .unwrap_or(DEFAULT_FEEDBACK)
                .to_string(),
            elapsed_ms: scorer.elapsed_ms_at(Instant::now()),
            frames_observed: scorer.frames_observed(),
        }
    }
}

fn lock(scorer: &Mutex<SessionScorer>) -> MutexGuard<'_, SessionScorer> {
    match scorer.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn publish(scorer: &Mutex<SessionScorer>, tx: &watch::Sender<PracticeSnapshot>) {
    let snapshot = PracticeSnapshot::of(&lock(scorer));
    tx.send_replace(snapshot);
}

/// Drives one practice session at a time: feeds poses to the scorer,
/// dispatches coaching in the background and records results in the ledger.
///
/// Cloning shares the same session.
#[derive(Clone)]
pub struct PracticeController {
    scorer: Arc<Mutex<SessionScorer>>,
    ledger: Arc<dyn SessionLedger>,
    coach: Arc<dyn CoachingRequester>,
    coaching_timeout: Duration,
    epoch: Arc<AtomicU64>,
    session_token: Arc<Mutex<CancellationToken>>,
    coaching_tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
    snapshot_tx: Arc<watch::Sender<PracticeSnapshot>>,
}

impl PracticeController {
    pub fn new(
        config: ScoringConfig,
        ledger: Arc<dyn SessionLedger>,
        coach: Arc<dyn CoachingRequester>,
    ) -> Self {
        let scorer = SessionScorer::new(config);
        let (snapshot_tx, _) = watch::channel(PracticeSnapshot::of(&scorer));

        Self {
            scorer: Arc::new(Mutex::new(scorer)),
            ledger,
            coach,
            coaching_timeout: DEFAULT_COACHING_TIMEOUT,
            epoch: Arc::new(AtomicU64::new(0)),
            session_token: Arc::new(Mutex::new(CancellationToken::new())),
            coaching_tasks: Arc::new(Mutex::new(Vec::new())),
            snapshot_tx: Arc::new(snapshot_tx),
        }
    }

    pub fn with_coaching_timeout(mut self, timeout: Duration) -> Self {
        self.coaching_timeout = timeout;
        self
    }

    pub fn snapshot(&self) -> PracticeSnapshot {
        PracticeSnapshot::of(&lock(&self.scorer))
    }

    /// Receives a snapshot after every scored frame and applied feedback.
    pub fn subscribe(&self) -> watch::Receiver<PracticeSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn config(&self) -> ScoringConfig {
        *lock(&self.scorer).config()
    }

    pub async fn start_session(
        &self,
        user_id: &str,
        video_id: i64,
        video_title: &str,
    ) -> Result<PracticeSnapshot> {
        if lock(&self.scorer).status() == ScorerStatus::Active {
            bail!("practice session already active");
        }

        let session_id = self
            .ledger
            .start(user_id, video_id)
            .await
            .context("failed to open practice session")?;

        let epoch = self.next_epoch();
        let began = lock(&self.scorer).begin(
            session_id.clone(),
            video_id,
            video_title.to_string(),
            epoch,
            Utc::now(),
            Instant::now(),
        );

        if let Err(err) = began {
            // Lost a race with another start; close the row we just opened.
            if let Err(abandon_err) = self.ledger.abandon(&session_id).await {
                log_warn!("failed to abandon orphaned session {session_id}: {abandon_err:#}");
            }
            return Err(err);
        }

        self.reset_coaching_token();
        publish(&self.scorer, &self.snapshot_tx);

        log_info!(
            "Practice session {} started for video {} (epoch {}, policy {})",
            session_id,
            video_id,
            epoch,
            self.config().policy
        );
        Ok(self.snapshot())
    }

    /// Score one frame. Never blocks on I/O: a coaching request drawn by this
    /// frame is spawned onto the current runtime and its answer lands later.
    pub fn on_pose_observed(
        &self,
        pose: &DetectedPose,
        is_session_active: bool,
    ) -> Option<PoseOutcome> {
        let (outcome, epoch) = {
            let mut scorer = lock(&self.scorer);
            let outcome = scorer.observe(pose, is_session_active, &mut rand::thread_rng())?;
            (outcome, scorer.epoch())
        };

        if let Some(request) = outcome.coaching.clone() {
            self.dispatch_coaching(epoch, request);
        }

        publish(&self.scorer, &self.snapshot_tx);
        Some(outcome)
    }

    /// Start the take over: score and feedback reset, in-flight coaching is
    /// dropped.
    pub fn restart_session(&self) -> Result<PracticeSnapshot> {
        let epoch = self.next_epoch();
        lock(&self.scorer).restart(epoch, Utc::now(), Instant::now())?;
        self.reset_coaching_token();
        publish(&self.scorer, &self.snapshot_tx);
        log_info!("Practice session restarted (epoch {epoch})");
        Ok(self.snapshot())
    }

    /// Close the session and write its results to the ledger. A ledger failure
    /// is returned; the session is finished either way and will not be
    /// reported again.
    pub async fn finish_session(&self) -> Result<PracticeSessionRecord> {
        let summary = lock(&self.scorer).finish(Utc::now(), Instant::now())?;

        self.reset_coaching_token();
        publish(&self.scorer, &self.snapshot_tx);

        let result = FinishedSession {
            score: summary.points,
            accuracy: summary.accuracy,
            duration_played_secs: summary.duration_played_secs,
            feedback: summary.feedback.clone(),
            finished_at: summary.finished_at,
        };

        let record = self
            .ledger
            .finish(&summary.session_id, result)
            .await
            .with_context(|| {
                format!(
                    "practice session {} may not have been saved",
                    summary.session_id
                )
            })?;

        log_info!(
            "Practice session {} finished: accuracy {}%, {} points, {}s",
            record.id,
            record.accuracy,
            record.score,
            record.duration_played_secs
        );
        Ok(record)
    }

    /// Walk away from the session without recording results. Returns false
    /// when there was no active session.
    pub async fn abandon_session(&self) -> Result<bool> {
        let Some(session_id) = lock(&self.scorer).abandon() else {
            return Ok(false);
        };

        self.reset_coaching_token();
        publish(&self.scorer, &self.snapshot_tx);

        self.ledger
            .abandon(&session_id)
            .await
            .with_context(|| format!("failed to mark session {session_id} abandoned"))?;
        log_info!("Practice session {session_id} abandoned");
        Ok(true)
    }

    /// Wait for every coaching request dispatched so far to settle.
    pub async fn drain_coaching(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut tasks = match self.coaching_tasks.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            tasks.drain(..).collect()
        };

        for handle in handles {
            if let Err(err) = handle.await {
                log_warn!("coaching task ended abnormally: {err}");
            }
        }
    }

    fn next_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Cancel whatever coaching is in flight and arm a fresh token for the
    /// next requests.
    fn reset_coaching_token(&self) {
        let mut token = match self.session_token.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        token.cancel();
        *token = CancellationToken::new();
    }

    fn current_token(&self) -> CancellationToken {
        match self.session_token.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn dispatch_coaching(&self, epoch: u64, request: CoachingRequest) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log_warn!("no async runtime available; skipping coaching request");
            return;
        };

        let token = self.current_token();
        let coach = Arc::clone(&self.coach);
        let scorer = Arc::clone(&self.scorer);
        let snapshot_tx = Arc::clone(&self.snapshot_tx);
        let timeout = self.coaching_timeout;

        log_debug!(
            "dispatching coaching request to {} coach (epoch {epoch})",
            coach.name()
        );

        let handle = runtime.spawn(async move {
            let call = tokio::time::timeout(timeout, coach.analyze(request));
            tokio::select! {
                _ = token.cancelled() => {
                    log_debug!("coaching request for epoch {epoch} cancelled");
                }
                result = call => match result {
                    Ok(Ok(response)) => {
                        let applied = lock(&scorer).apply_feedback(epoch, &response);
                        if applied {
                            publish(&scorer, &snapshot_tx);
                        } else {
                            log_debug!("discarding coaching response for stale epoch {epoch}");
                        }
                    }
                    Ok(Err(err)) => log_warn!("coaching request failed: {err:#}"),
                    Err(_) => log_warn!(
                        "coaching request timed out after {}ms",
                        timeout.as_millis()
                    ),
                },
            }
        });

        let mut tasks = match self.coaching_tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coaching::{CoachFuture, CoachingResponse};
    use crate::db::{Database, PracticeStatus, VideoFilter};
    use crate::pose::coco_pose;
    use crate::practice::ledger::LedgerFuture;
    use crate::scoring::SmoothingPolicy;
    use anyhow::anyhow;
    use std::sync::atomic::AtomicUsize;

    struct EchoCoach {
        calls: AtomicUsize,
        delay: Duration,
    }

    impl EchoCoach {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay,
            })
        }
    }

    impl CoachingRequester for EchoCoach {
        fn analyze(&self, request: CoachingRequest) -> CoachFuture {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = self.delay;
            Box::pin(async move {
                tokio::time::sleep(delay).await;
                Ok(CoachingResponse {
                    feedback: format!("Heard: {}", request.user_performance),
                    tips: vec![],
                    encouragement: "Go".into(),
                })
            })
        }

        fn name(&self) -> &'static str {
            "echo"
        }
    }

    struct BrokenCoach;

    impl CoachingRequester for BrokenCoach {
        fn analyze(&self, _request: CoachingRequest) -> CoachFuture {
            Box::pin(async { Err(anyhow!("provider unavailable")) })
        }

        fn name(&self) -> &'static str {
            "broken"
        }
    }

    #[derive(Default)]
    struct FlakyLedger {
        finishes: AtomicUsize,
    }

    impl SessionLedger for FlakyLedger {
        fn start<'a>(&'a self, _user_id: &'a str, _video_id: i64) -> LedgerFuture<'a, String> {
            Box::pin(async { Ok("flaky-session".to_string()) })
        }

        fn finish<'a>(
            &'a self,
            _session_id: &'a str,
            _result: FinishedSession,
        ) -> LedgerFuture<'a, PracticeSessionRecord> {
            self.finishes.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Err(anyhow!("disk full")) })
        }

        fn abandon<'a>(&'a self, _session_id: &'a str) -> LedgerFuture<'a, ()> {
            Box::pin(async { Ok(()) })
        }
    }

    fn config(probability: f64) -> ScoringConfig {
        ScoringConfig {
            confidence_threshold: 0.5,
            expected_keypoints: 17,
            coaching_probability: probability,
            policy: SmoothingPolicy::Exponential,
        }
    }

    fn nine_visible() -> DetectedPose {
        let mut confidences = vec![0.9; 9];
        confidences.extend(vec![0.1; 8]);
        coco_pose(&confidences)
    }

    async fn seeded_db() -> (Arc<Database>, i64) {
        let db = Database::in_memory().unwrap();
        db.seed_sample_videos().await.unwrap();
        let video_id = db.list_videos(&VideoFilter::default()).await.unwrap()[0].id;
        (Arc::new(db), video_id)
    }

    #[tokio::test]
    async fn test_full_session_records_to_ledger() {
        let (db, video_id) = seeded_db().await;
        let coach = EchoCoach::new(Duration::ZERO);
        let controller = PracticeController::new(config(1.0), db.clone(), coach.clone());

        controller
            .start_session("dancer", video_id, "Hip Hop Basics")
            .await
            .unwrap();
        let outcome = controller.on_pose_observed(&nine_visible(), true).unwrap();
        assert_eq!(outcome.current_score, 5);
        controller.drain_coaching().await;

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.feedback, "Heard: Accuracy score 53% with 9 visible joints");
        assert_eq!(coach.calls.load(Ordering::SeqCst), 1);

        let record = controller.finish_session().await.unwrap();
        assert_eq!(record.status, PracticeStatus::Completed);
        assert_eq!(record.accuracy, 5);
        assert_eq!(record.score, 500);
        assert_eq!(record.feedback.as_deref(), Some(snapshot.feedback.as_str()));

        let history = db.practice_history("dancer", 10).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_placeholder_feedback_before_any_response() {
        let (db, video_id) = seeded_db().await;
        let controller = PracticeController::new(config(0.0), db, EchoCoach::new(Duration::ZERO));
        controller
            .start_session("dancer", video_id, "Salsa")
            .await
            .unwrap();
        assert_eq!(controller.snapshot().feedback, DEFAULT_FEEDBACK);
    }

    #[tokio::test]
    async fn test_paused_frames_do_not_score() {
        let (db, video_id) = seeded_db().await;
        let controller = PracticeController::new(config(1.0), db, EchoCoach::new(Duration::ZERO));
        controller
            .start_session("dancer", video_id, "Salsa")
            .await
            .unwrap();

        assert!(controller.on_pose_observed(&nine_visible(), false).is_none());
        controller.drain_coaching().await;
        assert_eq!(controller.snapshot().current_score, 0);
        assert_eq!(controller.snapshot().feedback, DEFAULT_FEEDBACK);
    }

    #[tokio::test]
    async fn test_failed_coaching_leaves_score_and_feedback() {
        let (db, video_id) = seeded_db().await;
        let controller = PracticeController::new(config(1.0), db, Arc::new(BrokenCoach));
        controller
            .start_session("dancer", video_id, "Salsa")
            .await
            .unwrap();

        for _ in 0..5 {
            assert!(controller.on_pose_observed(&nine_visible(), true).is_some());
        }
        let score = controller.snapshot().current_score;
        controller.drain_coaching().await;

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.current_score, score);
        assert_eq!(snapshot.feedback, DEFAULT_FEEDBACK);
    }

    #[tokio::test]
    async fn test_slow_coach_times_out() {
        let (db, video_id) = seeded_db().await;
        let controller = PracticeController::new(
            config(1.0),
            db,
            EchoCoach::new(Duration::from_secs(30)),
        )
        .with_coaching_timeout(Duration::from_millis(20));
        controller
            .start_session("dancer", video_id, "Salsa")
            .await
            .unwrap();

        controller.on_pose_observed(&nine_visible(), true);
        controller.drain_coaching().await;
        assert_eq!(controller.snapshot().feedback, DEFAULT_FEEDBACK);
    }

    #[tokio::test]
    async fn test_late_response_does_not_touch_finished_session() {
        let (db, video_id) = seeded_db().await;
        let controller = PracticeController::new(
            config(1.0),
            db.clone(),
            EchoCoach::new(Duration::from_millis(50)),
        );
        controller
            .start_session("dancer", video_id, "Salsa")
            .await
            .unwrap();
        controller.on_pose_observed(&nine_visible(), true);

        let record = controller.finish_session().await.unwrap();
        assert_eq!(record.feedback, None);

        controller.drain_coaching().await;
        assert_eq!(controller.snapshot().feedback, DEFAULT_FEEDBACK);
        assert_eq!(controller.snapshot().status, ScorerStatus::Finished);
    }

    #[tokio::test]
    async fn test_restart_discards_in_flight_feedback() {
        let (db, video_id) = seeded_db().await;
        let controller = PracticeController::new(
            config(1.0),
            db,
            EchoCoach::new(Duration::from_millis(50)),
        );
        controller
            .start_session("dancer", video_id, "Salsa")
            .await
            .unwrap();
        controller.on_pose_observed(&nine_visible(), true);

        let snapshot = controller.restart_session().unwrap();
        assert_eq!(snapshot.current_score, 0);

        controller.drain_coaching().await;
        assert_eq!(controller.snapshot().feedback, DEFAULT_FEEDBACK);
    }

    #[tokio::test]
    async fn test_finish_twice_reports_once() {
        let (db, video_id) = seeded_db().await;
        let controller = PracticeController::new(config(0.0), db, EchoCoach::new(Duration::ZERO));
        controller
            .start_session("dancer", video_id, "Salsa")
            .await
            .unwrap();

        controller.finish_session().await.unwrap();
        assert!(controller.finish_session().await.is_err());
        assert!(controller.on_pose_observed(&nine_visible(), true).is_none());
    }

    #[tokio::test]
    async fn test_ledger_failure_is_reported_once() {
        let ledger = Arc::new(FlakyLedger::default());
        let controller =
            PracticeController::new(config(0.0), ledger.clone(), EchoCoach::new(Duration::ZERO));
        controller.start_session("dancer", 1, "Salsa").await.unwrap();

        let err = controller.finish_session().await.unwrap_err();
        assert!(format!("{err:#}").contains("may not have been saved"));
        assert!(controller.finish_session().await.is_err());
        assert_eq!(ledger.finishes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_second_start_while_active_fails() {
        let (db, video_id) = seeded_db().await;
        let controller = PracticeController::new(config(0.0), db, EchoCoach::new(Duration::ZERO));
        controller
            .start_session("dancer", video_id, "Salsa")
            .await
            .unwrap();
        assert!(controller
            .start_session("dancer", video_id, "Salsa")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_abandon_marks_ledger() {
        let (db, video_id) = seeded_db().await;
        let controller =
            PracticeController::new(config(0.0), db.clone(), EchoCoach::new(Duration::ZERO));
        let snapshot = controller
            .start_session("dancer", video_id, "Salsa")
            .await
            .unwrap();
        let session_id = snapshot.session_id.unwrap();

        assert!(controller.abandon_session().await.unwrap());
        assert!(!controller.abandon_session().await.unwrap());

        let stored = db.get_practice_session(&session_id).await.unwrap().unwrap();
        assert_eq!(stored.status, PracticeStatus::Abandoned);
    }

    #[tokio::test]
    async fn test_new_session_after_finish() {
        let (db, video_id) = seeded_db().await;
        let controller = PracticeController::new(config(0.0), db, EchoCoach::new(Duration::ZERO));
        controller
            .start_session("dancer", video_id, "Salsa")
            .await
            .unwrap();
        controller.on_pose_observed(&coco_pose(&[1.0; 17]), true);
        controller.finish_session().await.unwrap();

        let snapshot = controller
            .start_session("dancer", video_id, "Salsa")
            .await
            .unwrap();
        assert_eq!(snapshot.status, ScorerStatus::Active);
        assert_eq!(snapshot.current_score, 0);
    }

    #[tokio::test]
    async fn test_subscribers_see_updates() {
        let (db, video_id) = seeded_db().await;
        let controller = PracticeController::new(config(0.0), db, EchoCoach::new(Duration::ZERO));
        let mut rx = controller.subscribe();
        controller
            .start_session("dancer", video_id, "Salsa")
            .await
            .unwrap();
        controller.on_pose_observed(&coco_pose(&[1.0; 17]), true);

        assert!(rx.has_changed().unwrap());
        let latest = rx.borrow_and_update().clone();
        assert_eq!(latest.current_score, 10);
        assert_eq!(latest.frames_observed, 1);
    }

    #[test]
    fn test_observe_without_runtime_skips_coaching() {
        let ledger = Arc::new(FlakyLedger::default());
        let coach = EchoCoach::new(Duration::ZERO);
        let controller = PracticeController::new(config(1.0), ledger, coach.clone());
        {
            let mut scorer = lock(&controller.scorer);
            scorer
                .begin("offline".into(), 1, "Salsa".into(), 1, Utc::now(), Instant::now())
                .unwrap();
        }

        let outcome = controller.on_pose_observed(&nine_visible(), true).unwrap();
        assert!(outcome.coaching.is_some());
        assert_eq!(coach.calls.load(Ordering::SeqCst), 0);
    }
}
