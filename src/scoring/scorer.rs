use std::time::Instant;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::coaching::{CoachingRequest, CoachingResponse};
use crate::pose::DetectedPose;

use super::accuracy::{instant_accuracy, FrameAccuracy};
use super::config::ScoringConfig;

/// Points awarded per accuracy point at finish. A display multiplier only.
pub const POINTS_PER_ACCURACY: u32 = 100;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum ScorerStatus {
    #[default]
    Idle,
    Active,
    Finished,
    Abandoned,
}

impl ScorerStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ScorerStatus::Finished | ScorerStatus::Abandoned)
    }
}

/// What one accepted observation did to the session.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseOutcome {
    pub frame: FrameAccuracy,
    pub current_score: u8,
    /// Set when this frame drew the coaching sample.
    pub coaching: Option<CoachingRequest>,
}

/// Final figures handed to the ledger when a session finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub video_id: i64,
    pub accuracy: u8,
    pub points: u32,
    pub duration_played_secs: u64,
    pub feedback: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Running score and feedback for one practice session.
///
/// The scorer is plain synchronous state: it never performs I/O. Coaching
/// requests it decides on are returned to the caller for dispatch, and their
/// responses come back through [`SessionScorer::apply_feedback`] tagged with
/// the epoch they were issued under.
#[derive(Debug, Clone)]
pub struct SessionScorer {
    config: ScoringConfig,
    status: ScorerStatus,
    session_id: Option<String>,
    video_id: Option<i64>,
    video_title: String,
    epoch: u64,
    /// Unrounded running value; `current_score` rounds it.
    smoothed: f64,
    last_feedback: Option<String>,
    started_at: Option<DateTime<Utc>>,
    running_anchor: Option<Instant>,
    frames_observed: u64,
}

impl SessionScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self {
            config: config.sanitized(),
            status: ScorerStatus::Idle,
            session_id: None,
            video_id: None,
            video_title: String::new(),
            epoch: 0,
            smoothed: 0.0,
            last_feedback: None,
            started_at: None,
            running_anchor: None,
            frames_observed: 0,
        }
    }

    pub fn begin(
        &mut self,
        session_id: String,
        video_id: i64,
        video_title: String,
        epoch: u64,
        started_at: DateTime<Utc>,
        now: Instant,
    ) -> Result<()> {
        if self.status == ScorerStatus::Active {
            bail!("practice session already active");
        }

        *self = Self {
            config: self.config,
            status: ScorerStatus::Active,
            session_id: Some(session_id),
            video_id: Some(video_id),
            video_title,
            epoch,
            smoothed: 0.0,
            last_feedback: None,
            started_at: Some(started_at),
            running_anchor: Some(now),
            frames_observed: 0,
        };
        Ok(())
    }

    /// Score one frame. Returns `None` without touching any state when the
    /// gate is closed (video paused) or the session is not active.
    pub fn observe<R: Rng>(
        &mut self,
        pose: &DetectedPose,
        is_session_active: bool,
        rng: &mut R,
    ) -> Option<PoseOutcome> {
        if !is_session_active || self.status != ScorerStatus::Active {
            return None;
        }

        let frame = instant_accuracy(pose, &self.config);
        self.smoothed = self.config.policy.apply(self.smoothed, frame.accuracy);
        self.frames_observed += 1;

        // gen::<f64>() is in [0, 1), so p == 0 never fires and p == 1 always does
        let coaching = if rng.gen::<f64>() < self.config.coaching_probability {
            Some(CoachingRequest::for_frame(&self.video_title, &frame))
        } else {
            None
        };

        Some(PoseOutcome {
            frame,
            current_score: self.current_score(),
            coaching,
        })
    }

    /// Record a coaching response. Ignored unless the session is still active
    /// and `epoch` is the one the request was issued under.
    pub fn apply_feedback(&mut self, epoch: u64, response: &CoachingResponse) -> bool {
        if self.status != ScorerStatus::Active || epoch != self.epoch {
            return false;
        }
        self.last_feedback = Some(response.feedback.clone());
        true
    }

    /// Start the take over inside the same session.
    pub fn restart(&mut self, epoch: u64, started_at: DateTime<Utc>, now: Instant) -> Result<()> {
        if self.status != ScorerStatus::Active {
            bail!("no active practice session to restart");
        }
        self.epoch = epoch;
        self.smoothed = 0.0;
        self.last_feedback = None;
        self.started_at = Some(started_at);
        self.running_anchor = Some(now);
        self.frames_observed = 0;
        Ok(())
    }

    /// `Active -> Finished`. Any other state is rejected so a session is
    /// never reported twice.
    pub fn finish(&mut self, finished_at: DateTime<Utc>, now: Instant) -> Result<SessionSummary> {
        if self.status != ScorerStatus::Active {
            bail!("no active practice session to finish");
        }

        let (Some(session_id), Some(video_id), Some(started_at)) =
            (self.session_id.clone(), self.video_id, self.started_at)
        else {
            bail!("active practice session is missing its identity");
        };

        let accuracy = self.current_score();
        let duration_played_secs = self.elapsed_ms_at(now).saturating_add(500) / 1000;

        self.status = ScorerStatus::Finished;
        self.running_anchor = None;

        Ok(SessionSummary {
            session_id,
            video_id,
            accuracy,
            points: u32::from(accuracy) * POINTS_PER_ACCURACY,
            duration_played_secs,
            feedback: self.last_feedback.clone(),
            started_at,
            finished_at,
        })
    }

    /// `Active -> Abandoned`. Returns the session id when there was one.
    pub fn abandon(&mut self) -> Option<String> {
        if self.status != ScorerStatus::Active {
            return None;
        }
        self.status = ScorerStatus::Abandoned;
        self.running_anchor = None;
        self.session_id.clone()
    }

    pub fn current_score(&self) -> u8 {
        self.smoothed.round().clamp(0.0, 100.0) as u8
    }

    pub fn elapsed_ms_at(&self, now: Instant) -> u64 {
        self.running_anchor
            .map(|anchor| now.saturating_duration_since(anchor).as_millis() as u64)
            .unwrap_or(0)
    }

    pub fn status(&self) -> ScorerStatus {
        self.status
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn video_id(&self) -> Option<i64> {
        self.video_id
    }

    pub fn last_feedback(&self) -> Option<&str> {
        self.last_feedback.as_deref()
    }

    pub fn frames_observed(&self) -> u64 {
        self.frames_observed
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }
}
