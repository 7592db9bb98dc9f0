use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// How a frame's instant accuracy folds into the running score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SmoothingPolicy {
    /// `0.9 * current + 0.1 * instant` over the unrounded running value; the
    /// reported score is that value rounded. A forgiving running average.
    #[default]
    Exponential,
    /// `max(current, instant)`; the best frame of the take.
    RunningMax,
}

impl SmoothingPolicy {
    /// Fold `instant` into the unrounded running value. Callers round for
    /// display; keeping the fraction lets the average actually reach zero.
    pub fn apply(self, current: f64, instant: u8) -> f64 {
        let instant = f64::from(instant);
        let next = match self {
            SmoothingPolicy::Exponential => 0.9 * current + 0.1 * instant,
            SmoothingPolicy::RunningMax => current.max(instant),
        };
        next.clamp(0.0, 100.0)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SmoothingPolicy::Exponential => "exponential",
            SmoothingPolicy::RunningMax => "running-max",
        }
    }
}

impl fmt::Display for SmoothingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SmoothingPolicy {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "exponential" | "ema" => Ok(SmoothingPolicy::Exponential),
            "running-max" | "max" => Ok(SmoothingPolicy::RunningMax),
            other => Err(anyhow!("unknown smoothing policy '{other}'")),
        }
    }
}

/// Tunables for the session scorer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoringConfig {
    /// A keypoint counts as visible when its confidence is above this.
    pub confidence_threshold: f32,

    /// Keypoints the pose model reports for a fully visible body.
    pub expected_keypoints: usize,

    /// Per-frame chance of asking the coach for feedback.
    pub coaching_probability: f64,

    pub policy: SmoothingPolicy,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.6,
            expected_keypoints: 17,
            coaching_probability: 0.02,
            policy: SmoothingPolicy::Exponential,
        }
    }
}

impl ScoringConfig {
    /// Clamp every field into its usable range.
    pub fn sanitized(self) -> Self {
        let threshold = if self.confidence_threshold.is_nan() {
            Self::default().confidence_threshold
        } else {
            self.confidence_threshold.clamp(0.0, 1.0)
        };
        let probability = if self.coaching_probability.is_nan() {
            0.0
        } else {
            self.coaching_probability.clamp(0.0, 1.0)
        };

        Self {
            confidence_threshold: threshold,
            expected_keypoints: self.expected_keypoints.max(1),
            coaching_probability: probability,
            policy: self.policy,
        }
    }

    /// Expected coaching calls per second at a given frame rate.
    pub fn expected_coaching_rate(&self, fps: f64) -> f64 {
        self.coaching_probability * fps
    }
}
