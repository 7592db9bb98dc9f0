//! Pose observations delivered by the pose-estimation model.
//!
//! A `DetectedPose` is one frame's worth of keypoints. The model is external;
//! poses reach the crate as JSON (one object per frame) in the shape the web
//! pose-detection libraries produce.

use std::collections::HashSet;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Landmark names of the 17-point COCO topology used by MoveNet and PoseNet.
pub const COCO_KEYPOINTS: [&str; 17] = [
    "nose",
    "left_eye",
    "right_eye",
    "left_ear",
    "right_ear",
    "left_shoulder",
    "right_shoulder",
    "left_elbow",
    "right_elbow",
    "left_wrist",
    "right_wrist",
    "left_hip",
    "right_hip",
    "left_knee",
    "right_knee",
    "left_ankle",
    "right_ankle",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub name: String,
    pub x: f32,
    pub y: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f32>,
    /// Detection confidence in [0, 1]. Some detectors omit it for
    /// landmarks they did not score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl Keypoint {
    pub fn new(name: impl Into<String>, x: f32, y: f32, score: f32) -> Self {
        Self {
            name: name.into(),
            x,
            y,
            z: None,
            score: Some(score),
        }
    }

    /// Missing scores count as zero confidence.
    pub fn confidence(&self) -> f32 {
        self.score.unwrap_or(0.0)
    }
}

#[derive(Deserialize)]
struct RawPose {
    #[serde(default)]
    keypoints: Vec<Keypoint>,
}

/// Keypoints for a single frame. Names are unique within a pose; an empty
/// pose means nobody was detected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPose")]
pub struct DetectedPose {
    keypoints: Vec<Keypoint>,
}

impl DetectedPose {
    pub fn new(keypoints: Vec<Keypoint>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(keypoints.len());
        for keypoint in &keypoints {
            if !seen.insert(keypoint.name.as_str()) {
                bail!("duplicate keypoint '{}' in pose", keypoint.name);
            }
        }
        Ok(Self { keypoints })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    /// Number of keypoints whose confidence is strictly above `threshold`.
    pub fn visible_count(&self, threshold: f32) -> usize {
        self.keypoints
            .iter()
            .filter(|kp| kp.confidence() > threshold)
            .count()
    }
}

impl TryFrom<RawPose> for DetectedPose {
    type Error = anyhow::Error;

    fn try_from(raw: RawPose) -> Result<Self> {
        DetectedPose::new(raw.keypoints)
    }
}

#[cfg(test)]
pub(crate) fn coco_pose(confidences: &[f32]) -> DetectedPose {
    let keypoints = COCO_KEYPOINTS
        .iter()
        .zip(confidences)
        .map(|(name, score)| Keypoint::new(*name, 0.5, 0.5, *score))
        .collect();
    DetectedPose::new(keypoints).expect("coco names are unique")
}
