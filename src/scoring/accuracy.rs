use crate::pose::DetectedPose;
use crate::scoring::config::ScoringConfig;

/// Coverage proxy for one frame: how many joints the model saw confidently,
/// as a percentage of the joints it should see. Says nothing about whether
/// the dancer matches the choreography.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameAccuracy {
    pub visible_count: usize,
    pub accuracy: u8,
}

/// `min(100, round(100 * visible / expected))`. An empty pose scores zero.
pub fn instant_accuracy(pose: &DetectedPose, config: &ScoringConfig) -> FrameAccuracy {
    let visible_count = pose.visible_count(config.confidence_threshold);
    let expected = config.expected_keypoints.max(1) as f64;
    let ratio = (100.0 * visible_count as f64 / expected).round();

    FrameAccuracy {
        visible_count,
        accuracy: ratio.min(100.0) as u8,
    }
}
