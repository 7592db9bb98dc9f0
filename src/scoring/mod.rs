pub mod accuracy;
pub mod config;
pub mod scorer;

pub use accuracy::{instant_accuracy, FrameAccuracy};
pub use config::{ScoringConfig, SmoothingPolicy};
pub use scorer::{PoseOutcome, ScorerStatus, SessionScorer, SessionSummary};
