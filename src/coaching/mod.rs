//! Coaching feedback: the request/response contract and the requesters that
//! fulfil it.

pub mod command;
pub mod rules;

use std::future::Future;
use std::pin::Pin;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::scoring::FrameAccuracy;

pub use command::CommandCoach;
pub use rules::RuleCoach;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoachingRequest {
    /// What should be happening, e.g. the routine being practiced.
    pub video_context: String,
    /// What the dancer is doing, derived from pose data.
    pub user_performance: String,
}

impl CoachingRequest {
    pub fn new(video_context: impl Into<String>, user_performance: impl Into<String>) -> Self {
        Self {
            video_context: video_context.into(),
            user_performance: user_performance.into(),
        }
    }

    pub fn for_frame(video_title: &str, frame: &FrameAccuracy) -> Self {
        Self::new(
            format!("User practicing {video_title}"),
            format!(
                "Accuracy score {}% with {} visible joints",
                frame.accuracy, frame.visible_count
            ),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoachingResponse {
    pub feedback: String,
    #[serde(default)]
    pub tips: Vec<String>,
    #[serde(default)]
    pub encouragement: String,
}

pub type CoachFuture = Pin<Box<dyn Future<Output = Result<CoachingResponse>> + Send + 'static>>;

/// Anything that can turn a performance description into coaching feedback.
///
/// The returned future owns everything it needs so it can be spawned onto the
/// runtime and outlive the call site.
pub trait CoachingRequester: Send + Sync {
    fn analyze(&self, request: CoachingRequest) -> CoachFuture;

    fn name(&self) -> &'static str;
}
