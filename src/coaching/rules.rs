use super::{CoachFuture, CoachingRequest, CoachingRequester, CoachingResponse};

const ENCOURAGEMENT: &str = "You're doing amazing, keep it up!";

/// Offline coach: buckets the accuracy quoted in the performance text.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleCoach;

impl RuleCoach {
    pub fn new() -> Self {
        Self
    }

    pub fn feedback_for(&self, request: &CoachingRequest) -> CoachingResponse {
        let accuracy = quoted_accuracy(&request.user_performance).unwrap_or(0.0);

        let (feedback, tips) = if accuracy > 0.8 {
            (
                "Excellent synchronization! You're matching the instructor perfectly.",
                [
                    "Maintain this consistency",
                    "Try adding more flair to your movements",
                    "Look at your hand positioning",
                ],
            )
        } else if accuracy > 0.5 {
            (
                "Good progress. You're catching most of the moves.",
                [
                    "Watch the footwork carefully",
                    "Try to anticipate the next move",
                    "Slightly more power in your steps",
                ],
            )
        } else {
            (
                "Keep moving! Your energy is great.",
                [
                    "Focus on your arm extensions",
                    "Try to match the rhythm more closely",
                    "Keep your core engaged",
                ],
            )
        };

        CoachingResponse {
            feedback: feedback.to_string(),
            tips: tips.iter().map(|tip| tip.to_string()).collect(),
            encouragement: ENCOURAGEMENT.to_string(),
        }
    }
}

impl CoachingRequester for RuleCoach {
    fn analyze(&self, request: CoachingRequest) -> CoachFuture {
        let response = self.feedback_for(&request);
        Box::pin(async move { Ok(response) })
    }

    fn name(&self) -> &'static str {
        "rules"
    }
}

/// First `<digits>%` in a text mentioning accuracy, as a fraction.
fn quoted_accuracy(text: &str) -> Option<f64> {
    if !text.to_ascii_lowercase().contains("accuracy") {
        return None;
    }

    let bytes = text.as_bytes();
    for (idx, byte) in bytes.iter().enumerate() {
        if *byte != b'%' {
            continue;
        }
        let start = bytes[..idx]
            .iter()
            .rposition(|b| !b.is_ascii_digit())
            .map(|pos| pos + 1)
            .unwrap_or(0);
        if start == idx {
            continue;
        }
        if let Ok(value) = text[start..idx].parse::<f64>() {
            return Some(value / 100.0);
        }
    }
    None
}
