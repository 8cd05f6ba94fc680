use std::sync::LazyLock;

use regex::Regex;

use super::UrgencyPrediction;
use crate::inquiry::domain::Urgency;
use crate::inquiry::intake::CanonicalText;

static CRITICAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:urgent|asap|emergency|critical|immediately|right now)\b")
        .expect("critical urgency pattern")
});
static HIGH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:blocking|cannot work|can't work|down|outage)\b")
        .expect("high urgency pattern")
});
static MEDIUM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:soon|today|this week|next week|this month)\b")
        .expect("medium urgency pattern")
});

/// Deterministic, ordered urgency rules.
///
/// The first tier whose phrase set matches (case-insensitive, whole words)
/// decides the level; anything else is low urgency.
#[derive(Debug, Clone, Copy, Default)]
pub struct UrgencyRules;

impl UrgencyRules {
    pub const IDENTIFIER: &'static str = "rules-v1";

    pub fn predict(&self, text: &CanonicalText) -> UrgencyPrediction {
        let haystack = text.as_str();

        let (urgency, confidence) = if CRITICAL.is_match(haystack) {
            (Urgency::Critical, 0.95)
        } else if HIGH.is_match(haystack) {
            (Urgency::High, 0.85)
        } else if MEDIUM.is_match(haystack) {
            (Urgency::Medium, 0.70)
        } else {
            (Urgency::Low, 0.60)
        };

        UrgencyPrediction {
            urgency,
            confidence,
        }
    }
}
