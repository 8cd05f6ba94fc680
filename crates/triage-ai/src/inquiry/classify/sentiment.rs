use super::SentimentPrediction;
use crate::inquiry::domain::Sentiment;
use crate::inquiry::intake::CanonicalText;

/// Tokens that flip the polarity of a lexicon hit within the lookback window.
static NEGATORS: &[&str] = &[
    "not", "no", "never", "cannot", "can't", "don't", "doesn't", "didn't", "isn't", "wasn't",
    "won't", "wouldn't",
];

/// Tokens that amplify the weight of a following lexicon hit.
static INTENSIFIERS: &[(&str, f64)] = &[
    ("very", 1.5),
    ("really", 1.5),
    ("so", 1.3),
    ("extremely", 2.0),
    ("incredibly", 2.0),
    ("absolutely", 1.8),
    ("totally", 1.5),
];

static POSITIVE: &[(&str, f64)] = &[
    ("thank", 1.5),
    ("thanks", 1.5),
    ("great", 1.5),
    ("good", 1.0),
    ("nice", 1.0),
    ("amazing", 2.0),
    ("excellent", 2.0),
    ("wonderful", 2.0),
    ("fantastic", 2.0),
    ("awesome", 2.0),
    ("love", 2.0),
    ("helpful", 1.5),
    ("appreciate", 1.8),
    ("appreciated", 1.8),
    ("happy", 1.5),
    ("pleased", 1.5),
    ("perfect", 1.8),
    ("impressed", 1.8),
    ("best", 1.5),
    ("smooth", 1.2),
];

static NEGATIVE: &[(&str, f64)] = &[
    ("bad", 1.0),
    ("terrible", 2.0),
    ("awful", 2.0),
    ("horrible", 2.0),
    ("worst", 2.0),
    ("hate", 2.0),
    ("angry", 1.8),
    ("frustrated", 1.8),
    ("frustrating", 1.8),
    ("disappointed", 1.8),
    ("disappointing", 1.8),
    ("annoyed", 1.5),
    ("annoying", 1.5),
    ("unacceptable", 2.0),
    ("useless", 2.0),
    ("broken", 1.5),
    ("fail", 1.5),
    ("failed", 1.5),
    ("failing", 1.5),
    ("incorrect", 1.5),
    ("wrong", 1.2),
    ("error", 1.0),
    ("errors", 1.0),
    ("problem", 1.0),
    ("problems", 1.0),
    ("issue", 0.8),
    ("issues", 0.8),
    ("blocking", 1.5),
    ("unable", 1.2),
    ("crash", 1.5),
    ("crashes", 1.5),
    ("slow", 1.0),
    ("complaint", 1.5),
    ("waste", 1.5),
];

/// How many preceding tokens are inspected for negators and intensifiers.
const LOOKBACK_TOKENS: usize = 3;

/// Rule-based sentiment scorer over a polarity lexicon.
///
/// Whole-token matching; "very bad" outweighs "bad", and "not good" counts as
/// negative. Ties, including the no-signal case, resolve to neutral.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexiconSentimentScorer;

impl LexiconSentimentScorer {
    pub const IDENTIFIER: &'static str = "lexicon-v1";

    pub fn analyze(&self, text: &CanonicalText) -> SentimentPrediction {
        let lowered = text.as_str().to_lowercase();
        let tokens: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric() && c != '\'')
            .filter(|token| !token.is_empty())
            .collect();

        let mut positive = 0.0;
        let mut negative = 0.0;

        for (index, token) in tokens.iter().enumerate() {
            let Some((base_weight, is_positive)) = polarity(token) else {
                continue;
            };

            let window_start = index.saturating_sub(LOOKBACK_TOKENS);
            let window = &tokens[window_start..index];

            let mut weight = base_weight;
            if let Some(factor) = window.iter().find_map(|t| intensifier(t)) {
                weight *= factor;
            }
            let negated = window.iter().any(|t| NEGATORS.contains(t));

            match (is_positive, negated) {
                (true, false) | (false, true) => positive += weight,
                (false, false) | (true, true) => negative += weight,
            }
        }

        let total = positive + negative;
        if total == 0.0 {
            return SentimentPrediction {
                sentiment: Sentiment::Neutral,
                confidence: 0.60,
            };
        }

        let diff = (positive - negative).abs();
        if diff < f64::EPSILON {
            return SentimentPrediction {
                sentiment: Sentiment::Neutral,
                confidence: 0.55,
            };
        }

        let sentiment = if positive > negative {
            Sentiment::Positive
        } else {
            Sentiment::Negative
        };
        let confidence = (0.55 + 0.40 * diff / total).min(0.95);

        SentimentPrediction {
            sentiment,
            confidence,
        }
    }
}

fn polarity(token: &str) -> Option<(f64, bool)> {
    if let Some((_, weight)) = POSITIVE.iter().find(|(word, _)| word == &token) {
        return Some((*weight, true));
    }
    if let Some((_, weight)) = NEGATIVE.iter().find(|(word, _)| word == &token) {
        return Some((*weight, false));
    }
    None
}

fn intensifier(token: &str) -> Option<f64> {
    INTENSIFIERS
        .iter()
        .find(|(word, _)| word == &token)
        .map(|(_, factor)| *factor)
}
