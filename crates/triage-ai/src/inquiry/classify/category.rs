use std::collections::BTreeMap;

use super::CategoryPrediction;
use crate::inquiry::domain::Category;
use crate::inquiry::intake::CanonicalText;

/// Two categories within this margin are considered tied; the earlier member
/// of the taxonomy wins.
const TIE_MARGIN: f64 = 1e-6;

/// Weighted keyword lists per category. Weights express keyword rarity:
/// a distinctive term like "invoice" carries more signal than "help".
static KEYWORDS: &[(Category, &[(&str, f64)])] = &[
    (
        Category::TechnicalSupport,
        &[
            ("login", 2.0),
            ("password", 2.0),
            ("authentication", 2.0),
            ("troubleshoot", 2.0),
            ("crash", 2.0),
            ("error", 1.5),
            ("bug", 1.5),
            ("broken", 1.5),
            ("not working", 1.5),
            ("freeze", 1.5),
            ("outage", 1.5),
            ("technical", 1.5),
            ("server", 1.2),
            ("network", 1.2),
            ("database", 1.2),
            ("connection", 1.2),
            ("api", 1.2),
            ("slow", 1.0),
            ("issue", 1.0),
            ("problem", 1.0),
            ("software", 1.0),
            ("help", 0.8),
            ("support", 0.8),
            ("system", 0.8),
        ],
    ),
    (
        Category::Billing,
        &[
            ("invoice", 2.0),
            ("refund", 2.0),
            ("billing", 2.0),
            ("charge", 1.8),
            ("payment", 1.8),
            ("receipt", 1.8),
            ("subscription", 1.5),
            ("bill", 1.5),
            ("transaction", 1.5),
            ("fee", 1.5),
            ("debit", 1.5),
            ("credit card", 1.5),
            ("downgrade", 1.2),
            ("expensive", 1.2),
            ("price", 1.0),
            ("cost", 1.0),
            ("money", 1.0),
        ],
    ),
    (
        Category::Sales,
        &[
            ("demo", 2.0),
            ("sales", 2.0),
            ("pricing", 1.8),
            ("quote", 1.8),
            ("purchase", 1.8),
            ("trial", 1.8),
            ("new customer", 1.8),
            ("buy", 1.5),
            ("enterprise", 1.5),
            ("sign up", 1.5),
            ("discount", 1.5),
            ("promotion", 1.5),
            ("interested in", 1.2),
            ("compare", 1.2),
            ("order", 1.2),
            ("register", 1.2),
            ("features", 1.0),
            ("deal", 1.0),
        ],
    ),
    (
        Category::Hr,
        &[
            ("resume", 2.0),
            ("hiring", 2.0),
            ("human resources", 2.0),
            ("payroll", 2.0),
            ("onboarding", 2.0),
            ("career", 1.8),
            ("interview", 1.8),
            ("vacation", 1.8),
            ("time off", 1.8),
            ("employment", 1.8),
            ("benefits", 1.5),
            ("employee", 1.5),
            ("workplace", 1.5),
            ("job", 1.5),
            ("staff", 1.0),
            ("position", 1.0),
        ],
    ),
    (
        Category::Legal,
        &[
            ("legal", 2.0),
            ("lawsuit", 2.0),
            ("attorney", 2.0),
            ("lawyer", 2.0),
            ("liability", 2.0),
            ("copyright", 2.0),
            ("trademark", 2.0),
            ("gdpr", 2.0),
            ("privacy", 1.8),
            ("compliance", 1.8),
            ("contract", 1.8),
            ("regulation", 1.8),
            ("court", 1.8),
            ("terms", 1.5),
            ("agreement", 1.5),
            ("rights", 1.2),
            ("policy", 0.8),
        ],
    ),
    (
        Category::ProductFeedback,
        &[
            ("feedback", 2.0),
            ("feature request", 2.0),
            ("user experience", 2.0),
            ("usability", 2.0),
            ("ux", 2.0),
            ("suggestion", 1.8),
            ("enhancement", 1.8),
            ("ui", 1.8),
            ("improvement", 1.5),
            ("recommendation", 1.5),
            ("interface", 1.5),
            ("idea", 1.2),
            ("design", 1.2),
            ("workflow", 1.2),
        ],
    ),
];

/// Rule-based category scorer.
///
/// Sums keyword-weight hits per category (a hit in the subject counts double),
/// then softmax-normalizes the raw scores into a probability distribution.
/// With no hits at all the distribution is uniform and the first taxonomy
/// member wins the tie.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordCategoryScorer;

impl KeywordCategoryScorer {
    pub const IDENTIFIER: &'static str = "keyword-v1";

    pub fn classify(&self, text: &CanonicalText) -> CategoryPrediction {
        let subject = text.subject().to_lowercase();
        let body = text.body().to_lowercase();

        let mut raw = BTreeMap::new();
        for (category, keywords) in KEYWORDS {
            let mut score = 0.0;
            for (keyword, weight) in *keywords {
                if subject.contains(keyword) {
                    score += 2.0 * weight;
                }
                if body.contains(keyword) {
                    score += weight;
                }
            }
            raw.insert(*category, score);
        }

        let scores = softmax(&raw);

        let mut category = Category::TechnicalSupport;
        let mut confidence = f64::NEG_INFINITY;
        for candidate in Category::ALL {
            let probability = scores[&candidate];
            if probability > confidence + TIE_MARGIN {
                category = candidate;
                confidence = probability;
            }
        }

        CategoryPrediction {
            category,
            confidence,
            scores,
        }
    }
}

fn softmax(raw: &BTreeMap<Category, f64>) -> BTreeMap<Category, f64> {
    let max = raw.values().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut exps = BTreeMap::new();
    let mut sum = 0.0;
    for (category, score) in raw {
        let value = (score - max).exp();
        exps.insert(*category, value);
        sum += value;
    }
    exps.values_mut().for_each(|value| *value /= sum);
    exps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inquiry::intake::canonicalize;

    fn classify(subject: &str, body: &str) -> CategoryPrediction {
        KeywordCategoryScorer.classify(&canonicalize(subject, body).expect("canonical text"))
    }

    #[test]
    fn scores_sum_to_one() {
        let prediction = classify("Incorrect charge", "I was charged twice this month.");
        let total: f64 = prediction.scores.values().sum();
        assert!((total - 1.0).abs() < 1e-3, "scores summed to {total}");
    }

    #[test]
    fn billing_keywords_win_over_generic_ones() {
        let prediction = classify(
            "Incorrect charge",
            "I was charged twice for my subscription this month. I need a refund.",
        );
        assert_eq!(prediction.category, Category::Billing);
        assert!(prediction.confidence > 0.9);
    }

    #[test]
    fn subject_hits_count_double() {
        let subject_hit = classify("demo", "nothing else here");
        let body_hit = classify("nothing else here", "demo");
        assert_eq!(subject_hit.category, Category::Sales);
        assert_eq!(body_hit.category, Category::Sales);
        assert!(subject_hit.confidence > body_hit.confidence);
    }

    #[test]
    fn no_hits_defaults_to_first_taxonomy_member() {
        let prediction = classify("hello there", "completely unrelated prose");
        assert_eq!(prediction.category, Category::TechnicalSupport);
        let uniform = 1.0 / Category::ALL.len() as f64;
        assert!((prediction.confidence - uniform).abs() < 1e-9);
    }

    #[test]
    fn argmax_matches_reported_confidence() {
        let prediction = classify(
            "Privacy question",
            "Does your data retention policy comply with GDPR?",
        );
        assert_eq!(prediction.category, Category::Legal);
        assert_eq!(prediction.scores[&prediction.category], prediction.confidence);
    }
}
