use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::inquiry::classify::PredictionTriple;
use crate::inquiry::domain::{Category, Department, Sentiment, Urgency};

/// Errors raised while loading a declarative rule file.
#[derive(Debug, thiserror::Error)]
pub enum RulesError {
    #[error("failed to read rules file '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse rules file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("rule '{rule}' escalates to department '{department}'; escalating rules may only target the escalation department or omit the department")]
    EscalationTarget { rule: String, department: String },
}

/// Condition block of a rule. An absent axis is a wildcard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleConditions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urgency: Option<Vec<Urgency>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<Vec<Sentiment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Vec<Category>>,
}

/// Action block of a rule. A missing department keeps the category's default
/// department mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<Department>,
    #[serde(default)]
    pub priority_boost: i32,
    #[serde(default)]
    pub escalated: bool,
}

/// One declarative escalation rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationRule {
    pub name: String,
    #[serde(default, rename = "when")]
    pub conditions: RuleConditions,
    #[serde(rename = "then")]
    pub action: RuleAction,
}

impl EscalationRule {
    fn matches(&self, triple: &PredictionTriple) -> bool {
        let urgency_ok = self
            .conditions
            .urgency
            .as_ref()
            .map_or(true, |set| set.contains(&triple.urgency.urgency));
        let sentiment_ok = self
            .conditions
            .sentiment
            .as_ref()
            .map_or(true, |set| set.contains(&triple.sentiment.sentiment));
        let category_ok = self
            .conditions
            .category
            .as_ref()
            .map_or(true, |set| set.contains(&triple.category.category));
        urgency_ok && sentiment_ok && category_ok
    }
}

/// Ordered rule list; the earliest matching rule wins.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSet {
    rules: Vec<EscalationRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<EscalationRule>) -> Result<Self, RulesError> {
        for rule in &rules {
            if rule.action.escalated {
                if let Some(department) = rule.action.department {
                    if department != Department::Escalation {
                        return Err(RulesError::EscalationTarget {
                            rule: rule.name.clone(),
                            department: department.label().to_string(),
                        });
                    }
                }
            }
        }
        Ok(Self { rules })
    }

    pub fn from_path(path: &Path) -> Result<Self, RulesError> {
        let raw = std::fs::read_to_string(path).map_err(|source| RulesError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, RulesError> {
        let rules: Vec<EscalationRule> = serde_yaml::from_str(raw)?;
        Self::new(rules)
    }

    /// Built-in rules applied when no rules file is configured: critical
    /// inquiries and negative high-urgency inquiries escalate within their
    /// category's department.
    pub fn builtin() -> Self {
        Self {
            rules: vec![
                EscalationRule {
                    name: "critical-urgency".to_string(),
                    conditions: RuleConditions {
                        urgency: Some(vec![Urgency::Critical]),
                        sentiment: None,
                        category: None,
                    },
                    action: RuleAction {
                        department: None,
                        priority_boost: 10,
                        escalated: true,
                    },
                },
                EscalationRule {
                    name: "negative-high-urgency".to_string(),
                    conditions: RuleConditions {
                        urgency: Some(vec![Urgency::High]),
                        sentiment: Some(vec![Sentiment::Negative]),
                        category: None,
                    },
                    action: RuleAction {
                        department: None,
                        priority_boost: 10,
                        escalated: true,
                    },
                },
            ],
        }
    }

    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn first_match(&self, triple: &PredictionTriple) -> Option<&EscalationRule> {
        self.rules.iter().find(|rule| rule.matches(triple))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inquiry::classify::{
        CategoryPrediction, SentimentPrediction, UrgencyPrediction,
    };
    use std::collections::BTreeMap;

    fn triple(category: Category, sentiment: Sentiment, urgency: Urgency) -> PredictionTriple {
        PredictionTriple {
            category: CategoryPrediction {
                category,
                confidence: 0.9,
                scores: BTreeMap::new(),
            },
            sentiment: SentimentPrediction {
                sentiment,
                confidence: 0.8,
            },
            urgency: UrgencyPrediction {
                urgency,
                confidence: 0.7,
            },
        }
    }

    const SAMPLE: &str = r#"
- name: billing-legal-escalation
  when:
    urgency: [critical, high]
    sentiment: [negative]
    category: [billing, legal]
  then:
    department: escalation
    priority_boost: 20
    escalated: true
- name: all-critical
  when:
    urgency: [critical]
  then:
    priority_boost: 5
    escalated: true
"#;

    #[test]
    fn parses_spec_shaped_yaml() {
        let rules = RuleSet::from_yaml(SAMPLE).expect("rules parse");
        assert_eq!(rules.len(), 2);
    }

    #[test]
    fn first_match_wins_in_declaration_order() {
        let rules = RuleSet::from_yaml(SAMPLE).expect("rules parse");
        let matched = rules
            .first_match(&triple(
                Category::Billing,
                Sentiment::Negative,
                Urgency::Critical,
            ))
            .expect("a rule matches");
        assert_eq!(matched.name, "billing-legal-escalation");
    }

    #[test]
    fn absent_axes_are_wildcards() {
        let rules = RuleSet::from_yaml(SAMPLE).expect("rules parse");
        let matched = rules
            .first_match(&triple(
                Category::Sales,
                Sentiment::Positive,
                Urgency::Critical,
            ))
            .expect("wildcard rule matches");
        assert_eq!(matched.name, "all-critical");
    }

    #[test]
    fn no_rule_matches_calm_inquiries() {
        let rules = RuleSet::from_yaml(SAMPLE).expect("rules parse");
        assert!(rules
            .first_match(&triple(Category::Sales, Sentiment::Neutral, Urgency::Low))
            .is_none());
    }

    #[test]
    fn rejects_escalation_to_arbitrary_department() {
        let raw = r#"
- name: bad-rule
  when:
    urgency: [critical]
  then:
    department: sales
    escalated: true
"#;
        assert!(matches!(
            RuleSet::from_yaml(raw),
            Err(RulesError::EscalationTarget { .. })
        ));
    }

    #[test]
    fn builtin_rules_escalate_critical() {
        let rules = RuleSet::builtin();
        assert!(rules
            .first_match(&triple(
                Category::TechnicalSupport,
                Sentiment::Negative,
                Urgency::Critical,
            ))
            .is_some());
        assert!(rules
            .first_match(&triple(
                Category::TechnicalSupport,
                Sentiment::Neutral,
                Urgency::High,
            ))
            .is_none());
    }
}
