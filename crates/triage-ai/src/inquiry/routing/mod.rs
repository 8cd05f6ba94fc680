//! Priority scoring, escalation, and consultant assignment.

mod pool;
mod rules;

pub use pool::{Consultant, ConsultantPool};
pub use rules::{EscalationRule, RuleAction, RuleConditions, RuleSet, RulesError};

use chrono::{DateTime, Utc};

use crate::config::{AssignmentStrategy, SlaConfig};
use crate::inquiry::classify::PredictionTriple;
use crate::inquiry::domain::{
    Category, Department, InquiryId, RoutingDecision, Sentiment, Urgency,
};

/// Score floor guaranteed for escalated decisions.
const ESCALATION_SCORE_FLOOR: i32 = 80;

/// Additive weights feeding the priority score.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingWeights {
    pub urgency_low: i32,
    pub urgency_medium: i32,
    pub urgency_high: i32,
    pub urgency_critical: i32,
    pub sentiment_positive: i32,
    pub sentiment_neutral: i32,
    pub sentiment_negative: i32,
    pub category_base: i32,
}

impl Default for RoutingWeights {
    fn default() -> Self {
        Self {
            urgency_low: 5,
            urgency_medium: 25,
            urgency_high: 55,
            urgency_critical: 80,
            sentiment_positive: -5,
            sentiment_neutral: 0,
            sentiment_negative: 10,
            category_base: 0,
        }
    }
}

impl RoutingWeights {
    fn urgency(&self, urgency: Urgency) -> i32 {
        match urgency {
            Urgency::Low => self.urgency_low,
            Urgency::Medium => self.urgency_medium,
            Urgency::High => self.urgency_high,
            Urgency::Critical => self.urgency_critical,
        }
    }

    fn sentiment(&self, sentiment: Sentiment) -> i32 {
        match sentiment {
            Sentiment::Positive => self.sentiment_positive,
            Sentiment::Neutral => self.sentiment_neutral,
            Sentiment::Negative => self.sentiment_negative,
        }
    }

    fn category(&self, _category: Category) -> i32 {
        self.category_base
    }
}

/// Computes routing decisions from classification output.
///
/// The engine is a pure consumer of the consultant pool: it calls into the
/// pool for assignment, the pool never calls back.
pub struct RoutingEngine {
    weights: RoutingWeights,
    sla: SlaConfig,
    rules: RuleSet,
    pool: ConsultantPool,
    strategy: AssignmentStrategy,
}

impl RoutingEngine {
    pub fn new(
        rules: RuleSet,
        pool: ConsultantPool,
        strategy: AssignmentStrategy,
        sla: SlaConfig,
    ) -> Self {
        Self {
            weights: RoutingWeights::default(),
            sla,
            rules,
            pool,
            strategy,
        }
    }

    pub fn with_weights(mut self, weights: RoutingWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn pool(&self) -> &ConsultantPool {
        &self.pool
    }

    /// Derive the decision for one classified inquiry.
    ///
    /// Deterministic given identical inputs, rules, and pool state; the
    /// earliest declared rule wins and pool tie-breaks are fixed.
    pub fn route(
        &self,
        inquiry_id: InquiryId,
        triple: &PredictionTriple,
        decided_at: DateTime<Utc>,
    ) -> RoutingDecision {
        let category = triple.category.category;
        let urgency = triple.urgency.urgency;

        let mut score = self.weights.urgency(urgency)
            + self.weights.sentiment(triple.sentiment.sentiment)
            + self.weights.category(category);

        let matched = self.rules.first_match(triple);
        let (department, escalated, reason) = match matched {
            Some(rule) => {
                score += rule.action.priority_boost;
                if rule.action.escalated {
                    score = score.max(ESCALATION_SCORE_FLOOR);
                }
                let department = rule
                    .action
                    .department
                    .unwrap_or_else(|| category.department());
                let reason = format!(
                    "classified as {}; rule '{}' routed to {}",
                    category.label(),
                    rule.name,
                    department.label()
                );
                (department, rule.action.escalated, reason)
            }
            None => {
                let department = category.department();
                let reason = format!(
                    "classified as {}; routed to {} by department mapping",
                    category.label(),
                    department.label()
                );
                (department, false, reason)
            }
        };

        let priority_score = score.clamp(0, 100) as u8;
        let consultant = self
            .pool
            .assign(department, self.strategy, &[category.skill_tag()]);
        let response_deadline = decided_at + self.sla_window(urgency);

        RoutingDecision {
            inquiry_id,
            department,
            consultant,
            priority_score,
            escalated,
            response_deadline,
            decided_at,
            reason,
        }
    }

    fn sla_window(&self, urgency: Urgency) -> chrono::Duration {
        match urgency {
            Urgency::Critical => self.sla.critical,
            Urgency::High => self.sla.high,
            Urgency::Medium => self.sla.medium,
            Urgency::Low => self.sla.low,
        }
    }
}
