use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier wrapper for stored inquiries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InquiryId(pub Uuid);

impl InquiryId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for InquiryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Inbound payload accepted by the submit path before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InquirySubmission {
    pub subject: String,
    pub body: String,
    pub sender_email: String,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// A stored inquiry together with its processing state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inquiry {
    pub id: InquiryId,
    pub subject: String,
    pub body: String,
    pub sender_email: String,
    pub sender_name: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub received_at: DateTime<Utc>,
    pub processed: bool,
    pub processing_attempts: u32,
    pub last_error: Option<String>,
    pub poisoned: bool,
}

/// Fixed taxonomy of inquiry categories.
///
/// Declaration order doubles as the tie-break order for the category scorer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    TechnicalSupport,
    Billing,
    Sales,
    Hr,
    Legal,
    ProductFeedback,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::TechnicalSupport,
        Category::Billing,
        Category::Sales,
        Category::Hr,
        Category::Legal,
        Category::ProductFeedback,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Category::TechnicalSupport => "technical_support",
            Category::Billing => "billing",
            Category::Sales => "sales",
            Category::Hr => "hr",
            Category::Legal => "legal",
            Category::ProductFeedback => "product_feedback",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.label() == label)
    }

    /// Default department for the category when no escalation rule overrides.
    pub const fn department(self) -> Department {
        match self {
            Category::TechnicalSupport => Department::TechnicalSupport,
            Category::Billing => Department::Finance,
            Category::Sales => Department::Sales,
            Category::Hr => Department::Hr,
            Category::Legal => Department::Legal,
            Category::ProductFeedback => Department::ProductManagement,
        }
    }

    /// Skill tag a consultant needs for skill-matched assignment.
    pub const fn skill_tag(self) -> &'static str {
        self.label()
    }
}

/// Sentiment polarity of an inquiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub const ALL: [Sentiment; 3] = [Sentiment::Positive, Sentiment::Neutral, Sentiment::Negative];

    pub const fn label(self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.label() == label)
    }
}

/// Urgency level of an inquiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Critical,
}

impl Urgency {
    pub const ALL: [Urgency; 4] = [
        Urgency::Low,
        Urgency::Medium,
        Urgency::High,
        Urgency::Critical,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Medium => "medium",
            Urgency::High => "high",
            Urgency::Critical => "critical",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|u| u.label() == label)
    }
}

/// Departments an inquiry can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Department {
    TechnicalSupport,
    Finance,
    Sales,
    Hr,
    Legal,
    ProductManagement,
    Escalation,
    General,
}

impl Department {
    pub const ALL: [Department; 8] = [
        Department::TechnicalSupport,
        Department::Finance,
        Department::Sales,
        Department::Hr,
        Department::Legal,
        Department::ProductManagement,
        Department::Escalation,
        Department::General,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Department::TechnicalSupport => "technical_support",
            Department::Finance => "finance",
            Department::Sales => "sales",
            Department::Hr => "hr",
            Department::Legal => "legal",
            Department::ProductManagement => "product_management",
            Department::Escalation => "escalation",
            Department::General => "general",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.label() == label)
    }
}

/// Persisted classifier output, one per processed inquiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub inquiry_id: InquiryId,
    pub category: Category,
    pub category_confidence: f64,
    pub sentiment: Sentiment,
    pub sentiment_confidence: f64,
    pub urgency: Urgency,
    pub urgency_confidence: f64,
    pub model_identifier: String,
    pub classified_at: DateTime<Utc>,
}

/// Persisted routing output, one per processed inquiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub inquiry_id: InquiryId,
    pub department: Department,
    pub consultant: Option<String>,
    pub priority_score: u8,
    pub escalated: bool,
    pub response_deadline: DateTime<Utc>,
    pub decided_at: DateTime<Utc>,
    pub reason: String,
}

/// Combined read-only view of an inquiry and its triage results.
#[derive(Debug, Clone, Serialize)]
pub struct InquiryDetails {
    pub inquiry: Inquiry,
    pub prediction: Option<Prediction>,
    pub decision: Option<RoutingDecision>,
}

/// Aggregate pipeline statistics over a reporting window.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TriageStatistics {
    pub total: u64,
    pub processed: u64,
    pub per_category: BTreeMap<String, u64>,
    pub per_department: BTreeMap<String, u64>,
    pub escalated: u64,
    pub escalation_rate: f64,
}
