//! Inquiry intake, classification, routing, and batch drain.

pub mod classify;
pub mod domain;
pub mod drain;
pub mod intake;
pub mod repository;
pub mod router;
pub mod routing;
pub mod service;

#[cfg(test)]
mod tests;

pub use classify::{
    BackendError, CategoryBackend, CategoryPrediction, ClassificationError, LearnedBackends,
    PredictionTriple, PredictorHost, SentimentBackend, SentimentPrediction, UrgencyPrediction,
};
pub use domain::{
    Category, Department, Inquiry, InquiryDetails, InquiryId, InquirySubmission, Prediction,
    RoutingDecision, Sentiment, TriageStatistics, Urgency,
};
pub use drain::{DrainOptions, DrainReport};
pub use intake::{CanonicalText, IntakeError, IntakeGuard};
pub use repository::{DrainBatch, FailureDisposition, InquiryRepository, RepositoryError};
pub use router::inquiry_router;
pub use routing::{Consultant, ConsultantPool, EscalationRule, RoutingEngine, RuleSet, RulesError};
pub use service::{ClassifiedText, TriageOutcome, TriageService, TriageServiceError};
