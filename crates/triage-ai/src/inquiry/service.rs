use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;

use crate::config::TriageConfig;

use super::classify::{
    ClassificationError, LearnedBackends, PredictionTriple, PredictorHost,
};
use super::domain::{
    Category, Inquiry, InquiryDetails, InquiryId, InquirySubmission, Prediction, RoutingDecision,
    Sentiment, TriageStatistics, Urgency,
};
use super::intake::{canonicalize, CanonicalText, IntakeError, IntakeGuard};
use super::repository::{InquiryRepository, RepositoryError};
use super::routing::{ConsultantPool, RoutingEngine, RuleSet, RulesError};

/// Result of the synchronous submit path: the stored inquiry plus both
/// persisted triage records.
#[derive(Debug, Clone)]
pub struct TriageOutcome {
    pub inquiry: Inquiry,
    pub prediction: Prediction,
    pub decision: RoutingDecision,
}

/// Prediction-shaped classification of free text, never persisted.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ClassifiedText {
    pub category: Category,
    pub category_confidence: f64,
    pub sentiment: Sentiment,
    pub sentiment_confidence: f64,
    pub urgency: Urgency,
    pub urgency_confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_scores: Option<BTreeMap<String, f64>>,
}

/// Error raised by the triage service facade.
#[derive(Debug, thiserror::Error)]
pub enum TriageServiceError {
    #[error(transparent)]
    Intake(#[from] IntakeError),
    #[error(transparent)]
    Classification(#[from] ClassificationError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Rules(#[from] RulesError),
}

impl TriageServiceError {
    /// Stable machine-readable code for the HTTP boundary.
    pub fn code(&self) -> &'static str {
        match self {
            TriageServiceError::Intake(_) => "invalid_input",
            TriageServiceError::Classification(_) => "classification_error",
            TriageServiceError::Repository(RepositoryError::Conflict) => "conflict",
            TriageServiceError::Repository(RepositoryError::NotFound) => "not_found",
            TriageServiceError::Repository(_) => "persistence_failure",
            TriageServiceError::Rules(_) => "rules_error",
        }
    }
}

/// Facade composing the intake guard, predictor host, routing engine, and
/// repository.
pub struct TriageService<R> {
    repository: Arc<R>,
    guard: IntakeGuard,
    host: PredictorHost,
    engine: RoutingEngine,
    config: TriageConfig,
}

impl<R> TriageService<R>
where
    R: InquiryRepository + 'static,
{
    /// Build a service from configuration, with no learned backends attached.
    pub fn new(repository: Arc<R>, config: TriageConfig) -> Result<Self, TriageServiceError> {
        Self::with_learned(repository, config, LearnedBackends::default())
    }

    /// Build a service wiring in learned predictor capabilities.
    pub fn with_learned(
        repository: Arc<R>,
        config: TriageConfig,
        learned: LearnedBackends,
    ) -> Result<Self, TriageServiceError> {
        let rules = match &config.routing_rules_path {
            Some(path) => RuleSet::from_path(path)?,
            None => RuleSet::builtin(),
        };
        let host = PredictorHost::new(&config, learned);
        let engine = RoutingEngine::new(
            rules,
            ConsultantPool::default_roster(),
            config.assignment_strategy,
            config.sla.clone(),
        );
        Ok(Self::assemble(repository, host, engine, config))
    }

    /// Assemble from explicit parts. Used by tests and by callers that need a
    /// custom pool or rule set.
    pub fn assemble(
        repository: Arc<R>,
        host: PredictorHost,
        engine: RoutingEngine,
        config: TriageConfig,
    ) -> Self {
        Self {
            repository,
            guard: IntakeGuard,
            host,
            engine,
            config,
        }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    pub fn host(&self) -> &PredictorHost {
        &self.host
    }

    pub(super) fn config(&self) -> &TriageConfig {
        &self.config
    }

    /// Synchronous path: validate, persist the inquiry, classify, route, and
    /// record both results atomically.
    ///
    /// If classification or routing fails after the inquiry was stored, the
    /// inquiry remains persisted with `processed = false` so a later drain
    /// picks it up; a half-written result is never observable.
    pub fn classify_and_route(
        &self,
        submission: InquirySubmission,
    ) -> Result<TriageOutcome, TriageServiceError> {
        metrics::counter!("inquiries_received_total", "path" => "submit").increment(1);
        let started = std::time::Instant::now();

        let (inquiry, canonical) = self.guard.admit(submission, Utc::now())?;
        let inquiry = self.repository.insert(inquiry)?;

        let (prediction, decision) = self.triage_canonical(inquiry.id, &canonical)?;
        match self
            .repository
            .record_result(&inquiry.id, &prediction, &decision)
        {
            // A concurrent drain already recorded this inquiry; the stored
            // result is authoritative and equivalent.
            Ok(()) | Err(RepositoryError::Conflict) => {}
            Err(err) => return Err(err.into()),
        }

        metrics::histogram!("inquiry_processing_duration_seconds", "path" => "submit")
            .record(started.elapsed().as_secs_f64());
        metrics::counter!("inquiries_processed_total", "outcome" => "success").increment(1);

        let inquiry = Inquiry {
            processed: true,
            ..inquiry
        };
        Ok(TriageOutcome {
            inquiry,
            prediction,
            decision,
        })
    }

    /// Classify free text without persisting anything.
    pub fn classify_text(
        &self,
        text: &str,
        include_all_scores: bool,
    ) -> Result<ClassifiedText, TriageServiceError> {
        let canonical = canonicalize("", text)?;
        let triple = self.host.predict(&canonical)?;

        let category_scores = include_all_scores.then(|| {
            triple
                .category
                .scores
                .iter()
                .map(|(category, score)| (category.label().to_string(), *score))
                .collect()
        });

        Ok(ClassifiedText {
            category: triple.category.category,
            category_confidence: triple.category.confidence,
            sentiment: triple.sentiment.sentiment,
            sentiment_confidence: triple.sentiment.confidence,
            urgency: triple.urgency.urgency,
            urgency_confidence: triple.urgency.confidence,
            category_scores,
        })
    }

    /// Combined view of an inquiry and its triage results.
    pub fn find_inquiry(
        &self,
        inquiry_id: &InquiryId,
    ) -> Result<Option<InquiryDetails>, TriageServiceError> {
        Ok(self.repository.find(inquiry_id)?)
    }

    /// Pipeline statistics over the trailing `days` window.
    pub fn statistics(&self, days: i64) -> Result<TriageStatistics, TriageServiceError> {
        Ok(self.repository.statistics(chrono::Duration::days(days))?)
    }

    /// Run classification and routing over canonical text, producing the two
    /// records to persist. Shared by the submit path and the drain loop.
    pub(super) fn triage_canonical(
        &self,
        inquiry_id: InquiryId,
        canonical: &CanonicalText,
    ) -> Result<(Prediction, RoutingDecision), TriageServiceError> {
        let triple = self.host.predict(canonical)?;
        let now = Utc::now();
        let prediction = self.build_prediction(inquiry_id, &triple, now);
        let decision = self.engine.route(inquiry_id, &triple, now);
        Ok((prediction, decision))
    }

    fn build_prediction(
        &self,
        inquiry_id: InquiryId,
        triple: &PredictionTriple,
        classified_at: chrono::DateTime<Utc>,
    ) -> Prediction {
        Prediction {
            inquiry_id,
            category: triple.category.category,
            category_confidence: triple.category.confidence,
            sentiment: triple.sentiment.sentiment,
            sentiment_confidence: triple.sentiment.confidence,
            urgency: triple.urgency.urgency,
            urgency_confidence: triple.urgency.confidence,
            model_identifier: self.host.model_identifier(),
            classified_at,
        }
    }
}
