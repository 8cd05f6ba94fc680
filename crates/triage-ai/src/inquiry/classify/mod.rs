//! Predictors and the host that owns them.
//!
//! Each modality is a capability with a single predict operation. The host
//! selects between a learned backend (injected, loaded lazily, at most once
//! per process) and the built-in rule-based backend, and performs the
//! permanent per-process fallback when a learned backend dies.

mod category;
mod sentiment;
mod urgency;

pub use category::KeywordCategoryScorer;
pub use sentiment::LexiconSentimentScorer;
pub use urgency::UrgencyRules;

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::config::{BackendMode, TriageConfig};
use crate::inquiry::domain::{Category, Sentiment, Urgency};
use crate::inquiry::intake::CanonicalText;

/// Category output: the winning label plus the full score distribution.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryPrediction {
    pub category: Category,
    pub confidence: f64,
    pub scores: BTreeMap<Category, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SentimentPrediction {
    pub sentiment: Sentiment,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UrgencyPrediction {
    pub urgency: Urgency,
    pub confidence: f64,
}

/// Combined output of the three predictors for one inquiry.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionTriple {
    pub category: CategoryPrediction,
    pub sentiment: SentimentPrediction,
    pub urgency: UrgencyPrediction,
}

/// Internal failure signal raised by a learned backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("inference failed: {0}")]
    Inference(String),
}

/// Surfaced when a modality has no usable backend and fallback is disabled.
#[derive(Debug, thiserror::Error)]
pub enum ClassificationError {
    #[error("no usable {modality} backend: {reason}")]
    BackendUnavailable {
        modality: &'static str,
        reason: String,
    },
}

/// Learned category classifier capability.
pub trait CategoryBackend: Send + Sync {
    fn identifier(&self) -> &str;
    fn classify(&self, text: &CanonicalText) -> Result<CategoryPrediction, BackendError>;
}

/// Learned sentiment analyzer capability.
pub trait SentimentBackend: Send + Sync {
    fn identifier(&self) -> &str;
    fn analyze(&self, text: &CanonicalText) -> Result<SentimentPrediction, BackendError>;
}

/// Deferred constructor for a learned backend. Invoked at most once per
/// process, on first use; loading is where the heavy model weights come in.
pub type CategoryLoader =
    Box<dyn Fn() -> Result<Box<dyn CategoryBackend>, BackendError> + Send + Sync>;
pub type SentimentLoader =
    Box<dyn Fn() -> Result<Box<dyn SentimentBackend>, BackendError> + Send + Sync>;

/// Learned backends supplied by the embedding application, if any.
#[derive(Default)]
pub struct LearnedBackends {
    pub category: Option<CategoryLoader>,
    pub sentiment: Option<SentimentLoader>,
}

/// Record of a permanent learned→rule-based switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackEvent {
    pub modality: &'static str,
    pub reason: String,
}

enum CategoryState {
    Unresolved(CategoryLoader),
    Learned(Box<dyn CategoryBackend>),
    RuleBased,
    Dead(String),
}

enum SentimentState {
    Unresolved(SentimentLoader),
    Learned(Box<dyn SentimentBackend>),
    RuleBased,
    Dead(String),
}

/// Owns the three predictors and the backend selection policy.
///
/// Rule-based scorers are immutable and shared freely. Learned backends are
/// called behind a per-modality mutex, which also coalesces concurrent
/// first-use loads behind a single initialization.
pub struct PredictorHost {
    mode: BackendMode,
    category_state: Mutex<CategoryState>,
    sentiment_state: Mutex<SentimentState>,
    keyword_category: KeywordCategoryScorer,
    lexicon_sentiment: LexiconSentimentScorer,
    urgency: UrgencyRules,
    fallbacks: Mutex<Vec<FallbackEvent>>,
}

impl PredictorHost {
    pub fn new(config: &TriageConfig, learned: LearnedBackends) -> Self {
        let learned_capable = match config.backend_mode {
            BackendMode::Force => false,
            BackendMode::Off => true,
            BackendMode::Auto => {
                let capable = host_can_run_learned(config.learned_memory_threshold_bytes);
                if !capable {
                    tracing::info!(
                        threshold_bytes = config.learned_memory_threshold_bytes,
                        "available memory below threshold, pinning rule-based backends"
                    );
                }
                capable
            }
        };

        let category_state = match (learned_capable, learned.category) {
            (true, Some(loader)) => CategoryState::Unresolved(loader),
            (true, None) if config.backend_mode == BackendMode::Off => {
                CategoryState::Dead("no learned category backend configured".to_string())
            }
            _ => CategoryState::RuleBased,
        };
        let sentiment_state = match (learned_capable, learned.sentiment) {
            (true, Some(loader)) => SentimentState::Unresolved(loader),
            (true, None) if config.backend_mode == BackendMode::Off => {
                SentimentState::Dead("no learned sentiment backend configured".to_string())
            }
            _ => SentimentState::RuleBased,
        };

        Self {
            mode: config.backend_mode,
            category_state: Mutex::new(category_state),
            sentiment_state: Mutex::new(sentiment_state),
            keyword_category: KeywordCategoryScorer,
            lexicon_sentiment: LexiconSentimentScorer,
            urgency: UrgencyRules,
            fallbacks: Mutex::new(Vec::new()),
        }
    }

    /// Rule-based host with no learned capabilities attached.
    pub fn rule_based() -> Self {
        let config = TriageConfig {
            backend_mode: BackendMode::Force,
            ..TriageConfig::default()
        };
        Self::new(&config, LearnedBackends::default())
    }

    /// Classify one canonical text along all three axes.
    pub fn predict(&self, text: &CanonicalText) -> Result<PredictionTriple, ClassificationError> {
        let category = self.predict_category(text)?;
        let sentiment = self.predict_sentiment(text)?;
        let urgency = self.urgency.predict(text);
        Ok(PredictionTriple {
            category,
            sentiment,
            urgency,
        })
    }

    /// True when no learned backend can currently serve predictions, meaning
    /// per-item inference is cheap.
    pub fn is_rule_based(&self) -> bool {
        let category = matches!(
            *self.category_state.lock().expect("category state poisoned"),
            CategoryState::RuleBased
        );
        let sentiment = matches!(
            *self
                .sentiment_state
                .lock()
                .expect("sentiment state poisoned"),
            SentimentState::RuleBased
        );
        category && sentiment
    }

    /// Opaque string naming the predictor versions currently in effect.
    pub fn model_identifier(&self) -> String {
        let category = match &*self.category_state.lock().expect("category state poisoned") {
            CategoryState::Learned(backend) => backend.identifier().to_string(),
            CategoryState::Unresolved(_) => "learned-pending".to_string(),
            CategoryState::RuleBased => KeywordCategoryScorer::IDENTIFIER.to_string(),
            CategoryState::Dead(_) => "unavailable".to_string(),
        };
        let sentiment = match &*self
            .sentiment_state
            .lock()
            .expect("sentiment state poisoned")
        {
            SentimentState::Learned(backend) => backend.identifier().to_string(),
            SentimentState::Unresolved(_) => "learned-pending".to_string(),
            SentimentState::RuleBased => LexiconSentimentScorer::IDENTIFIER.to_string(),
            SentimentState::Dead(_) => "unavailable".to_string(),
        };
        format!(
            "category={category};sentiment={sentiment};urgency={}",
            UrgencyRules::IDENTIFIER
        )
    }

    /// Fallback activations recorded since construction.
    pub fn fallback_events(&self) -> Vec<FallbackEvent> {
        self.fallbacks.lock().expect("fallback log poisoned").clone()
    }

    fn predict_category(
        &self,
        text: &CanonicalText,
    ) -> Result<CategoryPrediction, ClassificationError> {
        {
            let mut state = self.category_state.lock().expect("category state poisoned");
            loop {
                match &mut *state {
                    CategoryState::Unresolved(loader) => match loader() {
                        Ok(backend) => *state = CategoryState::Learned(backend),
                        Err(err) if self.mode == BackendMode::Off => {
                            let reason = err.to_string();
                            *state = CategoryState::Dead(reason.clone());
                            return Err(ClassificationError::BackendUnavailable {
                                modality: "category",
                                reason,
                            });
                        }
                        Err(err) => {
                            self.record_fallback("category", &err);
                            *state = CategoryState::RuleBased;
                        }
                    },
                    CategoryState::Learned(backend) => match backend.classify(text) {
                        Ok(prediction) => return Ok(prediction),
                        Err(err) if self.mode == BackendMode::Off => {
                            return Err(ClassificationError::BackendUnavailable {
                                modality: "category",
                                reason: err.to_string(),
                            });
                        }
                        Err(err) => {
                            self.record_fallback("category", &err);
                            *state = CategoryState::RuleBased;
                        }
                    },
                    CategoryState::RuleBased => break,
                    CategoryState::Dead(reason) => {
                        return Err(ClassificationError::BackendUnavailable {
                            modality: "category",
                            reason: reason.clone(),
                        });
                    }
                }
            }
        }

        Ok(self.keyword_category.classify(text))
    }

    fn predict_sentiment(
        &self,
        text: &CanonicalText,
    ) -> Result<SentimentPrediction, ClassificationError> {
        {
            let mut state = self
                .sentiment_state
                .lock()
                .expect("sentiment state poisoned");
            loop {
                match &mut *state {
                    SentimentState::Unresolved(loader) => match loader() {
                        Ok(backend) => *state = SentimentState::Learned(backend),
                        Err(err) if self.mode == BackendMode::Off => {
                            let reason = err.to_string();
                            *state = SentimentState::Dead(reason.clone());
                            return Err(ClassificationError::BackendUnavailable {
                                modality: "sentiment",
                                reason,
                            });
                        }
                        Err(err) => {
                            self.record_fallback("sentiment", &err);
                            *state = SentimentState::RuleBased;
                        }
                    },
                    SentimentState::Learned(backend) => match backend.analyze(text) {
                        Ok(prediction) => return Ok(prediction),
                        Err(err) if self.mode == BackendMode::Off => {
                            return Err(ClassificationError::BackendUnavailable {
                                modality: "sentiment",
                                reason: err.to_string(),
                            });
                        }
                        Err(err) => {
                            self.record_fallback("sentiment", &err);
                            *state = SentimentState::RuleBased;
                        }
                    },
                    SentimentState::RuleBased => break,
                    SentimentState::Dead(reason) => {
                        return Err(ClassificationError::BackendUnavailable {
                            modality: "sentiment",
                            reason: reason.clone(),
                        });
                    }
                }
            }
        }

        Ok(self.lexicon_sentiment.analyze(text))
    }

    fn record_fallback(&self, modality: &'static str, err: &BackendError) {
        let reason = err.to_string();
        tracing::warn!(modality, %reason, "learned backend failed, switching to rule-based");
        metrics::counter!("predictor_fallback_activated_total", "modality" => modality)
            .increment(1);
        self.fallbacks
            .lock()
            .expect("fallback log poisoned")
            .push(FallbackEvent { modality, reason });
    }
}

/// Probe whether this host has enough resident memory for learned inference.
/// Unknown platforms are assumed capable.
fn host_can_run_learned(threshold_bytes: u64) -> bool {
    match available_memory_bytes() {
        Some(bytes) => bytes >= threshold_bytes,
        None => true,
    }
}

fn available_memory_bytes() -> Option<u64> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    parse_mem_available(&meminfo)
}

fn parse_mem_available(meminfo: &str) -> Option<u64> {
    meminfo
        .lines()
        .find(|line| line.starts_with("MemAvailable:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|value| value.parse::<u64>().ok())
        .map(|kib| kib * 1024)
}
