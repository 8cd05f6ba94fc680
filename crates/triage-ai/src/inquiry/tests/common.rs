use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

use crate::config::TriageConfig;
use crate::inquiry::domain::{
    Inquiry, InquiryDetails, InquiryId, InquirySubmission, Prediction, RoutingDecision,
    TriageStatistics,
};
use crate::inquiry::repository::{
    DrainBatch, FailureDisposition, InquiryRepository, RepositoryError,
};
use crate::inquiry::service::TriageService;

#[derive(Debug, Clone)]
struct StoredInquiry {
    inquiry: Inquiry,
    prediction: Option<Prediction>,
    decision: Option<RoutingDecision>,
    claimed_until: Option<DateTime<Utc>>,
}

/// In-memory repository so service and drain behavior can be exercised in
/// isolation.
pub(super) struct MemoryRepository {
    records: Mutex<HashMap<InquiryId, StoredInquiry>>,
    max_attempts: u32,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            max_attempts: 5,
        }
    }
}

impl MemoryRepository {
    pub(super) fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            max_attempts,
        }
    }

    pub(super) fn result_count(&self) -> usize {
        self.records
            .lock()
            .expect("repository mutex poisoned")
            .values()
            .filter(|record| record.prediction.is_some())
            .count()
    }

    pub(super) fn stored(&self, id: &InquiryId) -> Option<Inquiry> {
        self.records
            .lock()
            .expect("repository mutex poisoned")
            .get(id)
            .map(|record| record.inquiry.clone())
    }

    pub(super) fn len(&self) -> usize {
        self.records.lock().expect("repository mutex poisoned").len()
    }
}

impl InquiryRepository for MemoryRepository {
    fn insert(&self, inquiry: Inquiry) -> Result<Inquiry, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&inquiry.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(
            inquiry.id,
            StoredInquiry {
                inquiry: inquiry.clone(),
                prediction: None,
                decision: None,
                claimed_until: None,
            },
        );
        Ok(inquiry)
    }

    fn fetch_unprocessed(
        &self,
        limit: usize,
        lease: Duration,
        exclude: &HashSet<InquiryId>,
    ) -> Result<DrainBatch, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        let now = Utc::now();

        let mut skipped_in_flight = 0;
        let mut eligible: Vec<InquiryId> = Vec::new();
        for record in guard.values() {
            if record.inquiry.processed || record.inquiry.poisoned {
                continue;
            }
            match record.claimed_until {
                Some(until) if until > now => skipped_in_flight += 1,
                _ if exclude.contains(&record.inquiry.id) => {}
                _ => eligible.push(record.inquiry.id),
            }
        }

        eligible.sort_by_key(|id| guard[id].inquiry.received_at);
        eligible.truncate(limit);

        let mut inquiries = Vec::with_capacity(eligible.len());
        for id in eligible {
            let record = guard.get_mut(&id).expect("eligible id present");
            record.claimed_until = Some(now + lease);
            inquiries.push(record.inquiry.clone());
        }

        Ok(DrainBatch {
            inquiries,
            skipped_in_flight,
        })
    }

    fn record_result(
        &self,
        inquiry_id: &InquiryId,
        prediction: &Prediction,
        decision: &RoutingDecision,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        let record = guard.get_mut(inquiry_id).ok_or(RepositoryError::NotFound)?;
        if record.inquiry.processed {
            return Err(RepositoryError::Conflict);
        }
        record.prediction = Some(prediction.clone());
        record.decision = Some(decision.clone());
        record.inquiry.processed = true;
        record.inquiry.last_error = None;
        record.claimed_until = None;
        Ok(())
    }

    fn record_failure(
        &self,
        inquiry_id: &InquiryId,
        reason: &str,
    ) -> Result<FailureDisposition, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        let record = guard.get_mut(inquiry_id).ok_or(RepositoryError::NotFound)?;
        record.inquiry.processing_attempts += 1;
        record.inquiry.last_error = Some(reason.to_string());
        record.claimed_until = None;
        let attempts = record.inquiry.processing_attempts;
        if attempts > self.max_attempts {
            record.inquiry.poisoned = true;
            Ok(FailureDisposition::Poisoned { attempts })
        } else {
            Ok(FailureDisposition::Retained { attempts })
        }
    }

    fn find(&self, inquiry_id: &InquiryId) -> Result<Option<InquiryDetails>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(inquiry_id).map(|record| InquiryDetails {
            inquiry: record.inquiry.clone(),
            prediction: record.prediction.clone(),
            decision: record.decision.clone(),
        }))
    }

    fn statistics(&self, window: Duration) -> Result<TriageStatistics, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        let cutoff = Utc::now() - window;

        let mut statistics = TriageStatistics::default();
        for record in guard.values() {
            if record.inquiry.received_at < cutoff {
                continue;
            }
            statistics.total += 1;
            if record.inquiry.processed {
                statistics.processed += 1;
            }
            if let Some(prediction) = &record.prediction {
                *statistics
                    .per_category
                    .entry(prediction.category.label().to_string())
                    .or_default() += 1;
            }
            if let Some(decision) = &record.decision {
                *statistics
                    .per_department
                    .entry(decision.department.label().to_string())
                    .or_default() += 1;
                if decision.escalated {
                    statistics.escalated += 1;
                }
            }
        }
        if statistics.total > 0 {
            statistics.escalation_rate = statistics.escalated as f64 / statistics.total as f64;
        }
        Ok(statistics)
    }
}

/// Wraps a repository and fails every `record_result` while the switch is on.
pub(super) struct FlakyRepository {
    inner: MemoryRepository,
    fail_results: AtomicBool,
}

impl FlakyRepository {
    pub(super) fn new(max_attempts: u32) -> Self {
        Self {
            inner: MemoryRepository::with_max_attempts(max_attempts),
            fail_results: AtomicBool::new(true),
        }
    }

    pub(super) fn heal(&self) {
        self.fail_results.store(false, Ordering::SeqCst);
    }

    pub(super) fn inner(&self) -> &MemoryRepository {
        &self.inner
    }
}

impl InquiryRepository for FlakyRepository {
    fn insert(&self, inquiry: Inquiry) -> Result<Inquiry, RepositoryError> {
        self.inner.insert(inquiry)
    }

    fn fetch_unprocessed(
        &self,
        limit: usize,
        lease: Duration,
        exclude: &HashSet<InquiryId>,
    ) -> Result<DrainBatch, RepositoryError> {
        self.inner.fetch_unprocessed(limit, lease, exclude)
    }

    fn record_result(
        &self,
        inquiry_id: &InquiryId,
        prediction: &Prediction,
        decision: &RoutingDecision,
    ) -> Result<(), RepositoryError> {
        if self.fail_results.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("database offline".to_string()));
        }
        self.inner.record_result(inquiry_id, prediction, decision)
    }

    fn record_failure(
        &self,
        inquiry_id: &InquiryId,
        reason: &str,
    ) -> Result<FailureDisposition, RepositoryError> {
        self.inner.record_failure(inquiry_id, reason)
    }

    fn find(&self, inquiry_id: &InquiryId) -> Result<Option<InquiryDetails>, RepositoryError> {
        self.inner.find(inquiry_id)
    }

    fn statistics(&self, window: Duration) -> Result<TriageStatistics, RepositoryError> {
        self.inner.statistics(window)
    }
}

pub(super) fn submission(subject: &str, body: &str) -> InquirySubmission {
    InquirySubmission {
        subject: subject.to_string(),
        body: body.to_string(),
        sender_email: "customer@example.com".to_string(),
        sender_name: Some("Pat Customer".to_string()),
        metadata: BTreeMap::new(),
    }
}

pub(super) fn billing_submission() -> InquirySubmission {
    submission(
        "Incorrect charge",
        "I was charged twice for my subscription this month. I need a refund for the \
         duplicate charge of $99.99.",
    )
}

pub(super) fn critical_submission() -> InquirySubmission {
    submission(
        "URGENT: Cannot login",
        "I have been trying to log in for the past hour but keep getting an authentication \
         error. This is blocking my work. Please help ASAP!",
    )
}

pub(super) fn test_config() -> TriageConfig {
    TriageConfig {
        backend_mode: crate::config::BackendMode::Force,
        ..TriageConfig::default()
    }
}

pub(super) fn build_service() -> (Arc<TriageService<MemoryRepository>>, Arc<MemoryRepository>) {
    let repository = Arc::new(MemoryRepository::default());
    let service = TriageService::new(repository.clone(), test_config())
        .expect("service builds with builtin rules");
    (Arc::new(service), repository)
}

pub(super) fn seed_unprocessed(
    repository: &MemoryRepository,
    subject: &str,
    body: &str,
    received_at: DateTime<Utc>,
) -> InquiryId {
    let inquiry = Inquiry {
        id: InquiryId::generate(),
        subject: subject.to_string(),
        body: body.to_string(),
        sender_email: "batch@example.com".to_string(),
        sender_name: None,
        metadata: BTreeMap::new(),
        received_at,
        processed: false,
        processing_attempts: 0,
        last_error: None,
        poisoned: false,
    };
    repository.insert(inquiry).expect("seed insert").id
}
