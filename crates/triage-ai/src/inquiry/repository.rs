use std::collections::HashSet;

use chrono::Duration;

use super::domain::{Inquiry, InquiryDetails, InquiryId, Prediction, RoutingDecision, TriageStatistics};

/// Result of one unprocessed fetch.
#[derive(Debug, Clone, Default)]
pub struct DrainBatch {
    /// Claimed inquiries, ordered by `received_at` ascending.
    pub inquiries: Vec<Inquiry>,
    /// Unprocessed rows skipped because another drain worker holds their
    /// claim.
    pub skipped_in_flight: u64,
}

/// Outcome of recording a processing failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// The inquiry stays eligible for future drains.
    Retained { attempts: u32 },
    /// The inquiry exceeded the attempt budget and is quarantined.
    Poisoned { attempts: u32 },
}

/// Error enumeration for storage failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("inquiry already processed")]
    Conflict,
    #[error("inquiry not found")]
    NotFound,
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Durable contract for inquiries, predictions, and routing decisions.
///
/// Implementations must make [`record_result`](Self::record_result) atomic:
/// the prediction, the routing decision, and the processed flip land together
/// or not at all, and a second write for the same inquiry fails with
/// [`RepositoryError::Conflict`].
pub trait InquiryRepository: Send + Sync {
    /// Store a new, unprocessed inquiry. Fails with `Conflict` if the id
    /// already exists.
    fn insert(&self, inquiry: Inquiry) -> Result<Inquiry, RepositoryError>;

    /// Fetch up to `limit` unprocessed, unpoisoned inquiries ordered by
    /// `received_at`, claiming each for `lease` so concurrent drains skip
    /// them. Rows in `exclude` belong to the caller's own in-flight set and
    /// are neither returned nor re-claimed.
    fn fetch_unprocessed(
        &self,
        limit: usize,
        lease: Duration,
        exclude: &HashSet<InquiryId>,
    ) -> Result<DrainBatch, RepositoryError>;

    /// Atomically write both result records and flip `processed`. Releases
    /// the drain claim.
    fn record_result(
        &self,
        inquiry_id: &InquiryId,
        prediction: &Prediction,
        decision: &RoutingDecision,
    ) -> Result<(), RepositoryError>;

    /// Count a failed processing attempt, remembering the error reason and
    /// quarantining the inquiry once it exhausts its attempt budget.
    fn record_failure(
        &self,
        inquiry_id: &InquiryId,
        reason: &str,
    ) -> Result<FailureDisposition, RepositoryError>;

    /// Read-only projection of one inquiry with its results, if any.
    fn find(&self, inquiry_id: &InquiryId) -> Result<Option<InquiryDetails>, RepositoryError>;

    /// Aggregate counts over inquiries received within the window.
    fn statistics(&self, window: Duration) -> Result<TriageStatistics, RepositoryError>;
}
