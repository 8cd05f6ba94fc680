use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Mutex;
use std::time::Instant;

use super::domain::Inquiry;
use super::intake::canonicalize;
use super::repository::{FailureDisposition, InquiryRepository, RepositoryError};
use super::service::{TriageService, TriageServiceError};

/// How many inquiries one fetch pulls when the caller does not say.
const DEFAULT_BATCH_SIZE: usize = 50;

/// Caller-facing knobs for one drain invocation. Unset fields fall back to
/// the configured, mode-dependent defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct DrainOptions {
    pub limit: Option<usize>,
    pub batch_size: Option<usize>,
}

/// Summary of one drain invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub fetched: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped_in_flight: u64,
    pub poisoned: u64,
    pub elapsed: std::time::Duration,
}

impl fmt::Display for DrainReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fetched {} succeeded {} failed {} skipped {} poisoned {} in {:.2}s",
            self.fetched,
            self.succeeded,
            self.failed,
            self.skipped_in_flight,
            self.poisoned,
            self.elapsed.as_secs_f64()
        )
    }
}

#[derive(Default)]
struct Tally {
    succeeded: u64,
    failed: u64,
    poisoned: u64,
}

impl<R> TriageService<R>
where
    R: InquiryRepository + 'static,
{
    /// Drain unprocessed inquiries from storage through the triage pipeline.
    ///
    /// One invocation fetches claim-locked batches until the backlog is
    /// empty, the fetch ceiling is reached, or the soft deadline passes.
    /// Per-inquiry failures are recorded and counted; they never abort the
    /// invocation. Re-running against an unchanged backlog is a no-op.
    pub fn drain_unprocessed(
        &self,
        options: DrainOptions,
    ) -> Result<DrainReport, TriageServiceError> {
        let started = Instant::now();
        let soft_deadline = started + self.config().drain_soft_deadline;

        let limit = options.limit.or_else(|| {
            if self.host().is_rule_based() {
                self.config().batch_limit_rule_based
            } else {
                Some(self.config().batch_limit_learned)
            }
        });
        let batch_size = options.batch_size.unwrap_or(DEFAULT_BATCH_SIZE).max(1);
        let lease = chrono::Duration::from_std(self.config().per_inquiry_timeout * 2)
            .unwrap_or_else(|_| chrono::Duration::seconds(60));
        let workers = self.config().drain_worker_count.max(1);

        let mut report = DrainReport::default();
        // The invocation owns the in-flight set: an inquiry whose claim was
        // released by a failure must not be retried until the next tick.
        let mut attempted: HashSet<super::domain::InquiryId> = HashSet::new();

        loop {
            if Instant::now() >= soft_deadline {
                tracing::warn!(
                    fetched = report.fetched,
                    "drain soft deadline reached, leaving remaining backlog for the next tick"
                );
                break;
            }

            let remaining = match limit {
                Some(ceiling) => ceiling.saturating_sub(report.fetched as usize),
                None => usize::MAX,
            };
            let take = remaining.min(batch_size);
            if take == 0 {
                break;
            }

            let batch = self.repository().fetch_unprocessed(take, lease, &attempted)?;
            report.skipped_in_flight += batch.skipped_in_flight;
            let fresh: Vec<Inquiry> = batch
                .inquiries
                .into_iter()
                .filter(|inquiry| attempted.insert(inquiry.id))
                .collect();
            if fresh.is_empty() {
                break;
            }

            let fetched = fresh.len() as u64;
            report.fetched += fetched;
            metrics::counter!("drain_fetched_total").increment(fetched);

            let queue = Mutex::new(VecDeque::from(fresh));
            let tally = Mutex::new(Tally::default());

            std::thread::scope(|scope| {
                for _ in 0..workers {
                    scope.spawn(|| self.drain_worker(&queue, &tally));
                }
            });

            let tally = tally.into_inner().expect("drain tally poisoned");
            report.succeeded += tally.succeeded;
            report.failed += tally.failed;
            report.poisoned += tally.poisoned;
        }

        if report.skipped_in_flight > 0 {
            metrics::counter!("drain_skipped_inflight_total")
                .increment(report.skipped_in_flight);
        }

        report.elapsed = started.elapsed();
        tracing::info!(
            fetched = report.fetched,
            succeeded = report.succeeded,
            failed = report.failed,
            skipped_in_flight = report.skipped_in_flight,
            poisoned = report.poisoned,
            "drain invocation finished"
        );
        Ok(report)
    }

    fn drain_worker(&self, queue: &Mutex<VecDeque<Inquiry>>, tally: &Mutex<Tally>) {
        loop {
            let next = queue.lock().expect("drain queue poisoned").pop_front();
            let Some(inquiry) = next else {
                return;
            };

            let started = Instant::now();
            let deadline = started + self.config().per_inquiry_timeout;
            let outcome = self.process_claimed(&inquiry, deadline);
            metrics::histogram!("inquiry_processing_duration_seconds", "path" => "drain")
                .record(started.elapsed().as_secs_f64());

            let mut tally = tally.lock().expect("drain tally poisoned");
            match outcome {
                Ok(()) => {
                    metrics::counter!("drain_succeeded_total").increment(1);
                    tally.succeeded += 1;
                }
                Err(reason) => {
                    metrics::counter!("drain_failed_total").increment(1);
                    tracing::warn!(inquiry_id = %inquiry.id, %reason, "inquiry processing failed");
                    tally.failed += 1;
                    match self.repository().record_failure(&inquiry.id, &reason) {
                        Ok(FailureDisposition::Poisoned { attempts }) => {
                            metrics::counter!("drain_poisoned_total").increment(1);
                            tracing::warn!(
                                inquiry_id = %inquiry.id,
                                attempts,
                                "inquiry quarantined after exhausting attempts"
                            );
                            tally.poisoned += 1;
                        }
                        Ok(FailureDisposition::Retained { .. }) => {}
                        Err(err) => {
                            tracing::error!(
                                inquiry_id = %inquiry.id,
                                error = %err,
                                "failed to record processing failure"
                            );
                        }
                    }
                }
            }
        }
    }

    /// Process one claimed inquiry under a wall-clock deadline.
    ///
    /// The deadline is checked at each stage boundary; an expired inquiry is
    /// abandoned before any write so partial state never lands.
    fn process_claimed(&self, inquiry: &Inquiry, deadline: Instant) -> Result<(), String> {
        let canonical =
            canonicalize(&inquiry.subject, &inquiry.body).map_err(|err| err.to_string())?;

        if Instant::now() >= deadline {
            return Err("deadline exceeded before classification".to_string());
        }
        let (prediction, decision) = self
            .triage_canonical(inquiry.id, &canonical)
            .map_err(|err| err.to_string())?;

        if Instant::now() >= deadline {
            return Err("deadline exceeded before recording result".to_string());
        }
        match self
            .repository()
            .record_result(&inquiry.id, &prediction, &decision)
        {
            // Another worker or the submit path won the race; the inquiry is
            // processed either way.
            Ok(()) | Err(RepositoryError::Conflict) => Ok(()),
            Err(err) => Err(err.to_string()),
        }
    }
}
