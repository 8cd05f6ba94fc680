use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use clap::Args;
use triage_ai::config::TriageConfig;
use triage_ai::error::AppError;
use triage_ai::inquiry::{
    DrainOptions, Inquiry, InquiryId, InquiryRepository, InquirySubmission, TriageService,
    TriageServiceError,
};
use triage_ai::storage::SqliteInquiryRepository;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Consultant assignment strategy for the demo run
    #[arg(long)]
    pub(crate) assignment_strategy: Option<String>,
    /// Skip the batch drain portion of the demo
    #[arg(long)]
    pub(crate) skip_drain: bool,
}

const SAMPLES: &[(&str, &str)] = &[
    (
        "URGENT: Cannot login",
        "I have been trying to log in for the past hour but keep getting an authentication \
         error. This is blocking my work. Please help ASAP!",
    ),
    (
        "Incorrect charge",
        "I was charged twice for my subscription this month. I need a refund for the \
         duplicate charge of $99.99.",
    ),
    (
        "Thank you!",
        "I just wanted to say thank you for the amazing customer service. The team was \
         incredibly helpful!",
    ),
    (
        "Demo request",
        "I would like to schedule a demo of your enterprise product for my team next week.",
    ),
];

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let mut config = TriageConfig::default();
    if let Some(strategy) = &args.assignment_strategy {
        config.assignment_strategy = strategy.parse().map_err(AppError::Config)?;
    }

    let repository = Arc::new(
        SqliteInquiryRepository::in_memory(config.max_processing_attempts)
            .map_err(TriageServiceError::Repository)?,
    );
    let service = TriageService::new(repository.clone(), config)?;

    println!("=================================================");
    println!("           Inquiry Triage Pipeline Demo");
    println!("=================================================");
    println!();
    println!("-- Synchronous submissions --");

    for (subject, body) in SAMPLES {
        let outcome = service.classify_and_route(InquirySubmission {
            subject: (*subject).to_string(),
            body: (*body).to_string(),
            sender_email: "demo@example.com".to_string(),
            sender_name: Some("Demo Sender".to_string()),
            metadata: BTreeMap::new(),
        })?;

        println!();
        println!("subject:    {subject}");
        println!(
            "classified: {} ({:.0}%), {} sentiment, {} urgency",
            outcome.prediction.category.label(),
            outcome.prediction.category_confidence * 100.0,
            outcome.prediction.sentiment.label(),
            outcome.prediction.urgency.label(),
        );
        println!(
            "routed:     {} / {} (priority {}, escalated: {})",
            outcome.decision.department.label(),
            outcome.decision.consultant.as_deref().unwrap_or("unassigned"),
            outcome.decision.priority_score,
            outcome.decision.escalated,
        );
    }

    if !args.skip_drain {
        println!();
        println!("-- Batch drain --");
        for (index, (subject, body)) in SAMPLES.iter().enumerate() {
            let inquiry = Inquiry {
                id: InquiryId::generate(),
                subject: (*subject).to_string(),
                body: (*body).to_string(),
                sender_email: "backlog@example.com".to_string(),
                sender_name: None,
                metadata: BTreeMap::new(),
                received_at: Utc::now() - Duration::minutes(index as i64 + 1),
                processed: false,
                processing_attempts: 0,
                last_error: None,
                poisoned: false,
            };
            repository
                .insert(inquiry)
                .map_err(TriageServiceError::Repository)?;
        }

        let report = service.drain_unprocessed(DrainOptions::default())?;
        println!("first drain:  {report}");
        let repeat = service.drain_unprocessed(DrainOptions::default())?;
        println!("second drain: {repeat} (idempotent)");
    }

    println!();
    let statistics = service.statistics(7)?;
    println!(
        "totals: {} received, {} processed, escalation rate {:.0}%",
        statistics.total,
        statistics.processed,
        statistics.escalation_rate * 100.0
    );

    Ok(())
}
