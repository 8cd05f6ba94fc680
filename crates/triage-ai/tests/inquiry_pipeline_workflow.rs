//! Integration specifications for the inquiry triage pipeline.
//!
//! Scenarios run end-to-end through the public service facade and HTTP router
//! against the SQLite repository, so classification, routing, persistence,
//! and the batch drain are validated together without reaching into private
//! modules.

mod common {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use chrono::{DateTime, Duration, Utc};

    use triage_ai::config::{BackendMode, TriageConfig};
    use triage_ai::inquiry::{
        Inquiry, InquiryId, InquirySubmission, LearnedBackends, TriageService,
    };
    use triage_ai::storage::SqliteInquiryRepository;

    pub(super) fn config() -> TriageConfig {
        TriageConfig {
            backend_mode: BackendMode::Force,
            ..TriageConfig::default()
        }
    }

    pub(super) fn auto_config() -> TriageConfig {
        TriageConfig {
            backend_mode: BackendMode::Auto,
            // A zero threshold keeps the memory probe from pinning the host
            // to rule-based backends on small CI machines.
            learned_memory_threshold_bytes: 0,
            ..TriageConfig::default()
        }
    }

    pub(super) fn build_service() -> (
        Arc<TriageService<SqliteInquiryRepository>>,
        Arc<SqliteInquiryRepository>,
    ) {
        build_service_with(config(), LearnedBackends::default())
    }

    pub(super) fn build_service_with(
        config: TriageConfig,
        learned: LearnedBackends,
    ) -> (
        Arc<TriageService<SqliteInquiryRepository>>,
        Arc<SqliteInquiryRepository>,
    ) {
        let repository = Arc::new(
            SqliteInquiryRepository::in_memory(config.max_processing_attempts)
                .expect("in-memory repository"),
        );
        let service = TriageService::with_learned(repository.clone(), config, learned)
            .expect("service builds");
        (Arc::new(service), repository)
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

    pub(super) fn seed_unprocessed(
        repository: &SqliteInquiryRepository,
        subject: &str,
        body: &str,
        received_at: DateTime<Utc>,
    ) -> InquiryId {
        use triage_ai::inquiry::InquiryRepository;

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

    pub(super) fn minutes_ago(minutes: i64) -> DateTime<Utc> {
        Utc::now() - Duration::minutes(minutes)
    }
}

mod classification {
    use super::common::*;
    use triage_ai::inquiry::{Category, Department, Sentiment, Urgency};

    #[test]
    fn technical_critical_inquiry_escalates() {
        let (service, _) = build_service();

        let outcome = service
            .classify_and_route(submission(
                "URGENT: Cannot login",
                "I have been trying to log in for the past hour but keep getting an \
                 authentication error. This is blocking my work. Please help ASAP!",
            ))
            .expect("submission succeeds");

        assert_eq!(outcome.prediction.category, Category::TechnicalSupport);
        assert_eq!(outcome.prediction.sentiment, Sentiment::Negative);
        assert_eq!(outcome.prediction.urgency, Urgency::Critical);
        assert_eq!(outcome.decision.department, Department::TechnicalSupport);
        assert!(outcome.decision.escalated);
        assert!(outcome.decision.priority_score >= 80);
    }

    #[test]
    fn billing_duplicate_charge_routes_to_finance() {
        let (service, _) = build_service();

        let outcome = service
            .classify_and_route(submission(
                "Incorrect charge",
                "I was charged twice for my subscription this month. I need a refund for \
                 the duplicate charge of $99.99.",
            ))
            .expect("submission succeeds");

        assert_eq!(outcome.prediction.category, Category::Billing);
        assert_eq!(outcome.prediction.sentiment, Sentiment::Negative);
        assert_eq!(outcome.prediction.urgency, Urgency::Medium);
        assert_eq!(outcome.decision.department, Department::Finance);
        assert!(!outcome.decision.escalated);
        assert!(
            (25..=50).contains(&outcome.decision.priority_score),
            "priority {} outside [25, 50]",
            outcome.decision.priority_score
        );
    }

    #[test]
    fn positive_feedback_scores_low() {
        let (service, _) = build_service();

        let outcome = service
            .classify_and_route(submission(
                "Thank you!",
                "I just wanted to say thank you for the amazing customer service. The team \
                 was incredibly helpful!",
            ))
            .expect("submission succeeds");

        assert!(matches!(
            outcome.prediction.category,
            Category::ProductFeedback | Category::TechnicalSupport
        ));
        assert_eq!(outcome.prediction.sentiment, Sentiment::Positive);
        assert_eq!(outcome.prediction.urgency, Urgency::Low);
        assert_eq!(
            outcome.decision.department,
            outcome.prediction.category.department()
        );
        assert!(!outcome.decision.escalated);
        assert!(outcome.decision.priority_score <= 15);
    }

    #[test]
    fn sales_demo_request_routes_to_sales() {
        let (service, _) = build_service();

        let outcome = service
            .classify_and_route(submission(
                "Demo request",
                "I would like to schedule a demo of your enterprise product for my team \
                 next week.",
            ))
            .expect("submission succeeds");

        assert_eq!(outcome.prediction.category, Category::Sales);
        assert_eq!(outcome.prediction.sentiment, Sentiment::Neutral);
        assert_eq!(outcome.prediction.urgency, Urgency::Medium);
        assert_eq!(outcome.decision.department, Department::Sales);
        assert!(!outcome.decision.escalated);
    }

    #[test]
    fn rule_based_classification_is_deterministic() {
        let classify = || {
            let (service, _) = build_service();
            service
                .classify_text("my invoice shows a duplicate charge, please refund", true)
                .expect("classification succeeds")
        };
        let first = classify();
        let second = classify();
        assert_eq!(first.category, second.category);
        assert_eq!(first.category_confidence, second.category_confidence);
        assert_eq!(first.category_scores, second.category_scores);
    }
}

mod drain {
    use super::common::*;
    use triage_ai::inquiry::{DrainOptions, InquiryRepository};

    #[test]
    fn drain_records_results_and_is_idempotent() {
        let (service, repository) = build_service();
        for index in 0..3 {
            seed_unprocessed(
                &repository,
                "Billing question",
                "I was charged twice and would like a refund",
                minutes_ago(index + 1),
            );
        }

        let first = service
            .drain_unprocessed(DrainOptions::default())
            .expect("first drain");
        assert_eq!(first.fetched, 3);
        assert_eq!(first.succeeded, 3);
        assert_eq!(first.failed, 0);

        let statistics = service.statistics(7).expect("statistics");
        assert_eq!(statistics.total, 3);
        assert_eq!(statistics.processed, 3);
        assert_eq!(statistics.per_category.values().sum::<u64>(), 3);
        assert_eq!(statistics.per_department.values().sum::<u64>(), 3);

        let second = service
            .drain_unprocessed(DrainOptions::default())
            .expect("second drain");
        assert_eq!(second.fetched, 0);
        assert_eq!(second.succeeded, 0);

        let after = service.statistics(7).expect("statistics unchanged");
        assert_eq!(after.processed, 3);
        assert_eq!(after.per_category, statistics.per_category);
    }

    #[test]
    fn drained_inquiries_expose_full_details() {
        let (service, repository) = build_service();
        let id = seed_unprocessed(
            &repository,
            "Outage report",
            "Production is down, this is an emergency",
            minutes_ago(1),
        );

        service
            .drain_unprocessed(DrainOptions::default())
            .expect("drain runs");

        let details = repository
            .find(&id)
            .expect("find")
            .expect("inquiry present");
        assert!(details.inquiry.processed);
        let prediction = details.prediction.expect("prediction recorded");
        let decision = details.decision.expect("decision recorded");
        assert_eq!(prediction.inquiry_id, id);
        assert_eq!(decision.inquiry_id, id);
        assert!(decision.escalated);
        assert!(decision.priority_score >= 80);
    }
}

mod fallback {
    use super::common::*;
    use triage_ai::inquiry::{BackendError, Category, LearnedBackends};

    #[test]
    fn learned_failure_activates_rule_based_fallback_once() {
        let attempts = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        let counter = attempts.clone();
        let learned = LearnedBackends {
            category: Some(Box::new(move || {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Err(BackendError::ModelUnavailable(
                    "model weights not present".to_string(),
                ))
            })),
            sentiment: None,
        };
        let (service, _) = build_service_with(auto_config(), learned);

        let first = service
            .classify_and_route(submission(
                "Incorrect charge",
                "I was charged twice for my subscription this month.",
            ))
            .expect("first submission classified via fallback");
        assert_eq!(first.prediction.category, Category::Billing);

        let events = service.host().fallback_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].modality, "category");

        let second = service
            .classify_and_route(submission(
                "Another charge question",
                "Please review my invoice, the payment looks wrong.",
            ))
            .expect("second submission classified");
        assert_eq!(second.prediction.category, Category::Billing);

        // The dead learned backend was only ever attempted once.
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(service.host().fallback_events().len(), 1);
        assert!(service.host().is_rule_based());
    }
}

mod http {
    use super::common::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use triage_ai::inquiry::inquiry_router;

    fn submit_request(payload: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/v1/inquiries")
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .expect("request builds")
    }

    #[tokio::test]
    async fn post_inquiry_returns_routing_summary() {
        let (service, _) = build_service();
        let router = inquiry_router(service);

        let response = router
            .oneshot(submit_request(json!({
                "subject": "Demo request",
                "body": "I would like to schedule a demo of your enterprise product next week.",
                "sender_email": "buyer@example.com",
            })))
            .await
            .expect("router dispatch");

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("body");
        let payload: Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(payload.get("category"), Some(&json!("sales")));
        assert_eq!(payload.get("department"), Some(&json!("sales")));
        assert!(payload.get("inquiry_id").is_some());
        assert!(payload.get("response_deadline").is_some());
    }

    #[tokio::test]
    async fn post_inquiry_with_bad_email_is_unprocessable() {
        let (service, _) = build_service();
        let router = inquiry_router(service);

        let response = router
            .oneshot(submit_request(json!({
                "subject": "Hello",
                "body": "world",
                "sender_email": "not-an-address",
            })))
            .await
            .expect("router dispatch");

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = to_bytes(response.into_body(), 1024).await.expect("body");
        let payload: Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(payload.get("code"), Some(&json!("invalid_input")));
    }

    #[tokio::test]
    async fn get_inquiry_round_trips_through_the_router() {
        let (service, _) = build_service();
        let outcome = service
            .classify_and_route(submission(
                "Incorrect charge",
                "I was charged twice, please refund the duplicate.",
            ))
            .expect("submission succeeds");

        let router = inquiry_router(service);
        let response = router
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri(format!("/api/v1/inquiries/{}", outcome.inquiry.id))
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("router dispatch");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("body");
        let payload: Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(
            payload.pointer("/inquiry/processed"),
            Some(&json!(true))
        );
        assert_eq!(
            payload.pointer("/prediction/category"),
            Some(&json!("billing"))
        );
        assert_eq!(
            payload.pointer("/decision/department"),
            Some(&json!("finance"))
        );
    }

    #[tokio::test]
    async fn get_unknown_inquiry_is_not_found() {
        let (service, _) = build_service();
        let router = inquiry_router(service);

        let response = router
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri(format!("/api/v1/inquiries/{}", uuid::Uuid::new_v4()))
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("router dispatch");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn statistics_endpoint_reports_distributions() {
        let (service, _) = build_service();
        service
            .classify_and_route(submission(
                "Incorrect charge",
                "charged twice, refund please",
            ))
            .expect("submission succeeds");

        let router = inquiry_router(service);
        let response = router
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/api/v1/statistics?days=7")
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("router dispatch");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("body");
        let payload: Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(payload.get("total"), Some(&json!(1)));
        assert_eq!(payload.get("processed"), Some(&json!(1)));
        assert_eq!(
            payload.pointer("/per_category/billing"),
            Some(&json!(1))
        );
    }
}
