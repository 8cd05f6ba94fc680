use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::domain::{InquiryId, InquirySubmission};
use super::repository::{InquiryRepository, RepositoryError};
use super::service::{TriageService, TriageServiceError};

/// Router builder exposing HTTP endpoints for submission, lookup,
/// classification preview, and statistics.
pub fn inquiry_router<R>(service: Arc<TriageService<R>>) -> Router
where
    R: InquiryRepository + 'static,
{
    Router::new()
        .route("/api/v1/inquiries", post(submit_handler::<R>))
        .route("/api/v1/inquiries/:inquiry_id", get(status_handler::<R>))
        .route(
            "/api/v1/inquiries/classify",
            post(classify_handler::<R>),
        )
        .route("/api/v1/statistics", get(statistics_handler::<R>))
        .with_state(service)
}

fn error_payload(err: &TriageServiceError) -> serde_json::Value {
    json!({
        "code": err.code(),
        "error": err.to_string(),
    })
}

pub(crate) async fn submit_handler<R>(
    State(service): State<Arc<TriageService<R>>>,
    Json(submission): Json<InquirySubmission>,
) -> Response
where
    R: InquiryRepository + 'static,
{
    match service.classify_and_route(submission) {
        Ok(outcome) => {
            let payload = json!({
                "inquiry_id": outcome.inquiry.id,
                "category": outcome.prediction.category,
                "sentiment": outcome.prediction.sentiment,
                "urgency": outcome.prediction.urgency,
                "department": outcome.decision.department,
                "consultant": outcome.decision.consultant,
                "priority_score": outcome.decision.priority_score,
                "escalated": outcome.decision.escalated,
                "response_deadline": outcome.decision.response_deadline,
            });
            (StatusCode::CREATED, Json(payload)).into_response()
        }
        Err(err @ TriageServiceError::Intake(_)) => {
            (StatusCode::UNPROCESSABLE_ENTITY, Json(error_payload(&err))).into_response()
        }
        Err(err @ TriageServiceError::Repository(RepositoryError::Conflict)) => {
            (StatusCode::CONFLICT, Json(error_payload(&err))).into_response()
        }
        Err(other) => {
            (StatusCode::INTERNAL_SERVER_ERROR, Json(error_payload(&other))).into_response()
        }
    }
}

pub(crate) async fn status_handler<R>(
    State(service): State<Arc<TriageService<R>>>,
    Path(inquiry_id): Path<String>,
) -> Response
where
    R: InquiryRepository + 'static,
{
    let Ok(id) = inquiry_id.parse::<Uuid>() else {
        let payload = json!({
            "code": "invalid_input",
            "error": format!("'{inquiry_id}' is not a valid inquiry id"),
        });
        return (StatusCode::BAD_REQUEST, Json(payload)).into_response();
    };

    match service.find_inquiry(&InquiryId(id)) {
        Ok(Some(details)) => (StatusCode::OK, Json(details)).into_response(),
        Ok(None) => {
            let payload = json!({
                "code": "not_found",
                "error": format!("inquiry {id} not found"),
            });
            (StatusCode::NOT_FOUND, Json(payload)).into_response()
        }
        Err(err) => {
            (StatusCode::INTERNAL_SERVER_ERROR, Json(error_payload(&err))).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ClassifyRequest {
    text: String,
    #[serde(default)]
    include_all_scores: bool,
}

pub(crate) async fn classify_handler<R>(
    State(service): State<Arc<TriageService<R>>>,
    Json(request): Json<ClassifyRequest>,
) -> Response
where
    R: InquiryRepository + 'static,
{
    match service.classify_text(&request.text, request.include_all_scores) {
        Ok(classified) => (StatusCode::OK, Json(classified)).into_response(),
        Err(err @ TriageServiceError::Intake(_)) => {
            (StatusCode::UNPROCESSABLE_ENTITY, Json(error_payload(&err))).into_response()
        }
        Err(other) => {
            (StatusCode::INTERNAL_SERVER_ERROR, Json(error_payload(&other))).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatisticsQuery {
    #[serde(default = "default_statistics_days")]
    days: i64,
}

fn default_statistics_days() -> i64 {
    7
}

pub(crate) async fn statistics_handler<R>(
    State(service): State<Arc<TriageService<R>>>,
    Query(query): Query<StatisticsQuery>,
) -> Response
where
    R: InquiryRepository + 'static,
{
    match service.statistics(query.days) {
        Ok(statistics) => (StatusCode::OK, Json(statistics)).into_response(),
        Err(err) => {
            (StatusCode::INTERNAL_SERVER_ERROR, Json(error_payload(&err))).into_response()
        }
    }
}
