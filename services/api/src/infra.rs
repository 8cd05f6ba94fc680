use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use triage_ai::config::AppConfig;
use triage_ai::error::AppError;
use triage_ai::inquiry::TriageService;
use triage_ai::storage::SqliteInquiryRepository;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Wire the SQLite repository and the triage service from configuration.
pub(crate) fn build_service(
    config: &AppConfig,
) -> Result<Arc<TriageService<SqliteInquiryRepository>>, AppError> {
    let repository = Arc::new(
        SqliteInquiryRepository::open(
            &config.database.path,
            config.triage.max_processing_attempts,
        )
        .map_err(triage_ai::inquiry::TriageServiceError::Repository)?,
    );
    let service = TriageService::new(repository, config.triage.clone())?;
    Ok(Arc::new(service))
}
