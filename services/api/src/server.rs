use crate::cli::{DrainArgs, ServeArgs};
use crate::infra::{build_service, AppState};
use crate::routes::with_inquiry_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;
use triage_ai::config::AppConfig;
use triage_ai::error::AppError;
use triage_ai::inquiry::DrainOptions;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    config.init_telemetry()?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let triage_service = build_service(&config)?;

    let app = with_inquiry_routes(triage_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "inquiry triage service ready");

    axum::serve(listener, app).await?;
    Ok(())
}

/// One drain invocation, meant to be driven by an external scheduler such as
/// a cron job or workflow tick.
pub(crate) fn run_drain(args: DrainArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    config.init_telemetry()?;

    let service = build_service(&config)?;
    let report = service.drain_unprocessed(DrainOptions {
        limit: args.limit,
        batch_size: args.batch_size,
    })?;

    info!(%report, "drain complete");
    println!("drain: {report}");
    Ok(())
}
