use crate::cli::ServeArgs;
use crate::infra::{load_roster, seed_directory, AppState, LoggingNotifier};
use crate::routes::with_dispatch_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use fieldops_dispatch::config::AppConfig;
use fieldops_dispatch::error::AppError;
use fieldops_dispatch::telemetry;
use fieldops_dispatch::workflows::dispatch::{
    DispatchService, InMemoryDispatchStore, InMemoryTechnicianDirectory,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = Arc::new(InMemoryDispatchStore::default());
    let directory = Arc::new(InMemoryTechnicianDirectory::default());
    if let Some(path) = args.roster.take() {
        let roster = load_roster(&path)?;
        let seeded = seed_directory(&directory, roster).await;
        info!(technicians = seeded, roster = %path.display(), "technician roster loaded");
    }

    let dispatch_service = Arc::new(DispatchService::new(
        store,
        directory,
        Arc::new(LoggingNotifier::default()),
        config.dispatch.clone(),
    ));

    let app = with_dispatch_routes(dispatch_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        search_radius_m = config.dispatch.search_radius_m,
        feed_radius_m = config.dispatch.feed_radius_m,
        "dispatch service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
