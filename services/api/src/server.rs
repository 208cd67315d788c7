use crate::cli::ServeArgs;
use crate::infra::{
    AppState, InMemoryOfferNotifier, InMemoryOfferRepository, InMemoryRequestStore,
    InMemoryTechnicianDirectory,
};
use crate::routes::with_dispatch_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use roadcall::config::AppConfig;
use roadcall::dispatch::{
    CoverageAuditEngine, DispatchEngine, DispatchState, RosterImporter, SystemClock,
};
use roadcall::error::AppError;
use roadcall::telemetry;
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

    let directory = Arc::new(InMemoryTechnicianDirectory::default());
    if let Some(path) = args.roster.take() {
        let technicians = RosterImporter::from_path(path)?;
        let count = technicians.len();
        for technician in technicians {
            directory.upsert(technician);
        }
        info!(count, "technician roster loaded");
    }

    let requests = Arc::new(InMemoryRequestStore::default());
    let offers = Arc::new(InMemoryOfferRepository::default());
    let notifier = Arc::new(InMemoryOfferNotifier::default());

    let engine = Arc::new(DispatchEngine::new(
        directory.clone(),
        requests,
        offers,
        notifier,
        Arc::new(SystemClock),
        config.dispatch.clone(),
    ));
    let audit = Arc::new(CoverageAuditEngine::new(
        directory,
        Arc::new(SystemClock),
        config.dispatch.audit_cache_ttl(),
    ));

    let app = with_dispatch_routes(DispatchState { engine, audit })
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "roadcall dispatch service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
