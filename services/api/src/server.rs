use crate::cli::ServeArgs;
use crate::infra::{load_directory, load_geocoder, AcknowledgingGateway, AppState, LoggingNotifier};
use crate::routes::with_booking_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use checkride::booking::{BookingLifecycle, MemoryBookingStore, StaticExaminerDirectory};
use checkride::config::AppConfig;
use checkride::error::AppError;
use checkride::telemetry;
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

    let examiners = load_directory(&config.matching)?;
    info!(examiners = examiners.len(), "examiner directory loaded");
    let directory = Arc::new(StaticExaminerDirectory::new(examiners));
    let geocoder = Arc::new(load_geocoder(&config.matching)?);

    let service = Arc::new(
        BookingLifecycle::new(
            Arc::new(MemoryBookingStore::default()),
            directory,
            geocoder,
            Arc::new(AcknowledgingGateway),
            Arc::new(LoggingNotifier),
        )
        .with_contact_limit(config.matching.max_examiners_to_contact),
    );

    let app = with_booking_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "checkride booking coordinator ready");

    axum::serve(listener, app).await?;
    Ok(())
}
