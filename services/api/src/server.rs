use crate::cli::ServeArgs;
use crate::infra::{bootstrap_admin, in_memory_services, AppState};
use crate::routes::with_adoption_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use pet_adoption::config::AppConfig;
use pet_adoption::error::AppError;
use pet_adoption::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

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

    let services = in_memory_services(config.workflow);
    match &config.admin {
        Some(admin) => {
            let account = bootstrap_admin(&services, admin).await?;
            info!(user_id = %account.id, "admin account bootstrapped");
        }
        None => warn!("APP_ADMIN_EMAIL not set; no account can list pets or decide applications"),
    }

    let app = with_adoption_routes(services)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        rejection_policy = ?config.workflow.rejection_policy,
        "pet adoption service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
