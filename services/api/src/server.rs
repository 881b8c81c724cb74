use crate::cli::ServeArgs;
use crate::infra::{local_portal, AppState, PortalService};
use crate::routes::with_portal_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thesis_portal::config::AppConfig;
use thesis_portal::error::AppError;
use thesis_portal::identity::IdentityEvent;
use thesis_portal::telemetry;
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
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let portal = local_portal(config.storage.clone());
    if let Some(path) = config.storage.template_path.as_deref() {
        load_template(&portal.service, path)?;
    }

    let mut events = portal.service.identity().subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                IdentityEvent::SignedIn(user) => info!(user = %user.id, "session started"),
                IdentityEvent::SignedOut => info!("session ended"),
            }
        }
    });

    let app = with_portal_routes(portal.service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, bucket = %config.storage.bucket, "thesis portal ready");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Seed the master letter template from disk.
pub(crate) fn load_template(service: &PortalService, path: &Path) -> Result<(), AppError> {
    let content = std::fs::read(path)?;
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("Template_Sidang_Master.docx");
    let template = service.seed_template(name, content)?;
    info!(name = %template.name, path = %path.display(), "master template loaded");
    Ok(())
}
