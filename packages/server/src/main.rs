use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::http::{header, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use api::db::{self, PgStore};
use api::{AppState, AuditSink, Settings, TokenService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let settings = Settings::new().context("failed to load configuration")?;
    tracing::info!(
        environment = ?settings.environment,
        db_host = %settings.database.host,
        db_name = %settings.database.name,
        port = settings.server.port,
        "configuration loaded"
    );

    let pool = db::connect(&settings.database)
        .await
        .context("failed to connect to database")?;
    db::run_migrations(&pool)
        .await
        .context("failed to run migrations")?;
    let store = Arc::new(PgStore::new(pool));

    let tokens = TokenService::from_settings(&settings.auth, settings.environment)
        .context("session signing key is not usable")?;

    let audit = settings
        .audit
        .enabled
        .then(|| AuditSink::spawn(store.clone(), settings.audit.capacity));

    let state = AppState::new(store, tokens)
        .with_secure_cookie(settings.auth.secure_cookie)
        .with_store_timeout(settings.database.timeout())
        .with_audit(audit.clone());

    let app = api::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&settings.server.allowed_origins));

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.server.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    if let Some(audit) = audit {
        audit.shutdown().await;
    }
    tracing::info!("server stopped");
    Ok(())
}

/// `RUST_LOG` filter, `LOG_FORMAT=json` for structured output.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "api=info,server=info,tower_http=info".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|f| f == "json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .allow_credentials(true)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
