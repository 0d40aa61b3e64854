use civic_reporter::config::{
    app::AppConfig, database::DatabaseConfig, jwt::JwtConfig, media::MediaConfig,
    rate_limit::RateLimitConfig,
};
use civic_reporter::services::media::MediaService;
use civic_reporter::utils::cookie::CookieConfig;
use civic_reporter::{build_app, AppContext, Store};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let app_config = AppConfig::from_env();
    init_tracing(app_config.json_logs);

    // Fail fast on configuration before touching any external service.
    let (jwt_config, database_config, media_config) = validate_config()?;
    let rate_limits = RateLimitConfig::from_env();

    tracing::info!(
        "Starting Civic Reporter API v{} ({})",
        env!("CARGO_PKG_VERSION"),
        app_config.environment.as_str()
    );

    let store = Store::connect(&database_config).await?;
    let media = MediaService::from_config(&media_config).await?;
    if !rate_limits.enabled {
        tracing::warn!("Rate limiting disabled");
    }

    let ctx = AppContext {
        cookies: CookieConfig::from_env(app_config.is_production()),
        config: app_config.clone(),
        store,
        jwt: jwt_config,
        media,
        rate_limits,
        upload_dir: media_config.local_upload_dir().map(str::to_string),
    };
    let app = build_app(ctx);

    let addr = app_config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "civic_reporter=debug,tower_http=debug,axum=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Validate all required configuration at startup.
fn validate_config() -> anyhow::Result<(JwtConfig, DatabaseConfig, MediaConfig)> {
    let jwt = JwtConfig::from_env()?;
    let database = DatabaseConfig::from_env()?;
    let media = MediaConfig::from_env()?;
    Ok((jwt, database, media))
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received, gracefully shutting down..."),
        Err(e) => {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
