// Main entry point for the transfer-pipeline API server

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transfer_core::config::Config;
use transfer_core::server::build_app;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,transfer_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting transfer pipeline server");

    // Load configuration
    let config = Config::from_env().context("failed to load configuration")?;
    tracing::info!("configuration loaded");

    // Connect to database
    tracing::info!("connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;
    tracing::info!("database connected");

    // Run migrations
    tracing::info!("running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;
    tracing::info!("migrations complete");

    // Build application and start the background transfer worker
    let app = build_app(pool.clone(), &config);
    let worker = transfer_core::domains::transfer::worker(&pool, &config);
    worker.start().await;

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(%addr, "starting server");
    tracing::info!("health check: http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("failed to bind to address")?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .context("server error")?;

    Ok(())
}
