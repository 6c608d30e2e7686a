//! Runs pending database migrations against `DATABASE_URL`.

use anyhow::{Context, Result};
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use transfer_core::config::Config;

#[derive(Parser)]
#[command(name = "migrate_cli")]
#[command(about = "Apply pending transfer-pipeline database migrations")]
struct Cli {
    /// Print pending migrations without applying them.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    if cli.dry_run {
        let pending = sqlx::migrate!("./migrations")
            .iter()
            .map(|m| m.description.to_string())
            .collect::<Vec<_>>();
        for description in pending {
            println!("{description}");
        }
        return Ok(());
    }

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("migration run failed")?;

    tracing::info!("migrations applied");
    Ok(())
}
