//! Ruifeng seeder
//!
//! Usage: ruifeng-seed [config.yml]

use anyhow::Result;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ruifeng::{
    app,
    cache::create_cache,
    config::Config,
    db::{self, repositories::SqlxRbacRepository, seed, DatabasePool},
    services::RbacResolver,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ruifeng=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.yml"));
    let config = Config::load_with_env(&config_path)?;

    let pool = db::create_pool(&config.database).await?;
    db::migrations::run_migrations(&pool).await?;
    RbacResolver::new(SqlxRbacRepository::boxed(pool.clone()))
        .sync()
        .await?;

    let cache = create_cache(&config.cache).await?;
    let state = app::build_state(&config, pool.clone(), cache).await?;
    let report = seed::seed(&state).await?;
    if report.is_empty() {
        tracing::info!("Nothing to seed");
    } else {
        tracing::info!(
            "Seeded {} post(s), {} comment(s), {} singer(s) and {} song(s)",
            report.posts,
            report.comments,
            report.singers,
            report.songs
        );
        tracing::info!(
            "Demo author: {} / {}",
            seed::DEMO_AUTHOR,
            seed::DEMO_PASSWORD
        );
    }

    pool.close().await;
    Ok(())
}
