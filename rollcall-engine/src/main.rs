//! rollcall-engine entry point

use anyhow::Result;
use rollcall_common::config::{ensure_parent_dir, EngineConfig};
use rollcall_engine::{build_router, AppState};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!(
        "Starting rollcall-engine v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = EngineConfig::load()?;
    ensure_parent_dir(&config.database_path)?;

    let pool = rollcall_common::db::connect(&config.database_path).await?;
    rollcall_common::db::init_schema(&pool).await?;
    info!("Database schema ready");

    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(pool, config);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("rollcall-engine listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
