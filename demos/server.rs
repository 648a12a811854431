//! Demo server: loads `jsonapi.json` and `resources.json` from `CONFIG_PATH`, introspects missing
//! column listings, and serves health plus resource routes.

use jsonapi_controller::{app, fill_columns, load_from_env, resolve, AppState, DbPool};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("jsonapi_controller=info")),
        )
        .init();

    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite::memory:".into());
    let pool = DbPool::connect(&database_url, 5).await?;
    tracing::info!(driver = %pool.dialect(), "connected");

    let config = load_from_env().await?;
    let mut model = resolve(&config)?;
    fill_columns(&mut model, &pool).await?;
    tracing::info!(resources = model.resources.len(), prefix = %config.api.prefix, "config loaded");

    let state = AppState::new(pool, config.api, model);
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".into());
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app(state)).await?;
    Ok(())
}
