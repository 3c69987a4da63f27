//! Koinonia chat server entrypoint

use tracing_subscriber::EnvFilter;

use koinonia_server::{routes, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("koinonia_server=debug,tower_http=info")),
        )
        .init();

    let config = Config::from_env();
    let bind_address = config.bind_address.clone();

    let state = AppState::new(config).await?;
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %bind_address, "Chat engine listening");
    axum::serve(listener, app).await?;

    Ok(())
}
