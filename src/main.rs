use std::sync::Arc;

use mail_code_relay::server::{self, AppState};
use mail_code_relay::{CodeRelay, JsonAccountRegistry, ServiceConfig};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("mail_code_relay=info,tower_http=info")
            }),
        )
        .with_target(false)
        .init();

    let config = ServiceConfig::from_env()?;
    let registry = Arc::new(JsonAccountRegistry::load(&config.accounts_file)?);
    let bind_addr = config.bind_addr;

    info!(
        bind = %bind_addr,
        backend = ?config.backend,
        window = config.window,
        production = config.production,
        "Starting mail-code-relay v{}",
        env!("CARGO_PKG_VERSION")
    );

    let relay = Arc::new(CodeRelay::from_config(config, registry)?);
    let app = server::router(AppState::new(relay));

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(addr = %listener.local_addr()?, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(server::shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}
