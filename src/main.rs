use std::net::SocketAddr;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use travel_gateway::{app, AppState, GatewayConfig, TravelGateway};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "travel_gateway=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = GatewayConfig::from_env().context("failed to load gateway configuration")?;
    tracing::info!(
        airlines_hub = %config.urls.airlines_hub,
        exchange = %config.urls.exchange,
        fidelity = %config.urls.fidelity,
        timeout_ms = config.request_timeout.as_millis() as u64,
        retry_attempts = config.retry_config.max_attempts,
        "starting travel gateway"
    );

    let gateway = TravelGateway::from_config(&config);
    let app = app(AppState::new(gateway));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("listening on {}", addr);

    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
