//! Ruta Server Binary
//!
//! Ride-hailing and delivery dispatch over HTTP

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ruta_common::TripKind;
use ruta_server::{build_state, router, ServerConfig, SERVER_VERSION};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!("Starting Ruta dispatch server v{}", SERVER_VERSION);

    let config = ServerConfig::load()?;
    info!("Loaded configuration: {:?}", config);
    info!(
        "Fees: ride={} delivery={} no_show_penalty={}",
        config.dispatch.fees.platform_fee(TripKind::Ride),
        config.dispatch.fees.platform_fee(TripKind::Delivery),
        config.dispatch.fees.no_show_penalty
    );

    let state = build_state(&config)?;
    let app = router(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Ruta server listening on {}", addr);
    info!("Endpoints: /health, /metrics, /api/v1/trips, /api/v1/workers, /api/v1/requesters");

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", err);
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Shutting down Ruta server");
    Ok(())
}
