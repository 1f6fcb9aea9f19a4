//! Futura Bridge Service (futsrv)
//!
//! Polls the unit, serves metrics, the editor page and the write API.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use common::service_bootstrap::{get_service_port, print_startup_banner};
use common::shutdown::cancel_on_shutdown;
use futsrv::{
    api::{create_routes, AppState},
    bootstrap::{self, Args},
    connection::DeviceConnection,
    metrics::DeviceMetrics,
    poller::Poller,
    protocol::ModbusTcpTransport,
    reader::RangeReader,
    service::DeviceService,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let service_info = bootstrap::create_service_info();

    let mut config = bootstrap::load_configuration(&args)?;
    bootstrap::initialize_logging(&args, &service_info, &config)?;
    if !args.no_color {
        print_startup_banner(&service_info);
    }

    // Validation mode: validate and exit
    if args.validate {
        bootstrap::validate_configuration(&config)?;
        info!("Validation completed successfully");
        return Ok(());
    }

    config.validate()?;
    config.api.port = get_service_port(config.api.port, &service_info);
    let address_map = Arc::new(config.address_map()?);
    info!(
        "Device {}:{} (unit {}), block size {}, poll every {}s",
        config.device.host,
        config.device.port,
        config.device.slave_id,
        config.polling.max_block_size,
        config.polling.interval_secs
    );

    let transport = ModbusTcpTransport::new(
        config.device.host.clone(),
        config.device.port,
        config.device.slave_id,
        config.device.timeout(),
    );
    let connection = DeviceConnection::new(Box::new(transport));
    if let Err(e) = connection.connect().await {
        warn!(
            "Failed to connect to {}: {}. Will retry on the next request",
            connection.endpoint(),
            e
        );
    }

    let reader = RangeReader::new(
        connection.clone(),
        config.polling.max_block_size,
        config.polling.reconnect_backoff(),
    )?;
    let service = DeviceService::new(address_map, connection.clone(), reader);
    let metrics = DeviceMetrics::new()?;

    let shutdown_token = CancellationToken::new();

    let poller = Poller::new(service.clone(), metrics.clone(), config.polling.interval());
    let poll_status = poller.status();
    let poller_handle = poller.spawn(shutdown_token.clone());

    let state = Arc::new(AppState::new(service, metrics, poll_status));
    let app = create_routes(state);

    let addr: SocketAddr = format!("{}:{}", config.api.host, config.api.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid bind address '{}:{}'",
                config.api.host, config.api.port
            )
        })?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("API server listening on http://{}", addr);
    info!("Editor: http://{}/edit", addr);

    let server_token = shutdown_token.clone();
    let server_handle = tokio::spawn(async move {
        let shutdown = async move { server_token.cancelled().await };
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            error!("Server error: {}", e);
        }
    });

    cancel_on_shutdown(shutdown_token).await;

    let (poller_result, server_result) = futures::join!(poller_handle, server_handle);
    if let Err(e) = poller_result {
        error!("Poller task failed: {}", e);
    }
    if let Err(e) = server_result {
        error!("Server task failed: {}", e);
    }

    if let Err(e) = connection.disconnect().await {
        warn!("Disconnect failed: {}", e);
    }
    info!("futsrv stopped");
    Ok(())
}
