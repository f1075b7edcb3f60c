//! Rewrite Proxy Server - Entry Point
//!
//! Starts both the proxy server and admin API server with graceful shutdown support.

use std::sync::Arc;

use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rewrite_proxy::api::ApiServer;
use rewrite_proxy::config::{Config, LogConfig};
use rewrite_proxy::error::Result;
use rewrite_proxy::proxy::ProxyServer;
use rewrite_proxy::rewrite::{create_handler, HandlerRegistry};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log);

    info!("Starting Rewrite Proxy Server");

    // Register handlers configured at startup
    let registry = Arc::new(HandlerRegistry::new());
    for definition in &config.handlers {
        let handler = create_handler(&definition.type_name, &definition.params)?;
        registry.add(Arc::from(handler));
    }
    info!("Registered {} response handlers", registry.len());

    // Create shutdown channel
    let (shutdown_tx, _) = watch::channel(false);

    // Create proxy server
    let proxy_server = ProxyServer::new(config.proxy.clone(), registry.clone());
    let proxy_shutdown = shutdown_tx.subscribe();
    let proxy_task = tokio::spawn(async move {
        if let Err(e) = proxy_server.run(proxy_shutdown).await {
            error!("Proxy server error: {}", e);
        }
    });

    // Create API server
    let api_task = if config.api.enabled {
        let api_server = ApiServer::new(config.api.clone(), registry.clone());
        let api_shutdown = shutdown_tx.subscribe();
        Some(tokio::spawn(async move {
            if let Err(e) = api_server.run(api_shutdown).await {
                error!("API server error: {}", e);
            }
        }))
    } else {
        info!("Admin API disabled");
        None
    };

    info!(
        "Servers started - Proxy: {}, API: {}",
        config.proxy_addr(),
        if config.api.enabled {
            config.api_addr()
        } else {
            "disabled".to_string()
        }
    );

    // Wait for shutdown signal
    shutdown_signal().await;
    info!("Shutdown signal received");

    // Send shutdown signal to all services
    let _ = shutdown_tx.send(true);

    // Wait for all tasks to complete
    let _ = proxy_task.await;
    if let Some(api_task) = api_task {
        let _ = api_task.await;
    }

    info!("Rewrite Proxy Server stopped");
    Ok(())
}

/// Install the global subscriber; `RUST_LOG` overrides `LOG_LEVEL`
fn init_tracing(log: &LogConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("rewrite_proxy={},tower_http=debug", log.level).into()
    });
    let json = log.format.eq_ignore_ascii_case("json");

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
