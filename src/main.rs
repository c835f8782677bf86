//! sigildb - Signed Entry Database
//!
//! A TCP-based database node speaking a signed-entry binary wire protocol.

use sigildb_core::TableEngine;
use sigildb_server::{tls, Config, Dispatcher, Server, ServerConfig};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if SIGILDB_CONFIG is set, then env overrides)
    let config = match Config::load() {
        Ok(c) => {
            if let Ok(path) = std::env::var("SIGILDB_CONFIG") {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            // If a config file was explicitly specified, fail on error
            if std::env::var("SIGILDB_CONFIG").is_ok() {
                tracing::error!("Failed to load config: {}", e);
                return Err(e.into());
            }
            tracing::info!("Using default configuration");
            Config::default()
        }
    };

    tracing::info!("Starting sigildb server");
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    tracing::info!("  Hash algorithm: {:?}", config.protocol.hash);

    // Validate and log TLS config
    if let Err(e) = config.tls.validate() {
        tracing::error!("TLS configuration error: {}", e);
        return Err(e.into());
    }

    let tls_config = if config.tls.enabled {
        let server_config = tls::create_server_config(&config.tls)?;
        tracing::info!("  TLS: enabled");
        if config.tls.require_client_cert {
            tracing::info!("  mTLS: enabled (client certificate required)");
        }
        Some(server_config)
    } else {
        tracing::info!("  TLS: disabled");
        None
    };

    // Create the table engine and the configured tablespaces
    let engine = Arc::new(TableEngine::new());
    for tablespace in &config.schema.tablespaces {
        engine.create_tablespace(&tablespace.name);
        for table in &tablespace.tables {
            engine.create_table(&tablespace.name, table)?;
        }
        tracing::info!(
            "  Tablespace {}: {} table(s)",
            tablespace.name,
            tablespace.tables.len()
        );
    }

    // Wire the protocol dispatcher and the server
    let registry =
        Dispatcher::new(engine.clone(), config.protocol.hash_kind()).into_registry();
    let mut server_config = ServerConfig::new(config.network.bind_addr);
    server_config.idle_timeout = config.network.idle_timeout();
    server_config.max_connections = config.network.max_connections;
    if let Some(tls) = tls_config {
        server_config = server_config.with_tls(tls);
    }
    let server = Arc::new(Server::new(server_config, registry));

    // Spawn shutdown signal handler
    let shutdown_server = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping server...");
        shutdown_server.shutdown();
    });

    // Run server (blocks until shutdown)
    server.run().await?;

    tracing::info!("Server stopped");
    Ok(())
}
