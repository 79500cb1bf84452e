//! `stall-keyvault` — service binary entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Initialise structured logging (and OTLP span export when configured).
//! 3. Open the configured key store and wrap it in a [`keys::KeyRing`].
//! 4. Build the Axum router and serve until SIGINT / SIGTERM.

mod config;
mod crypto;
mod identity;
mod keys;
mod server;
mod telemetry;

use anyhow::Result;
use tokio::signal;
use tracing::info;

use config::{Config, KeyStoreBackend};
use keys::{FileKeyStore, KeyBackend, MemoryKeyStore};
use server::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init_telemetry(cfg.otel_exporter_otlp_endpoint.as_deref(), &cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = cfg.listen_port,
        "stall-keyvault starting"
    );

    // -----------------------------------------------------------------------
    // 3. Key store
    // -----------------------------------------------------------------------
    let backend = match cfg.key_store_backend {
        KeyStoreBackend::File => {
            let store = FileKeyStore::new(&cfg.key_store_dir);
            store.ensure_dir().await?;
            info!(dir = %store.dir().display(), "using file key store");
            KeyBackend::File(store)
        }
        KeyStoreBackend::Memory => {
            info!("using in-memory key store; keys are lost on restart");
            KeyBackend::Memory(MemoryKeyStore::new())
        }
    };

    // -----------------------------------------------------------------------
    // 4. HTTP server
    // -----------------------------------------------------------------------
    let state = AppState::new(backend);
    let router = server::router::build(state);

    let addr: std::net::SocketAddr = ([0, 0, 0, 0], cfg.listen_port).into();
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("stall-keyvault stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            let _ = stream.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}
