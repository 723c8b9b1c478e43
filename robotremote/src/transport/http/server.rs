//! HTTP server implementation.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::service::{RemoteService, ServerState};

use super::routes::routes;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    /// `0` picks a free port; see `port_file`.
    pub port: u16,
    /// Where to write the bound port once listening.
    pub port_file: Option<PathBuf>,
    /// Whether remote clients may stop the server.
    pub allow_stop: bool,
    /// Capture what keywords write to the process stdout, not just their
    /// console.
    pub capture_stdout: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8270,
            port_file: None,
            allow_stop: true,
            capture_stdout: true,
        }
    }
}

/// Serve `service` until it is stopped remotely, by a signal, or by a fatal
/// keyword failure.
pub async fn serve(config: ServerConfig, service: Arc<RemoteService>) -> anyhow::Result<()> {
    service.state().set_allow_stop(config.allow_stop);
    service.set_capture_stdout(config.capture_stdout);
    let shutdown_rx = service.state().shutdown_rx();
    let app = routes(Arc::clone(&service));

    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    let local_addr = listener.local_addr()?;

    service.announce_start(local_addr, config.port_file.as_deref())?;
    let signals = tokio::spawn(stop_on_signal(Arc::clone(service.state())));

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_stop(shutdown_rx))
        .await?;

    signals.abort();
    info!("Server shutdown complete");

    Ok(())
}

async fn wait_for_stop(mut shutdown_rx: watch::Receiver<bool>) {
    while !*shutdown_rx.borrow() {
        if shutdown_rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// SIGINT and SIGHUP stop the server even when remote stopping is disabled.
async fn stop_on_signal(state: Arc<ServerState>) {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let hangup = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::hangup()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGHUP handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let hangup = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => {
            info!("Received SIGINT, stopping...");
        }
        _ = hangup => {
            info!("Received SIGHUP, stopping...");
        }
    }

    state.force_stop();
}
