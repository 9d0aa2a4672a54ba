//! Cooperative shutdown signals.

use tracing::info;

/// Resolve once the process receives an interrupt or termination signal.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let ctrl_c = tokio::signal::ctrl_c();
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT"),
        _ = sigterm.recv() => info!("received SIGTERM"),
    }
}

#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
    info!("received interrupt");
}
