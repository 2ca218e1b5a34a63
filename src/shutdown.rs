use tokio::signal;

/// Wait for a shutdown signal (SIGINT or SIGTERM).
///
/// The orchestrator races this against the scan stream: once it fires,
/// no new remediations start, but in-flight ones run to completion.
pub async fn wait_for_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, stopping dispatch...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, stopping dispatch...");
        }
    }
}
