use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;

use shelf_notification_service::config::Settings;
use shelf_notification_service::server::{create_app, AppState};
use shelf_notification_service::shutdown::GracefulShutdown;
use shelf_notification_service::tasks::ExpiryTask;
use shelf_notification_service::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new()?;

    // Initialize tracing
    let _telemetry = init_telemetry(&settings.otel)?;
    tracing::info!("Configuration loaded");

    // Create application state; consumers start here
    let state = AppState::build(settings.clone()).await;
    tracing::info!(consumers = state.consumers.len(), "Application state initialized");

    // Start expired-notification purge in background
    let expiry_task = ExpiryTask::new(
        settings.notification.cleanup_interval,
        state.notifications.clone(),
        state.shutdown_tx.subscribe(),
    );
    let expiry_handle = tokio::spawn(expiry_task.run());

    // Create Axum app
    let app = create_app(state.clone());

    // Start server
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Run server; push streams and consumers are wound down once a signal arrives
    let shutdown = GracefulShutdown::new(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let reason = shutdown_signal().await;
            shutdown.execute(reason).await;
        })
        .await?;

    tracing::info!("Waiting for background tasks to finish...");
    let _ = expiry_handle.await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
            "interrupt"
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
            "terminate"
        }
    }
}
