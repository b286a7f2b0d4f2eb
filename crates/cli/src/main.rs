use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use waitroom_core::{
    create_credential_store, load_config, reservation_route, validate_config, AdmissionWatcher,
    ApiClient, ChannelNavigator, HttpQueueStatus, WatchOutcome, WsPushChannel,
};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let resource_id = std::env::args()
        .nth(1)
        .filter(|id| !id.trim().is_empty())
        .context("Usage: waitroom <resource-id>")?;

    // Determine config path
    let config_path = std::env::var("WAITROOM_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("waitroom.toml"));

    info!("waitroom {} loading configuration from {:?}", VERSION, config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    info!("API base URL: {}", config.api.base_url);
    info!("Push channel: {}", config.push.url);
    info!("Credential backend: {:?}", config.credentials.backend);

    let credentials =
        create_credential_store(&config.credentials).context("Failed to create credential store")?;
    let api = ApiClient::new(&config.api, Arc::clone(&credentials))
        .context("Failed to create API client")?;
    let queue = HttpQueueStatus::new(Arc::new(api), &config.queue);
    let push = WsPushChannel::new(&config.push);
    let (navigator, mut routes) = ChannelNavigator::new();

    let watcher = AdmissionWatcher::new(
        config.watcher.clone(),
        Arc::new(queue),
        Arc::new(push),
        credentials,
        Arc::new(navigator),
    );

    // Log every status change
    let mut status_rx = watcher.subscribe();
    tokio::spawn(async move {
        while status_rx.changed().await.is_ok() {
            let status = status_rx.borrow_and_update().clone();
            info!(state = status.state.as_str(), rank = ?status.rank, "{}", status.message);
        }
    });

    watcher.start_watching(&resource_id).await;

    tokio::select! {
        outcome = watcher.wait_for_outcome() => match outcome {
            Some(WatchOutcome::Admitted(credential)) => {
                let route = routes
                    .recv()
                    .await
                    .unwrap_or_else(|| reservation_route(&credential.resource_id));
                info!(resource_id = %credential.resource_id, "Admitted at {}", credential.admitted_at);
                println!("{}", route);
            }
            Some(WatchOutcome::Stopped) | None => bail!("Wait session ended without admission"),
        },
        _ = shutdown_signal() => {
            info!("Shutting down...");
            if let Some(outcome) = watcher.stop_watching().await {
                info!(outcome = ?outcome, "Wait session stopped");
            }
        }
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
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
