//! Bootstrap utilities for the controller binary.

use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use kube::config::{KubeConfigOptions, KubeconfigError};
use kube::Client;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LOG_ENV_VAR;

/// Error types for process bootstrap.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("Failed to read kubeconfig: {0}")]
    Kubeconfig(#[from] KubeconfigError),

    #[error("Kubernetes client error: {0}")]
    Client(#[from] kube::Error),
}

/// Initialize tracing with FLEET_LIFECYCLE_LOG environment variable.
///
/// Defaults to "info" level if FLEET_LIFECYCLE_LOG is not set.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Backoff for API server connection retries at startup.
///
/// - Min delay: 100ms
/// - Max delay: 5s
/// - Max attempts: 30
/// - Jitter enabled
pub fn connection_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(5))
        .with_max_times(30)
        .with_jitter()
}

async fn connect(context: Option<&str>) -> Result<Client, BootstrapError> {
    match context {
        None => Ok(Client::try_default().await?),
        Some(context) => {
            let options = KubeConfigOptions {
                context: Some(context.to_string()),
                ..Default::default()
            };
            let config = kube::Config::from_kubeconfig(&options).await?;
            Ok(Client::try_from(config)?)
        }
    }
}

/// Build a Kubernetes client, retrying with backoff until the API server is
/// reachable.
///
/// `context` selects a kubeconfig context; `None` infers the in-cluster or
/// default configuration.
pub async fn kube_client_with_retry(context: Option<&str>) -> Result<Client, BootstrapError> {
    let target = context.unwrap_or("default");
    let client = (|| connect(context))
        .retry(connection_backoff())
        .notify(|e: &BootstrapError, delay: Duration| {
            warn!(
                context = %target,
                error = %e,
                "Failed to connect to Kubernetes API. Retrying in {:?}...",
                delay
            );
        })
        .await?;
    info!(context = %target, "Connected to Kubernetes API");
    Ok(client)
}
