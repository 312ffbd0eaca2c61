//! Controller configuration.
//!
//! Loaded from YAML files and environment variables. Label keys and the
//! catalog selector are plain configuration values handed to the components
//! that need them.

use std::collections::BTreeMap;
use std::time::Duration;

use kube::api::GroupVersionKind;
use serde::Deserialize;

use crate::api::{is_valid_channel, LabelKeys, API_GROUP, API_VERSION, DEFAULT_CHANNEL};
use crate::catalog::LabelSelector;
use crate::templatelookup::LookupConfig;
use crate::watch::QueueBackoff;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "FLEET_LIFECYCLE_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "FLEET_LIFECYCLE";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "FLEET_LIFECYCLE_LOG";
/// Environment variable for Kubernetes namespace.
pub const NAMESPACE_ENV_VAR: &str = "NAMESPACE";
/// Alternative environment variable for Kubernetes namespace (downward API).
pub const POD_NAMESPACE_ENV_VAR: &str = "POD_NAMESPACE";

const DEFAULT_NAMESPACE: &str = "default";
const DEFAULT_WORKERS: usize = 4;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("workers must be at least 1")]
    NoWorkers,

    #[error("invalid default channel {0:?}: must be 3-32 lowercase letters")]
    InvalidDefaultChannel(String),

    #[error("backoff min_delay_ms ({min}) exceeds max_delay_ms ({max})")]
    InvalidBackoff { min: u64, max: u64 },
}

/// Main controller configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Channel used when neither module nor tenant names one.
    pub default_channel: String,
    /// Namespace templates and tenants live in. Falls back to the pod
    /// namespace.
    pub namespace: Option<String>,
    pub catalog: CatalogConfig,
    pub labels: LabelKeys,
    /// Concurrent reconciliation workers.
    pub workers: usize,
    pub backoff: BackoffConfig,
    /// Dependent kind whose owner is a tenant.
    pub dependent: DependentConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_channel: DEFAULT_CHANNEL.to_string(),
            namespace: None,
            catalog: CatalogConfig::default(),
            labels: LabelKeys::default(),
            workers: DEFAULT_WORKERS,
            backoff: BackoffConfig::default(),
            dependent: DependentConfig::default(),
        }
    }
}

/// Template catalog configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Label requirements a template must meet to be visible. Empty means
    /// all templates.
    pub selector: BTreeMap<String, String>,
    /// Kubeconfig context of the remote cluster serving remote templates.
    pub remote_context: Option<String>,
}

/// Work queue retry policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_retries: usize,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        let defaults = QueueBackoff::default();
        Self {
            min_delay_ms: defaults.min_delay.as_millis() as u64,
            max_delay_ms: defaults.max_delay.as_millis() as u64,
            max_retries: defaults.max_retries,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DependentConfig {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl Default for DependentConfig {
    fn default() -> Self {
        Self {
            group: API_GROUP.to_string(),
            version: API_VERSION.to_string(),
            kind: "Manifest".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config: Config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if !is_valid_channel(&self.default_channel) {
            return Err(ConfigError::InvalidDefaultChannel(
                self.default_channel.clone(),
            ));
        }
        if self.backoff.min_delay_ms > self.backoff.max_delay_ms {
            return Err(ConfigError::InvalidBackoff {
                min: self.backoff.min_delay_ms,
                max: self.backoff.max_delay_ms,
            });
        }
        Ok(())
    }

    /// Configured namespace, else `NAMESPACE`, else `POD_NAMESPACE`, else
    /// `default`.
    pub fn resolved_namespace(&self) -> String {
        self.namespace
            .clone()
            .filter(|ns| !ns.is_empty())
            .or_else(|| std::env::var(NAMESPACE_ENV_VAR).ok())
            .or_else(|| std::env::var(POD_NAMESPACE_ENV_VAR).ok())
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string())
    }

    pub fn lookup_config(&self) -> LookupConfig {
        LookupConfig {
            default_channel: self.default_channel.clone(),
            labels: self.labels.clone(),
            scope: LabelSelector::from(self.catalog.selector.clone()),
        }
    }

    pub fn queue_backoff(&self) -> QueueBackoff {
        QueueBackoff {
            min_delay: Duration::from_millis(self.backoff.min_delay_ms),
            max_delay: Duration::from_millis(self.backoff.max_delay_ms),
            max_retries: self.backoff.max_retries,
        }
    }

    pub fn dependent_gvk(&self) -> GroupVersionKind {
        GroupVersionKind::gvk(
            &self.dependent.group,
            &self.dependent.version,
            &self.dependent.kind,
        )
    }
}
