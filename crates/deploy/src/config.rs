//! Project configuration, read from `Solivre.toml` and `SOLIVRE_*` environment variables.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::{
    DeployError, ModuleRegistry, NetworkRegistry, artifact::DEFAULT_ARTIFACTS_DIR,
    journal::DEFAULT_DEPLOYMENTS_DIR,
};

/// The default name of the project configuration file.
pub const CONFIG_FILENAME: &str = "Solivre.toml";

/// Prefix of environment variables overriding scalar settings.
pub const ENV_PREFIX: &str = "SOLIVRE_";

/// Settings that can be overridden from the environment.
const ENV_KEYS: &[&str] = &[
    "artifacts",
    "deployments",
    "confirmation_timeout_secs",
    "poll_interval_ms",
    "request_timeout_secs",
];

/// Project-wide configuration.
///
/// Networks and modules declared in the file are added to the built-in ones.
/// A table named like a built-in entry replaces it as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Build output directory holding contract artifacts.
    pub artifacts: PathBuf,
    /// Directory holding per-network deployment records.
    pub deployments: PathBuf,
    /// How long to wait for a submitted deployment to be confirmed.
    pub confirmation_timeout_secs: u64,
    /// Interval between receipt polls.
    pub poll_interval_ms: u64,
    /// Timeout of a single JSON-RPC request.
    pub request_timeout_secs: u64,
    /// Registered networks.
    pub networks: NetworkRegistry,
    /// Registered deployment modules.
    pub modules: ModuleRegistry,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            artifacts: PathBuf::from(DEFAULT_ARTIFACTS_DIR),
            deployments: PathBuf::from(DEFAULT_DEPLOYMENTS_DIR),
            confirmation_timeout_secs: 120,
            poll_interval_ms: 1_000,
            request_timeout_secs: 10,
            networks: NetworkRegistry::default(),
            modules: ModuleRegistry::default(),
        }
    }
}

impl ProjectConfig {
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Load the configuration.
    ///
    /// `path` may point at a file or at a directory containing [`CONFIG_FILENAME`].
    /// Without a path, `./Solivre.toml` is used when present. Relative
    /// `artifacts` and `deployments` paths are resolved against the directory
    /// of the configuration file.
    pub fn load(path: Option<&Path>) -> Result<Self, DeployError> {
        Self::try_load(path).map_err(DeployError::Config)
    }

    fn try_load(path: Option<&Path>) -> Result<Self, anyhow::Error> {
        let config_path = match path {
            Some(path) if !path.exists() => {
                anyhow::bail!("Configuration file or directory not found: {}", path.display());
            }
            Some(path) if path.is_dir() => Some(path.join(CONFIG_FILENAME)),
            Some(path) => Some(path.to_path_buf()),
            None => Some(PathBuf::from(CONFIG_FILENAME)).filter(|p| p.exists()),
        };

        // Figment merges nested tables field by field, so the built-in networks
        // and modules are applied after extraction instead.
        let defaults = Self {
            networks: NetworkRegistry::empty(),
            modules: ModuleRegistry::empty(),
            ..Self::default()
        };
        let mut figment = Figment::from(Serialized::defaults(defaults));
        if let Some(config_path) = &config_path {
            figment = figment.merge(Toml::file(config_path));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).only(ENV_KEYS));

        let mut config: Self = figment
            .extract()
            .context("Failed to parse project configuration")?;

        let mut networks = NetworkRegistry::default();
        networks
            .merge(std::mem::replace(&mut config.networks, NetworkRegistry::empty()))
            .context("Invalid network definition")?;
        config.networks = networks;

        let mut modules = ModuleRegistry::default();
        modules.merge(std::mem::replace(&mut config.modules, ModuleRegistry::empty()));
        config.modules = modules;

        if let Some(base) = config_path
            .as_deref()
            .and_then(Path::parent)
            .filter(|base| !base.as_os_str().is_empty())
        {
            config.artifacts = base.join(&config.artifacts);
            config.deployments = base.join(&config.deployments);
        }

        config
            .networks
            .validate()
            .context("Invalid network definition")?;

        if config.poll_interval_ms == 0 {
            anyhow::bail!("poll_interval_ms must be greater than zero");
        }

        tracing::debug!(
            config_path = ?config_path.as_ref().map(|p| p.display().to_string()),
            artifacts = %config.artifacts.display(),
            deployments = %config.deployments.display(),
            networks = config.networks.names().len(),
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), DeployError> {
        let content = toml::to_string_pretty(self)
            .context("Failed to serialize configuration to TOML")
            .map_err(DeployError::Config)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))
            .map_err(DeployError::Config)?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }
}
