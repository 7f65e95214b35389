use super::types::OperatorConfig;
use anyhow::{Context, Result};
use config::{Config, Environment, File};

/// Values given on the command line; `None` leaves the configured value alone
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub cluster_host: Option<String>,
    pub argocd_namespace: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<crate::logging::LogFormat>,
}

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    config_file: Option<String>,
    load_env: bool,
    cli_override: CliOverrides,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            config_file: None,
            load_env: false,
            cli_override: CliOverrides::default(),
        }
    }

    /// Load configuration from file
    pub fn load_from_file(mut self, path: Option<&str>) -> Self {
        self.config_file = path.map(String::from);
        self
    }

    /// Load configuration from `APPSOURCE_*` environment variables
    pub fn load_from_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Apply command line overrides last
    pub fn load_from_cli(mut self, overrides: CliOverrides) -> Self {
        self.cli_override = overrides;
        self
    }

    /// Build the final configuration
    pub fn build(self) -> Result<OperatorConfig> {
        let mut builder =
            Config::builder().add_source(Config::try_from(&OperatorConfig::default())?);

        if let Some(config_path) = &self.config_file {
            builder = builder.add_source(File::with_name(config_path).required(true));
        } else {
            builder = builder
                .add_source(File::with_name("appsource-operator").required(false))
                .add_source(File::with_name("config/appsource-operator").required(false));
        }

        if self.load_env {
            builder = builder.add_source(
                Environment::with_prefix("APPSOURCE")
                    .prefix_separator("_")
                    .separator("__"),
            );
        }

        let mut config: OperatorConfig = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        let cli = self.cli_override;
        if let Some(host) = cli.cluster_host {
            config.cluster_host = host;
        }
        if let Some(ns) = cli.argocd_namespace {
            config.argocd_namespace = ns;
        }
        if let Some(level) = cli.log_level {
            config.logging.level = level;
        }
        if let Some(format) = cli.log_format {
            config.logging.format = format;
        }

        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
