use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, human)
    pub format: LogFormat,

    /// Include the emitting module in each line
    pub with_target: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Human,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "human" | "text" => Ok(LogFormat::Human),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: if cfg!(debug_assertions) {
                LogFormat::Human
            } else {
                LogFormat::Json
            },
            with_target: false,
        }
    }
}

impl LoggingConfig {
    /// `RUST_LOG` wins over the configured level
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Initialize the global tracing subscriber
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let layer = match config.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(config.with_target)
            .boxed(),
        LogFormat::Human => fmt::layer().with_target(config.with_target).boxed(),
    };

    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(layer)
        .try_init()?;

    tracing::debug!(level = %config.level, format = ?config.format, "logging initialized");
    Ok(())
}
