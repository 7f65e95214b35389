use crate::logging::LoggingConfig;
use crate::operator::{ApplicationSettings, EngineSettings};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// In-cluster API server address
pub const DEFAULT_CLUSTER_HOST: &str = "https://kubernetes.default.svc";

/// Namespace Argo CD runs in
pub const DEFAULT_ARGOCD_NAMESPACE: &str = "argocd";

/// ConfigMap holding the Argo CD address, client options and project profiles
pub const DEFAULT_CONFIG_MAP: &str = "argocd-appsource-cm";

/// Main operator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    /// API server address Applications are deployed to
    pub cluster_host: String,

    /// Namespace Argo CD Applications are created in
    pub argocd_namespace: String,

    /// Name of the operator ConfigMap inside `argocd_namespace`
    pub config_map_name: String,

    /// Also add the AppSource repository to the project's source repos
    pub manage_source_repos: bool,

    /// Re-reads allowed after a conflicting project update
    pub conflict_retries: u32,

    /// Periodic resync of healthy AppSources, in seconds
    pub resync_secs: u64,

    /// Requeue delay after a transient failure, in seconds
    pub error_requeue_secs: u64,

    /// Requeue delay for AppSources whose namespace matches no template, in seconds
    pub invalid_spec_requeue_secs: u64,

    /// Argo CD connection settings
    pub argocd: ArgoCdConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Argo CD settings that may also come from the operator ConfigMap.
/// Values found in the ConfigMap take precedence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArgoCdConfig {
    /// Argo CD API server address (`argocd.address`)
    pub address: Option<String>,

    /// CLI style client flags (`argocd.clientOpts`)
    pub client_opts: Option<String>,

    /// Project profiles YAML (`project.profiles`)
    pub project_profiles: Option<String>,

    /// Environment variable holding the Argo CD auth token
    pub token_env: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            cluster_host: DEFAULT_CLUSTER_HOST.to_string(),
            argocd_namespace: DEFAULT_ARGOCD_NAMESPACE.to_string(),
            config_map_name: DEFAULT_CONFIG_MAP.to_string(),
            manage_source_repos: false,
            conflict_retries: 3,
            resync_secs: 300,
            error_requeue_secs: 30,
            invalid_spec_requeue_secs: 300,
            argocd: ArgoCdConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ArgoCdConfig {
    fn default() -> Self {
        Self {
            address: None,
            client_opts: None,
            project_profiles: None,
            token_env: "ARGOCD_TOKEN".to_string(),
        }
    }
}

impl OperatorConfig {
    pub fn resync(&self) -> Duration {
        Duration::from_secs(self.resync_secs)
    }

    pub fn error_requeue(&self) -> Duration {
        Duration::from_secs(self.error_requeue_secs)
    }

    pub fn invalid_spec_requeue(&self) -> Duration {
        Duration::from_secs(self.invalid_spec_requeue_secs)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            conflict_retries: self.conflict_retries,
            reconciled_refresh: self.resync(),
            ..EngineSettings::new(ApplicationSettings {
                cluster_host: self.cluster_host.clone(),
                argocd_namespace: self.argocd_namespace.clone(),
                manage_source_repos: self.manage_source_repos,
            })
        }
    }
}

/// Immutable Argo CD client options, built once from `argocd.clientOpts`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgoCdClientOptions {
    pub server_addr: String,
    pub auth_token: Option<String>,
    pub plaintext: bool,
    pub insecure: bool,
    pub server_cert_file: Option<String>,
    pub client_cert_file: Option<String>,
    pub client_cert_key_file: Option<String>,
    pub grpc_web: bool,
    pub grpc_web_root_path: Option<String>,
    pub port_forward: bool,
    pub port_forward_namespace: Option<String>,
}
