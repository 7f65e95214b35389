//! Operator configuration
//!
//! Static settings come from defaults, an optional config file, `APPSOURCE__*`
//! environment variables and the command line ([`ConfigLoader`]). Settings the
//! Argo CD admin owns live in the operator ConfigMap ([`AppSourceSettings`]).

mod configmap;
mod loader;
mod types;

pub use configmap::{
    load_project_profiles, parse_client_opts, AppSourceSettings, KEY_ADDRESS, KEY_CLIENT_OPTS,
    KEY_PROFILES,
};
pub use loader::{CliOverrides, ConfigLoader};
pub use types::{
    ArgoCdClientOptions, ArgoCdConfig, OperatorConfig, DEFAULT_ARGOCD_NAMESPACE,
    DEFAULT_CLUSTER_HOST, DEFAULT_CONFIG_MAP,
};
