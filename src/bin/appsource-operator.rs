// AppSource operator binary
use anyhow::{Context as _, Result};
use argocd_appsource::config::{AppSourceSettings, CliOverrides, ConfigLoader, OperatorConfig};
use argocd_appsource::logging::{init_logging, LogFormat};
use argocd_appsource::operator::{
    run_controller, AppSource, ArgoCdClient, Context, KubeResourceStore, ReconciliationEngine,
};
use clap::Parser;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{Api, Client, CustomResourceExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "appsource-operator", version, about = "Argo CD AppSource operator")]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, env = "APPSOURCE_CONFIG")]
    config: Option<String>,

    /// API server address Applications are deployed to
    #[arg(long)]
    cluster_host: Option<String>,

    /// Namespace Argo CD runs in
    #[arg(long)]
    argocd_namespace: Option<String>,

    /// Log level or filter directive
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (json, human)
    #[arg(long)]
    log_format: Option<LogFormat>,

    /// Print the AppSource CustomResourceDefinition and exit
    #[arg(long)]
    print_crd: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.print_crd {
        print!("{}", serde_yaml_ng::to_string(&AppSource::crd())?);
        return Ok(());
    }

    let config = ConfigLoader::new()
        .load_from_file(cli.config.as_deref())
        .load_from_env()
        .load_from_cli(CliOverrides {
            cluster_host: cli.cluster_host,
            argocd_namespace: cli.argocd_namespace,
            log_level: cli.log_level,
            log_format: cli.log_format,
        })
        .build()?;

    init_logging(&config.logging)?;
    info!(
        cluster_host = %config.cluster_host,
        argocd_namespace = %config.argocd_namespace,
        "Starting AppSource operator"
    );

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let settings = load_settings(&client, &config).await?;
    info!(
        address = %settings.client.server_addr,
        templates = settings.templates.len(),
        "Loaded operator settings"
    );

    let argocd = Arc::new(ArgoCdClient::new(&settings.client)?);
    let engine = ReconciliationEngine::new(
        Arc::new(KubeResourceStore::new(client.clone())),
        argocd.clone(),
        argocd,
        settings.templates,
        config.engine_settings(),
    );

    let shutdown = CancellationToken::new();
    let ctx = Arc::new(Context {
        engine,
        shutdown: shutdown.clone(),
        resync: config.resync(),
        error_requeue: config.error_requeue(),
        invalid_spec_requeue: config.invalid_spec_requeue(),
    });

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
        shutdown.cancel();
    });

    run_controller(client, ctx).await?;
    Ok(())
}

/// Reads the operator ConfigMap; a missing ConfigMap leaves the file values in effect
async fn load_settings(client: &Client, config: &OperatorConfig) -> Result<AppSourceSettings> {
    let config_maps: Api<ConfigMap> = Api::namespaced(client.clone(), &config.argocd_namespace);
    let data = match config_maps
        .get_opt(&config.config_map_name)
        .await
        .with_context(|| format!("Failed to read ConfigMap {}", config.config_map_name))?
    {
        Some(cm) => cm.data.unwrap_or_default(),
        None => {
            warn!(
                namespace = %config.argocd_namespace,
                name = %config.config_map_name,
                "operator ConfigMap not found, using configured defaults"
            );
            BTreeMap::new()
        }
    };

    let token = std::env::var(&config.argocd.token_env)
        .ok()
        .filter(|t| !t.is_empty());
    if token.is_none() {
        warn!(env = %config.argocd.token_env, "no Argo CD auth token set");
    }

    Ok(AppSourceSettings::from_config_map(&data, config, token)?)
}
