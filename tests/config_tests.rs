//! Configuration layering and operator ConfigMap parsing.

use argocd_appsource::config::{AppSourceSettings, CliOverrides, ConfigLoader, KEY_PROFILES};
use argocd_appsource::logging::LogFormat;
use std::collections::BTreeMap;
use std::io::Write;

const PROFILES: &str = r#"
- teams:
    namePattern: "^(?P<project>team-[a-z]+)$"
    spec:
      description: "team project"
      sourceRepos: ["*"]
      clusterResourceWhitelist:
        - group: "*"
          kind: "*"
      orphanedResources:
        warn: true
- fallback:
    namePattern: "^(.*)$"
"#;

#[test]
fn test_file_config_feeds_settings_and_engine() {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    writeln!(
        file,
        r#"
cluster_host: https://10.0.0.1:6443
conflict_retries: 5
resync_secs: 60
argocd:
  address: argocd-server.argocd.svc:443
  client_opts: "--insecure"
logging:
  level: debug
"#
    )
    .unwrap();

    let config = ConfigLoader::new()
        .load_from_file(file.path().to_str())
        .load_from_cli(CliOverrides {
            log_format: Some(LogFormat::Json),
            ..Default::default()
        })
        .build()
        .unwrap();
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, LogFormat::Json);

    let mut data = BTreeMap::new();
    data.insert(KEY_PROFILES.to_string(), PROFILES.to_string());
    let settings = AppSourceSettings::from_config_map(&data, &config, Some("secret".into())).unwrap();

    assert_eq!(settings.client.server_addr, "argocd-server.argocd.svc:443");
    assert!(settings.client.insecure);
    assert_eq!(settings.templates.len(), 2);

    let teams = &settings.templates.templates()[0];
    assert_eq!(teams.spec.cluster_resource_whitelist.len(), 1);
    assert!(teams.spec.extra.contains_key("orphanedResources"));

    let (project, template) = settings.templates.resolve("sandbox").unwrap();
    assert_eq!(project, "sandbox");
    assert_eq!(template.profile, "fallback");

    let engine = config.engine_settings();
    assert_eq!(engine.conflict_retries, 5);
    assert_eq!(engine.application.cluster_host, "https://10.0.0.1:6443");
    assert_eq!(engine.application.argocd_namespace, "argocd");
    assert_eq!(engine.reconciled_refresh, std::time::Duration::from_secs(60));
}

#[test]
fn test_bad_client_opts_are_rejected() {
    let config = ConfigLoader::new()
        .load_from_cli(CliOverrides::default())
        .build()
        .unwrap();

    let mut data = BTreeMap::new();
    data.insert("argocd.address".to_string(), "argocd:443".to_string());
    data.insert("argocd.clientOpts".to_string(), "insecure --plaintext".to_string());

    let err = AppSourceSettings::from_config_map(&data, &config, None).unwrap_err();
    assert!(err.to_string().contains("insecure"));
}
