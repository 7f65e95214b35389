//! Operator ConfigMap
//!
//! Admin-owned settings stored in the `argocd-appsource-cm` ConfigMap:
//!
//! ```yaml
//! data:
//!   argocd.address: argocd-server.argocd.svc:443
//!   argocd.clientOpts: "--insecure --grpc-web"
//!   project.profiles: |
//!     - default:
//!         namePattern: "(?P<project>.*)-(?:dev|prod)"
//!         spec:
//!           sourceRepos: ["*"]
//! ```

use super::types::{ArgoCdClientOptions, OperatorConfig};
use crate::error::{Error, Result};
use crate::operator::{CompiledProjectTemplate, ProjectTemplate, TemplateRegistry};
use std::collections::{BTreeMap, HashSet};
use tracing::warn;

pub const KEY_ADDRESS: &str = "argocd.address";
pub const KEY_CLIENT_OPTS: &str = "argocd.clientOpts";
pub const KEY_PROFILES: &str = "project.profiles";

/// Everything the operator needs from its ConfigMap, parsed and validated
#[derive(Debug, Clone)]
pub struct AppSourceSettings {
    pub client: ArgoCdClientOptions,
    pub templates: TemplateRegistry,
}

impl AppSourceSettings {
    /// Builds settings from ConfigMap `data`, falling back to `config` for
    /// keys the ConfigMap does not set.
    pub fn from_config_map(
        data: &BTreeMap<String, String>,
        config: &OperatorConfig,
        token: Option<String>,
    ) -> Result<Self> {
        let lookup = |key: &str, fallback: &Option<String>| {
            data.get(key).cloned().or_else(|| fallback.clone())
        };

        let address = lookup(KEY_ADDRESS, &config.argocd.address)
            .ok_or_else(|| Error::Config(format!("'{}' is not set", KEY_ADDRESS)))?;
        let client_opts = lookup(KEY_CLIENT_OPTS, &config.argocd.client_opts).unwrap_or_default();
        let profiles = lookup(KEY_PROFILES, &config.argocd.project_profiles).unwrap_or_default();

        Ok(Self {
            client: ArgoCdClientOptions::from_flags(address, &client_opts, token)?,
            templates: load_project_profiles(&profiles)?,
        })
    }
}

/// Parses the profile list. Profiles are registered in list order; within
/// one list entry, in name order.
pub fn load_project_profiles(yaml: &str) -> Result<TemplateRegistry> {
    if yaml.trim().is_empty() {
        warn!("no project profiles configured; every AppSource will be rejected");
        return Ok(TemplateRegistry::default());
    }

    let profiles: Vec<BTreeMap<String, ProjectTemplate>> = serde_yaml_ng::from_str(yaml)?;
    let mut seen = HashSet::new();
    let mut templates = Vec::new();

    for (profile, template) in profiles.into_iter().flatten() {
        if !seen.insert(template.name_pattern.clone()) {
            warn!(
                profile = %profile,
                pattern = %template.name_pattern,
                "pattern already registered by an earlier profile; this profile is unreachable"
            );
        }
        let compiled = CompiledProjectTemplate::compile(profile.clone(), template)
            .map_err(|source| Error::Pattern { profile, source })?;
        templates.push(compiled);
    }

    Ok(TemplateRegistry::new(templates))
}

impl ArgoCdClientOptions {
    /// Builds client options from `--flag [value]` style arguments.
    /// A flag without a value is a boolean switch.
    pub fn from_flags(server_addr: String, client_opts: &str, auth_token: Option<String>) -> Result<Self> {
        let flags = parse_client_opts(client_opts)?;
        let flag = |key: &str| flags.get(key).filter(|v| !v.is_empty()).cloned();
        let switch = |key: &str| flags.get(key).is_some_and(|v| v == "true");

        Ok(Self {
            server_addr,
            auth_token,
            plaintext: switch("plaintext"),
            insecure: switch("insecure"),
            server_cert_file: flag("server-crt"),
            client_cert_file: flag("client-crt"),
            client_cert_key_file: flag("client-crt-key"),
            grpc_web: switch("grpc-web"),
            grpc_web_root_path: flag("grpc-web-root-path"),
            port_forward: switch("port-forward"),
            port_forward_namespace: flag("port-forward-namespace"),
        })
    }
}

/// Splits `--key value` / `--switch` arguments into a map
pub fn parse_client_opts(opts: &str) -> Result<BTreeMap<String, String>> {
    let mut flags = BTreeMap::new();
    let mut key: Option<String> = None;

    for arg in split_args(opts)? {
        if let Some(name) = arg.strip_prefix("--") {
            if let Some(prev) = key.replace(name.to_string()) {
                flags.insert(prev, "true".to_string());
            }
        } else if let Some(k) = key.take() {
            flags.insert(k, arg);
        } else {
            return Err(Error::ClientOpts(arg));
        }
    }
    if let Some(k) = key {
        flags.insert(k, "true".to_string());
    }
    Ok(flags)
}

/// Whitespace splitting with single quotes, double quotes and backslash escapes
fn split_args(input: &str) -> Result<Vec<String>> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_arg = false;
    let mut quote: Option<char> = None;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some('"'), '\\') | (None, '\\') => match chars.next() {
                Some(next) => {
                    current.push(next);
                    in_arg = true;
                }
                None => return Err(Error::ClientOpts(input.to_string())),
            },
            (Some(_), c) => current.push(c),
            (None, '"') | (None, '\'') => {
                quote = Some(c);
                in_arg = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_arg {
                    args.push(std::mem::take(&mut current));
                    in_arg = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_arg = true;
            }
        }
    }

    if quote.is_some() {
        return Err(Error::ClientOpts(input.to_string()));
    }
    if in_arg {
        args.push(current);
    }
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_args_quotes() {
        assert_eq!(
            split_args(r#"--server-crt "/etc/certs/my ca.pem" --x 'a b' c\ d"#).unwrap(),
            vec!["--server-crt", "/etc/certs/my ca.pem", "--x", "a b", "c d"]
        );
        assert_eq!(split_args("  ").unwrap(), Vec::<String>::new());
        assert_eq!(split_args(r#"--root """#).unwrap(), vec!["--root", ""]);
        assert!(split_args("--x 'open").is_err());
    }

    #[test]
    fn test_parse_client_opts() {
        let flags = parse_client_opts("--insecure --grpc-web-root-path /argo --plaintext").unwrap();
        assert_eq!(flags["insecure"], "true");
        assert_eq!(flags["grpc-web-root-path"], "/argo");
        assert_eq!(flags["plaintext"], "true");
    }

    #[test]
    fn test_parse_client_opts_rejects_stray_value() {
        assert!(matches!(
            parse_client_opts("insecure"),
            Err(Error::ClientOpts(arg)) if arg == "insecure"
        ));
    }

    #[test]
    fn test_client_options_from_flags() {
        let opts = ArgoCdClientOptions::from_flags(
            "argocd-server:443".into(),
            "--insecure --client-crt /tls/crt --client-crt-key /tls/key",
            Some("token".into()),
        )
        .unwrap();
        assert!(opts.insecure);
        assert!(!opts.plaintext);
        assert_eq!(opts.client_cert_file.as_deref(), Some("/tls/crt"));
        assert_eq!(opts.client_cert_key_file.as_deref(), Some("/tls/key"));
        assert_eq!(opts.auth_token.as_deref(), Some("token"));
    }

    #[test]
    fn test_profiles_keep_list_order() {
        let yaml = r#"
- teams:
    namePattern: "^team-(?P<project>[a-z]+)$"
    spec:
      sourceRepos: ["*"]
- regions:
    namePattern: "(.*)-(north|west|east|south|central)-(\\d.*)"
"#;
        let registry = load_project_profiles(yaml).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.templates()[0].profile, "teams");
        assert_eq!(registry.templates()[0].spec.source_repos, vec!["*".to_string()]);

        let (name, tpl) = registry.resolve("us-west-21").unwrap();
        assert_eq!(name, "us");
        assert_eq!(tpl.profile, "regions");
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let yaml = "- broken:\n    namePattern: \"(unclosed\"\n";
        assert!(matches!(
            load_project_profiles(yaml),
            Err(Error::Pattern { profile, .. }) if profile == "broken"
        ));
    }

    #[test]
    fn test_settings_prefer_config_map() {
        let mut config = OperatorConfig::default();
        config.argocd.address = Some("fallback:443".into());
        config.argocd.project_profiles = Some("- all:\n    namePattern: \"(.*)\"\n".into());

        let mut data = BTreeMap::new();
        data.insert(KEY_ADDRESS.to_string(), "argocd-server.argocd:443".to_string());
        data.insert(KEY_CLIENT_OPTS.to_string(), "--plaintext".to_string());

        let settings = AppSourceSettings::from_config_map(&data, &config, None).unwrap();
        assert_eq!(settings.client.server_addr, "argocd-server.argocd:443");
        assert!(settings.client.plaintext);
        assert_eq!(settings.templates.len(), 1);
    }

    #[test]
    fn test_settings_require_address() {
        let err = AppSourceSettings::from_config_map(&BTreeMap::new(), &OperatorConfig::default(), None)
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
