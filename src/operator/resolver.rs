//! Project Name Resolution
//!
//! Maps an AppSource namespace to the Argo CD project it belongs to, using the
//! `namePattern` of the project templates registered by the operator admin.

use super::argocd::AppProjectSpec;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name of the capture group that, when present, holds the project name
pub const PROJECT_GROUP: &str = "project";

/// Errors raised while deriving a project name from a namespace
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("pattern '{pattern}' has no capturing groups")]
    NoCaptureGroup { pattern: String },

    #[error("namespace '{namespace}' does not match pattern '{pattern}'")]
    NoMatch { namespace: String, pattern: String },

    #[error("no project template matches namespace '{namespace}'")]
    NoTemplateMatched { namespace: String },
}

/// Project template as written by the admin in the operator ConfigMap
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectTemplate {
    pub name_pattern: String,

    #[serde(default)]
    pub spec: Option<AppProjectSpec>,
}

/// A project template whose pattern has been compiled
#[derive(Debug, Clone)]
pub struct CompiledProjectTemplate {
    pub profile: String,
    pub pattern: Regex,
    pub spec: AppProjectSpec,
}

impl CompiledProjectTemplate {
    pub fn compile(profile: impl Into<String>, template: ProjectTemplate) -> Result<Self, regex::Error> {
        Ok(Self {
            profile: profile.into(),
            pattern: Regex::new(&template.name_pattern)?,
            spec: template.spec.unwrap_or_default(),
        })
    }

    pub fn project_name(&self, namespace: &str) -> Result<String, ResolveError> {
        resolve_project_name(namespace, &self.pattern)
    }
}

/// Extracts the project name from `namespace`.
///
/// A group named `project` always wins. Without one, the leftmost unnamed
/// group is used, and if every group is named the leftmost group is used.
/// A group that did not take part in the match resolves to an empty name.
pub fn resolve_project_name(namespace: &str, pattern: &Regex) -> Result<String, ResolveError> {
    // captures_len counts the implicit whole-match group
    if pattern.captures_len() < 2 {
        return Err(ResolveError::NoCaptureGroup {
            pattern: pattern.as_str().to_string(),
        });
    }

    let captures = pattern
        .captures(namespace)
        .ok_or_else(|| ResolveError::NoMatch {
            namespace: namespace.to_string(),
            pattern: pattern.as_str().to_string(),
        })?;

    let index = project_group_index(pattern);
    Ok(captures
        .get(index)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default())
}

fn project_group_index(pattern: &Regex) -> usize {
    let names: Vec<Option<&str>> = pattern.capture_names().collect();

    if let Some(index) = names.iter().position(|n| *n == Some(PROJECT_GROUP)) {
        return index;
    }
    names
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, name)| name.is_none())
        .map(|(index, _)| index)
        .unwrap_or(1)
}

/// Ordered set of project templates; the first matching template wins.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: Vec<CompiledProjectTemplate>,
}

impl TemplateRegistry {
    pub fn new(templates: Vec<CompiledProjectTemplate>) -> Self {
        Self { templates }
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn templates(&self) -> &[CompiledProjectTemplate] {
        &self.templates
    }

    /// First template, in registration order, whose pattern matches `namespace`
    pub fn select(&self, namespace: &str) -> Result<&CompiledProjectTemplate, ResolveError> {
        self.templates
            .iter()
            .find(|t| t.pattern.is_match(namespace))
            .ok_or_else(|| ResolveError::NoTemplateMatched {
                namespace: namespace.to_string(),
            })
    }

    /// Selects the template for `namespace` and derives the project name from it
    pub fn resolve(&self, namespace: &str) -> Result<(String, &CompiledProjectTemplate), ResolveError> {
        let template = self.select(namespace)?;
        let name = template.project_name(namespace)?;
        Ok((name, template))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGION_PATTERN: &str = r"(.*)-(north|west|east|south|central)-(\d.*)";

    fn template(profile: &str, pattern: &str) -> CompiledProjectTemplate {
        CompiledProjectTemplate::compile(
            profile,
            ProjectTemplate {
                name_pattern: pattern.to_string(),
                spec: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_first_positional_group() {
        let re = Regex::new(REGION_PATTERN).unwrap();
        assert_eq!(resolve_project_name("us-west-21", &re).unwrap(), "us");
    }

    #[test]
    fn test_named_group_wins_over_positional() {
        let re = Regex::new(r"(\w+)-(?P<project>\w+)-prod").unwrap();
        assert_eq!(resolve_project_name("eu-payments-prod", &re).unwrap(), "payments");
    }

    #[test]
    fn test_unnamed_group_preferred_over_other_named_groups() {
        let re = Regex::new(r"(?P<region>\w+)-(\w+)").unwrap();
        assert_eq!(resolve_project_name("eu-payments", &re).unwrap(), "payments");
    }

    #[test]
    fn test_only_foreign_named_groups_uses_leftmost() {
        let re = Regex::new(r"(?P<team>\w+)-(?P<env>\w+)").unwrap();
        assert_eq!(resolve_project_name("ops-dev", &re).unwrap(), "ops");
    }

    #[test]
    fn test_no_capture_group() {
        let re = Regex::new(r"team-.*").unwrap();
        for ns in ["team-a", "other", ""] {
            assert!(matches!(
                resolve_project_name(ns, &re),
                Err(ResolveError::NoCaptureGroup { .. })
            ));
        }
    }

    #[test]
    fn test_no_match() {
        let re = Regex::new(REGION_PATTERN).unwrap();
        assert_eq!(
            resolve_project_name("eu-payments-uk", &re),
            Err(ResolveError::NoMatch {
                namespace: "eu-payments-uk".into(),
                pattern: REGION_PATTERN.into(),
            })
        );
    }

    #[test]
    fn test_non_participating_group_is_empty() {
        let re = Regex::new(r"^(?:(?P<project>x+)|y+)$").unwrap();
        assert_eq!(resolve_project_name("yyy", &re).unwrap(), "");
    }

    #[test]
    fn test_registry_first_match_wins() {
        let registry = TemplateRegistry::new(vec![
            template("teams", r"^team-(\w+)$"),
            template("catch-all", r"^(.*)$"),
        ]);
        let (name, tpl) = registry.resolve("team-a").unwrap();
        assert_eq!(name, "a");
        assert_eq!(tpl.profile, "teams");

        let (name, tpl) = registry.resolve("sandbox").unwrap();
        assert_eq!(name, "sandbox");
        assert_eq!(tpl.profile, "catch-all");
    }

    #[test]
    fn test_registry_no_template() {
        let registry = TemplateRegistry::new(vec![template("teams", r"^team-(\w+)$")]);
        assert!(matches!(
            registry.select("payments"),
            Err(ResolveError::NoTemplateMatched { .. })
        ));
        assert!(TemplateRegistry::default().select("anything").is_err());
    }
}
