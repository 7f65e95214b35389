//! Argo CD Resource Model
//!
//! The subset of the Argo CD `AppProject` and `Application` objects the
//! operator reads and writes, plus the service traits used to reach them.

use super::types::Result;
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==================== AppProject ====================

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppProject {
    #[serde(default)]
    pub metadata: ObjectMeta,

    #[serde(default)]
    pub spec: AppProjectSpec,
}

impl AppProject {
    pub fn new(name: impl Into<String>, spec: AppProjectSpec) -> Self {
        Self {
            metadata: ObjectMeta {
                name: Some(name.into()),
                ..Default::default()
            },
            spec,
        }
    }

    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }
}

/// Project spec. Fields the operator does not manage are carried through
/// `extra` so that updates do not drop them.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppProjectSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_repos: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub destinations: Vec<ApplicationDestination>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cluster_resource_whitelist: Vec<GroupKind>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationDestination {
    #[serde(default)]
    pub server: String,

    #[serde(default)]
    pub namespace: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct GroupKind {
    pub group: String,
    pub kind: String,
}

// ==================== Application ====================

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    #[serde(default)]
    pub metadata: ObjectMeta,

    pub spec: ApplicationSpec,
}

impl Application {
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSpec {
    pub source: ApplicationSource,
    pub destination: ApplicationDestination,
    pub project: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSource {
    #[serde(rename = "repoURL")]
    pub repo_url: String,

    #[serde(default)]
    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_revision: Option<String>,
}

// ==================== Deletion ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagationPolicy {
    Foreground,
    Background,
}

impl PropagationPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropagationPolicy::Foreground => "foreground",
            PropagationPolicy::Background => "background",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeleteOptions {
    pub cascade: bool,
    pub propagation_policy: Option<PropagationPolicy>,
}

// ==================== Services ====================

/// Argo CD project API
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProjectService: Send + Sync {
    /// `Ok(None)` when the project does not exist
    async fn get(&self, name: &str) -> Result<Option<AppProject>>;

    async fn create(&self, project: &AppProject, upsert: bool) -> Result<AppProject>;

    /// Fails with a conflict error when `project` carries a stale resource version
    async fn update(&self, project: &AppProject) -> Result<AppProject>;
}

/// Argo CD application API
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ApplicationService: Send + Sync {
    /// `Ok(None)` when the application does not exist
    async fn get(&self, name: &str) -> Result<Option<Application>>;

    async fn create(&self, application: &Application) -> Result<Application>;

    /// Deleting an application that is already gone succeeds
    async fn delete(&self, name: &str, options: &DeleteOptions) -> Result<()>;
}
