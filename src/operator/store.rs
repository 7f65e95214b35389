//! AppSource Storage
//!
//! Read and write access to AppSource objects and their status sub-resource

use super::crd::AppSource;
use super::types::{OperatorError, Result};
use async_trait::async_trait;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use serde_json::{json, Value};
use std::fmt;

/// Namespaced identity of an AppSource
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn of(appsource: &AppSource) -> Self {
        Self::new(appsource.namespace_or_default(), appsource.name_any())
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Storage for AppSource objects.
///
/// Writes are guarded by the object's resource version; a stale write fails
/// with [`OperatorError::Conflict`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// `Ok(None)` when the object no longer exists
    async fn get(&self, key: &ObjectKey) -> Result<Option<AppSource>>;

    /// Persists metadata changes such as finalizers
    async fn update(&self, appsource: &AppSource) -> Result<AppSource>;

    /// Persists `status` only
    async fn update_status(&self, appsource: &AppSource) -> Result<AppSource>;
}

/// [`ResourceStore`] backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeResourceStore {
    client: Client,
}

impl KubeResourceStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<AppSource> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ResourceStore for KubeResourceStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<AppSource>> {
        Ok(self.api(&key.namespace).get_opt(&key.name).await?)
    }

    async fn update(&self, appsource: &AppSource) -> Result<AppSource> {
        let key = ObjectKey::of(appsource);
        let patch = json!({
            "metadata": {
                "resourceVersion": appsource.resource_version(),
                "finalizers": appsource.finalizers(),
            }
        });

        self.api(&key.namespace)
            .patch(&key.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(conflict_aware)
    }

    async fn update_status(&self, appsource: &AppSource) -> Result<AppSource> {
        let key = ObjectKey::of(appsource);
        let patch = status_patch(appsource)?;

        self.api(&key.namespace)
            .patch_status(&key.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(conflict_aware)
    }
}

/// Merge patch replacing the whole status.
///
/// In a merge patch an absent key keeps the stored value, so every status
/// field the operator owns is written, with `null` for unset values. A Running
/// operation therefore drops the `finishedAt` of the operation it replaces.
fn status_patch(appsource: &AppSource) -> Result<Value> {
    let mut status = serde_json::to_value(appsource.status.clone().unwrap_or_default())?;
    if let Value::Object(fields) = &mut status {
        for key in ["operation", "conditions", "reconciledAt"] {
            fields.entry(key).or_insert(Value::Null);
        }
        if let Some(Value::Object(operation)) = fields.get_mut("operation") {
            operation.entry("finishedAt").or_insert(Value::Null);
        }
    }

    Ok(json!({
        "metadata": {
            "resourceVersion": appsource.resource_version(),
        },
        "status": status,
    }))
}

fn conflict_aware(err: kube::Error) -> OperatorError {
    match err {
        kube::Error::Api(resp) if resp.code == 409 => OperatorError::Conflict(resp.message),
        other => OperatorError::KubeError(other),
    }
}
