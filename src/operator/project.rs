//! Project Reconciler
//!
//! Makes sure the Argo CD project derived from an AppSource namespace exists
//! and allow-lists what the AppSource needs.

use super::argocd::{AppProject, AppProjectSpec, ApplicationDestination, ProjectService};
use super::crd::{AppSource, ConditionType, OperationType};
use super::tracker::{condition, running, OperationTracker};
use super::types::{cancellable, OperatorError, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default number of re-reads after a conflicting project update
pub const DEFAULT_CONFLICT_RETRIES: u32 = 3;

#[derive(Clone)]
pub struct ProjectReconciler {
    projects: Arc<dyn ProjectService>,
    tracker: OperationTracker,
    conflict_retries: u32,
}

impl ProjectReconciler {
    pub fn new(projects: Arc<dyn ProjectService>, tracker: OperationTracker) -> Self {
        Self {
            projects,
            tracker,
            conflict_retries: DEFAULT_CONFLICT_RETRIES,
        }
    }

    pub fn with_conflict_retries(mut self, retries: u32) -> Self {
        self.conflict_retries = retries;
        self
    }

    /// Creates `project_name` from `template` unless it already exists.
    ///
    /// Returns whether a project was created. Existing projects are left as
    /// they are.
    pub async fn ensure_project(
        &self,
        appsource: &mut AppSource,
        project_name: &str,
        template: &AppProjectSpec,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        if cancellable(cancel, self.projects.get(project_name)).await?.is_some() {
            debug!(project = project_name, "project already exists");
            if running(appsource, OperationType::ProjectCreation) {
                self.tracker
                    .finish(
                        appsource,
                        condition(ConditionType::ProjectCreationSuccess, ""),
                        cancel,
                    )
                    .await?;
            }
            return Ok(false);
        }

        self.tracker
            .start(appsource, OperationType::ProjectCreation, cancel)
            .await?;

        let project = AppProject::new(project_name, template.clone());
        match cancellable(cancel, self.projects.create(&project, false)).await {
            Ok(_) => {
                info!(project = project_name, "created Argo CD project");
                self.tracker
                    .finish(
                        appsource,
                        condition(ConditionType::ProjectCreationSuccess, ""),
                        cancel,
                    )
                    .await?;
                Ok(true)
            }
            Err(OperatorError::Cancelled) => Err(OperatorError::Cancelled),
            Err(e) => {
                warn!(project = project_name, error = %e, "project creation failed");
                self.tracker
                    .finish(
                        appsource,
                        condition(ConditionType::ProjectCreationError, e.to_string()),
                        cancel,
                    )
                    .await?;
                Err(OperatorError::ProjectCreation(Box::new(e)))
            }
        }
    }

    /// Adds `destination` to the project's allowed destinations if missing
    pub async fn ensure_destination(
        &self,
        project_name: &str,
        destination: &ApplicationDestination,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.update_spec(project_name, cancel, |spec| merge_destination(spec, destination))
            .await
    }

    /// Adds `repo_url` to the project's allowed source repositories if missing
    pub async fn ensure_source_repo(
        &self,
        project_name: &str,
        repo_url: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.update_spec(project_name, cancel, |spec| merge_source_repo(spec, repo_url))
            .await
    }

    /// Read-modify-write of the project spec. `mutate` reports whether it
    /// changed anything; unchanged specs are not written back. Conflicting
    /// writes are retried against a fresh copy up to `conflict_retries` times.
    async fn update_spec<F>(
        &self,
        project_name: &str,
        cancel: &CancellationToken,
        mutate: F,
    ) -> Result<()>
    where
        F: Fn(&mut AppProjectSpec) -> bool,
    {
        let mut attempt = 0;
        loop {
            let mut project = cancellable(cancel, self.projects.get(project_name))
                .await?
                .ok_or_else(|| OperatorError::NotFound(format!("project '{}'", project_name)))?;

            if !mutate(&mut project.spec) {
                return Ok(());
            }

            match cancellable(cancel, self.projects.update(&project)).await {
                Ok(_) => {
                    debug!(project = project_name, "updated project spec");
                    return Ok(());
                }
                Err(e) if e.is_conflict() && attempt < self.conflict_retries => {
                    attempt += 1;
                    warn!(project = project_name, attempt, "project update conflicted, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Inserts `destination` unless an identical entry exists
pub fn merge_destination(spec: &mut AppProjectSpec, destination: &ApplicationDestination) -> bool {
    if spec.destinations.iter().any(|d| d == destination) {
        return false;
    }
    spec.destinations.push(destination.clone());
    true
}

/// Inserts `repo_url` unless it is already listed
pub fn merge_source_repo(spec: &mut AppProjectSpec, repo_url: &str) -> bool {
    if spec.source_repos.iter().any(|r| r == repo_url) {
        return false;
    }
    spec.source_repos.push(repo_url.to_string());
    true
}
