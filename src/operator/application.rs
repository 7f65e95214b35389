//! Application Reconciler
//!
//! Creates the Argo CD Application backing an AppSource

use super::argocd::{
    Application, ApplicationDestination, ApplicationService, ApplicationSource, ApplicationSpec,
};
use super::crd::{AppSource, ConditionType, OperationType};
use super::project::ProjectReconciler;
use super::tracker::{condition, running, OperationTracker};
use super::types::{cancellable, OperatorError, Result};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Where applications are created and deployed to
#[derive(Debug, Clone)]
pub struct ApplicationSettings {
    /// API server address applications deploy to
    pub cluster_host: String,
    /// Namespace Argo CD watches for Application objects
    pub argocd_namespace: String,
    /// Also allow-list the AppSource repository on the project
    pub manage_source_repos: bool,
}

#[derive(Clone)]
pub struct ApplicationReconciler {
    applications: Arc<dyn ApplicationService>,
    projects: ProjectReconciler,
    tracker: OperationTracker,
    settings: ApplicationSettings,
}

impl ApplicationReconciler {
    pub fn new(
        applications: Arc<dyn ApplicationService>,
        projects: ProjectReconciler,
        tracker: OperationTracker,
        settings: ApplicationSettings,
    ) -> Self {
        Self {
            applications,
            projects,
            tracker,
            settings,
        }
    }

    /// Creates the application for `appsource` in `project_name` if it does
    /// not exist yet. An existing application is not modified.
    pub async fn ensure_application(
        &self,
        appsource: &mut AppSource,
        project_name: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let name = appsource.name_any();

        if cancellable(cancel, self.applications.get(&name)).await?.is_some() {
            debug!(application = %name, "application already exists");
            let exists = condition(ConditionType::ApplicationExists, "");
            // a pass interrupted after the create left its operation Running
            if running(appsource, OperationType::AppCreation) {
                return self.tracker.finish(appsource, exists, cancel).await;
            }
            return self.tracker.ensure_condition(appsource, exists, cancel).await;
        }

        self.tracker
            .start(appsource, OperationType::AppCreation, cancel)
            .await?;

        let destination = self.destination_for(appsource);
        if let Err(e) = self
            .allow_on_project(appsource, project_name, &destination, cancel)
            .await
        {
            return self.fail(appsource, e, cancel).await;
        }

        let application = self.application_for(appsource, project_name, destination);
        match cancellable(cancel, self.applications.create(&application)).await {
            Ok(_) => {
                info!(application = %name, project = project_name, "created Argo CD application");
                self.tracker
                    .finish(
                        appsource,
                        condition(ConditionType::ApplicationCreationSuccess, ""),
                        cancel,
                    )
                    .await
            }
            Err(e) => self.fail(appsource, e, cancel).await,
        }
    }

    /// The destination must be on the project before the application
    /// referencing it is created, or Argo CD rejects the application.
    async fn allow_on_project(
        &self,
        appsource: &AppSource,
        project_name: &str,
        destination: &ApplicationDestination,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if self.settings.manage_source_repos {
            self.projects
                .ensure_source_repo(project_name, &appsource.spec.repo_url, cancel)
                .await?;
        }
        self.projects
            .ensure_destination(project_name, destination, cancel)
            .await
    }

    async fn fail(
        &self,
        appsource: &mut AppSource,
        err: OperatorError,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if matches!(err, OperatorError::Cancelled) {
            return Err(err);
        }
        warn!(application = %appsource.name_any(), error = %err, "application creation failed");
        self.tracker
            .finish(
                appsource,
                condition(ConditionType::ApplicationCreationError, err.to_string()),
                cancel,
            )
            .await?;
        Err(err)
    }

    pub fn destination_for(&self, appsource: &AppSource) -> ApplicationDestination {
        ApplicationDestination {
            server: self.settings.cluster_host.clone(),
            namespace: appsource.namespace_or_default(),
        }
    }

    fn application_for(
        &self,
        appsource: &AppSource,
        project_name: &str,
        destination: ApplicationDestination,
    ) -> Application {
        Application {
            metadata: ObjectMeta {
                name: Some(appsource.name_any()),
                namespace: Some(self.settings.argocd_namespace.clone()),
                ..Default::default()
            },
            spec: ApplicationSpec {
                source: ApplicationSource {
                    repo_url: appsource.spec.repo_url.clone(),
                    path: appsource.spec.path.clone(),
                    target_revision: None,
                },
                destination,
                project: project_name.to_string(),
            },
        }
    }
}
