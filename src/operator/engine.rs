//! AppSource Controller
//!
//! The reconciliation engine that drives one AppSource through project
//! resolution, project and application creation, or finalization, plus the
//! kube-runtime controller wiring around it.

use super::application::{ApplicationReconciler, ApplicationSettings};
use super::argocd::{ApplicationService, ProjectService};
use super::crd::{AppSource, ConditionType};
use super::finalizer::{FinalizerOutcome, FinalizerResolver};
use super::project::{ProjectReconciler, DEFAULT_CONFLICT_RETRIES};
use super::resolver::TemplateRegistry;
use super::store::{ObjectKey, ResourceStore};
use super::tracker::{condition, OperationTracker};
use super::types::{cancellable, OperatorError, Result};
use chrono::Utc;
use futures::StreamExt;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Api, Client};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Tunables of the engine that are not about where things are deployed
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub application: ApplicationSettings,
    pub conflict_retries: u32,
    /// `reconciledAt` is only rewritten by a pass that changed nothing else
    /// once it is older than this
    pub reconciled_refresh: Duration,
}

impl EngineSettings {
    pub fn new(application: ApplicationSettings) -> Self {
        Self {
            application,
            conflict_retries: DEFAULT_CONFLICT_RETRIES,
            reconciled_refresh: Duration::from_secs(300),
        }
    }
}

/// What a single pass did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The AppSource no longer exists
    Gone,
    /// Project and application are in place
    Reconciled { project: String, project_created: bool },
    /// The AppSource is being deleted
    Finalized(FinalizerOutcome),
}

#[derive(Clone)]
pub struct ReconciliationEngine {
    store: Arc<dyn ResourceStore>,
    templates: Arc<TemplateRegistry>,
    tracker: OperationTracker,
    projects: ProjectReconciler,
    applications: ApplicationReconciler,
    finalizers: FinalizerResolver,
    reconciled_refresh: chrono::Duration,
}

impl ReconciliationEngine {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        project_service: Arc<dyn ProjectService>,
        application_service: Arc<dyn ApplicationService>,
        templates: TemplateRegistry,
        settings: EngineSettings,
    ) -> Self {
        let tracker = OperationTracker::new(store.clone());
        let projects = ProjectReconciler::new(project_service, tracker.clone())
            .with_conflict_retries(settings.conflict_retries);
        let applications = ApplicationReconciler::new(
            application_service.clone(),
            projects.clone(),
            tracker.clone(),
            settings.application,
        );
        let finalizers = FinalizerResolver::new(application_service, store.clone(), tracker.clone());

        Self {
            store,
            templates: Arc::new(templates),
            tracker,
            projects,
            applications,
            finalizers,
            reconciled_refresh: chrono::Duration::from_std(settings.reconciled_refresh)
                .unwrap_or_else(|_| chrono::Duration::days(365)),
        }
    }

    /// Runs one reconciliation pass for the AppSource identified by `key`
    pub async fn reconcile(
        &self,
        key: &ObjectKey,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutcome> {
        let Some(mut appsource) = cancellable(cancel, self.store.get(key)).await? else {
            debug!(%key, "AppSource is gone");
            return Ok(ReconcileOutcome::Gone);
        };

        if appsource.is_deleting() {
            let outcome = self.finalizers.resolve(&mut appsource, cancel).await?;
            return Ok(ReconcileOutcome::Finalized(outcome));
        }

        let loaded_status = appsource.status.clone();

        let (project, template) = match self.templates.resolve(&key.namespace) {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!(%key, error = %e, "cannot derive project from namespace");
                self.tracker
                    .ensure_condition(
                        &mut appsource,
                        condition(ConditionType::InvalidSpec, e.to_string()),
                        cancel,
                    )
                    .await?;
                return Err(e.into());
            }
        };
        debug!(%key, project = %project, profile = %template.profile, "resolved project");

        let project_created = self
            .projects
            .ensure_project(&mut appsource, &project, &template.spec, cancel)
            .await?;
        self.applications
            .ensure_application(&mut appsource, &project, cancel)
            .await?;

        if appsource.status != loaded_status || self.reconciled_is_stale(&appsource) {
            self.tracker.mark_reconciled(&mut appsource, cancel).await?;
        }

        Ok(ReconcileOutcome::Reconciled {
            project,
            project_created,
        })
    }

    fn reconciled_is_stale(&self, appsource: &AppSource) -> bool {
        appsource
            .status
            .as_ref()
            .and_then(|s| s.reconciled_at)
            .map_or(true, |at| Utc::now() - at >= self.reconciled_refresh)
    }
}

// ==================== Controller wiring ====================

/// Context data for the controller
pub struct Context {
    pub engine: ReconciliationEngine,
    /// Cancelled on shutdown; every pass runs under a child token
    pub shutdown: CancellationToken,
    /// Periodic resync of healthy AppSources
    pub resync: Duration,
    /// Requeue delay after a transient failure
    pub error_requeue: Duration,
    /// Requeue delay after an AppSource was found to be invalid
    pub invalid_spec_requeue: Duration,
}

/// Delay before the next finalizer is handled
const NEXT_FINALIZER_REQUEUE: Duration = Duration::from_secs(1);

/// Reconciliation entry point for AppSource resources
pub async fn reconcile_appsource(appsource: Arc<AppSource>, ctx: Arc<Context>) -> Result<Action> {
    let key = ObjectKey::of(&appsource);
    let span = info_span!("reconcile", namespace = %key.namespace, name = %key.name);

    async move {
        let cancel = ctx.shutdown.child_token();
        let action = match ctx.engine.reconcile(&key, &cancel).await? {
            ReconcileOutcome::Gone => Action::await_change(),
            ReconcileOutcome::Finalized(FinalizerOutcome::Removed { remaining, .. })
                if remaining > 0 =>
            {
                Action::requeue(NEXT_FINALIZER_REQUEUE)
            }
            ReconcileOutcome::Finalized(_) => Action::await_change(),
            ReconcileOutcome::Reconciled { .. } => Action::requeue(ctx.resync),
        };
        Ok(action)
    }
    .instrument(span)
    .await
}

/// Error handler for the controller
fn error_policy(appsource: Arc<AppSource>, error: &OperatorError, ctx: Arc<Context>) -> Action {
    let key = ObjectKey::of(&appsource);
    if error.is_transient() {
        warn!(%key, error = %error, "reconciliation failed, retrying");
        Action::requeue(ctx.error_requeue)
    } else {
        error!(%key, error = %error, "AppSource is invalid");
        Action::requeue(ctx.invalid_spec_requeue)
    }
}

/// Start the AppSource controller; returns once `ctx.shutdown` is cancelled
pub async fn run_controller(client: Client, ctx: Arc<Context>) -> Result<()> {
    let appsources: Api<AppSource> = Api::all(client);
    let shutdown = ctx.shutdown.clone();

    info!("Starting AppSource controller");

    Controller::new(appsources, WatcherConfig::default())
        .graceful_shutdown_on(shutdown.cancelled_owned())
        .run(reconcile_appsource, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj, _action)) => {
                    debug!("Reconciled {}/{}", obj.namespace.as_deref().unwrap_or_default(), obj.name);
                }
                Err(e) => {
                    debug!("Reconciliation failed: {:?}", e);
                }
            }
        })
        .await;

    info!("AppSource controller stopped");
    Ok(())
}
