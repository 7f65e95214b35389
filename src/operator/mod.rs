mod application;
mod argocd;
mod argocd_client;
mod crd;
mod engine;
mod finalizer;
mod project;
mod resolver;
mod store;
mod tracker;
mod types;

pub use application::{ApplicationReconciler, ApplicationSettings};
pub use argocd::{
    AppProject, AppProjectSpec, Application, ApplicationDestination, ApplicationService,
    ApplicationSource, ApplicationSpec, DeleteOptions, GroupKind, ProjectService,
    PropagationPolicy,
};
pub use argocd_client::ArgoCdClient;
pub use crd::{
    AppSource, AppSourceCondition, AppSourceSpec, AppSourceStatus, ConditionStatus, ConditionType,
    Operation, OperationPhase, OperationType, CONDITION_HISTORY_LIMIT,
};
pub use engine::{
    reconcile_appsource, run_controller, Context, EngineSettings, ReconcileOutcome,
    ReconciliationEngine,
};
pub use finalizer::{
    FinalizerKind, FinalizerOutcome, FinalizerResolver, FINALIZER_BACKGROUND,
    FINALIZER_BACKGROUND_CASCADE, FINALIZER_FOREGROUND, FINALIZER_FOREGROUND_CASCADE,
};
pub use project::{merge_destination, merge_source_repo, ProjectReconciler, DEFAULT_CONFLICT_RETRIES};
pub use resolver::{
    resolve_project_name, CompiledProjectTemplate, ProjectTemplate, ResolveError,
    TemplateRegistry, PROJECT_GROUP,
};
pub use store::{KubeResourceStore, ObjectKey, ResourceStore};
pub use tracker::{condition, running, OperationTracker};
pub use types::{cancellable, OperatorError, Result};
