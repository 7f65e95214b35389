//! Finalizer Resolver
//!
//! Deletes the Argo CD Application of an AppSource that is being deleted and
//! releases the AppSource afterwards. The finalizer token chosen by the user
//! selects how the application is deleted. A finalizer is only removed once
//! its delete call succeeded, so a failed or interrupted pass is retried by
//! the next reconcile.

use super::argocd::{ApplicationService, DeleteOptions, PropagationPolicy};
use super::crd::{AppSource, ConditionType, OperationType};
use super::store::ResourceStore;
use super::tracker::{condition, running, OperationTracker};
use super::types::{cancellable, OperatorError, Result};
use kube::ResourceExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const FINALIZER_FOREGROUND: &str = "argoproj.io/appsource-finalizer-fg";
pub const FINALIZER_BACKGROUND: &str = "argoproj.io/appsource-finalizer-bg";
pub const FINALIZER_FOREGROUND_CASCADE: &str = "argoproj.io/appsource-finalizer-fg-cascade";
pub const FINALIZER_BACKGROUND_CASCADE: &str = "argoproj.io/appsource-finalizer-bg-cascade";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizerKind {
    ForegroundDelete,
    BackgroundDelete,
    ForegroundCascadeDelete,
    BackgroundCascadeDelete,
}

impl FinalizerKind {
    pub const ALL: [FinalizerKind; 4] = [
        FinalizerKind::ForegroundDelete,
        FinalizerKind::BackgroundDelete,
        FinalizerKind::ForegroundCascadeDelete,
        FinalizerKind::BackgroundCascadeDelete,
    ];

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.token() == token)
    }

    pub fn token(&self) -> &'static str {
        match self {
            FinalizerKind::ForegroundDelete => FINALIZER_FOREGROUND,
            FinalizerKind::BackgroundDelete => FINALIZER_BACKGROUND,
            FinalizerKind::ForegroundCascadeDelete => FINALIZER_FOREGROUND_CASCADE,
            FinalizerKind::BackgroundCascadeDelete => FINALIZER_BACKGROUND_CASCADE,
        }
    }

    pub fn is_cascade(&self) -> bool {
        matches!(
            self,
            FinalizerKind::ForegroundCascadeDelete | FinalizerKind::BackgroundCascadeDelete
        )
    }

    pub fn delete_options(&self) -> DeleteOptions {
        let cascade = self.is_cascade();
        DeleteOptions {
            cascade,
            propagation_policy: cascade.then_some(PropagationPolicy::Background),
        }
    }
}

/// Result of one finalizer pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizerOutcome {
    /// `token` was resolved and removed; `remaining` known tokens are left
    Removed { token: String, remaining: usize },
    /// The resource carries none of our finalizers
    Nothing,
}

#[derive(Clone)]
pub struct FinalizerResolver {
    applications: Arc<dyn ApplicationService>,
    store: Arc<dyn ResourceStore>,
    tracker: OperationTracker,
}

impl FinalizerResolver {
    pub fn new(
        applications: Arc<dyn ApplicationService>,
        store: Arc<dyn ResourceStore>,
        tracker: OperationTracker,
    ) -> Self {
        Self {
            applications,
            store,
            tracker,
        }
    }

    /// Resolves the first known finalizer on `appsource`
    pub async fn resolve(
        &self,
        appsource: &mut AppSource,
        cancel: &CancellationToken,
    ) -> Result<FinalizerOutcome> {
        let Some(kind) = first_known(appsource) else {
            return Ok(FinalizerOutcome::Nothing);
        };
        let name = appsource.name_any();

        if running(appsource, OperationType::AppDeletion) {
            self.tracker.retry(appsource, cancel).await?;
        } else {
            self.tracker
                .start(appsource, OperationType::AppDeletion, cancel)
                .await?;
        }

        let options = kind.delete_options();
        match cancellable(cancel, self.applications.delete(&name, &options)).await {
            Ok(()) | Err(OperatorError::NotFound(_)) => {}
            Err(OperatorError::Cancelled) => return Err(OperatorError::Cancelled),
            Err(e) => {
                warn!(application = %name, finalizer = kind.token(), error = %e, "application deletion failed");
                self.tracker
                    .finish(
                        appsource,
                        condition(ConditionType::ApplicationDeletionError, e.to_string()),
                        cancel,
                    )
                    .await?;
                return Err(e);
            }
        }

        info!(application = %name, cascade = options.cascade, "deleted Argo CD application");
        self.tracker
            .finish(
                appsource,
                condition(ConditionType::ApplicationDeletionSuccess, ""),
                cancel,
            )
            .await?;

        appsource.finalizers_mut().retain(|f| f != kind.token());
        let stored = cancellable(cancel, self.store.update(appsource)).await?;
        *appsource = stored;

        Ok(FinalizerOutcome::Removed {
            token: kind.token().to_string(),
            remaining: known_count(appsource),
        })
    }
}

fn first_known(appsource: &AppSource) -> Option<FinalizerKind> {
    appsource
        .finalizers()
        .iter()
        .find_map(|f| FinalizerKind::from_token(f))
}

fn known_count(appsource: &AppSource) -> usize {
    appsource
        .finalizers()
        .iter()
        .filter(|f| FinalizerKind::from_token(f).is_some())
        .count()
}
