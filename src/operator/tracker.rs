//! Operation Tracker
//!
//! Records operations and conditions in the AppSource status sub-resource.
//! Every call persists the status once and refreshes the caller's copy with
//! the stored object so that later writes carry the new resource version.

use super::crd::{
    AppSource, AppSourceCondition, ConditionType, Operation, OperationPhase, OperationType,
};
use super::store::ResourceStore;
use super::types::{cancellable, Result};
use chrono::Utc;
use kube::ResourceExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct OperationTracker {
    store: Arc<dyn ResourceStore>,
}

impl OperationTracker {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self { store }
    }

    /// Replaces the operation record with a fresh Running one
    pub async fn start(
        &self,
        appsource: &mut AppSource,
        type_: OperationType,
        cancel: &CancellationToken,
    ) -> Result<()> {
        debug!(name = %appsource.name_any(), operation = ?type_, "starting operation");
        appsource.status_or_default().operation = Some(Operation::start(type_, Utc::now()));
        self.persist(appsource, cancel).await
    }

    /// Counts another attempt of the current operation without restarting it
    pub async fn retry(&self, appsource: &mut AppSource, cancel: &CancellationToken) -> Result<()> {
        if let Some(op) = appsource.status_or_default().operation.as_mut() {
            op.retry_count += 1;
            debug!(operation = ?op.type_, retry_count = op.retry_count, "retrying operation");
        }
        self.persist(appsource, cancel).await
    }

    /// Finishes the current operation and records `condition`.
    ///
    /// The phase is Error for error conditions and Succeeded otherwise.
    pub async fn finish(
        &self,
        appsource: &mut AppSource,
        condition: AppSourceCondition,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let phase = if condition.type_.is_error() {
            OperationPhase::Error
        } else {
            OperationPhase::Succeeded
        };
        let now = condition.last_transition_time;
        let name = appsource.name_any();
        let status = appsource.status_or_default();

        match status.operation.as_mut() {
            Some(op) => op.finish(phase, now),
            None => warn!(name = %name, "finishing an operation that was never started"),
        }
        status.push_condition(condition);
        self.persist(appsource, cancel).await
    }

    /// Records a condition outside of any operation
    pub async fn set_condition(
        &self,
        appsource: &mut AppSource,
        condition: AppSourceCondition,
        cancel: &CancellationToken,
    ) -> Result<()> {
        appsource.status_or_default().push_condition(condition);
        self.persist(appsource, cancel).await
    }

    /// Records `condition` unless the same outcome is already the current condition
    pub async fn ensure_condition(
        &self,
        appsource: &mut AppSource,
        condition: AppSourceCondition,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let current = appsource
            .status
            .as_ref()
            .and_then(|s| s.current_condition());
        if current.is_some_and(|c| c.same_outcome(&condition)) {
            return Ok(());
        }
        self.set_condition(appsource, condition, cancel).await
    }

    /// Stamps `reconciledAt` with the current time
    pub async fn mark_reconciled(
        &self,
        appsource: &mut AppSource,
        cancel: &CancellationToken,
    ) -> Result<()> {
        appsource.status_or_default().reconciled_at = Some(Utc::now());
        self.persist(appsource, cancel).await
    }

    async fn persist(&self, appsource: &mut AppSource, cancel: &CancellationToken) -> Result<()> {
        let stored = cancellable(cancel, self.store.update_status(appsource)).await?;
        *appsource = stored;
        Ok(())
    }
}

/// Whether `appsource` records a Running operation of type `type_`
pub fn running(appsource: &AppSource, type_: OperationType) -> bool {
    appsource
        .status
        .as_ref()
        .and_then(|s| s.running_operation(type_))
        .is_some()
}

/// Shorthand for a condition observed now
pub fn condition(type_: ConditionType, message: impl Into<String>) -> AppSourceCondition {
    AppSourceCondition::new(type_, message, Utc::now())
}
