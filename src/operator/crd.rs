//! AppSource Custom Resource
//!
//! The `AppSource` CRD and its status: the operation record and the capped
//! condition history written by the operator.

use chrono::{DateTime, Utc};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Number of conditions kept in `status.conditions`
pub const CONDITION_HISTORY_LIMIT: usize = 10;

// ==================== AppSource CRD ====================

#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "argoproj.io",
    version = "v1alpha1",
    kind = "AppSource",
    plural = "appsources",
    shortname = "as",
    status = "AppSourceStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct AppSourceSpec {
    /// Git repository holding the manifests to deploy
    #[serde(rename = "repoURL")]
    pub repo_url: String,

    /// Directory inside the repository
    pub path: String,
}

impl AppSource {
    /// True once the API server has stamped a deletion timestamp
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn status_or_default(&mut self) -> &mut AppSourceStatus {
        self.status.get_or_insert_with(AppSourceStatus::default)
    }

    pub fn namespace_or_default(&self) -> String {
        self.namespace().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppSourceStatus {
    /// In-flight or most recently finished operation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<Operation>,

    /// Condition history, oldest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<AppSourceCondition>,

    /// Time of the last fully successful reconciliation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconciled_at: Option<DateTime<Utc>>,
}

impl AppSourceStatus {
    /// Appends `condition`, dropping the oldest entries past the history limit
    pub fn push_condition(&mut self, condition: AppSourceCondition) {
        self.conditions.push(condition);
        if self.conditions.len() > CONDITION_HISTORY_LIMIT {
            let excess = self.conditions.len() - CONDITION_HISTORY_LIMIT;
            self.conditions.drain(..excess);
        }
    }

    /// Most recently written condition
    pub fn current_condition(&self) -> Option<&AppSourceCondition> {
        self.conditions.last()
    }

    /// Most recent condition of the given type
    pub fn condition(&self, type_: ConditionType) -> Option<&AppSourceCondition> {
        self.conditions.iter().rev().find(|c| c.type_ == type_)
    }

    /// The operation of type `type_` if it is still running
    pub fn running_operation(&self, type_: OperationType) -> Option<&Operation> {
        self.operation
            .as_ref()
            .filter(|op| op.type_ == type_ && op.phase == OperationPhase::Running)
    }
}

// ==================== Operations ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum OperationType {
    ProjectCreation,
    AppCreation,
    AppDeletion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum OperationPhase {
    Running,
    Succeeded,
    Error,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(rename = "type")]
    pub type_: OperationType,

    pub phase: OperationPhase,

    pub started_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub retry_count: u32,
}

impl Operation {
    pub fn start(type_: OperationType, now: DateTime<Utc>) -> Self {
        Self {
            type_,
            phase: OperationPhase::Running,
            started_at: now,
            finished_at: None,
            retry_count: 0,
        }
    }

    pub fn finish(&mut self, phase: OperationPhase, now: DateTime<Utc>) {
        self.phase = phase;
        self.finished_at = Some(now);
    }
}

// ==================== Conditions ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum ConditionType {
    ProjectCreationSuccess,
    ProjectCreationError,
    ApplicationExists,
    ApplicationCreationSuccess,
    ApplicationCreationError,
    ApplicationDeletionSuccess,
    ApplicationDeletionError,
    #[serde(rename = "InvalidSpecError")]
    InvalidSpec,
    #[serde(rename = "UnknownError")]
    Unknown,
}

impl ConditionType {
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            ConditionType::ProjectCreationError
                | ConditionType::ApplicationCreationError
                | ConditionType::ApplicationDeletionError
                | ConditionType::InvalidSpec
                | ConditionType::Unknown
        )
    }

    pub fn status(&self) -> ConditionStatus {
        if self.is_error() {
            ConditionStatus::False
        } else {
            ConditionStatus::True
        }
    }

    /// Message used when the caller has nothing more specific to say
    pub fn default_message(&self) -> &'static str {
        match self {
            ConditionType::ProjectCreationSuccess => "Argo CD Project was successfully created",
            ConditionType::ApplicationExists => "Argo CD Application exists",
            ConditionType::ApplicationCreationSuccess => {
                "Argo CD Application was successfully created"
            }
            ConditionType::ApplicationDeletionSuccess => {
                "Argo CD Application was successfully deleted"
            }
            _ => "",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppSourceCondition {
    #[serde(rename = "type")]
    pub type_: ConditionType,

    #[serde(default)]
    pub message: String,

    pub status: ConditionStatus,

    pub last_transition_time: DateTime<Utc>,
}

impl AppSourceCondition {
    pub fn new(type_: ConditionType, message: impl Into<String>, now: DateTime<Utc>) -> Self {
        let message = message.into();
        Self {
            type_,
            message: if message.is_empty() {
                type_.default_message().to_string()
            } else {
                message
            },
            status: type_.status(),
            last_transition_time: now,
        }
    }

    /// Same outcome as `other`, ignoring when it was observed
    pub fn same_outcome(&self, other: &AppSourceCondition) -> bool {
        self.type_ == other.type_ && self.status == other.status && self.message == other.message
    }
}
