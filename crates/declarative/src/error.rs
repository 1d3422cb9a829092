//! Error types for planning and execution

use crate::action::ActionType;
use components::ResourceType;
use thiserror::Error;

/// Errors raised while building or validating a plan
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("component name is empty")]
    EmptyName,

    #[error("component tree {tree:?} pairs host {host:?} with source {source_name:?}")]
    NameMismatch {
        tree: String,
        host: String,
        source_name: String,
    },

    #[error("component {0:?} appears twice on the same side")]
    DuplicateComponent(String),

    #[error("component {name:?} is being removed but its state is {state}, not need_removal")]
    NotMarkedForRemoval { name: String, state: String },

    #[error("no priority for {todo} on {kind} resources")]
    NoPriority { kind: ResourceType, todo: ActionType },

    #[error("invalid action {action}: {reason}")]
    InvalidAction { action: String, reason: String },

    #[error("validation failed at step {step} ({rule}): {detail}")]
    Validation {
        rule: &'static str,
        step: usize,
        detail: String,
    },

    #[error("failed to query live state: {context}")]
    LiveState {
        context: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Component(#[from] components::Error),
}

impl PlanError {
    pub(crate) fn live(context: impl Into<String>, source: anyhow::Error) -> Self {
        Self::LiveState {
            context: context.into(),
            source,
        }
    }
}

/// Why a step failed
#[derive(Debug, Error)]
pub enum ExecuteErrorKind {
    #[error("no handlers for {0} resources")]
    MissingKind(ResourceType),

    #[error("{kind} resources do not support {todo}")]
    MissingAction { kind: ResourceType, todo: ActionType },

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// A step failed; nothing after it ran.
#[derive(Debug, Error)]
#[error("step {step} ({action}) failed after {completed} completed steps: {kind}")]
pub struct ExecuteError {
    /// Steps applied before the failure
    pub completed: usize,
    /// 1-based index of the failing step
    pub step: usize,
    /// Display form of the failing action
    pub action: String,
    #[source]
    pub kind: ExecuteErrorKind,
}

impl ExecuteError {
    /// Configuration errors are never worth retrying.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self.kind,
            ExecuteErrorKind::MissingKind(_) | ExecuteErrorKind::MissingAction { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PlanError>;
