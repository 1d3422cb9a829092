//! Actions: one change the executor applies to the host.

use crate::error::{PlanError, Result};
use components::{Component, ContentDiff, Resource, ResourceType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// What to do with a target resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Install,
    Remove,
    Update,
    Start,
    Stop,
    Restart,
    Reload,
    Enable,
    Disable,
    /// Recreate a missing backing object through its unit
    Ensure,
    Setup,
    Cleanup,
    Mount,
    Import,
    Dump,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Remove => "remove",
            Self::Update => "update",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Reload => "reload",
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::Ensure => "ensure",
            Self::Setup => "setup",
            Self::Cleanup => "cleanup",
            Self::Mount => "mount",
            Self::Import => "import",
            Self::Dump => "dump",
        }
    }

    /// Actions filed as service changes and coalesced per unit.
    pub fn is_service_action(&self) -> bool {
        matches!(
            self,
            Self::Start | Self::Stop | Self::Restart | Self::Reload | Self::Enable | Self::Disable
        )
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-action overrides
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionMetadata {
    /// Seconds to wait for the service operation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_timeout: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub todo: ActionType,
    pub parent: Arc<Component>,
    pub target: Resource,
    pub diff: Option<ContentDiff>,
    /// 0 means "look it up in the priority table"
    pub priority: u8,
    pub metadata: Option<ActionMetadata>,
}

impl Action {
    pub fn new(todo: ActionType, parent: &Arc<Component>, target: Resource) -> Self {
        Self {
            todo,
            parent: Arc::clone(parent),
            target,
            diff: None,
            priority: 0,
            metadata: None,
        }
    }

    pub fn with_diff(mut self, diff: ContentDiff) -> Self {
        self.diff = Some(diff);
        self
    }

    /// Pin the action to a manual priority.
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.metadata
            .get_or_insert_with(ActionMetadata::default)
            .service_timeout = Some(seconds);
        self
    }

    pub fn service_timeout(&self) -> Option<u64> {
        self.metadata.as_ref().and_then(|m| m.service_timeout)
    }

    /// Whether the target is the host sentinel
    pub fn targets_host(&self) -> bool {
        self.target.kind == ResourceType::Host
    }

    pub fn validate(&self) -> Result<()> {
        if self.parent.name.is_empty() {
            return Err(self.invalid("parent component has no name"));
        }
        self.target.validate()?;
        if self.todo == ActionType::Update && self.target.kind.has_content() && self.diff.is_none()
        {
            return Err(self.invalid("content update without a diff"));
        }
        Ok(())
    }

    fn invalid(&self, reason: &str) -> PlanError {
        PlanError::InvalidAction {
            action: self.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Serializable form, with the parent collapsed to its name.
    pub fn to_record(&self) -> ActionRecord {
        let diff = match self.target.kind {
            ResourceType::PodmanSecret => self.diff.as_ref().map(|_| ContentDiff::empty()),
            _ => self.diff.clone(),
        };
        ActionRecord {
            todo: self.todo,
            parent: self.parent.name.clone(),
            target: self.target.clone(),
            diff,
            priority: self.priority,
            metadata: self.metadata.clone(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.todo, self.target)
    }
}

/// An action as it appears in JSON output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub todo: ActionType,
    pub parent: String,
    pub target: Resource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<ContentDiff>,
    #[serde(default)]
    pub priority: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ActionMetadata>,
}
