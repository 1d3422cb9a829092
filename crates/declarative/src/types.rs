//! Core types for live host state and execution

use crate::action::{Action, ActionType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Active state of a systemd unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitState {
    Active,
    Reloading,
    Inactive,
    Failed,
    Activating,
    Deactivating,
    /// Anything systemd reports that we don't model
    Unknown,
}

impl UnitState {
    /// Parse systemd's `ActiveState` value
    pub fn from_systemd(value: &str) -> Self {
        match value.trim() {
            "active" => Self::Active,
            "reloading" => Self::Reloading,
            "inactive" => Self::Inactive,
            "failed" => Self::Failed,
            "activating" => Self::Activating,
            "deactivating" => Self::Deactivating,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Reloading => "reloading",
            Self::Inactive => "inactive",
            Self::Failed => "failed",
            Self::Activating => "activating",
            Self::Deactivating => "deactivating",
            Self::Unknown => "unknown",
        }
    }

    /// Started, or on its way there
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Active | Self::Reloading | Self::Activating)
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live state of one service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub name: String,
    pub state: UnitState,
    pub enabled: bool,
}

impl ServiceStatus {
    /// A unit systemd doesn't know about
    pub fn missing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: UnitState::Inactive,
            enabled: false,
        }
    }
}

/// Operations on a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceOp {
    Start,
    Stop,
    Restart,
    Reload,
    Enable,
    Disable,
}

impl ServiceOp {
    /// Map a service action onto the operation it performs
    pub fn from_action(todo: ActionType) -> Option<Self> {
        match todo {
            ActionType::Start => Some(Self::Start),
            ActionType::Stop => Some(Self::Stop),
            ActionType::Restart => Some(Self::Restart),
            ActionType::Reload => Some(Self::Reload),
            ActionType::Enable => Some(Self::Enable),
            ActionType::Disable => Some(Self::Disable),
            _ => None,
        }
    }

    /// systemctl verb
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Reload => "reload",
            Self::Enable => "enable",
            Self::Disable => "disable",
        }
    }
}

/// A podman volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeInfo {
    pub name: String,
}

/// A podman network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub name: String,
}

/// A podman image and every name it is known by
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub id: String,
    pub names: Vec<String>,
}

impl ImageInfo {
    pub fn is_named(&self, name: &str) -> bool {
        self.id == name || self.names.iter().any(|n| n == name)
    }
}

/// A podman container (running or not)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub name: String,
    pub image: String,
}

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Timeout for service operations without their own
    pub default_timeout: Duration,
    /// Upper bound for each post-execution convergence wait
    pub verify_timeout: Duration,
    /// Where volume dumps are written and imported from
    pub backup_dir: PathBuf,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(90),
            verify_timeout: Duration::from_secs(120),
            backup_dir: PathBuf::from("/var/lib/materia/backups"),
        }
    }
}

/// Summary of execution results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteSummary {
    /// The plan was empty
    pub nothing_to_do: bool,
    /// Steps applied
    pub completed: usize,
    pub installed: usize,
    pub updated: usize,
    pub removed: usize,
    pub service_actions: usize,
    pub host_actions: usize,
}

impl ExecuteSummary {
    pub fn nothing_to_do() -> Self {
        Self {
            nothing_to_do: true,
            ..Self::default()
        }
    }

    /// Count one applied step
    pub fn record(&mut self, action: &Action) {
        self.completed += 1;
        match action.todo {
            ActionType::Install => self.installed += 1,
            ActionType::Update => self.updated += 1,
            ActionType::Remove => self.removed += 1,
            todo if todo.is_service_action() => self.service_actions += 1,
            _ => self.host_actions += 1,
        }
    }

    /// Total number of file-level changes
    pub fn total_changes(&self) -> usize {
        self.installed + self.updated + self.removed
    }
}
