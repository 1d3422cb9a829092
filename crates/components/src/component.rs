//! Components: named bundles of resources plus service configuration.

use crate::error::{Error, Result};
use crate::manifest::{BackupSettings, ComponentManifest, ComponentSettings};
use crate::resource::{MANIFEST_FILE, Resource, ResourceType};
use crate::resource_set::ResourceSet;
use crate::service::ServiceSet;
use crate::template;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Name of the synthetic host-wide component.
pub const ROOT_COMPONENT: &str = "root";

/// Schema version written next to installed components.
pub const CURRENT_COMPONENT_VERSION: u32 = 1;

/// Lifecycle state of a component during planning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentState {
    /// Not set; never valid once planning starts
    #[default]
    Unknown,
    /// Loaded but not yet compared
    Stale,
    /// Not installed yet
    Fresh,
    /// Installed and matching
    Ok,
    /// Installed and assigned, comparison pending
    MayNeedUpdate,
    NeedUpdate,
    /// Installed but no longer assigned
    NeedRemoval,
    Removed,
    /// The synthetic host component
    Root,
}

impl ComponentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Stale => "stale",
            Self::Fresh => "fresh",
            Self::Ok => "ok",
            Self::MayNeedUpdate => "may_need_update",
            Self::NeedUpdate => "need_update",
            Self::NeedRemoval => "need_removal",
            Self::Removed => "removed",
            Self::Root => "root",
        }
    }
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub name: String,
    pub resources: ResourceSet,
    pub services: ServiceSet,
    /// Template variables
    pub defaults: BTreeMap<String, String>,
    pub settings: ComponentSettings,
    pub backups: BackupSettings,
    pub version: u32,
    pub state: ComponentState,
}

impl Component {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resources: ResourceSet::new(),
            services: ServiceSet::new(),
            defaults: BTreeMap::new(),
            settings: ComponentSettings::default(),
            backups: BackupSettings::default(),
            version: CURRENT_COMPONENT_VERSION,
            state: ComponentState::Stale,
        }
    }

    /// The synthetic host-wide component. Build once per run and pass it
    /// down to whatever needs to file host actions.
    pub fn root() -> Self {
        let mut root = Self::new(ROOT_COMPONENT);
        root.state = ComponentState::Root;
        root
    }

    /// Apply the non-resource parts of a manifest.
    pub fn apply_manifest(&mut self, manifest: &ComponentManifest) {
        self.defaults = manifest.defaults.clone();
        self.services = manifest.services.iter().cloned().collect();
        self.settings = manifest.settings.clone();
        self.backups = manifest.backups.clone();
    }

    /// Add a resource after checking its shape and owner.
    pub fn add_resource(&mut self, resource: Resource) -> Result<()> {
        resource.validate()?;
        if resource.parent != self.name {
            return Err(Error::invalid_resource(
                &resource.path,
                &resource.parent,
                format!("belongs to {:?}, not {:?}", resource.parent, self.name),
            ));
        }
        self.resources.add(resource)
    }

    /// The synthetic resource standing for the component itself.
    pub fn to_resource(&self) -> Resource {
        Resource::new(self.name.clone(), self.name.clone(), ResourceType::Component)
    }

    pub fn manifest_resource(&self) -> Option<&Resource> {
        self.resources.get(MANIFEST_FILE)
    }

    pub fn setup_script(&self) -> Option<&str> {
        self.settings.setup_script.as_deref()
    }

    pub fn cleanup_script(&self) -> Option<&str> {
        self.settings.cleanup_script.as_deref()
    }

    /// Resolve host objects of every quadlet resource.
    pub fn resolve_host_objects(&mut self) -> Result<()> {
        let paths: Vec<String> = self.resources.paths().to_vec();
        for path in paths {
            if let Some(resource) = self.resources.get_mut(&path) {
                resource.resolve_host_object()?;
            }
        }
        Ok(())
    }

    /// Render every template resource in place. `attributes` take
    /// precedence over the component defaults.
    pub fn render_templates(&mut self, attributes: &BTreeMap<String, String>) -> Result<()> {
        let paths: Vec<String> = self.resources.paths().to_vec();
        for path in paths {
            let Some(resource) = self.resources.get_mut(&path) else {
                continue;
            };
            if !resource.template {
                continue;
            }
            resource.content = template::render(
                &resource.path,
                &resource.content,
                &[attributes, &self.defaults],
            )?;
            resource.template = false;
        }
        Ok(())
    }

    /// Find the quadlet resource whose generated service is `service`.
    pub fn service_backing(&self, service: &str) -> Option<&Resource> {
        self.resources
            .iter()
            .find(|r| r.backing_service().as_deref() == Some(service))
    }

    /// Check the component shape.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::invalid_component("", "component name is empty"));
        }
        for resource in self.resources.iter() {
            resource.validate()?;
        }
        Ok(())
    }
}
