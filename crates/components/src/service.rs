//! Declared service configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a component wants one of its systemd services handled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ServiceResourceConfig {
    /// Unit name, e.g. `hello.service`
    pub service: String,
    /// Resource paths whose change restarts this service
    pub restarted_by: Vec<String>,
    /// Resource paths whose change reloads this service
    pub reloaded_by: Vec<String>,
    /// Never enable, even if static
    pub disabled: bool,
    /// Unit is not generated with an [Install] section and must be enabled explicitly
    #[serde(rename = "Static")]
    pub static_: bool,
    /// Declared but should not be running
    pub stopped: bool,
    /// Start timeout in seconds
    pub timeout: Option<u64>,
}

impl ServiceResourceConfig {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            ..Self::default()
        }
    }

    pub fn is_restarted_by(&self, path: &str) -> bool {
        self.restarted_by.iter().any(|p| p == path)
    }

    pub fn is_reloaded_by(&self, path: &str) -> bool {
        self.reloaded_by.iter().any(|p| p == path)
    }
}

/// Services keyed and ordered by unit name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceSet {
    services: BTreeMap<String, ServiceResourceConfig>,
}

impl ServiceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the config for `config.service`.
    pub fn add(&mut self, config: ServiceResourceConfig) {
        self.services.insert(config.service.clone(), config);
    }

    pub fn get(&self, name: &str) -> Option<&ServiceResourceConfig> {
        self.services.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<ServiceResourceConfig> {
        self.services.remove(name)
    }

    pub fn list(&self) -> impl Iterator<Item = &ServiceResourceConfig> {
        self.services.values()
    }

    pub fn list_names(&self) -> Vec<&str> {
        self.services.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl FromIterator<ServiceResourceConfig> for ServiceSet {
    fn from_iter<I: IntoIterator<Item = ServiceResourceConfig>>(iter: I) -> Self {
        let mut set = ServiceSet::new();
        for config in iter {
            set.add(config);
        }
        set
    }
}
