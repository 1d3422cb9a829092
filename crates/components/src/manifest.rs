//! `MANIFEST.toml` schema.
//!
//! ```toml
//! Secrets = ["db_password"]
//!
//! [Defaults]
//! port = "8080"
//!
//! [[Services]]
//! Service = "hello.service"
//! RestartedBy = ["hello.env"]
//!
//! [Settings]
//! NoRestart = false
//! SetupScript = "setup.sh"
//!
//! [Backups]
//! Skip = ["cache.volume"]
//! ```

use crate::error::{Error, Result};
use crate::service::ServiceResourceConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ComponentManifest {
    /// Template variables
    pub defaults: BTreeMap<String, String>,
    pub services: Vec<ServiceResourceConfig>,
    /// Podman secrets the component needs
    pub secrets: Vec<String>,
    /// Files to treat as scripts regardless of extension
    pub scripts: Vec<String>,
    pub backups: BackupSettings,
    pub settings: ComponentSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ComponentSettings {
    /// Don't restart containers/pods just because their unit changed
    pub no_restart: bool,
    pub setup_script: Option<String>,
    pub cleanup_script: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct BackupSettings {
    /// Volume paths never dumped before cleanup
    pub skip: Vec<String>,
}

impl ComponentManifest {
    pub fn parse(component: &str, content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|source| Error::Manifest {
            component: component.to_string(),
            source,
        })
    }
}
