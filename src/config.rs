use anyhow::{Context, Result};
use declarative::{ExecuteOptions, PlannerConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths;

/// Environment overrides, applied after the config file
pub const ENV_SOURCE_DIR: &str = "MATERIA_SOURCE_DIR";
pub const ENV_DATA_DIR: &str = "MATERIA_DATA_DIR";
pub const ENV_QUADLET_DIR: &str = "MATERIA_QUADLET_DIR";

// ============================================================================
// Materia Config
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MateriaConfig {
    /// Defaults to the contents of /etc/hostname
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub source_dir: String,
    pub data_dir: String,
    pub quadlet_dir: String,
    pub backup_dir: String,
    /// Talk to the user systemd instance and rootless podman
    pub user_mode: bool,
    pub cleanup_quadlets: bool,
    pub cleanup_volumes: bool,
    pub backup_volumes: bool,
    pub migrate_volumes: bool,
    /// Seconds
    pub service_timeout: u64,
    /// Seconds
    pub verify_timeout: u64,
    /// Template variables and podman secret values
    pub attributes: BTreeMap<String, String>,
}

impl Default for MateriaConfig {
    fn default() -> Self {
        Self {
            hostname: None,
            source_dir: "/var/lib/materia/source".to_string(),
            data_dir: "/var/lib/materia/components".to_string(),
            quadlet_dir: "/etc/containers/systemd".to_string(),
            backup_dir: "/var/lib/materia/backups".to_string(),
            user_mode: false,
            cleanup_quadlets: true,
            cleanup_volumes: false,
            backup_volumes: true,
            migrate_volumes: false,
            service_timeout: 90,
            verify_timeout: 120,
            attributes: BTreeMap::new(),
        }
    }
}

impl MateriaConfig {
    /// Load config.toml from the config dir, falling back to defaults when
    /// it doesn't exist, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = paths::config_file()?;
        let mut config = Self::load_from(&path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        for (key, field) in [
            (ENV_SOURCE_DIR, &mut self.source_dir),
            (ENV_DATA_DIR, &mut self.data_dir),
            (ENV_QUADLET_DIR, &mut self.quadlet_dir),
        ] {
            if let Some(value) = env(key).filter(|v| !v.is_empty()) {
                log::debug!("{} overrides config: {}", key, value);
                *field = value;
            }
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// The configured host name, or /etc/hostname
    pub fn hostname(&self) -> Result<String> {
        match &self.hostname {
            Some(name) if !name.is_empty() => Ok(name.clone()),
            _ => paths::hostname_from(Path::new("/etc/hostname")),
        }
    }

    pub fn source_path(&self) -> PathBuf {
        paths::expand(&self.source_dir)
    }

    pub fn data_path(&self) -> PathBuf {
        paths::expand(&self.data_dir)
    }

    pub fn quadlet_path(&self) -> PathBuf {
        paths::expand(&self.quadlet_dir)
    }

    pub fn planner_config(&self) -> PlannerConfig {
        PlannerConfig {
            cleanup_quadlets: self.cleanup_quadlets,
            cleanup_volumes: self.cleanup_volumes,
            backup_volumes: self.backup_volumes,
            migrate_volumes: self.migrate_volumes,
            default_service_timeout: self.service_timeout,
        }
    }

    pub fn execute_options(&self) -> ExecuteOptions {
        ExecuteOptions {
            default_timeout: Duration::from_secs(self.service_timeout),
            verify_timeout: Duration::from_secs(self.verify_timeout),
            backup_dir: paths::expand(&self.backup_dir),
        }
    }
}
