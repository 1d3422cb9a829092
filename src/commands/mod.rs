pub mod config;
pub mod plan;
pub mod update;

use anyhow::Result;

use crate::config::MateriaConfig;
use crate::host::SystemdHost;
use crate::repository::{HostRepository, SourceRepository};

/// Everything a command needs to talk to this host
pub struct Session {
    pub config: MateriaConfig,
    pub hostname: String,
    pub systemd: SystemdHost,
}

impl Session {
    pub fn open() -> Result<Self> {
        let config = MateriaConfig::load()?;
        let hostname = config.hostname()?;
        log::debug!("planning for host {}", hostname);
        let systemd = SystemdHost::new(config.user_mode);
        Ok(Self {
            config,
            hostname,
            systemd,
        })
    }

    pub fn source(&self) -> SourceRepository {
        SourceRepository::new(self.config.source_path(), self.config.attributes.clone())
    }

    pub fn installed(&self) -> HostRepository<'_> {
        HostRepository::new(self.config.data_path(), self.config.quadlet_path())
            .with_secrets(&self.systemd)
    }
}
