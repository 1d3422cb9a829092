//! Collaborator traits
//!
//! The planner and executor never touch systemd, podman or the filesystem
//! directly. They go through these traits so the binary can plug in real
//! adapters and tests can plug in [`crate::memory`] fakes.

use crate::types::{
    ContainerInfo, ImageInfo, NetworkInfo, ServiceOp, ServiceStatus, UnitState, VolumeInfo,
};
use anyhow::Result;
use components::{Component, Resource};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Interval between live-state polls while waiting on a unit
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Shared flag for cancelling in-flight waits
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Live view of systemd and podman, plus the mutations the executor needs
///
/// Implementations must be safe to query from several threads at once;
/// convergence waits run in parallel.
pub trait HostStateManager: Send + Sync {
    fn list_volumes(&self) -> Result<Vec<VolumeInfo>>;

    fn list_networks(&self) -> Result<Vec<NetworkInfo>>;

    fn list_images(&self) -> Result<Vec<ImageInfo>>;

    /// All containers, running or stopped
    fn list_containers(&self) -> Result<Vec<ContainerInfo>>;

    /// Live state of a unit. Unknown units report inactive and disabled.
    fn get_service(&self, name: &str) -> Result<ServiceStatus>;

    fn apply_service(&self, name: &str, op: ServiceOp, timeout: Duration) -> Result<()>;

    fn daemon_reload(&self) -> Result<()>;

    fn remove_volume(&self, name: &str) -> Result<()>;

    /// Export a volume into `dest`
    fn dump_volume(&self, name: &str, dest: &Path) -> Result<()>;

    /// Import `src` into an existing volume
    fn import_volume(&self, name: &str, src: &Path) -> Result<()>;

    fn remove_network(&self, name: &str) -> Result<()>;

    fn remove_image(&self, name: &str) -> Result<()>;

    fn write_secret(&self, name: &str, value: &str) -> Result<()>;

    fn remove_secret(&self, name: &str) -> Result<()>;

    /// Run a component script to completion. `body` is the script
    /// content as planned; the file may already be gone.
    fn run_script(&self, component: &str, script: &str, body: &str, timeout: Duration)
    -> Result<()>;

    /// Poll until `name` reaches `target`, the timeout passes, or `cancel`
    /// fires. Failed units end the wait early.
    fn wait_for_state(
        &self,
        name: &str,
        target: UnitState,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let status = self.get_service(name)?;
            if status.state == target {
                return Ok(());
            }
            if status.state == UnitState::Failed {
                anyhow::bail!("{} failed while waiting for {}", name, target);
            }
            if cancel.is_cancelled() {
                anyhow::bail!("cancelled waiting for {} to become {}", name, target);
            }
            if Instant::now() >= deadline {
                anyhow::bail!(
                    "timed out after {}s waiting for {} to become {} (still {})",
                    timeout.as_secs(),
                    name,
                    target,
                    status.state
                );
            }
            std::thread::sleep(POLL_INTERVAL.min(timeout));
        }
    }
}

/// Loads components from one side (host or source)
pub trait ComponentReader {
    fn list_components(&self) -> Result<Vec<String>>;

    fn read_component(&self, name: &str) -> Result<Component>;

    /// Read every listed component
    fn read_all(&self) -> Result<Vec<Component>> {
        self.list_components()?
            .iter()
            .map(|name| self.read_component(name))
            .collect()
    }
}

/// Writes components to the host
pub trait ComponentWriter: Send + Sync {
    /// Create the component's directories and version marker
    fn install_component(&self, component: &Component) -> Result<()>;

    /// Rewrite the version marker
    fn update_component(&self, component: &Component) -> Result<()>;

    /// Remove what is left of the component's directories
    fn remove_component(&self, component: &Component) -> Result<()>;

    /// Write (or overwrite) one resource
    fn install_resource(&self, component: &Component, resource: &Resource) -> Result<()>;

    fn remove_resource(&self, component: &Component, resource: &Resource) -> Result<()>;
}
