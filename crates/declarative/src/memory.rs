//! In-memory host for tests and dry runs
//!
//! [`MemoryHost`] implements both [`HostStateManager`] and
//! [`ComponentWriter`] over a mutex-guarded model of systemd, podman and
//! the component directories. Every mutation is appended to a call log so
//! tests can assert on execution order.

use crate::context::{ComponentWriter, HostStateManager};
use crate::types::{
    ContainerInfo, ImageInfo, NetworkInfo, ServiceOp, ServiceStatus, UnitState, VolumeInfo,
};
use anyhow::{Result, bail};
use components::{Component, Resource};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Default)]
struct State {
    services: BTreeMap<String, ServiceStatus>,
    /// State a unit lands in after its next start/stop instead of settling
    held: BTreeMap<String, UnitState>,
    volumes: BTreeSet<String>,
    networks: BTreeSet<String>,
    images: Vec<ImageInfo>,
    containers: Vec<ContainerInfo>,
    secrets: BTreeMap<String, String>,
    components: BTreeSet<String>,
    files: BTreeMap<(String, String), String>,
    calls: Vec<String>,
    fail_on: Option<String>,
}

#[derive(Debug, Default)]
pub struct MemoryHost {
    state: Mutex<State>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Log a call, failing if it matches the injected failure.
    fn record(&self, state: &mut State, call: String) -> Result<()> {
        let failing = state
            .fail_on
            .as_deref()
            .is_some_and(|prefix| call.starts_with(prefix));
        state.calls.push(call.clone());
        if failing {
            bail!("injected failure: {}", call);
        }
        Ok(())
    }

    pub fn set_service(&self, name: &str, state: UnitState, enabled: bool) {
        self.lock().services.insert(
            name.to_string(),
            ServiceStatus {
                name: name.to_string(),
                state,
                enabled,
            },
        );
    }

    /// Leave `name` in `state` after its next operation.
    pub fn hold_service(&self, name: &str, state: UnitState) {
        self.lock().held.insert(name.to_string(), state);
    }

    pub fn add_volume(&self, name: &str) {
        self.lock().volumes.insert(name.to_string());
    }

    pub fn add_network(&self, name: &str) {
        self.lock().networks.insert(name.to_string());
    }

    pub fn add_image(&self, id: &str, names: &[&str]) {
        self.lock().images.push(ImageInfo {
            id: id.to_string(),
            names: names.iter().map(|n| n.to_string()).collect(),
        });
    }

    pub fn add_container(&self, name: &str, image: &str) {
        self.lock().containers.push(ContainerInfo {
            name: name.to_string(),
            image: image.to_string(),
        });
    }

    /// Make every call starting with `prefix` fail.
    pub fn fail_on(&self, prefix: &str) {
        self.lock().fail_on = Some(prefix.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn secret(&self, name: &str) -> Option<String> {
        self.lock().secrets.get(name).cloned()
    }

    pub fn file(&self, component: &str, path: &str) -> Option<String> {
        self.lock()
            .files
            .get(&(component.to_string(), path.to_string()))
            .cloned()
    }

    pub fn has_component(&self, name: &str) -> bool {
        self.lock().components.contains(name)
    }

    pub fn has_volume(&self, name: &str) -> bool {
        self.lock().volumes.contains(name)
    }
}

impl HostStateManager for MemoryHost {
    fn list_volumes(&self) -> Result<Vec<VolumeInfo>> {
        Ok(self
            .lock()
            .volumes
            .iter()
            .map(|name| VolumeInfo { name: name.clone() })
            .collect())
    }

    fn list_networks(&self) -> Result<Vec<NetworkInfo>> {
        Ok(self
            .lock()
            .networks
            .iter()
            .map(|name| NetworkInfo { name: name.clone() })
            .collect())
    }

    fn list_images(&self) -> Result<Vec<ImageInfo>> {
        Ok(self.lock().images.clone())
    }

    fn list_containers(&self) -> Result<Vec<ContainerInfo>> {
        Ok(self.lock().containers.clone())
    }

    fn get_service(&self, name: &str) -> Result<ServiceStatus> {
        Ok(self
            .lock()
            .services
            .get(name)
            .cloned()
            .unwrap_or_else(|| ServiceStatus::missing(name)))
    }

    fn apply_service(&self, name: &str, op: ServiceOp, _timeout: Duration) -> Result<()> {
        let mut state = self.lock();
        self.record(&mut state, format!("{} {}", op.verb(), name))?;

        let held = state.held.remove(name);
        let entry = state
            .services
            .entry(name.to_string())
            .or_insert_with(|| ServiceStatus::missing(name));
        match op {
            ServiceOp::Start | ServiceOp::Restart | ServiceOp::Reload => {
                entry.state = held.unwrap_or(UnitState::Active);
            }
            ServiceOp::Stop => entry.state = held.unwrap_or(UnitState::Inactive),
            ServiceOp::Enable => entry.enabled = true,
            ServiceOp::Disable => entry.enabled = false,
        }
        Ok(())
    }

    fn daemon_reload(&self) -> Result<()> {
        let mut state = self.lock();
        self.record(&mut state, "daemon-reload".to_string())
    }

    fn remove_volume(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        self.record(&mut state, format!("volume rm {}", name))?;
        state.volumes.remove(name);
        Ok(())
    }

    fn dump_volume(&self, name: &str, dest: &Path) -> Result<()> {
        let mut state = self.lock();
        self.record(&mut state, format!("volume export {} {}", name, dest.display()))
    }

    fn import_volume(&self, name: &str, src: &Path) -> Result<()> {
        let mut state = self.lock();
        self.record(&mut state, format!("volume import {} {}", name, src.display()))
    }

    fn remove_network(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        self.record(&mut state, format!("network rm {}", name))?;
        state.networks.remove(name);
        Ok(())
    }

    fn remove_image(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        self.record(&mut state, format!("image rm {}", name))?;
        state.images.retain(|image| !image.is_named(name));
        Ok(())
    }

    fn write_secret(&self, name: &str, value: &str) -> Result<()> {
        let mut state = self.lock();
        self.record(&mut state, format!("secret create {}", name))?;
        state.secrets.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn remove_secret(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        self.record(&mut state, format!("secret rm {}", name))?;
        state.secrets.remove(name);
        Ok(())
    }

    fn run_script(
        &self,
        component: &str,
        script: &str,
        _body: &str,
        _timeout: Duration,
    ) -> Result<()> {
        let mut state = self.lock();
        self.record(&mut state, format!("run {}/{}", component, script))
    }
}

impl ComponentWriter for MemoryHost {
    fn install_component(&self, component: &Component) -> Result<()> {
        let mut state = self.lock();
        self.record(&mut state, format!("install component {}", component.name))?;
        state.components.insert(component.name.clone());
        Ok(())
    }

    fn update_component(&self, component: &Component) -> Result<()> {
        let mut state = self.lock();
        self.record(&mut state, format!("update component {}", component.name))
    }

    fn remove_component(&self, component: &Component) -> Result<()> {
        let mut state = self.lock();
        self.record(&mut state, format!("remove component {}", component.name))?;
        state.components.remove(&component.name);
        Ok(())
    }

    fn install_resource(&self, component: &Component, resource: &Resource) -> Result<()> {
        let mut state = self.lock();
        self.record(
            &mut state,
            format!("write {}/{}", component.name, resource.path),
        )?;
        state.files.insert(
            (component.name.clone(), resource.path.clone()),
            resource.content.clone(),
        );
        Ok(())
    }

    fn remove_resource(&self, component: &Component, resource: &Resource) -> Result<()> {
        let mut state = self.lock();
        self.record(
            &mut state,
            format!("delete {}/{}", component.name, resource.path),
        )?;
        state
            .files
            .remove(&(component.name.clone(), resource.path.clone()));
        Ok(())
    }
}
