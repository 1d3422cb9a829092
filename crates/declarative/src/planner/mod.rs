//! Planner - diff installed components against assigned ones
//!
//! The planner walks the [`ComponentGraph`] in name order and emits the
//! actions each tree needs. Actions carry no ordering of their own beyond
//! the occasional manual priority; [`Plan`] sorts them out.

mod cleanup;
mod services;

pub use services::{IMAGE_START_GRACE, POD_START_TIMEOUT};

use crate::action::{Action, ActionType};
use crate::context::HostStateManager;
use crate::error::{PlanError, Result};
use crate::graph::{ComponentGraph, ComponentTree, TreeKind};
use crate::plan::Plan;
use crate::types::{ContainerInfo, ImageInfo, UnitState};
use crate::validate::{default_validators, validate};
use components::{
    CURRENT_COMPONENT_VERSION, Component, ComponentState, ContentDiff, ROOT_COMPONENT, Resource,
    ResourceType,
};
use std::cell::OnceCell;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Planner knobs, usually straight from the host config
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannerConfig {
    /// Remove networks, images and (with `cleanup_volumes`) volumes of
    /// removed quadlets
    pub cleanup_quadlets: bool,
    pub cleanup_volumes: bool,
    /// Dump volumes before cleaning them up
    pub backup_volumes: bool,
    /// Recreate changed volumes, carrying their data over
    pub migrate_volumes: bool,
    /// Seconds, for services without their own timeout
    pub default_service_timeout: u64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            cleanup_quadlets: true,
            cleanup_volumes: false,
            backup_volumes: true,
            migrate_volumes: false,
            default_service_timeout: 90,
        }
    }
}

/// Live podman inventory, fetched at most once per run
struct Inventory<'a> {
    host: &'a dyn HostStateManager,
    volumes: OnceCell<BTreeSet<String>>,
    networks: OnceCell<BTreeSet<String>>,
    images: OnceCell<Vec<ImageInfo>>,
    containers: OnceCell<Vec<ContainerInfo>>,
}

impl<'a> Inventory<'a> {
    fn new(host: &'a dyn HostStateManager) -> Self {
        Self {
            host,
            volumes: OnceCell::new(),
            networks: OnceCell::new(),
            images: OnceCell::new(),
            containers: OnceCell::new(),
        }
    }

    fn has_volume(&self, name: &str) -> Result<bool> {
        if self.volumes.get().is_none() {
            let listed = self
                .host
                .list_volumes()
                .map_err(|e| PlanError::live("listing volumes", e))?;
            let _ = self.volumes.set(listed.into_iter().map(|v| v.name).collect());
        }
        Ok(self.volumes.get().is_some_and(|v| v.contains(name)))
    }

    fn has_network(&self, name: &str) -> Result<bool> {
        if self.networks.get().is_none() {
            let listed = self
                .host
                .list_networks()
                .map_err(|e| PlanError::live("listing networks", e))?;
            let _ = self.networks.set(listed.into_iter().map(|n| n.name).collect());
        }
        Ok(self.networks.get().is_some_and(|n| n.contains(name)))
    }

    fn images(&self) -> Result<&[ImageInfo]> {
        if self.images.get().is_none() {
            let listed = self
                .host
                .list_images()
                .map_err(|e| PlanError::live("listing images", e))?;
            let _ = self.images.set(listed);
        }
        Ok(self.images.get().map(Vec::as_slice).unwrap_or_default())
    }

    fn containers(&self) -> Result<&[ContainerInfo]> {
        if self.containers.get().is_none() {
            let listed = self
                .host
                .list_containers()
                .map_err(|e| PlanError::live("listing containers", e))?;
            let _ = self.containers.set(listed);
        }
        Ok(self.containers.get().map(Vec::as_slice).unwrap_or_default())
    }

    fn service_state(&self, name: &str) -> Result<crate::types::ServiceStatus> {
        self.host
            .get_service(name)
            .map_err(|e| PlanError::live(format!("querying {}", name), e))
    }
}

pub struct Planner<'a> {
    host: &'a dyn HostStateManager,
    config: PlannerConfig,
    root: Arc<Component>,
}

impl<'a> Planner<'a> {
    pub fn new(host: &'a dyn HostStateManager, config: PlannerConfig) -> Self {
        Self {
            host,
            config,
            root: Arc::new(Component::root()),
        }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Build and validate the plan turning `installed` into `assigned`.
    pub fn plan(&self, installed: Vec<Component>, assigned: Vec<Component>) -> Result<Plan> {
        let installed_names: Vec<String> = installed.iter().map(|c| c.name.clone()).collect();
        let graph = ComponentGraph::build(installed, assigned)?;
        let inventory = Inventory::new(self.host);

        let mut plan = Plan::new();
        for mut tree in graph.into_trees() {
            let actions = self.plan_tree(&inventory, &mut tree)?;
            log::debug!("{}: {} actions, {}", tree.name, actions.len(), tree.final_state);
            plan.append(actions)?;
            plan.set_state(&tree.name, tree.final_state);
        }

        validate(&plan.steps(), &default_validators(installed_names))?;
        Ok(plan)
    }

    fn plan_tree(&self, inv: &Inventory<'_>, tree: &mut ComponentTree) -> Result<Vec<Action>> {
        let (actions, state) = match &tree.kind {
            TreeKind::ToInstall(source) => (
                self.plan_install(inv, source.clone())?,
                ComponentState::Fresh,
            ),
            TreeKind::ToRemove(host) => (
                self.plan_removal(inv, host.clone())?,
                ComponentState::NeedRemoval,
            ),
            TreeKind::ToReconcile { host, source } => {
                self.plan_update(inv, host.clone(), source.clone())?
            }
        };
        tree.final_state = state;
        if let TreeKind::ToInstall(source) | TreeKind::ToReconcile { source, .. } = &mut tree.kind {
            source.state = state;
        }
        Ok(actions)
    }

    fn host_reload(&self) -> Action {
        Action::new(ActionType::Reload, &self.root, Resource::host(ROOT_COMPONENT))
    }

    fn plan_install(&self, inv: &Inventory<'_>, mut source: Component) -> Result<Vec<Action>> {
        source.state = ComponentState::Fresh;
        let source = Arc::new(source);

        let mut actions = vec![Action::new(
            ActionType::Install,
            &source,
            source.to_resource(),
        )];
        for resource in source.resources.iter() {
            actions.push(install_action(&source, resource));
        }
        actions.extend(self.ensure_actions(inv, &source)?);
        if !source.resources.is_empty() {
            actions.push(self.host_reload());
        }
        actions.extend(self.install_services(inv, &source, &BTreeSet::new())?);
        if source.setup_script().is_some() {
            actions.push(Action::new(ActionType::Setup, &source, source.to_resource()));
        }
        Ok(actions)
    }

    fn plan_removal(&self, inv: &Inventory<'_>, host: Component) -> Result<Vec<Action>> {
        if host.state != ComponentState::NeedRemoval {
            return Err(PlanError::NotMarkedForRemoval {
                name: host.name.clone(),
                state: host.state.to_string(),
            });
        }
        let host = Arc::new(host);

        let mut actions = Vec::new();
        let mut directories = Vec::new();
        for resource in host.resources.iter().rev() {
            match resource.kind {
                ResourceType::Manifest => continue,
                ResourceType::Directory => {
                    directories.push(resource);
                    continue;
                }
                _ => {}
            }
            actions.push(remove_action(&host, resource));
            if self.config.cleanup_quadlets {
                actions.extend(self.cleanup_actions(inv, &host, resource)?);
            }
        }
        for directory in directories {
            actions.push(remove_action(&host, directory));
        }
        if let Some(manifest) = host.manifest_resource() {
            actions.push(remove_action(&host, manifest));
        }
        actions.push(Action::new(ActionType::Remove, &host, host.to_resource()));
        actions.push(self.host_reload());
        actions.extend(self.remove_services(inv, &host, host.services.list())?);
        if host.cleanup_script().is_some() {
            actions.push(Action::new(ActionType::Cleanup, &host, host.to_resource()));
        }
        Ok(actions)
    }

    fn plan_update(
        &self,
        inv: &Inventory<'_>,
        host: Component,
        mut source: Component,
    ) -> Result<(Vec<Action>, ComponentState)> {
        let to_remove = host.resources.difference(&source.resources);
        let to_install = source.resources.difference(&host.resources);
        let updated: Vec<(Resource, ContentDiff)> = host
            .resources
            .intersection(&source.resources)
            .iter()
            .filter_map(|old| {
                let new = source.resources.get(&old.path)?;
                content_change(old, new).map(|diff| (new.clone(), diff))
            })
            .collect();
        let version_changed = host.version != CURRENT_COMPONENT_VERSION;
        let host = Arc::new(host);

        if to_remove.is_empty() && to_install.is_empty() && updated.is_empty() && !version_changed
        {
            return self.plan_unchanged(inv, source);
        }
        source.state = ComponentState::NeedUpdate;
        let source = Arc::new(source);

        let mut changes = Vec::new();
        let mut follow_ups = Vec::new();
        for resource in to_remove.iter() {
            changes.push(remove_action(&host, resource));
            if self.config.cleanup_quadlets {
                follow_ups.extend(self.cleanup_actions(inv, &host, resource)?);
            }
        }
        for resource in to_install.iter() {
            changes.push(install_action(&source, resource));
        }
        for (new, diff) in updated {
            log::debug!("{} changed", new);
            if new.kind == ResourceType::Volume && self.config.migrate_volumes {
                follow_ups.extend(self.migrate_volume(inv, &source, &new)?);
            }
            changes.push(Action::new(ActionType::Update, &source, new).with_diff(diff));
        }
        if version_changed {
            log::debug!(
                "{} is at version {}, upgrading to {}",
                host.name,
                host.version,
                CURRENT_COMPONENT_VERSION
            );
            changes.push(Action::new(ActionType::Update, &source, source.to_resource()));
        }

        let services = self.update_services(inv, &host, &source, &changes)?;
        let mut actions = changes;
        actions.extend(follow_ups);
        actions.extend(self.ensure_actions(inv, &source)?);
        actions.push(self.host_reload());
        actions.extend(services);
        Ok((actions, ComponentState::NeedUpdate))
    }

    /// A component whose files all match: at most its services need work.
    fn plan_unchanged(
        &self,
        inv: &Inventory<'_>,
        mut source: Component,
    ) -> Result<(Vec<Action>, ComponentState)> {
        source.state = ComponentState::Ok;
        let source = Arc::new(source);
        let mut services = self.install_services(inv, &source, &BTreeSet::new())?;
        if services.is_empty() {
            return Ok((services, ComponentState::Ok));
        }

        let mut pending = (*source).clone();
        pending.state = ComponentState::NeedUpdate;
        let pending = Arc::new(pending);
        for action in &mut services {
            action.parent = Arc::clone(&pending);
        }
        Ok((services, ComponentState::NeedUpdate))
    }

    /// Ensure actions for volumes and networks whose unit is up but whose
    /// object is missing.
    fn ensure_actions(&self, inv: &Inventory<'_>, component: &Arc<Component>) -> Result<Vec<Action>> {
        let mut actions = Vec::new();
        for resource in component.resources.iter() {
            let present = match resource.kind {
                ResourceType::Volume => inv.has_volume(&resource.host_object)?,
                ResourceType::Network => inv.has_network(&resource.host_object)?,
                _ => continue,
            };
            if present {
                continue;
            }
            let Some(unit) = resource.backing_service() else {
                continue;
            };
            if inv.service_state(&unit)?.state == UnitState::Active {
                log::debug!("{} is missing while {} is active", resource.host_object, unit);
                actions.push(Action::new(ActionType::Ensure, component, resource.clone()));
            }
        }
        Ok(actions)
    }
}

/// Install with a diff from nothing. Secret values never enter a diff.
fn install_action(parent: &Arc<Component>, resource: &Resource) -> Action {
    let action = Action::new(ActionType::Install, parent, resource.clone());
    match resource.kind {
        ResourceType::PodmanSecret => action.with_diff(ContentDiff::empty()),
        kind if kind.has_content() => action.with_diff(ContentDiff::text_diff("", &resource.content)),
        _ => action,
    }
}

fn remove_action(parent: &Arc<Component>, resource: &Resource) -> Action {
    let action = Action::new(ActionType::Remove, parent, resource.clone());
    match resource.kind {
        ResourceType::PodmanSecret => action.with_diff(ContentDiff::empty()),
        kind if kind.has_content() => action.with_diff(ContentDiff::text_diff(&resource.content, "")),
        _ => action,
    }
}

/// The diff between two versions of a resource, if they differ.
fn content_change(old: &Resource, new: &Resource) -> Option<ContentDiff> {
    if new.kind == ResourceType::PodmanSecret {
        return (old.content != new.content).then(ContentDiff::empty);
    }
    let diff = ContentDiff::text_diff(&old.content, &new.content);
    (!diff.is_unchanged()).then_some(diff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryHost;
    use components::ServiceResourceConfig;

    const CONTAINER: &str = "[Container]\nImage=docker.io/library/nginx\n";

    fn hello(content: &str) -> Component {
        let mut c = Component::new("hello");
        c.add_resource(Resource::from_path("hello", "hello.container").with_content(content))
            .unwrap();
        c.add_resource(
            Resource::from_path("hello", "MANIFEST.toml")
                .with_content("[[Services]]\nService = \"hello.service\"\n"),
        )
        .unwrap();
        c.services.add(ServiceResourceConfig::new("hello.service"));
        c.resolve_host_objects().unwrap();
        c
    }

    fn steps(plan: &Plan) -> Vec<String> {
        plan.steps().iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_fresh_install() {
        let host = MemoryHost::new();
        let planner = Planner::new(&host, PlannerConfig::default());
        let plan = planner.plan(vec![], vec![hello(CONTAINER)]).unwrap();

        assert_eq!(
            steps(&plan),
            vec![
                "install component hello",
                "install container hello/hello.container",
                "install manifest hello/MANIFEST.toml",
                "reload host",
                "start service hello/hello.service",
            ]
        );
        assert_eq!(plan.states()["hello"], ComponentState::Fresh);
        let install = &plan.steps()[1];
        assert_eq!(install.diff, Some(ContentDiff::insertion(CONTAINER)));
    }

    #[test]
    fn test_unchanged_component_is_ok() {
        let host = MemoryHost::new();
        host.set_service("hello.service", UnitState::Active, false);
        let planner = Planner::new(&host, PlannerConfig::default());
        let plan = planner
            .plan(vec![hello(CONTAINER)], vec![hello(CONTAINER)])
            .unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.states()["hello"], ComponentState::Ok);
    }

    #[test]
    fn test_stopped_service_is_started_without_file_changes() {
        let host = MemoryHost::new();
        let planner = Planner::new(&host, PlannerConfig::default());
        let plan = planner
            .plan(vec![hello(CONTAINER)], vec![hello(CONTAINER)])
            .unwrap();
        assert_eq!(steps(&plan), vec!["start service hello/hello.service"]);
        assert_eq!(plan.states()["hello"], ComponentState::NeedUpdate);
        assert_eq!(plan.steps()[0].parent.state, ComponentState::NeedUpdate);
    }

    #[test]
    fn test_updated_component_is_marked() {
        let host = MemoryHost::new();
        host.set_service("hello.service", UnitState::Active, false);
        let planner = Planner::new(&host, PlannerConfig::default());
        let changed = "[Container]\nImage=docker.io/library/nginx:1.27\n";

        let plan = planner
            .plan(vec![hello(CONTAINER)], vec![hello(changed)])
            .unwrap();
        let owned: Vec<Action> = plan
            .steps()
            .into_iter()
            .filter(|a| a.parent.name == "hello")
            .collect();
        assert_eq!(owned.len(), 2);
        for action in &owned {
            assert_eq!(action.parent.state, ComponentState::NeedUpdate, "{}", action);
        }

        let mut tree = ComponentTree::new(
            "hello".to_string(),
            TreeKind::ToReconcile {
                host: hello(CONTAINER),
                source: hello(changed),
            },
        )
        .unwrap();
        planner.plan_tree(&Inventory::new(&host), &mut tree).unwrap();
        assert_eq!(tree.final_state, ComponentState::NeedUpdate);
        assert_eq!(tree.source().unwrap().state, ComponentState::NeedUpdate);
    }

    #[test]
    fn test_changed_container_auto_restarts() {
        let host = MemoryHost::new();
        host.set_service("hello.service", UnitState::Active, false);
        let planner = Planner::new(&host, PlannerConfig::default());
        let changed = "[Container]\nImage=docker.io/library/nginx:1.27\n";
        let plan = planner
            .plan(vec![hello(CONTAINER)], vec![hello(changed)])
            .unwrap();
        assert_eq!(
            steps(&plan),
            vec![
                "update container hello/hello.container",
                "reload host",
                "restart service hello/hello.service",
            ]
        );
    }

    #[test]
    fn test_no_restart_setting() {
        let host = MemoryHost::new();
        host.set_service("hello.service", UnitState::Active, false);
        let planner = Planner::new(&host, PlannerConfig::default());
        let mut source = hello("[Container]\nImage=other\n");
        source.settings.no_restart = true;
        let plan = planner.plan(vec![hello(CONTAINER)], vec![source]).unwrap();
        assert_eq!(
            steps(&plan),
            vec!["update container hello/hello.container", "reload host"]
        );
    }

    #[test]
    fn test_version_marker_forces_update() {
        let host = MemoryHost::new();
        host.set_service("hello.service", UnitState::Active, false);
        let planner = Planner::new(&host, PlannerConfig::default());
        let mut installed = hello(CONTAINER);
        installed.version = 0;
        let plan = planner.plan(vec![installed], vec![hello(CONTAINER)]).unwrap();
        assert_eq!(steps(&plan), vec!["update component hello", "reload host"]);
    }

    #[test]
    fn test_removal_requires_marked_state() {
        let host = MemoryHost::new();
        let planner = Planner::new(&host, PlannerConfig::default());
        let err = planner
            .plan_removal(&Inventory::new(&host), hello(CONTAINER))
            .unwrap_err();
        assert!(matches!(err, PlanError::NotMarkedForRemoval { .. }));
    }

    #[test]
    fn test_removal_defers_directories() {
        let host = MemoryHost::new();
        let planner = Planner::new(&host, PlannerConfig::default());
        let mut installed = Component::new("web");
        installed
            .add_resource(Resource::new("web", "conf", ResourceType::Directory))
            .unwrap();
        installed
            .add_resource(Resource::from_path("web", "conf/app.env").with_content("A=1\n"))
            .unwrap();
        installed
            .add_resource(Resource::from_path("web", "MANIFEST.toml"))
            .unwrap();
        let plan = planner.plan(vec![installed], vec![]).unwrap();
        assert_eq!(
            steps(&plan),
            vec![
                "remove file web/conf/app.env",
                "remove directory web/conf",
                "remove manifest web/MANIFEST.toml",
                "remove component web",
                "reload host",
            ]
        );
    }

    #[test]
    fn test_secret_changes_never_show_values() {
        let host = MemoryHost::new();
        let planner = Planner::new(&host, PlannerConfig::default());
        let mut old = Component::new("db");
        old.add_resource(Resource::secret("db", "password").with_content("old"))
            .unwrap();
        let mut new = Component::new("db");
        new.add_resource(Resource::secret("db", "password").with_content("new"))
            .unwrap();

        let plan = planner.plan(vec![old], vec![new]).unwrap();
        let update = plan
            .steps()
            .into_iter()
            .find(|a| a.todo == ActionType::Update)
            .unwrap();
        assert_eq!(update.diff, Some(ContentDiff::empty()));
        assert!(!plan.to_json().unwrap().contains("new"));
    }

    #[test]
    fn test_ensure_missing_volume() {
        let host = MemoryHost::new();
        host.set_service("data-volume.service", UnitState::Active, false);
        let planner = Planner::new(&host, PlannerConfig::default());
        let mut c = Component::new("db");
        c.add_resource(Resource::from_path("db", "data.volume").with_content("[Volume]\n"))
            .unwrap();
        c.resolve_host_objects().unwrap();

        let plan = planner.plan(vec![], vec![c]).unwrap();
        assert!(steps(&plan).contains(&"ensure volume db/data.volume".to_string()));

        host.add_volume("systemd-data");
        let mut again = Component::new("db");
        again
            .add_resource(Resource::from_path("db", "data.volume").with_content("[Volume]\n"))
            .unwrap();
        again.resolve_host_objects().unwrap();
        let plan = planner.plan(vec![], vec![again]).unwrap();
        assert!(!steps(&plan).iter().any(|s| s.starts_with("ensure")));
    }
}
