//! Cleanup of removed quadlets and volume migration

use super::{Inventory, Planner};
use crate::action::{Action, ActionType};
use crate::error::Result;
use crate::types::UnitState;
use components::{Component, Resource, ResourceType};
use std::sync::Arc;

impl Planner<'_> {
    /// Actions deleting the podman object behind a removed quadlet.
    pub(super) fn cleanup_actions(
        &self,
        inv: &Inventory<'_>,
        parent: &Arc<Component>,
        resource: &Resource,
    ) -> Result<Vec<Action>> {
        let name = resource.host_object.as_str();
        let cleanup = || vec![Action::new(ActionType::Cleanup, parent, resource.clone())];

        match resource.kind {
            ResourceType::Network => {
                if !inv.has_network(name)? {
                    log::debug!("network {} is already gone", name);
                    return Ok(Vec::new());
                }
                Ok(cleanup())
            }
            ResourceType::Build | ResourceType::Image => {
                let images = inv.images()?;
                if !images.iter().any(|image| image.is_named(name)) {
                    log::debug!("image {} is already gone", name);
                    return Ok(Vec::new());
                }
                let in_use = inv.containers()?.iter().find(|container| {
                    container.image == name
                        || images
                            .iter()
                            .any(|image| image.is_named(name) && image.is_named(&container.image))
                });
                if let Some(container) = in_use {
                    log::warn!(
                        "not removing image {}: container {} still uses it",
                        name,
                        container.name
                    );
                    return Ok(Vec::new());
                }
                Ok(cleanup())
            }
            ResourceType::Volume if self.config.cleanup_volumes => {
                if !inv.has_volume(name)? {
                    log::debug!("volume {} is already gone", name);
                    return Ok(Vec::new());
                }
                let mut actions = Vec::new();
                let skipped = parent.backups.skip.iter().any(|p| p == &resource.path);
                if self.config.backup_volumes && !skipped {
                    actions.push(Action::new(ActionType::Dump, parent, resource.clone()));
                }
                actions.extend(cleanup());
                Ok(actions)
            }
            _ => Ok(Vec::new()),
        }
    }

    /// Recreate a changed volume, carrying its data over.
    ///
    /// Uses manual priorities: stop services and dump (1), delete (2),
    /// recreate and import (4), start the services again (5).
    pub(super) fn migrate_volume(
        &self,
        inv: &Inventory<'_>,
        component: &Arc<Component>,
        volume: &Resource,
    ) -> Result<Vec<Action>> {
        if !inv.has_volume(&volume.host_object)? {
            log::debug!("volume {} does not exist yet, nothing to migrate", volume.host_object);
            return Ok(Vec::new());
        }

        let mut running = Vec::new();
        for service in component.services.list() {
            if inv.service_state(&service.service)?.state == UnitState::Active {
                running.push(Resource::service(component.name.clone(), service.service.clone()));
            }
        }

        let step = |todo, target: Resource, priority| {
            Action::new(todo, component, target).with_priority(priority)
        };
        let mut actions: Vec<Action> = running
            .iter()
            .map(|svc| step(ActionType::Stop, svc.clone(), 1))
            .collect();
        actions.push(step(ActionType::Dump, volume.clone(), 1));
        actions.push(step(ActionType::Cleanup, volume.clone(), 2));
        actions.push(step(ActionType::Ensure, volume.clone(), 4));
        actions.push(step(ActionType::Import, volume.clone(), 4));
        actions.extend(
            running
                .into_iter()
                .map(|svc| step(ActionType::Start, svc, 5)),
        );
        log::debug!("migrating volume {} ({} steps)", volume.host_object, actions.len());
        Ok(actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryHost;
    use crate::planner::PlannerConfig;
    use components::ServiceResourceConfig;

    fn quadlet(path: &str, content: &str) -> Resource {
        let mut r = Resource::from_path("app", path).with_content(content);
        r.resolve_host_object().unwrap();
        r
    }

    fn todos(actions: &[Action]) -> Vec<String> {
        actions.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_network_cleanup_skips_missing() {
        let host = MemoryHost::new();
        let planner = Planner::new(&host, PlannerConfig::default());
        let app = Arc::new(Component::new("app"));
        let lan = quadlet("lan.network", "[Network]\n");

        let none = planner.cleanup_actions(&Inventory::new(&host), &app, &lan).unwrap();
        assert!(none.is_empty());

        host.add_network("systemd-lan");
        let some = planner.cleanup_actions(&Inventory::new(&host), &app, &lan).unwrap();
        assert_eq!(todos(&some), vec!["cleanup network app/lan.network"]);
    }

    #[test]
    fn test_image_in_use_is_kept() {
        let host = MemoryHost::new();
        host.add_image("abc", &["localhost/web:latest"]);
        host.add_container("web", "abc");
        let planner = Planner::new(&host, PlannerConfig::default());
        let app = Arc::new(Component::new("app"));
        let build = quadlet("web.build", "[Build]\nImageTag=localhost/web:latest\n");

        let actions = planner.cleanup_actions(&Inventory::new(&host), &app, &build).unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn test_unused_image_is_cleaned() {
        let host = MemoryHost::new();
        host.add_image("abc", &["localhost/web:latest"]);
        host.add_container("db", "postgres");
        let planner = Planner::new(&host, PlannerConfig::default());
        let app = Arc::new(Component::new("app"));
        let build = quadlet("web.build", "[Build]\nImageTag=localhost/web:latest\n");

        let actions = planner.cleanup_actions(&Inventory::new(&host), &app, &build).unwrap();
        assert_eq!(todos(&actions), vec!["cleanup build app/web.build"]);
    }

    #[test]
    fn test_volume_cleanup_dumps_first() {
        let host = MemoryHost::new();
        host.add_volume("systemd-data");
        host.add_volume("systemd-cache");
        let config = PlannerConfig {
            cleanup_volumes: true,
            ..PlannerConfig::default()
        };
        let planner = Planner::new(&host, config);
        let mut app = Component::new("app");
        app.backups.skip = vec!["cache.volume".into()];
        let app = Arc::new(app);

        let data = quadlet("data.volume", "[Volume]\n");
        let actions = planner.cleanup_actions(&Inventory::new(&host), &app, &data).unwrap();
        assert_eq!(
            todos(&actions),
            vec!["dump volume app/data.volume", "cleanup volume app/data.volume"]
        );

        let cache = quadlet("cache.volume", "[Volume]\n");
        let actions = planner.cleanup_actions(&Inventory::new(&host), &app, &cache).unwrap();
        assert_eq!(todos(&actions), vec!["cleanup volume app/cache.volume"]);
    }

    #[test]
    fn test_volumes_kept_without_cleanup_volumes() {
        let host = MemoryHost::new();
        host.add_volume("systemd-data");
        let planner = Planner::new(&host, PlannerConfig::default());
        let app = Arc::new(Component::new("app"));
        let data = quadlet("data.volume", "[Volume]\n");
        let actions = planner.cleanup_actions(&Inventory::new(&host), &app, &data).unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn test_migration_sequence() {
        let host = MemoryHost::new();
        host.add_volume("systemd-data");
        host.set_service("db.service", UnitState::Active, false);
        let planner = Planner::new(&host, PlannerConfig::default());
        let mut app = Component::new("app");
        app.services.add(ServiceResourceConfig::new("db.service"));
        app.services.add(ServiceResourceConfig::new("idle.service"));
        let app = Arc::new(app);
        let data = quadlet("data.volume", "[Volume]\nLabel=v2\n");

        let actions = planner.migrate_volume(&Inventory::new(&host), &app, &data).unwrap();
        let summary: Vec<(String, u8)> = actions
            .iter()
            .map(|a| (a.to_string(), a.priority))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("stop service app/db.service".to_string(), 1),
                ("dump volume app/data.volume".to_string(), 1),
                ("cleanup volume app/data.volume".to_string(), 2),
                ("ensure volume app/data.volume".to_string(), 4),
                ("import volume app/data.volume".to_string(), 4),
                ("start service app/db.service".to_string(), 5),
            ]
        );
    }

    #[test]
    fn test_migration_needs_live_volume() {
        let host = MemoryHost::new();
        let planner = Planner::new(&host, PlannerConfig::default());
        let app = Arc::new(Component::new("app"));
        let data = quadlet("data.volume", "[Volume]\n");
        assert!(planner.migrate_volume(&Inventory::new(&host), &app, &data).unwrap().is_empty());
    }
}
