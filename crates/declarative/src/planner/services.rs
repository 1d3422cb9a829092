//! Service reconciliation

use super::{Inventory, Planner};
use crate::action::{Action, ActionType};
use crate::error::Result;
use crate::types::UnitState;
use components::{Component, Resource, ResourceType, ServiceResourceConfig};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Start timeout for pods, in seconds
pub const POD_START_TIMEOUT: u64 = 300;

/// Added to the image unit's timeout for containers that pull or build
/// their image on start
pub const IMAGE_START_GRACE: u64 = 60;

impl Planner<'_> {
    /// Bring declared services to their wanted state. Services in `skip`
    /// were already handled by a trigger.
    pub(super) fn install_services(
        &self,
        inv: &Inventory<'_>,
        component: &Arc<Component>,
        skip: &BTreeSet<String>,
    ) -> Result<Vec<Action>> {
        let mut actions = Vec::new();
        for service in component.services.list() {
            if service.stopped || skip.contains(&service.service) {
                continue;
            }
            let status = inv.service_state(&service.service)?;
            let target = Resource::service(component.name.clone(), service.service.clone());

            if service.static_ && !service.disabled && !status.enabled {
                actions.push(Action::new(ActionType::Enable, component, target.clone()));
            }
            if status.state != UnitState::Active {
                let timeout = self.start_timeout(component, service)?;
                actions.push(Action::new(ActionType::Start, component, target).with_timeout(timeout));
            }
        }
        Ok(actions)
    }

    /// Stop whatever is still running.
    pub(super) fn remove_services<'s>(
        &self,
        inv: &Inventory<'_>,
        component: &Arc<Component>,
        services: impl Iterator<Item = &'s ServiceResourceConfig>,
    ) -> Result<Vec<Action>> {
        let mut actions = Vec::new();
        for service in services {
            let status = inv.service_state(&service.service)?;
            if !status.state.is_running() {
                continue;
            }
            let target = Resource::service(component.name.clone(), service.service.clone());
            if service.static_ {
                actions.push(Action::new(ActionType::Disable, component, target.clone()));
            }
            actions.push(Action::new(ActionType::Stop, component, target));
        }
        Ok(actions)
    }

    /// Service actions following the resource `changes` of an update.
    pub(super) fn update_services(
        &self,
        inv: &Inventory<'_>,
        host: &Arc<Component>,
        source: &Arc<Component>,
        changes: &[Action],
    ) -> Result<Vec<Action>> {
        let mut actions = Vec::new();
        let mut triggered = BTreeSet::new();

        for change in changes {
            if change.target.kind == ResourceType::Component {
                continue;
            }
            let path = change.target.path.as_str();
            let mut matched = false;
            for service in source.services.list() {
                let todo = if service.is_restarted_by(path) {
                    ActionType::Restart
                } else if service.is_reloaded_by(path) {
                    ActionType::Reload
                } else {
                    continue;
                };
                matched = true;
                if service.stopped {
                    continue;
                }
                log::debug!("{} of {} triggered by {}", todo, service.service, path);
                let target = Resource::service(source.name.clone(), service.service.clone());
                let mut action = Action::new(todo, source, target);
                if todo == ActionType::Restart {
                    action = action.with_timeout(self.start_timeout(source, service)?);
                }
                actions.push(action);
                triggered.insert(service.service.clone());
            }

            let restartable = matches!(
                change.target.kind,
                ResourceType::Container | ResourceType::Pod
            );
            if matched || !restartable || change.todo != ActionType::Update {
                continue;
            }
            if source.settings.no_restart {
                continue;
            }
            let Some(unit) = change.target.backing_service() else {
                continue;
            };
            let declared = source.services.get(&unit);
            if declared.is_some_and(|s| s.stopped) {
                continue;
            }
            let timeout = match declared {
                Some(service) => self.start_timeout(source, service)?,
                None => self.config.default_service_timeout,
            };
            log::debug!("restarting {} after {} changed", unit, path);
            let target = Resource::service(source.name.clone(), unit.clone());
            actions.push(Action::new(ActionType::Restart, source, target).with_timeout(timeout));
            triggered.insert(unit);
        }

        actions.extend(self.install_services(inv, source, &triggered)?);

        let dropped = host
            .services
            .list()
            .filter(|service| !source.services.contains(&service.service));
        actions.extend(self.remove_services(inv, host, dropped)?);
        Ok(actions)
    }

    /// Seconds to allow a service to start.
    pub(super) fn start_timeout(
        &self,
        component: &Component,
        service: &ServiceResourceConfig,
    ) -> Result<u64> {
        let default = service
            .timeout
            .unwrap_or(self.config.default_service_timeout);
        let Some(backing) = component.service_backing(&service.service) else {
            return Ok(default);
        };
        match backing.kind {
            ResourceType::Pod => Ok(POD_START_TIMEOUT),
            ResourceType::Container => {
                let Some(image_unit) = backing.image_unit()? else {
                    return Ok(default);
                };
                let image_timeout = component
                    .resources
                    .get(&image_unit)
                    .and_then(Resource::backing_service)
                    .and_then(|unit| component.services.get(&unit))
                    .and_then(|s| s.timeout)
                    .unwrap_or(self.config.default_service_timeout);
                Ok(IMAGE_START_GRACE + image_timeout)
            }
            _ => Ok(default),
        }
    }
}
