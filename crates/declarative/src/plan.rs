//! Plans: prioritised, coalesced action lists
//!
//! Actions are filed per component into resource changes and service
//! changes; the host reload is kept apart from every component. [`Plan::steps`]
//! flattens them into the execution order: a stable sort on priority, so
//! stops run first, file changes next, one daemon reload after every file
//! change, service starts after that and destructive cleanup last. The
//! reload is listed first, so it also precedes any manual step sharing its
//! priority.

use crate::action::{Action, ActionRecord, ActionType};
use crate::error::{PlanError, Result};
use components::{ComponentState, ResourceType};
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt;

/// Default priority of `todo` on a resource of `kind`.
pub fn default_priority(kind: ResourceType, todo: ActionType) -> Option<u8> {
    use ActionType as A;
    use ResourceType as R;

    let priority = match (kind, todo) {
        (R::Service, A::Stop) => 1,
        (R::Volume, A::Dump) | (R::Component, A::Install) => 2,
        (R::Component, A::Update | A::Remove) => 3,
        (kind, A::Install | A::Update | A::Remove)
            if kind.has_content() || kind == R::Directory =>
        {
            3
        }
        (R::Host, A::Reload) => 4,
        (R::Volume | R::Network, A::Ensure) | (R::Volume, A::Import) | (R::Component, A::Setup) => {
            5
        }
        (R::Service, A::Start | A::Restart | A::Reload | A::Enable | A::Disable) => 6,
        (R::Volume | R::Network | R::Image | R::Build | R::Component, A::Cleanup) => 7,
        _ => return None,
    };
    Some(priority)
}

#[derive(Debug, Clone)]
struct Filed {
    priority: u8,
    action: Action,
}

#[derive(Debug, Clone, Default)]
struct ComponentChanges {
    resource_changes: Vec<Filed>,
    service_changes: Vec<Filed>,
}

/// Insert keeping the bucket sorted; equal priorities keep arrival order.
fn file_into(bucket: &mut Vec<Filed>, filed: Filed) {
    let at = bucket.partition_point(|f| f.priority <= filed.priority);
    bucket.insert(at, filed);
}

fn coalesce_rank(todo: ActionType) -> Option<u8> {
    match todo {
        ActionType::Reload => Some(0),
        ActionType::Start => Some(1),
        ActionType::Restart => Some(2),
        ActionType::Stop => Some(3),
        _ => None,
    }
}

/// Indices surviving coalescing, in emission order.
///
/// Per target path the highest-ranked state change wins and takes the
/// slot of the first one. Enable and Disable are always kept.
fn coalesced_indices<'a>(actions: impl Iterator<Item = &'a Action> + Clone) -> Vec<usize> {
    let mut winners: HashMap<&str, (usize, u8)> = HashMap::new();
    for (idx, action) in actions.clone().enumerate() {
        let Some(rank) = coalesce_rank(action.todo) else {
            continue;
        };
        winners
            .entry(action.target.path.as_str())
            .and_modify(|best| {
                if rank > best.1 {
                    *best = (idx, rank);
                }
            })
            .or_insert((idx, rank));
    }

    let mut emitted: Vec<&str> = Vec::new();
    let mut out = Vec::new();
    for (idx, action) in actions.enumerate() {
        if coalesce_rank(action.todo).is_none() {
            out.push(idx);
            continue;
        }
        let path = action.target.path.as_str();
        if emitted.contains(&path) {
            continue;
        }
        emitted.push(path);
        if let Some((winner, _)) = winners.get(path) {
            out.push(*winner);
        }
    }
    out
}

/// Collapse conflicting state changes on the same unit.
pub fn coalesce(actions: &[Action]) -> Vec<Action> {
    coalesced_indices(actions.iter())
        .into_iter()
        .map(|idx| actions[idx].clone())
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct Plan {
    host_changes: Vec<Filed>,
    changes: BTreeMap<String, ComponentChanges>,
    states: BTreeMap<String, ComponentState>,
    size: usize,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    /// File one action.
    pub fn add(&mut self, action: Action) -> Result<()> {
        action.validate()?;

        if action.priority != 0 {
            let priority = action.priority;
            let bucket = self.bucket(&action.parent.name);
            file_into(&mut bucket.resource_changes, Filed { priority, action });
            self.size += 1;
            return Ok(());
        }

        let priority =
            default_priority(action.target.kind, action.todo).ok_or(PlanError::NoPriority {
                kind: action.target.kind,
                todo: action.todo,
            })?;

        if is_host_reload(&action) {
            if self.host_changes.iter().any(|f| is_host_reload(&f.action)) {
                return Ok(());
            }
            file_into(&mut self.host_changes, Filed { priority, action });
            self.size += 1;
            return Ok(());
        }

        let bucket = self.bucket(&action.parent.name);
        let filed = Filed { priority, action };
        if filed.action.todo.is_service_action() {
            file_into(&mut bucket.service_changes, filed);
        } else {
            file_into(&mut bucket.resource_changes, filed);
        }
        self.size += 1;
        Ok(())
    }

    pub fn append(&mut self, actions: impl IntoIterator<Item = Action>) -> Result<()> {
        actions.into_iter().try_for_each(|action| self.add(action))
    }

    fn bucket(&mut self, component: &str) -> &mut ComponentChanges {
        self.changes.entry(component.to_string()).or_default()
    }

    /// Record the state planning decided for a component.
    pub fn set_state(&mut self, component: &str, state: ComponentState) {
        self.states.insert(component.to_string(), state);
    }

    pub fn states(&self) -> &BTreeMap<String, ComponentState> {
        &self.states
    }

    /// Number of filed actions, before coalescing.
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// The execution order.
    pub fn steps(&self) -> Vec<Action> {
        let mut ordered: Vec<&Filed> = Vec::with_capacity(self.size);
        ordered.extend(self.host_changes.iter());
        for changes in self.changes.values() {
            ordered.extend(changes.resource_changes.iter());
        }
        for changes in self.changes.values() {
            let services = &changes.service_changes;
            ordered.extend(
                coalesced_indices(services.iter().map(|f| &f.action))
                    .into_iter()
                    .map(|idx| &services[idx]),
            );
        }
        ordered.sort_by_key(|filed| filed.priority);
        ordered.into_iter().map(|filed| filed.action.clone()).collect()
    }

    pub fn to_records(&self) -> Vec<ActionRecord> {
        self.steps().iter().map(Action::to_record).collect()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.to_records())
    }
}

fn is_host_reload(action: &Action) -> bool {
    action.todo == ActionType::Reload && action.targets_host()
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, action) in self.steps().iter().enumerate() {
            writeln!(f, "{}. {}", idx + 1, action)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use components::{Component, ContentDiff, ROOT_COMPONENT, Resource};
    use std::sync::Arc;

    fn component(name: &str) -> Arc<Component> {
        Arc::new(Component::new(name))
    }

    fn service(parent: &Arc<Component>, todo: ActionType, name: &str) -> Action {
        Action::new(todo, parent, Resource::service(parent.name.clone(), name))
    }

    fn todos(steps: &[Action]) -> Vec<String> {
        steps.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_priority_table() {
        assert_eq!(default_priority(ResourceType::Service, ActionType::Stop), Some(1));
        assert_eq!(default_priority(ResourceType::Component, ActionType::Install), Some(2));
        assert_eq!(default_priority(ResourceType::Volume, ActionType::Dump), Some(2));
        assert_eq!(default_priority(ResourceType::Container, ActionType::Update), Some(3));
        assert_eq!(default_priority(ResourceType::Manifest, ActionType::Remove), Some(3));
        assert_eq!(default_priority(ResourceType::Directory, ActionType::Install), Some(3));
        assert_eq!(default_priority(ResourceType::Host, ActionType::Reload), Some(4));
        assert_eq!(default_priority(ResourceType::Volume, ActionType::Ensure), Some(5));
        assert_eq!(default_priority(ResourceType::Component, ActionType::Setup), Some(5));
        assert_eq!(default_priority(ResourceType::Service, ActionType::Enable), Some(6));
        assert_eq!(default_priority(ResourceType::Image, ActionType::Cleanup), Some(7));
        assert_eq!(default_priority(ResourceType::Service, ActionType::Install), None);
        assert_eq!(default_priority(ResourceType::Host, ActionType::Mount), None);
    }

    #[test]
    fn test_missing_priority_is_an_error() {
        let hello = component("hello");
        let mut plan = Plan::new();
        let err = plan
            .add(Action::new(ActionType::Mount, &hello, Resource::from_path("hello", "a.env")))
            .unwrap_err();
        assert!(matches!(err, PlanError::NoPriority { .. }));
    }

    #[test]
    fn test_steps_sorted_by_priority() {
        let hello = component("hello");
        let root = component(ROOT_COMPONENT);
        let mut plan = Plan::new();
        plan.add(service(&hello, ActionType::Start, "hello.service")).unwrap();
        plan.add(Action::new(ActionType::Reload, &root, Resource::host(ROOT_COMPONENT)))
            .unwrap();
        plan.add(
            Action::new(ActionType::Install, &hello, Resource::from_path("hello", "a.env"))
                .with_diff(ContentDiff::insertion("A=1")),
        )
        .unwrap();
        plan.add(Action::new(ActionType::Install, &hello, hello.to_resource()))
            .unwrap();

        assert_eq!(
            todos(&plan.steps()),
            vec![
                "install component hello",
                "install file hello/a.env",
                "reload host",
                "start service hello/hello.service",
            ]
        );
    }

    #[test]
    fn test_host_reload_deduplicated() {
        let a = component("a");
        let b = component("b");
        let mut plan = Plan::new();
        plan.add(Action::new(ActionType::Reload, &a, Resource::host(ROOT_COMPONENT)))
            .unwrap();
        plan.add(Action::new(ActionType::Reload, &b, Resource::host(ROOT_COMPONENT)))
            .unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.steps().len(), 1);
    }

    #[test]
    fn test_host_reload_precedes_manual_steps_of_equal_priority() {
        let app = component("app");
        let root = component(ROOT_COMPONENT);
        let data = Resource::from_path("app", "data.volume");
        let mut plan = Plan::new();
        plan.add(Action::new(ActionType::Ensure, &app, data.clone()).with_priority(4))
            .unwrap();
        plan.add(Action::new(ActionType::Import, &app, data).with_priority(4))
            .unwrap();
        plan.add(Action::new(ActionType::Reload, &root, Resource::host(ROOT_COMPONENT)))
            .unwrap();

        assert_eq!(
            todos(&plan.steps()),
            vec![
                "reload host",
                "ensure volume app/data.volume",
                "import volume app/data.volume",
            ]
        );
    }

    #[test]
    fn test_component_named_root_keeps_its_changes() {
        let user_root = component(ROOT_COMPONENT);
        let other = component("web");
        let mut plan = Plan::new();
        plan.add(
            Action::new(ActionType::Install, &user_root, Resource::from_path("root", "a.env"))
                .with_diff(ContentDiff::insertion("A=1")),
        )
        .unwrap();
        plan.add(Action::new(ActionType::Reload, &user_root, Resource::host(ROOT_COMPONENT)))
            .unwrap();
        plan.add(Action::new(ActionType::Reload, &other, Resource::host(ROOT_COMPONENT)))
            .unwrap();

        assert_eq!(plan.len(), 2);
        assert_eq!(
            todos(&plan.steps()),
            vec!["install file root/a.env", "reload host"]
        );
    }

    #[test]
    fn test_manual_priority_files_as_resource_change() {
        let hello = component("hello");
        let mut plan = Plan::new();
        plan.add(service(&hello, ActionType::Start, "db.service")).unwrap();
        plan.add(service(&hello, ActionType::Stop, "db.service").with_priority(1))
            .unwrap();
        plan.add(service(&hello, ActionType::Start, "db.service").with_priority(5))
            .unwrap();

        // manual actions are not coalesced with the automatic start
        let steps = plan.steps();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].todo, ActionType::Stop);
        assert_eq!(steps[1].priority, 5);
        assert_eq!(steps[2].priority, 0);
    }

    #[test]
    fn test_coalesce_highest_rank_wins() {
        let hello = component("hello");
        let actions = vec![
            service(&hello, ActionType::Start, "a.service"),
            service(&hello, ActionType::Enable, "a.service"),
            service(&hello, ActionType::Restart, "a.service"),
            service(&hello, ActionType::Reload, "b.service"),
            service(&hello, ActionType::Reload, "a.service"),
        ];
        let out = coalesce(&actions);
        assert_eq!(
            todos(&out),
            vec![
                "restart service hello/a.service",
                "enable service hello/a.service",
                "reload service hello/b.service",
            ]
        );
    }

    #[test]
    fn test_coalesce_stop_beats_everything() {
        let hello = component("hello");
        let actions = vec![
            service(&hello, ActionType::Restart, "a.service"),
            service(&hello, ActionType::Stop, "a.service"),
            service(&hello, ActionType::Disable, "a.service"),
        ];
        let out = coalesce(&actions);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].todo, ActionType::Stop);
        assert_eq!(out[1].todo, ActionType::Disable);
    }

    #[test]
    fn test_display_and_json() {
        let hello = component("hello");
        let mut plan = Plan::new();
        plan.add(Action::new(ActionType::Install, &hello, hello.to_resource()))
            .unwrap();
        plan.add(service(&hello, ActionType::Start, "hello.service").with_timeout(120))
            .unwrap();

        assert_eq!(
            plan.to_string(),
            "1. install component hello\n2. start service hello/hello.service\n"
        );

        let records: Vec<ActionRecord> = serde_json::from_str(&plan.to_json().unwrap()).unwrap();
        assert_eq!(records, plan.to_records());
        assert_eq!(records[1].parent, "hello");
        assert_eq!(
            records[1].metadata.as_ref().and_then(|m| m.service_timeout),
            Some(120)
        );
    }

    #[test]
    fn test_empty_plan() {
        let plan = Plan::new();
        assert!(plan.is_empty());
        assert!(plan.steps().is_empty());
        assert_eq!(plan.to_string(), "");
    }
}
