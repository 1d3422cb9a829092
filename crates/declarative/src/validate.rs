//! Checks over a finished step list.
//!
//! Each validator reports the first step breaking its rule. Planning runs
//! them in order and stops at the first violation, before anything on the
//! host has changed.

use crate::action::{Action, ActionType};
use crate::error::{PlanError, Result};
use components::ResourceType;
use std::collections::{BTreeSet, HashMap, HashSet};

/// A broken rule at a 0-based step index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub step: usize,
    pub detail: String,
}

impl Violation {
    fn at(step: usize, detail: impl Into<String>) -> Self {
        Self {
            step,
            detail: detail.into(),
        }
    }
}

pub trait Validator {
    fn name(&self) -> &'static str;

    fn check(&self, steps: &[Action]) -> Option<Violation>;
}

/// Installing units needs a daemon reload somewhere in the plan.
pub struct ReloadValidator;

impl Validator for ReloadValidator {
    fn name(&self) -> &'static str {
        "ReloadValidator"
    }

    fn check(&self, steps: &[Action]) -> Option<Violation> {
        let has_reload = steps
            .iter()
            .any(|a| a.todo == ActionType::Reload && a.targets_host());
        if has_reload {
            return None;
        }
        steps
            .iter()
            .position(|a| {
                a.todo == ActionType::Install
                    && (a.target.is_quadlet() || a.target.kind == ResourceType::Service)
            })
            .map(|idx| {
                Violation::at(idx, format!("{} without a daemon reload", steps[idx]))
            })
    }
}

/// Combined bundles must be expanded before planning.
pub struct CombinedResourceValidator;

impl Validator for CombinedResourceValidator {
    fn name(&self) -> &'static str {
        "CombinedResourceValidator"
    }

    fn check(&self, steps: &[Action]) -> Option<Violation> {
        steps
            .iter()
            .position(|a| a.target.kind == ResourceType::Combined)
            .map(|idx| Violation::at(idx, format!("{} targets an unexpanded bundle", steps[idx])))
    }
}

/// Quadlet targets must have a resolved host object.
pub struct QuadletValidator;

impl Validator for QuadletValidator {
    fn name(&self) -> &'static str {
        "QuadletValidator"
    }

    fn check(&self, steps: &[Action]) -> Option<Violation> {
        steps
            .iter()
            .position(|a| a.target.is_quadlet() && a.target.host_object.is_empty())
            .map(|idx| Violation::at(idx, format!("{} has no host object", steps[idx])))
    }
}

/// A volume is dumped before it is removed or cleaned up.
pub struct VolumeDumpValidator;

impl Validator for VolumeDumpValidator {
    fn name(&self) -> &'static str {
        "VolumeDumpValidator"
    }

    fn check(&self, steps: &[Action]) -> Option<Violation> {
        let mut gone: HashMap<(&str, &str), usize> = HashMap::new();
        for (idx, action) in steps.iter().enumerate() {
            if action.target.kind != ResourceType::Volume {
                continue;
            }
            let key = (action.target.parent.as_str(), action.target.path.as_str());
            match action.todo {
                ActionType::Remove | ActionType::Cleanup => {
                    gone.entry(key).or_insert(idx);
                }
                ActionType::Dump => {
                    if let Some(removed) = gone.get(&key) {
                        return Some(Violation::at(
                            idx,
                            format!(
                                "volume {}/{} is dumped after step {} removed it",
                                key.0,
                                key.1,
                                removed + 1
                            ),
                        ));
                    }
                }
                _ => {}
            }
        }
        None
    }
}

/// Resources of a component are installed after the component itself.
pub struct ComponentInstallValidator {
    installed: BTreeSet<String>,
}

impl ComponentInstallValidator {
    pub fn new(installed: impl IntoIterator<Item = String>) -> Self {
        Self {
            installed: installed.into_iter().collect(),
        }
    }
}

impl Validator for ComponentInstallValidator {
    fn name(&self) -> &'static str {
        "ComponentInstallValidator"
    }

    fn check(&self, steps: &[Action]) -> Option<Violation> {
        let mut ready: HashSet<&str> = self.installed.iter().map(String::as_str).collect();
        for (idx, action) in steps.iter().enumerate() {
            if action.todo != ActionType::Install {
                continue;
            }
            let owner = action.target.parent.as_str();
            if action.target.kind == ResourceType::Component {
                ready.insert(owner);
            } else if !ready.contains(owner) {
                return Some(Violation::at(
                    idx,
                    format!(
                        "{} comes before component {} is installed",
                        action, owner
                    ),
                ));
            }
        }
        None
    }
}

/// The standard pipeline, in order.
pub fn default_validators(installed: impl IntoIterator<Item = String>) -> Vec<Box<dyn Validator>> {
    vec![
        Box::new(ReloadValidator),
        Box::new(CombinedResourceValidator),
        Box::new(QuadletValidator),
        Box::new(VolumeDumpValidator),
        Box::new(ComponentInstallValidator::new(installed)),
    ]
}

/// Run `validators` in order; the first violation wins.
///
/// Step numbers in the error are 1-based, matching the plan listing.
pub fn validate(steps: &[Action], validators: &[Box<dyn Validator>]) -> Result<()> {
    for validator in validators {
        if let Some(violation) = validator.check(steps) {
            log::debug!("{} rejected step {}", validator.name(), violation.step + 1);
            return Err(PlanError::Validation {
                rule: validator.name(),
                step: violation.step + 1,
                detail: violation.detail,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use components::{Component, ContentDiff, ROOT_COMPONENT, Resource};
    use std::sync::Arc;

    fn hello() -> Arc<Component> {
        Arc::new(Component::new("hello"))
    }

    fn install(parent: &Arc<Component>, resource: Resource) -> Action {
        Action::new(ActionType::Install, parent, resource).with_diff(ContentDiff::empty())
    }

    fn container() -> Resource {
        Resource::from_path("hello", "hello.container").with_host_object("systemd-hello")
    }

    fn volume() -> Resource {
        Resource::from_path("hello", "data.volume").with_host_object("systemd-data")
    }

    #[test]
    fn test_reload_required_for_unit_install() {
        let c = hello();
        let steps = vec![install(&c, c.to_resource()), install(&c, container())];
        let violation = ReloadValidator.check(&steps).unwrap();
        assert_eq!(violation.step, 1);

        let mut with_reload = steps.clone();
        with_reload.push(Action::new(
            ActionType::Reload,
            &Arc::new(Component::root()),
            Resource::host(ROOT_COMPONENT),
        ));
        assert!(ReloadValidator.check(&with_reload).is_none());
    }

    #[test]
    fn test_plain_files_need_no_reload() {
        let c = hello();
        let steps = vec![install(&c, Resource::from_path("hello", "app.env"))];
        assert!(ReloadValidator.check(&steps).is_none());
    }

    #[test]
    fn test_combined_rejected() {
        let c = hello();
        let bundle = Resource::new("hello", "all.yaml", ResourceType::Combined);
        let steps = vec![install(&c, bundle)];
        assert_eq!(CombinedResourceValidator.check(&steps).unwrap().step, 0);
    }

    #[test]
    fn test_quadlet_needs_host_object() {
        let c = hello();
        let steps = vec![install(&c, Resource::from_path("hello", "hello.container"))];
        assert!(QuadletValidator.check(&steps).is_some());
        assert!(QuadletValidator.check(&[install(&c, container())]).is_none());
    }

    #[test]
    fn test_dump_must_precede_cleanup() {
        let c = hello();
        let dump = Action::new(ActionType::Dump, &c, volume());
        let cleanup = Action::new(ActionType::Cleanup, &c, volume());
        assert!(VolumeDumpValidator.check(&[dump.clone(), cleanup.clone()]).is_none());

        let violation = VolumeDumpValidator.check(&[cleanup, dump]).unwrap();
        assert_eq!(violation.step, 1);
        assert!(violation.detail.contains("hello/data.volume"));
    }

    #[test]
    fn test_component_installed_first() {
        let c = hello();
        let steps = vec![install(&c, container()), install(&c, c.to_resource())];
        let err = validate(&steps, &default_validators(Vec::new())).unwrap_err();
        match err {
            PlanError::Validation { rule, step, detail } => {
                // the reload rule fires first on this list
                assert_eq!(rule, "ReloadValidator");
                assert_eq!(step, 1);
                assert!(detail.contains("hello"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let files = vec![
            install(&c, Resource::from_path("hello", "app.env")),
            install(&c, c.to_resource()),
        ];
        let violation = ComponentInstallValidator::new(Vec::new())
            .check(&files)
            .unwrap();
        assert_eq!(violation.step, 0);
        assert!(violation.detail.contains("component hello"));

        let known = ComponentInstallValidator::new(vec!["hello".to_string()]);
        assert!(known.check(&files).is_none());
    }
}
