//! Pairs installed and assigned components by name.

use crate::error::{PlanError, Result};
use components::{Component, ComponentState};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

/// Which sides of a component exist
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeKind {
    /// Assigned but not installed
    ToInstall(Component),
    /// Installed but no longer assigned
    ToRemove(Component),
    /// Installed and assigned
    ToReconcile { host: Component, source: Component },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentTree {
    pub name: String,
    pub kind: TreeKind,
    pub final_state: ComponentState,
}

impl ComponentTree {
    pub fn host(&self) -> Option<&Component> {
        match &self.kind {
            TreeKind::ToRemove(host) | TreeKind::ToReconcile { host, .. } => Some(host),
            TreeKind::ToInstall(_) => None,
        }
    }

    pub fn source(&self) -> Option<&Component> {
        match &self.kind {
            TreeKind::ToInstall(source) | TreeKind::ToReconcile { source, .. } => Some(source),
            TreeKind::ToRemove(_) => None,
        }
    }
}

/// Every component tree of one run, in name order
#[derive(Debug, Clone, Default)]
pub struct ComponentGraph {
    trees: BTreeMap<String, ComponentTree>,
}

impl ComponentGraph {
    /// Build the graph from what is installed and what is assigned.
    ///
    /// Installed components without an assigned counterpart are marked
    /// `NeedRemoval`; installed components that are still assigned are
    /// marked `MayNeedUpdate`.
    pub fn build(installed: Vec<Component>, assigned: Vec<Component>) -> Result<Self> {
        let mut hosts: BTreeMap<String, Component> = BTreeMap::new();
        for component in installed {
            if component.name.is_empty() {
                return Err(PlanError::EmptyName);
            }
            match hosts.entry(component.name.clone()) {
                Entry::Occupied(_) => return Err(PlanError::DuplicateComponent(component.name)),
                Entry::Vacant(slot) => {
                    slot.insert(component);
                }
            }
        }

        let mut trees = BTreeMap::new();
        for source in assigned {
            if source.name.is_empty() {
                return Err(PlanError::EmptyName);
            }
            if trees.contains_key(&source.name) {
                return Err(PlanError::DuplicateComponent(source.name));
            }
            let name = source.name.clone();
            let kind = match hosts.remove(&name) {
                Some(mut host) => {
                    host.state = ComponentState::MayNeedUpdate;
                    TreeKind::ToReconcile { host, source }
                }
                None => TreeKind::ToInstall(source),
            };
            trees.insert(name.clone(), ComponentTree::new(name, kind)?);
        }

        for (name, mut host) in hosts {
            host.state = ComponentState::NeedRemoval;
            trees.insert(name.clone(), ComponentTree::new(name, TreeKind::ToRemove(host))?);
        }

        log::debug!("component graph has {} trees", trees.len());
        Ok(Self { trees })
    }

    pub fn get(&self, name: &str) -> Option<&ComponentTree> {
        self.trees.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ComponentTree> {
        self.trees.values()
    }

    pub fn into_trees(self) -> impl Iterator<Item = ComponentTree> {
        self.trees.into_values()
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }
}

impl ComponentTree {
    /// A tree whose components all carry its name.
    pub fn new(name: String, kind: TreeKind) -> Result<Self> {
        if name.is_empty() {
            return Err(PlanError::EmptyName);
        }
        if let TreeKind::ToReconcile { host, source } = &kind
            && host.name != source.name
        {
            return Err(PlanError::NameMismatch {
                tree: name,
                host: host.name.clone(),
                source_name: source.name.clone(),
            });
        }
        let tree = Self {
            name,
            kind,
            final_state: ComponentState::Unknown,
        };
        let owner = tree.host().or(tree.source()).map(|c| c.name.as_str());
        if owner != Some(tree.name.as_str()) {
            return Err(PlanError::NameMismatch {
                tree: tree.name.clone(),
                host: tree.host().map(|c| c.name.clone()).unwrap_or_default(),
                source_name: tree.source().map(|c| c.name.clone()).unwrap_or_default(),
            });
        }
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_classifies_trees() {
        let installed = vec![Component::new("old"), Component::new("kept")];
        let assigned = vec![Component::new("kept"), Component::new("new")];
        let graph = ComponentGraph::build(installed, assigned).unwrap();

        let names: Vec<&str> = graph.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["kept", "new", "old"]);

        assert!(matches!(graph.get("new").unwrap().kind, TreeKind::ToInstall(_)));
        let old = graph.get("old").unwrap();
        assert_eq!(old.host().unwrap().state, ComponentState::NeedRemoval);
        let kept = graph.get("kept").unwrap();
        assert_eq!(kept.host().unwrap().state, ComponentState::MayNeedUpdate);
        assert!(kept.source().is_some());
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(matches!(
            ComponentGraph::build(vec![Component::new("")], vec![]),
            Err(PlanError::EmptyName)
        ));
        assert!(matches!(
            ComponentGraph::build(vec![], vec![Component::new("")]),
            Err(PlanError::EmptyName)
        ));
    }

    #[test]
    fn test_duplicates_rejected() {
        let err = ComponentGraph::build(vec![], vec![Component::new("a"), Component::new("a")])
            .unwrap_err();
        assert!(matches!(err, PlanError::DuplicateComponent(name) if name == "a"));
    }

    #[test]
    fn test_name_mismatch_rejected() {
        let err = ComponentTree::new(
            "a".into(),
            TreeKind::ToReconcile {
                host: Component::new("a"),
                source: Component::new("b"),
            },
        )
        .unwrap_err();
        assert!(matches!(err, PlanError::NameMismatch { .. }));

        assert!(ComponentTree::new("a".into(), TreeKind::ToInstall(Component::new("b"))).is_err());
    }

    #[test]
    fn test_empty_graph() {
        let graph = ComponentGraph::build(vec![], vec![]).unwrap();
        assert!(graph.is_empty());
    }
}
