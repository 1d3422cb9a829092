//! Ordered, path-unique collection of resources.
//!
//! Keeps insertion order (the order resources were discovered in) next to
//! a path index. Set algebra only looks at paths, never at content, which
//! is what splitting an update into install/remove/maybe-update needs.

use crate::error::{Error, Result};
use crate::resource::{Resource, ResourceType};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceSet {
    order: Vec<String>,
    items: HashMap<String, Resource>,
}

impl ResourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource; fails if its path is already present.
    pub fn add(&mut self, resource: Resource) -> Result<()> {
        if self.items.contains_key(&resource.path) {
            return Err(Error::DuplicateResource(resource.path));
        }
        self.order.push(resource.path.clone());
        self.items.insert(resource.path.clone(), resource);
        Ok(())
    }

    /// Insert or replace. A replaced resource keeps its original position.
    pub fn set(&mut self, resource: Resource) {
        if !self.items.contains_key(&resource.path) {
            self.order.push(resource.path.clone());
        }
        self.items.insert(resource.path.clone(), resource);
    }

    /// Remove a resource by path, returning it if present.
    pub fn delete(&mut self, path: &str) -> Option<Resource> {
        let removed = self.items.remove(path)?;
        self.order.retain(|p| p != path);
        Some(removed)
    }

    pub fn get(&self, path: &str) -> Option<&Resource> {
        self.items.get(path)
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut Resource> {
        self.items.get_mut(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.items.contains_key(path)
    }

    /// Resources in insertion order.
    pub fn list(&self) -> Vec<&Resource> {
        self.iter().collect()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Resource> {
        self.order.iter().filter_map(|p| self.items.get(p))
    }

    /// Paths in insertion order.
    pub fn paths(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Resources of one kind, in insertion order.
    pub fn of_kind(&self, kind: ResourceType) -> impl Iterator<Item = &Resource> {
        self.iter().filter(move |r| r.kind == kind)
    }

    /// Every resource of `self`, followed by those of `other` whose path
    /// `self` lacks.
    pub fn union(&self, other: &ResourceSet) -> ResourceSet {
        let mut out = self.clone();
        for resource in other.iter() {
            if !out.contains(&resource.path) {
                out.set(resource.clone());
            }
        }
        out
    }

    /// Resources of `self` whose path is also in `other`.
    pub fn intersection(&self, other: &ResourceSet) -> ResourceSet {
        self.filtered(|path| other.contains(path))
    }

    /// Resources of `self` whose path is not in `other`.
    pub fn difference(&self, other: &ResourceSet) -> ResourceSet {
        self.filtered(|path| !other.contains(path))
    }

    fn filtered(&self, keep: impl Fn(&str) -> bool) -> ResourceSet {
        let mut out = ResourceSet::new();
        for resource in self.iter().filter(|r| keep(&r.path)) {
            out.set(resource.clone());
        }
        out
    }
}

impl FromIterator<Resource> for ResourceSet {
    /// Later duplicates replace earlier ones in place.
    fn from_iter<I: IntoIterator<Item = Resource>>(iter: I) -> Self {
        let mut set = ResourceSet::new();
        for resource in iter {
            set.set(resource);
        }
        set
    }
}
