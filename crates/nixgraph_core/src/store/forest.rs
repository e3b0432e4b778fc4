//! Arena-backed ownership forest.
//!
//! # Responsibility
//! - Store tree nodes in a flat id table with explicit parent/children ids.
//! - Enforce sibling name uniqueness and acyclic ownership.
//!
//! # Invariants
//! - Every attached node is reachable from exactly one root.
//! - No node is its own ancestor; re-parenting checks this with an
//!   O(depth) ancestor walk.
//! - Sibling names are unique (roots count as siblings).

use crate::error::{ModelError, ModelResult};
use crate::model::entity::{validate_name, Entity, EntityId};
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct Node<T> {
    item: T,
    parent: Option<EntityId>,
    children: Vec<EntityId>,
}

#[derive(Debug, Clone)]
pub struct Forest<T> {
    nodes: HashMap<EntityId, Node<T>>,
    roots: Vec<EntityId>,
}

impl<T> Default for Forest<T> {
    fn default() -> Self {
        Self {
            nodes: HashMap::new(),
            roots: Vec::new(),
        }
    }
}

impl<T: Entity> Forest<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn get(&self, id: EntityId) -> Option<&T> {
        self.nodes.get(&id).map(|node| &node.item)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut T> {
        self.nodes.get_mut(&id).map(|node| &mut node.item)
    }

    /// Mutable access to every node, in no particular order.
    pub(crate) fn values_mut(&mut self) -> impl Iterator<Item = &mut T> + '_ {
        self.nodes.values_mut().map(|node| &mut node.item)
    }

    pub fn roots(&self) -> &[EntityId] {
        &self.roots
    }

    /// Owning parent; `None` for roots and unknown ids.
    pub fn parent(&self, id: EntityId) -> Option<EntityId> {
        self.nodes.get(&id).and_then(|node| node.parent)
    }

    pub fn children(&self, id: EntityId) -> &[EntityId] {
        self.nodes
            .get(&id)
            .map_or(&[][..], |node| node.children.as_slice())
    }

    fn siblings(&self, parent: Option<EntityId>) -> &[EntityId] {
        match parent {
            Some(parent) => self.children(parent),
            None => &self.roots,
        }
    }

    pub fn child_named(&self, parent: Option<EntityId>, name: &str) -> Option<&T> {
        self.siblings(parent)
            .iter()
            .filter_map(|id| self.get(*id))
            .find(|item| item.name() == name)
    }

    /// Fails with `DuplicateName` if a sibling other than `except` uses `name`.
    pub fn ensure_name_free(
        &self,
        parent: Option<EntityId>,
        name: &str,
        except: Option<EntityId>,
    ) -> ModelResult<()> {
        let taken = self
            .siblings(parent)
            .iter()
            .filter(|id| Some(**id) != except)
            .filter_map(|id| self.get(*id))
            .any(|item| item.name() == name);
        if taken {
            return Err(ModelError::DuplicateName {
                kind: T::KIND,
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Inserts `item` under `parent` (or as a root).
    pub fn insert(&mut self, item: T, parent: Option<EntityId>) -> ModelResult<EntityId> {
        let id = item.id();
        if self.contains(id) {
            return Err(ModelError::DuplicateId(id));
        }
        if let Some(parent) = parent {
            if !self.contains(parent) {
                return Err(ModelError::NotFound(parent));
            }
        }
        self.ensure_name_free(parent, item.name(), None)?;
        self.nodes.insert(
            id,
            Node {
                item,
                parent,
                children: Vec::new(),
            },
        );
        self.link_child(id, parent);
        Ok(id)
    }

    /// Stores `item` without placing it in the tree yet. Pair with `attach`.
    pub(crate) fn insert_detached(&mut self, item: T) -> ModelResult<EntityId> {
        let id = item.id();
        if self.contains(id) {
            return Err(ModelError::DuplicateId(id));
        }
        self.nodes.insert(
            id,
            Node {
                item,
                parent: None,
                children: Vec::new(),
            },
        );
        Ok(id)
    }

    /// Places a detached node under `parent`, checking names and cycles.
    pub(crate) fn attach(&mut self, id: EntityId, parent: Option<EntityId>) -> ModelResult<()> {
        let name = self
            .get(id)
            .map(|item| item.name().to_string())
            .ok_or(ModelError::NotFound(id))?;
        self.check_parent(id, parent)?;
        self.ensure_name_free(parent, &name, Some(id))?;
        if let Some(node) = self.nodes.get_mut(&id) {
            node.parent = parent;
        }
        self.link_child(id, parent);
        Ok(())
    }

    /// Proper ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: EntityId) -> Vec<EntityId> {
        let mut chain = Vec::new();
        let mut cursor = self.parent(id);
        while let Some(current) = cursor {
            if chain.len() > self.nodes.len() {
                break;
            }
            chain.push(current);
            cursor = self.parent(current);
        }
        chain
    }

    /// Whether `candidate` is a proper ancestor of `id`.
    pub fn is_ancestor(&self, candidate: EntityId, id: EntityId) -> bool {
        let mut cursor = self.parent(id);
        let mut steps = 0;
        while let Some(current) = cursor {
            if current == candidate {
                return true;
            }
            steps += 1;
            if steps > self.nodes.len() {
                return false;
            }
            cursor = self.parent(current);
        }
        false
    }

    /// Depth of `id`; roots are at depth 0.
    pub fn depth(&self, id: EntityId) -> usize {
        self.ancestors(id).len()
    }

    /// Moves `id` (with its subtree) under `new_parent`, or to the roots.
    pub fn reparent(&mut self, id: EntityId, new_parent: Option<EntityId>) -> ModelResult<()> {
        let name = self
            .get(id)
            .map(|item| item.name().to_string())
            .ok_or(ModelError::NotFound(id))?;
        self.check_parent(id, new_parent)?;
        self.ensure_name_free(new_parent, &name, Some(id))?;

        self.unlink_child(id);
        if let Some(node) = self.nodes.get_mut(&id) {
            node.parent = new_parent;
        }
        self.link_child(id, new_parent);
        Ok(())
    }

    /// Pre-order ids of the subtree rooted at `id`, including `id`.
    pub fn subtree_ids(&self, id: EntityId) -> Vec<EntityId> {
        let mut out = Vec::new();
        if !self.contains(id) {
            return out;
        }
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.children(current).iter().rev().copied());
        }
        out
    }

    /// Detaches and removes the subtree at `id`; returns its items in pre-order.
    pub fn remove_subtree(&mut self, id: EntityId) -> ModelResult<Vec<T>> {
        if !self.contains(id) {
            return Err(ModelError::NotFound(id));
        }
        let ids = self.subtree_ids(id);
        self.unlink_child(id);
        Ok(ids
            .into_iter()
            .filter_map(|removed| self.nodes.remove(&removed).map(|node| node.item))
            .collect())
    }

    /// Depth-first pre-order walk over ownership edges.
    ///
    /// Starts at `start` (depth 0) or at every root. Nodes deeper than
    /// `max_depth` are neither returned nor descended into.
    pub fn walk(
        &self,
        start: Option<EntityId>,
        max_depth: Option<usize>,
        filter: impl Fn(&T) -> bool,
    ) -> ModelResult<Vec<&T>> {
        let mut stack: Vec<(EntityId, usize)> = match start {
            Some(id) if !self.contains(id) => return Err(ModelError::NotFound(id)),
            Some(id) => vec![(id, 0)],
            None => self.roots.iter().rev().map(|id| (*id, 0)).collect(),
        };
        let mut out = Vec::new();
        while let Some((id, depth)) = stack.pop() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            if filter(&node.item) {
                out.push(&node.item);
            }
            if max_depth.map_or(true, |limit| depth < limit) {
                stack.extend(node.children.iter().rev().map(|child| (*child, depth + 1)));
            }
        }
        Ok(out)
    }

    /// Every node in pre-order.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        let mut stack: Vec<EntityId> = self.roots.iter().rev().copied().collect();
        std::iter::from_fn(move || {
            let id = stack.pop()?;
            let node = self.nodes.get(&id)?;
            stack.extend(node.children.iter().rev().copied());
            Some(&node.item)
        })
    }

    pub fn rename(&mut self, id: EntityId, name: &str) -> ModelResult<()> {
        validate_name(name)?;
        if !self.contains(id) {
            return Err(ModelError::NotFound(id));
        }
        self.ensure_name_free(self.parent(id), name, Some(id))?;
        let item = self.get_mut(id).ok_or(ModelError::NotFound(id))?;
        let meta = item.meta_mut();
        meta.name = name.to_string();
        meta.touch();
        Ok(())
    }

    fn check_parent(&self, id: EntityId, parent: Option<EntityId>) -> ModelResult<()> {
        let Some(parent) = parent else {
            return Ok(());
        };
        if !self.contains(parent) {
            return Err(ModelError::NotFound(parent));
        }
        if parent == id || self.is_ancestor(id, parent) {
            return Err(ModelError::CyclicReference { node: id, parent });
        }
        Ok(())
    }

    fn link_child(&mut self, id: EntityId, parent: Option<EntityId>) {
        match parent.and_then(|parent| self.nodes.get_mut(&parent)) {
            Some(node) => node.children.push(id),
            None => self.roots.push(id),
        }
    }

    fn unlink_child(&mut self, id: EntityId) {
        match self.parent(id) {
            Some(parent) => {
                if let Some(node) = self.nodes.get_mut(&parent) {
                    node.children.retain(|child| *child != id);
                }
            }
            None => self.roots.retain(|root| *root != id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Forest;
    use crate::error::ModelError;
    use crate::model::section::Section;

    fn section(name: &str) -> Section {
        Section::new(name, None).unwrap()
    }

    #[test]
    fn reparent_rejects_descendants() {
        let mut forest = Forest::new();
        let a = forest.insert(section("a"), None).unwrap();
        let b = forest.insert(section("b"), Some(a)).unwrap();
        let c = forest.insert(section("c"), Some(b)).unwrap();

        let err = forest.reparent(a, Some(c)).unwrap_err();
        assert!(matches!(err, ModelError::CyclicReference { .. }));
        assert!(forest.reparent(a, Some(a)).is_err());

        forest.reparent(c, None).unwrap();
        assert_eq!(forest.roots(), &[a, c]);
        assert!(forest.children(b).is_empty());
    }

    #[test]
    fn siblings_need_distinct_names() {
        let mut forest = Forest::new();
        let root = forest.insert(section("root"), None).unwrap();
        forest.insert(section("x"), Some(root)).unwrap();
        let err = forest.insert(section("x"), Some(root)).unwrap_err();
        assert!(matches!(err, ModelError::DuplicateName { .. }));
        forest.insert(section("x"), None).unwrap();
    }

    #[test]
    fn walk_is_preorder_and_depth_limited() {
        let mut forest = Forest::new();
        let a = forest.insert(section("a"), None).unwrap();
        let b = forest.insert(section("b"), Some(a)).unwrap();
        forest.insert(section("c"), Some(b)).unwrap();
        forest.insert(section("d"), Some(a)).unwrap();

        let names = |limit| -> Vec<String> {
            forest
                .walk(None, limit, |_| true)
                .unwrap()
                .into_iter()
                .map(|s| s.meta.name.clone())
                .collect()
        };
        assert_eq!(names(None), vec!["a", "b", "c", "d"]);
        assert_eq!(names(Some(1)), vec!["a", "b", "d"]);

        let removed = forest.remove_subtree(b).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(forest.len(), 2);
    }
}
