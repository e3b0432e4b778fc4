//! Section tree and property operations.
//!
//! # Invariants
//! - Ownership edges never form a cycle; links are separate, non-owning
//!   edges that may dangle once their target is deleted.
//! - A link never targets the section itself or one of its ancestors.
//! - Link traversal always carries a visited set.

use crate::backend::{CommitEvent, Operation};
use crate::error::{ModelError, ModelResult};
use crate::file::{File, Location};
use crate::model::entity::{EntityId, EntityKind};
use crate::model::property::{OdmlType, Property};
use crate::model::section::Section;
use crate::model::value::Value;
use crate::store::Forest;
use log::info;
use std::collections::{HashMap, HashSet};

impl File {
    pub fn sections(&self) -> &Forest<Section> {
        &self.sections
    }

    pub fn section(&self, id: EntityId) -> ModelResult<&Section> {
        self.sections.get(id).ok_or(ModelError::NotFound(id))
    }

    /// Creates a top-level section.
    pub fn create_section(&mut self, name: &str, section_type: Option<&str>) -> ModelResult<EntityId> {
        self.insert_section(None, name, section_type)
    }

    /// Creates a child of `parent`; fails with `DuplicateName` on a sibling clash.
    pub fn create_child_section(
        &mut self,
        parent: EntityId,
        name: &str,
        section_type: Option<&str>,
    ) -> ModelResult<EntityId> {
        self.insert_section(Some(parent), name, section_type)
    }

    fn insert_section(
        &mut self,
        parent: Option<EntityId>,
        name: &str,
        section_type: Option<&str>,
    ) -> ModelResult<EntityId> {
        let section = Section::new(name, section_type)?;
        let id = self.sections.insert(section, parent)?;
        self.register(id, Location::top(EntityKind::Section));
        self.commit(id, EntityKind::Section, Operation::Create, None)?;
        Ok(id)
    }

    /// Owning parent of a section; `None` for top-level sections.
    pub fn parent_section(&self, id: EntityId) -> ModelResult<Option<EntityId>> {
        if !self.sections.contains(id) {
            return Err(ModelError::NotFound(id));
        }
        Ok(self.sections.parent(id))
    }

    /// Deletes `child` and its subtree; `child` must be a direct child of `parent`.
    pub fn remove_child_section(&mut self, parent: EntityId, child: EntityId) -> ModelResult<()> {
        if !self.sections.contains(parent) {
            return Err(ModelError::NotFound(parent));
        }
        if self.sections.parent(child) != Some(parent) {
            return Err(ModelError::NotFound(child));
        }
        self.delete_section(child)
    }

    /// Deletes a section subtree. Links and metadata references to the
    /// removed sections are left dangling.
    pub fn delete_section(&mut self, id: EntityId) -> ModelResult<()> {
        let removed = self.sections.remove_subtree(id)?;
        for section in &removed {
            self.registry.remove(&section.meta.id);
        }
        info!(
            "event=section_delete module=file status=ok section_id={} removed={}",
            id,
            removed.len()
        );
        let events = removed
            .iter()
            .map(|section| CommitEvent {
                entity_id: section.meta.id,
                kind: EntityKind::Section,
                operation: Operation::Delete,
                field: None,
            })
            .collect();
        self.commit_all(events)
    }

    /// Re-parents a section; `None` makes it top-level.
    ///
    /// Fails with `InvalidLink`, leaving the tree unchanged, when a section
    /// of the moved subtree links to one of its new ancestors.
    pub fn move_section(&mut self, id: EntityId, new_parent: Option<EntityId>) -> ModelResult<()> {
        if !self.sections.contains(id) {
            return Err(ModelError::NotFound(id));
        }
        let moved = self.sections.subtree_ids(id);
        if let Some(parent) = new_parent.filter(|parent| !moved.contains(parent)) {
            let mut above: HashSet<EntityId> = self.sections.ancestors(parent).into_iter().collect();
            above.insert(parent);
            for section in moved.iter().filter_map(|member| self.sections.get(*member)) {
                if let Some(target) = section.link.filter(|target| above.contains(target)) {
                    return Err(ModelError::InvalidLink {
                        section: section.meta.id,
                        target,
                    });
                }
            }
        }
        self.sections.reparent(id, new_parent)?;
        if let Some(section) = self.sections.get_mut(id) {
            section.meta.touch();
        }
        self.commit(id, EntityKind::Section, Operation::Update, Some("parent"))
    }

    /// Copies `source` with fresh ids under `parent`, or top-level for `None`.
    ///
    /// `name` renames the copied root. Without `children` only the section
    /// and its properties are copied. Links between copied sections follow
    /// the copies; other links keep their target. Fails with `DuplicateName`
    /// when the name is taken under `parent` and with `InvalidLink` when a
    /// kept link would target an ancestor of its copy.
    pub fn copy_section(
        &mut self,
        source: EntityId,
        parent: Option<EntityId>,
        name: Option<&str>,
        children: bool,
    ) -> ModelResult<EntityId> {
        let original = self.section(source)?;
        let root_name = name.map_or_else(|| original.meta.name.clone(), str::to_string);
        if let Some(parent) = parent {
            if !self.sections.contains(parent) {
                return Err(ModelError::NotFound(parent));
            }
        }
        self.sections.ensure_name_free(parent, &root_name, None)?;

        let originals = if children {
            self.sections.subtree_ids(source)
        } else {
            vec![source]
        };
        let mut fresh: HashMap<EntityId, EntityId> = HashMap::with_capacity(originals.len());
        let mut staged: Vec<(Section, Option<EntityId>)> = Vec::with_capacity(originals.len());
        for original in &originals {
            let section = self.section(*original)?;
            let (copy, copy_parent) = if *original == source {
                (section.duplicate(&root_name)?, parent)
            } else {
                let owner = self
                    .sections
                    .parent(*original)
                    .and_then(|owner| fresh.get(&owner).copied());
                (section.duplicate(&section.meta.name)?, owner)
            };
            fresh.insert(*original, copy.meta.id);
            staged.push((copy, copy_parent));
        }

        let mut above: HashSet<EntityId> = HashSet::new();
        if let Some(parent) = parent {
            above.extend(self.sections.ancestors(parent));
            above.insert(parent);
        }
        for (copy, _) in &mut staged {
            if let Some(target) = copy.link {
                if let Some(remapped) = fresh.get(&target) {
                    copy.link = Some(*remapped);
                } else if above.contains(&target) {
                    return Err(ModelError::InvalidLink {
                        section: copy.meta.id,
                        target,
                    });
                }
            }
        }

        let mut events = Vec::with_capacity(staged.len());
        for (copy, copy_parent) in staged {
            let id = self.sections.insert(copy, copy_parent)?;
            self.register(id, Location::top(EntityKind::Section));
            events.push(CommitEvent {
                entity_id: id,
                kind: EntityKind::Section,
                operation: Operation::Create,
                field: None,
            });
        }
        let copied = fresh.get(&source).copied().ok_or(ModelError::NotFound(source))?;
        info!(
            "event=section_copy module=file status=ok source_id={} section_id={} copied={}",
            source,
            copied,
            events.len()
        );
        self.commit_all(events)?;
        Ok(copied)
    }

    /// Links `id` to `target`.
    ///
    /// Fails with `NotFound` if `target` is missing and with `InvalidLink`
    /// if it is `id` itself or an ownership ancestor of `id`.
    pub fn link_section(&mut self, id: EntityId, target: EntityId) -> ModelResult<()> {
        if !self.sections.contains(id) {
            return Err(ModelError::NotFound(id));
        }
        if !self.sections.contains(target) {
            return Err(ModelError::NotFound(target));
        }
        if target == id || self.sections.is_ancestor(target, id) {
            return Err(ModelError::InvalidLink {
                section: id,
                target,
            });
        }
        self.update_section(id, "link", |section| section.link = Some(target))
    }

    pub fn unlink_section(&mut self, id: EntityId) -> ModelResult<()> {
        self.update_section(id, "link", |section| section.link = None)
    }

    /// Section the link points at; `Ok(None)` without a link, `NotFound` when
    /// the target was deleted.
    pub fn resolve_link(&self, id: EntityId) -> ModelResult<Option<&Section>> {
        match self.section(id)?.link {
            Some(target) => self.section(target).map(Some),
            None => Ok(None),
        }
    }

    /// Ids reached by following links from `id`, in order. Stops at a missing
    /// target or at the first revisited section.
    pub fn follow_link_chain(&self, id: EntityId) -> ModelResult<Vec<EntityId>> {
        let mut visited = HashSet::from([id]);
        let mut chain = Vec::new();
        let mut cursor = self.section(id)?.link;
        while let Some(next) = cursor {
            let Some(section) = self.sections.get(next) else {
                break;
            };
            if !visited.insert(next) {
                break;
            }
            chain.push(next);
            cursor = section.link;
        }
        Ok(chain)
    }

    /// Depth-first pre-order search over ownership edges.
    ///
    /// Starts at `start` (depth 0) or at every top-level section.
    pub fn find_sections(
        &self,
        start: Option<EntityId>,
        max_depth: Option<usize>,
        filter: impl Fn(&Section) -> bool,
    ) -> ModelResult<Vec<&Section>> {
        self.sections.walk(start, max_depth, filter)
    }

    /// Own properties followed by those inherited along the link chain.
    /// A name already seen shadows later ones.
    pub fn inherited_properties(&self, id: EntityId) -> ModelResult<Vec<&Property>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let chain = std::iter::once(id).chain(self.follow_link_chain(id)?);
        for section_id in chain {
            let Some(section) = self.sections.get(section_id) else {
                continue;
            };
            for property in section.properties() {
                if seen.insert(property.name()) {
                    out.push(property);
                }
            }
        }
        Ok(out)
    }

    pub fn set_section_repository(&mut self, id: EntityId, repository: Option<&str>) -> ModelResult<()> {
        let repository = repository.map(str::to_string);
        self.update_section(id, "repository", |section| section.repository = repository)
    }

    pub fn set_section_mapping(&mut self, id: EntityId, mapping: Option<&str>) -> ModelResult<()> {
        let mapping = mapping.map(str::to_string);
        self.update_section(id, "mapping", |section| section.mapping = mapping)
    }

    fn update_section(
        &mut self,
        id: EntityId,
        field: &'static str,
        edit: impl FnOnce(&mut Section),
    ) -> ModelResult<()> {
        let section = self.sections.get_mut(id).ok_or(ModelError::NotFound(id))?;
        edit(section);
        section.meta.touch();
        self.commit(id, EntityKind::Section, Operation::Update, Some(field))
    }

    pub fn property(&self, section: EntityId, name: &str) -> ModelResult<&Property> {
        self.section(section)?
            .property(name)
            .ok_or_else(|| ModelError::PropertyNotFound {
                section,
                name: name.to_string(),
            })
    }

    /// Creates or replaces the values of property `name`.
    ///
    /// All values must share one payload type (`TypeMismatch` otherwise).
    /// Replacing keeps the property id and annotations; an odML type hint
    /// that no longer fits the new values is dropped.
    pub fn set_property(
        &mut self,
        section: EntityId,
        name: &str,
        values: Vec<Value>,
    ) -> ModelResult<EntityId> {
        let target = self
            .sections
            .get_mut(section)
            .ok_or(ModelError::NotFound(section))?;
        let staged = match target.property(name) {
            Some(existing) => {
                let mut staged = existing.clone();
                if let (Some(hint), Some(first)) = (staged.odml_type(), values.first()) {
                    if !hint.compatible(first.value_type()) {
                        staged.set_odml_type(None)?;
                    }
                }
                staged.set_values(values)?;
                staged
            }
            None => Property::new(name, values)?,
        };
        let property_id = staged.id();
        target.upsert_property(staged);
        self.commit(section, EntityKind::Section, Operation::Update, Some("properties"))?;
        Ok(property_id)
    }

    /// Appends values of the property's existing type.
    pub fn extend_property_values(
        &mut self,
        section: EntityId,
        name: &str,
        values: Vec<Value>,
    ) -> ModelResult<()> {
        self.update_property(section, name, |property| property.extend_values(values))
    }

    pub fn clear_property_values(&mut self, section: EntityId, name: &str) -> ModelResult<()> {
        self.update_property(section, name, |property| {
            property.clear_values();
            Ok(())
        })
    }

    pub fn set_property_odml_type(
        &mut self,
        section: EntityId,
        name: &str,
        odml_type: Option<OdmlType>,
    ) -> ModelResult<()> {
        self.update_property(section, name, |property| property.set_odml_type(odml_type))
    }

    /// Edits a copy of the property and stores it only if `edit` succeeds.
    pub fn update_property<R>(
        &mut self,
        section: EntityId,
        name: &str,
        edit: impl FnOnce(&mut Property) -> ModelResult<R>,
    ) -> ModelResult<R> {
        let target = self
            .sections
            .get_mut(section)
            .ok_or(ModelError::NotFound(section))?;
        let slot = target.property_mut(name)?;
        let mut staged = slot.clone();
        let result = edit(&mut staged)?;
        *slot = staged;
        target.meta.touch();
        self.commit(section, EntityKind::Section, Operation::Update, Some("properties"))?;
        Ok(result)
    }

    pub fn delete_property(&mut self, section: EntityId, name: &str) -> ModelResult<()> {
        self.sections
            .get_mut(section)
            .ok_or(ModelError::NotFound(section))?
            .remove_property(name)?;
        self.commit(section, EntityKind::Section, Operation::Update, Some("properties"))
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ModelError;
    use crate::file::File;
    use crate::model::entity::Entity;
    use crate::model::value::Value;

    #[test]
    fn links_cannot_target_ancestors() {
        let mut file = File::new();
        let root = file.create_section("recording", None).unwrap();
        let child = file.create_child_section(root, "amplifier", None).unwrap();
        let other = file.create_section("templates", None).unwrap();

        assert!(matches!(
            file.link_section(child, root),
            Err(ModelError::InvalidLink { .. })
        ));
        assert!(file.link_section(child, child).is_err());
        file.link_section(child, other).unwrap();
        file.link_section(other, child).unwrap();
        assert_eq!(file.follow_link_chain(child).unwrap(), vec![other]);
    }

    #[test]
    fn dangling_links_resolve_to_not_found() {
        let mut file = File::new();
        let a = file.create_section("a", None).unwrap();
        let b = file.create_section("b", None).unwrap();
        file.link_section(a, b).unwrap();
        assert_eq!(file.resolve_link(a).unwrap().map(|s| s.id()), Some(b));

        file.delete_section(b).unwrap();
        assert!(matches!(file.resolve_link(a), Err(ModelError::NotFound(id)) if id == b));
        assert!(file.follow_link_chain(a).unwrap().is_empty());
    }

    #[test]
    fn set_property_rejects_mixed_values_without_change() {
        let mut file = File::new();
        let section = file.create_section("subject", None).unwrap();
        file.set_property(section, "age", vec![Value::from(12_i64)])
            .unwrap();
        let err = file
            .set_property(section, "age", vec![Value::from(1_i64), Value::from("x")])
            .unwrap_err();
        assert!(matches!(err, ModelError::TypeMismatch { .. }));
        assert_eq!(
            file.property(section, "age").unwrap().values()[0].as_i64(),
            Some(12)
        );
    }

    #[test]
    fn inherited_properties_are_shadowed_by_own_names() {
        let mut file = File::new();
        let base = file.create_section("base", None).unwrap();
        let derived = file.create_section("derived", None).unwrap();
        file.set_property(base, "gain", vec![Value::from(1.0)])
            .unwrap();
        file.set_property(base, "filter", vec![Value::from("lowpass")])
            .unwrap();
        file.set_property(derived, "gain", vec![Value::from(2.0)])
            .unwrap();
        file.link_section(derived, base).unwrap();
        file.link_section(base, derived).unwrap();

        let props = file.inherited_properties(derived).unwrap();
        let gains: Vec<f64> = props
            .iter()
            .filter(|p| p.name() == "gain")
            .filter_map(|p| p.values()[0].as_f64())
            .collect();
        assert_eq!(gains, vec![2.0]);
        assert_eq!(props.len(), 2);
    }

    #[test]
    fn removing_a_child_cascades() {
        let mut file = File::new();
        let root = file.create_section("root", None).unwrap();
        let child = file.create_child_section(root, "child", None).unwrap();
        let grandchild = file.create_child_section(child, "leaf", None).unwrap();
        let stranger = file.create_section("stranger", None).unwrap();

        assert!(matches!(
            file.remove_child_section(stranger, child),
            Err(ModelError::NotFound(_))
        ));
        file.remove_child_section(root, child).unwrap();
        assert!(!file.contains(child));
        assert!(!file.contains(grandchild));
        assert!(file.sections().children(root).is_empty());
    }
}
