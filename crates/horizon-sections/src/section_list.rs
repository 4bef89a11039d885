//! Ordered collection of sections and index-path arithmetic.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::entity::Entity;
use crate::index_path::IndexPath;
use crate::section::{Permutation, Section, stable_sort_with_permutation};

/// Owns the ordered list of sections.
///
/// The section vector is the single source of truth for index-path
/// resolution. The name index is rebuilt from scratch after every structural
/// change, never patched.
///
/// Out-of-range reads return `None` and out-of-range writes are no-ops.
/// Structural mutation with a bad ordinal (`insert`, `remove`) panics, the
/// same way `Vec` does.
#[derive(Debug, Clone)]
pub struct SectionList<E> {
    sections: Vec<Section<E>>,
    names: HashMap<String, usize>,
}

impl<E: Entity> Default for SectionList<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> SectionList<E> {
    /// Create an empty list.
    pub fn new() -> Self {
        Self {
            sections: Vec::new(),
            names: HashMap::new(),
        }
    }

    /// Create a list from existing sections.
    pub fn from_sections(sections: Vec<Section<E>>) -> Self {
        let mut list = Self {
            sections,
            names: HashMap::new(),
        };
        list.rebuild_names();
        list
    }

    /// Section factory. The section is not inserted.
    pub fn new_section(
        entities: Vec<E>,
        name: impl Into<String>,
        index_title: Option<String>,
    ) -> Section<E> {
        Section::new(name, index_title, entities)
    }

    fn rebuild_names(&mut self) {
        self.names.clear();
        // Iterate in reverse so the first section wins on a duplicate name.
        for (index, section) in self.sections.iter().enumerate().rev() {
            self.names.insert(section.name().to_string(), index);
        }
    }

    /// Number of sections.
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn sections(&self) -> &[Section<E>] {
        &self.sections
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Section<E>> {
        self.sections.iter()
    }

    pub fn section(&self, index: usize) -> Option<&Section<E>> {
        self.sections.get(index)
    }

    /// Mutable access to a section's entities.
    ///
    /// Renaming is not possible through this handle, so the name index stays
    /// valid.
    pub fn section_mut(&mut self, index: usize) -> Option<&mut Section<E>> {
        self.sections.get_mut(index)
    }

    /// Replace the section at `index`. Out of range is a no-op.
    pub fn replace_section(&mut self, index: usize, section: Section<E>) -> Option<Section<E>> {
        let slot = self.sections.get_mut(index)?;
        let previous = std::mem::replace(slot, section);
        self.rebuild_names();
        Some(previous)
    }

    /// Ordinal of the section called `name`.
    pub fn section_index(&self, name: &str) -> Option<usize> {
        self.names.get(name).copied()
    }

    pub fn contains_section(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    pub fn section_named(&self, name: &str) -> Option<&Section<E>> {
        self.section_index(name).and_then(|index| self.sections.get(index))
    }

    /// The entity at `path`.
    pub fn entity(&self, path: IndexPath) -> Option<&E> {
        self.sections.get(path.section)?.get(path.row)
    }

    pub fn entity_mut(&mut self, path: IndexPath) -> Option<&mut E> {
        self.sections.get_mut(path.section)?.get_mut(path.row)
    }

    /// Replace the entity at `path`. Out of range is a no-op.
    pub fn set_entity(&mut self, path: IndexPath, entity: E) -> Option<E> {
        self.sections.get_mut(path.section)?.replace(path.row, entity)
    }

    /// Returns `true` if `path` addresses a stored entity.
    pub fn is_valid(&self, path: IndexPath) -> bool {
        self.entity(path).is_some()
    }

    /// Index path of `entity`.
    ///
    /// With a section name, only that section is searched. Without one, only
    /// section 0 is searched (single-section mode). Not found is `None`.
    pub fn index_path_of(&self, entity: &E, section_name: Option<&str>) -> Option<IndexPath> {
        let section = match section_name {
            Some(name) => self.section_index(name)?,
            None => 0,
        };
        let row = self.sections.get(section)?.position_of(&entity.unique_value())?;
        Some(IndexPath::new(section, row))
    }

    /// Search every section for the entity with unique value `id`.
    pub fn locate(&self, id: &E::Id) -> Option<IndexPath> {
        self.sections.iter().enumerate().find_map(|(section, s)| {
            s.position_of(id).map(|row| IndexPath::new(section, row))
        })
    }

    /// Map every stored unique value to the ordinal of its section.
    pub fn section_of_each(&self) -> HashMap<E::Id, usize> {
        self.sections
            .iter()
            .enumerate()
            .flat_map(|(index, section)| {
                section
                    .entities()
                    .iter()
                    .map(move |entity| (entity.unique_value(), index))
            })
            .collect()
    }

    /// Insert `section` at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index > len()`.
    pub fn insert(&mut self, index: usize, section: Section<E>) {
        debug_assert!(
            !self.contains_section(section.name()),
            "duplicate section name {:?}",
            section.name()
        );
        self.sections.insert(index, section);
        self.rebuild_names();
    }

    /// Append `section` and return its ordinal.
    pub fn append(&mut self, section: Section<E>) -> usize {
        let index = self.sections.len();
        self.insert(index, section);
        index
    }

    /// Remove and return the section at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len()`.
    pub fn remove(&mut self, index: usize) -> Section<E> {
        let section = self.sections.remove(index);
        self.rebuild_names();
        section
    }

    /// Stable-sort the sections and report where each one went.
    pub fn sort_sections<F>(&mut self, compare: F) -> Permutation
    where
        F: FnMut(&Section<E>, &Section<E>) -> Ordering,
    {
        let permutation = stable_sort_with_permutation(&mut self.sections, compare);
        if !permutation.is_identity() {
            self.rebuild_names();
        }
        permutation
    }

    /// Number of entities across all sections.
    pub fn total_entities(&self) -> usize {
        self.sections.iter().map(Section::len).sum()
    }

    /// Remove every section.
    pub fn clear(&mut self) {
        self.sections.clear();
        self.names.clear();
    }
}
