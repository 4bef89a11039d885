//! Section bookkeeping and change computation.
//!
//! Everything here is synchronous and runs under the model's write lock on
//! the pipeline thread. Each mutation returns the changes it produced, using
//! pre-batch positions for updates, deletes and move origins, and final
//! positions for inserts and move destinations.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};

use horizon_sections_core::logging::targets;
use horizon_sections_core::{Error, Result};

use crate::change::Change;
use crate::config::{ModelConfig, SectionKey};
use crate::entity::Entity;
use crate::index_path::IndexPath;
use crate::section::{Permutation, Section};
use crate::section_list::SectionList;

/// Name of the single section used when no section key is configured.
pub(crate) const UNNAMED_SECTION: &str = "";

/// Row-level edits applied to one pre-existing section.
#[derive(Debug, Default)]
struct SectionDelta {
    /// Pre-batch section ordinal.
    section: usize,
    /// Pre-batch rows updated in place. Rows that also moved are left out.
    updated: Vec<usize>,
    /// Pre-batch rows of pre-existing entities that changed order relative
    /// to the other pre-existing entities, with their final row.
    moved: Vec<(usize, usize)>,
    /// Final rows of new entities.
    inserted: Vec<usize>,
}

/// Sections plus the membership index of every fetched unique value.
#[derive(Debug)]
pub(crate) struct ModelState<E: Entity> {
    pub(crate) sections: SectionList<E>,
    pub(crate) fetched: HashSet<E::Id>,
}

impl<E: Entity> Default for ModelState<E> {
    fn default() -> Self {
        Self {
            sections: SectionList::new(),
            fetched: HashSet::new(),
        }
    }
}

impl<E: Entity> ModelState<E> {
    /// Merge a batch into the model.
    ///
    /// Repeated unique values inside `batch` collapse into the first
    /// occurrence, updated from the later ones. Every incoming unique value
    /// is tracked as fetched. Entities passing
    /// the filter are routed to a section: one that already holds them, or
    /// the one named by the section key. Sections that do not exist yet are
    /// created pre-sorted and reported as section inserts; their rows are not
    /// reported individually.
    pub(crate) fn ingest(
        &mut self,
        batch: Vec<E>,
        config: &ModelConfig<E>,
        key: Option<&SectionKey<E>>,
        index_title: &dyn Fn(&str) -> Option<String>,
    ) -> Vec<Change> {
        let batch = collapse_duplicates(batch);
        let any_known = batch
            .iter()
            .any(|entity| self.fetched.contains(&entity.unique_value()));
        for entity in &batch {
            self.fetched.insert(entity.unique_value());
        }

        let visible: Vec<E> = batch
            .into_iter()
            .filter(|entity| config.accepts(entity))
            .collect();
        if visible.is_empty() {
            return Vec::new();
        }

        match key {
            None => self.ingest_unkeyed(visible, config),
            Some(key) => self.ingest_keyed(visible, config, key, any_known, index_title),
        }
    }

    fn ingest_unkeyed(&mut self, visible: Vec<E>, config: &ModelConfig<E>) -> Vec<Change> {
        if self.sections.is_empty() {
            self.sections.append(Section::empty(UNNAMED_SECTION));
        }
        match self.sections.section_mut(0) {
            Some(section) => {
                let delta = merge_into(section, 0, visible, config);
                entity_changes(&[delta], |section| section)
            }
            None => Vec::new(),
        }
    }

    fn ingest_keyed(
        &mut self,
        visible: Vec<E>,
        config: &ModelConfig<E>,
        key: &SectionKey<E>,
        any_known: bool,
        index_title: &dyn Fn(&str) -> Option<String>,
    ) -> Vec<Change> {
        // Entities already stored stay in the section that holds them.
        let located = if any_known {
            self.sections.section_of_each()
        } else {
            HashMap::new()
        };

        let mut groups: Vec<(String, Vec<E>)> = Vec::new();
        let mut group_of: HashMap<String, usize> = HashMap::new();
        for entity in visible {
            let name = located
                .get(&entity.unique_value())
                .and_then(|&index| self.sections.section(index))
                .map(|section| section.name().to_string())
                .unwrap_or_else(|| key.section_name(&entity));
            match group_of.get(&name) {
                Some(&slot) => groups[slot].1.push(entity),
                None => {
                    group_of.insert(name.clone(), groups.len());
                    groups.push((name, vec![entity]));
                }
            }
        }

        let old_count = self.sections.len();
        let mut deltas = Vec::new();
        let mut created = 0usize;
        for (name, group) in groups {
            match self.sections.section_index(&name) {
                Some(index) => {
                    if let Some(section) = self.sections.section_mut(index) {
                        deltas.push(merge_into(section, index, group, config));
                    }
                }
                None => {
                    let title = index_title(&name);
                    let mut section = Section::new(name, title, Vec::new());
                    section.append(group);
                    if let Some(compare) = config.entity_comparator() {
                        section.sort_by(|a, b| compare(a, b));
                    }
                    tracing::debug!(
                        target: targets::MODEL,
                        section = section.name(),
                        entities = section.len(),
                        "section created"
                    );
                    self.sections.append(section);
                    created += 1;
                }
            }
        }

        let order = match config.section_comparator() {
            Some(compare) => self.sections.sort_sections(|a, b| compare(a, b)),
            None => Permutation::identity(self.sections.len()),
        };
        let final_index = &order.new;

        let mut changes = Vec::new();

        let mut inserted: Vec<usize> = (old_count..old_count + created)
            .map(|index| final_index[index])
            .collect();
        inserted.sort_unstable();
        for index in inserted {
            if let Some(section) = self.sections.section(index) {
                changes.push(Change::section_inserted(section.name(), index));
            }
        }

        for (old, new) in order.reordered(old_count) {
            if let Some(section) = self.sections.section(new) {
                changes.push(Change::section_moved(section.name(), old, new));
            }
        }

        changes.extend(entity_changes(&deltas, |section| final_index[section]));
        changes
    }

    /// Insert `entity` at `path` without filtering or sorting.
    ///
    /// `path.section == len()` creates a new single-entity section there.
    pub(crate) fn insert_at(
        &mut self,
        entity: E,
        path: IndexPath,
        key: Option<&SectionKey<E>>,
        index_title: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Vec<Change>> {
        let count = self.sections.len();
        if path.section > count || (key.is_none() && path.section == count && count > 0) {
            return Err(Error::section_out_of_bounds(path.section, count));
        }

        if path.section == count {
            if path.row != 0 {
                return Err(Error::index_out_of_bounds(
                    path.section,
                    path.row,
                    "a new section starts at row 0",
                ));
            }
            let name = key
                .map(|key| key.section_name(&entity))
                .unwrap_or_else(|| UNNAMED_SECTION.to_string());
            if self.sections.contains_section(&name) {
                return Err(Error::DuplicateSection { name });
            }
            let title = index_title(&name);
            self.fetched.insert(entity.unique_value());
            self.sections
                .insert(path.section, Section::new(name.clone(), title, vec![entity]));
            return Ok(vec![Change::section_inserted(name, path.section)]);
        }

        let Some(section) = self.sections.section_mut(path.section) else {
            return Err(Error::section_out_of_bounds(path.section, count));
        };
        if path.row > section.len() {
            return Err(Error::index_out_of_bounds(
                path.section,
                path.row,
                "row past end of section",
            ));
        }
        self.fetched.insert(entity.unique_value());
        section.insert(path.row, entity);
        Ok(vec![Change::entities_inserted(vec![path])])
    }

    /// Apply `mutate` to the entity currently holding unique value `id`.
    ///
    /// Returns the entity's current path, or `None` if it is no longer
    /// stored. A changed unique value is reflected in the membership index.
    pub(crate) fn update<F>(&mut self, id: &E::Id, mutate: F) -> Option<IndexPath>
    where
        F: FnOnce(&mut E),
    {
        let path = self.sections.locate(id)?;
        let entity = self.sections.entity_mut(path)?;
        mutate(entity);

        let new_id = entity.unique_value();
        if &new_id != id {
            self.fetched.remove(id);
            self.fetched.insert(new_id);
        }
        Some(path)
    }

    /// Remove the entities at `paths`.
    ///
    /// All paths are validated first; on failure nothing changes. Rows are
    /// removed highest-first per section. With `cleanup`, sections left empty
    /// are removed and reported as section deletes instead of row deletes.
    /// Returns the removed entities in path order.
    pub(crate) fn remove_paths(
        &mut self,
        paths: Vec<IndexPath>,
        cleanup: bool,
    ) -> Result<(Vec<E>, Vec<Change>)> {
        let count = self.sections.len();
        for path in &paths {
            if path.section >= count {
                return Err(Error::section_out_of_bounds(path.section, count));
            }
            if !self.sections.is_valid(*path) {
                return Err(Error::index_out_of_bounds(
                    path.section,
                    path.row,
                    "no entity at this row",
                ));
            }
        }

        let mut rows_by_section: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for path in paths {
            rows_by_section.entry(path.section).or_default().push(path.row);
        }

        let mut removed: Vec<(IndexPath, E)> = Vec::new();
        let mut deleted_rows: Vec<IndexPath> = Vec::new();
        let mut emptied: Vec<usize> = Vec::new();

        for (&section_index, rows) in rows_by_section.iter_mut() {
            rows.sort_unstable();
            rows.dedup();
            let Some(section) = self.sections.section_mut(section_index) else {
                continue;
            };
            for &row in rows.iter().rev() {
                let entity = section.remove(row);
                self.fetched.remove(&entity.unique_value());
                removed.push((IndexPath::new(section_index, row), entity));
            }
            if cleanup && section.is_empty() {
                emptied.push(section_index);
            } else {
                deleted_rows.extend(rows.iter().map(|&row| IndexPath::new(section_index, row)));
            }
        }

        let mut changes = Vec::new();
        let mut section_deletes = Vec::new();
        for &index in emptied.iter().rev() {
            let section = self.sections.remove(index);
            tracing::debug!(target: targets::MODEL, section = section.name(), "empty section removed");
            section_deletes.push(Change::section_deleted(section.name(), index));
        }
        section_deletes.reverse();
        changes.extend(section_deletes);
        if !deleted_rows.is_empty() {
            changes.push(Change::entities_deleted(deleted_rows));
        }

        removed.sort_by_key(|(path, _)| *path);
        Ok((removed.into_iter().map(|(_, entity)| entity).collect(), changes))
    }

    /// Paths of the stored entities with the given unique values.
    ///
    /// Values that are not stored are untracked from the membership index
    /// right away, since there is nothing to delete for them.
    pub(crate) fn resolve_for_removal(&mut self, ids: &[E::Id]) -> Vec<IndexPath> {
        let mut paths = Vec::with_capacity(ids.len());
        for id in ids {
            match self.sections.locate(id) {
                Some(path) => paths.push(path),
                None => {
                    self.fetched.remove(id);
                }
            }
        }
        paths
    }

    /// Move the entity at `from` to `to`.
    ///
    /// `to` is interpreted after the removal at `from`. On an invalid target
    /// the entity is put back and nothing changes.
    pub(crate) fn move_entity(&mut self, from: IndexPath, to: IndexPath) -> Result<()> {
        let count = self.sections.len();
        let Some(source) = self.sections.section_mut(from.section) else {
            return Err(Error::section_out_of_bounds(from.section, count));
        };
        if from.row >= source.len() {
            return Err(Error::index_out_of_bounds(
                from.section,
                from.row,
                "no entity to move at this row",
            ));
        }
        let entity = source.remove(from.row);

        match self.sections.section_mut(to.section) {
            Some(target) if to.row <= target.len() => {
                target.insert(to.row, entity);
                Ok(())
            }
            target => {
                let err = match target {
                    Some(_) => Error::index_out_of_bounds(
                        to.section,
                        to.row,
                        "move target past end of section",
                    ),
                    None => Error::section_out_of_bounds(to.section, count),
                };
                if let Some(source) = self.sections.section_mut(from.section) {
                    source.insert(from.row, entity);
                }
                Err(err)
            }
        }
    }

    /// Stable-sort one section and report the moves.
    pub(crate) fn sort_section<F>(
        &mut self,
        index: usize,
        compare: F,
    ) -> Result<(Permutation, Vec<Change>)>
    where
        F: FnMut(&E, &E) -> std::cmp::Ordering,
    {
        let count = self.sections.len();
        let Some(section) = self.sections.section_mut(index) else {
            return Err(Error::section_out_of_bounds(index, count));
        };
        let permutation = section.sort_by(compare);
        let changes = move_change(std::iter::once((index, &permutation)));
        Ok((permutation, changes))
    }

    /// Stable-sort every section with the same comparator.
    pub(crate) fn sort_all_sections<F>(&mut self, mut compare: F) -> (Vec<Permutation>, Vec<Change>)
    where
        F: FnMut(&E, &E) -> std::cmp::Ordering,
    {
        let mut permutations = Vec::with_capacity(self.sections.len());
        for index in 0..self.sections.len() {
            if let Some(section) = self.sections.section_mut(index) {
                permutations.push(section.sort_by(&mut compare));
            }
        }
        let changes = move_change(permutations.iter().enumerate());
        (permutations, changes)
    }

    /// Stable-sort the sections and report one move per relocated section.
    pub(crate) fn sort_sections<F>(&mut self, compare: F) -> (Permutation, Vec<Change>)
    where
        F: FnMut(&Section<E>, &Section<E>) -> std::cmp::Ordering,
    {
        let permutation = self.sections.sort_sections(compare);
        let changes = permutation
            .moved()
            .filter_map(|(old, new)| {
                self.sections
                    .section(new)
                    .map(|section| Change::section_moved(section.name(), old, new))
            })
            .collect();
        (permutation, changes)
    }

    /// Drop every section and forget every fetched value.
    pub(crate) fn clear(&mut self) {
        self.sections.clear();
        self.fetched.clear();
    }
}

/// Append `group` to an existing section and re-sort it if configured.
fn merge_into<E: Entity>(
    section: &mut Section<E>,
    index: usize,
    group: Vec<E>,
    config: &ModelConfig<E>,
) -> SectionDelta {
    let before = section.len();
    let outcome = section.append(group);
    let mut delta = SectionDelta {
        section: index,
        updated: outcome.updated,
        moved: Vec::new(),
        inserted: outcome.inserted,
    };

    if let Some(compare) = config.entity_comparator() {
        let permutation = section.sort_by(|a, b| compare(a, b));
        delta.moved = permutation.reordered(before);
        delta
            .updated
            .retain(|row| !delta.moved.iter().any(|&(old, _)| old == *row));
        delta.inserted = delta
            .inserted
            .iter()
            .map(|&row| permutation.new[row])
            .collect();
        delta.inserted.sort_unstable();
    }
    delta
}

/// Keep the first occurrence of each unique value, updated from the later
/// ones, in first-seen order.
fn collapse_duplicates<E: Entity>(batch: Vec<E>) -> Vec<E> {
    let mut slot_of: HashMap<E::Id, usize> = HashMap::with_capacity(batch.len());
    let mut unique: Vec<E> = Vec::with_capacity(batch.len());
    for entity in batch {
        match slot_of.entry(entity.unique_value()) {
            Entry::Occupied(slot) => unique[*slot.get()].update_from(&entity),
            Entry::Vacant(slot) => {
                slot.insert(unique.len());
                unique.push(entity);
            }
        }
    }
    unique
}

/// Aggregate row-level deltas into update, move and insert changes.
fn entity_changes<F>(deltas: &[SectionDelta], final_section: F) -> Vec<Change>
where
    F: Fn(usize) -> usize,
{
    let mut updated = Vec::new();
    let mut moves = Vec::new();
    let mut inserted = Vec::new();
    for delta in deltas {
        let destination = final_section(delta.section);
        updated.extend(delta.updated.iter().map(|&row| IndexPath::new(delta.section, row)));
        moves.extend(delta.moved.iter().map(|&(old, new)| {
            (
                IndexPath::new(delta.section, old),
                IndexPath::new(destination, new),
            )
        }));
        inserted.extend(delta.inserted.iter().map(|&row| IndexPath::new(destination, row)));
    }

    let mut changes = Vec::new();
    if !updated.is_empty() {
        updated.sort_unstable();
        changes.push(Change::entities_updated(updated));
    }
    if !moves.is_empty() {
        moves.sort_unstable();
        let (from, to) = moves.into_iter().unzip();
        changes.push(Change::entities_moved(from, to));
    }
    if !inserted.is_empty() {
        inserted.sort_unstable();
        changes.push(Change::entities_inserted(inserted));
    }
    changes
}

/// One aggregated move change for the rows that changed position.
fn move_change<'a>(permutations: impl Iterator<Item = (usize, &'a Permutation)>) -> Vec<Change> {
    let (from, to): (Vec<IndexPath>, Vec<IndexPath>) = permutations
        .flat_map(|(section, permutation)| {
            permutation
                .moved()
                .map(move |(old, new)| (IndexPath::new(section, old), IndexPath::new(section, new)))
        })
        .unzip();
    if from.is_empty() {
        Vec::new()
    } else {
        vec![Change::entities_moved(from, to)]
    }
}
