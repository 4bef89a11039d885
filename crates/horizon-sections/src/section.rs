//! A named, ordered run of entities.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::entity::Entity;

/// Pre-/post-sort positions reported by a stable sort.
///
/// `old` and `new` are parallel and always cover every element: `old[i]` is
/// `i` and `new[i]` is where the element that started at `i` ended up.
/// Applying the permutation to the pre-sort order reproduces the post-sort
/// order exactly (see [`apply`](Self::apply)).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Permutation {
    /// Pre-sort positions in enumeration order.
    pub old: Vec<usize>,
    /// Post-sort position of each element of `old`.
    pub new: Vec<usize>,
}

impl Permutation {
    /// The identity permutation over `len` elements.
    pub fn identity(len: usize) -> Self {
        Self {
            old: (0..len).collect(),
            new: (0..len).collect(),
        }
    }

    /// Number of elements covered.
    pub fn len(&self) -> usize {
        self.old.len()
    }

    /// Returns `true` if the permutation covers no elements.
    pub fn is_empty(&self) -> bool {
        self.old.is_empty()
    }

    /// Pairs whose position actually changed.
    pub fn moved(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.old
            .iter()
            .zip(&self.new)
            .filter(|(old, new)| old != new)
            .map(|(&old, &new)| (old, new))
    }

    /// Moves among the first `prefix` elements that changed order relative
    /// to each other.
    ///
    /// Elements that only shifted because others were inserted around them
    /// are not reported. The longest run that kept its relative order stays
    /// put; everything else in the prefix is a move.
    pub fn reordered(&self, prefix: usize) -> Vec<(usize, usize)> {
        let prefix = prefix.min(self.len());
        let kept = longest_increasing(&self.new[..prefix]);
        (0..prefix)
            .filter(|&i| !kept[i])
            .map(|i| (self.old[i], self.new[i]))
            .collect()
    }

    /// Returns `true` if no element moved.
    pub fn is_identity(&self) -> bool {
        self.moved().next().is_none()
    }

    /// Rearrange `before` the way the sort rearranged the original elements.
    ///
    /// # Panics
    ///
    /// Panics if `before.len()` differs from [`len`](Self::len).
    pub fn apply<T: Clone>(&self, before: &[T]) -> Vec<T> {
        assert_eq!(before.len(), self.len(), "permutation length mismatch");
        let mut slots: Vec<Option<T>> = vec![None; before.len()];
        for (&old, &new) in self.old.iter().zip(&self.new) {
            slots[new] = Some(before[old].clone());
        }
        slots.into_iter().flatten().collect()
    }
}

/// Marks the members of one longest strictly increasing subsequence.
fn longest_increasing(values: &[usize]) -> Vec<bool> {
    // tails[k] is the index of the smallest tail of an increasing run of length k + 1.
    let mut tails: Vec<usize> = Vec::new();
    let mut previous: Vec<Option<usize>> = vec![None; values.len()];
    for (index, &value) in values.iter().enumerate() {
        let length = tails.partition_point(|&tail| values[tail] < value);
        if length > 0 {
            previous[index] = Some(tails[length - 1]);
        }
        if length == tails.len() {
            tails.push(index);
        } else {
            tails[length] = index;
        }
    }

    let mut kept = vec![false; values.len()];
    let mut cursor = tails.last().copied();
    while let Some(index) = cursor {
        kept[index] = true;
        cursor = previous[index];
    }
    kept
}

/// Stable-sort `items` with `compare` and report the permutation applied.
pub(crate) fn stable_sort_with_permutation<T, F>(items: &mut Vec<T>, mut compare: F) -> Permutation
where
    F: FnMut(&T, &T) -> Ordering,
{
    let len = items.len();
    // order[new] = old
    let mut order: Vec<usize> = (0..len).collect();
    order.sort_by(|&a, &b| compare(&items[a], &items[b]));

    let mut new = vec![0; len];
    for (new_position, &old_position) in order.iter().enumerate() {
        new[old_position] = new_position;
    }

    let mut slots: Vec<Option<T>> = items.drain(..).map(Some).collect();
    items.extend(order.iter().filter_map(|&old| slots[old].take()));

    Permutation {
        old: (0..len).collect(),
        new,
    }
}

/// Rows touched by [`Section::append`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppendOutcome {
    /// Positions of pre-existing entities that were updated in place, in
    /// batch order.
    pub updated: Vec<usize>,
    /// Positions of newly appended entities, ascending.
    pub inserted: Vec<usize>,
}

impl AppendOutcome {
    /// Returns `true` if the append touched nothing.
    pub fn is_empty(&self) -> bool {
        self.updated.is_empty() && self.inserted.is_empty()
    }
}

/// An ordered, named sequence of entities with an optional index title.
///
/// Entities keep the order imposed by the last sort, or insertion order if
/// the section was never sorted. Names are unique within one
/// [`SectionList`](crate::SectionList); the section itself does not enforce
/// that.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Section<E> {
    name: String,
    index_title: Option<String>,
    entities: Vec<E>,
}

impl<E: Entity> Section<E> {
    /// Create a section holding `entities` in the given order.
    pub fn new(name: impl Into<String>, index_title: Option<String>, entities: Vec<E>) -> Self {
        Self {
            name: name.into(),
            index_title,
            entities,
        }
    }

    /// Create an empty section.
    pub fn empty(name: impl Into<String>) -> Self {
        Self::new(name, None, Vec::new())
    }

    /// The section name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The index title shown in a section index, if any.
    pub fn index_title(&self) -> Option<&str> {
        self.index_title.as_deref()
    }

    /// Replace the index title.
    pub fn set_index_title(&mut self, title: Option<String>) {
        self.index_title = title;
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// The stored entities in order.
    pub fn entities(&self) -> &[E] {
        &self.entities
    }

    pub fn get(&self, row: usize) -> Option<&E> {
        self.entities.get(row)
    }

    pub fn get_mut(&mut self, row: usize) -> Option<&mut E> {
        self.entities.get_mut(row)
    }

    pub fn first(&self) -> Option<&E> {
        self.entities.first()
    }

    pub fn last(&self) -> Option<&E> {
        self.entities.last()
    }

    /// Row of the entity with unique value `id`.
    pub fn position_of(&self, id: &E::Id) -> Option<usize> {
        self.entities.iter().position(|e| &e.unique_value() == id)
    }

    pub fn contains(&self, id: &E::Id) -> bool {
        self.position_of(id).is_some()
    }

    /// Merge a batch into the section.
    ///
    /// Entities whose unique value is already stored update the stored copy
    /// in place and keep their row. The rest are appended at the tail in
    /// batch order. When a batch names the same entity twice, the second
    /// occurrence updates the first.
    pub fn append(&mut self, batch: Vec<E>) -> AppendOutcome {
        let original_len = self.entities.len();
        let mut positions: HashMap<E::Id, usize> = self
            .entities
            .iter()
            .enumerate()
            .map(|(row, entity)| (entity.unique_value(), row))
            .collect();

        let mut outcome = AppendOutcome::default();
        for incoming in batch {
            let id = incoming.unique_value();
            match positions.get(&id) {
                Some(&row) => {
                    self.entities[row].update_from(&incoming);
                    if row < original_len && !outcome.updated.contains(&row) {
                        outcome.updated.push(row);
                    }
                }
                None => {
                    let row = self.entities.len();
                    self.entities.push(incoming);
                    positions.insert(id, row);
                    outcome.inserted.push(row);
                }
            }
        }
        outcome
    }

    /// Insert `entity` at `row`.
    ///
    /// # Panics
    ///
    /// Panics if `row > len()`.
    pub fn insert(&mut self, row: usize, entity: E) {
        assert!(
            row <= self.entities.len(),
            "section {:?}: insert row {row} past end (len {})",
            self.name,
            self.entities.len()
        );
        self.entities.insert(row, entity);
    }

    /// Remove and return the entity at `row`.
    ///
    /// # Panics
    ///
    /// Panics if `row >= len()`.
    pub fn remove(&mut self, row: usize) -> E {
        assert!(
            row < self.entities.len(),
            "section {:?}: remove row {row} out of range (len {})",
            self.name,
            self.entities.len()
        );
        self.entities.remove(row)
    }

    /// Replace the entity at `row`, returning the previous value.
    ///
    /// Out-of-range rows are a no-op returning `None`.
    pub fn replace(&mut self, row: usize, entity: E) -> Option<E> {
        self.entities
            .get_mut(row)
            .map(|slot| std::mem::replace(slot, entity))
    }

    /// Stable-sort the entities and report where each one went.
    pub fn sort_by<F>(&mut self, compare: F) -> Permutation
    where
        F: FnMut(&E, &E) -> Ordering,
    {
        stable_sort_with_permutation(&mut self.entities, compare)
    }

    /// Clones of the entities matching `predicate`, in order.
    pub fn filter<P>(&self, mut predicate: P) -> Vec<E>
    where
        P: FnMut(&E) -> bool,
    {
        self.entities
            .iter()
            .filter(|entity| predicate(entity))
            .cloned()
            .collect()
    }
}
