//! The sectioned model engine.
//!
//! [`SectionedModel`] owns a [`SectionList`](crate::SectionList) and a membership index of every
//! fetched unique value. Mutations are queued on a private serial pipeline
//! and run one at a time in submission order; reads take a shared lock and
//! return copies.
//!
//! # Notification sequence
//!
//! Bracketed operations (`insert`, `insert_at`, `remove`, `remove_at`,
//! programmatic `move_entity`, the sort family) deliver
//! `will_change_content`, then their changes, then `did_change_content`.
//! `update` delivers its single change without the bracket. `fetch`,
//! `remove_all` and user-driven moves deliver nothing.
//!
//! With a [`MainContext`], deliveries run on its thread and the pipeline
//! waits for each one before continuing, so a sink reading the model during
//! delivery sees exactly the state the batch describes.
//!
//! # Example
//!
//! ```
//! use horizon_sections::prelude::*;
//!
//! #[derive(Debug, Clone, Entity)]
//! struct Contact {
//!     #[entity(id)]
//!     id: u64,
//!     #[entity(key)]
//!     group: String,
//!     name: String,
//! }
//!
//! let model = SectionedModel::<Contact>::builder()
//!     .section_key_field("group")
//!     .config(
//!         ModelConfig::builder()
//!             .sort_entities_by(|a: &Contact, b: &Contact| a.name.cmp(&b.name))
//!             .build(),
//!     )
//!     .build()
//!     .unwrap();
//!
//! model.insert(
//!     vec![
//!         Contact { id: 1, group: "Work".into(), name: "Zoe".into() },
//!         Contact { id: 2, group: "Family".into(), name: "Ann".into() },
//!         Contact { id: 3, group: "Work".into(), name: "Max".into() },
//!     ],
//!     |result| assert!(result.is_ok()),
//! );
//! model.flush();
//!
//! assert_eq!(model.number_of_sections(), 2);
//! assert_eq!(model.section_names(), vec!["Work", "Family"]);
//! assert_eq!(model.entity(IndexPath::new(0, 0)).map(|c| c.name), Some("Max".to_string()));
//! ```

mod state;

use std::cmp::Ordering;
use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use horizon_sections_core::logging::targets;
use horizon_sections_core::{
    Error, MainContext, PerfSpan, Result, TreeFormatOptions, Worker, WorkerConfig,
};

use crate::change::{Change, ChangeKind, ChangeSignals, ChangeSink, Notifier};
use crate::config::{ModelConfig, ModelConfigBuilder, SectionKey};
use crate::debug::SectionTreeDebug;
use crate::entity::Entity;
use crate::index_path::IndexPath;
use crate::pipeline::{Hook, MutationUnit, Pipeline, UnitOutput};
use crate::section::{Permutation, Section};

use state::ModelState;

/// Default name of the pipeline thread.
pub const DEFAULT_WORKER_NAME: &str = "horizon-sections-model";

/// Which part of the notification sequence an operation delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    /// Nothing; computed changes are discarded.
    Silent,
    /// The changes only, without the will/did bracket.
    Unbracketed,
    /// will, changes, did.
    Bracketed,
}

/// State shared between the model handle and queued units.
struct Shared<E: Entity> {
    state: RwLock<ModelState<E>>,
    config: RwLock<Arc<ModelConfig<E>>>,
    section_key: Option<SectionKey<E>>,
    delegate: RwLock<Option<Arc<dyn ChangeSink>>>,
    signals: Arc<ChangeSignals>,
}

impl<E: Entity> Shared<E> {
    fn notifier(&self) -> Notifier {
        Notifier {
            delegate: self.delegate.read().clone(),
            signals: self.signals.clone(),
        }
    }
}

/// Thread-safe sectioned collection with incremental change notifications.
///
/// Every mutating method returns immediately and reports its outcome to the
/// completion callback. The completion runs on the model's main context when
/// the call was made from that context's thread, otherwise on the pipeline
/// thread. Use [`flush`](Self::flush) to wait for queued work.
///
/// Completions and sinks may call any read method. They must not call
/// [`flush`](Self::flush) from the main context while a delivery is pending,
/// and a sink's [`section_index_title`](ChangeSink::section_index_title) must
/// not read the model, since it runs while the state is being written.
pub struct SectionedModel<E: Entity> {
    shared: Arc<Shared<E>>,
    pipeline: Pipeline,
}

impl<E: Entity> SectionedModel<E> {
    /// Create an unkeyed model with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline thread cannot be started.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Start building a model.
    pub fn builder() -> SectionedModelBuilder<E> {
        SectionedModelBuilder::new()
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// The active configuration.
    pub fn config(&self) -> Arc<ModelConfig<E>> {
        self.shared.config.read().clone()
    }

    /// Replace the configuration.
    ///
    /// Operations already queued keep the configuration they were submitted
    /// with. Existing sections are not re-sorted or re-filtered; use
    /// [`reorder_entities`](Self::reorder_entities) and
    /// [`reorder_sections`](Self::reorder_sections) for that.
    pub fn set_config(&self, config: ModelConfig<E>) {
        *self.shared.config.write() = Arc::new(config);
    }

    /// Derive a new configuration from the active one.
    pub fn update_config<F>(&self, edit: F)
    where
        F: FnOnce(ModelConfigBuilder<E>) -> ModelConfigBuilder<E>,
    {
        let mut config = self.shared.config.write();
        *config = Arc::new(edit(config.to_builder()).build());
    }

    /// How section names are derived, or `None` for a single unnamed section.
    pub fn section_key(&self) -> Option<&SectionKey<E>> {
        self.shared.section_key.as_ref()
    }

    /// Replace the delegate. Queued operations keep the delegate that was set
    /// when they were submitted.
    pub fn set_delegate(&self, delegate: Option<Arc<dyn ChangeSink>>) {
        *self.shared.delegate.write() = delegate;
    }

    pub fn delegate(&self) -> Option<Arc<dyn ChangeSink>> {
        self.shared.delegate.read().clone()
    }

    /// Signals carrying the same sequence the delegate receives.
    pub fn signals(&self) -> &ChangeSignals {
        &self.shared.signals
    }

    pub fn main_context(&self) -> Option<&MainContext> {
        self.pipeline.main_context()
    }

    // =========================================================================
    // Pipeline control
    // =========================================================================

    /// Block until every operation submitted so far has completed.
    ///
    /// On the main context's thread the context is pumped while waiting, so
    /// notifications and completions posted there have run when this
    /// returns.
    pub fn flush(&self) {
        self.pipeline.flush();
    }

    /// Operations queued or running.
    pub fn pending_operations(&self) -> usize {
        self.pipeline.pending()
    }

    /// Stop accepting operations. Work already queued still runs; later
    /// operations complete with [`Error::WorkerStopped`].
    pub fn shutdown(&self) {
        self.pipeline.shutdown();
    }

    pub fn is_running(&self) -> bool {
        self.pipeline.is_running()
    }

    fn enqueue<T, B, C>(&self, label: &'static str, delivery: Delivery, body: B, completion: C)
    where
        T: Send + 'static,
        B: FnOnce(&Shared<E>, &ModelConfig<E>, &Notifier) -> (Result<T>, Vec<Change>)
            + Send
            + 'static,
        C: FnOnce(Result<T>) + Send + 'static,
    {
        let shared = self.shared.clone();
        let config = self.config();
        let notifier = self.shared.notifier();
        let completion = Arc::new(Mutex::new(Some(completion)));

        let pending = completion.clone();
        let unit_notifier = notifier.clone();
        let mut unit = MutationUnit::new(label, move || {
            let (result, changes) = body(&shared, &config, &unit_notifier);
            trace_changes(label, &changes);

            let deliver: Option<Hook> = match delivery {
                Delivery::Silent => None,
                Delivery::Unbracketed if changes.is_empty() => None,
                Delivery::Unbracketed => {
                    Some(Box::new(move || unit_notifier.changes(changes)) as Hook)
                }
                Delivery::Bracketed => Some(Box::new(move || {
                    unit_notifier.changes(changes);
                    unit_notifier.did_change();
                }) as Hook),
            };
            let complete = pending
                .lock()
                .take()
                .map(|complete| Box::new(move || complete(result)) as Hook);
            UnitOutput { deliver, complete }
        });

        if delivery == Delivery::Bracketed {
            unit = unit.with_pre_hook(Box::new(move || notifier.will_change()));
        }

        if let Err(err) = self.pipeline.submit(unit) {
            tracing::warn!(target: targets::MODEL, op = label, %err, "operation rejected");
            if let Some(complete) = completion.lock().take() {
                complete(Err(err));
            }
        }
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Load entities without notifications.
    ///
    /// Intended for establishing initial state. Filtering, sorting and
    /// section creation follow [`insert`](Self::insert).
    pub fn fetch<C>(&self, entities: Vec<E>, completion: C)
    where
        C: FnOnce(Result<()>) + Send + 'static,
    {
        self.enqueue(
            "fetch",
            Delivery::Silent,
            move |shared, config, notifier| {
                let changes = ingest(shared, config, notifier, entities);
                (Ok(()), changes)
            },
            completion,
        );
    }

    /// Merge entities into the model and notify.
    ///
    /// Entities already fetched update their stored copy in place. New
    /// entities land in the section named by the key, which is created if
    /// needed. Sorting is reapplied to every touched section and, once per
    /// batch, to the sections themselves.
    pub fn insert<C>(&self, entities: Vec<E>, completion: C)
    where
        C: FnOnce(Result<()>) + Send + 'static,
    {
        self.enqueue(
            "insert",
            Delivery::Bracketed,
            move |shared, config, notifier| {
                let changes = ingest(shared, config, notifier, entities);
                (Ok(()), changes)
            },
            completion,
        );
    }

    /// Insert `entity` exactly at `path`, bypassing filter and sort.
    ///
    /// `path.section` equal to the section count creates a new section at
    /// the end holding only `entity`, named by the section key.
    ///
    /// # Errors
    ///
    /// The completion receives [`Error::SectionOutOfBounds`] or
    /// [`Error::IndexOutOfBounds`] for a position that does not exist, and
    /// [`Error::DuplicateSection`] if the new section's name is taken. The
    /// model is left unchanged.
    pub fn insert_at<C>(&self, entity: E, path: IndexPath, completion: C)
    where
        C: FnOnce(Result<IndexPath>) + Send + 'static,
    {
        self.enqueue(
            "insert_at",
            Delivery::Bracketed,
            move |shared, _config, notifier| {
                let mut state = shared.state.write();
                let title = |name: &str| notifier.index_title(name);
                match state.insert_at(entity, path, shared.section_key.as_ref(), &title) {
                    Ok(changes) => (Ok(path), changes),
                    Err(err) => {
                        tracing::warn!(target: targets::MODEL, %path, %err, "insert_at rejected");
                        (Err(err), Vec::new())
                    }
                }
            },
            completion,
        );
    }

    /// Mutate the stored copy of `entity` and notify with a single update.
    ///
    /// The target is resolved by unique value when the operation runs, so
    /// the reported path is its position at that moment. If it is no longer
    /// stored the completion receives `Ok(None)` and nothing is delivered.
    /// A changed section key value does not move the entity to another
    /// section.
    pub fn update<F, C>(&self, entity: &E, mutate: F, completion: C)
    where
        F: FnOnce(&mut E) + Send + 'static,
        C: FnOnce(Result<Option<IndexPath>>) + Send + 'static,
    {
        self.enqueue_update(Some(entity.unique_value()), None, mutate, completion);
    }

    /// Mutate the entity currently at `path`.
    ///
    /// The entity is identified when this method is called and re-resolved
    /// when the operation runs, the same way as [`update`](Self::update).
    pub fn update_at<F, C>(&self, path: IndexPath, mutate: F, completion: C)
    where
        F: FnOnce(&mut E) + Send + 'static,
        C: FnOnce(Result<Option<IndexPath>>) + Send + 'static,
    {
        let id = self.shared.state.read().sections.entity(path).map(Entity::unique_value);
        self.enqueue_update(id, Some(path), mutate, completion);
    }

    fn enqueue_update<F, C>(
        &self,
        id: Option<E::Id>,
        requested: Option<IndexPath>,
        mutate: F,
        completion: C,
    ) where
        F: FnOnce(&mut E) + Send + 'static,
        C: FnOnce(Result<Option<IndexPath>>) + Send + 'static,
    {
        self.enqueue(
            "update",
            Delivery::Unbracketed,
            move |shared, _config, _notifier| {
                let Some(id) = id else {
                    let path = requested.unwrap_or_default();
                    tracing::warn!(target: targets::MODEL, %path, "update rejected, no entity at path");
                    return (
                        Err(Error::index_out_of_bounds(
                            path.section,
                            path.row,
                            "no entity to update at this row",
                        )),
                        Vec::new(),
                    );
                };
                match shared.state.write().update(&id, mutate) {
                    Some(path) => (Ok(Some(path)), vec![Change::entities_updated(vec![path])]),
                    None => {
                        tracing::warn!(target: targets::MODEL, ?id, "update dropped, entity no longer stored");
                        (Ok(None), Vec::new())
                    }
                }
            },
            completion,
        );
    }

    /// Remove the given entities, matched by unique value.
    ///
    /// Entities that are not stored are ignored, but stop being tracked as
    /// fetched. With [`remove_empty_sections`](ModelConfig::remove_empty_sections)
    /// set, keyed sections left empty are removed and reported as section
    /// deletes. The completion receives the removed entities in path order.
    pub fn remove<C>(&self, entities: &[E], completion: C)
    where
        C: FnOnce(Result<Vec<E>>) + Send + 'static,
    {
        let ids: Vec<E::Id> = entities.iter().map(Entity::unique_value).collect();
        self.enqueue(
            "remove",
            Delivery::Bracketed,
            move |shared, config, _notifier| {
                let cleanup = cleanup_enabled(shared, config);
                let mut state = shared.state.write();
                let paths = state.resolve_for_removal(&ids);
                split_result(state.remove_paths(paths, cleanup))
            },
            completion,
        );
    }

    /// Remove the entities at `paths`.
    ///
    /// # Errors
    ///
    /// If any path does not address a stored entity the completion receives
    /// an out-of-bounds error and nothing is removed.
    pub fn remove_at<C>(&self, paths: Vec<IndexPath>, completion: C)
    where
        C: FnOnce(Result<Vec<E>>) + Send + 'static,
    {
        self.enqueue(
            "remove_at",
            Delivery::Bracketed,
            move |shared, config, _notifier| {
                let cleanup = cleanup_enabled(shared, config);
                let result = shared.state.write().remove_paths(paths, cleanup);
                if let Err(err) = &result {
                    tracing::warn!(target: targets::MODEL, %err, "remove_at rejected");
                }
                split_result(result)
            },
            completion,
        );
    }

    /// Drop every section and forget every fetched value, without
    /// notifications.
    pub fn remove_all<C>(&self, completion: C)
    where
        C: FnOnce(Result<()>) + Send + 'static,
    {
        self.enqueue(
            "remove_all",
            Delivery::Silent,
            move |shared, _config, _notifier| {
                shared.state.write().clear();
                tracing::debug!(target: targets::MODEL, "model cleared");
                (Ok(()), Vec::new())
            },
            completion,
        );
    }

    /// Move the entity at `from` to `to`.
    ///
    /// `to` is read after the entity has been taken out of `from`. A
    /// user-driven move updates state silently because the view already shows
    /// it; otherwise a bracketed move change is delivered. Empty sections are
    /// not cleaned up.
    pub fn move_entity<C>(&self, from: IndexPath, to: IndexPath, user_driven: bool, completion: C)
    where
        C: FnOnce(Result<()>) + Send + 'static,
    {
        let delivery = if user_driven {
            Delivery::Silent
        } else {
            Delivery::Bracketed
        };
        self.enqueue(
            "move_entity",
            delivery,
            move |shared, _config, _notifier| match shared.state.write().move_entity(from, to) {
                Ok(()) => (Ok(()), vec![Change::entities_moved(vec![from], vec![to])]),
                Err(err) => {
                    tracing::warn!(target: targets::MODEL, %from, %to, %err, "move rejected");
                    (Err(err), Vec::new())
                }
            },
            completion,
        );
    }

    /// Stable-sort one section with an ad hoc comparator.
    ///
    /// The comparator is not stored in the configuration. Only entities that
    /// changed position are reported.
    pub fn sort_entities<F, C>(&self, section: usize, compare: F, completion: C)
    where
        F: FnMut(&E, &E) -> Ordering + Send + 'static,
        C: FnOnce(Result<Permutation>) + Send + 'static,
    {
        self.enqueue(
            "sort_entities",
            Delivery::Bracketed,
            move |shared, _config, _notifier| {
                split_result(shared.state.write().sort_section(section, compare))
            },
            completion,
        );
    }

    /// Re-sort every section with the configured entity comparator.
    ///
    /// Without one, nothing moves and the completion receives identity
    /// permutations.
    pub fn reorder_entities<C>(&self, completion: C)
    where
        C: FnOnce(Result<Vec<Permutation>>) + Send + 'static,
    {
        self.enqueue(
            "reorder_entities",
            Delivery::Bracketed,
            move |shared, config, _notifier| {
                let mut state = shared.state.write();
                match config.entity_comparator() {
                    Some(compare) => {
                        let (permutations, changes) = state.sort_all_sections(|a, b| compare(a, b));
                        (Ok(permutations), changes)
                    }
                    None => {
                        let identities = state
                            .sections
                            .iter()
                            .map(|section| Permutation::identity(section.len()))
                            .collect();
                        (Ok(identities), Vec::new())
                    }
                }
            },
            completion,
        );
    }

    /// Stable-sort the sections with an ad hoc comparator.
    pub fn sort_sections<F, C>(&self, compare: F, completion: C)
    where
        F: FnMut(&Section<E>, &Section<E>) -> Ordering + Send + 'static,
        C: FnOnce(Result<Permutation>) + Send + 'static,
    {
        self.enqueue(
            "sort_sections",
            Delivery::Bracketed,
            move |shared, _config, _notifier| {
                let (permutation, changes) = shared.state.write().sort_sections(compare);
                (Ok(permutation), changes)
            },
            completion,
        );
    }

    /// Re-sort the sections with the configured section comparator.
    pub fn reorder_sections<C>(&self, completion: C)
    where
        C: FnOnce(Result<Permutation>) + Send + 'static,
    {
        self.enqueue(
            "reorder_sections",
            Delivery::Bracketed,
            move |shared, config, _notifier| {
                let mut state = shared.state.write();
                match config.section_comparator() {
                    Some(compare) => {
                        let (permutation, changes) = state.sort_sections(|a, b| compare(a, b));
                        (Ok(permutation), changes)
                    }
                    None => (Ok(Permutation::identity(state.sections.len())), Vec::new()),
                }
            },
            completion,
        );
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn number_of_sections(&self) -> usize {
        self.shared.state.read().sections.len()
    }

    /// Entities in `section`, or 0 if it does not exist.
    pub fn number_of_entities(&self, section: usize) -> usize {
        self.shared
            .state
            .read()
            .sections
            .section(section)
            .map_or(0, Section::len)
    }

    /// Visible entities across all sections.
    pub fn number_of_whole_entities(&self) -> usize {
        self.shared.state.read().sections.total_entities()
    }

    /// Size of the membership index, including filtered-out entities.
    pub fn number_of_fetched_entities(&self) -> usize {
        self.shared.state.read().fetched.len()
    }

    /// Returns `true` if no entity is visible.
    pub fn is_empty(&self) -> bool {
        self.number_of_whole_entities() == 0
    }

    /// A copy of the section at `index`.
    pub fn section(&self, index: usize) -> Option<Section<E>> {
        self.shared.state.read().sections.section(index).cloned()
    }

    pub fn section_named(&self, name: &str) -> Option<Section<E>> {
        self.shared.state.read().sections.section_named(name).cloned()
    }

    pub fn section_names(&self) -> Vec<String> {
        self.shared
            .state
            .read()
            .sections
            .iter()
            .map(|section| section.name().to_string())
            .collect()
    }

    /// A copy of the entity at `path`.
    pub fn entity(&self, path: IndexPath) -> Option<E> {
        self.shared.state.read().sections.entity(path).cloned()
    }

    /// Current path of `entity`, matched by unique value.
    ///
    /// The section named by the entity's key is searched first, then every
    /// section, since an update may have changed the key value without
    /// moving the entity.
    pub fn index_path(&self, entity: &E) -> Option<IndexPath> {
        let state = self.shared.state.read();
        let derived = match &self.shared.section_key {
            Some(key) => {
                let name = key.section_name(entity);
                state.sections.index_path_of(entity, Some(&name))
            }
            None => state.sections.index_path_of(entity, None),
        };
        derived.or_else(|| state.sections.locate(&entity.unique_value()))
    }

    pub fn index_path_for_id(&self, id: &E::Id) -> Option<IndexPath> {
        self.shared.state.read().sections.locate(id)
    }

    /// Returns `true` if an entity with unique value `id` is visible.
    pub fn contains(&self, id: &E::Id) -> bool {
        self.index_path_for_id(id).is_some()
    }

    /// Returns `true` if `id` has been fetched, visible or not.
    pub fn is_fetched(&self, id: &E::Id) -> bool {
        self.shared.state.read().fetched.contains(id)
    }

    /// Every visible entity in section order.
    pub fn all_entities(&self) -> Vec<E> {
        self.shared
            .state
            .read()
            .sections
            .iter()
            .flat_map(|section| section.entities().iter().cloned())
            .collect()
    }

    /// Visible entities matching `predicate`, in section order.
    pub fn filter_entities<P>(&self, mut predicate: P) -> Vec<E>
    where
        P: FnMut(&E) -> bool,
    {
        self.shared
            .state
            .read()
            .sections
            .iter()
            .flat_map(|section| section.entities().iter())
            .filter(|entity| predicate(entity))
            .cloned()
            .collect()
    }

    /// A copy of every section.
    pub fn snapshot(&self) -> Vec<Section<E>> {
        self.shared.state.read().sections.sections().to_vec()
    }

    /// Index titles of the sections that have one, in section order.
    pub fn section_index_titles(&self) -> Vec<String> {
        self.shared
            .state
            .read()
            .sections
            .iter()
            .filter_map(|section| section.index_title().map(str::to_string))
            .collect()
    }

    /// Ordinal of the first section whose index title is `title`, or
    /// `fallback` if none matches.
    pub fn section_for_index_title(&self, title: &str, fallback: usize) -> usize {
        self.shared
            .state
            .read()
            .sections
            .iter()
            .position(|section| section.index_title() == Some(title))
            .unwrap_or(fallback)
    }

    // =========================================================================
    // Pagination
    // =========================================================================

    pub fn fetch_batch_size(&self) -> usize {
        self.shared.config.read().fetch_batch_size()
    }

    /// Page the fetched entities fill up to: `fetched / batch`.
    pub fn last_fetch_index(&self) -> usize {
        self.number_of_fetched_entities() / self.fetch_batch_size()
    }

    /// Page to request next.
    pub fn next_fetch_index(&self) -> usize {
        self.last_fetch_index() + 1
    }
}

impl<E: Entity + Debug> SectionedModel<E> {
    /// Format the current sections as a tree.
    pub fn debug_tree(&self, options: TreeFormatOptions) -> String {
        let state = self.shared.state.read();
        SectionTreeDebug::new(&state.sections)
            .with_options(options)
            .to_string()
    }
}

impl<E: Entity> Debug for SectionedModel<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.read();
        f.debug_struct("SectionedModel")
            .field("sections", &state.sections.len())
            .field("entities", &state.sections.total_entities())
            .field("fetched", &state.fetched.len())
            .field("section_key", &self.shared.section_key)
            .field("pending", &self.pipeline.pending())
            .finish()
    }
}

fn ingest<E: Entity>(
    shared: &Shared<E>,
    config: &ModelConfig<E>,
    notifier: &Notifier,
    entities: Vec<E>,
) -> Vec<Change> {
    let _perf = PerfSpan::new("ingest");
    let incoming = entities.len();
    let title = |name: &str| notifier.index_title(name);
    let changes = shared
        .state
        .write()
        .ingest(entities, config, shared.section_key.as_ref(), &title);
    tracing::trace!(target: targets::MODEL, incoming, "batch merged");
    changes
}

/// Empty-section cleanup only applies to keyed models.
fn cleanup_enabled<E: Entity>(shared: &Shared<E>, config: &ModelConfig<E>) -> bool {
    config.remove_empty_sections() && shared.section_key.is_some()
}

fn split_result<T>(result: Result<(T, Vec<Change>)>) -> (Result<T>, Vec<Change>) {
    match result {
        Ok((value, changes)) => (Ok(value), changes),
        Err(err) => (Err(err), Vec::new()),
    }
}

fn trace_changes(label: &'static str, changes: &[Change]) {
    if changes.is_empty() {
        return;
    }
    let rows = |kind: ChangeKind| -> usize {
        changes
            .iter()
            .filter(|change| !change.is_section() && change.kind() == kind)
            .map(Change::len)
            .sum()
    };
    tracing::trace!(
        target: targets::MODEL,
        op = label,
        inserted = rows(ChangeKind::Insert),
        updated = rows(ChangeKind::Update),
        moved = rows(ChangeKind::Move),
        deleted = rows(ChangeKind::Delete),
        sections = changes.iter().filter(|change| change.is_section()).count(),
        "changes computed"
    );
}

/// Builder for [`SectionedModel`].
pub struct SectionedModelBuilder<E: Entity> {
    section_key: Option<SectionKey<E>>,
    config: ModelConfig<E>,
    main_context: Option<MainContext>,
    delegate: Option<Arc<dyn ChangeSink>>,
    worker: WorkerConfig,
}

impl<E: Entity> Default for SectionedModelBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> SectionedModelBuilder<E> {
    pub fn new() -> Self {
        Self {
            section_key: None,
            config: ModelConfig::default(),
            main_context: None,
            delegate: None,
            worker: WorkerConfig::with_name(DEFAULT_WORKER_NAME),
        }
    }

    /// Group entities into sections by `key`. Fixed for the model's lifetime.
    pub fn section_key(mut self, key: SectionKey<E>) -> Self {
        self.section_key = Some(key);
        self
    }

    /// Group entities by [`Entity::field`] with this key.
    pub fn section_key_field(self, field: impl Into<String>) -> Self {
        self.section_key(SectionKey::field(field))
    }

    /// Group entities by a computed name.
    pub fn section_key_with<F>(self, extract: F) -> Self
    where
        F: Fn(&E) -> Option<String> + Send + Sync + 'static,
    {
        self.section_key(SectionKey::extractor(extract))
    }

    pub fn config(mut self, config: ModelConfig<E>) -> Self {
        self.config = config;
        self
    }

    /// Deliver notifications on `context`.
    pub fn main_context(mut self, context: MainContext) -> Self {
        self.main_context = Some(context);
        self
    }

    pub fn delegate(mut self, delegate: Arc<dyn ChangeSink>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    /// Name of the pipeline thread.
    pub fn worker_name(mut self, name: impl Into<String>) -> Self {
        self.worker.name = name.into();
        self
    }

    /// Start the pipeline and create the model.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline thread cannot be started.
    pub fn build(self) -> Result<SectionedModel<E>> {
        let worker = Worker::with_config(self.worker)?;
        tracing::debug!(
            target: targets::MODEL,
            keyed = self.section_key.is_some(),
            main_context = self.main_context.is_some(),
            "model created"
        );
        Ok(SectionedModel {
            shared: Arc::new(Shared {
                state: RwLock::new(ModelState::default()),
                config: RwLock::new(Arc::new(self.config)),
                section_key: self.section_key,
                delegate: RwLock::new(self.delegate),
                signals: Arc::new(ChangeSignals::new()),
            }),
            pipeline: Pipeline::new(worker, self.main_context),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::fixtures::{Person, people, person};
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    static_assertions::assert_impl_all!(SectionedModel<Person>: Send, Sync);

    fn keyed() -> SectionedModel<Person> {
        SectionedModel::builder()
            .section_key_field("country")
            .build()
            .unwrap()
    }

    #[test]
    fn test_fetch_is_silent() {
        let model = keyed();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        model.signals().changed.connect(move |_| {
            counter.fetch_add(1, AtomicOrdering::SeqCst);
        });

        model.fetch(people(), drop);
        model.flush();

        assert_eq!(model.number_of_sections(), 3);
        assert_eq!(model.number_of_whole_entities(), 10);
        assert_eq!(seen.load(AtomicOrdering::SeqCst), 0);
    }

    #[test]
    fn test_completion_receives_result() {
        let model = keyed();
        let got = Arc::new(Mutex::new(None));

        let slot = got.clone();
        model.insert_at(person(1, "Alice", "France", 31), IndexPath::new(2, 0), move |r| {
            *slot.lock() = Some(r);
        });
        model.flush();
        assert_eq!(*got.lock(), Some(Err(Error::section_out_of_bounds(2, 0))));

        let slot = got.clone();
        model.insert_at(person(1, "Alice", "France", 31), IndexPath::new(0, 0), move |r| {
            *slot.lock() = Some(r);
        });
        model.flush();
        assert_eq!(*got.lock(), Some(Ok(IndexPath::new(0, 0))));
        assert_eq!(model.section_names(), vec!["France"]);
    }

    #[test]
    fn test_update_missing_target_is_none() {
        let model = keyed();
        model.fetch(people(), drop);
        let ghost = person(99, "Ghost", "Nowhere", 1);

        let got = Arc::new(Mutex::new(None));
        let slot = got.clone();
        model.update(&ghost, |p| p.age = 0, move |r| *slot.lock() = Some(r));
        model.flush();
        assert_eq!(*got.lock(), Some(Ok(None)));

        let slot = got.clone();
        model.update_at(IndexPath::new(7, 7), |p| p.age = 0, move |r| *slot.lock() = Some(r));
        model.flush();
        assert!(matches!(*got.lock(), Some(Err(Error::IndexOutOfBounds { .. }))));
    }

    #[test]
    fn test_config_snapshot_at_submit() {
        let model = SectionedModel::<Person>::new().unwrap();
        model.set_config(ModelConfig::builder().filter(|p: &Person| p.age >= 40).build());
        model.fetch(people(), drop);
        model.update_config(|builder| builder.clear_filter());
        model.flush();

        assert_eq!(model.number_of_whole_entities(), 4);
        assert_eq!(model.number_of_fetched_entities(), 10);
        assert!(model.config().entity_filter().is_none());
    }

    #[test]
    fn test_pagination() {
        let model = SectionedModel::<Person>::builder()
            .config(ModelConfig::builder().fetch_batch_size(4).build())
            .build()
            .unwrap();
        assert_eq!(model.last_fetch_index(), 0);
        assert_eq!(model.next_fetch_index(), 1);

        model.fetch(people(), drop);
        model.flush();
        assert_eq!(model.last_fetch_index(), 2);
        assert_eq!(model.next_fetch_index(), 3);
    }

    #[test]
    fn test_index_titles() {
        let model = keyed();
        model.fetch(people(), drop);
        model.flush();

        assert_eq!(model.section_index_titles(), vec!["F", "G", "I"]);
        assert_eq!(model.section_for_index_title("G", 0), 1);
        assert_eq!(model.section_for_index_title("Q", 0), 0);
    }

    #[test]
    fn test_rejected_after_shutdown() {
        let model = keyed();
        model.shutdown();
        assert!(!model.is_running());

        let got = Arc::new(Mutex::new(None));
        let slot = got.clone();
        model.insert(people(), move |r| *slot.lock() = Some(r));
        // Rejected operations complete synchronously.
        assert_eq!(*got.lock(), Some(Err(Error::WorkerStopped)));
        assert!(model.is_empty());
    }

    #[test]
    fn test_extractor_key_and_read_helpers() {
        let model = SectionedModel::<Person>::builder()
            .section_key_with(|p: &Person| {
                Some(if p.age >= 40 { "40+" } else { "under 40" }.to_string())
            })
            .config(ModelConfig::builder().sort_sections_by_name().build())
            .build()
            .unwrap();
        model.fetch(people(), drop);
        model.flush();
        assert_eq!(model.pending_operations(), 0);

        assert_eq!(model.section_names(), vec!["40+", "under 40"]);
        assert_eq!(model.number_of_entities(0), 4);
        let italians = model.filter_entities(|p| p.country == "Italy");
        assert_eq!(italians.iter().map(|p| p.id).collect::<Vec<_>>(), vec![5, 6, 9]);

        let tree = model.debug_tree(TreeFormatOptions::minimal());
        assert!(tree.starts_with("Sections (2 sections, 10 entities):\n"));
        assert!(tree.contains("under 40 (6)"));
        assert!(tree.contains("... (1 more)"));
    }

    #[test]
    fn test_delegate_can_be_swapped() {
        struct Counter(AtomicUsize);
        impl ChangeSink for Counter {
            fn will_change_content(&self) {
                self.0.fetch_add(1, AtomicOrdering::SeqCst);
            }
        }

        let model = keyed();
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        model.set_delegate(Some(counter.clone()));
        assert!(model.delegate().is_some());

        model.insert(vec![person(1, "Alice", "France", 31)], drop);
        model.flush();
        assert_eq!(counter.0.load(AtomicOrdering::SeqCst), 1);

        model.set_delegate(None);
        model.insert(vec![person(2, "Bob", "Germany", 45)], drop);
        model.flush();
        assert_eq!(counter.0.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(model.number_of_sections(), 2);
    }

    #[test]
    fn test_update_config_clears_sorts() {
        let model = SectionedModel::<Person>::builder()
            .config(
                ModelConfig::builder()
                    .sort_entities_by_key(|p: &Person| p.age)
                    .sort_sections_by_name()
                    .build(),
            )
            .build()
            .unwrap();
        assert!(model.config().entity_comparator().is_some());

        model.update_config(|builder| builder.clear_entity_sort().clear_section_sort());
        let config = model.config();
        assert!(config.entity_comparator().is_none());
        assert!(config.section_comparator().is_none());
    }
}
