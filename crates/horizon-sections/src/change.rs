//! Change notifications.
//!
//! The model reports structural edits with a non-generic payload so that
//! observers do not need to know the entity type. Entities are not carried
//! in the payload; a sink reads them back through the model's read API,
//! which is consistent with the notification while it is being delivered.
//!
//! Per notification-enabled operation, observers see:
//!
//! 1. `will_change_content`
//! 2. zero or more [`Change`]s in computed order
//! 3. `did_change_content`
//!
//! Index conventions follow batch-update semantics: deletes, updates and
//! move origins use pre-batch positions; inserts and move destinations use
//! post-batch positions.

use std::sync::Arc;

use horizon_sections_core::Signal;

use crate::index_path::IndexPath;

/// The kind of a structural edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChangeKind {
    Insert,
    Delete,
    Move,
    Update,
}

/// One structural edit at entity or section granularity.
///
/// Index pairing rules: insert has only the new position, delete only the
/// old one, move has both, update has only the old one. The constructors
/// enforce them.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Change {
    /// Entities inserted, deleted, moved or updated.
    Entities {
        kind: ChangeKind,
        index_paths: Option<Vec<IndexPath>>,
        new_index_paths: Option<Vec<IndexPath>>,
    },
    /// A whole section inserted, deleted, moved or updated.
    Section {
        name: String,
        kind: ChangeKind,
        index: Option<usize>,
        new_index: Option<usize>,
    },
}

impl Change {
    pub fn entities_inserted(new_index_paths: Vec<IndexPath>) -> Self {
        Self::Entities {
            kind: ChangeKind::Insert,
            index_paths: None,
            new_index_paths: Some(new_index_paths),
        }
    }

    pub fn entities_deleted(index_paths: Vec<IndexPath>) -> Self {
        Self::Entities {
            kind: ChangeKind::Delete,
            index_paths: Some(index_paths),
            new_index_paths: None,
        }
    }

    /// Entities moved pairwise from `from[i]` to `to[i]`.
    ///
    /// # Panics
    ///
    /// Panics if the two lists differ in length.
    pub fn entities_moved(from: Vec<IndexPath>, to: Vec<IndexPath>) -> Self {
        assert_eq!(from.len(), to.len(), "move paths must be paired");
        Self::Entities {
            kind: ChangeKind::Move,
            index_paths: Some(from),
            new_index_paths: Some(to),
        }
    }

    pub fn entities_updated(index_paths: Vec<IndexPath>) -> Self {
        Self::Entities {
            kind: ChangeKind::Update,
            index_paths: Some(index_paths),
            new_index_paths: None,
        }
    }

    pub fn section_inserted(name: impl Into<String>, new_index: usize) -> Self {
        Self::Section {
            name: name.into(),
            kind: ChangeKind::Insert,
            index: None,
            new_index: Some(new_index),
        }
    }

    pub fn section_deleted(name: impl Into<String>, index: usize) -> Self {
        Self::Section {
            name: name.into(),
            kind: ChangeKind::Delete,
            index: Some(index),
            new_index: None,
        }
    }

    pub fn section_moved(name: impl Into<String>, index: usize, new_index: usize) -> Self {
        Self::Section {
            name: name.into(),
            kind: ChangeKind::Move,
            index: Some(index),
            new_index: Some(new_index),
        }
    }

    pub fn section_updated(name: impl Into<String>, index: usize) -> Self {
        Self::Section {
            name: name.into(),
            kind: ChangeKind::Update,
            index: Some(index),
            new_index: None,
        }
    }

    pub fn kind(&self) -> ChangeKind {
        match self {
            Self::Entities { kind, .. } | Self::Section { kind, .. } => *kind,
        }
    }

    pub fn is_section(&self) -> bool {
        matches!(self, Self::Section { .. })
    }

    /// Number of rows or sections this change touches.
    pub fn len(&self) -> usize {
        match self {
            Self::Entities {
                index_paths,
                new_index_paths,
                ..
            } => index_paths
                .as_ref()
                .or(new_index_paths.as_ref())
                .map_or(0, Vec::len),
            Self::Section { .. } => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Default section index title: the uppercased first character of the name.
///
/// Returns `None` for an empty name.
pub fn default_index_title(name: &str) -> Option<String> {
    name.chars().next().map(|c| c.to_uppercase().collect())
}

/// Observer of a model's structural changes.
///
/// Every method has a default, so a sink only implements what it needs.
/// Calls arrive on the model's main context when it has one, otherwise on
/// the pipeline thread, always in the documented order.
pub trait ChangeSink: Send + Sync {
    fn will_change_content(&self) {}

    /// Entities changed. Dispatched from [`did_change`](Self::did_change).
    fn did_change_entities(
        &self,
        kind: ChangeKind,
        index_paths: Option<&[IndexPath]>,
        new_index_paths: Option<&[IndexPath]>,
    ) {
        let _ = (kind, index_paths, new_index_paths);
    }

    /// A section changed. Dispatched from [`did_change`](Self::did_change).
    fn did_change_section(
        &self,
        name: &str,
        kind: ChangeKind,
        index: Option<usize>,
        new_index: Option<usize>,
    ) {
        let _ = (name, kind, index, new_index);
    }

    /// Receives every change. The default dispatches to
    /// `did_change_entities` / `did_change_section`.
    fn did_change(&self, change: &Change) {
        match change {
            Change::Entities {
                kind,
                index_paths,
                new_index_paths,
            } => self.did_change_entities(*kind, index_paths.as_deref(), new_index_paths.as_deref()),
            Change::Section {
                name,
                kind,
                index,
                new_index,
            } => self.did_change_section(name, *kind, *index, *new_index),
        }
    }

    fn did_change_content(&self) {}

    /// Index title for a newly created section.
    ///
    /// Asked once for every section the model creates, whether or not a
    /// section comparator is configured, because the stored title also backs
    /// [`SectionedModel::section_index_titles`](crate::SectionedModel::section_index_titles)
    /// and [`section_for_index_title`](crate::SectionedModel::section_for_index_title).
    /// Called from the pipeline thread while the model is write-locked,
    /// outside the ordered notification sequence, so it must not read the
    /// model.
    fn section_index_title(&self, name: &str) -> Option<String> {
        default_index_title(name)
    }
}

/// The same notification sequence exposed as signals, for models with more
/// than one observer.
pub struct ChangeSignals {
    /// Emitted before a batch of changes.
    pub will_change_content: Signal<()>,
    /// Emitted once per change, in order.
    pub changed: Signal<Change>,
    /// Emitted after a batch of changes.
    pub did_change_content: Signal<()>,
}

impl Default for ChangeSignals {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeSignals {
    pub fn new() -> Self {
        Self {
            will_change_content: Signal::new(),
            changed: Signal::new(),
            did_change_content: Signal::new(),
        }
    }
}

static_assertions::assert_impl_all!(ChangeSignals: Send, Sync);

/// Delivers one slice of the notification sequence to a delegate and the
/// signals. The delegate always hears about a step before the signals do.
#[derive(Clone)]
pub(crate) struct Notifier {
    pub(crate) delegate: Option<Arc<dyn ChangeSink>>,
    pub(crate) signals: Arc<ChangeSignals>,
}

impl Notifier {
    pub(crate) fn will_change(&self) {
        if let Some(delegate) = &self.delegate {
            delegate.will_change_content();
        }
        self.signals.will_change_content.emit(());
    }

    pub(crate) fn changes(&self, changes: Vec<Change>) {
        for change in changes {
            if let Some(delegate) = &self.delegate {
                delegate.did_change(&change);
            }
            self.signals.changed.emit(change);
        }
    }

    pub(crate) fn did_change(&self) {
        if let Some(delegate) = &self.delegate {
            delegate.did_change_content();
        }
        self.signals.did_change_content.emit(());
    }

    pub(crate) fn index_title(&self, name: &str) -> Option<String> {
        match &self.delegate {
            Some(delegate) => delegate.section_index_title(name),
            None => default_index_title(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_constructors_follow_pairing_rules() {
        let insert = Change::entities_inserted(vec![IndexPath::new(0, 0)]);
        assert!(matches!(
            insert,
            Change::Entities { index_paths: None, new_index_paths: Some(_), .. }
        ));

        let update = Change::entities_updated(vec![IndexPath::new(0, 0)]);
        assert!(matches!(
            update,
            Change::Entities { index_paths: Some(_), new_index_paths: None, .. }
        ));

        let moved = Change::section_moved("A", 0, 2);
        assert_eq!(moved.kind(), ChangeKind::Move);
        assert!(moved.is_section());

        let deleted = Change::section_deleted("A", 1);
        assert!(matches!(
            deleted,
            Change::Section { index: Some(1), new_index: None, .. }
        ));
    }

    #[test]
    #[should_panic(expected = "paired")]
    fn test_unpaired_move_panics() {
        Change::entities_moved(vec![IndexPath::new(0, 0)], vec![]);
    }

    #[test]
    fn test_len() {
        let change = Change::entities_inserted((0..4).map(|row| IndexPath::new(0, row)).collect());
        assert_eq!(change.len(), 4);
        assert_eq!(Change::section_inserted("x", 0).len(), 1);
        assert!(Change::entities_deleted(vec![]).is_empty());
    }

    #[test]
    fn test_default_index_title() {
        assert_eq!(default_index_title("germany").as_deref(), Some("G"));
        assert_eq!(default_index_title("ßtraße").as_deref(), Some("SS"));
        assert_eq!(default_index_title(""), None);
    }

    #[derive(Default)]
    struct Log(Mutex<Vec<String>>);

    impl ChangeSink for Log {
        fn will_change_content(&self) {
            self.0.lock().push("will".into());
        }
        fn did_change_section(&self, name: &str, kind: ChangeKind, _: Option<usize>, _: Option<usize>) {
            self.0.lock().push(format!("section {name} {kind:?}"));
        }
        fn did_change_content(&self) {
            self.0.lock().push("did".into());
        }
        fn section_index_title(&self, name: &str) -> Option<String> {
            Some(format!("[{name}]"))
        }
    }

    #[test]
    fn test_notifier_delegate_before_signals() {
        let log = Arc::new(Log::default());
        let notifier = Notifier {
            delegate: Some(log.clone()),
            signals: Arc::new(ChangeSignals::new()),
        };

        let log_clone = log.clone();
        notifier.signals.changed.connect(move |change| {
            log_clone.0.lock().push(format!("signal {:?}", change.kind()));
        });

        notifier.will_change();
        notifier.changes(vec![
            Change::section_inserted("A", 0),
            Change::entities_inserted(vec![IndexPath::new(1, 0)]),
        ]);
        notifier.did_change();

        assert_eq!(
            *log.0.lock(),
            vec![
                "will",
                "section A Insert",
                "signal Insert",
                "signal Insert",
                "did",
            ]
        );
        assert_eq!(notifier.index_title("abc").as_deref(), Some("[abc]"));
    }
}
