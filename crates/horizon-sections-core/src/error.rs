//! Error types for Horizon Sections.
//!
//! Only contract violations that can be detected inside the mutation
//! pipeline surface as errors. "Not found" outcomes are never errors: lookups
//! return `Option` or an empty collection instead.

/// Result type alias for Horizon Sections operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by queued model operations and the runtime beneath them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A row-level position does not exist in the addressed section.
    #[error("index path ({section}, {row}) is out of bounds: {reason}")]
    IndexOutOfBounds {
        section: usize,
        row: usize,
        reason: &'static str,
    },

    /// A section ordinal is past the end of the section list.
    #[error("section {section} is out of bounds (section count {count})")]
    SectionOutOfBounds { section: usize, count: usize },

    /// A positional insert would create a second section with this name.
    #[error("section {name:?} already exists")]
    DuplicateSection { name: String },

    /// The serial worker has been stopped and no longer accepts work.
    #[error("worker has been stopped")]
    WorkerStopped,

    /// The main context queue was closed before an invocation could run.
    #[error("main context queue is closed")]
    QueueClosed,
}

impl Error {
    /// Create an index-path error.
    pub fn index_out_of_bounds(section: usize, row: usize, reason: &'static str) -> Self {
        Self::IndexOutOfBounds {
            section,
            row,
            reason,
        }
    }

    /// Create a section-ordinal error.
    pub fn section_out_of_bounds(section: usize, count: usize) -> Self {
        Self::SectionOutOfBounds { section, count }
    }

    /// Returns `true` for errors caused by a stale or invalid position.
    pub fn is_out_of_bounds(&self) -> bool {
        matches!(
            self,
            Self::IndexOutOfBounds { .. } | Self::SectionOutOfBounds { .. }
        )
    }
}
