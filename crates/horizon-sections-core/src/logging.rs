//! Tracing targets, span names and tree dump options.
//!
//! Nothing here installs a subscriber. Applications pick one and filter by
//! the names in [`targets`]:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("horizon_sections::model=debug,horizon_sections_core=warn")
//!     .init();
//! ```
//!
//! [`TreeFormatOptions`] and [`tree_prefix`] drive
//! `horizon_sections::debug::SectionTreeDebug`.

/// Names of the spans entered around pipeline work and delivery.
pub mod span_names {
    /// One unit of work executing on the mutation pipeline.
    pub const PIPELINE_UNIT: &str = "horizon_sections::pipeline_unit";
    /// Notification batch delivery.
    pub const DELIVERY: &str = "horizon_sections::delivery";
    /// Signal emission span.
    pub const SIGNAL: &str = "horizon_sections::signal";
    /// Main context pump.
    pub const MAIN_CONTEXT: &str = "horizon_sections::main_context";
}

/// `target:` values used by every log call in the workspace.
pub mod targets {
    /// Core runtime target.
    pub const CORE: &str = "horizon_sections_core";
    /// Serial worker target.
    pub const WORKER: &str = "horizon_sections_core::worker";
    /// Signal system target.
    pub const SIGNAL: &str = "horizon_sections_core::signal";
    /// Main context target.
    pub const MAIN_CONTEXT: &str = "horizon_sections_core::main_context";
    /// Mutation pipeline target.
    pub const PIPELINE: &str = "horizon_sections::pipeline";
    /// Model engine target.
    pub const MODEL: &str = "horizon_sections::model";
}

/// Branch glyphs for [`tree_prefix`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TreeStyle {
    /// `+--`, `` `-- `` and `|`.
    Ascii,
    #[default]
    Unicode,
    /// A single `-` per node and no rails.
    Compact,
}

/// What a section tree dump includes.
#[derive(Debug, Clone)]
pub struct TreeFormatOptions {
    pub style: TreeStyle,
    /// Whether to prefix leaves with their row index.
    pub show_rows: bool,
    /// Whether to show section index titles.
    pub show_index_titles: bool,
    /// Maximum number of leaves printed per branch (None for unlimited).
    pub max_leaves: Option<usize>,
    /// Spaces after the rail at each nested level.
    pub indent_size: usize,
}

impl Default for TreeFormatOptions {
    fn default() -> Self {
        Self {
            style: TreeStyle::default(),
            show_rows: true,
            show_index_titles: true,
            max_leaves: None,
            indent_size: 2,
        }
    }
}

impl TreeFormatOptions {
    /// Every row, with row numbers and index titles.
    pub fn detailed() -> Self {
        Self::default()
    }

    /// Names and counts, at most five rows per section.
    pub fn minimal() -> Self {
        Self {
            show_rows: false,
            show_index_titles: false,
            max_leaves: Some(5),
            ..Default::default()
        }
    }
}

/// Build the line prefix for a tree node at `depth`.
///
/// Depth 0 is a root and gets no prefix.
pub fn tree_prefix(options: &TreeFormatOptions, depth: usize, is_last: bool) -> String {
    if depth == 0 {
        return String::new();
    }

    let (branch, corner, last) = match options.style {
        TreeStyle::Ascii => ("|", "+--", "`--"),
        TreeStyle::Unicode => (
            "\u{2502}",
            "\u{251c}\u{2500}\u{2500}",
            "\u{2514}\u{2500}\u{2500}",
        ),
        TreeStyle::Compact => ("", "-", "-"),
    };

    let indent = " ".repeat(options.indent_size);
    let mut prefix = format!("{branch}{indent}").repeat(depth - 1);
    prefix.push_str(if is_last { last } else { corner });
    prefix.push(' ');
    prefix
}

/// Keeps an `info` span on `horizon_sections::perf` entered for its
/// lifetime, so subscribers that record span timings see how long an ingest
/// or sort took.
#[derive(Debug)]
pub struct PerfSpan {
    #[allow(dead_code)]
    span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!(target: "horizon_sections::perf", "perf", operation = name);
        Self {
            span: span.entered(),
        }
    }
}

/// `tracing` macros pinned to the core target.
#[macro_export]
macro_rules! sections_trace {
    ($($arg:tt)*) => {
        tracing::trace!(target: "horizon_sections_core", $($arg)*)
    };
}

#[macro_export]
macro_rules! sections_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: "horizon_sections_core", $($arg)*)
    };
}

#[macro_export]
macro_rules! sections_info {
    ($($arg:tt)*) => {
        tracing::info!(target: "horizon_sections_core", $($arg)*)
    };
}

#[macro_export]
macro_rules! sections_warn {
    ($($arg:tt)*) => {
        tracing::warn!(target: "horizon_sections_core", $($arg)*)
    };
}

#[macro_export]
macro_rules! sections_error {
    ($($arg:tt)*) => {
        tracing::error!(target: "horizon_sections_core", $($arg)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_has_no_prefix() {
        let options = TreeFormatOptions::default();
        assert_eq!(tree_prefix(&options, 0, true), "");
    }

    #[test]
    fn test_unicode_prefixes() {
        let options = TreeFormatOptions::default();
        assert_eq!(tree_prefix(&options, 1, false), "\u{251c}\u{2500}\u{2500} ");
        assert_eq!(tree_prefix(&options, 1, true), "\u{2514}\u{2500}\u{2500} ");
        assert_eq!(
            tree_prefix(&options, 2, true),
            "\u{2502}  \u{2514}\u{2500}\u{2500} "
        );
    }

    #[test]
    fn test_ascii_prefixes() {
        let options = TreeFormatOptions {
            style: TreeStyle::Ascii,
            indent_size: 1,
            ..Default::default()
        };
        assert_eq!(tree_prefix(&options, 1, false), "+-- ");
        assert_eq!(tree_prefix(&options, 2, true), "| `-- ");
    }

    #[test]
    fn test_minimal_options() {
        let options = TreeFormatOptions::minimal();
        assert!(!options.show_rows);
        assert!(!options.show_index_titles);
        assert_eq!(options.max_leaves, Some(5));
    }

    #[test]
    fn test_perf_span() {
        // Just ensure it doesn't panic without a subscriber
        let _span = PerfSpan::new("test_operation");
        sections_debug!(operation = "test", "inside perf span");
    }

    #[test]
    fn test_perf_span_with_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("horizon_sections=trace"))
            .with_test_writer()
            .try_init();
        let _span = PerfSpan::new("subscribed_operation");
        sections_trace!(rows = 3, "inside subscribed perf span");
    }
}
