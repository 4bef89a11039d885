//! Tree-shaped debug output for section lists.

use std::fmt::{self, Debug, Write};

use horizon_sections_core::{TreeFormatOptions, tree_prefix};

use crate::entity::Entity;
use crate::section_list::SectionList;

/// Formats a [`SectionList`] as a tree, one branch per section and one leaf
/// per entity.
///
/// ```text
/// Sections (2 sections, 3 entities):
/// ├── France [F] (2)
/// │  ├── 0: Person { id: 1, .. }
/// │  └── 1: Person { id: 3, .. }
/// └── Germany [G] (1)
/// │  └── 0: Person { id: 2, .. }
/// ```
pub struct SectionTreeDebug<'a, E> {
    sections: &'a SectionList<E>,
    options: TreeFormatOptions,
}

impl<'a, E: Entity + Debug> SectionTreeDebug<'a, E> {
    pub fn new(sections: &'a SectionList<E>) -> Self {
        Self {
            sections,
            options: TreeFormatOptions::default(),
        }
    }

    pub fn with_options(mut self, options: TreeFormatOptions) -> Self {
        self.options = options;
        self
    }

    /// Render the tree.
    pub fn format(&self) -> String {
        let mut output = String::new();
        writeln!(
            output,
            "Sections ({} sections, {} entities):",
            self.sections.len(),
            self.sections.total_entities()
        )
        .expect("write to String");

        if self.sections.is_empty() {
            writeln!(output, "  (empty)").expect("write to String");
            return output;
        }

        let section_count = self.sections.len();
        for (index, section) in self.sections.iter().enumerate() {
            output.push_str(&tree_prefix(&self.options, 1, index + 1 == section_count));
            let name = if section.name().is_empty() {
                "(unnamed)"
            } else {
                section.name()
            };
            output.push_str(name);
            if self.options.show_index_titles {
                if let Some(title) = section.index_title() {
                    write!(output, " [{title}]").expect("write to String");
                }
            }
            writeln!(output, " ({})", section.len()).expect("write to String");

            let shown = self
                .options
                .max_leaves
                .map_or(section.len(), |max| max.min(section.len()));
            let hidden = section.len() - shown;
            for (row, entity) in section.entities().iter().take(shown).enumerate() {
                let is_last = hidden == 0 && row + 1 == shown;
                output.push_str(&tree_prefix(&self.options, 2, is_last));
                if self.options.show_rows {
                    write!(output, "{row}: ").expect("write to String");
                }
                writeln!(output, "{entity:?}").expect("write to String");
            }
            if hidden > 0 {
                output.push_str(&tree_prefix(&self.options, 2, true));
                writeln!(output, "... ({hidden} more)").expect("write to String");
            }
        }
        output
    }
}

impl<E: Entity + Debug> fmt::Display for SectionTreeDebug<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}
