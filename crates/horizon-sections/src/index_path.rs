//! Two-level coordinates into a sectioned model.

use std::fmt;

/// A `(section, row)` coordinate identifying one entity's position.
///
/// Index paths are positional and go stale as soon as the model changes.
/// Hold on to an entity's unique value instead when the position must be
/// found again later.
///
/// Ordering is section-major, so sorting a list of paths yields the order in
/// which the entities appear in the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IndexPath {
    /// Section ordinal.
    pub section: usize,
    /// Row within the section.
    pub row: usize,
}

impl IndexPath {
    /// Create a new index path.
    #[inline]
    pub const fn new(section: usize, row: usize) -> Self {
        Self { section, row }
    }

    /// Returns the path of the next row in the same section.
    #[inline]
    pub const fn next_row(self) -> Self {
        Self::new(self.section, self.row + 1)
    }
}

impl From<(usize, usize)> for IndexPath {
    fn from((section, row): (usize, usize)) -> Self {
        Self::new(section, row)
    }
}

impl fmt::Display for IndexPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.section, self.row)
    }
}
