//! Model configuration.
//!
//! A [`ModelConfig`] is immutable once built. The model keeps the active
//! configuration behind an `Arc` and swaps it atomically; every queued
//! operation captures the configuration that was active when it was
//! submitted, so a later swap never changes work that is already queued.
//!
//! ```
//! use horizon_sections::{ModelConfig, Entity};
//!
//! #[derive(Debug, Clone, Entity)]
//! struct City {
//!     #[entity(id)]
//!     id: u32,
//!     #[entity(key)]
//!     name: String,
//!     population: u64,
//! }
//!
//! let config = ModelConfig::<City>::builder()
//!     .sort_entities_by(|a, b| a.name.cmp(&b.name))
//!     .sort_sections_by(|a, b| a.name().cmp(b.name()))
//!     .filter(|city| city.population > 100_000)
//!     .fetch_batch_size(50)
//!     .build();
//!
//! assert_eq!(config.fetch_batch_size(), 50);
//! assert!(config.remove_empty_sections());
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::entity::Entity;
use crate::section::Section;

/// Default page size for the pagination helpers.
pub const DEFAULT_FETCH_BATCH_SIZE: usize = 20;

/// Comparator applied to entities within a section.
pub type EntityComparator<E> = Arc<dyn Fn(&E, &E) -> Ordering + Send + Sync>;

/// Comparator applied to sections.
pub type SectionComparator<E> = Arc<dyn Fn(&Section<E>, &Section<E>) -> Ordering + Send + Sync>;

/// Predicate deciding which ingested entities become visible.
pub type EntityFilter<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Function deriving a section name from an entity.
pub type KeyExtractor<E> = Arc<dyn Fn(&E) -> Option<String> + Send + Sync>;

/// How the model derives an entity's section name.
///
/// Fixed for the lifetime of a model.
pub enum SectionKey<E> {
    /// Use [`Entity::field`] with this key.
    Field(String),
    /// Use a custom extractor.
    Extractor(KeyExtractor<E>),
}

impl<E: Entity> SectionKey<E> {
    /// Key on a named entity field.
    pub fn field(name: impl Into<String>) -> Self {
        Self::Field(name.into())
    }

    /// Key on a custom extractor.
    pub fn extractor<F>(extract: F) -> Self
    where
        F: Fn(&E) -> Option<String> + Send + Sync + 'static,
    {
        Self::Extractor(Arc::new(extract))
    }

    /// The section name for `entity`.
    ///
    /// Entities without a value for the key land in the section named `""`.
    pub fn section_name(&self, entity: &E) -> String {
        let name = match self {
            Self::Field(key) => entity.field(key),
            Self::Extractor(extract) => extract(entity),
        };
        name.unwrap_or_default()
    }
}

impl<E> Clone for SectionKey<E> {
    fn clone(&self) -> Self {
        match self {
            Self::Field(key) => Self::Field(key.clone()),
            Self::Extractor(extract) => Self::Extractor(extract.clone()),
        }
    }
}

impl<E> fmt::Debug for SectionKey<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(key) => f.debug_tuple("Field").field(key).finish(),
            Self::Extractor(_) => f.write_str("Extractor(..)"),
        }
    }
}

/// Sorting, filtering and cleanup policy for a model.
pub struct ModelConfig<E> {
    sort_entities: Option<EntityComparator<E>>,
    sort_sections: Option<SectionComparator<E>>,
    filter: Option<EntityFilter<E>>,
    fetch_batch_size: usize,
    remove_empty_sections: bool,
}

impl<E: Entity> Default for ModelConfig<E> {
    fn default() -> Self {
        Self {
            sort_entities: None,
            sort_sections: None,
            filter: None,
            fetch_batch_size: DEFAULT_FETCH_BATCH_SIZE,
            remove_empty_sections: true,
        }
    }
}

impl<E: Entity> ModelConfig<E> {
    /// Start building a configuration from the defaults.
    pub fn builder() -> ModelConfigBuilder<E> {
        ModelConfigBuilder {
            config: Self::default(),
        }
    }

    /// Start building a configuration from this one.
    pub fn to_builder(&self) -> ModelConfigBuilder<E> {
        ModelConfigBuilder {
            config: self.clone(),
        }
    }

    pub fn entity_comparator(&self) -> Option<&EntityComparator<E>> {
        self.sort_entities.as_ref()
    }

    pub fn section_comparator(&self) -> Option<&SectionComparator<E>> {
        self.sort_sections.as_ref()
    }

    pub fn entity_filter(&self) -> Option<&EntityFilter<E>> {
        self.filter.as_ref()
    }

    /// Page size used by the pagination helpers.
    pub fn fetch_batch_size(&self) -> usize {
        self.fetch_batch_size
    }

    /// Whether removals drop sections they leave empty.
    pub fn remove_empty_sections(&self) -> bool {
        self.remove_empty_sections
    }

    /// Returns `true` if `entity` passes the filter (or no filter is set).
    pub fn accepts(&self, entity: &E) -> bool {
        self.filter.as_ref().is_none_or(|filter| filter(entity))
    }
}

impl<E> Clone for ModelConfig<E> {
    fn clone(&self) -> Self {
        Self {
            sort_entities: self.sort_entities.clone(),
            sort_sections: self.sort_sections.clone(),
            filter: self.filter.clone(),
            fetch_batch_size: self.fetch_batch_size,
            remove_empty_sections: self.remove_empty_sections,
        }
    }
}

impl<E> fmt::Debug for ModelConfig<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConfig")
            .field("sort_entities", &self.sort_entities.is_some())
            .field("sort_sections", &self.sort_sections.is_some())
            .field("filter", &self.filter.is_some())
            .field("fetch_batch_size", &self.fetch_batch_size)
            .field("remove_empty_sections", &self.remove_empty_sections)
            .finish()
    }
}

/// Builder for [`ModelConfig`].
pub struct ModelConfigBuilder<E> {
    config: ModelConfig<E>,
}

impl<E: Entity> ModelConfigBuilder<E> {
    /// Sort entities within each section.
    pub fn sort_entities_by<F>(mut self, compare: F) -> Self
    where
        F: Fn(&E, &E) -> Ordering + Send + Sync + 'static,
    {
        self.config.sort_entities = Some(Arc::new(compare));
        self
    }

    /// Sort entities by a key extracted from each one.
    pub fn sort_entities_by_key<K, F>(self, key: F) -> Self
    where
        K: Ord,
        F: Fn(&E) -> K + Send + Sync + 'static,
    {
        self.sort_entities_by(move |a, b| key(a).cmp(&key(b)))
    }

    pub fn clear_entity_sort(mut self) -> Self {
        self.config.sort_entities = None;
        self
    }

    /// Sort the sections themselves.
    pub fn sort_sections_by<F>(mut self, compare: F) -> Self
    where
        F: Fn(&Section<E>, &Section<E>) -> Ordering + Send + Sync + 'static,
    {
        self.config.sort_sections = Some(Arc::new(compare));
        self
    }

    /// Sort sections alphabetically by name.
    pub fn sort_sections_by_name(self) -> Self {
        self.sort_sections_by(|a, b| a.name().cmp(b.name()))
    }

    pub fn clear_section_sort(mut self) -> Self {
        self.config.sort_sections = None;
        self
    }

    /// Only entities passing `filter` become visible. Rejected entities are
    /// still tracked as fetched.
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.config.filter = Some(Arc::new(filter));
        self
    }

    pub fn clear_filter(mut self) -> Self {
        self.config.filter = None;
        self
    }

    /// Page size for the pagination helpers. Zero is treated as one.
    pub fn fetch_batch_size(mut self, size: usize) -> Self {
        self.config.fetch_batch_size = size.max(1);
        self
    }

    /// Whether removals drop sections they leave empty. Defaults to `true`.
    pub fn remove_empty_sections(mut self, remove: bool) -> Self {
        self.config.remove_empty_sections = remove;
        self
    }

    pub fn build(self) -> ModelConfig<E> {
        self.config
    }
}

impl<E: Entity> Default for ModelConfigBuilder<E> {
    fn default() -> Self {
        ModelConfig::builder()
    }
}
