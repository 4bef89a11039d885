//! Horizon Sections - a thread-safe sectioned collection model.
//!
//! Entities are grouped into named, ordered sections. Every mutation runs on
//! a private serial pipeline and is reported as an incremental change
//! sequence that a list view can apply as a batch update:
//!
//! - **Entity**: the identity, section-key and update-in-place contract,
//!   usually derived with `#[derive(Entity)]`
//! - **SectionedModel**: the engine, with queued mutations and locked reads
//! - **ModelConfig**: sorting, filtering and cleanup policy
//! - **Change / ChangeSink / ChangeSignals**: the notification payload and
//!   its observers
//! - **SectionTreeDebug**: tree-shaped debug output
//!
//! The runtime beneath the engine lives in `horizon_sections_core` and is
//! re-exported here.
//!
//! # Example
//!
//! ```
//! use horizon_sections::prelude::*;
//! use std::sync::Arc;
//!
//! #[derive(Debug, Clone, Entity)]
//! struct Track {
//!     #[entity(id)]
//!     id: u32,
//!     #[entity(key)]
//!     album: String,
//!     title: String,
//! }
//!
//! struct Printer;
//!
//! impl ChangeSink for Printer {
//!     fn did_change(&self, change: &Change) {
//!         println!("{change:?}");
//!     }
//! }
//!
//! let model = SectionedModel::<Track>::builder()
//!     .section_key_field("album")
//!     .delegate(Arc::new(Printer))
//!     .build()
//!     .unwrap();
//!
//! model.insert(
//!     vec![
//!         Track { id: 1, album: "Blue".into(), title: "All I Want".into() },
//!         Track { id: 2, album: "Hejira".into(), title: "Coyote".into() },
//!     ],
//!     drop,
//! );
//! model.flush();
//! assert_eq!(model.number_of_sections(), 2);
//! ```

// Lets the derive's `::horizon_sections::Entity` path resolve inside this crate.
extern crate self as horizon_sections;

pub use horizon_sections_core::*;
pub use horizon_sections_macros::Entity;

pub mod change;
pub mod config;
pub mod debug;
pub mod entity;
pub mod index_path;
pub mod model;
mod pipeline;
pub mod prelude;
pub mod section;
pub mod section_list;

pub use change::{Change, ChangeKind, ChangeSignals, ChangeSink, default_index_title};
pub use config::{
    DEFAULT_FETCH_BATCH_SIZE, EntityComparator, EntityFilter, KeyExtractor, ModelConfig,
    ModelConfigBuilder, SectionComparator, SectionKey,
};
pub use debug::SectionTreeDebug;
pub use entity::Entity;
pub use index_path::IndexPath;
pub use model::{DEFAULT_WORKER_NAME, SectionedModel, SectionedModelBuilder};
pub use section::{AppendOutcome, Permutation, Section};
pub use section_list::SectionList;
