//! Prelude module for Horizon Sections.
//!
//! ```
//! use horizon_sections::prelude::*;
//! ```
//!
//! This provides access to:
//! - The entity contract and its derive (`Entity`)
//! - The engine and its configuration (`SectionedModel`, `ModelConfig`, `SectionKey`)
//! - Positions and containers (`IndexPath`, `Section`, `Permutation`)
//! - Notifications (`Change`, `ChangeKind`, `ChangeSink`)
//! - The runtime handles callers touch directly (`MainContext`, `Error`)

// ============================================================================
// Entities
// ============================================================================

pub use crate::Entity;

// ============================================================================
// Engine
// ============================================================================

pub use crate::config::{ModelConfig, SectionKey};
pub use crate::model::SectionedModel;

// ============================================================================
// Positions and containers
// ============================================================================

pub use crate::index_path::IndexPath;
pub use crate::section::{Permutation, Section};

// ============================================================================
// Notifications
// ============================================================================

pub use crate::change::{Change, ChangeKind, ChangeSink};

// ============================================================================
// Runtime
// ============================================================================

pub use horizon_sections_core::{Error, MainContext, Result};
