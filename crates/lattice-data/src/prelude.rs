//! Prelude module for Lattice Data.
//!
//! This module re-exports the most commonly used types for convenient importing:
//!
//! ```ignore
//! use lattice_data::prelude::*;
//! ```
//!
//! This provides access to:
//! - The data model (`Value`, `DynamicObject`, `ObservableList`, `Signal`)
//! - Property paths and bindings (`PropertyPath`, `PathWalker`, `PathBinding`)
//! - Sorting and grouping descriptions
//! - Collection views and view sources

// ============================================================================
// Data Model
// ============================================================================

pub use lattice_data_core::{
    CollectionChange, ConnectionId, Culture, DataObject, DynamicObject, ObservableList, Signal,
    StringComparison, Value,
};

// ============================================================================
// Property Paths and Bindings
// ============================================================================

pub use crate::binding::PathBinding;
pub use crate::converter::{FnConverter, ValueConverter};
pub use crate::path::{PathValue, PathWalker, PropertyPath};

// ============================================================================
// Sorting and Grouping
// ============================================================================

pub use crate::group::{FnGroupDescription, GroupDescription, GroupName, PropertyGroupDescription};
pub use crate::sort::{SortDescription, SortDirection};

// ============================================================================
// Views
// ============================================================================

pub use crate::error::ViewError;
pub use crate::settings::ViewSettings;
pub use crate::source::{CollectionViewSource, ViewSourceItems};
pub use crate::view::{CollectionView, EditableCollectionView, ListCollectionView};
