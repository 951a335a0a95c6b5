//! Core data capabilities for Lattice Data.
//!
//! This crate provides the observable building blocks the collection-view and
//! binding engine in `lattice-data` is written against:
//!
//! - **Signals**: Type-safe, re-entrancy-safe notification channels
//! - **Properties**: Change-tracking value cells
//! - **Values**: The dynamic [`Value`] model with reference identity for objects
//! - **Objects**: The [`DataObject`] capability set and the [`DynamicObject`] property bag
//! - **Lists**: [`ObservableList`] and its [`CollectionChange`] notifications
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use lattice_data_core::{DynamicObject, ObservableList, Value};
//!
//! let people = ObservableList::new(vec![
//!     Value::object(Arc::new(DynamicObject::new("Person").with("Name", "Ada"))),
//! ]);
//! people.collection_changed.connect(|change| println!("{change:?}"));
//! people.push(Value::object(Arc::new(DynamicObject::new("Person").with("Name", "Grace")))).unwrap();
//! ```

pub mod culture;
pub mod error;
pub mod list;
pub mod logging;
pub mod object;
pub mod property;
pub mod signal;
pub mod value;

pub use culture::{Culture, StringComparison};
pub use error::{ConversionError, DataError, ListError, PropertyError, Result};
pub use list::{CollectionChange, ItemFactory, ObservableList};
pub use logging::{DebugTreeNode, PerfSpan, TreeFormatOptions, TreeStyle, format_tree};
pub use object::{
    ALL_PROPERTIES, CurrentItemSource, DataObject, DynamicObject, EditableObject, INDEXER_NAME,
    attached_name,
};
pub use property::Property;
pub use signal::{ConnectionId, Signal, SignalEmitter};
pub use value::Value;
