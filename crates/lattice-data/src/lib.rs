//! Lattice Data - collection views and property-path bindings.
//!
//! This crate builds on `lattice-data-core` and re-exports it. It provides:
//!
//! - **Property paths**: [`PropertyPath`] parsing, one-shot resolution, and the
//!   live [`PathWalker`] that re-resolves when any object along the path changes
//! - **Bindings**: [`PathBinding`] with fallback values, converters and write-back
//! - **Sorting**: [`SortDescription`] and the multi-key [`SortFieldComparer`]
//! - **Grouping**: [`PropertyGroupDescription`], [`FnGroupDescription`] and the
//!   grouping tree exposed as [`CollectionViewGroup`]
//! - **Views**: [`ListCollectionView`], a filtered, sorted and grouped view over
//!   an [`ObservableList`] with a cursor and add/edit transactions
//! - **View sources**: [`CollectionViewSource`], which configures views once for
//!   whatever source it is given
//! - **Settings**: [`ViewSettings`], a serializable view configuration
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use lattice_data::prelude::*;
//!
//! let person = |name: &str, age: i64| {
//!     Value::object(Arc::new(DynamicObject::new("Person").with("Name", name).with("Age", age)))
//! };
//! let people = Arc::new(ObservableList::new(vec![
//!     person("Ada", 36),
//!     person("Grace", 45),
//!     person("Linus", 21),
//! ]));
//!
//! let view = ListCollectionView::builder(people.clone())
//!     .filter(|p| PropertyPath::parse("Age").unwrap().resolve(p).value().as_int() > Some(30))
//!     .sort_by(SortDescription::descending("Age"))
//!     .build()
//!     .unwrap();
//! assert_eq!(view.count(), 2);
//!
//! // "Name" is not a property of the view, so it resolves on the current item.
//! let walker = PathWalker::new("Name").unwrap();
//! walker.update(Value::object(view.clone()));
//! view.move_current_to_first();
//! assert_eq!(walker.value(), Value::from("Grace"));
//!
//! view.move_current_to_next();
//! assert_eq!(walker.value(), Value::from("Ada"));
//! ```

pub use lattice_data_core::*;

pub mod binding;
pub mod converter;
pub mod error;
pub mod group;
pub mod path;
pub mod prelude;
pub mod settings;
pub mod sort;
pub mod source;
pub mod view;

pub use binding::{PathBinding, PathBindingBuilder};
pub use converter::{FnConverter, ValueConverter};
pub use error::{PathError, Result, ViewError};
pub use group::{
    CollectionViewGroup, FnGroupDescription, GroupDescription, GroupId, GroupItem, GroupName,
    GroupTree, PropertyGroupDescription,
};
pub use path::{PathNode, PathSegment, PathValue, PathWalker, PropertyPath};
pub use settings::{GroupSetting, ViewSettings};
pub use sort::{SortDescription, SortDirection, SortFieldComparer};
pub use source::{CollectionViewSource, ViewSourceItems};
pub use view::{
    CollectionView, CurrentChangingArgs, DeferRefreshGuard, EditableCollectionView, FilterFn,
    ListCollectionView, ListCollectionViewBuilder, ViewSignals, property_names,
};
