//! Collection views.
//!
//! A collection view presents a source list filtered, sorted and grouped,
//! and tracks a cursor over that presentation.
//!
//! # Core Types
//!
//! - [`CollectionView`]: The read/navigate/configure contract of every view
//! - [`EditableCollectionView`]: Add-new and edit-item transactions on top of it
//! - [`ListCollectionView`]: The view over an [`ObservableList`](lattice_data_core::ObservableList)
//! - [`ViewSignals`]: The four notification channels a view raises
//!
//! # Signals
//!
//! Views never emit while holding their state lock. For every change the
//! order is: `current_changing` (if the cursor moves), `collection_changed`,
//! `current_changed`, then `property_changed` for each view property whose
//! value changed. A change made by a handler is delivered after the events
//! of the change being delivered, so a subscriber that replays the
//! notifications in order always reproduces the view.

mod list_view;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use lattice_data_core::{
    CollectionChange, CurrentItemSource, Culture, DataObject, ObservableList, Signal, Value,
};

pub use list_view::{ListCollectionView, ListCollectionViewBuilder};

use crate::error::Result;
use crate::group::{CollectionViewGroup, GroupDescription};
use crate::sort::SortDescription;

/// A filter predicate: items for which it returns `false` are hidden.
///
/// The predicate runs while the view holds its state lock, so it must not
/// call back into the view.
pub type FilterFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Names under which views announce changes of their own properties.
pub mod property_names {
    pub const COUNT: &str = "Count";
    pub const IS_EMPTY: &str = "IsEmpty";
    pub const CURRENT_ITEM: &str = "CurrentItem";
    pub const CURRENT_POSITION: &str = "CurrentPosition";
    pub const IS_CURRENT_BEFORE_FIRST: &str = "IsCurrentBeforeFirst";
    pub const IS_CURRENT_AFTER_LAST: &str = "IsCurrentAfterLast";
    pub const CULTURE: &str = "Culture";
    pub const IS_ADDING_NEW: &str = "IsAddingNew";
    pub const IS_EDITING_ITEM: &str = "IsEditingItem";
    pub const CURRENT_ADD_ITEM: &str = "CurrentAddItem";
    pub const CURRENT_EDIT_ITEM: &str = "CurrentEditItem";
    pub const CAN_ADD_NEW: &str = "CanAddNew";
    pub const CAN_REMOVE: &str = "CanRemove";
    pub const CAN_CANCEL_EDIT: &str = "CanCancelEdit";
    pub const CAN_FILTER: &str = "CanFilter";
    pub const CAN_SORT: &str = "CanSort";
    pub const CAN_GROUP: &str = "CanGroup";
    /// Raised by [`CollectionViewSource`](crate::CollectionViewSource) when it
    /// replaces its view.
    pub const VIEW: &str = "View";
}

/// Arguments of [`ViewSignals::current_changing`].
///
/// A handler may call [`cancel`](Self::cancel). The cursor has already
/// moved when the signal is raised, and it stays moved; cancelling only
/// suppresses the following `current_changed`.
#[derive(Clone, Default)]
pub struct CurrentChangingArgs {
    canceled: Arc<AtomicBool>,
}

impl CurrentChangingArgs {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once a handler canceled.
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for CurrentChangingArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CurrentChangingArgs")
            .field("canceled", &self.is_canceled())
            .finish()
    }
}

/// Signals emitted by a collection view.
#[derive(Default)]
pub struct ViewSignals {
    /// Emitted after the presentation changed.
    pub collection_changed: Signal<CollectionChange>,

    /// Emitted before the cursor moves.
    pub current_changing: Signal<CurrentChangingArgs>,

    /// Emitted after the cursor moved or its item was replaced.
    pub current_changed: Signal<()>,

    /// Emitted with the name of a view property that changed.
    /// See [`property_names`].
    pub property_changed: Signal<String>,
}

impl ViewSignals {
    /// Create a new set of view signals.
    pub fn new() -> Self {
        Self::default()
    }
}

/// The read, navigate and configure contract of a collection view.
///
/// Every view is also a [`DataObject`] exposing its contract as named
/// properties, and a [`CurrentItemSource`] so property paths resolve through
/// its current item.
pub trait CollectionView: DataObject + CurrentItemSource {
    /// The signals this view emits.
    fn signals(&self) -> &ViewSignals;

    /// The list this view presents.
    fn source_collection(&self) -> &Arc<ObservableList>;

    /// Number of items in the view.
    fn count(&self) -> usize;

    /// Returns `true` if the view has no items.
    fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// The item at view index `index`.
    fn item_at(&self, index: usize) -> Option<Value>;

    /// All items in view order.
    fn items(&self) -> Vec<Value>;

    /// View index of `item`.
    fn index_of(&self, item: &Value) -> Option<usize>;

    /// Returns `true` if `item` is in the view.
    fn contains(&self, item: &Value) -> bool {
        self.index_of(item).is_some()
    }

    /// The culture used by sorting and grouping.
    fn culture(&self) -> Culture;

    /// Change the culture; the view is refreshed.
    fn set_culture(&self, culture: Culture) -> Result<()>;

    fn can_filter(&self) -> bool;
    fn can_sort(&self) -> bool;
    fn can_group(&self) -> bool;

    /// The filter predicate, if any.
    fn filter(&self) -> Option<FilterFn>;

    /// Replace the filter predicate; the view is refreshed.
    fn set_filter(&self, filter: Option<FilterFn>) -> Result<()>;

    /// The sort descriptions, in priority order.
    fn sort_descriptions(&self) -> Vec<SortDescription>;

    /// Replace the sort descriptions; the view is refreshed.
    fn set_sort_descriptions(&self, descriptions: Vec<SortDescription>) -> Result<()>;

    /// The group descriptions, outermost level first.
    fn group_descriptions(&self) -> Vec<Arc<dyn GroupDescription>>;

    /// Replace the group descriptions; the view is refreshed.
    fn set_group_descriptions(&self, descriptions: Vec<Arc<dyn GroupDescription>>) -> Result<()>;

    /// The root group, when grouping is active.
    fn groups(&self) -> Option<CollectionViewGroup>;

    /// The cursor position, `-1` (before first) through `count` (after last).
    fn current_position(&self) -> isize;

    fn is_current_before_first(&self) -> bool;
    fn is_current_after_last(&self) -> bool;

    /// Move to the first item. Returns `true` if the cursor is on an item.
    fn move_current_to_first(&self) -> bool;

    /// Move to the last item. Returns `true` if the cursor is on an item.
    fn move_current_to_last(&self) -> bool;

    /// Move to the next item. Returns `true` if the cursor is on an item.
    fn move_current_to_next(&self) -> bool;

    /// Move to the previous item. Returns `true` if the cursor is on an item.
    fn move_current_to_previous(&self) -> bool;

    /// Move to `position` (`-1..=count`).
    fn move_current_to_position(&self, position: isize) -> Result<bool>;

    /// Move to `item`, or before the first item when `item` is not in view.
    fn move_current_to(&self, item: &Value) -> bool;

    /// Rebuild the presentation from the source.
    fn refresh(&self) -> Result<()>;

    /// Suspend recomputation until the returned guard (and every other
    /// outstanding guard) is dropped.
    fn defer_refresh(&self) -> DeferRefreshGuard;

    /// Returns `true` while a deferred-refresh guard is outstanding.
    fn is_refresh_deferred(&self) -> bool;

    /// Stop listening to the source.
    fn detach(&self);
}

/// Add-new and edit-item transactions.
pub trait EditableCollectionView: CollectionView {
    /// Whether [`add_new`](Self::add_new) is supported.
    fn can_add_new(&self) -> bool;

    /// Create an item, append it to the source and make it current.
    fn add_new(&self) -> Result<Value>;

    /// Finish the pending add: the item takes its place in the view (or
    /// leaves it if the filter rejects it).
    fn commit_new(&self) -> Result<()>;

    /// Abandon the pending add and remove the item from the source.
    fn cancel_new(&self) -> Result<()>;

    fn is_adding_new(&self) -> bool;
    fn current_add_item(&self) -> Option<Value>;

    /// Begin editing `item`.
    fn edit_item(&self, item: &Value) -> Result<()>;

    /// Finish the pending edit: the item's filter, sort and group placement
    /// are re-evaluated.
    fn commit_edit(&self) -> Result<()>;

    /// Abandon the pending edit. Requires the edit-transaction capability.
    fn cancel_edit(&self) -> Result<()>;

    fn can_cancel_edit(&self) -> bool;
    fn is_editing_item(&self) -> bool;
    fn current_edit_item(&self) -> Option<Value>;

    /// Whether [`remove`](Self::remove) and [`remove_at`](Self::remove_at)
    /// are supported.
    fn can_remove(&self) -> bool;

    /// Remove `item` from the source. Does nothing if it is not in view.
    fn remove(&self, item: &Value) -> Result<()>;

    /// Remove the item at view index `index` from the source.
    fn remove_at(&self, index: usize) -> Result<()>;
}

/// Something whose recomputation a [`DeferRefreshGuard`] suspends.
pub(crate) trait DeferTarget: Send + Sync {
    fn end_defer(&self);
}

/// Keeps a view's refresh deferred while alive.
///
/// Guards nest; when the last guard of a view is dropped, the view refreshes
/// once.
#[must_use = "refresh resumes as soon as the guard is dropped"]
pub struct DeferRefreshGuard {
    target: Option<Weak<dyn DeferTarget>>,
}

impl DeferRefreshGuard {
    pub(crate) fn new(target: Weak<dyn DeferTarget>) -> Self {
        Self {
            target: Some(target),
        }
    }

    /// End the deferral now rather than at drop.
    pub fn release(mut self) {
        self.end();
    }

    fn end(&mut self) {
        if let Some(target) = self.target.take().and_then(|t| t.upgrade()) {
            target.end_defer();
        }
    }
}

impl Drop for DeferRefreshGuard {
    fn drop(&mut self) {
        self.end();
    }
}

impl fmt::Debug for DeferRefreshGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferRefreshGuard")
            .field("active", &self.target.is_some())
            .finish()
    }
}

static_assertions::assert_impl_all!(ViewSignals: Send, Sync);
static_assertions::assert_impl_all!(DeferRefreshGuard: Send, Sync);
