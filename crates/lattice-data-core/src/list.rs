//! Observable list of values.
//!
//! `ObservableList` is the source sequence collection views wrap. Every
//! mutation emits exactly one [`CollectionChange`] on
//! [`collection_changed`](ObservableList::collection_changed), after the
//! mutation is applied and with the list's lock released, so handlers may
//! read the list (or mutate it again) from inside the notification.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::ListError;
use crate::logging::targets;
use crate::signal::Signal;
use crate::value::Value;

/// Type alias for the zero-argument item constructor of a list.
pub type ItemFactory = Arc<dyn Fn() -> Value + Send + Sync>;

/// A single change to a sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionChange {
    /// `item` was inserted at `index`.
    Add { index: usize, item: Value },
    /// `item` was removed from `index`.
    Remove { index: usize, item: Value },
    /// The item at `index` was replaced.
    Replace { index: usize, old: Value, new: Value },
    /// The sequence changed wholesale; re-read it.
    Reset,
}

impl CollectionChange {
    /// The index the change applies to, if any.
    pub fn index(&self) -> Option<usize> {
        match self {
            Self::Add { index, .. } | Self::Remove { index, .. } | Self::Replace { index, .. } => {
                Some(*index)
            }
            Self::Reset => None,
        }
    }
}

/// A thread-safe list of [`Value`]s that announces its changes.
///
/// # Example
///
/// ```
/// use lattice_data_core::{ObservableList, Value};
///
/// let list = ObservableList::new(vec![Value::from(1), Value::from(2)]);
/// list.collection_changed.connect(|change| println!("{change:?}"));
/// list.push(3);
/// assert_eq!(list.len(), 3);
/// ```
pub struct ObservableList {
    items: RwLock<Vec<Value>>,
    fixed_size: bool,
    read_only: bool,
    item_factory: Option<ItemFactory>,
    /// Emitted after every mutation.
    pub collection_changed: Signal<CollectionChange>,
}

impl ObservableList {
    /// Creates a growable list.
    pub fn new(items: Vec<Value>) -> Self {
        Self {
            items: RwLock::new(items),
            fixed_size: false,
            read_only: false,
            item_factory: None,
            collection_changed: Signal::new(),
        }
    }

    /// Creates an empty growable list.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Creates a growable list that can construct new items.
    pub fn with_factory<F>(items: Vec<Value>, factory: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        Self {
            item_factory: Some(Arc::new(factory)),
            ..Self::new(items)
        }
    }

    /// Creates a fixed-size list: items can be replaced but not added or removed.
    pub fn fixed(items: Vec<Value>) -> Self {
        Self {
            fixed_size: true,
            ..Self::new(items)
        }
    }

    /// Creates a read-only list over a plain item sequence.
    pub fn read_only(items: Vec<Value>) -> Self {
        Self {
            fixed_size: true,
            read_only: true,
            ..Self::new(items)
        }
    }

    /// Returns `true` if the list cannot grow or shrink.
    pub fn is_fixed_size(&self) -> bool {
        self.fixed_size
    }

    /// Returns `true` if no item can be added, removed or replaced.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Returns `true` if the list has an item factory.
    pub fn has_item_factory(&self) -> bool {
        self.item_factory.is_some()
    }

    /// Creates a new item with the list's factory (the item is not inserted).
    pub fn create_item(&self) -> Result<Value, ListError> {
        self.item_factory
            .as_ref()
            .map(|factory| factory())
            .ok_or(ListError::NoItemFactory)
    }

    /// Returns the number of items.
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Returns `true` if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Returns the item at `index`.
    pub fn get(&self, index: usize) -> Option<Value> {
        self.items.read().get(index).cloned()
    }

    /// Returns the index of the first item equal to `item`.
    pub fn index_of(&self, item: &Value) -> Option<usize> {
        self.items.read().iter().position(|v| v == item)
    }

    /// Returns the index of the last item equal to `item`.
    pub fn last_index_of(&self, item: &Value) -> Option<usize> {
        self.items.read().iter().rposition(|v| v == item)
    }

    /// Returns `true` if an item equal to `item` is present.
    pub fn contains(&self, item: &Value) -> bool {
        self.index_of(item).is_some()
    }

    /// Returns a snapshot of the items.
    pub fn to_vec(&self) -> Vec<Value> {
        self.items.read().clone()
    }

    /// Appends an item.
    pub fn push(&self, item: impl Into<Value>) -> Result<(), ListError> {
        let index = self.len();
        self.insert(index, item)
    }

    /// Inserts an item at `index`.
    pub fn insert(&self, index: usize, item: impl Into<Value>) -> Result<(), ListError> {
        if self.fixed_size {
            return Err(ListError::FixedSize);
        }
        let item = item.into();
        {
            let mut items = self.items.write();
            if index > items.len() {
                return Err(ListError::IndexOutOfRange {
                    index,
                    len: items.len(),
                });
            }
            items.insert(index, item.clone());
        }
        tracing::trace!(target: targets::LIST, index, "item added");
        self.collection_changed
            .emit(CollectionChange::Add { index, item });
        Ok(())
    }

    /// Removes and returns the item at `index`.
    pub fn remove_at(&self, index: usize) -> Result<Value, ListError> {
        if self.fixed_size {
            return Err(ListError::FixedSize);
        }
        let item = {
            let mut items = self.items.write();
            if index >= items.len() {
                return Err(ListError::IndexOutOfRange {
                    index,
                    len: items.len(),
                });
            }
            items.remove(index)
        };
        tracing::trace!(target: targets::LIST, index, "item removed");
        self.collection_changed.emit(CollectionChange::Remove {
            index,
            item: item.clone(),
        });
        Ok(item)
    }

    /// Removes the first item equal to `item`. Returns `false` if absent.
    pub fn remove(&self, item: &Value) -> Result<bool, ListError> {
        match self.index_of(item) {
            Some(index) => self.remove_at(index).map(|_| true),
            None => Ok(false),
        }
    }

    /// Replaces the item at `index`, returning the previous item.
    pub fn set(&self, index: usize, item: impl Into<Value>) -> Result<Value, ListError> {
        if self.read_only {
            return Err(ListError::ReadOnly);
        }
        let new = item.into();
        let old = {
            let mut items = self.items.write();
            let len = items.len();
            let slot = items
                .get_mut(index)
                .ok_or(ListError::IndexOutOfRange { index, len })?;
            std::mem::replace(slot, new.clone())
        };
        crate::data_trace!(index, "item replaced");
        self.collection_changed.emit(CollectionChange::Replace {
            index,
            old: old.clone(),
            new,
        });
        Ok(old)
    }

    /// Removes every item.
    pub fn clear(&self) -> Result<(), ListError> {
        if self.fixed_size {
            return Err(ListError::FixedSize);
        }
        self.items.write().clear();
        crate::data_debug!("list cleared");
        self.collection_changed.emit(CollectionChange::Reset);
        Ok(())
    }

    /// Replaces every item.
    pub fn set_items(&self, items: Vec<Value>) -> Result<(), ListError> {
        if self.read_only {
            return Err(ListError::ReadOnly);
        }
        if self.fixed_size && items.len() != self.len() {
            return Err(ListError::FixedSize);
        }
        let len = items.len();
        *self.items.write() = items;
        crate::data_debug!(len, "list items replaced");
        self.collection_changed.emit(CollectionChange::Reset);
        Ok(())
    }
}

impl Default for ObservableList {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for ObservableList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableList")
            .field("items", &*self.items.read())
            .field("fixed_size", &self.fixed_size)
            .field("read_only", &self.read_only)
            .finish()
    }
}

static_assertions::assert_impl_all!(ObservableList: Send, Sync);
