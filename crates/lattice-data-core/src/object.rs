//! Observable data objects.
//!
//! [`DataObject`] is the capability set property paths and views consume:
//! named members, indexers, attached members, and optional change
//! notification. Everything beyond plain member lookup is optional so that
//! read-only snapshots and fully observable models share one trait.
//!
//! [`DynamicObject`] is a ready-made property bag implementing all of it,
//! including edit transactions.

use std::collections::BTreeMap;
use std::fmt;

use parking_lot::{Mutex, RwLock};

use crate::error::PropertyError;
use crate::list::CollectionChange;
use crate::logging::targets;
use crate::signal::Signal;
use crate::value::Value;

/// Property name announced when an indexer value changes.
pub const INDEXER_NAME: &str = "Item[]";

/// Property name meaning "every property may have changed".
pub const ALL_PROPERTIES: &str = "";

/// The name under which a change of an attached member is announced.
pub fn attached_name(owner: &str, name: &str) -> String {
    format!("{owner}.{name}")
}

/// An object whose members can be resolved by name.
///
/// `property` returning `None` means the member does not exist on this
/// object, which property paths report as a broken link. A member that exists
/// but currently holds nothing returns `Some(Value::Null)`.
pub trait DataObject: Send + Sync {
    /// Short type name, used in diagnostics and debug output.
    fn type_name(&self) -> &str;

    /// Read a named member.
    fn property(&self, name: &str) -> Option<Value>;

    /// Write a named member.
    fn set_property(&self, name: &str, _value: Value) -> Result<(), PropertyError> {
        Err(PropertyError::read_only(name))
    }

    /// Read through the object's indexer.
    fn indexed(&self, _key: &str) -> Option<Value> {
        None
    }

    /// Write through the object's indexer.
    fn set_indexed(&self, key: &str, _value: Value) -> Result<(), PropertyError> {
        Err(PropertyError::read_only(format!("[{key}]")))
    }

    /// Read an attached member defined by `owner`.
    fn attached_property(&self, _owner: &str, _name: &str) -> Option<Value> {
        None
    }

    /// Write an attached member defined by `owner`.
    fn set_attached_property(&self, owner: &str, name: &str, _value: Value) -> Result<(), PropertyError> {
        Err(PropertyError::read_only(attached_name(owner, name)))
    }

    /// Signal carrying the name of each changed member, if observable.
    fn property_changed(&self) -> Option<&Signal<String>> {
        None
    }

    /// Signal carrying collection changes, for objects that are sequences.
    fn collection_changed(&self) -> Option<&Signal<CollectionChange>> {
        None
    }

    /// The cursor capability, for objects that track a current item.
    fn current_item_source(&self) -> Option<&dyn CurrentItemSource> {
        None
    }

    /// The edit-transaction capability.
    fn editable(&self) -> Option<&dyn EditableObject> {
        None
    }
}

/// A value that exposes a current-item cursor.
///
/// Property paths resolving through such a value step through its current
/// item unless the next member belongs to the cursor itself.
pub trait CurrentItemSource: Send + Sync {
    /// The current item, if the cursor is on one.
    fn current_item(&self) -> Option<Value>;

    /// Raised after the current item or position changed.
    fn current_changed(&self) -> &Signal<()>;
}

/// An object supporting begin/commit/cancel edit transactions.
pub trait EditableObject: Send + Sync {
    /// Start an edit transaction.
    fn begin_edit(&self);

    /// Commit the pending edit transaction.
    fn end_edit(&self);

    /// Roll back to the state captured by `begin_edit`.
    fn cancel_edit(&self);
}

/// A property bag with change notification and edit transactions.
///
/// # Example
///
/// ```
/// use lattice_data_core::{DataObject, DynamicObject, Value};
///
/// let customer = DynamicObject::new("Customer").with("Name", "Ada");
/// assert_eq!(customer.property("Name"), Some(Value::from("Ada")));
/// assert!(customer.property("Age").is_none());
/// ```
pub struct DynamicObject {
    type_name: String,
    properties: RwLock<BTreeMap<String, Value>>,
    entries: RwLock<BTreeMap<String, Value>>,
    attached: RwLock<BTreeMap<(String, String), Value>>,
    edit_snapshot: Mutex<Option<BTreeMap<String, Value>>>,
    property_changed: Signal<String>,
}

impl DynamicObject {
    /// Create an empty object with the given type name.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            properties: RwLock::new(BTreeMap::new()),
            entries: RwLock::new(BTreeMap::new()),
            attached: RwLock::new(BTreeMap::new()),
            edit_snapshot: Mutex::new(None),
            property_changed: Signal::new(),
        }
    }

    /// Builder-style member initialization (no notification).
    pub fn with(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.write().insert(name.into(), value.into());
        self
    }

    /// Builder-style indexer entry initialization (no notification).
    pub fn with_entry(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.write().insert(key.into(), value.into());
        self
    }

    /// Builder-style attached member initialization (no notification).
    pub fn with_attached(
        self,
        owner: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.attached
            .write()
            .insert((owner.into(), name.into()), value.into());
        self
    }

    /// Read a member.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.properties.read().get(name).cloned()
    }

    /// Set a member, creating it if needed.
    ///
    /// Emits `property_changed` if the stored value changed.
    pub fn set(&self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        let changed = {
            let mut properties = self.properties.write();
            match properties.get(name) {
                Some(current) if *current == value => false,
                _ => {
                    properties.insert(name.to_string(), value);
                    true
                }
            }
        };
        if changed {
            tracing::trace!(target: targets::OBJECT, type_name = %self.type_name, name, "property changed");
            self.property_changed.emit(name.to_string());
        }
    }

    /// Set an indexer entry, emitting the indexer change name.
    pub fn set_entry(&self, key: &str, value: impl Into<Value>) {
        self.entries.write().insert(key.to_string(), value.into());
        self.property_changed.emit(INDEXER_NAME.to_string());
    }

    /// Set an attached member, emitting `Owner.Name`.
    pub fn set_attached(&self, owner: &str, name: &str, value: impl Into<Value>) {
        self.attached
            .write()
            .insert((owner.to_string(), name.to_string()), value.into());
        self.property_changed.emit(attached_name(owner, name));
    }

    /// Names of all members, in sorted order.
    pub fn property_names(&self) -> Vec<String> {
        self.properties.read().keys().cloned().collect()
    }

    /// Returns `true` while an edit transaction is open.
    pub fn is_editing(&self) -> bool {
        self.edit_snapshot.lock().is_some()
    }

    /// The signal announcing member changes.
    pub fn changed_signal(&self) -> &Signal<String> {
        &self.property_changed
    }
}

impl DataObject for DynamicObject {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn property(&self, name: &str) -> Option<Value> {
        self.get(name)
    }

    fn set_property(&self, name: &str, value: Value) -> Result<(), PropertyError> {
        if !self.properties.read().contains_key(name) {
            return Err(PropertyError::not_found(&self.type_name, name));
        }
        self.set(name, value);
        Ok(())
    }

    fn indexed(&self, key: &str) -> Option<Value> {
        self.entries.read().get(key).cloned()
    }

    fn set_indexed(&self, key: &str, value: Value) -> Result<(), PropertyError> {
        self.set_entry(key, value);
        Ok(())
    }

    fn attached_property(&self, owner: &str, name: &str) -> Option<Value> {
        self.attached
            .read()
            .get(&(owner.to_string(), name.to_string()))
            .cloned()
    }

    fn set_attached_property(&self, owner: &str, name: &str, value: Value) -> Result<(), PropertyError> {
        self.set_attached(owner, name, value);
        Ok(())
    }

    fn property_changed(&self) -> Option<&Signal<String>> {
        Some(&self.property_changed)
    }

    fn editable(&self) -> Option<&dyn EditableObject> {
        Some(self)
    }
}

impl EditableObject for DynamicObject {
    fn begin_edit(&self) {
        let mut snapshot = self.edit_snapshot.lock();
        if snapshot.is_none() {
            *snapshot = Some(self.properties.read().clone());
        }
    }

    fn end_edit(&self) {
        self.edit_snapshot.lock().take();
    }

    fn cancel_edit(&self) {
        let Some(saved) = self.edit_snapshot.lock().take() else {
            return;
        };
        *self.properties.write() = saved;
        self.property_changed.emit(ALL_PROPERTIES.to_string());
    }
}

impl fmt::Debug for DynamicObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicObject")
            .field("type_name", &self.type_name)
            .field("properties", &*self.properties.read())
            .finish()
    }
}

static_assertions::assert_impl_all!(DynamicObject: Send, Sync);
