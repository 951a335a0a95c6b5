//! Path step kinds.
//!
//! Each step knows how to resolve itself against a source value, how to
//! listen for changes of that source, and how to write through itself.

use std::fmt;
use std::sync::Arc;

use lattice_data_core::{
    ALL_PROPERTIES, ConnectionId, DataObject, INDEXER_NAME, SignalEmitter, Value, attached_name,
};

use super::PathValue;
use crate::error::PathError;

/// Callback a step invokes when its source announced a relevant change.
pub(crate) type Notify = Arc<dyn Fn() + Send + Sync>;

/// Member of a list that paths can read.
const LIST_COUNT: &str = "Count";

/// The notification channel a subscription is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    PropertyChanged,
    CollectionChanged,
    CurrentChanged,
}

/// One live connection from a path node to its source.
///
/// The connection is undone when the subscription is dropped.
pub(crate) struct SourceSubscription {
    source: Value,
    channel: Channel,
    id: ConnectionId,
}

impl SourceSubscription {
    fn emitter(&self) -> Option<&dyn SignalEmitter> {
        match (&self.source, self.channel) {
            (Value::Object(o), Channel::PropertyChanged) => {
                o.property_changed().map(|s| s as &dyn SignalEmitter)
            }
            (Value::Object(o), Channel::CollectionChanged) => {
                o.collection_changed().map(|s| s as &dyn SignalEmitter)
            }
            (Value::Object(o), Channel::CurrentChanged) => o
                .current_item_source()
                .map(|c| c.current_changed() as &dyn SignalEmitter),
            (Value::List(l), Channel::CollectionChanged) => {
                Some(&l.collection_changed as &dyn SignalEmitter)
            }
            _ => None,
        }
    }
}

impl Drop for SourceSubscription {
    fn drop(&mut self) {
        if let Some(emitter) = self.emitter() {
            emitter.disconnect(self.id);
        }
    }
}

impl fmt::Debug for SourceSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceSubscription")
            .field("channel", &self.channel)
            .field("id", &self.id)
            .finish()
    }
}

/// Subscribe `notify` to the property changes of `object` named `name`.
fn listen_property(object: &Arc<dyn DataObject>, source: &Value, name: String, notify: Notify) -> Option<SourceSubscription> {
    let signal = object.property_changed()?;
    let id = signal.connect(move |changed: &String| {
        if *changed == name || changed == ALL_PROPERTIES {
            notify();
        }
    });
    Some(SourceSubscription {
        source: source.clone(),
        channel: Channel::PropertyChanged,
        id,
    })
}

fn listen_list(source: &Value, notify: Notify) -> Option<SourceSubscription> {
    let list = source.as_list()?;
    let id = list.collection_changed.connect(move |_| notify());
    Some(SourceSubscription {
        source: source.clone(),
        channel: Channel::CollectionChanged,
        id,
    })
}

/// A single step of a property path.
pub(crate) trait PathStep: Send + Sync + fmt::Debug {
    /// Resolve this step against `source`.
    fn resolve(&self, source: &Value) -> PathValue;

    /// Listen for changes of `source` that affect this step.
    fn listen(&self, source: &Value, notify: Notify) -> Option<SourceSubscription>;

    /// Write `value` through this step.
    fn assign(&self, source: &Value, value: Value) -> Result<(), PathError>;

    /// Steps inserted by the parser rather than written in the path text.
    fn is_implicit(&self) -> bool {
        false
    }
}

/// A named member: `Name`.
#[derive(Debug, Clone)]
pub(crate) struct MemberStep {
    pub(crate) name: String,
}

impl PathStep for MemberStep {
    fn resolve(&self, source: &Value) -> PathValue {
        match source {
            Value::Object(o) => o.property(&self.name).map_or(PathValue::Broken, PathValue::Resolved),
            Value::List(l) if self.name == LIST_COUNT => PathValue::Resolved(Value::from(l.len())),
            _ => PathValue::Broken,
        }
    }

    fn listen(&self, source: &Value, notify: Notify) -> Option<SourceSubscription> {
        match source {
            Value::Object(o) => listen_property(o, source, self.name.clone(), notify),
            Value::List(_) if self.name == LIST_COUNT => listen_list(source, notify),
            _ => None,
        }
    }

    fn assign(&self, source: &Value, value: Value) -> Result<(), PathError> {
        match source {
            Value::Object(o) => Ok(o.set_property(&self.name, value)?),
            _ => Err(PathError::Broken(self.name.clone())),
        }
    }
}

/// An indexer: `[key]`.
#[derive(Debug, Clone)]
pub(crate) struct IndexStep {
    pub(crate) key: String,
}

impl PathStep for IndexStep {
    fn resolve(&self, source: &Value) -> PathValue {
        match source {
            Value::List(l) => self
                .key
                .parse::<usize>()
                .ok()
                .and_then(|i| l.get(i))
                .map_or(PathValue::Broken, PathValue::Resolved),
            Value::Object(o) => o.indexed(&self.key).map_or(PathValue::Broken, PathValue::Resolved),
            _ => PathValue::Broken,
        }
    }

    fn listen(&self, source: &Value, notify: Notify) -> Option<SourceSubscription> {
        match source {
            Value::List(_) => listen_list(source, notify),
            Value::Object(o) if o.property_changed().is_some() => {
                listen_property(o, source, INDEXER_NAME.to_string(), notify)
            }
            Value::Object(o) => {
                let id = o.collection_changed()?.connect(move |_| notify());
                Some(SourceSubscription {
                    source: source.clone(),
                    channel: Channel::CollectionChanged,
                    id,
                })
            }
            _ => None,
        }
    }

    fn assign(&self, source: &Value, value: Value) -> Result<(), PathError> {
        match source {
            Value::List(l) => {
                let index = self
                    .key
                    .parse::<usize>()
                    .map_err(|_| PathError::Broken(format!("[{}]", self.key)))?;
                l.set(index, value)?;
                Ok(())
            }
            Value::Object(o) => Ok(o.set_indexed(&self.key, value)?),
            _ => Err(PathError::Broken(format!("[{}]", self.key))),
        }
    }
}

/// An attached member: `(Owner.Name)`.
#[derive(Debug, Clone)]
pub(crate) struct AttachedStep {
    pub(crate) owner: String,
    pub(crate) name: String,
}

impl PathStep for AttachedStep {
    fn resolve(&self, source: &Value) -> PathValue {
        match source {
            Value::Object(o) => o
                .attached_property(&self.owner, &self.name)
                .map_or(PathValue::Broken, PathValue::Resolved),
            _ => PathValue::Broken,
        }
    }

    fn listen(&self, source: &Value, notify: Notify) -> Option<SourceSubscription> {
        match source {
            Value::Object(o) => listen_property(o, source, attached_name(&self.owner, &self.name), notify),
            _ => None,
        }
    }

    fn assign(&self, source: &Value, value: Value) -> Result<(), PathError> {
        match source {
            Value::Object(o) => Ok(o.set_attached_property(&self.owner, &self.name, value)?),
            _ => Err(PathError::Broken(attached_name(&self.owner, &self.name))),
        }
    }
}

/// Steps through the current item of a cursor-bearing source.
///
/// Inserted before every written step (and as the only step of an empty
/// path). If the source exposes a cursor and the following member is not part
/// of the cursor's own contract, the step yields the cursor's current item and
/// listens to its current-changed signal. Otherwise it passes the source
/// through unchanged.
#[derive(Debug, Clone)]
pub(crate) struct CurrentItemStep {
    pub(crate) next_member: Option<String>,
}

impl CurrentItemStep {
    fn binds_to_view(&self, object: &Arc<dyn DataObject>) -> bool {
        self.next_member
            .as_deref()
            .is_some_and(|member| object.property(member).is_some())
    }
}

impl PathStep for CurrentItemStep {
    fn resolve(&self, source: &Value) -> PathValue {
        match source {
            Value::Null => PathValue::Broken,
            Value::Object(o) => match o.current_item_source() {
                Some(cursor) if !self.binds_to_view(o) => {
                    PathValue::Resolved(cursor.current_item().unwrap_or_default())
                }
                _ => PathValue::Resolved(source.clone()),
            },
            other => PathValue::Resolved(other.clone()),
        }
    }

    fn listen(&self, source: &Value, notify: Notify) -> Option<SourceSubscription> {
        let object = source.as_object()?;
        let cursor = object.current_item_source()?;
        let id = cursor.current_changed().connect(move |_| notify());
        Some(SourceSubscription {
            source: source.clone(),
            channel: Channel::CurrentChanged,
            id,
        })
    }

    fn assign(&self, _source: &Value, _value: Value) -> Result<(), PathError> {
        Err(PathError::Broken(String::from("(current item)")))
    }

    fn is_implicit(&self) -> bool {
        true
    }
}
