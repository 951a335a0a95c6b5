//! Live path nodes.

use std::fmt;
use std::sync::{Arc, Weak};

use lattice_data_core::{Signal, Value, logging::targets};
use parking_lot::Mutex;

use super::PathValue;
use super::step::{Notify, PathStep, SourceSubscription};
use crate::error::PathError;

struct NodeState {
    source: Value,
    value: PathValue,
    subscription: Option<SourceSubscription>,
}

/// One link of a live property path.
///
/// A node holds its current source, the value it resolved from that source,
/// and at most one subscription to the source's change notifications. When
/// its value changes it pushes the value to the next node as that node's new
/// source, then emits [`value_changed`](PathNode::value_changed).
///
/// Nodes are owned by their [`PathWalker`](super::PathWalker); the link to the
/// next node is a weak reference.
pub struct PathNode {
    step: Arc<dyn PathStep>,
    state: Mutex<NodeState>,
    next: Weak<PathNode>,
    this: Weak<PathNode>,
    /// Emitted after this node re-resolved its value.
    pub value_changed: Signal<()>,
}

impl PathNode {
    pub(crate) fn new(step: Arc<dyn PathStep>, next: Weak<PathNode>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            step,
            state: Mutex::new(NodeState {
                source: Value::Null,
                value: PathValue::Broken,
                subscription: None,
            }),
            next,
            this: this.clone(),
            value_changed: Signal::new(),
        })
    }

    /// The current source of this node.
    pub fn source(&self) -> Value {
        self.state.lock().source.clone()
    }

    /// The value this node resolved.
    pub fn value(&self) -> PathValue {
        self.state.lock().value.clone()
    }

    /// Returns `true` if the source is absent or the step cannot be resolved.
    pub fn is_broken(&self) -> bool {
        self.state.lock().value.is_broken()
    }

    /// Returns `true` for steps the parser inserted on its own.
    pub fn is_implicit(&self) -> bool {
        self.step.is_implicit()
    }

    /// Point this node at a new source.
    ///
    /// Does nothing if the source is unchanged. Otherwise the subscription to
    /// the old source is dropped before the new source is subscribed, and the
    /// value is re-resolved.
    pub fn set_source(&self, source: Value) {
        let old_subscription = {
            let mut state = self.state.lock();
            if state.source == source {
                return;
            }
            state.source = source.clone();
            state.subscription.take()
        };
        drop(old_subscription);

        let notify: Notify = {
            let this = self.this.clone();
            Arc::new(move || {
                if let Some(node) = this.upgrade() {
                    node.update_value();
                }
            })
        };
        let subscription = self.step.listen(&source, notify);
        {
            let mut state = self.state.lock();
            // A re-entrant set_source may have replaced the source meanwhile.
            if state.source == source {
                state.subscription = subscription;
            }
        }
        self.update_value();
    }

    /// Re-resolve the value from the current source and propagate it.
    pub fn update_value(&self) {
        let source = self.source();
        let value = self.step.resolve(&source);
        tracing::trace!(target: targets::PATH, step = ?self.step, broken = value.is_broken(), "path node updated");
        self.state.lock().value = value.clone();

        if let Some(next) = self.next.upgrade() {
            next.set_source(value.into_value());
        }
        self.value_changed.emit(());
    }

    /// Write through this node's step into its source.
    pub fn assign(&self, value: Value) -> Result<(), PathError> {
        let source = self.source();
        if source.is_null() {
            return Err(PathError::Broken(format!("{:?}", self.step)));
        }
        self.step.assign(&source, value)
    }

    /// Drop the subscription and forget the source.
    pub(crate) fn detach(&self) {
        let subscription = {
            let mut state = self.state.lock();
            state.source = Value::Null;
            state.value = PathValue::Broken;
            state.subscription.take()
        };
        drop(subscription);
    }
}

impl fmt::Debug for PathNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("PathNode")
            .field("step", &self.step)
            .field("source", &state.source)
            .field("value", &state.value)
            .finish()
    }
}
