//! Live path evaluation.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use lattice_data_core::logging::{PerfSpan, span_names, targets};
use lattice_data_core::{Signal, Value};
use parking_lot::Mutex;

use super::node::PathNode;
use super::{PathValue, PropertyPath};
use crate::error::PathError;

/// Keeps a property path resolved against a root as the object graph changes.
///
/// The walker owns one [`PathNode`] per step. Each node listens to its own
/// source, so a change anywhere along the chain re-resolves only the links
/// after it. The walker exposes the resolved value of the whole path and
/// raises [`value_changed`](PathWalker::value_changed) after any re-resolution.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use lattice_data::PathWalker;
/// use lattice_data_core::{DynamicObject, Value};
///
/// let address = Arc::new(DynamicObject::new("Address").with("City", "Oslo"));
/// let customer = Arc::new(DynamicObject::new("Customer").with("Address", Value::object(address.clone())));
///
/// let walker = PathWalker::new("Address.City").unwrap();
/// walker.update(Value::object(customer));
/// assert_eq!(walker.value(), Value::from("Oslo"));
///
/// address.set("City", "Bergen");
/// assert_eq!(walker.value(), Value::from("Bergen"));
/// ```
pub struct PathWalker {
    path: PropertyPath,
    nodes: Vec<Arc<PathNode>>,
    root: Mutex<Value>,
    updating: AtomicBool,
    /// Emitted once per [`update`](Self::update) and after every
    /// re-resolution triggered by a change along the path.
    pub value_changed: Signal<()>,
}

impl PathWalker {
    /// Parse `path` and create a walker with no root.
    pub fn new(path: &str) -> Result<Arc<Self>, PathError> {
        Ok(Self::from_path(PropertyPath::parse(path)?))
    }

    /// Create a walker for an already parsed path.
    pub fn from_path(path: PropertyPath) -> Arc<Self> {
        let mut nodes: Vec<Arc<PathNode>> = Vec::with_capacity(path.steps().len());
        let mut next = Weak::new();
        for step in path.steps().iter().rev() {
            let node = PathNode::new(step.clone(), next);
            next = Arc::downgrade(&node);
            nodes.push(node);
        }
        nodes.reverse();

        Arc::new_cyclic(|this: &Weak<PathWalker>| {
            if let Some(tail) = nodes.last() {
                let this = this.clone();
                tail.value_changed.connect(move |_| {
                    if let Some(walker) = this.upgrade() {
                        if !walker.updating.load(Ordering::SeqCst) {
                            walker.value_changed.emit(());
                        }
                    }
                });
            }
            Self {
                path,
                nodes,
                root: Mutex::new(Value::Null),
                updating: AtomicBool::new(false),
                value_changed: Signal::new(),
            }
        })
    }

    /// The path this walker evaluates.
    pub fn path(&self) -> &PropertyPath {
        &self.path
    }

    /// The nodes of the chain, implicit current-item steps included.
    pub fn nodes(&self) -> &[Arc<PathNode>] {
        &self.nodes
    }

    /// The current root.
    pub fn root(&self) -> Value {
        self.root.lock().clone()
    }

    /// Re-resolve the whole path against `root`.
    ///
    /// Always raises `value_changed` exactly once, even when nothing changed.
    pub fn update(&self, root: Value) {
        let _perf = PerfSpan::new(span_names::PATH);
        tracing::debug!(target: targets::PATH, path = %self.path, root = ?root, "path walker update");
        *self.root.lock() = root.clone();

        self.updating.store(true, Ordering::SeqCst);
        if let Some(head) = self.nodes.first() {
            head.set_source(root);
        }
        self.updating.store(false, Ordering::SeqCst);

        self.value_changed.emit(());
    }

    /// Returns `true` if any link of the chain is broken.
    pub fn is_broken(&self) -> bool {
        self.nodes.iter().any(|node| node.is_broken())
    }

    /// The resolution of the whole path.
    pub fn resolution(&self) -> PathValue {
        if self.is_broken() {
            return PathValue::Broken;
        }
        self.nodes
            .last()
            .map(|node| node.value())
            .unwrap_or_default()
    }

    /// The resolved value, or null when broken.
    pub fn value(&self) -> Value {
        self.resolution().into_value()
    }

    /// Write `value` through the last step of the path.
    pub fn set_value(&self, value: Value) -> Result<(), PathError> {
        if self.is_broken() {
            return Err(PathError::Broken(self.path.to_string()));
        }
        match self.nodes.last() {
            Some(tail) => tail.assign(value),
            None => Err(PathError::Broken(self.path.to_string())),
        }
    }

    /// Drop every subscription and forget the root.
    pub fn detach(&self) {
        *self.root.lock() = Value::Null;
        for node in &self.nodes {
            node.detach();
        }
    }
}

impl fmt::Debug for PathWalker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathWalker")
            .field("path", &self.path)
            .field("broken", &self.is_broken())
            .field("value", &self.value())
            .finish()
    }
}

static_assertions::assert_impl_all!(PathWalker: Send, Sync);
