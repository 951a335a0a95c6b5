//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use lattice_data::{CollectionChange, CollectionView, DataObject, DynamicObject, Value};
use parking_lot::Mutex;

/// Install a test subscriber; `RUST_LOG=lattice_data=trace` shows engine logs.
pub fn setup() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn ints(values: &[i64]) -> Vec<Value> {
    values.iter().copied().map(Value::Int).collect()
}

pub fn row(n: i64) -> Arc<DynamicObject> {
    Arc::new(DynamicObject::new("Row").with("N", n))
}

pub fn n_of(item: &Value) -> Option<i64> {
    item.as_object()?.property("N")?.as_int()
}

pub fn ns(items: &[Value]) -> Vec<i64> {
    items.iter().filter_map(n_of).collect()
}

pub fn record_changes(view: &dyn CollectionView) -> Arc<Mutex<Vec<CollectionChange>>> {
    let changes = Arc::new(Mutex::new(Vec::new()));
    let changes_clone = changes.clone();
    view.signals()
        .collection_changed
        .connect(move |change| changes_clone.lock().push(change.clone()));
    changes
}

pub fn record_properties(view: &dyn CollectionView) -> Arc<Mutex<Vec<String>>> {
    let properties = Arc::new(Mutex::new(Vec::new()));
    let properties_clone = properties.clone();
    view.signals()
        .property_changed
        .connect(move |name| properties_clone.lock().push(name.clone()));
    properties
}

/// Deterministic pseudo-random numbers for operation sequences.
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed.wrapping_mul(2862933555777941757).wrapping_add(3037000493))
    }

    /// A number in `0..bound` (0 when `bound` is 0).
    pub fn below(&mut self, bound: usize) -> usize {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        if bound == 0 {
            0
        } else {
            ((self.0 >> 33) as usize) % bound
        }
    }
}
