//! Integration tests for observable objects and lists working together.

use std::sync::Arc;

use lattice_data_core::{
    ALL_PROPERTIES, CollectionChange, DataObject, DynamicObject, EditableObject, ListError,
    ObservableList, PropertyError, Value,
};
use parking_lot::Mutex;

fn setup() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn record(object: &DynamicObject) -> Arc<Mutex<Vec<String>>> {
    let names = Arc::new(Mutex::new(Vec::new()));
    let names_clone = names.clone();
    object
        .changed_signal()
        .connect(move |name| names_clone.lock().push(name.clone()));
    names
}

#[test]
fn test_edit_transaction_round_trip() {
    setup();
    let person = DynamicObject::new("Person").with("Name", "Ada").with("Age", 36);
    let changes = record(&person);

    person.begin_edit();
    assert!(person.is_editing());
    person.set_property("Name", Value::from("Grace")).unwrap();
    person.set_property("Age", Value::Int(45)).unwrap();
    person.cancel_edit();

    assert!(!person.is_editing());
    assert_eq!(person.get("Name"), Some(Value::from("Ada")));
    assert_eq!(person.get("Age"), Some(Value::Int(36)));
    assert_eq!(*changes.lock(), vec!["Name", "Age", ALL_PROPERTIES]);

    person.begin_edit();
    person.set("Name", "Lin");
    person.end_edit();
    person.cancel_edit();
    assert_eq!(person.get("Name"), Some(Value::from("Lin")));
}

#[test]
fn test_unknown_member_is_not_created_through_data_object() {
    setup();
    let person = DynamicObject::new("Person").with("Name", "Ada");
    assert_eq!(
        person.set_property("Nickname", Value::from("A")),
        Err(PropertyError::not_found("Person", "Nickname"))
    );
    assert!(person.property("Nickname").is_none());

    person.set("Nickname", "A");
    assert_eq!(person.property("Nickname"), Some(Value::from("A")));
}

#[test]
fn test_unchanged_value_is_silent() {
    setup();
    let person = DynamicObject::new("Person").with("Name", "Ada");
    let changes = record(&person);
    person.set("Name", "Ada");
    assert!(changes.lock().is_empty());
}

#[test]
fn test_list_of_objects_uses_identity() {
    setup();
    let first = Arc::new(DynamicObject::new("Row").with("N", 1));
    let twin = Arc::new(DynamicObject::new("Row").with("N", 1));
    let list = ObservableList::new(vec![Value::object(first.clone()), Value::object(twin.clone())]);

    assert_eq!(list.index_of(&Value::object(twin.clone())), Some(1));
    assert!(list.remove(&Value::object(first)).unwrap());
    assert_eq!(list.to_vec(), vec![Value::object(twin)]);
}

#[test]
fn test_fixed_list_allows_replacement_only() {
    setup();
    let list = ObservableList::fixed(vec![Value::Int(1), Value::Int(2)]);
    let changes = Arc::new(Mutex::new(Vec::new()));
    let changes_clone = changes.clone();
    list.collection_changed
        .connect(move |change| changes_clone.lock().push(change.clone()));

    assert_eq!(list.push(3), Err(ListError::FixedSize));
    assert_eq!(list.remove_at(0), Err(ListError::FixedSize));
    assert_eq!(list.set_items(vec![Value::Int(9)]), Err(ListError::FixedSize));
    assert_eq!(list.set(1, 5).unwrap(), Value::Int(2));
    list.set_items(vec![Value::Int(7), Value::Int(8)]).unwrap();

    assert_eq!(
        *changes.lock(),
        vec![
            CollectionChange::Replace {
                index: 1,
                old: Value::Int(2),
                new: Value::Int(5),
            },
            CollectionChange::Reset,
        ]
    );
}

#[test]
fn test_slot_may_mutate_list_during_emit() {
    setup();
    let list = Arc::new(ObservableList::new(Vec::new()));
    let weak = Arc::downgrade(&list);
    list.collection_changed.connect(move |change| {
        if let (CollectionChange::Add { item, .. }, Some(list)) = (change, weak.upgrade()) {
            if *item == Value::Int(1) {
                list.push(2).unwrap();
            }
        }
    });

    list.push(1).unwrap();
    assert_eq!(list.to_vec(), vec![Value::Int(1), Value::Int(2)]);
}
