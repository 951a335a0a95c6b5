//! Integration tests for view sources and for paths bound through views.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::setup;
use lattice_data::{
    CollectionView, CollectionViewSource, CurrentItemSource, DataObject, DynamicObject,
    ListCollectionView, ObservableList, PathBinding, PathWalker, PropertyGroupDescription,
    SortDescription, Value, ViewSettings, ViewSourceItems,
};

fn person(name: &str, age: i64) -> Arc<DynamicObject> {
    Arc::new(DynamicObject::new("Person").with("Name", name).with("Age", age))
}

fn people(entries: &[(&str, i64)]) -> Arc<ObservableList> {
    Arc::new(ObservableList::new(
        entries
            .iter()
            .map(|&(name, age)| Value::object(person(name, age)))
            .collect(),
    ))
}

fn names(view: &dyn CollectionView) -> Vec<String> {
    view.items()
        .iter()
        .filter_map(|item| item.as_object()?.property("Name"))
        .map(|name| name.to_display_string())
        .collect()
}

#[test]
fn test_binding_follows_view_cursor() {
    setup();
    let view = ListCollectionView::new(people(&[("Ada", 36), ("Grace", 45)]));
    let binding = PathBinding::builder("Name")
        .fallback_value("(none)")
        .build()
        .unwrap();
    binding.set_root(Value::object(view.clone()));
    assert_eq!(binding.value(), Value::from("Ada"));

    view.move_current_to_next();
    assert_eq!(binding.value(), Value::from("Grace"));

    view.move_current_to_next();
    assert!(view.is_current_after_last());
    assert!(binding.is_broken());
    assert_eq!(binding.value(), Value::from("(none)"));
}

#[test]
fn test_view_member_binds_to_view_itself() {
    setup();
    let list = people(&[("Ada", 36), ("Grace", 45)]);
    let view = ListCollectionView::new(list.clone());
    let binding = PathBinding::builder("Count").build().unwrap();
    binding.set_root(Value::object(view.clone()));
    assert_eq!(binding.value(), Value::Int(2));

    list.push(Value::object(person("Lin", 29))).unwrap();
    assert_eq!(binding.value(), Value::Int(3));
}

#[test]
fn test_binding_writes_through_current_item() {
    setup();
    let list = people(&[("Ada", 36), ("Grace", 45)]);
    let view = ListCollectionView::new(list.clone());
    view.move_current_to_last();
    let binding = PathBinding::builder("Name").build().unwrap();
    binding.set_root(Value::object(view.clone()));

    assert!(binding.update_source(Value::from("Hopper")).unwrap());
    let current = view.current_item().unwrap();
    assert_eq!(current.as_object().unwrap().property("Name"), Some(Value::from("Hopper")));
    assert_eq!(binding.value(), Value::from("Hopper"));
}

#[test]
fn test_cursor_follows_sorted_view() {
    setup();
    let list = people(&[("Grace", 45), ("Ada", 36), ("Lin", 29)]);
    let view = ListCollectionView::builder(list)
        .sort_by(SortDescription::ascending("Age"))
        .build()
        .unwrap();
    let walker = PathWalker::new("Age").unwrap();
    walker.update(Value::object(view.clone()));
    assert_eq!(names(view.as_ref()), vec!["Lin", "Ada", "Grace"]);
    assert_eq!(view.current_position(), 2);
    assert_eq!(walker.value(), Value::Int(45));

    view.move_current_to_first();
    assert_eq!(walker.value(), Value::Int(29));
}

#[test]
fn test_view_source_path_reresolves_on_replacement() {
    setup();
    let cvs = CollectionViewSource::new();
    cvs.set_sort_descriptions(vec![SortDescription::ascending("Name")])
        .unwrap();
    let first = people(&[("Grace", 45), ("Ada", 36)]);
    cvs.set_source(Some(first.clone().into())).unwrap();

    let walker = PathWalker::new("View.Name").unwrap();
    walker.update(Value::object(cvs.clone()));
    assert_eq!(walker.value(), Value::from("Grace"));

    let old_view = cvs.view().unwrap();
    let current = old_view.current_item().unwrap();
    let current_object = current.as_object().unwrap().clone();
    assert_eq!(old_view.signals().current_changed.connection_count(), 1);
    assert_eq!(current_object.property_changed().unwrap().connection_count(), 1);

    cvs.set_source(Some(people(&[("Lin", 29), ("Hopper", 85)]).into()))
        .unwrap();
    assert_eq!(walker.value(), Value::from("Lin"));
    assert_eq!(old_view.signals().current_changed.connection_count(), 0);
    assert_eq!(current_object.property_changed().unwrap().connection_count(), 0);

    let new_view = cvs.view().unwrap();
    assert_eq!(names(new_view.as_ref()), vec!["Hopper", "Lin"]);
    assert_eq!(new_view.signals().current_changed.connection_count(), 1);
    new_view.move_current_to_first();
    assert_eq!(walker.value(), Value::from("Hopper"));
    new_view.move_current_to_last();
    new_view.move_current_to_next();
    assert!(walker.is_broken());
}

#[test]
fn test_view_source_without_items_breaks_path() {
    setup();
    let cvs = CollectionViewSource::new();
    let walker = PathWalker::new("View.Name").unwrap();
    walker.update(Value::object(cvs.clone()));
    assert!(walker.is_broken());

    cvs.set_source(Some(people(&[("Ada", 36)]).into())).unwrap();
    assert_eq!(walker.value(), Value::from("Ada"));

    cvs.set_source(None).unwrap();
    assert!(walker.is_broken());
}

#[test]
fn test_view_source_wraps_external_view() {
    setup();
    let list = people(&[("Grace", 45), ("Ada", 36)]);
    let view = ListCollectionView::new(list);
    let cvs = CollectionViewSource::new();
    cvs.set_source(Some(ViewSourceItems::View(view.clone()))).unwrap();

    let wrapped = cvs.view().unwrap();
    assert_eq!(names(wrapped.as_ref()), vec!["Grace", "Ada"]);
    wrapped.move_current_to_last();
    assert_eq!(view.current_position(), 1);
}

#[test]
fn test_nested_path_scenario() {
    setup();
    let address = Arc::new(DynamicObject::new("Address").with("City", "Oslo"));
    let customer = Arc::new(DynamicObject::new("Customer").with("Address", Value::object(address.clone())));
    let order = Arc::new(DynamicObject::new("Order").with("Customer", Value::object(customer.clone())));
    let binding = PathBinding::builder("Customer.Address.City")
        .fallback_value("?")
        .build()
        .unwrap();
    binding.set_root(Value::object(order.clone()));
    assert_eq!(binding.value(), Value::from("Oslo"));

    customer.set("Address", Value::Null);
    assert_eq!(binding.value(), Value::from("?"));
    assert_eq!(address.changed_signal().connection_count(), 0);

    let notified = Arc::new(AtomicUsize::new(0));
    let notified_clone = notified.clone();
    binding.walker().value_changed.connect(move |_| {
        notified_clone.fetch_add(1, Ordering::SeqCst);
    });
    let moved = Arc::new(DynamicObject::new("Address").with("City", "Bergen"));
    customer.set("Address", Value::object(moved.clone()));
    assert_eq!(binding.value(), Value::from("Bergen"));
    assert_eq!(notified.load(Ordering::SeqCst), 1);

    let other = Arc::new(DynamicObject::new("Customer").with("Address", Value::object(address.clone())));
    order.set("Customer", Value::object(other));
    assert_eq!(binding.value(), Value::from("Oslo"));
    assert_eq!(customer.changed_signal().connection_count(), 0);
    assert_eq!(moved.changed_signal().connection_count(), 0);
}

#[test]
fn test_settings_carry_between_views() {
    setup();
    let source_view = ListCollectionView::builder(people(&[("Ada", 36)]))
        .sort_by(SortDescription::descending("Age"))
        .group_by(PropertyGroupDescription::new("Age").unwrap())
        .build()
        .unwrap();
    let json = serde_json::to_string(&ViewSettings::capture(source_view.as_ref())).unwrap();

    let settings: ViewSettings = serde_json::from_str(&json).unwrap();
    let target = ListCollectionView::new(people(&[("Lin", 29), ("Grace", 45), ("Ada", 36)]));
    settings.apply(target.as_ref()).unwrap();

    assert_eq!(names(target.as_ref()), vec!["Grace", "Ada", "Lin"]);
    let root = target.groups().unwrap();
    assert_eq!(root.groups().count(), 3);
    assert_eq!(ViewSettings::capture(target.as_ref()), settings);
}
