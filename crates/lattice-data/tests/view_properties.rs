//! Integration tests for the invariants views keep across source changes.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use common::{Lcg, ints, setup};
use lattice_data::{
    CollectionChange, CollectionView, CurrentItemSource, FnGroupDescription, GroupName, ListCollectionView,
    ObservableList, SortDescription, Value,
};
use parking_lot::Mutex;

fn random_list(rng: &mut Lcg) -> Arc<ObservableList> {
    let len = rng.below(25);
    let items = (0..len).map(|_| Value::Int(rng.below(10) as i64)).collect();
    Arc::new(ObservableList::new(items))
}

/// Apply one random add, remove, replace or reset to `list`.
fn random_change(list: &ObservableList, rng: &mut Lcg) {
    let len = list.len();
    match rng.below(10) {
        0..=3 => {
            let index = rng.below(len + 1);
            list.insert(index, rng.below(10) as i64).unwrap();
        }
        4..=6 if len > 0 => {
            list.remove_at(rng.below(len)).unwrap();
        }
        7 | 8 if len > 0 => {
            let index = rng.below(len);
            list.set(index, rng.below(10) as i64).unwrap();
        }
        9 => {
            let items = (0..rng.below(8)).map(|_| Value::Int(rng.below(10) as i64)).collect();
            list.set_items(items).unwrap();
        }
        _ => list.push(rng.below(10) as i64).unwrap(),
    }
}

fn assert_cursor_in_bounds(view: &ListCollectionView) {
    let position = view.current_position();
    let count = view.count() as isize;
    assert!((-1..=count).contains(&position), "position {position} outside -1..={count}");
    if (0..count).contains(&position) {
        assert_eq!(view.current_item(), view.item_at(position as usize));
    } else {
        assert!(view.current_item().is_none());
    }
}

fn parity() -> FnGroupDescription {
    FnGroupDescription::new(|item, _, _| GroupName::Single(Value::Int(item.as_int().unwrap_or(0) % 2)))
}

#[test]
fn test_filter_keeps_source_order() {
    setup();
    for seed in 0..20 {
        let mut rng = Lcg::new(seed);
        let list = random_list(&mut rng);
        let modulus = 2 + rng.below(3) as i64;
        let view = ListCollectionView::new(list.clone());
        view.set_filter_fn(move |v| v.as_int().is_some_and(|n| n % modulus == 0))
            .unwrap();

        for _ in 0..40 {
            let expected: Vec<Value> = list
                .to_vec()
                .into_iter()
                .filter(|v| v.as_int().is_some_and(|n| n % modulus == 0))
                .collect();
            assert_eq!(view.items(), expected, "seed {seed}");
            random_change(&list, &mut rng);
        }
        view.refresh().unwrap();
        let expected: Vec<Value> = list
            .to_vec()
            .into_iter()
            .filter(|v| v.as_int().is_some_and(|n| n % modulus == 0))
            .collect();
        assert_eq!(view.items(), expected, "seed {seed} after refresh");
    }
}

#[test]
fn test_sort_keeps_adjacent_pairs_ordered() {
    setup();
    for seed in 0..20 {
        let mut rng = Lcg::new(100 + seed);
        let list = random_list(&mut rng);
        let descending = seed % 2 == 1;
        let description = if descending {
            SortDescription::descending("")
        } else {
            SortDescription::ascending("")
        };
        let view = ListCollectionView::builder(list.clone())
            .sort_by(description)
            .build()
            .unwrap();

        for _ in 0..40 {
            random_change(&list, &mut rng);
            let items: Vec<i64> = view.items().iter().filter_map(Value::as_int).collect();
            for pair in items.windows(2) {
                if descending {
                    assert!(pair[0] >= pair[1], "seed {seed}: {items:?}");
                } else {
                    assert!(pair[0] <= pair[1], "seed {seed}: {items:?}");
                }
            }
            assert_eq!(items.len(), list.len());
        }
    }
}

#[test]
fn test_group_count_matches_view() {
    setup();
    for seed in 0..20 {
        let mut rng = Lcg::new(200 + seed);
        let list = random_list(&mut rng);
        let view = ListCollectionView::builder(list.clone())
            .group_by(parity())
            .build()
            .unwrap();

        for _ in 0..40 {
            random_change(&list, &mut rng);
            let root = view.groups().unwrap();
            assert_eq!(root.item_count, view.count(), "seed {seed}");
            assert_eq!(view.count(), list.len());
            for group in root.groups() {
                assert!(group.is_bottom_level);
                assert!(group.leaves().iter().all(|leaf| {
                    Value::Int(leaf.as_int().unwrap_or(0) % 2) == group.name
                }));
            }
        }
    }
}

/// A copy of the view kept up to date from its notifications alone.
fn replayed(view: &Arc<ListCollectionView>) -> Arc<Mutex<Vec<Value>>> {
    let shadow = Arc::new(Mutex::new(view.items()));
    let shadow_clone = shadow.clone();
    let weak = Arc::downgrade(view);
    view.signals().collection_changed.connect(move |change| {
        let mut shadow = shadow_clone.lock();
        match change {
            CollectionChange::Add { index, item } => shadow.insert(*index, item.clone()),
            CollectionChange::Remove { index, .. } => {
                shadow.remove(*index);
            }
            CollectionChange::Replace { index, new, .. } => shadow[*index] = new.clone(),
            CollectionChange::Reset => {
                if let Some(view) = weak.upgrade() {
                    *shadow = view.items();
                }
            }
        }
    });
    shadow
}

#[test]
fn test_grouped_order_is_independent_of_history() {
    setup();
    for seed in 0..30 {
        let mut rng = Lcg::new(400 + seed);
        let list = random_list(&mut rng);
        let configure = |list: Arc<ObservableList>| {
            let builder = ListCollectionView::builder(list).group_by(parity());
            let builder = match seed % 3 {
                0 => builder,
                1 => builder.sort_by(SortDescription::descending("")),
                _ => builder.filter(|v| v.as_int().is_some_and(|n| n != 4)),
            };
            builder.build().unwrap()
        };
        let view = configure(list.clone());
        let shadow = replayed(&view);

        for step in 0..60 {
            random_change(&list, &mut rng);
            let fresh = configure(Arc::new(ObservableList::new(list.to_vec())));
            assert_eq!(view.items(), fresh.items(), "seed {seed} step {step}");
            assert_eq!(*shadow.lock(), view.items(), "seed {seed} step {step}");
        }
        let items = view.items();
        view.refresh().unwrap();
        assert_eq!(view.items(), items, "seed {seed} after refresh");
    }
}

#[test]
fn test_changes_made_by_handlers_replay_in_order() {
    setup();
    let list = Arc::new(ObservableList::empty());
    let view = ListCollectionView::builder(list.clone())
        .group_by(FnGroupDescription::new(|item, _, _| {
            if *item == Value::Int(5) {
                GroupName::Multiple(vec![Value::from("a"), Value::from("b")])
            } else {
                GroupName::Single(Value::from("a"))
            }
        }))
        .build()
        .unwrap();
    let shadow = replayed(&view);

    let pushed = AtomicBool::new(false);
    let list_clone = list.clone();
    view.signals().collection_changed.connect(move |change| {
        let five = matches!(change, CollectionChange::Add { item, .. } if *item == Value::Int(5));
        if five && !pushed.swap(true, Ordering::SeqCst) {
            list_clone.push(1).unwrap();
        }
    });

    list.push(5).unwrap();
    assert_eq!(view.items(), ints(&[5, 1, 5]));
    assert_eq!(*shadow.lock(), view.items());
}

#[test]
fn test_cursor_stays_in_bounds() {
    setup();
    for seed in 0..20 {
        let mut rng = Lcg::new(300 + seed);
        let list = random_list(&mut rng);
        let view = match seed % 3 {
            0 => ListCollectionView::new(list.clone()),
            1 => ListCollectionView::builder(list.clone())
                .filter(|v| v.as_int().is_some_and(|n| n > 2))
                .sort_by(SortDescription::ascending(""))
                .build()
                .unwrap(),
            _ => ListCollectionView::builder(list.clone())
                .group_by(parity())
                .build()
                .unwrap(),
        };

        for step in 0..60 {
            if step % 7 == 0 {
                let target = rng.below(view.count() + 2) as isize - 1;
                view.move_current_to_position(target).unwrap();
            }
            random_change(&list, &mut rng);
            assert_cursor_in_bounds(&view);
        }
    }
}

#[test]
fn test_refresh_is_idempotent() {
    setup();
    let list = Arc::new(ObservableList::new(ints(&[5, 3, 8, 1, 4, 7, 2])));
    let view = ListCollectionView::builder(list)
        .filter(|v| *v != Value::Int(7))
        .sort_by(SortDescription::descending(""))
        .group_by(parity())
        .build()
        .unwrap();
    view.move_current_to_position(2).unwrap();

    view.refresh().unwrap();
    let (items, groups, position) = (view.items(), view.groups(), view.current_position());
    view.refresh().unwrap();
    assert_eq!(view.items(), items);
    assert_eq!(view.groups(), groups);
    assert_eq!(view.current_position(), position);
    assert_eq!(position, 2);
}

#[test]
fn test_filter_sort_scenario() {
    setup();
    let list = Arc::new(ObservableList::new(ints(&[1, 2, 3, 4, 5])));
    let view = ListCollectionView::builder(list)
        .filter(|v| v.as_int().is_some_and(|n| n % 2 == 0))
        .sort_by(SortDescription::descending(""))
        .build()
        .unwrap();

    assert_eq!(view.items(), ints(&[4, 2]));
    view.move_current_to_first();
    assert_eq!(view.current_position(), 0);
    assert_eq!(view.current_item(), Some(Value::Int(4)));
}

#[test]
fn test_parity_grouping_scenario() {
    setup();
    let list = Arc::new(ObservableList::new(ints(&[1, 2, 3, 4])));
    let view = ListCollectionView::builder(list)
        .group_by(parity())
        .build()
        .unwrap();

    let root = view.groups().unwrap();
    assert_eq!(root.item_count, 4);
    let names: Vec<Value> = root.groups().map(|g| g.name.clone()).collect();
    assert_eq!(names, ints(&[1, 0]));
    for group in root.groups() {
        assert!(group.is_bottom_level);
        assert_eq!(group.item_count, 2);
        assert_eq!(group.leaves().len(), 2);
    }
    assert_eq!(root.group(&Value::Int(0)).unwrap().leaves(), ints(&[2, 4]));
}

#[test]
fn test_reset_keeps_cursor_on_item() {
    setup();
    let list = Arc::new(ObservableList::new(ints(&[1, 2, 3])));
    let view = ListCollectionView::new(list.clone());
    view.move_current_to(&Value::Int(3));

    list.set_items(ints(&[3, 9])).unwrap();
    assert_eq!(view.current_position(), 0);
    assert_eq!(view.current_item(), Some(Value::Int(3)));

    view.move_current_to_position(2).unwrap();
    list.set_items(ints(&[4, 5, 6])).unwrap();
    assert!(view.is_current_after_last());
    assert_eq!(view.current_position(), 3);
}
