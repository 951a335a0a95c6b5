//! The collection view over an [`ObservableList`].

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use lattice_data_core::logging::{span_names, targets};
use lattice_data_core::{
    CollectionChange, ConnectionId, CurrentItemSource, Culture, DataObject, EditableObject,
    ObservableList, PerfSpan, Signal, TreeFormatOptions, Value,
};
use parking_lot::Mutex;

use super::property_names as names;
use super::{
    CollectionView, CurrentChangingArgs, DeferRefreshGuard, DeferTarget, EditableCollectionView,
    FilterFn, ViewSignals,
};
use crate::error::{Result, ViewError};
use crate::group::{CollectionViewGroup, GroupDescription, GroupTree, LeafOrder};
use crate::sort::{SortDescription, SortFieldComparer};

fn editable_of(item: &Value) -> Option<&dyn EditableObject> {
    item.as_object().and_then(|object| object.editable())
}

struct ViewState {
    filter: Option<FilterFn>,
    sort: Vec<SortDescription>,
    comparer: Option<SortFieldComparer>,
    groups: Vec<Arc<dyn GroupDescription>>,
    culture: Culture,
    /// Materialized presentation; `None` while the view mirrors the source.
    staging: Option<Vec<Value>>,
    /// Source length as of the last notification processed while mirroring.
    mirrored_len: usize,
    tree: Option<GroupTree>,
    position: isize,
    current: Option<Value>,
    new_item: Option<Value>,
    /// Set while `add_new` appends its item to the source.
    pushing_new: bool,
    edit_item: Option<Value>,
    defer_level: usize,
    needs_refresh: bool,
}

impl ViewState {
    fn new() -> Self {
        Self {
            filter: None,
            sort: Vec::new(),
            comparer: None,
            groups: Vec::new(),
            culture: Culture::invariant(),
            staging: None,
            mirrored_len: 0,
            tree: None,
            position: -1,
            current: None,
            new_item: None,
            pushing_new: false,
            edit_item: None,
            defer_level: 0,
            needs_refresh: false,
        }
    }

    fn uses_staging(&self) -> bool {
        self.filter.is_some() || self.comparer.is_some() || !self.groups.is_empty()
    }

    fn passes(&self, item: &Value) -> bool {
        self.filter.as_ref().is_none_or(|filter| filter(item))
    }

    fn is_busy(&self) -> bool {
        self.new_item.is_some() || self.edit_item.is_some()
    }

    fn resync_staging(&mut self) {
        if let Some(tree) = &self.tree {
            self.staging = Some(tree.flatten());
        }
    }
}

/// What one state transition produced, besides the state diff itself.
#[derive(Default)]
struct Changes {
    collection: Vec<CollectionChange>,
    /// The current item was replaced in place.
    reannounce: bool,
    /// The grouping tree was changed incrementally.
    regrouped: bool,
    properties: Vec<&'static str>,
}

/// The observable part of the state, compared before and after a transition.
struct Observed {
    count: usize,
    position: isize,
    current: Option<Value>,
    add_item: Option<Value>,
    edit_item: Option<Value>,
    can_cancel_edit: bool,
}

impl Observed {
    fn before_first(&self) -> bool {
        self.count == 0 || self.position < 0
    }

    fn after_last(&self) -> bool {
        self.count == 0 || self.position >= self.count as isize
    }
}

enum ViewEvent {
    CurrentChanging,
    Collection(CollectionChange),
    CurrentChanged,
    Property(&'static str),
}

fn compose(before: &Observed, after: &Observed, changes: Changes) -> Vec<ViewEvent> {
    let mut events = Vec::new();
    let moved = changes.reannounce
        || before.position != after.position
        || before.current != after.current;
    if moved {
        events.push(ViewEvent::CurrentChanging);
    }
    events.extend(changes.collection.into_iter().map(ViewEvent::Collection));
    if moved {
        events.push(ViewEvent::CurrentChanged);
    }

    let mut properties: Vec<&'static str> = Vec::new();
    let mut note = |changed: bool, name: &'static str| {
        if changed {
            properties.push(name);
        }
    };
    note(before.count != after.count, names::COUNT);
    note((before.count == 0) != (after.count == 0), names::IS_EMPTY);
    note(changes.reannounce || before.current != after.current, names::CURRENT_ITEM);
    note(before.position != after.position, names::CURRENT_POSITION);
    note(before.before_first() != after.before_first(), names::IS_CURRENT_BEFORE_FIRST);
    note(before.after_last() != after.after_last(), names::IS_CURRENT_AFTER_LAST);
    note(before.add_item.is_some() != after.add_item.is_some(), names::IS_ADDING_NEW);
    note(before.add_item != after.add_item, names::CURRENT_ADD_ITEM);
    note(before.edit_item.is_some() != after.edit_item.is_some(), names::IS_EDITING_ITEM);
    note(before.edit_item != after.edit_item, names::CURRENT_EDIT_ITEM);
    note(before.can_cancel_edit != after.can_cancel_edit, names::CAN_CANCEL_EDIT);
    for name in changes.properties {
        if !properties.contains(&name) {
            properties.push(name);
        }
    }
    events.extend(properties.into_iter().map(ViewEvent::Property));
    events
}

/// Clears a busy flag when dropped, even by unwinding.
struct BusyFlag<'a>(&'a AtomicBool);

impl Drop for BusyFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// A filtered, sorted and grouped view over an [`ObservableList`], with a
/// cursor and add/edit transactions.
///
/// Without a filter, sort or grouping the view mirrors the list directly and
/// forwards its changes unchanged. Otherwise it keeps its own ordered copy of
/// the visible items (and a [`GroupTree`] when grouping) and maps every source
/// change onto it incrementally.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use lattice_data::{CollectionView, ListCollectionView, SortDescription};
/// use lattice_data_core::{ObservableList, Value};
///
/// let list = Arc::new(ObservableList::new((1..=5).map(Value::from).collect()));
/// let view = ListCollectionView::builder(list.clone())
///     .filter(|v| v.as_int().is_some_and(|n| n % 2 == 0))
///     .sort_by(SortDescription::descending(""))
///     .build()
///     .unwrap();
///
/// assert_eq!(view.items(), vec![Value::Int(4), Value::Int(2)]);
/// list.push(6).unwrap();
/// assert_eq!(view.items(), vec![Value::Int(6), Value::Int(4), Value::Int(2)]);
/// ```
pub struct ListCollectionView {
    source: Arc<ObservableList>,
    state: Mutex<ViewState>,
    refreshing: AtomicBool,
    /// Events waiting for delivery, in the order their transitions ran.
    events: Mutex<VecDeque<ViewEvent>>,
    dispatching: AtomicBool,
    source_connection: Mutex<Option<ConnectionId>>,
    this: Weak<ListCollectionView>,
    signals: ViewSignals,
}

impl ListCollectionView {
    /// Create a view over `source`, with the cursor on the first item.
    pub fn new(source: Arc<ObservableList>) -> Arc<Self> {
        let view = Arc::new_cyclic(|this: &Weak<ListCollectionView>| Self {
            source,
            state: Mutex::new(ViewState::new()),
            refreshing: AtomicBool::new(false),
            events: Mutex::new(VecDeque::new()),
            dispatching: AtomicBool::new(false),
            source_connection: Mutex::new(None),
            this: this.clone(),
            signals: ViewSignals::new(),
        });

        let weak = view.this.clone();
        let id = view.source.collection_changed.connect(move |change| {
            if let Some(view) = weak.upgrade() {
                view.on_source_changed(change);
            }
        });
        *view.source_connection.lock() = Some(id);

        {
            let mut state = view.state.lock();
            state.mirrored_len = view.source.len();
            let first = if view.source.is_empty() { -1 } else { 0 };
            view.set_cursor(&mut state, first);
        }
        tracing::debug!(target: targets::VIEW, count = view.source.len(), "list collection view created");
        view
    }

    /// Start configuring a view over `source`.
    pub fn builder(source: Arc<ObservableList>) -> ListCollectionViewBuilder {
        ListCollectionViewBuilder::new(source)
    }

    /// Set the filter from a closure.
    pub fn set_filter_fn<F>(&self, filter: F) -> Result<()>
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.set_filter(Some(Arc::new(filter)))
    }

    /// Render the grouping tree, when grouping is active.
    pub fn dump_groups(&self, options: &TreeFormatOptions) -> Option<String> {
        self.state.lock().tree.as_ref().map(|tree| tree.dump(options))
    }

    // =========================================================================
    // State access
    // =========================================================================

    fn count_in(&self, state: &ViewState) -> usize {
        match &state.staging {
            Some(staging) => staging.len(),
            None => state.mirrored_len,
        }
    }

    fn item_in(&self, state: &ViewState, index: usize) -> Option<Value> {
        match &state.staging {
            Some(staging) => staging.get(index).cloned(),
            None => self.source.get(index),
        }
    }

    fn index_in(&self, state: &ViewState, item: &Value) -> Option<usize> {
        match &state.staging {
            Some(staging) => staging.iter().position(|v| v == item),
            None => self.source.index_of(item),
        }
    }

    fn last_index_in(&self, state: &ViewState, item: &Value) -> Option<usize> {
        match &state.staging {
            Some(staging) => staging.iter().rposition(|v| v == item),
            None => self.source.last_index_of(item),
        }
    }

    fn observe(&self, state: &ViewState) -> Observed {
        Observed {
            count: self.count_in(state),
            position: state.position,
            current: state.current.clone(),
            add_item: state.new_item.clone(),
            edit_item: state.edit_item.clone(),
            can_cancel_edit: state
                .edit_item
                .as_ref()
                .is_some_and(|item| editable_of(item).is_some()),
        }
    }

    /// Run a state transition and then emit what it changed.
    fn mutate<R>(&self, f: impl FnOnce(&Self, &mut ViewState, &mut Changes) -> R) -> R {
        let (result, events) = {
            let mut state = self.state.lock();
            let before = self.observe(&state);
            let mut changes = Changes::default();
            let result = f(self, &mut state, &mut changes);
            if std::mem::take(&mut changes.regrouped) && !self.groups_in_order(&state) {
                tracing::debug!(target: targets::VIEW, "group order changed; rebuilding groups");
                self.rebuild(&mut state, &mut changes);
            }
            let after = self.observe(&state);
            (result, compose(&before, &after, changes))
        };
        self.dispatch(events);
        result
    }

    /// Queue `events` and deliver the queue unless a delivery is already
    /// running further up the stack. Events raised by handlers are delivered
    /// after the ones already queued.
    fn dispatch(&self, events: Vec<ViewEvent>) {
        self.events.lock().extend(events);
        loop {
            if self.dispatching.swap(true, Ordering::SeqCst) {
                return;
            }
            {
                let _dispatching = BusyFlag(&self.dispatching);
                self.drain_events();
            }
            if self.events.lock().is_empty() {
                return;
            }
        }
    }

    fn drain_events(&self) {
        let mut suppress_current_changed = false;
        loop {
            let next = self.events.lock().pop_front();
            let Some(event) = next else {
                return;
            };
            match event {
                ViewEvent::CurrentChanging => {
                    let args = CurrentChangingArgs::new();
                    self.signals.current_changing.emit(args.clone());
                    suppress_current_changed = args.is_canceled();
                }
                ViewEvent::Collection(change) => self.signals.collection_changed.emit(change),
                ViewEvent::CurrentChanged => {
                    if std::mem::take(&mut suppress_current_changed) {
                        tracing::trace!(target: targets::VIEW, "current change canceled");
                    } else {
                        self.signals.current_changed.emit(());
                    }
                }
                ViewEvent::Property(name) => self.signals.property_changed.emit(name.to_string()),
            }
        }
    }

    fn ensure_not_busy(&self, operation: &str) -> Result<()> {
        if self.state.lock().is_busy() {
            return Err(ViewError::invalid_operation(format!(
                "{operation} is not allowed during AddNew or EditItem"
            )));
        }
        Ok(())
    }

    fn ensure_not_deferred(&self, operation: &str) -> Result<()> {
        if self.state.lock().defer_level > 0 {
            return Err(ViewError::invalid_operation(format!(
                "{operation} is not allowed while refresh is deferred"
            )));
        }
        Ok(())
    }

    // =========================================================================
    // Cursor
    // =========================================================================

    fn set_cursor(&self, state: &mut ViewState, position: isize) {
        let count = self.count_in(state) as isize;
        let position = position.clamp(-1, count);
        state.position = position;
        state.current = if (0..count).contains(&position) {
            self.item_in(state, position as usize)
        } else {
            None
        };
    }

    fn after_add(&self, state: &mut ViewState, index: usize) {
        let position = state.position;
        if index as isize <= position {
            self.set_cursor(state, position + 1);
        }
    }

    /// `retreat` moves the cursor back when the removed item was current,
    /// instead of leaving it on the item that took its place.
    fn after_remove(&self, state: &mut ViewState, index: usize, retreat: bool) {
        let position = state.position;
        let index = index as isize;
        if index < position || (index == position && retreat) {
            self.set_cursor(state, position - 1);
        } else if index == position {
            self.set_cursor(state, position);
        }
    }

    fn is_current_in_view(&self) -> bool {
        let state = self.state.lock();
        (0..self.count_in(&state) as isize).contains(&state.position)
    }

    fn move_to(&self, position: isize) -> bool {
        let unchanged = {
            let state = self.state.lock();
            let item = usize::try_from(position)
                .ok()
                .and_then(|p| self.item_in(&state, p));
            state.position == position && state.current == item
        };
        if unchanged {
            return self.is_current_in_view();
        }

        self.mutate(|this, state, _| this.set_cursor(state, position));
        self.is_current_in_view()
    }

    fn groups_in_order(&self, state: &ViewState) -> bool {
        let Some(tree) = &state.tree else {
            return true;
        };
        match &state.comparer {
            Some(comparer) => tree.groups_in_order(LeafOrder::Sorted(comparer)),
            None => {
                let source = self.source.to_vec();
                tree.groups_in_order(LeafOrder::Source { index: 0, source: &source })
            }
        }
    }

    // =========================================================================
    // Staging maintenance
    // =========================================================================

    /// Number of leading `staged` items that also lead `source[..source_index]`.
    fn matched_prefix(&self, staged: &[Value], source_index: usize) -> usize {
        let mut matched = 0;
        for source_item in self.source.to_vec().iter().take(source_index) {
            if staged.get(matched) == Some(source_item) {
                matched += 1;
            }
        }
        matched
    }

    /// The visible items, without a pending new item at the tail.
    fn settled<'a>(&self, state: &'a ViewState) -> &'a [Value] {
        let staging = state.staging.as_deref().unwrap_or_default();
        let limit = staging
            .len()
            .saturating_sub(usize::from(state.new_item.is_some() && state.tree.is_none()));
        &staging[..limit]
    }

    /// Where `item`, found at `source_index` in the source, belongs in an
    /// ungrouped presentation.
    fn staging_position(&self, state: &ViewState, item: &Value, source_index: usize) -> usize {
        let settled = self.settled(state);
        match &state.comparer {
            Some(comparer) => comparer.insertion_index(settled, item),
            None => self.matched_prefix(settled, source_index),
        }
    }

    fn staged_index(&self, state: &ViewState, item: &Value, source_hint: Option<usize>) -> Option<usize> {
        let settled = self.settled(state);
        if let (None, Some(hint)) = (&state.comparer, source_hint) {
            let matched = self.matched_prefix(settled, hint);
            if settled.get(matched) == Some(item) {
                return Some(matched);
            }
        }
        settled.iter().position(|v| v == item)
    }

    fn insert_item(&self, state: &mut ViewState, item: &Value, source_index: usize, changes: &mut Changes) {
        let added = if let Some(tree) = state.tree.as_mut() {
            changes.regrouped = true;
            let source = self.source.to_vec();
            let order = match &state.comparer {
                Some(comparer) => LeafOrder::Sorted(comparer),
                None => LeafOrder::Source {
                    index: source_index,
                    source: &source,
                },
            };
            tree.add_in_subtree(item, &state.culture, &state.groups, order)
        } else {
            let position = self.staging_position(state, item, source_index);
            state
                .staging
                .get_or_insert_with(Vec::new)
                .insert(position, item.clone());
            vec![position]
        };
        state.resync_staging();
        for index in added {
            changes.collection.push(CollectionChange::Add {
                index,
                item: item.clone(),
            });
            self.after_add(state, index);
        }
    }

    fn remove_item(&self, state: &mut ViewState, item: &Value, source_hint: Option<usize>, changes: &mut Changes) {
        let removed = if let Some(tree) = state.tree.as_mut() {
            changes.regrouped = true;
            tree.remove_in_subtree(item)
        } else {
            match self.staged_index(state, item, source_hint) {
                Some(index) => {
                    if let Some(staging) = state.staging.as_mut() {
                        staging.remove(index);
                    }
                    vec![index]
                }
                None => Vec::new(),
            }
        };
        state.resync_staging();
        for index in removed {
            changes.collection.push(CollectionChange::Remove {
                index,
                item: item.clone(),
            });
            self.after_remove(state, index, false);
        }
    }

    /// Append a pending new item at the end of the presentation.
    fn append_pending(&self, state: &mut ViewState, item: &Value, changes: &mut Changes) {
        let index = match state.tree.as_mut() {
            Some(tree) => tree.append_root_leaf(item.clone()),
            None => {
                let staging = state.staging.get_or_insert_with(Vec::new);
                staging.push(item.clone());
                staging.len() - 1
            }
        };
        state.resync_staging();
        changes.collection.push(CollectionChange::Add {
            index,
            item: item.clone(),
        });
        self.after_add(state, index);
    }

    /// Take a pending new item out of the presentation, returning where it was.
    fn take_pending(&self, state: &mut ViewState, item: &Value) -> Option<usize> {
        let index = match state.tree.as_mut() {
            Some(tree) => tree.remove_root_leaf(item)?,
            None => {
                let staging = state.staging.as_mut()?;
                let index = staging.iter().rposition(|v| v == item)?;
                staging.remove(index);
                index
            }
        };
        state.resync_staging();
        Some(index)
    }

    /// Move a just-committed new item from the tail to its place.
    fn reseat_new(&self, state: &mut ViewState, item: &Value, changes: &mut Changes) {
        let was_current = state.current.as_ref() == Some(item);
        let Some(old_index) = self.take_pending(state, item) else {
            return;
        };
        let source_index = self.source.last_index_of(item);

        let Some(source_index) = source_index.filter(|_| state.passes(item)) else {
            changes.collection.push(CollectionChange::Remove {
                index: old_index,
                item: item.clone(),
            });
            self.after_remove(state, old_index, true);
            return;
        };

        if state.tree.is_none() {
            let position = self.staging_position(state, item, source_index);
            if position == old_index {
                if let Some(staging) = state.staging.as_mut() {
                    staging.insert(position, item.clone());
                }
                return;
            }
        }

        changes.collection.push(CollectionChange::Remove {
            index: old_index,
            item: item.clone(),
        });
        self.after_remove(state, old_index, false);
        self.insert_item(state, item, source_index, changes);
        self.follow(state, item, was_current);
    }

    /// Re-evaluate filter, sort position and groups of an edited item.
    fn reseat_edited(&self, state: &mut ViewState, item: &Value, changes: &mut Changes) {
        let was_current = state.current.as_ref() == Some(item);
        let source_index = self.source.index_of(item);
        let passes = source_index.is_some() && state.passes(item);

        if state.tree.is_some() {
            self.remove_item(state, item, source_index, changes);
            if let Some(source_index) = source_index.filter(|_| passes) {
                self.insert_item(state, item, source_index, changes);
            }
            self.follow(state, item, was_current);
            return;
        }

        match (self.staged_index(state, item, source_index), source_index) {
            (Some(_), _) if !passes => self.remove_item(state, item, source_index, changes),
            (Some(index), Some(source_index)) => {
                let Some(comparer) = &state.comparer else {
                    return;
                };
                let settled = self.settled(state);
                let after_previous = index == 0
                    || comparer.compare(&settled[index - 1], item) != std::cmp::Ordering::Greater;
                let before_next = index + 1 >= settled.len()
                    || comparer.compare(item, &settled[index + 1]) != std::cmp::Ordering::Greater;
                if after_previous && before_next {
                    return;
                }
                self.remove_item(state, item, Some(source_index), changes);
                self.insert_item(state, item, source_index, changes);
                self.follow(state, item, was_current);
            }
            (None, Some(source_index)) if passes => {
                self.insert_item(state, item, source_index, changes);
            }
            _ => {}
        }
    }

    /// Keep the cursor on `item` after it moved.
    fn follow(&self, state: &mut ViewState, item: &Value, was_current: bool) {
        if !was_current {
            return;
        }
        if let Some(index) = self.index_in(state, item) {
            self.set_cursor(state, index as isize);
        }
    }

    // =========================================================================
    // Source changes
    // =========================================================================

    fn on_source_changed(&self, change: &CollectionChange) {
        let _perf = PerfSpan::new(span_names::SOURCE_CHANGE);
        tracing::trace!(target: targets::VIEW, ?change, "source changed");

        if matches!(change, CollectionChange::Reset) {
            let run = {
                let mut state = self.state.lock();
                if state.defer_level > 0 || self.refreshing.load(Ordering::SeqCst) {
                    state.needs_refresh = true;
                    false
                } else {
                    true
                }
            };
            if run {
                self.run_refresh(true);
            }
            return;
        }

        self.mutate(|this, state, changes| {
            if state.defer_level > 0 || this.refreshing.load(Ordering::SeqCst) {
                state.needs_refresh = true;
                return;
            }
            match change {
                CollectionChange::Add { index, item } => this.source_added(state, *index, item, changes),
                CollectionChange::Remove { index, item } => {
                    this.source_removed(state, *index, item, changes)
                }
                CollectionChange::Replace { index, old, new } => {
                    this.source_replaced(state, *index, old, new, changes)
                }
                CollectionChange::Reset => {}
            }
        });
    }

    fn source_added(&self, state: &mut ViewState, index: usize, item: &Value, changes: &mut Changes) {
        let is_pending = std::mem::take(&mut state.pushing_new);
        if state.staging.is_none() {
            state.mirrored_len += 1;
            changes.collection.push(CollectionChange::Add {
                index,
                item: item.clone(),
            });
            self.after_add(state, index);
        } else if is_pending {
            self.append_pending(state, item, changes);
        } else if state.passes(item) {
            self.insert_item(state, item, index, changes);
        }
    }

    fn source_removed(&self, state: &mut ViewState, index: usize, item: &Value, changes: &mut Changes) {
        let was_pending = state.new_item.as_ref() == Some(item);
        if was_pending {
            state.new_item = None;
        }
        if state.edit_item.as_ref() == Some(item) {
            state.edit_item = None;
        }

        if state.staging.is_none() {
            state.mirrored_len = state.mirrored_len.saturating_sub(1);
            changes.collection.push(CollectionChange::Remove {
                index,
                item: item.clone(),
            });
            self.after_remove(state, index, was_pending);
        } else if was_pending {
            if let Some(at) = self.take_pending(state, item) {
                changes.collection.push(CollectionChange::Remove {
                    index: at,
                    item: item.clone(),
                });
                self.after_remove(state, at, true);
            }
        } else {
            self.remove_item(state, item, Some(index), changes);
        }
    }

    fn source_replaced(
        &self,
        state: &mut ViewState,
        index: usize,
        old: &Value,
        new: &Value,
        changes: &mut Changes,
    ) {
        if state.staging.is_none() {
            changes.collection.push(CollectionChange::Replace {
                index,
                old: old.clone(),
                new: new.clone(),
            });
            let position = state.position;
            if index as isize == position {
                self.set_cursor(state, position);
                changes.reannounce = true;
            }
            return;
        }
        self.remove_item(state, old, Some(index), changes);
        if state.passes(new) {
            self.insert_item(state, new, index, changes);
        }
    }

    // =========================================================================
    // Refresh
    // =========================================================================

    fn refresh_or_defer(&self) {
        let deferred = {
            let mut state = self.state.lock();
            if state.defer_level > 0 {
                state.needs_refresh = true;
                true
            } else {
                false
            }
        };
        if !deferred {
            self.run_refresh(false);
        }
    }

    /// Refresh if a refresh was postponed and nothing blocks it any more.
    fn refresh_if_needed(&self) {
        let run = {
            let state = self.state.lock();
            state.needs_refresh && state.defer_level == 0 && !state.is_busy()
        };
        if run {
            self.run_refresh(false);
        }
    }

    fn run_refresh(&self, clear_pending: bool) {
        if self.refreshing.swap(true, Ordering::SeqCst) {
            tracing::trace!(target: targets::VIEW, "refresh requested during refresh; ignored");
            return;
        }
        let _refreshing = BusyFlag(&self.refreshing);

        let mut clear_pending = clear_pending;
        loop {
            self.mutate(|this, state, changes| {
                state.needs_refresh = false;
                if std::mem::take(&mut clear_pending) {
                    state.new_item = None;
                    state.pushing_new = false;
                    state.edit_item = None;
                }
                this.rebuild(state, changes);
            });

            // Source changes raised by handlers of this refresh.
            let again = {
                let state = self.state.lock();
                state.needs_refresh && state.defer_level == 0 && !state.is_busy()
            };
            if !again {
                break;
            }
        }
    }

    fn rebuild(&self, state: &mut ViewState, changes: &mut Changes) {
        let _perf = PerfSpan::new(span_names::REFRESH);
        let count_before = self.count_in(state);
        let position_before = state.position;
        let current_before = state.current.clone();

        state.tree = None;
        state.staging = None;
        state.mirrored_len = self.source.len();
        if state.uses_staging() {
            let mut items = self.source.to_vec();
            // A pending new item keeps its place at the end.
            let mut pending = None;
            if let Some(item) = &state.new_item {
                if let Some(at) = items.iter().rposition(|v| v == item) {
                    pending = Some(items.remove(at));
                }
            }
            if let Some(filter) = &state.filter {
                items.retain(|item| filter(item));
            }
            if let Some(comparer) = &state.comparer {
                items.sort_by(|a, b| comparer.compare(a, b));
            }
            if state.groups.is_empty() {
                state.staging = Some(items);
            } else {
                let mut tree = GroupTree::new(state.groups.len());
                for item in &items {
                    tree.add_in_subtree(item, &state.culture, &state.groups, LeafOrder::Append);
                }
                state.staging = Some(tree.flatten());
                state.tree = Some(tree);
            }
            if let Some(item) = pending {
                match state.tree.as_mut() {
                    Some(tree) => {
                        tree.append_root_leaf(item);
                    }
                    None => state.staging.get_or_insert_with(Vec::new).push(item),
                }
                state.resync_staging();
            }
        }
        changes.collection.push(CollectionChange::Reset);

        let count = self.count_in(state) as isize;
        let position = if count == 0 || (count_before > 0 && position_before < 0) {
            -1
        } else if count_before > 0 && position_before >= count_before as isize {
            count
        } else {
            current_before
                .and_then(|item| self.index_in(state, &item))
                .map_or(0, |index| index as isize)
        };
        self.set_cursor(state, position);
        tracing::debug!(target: targets::VIEW, count, grouped = state.tree.is_some(), "view refreshed");
    }
}

impl CollectionView for ListCollectionView {
    fn signals(&self) -> &ViewSignals {
        &self.signals
    }

    fn source_collection(&self) -> &Arc<ObservableList> {
        &self.source
    }

    fn count(&self) -> usize {
        self.count_in(&self.state.lock())
    }

    fn item_at(&self, index: usize) -> Option<Value> {
        self.item_in(&self.state.lock(), index)
    }

    fn items(&self) -> Vec<Value> {
        let state = self.state.lock();
        match &state.staging {
            Some(staging) => staging.clone(),
            None => self.source.to_vec(),
        }
    }

    fn index_of(&self, item: &Value) -> Option<usize> {
        self.index_in(&self.state.lock(), item)
    }

    fn culture(&self) -> Culture {
        self.state.lock().culture.clone()
    }

    fn set_culture(&self, culture: Culture) -> Result<()> {
        self.ensure_not_busy("Changing the culture")?;
        let sort = self.sort_descriptions();
        let comparer = SortFieldComparer::new(&sort, culture.clone())?;
        let changed = {
            let mut state = self.state.lock();
            let changed = state.culture != culture;
            state.culture = culture;
            state.comparer = comparer;
            changed
        };
        if changed {
            self.refresh_or_defer();
            self.dispatch(vec![ViewEvent::Property(names::CULTURE)]);
        }
        Ok(())
    }

    fn can_filter(&self) -> bool {
        true
    }

    fn can_sort(&self) -> bool {
        true
    }

    fn can_group(&self) -> bool {
        true
    }

    fn filter(&self) -> Option<FilterFn> {
        self.state.lock().filter.clone()
    }

    fn set_filter(&self, filter: Option<FilterFn>) -> Result<()> {
        self.ensure_not_busy("Changing the filter")?;
        self.state.lock().filter = filter;
        self.refresh_or_defer();
        Ok(())
    }

    fn sort_descriptions(&self) -> Vec<SortDescription> {
        self.state.lock().sort.clone()
    }

    fn set_sort_descriptions(&self, descriptions: Vec<SortDescription>) -> Result<()> {
        self.ensure_not_busy("Sorting")?;
        let comparer = SortFieldComparer::new(&descriptions, self.culture())?;
        {
            let mut state = self.state.lock();
            state.sort = descriptions;
            state.comparer = comparer;
        }
        self.refresh_or_defer();
        Ok(())
    }

    fn group_descriptions(&self) -> Vec<Arc<dyn GroupDescription>> {
        self.state.lock().groups.clone()
    }

    fn set_group_descriptions(&self, descriptions: Vec<Arc<dyn GroupDescription>>) -> Result<()> {
        self.ensure_not_busy("Grouping")?;
        self.state.lock().groups = descriptions;
        self.refresh_or_defer();
        Ok(())
    }

    fn groups(&self) -> Option<CollectionViewGroup> {
        self.state.lock().tree.as_ref().map(GroupTree::root_snapshot)
    }

    fn current_position(&self) -> isize {
        self.state.lock().position
    }

    fn is_current_before_first(&self) -> bool {
        self.observe(&self.state.lock()).before_first()
    }

    fn is_current_after_last(&self) -> bool {
        self.observe(&self.state.lock()).after_last()
    }

    fn move_current_to_first(&self) -> bool {
        self.move_to(0)
    }

    fn move_current_to_last(&self) -> bool {
        self.move_to(self.count() as isize - 1)
    }

    fn move_current_to_next(&self) -> bool {
        let position = self.current_position();
        if position < self.count() as isize {
            self.move_to(position + 1)
        } else {
            false
        }
    }

    fn move_current_to_previous(&self) -> bool {
        let position = self.current_position();
        if position >= 0 {
            self.move_to(position - 1)
        } else {
            false
        }
    }

    fn move_current_to_position(&self, position: isize) -> Result<bool> {
        let count = self.count();
        if position < -1 || position > count as isize {
            return Err(ViewError::PositionOutOfRange { position, count });
        }
        Ok(self.move_to(position))
    }

    fn move_current_to(&self, item: &Value) -> bool {
        let position = self.index_of(item).map_or(-1, |index| index as isize);
        self.move_to(position)
    }

    fn refresh(&self) -> Result<()> {
        self.ensure_not_busy("Refresh")?;
        self.refresh_or_defer();
        Ok(())
    }

    fn defer_refresh(&self) -> DeferRefreshGuard {
        self.state.lock().defer_level += 1;
        let target: Weak<dyn DeferTarget> = self.this.clone();
        DeferRefreshGuard::new(target)
    }

    fn is_refresh_deferred(&self) -> bool {
        self.state.lock().defer_level > 0
    }

    fn detach(&self) {
        if let Some(id) = self.source_connection.lock().take() {
            self.source.collection_changed.disconnect(id);
            tracing::debug!(target: targets::VIEW, "view detached from source");
        }
    }
}

impl DeferTarget for ListCollectionView {
    fn end_defer(&self) {
        let run = {
            let mut state = self.state.lock();
            state.defer_level = state.defer_level.saturating_sub(1);
            if state.defer_level > 0 {
                false
            } else if state.is_busy() {
                tracing::warn!(
                    target: targets::VIEW,
                    "deferred refresh postponed until the pending add or edit completes"
                );
                state.needs_refresh = true;
                false
            } else {
                true
            }
        };
        if run {
            self.run_refresh(false);
        }
    }
}

impl EditableCollectionView for ListCollectionView {
    fn can_add_new(&self) -> bool {
        !self.source.is_fixed_size() && self.source.has_item_factory()
    }

    fn add_new(&self) -> Result<Value> {
        self.ensure_not_deferred("AddNew")?;
        if !self.can_add_new() {
            return Err(ViewError::unsupported(
                "AddNew requires a growable source with an item factory",
            ));
        }
        if self.is_editing_item() {
            self.commit_edit()?;
        }
        if self.is_adding_new() {
            self.commit_new()?;
        }

        let item = self.source.create_item()?;
        if let Some(editable) = editable_of(&item) {
            editable.begin_edit();
        }
        {
            let mut state = self.state.lock();
            state.new_item = Some(item.clone());
            state.pushing_new = true;
        }
        if let Err(err) = self.source.push(item.clone()) {
            let mut state = self.state.lock();
            state.new_item = None;
            state.pushing_new = false;
            return Err(err.into());
        }

        self.mutate(|this, state, changes| {
            state.pushing_new = false;
            if let Some(index) = this.last_index_in(state, &item) {
                this.set_cursor(state, index as isize);
            }
            changes.properties.extend([names::IS_ADDING_NEW, names::CURRENT_ADD_ITEM]);
        });
        tracing::debug!(target: targets::VIEW, item = ?item, "add new");
        Ok(item)
    }

    fn commit_new(&self) -> Result<()> {
        let Some(item) = self.current_add_item() else {
            return Ok(());
        };
        if let Some(editable) = editable_of(&item) {
            editable.end_edit();
        }
        self.mutate(|this, state, changes| {
            if state.new_item.as_ref() != Some(&item) {
                return;
            }
            state.new_item = None;
            if state.defer_level > 0 {
                state.needs_refresh = true;
            } else if state.staging.is_some() {
                this.reseat_new(state, &item, changes);
            }
        });
        tracing::debug!(target: targets::VIEW, item = ?item, "commit new");
        self.refresh_if_needed();
        Ok(())
    }

    fn cancel_new(&self) -> Result<()> {
        let Some(item) = self.current_add_item() else {
            return Ok(());
        };
        if let Some(editable) = editable_of(&item) {
            editable.cancel_edit();
        }
        if let Some(index) = self.source.last_index_of(&item) {
            self.source.remove_at(index)?;
        }
        self.mutate(|_, state, _| {
            if state.new_item.as_ref() == Some(&item) {
                state.new_item = None;
            }
        });
        tracing::debug!(target: targets::VIEW, item = ?item, "cancel new");
        self.refresh_if_needed();
        Ok(())
    }

    fn is_adding_new(&self) -> bool {
        self.state.lock().new_item.is_some()
    }

    fn current_add_item(&self) -> Option<Value> {
        self.state.lock().new_item.clone()
    }

    fn edit_item(&self, item: &Value) -> Result<()> {
        self.ensure_not_deferred("EditItem")?;
        if self.current_add_item().as_ref() == Some(item) {
            return Ok(());
        }
        if self.is_adding_new() {
            self.commit_new()?;
        }
        if self.is_editing_item() {
            self.commit_edit()?;
        }
        if let Some(editable) = editable_of(item) {
            editable.begin_edit();
        }
        self.mutate(|_, state, _| state.edit_item = Some(item.clone()));
        Ok(())
    }

    fn commit_edit(&self) -> Result<()> {
        let Some(item) = self.current_edit_item() else {
            return Ok(());
        };
        if let Some(editable) = editable_of(&item) {
            editable.end_edit();
        }
        self.mutate(|this, state, changes| {
            state.edit_item = None;
            if state.defer_level > 0 {
                state.needs_refresh = true;
            } else if state.staging.is_some() {
                this.reseat_edited(state, &item, changes);
            }
        });
        self.refresh_if_needed();
        Ok(())
    }

    fn cancel_edit(&self) -> Result<()> {
        let Some(item) = self.current_edit_item() else {
            return Ok(());
        };
        let Some(editable) = editable_of(&item) else {
            return Err(ViewError::unsupported(
                "CancelEdit requires an item with edit transactions",
            ));
        };
        editable.cancel_edit();
        self.mutate(|_, state, _| state.edit_item = None);
        self.refresh_if_needed();
        Ok(())
    }

    fn can_cancel_edit(&self) -> bool {
        self.current_edit_item()
            .is_some_and(|item| editable_of(&item).is_some())
    }

    fn is_editing_item(&self) -> bool {
        self.state.lock().edit_item.is_some()
    }

    fn current_edit_item(&self) -> Option<Value> {
        self.state.lock().edit_item.clone()
    }

    fn can_remove(&self) -> bool {
        !self.source.is_fixed_size()
    }

    fn remove(&self, item: &Value) -> Result<()> {
        self.ensure_not_busy("Remove")?;
        if !self.can_remove() {
            return Err(ViewError::unsupported("Remove requires a growable source"));
        }
        match self.index_of(item) {
            Some(index) => self.remove_at(index),
            None => Ok(()),
        }
    }

    fn remove_at(&self, index: usize) -> Result<()> {
        self.ensure_not_busy("RemoveAt")?;
        if !self.can_remove() {
            return Err(ViewError::unsupported("RemoveAt requires a growable source"));
        }
        let (item, identity) = {
            let state = self.state.lock();
            let count = self.count_in(&state);
            let item = self
                .item_in(&state, index)
                .ok_or(ViewError::IndexOutOfRange { index, count })?;
            (item, state.staging.is_none())
        };
        let source_index = if identity {
            Some(index)
        } else {
            self.source.index_of(&item)
        };
        if let Some(source_index) = source_index {
            self.source.remove_at(source_index)?;
        }
        Ok(())
    }
}

impl DataObject for ListCollectionView {
    fn type_name(&self) -> &str {
        "ListCollectionView"
    }

    fn property(&self, name: &str) -> Option<Value> {
        let value = match name {
            names::COUNT => Value::from(self.count()),
            names::IS_EMPTY => Value::Bool(self.is_empty()),
            names::CURRENT_ITEM => self.current_item().unwrap_or_default(),
            names::CURRENT_POSITION => Value::Int(self.current_position() as i64),
            names::IS_CURRENT_BEFORE_FIRST => Value::Bool(self.is_current_before_first()),
            names::IS_CURRENT_AFTER_LAST => Value::Bool(self.is_current_after_last()),
            names::CULTURE => Value::from(self.culture().name()),
            names::IS_ADDING_NEW => Value::Bool(self.is_adding_new()),
            names::IS_EDITING_ITEM => Value::Bool(self.is_editing_item()),
            names::CURRENT_ADD_ITEM => self.current_add_item().unwrap_or_default(),
            names::CURRENT_EDIT_ITEM => self.current_edit_item().unwrap_or_default(),
            names::CAN_ADD_NEW => Value::Bool(self.can_add_new()),
            names::CAN_REMOVE => Value::Bool(self.can_remove()),
            names::CAN_CANCEL_EDIT => Value::Bool(self.can_cancel_edit()),
            names::CAN_FILTER => Value::Bool(self.can_filter()),
            names::CAN_SORT => Value::Bool(self.can_sort()),
            names::CAN_GROUP => Value::Bool(self.can_group()),
            _ => return None,
        };
        Some(value)
    }

    fn indexed(&self, key: &str) -> Option<Value> {
        key.parse::<usize>().ok().and_then(|index| self.item_at(index))
    }

    fn property_changed(&self) -> Option<&Signal<String>> {
        Some(&self.signals.property_changed)
    }

    fn collection_changed(&self) -> Option<&Signal<CollectionChange>> {
        Some(&self.signals.collection_changed)
    }

    fn current_item_source(&self) -> Option<&dyn CurrentItemSource> {
        Some(self)
    }
}

impl CurrentItemSource for ListCollectionView {
    fn current_item(&self) -> Option<Value> {
        self.state.lock().current.clone()
    }

    fn current_changed(&self) -> &Signal<()> {
        &self.signals.current_changed
    }
}

impl Drop for ListCollectionView {
    fn drop(&mut self) {
        self.detach();
    }
}

impl fmt::Debug for ListCollectionView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ListCollectionView")
            .field("count", &self.count_in(&state))
            .field("position", &state.position)
            .field("filtered", &state.filter.is_some())
            .field("sort", &state.sort)
            .field("group_levels", &state.groups.len())
            .field("adding_new", &state.new_item.is_some())
            .field("editing", &state.edit_item.is_some())
            .finish()
    }
}

static_assertions::assert_impl_all!(ListCollectionView: Send, Sync);

/// Builder for [`ListCollectionView`].
///
/// All settings are applied inside one deferred-refresh scope, so the view is
/// computed once.
pub struct ListCollectionViewBuilder {
    source: Arc<ObservableList>,
    filter: Option<FilterFn>,
    sort: Vec<SortDescription>,
    groups: Vec<Arc<dyn GroupDescription>>,
    culture: Option<Culture>,
}

impl ListCollectionViewBuilder {
    /// Creates a builder for a view over `source`.
    pub fn new(source: Arc<ObservableList>) -> Self {
        Self {
            source,
            filter: None,
            sort: Vec::new(),
            groups: Vec::new(),
            culture: None,
        }
    }

    /// Show only items the predicate accepts.
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Add a sort key (keys apply in the order they are added).
    pub fn sort_by(mut self, description: SortDescription) -> Self {
        self.sort.push(description);
        self
    }

    /// Add a grouping level.
    pub fn group_by(mut self, description: impl GroupDescription + 'static) -> Self {
        self.groups.push(Arc::new(description));
        self
    }

    /// Culture used by sorting and grouping.
    pub fn culture(mut self, culture: Culture) -> Self {
        self.culture = Some(culture);
        self
    }

    /// Build the view.
    pub fn build(self) -> Result<Arc<ListCollectionView>> {
        let view = ListCollectionView::new(self.source);
        {
            let _defer = view.defer_refresh();
            if let Some(culture) = self.culture {
                view.set_culture(culture)?;
            }
            if self.filter.is_some() {
                view.set_filter(self.filter)?;
            }
            if !self.sort.is_empty() {
                view.set_sort_descriptions(self.sort)?;
            }
            if !self.groups.is_empty() {
                view.set_group_descriptions(self.groups)?;
            }
        }
        Ok(view)
    }
}
