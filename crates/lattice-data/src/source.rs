//! Configure views for a source declared once.
//!
//! A [`CollectionViewSource`] holds a filter, sort descriptions, group
//! descriptions and a culture, and creates a configured view for whatever
//! source it is given. Replacing the source replaces the view.

use std::fmt;
use std::sync::{Arc, Weak};

use lattice_data_core::logging::targets;
use lattice_data_core::{Culture, DataObject, ObservableList, Signal, Value};
use parking_lot::Mutex;

use crate::error::Result;
use crate::group::GroupDescription;
use crate::sort::SortDescription;
use crate::view::property_names as names;
use crate::view::{CollectionView, DeferRefreshGuard, DeferTarget, FilterFn, ListCollectionView};

/// What a [`CollectionViewSource`] presents.
#[derive(Clone)]
pub enum ViewSourceItems {
    /// An observable list; the source creates a view over it.
    List(Arc<ObservableList>),
    /// Plain items, wrapped into a fixed-size list.
    Items(Vec<Value>),
    /// An existing view, used as is.
    View(Arc<dyn CollectionView>),
}

impl fmt::Debug for ViewSourceItems {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewSourceItems::List(list) => f.debug_tuple("List").field(&list.len()).finish(),
            ViewSourceItems::Items(items) => f.debug_tuple("Items").field(&items.len()).finish(),
            ViewSourceItems::View(view) => f.debug_tuple("View").field(&view.count()).finish(),
        }
    }
}

impl From<Arc<ObservableList>> for ViewSourceItems {
    fn from(list: Arc<ObservableList>) -> Self {
        ViewSourceItems::List(list)
    }
}

impl From<Vec<Value>> for ViewSourceItems {
    fn from(items: Vec<Value>) -> Self {
        ViewSourceItems::Items(items)
    }
}

#[derive(Clone, Default)]
struct SourceSettings {
    filter: Option<FilterFn>,
    sort: Vec<SortDescription>,
    groups: Vec<Arc<dyn GroupDescription>>,
    culture: Culture,
}

impl SourceSettings {
    fn push_onto(&self, view: &dyn CollectionView) -> Result<()> {
        let _defer = view.defer_refresh();
        view.set_culture(self.culture.clone())?;
        view.set_filter(self.filter.clone())?;
        view.set_sort_descriptions(self.sort.clone())?;
        view.set_group_descriptions(self.groups.clone())?;
        Ok(())
    }
}

struct SourceState {
    items: Option<ViewSourceItems>,
    view: Option<Arc<dyn CollectionView>>,
    /// The view was created here (rather than handed in) and gets our settings.
    owns_view: bool,
    settings: SourceSettings,
    defer_level: usize,
    needs_apply: bool,
}

/// Creates and configures the view for a source.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use lattice_data::{CollectionViewSource, SortDescription, ViewSourceItems};
/// use lattice_data_core::Value;
///
/// let cvs = CollectionViewSource::new();
/// cvs.set_sort_descriptions(vec![SortDescription::descending("")]).unwrap();
/// cvs.set_source(Some(ViewSourceItems::Items(vec![Value::Int(1), Value::Int(3)]))).unwrap();
///
/// let view = cvs.view().unwrap();
/// assert_eq!(view.items(), vec![Value::Int(3), Value::Int(1)]);
/// ```
pub struct CollectionViewSource {
    state: Mutex<SourceState>,
    this: Weak<CollectionViewSource>,

    /// Emitted after the view was replaced.
    pub view_changed: Signal<()>,

    /// Emitted with [`property_names::VIEW`](crate::view::property_names::VIEW)
    /// when the view is replaced.
    pub property_changed: Signal<String>,
}

impl CollectionViewSource {
    /// Create a source with no items and no view.
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<CollectionViewSource>| Self {
            state: Mutex::new(SourceState {
                items: None,
                view: None,
                owns_view: false,
                settings: SourceSettings::default(),
                defer_level: 0,
                needs_apply: false,
            }),
            this: this.clone(),
            view_changed: Signal::new(),
            property_changed: Signal::new(),
        })
    }

    /// The current items, if any.
    pub fn source(&self) -> Option<ViewSourceItems> {
        self.state.lock().items.clone()
    }

    /// Replace the items. The previous view, if created here, is detached.
    pub fn set_source(&self, items: Option<ViewSourceItems>) -> Result<()> {
        let settings = self.state.lock().settings.clone();
        let (view, owns_view) = match &items {
            None => (None, false),
            Some(ViewSourceItems::View(view)) => (Some(view.clone()), false),
            Some(ViewSourceItems::List(list)) => (Some(Self::create_view(list.clone(), &settings)?), true),
            Some(ViewSourceItems::Items(items)) => {
                let list = Arc::new(ObservableList::read_only(items.clone()));
                (Some(Self::create_view(list, &settings)?), true)
            }
        };

        let (previous, owned_previous) = {
            let mut state = self.state.lock();
            state.items = items;
            let previous = std::mem::replace(&mut state.view, view);
            let owned_previous = std::mem::replace(&mut state.owns_view, owns_view);
            (previous, owned_previous)
        };
        if let Some(previous) = previous.filter(|_| owned_previous) {
            previous.detach();
        }

        tracing::debug!(target: targets::VIEW, owns_view, "view source replaced its view");
        self.view_changed.emit(());
        self.property_changed.emit(names::VIEW.to_string());
        Ok(())
    }

    fn create_view(list: Arc<ObservableList>, settings: &SourceSettings) -> Result<Arc<dyn CollectionView>> {
        let view = ListCollectionView::new(list);
        settings.push_onto(view.as_ref())?;
        Ok(view)
    }

    /// The view of the current items.
    pub fn view(&self) -> Option<Arc<dyn CollectionView>> {
        self.state.lock().view.clone()
    }

    pub fn filter(&self) -> Option<FilterFn> {
        self.state.lock().settings.filter.clone()
    }

    /// Set the filter pushed onto created views.
    pub fn set_filter(&self, filter: Option<FilterFn>) -> Result<()> {
        self.update_settings(|settings| settings.filter = filter)
    }

    /// Set the filter from a closure.
    pub fn set_filter_fn<F>(&self, filter: F) -> Result<()>
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.set_filter(Some(Arc::new(filter)))
    }

    pub fn sort_descriptions(&self) -> Vec<SortDescription> {
        self.state.lock().settings.sort.clone()
    }

    pub fn set_sort_descriptions(&self, descriptions: Vec<SortDescription>) -> Result<()> {
        self.update_settings(|settings| settings.sort = descriptions)
    }

    pub fn group_descriptions(&self) -> Vec<Arc<dyn GroupDescription>> {
        self.state.lock().settings.groups.clone()
    }

    pub fn set_group_descriptions(&self, descriptions: Vec<Arc<dyn GroupDescription>>) -> Result<()> {
        self.update_settings(|settings| settings.groups = descriptions)
    }

    pub fn culture(&self) -> Culture {
        self.state.lock().settings.culture.clone()
    }

    pub fn set_culture(&self, culture: Culture) -> Result<()> {
        self.update_settings(|settings| settings.culture = culture)
    }

    /// Hold back pushing settings onto the view until the guard is dropped.
    pub fn defer_refresh(&self) -> DeferRefreshGuard {
        self.state.lock().defer_level += 1;
        let target: Weak<dyn DeferTarget> = self.this.clone();
        DeferRefreshGuard::new(target)
    }

    pub fn is_refresh_deferred(&self) -> bool {
        self.state.lock().defer_level > 0
    }

    /// The settings are pushed onto the view first and kept only if it accepts
    /// them.
    fn update_settings(&self, update: impl FnOnce(&mut SourceSettings)) -> Result<()> {
        let (mut settings, view, deferred) = {
            let state = self.state.lock();
            let view = state.view.clone().filter(|_| state.owns_view);
            (state.settings.clone(), view, state.defer_level > 0)
        };
        update(&mut settings);
        if let Some(view) = view.filter(|_| !deferred) {
            settings.push_onto(view.as_ref())?;
        }

        let mut state = self.state.lock();
        state.settings = settings;
        if deferred {
            state.needs_apply = true;
        }
        Ok(())
    }
}

impl DeferTarget for CollectionViewSource {
    fn end_defer(&self) {
        let pending = {
            let mut state = self.state.lock();
            state.defer_level = state.defer_level.saturating_sub(1);
            if state.defer_level > 0 || !std::mem::take(&mut state.needs_apply) {
                None
            } else {
                let view = state.view.clone().filter(|_| state.owns_view);
                view.map(|view| (view, state.settings.clone()))
            }
        };
        if let Some((view, settings)) = pending {
            if let Err(err) = settings.push_onto(view.as_ref()) {
                tracing::warn!(target: targets::VIEW, %err, "view rejected deferred settings");
            }
        }
    }
}

impl DataObject for CollectionViewSource {
    fn type_name(&self) -> &str {
        "CollectionViewSource"
    }

    fn property(&self, name: &str) -> Option<Value> {
        match name {
            names::VIEW => Some(self.view().map_or(Value::Null, |view| {
                let object: Arc<dyn DataObject> = view;
                Value::Object(object)
            })),
            names::CULTURE => Some(Value::from(self.culture().name())),
            _ => None,
        }
    }

    fn property_changed(&self) -> Option<&Signal<String>> {
        Some(&self.property_changed)
    }
}

impl fmt::Debug for CollectionViewSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CollectionViewSource")
            .field("items", &state.items)
            .field("owns_view", &state.owns_view)
            .field("sort", &state.settings.sort)
            .field("deferred", &(state.defer_level > 0))
            .finish()
    }
}

static_assertions::assert_impl_all!(CollectionViewSource: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::EditableCollectionView;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ints(values: &[i64]) -> Vec<Value> {
        values.iter().copied().map(Value::Int).collect()
    }

    #[test]
    fn test_list_source_creates_configured_view() {
        let cvs = CollectionViewSource::new();
        cvs.set_filter_fn(|v| v.as_int().is_some_and(|n| n > 1)).unwrap();
        cvs.set_sort_descriptions(vec![SortDescription::descending("")]).unwrap();

        let list = Arc::new(ObservableList::new(ints(&[1, 2, 3])));
        cvs.set_source(Some(list.clone().into())).unwrap();
        let view = cvs.view().unwrap();
        assert_eq!(view.items(), ints(&[3, 2]));

        list.push(5).unwrap();
        assert_eq!(view.items(), ints(&[5, 3, 2]));
    }

    #[test]
    fn test_items_source_is_read_only() {
        let cvs = CollectionViewSource::new();
        cvs.set_source(Some(ints(&[1, 2]).into())).unwrap();
        let view = cvs.view().unwrap();
        assert!(view.source_collection().is_read_only());
        assert_eq!(view.count(), 2);
    }

    #[test]
    fn test_settings_follow_owned_view() {
        let cvs = CollectionViewSource::new();
        cvs.set_source(Some(ints(&[2, 1, 3]).into())).unwrap();
        cvs.set_sort_descriptions(vec![SortDescription::ascending("")]).unwrap();
        assert_eq!(cvs.view().unwrap().items(), ints(&[1, 2, 3]));
    }

    #[test]
    fn test_external_view_used_as_is() {
        let list = Arc::new(ObservableList::new(ints(&[2, 1])));
        let view = ListCollectionView::new(list.clone());
        let cvs = CollectionViewSource::new();
        cvs.set_sort_descriptions(vec![SortDescription::ascending("")]).unwrap();
        cvs.set_source(Some(ViewSourceItems::View(view.clone()))).unwrap();
        assert_eq!(view.items(), ints(&[2, 1]));

        cvs.set_source(None).unwrap();
        assert!(cvs.view().is_none());
        assert_eq!(list.collection_changed.connection_count(), 1);
    }

    #[test]
    fn test_replacing_source_detaches_previous_view() {
        let first = Arc::new(ObservableList::new(ints(&[1])));
        let cvs = CollectionViewSource::new();
        let changed = Arc::new(AtomicUsize::new(0));
        let changed_clone = changed.clone();
        cvs.view_changed.connect(move |_| {
            changed_clone.fetch_add(1, Ordering::SeqCst);
        });

        cvs.set_source(Some(first.clone().into())).unwrap();
        let old_view = cvs.view().unwrap();
        assert_eq!(first.collection_changed.connection_count(), 1);

        cvs.set_source(Some(ints(&[7]).into())).unwrap();
        assert_eq!(first.collection_changed.connection_count(), 0);
        assert_eq!(changed.load(Ordering::SeqCst), 2);
        first.push(2).unwrap();
        assert_eq!(old_view.count(), 1);
    }

    #[test]
    fn test_deferred_settings_apply_once() {
        let cvs = CollectionViewSource::new();
        cvs.set_source(Some(ints(&[3, 1, 2]).into())).unwrap();
        let view = cvs.view().unwrap();
        let resets = Arc::new(AtomicUsize::new(0));
        let resets_clone = resets.clone();
        view.signals().collection_changed.connect(move |_| {
            resets_clone.fetch_add(1, Ordering::SeqCst);
        });

        {
            let _defer = cvs.defer_refresh();
            cvs.set_filter_fn(|v| *v != Value::Int(2)).unwrap();
            cvs.set_sort_descriptions(vec![SortDescription::ascending("")]).unwrap();
            assert_eq!(view.items(), ints(&[3, 1, 2]));
        }
        assert_eq!(view.items(), ints(&[1, 3]));
        assert_eq!(resets.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_settings_ignored_for_external_view() {
        let list = Arc::new(ObservableList::with_factory(ints(&[]), || Value::Int(0)));
        let editable = ListCollectionView::new(list);
        editable.add_new().unwrap();
        let cvs = CollectionViewSource::new();
        cvs.set_source(Some(ViewSourceItems::View(editable.clone()))).unwrap();

        assert!(cvs.set_sort_descriptions(vec![SortDescription::ascending("")]).is_ok());
        assert!(editable.sort_descriptions().is_empty());
        assert_eq!(cvs.sort_descriptions().len(), 1);
    }

    #[test]
    fn test_view_property() {
        let cvs = CollectionViewSource::new();
        assert_eq!(cvs.property(names::VIEW), Some(Value::Null));
        cvs.set_source(Some(ints(&[1]).into())).unwrap();
        let view = cvs.property(names::VIEW).unwrap();
        assert_eq!(
            view.as_object().and_then(|o| o.property(names::COUNT)),
            Some(Value::Int(1))
        );
    }
}
