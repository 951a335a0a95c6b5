//! Group descriptions and the grouping tree.
//!
//! A view with N group descriptions arranges its items in an N-level tree:
//! level `k` buckets items by the name description `k` computes for them.
//! A description may yield several names for one item, in which case the item
//! appears once under each of those groups.

mod tree;

use std::fmt;
use std::sync::Arc;

use lattice_data_core::logging::targets;
use lattice_data_core::{Culture, StringComparison, Value};

pub use tree::{CollectionViewGroup, GroupId, GroupItem, GroupTree};
pub(crate) use tree::LeafOrder;

use crate::converter::ValueConverter;
use crate::error::PathError;
use crate::path::PropertyPath;

/// The name (or names) a description computes for an item.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupName {
    /// The item belongs to exactly one group.
    Single(Value),
    /// The item belongs to each of these groups.
    Multiple(Vec<Value>),
}

impl GroupName {
    /// The names as a list.
    pub fn into_names(self) -> Vec<Value> {
        match self {
            GroupName::Single(name) => vec![name],
            GroupName::Multiple(names) => names,
        }
    }
}

impl From<Value> for GroupName {
    fn from(name: Value) -> Self {
        GroupName::Single(name)
    }
}

/// Computes group names for items at one level of grouping.
///
/// Views call these methods while holding their state lock, so an
/// implementation must not call back into the view it groups.
pub trait GroupDescription: Send + Sync {
    /// The group name(s) of `item` at `level`.
    fn group_name_from_item(&self, item: &Value, level: usize, culture: &Culture) -> GroupName;

    /// Whether an existing group named `group_name` accepts an item named `item_name`.
    fn names_match(&self, group_name: &Value, item_name: &Value) -> bool {
        group_name == item_name
    }

    /// The property-path view of this description, when it has one.
    fn as_property_group(&self) -> Option<&PropertyGroupDescription> {
        None
    }
}

/// Groups items by the value of a property path.
///
/// - An empty path uses the item itself as the group name.
/// - A path that cannot be resolved yields a null name.
/// - An optional converter is applied to the resolved value, with the
///   grouping level passed as converter parameter.
/// - String names are matched with the description's [`StringComparison`];
///   other names match by equality.
#[derive(Clone)]
pub struct PropertyGroupDescription {
    path: PropertyPath,
    converter: Option<Arc<dyn ValueConverter>>,
    string_comparison: StringComparison,
}

impl PropertyGroupDescription {
    /// Group by `property_path`.
    pub fn new(property_path: &str) -> Result<Self, PathError> {
        Ok(Self {
            path: PropertyPath::parse(property_path)?,
            converter: None,
            string_comparison: StringComparison::Ordinal,
        })
    }

    /// Group by the items themselves.
    pub fn by_item() -> Self {
        Self {
            path: PropertyPath::empty(),
            converter: None,
            string_comparison: StringComparison::Ordinal,
        }
    }

    /// Apply a converter to resolved values.
    pub fn with_converter(mut self, converter: impl ValueConverter + 'static) -> Self {
        self.converter = Some(Arc::new(converter));
        self
    }

    /// Match string names with `comparison`.
    pub fn with_string_comparison(mut self, comparison: StringComparison) -> Self {
        self.string_comparison = comparison;
        self
    }

    /// The property path, or `None` when grouping by the item itself.
    pub fn property_path(&self) -> Option<&str> {
        (!self.path.is_empty()).then(|| self.path.as_str())
    }

    /// How string names are matched.
    pub fn string_comparison(&self) -> StringComparison {
        self.string_comparison
    }
}

impl GroupDescription for PropertyGroupDescription {
    fn group_name_from_item(&self, item: &Value, level: usize, culture: &Culture) -> GroupName {
        let value = self.path.resolve(item).into_value();
        let Some(converter) = &self.converter else {
            return GroupName::Single(value);
        };
        match converter.convert(&value, &Value::from(level), culture) {
            Ok(converted) => GroupName::Single(converted),
            Err(err) => {
                tracing::warn!(target: targets::VIEW, %err, "group name conversion failed");
                GroupName::Single(Value::Null)
            }
        }
    }

    fn names_match(&self, group_name: &Value, item_name: &Value) -> bool {
        match (group_name.as_str(), item_name.as_str()) {
            (Some(a), Some(b)) => self.string_comparison.equals(a, b),
            _ => group_name == item_name,
        }
    }

    fn as_property_group(&self) -> Option<&PropertyGroupDescription> {
        Some(self)
    }
}

impl fmt::Debug for PropertyGroupDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyGroupDescription")
            .field("path", &self.path)
            .field("has_converter", &self.converter.is_some())
            .field("string_comparison", &self.string_comparison)
            .finish()
    }
}

type NameFn = Arc<dyn Fn(&Value, usize, &Culture) -> GroupName + Send + Sync>;
type MatchFn = Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>;

/// A group description built from closures.
///
/// # Example
///
/// ```
/// use lattice_data::{FnGroupDescription, GroupDescription, GroupName};
/// use lattice_data_core::{Culture, Value};
///
/// let parity = FnGroupDescription::new(|item, _, _| {
///     let odd = item.as_int().unwrap_or(0) % 2 != 0;
///     GroupName::Single(Value::from(if odd { "odd" } else { "even" }))
/// });
/// let name = parity.group_name_from_item(&Value::Int(3), 0, &Culture::invariant());
/// assert_eq!(name, GroupName::Single(Value::from("odd")));
/// ```
#[derive(Clone)]
pub struct FnGroupDescription {
    name_fn: NameFn,
    match_fn: Option<MatchFn>,
}

impl FnGroupDescription {
    /// Create a description from a name function.
    pub fn new<F>(name_fn: F) -> Self
    where
        F: Fn(&Value, usize, &Culture) -> GroupName + Send + Sync + 'static,
    {
        Self {
            name_fn: Arc::new(name_fn),
            match_fn: None,
        }
    }

    /// Override how group names are matched.
    pub fn with_names_match<F>(mut self, match_fn: F) -> Self
    where
        F: Fn(&Value, &Value) -> bool + Send + Sync + 'static,
    {
        self.match_fn = Some(Arc::new(match_fn));
        self
    }
}

impl GroupDescription for FnGroupDescription {
    fn group_name_from_item(&self, item: &Value, level: usize, culture: &Culture) -> GroupName {
        (self.name_fn)(item, level, culture)
    }

    fn names_match(&self, group_name: &Value, item_name: &Value) -> bool {
        match &self.match_fn {
            Some(matches) => matches(group_name, item_name),
            None => group_name == item_name,
        }
    }
}

impl fmt::Debug for FnGroupDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnGroupDescription")
            .field("has_names_match", &self.match_fn.is_some())
            .finish()
    }
}
