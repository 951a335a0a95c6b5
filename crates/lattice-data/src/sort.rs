//! Sort descriptions and the multi-key comparer built from them.

use std::cmp::Ordering;
use std::fmt;

use lattice_data_core::{Culture, Value};
use serde::{Deserialize, Serialize};

use crate::error::PathError;
use crate::path::PropertyPath;

/// Sort direction of a single key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortDirection {
    /// Smallest first.
    #[default]
    Ascending,
    /// Largest first.
    Descending,
}

/// One sort key: a property path and a direction.
///
/// The empty path sorts by the items themselves.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortDescription {
    /// Path resolved against each item.
    pub property_path: String,
    /// Direction of this key.
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortDescription {
    /// Create a sort description.
    pub fn new(property_path: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            property_path: property_path.into(),
            direction,
        }
    }

    /// Ascending by `property_path`.
    pub fn ascending(property_path: impl Into<String>) -> Self {
        Self::new(property_path, SortDirection::Ascending)
    }

    /// Descending by `property_path`.
    pub fn descending(property_path: impl Into<String>) -> Self {
        Self::new(property_path, SortDirection::Descending)
    }
}

/// Compares items by an ordered list of sort descriptions.
///
/// For each description in turn the path is resolved against both items
/// (a broken path compares as null) and the results are compared with
/// [`Value::default_compare`]; the first non-equal key decides.
#[derive(Clone)]
pub struct SortFieldComparer {
    fields: Vec<(PropertyPath, SortDirection)>,
    culture: Culture,
}

impl SortFieldComparer {
    /// Build a comparer. Returns `Ok(None)` when `descriptions` is empty,
    /// meaning "no intrinsic order".
    pub fn new(descriptions: &[SortDescription], culture: Culture) -> Result<Option<Self>, PathError> {
        if descriptions.is_empty() {
            return Ok(None);
        }
        let fields = descriptions
            .iter()
            .map(|d| Ok((PropertyPath::parse(&d.property_path)?, d.direction)))
            .collect::<Result<Vec<_>, PathError>>()?;
        Ok(Some(Self { fields, culture }))
    }

    /// The culture the comparer was built for.
    pub fn culture(&self) -> &Culture {
        &self.culture
    }

    /// Compare two items.
    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        for (path, direction) in &self.fields {
            let left = path.resolve(a).into_value();
            let right = path.resolve(b).into_value();
            let ordering = Value::default_compare(&left, &right);
            let ordering = match direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    /// Index at which `item` would be inserted into the sorted `items`,
    /// after any equal items.
    pub fn insertion_index(&self, items: &[Value], item: &Value) -> usize {
        items.partition_point(|existing| self.compare(existing, item) != Ordering::Greater)
    }
}

impl fmt::Debug for SortFieldComparer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SortFieldComparer")
            .field("fields", &self.fields)
            .field("culture", &self.culture)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_data_core::DynamicObject;
    use std::sync::Arc;

    fn person(name: &str, age: i64) -> Value {
        Value::object(Arc::new(DynamicObject::new("Person").with("Name", name).with("Age", age)))
    }

    fn names(items: &[Value]) -> Vec<String> {
        items
            .iter()
            .map(|v| {
                PropertyPath::parse("Name")
                    .unwrap()
                    .resolve(v)
                    .value()
                    .to_display_string()
            })
            .collect()
    }

    #[test]
    fn test_empty_descriptions_mean_no_order() {
        assert!(SortFieldComparer::new(&[], Culture::invariant()).unwrap().is_none());
    }

    #[test]
    fn test_multi_key_sort() {
        let comparer = SortFieldComparer::new(
            &[SortDescription::descending("Age"), SortDescription::ascending("Name")],
            Culture::invariant(),
        )
        .unwrap()
        .unwrap();

        let mut items = vec![person("b", 30), person("a", 30), person("c", 40)];
        items.sort_by(|a, b| comparer.compare(a, b));
        assert_eq!(names(&items), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_broken_path_sorts_as_null() {
        let comparer = SortFieldComparer::new(&[SortDescription::ascending("Age")], Culture::invariant())
            .unwrap()
            .unwrap();
        let ageless = Value::object(Arc::new(DynamicObject::new("Person").with("Name", "x")));
        assert_eq!(comparer.compare(&ageless, &person("y", 1)), Ordering::Less);
    }

    #[test]
    fn test_sort_by_item_itself() {
        let comparer = SortFieldComparer::new(&[SortDescription::descending("")], Culture::invariant())
            .unwrap()
            .unwrap();
        let mut items: Vec<Value> = [3, 1, 2].into_iter().map(Value::from).collect();
        items.sort_by(|a, b| comparer.compare(a, b));
        assert_eq!(items, vec![Value::Int(3), Value::Int(2), Value::Int(1)]);
    }

    #[test]
    fn test_insertion_index_is_after_equals() {
        let comparer = SortFieldComparer::new(&[SortDescription::ascending("")], Culture::invariant())
            .unwrap()
            .unwrap();
        let items: Vec<Value> = [1, 2, 2, 5].into_iter().map(Value::from).collect();
        assert_eq!(comparer.insertion_index(&items, &Value::Int(2)), 3);
        assert_eq!(comparer.insertion_index(&items, &Value::Int(0)), 0);
        assert_eq!(comparer.insertion_index(&items, &Value::Int(9)), 4);
    }

    #[test]
    fn test_invalid_path_is_rejected() {
        assert!(SortFieldComparer::new(&[SortDescription::ascending("A..B")], Culture::invariant()).is_err());
    }

    #[test]
    fn test_sort_description_serde() {
        let desc = SortDescription::descending("Age");
        let json = serde_json::to_string(&desc).unwrap();
        assert_eq!(json, r#"{"property_path":"Age","direction":"Descending"}"#);
        let back: SortDescription = serde_json::from_str(r#"{"property_path":"Name"}"#).unwrap();
        assert_eq!(back, SortDescription::ascending("Name"));
    }
}
