//! Persistable view configuration.

use std::sync::Arc;

use lattice_data_core::logging::targets;
use lattice_data_core::{Culture, StringComparison};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::group::{GroupDescription, PropertyGroupDescription};
use crate::sort::SortDescription;
use crate::view::CollectionView;

/// One grouping level, by property path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSetting {
    /// Path whose value names the group; empty groups by the item itself.
    #[serde(default)]
    pub property_path: String,
    /// Match string group names without regard to case.
    #[serde(default)]
    pub ignore_case: bool,
}

impl GroupSetting {
    /// Group by `property_path`, case-sensitively.
    pub fn new(property_path: impl Into<String>) -> Self {
        Self {
            property_path: property_path.into(),
            ignore_case: false,
        }
    }

    fn to_description(&self) -> Result<PropertyGroupDescription> {
        let comparison = if self.ignore_case {
            StringComparison::OrdinalIgnoreCase
        } else {
            StringComparison::Ordinal
        };
        Ok(PropertyGroupDescription::new(&self.property_path)?.with_string_comparison(comparison))
    }
}

/// The serializable part of a view's configuration: sort descriptions,
/// property group descriptions and culture.
///
/// Filters and closure-based group descriptions are code and are not
/// captured.
///
/// # Example
///
/// ```
/// use lattice_data::{SortDescription, ViewSettings};
///
/// let settings = ViewSettings {
///     sort: vec![SortDescription::descending("Age")],
///     ..Default::default()
/// };
/// assert!(settings.group_by.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewSettings {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<SortDescription>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_by: Vec<GroupSetting>,

    /// Culture name; absent for the invariant culture.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub culture: Option<String>,
}

impl ViewSettings {
    /// Capture the settings of `view`.
    pub fn capture(view: &dyn CollectionView) -> Self {
        let group_by = view
            .group_descriptions()
            .iter()
            .filter_map(|description| {
                let Some(property) = description.as_property_group() else {
                    tracing::debug!(target: targets::VIEW, "skipping group description without a property path");
                    return None;
                };
                Some(GroupSetting {
                    property_path: property.property_path().unwrap_or_default().to_string(),
                    ignore_case: property.string_comparison() == StringComparison::OrdinalIgnoreCase,
                })
            })
            .collect();
        let culture = view.culture();
        Self {
            sort: view.sort_descriptions(),
            group_by,
            culture: (!culture.is_invariant()).then(|| culture.name().to_string()),
        }
    }

    /// Apply these settings to `view` in one refresh. The filter is kept.
    pub fn apply(&self, view: &dyn CollectionView) -> Result<()> {
        let groups = self
            .group_by
            .iter()
            .map(|setting| -> Result<Arc<dyn GroupDescription>> {
                Ok(Arc::new(setting.to_description()?))
            })
            .collect::<Result<Vec<_>>>()?;
        let culture = self.culture.as_deref().map_or_else(Culture::invariant, Culture::new);

        let _defer = view.defer_refresh();
        view.set_culture(culture)?;
        view.set_sort_descriptions(self.sort.clone())?;
        view.set_group_descriptions(groups)?;
        Ok(())
    }
}
