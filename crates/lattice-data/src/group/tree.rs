//! Arena-backed grouping tree.
//!
//! Groups live in a [`SlotMap`] keyed by [`GroupId`]; a group owns the order
//! of its children while the `parent` link is only used to walk upwards for
//! count propagation and flattened-index computation.

use std::sync::Arc;

use lattice_data_core::{Culture, DebugTreeNode, TreeFormatOptions, Value, format_tree};
use slotmap::{SlotMap, new_key_type};

use super::GroupDescription;
use crate::sort::SortFieldComparer;

new_key_type! {
    /// Identifier of a group inside a [`GroupTree`].
    pub struct GroupId;
}

#[derive(Debug, Clone)]
enum Child {
    Item(Value),
    Group(GroupId),
}

#[derive(Debug)]
struct GroupNode {
    name: Value,
    parent: Option<GroupId>,
    depth: usize,
    is_bottom_level: bool,
    children: Vec<Child>,
    item_count: usize,
}

/// The order of items in the view, used to place new leaves and groups.
///
/// Sibling groups are ordered by their first leaf. A view rebuilt from
/// scratch produces the same order, since it adds items one by one in view
/// order with [`LeafOrder::Append`].
#[derive(Clone, Copy)]
pub(crate) enum LeafOrder<'a> {
    /// Append after the existing leaves and groups.
    Append,
    /// Order by the comparer; an item goes after the items it ties with.
    Sorted(&'a SortFieldComparer),
    /// Order by position in `source`; the new item sits at `index`.
    Source { index: usize, source: &'a [Value] },
}

impl LeafOrder<'_> {
    /// Returns `true` if `a` comes strictly after `b`.
    fn is_after(&self, a: &Value, b: &Value) -> bool {
        match self {
            LeafOrder::Append => false,
            LeafOrder::Sorted(comparer) => comparer.compare(a, b) == std::cmp::Ordering::Greater,
            LeafOrder::Source { source, .. } => {
                let position = |v: &Value| source.iter().position(|s| s == v);
                position(a) > position(b)
            }
        }
    }

    /// Returns `true` if an existing `leaf` comes strictly after the new item.
    fn follows_new(&self, leaf: &Value, item: &Value) -> bool {
        match self {
            LeafOrder::Source { index, source } => {
                source.iter().position(|s| s == leaf).is_some_and(|p| p > *index)
            }
            _ => self.is_after(leaf, item),
        }
    }
}

/// The grouping hierarchy of a view.
///
/// The tree has one level per group description. Items are leaves of the
/// bottom-level groups, except a pending new item which may sit directly
/// under the root. The depth-first order of leaves is the order of the view.
#[derive(Debug)]
pub struct GroupTree {
    groups: SlotMap<GroupId, GroupNode>,
    root: GroupId,
    levels: usize,
}

impl GroupTree {
    /// Create an empty tree for `levels` group descriptions.
    pub fn new(levels: usize) -> Self {
        let mut groups = SlotMap::with_key();
        let root = groups.insert(GroupNode {
            name: Value::Null,
            parent: None,
            depth: 0,
            is_bottom_level: levels == 0,
            children: Vec::new(),
            item_count: 0,
        });
        Self { groups, root, levels }
    }

    /// The root group.
    pub fn root(&self) -> GroupId {
        self.root
    }

    /// Number of grouping levels.
    pub fn levels(&self) -> usize {
        self.levels
    }

    /// Total number of leaves.
    pub fn item_count(&self) -> usize {
        self.groups.get(self.root).map_or(0, |root| root.item_count)
    }

    /// Number of groups, the root included.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Leaves of group `id` and its descendants.
    pub fn group_item_count(&self, id: GroupId) -> usize {
        self.groups.get(id).map_or(0, |group| group.item_count)
    }

    /// Add `item` under every group its names select, creating groups as
    /// needed. Returns the flattened index of each inserted leaf, measured
    /// right after that leaf was inserted.
    pub(crate) fn add_in_subtree(
        &mut self,
        item: &Value,
        culture: &Culture,
        descriptions: &[Arc<dyn GroupDescription>],
        order: LeafOrder<'_>,
    ) -> Vec<usize> {
        let mut inserted = Vec::new();
        self.add_at_level(self.root, item, culture, descriptions, order, &mut inserted);
        inserted
    }

    fn add_at_level(
        &mut self,
        group: GroupId,
        item: &Value,
        culture: &Culture,
        descriptions: &[Arc<dyn GroupDescription>],
        order: LeafOrder<'_>,
        inserted: &mut Vec<usize>,
    ) {
        let depth = self.groups.get(group).map_or(0, |g| g.depth);
        let Some(description) = descriptions.get(depth) else {
            let position = self.leaf_position(group, item, order);
            inserted.push(self.insert_leaf(group, position, item.clone()));
            return;
        };

        for name in description.group_name_from_item(item, depth, culture).into_names() {
            let child = match self.find_subgroup(group, description.as_ref(), &name) {
                Some(child) => child,
                None => self.create_subgroup(group, name, item, order),
            };
            self.add_at_level(child, item, culture, descriptions, order, inserted);
        }
    }

    fn find_subgroup(&self, parent: GroupId, description: &dyn GroupDescription, name: &Value) -> Option<GroupId> {
        let node = self.groups.get(parent)?;
        node.children.iter().find_map(|child| match child {
            Child::Group(id) => self
                .groups
                .get(*id)
                .filter(|g| description.names_match(&g.name, name))
                .map(|_| *id),
            Child::Item(_) => None,
        })
    }

    fn create_subgroup(&mut self, parent: GroupId, name: Value, item: &Value, order: LeafOrder<'_>) -> GroupId {
        let depth = self.groups.get(parent).map_or(0, |g| g.depth) + 1;
        let position = self.groups.get(parent).map_or(0, |node| {
            // Groups precede a pending leaf that may sit under the root.
            let end = node
                .children
                .iter()
                .rposition(|c| matches!(c, Child::Group(_)))
                .map_or(0, |p| p + 1);
            node.children[..end]
                .iter()
                .position(|c| match c {
                    Child::Group(id) => self
                        .first_leaf(*id)
                        .is_some_and(|leaf| order.follows_new(leaf, item)),
                    Child::Item(_) => false,
                })
                .unwrap_or(end)
        });
        let id = self.groups.insert(GroupNode {
            name,
            parent: Some(parent),
            depth,
            is_bottom_level: depth == self.levels,
            children: Vec::new(),
            item_count: 0,
        });
        if let Some(node) = self.groups.get_mut(parent) {
            node.children.insert(position, Child::Group(id));
        }
        id
    }

    /// The first leaf of group `id` in depth-first order.
    fn first_leaf(&self, id: GroupId) -> Option<&Value> {
        match self.groups.get(id)?.children.first()? {
            Child::Item(item) => Some(item),
            Child::Group(child) => self.first_leaf(*child),
        }
    }

    /// Returns `true` if every run of sibling groups is ordered by first leaf.
    ///
    /// Adding or removing the first leaf of a group can break this; the view
    /// then rebuilds the tree.
    pub(crate) fn groups_in_order(&self, order: LeafOrder<'_>) -> bool {
        self.groups.values().all(|node| {
            let firsts: Vec<&Value> = node
                .children
                .iter()
                .filter_map(|c| match c {
                    Child::Group(id) => self.first_leaf(*id),
                    Child::Item(_) => None,
                })
                .collect();
            firsts.windows(2).all(|pair| !order.is_after(pair[0], pair[1]))
        })
    }

    fn leaf_position(&self, group: GroupId, item: &Value, order: LeafOrder<'_>) -> usize {
        let Some(node) = self.groups.get(group) else {
            return 0;
        };
        match order {
            LeafOrder::Append => node.children.len(),
            LeafOrder::Sorted(comparer) => {
                let leaves: Vec<Value> = node
                    .children
                    .iter()
                    .filter_map(|c| match c {
                        Child::Item(v) => Some(v.clone()),
                        Child::Group(_) => None,
                    })
                    .collect();
                comparer.insertion_index(&leaves, item)
            }
            LeafOrder::Source { index, source } => {
                // Equal items share their groups, so greedy matching against
                // the source prefix counts the leaves that precede the item.
                let mut matched = 0;
                for source_item in source.iter().take(index) {
                    if matches!(node.children.get(matched), Some(Child::Item(v)) if v == source_item) {
                        matched += 1;
                    }
                }
                matched
            }
        }
    }

    /// Insert a leaf and return its flattened index.
    fn insert_leaf(&mut self, group: GroupId, position: usize, item: Value) -> usize {
        if let Some(node) = self.groups.get_mut(group) {
            node.children.insert(position, Child::Item(item));
        }
        self.adjust_counts(group, 1);
        self.flat_offset(group, position)
    }

    /// Append `item` as a direct leaf of the root, after every group.
    ///
    /// Used for a pending new item, which stays outside the groups until it
    /// is committed. Returns its flattened index.
    pub(crate) fn append_root_leaf(&mut self, item: Value) -> usize {
        let position = self.groups.get(self.root).map_or(0, |r| r.children.len());
        self.insert_leaf(self.root, position, item)
    }

    /// Remove `item` from the root's direct leaves. Returns its flattened index.
    pub(crate) fn remove_root_leaf(&mut self, item: &Value) -> Option<usize> {
        let root = self.groups.get(self.root)?;
        let position = root
            .children
            .iter()
            .rposition(|c| matches!(c, Child::Item(v) if v == item))?;
        let flat = self.flat_offset(self.root, position);
        if let Some(root) = self.groups.get_mut(self.root) {
            root.children.remove(position);
        }
        self.adjust_counts(self.root, -1);
        Some(flat)
    }

    /// Remove `item` from every group holding it as a leaf (one occurrence per
    /// group), pruning groups left empty. Leaves sitting directly under the
    /// root are left alone. Returns the flattened index of each removed leaf
    /// in descending order, which is also the removal order.
    pub(crate) fn remove_in_subtree(&mut self, item: &Value) -> Vec<usize> {
        let root = self.root;
        let mut hits: Vec<(usize, GroupId, usize)> = self
            .groups
            .iter()
            .filter(|(id, _)| *id != root || self.levels == 0)
            .filter_map(|(id, node)| {
                node.children
                    .iter()
                    .position(|c| matches!(c, Child::Item(v) if v == item))
                    .map(|position| (id, position))
            })
            .map(|(id, position)| (self.flat_offset(id, position), id, position))
            .collect();
        hits.sort_by(|a, b| b.0.cmp(&a.0));

        for &(_, group, position) in &hits {
            if let Some(node) = self.groups.get_mut(group) {
                node.children.remove(position);
            }
            self.adjust_counts(group, -1);
            self.prune(group);
        }
        hits.into_iter().map(|(flat, _, _)| flat).collect()
    }

    fn prune(&mut self, mut group: GroupId) {
        while group != self.root {
            let Some(node) = self.groups.get(group) else {
                return;
            };
            if !node.children.is_empty() {
                return;
            }
            let Some(parent) = node.parent else {
                return;
            };
            self.groups.remove(group);
            if let Some(parent_node) = self.groups.get_mut(parent) {
                parent_node
                    .children
                    .retain(|c| !matches!(c, Child::Group(id) if *id == group));
            }
            group = parent;
        }
    }

    fn adjust_counts(&mut self, group: GroupId, delta: isize) {
        let mut current = Some(group);
        while let Some(id) = current {
            let Some(node) = self.groups.get_mut(id) else {
                return;
            };
            node.item_count = node.item_count.saturating_add_signed(delta);
            current = node.parent;
        }
    }

    fn child_count(&self, child: &Child) -> usize {
        match child {
            Child::Item(_) => 1,
            Child::Group(id) => self.group_item_count(*id),
        }
    }

    /// Flattened index of the child at `position` in `group`.
    fn flat_offset(&self, group: GroupId, position: usize) -> usize {
        let mut offset = 0;
        let mut current = group;
        let mut limit = position;
        loop {
            let Some(node) = self.groups.get(current) else {
                return offset;
            };
            offset += node.children[..limit.min(node.children.len())]
                .iter()
                .map(|c| self.child_count(c))
                .sum::<usize>();
            let Some(parent) = node.parent else {
                return offset;
            };
            limit = self
                .groups
                .get(parent)
                .and_then(|p| {
                    p.children
                        .iter()
                        .position(|c| matches!(c, Child::Group(id) if *id == current))
                })
                .unwrap_or(0);
            current = parent;
        }
    }

    /// Flattened index of the first occurrence of `item`.
    pub fn index_of(&self, item: &Value) -> Option<usize> {
        self.flatten().iter().position(|v| v == item)
    }

    /// Leaves in depth-first order.
    pub fn flatten(&self) -> Vec<Value> {
        let mut items = Vec::with_capacity(self.item_count());
        self.flatten_into(self.root, &mut items);
        items
    }

    fn flatten_into(&self, group: GroupId, items: &mut Vec<Value>) {
        let Some(node) = self.groups.get(group) else {
            return;
        };
        for child in &node.children {
            match child {
                Child::Item(v) => items.push(v.clone()),
                Child::Group(id) => self.flatten_into(*id, items),
            }
        }
    }

    /// Snapshot of group `id`.
    pub fn snapshot(&self, id: GroupId) -> Option<CollectionViewGroup> {
        let node = self.groups.get(id)?;
        let items = node
            .children
            .iter()
            .filter_map(|child| match child {
                Child::Item(v) => Some(GroupItem::Item(v.clone())),
                Child::Group(g) => self.snapshot(*g).map(GroupItem::Group),
            })
            .collect();
        Some(CollectionViewGroup {
            name: node.name.clone(),
            depth: node.depth,
            item_count: node.item_count,
            is_bottom_level: node.is_bottom_level,
            items,
        })
    }

    /// Snapshot of the root group.
    pub fn root_snapshot(&self) -> CollectionViewGroup {
        self.snapshot(self.root).unwrap_or_else(|| CollectionViewGroup {
            name: Value::Null,
            depth: 0,
            item_count: 0,
            is_bottom_level: self.levels == 0,
            items: Vec::new(),
        })
    }

    /// Render the tree for debugging.
    pub fn dump(&self, options: &TreeFormatOptions) -> String {
        format_tree(&GroupItem::Group(self.root_snapshot()), options)
    }
}

/// A group of a view, as seen by consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionViewGroup {
    /// The name the group description computed.
    pub name: Value,
    /// Distance from the root (the root has depth 0).
    pub depth: usize,
    /// Leaves in this group and its subgroups.
    pub item_count: usize,
    /// Whether this group holds items rather than subgroups.
    pub is_bottom_level: bool,
    /// Subgroups or items, in view order.
    pub items: Vec<GroupItem>,
}

impl CollectionViewGroup {
    /// Direct subgroups.
    pub fn groups(&self) -> impl Iterator<Item = &CollectionViewGroup> {
        self.items.iter().filter_map(GroupItem::as_group)
    }

    /// Direct subgroup named `name`.
    pub fn group(&self, name: &Value) -> Option<&CollectionViewGroup> {
        self.groups().find(|g| g.name == *name)
    }

    /// Direct leaf items.
    pub fn leaves(&self) -> Vec<Value> {
        self.items
            .iter()
            .filter_map(|i| i.as_item().cloned())
            .collect()
    }
}

/// A child of a group: a subgroup or an item.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupItem {
    Group(CollectionViewGroup),
    Item(Value),
}

impl GroupItem {
    pub fn as_group(&self) -> Option<&CollectionViewGroup> {
        match self {
            GroupItem::Group(g) => Some(g),
            GroupItem::Item(_) => None,
        }
    }

    pub fn as_item(&self) -> Option<&Value> {
        match self {
            GroupItem::Item(v) => Some(v),
            GroupItem::Group(_) => None,
        }
    }
}

impl DebugTreeNode for GroupItem {
    fn label(&self) -> String {
        match self {
            GroupItem::Group(g) if g.depth == 0 => "root".to_string(),
            GroupItem::Group(g) if g.name.is_null() => "<null>".to_string(),
            GroupItem::Group(g) => g.name.to_display_string(),
            GroupItem::Item(v) => format!("{v:?}"),
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            GroupItem::Group(g) => Some(format!("{} items", g.item_count)),
            GroupItem::Item(_) => None,
        }
    }

    fn is_leaf(&self) -> bool {
        matches!(self, GroupItem::Item(_))
    }

    fn children(&self) -> Vec<Self> {
        match self {
            GroupItem::Group(g) => g.items.clone(),
            GroupItem::Item(_) => Vec::new(),
        }
    }
}
