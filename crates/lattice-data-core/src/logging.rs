//! Logging and debugging facilities for Lattice Data.
//!
//! This module provides:
//! - Target names for filtering `tracing` output per subsystem
//! - A generic tree formatter used to dump grouping trees
//! - Performance tracing hooks for profiling recomputation
//!
//! # Tracing Integration
//!
//! Lattice Data uses the `tracing` crate for instrumentation. To see logs,
//! install a tracing subscriber in your application:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("lattice_data::view=debug")
//!     .init();
//! ```

use std::fmt::Write as FmtWrite;

/// Span names used throughout Lattice Data for tracing.
pub mod span_names {
    /// Collection view recomputation span.
    pub const REFRESH: &str = "lattice_data::refresh";
    /// Source change mirroring span.
    pub const SOURCE_CHANGE: &str = "lattice_data::source_change";
    /// Path resolution span.
    pub const PATH: &str = "lattice_data::path";
}

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Core crate target.
    pub const CORE: &str = "lattice_data_core";
    /// Signal/slot system target.
    pub const SIGNAL: &str = "lattice_data_core::signal";
    /// Observable list target.
    pub const LIST: &str = "lattice_data_core::list";
    /// Dynamic object target.
    pub const OBJECT: &str = "lattice_data_core::object";
    /// Property path target.
    pub const PATH: &str = "lattice_data::path";
    /// Collection view target.
    pub const VIEW: &str = "lattice_data::view";
    /// Binding target.
    pub const BINDING: &str = "lattice_data::binding";
    /// Performance spans.
    pub const PERF: &str = "lattice_data::perf";
}

/// Style options for tree visualization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TreeStyle {
    /// ASCII characters for tree branches.
    Ascii,
    /// Unicode box-drawing characters.
    #[default]
    Unicode,
    /// Compact single-line representation.
    Compact,
}

/// Configuration for tree debug output.
#[derive(Debug, Clone)]
pub struct TreeFormatOptions {
    /// The style of tree visualization.
    pub style: TreeStyle,
    /// Whether to show per-node details (such as item counts).
    pub show_details: bool,
    /// Whether to list leaf entries.
    pub show_leaves: bool,
    /// Maximum depth to traverse (None for unlimited).
    pub max_depth: Option<usize>,
    /// Indent size for each level.
    pub indent_size: usize,
}

impl Default for TreeFormatOptions {
    fn default() -> Self {
        Self {
            style: TreeStyle::default(),
            show_details: true,
            show_leaves: true,
            max_depth: None,
            indent_size: 2,
        }
    }
}

impl TreeFormatOptions {
    /// Create options for minimal output: group labels only.
    pub fn minimal() -> Self {
        Self {
            show_details: false,
            show_leaves: false,
            ..Default::default()
        }
    }
}

/// A node that can be rendered by [`format_tree`].
pub trait DebugTreeNode {
    /// The label printed for this node.
    fn label(&self) -> String;

    /// Optional details printed after the label (shown with `show_details`).
    fn details(&self) -> Option<String> {
        None
    }

    /// Whether this node is a leaf entry (hidden unless `show_leaves`).
    fn is_leaf(&self) -> bool {
        false
    }

    /// The children of this node, in display order.
    fn children(&self) -> Vec<Self>
    where
        Self: Sized;
}

/// Render a tree rooted at `root` into a string.
pub fn format_tree<N: DebugTreeNode>(root: &N, options: &TreeFormatOptions) -> String {
    let mut output = String::new();
    format_subtree_into(root, 0, true, options, &mut output);
    output
}

fn format_subtree_into<N: DebugTreeNode>(
    node: &N,
    depth: usize,
    is_last: bool,
    options: &TreeFormatOptions,
    output: &mut String,
) {
    if let Some(max) = options.max_depth {
        if depth > max {
            return;
        }
    }

    output.push_str(&build_prefix(depth, is_last, options));
    output.push_str(&node.label());
    if options.show_details {
        if let Some(details) = node.details() {
            // Writing to a String cannot fail.
            let _ = write!(output, " ({details})");
        }
    }
    output.push('\n');

    let children: Vec<N> = node
        .children()
        .into_iter()
        .filter(|child| options.show_leaves || !child.is_leaf())
        .collect();
    let child_count = children.len();
    for (i, child) in children.iter().enumerate() {
        format_subtree_into(child, depth + 1, i + 1 == child_count, options, output);
    }
}

/// Build the prefix string for a tree node.
fn build_prefix(depth: usize, is_last: bool, options: &TreeFormatOptions) -> String {
    if depth == 0 {
        return String::new();
    }

    let (branch, corner, last) = match options.style {
        TreeStyle::Ascii => ("|", "+--", "`--"),
        TreeStyle::Unicode => ("\u{2502}", "\u{251c}\u{2500}\u{2500}", "\u{2514}\u{2500}\u{2500}"),
        TreeStyle::Compact => ("", "-", "-"),
    };

    let mut prefix = String::new();
    for _ in 0..(depth - 1) {
        prefix.push_str(branch);
        for _ in 0..options.indent_size {
            prefix.push(' ');
        }
    }
    prefix.push_str(if is_last { last } else { corner });
    prefix.push(' ');
    prefix
}

/// A guard that keeps a tracing span entered until dropped.
///
/// This is useful for tracking the duration of operations.
#[derive(Debug)]
pub struct PerfSpan {
    #[allow(dead_code)]
    span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Create a new performance span.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!(target: targets::PERF, "perf", operation = name);
        Self {
            span: span.entered(),
        }
    }
}

/// Wrappers around the `tracing` macros with consistent target naming.
#[macro_export]
macro_rules! data_trace {
    ($($arg:tt)*) => {
        tracing::trace!(target: $crate::logging::targets::CORE, $($arg)*)
    };
}

#[macro_export]
macro_rules! data_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: $crate::logging::targets::CORE, $($arg)*)
    };
}
