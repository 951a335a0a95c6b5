//! Property paths.
//!
//! A property path such as `Customer.Address.City`, `Items[2].Name` or
//! `(Grid.Row)` describes how to reach a value from a root object. It is
//! parsed once into a [`PropertyPath`] and then either resolved one-shot
//! ([`PropertyPath::resolve`], used by sorting and grouping) or walked live by
//! a [`PathWalker`], which keeps one [`PathNode`] per step subscribed to its
//! source and re-resolves the tail of the chain whenever a link changes.
//!
//! # Syntax
//!
//! - `Name` - a member, separated by `.`
//! - `[key]` - an indexer; list indices or object indexer keys
//! - `(Owner.Name)` - an attached member defined by `Owner`
//! - the empty path - the root itself
//!
//! Before every written step the parser inserts an implicit current-item step,
//! so a path resolved through a view with a cursor reads from the view's
//! current item unless the member belongs to the view itself.

mod node;
mod step;
mod walker;

use std::fmt;
use std::sync::Arc;

use lattice_data_core::Value;

pub use node::PathNode;
pub use walker::PathWalker;

use crate::error::PathError;
use step::{AttachedStep, CurrentItemStep, IndexStep, MemberStep, PathStep};

/// The result of resolving a path or a single node.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum PathValue {
    /// The source is absent or a member or index could not be resolved.
    #[default]
    Broken,
    /// The path resolved; the value itself may be null.
    Resolved(Value),
}

impl PathValue {
    /// Returns `true` for [`PathValue::Broken`].
    pub fn is_broken(&self) -> bool {
        matches!(self, PathValue::Broken)
    }

    /// The resolved value, or null when broken.
    pub fn value(&self) -> Value {
        match self {
            PathValue::Broken => Value::Null,
            PathValue::Resolved(v) => v.clone(),
        }
    }

    /// Consumes this, returning the resolved value or null when broken.
    pub fn into_value(self) -> Value {
        match self {
            PathValue::Broken => Value::Null,
            PathValue::Resolved(v) => v,
        }
    }
}

/// One written segment of a property path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// `Name`
    Member(String),
    /// `[key]`
    Index(String),
    /// `(Owner.Name)`
    Attached { owner: String, name: String },
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Member(name) => write!(f, "{name}"),
            PathSegment::Index(key) => write!(f, "[{key}]"),
            PathSegment::Attached { owner, name } => write!(f, "({owner}.{name})"),
        }
    }
}

/// A parsed property path.
#[derive(Clone)]
pub struct PropertyPath {
    text: String,
    segments: Vec<PathSegment>,
    steps: Vec<Arc<dyn PathStep>>,
}

impl PropertyPath {
    /// Parse a path.
    ///
    /// # Example
    ///
    /// ```
    /// use lattice_data::{PathSegment, PropertyPath};
    ///
    /// let path = PropertyPath::parse("Orders[0].(Audit.Owner)").unwrap();
    /// assert_eq!(path.segments().len(), 3);
    /// assert_eq!(path.segments()[1], PathSegment::Index("0".into()));
    /// ```
    pub fn parse(text: &str) -> Result<Self, PathError> {
        let segments = parse_segments(text)?;
        let steps = build_steps(&segments);
        Ok(Self {
            text: text.trim().to_string(),
            segments,
            steps,
        })
    }

    /// The empty path, resolving to the root itself.
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            segments: Vec::new(),
            steps: build_steps(&[]),
        }
    }

    /// The path text, trimmed.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Returns `true` if the path has no written segments.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The written segments.
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub(crate) fn steps(&self) -> &[Arc<dyn PathStep>] {
        &self.steps
    }

    /// Resolve the path against `root` once, without subscribing to anything.
    pub fn resolve(&self, root: &Value) -> PathValue {
        let mut current = root.clone();
        for step in &self.steps {
            match step.resolve(&current) {
                PathValue::Broken => return PathValue::Broken,
                PathValue::Resolved(next) => current = next,
            }
        }
        PathValue::Resolved(current)
    }
}

impl Default for PropertyPath {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PropertyPath").field(&self.text).finish()
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl PartialEq for PropertyPath {
    fn eq(&self, other: &Self) -> bool {
        self.segments == other.segments
    }
}

fn build_steps(segments: &[PathSegment]) -> Vec<Arc<dyn PathStep>> {
    if segments.is_empty() {
        return vec![Arc::new(CurrentItemStep { next_member: None })];
    }

    let mut steps: Vec<Arc<dyn PathStep>> = Vec::with_capacity(segments.len() * 2);
    for segment in segments {
        let next_member = match segment {
            PathSegment::Member(name) => Some(name.clone()),
            _ => None,
        };
        steps.push(Arc::new(CurrentItemStep { next_member }));
        match segment {
            PathSegment::Member(name) => steps.push(Arc::new(MemberStep { name: name.clone() })),
            PathSegment::Index(key) => steps.push(Arc::new(IndexStep { key: key.clone() })),
            PathSegment::Attached { owner, name } => steps.push(Arc::new(AttachedStep {
                owner: owner.clone(),
                name: name.clone(),
            })),
        }
    }
    steps
}

fn parse_segments(text: &str) -> Result<Vec<PathSegment>, PathError> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let find_close = |from: usize, close: char| chars[from..].iter().position(|&(_, c)| c == close).map(|off| from + off);

    let mut segments = Vec::new();
    let mut after_segment = false;
    let mut i = 0;

    while i < chars.len() {
        let (pos, c) = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '.' => {
                if !after_segment {
                    return Err(PathError::parse(text, pos, "expected a member before '.'"));
                }
                after_segment = false;
                i += 1;
                let rest = chars[i..].iter().find(|(_, c)| !c.is_whitespace());
                match rest {
                    None => return Err(PathError::parse(text, pos, "path ends with '.'")),
                    Some(&(p, '[')) => {
                        return Err(PathError::parse(text, p, "expected a member after '.'"));
                    }
                    _ => {}
                }
            }
            '[' => {
                let close = find_close(i + 1, ']')
                    .ok_or_else(|| PathError::parse(text, pos, "unterminated indexer"))?;
                let key = text[pos + 1..chars[close].0].trim();
                if key.is_empty() {
                    return Err(PathError::parse(text, pos, "empty indexer"));
                }
                segments.push(PathSegment::Index(key.to_string()));
                after_segment = true;
                i = close + 1;
            }
            '(' => {
                if after_segment {
                    return Err(PathError::parse(text, pos, "expected '.' before attached member"));
                }
                let close = find_close(i + 1, ')')
                    .ok_or_else(|| PathError::parse(text, pos, "unterminated attached member"))?;
                let inner = text[pos + 1..chars[close].0].trim();
                let (owner, name) = inner
                    .rsplit_once('.')
                    .map(|(o, n)| (o.trim(), n.trim()))
                    .filter(|(o, n)| !o.is_empty() && !n.is_empty())
                    .ok_or_else(|| PathError::parse(text, pos, "attached member must be (Owner.Name)"))?;
                segments.push(PathSegment::Attached {
                    owner: owner.to_string(),
                    name: name.to_string(),
                });
                after_segment = true;
                i = close + 1;
            }
            ']' | ')' => {
                return Err(PathError::parse(text, pos, format!("unexpected '{c}'")));
            }
            _ => {
                if after_segment {
                    return Err(PathError::parse(text, pos, "expected '.' between members"));
                }
                let end = chars[i..]
                    .iter()
                    .position(|&(_, c)| matches!(c, '.' | '[' | ']' | '(' | ')'))
                    .map_or(chars.len(), |off| i + off);
                let end_byte = chars.get(end).map_or(text.len(), |&(p, _)| p);
                let name = text[pos..end_byte].trim();
                if name.chars().any(char::is_whitespace) {
                    return Err(PathError::parse(text, pos, "member names cannot contain whitespace"));
                }
                segments.push(PathSegment::Member(name.to_string()));
                after_segment = true;
                i = end;
            }
        }
    }

    Ok(segments)
}
