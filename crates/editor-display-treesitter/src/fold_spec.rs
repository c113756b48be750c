//! Declarative fold rules evaluated against syntax nodes.
//!
//! A [`FoldSpec`] names the node types it applies to and, optionally, how to find the fold's
//! boundaries among the node's children. Without a start boundary the fold starts at the end of
//! the node's first row; without an end boundary it ends with the node itself.

use editor_display::{BufferText, INFINITY, Point, Range};
use tree_sitter::Node;

/// Matches a node by type and namedness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeMatcher {
    kind: String,
    named: bool,
}

impl NodeMatcher {
    /// A named node of type `kind`.
    pub fn named(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            named: true,
        }
    }

    /// An anonymous node (keyword or punctuation) with literal text `kind`.
    pub fn anonymous(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            named: false,
        }
    }

    /// `"{"` (quoted) is an anonymous node, anything else a named one.
    pub fn parse(source: &str) -> Self {
        match source
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
        {
            Some(literal) => Self::anonymous(literal),
            None => Self::named(source),
        }
    }

    /// Returns true if `node` has this matcher's type and namedness.
    pub fn matches(&self, node: &Node<'_>) -> bool {
        node.kind() == self.kind && node.is_named() == self.named
    }
}

fn matches_any(matchers: &[NodeMatcher], node: &Node<'_>) -> bool {
    matchers.iter().any(|m| m.matches(node))
}

/// Locates one end of a fold among a node's children.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FoldBoundary {
    index: Option<isize>,
    matchers: Vec<NodeMatcher>,
}

impl FoldBoundary {
    /// The child at `index`; negative indices count from the last child.
    pub fn child(index: isize) -> Self {
        Self {
            index: Some(index),
            matchers: Vec::new(),
        }
    }

    /// The first child matching one of `types` (see [`NodeMatcher::parse`]).
    pub fn first_of<'s>(types: impl IntoIterator<Item = &'s str>) -> Self {
        Self {
            index: None,
            matchers: types.into_iter().map(NodeMatcher::parse).collect(),
        }
    }

    /// Additionally require the indexed child to match one of `types`.
    pub fn with_types<'s>(mut self, types: impl IntoIterator<Item = &'s str>) -> Self {
        self.matchers = types.into_iter().map(NodeMatcher::parse).collect();
        self
    }

    fn find<'tree>(&self, children: &[Node<'tree>]) -> Option<Node<'tree>> {
        match self.index {
            Some(index) => {
                let resolved = if index < 0 {
                    children.len().checked_sub(index.unsigned_abs())?
                } else {
                    index as usize
                };
                let child = children.get(resolved)?;
                (self.matchers.is_empty() || matches_any(&self.matchers, child)).then_some(*child)
            }
            None => children
                .iter()
                .find(|child| matches_any(&self.matchers, child))
                .copied(),
        }
    }
}

/// One folding rule.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FoldSpec {
    node_types: Option<Vec<NodeMatcher>>,
    start: Option<FoldBoundary>,
    end: Option<FoldBoundary>,
}

impl FoldSpec {
    /// A rule applying to every node.
    pub fn new() -> Self {
        Self::default()
    }

    /// A rule applying to nodes matching one of `types` (see [`NodeMatcher::parse`]).
    pub fn for_types<'s>(types: impl IntoIterator<Item = &'s str>) -> Self {
        Self {
            node_types: Some(types.into_iter().map(NodeMatcher::parse).collect()),
            ..Self::default()
        }
    }

    /// The fold starts at the end of the row where this child ends.
    pub fn start(mut self, boundary: FoldBoundary) -> Self {
        self.start = Some(boundary);
        self
    }

    /// The fold ends just before this child.
    pub fn end(mut self, boundary: FoldBoundary) -> Self {
        self.end = Some(boundary);
        self
    }
}

/// The fold `specs` produce for `node`, trying them in order.
///
/// With `fallback`, a node no spec accepts still folds over its own extent.
pub(crate) fn fold_range_for_node(
    specs: &[FoldSpec],
    node: Node<'_>,
    text: &BufferText,
    fallback: bool,
) -> Option<Range> {
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();

    for spec in specs {
        if let Some(types) = &spec.node_types
            && !matches_any(types, &node)
        {
            continue;
        }

        let fold_start = match &spec.start {
            Some(boundary) => {
                let Some(start_node) = boundary.find(&children) else {
                    continue;
                };
                Point::new(text.position_for_byte_index(start_node.end_byte()).row, INFINITY)
            }
            None => Point::new(text.position_for_byte_index(node.start_byte()).row, INFINITY),
        };

        let fold_end = match &spec.end {
            Some(boundary) => {
                let Some(end_node) = boundary.find(&children) else {
                    continue;
                };
                let end = text.position_for_byte_index(end_node.start_byte());
                if end.row <= fold_start.row {
                    continue;
                }
                if has_word_character_after(text, end) {
                    Point::new(end.row - 1, INFINITY)
                } else {
                    end
                }
            }
            None => match default_fold_end(node, !children.is_empty(), text) {
                Some(end) => end,
                None => continue,
            },
        };

        return Some(Range::new(fold_start, fold_end));
    }

    if fallback {
        let start = Point::new(text.position_for_byte_index(node.start_byte()).row, INFINITY);
        let end = default_fold_end(node, !children.is_empty(), text)?;
        return Some(Range::new(start, end));
    }
    None
}

fn default_fold_end(node: Node<'_>, has_children: bool, text: &BufferText) -> Option<Point> {
    let end = text.position_for_byte_index(node.end_byte());
    Some(if end.column == 0 {
        Point::new(end.row.checked_sub(1)?, INFINITY)
    } else if has_children {
        end
    } else {
        Point::new(end.row, 0)
    })
}

fn has_word_character_after(text: &BufferText, position: Point) -> bool {
    text.line_for_row(position.row)
        .chars()
        .skip(position.column)
        .any(|c| c.is_ascii_alphanumeric() || c == '_')
}
