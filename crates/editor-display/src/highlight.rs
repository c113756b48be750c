//! The highlight iterator contract shared by every tokenizer back end.
//!
//! A highlight iterator walks scope boundaries in document order. Renderers seek to the first
//! visible position, then call [`HighlightIterator::move_to_successor`] repeatedly, opening and
//! closing scopes as they go.

use crate::point::Point;
use crate::scope::ScopeId;

/// Walks the scope boundaries of a buffer.
///
/// Successive calls to [`move_to_successor`](HighlightIterator::move_to_successor) visit
/// strictly increasing positions. When scopes both close and open at one position, the
/// iterator reports them in the same step: closes first, then opens.
pub trait HighlightIterator {
    /// Jump to `position` and return the ids of the scopes open before it, outermost first.
    ///
    /// The iterator is left on the first boundary at or after `position`; scopes opening exactly
    /// at `position` are reported by that boundary, not by the returned list.
    fn seek(&mut self, position: Point) -> Vec<ScopeId>;

    /// Advance to the next boundary. Returns false once no boundaries remain.
    fn move_to_successor(&mut self) -> bool;

    /// Position of the current boundary.
    fn position(&self) -> Point;

    /// Scopes closing at the current boundary.
    fn close_scope_ids(&self) -> Vec<ScopeId>;

    /// Scopes opening at the current boundary.
    fn open_scope_ids(&self) -> Vec<ScopeId>;
}

/// Iterator for buffers without a grammar: no scopes anywhere.
#[derive(Debug, Clone, Default)]
pub struct NullHighlightIterator {
    end: Point,
}

impl NullHighlightIterator {
    /// An iterator whose only boundary is the end of the document.
    pub fn new(end: Point) -> Self {
        Self { end }
    }
}

impl HighlightIterator for NullHighlightIterator {
    fn seek(&mut self, _position: Point) -> Vec<ScopeId> {
        Vec::new()
    }

    fn move_to_successor(&mut self) -> bool {
        false
    }

    fn position(&self) -> Point {
        self.end
    }

    fn close_scope_ids(&self) -> Vec<ScopeId> {
        Vec::new()
    }

    fn open_scope_ids(&self) -> Vec<ScopeId> {
        Vec::new()
    }
}
