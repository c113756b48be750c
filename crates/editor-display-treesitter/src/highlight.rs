//! Highlight iteration over a syntax tree.

use crate::grammar::TreeSitterGrammar;
use editor_display::{BufferText, HighlightIterator, Point, ScopeId};
use tree_sitter::TreeCursor;

/// Walks a syntax tree, reporting the scopes the grammar's scope map assigns to each node.
///
/// The iterator always rests at the start or the end of some node. To match selectors against
/// the current node it keeps the types of the node's ancestors, along with each one's index
/// among its siblings and its end offset.
pub struct LayerHighlightIterator<'a> {
    grammar: &'a TreeSitterGrammar,
    text: &'a BufferText,
    cursor: TreeCursor<'a>,
    at_end: bool,
    done: bool,
    containing_node_types: Vec<&'static str>,
    containing_node_child_indices: Vec<Option<usize>>,
    containing_node_end_indices: Vec<usize>,
    close_tags: Vec<ScopeId>,
    open_tags: Vec<ScopeId>,
}

impl<'a> LayerHighlightIterator<'a> {
    /// An iterator over the tree `cursor` walks. Call [`HighlightIterator::seek`] first.
    pub fn new(grammar: &'a TreeSitterGrammar, text: &'a BufferText, cursor: TreeCursor<'a>) -> Self {
        Self {
            grammar,
            text,
            cursor,
            at_end: false,
            done: false,
            containing_node_types: Vec::new(),
            containing_node_child_indices: Vec::new(),
            containing_node_end_indices: Vec::new(),
            close_tags: Vec::new(),
            open_tags: Vec::new(),
        }
    }

    /// Byte offset of the current boundary (`usize::MAX` once done).
    pub fn index(&self) -> usize {
        if self.done {
            usize::MAX
        } else if self.at_end {
            self.cursor.node().end_byte()
        } else {
            self.cursor.node().start_byte()
        }
    }

    fn push_containing(&mut self, child_index: Option<usize>) {
        let node = self.cursor.node();
        self.containing_node_types.push(node.kind());
        self.containing_node_child_indices.push(child_index);
        self.containing_node_end_indices.push(node.end_byte());
    }

    fn pop_containing(&mut self) {
        self.containing_node_types.pop();
        self.containing_node_child_indices.pop();
        self.containing_node_end_indices.pop();
    }

    fn move_up(&mut self, mut at_last_child: bool) -> bool {
        let mut result = false;
        let end_index = self.cursor.node().end_byte();
        let mut depth = self.containing_node_end_indices.len();

        // Stay put until every child of this node has been visited.
        while depth > 1 && (at_last_child || self.containing_node_end_indices[depth - 2] == end_index) {
            at_last_child = false;
            result = true;
            self.cursor.goto_parent();
            self.pop_containing();
            depth -= 1;
            if let Some(scope) = self.current_scope_id() {
                self.close_tags.push(scope);
            }
        }
        result
    }

    fn move_down(&mut self) -> bool {
        let mut result = false;
        let start_index = self.cursor.node().start_byte();

        while self.cursor.goto_first_child() {
            // Once a boundary has been found, do not descend into a child starting later.
            if (!self.close_tags.is_empty() || !self.open_tags.is_empty())
                && self.cursor.node().start_byte() > start_index
            {
                self.cursor.goto_parent();
                break;
            }

            result = true;
            self.push_containing(Some(0));
            if let Some(scope) = self.current_scope_id() {
                self.open_tags.push(scope);
            }
        }
        result
    }

    fn move_right(&mut self) -> bool {
        if !self.cursor.goto_next_sibling() {
            return false;
        }
        let node = self.cursor.node();
        let depth = self.containing_node_types.len();
        if depth > 0 {
            self.containing_node_types[depth - 1] = node.kind();
            self.containing_node_child_indices[depth - 1] =
                self.containing_node_child_indices[depth - 1].map(|i| i + 1);
            self.containing_node_end_indices[depth - 1] = node.end_byte();
        }
        true
    }

    fn current_scope_id(&self) -> Option<ScopeId> {
        let node = self.cursor.node();
        let text = self.text;
        let load = || text.text_for_byte_range(node.start_byte(), node.end_byte());
        let scope = self.grammar.scope_map().scope_for(
            &self.containing_node_types,
            &self.containing_node_child_indices,
            node.is_named(),
            &load,
        )?;
        self.grammar.registry().id_for_scope(scope)
    }
}

impl HighlightIterator for LayerHighlightIterator<'_> {
    fn seek(&mut self, position: Point) -> Vec<ScopeId> {
        while self.cursor.goto_parent() {}

        self.done = false;
        self.at_end = true;
        self.close_tags.clear();
        self.open_tags.clear();
        self.containing_node_types.clear();
        self.containing_node_child_indices.clear();
        self.containing_node_end_indices.clear();

        let mut containing_tags = Vec::new();
        let mut containing_tag_end_indices = Vec::new();
        let target_index = self.text.byte_index_for_position(position);
        if target_index >= self.cursor.node().end_byte() {
            self.done = true;
            return containing_tags;
        }

        let mut child_index = None;
        loop {
            self.push_containing(child_index);

            if let Some(scope) = self.current_scope_id() {
                let node = self.cursor.node();
                if node.start_byte() < target_index {
                    containing_tags.push(scope);
                    containing_tag_end_indices.push(node.end_byte());
                } else {
                    self.at_end = false;
                    self.open_tags.push(scope);
                    self.move_down();
                    break;
                }
            }

            child_index = self.cursor.goto_first_child_for_byte(target_index);
            if child_index.is_none() {
                break;
            }
            if self.cursor.node().start_byte() >= target_index {
                self.at_end = false;
            }
        }

        if self.at_end {
            let current_index = self.cursor.node().end_byte();
            for (scope, end) in containing_tags.iter().zip(&containing_tag_end_indices) {
                if *end == current_index {
                    self.close_tags.push(*scope);
                }
            }
        }

        containing_tags
    }

    fn move_to_successor(&mut self) -> bool {
        self.close_tags.clear();
        self.open_tags.clear();

        while !self.done && self.close_tags.is_empty() && self.open_tags.is_empty() {
            if self.at_end {
                if self.move_right() {
                    if let Some(scope) = self.current_scope_id() {
                        self.open_tags.push(scope);
                    }
                    self.at_end = false;
                    self.move_down();
                } else if self.move_up(true) {
                    self.at_end = true;
                } else {
                    self.done = true;
                }
            } else if !self.move_down() {
                if let Some(scope) = self.current_scope_id() {
                    self.close_tags.push(scope);
                }
                self.at_end = true;
                self.move_up(false);
            }
        }
        !self.done
    }

    fn position(&self) -> Point {
        if self.done {
            self.text.end_position()
        } else {
            self.text.position_for_byte_index(self.index())
        }
    }

    fn close_scope_ids(&self) -> Vec<ScopeId> {
        self.close_tags.clone()
    }

    fn open_scope_ids(&self) -> Vec<ScopeId> {
        self.open_tags.clone()
    }
}
