//! The tree-sitter language mode.
//!
//! One syntax tree covers the whole buffer. Edits are described to the tree immediately
//! ([`LanguageMode::buffer_did_change`]) but the reparse is deferred to the next
//! [`LanguageMode::update_highlights`] call, which reports the ranges whose syntax changed.
//!
//! Indentation suggestions are not derived from the tree: they go through the same
//! [`IndentationPolicy`] the regex-based mode uses, evaluated at the root scope.

mod folding;

use crate::error::TreeSitterError;
use crate::grammar::TreeSitterGrammar;
use crate::highlight::LayerHighlightIterator;
use crate::input::BufferTextInput;
use editor_display::language_mode::{
    CommentStrings, LanguageModeCallback, LanguageModeEmitter, LanguageModeEvent,
    non_word_characters_for_scope,
};
use editor_display::{
    BufferChange, BufferText, HighlightIterator, IndentationPolicy, LanguageMode, LanguageModeId,
    NullHighlightIterator, Point, Range, ScopeDescriptor, ScopeId, ScopeSelector, ScopedSettings,
    TokenizedLine,
};
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use streaming_iterator::StreamingIterator;
use tree_sitter::{InputEdit, Node, Parser, QueryCursor, Tree};

/// How the mode brought its tree up to date on the last update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeSitterUpdateMode {
    /// First parse, performed when the mode was created.
    Initial,
    /// Reparsed incrementally from the edited previous tree.
    Incremental,
    /// Parsed from scratch (no usable previous tree).
    FullReparse,
    /// The tree was already current.
    Skipped,
}

/// A [`LanguageMode`] backed by an incrementally maintained tree-sitter syntax tree.
pub struct TreeSitterLanguageMode {
    id: LanguageModeId,
    grammar: Arc<TreeSitterGrammar>,
    parser: Parser,
    tree: Option<Tree>,
    edited_range: Option<Range>,
    needs_parse: bool,
    reported_initial_parse: bool,
    last_update_mode: TreeSitterUpdateMode,
    fold_nodes: HashSet<usize>,
    is_foldable_cache: RefCell<Vec<Option<bool>>>,
    settings: Arc<ScopedSettings>,
    indentation: IndentationPolicy,
    emitter: LanguageModeEmitter,
    alive: bool,
}

impl fmt::Debug for TreeSitterLanguageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeSitterLanguageMode")
            .field("id", &self.id)
            .field("scope", &self.grammar.scope_name())
            .field("has_tree", &self.tree.is_some())
            .field("needs_parse", &self.needs_parse)
            .field("last_update_mode", &self.last_update_mode)
            .field("alive", &self.alive)
            .finish()
    }
}

impl TreeSitterLanguageMode {
    /// Create a mode and parse `text`.
    ///
    /// Subscribers registered afterwards still receive [`LanguageModeEvent::DidTokenize`]: it is
    /// emitted by the first [`LanguageMode::update_highlights`] call.
    pub fn new(
        id: LanguageModeId,
        grammar: Arc<TreeSitterGrammar>,
        text: &BufferText,
        settings: Arc<ScopedSettings>,
    ) -> Result<Self, TreeSitterError> {
        let mut parser = Parser::new();
        parser
            .set_language(grammar.language())
            .map_err(|e| TreeSitterError::Language(e.to_string()))?;
        let tree = parse_text(&mut parser, text, None);
        if tree.is_none() {
            tracing::warn!(language_mode = id.get(), "initial parse produced no tree");
        }

        let mut mode = Self {
            id,
            grammar,
            parser,
            tree,
            edited_range: None,
            needs_parse: false,
            reported_initial_parse: false,
            last_update_mode: TreeSitterUpdateMode::Initial,
            fold_nodes: HashSet::new(),
            is_foldable_cache: RefCell::new(vec![None; text.line_count()]),
            indentation: IndentationPolicy::new(settings.clone()),
            settings,
            emitter: LanguageModeEmitter::new(),
            alive: true,
        };
        mode.refresh_fold_nodes(text);
        tracing::debug!(
            language_mode = id.get(),
            scope = mode.grammar.scope_name(),
            "tree-sitter language mode created"
        );
        Ok(mode)
    }

    /// The grammar.
    pub fn grammar(&self) -> &Arc<TreeSitterGrammar> {
        &self.grammar
    }

    /// The current syntax tree. After an edit it reflects the edit's byte shifts but not its
    /// syntax until [`LanguageMode::update_highlights`] runs.
    pub fn tree(&self) -> Option<&Tree> {
        self.tree.as_ref()
    }

    /// How the last update was performed.
    pub fn last_update_mode(&self) -> TreeSitterUpdateMode {
        self.last_update_mode
    }

    /// Extent of the smallest syntax node that strictly contains `range`.
    pub fn range_for_syntax_node_containing_range(&self, text: &BufferText, range: Range) -> Option<Range> {
        self.syntax_node_containing_range(text, range, |_| true)
            .map(|node| node_range(text, &node))
    }

    fn syntax_node_containing_range<'t>(
        &'t self,
        text: &BufferText,
        range: Range,
        predicate: impl Fn(&Node<'t>) -> bool,
    ) -> Option<Node<'t>> {
        let tree = self.tree.as_ref().filter(|_| self.alive)?;
        let start = text.byte_index_for_position(range.start);
        let end = text.byte_index_for_position(range.end);
        let search_end = end.saturating_sub(1).max(start);

        let mut node = tree.root_node().descendant_for_byte_range(start, search_end);
        while let Some(current) = node {
            if node_contains_indices(&current, start, end) && predicate(&current) {
                return Some(current);
            }
            node = current.parent();
        }
        None
    }

    fn refresh_fold_nodes(&mut self, text: &BufferText) {
        self.fold_nodes.clear();
        let (Some(query), Some(tree)) = (self.grammar.folds_query(), self.tree.as_ref()) else {
            return;
        };
        let source = text.text();
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(query, tree.root_node(), source.as_bytes());
        while let Some(m) = matches.next() {
            for capture in m.captures {
                self.fold_nodes.insert(capture.node.id());
            }
        }
    }

    fn emit_range_update(&mut self, range: Range) {
        {
            let mut cache = self.is_foldable_cache.borrow_mut();
            for row in range.start.row..range.end.row {
                if let Some(slot) = cache.get_mut(row) {
                    *slot = None;
                }
            }
        }
        self.emitter
            .emit(LanguageModeEvent::DidChangeHighlighting { range });
    }

    fn suggested_indent(&self, text: &BufferText, row: usize, line: &str, tab_length: usize, skip_blank_lines: bool) -> f64 {
        self.indentation.suggested_indent_for_line_with_scope(
            text,
            row,
            line,
            &self.root_scope_descriptor(),
            tab_length,
            skip_blank_lines,
            &|r| self.is_row_commented(text, r),
        )
    }
}

fn parse_text(parser: &mut Parser, text: &BufferText, old_tree: Option<&Tree>) -> Option<Tree> {
    let mut input = BufferTextInput::new(text);
    parser.parse_with_options(&mut |byte, _point| input.read(byte), old_tree, None)
}

fn ts_point(text: &BufferText, position: Point) -> tree_sitter::Point {
    tree_sitter::Point {
        row: position.row,
        column: text.byte_column_for_position(position),
    }
}

fn advance_point(mut point: tree_sitter::Point, text: &str) -> tree_sitter::Point {
    let mut parts = text.split('\n');
    let Some(first) = parts.next() else {
        return point;
    };

    point.column = point.column.saturating_add(first.len());
    for part in parts {
        point.row = point.row.saturating_add(1);
        point.column = part.len();
    }
    point
}

fn node_range(text: &BufferText, node: &Node<'_>) -> Range {
    Range::new(
        text.position_for_byte_index(node.start_byte()),
        text.position_for_byte_index(node.end_byte()),
    )
}

fn node_contains_indices(node: &Node<'_>, start: usize, end: usize) -> bool {
    if node.start_byte() < start {
        node.end_byte() >= end
    } else if node.start_byte() == start {
        node.end_byte() > end
    } else {
        false
    }
}

fn whole_document(text: &BufferText) -> Range {
    Range::new(Point::zero(), text.end_position())
}

impl LanguageMode for TreeSitterLanguageMode {
    fn id(&self) -> LanguageModeId {
        self.id
    }

    fn root_scope_descriptor(&self) -> ScopeDescriptor {
        ScopeDescriptor::from_scopes([self.grammar.scope_name()])
    }

    fn scope_name_for_id(&self, id: ScopeId) -> Option<String> {
        self.grammar.registry().scope_for_id(id).map(str::to_string)
    }

    fn buffer_did_change(&mut self, text: &BufferText, change: &BufferChange) {
        if !self.alive {
            return;
        }
        let old_range = change.old_range;
        let new_range = change.new_range;

        {
            let mut cache = self.is_foldable_cache.borrow_mut();
            let start = new_range.start.row;
            let removed = old_range.end.row - old_range.start.row;
            let inserted = new_range.end.row - new_range.start.row;
            if cache.len() < start + removed {
                cache.resize(start + removed, None);
            }
            cache.splice(start..start + removed, std::iter::repeat_n(None, inserted));
            for row in new_range.start.row..=new_range.end.row {
                if let Some(slot) = cache.get_mut(row) {
                    *slot = None;
                }
            }
        }

        if let Some(tree) = self.tree.as_mut() {
            let start_byte = text.byte_index_for_position(new_range.start);
            let start_position = ts_point(text, new_range.start);
            tree.edit(&InputEdit {
                start_byte,
                old_end_byte: start_byte + change.old_text.len(),
                new_end_byte: start_byte + change.new_text.len(),
                start_position,
                old_end_position: advance_point(start_position, &change.old_text),
                new_end_position: advance_point(start_position, &change.new_text),
            });

            self.edited_range = Some(match self.edited_range {
                Some(mut edited) => {
                    if new_range.start < edited.start {
                        edited.start = new_range.start;
                    }
                    edited.end = if old_range.end < edited.end {
                        new_range
                            .end
                            .traverse(edited.end.traversal_from(old_range.end))
                    } else {
                        new_range.end
                    };
                    edited
                }
                None => new_range,
            });
        }
        self.needs_parse = true;
    }

    fn build_highlight_iterator<'a>(&'a self, text: &'a BufferText) -> Box<dyn HighlightIterator + 'a> {
        match self.tree.as_ref().filter(|_| self.alive) {
            Some(tree) => Box::new(LayerHighlightIterator::new(&self.grammar, text, tree.walk())),
            None => Box::new(NullHighlightIterator::new(text.end_position())),
        }
    }

    fn update_highlights(&mut self, text: &BufferText) -> Vec<Range> {
        if !self.alive {
            return Vec::new();
        }

        let mut changed = Vec::new();
        if self.needs_parse || self.tree.is_none() {
            self.needs_parse = false;
            let affected = self.edited_range.take();
            let Some(new_tree) = parse_text(&mut self.parser, text, self.tree.as_ref()) else {
                tracing::warn!(language_mode = self.id.get(), "reparse produced no tree");
                return changed;
            };

            match self.tree.take() {
                Some(old_tree) => {
                    let syntax_changes: Vec<Range> = old_tree
                        .changed_ranges(&new_tree)
                        .map(|r| {
                            Range::new(
                                text.position_for_byte_index(r.start_byte),
                                text.position_for_byte_index(r.end_byte),
                            )
                        })
                        .collect();
                    self.last_update_mode = TreeSitterUpdateMode::Incremental;
                    tracing::debug!(
                        language_mode = self.id.get(),
                        changed_ranges = syntax_changes.len(),
                        "incremental reparse"
                    );
                    if let Some(affected) = affected {
                        if syntax_changes.is_empty() {
                            changed.push(affected);
                        } else {
                            changed.extend(syntax_changes);
                        }
                    }
                }
                None => {
                    self.last_update_mode = TreeSitterUpdateMode::FullReparse;
                    tracing::debug!(language_mode = self.id.get(), "full reparse");
                    changed.push(whole_document(text));
                }
            }
            self.tree = Some(new_tree);
            self.refresh_fold_nodes(text);
        } else {
            self.last_update_mode = TreeSitterUpdateMode::Skipped;
        }

        let first_report = !self.reported_initial_parse && self.tree.is_some();
        if first_report {
            self.reported_initial_parse = true;
            changed = vec![whole_document(text)];
        }
        for range in &changed {
            self.emit_range_update(*range);
        }
        if first_report {
            self.emitter.emit(LanguageModeEvent::DidTokenize);
        }
        changed
    }

    fn tokenize_next_chunk(&mut self, text: &BufferText) -> bool {
        if self.has_pending_work() {
            self.update_highlights(text);
        }
        false
    }

    fn has_pending_work(&self) -> bool {
        self.alive && (self.needs_parse || !self.reported_initial_parse)
    }

    fn is_fully_tokenized(&self) -> bool {
        self.tree.is_some() && !self.needs_parse
    }

    fn tokenized_line_for_row(&self, text: &BufferText, row: usize) -> TokenizedLine {
        TokenizedLine::untagged(
            text.line_for_row(row),
            text.line_ending_for_row(row),
            self.grammar.registry().clone(),
        )
    }

    fn scope_descriptor_for_position(&self, text: &BufferText, position: Point) -> ScopeDescriptor {
        let position = text.clip_position(position);
        let mut iterator = self.build_highlight_iterator(text);
        let mut ids = iterator.seek(position);
        // Between tokens the iterator rests at the next boundary; its scopes start later.
        if iterator.position() == position {
            ids.extend(iterator.open_scope_ids());
        }

        let root = self.grammar.scope_name();
        let mut scopes = self.grammar.registry().names_for_ids(&ids);
        if scopes.first().map(String::as_str) != Some(root) {
            scopes.insert(0, root.to_string());
        }
        ScopeDescriptor::from_scopes(scopes)
    }

    fn buffer_range_for_scope_at_position(
        &self,
        text: &BufferText,
        selector: &str,
        position: Point,
    ) -> Option<Range> {
        let selector = ScopeSelector::parse(selector);
        self.syntax_node_containing_range(text, Range::empty_at(position), |node| {
            selector.matches_scope(node.kind())
        })
        .map(|node| node_range(text, &node))
    }

    fn is_row_commented(&self, text: &BufferText, row: usize) -> bool {
        let Some(column) = text
            .line_for_row(row)
            .chars()
            .position(|c| !c.is_whitespace())
        else {
            return false;
        };
        let range = Range::new((row, column), (row, column + 1));
        let Some(mut node) = self.syntax_node_containing_range(text, range, |_| true) else {
            return false;
        };
        // A comment's delimiter may be its own node; look through ancestors starting at the same
        // character.
        loop {
            if node.kind().contains("comment") {
                return true;
            }
            match node.parent() {
                Some(parent) if parent.start_byte() == node.start_byte() => node = parent,
                _ => return false,
            }
        }
    }

    fn is_foldable_at_row(&self, text: &BufferText, row: usize) -> bool {
        folding::is_foldable_at_row(self, text, row)
    }

    fn foldable_range_containing_point(
        &self,
        text: &BufferText,
        point: Point,
        _tab_length: usize,
    ) -> Option<Range> {
        folding::foldable_range_containing_point(self, text, point, false)
    }

    fn foldable_ranges(&self, text: &BufferText, _tab_length: usize) -> Vec<Range> {
        folding::foldable_ranges_at_indent_level(self, text, None)
    }

    fn foldable_ranges_at_indent_level(
        &self,
        text: &BufferText,
        level: usize,
        _tab_length: usize,
    ) -> Vec<Range> {
        folding::foldable_ranges_at_indent_level(self, text, Some(level))
    }

    fn suggested_indent_for_buffer_row(
        &self,
        text: &BufferText,
        row: usize,
        tab_length: usize,
        skip_blank_lines: bool,
    ) -> f64 {
        self.suggested_indent(text, row, &text.line_for_row(row), tab_length, skip_blank_lines)
    }

    fn suggested_indent_for_line_at_buffer_row(
        &self,
        text: &BufferText,
        row: usize,
        line: &str,
        tab_length: usize,
    ) -> f64 {
        self.suggested_indent(text, row, line, tab_length, true)
    }

    fn suggested_indent_for_edited_buffer_row(
        &self,
        text: &BufferText,
        row: usize,
        tab_length: usize,
    ) -> Option<f64> {
        let scope = self.scope_descriptor_for_position(text, Point::new(row, 0));
        self.indentation
            .suggested_indent_for_edited_row(text, row, &scope, tab_length)
    }

    fn non_word_characters(&self, text: &BufferText, position: Point) -> String {
        let scope = self.scope_descriptor_for_position(text, position);
        non_word_characters_for_scope(&self.settings, &scope)
    }

    fn comment_strings_for_position(&self, _text: &BufferText, _position: Point) -> CommentStrings {
        let own = self.grammar.comment_strings();
        if own.comment_start.is_some() {
            return own.clone();
        }
        CommentStrings::from_settings(&self.settings, &self.root_scope_descriptor())
    }

    fn subscribe(&mut self, callback: LanguageModeCallback) {
        self.emitter.subscribe(callback);
    }

    fn destroy(&mut self) {
        if !self.alive {
            return;
        }
        self.alive = false;
        self.tree = None;
        self.edited_range = None;
        self.fold_nodes.clear();
        self.is_foldable_cache.borrow_mut().clear();
        self.emitter.clear();
    }

    fn is_alive(&self) -> bool {
        self.alive
    }
}
