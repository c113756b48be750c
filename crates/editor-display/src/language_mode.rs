//! The language-mode capability: everything the display layer and the editor need from a
//! tokenizer back end.
//!
//! A language mode is owned by its [`crate::TextBuffer`]. Queries receive the buffer text by
//! reference so the mode never holds a pointer back to the buffer. Edits are forwarded through
//! [`LanguageMode::buffer_did_change`] synchronously; any expensive re-tokenization is deferred
//! to [`LanguageMode::tokenize_next_chunk`] or [`LanguageMode::update_highlights`], which the host
//! schedules.

use crate::buffer_text::{BufferChange, BufferText};
use crate::config::{COMMENT_END, COMMENT_START, DEFAULT_NON_WORD_CHARACTERS, NON_WORD_CHARACTERS, ScopedSettings};
use crate::highlight::{HighlightIterator, NullHighlightIterator};
use crate::ids::LanguageModeId;
use crate::indent::indent_level_for_line;
use crate::point::{Point, Range};
use crate::scope::{ScopeDescriptor, ScopeId, ScopeRegistry};
use crate::tokenized_line::TokenizedLine;
use std::fmt;
use std::sync::Arc;

/// Notifications emitted by a language mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LanguageModeEvent {
    /// Every row has been tokenized. Emitted once per invalidation cycle.
    DidTokenize,
    /// Highlighting changed inside `range`.
    DidChangeHighlighting {
        /// Affected buffer range.
        range: Range,
    },
}

/// Callback invoked with language mode events.
pub type LanguageModeCallback = Box<dyn FnMut(&LanguageModeEvent) + Send>;

/// Subscriber list used by language mode implementations.
#[derive(Default)]
pub struct LanguageModeEmitter {
    callbacks: Vec<LanguageModeCallback>,
}

impl LanguageModeEmitter {
    /// Create an emitter without subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback.
    pub fn subscribe(&mut self, callback: LanguageModeCallback) {
        self.callbacks.push(callback);
    }

    /// Deliver `event` to every subscriber.
    pub fn emit(&mut self, event: LanguageModeEvent) {
        for callback in &mut self.callbacks {
            callback(&event);
        }
    }

    /// Drop every subscriber.
    pub fn clear(&mut self) {
        self.callbacks.clear();
    }
}

impl fmt::Debug for LanguageModeEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LanguageModeEmitter")
            .field("subscribers", &self.callbacks.len())
            .finish()
    }
}

/// Comment delimiters at a position.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommentStrings {
    /// Line comment or block comment opener.
    pub comment_start: Option<String>,
    /// Block comment closer.
    pub comment_end: Option<String>,
}

impl CommentStrings {
    /// Resolve `editor.commentStart` / `editor.commentEnd` at `scope`.
    ///
    /// The end string is only taken from an entry registered under the same selector as the
    /// winning start string.
    pub fn from_settings(settings: &ScopedSettings, scope: &ScopeDescriptor) -> Self {
        let starts = settings.get_all(COMMENT_START, scope);
        let Some(start) = starts.into_iter().next() else {
            return Self::default();
        };
        let end = settings
            .get_all(COMMENT_END, scope)
            .into_iter()
            .find(|e| e.scope_selector == start.scope_selector);
        Self {
            comment_start: start.value.as_str().map(str::to_string),
            comment_end: end.and_then(|e| e.value.as_str().map(str::to_string)),
        }
    }
}

/// Non-word characters at `scope`, falling back to the global default.
pub fn non_word_characters_for_scope(settings: &ScopedSettings, scope: &ScopeDescriptor) -> String {
    settings
        .get_str(NON_WORD_CHARACTERS, scope)
        .unwrap_or_else(|| DEFAULT_NON_WORD_CHARACTERS.to_string())
}

/// A tokenizer back end.
pub trait LanguageMode {
    /// Id of this instance.
    fn id(&self) -> LanguageModeId;

    /// Scope descriptor of the whole document.
    fn root_scope_descriptor(&self) -> ScopeDescriptor;

    /// Name of a scope id produced by this mode's iterators.
    fn scope_name_for_id(&self, id: ScopeId) -> Option<String>;

    /// Apply a buffer edit to the tokenization state (bookkeeping only, no heavy work).
    fn buffer_did_change(&mut self, text: &BufferText, change: &BufferChange);

    /// A fresh highlight iterator over `text`.
    fn build_highlight_iterator<'a>(&'a self, text: &'a BufferText) -> Box<dyn HighlightIterator + 'a>;

    /// Bring highlighting up to date, returning the ranges whose syntax changed.
    fn update_highlights(&mut self, _text: &BufferText) -> Vec<Range> {
        Vec::new()
    }

    /// Process one slice of background work. Returns true if more work remains.
    fn tokenize_next_chunk(&mut self, _text: &BufferText) -> bool {
        false
    }

    /// Returns true if background work is queued.
    fn has_pending_work(&self) -> bool {
        false
    }

    /// Returns true once every row has been tokenized.
    fn is_fully_tokenized(&self) -> bool {
        true
    }

    /// The tokenized form of `row`.
    fn tokenized_line_for_row(&self, text: &BufferText, row: usize) -> TokenizedLine;

    /// Scopes at `position` (clipped).
    fn scope_descriptor_for_position(&self, text: &BufferText, position: Point) -> ScopeDescriptor;

    /// Extent of the innermost syntax matching `selector` around `position`.
    fn buffer_range_for_scope_at_position(
        &self,
        text: &BufferText,
        selector: &str,
        position: Point,
    ) -> Option<Range>;

    /// Returns true if `row` is a comment line.
    fn is_row_commented(&self, text: &BufferText, row: usize) -> bool;

    /// Returns true if a fold can start at `row`.
    fn is_foldable_at_row(&self, text: &BufferText, row: usize) -> bool;

    /// The innermost foldable range containing `point`.
    fn foldable_range_containing_point(
        &self,
        text: &BufferText,
        point: Point,
        tab_length: usize,
    ) -> Option<Range>;

    /// Every foldable range.
    fn foldable_ranges(&self, text: &BufferText, tab_length: usize) -> Vec<Range>;

    /// Foldable ranges whose start rows sit at indentation `level`.
    fn foldable_ranges_at_indent_level(
        &self,
        text: &BufferText,
        level: usize,
        tab_length: usize,
    ) -> Vec<Range>;

    /// Indentation level of `line`.
    fn indent_level_for_line(&self, line: &str, tab_length: usize) -> f64 {
        indent_level_for_line(line, tab_length)
    }

    /// Suggested indentation of an existing row.
    fn suggested_indent_for_buffer_row(
        &self,
        text: &BufferText,
        row: usize,
        tab_length: usize,
        skip_blank_lines: bool,
    ) -> f64;

    /// Suggested indentation of `line` if it were placed at `row`.
    fn suggested_indent_for_line_at_buffer_row(
        &self,
        text: &BufferText,
        row: usize,
        line: &str,
        tab_length: usize,
    ) -> f64;

    /// Conservative suggestion for the row being typed on.
    fn suggested_indent_for_edited_buffer_row(
        &self,
        text: &BufferText,
        row: usize,
        tab_length: usize,
    ) -> Option<f64>;

    /// Characters that separate words at `position`.
    fn non_word_characters(&self, text: &BufferText, position: Point) -> String;

    /// Comment delimiters at `position`.
    fn comment_strings_for_position(&self, text: &BufferText, position: Point) -> CommentStrings;

    /// Register an event callback.
    fn subscribe(&mut self, callback: LanguageModeCallback);

    /// Tear down; pending background work becomes a no-op.
    fn destroy(&mut self);

    /// Returns false once destroyed.
    fn is_alive(&self) -> bool;
}

/// Root scope of buffers without a grammar.
pub const NULL_GRAMMAR_SCOPE: &str = "text.plain.null-grammar";

/// The mode used when no grammar is assigned: one placeholder token per row and no folds.
#[derive(Debug)]
pub struct NullLanguageMode {
    id: LanguageModeId,
    registry: Arc<ScopeRegistry>,
    root: ScopeId,
    settings: Arc<ScopedSettings>,
    emitter: LanguageModeEmitter,
    alive: bool,
}

impl NullLanguageMode {
    /// Create a null mode.
    pub fn new(id: LanguageModeId, settings: Arc<ScopedSettings>) -> Self {
        let mut registry = ScopeRegistry::new();
        let root = registry.register(NULL_GRAMMAR_SCOPE);
        Self {
            id,
            registry: registry.into_shared(),
            root,
            settings,
            emitter: LanguageModeEmitter::new(),
            alive: true,
        }
    }
}

impl LanguageMode for NullLanguageMode {
    fn id(&self) -> LanguageModeId {
        self.id
    }

    fn root_scope_descriptor(&self) -> ScopeDescriptor {
        ScopeDescriptor::from_scopes([NULL_GRAMMAR_SCOPE])
    }

    fn scope_name_for_id(&self, id: ScopeId) -> Option<String> {
        self.registry.scope_for_id(id).map(str::to_string)
    }

    fn buffer_did_change(&mut self, _text: &BufferText, _change: &BufferChange) {}

    fn build_highlight_iterator<'a>(&'a self, text: &'a BufferText) -> Box<dyn HighlightIterator + 'a> {
        Box::new(NullHighlightIterator::new(text.end_position()))
    }

    fn tokenized_line_for_row(&self, text: &BufferText, row: usize) -> TokenizedLine {
        TokenizedLine::placeholder(
            text.line_for_row(row),
            self.root,
            text.line_ending_for_row(row),
            self.registry.clone(),
        )
    }

    fn scope_descriptor_for_position(&self, _text: &BufferText, _position: Point) -> ScopeDescriptor {
        self.root_scope_descriptor()
    }

    fn buffer_range_for_scope_at_position(
        &self,
        _text: &BufferText,
        _selector: &str,
        _position: Point,
    ) -> Option<Range> {
        None
    }

    fn is_row_commented(&self, _text: &BufferText, _row: usize) -> bool {
        false
    }

    fn is_foldable_at_row(&self, _text: &BufferText, _row: usize) -> bool {
        false
    }

    fn foldable_range_containing_point(
        &self,
        _text: &BufferText,
        _point: Point,
        _tab_length: usize,
    ) -> Option<Range> {
        None
    }

    fn foldable_ranges(&self, _text: &BufferText, _tab_length: usize) -> Vec<Range> {
        Vec::new()
    }

    fn foldable_ranges_at_indent_level(
        &self,
        _text: &BufferText,
        _level: usize,
        _tab_length: usize,
    ) -> Vec<Range> {
        Vec::new()
    }

    fn suggested_indent_for_buffer_row(
        &self,
        text: &BufferText,
        row: usize,
        tab_length: usize,
        skip_blank_lines: bool,
    ) -> f64 {
        let preceding = if skip_blank_lines {
            text.previous_non_blank_row(row)
        } else {
            row.checked_sub(1)
        };
        preceding
            .map(|r| indent_level_for_line(&text.line_for_row(r), tab_length))
            .unwrap_or(0.0)
    }

    fn suggested_indent_for_line_at_buffer_row(
        &self,
        text: &BufferText,
        row: usize,
        _line: &str,
        tab_length: usize,
    ) -> f64 {
        self.suggested_indent_for_buffer_row(text, row, tab_length, true)
    }

    fn suggested_indent_for_edited_buffer_row(
        &self,
        _text: &BufferText,
        _row: usize,
        _tab_length: usize,
    ) -> Option<f64> {
        None
    }

    fn non_word_characters(&self, _text: &BufferText, _position: Point) -> String {
        non_word_characters_for_scope(&self.settings, &self.root_scope_descriptor())
    }

    fn comment_strings_for_position(&self, _text: &BufferText, _position: Point) -> CommentStrings {
        CommentStrings::from_settings(&self.settings, &self.root_scope_descriptor())
    }

    fn subscribe(&mut self, callback: LanguageModeCallback) {
        self.emitter.subscribe(callback);
    }

    fn destroy(&mut self) {
        self.alive = false;
        self.emitter.clear();
    }

    fn is_alive(&self) -> bool {
        self.alive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_mode_returns_placeholder_lines() {
        let text = BufferText::from_text("  abc\ndef");
        let mode = NullLanguageMode::new(LanguageModeId::from_raw(1), Arc::new(ScopedSettings::with_defaults()));
        let line = mode.tokenized_line_for_row(&text, 0);
        assert_eq!(line.tokens().len(), 1);
        assert_eq!(line.tokens()[0].scopes, vec![NULL_GRAMMAR_SCOPE]);
        assert_eq!(mode.suggested_indent_for_buffer_row(&text, 1, 2, true), 1.0);
        assert!(!mode.is_foldable_at_row(&text, 0));
    }

    #[test]
    fn test_comment_strings_pair_start_and_end_by_selector() {
        let mut settings = ScopedSettings::new();
        settings.set(".source.css", COMMENT_START, "/* ");
        settings.set(".source.css", COMMENT_END, " */");
        settings.set(".source", COMMENT_END, " -->");
        let scope = ScopeDescriptor::from_scopes(["source.css"]);
        let strings = CommentStrings::from_settings(&settings, &scope);
        assert_eq!(strings.comment_start.as_deref(), Some("/* "));
        assert_eq!(strings.comment_end.as_deref(), Some(" */"));
    }
}
