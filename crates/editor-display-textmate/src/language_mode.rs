//! The TextMate language mode: row-at-a-time tokenization with background slicing.
//!
//! Every row stores its tokenized line and the rule stack the grammar left at its end. An edit
//! re-tokenizes the edited rows synchronously (at most one chunk of them); when the rule stack at
//! the end of the edit differs from before, the row after it is queued as invalid. Background
//! work ([`LanguageMode::tokenize_next_chunk`]) re-tokenizes from each invalid row until the rule
//! stack converges with what was stored, the chunk budget runs out, or the buffer ends.

mod folding;

use crate::grammar::{Grammar, YamlGrammar};
use crate::highlight::TextMateHighlightIterator;
use editor_display::language_mode::{
    CommentStrings, LanguageModeCallback, LanguageModeEmitter, LanguageModeEvent,
    NULL_GRAMMAR_SCOPE, non_word_characters_for_scope,
};
use editor_display::tokenized_line::scopes_from_tags;
use editor_display::{
    BufferChange, BufferText, HighlightIterator, IndentationPolicy, LanguageMode, LanguageModeId,
    Point, Range, ScopeDescriptor, ScopeId, ScopeRegistry, ScopedSettings, Tag, Token,
    TokenizedLine,
};
use std::fmt;
use std::sync::Arc;

/// Rows tokenized per background slice.
pub const DEFAULT_CHUNK_SIZE: usize = 50;

/// Buffers at least this large (in bytes) skip tokenization unless told otherwise.
pub const LARGE_FILE_THRESHOLD: usize = 2 * 1024 * 1024;

/// Tuning knobs for [`TextMateLanguageMode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMateOptions {
    /// Rows tokenized per background slice (and per synchronous edit).
    pub chunk_size: usize,
    /// Force large-file mode on or off. `None` decides from the buffer size.
    pub large_file_mode: Option<bool>,
}

impl Default for TextMateOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            large_file_mode: None,
        }
    }
}

#[derive(Debug, Clone)]
struct TokenizedRow<S> {
    line: TokenizedLine,
    rule_stack: S,
}

/// A [`LanguageMode`] driven by a line-oriented [`Grammar`].
///
/// Without a grammar (or in large-file mode) nothing is tokenized: every row reads as a single
/// token in the root scope and the mode reports itself fully tokenized right away.
pub struct TextMateLanguageMode<G: Grammar = YamlGrammar> {
    id: LanguageModeId,
    grammar: Option<Arc<G>>,
    registry: Arc<ScopeRegistry>,
    root: ScopeId,
    root_scope_name: String,
    settings: Arc<ScopedSettings>,
    indentation: IndentationPolicy,
    rows: Vec<Option<TokenizedRow<G::RuleStack>>>,
    invalid_rows: Vec<usize>,
    fully_tokenized: bool,
    chunk_size: usize,
    large_file_mode: bool,
    emitter: LanguageModeEmitter,
    alive: bool,
}

impl<G: Grammar> fmt::Debug for TextMateLanguageMode<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextMateLanguageMode")
            .field("id", &self.id)
            .field("scope", &self.root_scope_name)
            .field("rows", &self.rows.len())
            .field("invalid_rows", &self.invalid_rows)
            .field("fully_tokenized", &self.fully_tokenized)
            .field("large_file_mode", &self.large_file_mode)
            .field("alive", &self.alive)
            .finish()
    }
}

impl<G: Grammar> TextMateLanguageMode<G> {
    /// Create a mode for `text` with default options.
    ///
    /// The first row is queued for tokenization; nothing is tokenized until the host calls
    /// [`LanguageMode::tokenize_next_chunk`] or edits the buffer.
    pub fn new(
        id: LanguageModeId,
        grammar: Option<Arc<G>>,
        text: &BufferText,
        settings: Arc<ScopedSettings>,
    ) -> Self {
        Self::new_with_options(id, grammar, text, settings, TextMateOptions::default())
    }

    /// Create a mode with explicit options.
    pub fn new_with_options(
        id: LanguageModeId,
        grammar: Option<Arc<G>>,
        text: &BufferText,
        settings: Arc<ScopedSettings>,
        options: TextMateOptions,
    ) -> Self {
        let large_file_mode = options
            .large_file_mode
            .unwrap_or(text.len_bytes() >= LARGE_FILE_THRESHOLD);
        let (registry, root, root_scope_name) = resolve_root(grammar.as_deref());
        let mut mode = Self {
            id,
            grammar,
            registry,
            root,
            root_scope_name,
            indentation: IndentationPolicy::new(settings.clone()),
            settings,
            rows: Vec::new(),
            invalid_rows: Vec::new(),
            fully_tokenized: false,
            chunk_size: options.chunk_size.max(1),
            large_file_mode,
            emitter: LanguageModeEmitter::new(),
            alive: true,
        };
        tracing::debug!(
            language_mode = id.get(),
            scope = %mode.root_scope_name,
            large_file_mode,
            "textmate language mode created"
        );
        mode.retokenize_lines(text);
        mode
    }

    /// The grammar, if any.
    pub fn grammar(&self) -> Option<&Arc<G>> {
        self.grammar.as_ref()
    }

    /// Returns true if tokenization is skipped because the buffer is large.
    pub fn is_large_file_mode(&self) -> bool {
        self.large_file_mode
    }

    /// Replace the grammar and start over.
    pub fn set_grammar(&mut self, grammar: Option<Arc<G>>, text: &BufferText) {
        let (registry, root, root_scope_name) = resolve_root(grammar.as_deref());
        self.grammar = grammar;
        self.registry = registry;
        self.root = root;
        self.root_scope_name = root_scope_name;
        self.retokenize_lines(text);
    }

    /// Drop every tokenized row and queue the whole buffer again.
    pub fn retokenize_lines(&mut self, text: &BufferText) {
        if !self.alive {
            return;
        }
        self.fully_tokenized = false;
        self.rows = (0..text.line_count()).map(|_| None).collect();
        self.invalid_rows.clear();
        if self.skips_tokenization() {
            self.mark_tokenization_complete();
        } else {
            self.invalidate_row(0);
        }
    }

    /// Retokenize everything if `grammar` injects into a scope present in a tokenized row.
    pub fn update_for_injection<H: Grammar>(&mut self, grammar: &H, text: &BufferText) {
        let Some(selector) = grammar.injection_selector() else {
            return;
        };
        let injected = self.rows.iter().flatten().any(|row| {
            row.line
                .tokens()
                .iter()
                .any(|token| selector.matches_scopes(&token.scopes))
        });
        if injected {
            tracing::debug!(
                language_mode = self.id.get(),
                injection = grammar.scope_name(),
                "injection grammar applies; retokenizing"
            );
            self.retokenize_lines(text);
        }
    }

    /// The token covering `position`.
    pub fn token_for_position(&self, text: &BufferText, position: Point) -> Option<Token> {
        if position.row > text.last_row() {
            return None;
        }
        self.tokenized_line(text, position.row)
            .token_at_buffer_column(position.column)
    }

    /// Start of the token covering `position`.
    pub fn token_start_position_for_position(&self, text: &BufferText, position: Point) -> Point {
        let row = position.row.min(text.last_row());
        let column = self
            .tokenized_line(text, row)
            .token_start_column_for_buffer_column(position.column);
        Point::new(row, column)
    }

    /// Rows queued for background tokenization, ascending.
    pub fn invalid_rows(&self) -> &[usize] {
        &self.invalid_rows
    }

    /// Returns true if `row` holds a real tokenization (not a placeholder).
    pub fn is_row_tokenized(&self, row: usize) -> bool {
        self.row(row).is_some()
    }

    /// The rule stack stored for `row`.
    pub fn stack_for_row(&self, row: usize) -> Option<&G::RuleStack> {
        self.row(row).map(|r| &r.rule_stack)
    }

    pub(crate) fn tokenized_line(&self, text: &BufferText, row: usize) -> TokenizedLine {
        match self.row(row) {
            Some(stored) => stored.line.clone(),
            None => TokenizedLine::placeholder(
                text.line_for_row(row),
                self.root,
                text.line_ending_for_row(row),
                self.registry.clone(),
            ),
        }
    }

    fn row(&self, row: usize) -> Option<&TokenizedRow<G::RuleStack>> {
        self.rows.get(row).and_then(Option::as_ref)
    }

    fn stack_before_row(&self, row: usize) -> Option<&G::RuleStack> {
        row.checked_sub(1).and_then(|r| self.stack_for_row(r))
    }

    fn open_scopes_for_row(&self, row: usize) -> Vec<ScopeId> {
        match row.checked_sub(1).and_then(|r| self.row(r)) {
            Some(preceding) => scopes_from_tags(preceding.line.open_scopes(), preceding.line.tags()),
            None => Vec::new(),
        }
    }

    fn skips_tokenization(&self) -> bool {
        self.grammar.is_none() || self.large_file_mode
    }

    fn build_row(
        &self,
        grammar: &G,
        text: &BufferText,
        row: usize,
        line: String,
        rule_stack: Option<&G::RuleStack>,
        open_scopes: Vec<ScopeId>,
    ) -> TokenizedRow<G::RuleStack> {
        let tokens = grammar.tokenize_line(&line, rule_stack, row == 0);
        TokenizedRow {
            line: TokenizedLine::new(
                line,
                tokens.tags,
                open_scopes,
                text.line_ending_for_row(row),
                self.registry.clone(),
            ),
            rule_stack: tokens.rule_stack,
        }
    }

    /// Tokenize rows `start..=end` starting from `stack`, stopping after one chunk.
    ///
    /// Rows past the chunk budget, or after a row that could not be tokenized, are left as
    /// placeholders and the first of them is queued.
    fn build_rows(
        &mut self,
        grammar: &G,
        text: &BufferText,
        start: usize,
        end: usize,
        stack: Option<G::RuleStack>,
        open_scopes: Vec<ScopeId>,
    ) -> Vec<Option<TokenizedRow<G::RuleStack>>> {
        let mut rule_stack = stack;
        let mut open_scopes = open_scopes;
        let stop_tokenizing_at = start + self.chunk_size;
        let mut rows = Vec::with_capacity(end + 1 - start);

        for row in start..=end {
            if (rule_stack.is_some() || row == 0) && row < stop_tokenizing_at {
                let built = self.build_row(
                    grammar,
                    text,
                    row,
                    text.line_for_row(row),
                    rule_stack.as_ref(),
                    open_scopes.clone(),
                );
                open_scopes = scopes_from_tags(&open_scopes, built.line.tags());
                rule_stack = Some(built.rule_stack.clone());
                rows.push(Some(built));
            } else {
                rows.push(None);
            }
        }

        if end >= stop_tokenizing_at {
            self.invalidate_row(stop_tokenizing_at);
        }
        rows
    }

    fn mark_tokenization_complete(&mut self) {
        if !self.fully_tokenized {
            tracing::debug!(language_mode = self.id.get(), "tokenization complete");
            self.emitter.emit(LanguageModeEvent::DidTokenize);
        }
        self.fully_tokenized = true;
    }

    fn validate_row(&mut self, row: usize) {
        let valid = self.invalid_rows.partition_point(|r| *r <= row);
        self.invalid_rows.drain(..valid);
    }

    fn invalidate_row(&mut self, row: usize) {
        self.invalid_rows.push(row);
        self.invalid_rows.sort_unstable();
        self.invalid_rows.dedup();
    }

    fn update_invalid_rows(&mut self, start: usize, end: usize, delta: isize) {
        for row in &mut self.invalid_rows {
            if *row < start {
                continue;
            }
            *row = if *row <= end {
                offset_row(end, delta) + 1
            } else {
                offset_row(*row, delta)
            };
        }
        self.invalid_rows.sort_unstable();
        self.invalid_rows.dedup();
    }

    fn first_token_scope(&self, line: &TokenizedLine) -> ScopeDescriptor {
        let mut iter = line.token_iterator();
        iter.next();
        ScopeDescriptor::from_scopes(iter.scopes())
    }

    fn scope_names(&self, ids: &[ScopeId]) -> Vec<String> {
        self.registry.names_for_ids(ids)
    }

    fn scope_name(&self, id: ScopeId) -> String {
        self.registry
            .scope_for_id(id)
            .map(str::to_string)
            .unwrap_or_default()
    }
}

fn offset_row(row: usize, delta: isize) -> usize {
    (row as isize + delta).max(0) as usize
}

fn resolve_root<G: Grammar>(grammar: Option<&G>) -> (Arc<ScopeRegistry>, ScopeId, String) {
    let Some(grammar) = grammar else {
        let mut registry = ScopeRegistry::new();
        let root = registry.register(NULL_GRAMMAR_SCOPE);
        return (registry.into_shared(), root, NULL_GRAMMAR_SCOPE.to_string());
    };
    let name = grammar.scope_name().to_string();
    let registry = grammar.registry().clone();
    match registry.id_for_scope(&name) {
        Some(root) => (registry, root, name),
        None => {
            let mut extended = (*registry).clone();
            let root = extended.register(&name);
            (extended.into_shared(), root, name)
        }
    }
}

impl<G: Grammar + 'static> LanguageMode for TextMateLanguageMode<G> {
    fn id(&self) -> LanguageModeId {
        self.id
    }

    fn root_scope_descriptor(&self) -> ScopeDescriptor {
        ScopeDescriptor::from_scopes([self.root_scope_name.as_str()])
    }

    fn scope_name_for_id(&self, id: ScopeId) -> Option<String> {
        self.registry.scope_for_id(id).map(str::to_string)
    }

    fn buffer_did_change(&mut self, text: &BufferText, change: &BufferChange) {
        if !self.alive {
            return;
        }
        let start = change.old_range.start.row;
        let end = change.old_range.end.row;
        let delta = change.row_delta();
        let new_end = change.new_range.end.row;
        let old_line_count = end - start + 1;
        let new_line_count = new_end - change.new_range.start.row + 1;

        self.update_invalid_rows(start, end, delta);
        let previous_end_stack = self.stack_for_row(end).cloned();
        let splice_end = (start + old_line_count).min(self.rows.len());
        let splice_start = start.min(splice_end);

        match self.grammar.clone() {
            Some(grammar) if !self.large_file_mode => {
                let stack = self.stack_before_row(start).cloned();
                let open_scopes = self.open_scopes_for_row(start);
                let rows = self.build_rows(&grammar, text, start, new_end, stack, open_scopes);
                self.rows.splice(splice_start..splice_end, rows);

                if let Some(new_end_stack) = self.stack_for_row(new_end)
                    && Some(new_end_stack) != previous_end_stack.as_ref()
                {
                    self.invalidate_row(new_end + 1);
                }
            }
            _ => {
                self.rows
                    .splice(splice_start..splice_end, (0..new_line_count).map(|_| None));
            }
        }
    }

    fn build_highlight_iterator<'a>(&'a self, text: &'a BufferText) -> Box<dyn HighlightIterator + 'a> {
        Box::new(TextMateHighlightIterator::new(self, text))
    }

    fn tokenize_next_chunk(&mut self, text: &BufferText) -> bool {
        if !self.alive {
            return false;
        }
        let Some(grammar) = self.grammar.clone().filter(|_| !self.large_file_mode) else {
            return false;
        };

        let mut rows_remaining = self.chunk_size;
        while rows_remaining > 0 {
            let Some(&start_row) = self.invalid_rows.first() else {
                break;
            };
            self.invalid_rows.remove(0);
            let last_row = text.last_row();
            if start_row > last_row {
                continue;
            }

            let mut row = start_row;
            let (end_row, filled_region) = loop {
                let previous_stack = self.stack_for_row(row).cloned();
                let stack = self.stack_before_row(row).cloned();
                let open_scopes = self.open_scopes_for_row(row);
                let built = self.build_row(
                    &grammar,
                    text,
                    row,
                    text.line_for_row(row),
                    stack.as_ref(),
                    open_scopes,
                );
                if let Some(slot) = self.rows.get_mut(row) {
                    *slot = Some(built);
                }
                rows_remaining -= 1;
                if rows_remaining == 0 {
                    break (row, false);
                }
                if row == last_row || self.stack_for_row(row) == previous_stack.as_ref() {
                    break (row, true);
                }
                row += 1;
            };

            self.validate_row(end_row);
            if !filled_region {
                self.invalidate_row(end_row + 1);
            }
            tracing::trace!(
                language_mode = self.id.get(),
                start_row,
                end_row,
                "tokenized rows"
            );
            self.emitter.emit(LanguageModeEvent::DidChangeHighlighting {
                range: Range::new((start_row, 0), (end_row + 1, 0)),
            });
        }

        if self.invalid_rows.is_empty() {
            self.mark_tokenization_complete();
            false
        } else {
            true
        }
    }

    fn has_pending_work(&self) -> bool {
        self.alive && !self.skips_tokenization() && !self.invalid_rows.is_empty()
    }

    fn is_fully_tokenized(&self) -> bool {
        self.fully_tokenized && self.invalid_rows.is_empty()
    }

    fn tokenized_line_for_row(&self, text: &BufferText, row: usize) -> TokenizedLine {
        self.tokenized_line(text, row)
    }

    fn scope_descriptor_for_position(&self, text: &BufferText, position: Point) -> ScopeDescriptor {
        let position = text.clip_position(position);
        let line = self.tokenized_line(text, position.row);
        let ids = line.scope_ids_at_column(position.column);
        ScopeDescriptor::from_scopes(self.scope_names(&ids))
    }

    fn buffer_range_for_scope_at_position(
        &self,
        text: &BufferText,
        selector: &str,
        position: Point,
    ) -> Option<Range> {
        if position.row > text.last_row() {
            return None;
        }
        let selector = editor_display::ScopeSelector::parse(selector);
        let matches_any = |scopes: &[String]| scopes.iter().any(|s| selector.matches_scope(s));

        let line = self.tokenized_line(text, position.row);
        let tags = line.tags();
        let mut scopes = self.scope_names(line.open_scopes());

        let mut start_column = 0usize;
        let mut end_column = 0usize;
        let mut token_index = 0usize;
        while token_index < tags.len() {
            match Tag::decode(tags[token_index]) {
                Tag::Open(id) => scopes.push(self.scope_name(id)),
                Tag::Close(_) => {
                    scopes.pop();
                }
                Tag::Text(len) => {
                    end_column = start_column + len;
                    if end_column >= position.column {
                        break;
                    }
                    start_column = end_column;
                }
            }
            token_index += 1;
        }

        if !matches_any(&scopes) {
            return None;
        }

        let mut start_scopes = scopes.clone();
        for index in (0..token_index).rev() {
            match Tag::decode(tags[index]) {
                Tag::Open(_) => {
                    start_scopes.pop();
                }
                Tag::Close(id) => start_scopes.push(self.scope_name(id)),
                Tag::Text(len) => {
                    if !matches_any(&start_scopes) {
                        break;
                    }
                    start_column = start_column.saturating_sub(len);
                }
            }
        }

        let mut end_scopes = scopes;
        for tag in tags.iter().skip(token_index + 1) {
            match Tag::decode(*tag) {
                Tag::Open(id) => end_scopes.push(self.scope_name(id)),
                Tag::Close(_) => {
                    end_scopes.pop();
                }
                Tag::Text(len) => {
                    if !matches_any(&end_scopes) {
                        break;
                    }
                    end_column += len;
                }
            }
        }

        Some(Range::new(
            (position.row, start_column),
            (position.row, end_column),
        ))
    }

    fn is_row_commented(&self, _text: &BufferText, row: usize) -> bool {
        self.row(row).is_some_and(|r| r.line.is_comment())
    }

    fn is_foldable_at_row(&self, text: &BufferText, row: usize) -> bool {
        folding::end_row_for_fold_at_row(self, text, row, 1, true).is_some()
    }

    fn foldable_range_containing_point(
        &self,
        text: &BufferText,
        point: Point,
        tab_length: usize,
    ) -> Option<Range> {
        folding::foldable_range_containing_point(self, text, point, tab_length)
    }

    fn foldable_ranges(&self, text: &BufferText, tab_length: usize) -> Vec<Range> {
        folding::foldable_ranges(self, text, tab_length)
    }

    fn foldable_ranges_at_indent_level(
        &self,
        text: &BufferText,
        level: usize,
        tab_length: usize,
    ) -> Vec<Range> {
        folding::foldable_ranges_at_indent_level(self, text, level, tab_length)
    }

    fn suggested_indent_for_buffer_row(
        &self,
        text: &BufferText,
        row: usize,
        tab_length: usize,
        skip_blank_lines: bool,
    ) -> f64 {
        let line = text.line_for_row(row);
        let scope = self.first_token_scope(&self.tokenized_line(text, row));
        self.indentation.suggested_indent_for_line_with_scope(
            text,
            row,
            &line,
            &scope,
            tab_length,
            skip_blank_lines,
            &|r| self.is_row_commented(text, r),
        )
    }

    fn suggested_indent_for_line_at_buffer_row(
        &self,
        text: &BufferText,
        row: usize,
        line: &str,
        tab_length: usize,
    ) -> f64 {
        let tokenized = match self.grammar.as_deref().filter(|_| !self.large_file_mode) {
            Some(grammar) => {
                self.build_row(
                    grammar,
                    text,
                    row,
                    line.to_string(),
                    self.stack_before_row(row),
                    self.open_scopes_for_row(row),
                )
                .line
            }
            None => TokenizedLine::placeholder(
                line,
                self.root,
                text.line_ending_for_row(row),
                self.registry.clone(),
            ),
        };
        let scope = self.first_token_scope(&tokenized);
        self.indentation.suggested_indent_for_line_with_scope(
            text,
            row,
            line,
            &scope,
            tab_length,
            true,
            &|r| self.is_row_commented(text, r),
        )
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

    fn comment_strings_for_position(&self, text: &BufferText, position: Point) -> CommentStrings {
        let scope = self.scope_descriptor_for_position(text, position);
        CommentStrings::from_settings(&self.settings, &scope)
    }

    fn subscribe(&mut self, callback: LanguageModeCallback) {
        self.emitter.subscribe(callback);
    }

    fn destroy(&mut self) {
        if !self.alive {
            return;
        }
        self.alive = false;
        self.rows.clear();
        self.invalid_rows.clear();
        self.emitter.clear();
    }

    fn is_alive(&self) -> bool {
        self.alive
    }
}
