//! The text editor facade.
//!
//! A [`TextEditor`] is a short-lived handle handed out by the [`Workspace`](crate::Workspace).
//! It borrows the shared [`TextBuffer`] together with one editor's private state (display
//! layer, selections and decorations) and exposes the operations a host binds to commands.
//!
//! Mutating operations fail with [`EditorError::ReadOnly`] on read-only editors unless the
//! handle was obtained through [`TextEditor::bypass_read_only`].

use std::collections::BTreeMap;
use std::fmt;

use crate::config::EditorSettings;
use crate::cursor::{CursorTarget, Motion, MotionResolver};
use crate::display_layer::{ClipOptions, DisplayLayer, ScreenLine};
use crate::error::EditorError;
use crate::highlight::HighlightIterator;
use crate::ids::{BufferId, DecorationId, EditorId, IdGenerator, MarkerId, MarkerLayerId};
use crate::marker::MarkerOptions;
use crate::point::{ClipDirection, INFINITY, Point, Range};
use crate::scope::{ScopeDescriptor, ScopeId};
use crate::selection::{SelectionSet, SelectionState};
use crate::text_buffer::{HistoryRestore, TextBuffer};
use crate::tokenized_line::TokenizedLine;
use crate::words;

/// A run of screen text sharing one set of scopes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenLineToken {
    /// Rendered text.
    pub text: String,
    /// Scope names, outermost first. Empty for soft-wrap indents and line-ending glyphs.
    pub scopes: Vec<String>,
}

/// How a decoration looks on screen right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecorationState {
    /// Properties given to [`TextEditor::decorate_marker`].
    pub properties: BTreeMap<String, String>,
    /// The marker's range on screen.
    pub screen_range: Range,
    /// The marker's range in the buffer.
    pub buffer_range: Range,
    /// Whether the marker's head is at its start.
    pub range_is_reversed: bool,
}

/// Options for setting or adding selections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SelectionOptions {
    /// Put the cursor at the start of each range.
    pub reversed: bool,
    /// Leave folds around the new selection endpoints in place.
    pub preserve_folds: bool,
}

#[derive(Debug, Clone)]
struct Decoration {
    layer: MarkerLayerId,
    marker: MarkerId,
    properties: BTreeMap<String, String>,
}

/// Everything one editor owns besides the shared buffer.
#[derive(Debug)]
pub(crate) struct EditorState {
    id: EditorId,
    buffer: BufferId,
    display: DisplayLayer,
    selections: SelectionSet,
    marker_layer: MarkerLayerId,
    decorations: BTreeMap<DecorationId, Decoration>,
}

impl EditorState {
    /// Attach a new editor to `buffer`, creating its marker layers and retaining the buffer.
    pub(crate) fn new(id: EditorId, buffer: &mut TextBuffer, settings: EditorSettings) -> Self {
        let display = DisplayLayer::new(buffer, settings);
        let selections = SelectionSet::new(buffer.markers_mut());
        let marker_layer = buffer.markers_mut().add_layer(false);
        buffer.retain();
        Self {
            id,
            buffer: buffer.id(),
            display,
            selections,
            marker_layer,
            decorations: BTreeMap::new(),
        }
    }

    pub(crate) fn buffer_id(&self) -> BufferId {
        self.buffer
    }

    /// Remove this editor's layers and release the buffer. Returns true if the buffer died.
    pub(crate) fn dispose(&mut self, buffer: &mut TextBuffer) -> bool {
        self.display.destroy(buffer);
        self.selections.destroy_layer(buffer.markers_mut());
        buffer.markers_mut().destroy_layer(self.marker_layer);
        self.decorations.clear();
        buffer.release()
    }
}

/// A handle on one editor of a buffer.
pub struct TextEditor<'a> {
    buffer: &'a mut TextBuffer,
    state: &'a mut EditorState,
    ids: &'a IdGenerator,
    bypass_read_only: bool,
}

impl fmt::Debug for TextEditor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextEditor")
            .field("id", &self.state.id)
            .field("buffer", &self.state.buffer)
            .field("selection_count", &self.state.selections.len())
            .field("bypass_read_only", &self.bypass_read_only)
            .finish()
    }
}

impl<'a> TextEditor<'a> {
    pub(crate) fn new(buffer: &'a mut TextBuffer, state: &'a mut EditorState, ids: &'a IdGenerator) -> Self {
        Self {
            buffer,
            state,
            ids,
            bypass_read_only: false,
        }
    }

    /// Let mutations through even if the editor is read-only.
    pub fn bypass_read_only(mut self) -> Self {
        self.bypass_read_only = true;
        self
    }

    // ---------------------------------------------------------------------------------------
    // Basic queries
    // ---------------------------------------------------------------------------------------

    /// This editor's id.
    pub fn id(&self) -> EditorId {
        self.state.id
    }

    /// The id of the edited buffer.
    pub fn buffer_id(&self) -> BufferId {
        self.state.buffer
    }

    /// The edited buffer.
    pub fn buffer(&self) -> &TextBuffer {
        self.buffer
    }

    /// This editor's display layer.
    pub fn display_layer(&self) -> &DisplayLayer {
        &self.state.display
    }

    /// The whole text.
    pub fn text(&self) -> String {
        self.buffer.text().text()
    }

    /// Number of buffer rows.
    pub fn line_count(&self) -> usize {
        self.buffer.text().line_count()
    }

    /// Text of `row` without its line ending.
    pub fn line_text_for_buffer_row(&self, row: usize) -> String {
        self.buffer.text().line_for_row(row)
    }

    /// Display settings.
    pub fn settings(&self) -> &EditorSettings {
        self.state.display.settings()
    }

    /// Replace the display settings.
    pub fn set_settings(&mut self, settings: EditorSettings) {
        self.state.display.set_settings(settings);
    }

    /// Returns true if mutations are rejected.
    pub fn is_read_only(&self) -> bool {
        self.settings().read_only
    }

    /// Toggle read-only mode.
    pub fn set_read_only(&mut self, read_only: bool) {
        let mut settings = self.settings().clone();
        settings.read_only = read_only;
        self.set_settings(settings);
    }

    fn tab_length(&self) -> usize {
        self.settings().tab_length.max(1)
    }

    fn ensure_writable(&self, operation: &'static str) -> Result<(), EditorError> {
        if !self.buffer.is_alive() {
            return Err(EditorError::Destroyed);
        }
        if self.settings().read_only && !self.bypass_read_only {
            tracing::warn!(editor = self.state.id.get(), operation, "rejected edit on a read-only editor");
            return Err(EditorError::ReadOnly { operation });
        }
        Ok(())
    }

    // ---------------------------------------------------------------------------------------
    // Screen coordinates
    // ---------------------------------------------------------------------------------------

    /// Number of screen rows.
    pub fn screen_line_count(&self) -> usize {
        self.state.display.screen_line_count(self.buffer)
    }

    /// The screen row at `screen_row`.
    pub fn screen_line_for_screen_row(&self, screen_row: usize) -> Option<ScreenLine> {
        self.state.display.screen_line_for_screen_row(self.buffer, screen_row)
    }

    /// Screen rows `start..end`.
    pub fn screen_lines(&self, start: usize, end: usize) -> Vec<ScreenLine> {
        self.state.display.screen_lines(self.buffer, start, end)
    }

    /// Map a buffer position to the screen.
    pub fn screen_position_for_buffer_position(&self, position: Point, direction: ClipDirection) -> Point {
        self.state
            .display
            .translate_buffer_position(self.buffer, position, direction)
    }

    /// Map a screen position to the buffer.
    pub fn buffer_position_for_screen_position(&self, position: Point, options: impl Into<ClipOptions>) -> Point {
        self.state
            .display
            .translate_screen_position(self.buffer, position, options)
    }

    /// Map a buffer range to the screen.
    pub fn screen_range_for_buffer_range(&self, range: Range) -> Range {
        self.state.display.translate_buffer_range(self.buffer, range)
    }

    /// Map a screen range to the buffer.
    pub fn buffer_range_for_screen_range(&self, range: Range) -> Range {
        self.state.display.translate_screen_range(self.buffer, range)
    }

    /// Snap a screen position onto a valid one.
    pub fn clip_screen_position(&self, position: Point, options: impl Into<ClipOptions>) -> Point {
        self.state
            .display
            .clip_screen_position(self.buffer, position, options)
    }

    /// Snap a buffer position onto a displayable one.
    pub fn clip_buffer_position(&self, position: Point, direction: ClipDirection) -> Point {
        self.state
            .display
            .clip_buffer_position(self.buffer, position, direction)
    }

    /// First screen row rendering `buffer_row`.
    pub fn screen_row_for_buffer_row(&self, buffer_row: usize) -> usize {
        self.state.display.screen_row_for_buffer_row(self.buffer, buffer_row)
    }

    /// Buffer row at the start of `screen_row`.
    pub fn buffer_row_for_screen_row(&self, screen_row: usize) -> usize {
        self.state.display.buffer_row_for_screen_row(self.buffer, screen_row)
    }

    // ---------------------------------------------------------------------------------------
    // Selections and cursors
    // ---------------------------------------------------------------------------------------

    /// Every selection in creation order.
    pub fn selections(&self) -> Vec<SelectionState> {
        self.state.selections.states(self.buffer.markers())
    }

    /// Every selection ordered by buffer position.
    pub fn selections_ordered_by_buffer_position(&self) -> Vec<SelectionState> {
        self.state.selections.ordered_states(self.buffer.markers())
    }

    /// The most recently added selection.
    pub fn last_selection(&self) -> Option<SelectionState> {
        self.state.selections.last(self.buffer.markers())
    }

    /// Returns true if there is more than one cursor.
    pub fn has_multiple_cursors(&self) -> bool {
        self.state.selections.len() > 1
    }

    /// Position of the most recently added cursor.
    pub fn cursor_buffer_position(&self) -> Point {
        self.last_selection().map(|s| s.head()).unwrap_or_default()
    }

    /// Screen position of the most recently added cursor.
    pub fn cursor_screen_position(&self) -> Point {
        self.screen_position_for_buffer_position(self.cursor_buffer_position(), ClipDirection::Closest)
    }

    /// Every cursor position in creation order.
    pub fn cursor_buffer_positions(&self) -> Vec<Point> {
        self.selections().iter().map(SelectionState::head).collect()
    }

    /// Range of the most recently added selection.
    pub fn selected_buffer_range(&self) -> Range {
        self.last_selection().map(|s| s.range).unwrap_or_default()
    }

    /// Every selection range in creation order.
    pub fn selected_buffer_ranges(&self) -> Vec<Range> {
        self.selections().iter().map(|s| s.range).collect()
    }

    /// Text of the most recently added selection.
    pub fn selected_text(&self) -> String {
        self.buffer.text().text_in_range(self.selected_buffer_range())
    }

    fn resolver(&self) -> MotionResolver<'_> {
        MotionResolver::new(self.buffer, &self.state.display)
    }

    fn place_cursor(&mut self, id: MarkerId, position: Point, goal_column: Option<usize>) {
        let position = self
            .state
            .display
            .clip_buffer_position(self.buffer, position, ClipDirection::Closest);
        self.state
            .selections
            .set_range(self.buffer.markers_mut(), id, Range::empty_at(position), false);
        self.state.selections.set_goal_column(id, goal_column);
    }

    fn modify_selection(&mut self, selection: &SelectionState, target: CursorTarget) {
        let head = self
            .state
            .display
            .clip_buffer_position(self.buffer, target.position, ClipDirection::Closest);
        let tail = selection.tail();
        let reversed = head < tail;
        self.state
            .selections
            .set_range(self.buffer.markers_mut(), selection.id, Range::new(tail, head), reversed);
        self.state.selections.set_goal_column(selection.id, target.goal_column);
    }

    fn set_selection_range(&mut self, id: MarkerId, range: Range, options: SelectionOptions) {
        let range = self.buffer.text().clip_range(range);
        if !options.preserve_folds {
            self.state.display.destroy_folds_containing_buffer_positions(
                self.buffer,
                &[range.start, range.end],
                true,
            );
        }
        self.state
            .selections
            .set_range(self.buffer.markers_mut(), id, range, options.reversed);
        self.state.selections.set_goal_column(id, None);
    }

    fn add_selection_range(&mut self, range: Range, options: SelectionOptions) -> Option<MarkerId> {
        let range = self.buffer.text().clip_range(range);
        if !options.preserve_folds {
            self.state.display.destroy_folds_containing_buffer_positions(
                self.buffer,
                &[range.start, range.end],
                true,
            );
        }
        self.state
            .selections
            .add(self.buffer.markers_mut(), range, options.reversed)
    }

    /// Collapse to a single cursor at `position`.
    pub fn set_cursor_buffer_position(&mut self, position: Point) {
        self.state.selections.consolidate(self.buffer.markers_mut());
        if let Some(selection) = self.last_selection() {
            self.place_cursor(selection.id, position, None);
        }
    }

    /// Collapse to a single cursor at the buffer position of `position` on screen.
    pub fn set_cursor_screen_position(&mut self, position: Point) {
        let position = self.buffer_position_for_screen_position(position, ClipDirection::Closest);
        self.set_cursor_buffer_position(position);
    }

    /// Add a cursor at `position`, merging it into any selection it touches.
    pub fn add_cursor_at_buffer_position(&mut self, position: Point) {
        self.add_selection_for_buffer_range(Range::empty_at(position), SelectionOptions::default());
    }

    /// Add a selection, merging it with the selections it intersects.
    pub fn add_selection_for_buffer_range(&mut self, range: Range, options: SelectionOptions) {
        self.add_selection_range(range, options);
        self.merge_intersecting_selections_with(options.reversed.then_some(true));
    }

    /// Replace every selection with a single one.
    pub fn set_selected_buffer_range(&mut self, range: Range, options: SelectionOptions) {
        self.set_selected_buffer_ranges(&[range], options);
    }

    /// Replace the selections with `ranges`, reusing existing selections in creation order.
    /// An empty list is ignored.
    pub fn set_selected_buffer_ranges(&mut self, ranges: &[Range], options: SelectionOptions) {
        if ranges.is_empty() {
            return;
        }
        let existing = self.selections();
        for extra in existing.iter().skip(ranges.len()) {
            self.state.selections.destroy(self.buffer.markers_mut(), extra.id);
        }
        for (index, range) in ranges.iter().enumerate() {
            match existing.get(index) {
                Some(selection) => self.set_selection_range(selection.id, *range, options),
                None => {
                    self.add_selection_range(*range, options);
                }
            }
        }
        self.merge_intersecting_selections_with(options.reversed.then_some(true));
    }

    /// Keep only the first selection. Returns true if any were removed.
    pub fn consolidate_selections(&mut self) -> bool {
        self.state.selections.consolidate(self.buffer.markers_mut())
    }

    /// Keep only the first selection and collapse it to its cursor.
    pub fn clear_selections(&mut self) {
        self.consolidate_selections();
        if let Some(selection) = self.last_selection() {
            self.place_cursor(selection.id, selection.head(), None);
        }
    }

    /// Destroy every cursor sitting on the same position as an earlier one.
    pub fn merge_cursors(&mut self) {
        self.state.selections.merge_cursors(self.buffer.markers_mut());
    }

    /// Merge intersecting selections.
    pub fn merge_intersecting_selections(&mut self) {
        self.merge_intersecting_selections_with(None);
    }

    fn merge_intersecting_selections_with(&mut self, reversed: Option<bool>) {
        self.state
            .selections
            .merge_intersecting(self.buffer.markers_mut(), reversed);
    }

    /// Move every cursor, collapsing selections.
    pub fn move_cursors(&mut self, motion: Motion) {
        for selection in self.selections() {
            let target = self.resolver().resolve(motion, &selection, true);
            self.place_cursor(selection.id, target.position, target.goal_column);
        }
        self.merge_cursors();
    }

    /// Move every cursor, keeping each selection's tail in place.
    pub fn select(&mut self, motion: Motion) {
        for selection in self.selections() {
            let target = self.resolver().resolve(motion, &selection, false);
            self.modify_selection(&selection, target);
        }
        self.merge_intersecting_selections_with(motion.is_backward().then_some(true));
    }

    /// Move every cursor up `count` screen rows.
    pub fn move_up(&mut self, count: usize) {
        self.move_cursors(Motion::Up(count));
    }

    /// Move every cursor down `count` screen rows.
    pub fn move_down(&mut self, count: usize) {
        self.move_cursors(Motion::Down(count));
    }

    /// Move every cursor left `count` columns.
    pub fn move_left(&mut self, count: usize) {
        self.move_cursors(Motion::Left(count));
    }

    /// Move every cursor right `count` columns.
    pub fn move_right(&mut self, count: usize) {
        self.move_cursors(Motion::Right(count));
    }

    /// Move every cursor to the start of the buffer.
    pub fn move_to_top(&mut self) {
        self.move_cursors(Motion::Top);
    }

    /// Move every cursor to the end of the buffer.
    pub fn move_to_bottom(&mut self) {
        self.move_cursors(Motion::Bottom);
    }

    /// Move every cursor to column 0.
    pub fn move_to_beginning_of_line(&mut self) {
        self.move_cursors(Motion::BeginningOfLine);
    }

    /// Move every cursor to the end of its buffer row.
    pub fn move_to_end_of_line(&mut self) {
        self.move_cursors(Motion::EndOfLine);
    }

    /// Move every cursor to the start of its screen row.
    pub fn move_to_beginning_of_screen_line(&mut self) {
        self.move_cursors(Motion::BeginningOfScreenLine);
    }

    /// Move every cursor to the end of its screen row.
    pub fn move_to_end_of_screen_line(&mut self) {
        self.move_cursors(Motion::EndOfScreenLine);
    }

    /// Move every cursor to the first non-whitespace character of its row.
    pub fn move_to_first_character_of_line(&mut self) {
        self.move_cursors(Motion::FirstCharacterOfLine);
    }

    /// Move every cursor to the start of its word.
    pub fn move_to_beginning_of_word(&mut self) {
        self.move_cursors(Motion::BeginningOfWord);
    }

    /// Move every cursor to the end of its word.
    pub fn move_to_end_of_word(&mut self) {
        self.move_cursors(Motion::EndOfWord);
    }

    /// Move every cursor to the start of the next word.
    pub fn move_to_beginning_of_next_word(&mut self) {
        self.move_cursors(Motion::BeginningOfNextWord);
    }

    /// Move every cursor to the previous word boundary.
    pub fn move_to_previous_word_boundary(&mut self) {
        self.move_cursors(Motion::PreviousWordBoundary);
    }

    /// Move every cursor to the next word boundary.
    pub fn move_to_next_word_boundary(&mut self) {
        self.move_cursors(Motion::NextWordBoundary);
    }

    /// Move every cursor to the previous subword boundary.
    pub fn move_to_previous_subword_boundary(&mut self) {
        self.move_cursors(Motion::PreviousSubwordBoundary);
    }

    /// Move every cursor to the next subword boundary.
    pub fn move_to_next_subword_boundary(&mut self) {
        self.move_cursors(Motion::NextSubwordBoundary);
    }

    /// Move every cursor to the start of the next paragraph.
    pub fn move_to_beginning_of_next_paragraph(&mut self) {
        self.move_cursors(Motion::BeginningOfNextParagraph);
    }

    /// Move every cursor to the start of the previous paragraph.
    pub fn move_to_beginning_of_previous_paragraph(&mut self) {
        self.move_cursors(Motion::BeginningOfPreviousParagraph);
    }

    /// Extend every selection left.
    pub fn select_left(&mut self, count: usize) {
        self.select(Motion::Left(count));
    }

    /// Extend every selection right.
    pub fn select_right(&mut self, count: usize) {
        self.select(Motion::Right(count));
    }

    /// Extend every selection up.
    pub fn select_up(&mut self, count: usize) {
        self.select(Motion::Up(count));
    }

    /// Extend every selection down.
    pub fn select_down(&mut self, count: usize) {
        self.select(Motion::Down(count));
    }

    /// Extend every selection to the start of its word.
    pub fn select_to_beginning_of_word(&mut self) {
        self.select(Motion::BeginningOfWord);
    }

    /// Extend every selection to the end of its word.
    pub fn select_to_end_of_word(&mut self) {
        self.select(Motion::EndOfWord);
    }

    /// Extend every selection to the previous subword boundary.
    pub fn select_to_previous_subword_boundary(&mut self) {
        self.select(Motion::PreviousSubwordBoundary);
    }

    /// Extend every selection to the next subword boundary.
    pub fn select_to_next_subword_boundary(&mut self) {
        self.select(Motion::NextSubwordBoundary);
    }

    /// Extend every selection to the start of the next paragraph.
    pub fn select_to_beginning_of_next_paragraph(&mut self) {
        self.select(Motion::BeginningOfNextParagraph);
    }

    /// Select the word under every cursor.
    ///
    /// Between two whitespace characters this selects the run of blanks; between a word and a
    /// non-word character it selects only the word.
    pub fn select_word(&mut self) {
        for selection in self.selections() {
            let head = selection.head();
            let non_word = self.resolver().non_word_characters(head);
            let range = words::word_range_for_selection(self.buffer.text(), head, &non_word);
            self.set_selection_range(selection.id, range, SelectionOptions::default());
        }
        self.merge_intersecting_selections();
    }

    /// Select the whole buffer.
    pub fn select_all(&mut self) {
        let range = Range::new(Point::zero(), self.buffer.text().end_position());
        self.set_selected_buffer_range(range, SelectionOptions::default());
    }

    /// The paragraph around the most recent cursor, if its row is not blank.
    pub fn current_paragraph_buffer_range(&self) -> Option<Range> {
        let row = self.cursor_buffer_position().row;
        let text = self.buffer.text();
        let mode = self.buffer.language_mode();
        words::paragraph_range_for_row(text, row, &|r| mode.is_row_commented(text, r))
    }

    // ---------------------------------------------------------------------------------------
    // Editing
    // ---------------------------------------------------------------------------------------

    /// Group every edit made by `f` into one undo step that restores this editor's selections.
    pub fn transact<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let before = self.state.selections.saved(self.buffer.markers());
        self.buffer.begin_transaction(Some(self.state.id), before);
        let result = f(self);
        let after = self.state.selections.saved(self.buffer.markers());
        self.buffer.commit_transaction(after);
        result
    }

    fn mutate_selected_text<T>(
        &mut self,
        mut f: impl FnMut(&mut Self, SelectionState) -> Result<T, EditorError>,
    ) -> Result<Vec<T>, EditorError> {
        let result = self.transact(|editor| {
            let ids: Vec<MarkerId> = editor
                .selections_ordered_by_buffer_position()
                .iter()
                .map(|s| s.id)
                .collect();
            let mut results = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(selection) = editor.state.selections.state(editor.buffer.markers(), id) {
                    results.push(f(editor, selection)?);
                }
            }
            Ok(results)
        });
        self.merge_intersecting_selections();
        result
    }

    /// Replace every selection with `text`. Returns the inserted ranges in buffer order.
    pub fn insert_text(&mut self, text: &str) -> Result<Vec<Range>, EditorError> {
        self.ensure_writable("insert text")?;
        self.mutate_selected_text(|editor, selection| editor.insert_text_at(&selection, text))
    }

    /// Insert a line break at every cursor.
    pub fn insert_newline(&mut self) -> Result<Vec<Range>, EditorError> {
        self.insert_text("\n")
    }

    fn insert_text_at(&mut self, selection: &SelectionState, text: &str) -> Result<Range, EditorError> {
        let new_range = self.buffer.set_text_in_range(selection.range, text)?;
        self.place_cursor(selection.id, new_range.end, None);

        if self.settings().auto_indent {
            if text == "\n" {
                self.auto_indent_row(new_range.end.row, true, false)?;
            } else if text.chars().any(|ch| !ch.is_whitespace()) {
                self.auto_decrease_indent_for_buffer_row(new_range.start.row)?;
            }
        }
        Ok(new_range)
    }

    /// Delete every selection, or the character after each cursor.
    pub fn delete(&mut self) -> Result<(), EditorError> {
        self.ensure_writable("delete")?;
        self.mutate_selected_text(|editor, selection| editor.delete_at(&selection, Motion::Right(1)))?;
        Ok(())
    }

    /// Delete every selection, or the character before each cursor.
    pub fn backspace(&mut self) -> Result<(), EditorError> {
        self.ensure_writable("backspace")?;
        self.mutate_selected_text(|editor, selection| editor.delete_at(&selection, Motion::Left(1)))?;
        Ok(())
    }

    fn delete_at(&mut self, selection: &SelectionState, motion: Motion) -> Result<(), EditorError> {
        let range = if selection.is_empty() {
            let target = self.resolver().resolve(motion, selection, false);
            let other = self
                .state
                .display
                .clip_buffer_position(self.buffer, target.position, ClipDirection::Closest);
            Range::new(selection.head(), other)
        } else {
            selection.range
        };
        if !range.is_empty() {
            self.buffer.delete(range)?;
        }
        self.place_cursor(selection.id, range.start, None);
        Ok(())
    }

    /// Replace `range` with `text`, returning the new range.
    pub fn set_text_in_buffer_range(&mut self, range: Range, text: &str) -> Result<Range, EditorError> {
        self.ensure_writable("set text in buffer range")?;
        self.buffer.set_text_in_range(range, text)
    }

    /// Undo the last transaction. Returns false if there was nothing to undo.
    pub fn undo(&mut self) -> Result<bool, EditorError> {
        self.ensure_writable("undo")?;
        let restore = self.buffer.undo()?;
        Ok(self.apply_history_restore(restore))
    }

    /// Redo the last undone transaction. Returns false if there was nothing to redo.
    pub fn redo(&mut self) -> Result<bool, EditorError> {
        self.ensure_writable("redo")?;
        let restore = self.buffer.redo()?;
        Ok(self.apply_history_restore(restore))
    }

    fn apply_history_restore(&mut self, restore: Option<HistoryRestore>) -> bool {
        let Some(restore) = restore else {
            return false;
        };
        if restore.editor == Some(self.state.id) {
            self.state
                .selections
                .restore(self.buffer.markers_mut(), &restore.selections);
        }
        self.merge_intersecting_selections();
        true
    }

    // ---------------------------------------------------------------------------------------
    // Line moves
    // ---------------------------------------------------------------------------------------

    /// Move the rows spanned by each selection above the display line preceding them.
    ///
    /// Folded regions are moved as a whole and refolded at their new position.
    pub fn move_line_up(&mut self) -> Result<(), EditorError> {
        self.ensure_writable("move line up")?;
        let mut selections = self.selected_buffer_ranges();
        selections.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.end.cmp(&b.end)));
        let (Some(first), Some(last)) = (selections.first().copied(), selections.last().copied()) else {
            return Ok(());
        };
        let text = self.buffer.text();
        if first.start.row == 0 {
            return Ok(());
        }
        if last.start.row == text.last_row() && text.line_for_row(text.last_row()).is_empty() {
            return Ok(());
        }

        self.transact(|editor| {
            let mut new_ranges = Vec::with_capacity(selections.len());
            let mut remaining = selections.into_iter().peekable();
            while let Some(selection) = remaining.next() {
                let mut group = vec![selection];
                let mut span_end = selection.end;
                while let Some(next) = remaining.next_if(|next| next.start.row == span_end.row) {
                    span_end = span_end.max(next.end);
                    group.push(next);
                }

                let mut end_row = span_end.row;
                if span_end.row > selection.start.row && span_end.column == 0 {
                    end_row -= 1;
                }
                let display = &editor.state.display;
                let start_row = display.find_boundary_preceding_buffer_row(editor.buffer, selection.start.row);
                let end_row = display.find_boundary_following_buffer_row(editor.buffer, end_row + 1);
                let Some(above) = start_row.checked_sub(1) else {
                    new_ranges.extend(group);
                    continue;
                };
                let preceding_row = display.find_boundary_preceding_buffer_row(editor.buffer, above);
                let lines_range = Range::new(Point::new(start_row, 0), Point::new(end_row, 0));
                let insert_delta = (start_row - preceding_row) as isize;

                let refold: Vec<Range> = editor
                    .state
                    .display
                    .destroy_folds_intersecting_buffer_range(editor.buffer, lines_range)
                    .into_iter()
                    .map(|range| range.translate_rows(-insert_delta))
                    .collect();

                let mut lines = editor.buffer.text().text_in_range(lines_range);
                let mut delete_range = lines_range;
                if !lines.ends_with('\n') {
                    let ending = editor
                        .buffer
                        .text()
                        .line_ending_for_row(lines_range.end.row.saturating_sub(2));
                    lines.push_str(ending.as_str());
                    // The moved rows end the buffer, so the row above loses its line ending.
                    delete_range.start = Point::new(above, editor.buffer.text().line_length_for_row(above));
                }
                editor.buffer.delete(delete_range)?;
                editor.buffer.insert(Point::new(preceding_row, 0), &lines)?;

                for range in refold {
                    editor.state.display.fold_buffer_range(editor.buffer, range);
                }
                new_ranges.extend(group.into_iter().map(|range| range.translate_rows(-insert_delta)));
            }
            editor.finish_line_move(&new_ranges)
        })
    }

    /// Move the rows spanned by each selection below the display line following them.
    pub fn move_line_down(&mut self) -> Result<(), EditorError> {
        self.ensure_writable("move line down")?;
        let mut selections = self.selected_buffer_ranges();
        selections.sort_by(|a, b| b.start.cmp(&a.start).then_with(|| b.end.cmp(&a.end)));
        if selections.is_empty() {
            return Ok(());
        }

        self.transact(|editor| {
            let mut new_ranges = Vec::with_capacity(selections.len());
            let mut remaining = selections.into_iter().peekable();
            while let Some(selection) = remaining.next() {
                let mut group = vec![selection];
                let mut span_start = selection.start;
                while let Some(next) = remaining.next_if(|next| next.end.row == span_start.row) {
                    span_start = span_start.min(next.start);
                    group.push(next);
                }

                let mut end_row = selection.end.row;
                if selection.end.row > span_start.row && selection.end.column == 0 {
                    end_row -= 1;
                }
                let display = &editor.state.display;
                let line_count = editor.buffer.text().line_count();
                let start_row = display.find_boundary_preceding_buffer_row(editor.buffer, span_start.row);
                let end_row = display.find_boundary_following_buffer_row(editor.buffer, end_row + 1);
                let lines_range = Range::new(Point::new(start_row, 0), Point::new(end_row, 0));
                let following_row = line_count.min(display.find_boundary_following_buffer_row(editor.buffer, end_row + 1));
                let insert_delta = following_row.saturating_sub(end_row) as isize;
                if insert_delta == 0 {
                    new_ranges.extend(group);
                    continue;
                }

                let refold: Vec<Range> = editor
                    .state
                    .display
                    .destroy_folds_intersecting_buffer_range(editor.buffer, lines_range)
                    .into_iter()
                    .map(|range| range.translate_rows(insert_delta))
                    .collect();

                let mut lines = editor.buffer.text().text_in_range(lines_range);
                if following_row == line_count {
                    let ending = editor.buffer.text().line_ending_for_row(end_row.saturating_sub(1));
                    if let Some(stripped) = lines.strip_suffix(ending.as_str()) {
                        lines = format!("{}{}", ending.as_str(), stripped);
                    }
                }
                editor.buffer.insert(Point::new(following_row, 0), &lines)?;
                editor.buffer.delete(lines_range)?;

                for range in refold {
                    editor.state.display.fold_buffer_range(editor.buffer, range);
                }
                new_ranges.extend(group.into_iter().map(|range| range.translate_rows(insert_delta)));
            }
            editor.finish_line_move(&new_ranges)
        })
    }

    fn finish_line_move(&mut self, new_ranges: &[Range]) -> Result<(), EditorError> {
        self.set_selected_buffer_ranges(
            new_ranges,
            SelectionOptions {
                reversed: false,
                preserve_folds: true,
            },
        );
        if self.settings().auto_indent {
            self.auto_indent_selected_rows()?;
        }
        Ok(())
    }

    // ---------------------------------------------------------------------------------------
    // Indentation
    // ---------------------------------------------------------------------------------------

    /// Indentation level of `row`.
    pub fn indentation_for_buffer_row(&self, row: usize) -> f64 {
        let line = self.buffer.text().line_for_row(row);
        self.buffer
            .language_mode()
            .indent_level_for_line(&line, self.tab_length())
    }

    /// Whitespace for indentation `level`, honoring soft tabs.
    pub fn build_indent_string(&self, level: f64) -> String {
        let tab_length = self.tab_length();
        let level = level.max(0.0);
        if self.settings().soft_tabs {
            " ".repeat((level * tab_length as f64).floor() as usize)
        } else {
            let tabs = level.floor();
            let spaces = ((level - tabs) * tab_length as f64).round() as usize;
            format!("{}{}", "\t".repeat(tabs as usize), " ".repeat(spaces))
        }
    }

    /// Reindent `row` to `level`.
    ///
    /// With `preserve_leading_whitespace`, the new indentation is inserted before the existing
    /// whitespace instead of replacing it.
    pub fn set_indentation_for_buffer_row(
        &mut self,
        row: usize,
        level: f64,
        preserve_leading_whitespace: bool,
    ) -> Result<Range, EditorError> {
        self.ensure_writable("set indentation")?;
        self.set_indentation(row, level, preserve_leading_whitespace)
    }

    fn set_indentation(&mut self, row: usize, level: f64, preserve_leading_whitespace: bool) -> Result<Range, EditorError> {
        let line = self.buffer.text().line_for_row(row);
        let leading: String = line.chars().take_while(|ch| ch.is_whitespace()).collect();
        let indent = self.build_indent_string(level);
        let end_column = if preserve_leading_whitespace {
            0
        } else {
            leading.chars().count()
        };
        let range = Range::new(Point::new(row, 0), Point::new(row, end_column));
        let unchanged = if preserve_leading_whitespace {
            indent.is_empty()
        } else {
            leading == indent
        };
        if unchanged {
            return Ok(range);
        }
        self.buffer.set_text_in_range(range, &indent)
    }

    /// Reindent `row` to the language mode's suggestion.
    pub fn auto_indent_buffer_row(&mut self, row: usize) -> Result<(), EditorError> {
        self.ensure_writable("auto indent")?;
        self.auto_indent_row(row, false, true)
    }

    fn auto_indent_row(
        &mut self,
        row: usize,
        preserve_leading_whitespace: bool,
        skip_blank_lines: bool,
    ) -> Result<(), EditorError> {
        let level = self.buffer.language_mode().suggested_indent_for_buffer_row(
            self.buffer.text(),
            row,
            self.tab_length(),
            skip_blank_lines,
        );
        self.set_indentation(row, level, preserve_leading_whitespace)?;
        Ok(())
    }

    fn auto_decrease_indent_for_buffer_row(&mut self, row: usize) -> Result<(), EditorError> {
        let level = self.buffer.language_mode().suggested_indent_for_edited_buffer_row(
            self.buffer.text(),
            row,
            self.tab_length(),
        );
        if let Some(level) = level {
            self.set_indentation(row, level, false)?;
        }
        Ok(())
    }

    /// Reindent every row touched by a selection.
    pub fn auto_indent_selected_rows(&mut self) -> Result<(), EditorError> {
        self.ensure_writable("auto indent")?;
        self.mutate_selected_text(|editor, selection| {
            let range = selection.range;
            let mut end_row = range.end.row;
            if range.end.column == 0 {
                end_row = range.start.row.max(end_row.saturating_sub(1));
            }
            for row in range.start.row..=end_row {
                editor.auto_indent_row(row, false, true)?;
            }
            Ok(())
        })?;
        Ok(())
    }

    // ---------------------------------------------------------------------------------------
    // Folding
    // ---------------------------------------------------------------------------------------

    /// Fold `range`. Empty ranges are ignored.
    pub fn fold_buffer_range(&mut self, range: Range) -> Option<MarkerId> {
        self.state.display.fold_buffer_range(self.buffer, range)
    }

    /// Every fold, ordered by start.
    pub fn folds(&self) -> Vec<(MarkerId, Range)> {
        self.state.display.folds(self.buffer)
    }

    /// Fold the innermost foldable range containing the end of the cursor's row.
    pub fn fold_current_row(&mut self) -> Option<MarkerId> {
        let row = self.cursor_buffer_position().row;
        let range = self.buffer.language_mode().foldable_range_containing_point(
            self.buffer.text(),
            Point::new(row, INFINITY),
            self.tab_length(),
        )?;
        self.fold_buffer_range(range)
    }

    /// Remove the folds containing the end of the cursor's row.
    pub fn unfold_current_row(&mut self) -> Vec<Range> {
        let row = self.cursor_buffer_position().row;
        self.unfold_buffer_row(row)
    }

    /// Fold the innermost unfolded foldable range around the end of `row`.
    ///
    /// When that range starts inside an existing fold, the search continues outward from the
    /// fold's first row.
    pub fn fold_buffer_row(&mut self, row: usize) -> Option<MarkerId> {
        let tab_length = self.tab_length();
        let mut position = Point::new(row, INFINITY);
        loop {
            let range = self.buffer.language_mode().foldable_range_containing_point(
                self.buffer.text(),
                position,
                tab_length,
            )?;
            let existing = self
                .state
                .display
                .folds_intersecting_buffer_range(self.buffer, Range::empty_at(range.start));
            match existing.first() {
                None => return self.fold_buffer_range(range),
                Some((_, fold)) if fold.start < position => {
                    position = Point::new(fold.start.row, 0);
                }
                Some(_) => return None,
            }
        }
    }

    /// Remove the folds containing the end of `row`.
    pub fn unfold_buffer_row(&mut self, row: usize) -> Vec<Range> {
        self.state.display.destroy_folds_containing_buffer_positions(
            self.buffer,
            &[Point::new(row, INFINITY)],
            false,
        )
    }

    /// Unfold `row` if it is folded, fold it otherwise.
    pub fn toggle_fold_at_buffer_row(&mut self, row: usize) {
        if self.is_folded_at_buffer_row(row) {
            self.unfold_buffer_row(row);
        } else {
            self.fold_buffer_row(row);
        }
    }

    /// Replace every fold with one fold per foldable range.
    pub fn fold_all(&mut self) {
        self.state.display.destroy_all_folds(self.buffer);
        let ranges = self
            .buffer
            .language_mode()
            .foldable_ranges(self.buffer.text(), self.tab_length());
        for range in ranges {
            self.fold_buffer_range(range);
        }
    }

    /// Replace every fold with the foldable ranges starting at indentation `level`.
    pub fn fold_all_at_indent_level(&mut self, level: usize) {
        self.state.display.destroy_all_folds(self.buffer);
        let ranges = self.buffer.language_mode().foldable_ranges_at_indent_level(
            self.buffer.text(),
            level,
            self.tab_length(),
        );
        for range in ranges {
            self.fold_buffer_range(range);
        }
    }

    /// Remove every fold.
    pub fn unfold_all(&mut self) -> Vec<Range> {
        self.state.display.destroy_all_folds(self.buffer)
    }

    /// Fold every non-empty selection, moving its cursor to the fold's end.
    pub fn fold_selected_lines(&mut self) {
        for selection in self.selections() {
            if selection.is_empty() {
                continue;
            }
            self.fold_buffer_range(selection.range);
            self.place_cursor(selection.id, selection.range.end, None);
        }
        self.merge_cursors();
    }

    /// Returns true if a fold touches `row`.
    pub fn is_folded_at_buffer_row(&self, row: usize) -> bool {
        self.state.display.is_folded_at_buffer_row(self.buffer, row)
    }

    /// Returns true if the cursor's row is folded.
    pub fn is_folded_at_cursor_row(&self) -> bool {
        self.is_folded_at_buffer_row(self.cursor_buffer_position().row)
    }

    /// Returns true if a fold can start at `row`.
    pub fn is_foldable_at_buffer_row(&self, row: usize) -> bool {
        self.buffer
            .language_mode()
            .is_foldable_at_row(self.buffer.text(), row)
    }

    // ---------------------------------------------------------------------------------------
    // Markers and decorations
    // ---------------------------------------------------------------------------------------

    /// This editor's default marker layer.
    pub fn marker_layer(&self) -> MarkerLayerId {
        self.state.marker_layer
    }

    /// Create a marker in this editor's default layer.
    pub fn mark_buffer_range(&mut self, range: Range, options: MarkerOptions) -> Option<MarkerId> {
        let range = self.buffer.text().clip_range(range);
        self.buffer
            .markers_mut()
            .mark_range(self.state.marker_layer, range, options)
    }

    /// Decorate a marker of the default layer or a selection.
    pub fn decorate_marker(&mut self, marker: MarkerId, properties: BTreeMap<String, String>) -> Option<DecorationId> {
        let layer = if self.buffer.markers().marker(self.state.marker_layer, marker).is_some() {
            self.state.marker_layer
        } else if self.state.selections.contains(marker) {
            self.state.selections.layer()
        } else {
            return None;
        };
        let id = self.ids.decoration_id();
        self.state.decorations.insert(
            id,
            Decoration {
                layer,
                marker,
                properties,
            },
        );
        Some(id)
    }

    /// Remove a decoration.
    pub fn destroy_decoration(&mut self, id: DecorationId) -> bool {
        self.state.decorations.remove(&id).is_some()
    }

    /// Decorations whose markers intersect screen rows `start..end`.
    pub fn decorations_state_for_screen_row_range(
        &self,
        start: usize,
        end: usize,
    ) -> BTreeMap<DecorationId, DecorationState> {
        let mut states = BTreeMap::new();
        if end <= start {
            return states;
        }
        for (id, decoration) in &self.state.decorations {
            let Some(marker) = self.buffer.markers().marker(decoration.layer, decoration.marker) else {
                continue;
            };
            let screen_range = self.screen_range_for_buffer_range(marker.range);
            if screen_range.start.row < end && screen_range.end.row >= start {
                states.insert(
                    *id,
                    DecorationState {
                        properties: decoration.properties.clone(),
                        screen_range,
                        buffer_range: marker.range,
                        range_is_reversed: marker.reversed,
                    },
                );
            }
        }
        states
    }

    // ---------------------------------------------------------------------------------------
    // Language mode
    // ---------------------------------------------------------------------------------------

    /// Run one slice of background tokenization. Returns true if more work remains.
    pub fn tokenize_next_chunk(&mut self) -> bool {
        self.buffer.tokenize_next_chunk()
    }

    /// Bring highlighting up to date, returning the buffer ranges whose scopes changed.
    pub fn update_highlights(&mut self) -> Vec<Range> {
        self.buffer.update_highlights()
    }

    /// The tokenized form of `row`.
    pub fn tokenized_line_for_buffer_row(&self, row: usize) -> TokenizedLine {
        self.buffer
            .language_mode()
            .tokenized_line_for_row(self.buffer.text(), row)
    }

    /// Scopes at `position`.
    pub fn scope_descriptor_for_buffer_position(&self, position: Point) -> ScopeDescriptor {
        self.buffer
            .language_mode()
            .scope_descriptor_for_position(self.buffer.text(), position)
    }

    /// Returns true if `row` is a comment line.
    pub fn is_buffer_row_commented(&self, row: usize) -> bool {
        self.buffer
            .language_mode()
            .is_row_commented(self.buffer.text(), row)
    }

    /// The rendered tokens of `screen_row`.
    pub fn screen_line_tokens(&self, screen_row: usize) -> Vec<ScreenLineToken> {
        let Some(line) = self.screen_line_for_screen_row(screen_row) else {
            return Vec::new();
        };
        let mode = self.buffer.language_mode();
        let mut iterator = mode.build_highlight_iterator(self.buffer.text());
        let names = |scopes: &[ScopeId]| -> Vec<String> {
            scopes.iter().filter_map(|id| mode.scope_name_for_id(*id)).collect()
        };

        let mut tokens = Vec::new();
        for span in &line.spans {
            let span_text = |from: usize, to: usize| -> String {
                line.text.chars().skip(from).take(to.saturating_sub(from)).collect()
            };
            if !span.is_content() {
                tokens.push(ScreenLineToken {
                    text: span_text(span.screen_start, span.screen_end),
                    scopes: Vec::new(),
                });
                continue;
            }

            let mut scopes = iterator.seek(span.buffer_start);
            let mut exhausted = false;
            apply_boundaries_through(iterator.as_mut(), &mut scopes, span.buffer_start, &mut exhausted);
            if span.is_atomic() {
                tokens.push(ScreenLineToken {
                    text: span_text(span.screen_start, span.screen_end),
                    scopes: names(&scopes),
                });
                continue;
            }

            let mut position = span.buffer_start;
            while position < span.buffer_end {
                let next = if !exhausted && iterator.position() < span.buffer_end {
                    iterator.position()
                } else {
                    span.buffer_end
                };
                let from = span.screen_start + (position.column - span.buffer_start.column);
                let to = span.screen_start + (next.column - span.buffer_start.column);
                tokens.push(ScreenLineToken {
                    text: span_text(from, to),
                    scopes: names(&scopes),
                });
                apply_boundaries_through(iterator.as_mut(), &mut scopes, next, &mut exhausted);
                position = next;
            }
        }
        tokens
    }
}

/// Apply every boundary at or before `target` to `scopes`.
fn apply_boundaries_through<I: HighlightIterator + ?Sized>(
    iterator: &mut I,
    scopes: &mut Vec<ScopeId>,
    target: Point,
    exhausted: &mut bool,
) {
    while !*exhausted && iterator.position() <= target {
        for id in iterator.close_scope_ids() {
            if let Some(index) = scopes.iter().rposition(|open| *open == id) {
                scopes.remove(index);
            }
        }
        scopes.extend(iterator.open_scope_ids());
        if !iterator.move_to_successor() {
            *exhausted = true;
        }
    }
}
