//! Cursor motions.
//!
//! A [`Motion`] is resolved against the buffer and an editor's display layer to produce the
//! cursor's next buffer position. Horizontal and vertical moves work in screen coordinates so
//! that folds, soft wraps and atomic soft tabs are stepped over as units; line, word and
//! paragraph moves work in buffer coordinates.

use crate::display_layer::{ClipOptions, DisplayLayer, ScreenLine};
use crate::point::{ClipDirection, INFINITY, Point};
use crate::selection::SelectionState;
use crate::text_buffer::TextBuffer;
use crate::words;

/// A cursor movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Motion {
    /// Up by this many screen rows, keeping the goal column.
    Up(usize),
    /// Down by this many screen rows, keeping the goal column.
    Down(usize),
    /// Left by this many screen columns, wrapping to the previous row.
    Left(usize),
    /// Right by this many screen columns, wrapping to the next row.
    Right(usize),
    /// Start of the buffer.
    Top,
    /// End of the buffer.
    Bottom,
    /// Column 0 of the buffer row.
    BeginningOfLine,
    /// End of the buffer row.
    EndOfLine,
    /// First column of the screen row.
    BeginningOfScreenLine,
    /// Last column of the screen row.
    EndOfScreenLine,
    /// First non-whitespace character of the screen row, or its start if already there.
    FirstCharacterOfLine,
    /// Start of the word under or before the cursor.
    BeginningOfWord,
    /// End of the word under or after the cursor.
    EndOfWord,
    /// Start of the next word.
    BeginningOfNextWord,
    /// Previous word start or end.
    PreviousWordBoundary,
    /// Next word start or end.
    NextWordBoundary,
    /// Previous camelCase / snake_case boundary.
    PreviousSubwordBoundary,
    /// Next camelCase / snake_case boundary.
    NextSubwordBoundary,
    /// First row after the next blank line.
    BeginningOfNextParagraph,
    /// First row after the previous blank line.
    BeginningOfPreviousParagraph,
}

impl Motion {
    /// Returns true if selecting with this motion grows the selection towards the buffer start.
    pub fn is_backward(self) -> bool {
        matches!(
            self,
            Motion::Up(_)
                | Motion::Left(_)
                | Motion::Top
                | Motion::BeginningOfLine
                | Motion::BeginningOfScreenLine
                | Motion::FirstCharacterOfLine
                | Motion::BeginningOfWord
                | Motion::PreviousWordBoundary
                | Motion::PreviousSubwordBoundary
                | Motion::BeginningOfPreviousParagraph
        )
    }
}

/// Where a motion puts the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CursorTarget {
    pub(crate) position: Point,
    pub(crate) goal_column: Option<usize>,
}

impl CursorTarget {
    fn at(position: Point) -> Self {
        Self {
            position,
            goal_column: None,
        }
    }
}

/// Resolves motions for one editor.
pub(crate) struct MotionResolver<'a> {
    buffer: &'a TextBuffer,
    display: &'a DisplayLayer,
}

impl<'a> MotionResolver<'a> {
    pub(crate) fn new(buffer: &'a TextBuffer, display: &'a DisplayLayer) -> Self {
        Self { buffer, display }
    }

    /// Resolve `motion` for `selection`.
    ///
    /// With `move_to_end_of_selection`, a horizontal or vertical move starts from the edge of a
    /// non-empty selection that lies in the direction of travel.
    pub(crate) fn resolve(
        &self,
        motion: Motion,
        selection: &SelectionState,
        move_to_end_of_selection: bool,
    ) -> CursorTarget {
        let head = selection.head();
        let range = selection.range;
        let collapse = move_to_end_of_selection && !range.is_empty();
        let text = self.buffer.text();

        match motion {
            Motion::Up(count) => {
                let from = if collapse { range.start } else { head };
                self.vertical(from, selection.goal_column, -(count as isize))
            }
            Motion::Down(count) => {
                let from = if collapse { range.end } else { head };
                self.vertical(from, selection.goal_column, count as isize)
            }
            Motion::Left(_) if collapse => CursorTarget::at(range.start),
            Motion::Right(_) if collapse => CursorTarget::at(range.end),
            Motion::Left(count) => CursorTarget::at(self.left(head, count)),
            Motion::Right(count) => CursorTarget::at(self.right(head, count)),
            Motion::Top => CursorTarget::at(Point::zero()),
            Motion::Bottom => CursorTarget {
                position: text.end_position(),
                goal_column: selection.goal_column,
            },
            Motion::BeginningOfLine => CursorTarget::at(Point::new(head.row, 0)),
            Motion::EndOfLine => CursorTarget::at(Point::new(head.row, text.line_length_for_row(head.row))),
            Motion::BeginningOfScreenLine => {
                let screen = self.to_screen(head);
                CursorTarget::at(self.to_buffer(Point::new(screen.row, 0), skip_indent(ClipDirection::Closest)))
            }
            Motion::EndOfScreenLine => {
                let screen = self.to_screen(head);
                CursorTarget::at(self.to_buffer(Point::new(screen.row, INFINITY), ClipDirection::Closest))
            }
            Motion::FirstCharacterOfLine => CursorTarget::at(self.first_character_of_line(head)),
            Motion::BeginningOfWord => {
                let position = self
                    .word_regex(head, true)
                    .map(|regex| words::beginning_of_current_word(text, head, &regex, true))
                    .unwrap_or(head);
                CursorTarget::at(position)
            }
            Motion::EndOfWord => {
                let position = self
                    .word_regex(head, true)
                    .map(|regex| words::end_of_current_word(text, head, &regex, true))
                    .unwrap_or(head);
                CursorTarget::at(position)
            }
            Motion::BeginningOfNextWord => {
                let position = self
                    .word_regex(head, true)
                    .map(|regex| words::beginning_of_next_word(text, head, &regex))
                    .unwrap_or(head);
                CursorTarget::at(position)
            }
            Motion::PreviousWordBoundary => {
                let position = self
                    .word_regex(head, true)
                    .map(|regex| words::previous_word_boundary(text, head, &regex))
                    .unwrap_or(head);
                CursorTarget::at(position)
            }
            Motion::NextWordBoundary => {
                let position = self
                    .word_regex(head, true)
                    .map(|regex| words::next_word_boundary(text, head, &regex))
                    .unwrap_or(head);
                CursorTarget::at(position)
            }
            Motion::PreviousSubwordBoundary => {
                let non_word = self.non_word_characters(head);
                let position = words::subword_regex(&non_word, true)
                    .map(|regex| words::previous_word_boundary(text, head, &regex))
                    .unwrap_or(head);
                CursorTarget::at(position)
            }
            Motion::NextSubwordBoundary => {
                let non_word = self.non_word_characters(head);
                let position = words::subword_regex(&non_word, false)
                    .map(|regex| words::next_word_boundary(text, head, &regex))
                    .unwrap_or(head);
                CursorTarget::at(position)
            }
            Motion::BeginningOfNextParagraph => CursorTarget::at(words::beginning_of_next_paragraph(text, head)),
            Motion::BeginningOfPreviousParagraph => {
                CursorTarget::at(words::beginning_of_previous_paragraph(text, head))
            }
        }
    }

    pub(crate) fn non_word_characters(&self, position: Point) -> String {
        self.buffer
            .language_mode()
            .non_word_characters(self.buffer.text(), position)
    }

    fn word_regex(&self, position: Point, include_non_word_characters: bool) -> Option<onig::Regex> {
        words::word_regex(&self.non_word_characters(position), include_non_word_characters)
    }

    fn to_screen(&self, position: Point) -> Point {
        self.display
            .translate_buffer_position(self.buffer, position, ClipDirection::Closest)
    }

    fn to_buffer(&self, screen: Point, options: impl Into<ClipOptions>) -> Point {
        self.display.translate_screen_position(self.buffer, screen, options)
    }

    fn screen_line(&self, screen_row: usize) -> Option<ScreenLine> {
        self.display.screen_line_for_screen_row(self.buffer, screen_row)
    }

    fn vertical(&self, from: Point, goal_column: Option<usize>, rows: isize) -> CursorTarget {
        let screen = self.to_screen(from);
        let column = goal_column.unwrap_or(screen.column);
        let position = match screen.row.checked_add_signed(rows) {
            Some(row) => self.to_buffer(Point::new(row, column), skip_indent(ClipDirection::Closest)),
            None => Point::zero(),
        };
        CursorTarget {
            position,
            goal_column: Some(column),
        }
    }

    /// Step `count` columns left. Hard row boundaries cost one column, as does the step from a
    /// wrapped row's first column to the end of the row before it.
    fn left(&self, head: Point, count: usize) -> Point {
        let screen = self.to_screen(head);
        let (mut row, mut column, mut count) = (screen.row, screen.column, count);
        loop {
            let first = self.screen_line(row).map(|l| l.first_column()).unwrap_or(0);
            let available = column.saturating_sub(first);
            if count <= available || row == 0 {
                column = column.saturating_sub(count).max(first);
                break;
            }
            count -= available + 1;
            row -= 1;
            column = self.screen_line(row).map(|l| l.max_column()).unwrap_or(0);
        }
        self.to_buffer(Point::new(row, column), skip_indent(ClipDirection::Backward))
    }

    /// Step `count` columns right, the mirror image of [`left`](Self::left).
    fn right(&self, head: Point, count: usize) -> Point {
        let screen = self.to_screen(head);
        let last_row = self.display.last_screen_row(self.buffer);
        let (mut row, mut column, mut count) = (screen.row, screen.column, count);
        loop {
            let max = self.screen_line(row).map(|l| l.max_column()).unwrap_or(0);
            let available = max.saturating_sub(column);
            if count <= available || row >= last_row {
                column = column.saturating_add(count).min(max);
                break;
            }
            count -= available + 1;
            row += 1;
            column = self.screen_line(row).map(|l| l.first_column()).unwrap_or(0);
        }
        self.to_buffer(Point::new(row, column), skip_indent(ClipDirection::Forward))
    }

    fn first_character_of_line(&self, head: Point) -> Point {
        let screen_row = self.to_screen(head).row;
        let start = self.to_buffer(Point::new(screen_row, 0), skip_indent(ClipDirection::Closest));
        let end = self.to_buffer(Point::new(screen_row, INFINITY), ClipDirection::Closest);
        let text = self.buffer.text();
        let base = text.character_index_for_position(start);
        let first_character = text
            .text_in_range(crate::point::Range::new(start, end))
            .chars()
            .position(|ch| !ch.is_whitespace())
            .map(|offset| text.position_for_character_index(base + offset));
        match first_character {
            Some(position) if position != head => position,
            _ => start,
        }
    }
}

fn skip_indent(direction: ClipDirection) -> ClipOptions {
    ClipOptions {
        direction,
        skip_soft_wrap_indentation: true,
    }
}
