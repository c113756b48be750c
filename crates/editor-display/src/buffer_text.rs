//! Rope-backed buffer text with row/column addressing.
//!
//! The text is stored verbatim (line endings are not normalized). Rows are separated by `\n`,
//! `\r\n` or `\r`; columns are `char` offsets inside a row, excluding its terminator.

use crate::line_ending::LineEnding;
use crate::point::{Point, Range};
use ropey::{Rope, RopeSlice};

/// Describes one edit applied to a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferChange {
    /// Range of the replaced text, in pre-edit coordinates.
    pub old_range: Range,
    /// Range of the inserted text, in post-edit coordinates.
    pub new_range: Range,
    /// Replaced text.
    pub old_text: String,
    /// Inserted text.
    pub new_text: String,
}

impl BufferChange {
    /// Row delta introduced by the change (`new_range.end.row - old_range.end.row`).
    pub fn row_delta(&self) -> isize {
        self.new_range.end.row as isize - self.old_range.end.row as isize
    }

    /// The change that undoes this one.
    pub fn inverted(&self) -> BufferChange {
        BufferChange {
            old_range: self.new_range,
            new_range: self.old_range,
            old_text: self.new_text.clone(),
            new_text: self.old_text.clone(),
        }
    }
}

/// The text of a buffer.
#[derive(Debug, Clone, Default)]
pub struct BufferText {
    rope: Rope,
}

impl BufferText {
    /// Create an empty text.
    pub fn new() -> Self {
        Self { rope: Rope::new() }
    }

    /// Build the text from a string.
    pub fn from_text(text: &str) -> Self {
        Self {
            rope: Rope::from_str(text),
        }
    }

    /// The full text.
    pub fn text(&self) -> String {
        self.rope.to_string()
    }

    /// Total number of chars.
    pub fn len_chars(&self) -> usize {
        self.rope.len_chars()
    }

    /// Total number of UTF-8 bytes.
    pub fn len_bytes(&self) -> usize {
        self.rope.len_bytes()
    }

    /// Returns true if the buffer contains no text.
    pub fn is_empty(&self) -> bool {
        self.rope.len_chars() == 0
    }

    /// Number of rows (always at least one).
    pub fn line_count(&self) -> usize {
        self.rope.len_lines().max(1)
    }

    /// Index of the last row.
    pub fn last_row(&self) -> usize {
        self.line_count() - 1
    }

    fn raw_row(&self, row: usize) -> Option<RopeSlice<'_>> {
        (row < self.rope.len_lines()).then(|| self.rope.line(row))
    }

    /// Row content without its terminator. Rows past the end are empty.
    pub fn line_for_row(&self, row: usize) -> String {
        let Some(slice) = self.raw_row(row) else {
            return String::new();
        };
        let mut raw = slice.to_string();
        let keep = LineEnding::split_row(&raw).0.len();
        raw.truncate(keep);
        raw
    }

    /// Rows `[start, end)` without terminators.
    pub fn lines_for_rows(&self, start: usize, end: usize) -> Vec<String> {
        (start..end.min(self.line_count()))
            .map(|row| self.line_for_row(row))
            .collect()
    }

    /// Row length in chars, excluding the terminator.
    pub fn line_length_for_row(&self, row: usize) -> usize {
        let Some(slice) = self.raw_row(row) else {
            return 0;
        };
        let ending = self.line_ending_for_row(row);
        slice.len_chars().saturating_sub(ending.len())
    }

    /// The terminator of `row`.
    pub fn line_ending_for_row(&self, row: usize) -> LineEnding {
        let Some(slice) = self.raw_row(row) else {
            return LineEnding::None;
        };
        let n = slice.len_chars();
        let last = (n > 0).then(|| slice.char(n - 1));
        let before_last = (n > 1).then(|| slice.char(n - 2));
        match (before_last, last) {
            (Some('\r'), Some('\n')) => LineEnding::Crlf,
            (_, Some('\n')) => LineEnding::Lf,
            (_, Some('\r')) => LineEnding::Cr,
            _ => LineEnding::None,
        }
    }

    /// The position just past the last char.
    pub fn end_position(&self) -> Point {
        let row = self.last_row();
        Point::new(row, self.line_length_for_row(row))
    }

    /// Clamp a position into the buffer. Rows past the end clip to the end of the buffer.
    pub fn clip_position(&self, position: Point) -> Point {
        let last_row = self.last_row();
        if position.row > last_row {
            return self.end_position();
        }
        Point::new(
            position.row,
            position.column.min(self.line_length_for_row(position.row)),
        )
    }

    /// Clamp both ends of a range.
    pub fn clip_range(&self, range: Range) -> Range {
        Range::new(self.clip_position(range.start), self.clip_position(range.end))
    }

    /// Char offset of a (clipped) position.
    pub fn character_index_for_position(&self, position: Point) -> usize {
        let p = self.clip_position(position);
        if self.rope.len_chars() == 0 {
            return 0;
        }
        self.rope.line_to_char(p.row) + p.column
    }

    /// Position of a char offset (clamped to the end).
    pub fn position_for_character_index(&self, index: usize) -> Point {
        let index = index.min(self.rope.len_chars());
        let row = self.rope.char_to_line(index);
        let row_start = self.rope.line_to_char(row);
        let column = index - row_start;
        // An offset between `\r` and `\n` belongs to the end of the row.
        Point::new(row, column.min(self.line_length_for_row(row)))
    }

    /// UTF-8 byte offset of a (clipped) position.
    pub fn byte_index_for_position(&self, position: Point) -> usize {
        self.rope
            .char_to_byte(self.character_index_for_position(position))
    }

    /// Byte offset of `column` within `row` (used for tree-sitter points).
    pub fn byte_column_for_position(&self, position: Point) -> usize {
        let p = self.clip_position(position);
        if self.rope.len_chars() == 0 {
            return 0;
        }
        let row_start = self.rope.line_to_char(p.row);
        self.rope.char_to_byte(row_start + p.column) - self.rope.char_to_byte(row_start)
    }

    /// Position for a UTF-8 byte offset.
    pub fn position_for_byte_index(&self, byte: usize) -> Point {
        let byte = byte.min(self.rope.len_bytes());
        self.position_for_character_index(self.rope.byte_to_char(byte))
    }

    /// The rope chunk containing `byte`, with the byte offset at which the chunk starts.
    ///
    /// Returns an empty chunk positioned at the end for offsets past the end of the text.
    pub fn chunk_at_byte(&self, byte: usize) -> (&str, usize) {
        if byte >= self.rope.len_bytes() {
            return ("", self.rope.len_bytes());
        }
        let (chunk, chunk_start, _, _) = self.rope.chunk_at_byte(byte);
        (chunk, chunk_start)
    }

    /// Text between two UTF-8 byte offsets (clamped, rounded down to char boundaries).
    pub fn text_for_byte_range(&self, start: usize, end: usize) -> String {
        let len = self.rope.len_bytes();
        let start = self.rope.byte_to_char(start.min(len));
        let end = self.rope.byte_to_char(end.min(len));
        self.rope.slice(start..end.max(start)).to_string()
    }

    /// Text covered by a (clipped) range.
    pub fn text_in_range(&self, range: Range) -> String {
        let start = self.character_index_for_position(range.start);
        let end = self.character_index_for_position(range.end);
        self.rope.slice(start..end.max(start)).to_string()
    }

    /// A borrowed slice of the rope between two char offsets.
    pub fn slice(&self, start: usize, end: usize) -> RopeSlice<'_> {
        let end = end.min(self.rope.len_chars());
        self.rope.slice(start.min(end)..end)
    }

    /// Replace `range` with `text`, returning the resulting change.
    pub fn set_text_in_range(&mut self, range: Range, text: &str) -> BufferChange {
        let old_range = self.clip_range(range);
        let start = self.character_index_for_position(old_range.start);
        let end = self.character_index_for_position(old_range.end);
        let old_text = self.rope.slice(start..end).to_string();
        self.rope.remove(start..end);
        self.rope.insert(start, text);
        let new_end = self.position_for_character_index(start + text.chars().count());
        BufferChange {
            old_range,
            new_range: Range::new(old_range.start, new_end),
            old_text,
            new_text: text.to_string(),
        }
    }

    /// Returns true if the row contains only whitespace.
    pub fn is_row_blank(&self, row: usize) -> bool {
        self.line_for_row(row).chars().all(char::is_whitespace)
    }

    /// Nearest non-blank row strictly above `row`.
    pub fn previous_non_blank_row(&self, row: usize) -> Option<usize> {
        let row = row.min(self.line_count());
        (0..row).rev().find(|r| !self.is_row_blank(*r))
    }

    /// Nearest non-blank row strictly below `row`.
    pub fn next_non_blank_row(&self, row: usize) -> Option<usize> {
        (row + 1..self.line_count()).find(|r| !self.is_row_blank(*r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_keep_their_own_terminators() {
        let text = BufferText::from_text("ab\r\ncd\nef");
        assert_eq!(text.line_count(), 3);
        assert_eq!(text.line_for_row(0), "ab");
        assert_eq!(text.line_ending_for_row(0), LineEnding::Crlf);
        assert_eq!(text.line_ending_for_row(1), LineEnding::Lf);
        assert_eq!(text.line_ending_for_row(2), LineEnding::None);
        assert_eq!(text.line_length_for_row(0), 2);
    }

    #[test]
    fn test_byte_addressing() {
        let text = BufferText::from_text("héllo\nwörld");
        assert_eq!(text.text_for_byte_range(1, 3), "é");
        assert_eq!(text.text_for_byte_range(7, 100), "wörld");
        let (chunk, start) = text.chunk_at_byte(0);
        assert_eq!(start, 0);
        assert!(chunk.starts_with("héllo"));
        assert_eq!(text.chunk_at_byte(100), ("", text.len_bytes()));
    }

    #[test]
    fn test_clip_position_handles_sentinels() {
        let text = BufferText::from_text("abc\nde");
        assert_eq!(text.clip_position(Point::end_of_row(0)), Point::new(0, 3));
        assert_eq!(text.clip_position(Point::new(9, 0)), Point::new(1, 2));
    }

    #[test]
    fn test_character_index_round_trip_over_crlf() {
        let text = BufferText::from_text("ab\r\ncd");
        assert_eq!(text.character_index_for_position(Point::new(1, 1)), 5);
        assert_eq!(text.position_for_character_index(5), Point::new(1, 1));
        // Between '\r' and '\n' snaps to end of row.
        assert_eq!(text.position_for_character_index(3), Point::new(0, 2));
    }

    #[test]
    fn test_set_text_in_range_reports_change() {
        let mut text = BufferText::from_text("hello\nworld");
        let change = text.set_text_in_range(Range::new((0, 5), (1, 0)), " big\nwide ");
        assert_eq!(text.text(), "hello big\nwide world");
        assert_eq!(change.old_text, "\n");
        assert_eq!(change.new_range, Range::new((0, 5), (1, 5)));
        assert_eq!(change.row_delta(), 0);
    }

    #[test]
    fn test_blank_row_navigation() {
        let text = BufferText::from_text("a\n  \n\nb");
        assert!(text.is_row_blank(1));
        assert_eq!(text.previous_non_blank_row(3), Some(0));
        assert_eq!(text.next_non_blank_row(0), Some(3));
    }
}
