//! Cell widths and soft-wrap points.
//!
//! Computes character widths based on UAX #11 and the word-preferring wrap algorithm used by the
//! display layer. Wrapping works on [`LayoutUnit`]s rather than chars so that grapheme clusters,
//! hard tabs and fold placeholders are never split across screen rows.

use unicode_width::UnicodeWidthChar;

/// Calculate visual width of a character (based on UAX #11)
///
/// Return value:
/// - 1: Narrow character (ASCII, etc.)
/// - 2: Wide character (CJK, fullwidth, etc.)
/// - 0: Zero-width character (combining characters, etc.)
pub fn char_width(ch: char) -> usize {
    UnicodeWidthChar::width(ch).unwrap_or(1)
}

/// Visual width (in cells) of `ch` at a specific cell offset within the line.
///
/// `'\t'` advances to the next tab stop; everything else follows [`char_width`].
pub fn cell_width_at(ch: char, cell_offset_in_line: usize, tab_length: usize) -> usize {
    if ch == '\t' {
        let tab_length = tab_length.max(1);
        tab_length - cell_offset_in_line % tab_length
    } else {
        char_width(ch)
    }
}

/// Total visual width of a string, interpreting `'\t'` using `tab_length`.
pub fn str_width_with_tab_length(s: &str, tab_length: usize) -> usize {
    let mut x = 0usize;
    for ch in s.chars() {
        x = x.saturating_add(cell_width_at(ch, x, tab_length));
    }
    x
}

/// Width in screen columns of `line`'s leading spaces and tabs.
pub fn leading_whitespace_columns(line: &str, tab_length: usize) -> usize {
    let tab_length = tab_length.max(1);
    let mut x = 0usize;
    for ch in line.chars() {
        match ch {
            ' ' => x += 1,
            '\t' => x += tab_length - x % tab_length,
            _ => break,
        }
    }
    x
}

/// Indentation of soft-wrapped continuation rows.
///
/// The line's own leading whitespace plus the hanging indent, kept strictly below the wrap
/// column so that every continuation row has room for at least one cell of content.
pub fn soft_wrap_indent_columns(
    line_text: &str,
    hanging_indent: usize,
    wrap_column: usize,
    tab_length: usize,
) -> usize {
    if wrap_column <= 1 {
        return 0;
    }
    let raw = leading_whitespace_columns(line_text, tab_length).saturating_add(hanging_indent);
    raw.min(wrap_column - 1)
}

/// An indivisible piece of a screen line, as seen by the wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutUnit {
    /// Cells occupied on screen.
    pub cells: usize,
    /// Whitespace units may hang past the wrap column and are preferred break positions.
    pub is_whitespace: bool,
}

/// Indices of the units that start a new screen row.
///
/// A row breaks after the last whitespace unit that fits, falling back to a hard break right
/// before the unit that overflows. Whitespace never forces a break, and leading whitespace is
/// never a break position. Continuation rows start `indent_cells` in.
pub fn soft_wrap_points(units: &[LayoutUnit], wrap_column: usize, indent_cells: usize) -> Vec<usize> {
    let mut wrap_points = Vec::new();
    if wrap_column == 0 {
        return wrap_points;
    }

    let mut segment_start = 0usize;
    let mut segment_start_x = 0usize;
    let mut last_break: Option<(usize, usize)> = None; // (unit index, x_in_line)
    let mut x_in_line = 0usize;
    let mut seen_content = false;

    for (index, unit) in units.iter().enumerate() {
        if !unit.is_whitespace {
            loop {
                let indent = if segment_start == 0 { 0 } else { indent_cells };
                let x_in_segment = x_in_line - segment_start_x + indent;
                if x_in_segment + unit.cells <= wrap_column {
                    break;
                }

                if let Some((break_index, break_x)) = last_break
                    && break_index > segment_start
                {
                    wrap_points.push(break_index);
                    segment_start = break_index;
                    segment_start_x = break_x;
                    last_break = None;
                    continue;
                }

                // Fallback: hard break before this unit, unless it already starts the row.
                if index > segment_start {
                    wrap_points.push(index);
                    segment_start = index;
                    segment_start_x = x_in_line;
                }
                last_break = None;
                break;
            }
        }

        x_in_line += unit.cells;

        if !unit.is_whitespace {
            seen_content = true;
        } else if seen_content {
            last_break = Some((index + 1, x_in_line));
        }
    }

    wrap_points
}

#[cfg(test)]
mod tests {
    use super::*;

    fn units(text: &str) -> Vec<LayoutUnit> {
        text.chars()
            .map(|ch| LayoutUnit {
                cells: char_width(ch),
                is_whitespace: ch.is_whitespace(),
            })
            .collect()
    }

    #[test]
    fn test_char_width() {
        assert_eq!(char_width('a'), 1);
        assert_eq!(char_width(' '), 1);
        assert_eq!(char_width('你'), 2);
        assert_eq!(char_width('界'), 2);
        assert_eq!(char_width('🦀'), 2);
    }

    #[test]
    fn test_tab_width_expansion() {
        assert_eq!(cell_width_at('\t', 0, 4), 4);
        assert_eq!(cell_width_at('\t', 1, 4), 3);
        assert_eq!(cell_width_at('\t', 3, 4), 1);
        assert_eq!(cell_width_at('\t', 4, 4), 4);

        assert_eq!(str_width_with_tab_length("\t", 4), 4);
        assert_eq!(str_width_with_tab_length("ab\t", 4), 4);
        assert_eq!(str_width_with_tab_length("abcd\t", 4), 8);
    }

    #[test]
    fn test_leading_whitespace_columns() {
        assert_eq!(leading_whitespace_columns("    x", 2), 4);
        assert_eq!(leading_whitespace_columns(" \tx", 4), 4);
        assert_eq!(leading_whitespace_columns("x  ", 4), 0);
    }

    #[test]
    fn test_exact_fit_does_not_wrap() {
        assert!(soft_wrap_points(&units("1234567890"), 10, 0).is_empty());
    }

    #[test]
    fn test_word_wrap_prefers_whitespace() {
        // "hello " stays on the first row, "world" moves down.
        assert_eq!(soft_wrap_points(&units("hello world"), 7, 0), vec![6]);
    }

    #[test]
    fn test_whitespace_may_hang_past_the_wrap_column() {
        assert_eq!(soft_wrap_points(&units("hello world"), 5, 0), vec![6]);
    }

    #[test]
    fn test_hard_break_without_whitespace() {
        assert_eq!(soft_wrap_points(&units("12345678901"), 10, 0), vec![10]);
    }

    #[test]
    fn test_wide_chars_wrap_intact() {
        // "Hello" takes 5 cells and "你" needs 2 of the 6.
        assert_eq!(soft_wrap_points(&units("Hello你"), 6, 0), vec![5]);
    }

    #[test]
    fn test_continuation_indent_reduces_row_width() {
        assert_eq!(soft_wrap_points(&units("    abcdefgh"), 6, 4), vec![6, 8, 10]);
    }

    #[test]
    fn test_indent_is_capped_below_wrap_column() {
        assert_eq!(soft_wrap_indent_columns("        x", 0, 6, 2), 5);
        assert_eq!(soft_wrap_indent_columns("  x", 2, 80, 2), 4);
        assert_eq!(soft_wrap_indent_columns("  x", 2, 1, 2), 0);
    }
}
