//! Word, subword and paragraph boundaries.
//!
//! Boundaries are found by scanning buffer ranges with Oniguruma patterns built from the
//! non-word characters of the current scope. `^` and `$` are line anchors, and they only match at
//! a scan range's edges when those edges are real line boundaries.

use crate::buffer_text::BufferText;
use crate::point::{Point, Range};
use onig::{Regex, Region, SearchOptions};

/// Separates paragraphs: a line holding nothing but spaces and tabs.
const EMPTY_LINE_PATTERN: &str = r"(\r\n[\t ]*\r\n)|(\n[\t ]*\n)";

fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(regex) => Some(regex),
        Err(err) => {
            tracing::warn!(pattern, error = %err, "failed to compile word pattern");
            None
        }
    }
}

fn escape_class(chars: &str) -> String {
    let mut out = String::with_capacity(chars.len() * 2);
    for ch in chars.chars() {
        if ch.is_ascii_punctuation() {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// The word pattern for `non_word_characters`.
///
/// Words are runs of characters that are neither whitespace nor non-word characters, and blank
/// lines. With `include_non_word_characters`, runs of non-word characters count as words too.
pub fn word_regex(non_word_characters: &str, include_non_word_characters: bool) -> Option<Regex> {
    let escaped = escape_class(non_word_characters);
    let mut pattern = format!(r"^[\t ]*$|[^\s{escaped}]+");
    if include_non_word_characters && !escaped.is_empty() {
        pattern.push_str(&format!("|[{escaped}]+"));
    }
    compile(&pattern)
}

/// The camelCase / snake_case aware subword pattern.
///
/// `backwards` attaches trailing underscores and whitespace to the segment before them rather
/// than to the one after.
pub fn subword_regex(non_word_characters: &str, backwards: bool) -> Option<Regex> {
    let escaped = escape_class(non_word_characters);
    let segment = r"\p{Lu}?\p{Ll}+";
    let mut segments = vec![
        r"^[\t ]+".to_string(),
        r"[\t ]+$".to_string(),
        r"\p{Lu}+(?!\p{Ll})".to_string(),
        r"\d+".to_string(),
    ];
    if backwards {
        segments.push(format!("{segment}_*"));
        if !escaped.is_empty() {
            segments.push(format!(r"[{escaped}]+\s*"));
        }
    } else {
        segments.push(format!("_*{segment}"));
        if !escaped.is_empty() {
            segments.push(format!(r"\s*[{escaped}]+"));
        }
    }
    segments.push("_+".to_string());
    compile(&segments.join("|"))
}

fn blank_run_regex() -> Option<Regex> {
    compile(r"[\t ]*")
}

fn is_empty_line_regex() -> Option<Regex> {
    compile(EMPTY_LINE_PATTERN)
}

/// Every match of `regex` inside `range`, in document order.
pub fn scan_in_range(text: &BufferText, regex: &Regex, range: Range) -> Vec<Range> {
    let range = text.clip_range(range);
    let haystack = text.text_in_range(range);
    let mut options = SearchOptions::SEARCH_OPTION_NONE;
    if range.start.column > 0 {
        options |= SearchOptions::SEARCH_OPTION_NOTBOL;
    }
    if range.end.column < text.line_length_for_row(range.end.row) {
        options |= SearchOptions::SEARCH_OPTION_NOTEOL;
    }
    scan_haystack(text, regex, &haystack, range.start, options)
}

fn scan_haystack(
    text: &BufferText,
    regex: &Regex,
    haystack: &str,
    origin: Point,
    options: SearchOptions,
) -> Vec<Range> {
    let mut matches = Vec::new();
    let mut region = Region::new();
    let base = text.character_index_for_position(origin);
    let mut from = 0usize;
    // Matches arrive in order, so char offsets are counted incrementally.
    let mut last_byte = 0usize;
    let mut last_char = 0usize;
    let mut char_offset = |byte: usize| {
        last_char += haystack[last_byte..byte].chars().count();
        last_byte = byte;
        last_char
    };

    while from <= haystack.len() {
        if regex
            .search_with_options(haystack, from, haystack.len(), options, Some(&mut region))
            .is_none()
        {
            break;
        }
        let Some((start, end)) = region.pos(0) else {
            break;
        };
        let start_point = text.position_for_character_index(base + char_offset(start));
        let end_point = text.position_for_character_index(base + char_offset(end));
        matches.push(Range::new(start_point, end_point));
        from = if end > start {
            end
        } else {
            match haystack[end..].chars().next() {
                Some(ch) => end + ch.len_utf8(),
                None => break,
            }
        };
    }
    matches
}

/// The position a "move to previous word boundary" lands on.
pub fn previous_word_boundary(text: &BufferText, position: Point, regex: &Regex) -> Point {
    let start_row = text.previous_non_blank_row(position.row).unwrap_or(0);
    let scan = Range::new(Point::new(start_row, 0), position);
    let Some(last) = scan_in_range(text, regex, scan).pop() else {
        return position;
    };
    if last.start.row < position.row && position.column > 0 {
        Point::new(position.row, 0)
    } else if position > last.end {
        last.end
    } else {
        last.start
    }
}

/// The position a "move to next word boundary" lands on.
pub fn next_word_boundary(text: &BufferText, position: Point, regex: &Regex) -> Point {
    let scan = Range::new(position, text.end_position());
    let Some(first) = scan_in_range(text, regex, scan).into_iter().next() else {
        return position;
    };
    if first.start.row > position.row {
        Point::new(first.start.row, 0)
    } else if position < first.start {
        first.start
    } else {
        first.end
    }
}

/// Start of the word containing or preceding `position`.
///
/// With `allow_previous`, the search may reach back to the previous row.
pub fn beginning_of_current_word(text: &BufferText, position: Point, regex: &Regex, allow_previous: bool) -> Point {
    let scan_start = if allow_previous {
        Point::new(position.row.saturating_sub(1), 0)
    } else {
        Point::new(position.row, 0)
    };
    let mut result = None;
    for range in scan_in_range(text, regex, Range::new(scan_start, position)) {
        if position <= range.start {
            break;
        }
        if allow_previous || position <= range.end {
            result = Some(range.start);
        }
    }
    result.unwrap_or(if allow_previous { Point::zero() } else { position })
}

/// End of the word containing or following `position`.
///
/// With `allow_next`, the search may continue onto the next row.
pub fn end_of_current_word(text: &BufferText, position: Point, regex: &Regex, allow_next: bool) -> Point {
    let scan_end = if allow_next {
        Point::new(position.row + 2, 0)
    } else {
        Point::end_of_row(position.row)
    };
    for range in scan_in_range(text, regex, Range::new(position, scan_end)) {
        if position < range.start && !allow_next {
            break;
        }
        if position < range.end {
            return range.end;
        }
    }
    if allow_next { text.end_position() } else { position }
}

/// Returns true if a word starts exactly at `position` (the rest of the row is searched as
/// a standalone string).
pub fn is_inside_word(text: &BufferText, position: Point, regex: &Regex) -> bool {
    let rest = text.text_in_range(Range::new(position, Point::end_of_row(position.row)));
    let mut region = Region::new();
    regex
        .search_with_options(&rest, 0, rest.len(), SearchOptions::SEARCH_OPTION_NONE, Some(&mut region))
        .is_some_and(|start| start == 0)
}

/// Start of the word after the one containing `position`.
pub fn beginning_of_next_word(text: &BufferText, position: Point, regex: &Regex) -> Point {
    let start = if is_inside_word(text, position, regex) {
        end_of_current_word(text, position, regex, true)
    } else {
        position
    };
    scan_in_range(text, regex, Range::new(start, text.end_position()))
        .into_iter()
        .next()
        .map_or(position, |range| range.start)
}

/// The word on `position`'s row that touches `position`, or an empty range.
pub fn current_word_range(text: &BufferText, position: Point, regex: &Regex) -> Range {
    let row = Range::new(Point::new(position.row, 0), Point::end_of_row(position.row));
    scan_in_range(text, regex, row)
        .into_iter()
        .find(|range| range.end.column >= position.column && range.start.column <= position.column)
        .unwrap_or_else(|| Range::empty_at(position))
}

/// The range a double click at `position` selects.
pub fn word_range_for_selection(text: &BufferText, position: Point, non_word_characters: &str) -> Range {
    let regex = if is_surrounded_by_whitespace(text, position) {
        blank_run_regex()
    } else {
        let include_non_word = !is_between_word_and_non_word(text, position, non_word_characters);
        word_regex(non_word_characters, include_non_word)
    };
    match regex {
        Some(regex) => current_word_range(text, position, &regex),
        None => Range::empty_at(position),
    }
}

fn chars_around(text: &BufferText, position: Point) -> String {
    text.text_in_range(Range::new(
        Point::new(position.row, position.column.saturating_sub(1)),
        Point::new(position.row, position.column + 1),
    ))
}

/// Returns true if the chars on both sides of `position` are whitespace.
pub fn is_surrounded_by_whitespace(text: &BufferText, position: Point) -> bool {
    let around = chars_around(text, position);
    !around.is_empty() && around.chars().all(char::is_whitespace)
}

/// Returns true if `position` sits between a word char and a non-word char.
pub fn is_between_word_and_non_word(text: &BufferText, position: Point, non_word_characters: &str) -> bool {
    let line_length = text.line_length_for_row(position.row);
    if position.column == 0 || position.column >= line_length {
        return false;
    }
    let around: Vec<char> = chars_around(text, position).chars().collect();
    let [before, after] = around[..] else {
        return false;
    };
    if before.is_whitespace() || after.is_whitespace() {
        return false;
    }
    non_word_characters.contains(before) != non_word_characters.contains(after)
}

/// Start of the paragraph after the one containing `position`.
pub fn beginning_of_next_paragraph(text: &BufferText, position: Point) -> Point {
    let eof = text.end_position();
    let mut result = Point::new(eof.row, eof.column.saturating_sub(1));
    let Some(regex) = is_empty_line_regex() else {
        return result;
    };
    for range in scan_in_range(text, &regex, Range::new(position, eof)) {
        result = Point::new(range.start.row + 1, 0);
        if result != position {
            break;
        }
    }
    result
}

/// Start of the paragraph before the one containing `position`.
pub fn beginning_of_previous_paragraph(text: &BufferText, position: Point) -> Point {
    let mut result = Point::zero();
    if position.row == 0 {
        return result;
    }
    let Some(regex) = is_empty_line_regex() else {
        return result;
    };
    let scan = Range::new(Point::zero(), Point::new(position.row - 1, position.column));
    for range in scan_in_range(text, &regex, scan).into_iter().rev() {
        result = Point::new(range.start.row + 1, 0);
        if result != position {
            break;
        }
    }
    result
}

/// Rows of the paragraph around `row`: neighbouring non-blank rows that agree with `row` on
/// being commented. `None` if `row` is blank.
pub fn paragraph_range_for_row(
    text: &BufferText,
    row: usize,
    is_row_commented: &dyn Fn(usize) -> bool,
) -> Option<Range> {
    if text.is_row_blank(row) {
        return None;
    }
    let commented = is_row_commented(row);
    let mut start_row = row;
    while start_row > 0 && !text.is_row_blank(start_row - 1) && is_row_commented(start_row - 1) == commented {
        start_row -= 1;
    }
    let mut end_row = row;
    while end_row + 1 < text.line_count()
        && !text.is_row_blank(end_row + 1)
        && is_row_commented(end_row + 1) == commented
    {
        end_row += 1;
    }
    Some(Range::new(
        Point::new(start_row, 0),
        Point::new(end_row, text.line_length_for_row(end_row)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_NON_WORD_CHARACTERS;

    fn words() -> Regex {
        word_regex(DEFAULT_NON_WORD_CHARACTERS, true).unwrap()
    }

    #[test]
    fn test_scan_respects_line_anchors_at_range_edges() {
        let text = BufferText::from_text("   foo");
        let regex = words();
        // The blank-line alternative must not match a truncated row.
        assert!(scan_in_range(&text, &regex, Range::new((0, 0), (0, 3))).is_empty());
        let blank = BufferText::from_text("a\n  \nb");
        assert_eq!(
            scan_in_range(&blank, &regex, Range::new((1, 0), (1, 2))),
            vec![Range::new((1, 0), (1, 2))]
        );
    }

    #[test]
    fn test_word_boundaries() {
        let text = BufferText::from_text("foo.bar baz");
        let regex = words();
        assert_eq!(next_word_boundary(&text, Point::new(0, 0), &regex), Point::new(0, 3));
        assert_eq!(next_word_boundary(&text, Point::new(0, 3), &regex), Point::new(0, 4));
        assert_eq!(next_word_boundary(&text, Point::new(0, 7), &regex), Point::new(0, 8));
        assert_eq!(previous_word_boundary(&text, Point::new(0, 11), &regex), Point::new(0, 8));
        assert_eq!(previous_word_boundary(&text, Point::new(0, 8), &regex), Point::new(0, 7));
        assert_eq!(previous_word_boundary(&text, Point::new(0, 0), &regex), Point::new(0, 0));
    }

    #[test]
    fn test_beginning_and_end_of_word() {
        let text = BufferText::from_text("first second\nthird");
        let regex = words();
        assert_eq!(beginning_of_current_word(&text, Point::new(0, 9), &regex, true), Point::new(0, 6));
        assert_eq!(beginning_of_current_word(&text, Point::new(1, 0), &regex, true), Point::new(0, 6));
        assert_eq!(beginning_of_current_word(&text, Point::new(0, 0), &regex, true), Point::new(0, 0));
        assert_eq!(end_of_current_word(&text, Point::new(0, 2), &regex, true), Point::new(0, 5));
        assert_eq!(end_of_current_word(&text, Point::new(0, 12), &regex, true), Point::new(1, 5));
        assert_eq!(beginning_of_next_word(&text, Point::new(0, 2), &regex), Point::new(0, 6));
        assert_eq!(beginning_of_next_word(&text, Point::new(1, 2), &regex), Point::new(1, 2));
    }

    #[test]
    fn test_subword_boundaries() {
        let text = BufferText::from_text("getHTTPResponse_code42");
        let forward = subword_regex(DEFAULT_NON_WORD_CHARACTERS, false).unwrap();
        let mut position = Point::new(0, 0);
        let mut stops = Vec::new();
        loop {
            let next = next_word_boundary(&text, position, &forward);
            if next == position {
                break;
            }
            stops.push(next.column);
            position = next;
        }
        assert_eq!(stops, vec![3, 7, 15, 20, 22]);

        let backward = subword_regex(DEFAULT_NON_WORD_CHARACTERS, true).unwrap();
        assert_eq!(previous_word_boundary(&text, Point::new(0, 15), &backward), Point::new(0, 7));
    }

    #[test]
    fn test_subwords_use_unicode_case() {
        let text = BufferText::from_text("ÉtéÀVenir");
        let forward = subword_regex("", false).unwrap();
        assert_eq!(next_word_boundary(&text, Point::new(0, 0), &forward), Point::new(0, 3));
        assert_eq!(next_word_boundary(&text, Point::new(0, 3), &forward), Point::new(0, 4));
    }

    #[test]
    fn test_select_word_variants() {
        let text = BufferText::from_text("foo   bar.baz");
        let nw = DEFAULT_NON_WORD_CHARACTERS;
        assert_eq!(word_range_for_selection(&text, Point::new(0, 1), nw), Range::new((0, 0), (0, 3)));
        assert_eq!(word_range_for_selection(&text, Point::new(0, 4), nw), Range::new((0, 3), (0, 6)));
        // Between "bar" and ".", the punctuation run is not a candidate.
        assert_eq!(word_range_for_selection(&text, Point::new(0, 9), nw), Range::new((0, 6), (0, 9)));
    }

    #[test]
    fn test_paragraphs() {
        // Paragraph moves land on the separating blank row.
        let text = BufferText::from_text("a\nb\n\nc\nd\n  \ne");
        assert_eq!(beginning_of_next_paragraph(&text, Point::new(0, 0)), Point::new(2, 0));
        assert_eq!(beginning_of_next_paragraph(&text, Point::new(2, 0)), Point::new(5, 0));
        assert_eq!(beginning_of_next_paragraph(&text, Point::new(5, 0)), Point::new(6, 0));
        assert_eq!(beginning_of_previous_paragraph(&text, Point::new(5, 0)), Point::new(2, 0));
        assert_eq!(beginning_of_previous_paragraph(&text, Point::new(3, 0)), Point::new(0, 0));
    }

    #[test]
    fn test_paragraph_range_stops_at_comment_transitions() {
        let text = BufferText::from_text("// a\n// b\ncode\nmore\n\nx");
        let commented = |row: usize| row < 2;
        assert_eq!(
            paragraph_range_for_row(&text, 3, &commented),
            Some(Range::new((2, 0), (3, 4)))
        );
        assert_eq!(
            paragraph_range_for_row(&text, 0, &commented),
            Some(Range::new((0, 0), (1, 4)))
        );
        assert_eq!(paragraph_range_for_row(&text, 4, &commented), None);
    }
}
