//! Indentation and comment based folding.
//!
//! A run of commented rows folds from its first row to its last. Any other non-blank row folds
//! over the following rows that are indented deeper; a row at the same indentation that matches
//! `editor.foldEndPattern` is included as the fold's last row.

use super::TextMateLanguageMode;
use crate::grammar::Grammar;
use editor_display::{
    BufferText, INFINITY, LanguageMode, Point, Range, indent::test, indent_level_for_line,
};

pub(super) fn end_row_for_fold_at_row<G: Grammar + 'static>(
    mode: &TextMateLanguageMode<G>,
    text: &BufferText,
    row: usize,
    tab_length: usize,
    existence_only: bool,
) -> Option<usize> {
    if mode.is_row_commented(text, row) {
        end_row_for_comment_fold_at_row(mode, text, row, existence_only)
    } else {
        end_row_for_code_fold_at_row(mode, text, row, tab_length, existence_only)
    }
}

fn end_row_for_comment_fold_at_row<G: Grammar + 'static>(
    mode: &TextMateLanguageMode<G>,
    text: &BufferText,
    row: usize,
    existence_only: bool,
) -> Option<usize> {
    if row > 0 && mode.is_row_commented(text, row - 1) {
        return None;
    }

    let mut end_row = None;
    for next_row in row + 1..text.line_count() {
        if !mode.is_row_commented(text, next_row) {
            break;
        }
        end_row = Some(next_row);
        if existence_only {
            break;
        }
    }
    end_row
}

fn end_row_for_code_fold_at_row<G: Grammar + 'static>(
    mode: &TextMateLanguageMode<G>,
    text: &BufferText,
    row: usize,
    tab_length: usize,
    existence_only: bool,
) -> Option<usize> {
    let line = text.line_for_row(row);
    if !has_non_whitespace(&line) {
        return None;
    }
    let start_indent_level = indent_level_for_line(&line, tab_length);
    let scope = mode.scope_descriptor_for_position(text, Point::new(row, 0));
    let fold_end_regex = mode.indentation.fold_end_regex(&scope);

    let mut fold_end_row = None;
    for next_row in row + 1..text.line_count() {
        let line = text.line_for_row(next_row);
        if !has_non_whitespace(&line) {
            continue;
        }
        let indentation = indent_level_for_line(&line, tab_length);
        if indentation < start_indent_level {
            break;
        }
        if indentation == start_indent_level {
            if fold_end_regex.as_ref().is_some_and(|r| test(r, &line)) {
                fold_end_row = Some(next_row);
            }
            break;
        }
        fold_end_row = Some(next_row);
        if existence_only {
            break;
        }
    }
    fold_end_row
}

pub(super) fn foldable_range_containing_point<G: Grammar + 'static>(
    mode: &TextMateLanguageMode<G>,
    text: &BufferText,
    point: Point,
    tab_length: usize,
) -> Option<Range> {
    if point.row > text.last_row() {
        return None;
    }
    if point.column >= text.line_length_for_row(point.row)
        && let Some(end_row) = end_row_for_fold_at_row(mode, text, point.row, tab_length, false)
    {
        return Some(fold_range(point.row, end_row));
    }

    (0..point.row).rev().find_map(|row| {
        end_row_for_fold_at_row(mode, text, row, tab_length, false)
            .filter(|end_row| *end_row >= point.row)
            .map(|end_row| fold_range(row, end_row))
    })
}

pub(super) fn foldable_ranges<G: Grammar + 'static>(
    mode: &TextMateLanguageMode<G>,
    text: &BufferText,
    tab_length: usize,
) -> Vec<Range> {
    (0..text.line_count())
        .filter_map(|row| {
            end_row_for_fold_at_row(mode, text, row, tab_length, false)
                .map(|end_row| fold_range(row, end_row))
        })
        .collect()
}

pub(super) fn foldable_ranges_at_indent_level<G: Grammar + 'static>(
    mode: &TextMateLanguageMode<G>,
    text: &BufferText,
    level: usize,
    tab_length: usize,
) -> Vec<Range> {
    let mut result = Vec::new();
    let line_count = text.line_count();
    let mut row = 0;
    while row < line_count {
        if indent_level_for_line(&text.line_for_row(row), tab_length) == level as f64
            && let Some(end_row) = end_row_for_fold_at_row(mode, text, row, tab_length, false)
        {
            result.push(fold_range(row, end_row));
            row = end_row + 1;
            continue;
        }
        row += 1;
    }
    result
}

fn fold_range(start_row: usize, end_row: usize) -> Range {
    Range::new((start_row, INFINITY), (end_row, INFINITY))
}

fn has_non_whitespace(line: &str) -> bool {
    line.chars().any(|c| !c.is_whitespace())
}
