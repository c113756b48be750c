//! Indentation policy shared by every language mode.
//!
//! Suggested indentation is driven by three scope-sensitive Oniguruma patterns read from
//! [`ScopedSettings`]: `increaseIndentPattern` (tested against the preceding row),
//! `decreaseIndentPattern` (tested against the row itself) and `decreaseNextIndentPattern`
//! (tested against the preceding row). Each one is optional; a pattern that fails to compile is
//! treated as absent.
//!
//! The tree-sitter mode has no indentation engine of its own and calls into this module with its
//! root scope descriptor, exactly like the regex mode does with the scopes of a row's first token.

use crate::buffer_text::BufferText;
use crate::config::{
    DECREASE_INDENT_PATTERN, DECREASE_NEXT_INDENT_PATTERN, FOLD_END_PATTERN,
    INCREASE_INDENT_PATTERN, ScopedSettings,
};
use crate::scope::ScopeDescriptor;
use onig::Regex;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

/// Indentation level of `line`, in units of `tab_length`.
///
/// A tab advances to the next tab stop rather than by a fixed amount, so with a tab length of 2
/// `"\t  x"` is at level 2 and `"   x"` at level 1.5.
pub fn indent_level_for_line(line: &str, tab_length: usize) -> f64 {
    let tab_length = tab_length.max(1);
    let mut indent = 0usize;
    for ch in line.chars() {
        match ch {
            '\t' => indent += tab_length - indent % tab_length,
            ' ' => indent += 1,
            _ => break,
        }
    }
    indent as f64 / tab_length as f64
}

/// Cached, scope-aware access to the indentation patterns.
#[derive(Debug)]
pub struct IndentationPolicy {
    settings: Arc<ScopedSettings>,
    regexes: RefCell<HashMap<String, Option<Arc<Regex>>>>,
}

impl IndentationPolicy {
    /// Create a policy reading patterns from `settings`.
    pub fn new(settings: Arc<ScopedSettings>) -> Self {
        Self {
            settings,
            regexes: RefCell::new(HashMap::new()),
        }
    }

    /// The settings the patterns come from.
    pub fn settings(&self) -> &Arc<ScopedSettings> {
        &self.settings
    }

    fn regex_for_pattern(&self, pattern: &str) -> Option<Arc<Regex>> {
        if let Some(cached) = self.regexes.borrow().get(pattern) {
            return cached.clone();
        }
        let compiled = match Regex::new(pattern) {
            Ok(regex) => Some(Arc::new(regex)),
            Err(err) => {
                tracing::warn!(pattern, error = %err, "ignoring malformed indentation pattern");
                None
            }
        };
        self.regexes
            .borrow_mut()
            .insert(pattern.to_string(), compiled.clone());
        compiled
    }

    fn regex_for_key(&self, key: &str, scope: &ScopeDescriptor) -> Option<Arc<Regex>> {
        let pattern = self.settings.get_str(key, scope)?;
        if pattern.is_empty() {
            return None;
        }
        self.regex_for_pattern(&pattern)
    }

    /// The increase-indent regex at `scope`.
    pub fn increase_indent_regex(&self, scope: &ScopeDescriptor) -> Option<Arc<Regex>> {
        self.regex_for_key(INCREASE_INDENT_PATTERN, scope)
    }

    /// The decrease-indent regex at `scope`.
    pub fn decrease_indent_regex(&self, scope: &ScopeDescriptor) -> Option<Arc<Regex>> {
        self.regex_for_key(DECREASE_INDENT_PATTERN, scope)
    }

    /// The decrease-next-indent regex at `scope`.
    pub fn decrease_next_indent_regex(&self, scope: &ScopeDescriptor) -> Option<Arc<Regex>> {
        self.regex_for_key(DECREASE_NEXT_INDENT_PATTERN, scope)
    }

    /// The fold-end regex at `scope`.
    pub fn fold_end_regex(&self, scope: &ScopeDescriptor) -> Option<Arc<Regex>> {
        self.regex_for_key(FOLD_END_PATTERN, scope)
    }

    /// Suggested indentation level for `line` placed at `row`.
    ///
    /// With `skip_blank_lines`, the preceding row is the nearest non-blank row above; otherwise
    /// it is simply `row - 1`. `is_row_commented` reports whether a row is a comment (rows inside
    /// comments never adjust the indentation of what follows).
    #[allow(clippy::too_many_arguments)]
    pub fn suggested_indent_for_line_with_scope(
        &self,
        text: &BufferText,
        row: usize,
        line: &str,
        scope: &ScopeDescriptor,
        tab_length: usize,
        skip_blank_lines: bool,
        is_row_commented: &dyn Fn(usize) -> bool,
    ) -> f64 {
        let increase = self.increase_indent_regex(scope);
        let decrease = self.decrease_indent_regex(scope);
        let decrease_next = self.decrease_next_indent_regex(scope);

        let preceding_row = if skip_blank_lines {
            text.previous_non_blank_row(row)
        } else {
            row.checked_sub(1)
        };
        let Some(preceding_row) = preceding_row else {
            return 0.0;
        };

        let preceding_line = text.line_for_row(preceding_row);
        let mut desired = indent_level_for_line(&preceding_line, tab_length);
        let Some(increase) = increase else {
            return desired;
        };

        if !is_row_commented(preceding_row) {
            if test(&increase, &preceding_line) {
                desired += 1.0;
            }
            if decrease_next.is_some_and(|r| test(&r, &preceding_line)) {
                desired -= 1.0;
            }
        }

        if !text.is_row_blank(preceding_row) && decrease.is_some_and(|r| test(&r, line)) {
            desired -= 1.0;
        }

        desired.max(0.0)
    }

    /// Conservative suggestion for a row the user is typing on.
    ///
    /// Returns `None` unless the row is indented, matches the decrease-indent pattern and has a
    /// non-blank predecessor, and unless the suggestion would actually outdent the row.
    pub fn suggested_indent_for_edited_row(
        &self,
        text: &BufferText,
        row: usize,
        scope: &ScopeDescriptor,
        tab_length: usize,
    ) -> Option<f64> {
        let line = text.line_for_row(row);
        let current = indent_level_for_line(&line, tab_length);
        if current == 0.0 {
            return None;
        }

        let decrease = self.decrease_indent_regex(scope)?;
        if !test(&decrease, &line) {
            return None;
        }

        let preceding_row = text.previous_non_blank_row(row)?;
        let preceding_line = text.line_for_row(preceding_row);
        let mut desired = indent_level_for_line(&preceding_line, tab_length);

        if let Some(increase) = self.increase_indent_regex(scope)
            && !test(&increase, &preceding_line)
        {
            desired -= 1.0;
        }
        if self
            .decrease_next_indent_regex(scope)
            .is_some_and(|r| test(&r, &preceding_line))
        {
            desired -= 1.0;
        }

        if desired < 0.0 {
            return Some(0.0);
        }
        if desired >= current {
            return None;
        }
        Some(desired)
    }
}

/// Unanchored search of `regex` in `text`.
pub fn test(regex: &Regex, text: &str) -> bool {
    regex.find(text).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> IndentationPolicy {
        let mut settings = ScopedSettings::with_defaults();
        settings.set(".source.js", INCREASE_INDENT_PATTERN, r"\{\s*$");
        settings.set(".source.js", DECREASE_INDENT_PATTERN, r"^\s*\}");
        IndentationPolicy::new(Arc::new(settings))
    }

    fn js() -> ScopeDescriptor {
        ScopeDescriptor::from_scopes(["source.js"])
    }

    #[test]
    fn test_indent_levels_follow_tab_stops() {
        assert_eq!(indent_level_for_line("    hello", 4), 1.0);
        assert_eq!(indent_level_for_line("    hello", 2), 2.0);
        assert_eq!(indent_level_for_line("   hello", 2), 1.5);
        assert_eq!(indent_level_for_line("\t  hello", 2), 2.0);
        assert_eq!(indent_level_for_line(" \thello", 4), 1.0);
    }

    #[test]
    fn test_increase_after_open_brace() {
        let text = BufferText::from_text("if (a) {\n\n");
        let p = policy();
        let level =
            p.suggested_indent_for_line_with_scope(&text, 1, "", &js(), 2, true, &|_| false);
        assert_eq!(level, 1.0);
    }

    #[test]
    fn test_decrease_on_closing_brace() {
        let text = BufferText::from_text("  if (a) {\n    b()\n    }");
        let p = policy();
        let level =
            p.suggested_indent_for_line_with_scope(&text, 2, "    }", &js(), 2, true, &|_| false);
        assert_eq!(level, 1.0);
    }

    #[test]
    fn test_commented_preceding_row_does_not_increase() {
        let text = BufferText::from_text("// {\nx");
        let p = policy();
        let level =
            p.suggested_indent_for_line_with_scope(&text, 1, "x", &js(), 2, true, &|row| row == 0);
        assert_eq!(level, 0.0);
    }

    #[test]
    fn test_edited_row_only_outdents() {
        let p = policy();
        let text = BufferText::from_text("  foo() {\n    bar()\n    }");
        assert_eq!(p.suggested_indent_for_edited_row(&text, 2, &js(), 2), Some(1.0));
        // Not matching the decrease pattern: no suggestion.
        assert_eq!(p.suggested_indent_for_edited_row(&text, 1, &js(), 2), None);
        // Already at (or left of) the desired level: no suggestion.
        let text = BufferText::from_text("  foo() {\n  }");
        assert_eq!(p.suggested_indent_for_edited_row(&text, 1, &js(), 2), None);
    }

    #[test]
    fn test_malformed_patterns_are_ignored() {
        let mut settings = ScopedSettings::new();
        settings.set("", INCREASE_INDENT_PATTERN, "(unclosed");
        let p = IndentationPolicy::new(Arc::new(settings));
        let text = BufferText::from_text("  a\nb");
        let level =
            p.suggested_indent_for_line_with_scope(&text, 1, "b", &js(), 2, true, &|_| false);
        assert_eq!(level, 1.0);
    }
}
