//! Scope-sensitive configuration and per-editor settings.
//!
//! [`ScopedSettings`] answers "what is the value of `key` at this scope descriptor", using the
//! most specific matching selector. It is the injected config service consumed by language modes
//! (indent patterns, comment strings, non-word characters).
//!
//! [`EditorSettings`] carries the display options of one editor.

use crate::error::EditorError;
use crate::scope::{ScopeDescriptor, ScopeSelector};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

/// Key of the increase-indent pattern.
pub const INCREASE_INDENT_PATTERN: &str = "editor.increaseIndentPattern";
/// Key of the decrease-indent pattern.
pub const DECREASE_INDENT_PATTERN: &str = "editor.decreaseIndentPattern";
/// Key of the decrease-next-indent pattern.
pub const DECREASE_NEXT_INDENT_PATTERN: &str = "editor.decreaseNextIndentPattern";
/// Key of the fold-end pattern.
pub const FOLD_END_PATTERN: &str = "editor.foldEndPattern";
/// Key of the line comment / block comment opener.
pub const COMMENT_START: &str = "editor.commentStart";
/// Key of the block comment closer.
pub const COMMENT_END: &str = "editor.commentEnd";
/// Key of the non-word character set.
pub const NON_WORD_CHARACTERS: &str = "editor.nonWordCharacters";

/// Characters that break words unless a scope overrides them.
pub const DEFAULT_NON_WORD_CHARACTERS: &str = "/\\()\"':,.;<>~!@#$%^&*|+=[]{}`?-…";

/// A value together with the selector it was registered under.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedValue {
    /// The selector source, as registered.
    pub scope_selector: String,
    /// The value.
    pub value: Value,
}

#[derive(Debug, Clone)]
struct Entry {
    source: String,
    selector: ScopeSelector,
    key: String,
    value: Value,
}

/// Scope-sensitive key/value settings.
#[derive(Debug, Clone, Default)]
pub struct ScopedSettings {
    entries: Vec<Entry>,
}

impl ScopedSettings {
    /// Empty settings (no values, not even defaults).
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings pre-populated with global defaults.
    pub fn with_defaults() -> Self {
        let mut settings = Self::new();
        settings.set("", NON_WORD_CHARACTERS, DEFAULT_NON_WORD_CHARACTERS);
        settings
    }

    /// Parse YAML of the shape `{selector: {nested: {key: value}}}`.
    ///
    /// Nested mappings are flattened with `.`, so `{".source.js": {editor: {commentStart: "// "}}}`
    /// registers `editor.commentStart` under `.source.js`. Use `"*"` for unscoped values.
    pub fn from_yaml(source: &str) -> Result<Self, EditorError> {
        let mut settings = Self::with_defaults();
        settings.merge_yaml(source)?;
        Ok(settings)
    }

    /// Merge YAML (see [`ScopedSettings::from_yaml`]) into these settings.
    pub fn merge_yaml(&mut self, source: &str) -> Result<(), EditorError> {
        let root: Mapping = serde_yaml::from_str(source)?;
        for (selector, body) in root {
            let Value::String(selector) = selector else {
                return Err(EditorError::InvalidSetting {
                    key: format!("{selector:?}"),
                    message: "selectors must be strings".to_string(),
                });
            };
            let selector = if selector == "*" { String::new() } else { selector };
            let mut flat = Vec::new();
            flatten(String::new(), body, &mut flat);
            for (key, value) in flat {
                self.set(&selector, &key, value);
            }
        }
        Ok(())
    }

    /// Register `value` for `key` under `selector`. Later registrations win ties.
    pub fn set(&mut self, selector: &str, key: &str, value: impl Into<Value>) {
        self.entries.push(Entry {
            source: selector.to_string(),
            selector: ScopeSelector::parse(selector),
            key: key.to_string(),
            value: value.into(),
        });
    }

    /// All values of `key` matching `scope`, most specific first.
    pub fn get_all(&self, key: &str, scope: &ScopeDescriptor) -> Vec<ScopedValue> {
        let mut matching: Vec<(usize, usize, &Entry)> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.key == key && e.selector.matches(scope))
            .map(|(i, e)| (e.selector.specificity(), i, e))
            .collect();
        matching.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
        matching
            .into_iter()
            .map(|(_, _, e)| ScopedValue {
                scope_selector: e.source.clone(),
                value: e.value.clone(),
            })
            .collect()
    }

    /// The most specific value of `key` at `scope`.
    pub fn get(&self, key: &str, scope: &ScopeDescriptor) -> Option<Value> {
        self.get_all(key, scope).into_iter().next().map(|v| v.value)
    }

    /// The most specific string value of `key` at `scope`.
    pub fn get_str(&self, key: &str, scope: &ScopeDescriptor) -> Option<String> {
        match self.get(key, scope)? {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

fn flatten(prefix: String, value: Value, out: &mut Vec<(String, Value)>) {
    match value {
        Value::Mapping(map) => {
            for (k, v) in map {
                let Value::String(k) = k else {
                    continue;
                };
                let key = if prefix.is_empty() {
                    k
                } else {
                    format!("{prefix}.{k}")
                };
                flatten(key, v, out);
            }
        }
        other => out.push((prefix, other)),
    }
}

/// Replacement glyphs drawn for invisible characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvisibleGlyphs {
    /// Drawn at the end of each row.
    pub eol: Option<char>,
    /// Drawn for leading and trailing spaces.
    pub space: Option<char>,
    /// Drawn at the start of each hard tab.
    pub tab: Option<char>,
    /// Drawn before the end-of-line glyph on CRLF rows.
    pub cr: Option<char>,
}

impl Default for InvisibleGlyphs {
    fn default() -> Self {
        Self {
            eol: Some('¬'),
            space: Some('·'),
            tab: Some('»'),
            cr: Some('¤'),
        }
    }
}

/// Display options of one editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorSettings {
    /// Width of a tab stop in columns.
    pub tab_length: usize,
    /// Whether indentation is written with spaces.
    pub soft_tabs: bool,
    /// Whether long rows wrap.
    pub soft_wrap: bool,
    /// Column at which rows wrap.
    pub soft_wrap_column: usize,
    /// Extra indentation of wrapped continuation rows.
    pub soft_wrap_hanging_indent: usize,
    /// Whether invisible characters are drawn.
    pub show_invisibles: bool,
    /// Glyphs used when `show_invisibles` is on.
    pub invisibles: InvisibleGlyphs,
    /// Whether leading soft tabs behave as single units.
    pub atomic_soft_tabs: bool,
    /// Whether mutations are rejected.
    pub read_only: bool,
    /// Whether new rows are auto-indented.
    pub auto_indent: bool,
    /// Buffers at least this many bytes long are not tokenized.
    pub large_file_threshold: usize,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            tab_length: 2,
            soft_tabs: true,
            soft_wrap: false,
            soft_wrap_column: 80,
            soft_wrap_hanging_indent: 0,
            show_invisibles: false,
            invisibles: InvisibleGlyphs::default(),
            atomic_soft_tabs: true,
            read_only: false,
            auto_indent: true,
            large_file_threshold: 2 * 1024 * 1024,
        }
    }
}

impl EditorSettings {
    /// Parse settings from YAML; missing fields take their defaults.
    pub fn from_yaml(source: &str) -> Result<Self, EditorError> {
        let settings: Self = serde_yaml::from_str(source)?;
        if settings.tab_length == 0 {
            return Err(EditorError::InvalidSetting {
                key: "tab_length".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(settings)
    }
}
