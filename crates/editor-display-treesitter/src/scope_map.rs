//! Maps syntax-tree node paths to scope names.
//!
//! Selectors are written the way grammar authors think about the tree:
//!
//! - `identifier` matches named nodes of that type;
//! - `"if"` matches anonymous nodes (keywords, punctuation) by their literal text;
//! - `*` matches any node;
//! - `call_expression > identifier` requires a direct parent of the given type;
//! - `arguments > identifier:nth-child(0)` additionally pins the child index (zero-based).
//!
//! Several selectors may share one rule when separated by commas. A rule is either a scope name
//! or a leaf rule that inspects the node's text (`exact` or `match`); a list of rules is tried in
//! order and the first one producing a scope wins.
//!
//! Lookup walks from the innermost node outwards. The most specific selector that matches the
//! node's ancestry wins: a rule attached to `a > b` overrides one attached to `b` alone.

use crate::error::TreeSitterError;
use regex::Regex;
use std::collections::HashMap;

/// A scope rule as written by the grammar author.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeRule {
    /// Always this scope.
    Scope(String),
    /// `rule` applies only when the node's text equals `text`.
    Exact {
        /// Text the node must have.
        text: String,
        /// Rule applied on a match.
        rule: Box<ScopeRule>,
    },
    /// `rule` applies only when `pattern` finds a match in the node's text.
    Match {
        /// Regular expression tested against the node text.
        pattern: String,
        /// Rule applied on a match.
        rule: Box<ScopeRule>,
    },
    /// The first alternative that yields a scope.
    First(Vec<ScopeRule>),
}

impl ScopeRule {
    /// A plain scope name.
    pub fn scope(name: impl Into<String>) -> Self {
        Self::Scope(name.into())
    }

    /// Applies `rule` when the node text is exactly `text`.
    pub fn exact(text: impl Into<String>, rule: impl Into<ScopeRule>) -> Self {
        Self::Exact {
            text: text.into(),
            rule: Box::new(rule.into()),
        }
    }

    /// Applies `rule` when `pattern` matches the node text.
    pub fn matching(pattern: impl Into<String>, rule: impl Into<ScopeRule>) -> Self {
        Self::Match {
            pattern: pattern.into(),
            rule: Box::new(rule.into()),
        }
    }

    /// Tries `rules` in order.
    pub fn first<I, R>(rules: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<ScopeRule>,
    {
        Self::First(rules.into_iter().map(Into::into).collect())
    }
}

impl From<&str> for ScopeRule {
    fn from(name: &str) -> Self {
        Self::Scope(name.to_string())
    }
}

impl From<String> for ScopeRule {
    fn from(name: String) -> Self {
        Self::Scope(name)
    }
}

#[derive(Debug, Clone)]
pub(crate) enum LeafRule {
    Scope(String),
    Exact(String, Box<LeafRule>),
    Match(Regex, Box<LeafRule>),
    First(Vec<LeafRule>),
}

impl LeafRule {
    fn compile(rule: &ScopeRule) -> Result<Self, TreeSitterError> {
        Ok(match rule {
            ScopeRule::Scope(name) => Self::Scope(name.clone()),
            ScopeRule::Exact { text, rule } => Self::Exact(text.clone(), Box::new(Self::compile(rule)?)),
            ScopeRule::Match { pattern, rule } => {
                let regex = Regex::new(pattern).map_err(|source| TreeSitterError::LeafPattern {
                    pattern: pattern.clone(),
                    source,
                })?;
                Self::Match(regex, Box::new(Self::compile(rule)?))
            }
            ScopeRule::First(rules) => Self::First(
                rules
                    .iter()
                    .map(Self::compile)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
        })
    }

    /// Resolve to a scope name. `load` produces the node text; it runs at most once.
    pub(crate) fn resolve<'r>(&'r self, load: &dyn Fn() -> String, cache: &mut Option<String>) -> Option<&'r str> {
        match self {
            Self::Scope(name) => Some(name.as_str()),
            Self::Exact(text, rule) => {
                let node_text = cache.get_or_insert_with(load);
                if node_text == text {
                    rule.resolve(load, cache)
                } else {
                    None
                }
            }
            Self::Match(regex, rule) => {
                let node_text = cache.get_or_insert_with(load);
                if regex.is_match(node_text) {
                    rule.resolve(load, cache)
                } else {
                    None
                }
            }
            Self::First(rules) => rules.iter().find_map(|rule| rule.resolve(load, cache)),
        }
    }

    fn collect_scope_names<'r>(&'r self, out: &mut Vec<&'r str>) {
        match self {
            Self::Scope(name) => out.push(name),
            Self::Exact(_, rule) | Self::Match(_, rule) => rule.collect_scope_names(out),
            Self::First(rules) => rules.iter().for_each(|rule| rule.collect_scope_names(out)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum StepName {
    Named(String),
    Anonymous(String),
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    name: StepName,
    nth_child: Option<usize>,
}

#[derive(Debug, Clone, Default)]
struct ScopeTable {
    parents: HashMap<String, ScopeTable>,
    indices: HashMap<usize, ScopeTable>,
    result: Option<LeafRule>,
}

const ANY: &str = "*";

/// Scope lookup table keyed by node ancestry.
#[derive(Debug, Clone, Default)]
pub struct ScopeMap {
    named: HashMap<String, ScopeTable>,
    anonymous: HashMap<String, ScopeTable>,
}

impl ScopeMap {
    /// An empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `rule` to every alternative of `selector`.
    pub fn add_selector(&mut self, selector: &str, rule: &ScopeRule) -> Result<(), TreeSitterError> {
        let compiled = LeafRule::compile(rule)?;
        let alternatives = parse_selector(selector).map_err(|message| TreeSitterError::Selector {
            selector: selector.to_string(),
            message,
        })?;

        for steps in alternatives {
            let mut steps = steps.iter().rev();
            let Some(leaf) = steps.next() else {
                continue;
            };
            let top = match &leaf.name {
                StepName::Named(name) => self.named.entry(name.clone()),
                StepName::Anonymous(text) => self.anonymous.entry(text.clone()),
                StepName::Any => self.named.entry(ANY.to_string()),
            };
            let mut table = top.or_default();
            if let Some(index) = leaf.nth_child {
                table = table.indices.entry(index).or_default();
            }
            for step in steps {
                let key = match &step.name {
                    StepName::Named(name) | StepName::Anonymous(name) => name.clone(),
                    StepName::Any => ANY.to_string(),
                };
                table = table.parents.entry(key).or_default();
                if let Some(index) = step.nth_child {
                    table = table.indices.entry(index).or_default();
                }
            }
            table.result = Some(compiled.clone());
        }
        Ok(())
    }

    /// The rule for the innermost node of `node_types`.
    ///
    /// `node_types` and `child_indices` list the ancestry from the root (index 0) to the node
    /// itself; the root has no child index.
    pub(crate) fn get(
        &self,
        node_types: &[&str],
        child_indices: &[Option<usize>],
        leaf_is_named: bool,
    ) -> Option<&LeafRule> {
        let mut i = node_types.len().checked_sub(1)?;
        let top = if leaf_is_named {
            self.named.get(node_types[i])
        } else {
            self.anonymous.get(node_types[i])
        };
        let mut current = top.or_else(|| self.named.get(ANY));
        let mut result = None;

        while let Some(table) = current {
            let table = match child_indices.get(i).copied().flatten() {
                Some(index) => table.indices.get(&index).unwrap_or(table),
                None => table,
            };
            if table.result.is_some() {
                result = table.result.as_ref();
            }
            if i == 0 {
                break;
            }
            i -= 1;
            current = table
                .parents
                .get(node_types[i])
                .or_else(|| table.parents.get(ANY));
        }
        result
    }

    /// Resolve the scope name for a node, reading its text through `node_text` when a leaf rule
    /// needs it.
    pub fn scope_for(
        &self,
        node_types: &[&str],
        child_indices: &[Option<usize>],
        leaf_is_named: bool,
        node_text: &dyn Fn() -> String,
    ) -> Option<&str> {
        let rule = self.get(node_types, child_indices, leaf_is_named)?;
        rule.resolve(node_text, &mut None)
    }

    /// Every scope name any rule can produce.
    pub fn scope_names(&self) -> Vec<&str> {
        fn walk<'r>(table: &'r ScopeTable, out: &mut Vec<&'r str>) {
            if let Some(rule) = &table.result {
                rule.collect_scope_names(out);
            }
            table.parents.values().for_each(|t| walk(t, out));
            table.indices.values().for_each(|t| walk(t, out));
        }
        let mut out = Vec::new();
        self.named
            .values()
            .chain(self.anonymous.values())
            .for_each(|t| walk(t, &mut out));
        out.sort_unstable();
        out.dedup();
        out
    }
}

fn parse_selector(source: &str) -> Result<Vec<Vec<Step>>, String> {
    let chars: Vec<char> = source.chars().collect();
    let mut pos = 0usize;
    let mut alternatives = Vec::new();
    let mut steps = Vec::new();

    loop {
        skip_whitespace(&chars, &mut pos);
        steps.push(parse_step(&chars, &mut pos)?);
        let had_space = skip_whitespace(&chars, &mut pos);
        match chars.get(pos) {
            None => {
                alternatives.push(std::mem::take(&mut steps));
                break;
            }
            Some('>') => pos += 1,
            Some(',') => {
                pos += 1;
                alternatives.push(std::mem::take(&mut steps));
            }
            Some(_) if had_space => return Err("descendant selectors are not supported".to_string()),
            Some(c) => return Err(format!("unexpected '{c}'")),
        }
    }
    Ok(alternatives)
}

fn skip_whitespace(chars: &[char], pos: &mut usize) -> bool {
    let start = *pos;
    while chars.get(*pos).is_some_and(|c| c.is_whitespace()) {
        *pos += 1;
    }
    *pos > start
}

fn parse_step(chars: &[char], pos: &mut usize) -> Result<Step, String> {
    let name = match chars.get(*pos) {
        Some('"') => {
            *pos += 1;
            let mut literal = String::new();
            loop {
                match chars.get(*pos) {
                    None => return Err("unterminated string".to_string()),
                    Some('"') => {
                        *pos += 1;
                        break;
                    }
                    Some('\\') => {
                        let escaped = chars.get(*pos + 1).ok_or("unterminated string")?;
                        literal.push(*escaped);
                        *pos += 2;
                    }
                    Some(c) => {
                        literal.push(*c);
                        *pos += 1;
                    }
                }
            }
            StepName::Anonymous(literal)
        }
        Some('*') => {
            *pos += 1;
            StepName::Any
        }
        _ => {
            let start = *pos;
            while chars.get(*pos).is_some_and(|c| c.is_alphanumeric() || *c == '_') {
                *pos += 1;
            }
            if *pos == start {
                return Err("expected a node type".to_string());
            }
            StepName::Named(chars[start..*pos].iter().collect())
        }
    };

    let mut nth_child = None;
    if chars.get(*pos) == Some(&':') {
        const PSEUDO: &str = "nth-child(";
        let rest: String = chars[*pos + 1..].iter().take(PSEUDO.len()).collect();
        if rest != PSEUDO {
            return Err("only :nth-child(n) is supported".to_string());
        }
        *pos += 1 + PSEUDO.len();
        let start = *pos;
        while chars.get(*pos).is_some_and(char::is_ascii_digit) {
            *pos += 1;
        }
        let digits: String = chars[start..*pos].iter().collect();
        let index = digits
            .parse::<usize>()
            .map_err(|_| "expected a child index".to_string())?;
        if chars.get(*pos) != Some(&')') {
            return Err("expected ')'".to_string());
        }
        *pos += 1;
        nth_child = Some(index);
    }
    Ok(Step { name, nth_child })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(map: &ScopeMap, types: &[&str], indices: &[Option<usize>], named: bool, text: &str) -> Option<String> {
        let text = text.to_string();
        map.scope_for(types, indices, named, &|| text.clone())
            .map(str::to_string)
    }

    #[test]
    fn test_parent_chains_override_plain_types() {
        let mut map = ScopeMap::new();
        map.add_selector("identifier", &"variable".into()).unwrap();
        map.add_selector("call_expression > identifier", &"entity.name.function".into())
            .unwrap();

        assert_eq!(
            lookup(&map, &["program", "identifier"], &[None, Some(0)], true, "x").as_deref(),
            Some("variable")
        );
        assert_eq!(
            lookup(&map, &["program", "call_expression", "identifier"], &[None, Some(0), Some(0)], true, "f")
                .as_deref(),
            Some("entity.name.function")
        );
    }

    #[test]
    fn test_nth_child_and_anonymous_literals() {
        let mut map = ScopeMap::new();
        map.add_selector("pair > string:nth-child(0)", &"string.key".into())
            .unwrap();
        map.add_selector(r#""if", "else""#, &"keyword.control".into())
            .unwrap();

        let key = lookup(&map, &["pair", "string"], &[None, Some(0)], true, "'a'");
        let value = lookup(&map, &["pair", "string"], &[None, Some(2)], true, "'b'");
        assert_eq!(key.as_deref(), Some("string.key"));
        assert_eq!(value, None);

        assert_eq!(
            lookup(&map, &["if_statement", "if"], &[None, Some(0)], false, "if").as_deref(),
            Some("keyword.control")
        );
        // A named node with the same type is not the keyword.
        assert_eq!(lookup(&map, &["x", "if"], &[None, Some(0)], true, "if"), None);
    }

    #[test]
    fn test_leaf_rules_inspect_node_text() {
        let mut map = ScopeMap::new();
        map.add_selector(
            "identifier",
            &ScopeRule::first([
                ScopeRule::exact("self", "variable.language"),
                ScopeRule::matching("^[A-Z][A-Z_]+$", "constant.other"),
                ScopeRule::scope("variable.other"),
            ]),
        )
        .unwrap();

        let scope = |text: &str| lookup(&map, &["identifier"], &[None], true, text);
        assert_eq!(scope("self").as_deref(), Some("variable.language"));
        assert_eq!(scope("MAX_LEN").as_deref(), Some("constant.other"));
        assert_eq!(scope("len").as_deref(), Some("variable.other"));
        assert_eq!(
            map.scope_names(),
            vec!["constant.other", "variable.language", "variable.other"]
        );
    }

    #[test]
    fn test_wildcards() {
        let mut map = ScopeMap::new();
        map.add_selector("string > *", &"string.content".into()).unwrap();
        assert_eq!(
            lookup(&map, &["string", "escape"], &[None, Some(1)], true, "\\n").as_deref(),
            Some("string.content")
        );
    }

    #[test]
    fn test_invalid_selectors() {
        let mut map = ScopeMap::new();
        for selector in ["a b", "a > ", "\"open", "a:first-child", "a:nth-child(x)"] {
            assert!(
                matches!(
                    map.add_selector(selector, &"s".into()),
                    Err(TreeSitterError::Selector { .. })
                ),
                "{selector}"
            );
        }
        assert!(matches!(
            map.add_selector("a", &ScopeRule::matching("(", "s")),
            Err(TreeSitterError::LeafPattern { .. })
        ));
    }
}
