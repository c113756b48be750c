//! Scope descriptors, selectors and the scope-id registry.
//!
//! A scope descriptor is the ordered list of scope names (outermost first) that applies at a
//! buffer position, e.g. `["source.js", "string.quoted.double.js"]`.
//!
//! Tokenizers exchange scopes as small integer ids. Inside tag sequences an id is encoded as a
//! negative integer: opening `id` is `-(2 * id + 1)` and closing it is `-(2 * id + 2)`, so every
//! open tag is odd, every close tag even, and `open == close + 1`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Scope name used when a descriptor would otherwise be empty.
pub const PLAIN_TEXT_SCOPE: &str = "text.plain";

/// Dense identifier of a scope name in a [`ScopeRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeId(u32);

impl ScopeId {
    /// Wrap a raw numeric id.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the underlying numeric id.
    pub fn get(self) -> u32 {
        self.0
    }

    /// Tag that opens this scope.
    pub fn open_tag(self) -> i32 {
        -(2 * self.0 as i32 + 1)
    }

    /// Tag that closes this scope.
    pub fn close_tag(self) -> i32 {
        -(2 * self.0 as i32 + 2)
    }
}

/// Classification of a single tag value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    /// A run of text, `n` chars long.
    Text(usize),
    /// Opens a scope.
    Open(ScopeId),
    /// Closes a scope.
    Close(ScopeId),
}

impl Tag {
    /// Decode a raw tag.
    pub fn decode(tag: i32) -> Self {
        if tag >= 0 {
            Tag::Text(tag as usize)
        } else if tag % 2 != 0 {
            Tag::Open(ScopeId(((-tag - 1) / 2) as u32))
        } else {
            Tag::Close(ScopeId(((-tag - 2) / 2) as u32))
        }
    }

    /// Encode back to a raw tag.
    pub fn encode(self) -> i32 {
        match self {
            Tag::Text(n) => n as i32,
            Tag::Open(id) => id.open_tag(),
            Tag::Close(id) => id.close_tag(),
        }
    }
}

/// Bidirectional mapping between scope names and [`ScopeId`]s.
///
/// Grammars register every scope they can emit up front; the registry is then shared read-only
/// (`Arc<ScopeRegistry>`) between the grammar, the language mode and its tokenized lines.
#[derive(Debug, Clone, Default)]
pub struct ScopeRegistry {
    names: Vec<String>,
    ids: HashMap<String, ScopeId>,
}

impl ScopeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or allocate the id of `name`.
    pub fn register(&mut self, name: &str) -> ScopeId {
        if let Some(id) = self.ids.get(name) {
            return *id;
        }
        let id = ScopeId(self.names.len() as u32);
        self.names.push(name.to_string());
        self.ids.insert(name.to_string(), id);
        id
    }

    /// Id of an already registered name.
    pub fn id_for_scope(&self, name: &str) -> Option<ScopeId> {
        self.ids.get(name).copied()
    }

    /// Name of an id.
    pub fn scope_for_id(&self, id: ScopeId) -> Option<&str> {
        self.names.get(id.0 as usize).map(String::as_str)
    }

    /// Name of the scope encoded by an open or close tag.
    pub fn scope_for_tag(&self, tag: i32) -> Option<&str> {
        match Tag::decode(tag) {
            Tag::Open(id) | Tag::Close(id) => self.scope_for_id(id),
            Tag::Text(_) => None,
        }
    }

    /// Number of registered scopes.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true if nothing has been registered.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names for a list of ids, skipping unknown ids.
    pub fn names_for_ids(&self, ids: &[ScopeId]) -> Vec<String> {
        ids.iter()
            .filter_map(|id| self.scope_for_id(*id))
            .map(str::to_string)
            .collect()
    }

    /// Freeze into a shareable handle.
    pub fn into_shared(self) -> Arc<ScopeRegistry> {
        Arc::new(self)
    }
}

/// The ordered scopes that apply at a position. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeDescriptor {
    scopes: Vec<String>,
}

impl ScopeDescriptor {
    /// Build a descriptor. An empty list yields `["text.plain"]`.
    pub fn from_scopes<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut scopes: Vec<String> = scopes.into_iter().map(Into::into).collect();
        if scopes.is_empty() {
            scopes.push(PLAIN_TEXT_SCOPE.to_string());
        }
        Self { scopes }
    }

    /// The scope list, outermost first.
    pub fn scopes_array(&self) -> &[String] {
        &self.scopes
    }

    /// The outermost scope.
    pub fn root_scope(&self) -> &str {
        &self.scopes[0]
    }

    /// The innermost scope.
    pub fn innermost_scope(&self) -> &str {
        &self.scopes[self.scopes.len() - 1]
    }

    /// Returns true if `selector` matches this descriptor.
    pub fn matches(&self, selector: &str) -> bool {
        ScopeSelector::parse(selector).matches(self)
    }
}

impl fmt::Display for ScopeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.scopes.join(" "))
    }
}

/// A parsed scope selector.
///
/// Supported syntax: comma-separated alternatives, each made of
/// whitespace-separated steps. A step is a dot-separated name such as `string.quoted`; a leading
/// `.` is ignored. A step matches a scope name when every one of its dot-separated parts appears
/// in the scope's parts in the same relative order. Steps must match scopes of the descriptor in
/// order (not necessarily adjacent). An empty selector matches everything.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScopeSelector {
    alternatives: Vec<Vec<Vec<String>>>,
}

impl ScopeSelector {
    /// Parse a selector string.
    pub fn parse(source: &str) -> Self {
        let alternatives = source
            .split(',')
            .map(|alt| {
                alt.split_whitespace()
                    .map(|step| {
                        step.trim_start_matches('.')
                            .split('.')
                            .filter(|p| !p.is_empty())
                            .map(str::to_string)
                            .collect::<Vec<_>>()
                    })
                    .filter(|parts| !parts.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|steps| !steps.is_empty())
            .collect();
        Self { alternatives }
    }

    /// Returns true if the selector has no steps (it then matches anything).
    pub fn is_empty(&self) -> bool {
        self.alternatives.is_empty()
    }

    /// Number of parts in the largest alternative; used to rank config entries.
    pub fn specificity(&self) -> usize {
        self.alternatives
            .iter()
            .map(|steps| steps.iter().map(Vec::len).sum::<usize>())
            .max()
            .unwrap_or(0)
    }

    /// Match against a descriptor.
    pub fn matches(&self, descriptor: &ScopeDescriptor) -> bool {
        self.matches_scopes(descriptor.scopes_array())
    }

    /// Match against a raw scope list.
    pub fn matches_scopes<S: AsRef<str>>(&self, scopes: &[S]) -> bool {
        if self.alternatives.is_empty() {
            return true;
        }
        self.alternatives
            .iter()
            .any(|steps| steps_match(steps, scopes))
    }

    /// Match against a single scope name.
    pub fn matches_scope(&self, scope: &str) -> bool {
        self.matches_scopes(&[scope])
    }
}

fn steps_match<S: AsRef<str>>(steps: &[Vec<String>], scopes: &[S]) -> bool {
    let mut next = 0usize;
    for step in steps {
        let Some(offset) = scopes[next..]
            .iter()
            .position(|scope| step_matches_scope(step, scope.as_ref()))
        else {
            return false;
        };
        next += offset + 1;
    }
    true
}

fn step_matches_scope(step: &[String], scope: &str) -> bool {
    let mut parts = scope.split('.');
    step.iter()
        .all(|wanted| parts.by_ref().any(|part| part == wanted))
}

/// Returns true if `selector` matches at least one of `descriptors`.
pub fn selector_matches_any_scope(selector: &str, descriptors: &[ScopeDescriptor]) -> bool {
    let selector = ScopeSelector::parse(selector);
    descriptors.iter().any(|d| selector.matches(d))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_encode_open_odd_close_even() {
        let id = ScopeId::from_raw(3);
        assert_eq!(id.open_tag(), -7);
        assert_eq!(id.close_tag(), -8);
        assert_eq!(id.open_tag(), id.close_tag() + 1);
        assert_eq!(Tag::decode(-7), Tag::Open(id));
        assert_eq!(Tag::decode(-8), Tag::Close(id));
        assert_eq!(Tag::decode(5), Tag::Text(5));
    }

    #[test]
    fn test_descriptor_is_never_empty() {
        let d = ScopeDescriptor::from_scopes(Vec::<String>::new());
        assert_eq!(d.scopes_array(), ["text.plain"]);
    }

    #[test]
    fn test_selector_is_an_ordered_subset_test() {
        let d = ScopeDescriptor::from_scopes(["source.js", "string.quoted.double.js"]);
        assert!(d.matches("string.double"));
        assert!(d.matches(".string"));
        assert!(d.matches("source string"));
        assert!(!d.matches("double.string"));
        assert!(!d.matches("string source"));
        assert!(d.matches(""));
        assert!(d.matches("comment, string.quoted"));
    }

    #[test]
    fn test_selector_matches_any_scope() {
        let a = ScopeDescriptor::from_scopes(["source.js"]);
        let b = ScopeDescriptor::from_scopes(["source.js", "comment.line"]);
        assert!(selector_matches_any_scope("comment", &[a.clone(), b]));
        assert!(!selector_matches_any_scope("comment", &[a]));
    }

    #[test]
    fn test_registry_round_trips_names() {
        let mut registry = ScopeRegistry::new();
        let a = registry.register("source.js");
        let b = registry.register("comment.line");
        assert_eq!(registry.register("source.js"), a);
        assert_eq!(registry.scope_for_id(b), Some("comment.line"));
        assert_eq!(registry.scope_for_tag(b.close_tag()), Some("comment.line"));
    }
}
