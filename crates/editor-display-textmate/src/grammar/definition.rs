use serde::Deserialize;
use serde_yaml::Value;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Deserialize)]
/// Raw YAML grammar definition.
pub struct GrammarDefinition {
    #[serde(default)]
    /// Optional human-readable name.
    pub name: Option<String>,

    /// Root scope (e.g. `source.js`).
    pub scope: String,

    #[serde(default)]
    /// File extensions associated with this grammar.
    pub file_types: Vec<String>,

    #[serde(default)]
    /// Optional first-line regex used to detect the grammar.
    pub first_line_match: Option<String>,

    #[serde(default)]
    /// Selector of the scopes this grammar injects into.
    pub injection_selector: Option<String>,

    #[serde(default)]
    /// Variables used for regex substitution (`{{name}}`).
    pub variables: HashMap<String, String>,

    /// Contexts keyed by context name. `main` is required.
    pub contexts: BTreeMap<String, Vec<RawContextPattern>>,
}

#[derive(Debug, Clone)]
/// A single entry in a context's pattern list.
pub enum RawContextPattern {
    /// A meta directive (must appear before the other patterns of a context).
    Meta(MetaPattern),
    /// A regex match pattern.
    Match(MatchPattern),
    /// An include pattern.
    Include(IncludePattern),
}

impl<'de> Deserialize<'de> for RawContextPattern {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let Value::Mapping(map) = &value else {
            return Err(serde::de::Error::custom(
                "context patterns must be YAML mappings",
            ));
        };

        let has_key = |k: &str| map.contains_key(Value::String(k.to_string()));

        if has_key("match") {
            let pattern: MatchPattern =
                serde_yaml::from_value(value).map_err(serde::de::Error::custom)?;
            return Ok(Self::Match(pattern));
        }

        if has_key("include") {
            let pattern: IncludePattern =
                serde_yaml::from_value(value).map_err(serde::de::Error::custom)?;
            return Ok(Self::Include(pattern));
        }

        let meta: MetaPattern = serde_yaml::from_value(value).map_err(serde::de::Error::custom)?;
        Ok(Self::Meta(meta))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
/// Scopes a context applies while it is on the stack.
pub struct MetaPattern {
    #[serde(default)]
    /// Scope applied to the whole context, including the text that pushed and popped it.
    pub meta_scope: Option<String>,

    #[serde(default)]
    /// Scope applied to the text between the push and the pop.
    pub meta_content_scope: Option<String>,

    #[serde(default)]
    /// Whether the grammar's `prototype` context is prepended (defaults to true).
    pub meta_include_prototype: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
/// An `include:` entry.
pub struct IncludePattern {
    /// Context name (`main`, `#main`, `$self` or `$base`).
    pub include: String,
}

#[derive(Debug, Clone, Deserialize)]
/// A `match:` pattern entry.
pub struct MatchPattern {
    #[serde(rename = "match")]
    /// The regex source string.
    pub regex: String,

    #[serde(default)]
    /// Optional scope to apply to the matched text.
    pub scope: Option<String>,

    #[serde(default)]
    /// Per-capture scopes keyed by capture group index.
    pub captures: HashMap<u32, String>,

    #[serde(default)]
    /// Push contexts when the pattern matches.
    pub push: Option<ContextReference>,

    #[serde(default)]
    /// Pop contexts when the pattern matches.
    pub pop: Option<PopAction>,

    #[serde(default)]
    /// Replace the current context when the pattern matches.
    pub set: Option<ContextReference>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
/// Reference to one or more contexts.
pub enum ContextReference {
    /// A single context name.
    Name(String),
    /// Multiple context names, pushed in order.
    Names(Vec<String>),
    /// An inline (anonymous) context.
    Inline(Vec<RawContextPattern>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
/// Pop behavior for a match pattern.
pub enum PopAction {
    /// Pop one context if `true`.
    Bool(bool),
    /// Pop a fixed number of contexts.
    Count(usize),
}
