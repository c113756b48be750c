//! Grammar configuration and compilation.

use crate::error::TreeSitterError;
use crate::fold_spec::FoldSpec;
use crate::scope_map::{ScopeMap, ScopeRule};
use editor_display::{CommentStrings, ScopeId, ScopeRegistry};
use std::fmt;
use std::sync::Arc;
use tree_sitter::{Parser, Query};

/// Configuration for [`TreeSitterGrammar`].
#[derive(Debug, Clone)]
pub struct TreeSitterGrammarConfig {
    /// Tree-sitter language.
    pub language: tree_sitter::Language,
    /// Root scope name (e.g. `source.rust`).
    pub scope_name: String,
    /// Display name.
    pub name: Option<String>,
    /// File extensions associated with the grammar.
    pub file_types: Vec<String>,
    /// Selector → scope rules, see [`crate::scope_map`].
    pub scopes: Vec<(String, ScopeRule)>,
    /// Fold rules, tried in order.
    pub folds: Vec<FoldSpec>,
    /// Optional folding query (`.scm`). Each captured node folds over its own extent when no fold
    /// rule applies to it.
    pub folds_query: Option<String>,
    /// Comment delimiters of the language.
    pub comment_strings: CommentStrings,
}

impl TreeSitterGrammarConfig {
    /// A config with a language and root scope and nothing else.
    pub fn new(language: tree_sitter::Language, scope_name: impl Into<String>) -> Self {
        Self {
            language,
            scope_name: scope_name.into(),
            name: None,
            file_types: Vec::new(),
            scopes: Vec::new(),
            folds: Vec::new(),
            folds_query: None,
            comment_strings: CommentStrings::default(),
        }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the file types.
    pub fn with_file_types<'s>(mut self, file_types: impl IntoIterator<Item = &'s str>) -> Self {
        self.file_types = file_types.into_iter().map(str::to_string).collect();
        self
    }

    /// Add one selector rule.
    pub fn with_scope(mut self, selector: impl Into<String>, rule: impl Into<ScopeRule>) -> Self {
        self.scopes.push((selector.into(), rule.into()));
        self
    }

    /// Add a set of selector → scope name mappings.
    pub fn with_simple_scopes<const N: usize>(mut self, scopes: [(&str, &str); N]) -> Self {
        for (selector, scope) in scopes {
            self.scopes
                .push((selector.to_string(), ScopeRule::scope(scope)));
        }
        self
    }

    /// Add a fold rule.
    pub fn with_fold(mut self, fold: FoldSpec) -> Self {
        self.folds.push(fold);
        self
    }

    /// Set a folding query.
    pub fn with_folds_query(mut self, folds_query: impl Into<String>) -> Self {
        self.folds_query = Some(folds_query.into());
        self
    }

    /// Set the comment delimiters.
    pub fn with_comment_strings(mut self, start: &str, end: Option<&str>) -> Self {
        self.comment_strings = CommentStrings {
            comment_start: Some(start.to_string()),
            comment_end: end.map(str::to_string),
        };
        self
    }
}

/// A compiled tree-sitter grammar: language, scope map, fold rules and scope ids.
pub struct TreeSitterGrammar {
    language: tree_sitter::Language,
    scope_name: String,
    name: Option<String>,
    file_types: Vec<String>,
    scope_map: ScopeMap,
    folds: Vec<FoldSpec>,
    folds_query: Option<Query>,
    comment_strings: CommentStrings,
    registry: Arc<ScopeRegistry>,
    root: ScopeId,
}

impl TreeSitterGrammar {
    /// Compile `config`.
    pub fn new(config: TreeSitterGrammarConfig) -> Result<Self, TreeSitterError> {
        Parser::new()
            .set_language(&config.language)
            .map_err(|e| TreeSitterError::Language(e.to_string()))?;

        let mut scope_map = ScopeMap::new();
        for (selector, rule) in &config.scopes {
            scope_map.add_selector(selector, rule)?;
        }

        let folds_query = match config.folds_query.as_deref() {
            Some(q) if !q.trim().is_empty() => Some(
                Query::new(&config.language, q).map_err(|e| TreeSitterError::Query(e.to_string()))?,
            ),
            _ => None,
        };

        let mut registry = ScopeRegistry::new();
        let root = registry.register(&config.scope_name);
        for name in scope_map.scope_names() {
            registry.register(name);
        }

        tracing::debug!(
            scope = %config.scope_name,
            rules = config.scopes.len(),
            folds = config.folds.len(),
            "tree-sitter grammar compiled"
        );

        Ok(Self {
            language: config.language,
            scope_name: config.scope_name,
            name: config.name,
            file_types: config.file_types,
            scope_map,
            folds: config.folds,
            folds_query,
            comment_strings: config.comment_strings,
            registry: registry.into_shared(),
            root,
        })
    }

    /// The tree-sitter language.
    pub fn language(&self) -> &tree_sitter::Language {
        &self.language
    }

    /// Root scope name.
    pub fn scope_name(&self) -> &str {
        &self.scope_name
    }

    /// Display name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Associated file types.
    pub fn file_types(&self) -> &[String] {
        &self.file_types
    }

    /// The compiled scope map.
    pub fn scope_map(&self) -> &ScopeMap {
        &self.scope_map
    }

    /// Fold rules.
    pub fn folds(&self) -> &[FoldSpec] {
        &self.folds
    }

    /// Comment delimiters.
    pub fn comment_strings(&self) -> &CommentStrings {
        &self.comment_strings
    }

    /// Scope names and ids of every scope this grammar can produce.
    pub fn registry(&self) -> &Arc<ScopeRegistry> {
        &self.registry
    }

    /// Id of the root scope.
    pub fn root_scope_id(&self) -> ScopeId {
        self.root
    }

    pub(crate) fn folds_query(&self) -> Option<&Query> {
        self.folds_query.as_ref()
    }
}

impl fmt::Debug for TreeSitterGrammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeSitterGrammar")
            .field("scope_name", &self.scope_name)
            .field("name", &self.name)
            .field("file_types", &self.file_types)
            .field("folds", &self.folds.len())
            .field("scopes", &self.registry.len())
            .finish()
    }
}
