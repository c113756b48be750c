use thiserror::Error;

/// Errors produced while building a [`crate::TreeSitterGrammar`] or its language mode.
#[derive(Debug, Error)]
pub enum TreeSitterError {
    /// Setting the Tree-sitter language failed.
    #[error("tree-sitter language error: {0}")]
    Language(String),

    /// Compiling a Tree-sitter query failed.
    #[error("tree-sitter query error: {0}")]
    Query(String),

    /// A scope selector could not be parsed.
    #[error("invalid scope selector '{selector}': {message}")]
    Selector {
        /// The offending selector.
        selector: String,
        /// What went wrong.
        message: String,
    },

    /// A `match` leaf rule did not compile.
    #[error("invalid leaf pattern '{pattern}': {source}")]
    LeafPattern {
        /// The offending pattern.
        pattern: String,
        /// The regex error.
        #[source]
        source: regex::Error,
    },
}
