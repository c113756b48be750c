use thiserror::Error;

#[derive(Debug, Error)]
/// Errors produced while loading or compiling a grammar.
pub enum GrammarError {
    #[error("YAML parse error: {0}")]
    /// YAML parsing failed.
    Yaml(#[from] serde_yaml::Error),

    #[error("missing required field: {0}")]
    /// A required field was missing from the grammar.
    MissingField(&'static str),

    #[error("unknown context '{0}'")]
    /// A referenced context name does not exist.
    UnknownContext(String),

    #[error("unknown variable '{0}'")]
    /// A referenced variable name does not exist.
    UnknownVariable(String),

    #[error("circular variable reference '{0}'")]
    /// Variable expansion loop detected.
    CircularVariableReference(String),

    #[error("include cycle through context '{0}'")]
    /// Contexts include each other without consuming a pattern.
    IncludeCycle(String),

    #[error("regex compile error for pattern '{pattern}': {message}")]
    /// A regex pattern failed to compile.
    RegexCompile {
        /// The regex pattern string (after variable substitution).
        pattern: String,
        /// The compiler error message.
        message: String,
    },

    #[error("variable reference scanner failed: {0}")]
    /// The `{{variable}}` scanner could not be built.
    VariableScanner(#[from] regex::Error),

    #[error("unsupported feature: {0}")]
    /// A grammar feature that is not implemented.
    Unsupported(&'static str),
}
