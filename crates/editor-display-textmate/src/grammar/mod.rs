//! Grammars: the line tokenizers a [`crate::TextMateLanguageMode`] drives.
//!
//! A grammar turns one row of text plus the rule stack left by the previous row into a tag
//! sequence (see [`editor_display::scope`]) and the rule stack to hand to the next row. The
//! language mode only ever compares rule stacks for equality, which is what lets it stop
//! re-tokenizing once an edit's effects have converged.

mod compiler;
mod definition;
mod engine;

use editor_display::{ScopeRegistry, ScopeSelector};
use std::fmt;
use std::sync::Arc;

pub use compiler::YamlGrammar;
pub use definition::{
    ContextReference, GrammarDefinition, IncludePattern, MatchPattern, MetaPattern, PopAction,
    RawContextPattern,
};
pub use engine::ContextStack;

/// Output of [`Grammar::tokenize_line`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineTokens<S> {
    /// Tag sequence of the row. Positive tags sum to the row's length in chars.
    pub tags: Vec<i32>,
    /// State at the end of the row.
    pub rule_stack: S,
}

/// A line-at-a-time tokenizer.
pub trait Grammar {
    /// Tokenizer state carried from one row to the next.
    type RuleStack: Clone + PartialEq + fmt::Debug;

    /// Root scope name, e.g. `source.js`.
    fn scope_name(&self) -> &str;

    /// Registry naming every scope id this grammar emits. The root scope must be registered.
    fn registry(&self) -> &Arc<ScopeRegistry>;

    /// Tokenize `text` (one row, without its terminator).
    ///
    /// `rule_stack` is the state left by the previous row; `None` starts from the grammar's
    /// initial state and opens the root scope.
    fn tokenize_line(
        &self,
        text: &str,
        rule_stack: Option<&Self::RuleStack>,
        first_line: bool,
    ) -> LineTokens<Self::RuleStack>;

    /// Selector of the scopes this grammar injects into, if it is an injection grammar.
    fn injection_selector(&self) -> Option<&ScopeSelector> {
        None
    }
}
