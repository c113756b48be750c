#![warn(missing_docs)]
//! Editor Display Tree-sitter - Incremental Syntax Tree Language Mode
//!
//! # Overview
//!
//! This crate provides a [`editor_display::LanguageMode`] that keeps one tree-sitter syntax tree
//! for the whole buffer. Scopes come from a selector table keyed by node ancestry rather than from
//! regex rules, folds from declarative rules over node children (optionally complemented by a
//! folding query), and highlighting by walking the tree with a cursor.
//!
//! Edits are applied to the tree as they happen; the reparse runs on the next
//! [`editor_display::LanguageMode::update_highlights`] call, which reports the ranges whose
//! syntax actually changed so the display layer can invalidate just those rows.
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use editor_display::{BufferText, LanguageMode, LanguageModeId, Point, ScopedSettings};
//! use editor_display_treesitter::{TreeSitterGrammar, TreeSitterGrammarConfig, TreeSitterLanguageMode};
//!
//! let config = TreeSitterGrammarConfig::new(tree_sitter_rust::LANGUAGE.into(), "source.rust")
//!     .with_simple_scopes([
//!         ("\"fn\"", "storage.type.function"),
//!         ("function_item > identifier", "entity.name.function"),
//!     ]);
//! let grammar = Arc::new(TreeSitterGrammar::new(config).unwrap());
//!
//! let text = BufferText::from_text("fn main() {}");
//! let settings = Arc::new(ScopedSettings::with_defaults());
//! let mut mode = TreeSitterLanguageMode::new(LanguageModeId::from_raw(1), grammar, &text, settings).unwrap();
//! mode.update_highlights(&text);
//!
//! let scopes = mode.scope_descriptor_for_position(&text, Point::new(0, 4));
//! assert_eq!(scopes.scopes_array(), ["source.rust", "entity.name.function"]);
//! ```
//!
//! # Module Description
//!
//! - [`grammar`] - grammar configuration and compilation
//! - [`scope_map`] - selector → scope tables
//! - [`fold_spec`] - fold rules
//! - [`language_mode`] - the language mode: edits, reparsing, scope and fold queries
//! - [`highlight`] - the highlight iterator over the syntax tree
//! - [`input`] - chunked reads of buffer text for the parser
//! - [`error`] - grammar and mode construction errors

pub mod error;
pub mod fold_spec;
pub mod grammar;
pub mod highlight;
pub mod input;
pub mod language_mode;
pub mod scope_map;

pub use error::TreeSitterError;
pub use fold_spec::{FoldBoundary, FoldSpec, NodeMatcher};
pub use grammar::{TreeSitterGrammar, TreeSitterGrammarConfig};
pub use highlight::LayerHighlightIterator;
pub use input::{BufferTextInput, DEFAULT_READ_CHUNK};
pub use language_mode::{TreeSitterLanguageMode, TreeSitterUpdateMode};
pub use scope_map::{ScopeMap, ScopeRule};
