#![warn(missing_docs)]
//! Editor Display TextMate - Regex Grammar Tokenizer
//!
//! # Overview
//!
//! This crate provides a [`editor_display::LanguageMode`] backed by line-oriented regex
//! grammars. Rows are tokenized one at a time, each row starting from the rule stack the
//! previous row ended with, so an edit only re-tokenizes until the rule stacks converge again.
//! Long documents are tokenized in slices ([`editor_display::LanguageMode::tokenize_next_chunk`])
//! that the host schedules between frames.
//!
//! Grammars are written in YAML: named contexts holding `match` patterns that may `push`, `pop`
//! or `set` contexts, with `meta_scope`/`meta_content_scope` applied while a context is open.
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use editor_display::{BufferText, LanguageMode, LanguageModeId, Point, ScopedSettings};
//! use editor_display_textmate::{TextMateLanguageMode, YamlGrammar};
//!
//! let grammar = YamlGrammar::from_yaml(
//!     r#"
//! scope: source.demo
//! contexts:
//!   main:
//!     - match: '\b(let|fn)\b'
//!       scope: keyword.demo
//! "#,
//! )
//! .unwrap();
//!
//! let text = BufferText::from_text("let x = 1");
//! let settings = Arc::new(ScopedSettings::with_defaults());
//! let mut mode =
//!     TextMateLanguageMode::new(LanguageModeId::from_raw(1), Some(Arc::new(grammar)), &text, settings);
//! while mode.tokenize_next_chunk(&text) {}
//!
//! let scopes = mode.scope_descriptor_for_position(&text, Point::new(0, 1));
//! assert_eq!(scopes.scopes_array(), ["source.demo", "keyword.demo"]);
//! ```
//!
//! # Module Description
//!
//! - [`grammar`] - the [`Grammar`] trait and the YAML grammar engine
//! - [`language_mode`] - row storage, invalidation and background slicing
//! - [`highlight`] - the highlight iterator over tokenized rows
//! - [`error`] - grammar loading errors

pub mod error;
pub mod grammar;
pub mod highlight;
pub mod language_mode;

pub use error::GrammarError;
pub use grammar::{ContextStack, Grammar, LineTokens, YamlGrammar};
pub use highlight::TextMateHighlightIterator;
pub use language_mode::{
    DEFAULT_CHUNK_SIZE, LARGE_FILE_THRESHOLD, TextMateLanguageMode, TextMateOptions,
};
