#![warn(missing_docs)]
//! Editor Display - Headless Editor Core with Pluggable Tokenizers
//!
//! # Overview
//!
//! `editor-display` is the UI-agnostic core of a code editor: buffer and screen coordinates,
//! folds, soft wrap, invisibles, atomic soft tabs, cursors and selections, undo history and the
//! contracts syntax highlighters plug into. Rendering is left to the host, which pulls screen
//! lines and scope-tagged tokens out of a [`TextEditor`].
//!
//! # Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Workspace / TextEditor                     │  ← Public API
//! ├─────────────────────────────────────────────┤
//! │  Cursors, Selections, Words                 │  ← Motions
//! ├─────────────────────────────────────────────┤
//! │  Display Layer (Folds, Tabs, Soft Wrap)     │  ← Screen coordinates
//! ├─────────────────────────────────────────────┤
//! │  Language Mode + Highlight Iterator         │  ← Scopes (TextMate / tree-sitter crates)
//! ├─────────────────────────────────────────────┤
//! │  TextBuffer (Rope, Markers, History)        │  ← Buffer coordinates
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use editor_display::{EditorSettings, Point, Range, Workspace};
//!
//! let mut workspace = Workspace::new();
//! let buffer = workspace.open_buffer(None, "fn main() {\n\tprintln!(\"hi\");\n}\n").unwrap();
//! let editor_id = workspace.create_editor(buffer, EditorSettings::default()).unwrap();
//!
//! let mut editor = workspace.editor(editor_id).unwrap();
//! // Hard tabs expand to the next tab stop on screen.
//! assert_eq!(editor.screen_line_for_screen_row(1).unwrap().text, "  println!(\"hi\");");
//!
//! editor.fold_buffer_range(Range::new((0, 11), (2, 0)));
//! assert_eq!(editor.screen_line_for_screen_row(0).unwrap().text, "fn main() {⋯}");
//!
//! editor.set_cursor_buffer_position(Point::new(0, 2));
//! editor.insert_text("_x").unwrap();
//! assert_eq!(editor.line_text_for_buffer_row(0), "fn_x main() {");
//! ```
//!
//! # Module Description
//!
//! - [`point`] - buffer/screen points, ranges and clip directions
//! - [`buffer_text`] - rope-backed text with line-ending aware rows
//! - [`marker`] - marker layers tracking ranges across edits
//! - [`text_buffer`] - text, markers, language mode and undo history
//! - [`scope`] - scope ids, descriptors and selectors
//! - [`tokenized_line`] - tokenized rows and the token iterator
//! - [`highlight`] - the highlight iterator contract
//! - [`language_mode`] - the language mode capability and the null mode
//! - [`indent`] - the shared suggested-indentation policy
//! - [`config`] - scoped settings and per-editor settings
//! - [`display_layer`] - screen lines, folds and position translation
//! - [`words`] - word, subword and paragraph boundaries
//! - [`editor`] - the text editor facade
//! - [`workspace`] - the arena owning buffers and editors

pub mod buffer_text;
pub mod config;
mod cursor;
pub mod display_layer;
pub mod editor;
pub mod error;
pub mod highlight;
pub mod ids;
pub mod indent;
pub mod language_mode;
pub mod layout;
pub mod line_ending;
pub mod marker;
pub mod point;
pub mod scope;
mod selection;
pub mod text_buffer;
pub mod tokenized_line;
pub mod words;
pub mod workspace;

pub use buffer_text::{BufferChange, BufferText};
pub use config::{EditorSettings, InvisibleGlyphs, ScopedSettings, ScopedValue};
pub use cursor::Motion;
pub use display_layer::{ClipOptions, DisplayLayer, FOLD_PLACEHOLDER, ScreenLine, ScreenSpan, SpanKind};
pub use editor::{DecorationState, ScreenLineToken, SelectionOptions, TextEditor};
pub use error::EditorError;
pub use highlight::{HighlightIterator, NullHighlightIterator};
pub use ids::{
    BufferId, DecorationId, EditorId, IdGenerator, LanguageModeId, MarkerId, MarkerLayerId,
    TransactionId,
};
pub use indent::{IndentationPolicy, indent_level_for_line};
pub use language_mode::{
    CommentStrings, LanguageMode, LanguageModeCallback, LanguageModeEmitter, LanguageModeEvent,
    NULL_GRAMMAR_SCOPE, NullLanguageMode,
};
pub use line_ending::LineEnding;
pub use marker::{InvalidationStrategy, Marker, MarkerLayer, MarkerOptions, MarkerStore};
pub use point::{ClipDirection, INFINITY, Point, Range};
pub use scope::{PLAIN_TEXT_SCOPE, ScopeDescriptor, ScopeId, ScopeRegistry, ScopeSelector, Tag};
pub use selection::SelectionState;
pub use text_buffer::{HistoryRestore, SavedSelection, TextBuffer};
pub use tokenized_line::{Token, TokenIterator, TokenizedLine};
pub use workspace::{BufferMetadata, LanguageModeFactory, Workspace};
