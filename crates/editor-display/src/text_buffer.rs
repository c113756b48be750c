//! The shared text buffer: text, markers, the language mode and undo history.
//!
//! Every edit is applied to the rope, spliced into every marker layer and forwarded to the
//! language mode before [`TextBuffer::set_text_in_range`] returns, so queries issued right after
//! an edit always see consistent state.

use crate::buffer_text::{BufferChange, BufferText};
use crate::error::EditorError;
use crate::ids::{BufferId, EditorId, TransactionId};
use crate::language_mode::LanguageMode;
use crate::marker::MarkerStore;
use crate::point::{Point, Range};

/// A selection as recorded in the undo history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SavedSelection {
    /// Buffer range.
    pub range: Range,
    /// Whether the head is at the start.
    pub reversed: bool,
}

/// What an undo or redo step restored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRestore {
    /// The transaction that was reverted or reapplied.
    pub transaction: TransactionId,
    /// The editor that created it, if any.
    pub editor: Option<EditorId>,
    /// Selections to restore in that editor.
    pub selections: Vec<SavedSelection>,
}

#[derive(Debug, Clone)]
struct HistoryEntry {
    id: TransactionId,
    editor: Option<EditorId>,
    changes: Vec<BufferChange>,
    selections_before: Vec<SavedSelection>,
    selections_after: Vec<SavedSelection>,
}

#[derive(Debug)]
struct OpenTransaction {
    entry: HistoryEntry,
    depth: usize,
}

/// Text plus everything attached to it.
pub struct TextBuffer {
    id: BufferId,
    text: BufferText,
    markers: MarkerStore,
    language_mode: Box<dyn LanguageMode>,
    undo_stack: Vec<HistoryEntry>,
    redo_stack: Vec<HistoryEntry>,
    open_transaction: Option<OpenTransaction>,
    next_transaction: u64,
    ref_count: usize,
    alive: bool,
    version: u64,
}

impl std::fmt::Debug for TextBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextBuffer")
            .field("id", &self.id)
            .field("line_count", &self.text.line_count())
            .field("language_mode", &self.language_mode.id())
            .field("ref_count", &self.ref_count)
            .field("alive", &self.alive)
            .field("version", &self.version)
            .finish()
    }
}

impl TextBuffer {
    /// Create a buffer holding `text`, tokenized by `language_mode`.
    pub fn new(id: BufferId, text: BufferText, language_mode: Box<dyn LanguageMode>) -> Self {
        Self {
            id,
            text,
            markers: MarkerStore::new(),
            language_mode,
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            open_transaction: None,
            next_transaction: 0,
            ref_count: 0,
            alive: true,
            version: 0,
        }
    }

    /// Buffer id.
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// The text.
    pub fn text(&self) -> &BufferText {
        &self.text
    }

    /// Incremented on every text change.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Marker layers.
    pub fn markers(&self) -> &MarkerStore {
        &self.markers
    }

    /// Marker layers, mutably.
    pub fn markers_mut(&mut self) -> &mut MarkerStore {
        &mut self.markers
    }

    /// The active language mode.
    pub fn language_mode(&self) -> &dyn LanguageMode {
        self.language_mode.as_ref()
    }

    /// The active language mode, mutably.
    pub fn language_mode_mut(&mut self) -> &mut dyn LanguageMode {
        self.language_mode.as_mut()
    }

    /// Swap in a new language mode, destroying the previous one.
    pub fn set_language_mode(&mut self, mut language_mode: Box<dyn LanguageMode>) {
        std::mem::swap(&mut self.language_mode, &mut language_mode);
        language_mode.destroy();
        tracing::debug!(
            buffer = self.id.get(),
            language_mode = self.language_mode.id().get(),
            "language mode changed"
        );
    }

    /// Run one slice of background tokenization. Returns true if more work remains.
    pub fn tokenize_next_chunk(&mut self) -> bool {
        if !self.alive {
            return false;
        }
        self.language_mode.tokenize_next_chunk(&self.text)
    }

    /// Bring highlighting up to date, returning the ranges whose syntax changed.
    pub fn update_highlights(&mut self) -> Vec<Range> {
        if !self.alive {
            return Vec::new();
        }
        self.language_mode.update_highlights(&self.text)
    }

    /// Replace `range` with `text`, returning the range of the inserted text.
    pub fn set_text_in_range(&mut self, range: Range, text: &str) -> Result<Range, EditorError> {
        if !self.alive {
            return Err(EditorError::Destroyed);
        }
        let change = self.apply_change(range, text);
        let new_range = change.new_range;
        self.redo_stack.clear();
        match &mut self.open_transaction {
            Some(open) => open.entry.changes.push(change),
            None => {
                let id = self.next_transaction_id();
                self.undo_stack.push(HistoryEntry {
                    id,
                    editor: None,
                    changes: vec![change],
                    selections_before: Vec::new(),
                    selections_after: Vec::new(),
                });
            }
        }
        Ok(new_range)
    }

    /// Insert `text` at `position`.
    pub fn insert(&mut self, position: Point, text: &str) -> Result<Range, EditorError> {
        self.set_text_in_range(Range::empty_at(position), text)
    }

    /// Delete the text in `range`.
    pub fn delete(&mut self, range: Range) -> Result<Range, EditorError> {
        self.set_text_in_range(range, "")
    }

    fn apply_change(&mut self, range: Range, text: &str) -> BufferChange {
        let change = self.text.set_text_in_range(range, text);
        self.markers.splice(&change);
        self.language_mode.buffer_did_change(&self.text, &change);
        self.version += 1;
        tracing::trace!(
            buffer = self.id.get(),
            old_range = %change.old_range,
            new_range = %change.new_range,
            "buffer changed"
        );
        change
    }

    fn next_transaction_id(&mut self) -> TransactionId {
        self.next_transaction += 1;
        TransactionId::from_raw(self.next_transaction)
    }

    /// Open a transaction (or join the one already open).
    ///
    /// `editor` and `selections_before` are only recorded by the outermost call.
    pub fn begin_transaction(&mut self, editor: Option<EditorId>, selections_before: Vec<SavedSelection>) {
        if let Some(open) = &mut self.open_transaction {
            open.depth += 1;
            return;
        }
        let id = self.next_transaction_id();
        self.open_transaction = Some(OpenTransaction {
            entry: HistoryEntry {
                id,
                editor,
                changes: Vec::new(),
                selections_before,
                selections_after: Vec::new(),
            },
            depth: 1,
        });
    }

    /// Close the innermost transaction. The outermost close records the history entry and
    /// returns its id, unless nothing changed.
    pub fn commit_transaction(&mut self, selections_after: Vec<SavedSelection>) -> Option<TransactionId> {
        let open = self.open_transaction.as_mut()?;
        open.depth -= 1;
        if open.depth > 0 {
            return None;
        }
        let mut open = self.open_transaction.take()?;
        if open.entry.changes.is_empty() {
            return None;
        }
        open.entry.selections_after = selections_after;
        let id = open.entry.id;
        self.undo_stack.push(open.entry);
        Some(id)
    }

    /// Returns true while a transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.open_transaction.is_some()
    }

    /// Group the edits made by `f` into one undo step.
    pub fn transact<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.begin_transaction(None, Vec::new());
        let result = f(self);
        self.commit_transaction(Vec::new());
        result
    }

    /// Returns true if there is something to undo.
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    /// Returns true if there is something to redo.
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Revert the most recent transaction.
    pub fn undo(&mut self) -> Result<Option<HistoryRestore>, EditorError> {
        if !self.alive {
            return Err(EditorError::Destroyed);
        }
        let Some(entry) = self.undo_stack.pop() else {
            return Ok(None);
        };
        for change in entry.changes.iter().rev() {
            let inverse = change.inverted();
            self.apply_change(inverse.old_range, &inverse.new_text);
        }
        let restore = HistoryRestore {
            transaction: entry.id,
            editor: entry.editor,
            selections: entry.selections_before.clone(),
        };
        self.redo_stack.push(entry);
        Ok(Some(restore))
    }

    /// Reapply the most recently undone transaction.
    pub fn redo(&mut self) -> Result<Option<HistoryRestore>, EditorError> {
        if !self.alive {
            return Err(EditorError::Destroyed);
        }
        let Some(entry) = self.redo_stack.pop() else {
            return Ok(None);
        };
        for change in &entry.changes {
            self.apply_change(change.old_range, &change.new_text);
        }
        let restore = HistoryRestore {
            transaction: entry.id,
            editor: entry.editor,
            selections: entry.selections_after.clone(),
        };
        self.undo_stack.push(entry);
        Ok(Some(restore))
    }

    /// Attach an editor.
    pub fn retain(&mut self) {
        self.ref_count += 1;
    }

    /// Detach an editor. Returns true if this destroyed the buffer.
    pub fn release(&mut self) -> bool {
        self.ref_count = self.ref_count.saturating_sub(1);
        if self.ref_count == 0 && self.alive {
            self.destroy();
            return true;
        }
        false
    }

    /// Number of attached editors.
    pub fn ref_count(&self) -> usize {
        self.ref_count
    }

    /// Tear down the buffer and its language mode.
    pub fn destroy(&mut self) {
        if !self.alive {
            return;
        }
        self.alive = false;
        self.language_mode.destroy();
        tracing::debug!(buffer = self.id.get(), "buffer destroyed");
    }

    /// Returns false once destroyed.
    pub fn is_alive(&self) -> bool {
        self.alive
    }
}
