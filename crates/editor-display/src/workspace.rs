//! Open buffers and the editors attached to them.
//!
//! The [`Workspace`] is the arena that owns every [`TextBuffer`] and the per-editor state of
//! every editor. Editors never hold references to each other or to their buffer; the workspace
//! hands out short-lived [`TextEditor`] handles that borrow both for the duration of a call.
//!
//! Several editors can edit the same buffer. Their selections and folds live in separate marker
//! layers of that buffer, so an edit made through one editor moves the cursors and folds of the
//! others while each keeps its own.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::buffer_text::BufferText;
use crate::config::{EditorSettings, ScopedSettings};
use crate::editor::{EditorState, TextEditor};
use crate::error::EditorError;
use crate::ids::{BufferId, EditorId, IdGenerator, LanguageModeId};
use crate::language_mode::{LanguageMode, NullLanguageMode};
use crate::text_buffer::TextBuffer;

/// Builds the language mode of a newly opened buffer.
pub type LanguageModeFactory<'a> =
    Box<dyn FnOnce(LanguageModeId, &BufferText, Arc<ScopedSettings>) -> Box<dyn LanguageMode> + 'a>;

/// Metadata attached to a workspace buffer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BufferMetadata {
    /// Optional buffer URI/path (host-provided).
    pub uri: Option<String>,
}

#[derive(Debug)]
struct BufferEntry {
    meta: BufferMetadata,
    buffer: TextBuffer,
}

/// A collection of open buffers and their editors.
pub struct Workspace {
    ids: IdGenerator,
    settings: Arc<ScopedSettings>,
    buffers: BTreeMap<BufferId, BufferEntry>,
    uri_to_buffer: HashMap<String, BufferId>,
    editors: BTreeMap<EditorId, EditorState>,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("buffer_count", &self.buffers.len())
            .field("editor_count", &self.editors.len())
            .field("uri_count", &self.uri_to_buffer.len())
            .finish()
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

impl Workspace {
    /// Create an empty workspace using the default scoped settings.
    pub fn new() -> Self {
        Self::with_settings(ScopedSettings::with_defaults())
    }

    /// Create an empty workspace using `settings` for every language mode it builds.
    pub fn with_settings(settings: ScopedSettings) -> Self {
        Self {
            ids: IdGenerator::new(),
            settings: Arc::new(settings),
            buffers: BTreeMap::new(),
            uri_to_buffer: HashMap::new(),
            editors: BTreeMap::new(),
        }
    }

    /// The scoped settings shared with language modes.
    pub fn settings(&self) -> &Arc<ScopedSettings> {
        &self.settings
    }

    /// The id generator.
    pub fn ids(&self) -> &IdGenerator {
        &self.ids
    }

    /// Returns the number of open buffers.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Returns `true` if there are no open buffers.
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Returns the number of live editors.
    pub fn editor_count(&self) -> usize {
        self.editors.len()
    }

    /// Open a buffer without a grammar.
    pub fn open_buffer(&mut self, uri: Option<String>, text: &str) -> Result<BufferId, EditorError> {
        self.open_buffer_with_language_mode(
            uri,
            text,
            Box::new(
                |id: LanguageModeId, _text: &BufferText, settings: Arc<ScopedSettings>| -> Box<dyn LanguageMode> {
                    Box::new(NullLanguageMode::new(id, settings))
                },
            ),
        )
    }

    /// Open a buffer whose language mode is built by `factory`.
    pub fn open_buffer_with_language_mode(
        &mut self,
        uri: Option<String>,
        text: &str,
        factory: LanguageModeFactory<'_>,
    ) -> Result<BufferId, EditorError> {
        if let Some(uri) = &uri
            && self.uri_to_buffer.contains_key(uri)
        {
            return Err(EditorError::UriAlreadyOpen(uri.clone()));
        }

        let id = self.ids.buffer_id();
        let text = BufferText::from_text(text);
        let language_mode = factory(self.ids.language_mode_id(), &text, self.settings.clone());
        let buffer = TextBuffer::new(id, text, language_mode);
        if let Some(uri) = &uri {
            self.uri_to_buffer.insert(uri.clone(), id);
        }
        tracing::debug!(buffer = id.get(), uri = ?uri, "buffer opened");
        self.buffers.insert(
            id,
            BufferEntry {
                meta: BufferMetadata { uri },
                buffer,
            },
        );
        Ok(id)
    }

    /// Replace the language mode of a buffer.
    pub fn set_language_mode(&mut self, buffer: BufferId, factory: LanguageModeFactory<'_>) -> Result<(), EditorError> {
        let language_mode_id = self.ids.language_mode_id();
        let settings = self.settings.clone();
        let entry = self
            .buffers
            .get_mut(&buffer)
            .ok_or(EditorError::UnknownBuffer(buffer))?;
        let language_mode = factory(language_mode_id, entry.buffer.text(), settings);
        entry.buffer.set_language_mode(language_mode);
        Ok(())
    }

    /// Look up a buffer.
    pub fn buffer(&self, id: BufferId) -> Option<&TextBuffer> {
        self.buffers.get(&id).map(|e| &e.buffer)
    }

    /// Look up a buffer mutably.
    pub fn buffer_mut(&mut self, id: BufferId) -> Option<&mut TextBuffer> {
        self.buffers.get_mut(&id).map(|e| &mut e.buffer)
    }

    /// Metadata of a buffer.
    pub fn buffer_metadata(&self, id: BufferId) -> Option<&BufferMetadata> {
        self.buffers.get(&id).map(|e| &e.meta)
    }

    /// Find an open buffer by URI.
    pub fn buffer_id_for_uri(&self, uri: &str) -> Option<BufferId> {
        self.uri_to_buffer.get(uri).copied()
    }

    /// Ids of every open buffer.
    pub fn buffer_ids(&self) -> Vec<BufferId> {
        self.buffers.keys().copied().collect()
    }

    /// Attach a new editor to `buffer`.
    pub fn create_editor(&mut self, buffer: BufferId, settings: EditorSettings) -> Result<EditorId, EditorError> {
        let id = self.ids.editor_id();
        self.insert_editor(id, buffer, settings)
    }

    /// Attach an editor with a previously allocated id, as when restoring saved state.
    pub fn create_editor_with_id(
        &mut self,
        id: EditorId,
        buffer: BufferId,
        settings: EditorSettings,
    ) -> Result<EditorId, EditorError> {
        if self.editors.contains_key(&id) {
            return Err(EditorError::DuplicateEditor(id));
        }
        self.ids.reserve(id.get());
        self.insert_editor(id, buffer, settings)
    }

    fn insert_editor(&mut self, id: EditorId, buffer: BufferId, settings: EditorSettings) -> Result<EditorId, EditorError> {
        let entry = self
            .buffers
            .get_mut(&buffer)
            .ok_or(EditorError::UnknownBuffer(buffer))?;
        if !entry.buffer.is_alive() {
            return Err(EditorError::Destroyed);
        }
        let state = EditorState::new(id, &mut entry.buffer, settings);
        self.editors.insert(id, state);
        tracing::debug!(editor = id.get(), buffer = buffer.get(), "editor created");
        Ok(id)
    }

    /// Destroy an editor. The buffer is closed when its last editor goes away.
    pub fn destroy_editor(&mut self, id: EditorId) -> Result<(), EditorError> {
        let mut state = self.editors.remove(&id).ok_or(EditorError::UnknownEditor(id))?;
        let buffer_id = state.buffer_id();
        let Some(entry) = self.buffers.get_mut(&buffer_id) else {
            return Ok(());
        };
        if state.dispose(&mut entry.buffer) {
            if let Some(uri) = &entry.meta.uri {
                self.uri_to_buffer.remove(uri);
            }
            self.buffers.remove(&buffer_id);
            tracing::debug!(buffer = buffer_id.get(), "buffer closed with its last editor");
        }
        tracing::debug!(editor = id.get(), "editor destroyed");
        Ok(())
    }

    /// Get a handle on an editor.
    pub fn editor(&mut self, id: EditorId) -> Result<TextEditor<'_>, EditorError> {
        let state = self.editors.get_mut(&id).ok_or(EditorError::UnknownEditor(id))?;
        let entry = self
            .buffers
            .get_mut(&state.buffer_id())
            .ok_or(EditorError::Destroyed)?;
        Ok(TextEditor::new(&mut entry.buffer, state, &self.ids))
    }

    /// Ids of the editors attached to `buffer`.
    pub fn editor_ids_for_buffer(&self, buffer: BufferId) -> Vec<EditorId> {
        self.editors
            .iter()
            .filter(|(_, state)| state.buffer_id() == buffer)
            .map(|(id, _)| *id)
            .collect()
    }
}
