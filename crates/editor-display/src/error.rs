use crate::ids::{BufferId, EditorId};
use thiserror::Error;

#[derive(Debug, Error)]
/// Errors produced by editor operations.
///
/// Coordinates never produce errors; they are clipped instead.
pub enum EditorError {
    #[error("cannot {operation}: the editor is read-only")]
    /// A mutation was attempted on a read-only editor without the bypass flag.
    ReadOnly {
        /// Name of the rejected operation.
        operation: &'static str,
    },

    #[error("the editor or buffer has been destroyed")]
    /// The target was destroyed.
    Destroyed,

    #[error("unknown buffer {0:?}")]
    /// A buffer id was not found.
    UnknownBuffer(BufferId),

    #[error("unknown editor {0:?}")]
    /// An editor id was not found.
    UnknownEditor(EditorId),

    #[error("a buffer for '{0}' is already open")]
    /// A buffer with this uri is already open.
    UriAlreadyOpen(String),

    #[error("editor id {0:?} is already in use")]
    /// Restoring an editor with an id that is still live.
    DuplicateEditor(EditorId),

    #[error("config parse error: {0}")]
    /// Scoped settings could not be parsed.
    Config(#[from] serde_yaml::Error),

    #[error("invalid setting '{key}': {message}")]
    /// A setting had the wrong shape.
    InvalidSetting {
        /// Setting key.
        key: String,
        /// What was wrong.
        message: String,
    },
}
