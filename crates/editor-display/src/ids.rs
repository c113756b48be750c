//! Opaque identifiers and the generator that hands them out.

use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! opaque_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u64);

        impl $name {
            /// Wrap a raw numeric id.
            pub const fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            /// Get the underlying numeric id.
            pub fn get(self) -> u64 {
                self.0
            }
        }
    };
}

opaque_id!(
    /// Identifier of a [`crate::TextBuffer`] inside a [`crate::Workspace`].
    BufferId
);
opaque_id!(
    /// Identifier of an editor (a view with its own cursors and folds).
    EditorId
);
opaque_id!(
    /// Identifier of a language mode instance.
    LanguageModeId
);
opaque_id!(
    /// Identifier of a marker layer inside a buffer's marker store.
    MarkerLayerId
);
opaque_id!(
    /// Identifier of a marker.
    MarkerId
);
opaque_id!(
    /// Identifier of an undo transaction.
    TransactionId
);
opaque_id!(
    /// Identifier of a marker decoration.
    DecorationId
);

/// Monotonic id counter.
///
/// One generator is owned by each [`crate::Workspace`]; every kind of id draws from it, so ids
/// are unique across kinds as well.
#[derive(Debug)]
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    /// Create a generator whose first id is `1`.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Allocate a fresh raw id.
    pub fn next_raw(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Make sure no future fresh id collides with `raw`.
    ///
    /// Used when restoring an object that carries an explicit, previously allocated id.
    pub fn reserve(&self, raw: u64) {
        self.next.fetch_max(raw.saturating_add(1), Ordering::Relaxed);
    }

    /// Allocate a [`BufferId`].
    pub fn buffer_id(&self) -> BufferId {
        BufferId(self.next_raw())
    }

    /// Allocate an [`EditorId`].
    pub fn editor_id(&self) -> EditorId {
        EditorId(self.next_raw())
    }

    /// Allocate a [`LanguageModeId`].
    pub fn language_mode_id(&self) -> LanguageModeId {
        LanguageModeId(self.next_raw())
    }

    /// Allocate a [`DecorationId`].
    pub fn decoration_id(&self) -> DecorationId {
        DecorationId(self.next_raw())
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
