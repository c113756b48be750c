//! Line ending helpers.
//!
//! Buffers keep their text verbatim, so every row remembers the exact newline sequence that
//! terminates it. The last row of a buffer has no terminator.

/// The newline sequence that terminates a buffer row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    /// The last row of the buffer.
    #[default]
    None,
    /// Unix-style LF (`'\n'`).
    Lf,
    /// Windows-style CRLF (`"\r\n"`).
    Crlf,
    /// Classic Mac CR (`'\r'`).
    Cr,
}

impl LineEnding {
    /// The newline text.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Lf => "\n",
            Self::Crlf => "\r\n",
            Self::Cr => "\r",
        }
    }

    /// Number of chars in the newline sequence.
    pub fn len(self) -> usize {
        self.as_str().len()
    }

    /// Returns true for [`LineEnding::None`].
    pub fn is_empty(self) -> bool {
        self == Self::None
    }

    /// Split a raw row (as returned by the rope, terminator included) into content and ending.
    pub fn split_row(raw: &str) -> (&str, Self) {
        if let Some(content) = raw.strip_suffix("\r\n") {
            (content, Self::Crlf)
        } else if let Some(content) = raw.strip_suffix('\n') {
            (content, Self::Lf)
        } else if let Some(content) = raw.strip_suffix('\r') {
            (content, Self::Cr)
        } else {
            (raw, Self::None)
        }
    }

    /// Detect the dominant line ending from a source text.
    ///
    /// Policy: if the input contains any CRLF (`"\r\n"`), returns [`LineEnding::Crlf`],
    /// otherwise [`LineEnding::Lf`].
    pub fn detect_in_text(text: &str) -> Self {
        if text.contains("\r\n") {
            Self::Crlf
        } else {
            Self::Lf
        }
    }
}
