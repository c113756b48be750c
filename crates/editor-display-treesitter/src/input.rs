//! Streams buffer text to the parser without flattening the rope.

use editor_display::{BufferText, Point};
use std::borrow::Cow;

/// Largest chunk handed to the parser in one read.
pub const DEFAULT_READ_CHUNK: usize = 4096;

/// Pull-based reader over a [`BufferText`], suitable as a `parse_with_options` callback.
///
/// Reads are served from the rope's own chunks, capped at a configurable size. A returned chunk
/// never ends in the middle of a character or between the `\r` and `\n` of a CRLF pair, so the
/// logical buffer position tracked between sequential reads stays in step with the buffer's rows.
#[derive(Debug)]
pub struct BufferTextInput<'a> {
    text: &'a BufferText,
    chunk_size: usize,
    next_byte: usize,
    position: Point,
    reads: usize,
}

impl<'a> BufferTextInput<'a> {
    /// A reader with the default chunk size.
    pub fn new(text: &'a BufferText) -> Self {
        Self::with_chunk_size(text, DEFAULT_READ_CHUNK)
    }

    /// A reader returning at most `chunk_size` bytes per read (a character wider than that is
    /// still returned whole).
    pub fn with_chunk_size(text: &'a BufferText, chunk_size: usize) -> Self {
        Self {
            text,
            chunk_size: chunk_size.max(1),
            next_byte: 0,
            position: Point::zero(),
            reads: 0,
        }
    }

    /// Buffer position of the byte following the last read.
    pub fn position(&self) -> Point {
        self.position
    }

    /// Number of reads served.
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Bytes starting at `byte`. An empty result signals the end of the text.
    pub fn read(&mut self, byte: usize) -> Cow<'a, [u8]> {
        let len = self.text.len_bytes();
        if byte >= len {
            self.next_byte = len;
            self.position = self.text.end_position();
            return Cow::Borrowed(&[]);
        }
        if byte != self.next_byte {
            self.position = self.text.position_for_byte_index(byte);
        }
        self.reads += 1;

        let (chunk, chunk_start) = self.text.chunk_at_byte(byte);
        let available = &chunk[byte - chunk_start..];
        let mut end = available.len().min(self.chunk_size);
        while !available.is_char_boundary(end) {
            end -= 1;
        }
        if end == 0 {
            end = available
                .char_indices()
                .nth(1)
                .map_or(available.len(), |(i, _)| i);
        }

        let mut piece = Cow::Borrowed(&available[..end]);
        if piece.ends_with('\r') {
            let continues_with_lf = if end < available.len() {
                available.as_bytes()[end] == b'\n'
            } else {
                self.text.chunk_at_byte(byte + end).0.starts_with('\n')
            };
            if continues_with_lf {
                piece = if end > 1 {
                    Cow::Borrowed(&available[..end - 1])
                } else {
                    Cow::Owned("\r\n".to_string())
                };
            }
        }

        self.advance(&piece);
        self.next_byte = byte + piece.len();
        match piece {
            Cow::Borrowed(s) => Cow::Borrowed(s.as_bytes()),
            Cow::Owned(s) => Cow::Owned(s.into_bytes()),
        }
    }

    fn advance(&mut self, piece: &str) {
        let mut chars = piece.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '\r' if chars.peek() == Some(&'\n') => {}
                '\n' | '\r' => {
                    self.position.row += 1;
                    self.position.column = 0;
                }
                _ => self.position.column += 1,
            }
        }
    }
}
