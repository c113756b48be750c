//! Highlight iterator over the rows of a [`TextMateLanguageMode`].

use crate::grammar::Grammar;
use crate::language_mode::TextMateLanguageMode;
use editor_display::{BufferText, HighlightIterator, Point, ScopeId, Tag};

/// Walks the tag sequences of consecutive tokenized rows.
///
/// Rows that have not been tokenized yet are read as their placeholder (one root-scoped token),
/// so the iterator never blocks on background work.
pub struct TextMateHighlightIterator<'a, G: Grammar> {
    mode: &'a TextMateLanguageMode<G>,
    text: &'a BufferText,
    tags: Vec<i32>,
    line_length: usize,
    tag_index: usize,
    position: Point,
    open_scope_ids: Vec<ScopeId>,
    close_scope_ids: Vec<ScopeId>,
}

impl<'a, G: Grammar> TextMateHighlightIterator<'a, G> {
    /// Create an iterator; call [`HighlightIterator::seek`] before reading it.
    pub fn new(mode: &'a TextMateLanguageMode<G>, text: &'a BufferText) -> Self {
        Self {
            mode,
            text,
            tags: Vec::new(),
            line_length: 0,
            tag_index: 0,
            position: Point::zero(),
            open_scope_ids: Vec::new(),
            close_scope_ids: Vec::new(),
        }
    }

    fn load_row(&mut self, row: usize) -> bool {
        if row > self.text.last_row() {
            return false;
        }
        let line = self.mode.tokenized_line(self.text, row);
        self.line_length = line.text().chars().count();
        self.tags = line.tags().to_vec();
        true
    }

    fn move_to_next_line(&mut self) -> bool {
        self.position = Point::new(self.position.row + 1, 0);
        if !self.load_row(self.position.row) {
            return false;
        }
        self.tag_index = 0;
        true
    }

    fn is_at_tag_boundary(&self) -> bool {
        !self.close_scope_ids.is_empty() || !self.open_scope_ids.is_empty()
    }

    // Pending closes pop the containing scopes; pending opens are pushed onto them.
    fn flush_pending(&mut self, containing: &mut Vec<ScopeId>) {
        for _ in self.close_scope_ids.drain(..) {
            containing.pop();
        }
        containing.append(&mut self.open_scope_ids);
    }
}

impl<G: Grammar> HighlightIterator for TextMateHighlightIterator<'_, G> {
    fn seek(&mut self, position: Point) -> Vec<ScopeId> {
        self.open_scope_ids.clear();
        self.close_scope_ids.clear();

        let row = position.row.min(self.text.last_row());
        let line = self.mode.tokenized_line(self.text, row);
        self.line_length = line.text().chars().count();
        self.tags = line.tags().to_vec();
        let mut containing = line.open_scopes().to_vec();

        let mut current_column = 0usize;
        let mut tag_index = None;
        for index in 0..self.tags.len() {
            match Tag::decode(self.tags[index]) {
                Tag::Text(len) => {
                    if current_column >= position.column {
                        tag_index = Some(index);
                        break;
                    }
                    current_column += len;
                    self.flush_pending(&mut containing);
                }
                Tag::Close(id) => {
                    if !self.open_scope_ids.is_empty() {
                        if current_column >= position.column {
                            tag_index = Some(index);
                            break;
                        }
                        self.flush_pending(&mut containing);
                    }
                    self.close_scope_ids.push(id);
                }
                Tag::Open(id) => self.open_scope_ids.push(id),
            }
        }

        self.tag_index = tag_index.unwrap_or(self.tags.len());
        self.position = Point::new(row, self.line_length.min(current_column));
        containing
    }

    fn move_to_successor(&mut self) -> bool {
        self.open_scope_ids.clear();
        self.close_scope_ids.clear();
        loop {
            if self.tag_index == self.tags.len() {
                if self.is_at_tag_boundary() {
                    break;
                }
                if !self.move_to_next_line() {
                    return false;
                }
                continue;
            }

            match Tag::decode(self.tags[self.tag_index]) {
                Tag::Text(len) => {
                    if self.is_at_tag_boundary() {
                        break;
                    }
                    let column = (self.position.column + len).min(self.line_length);
                    self.position = Point::new(self.position.row, column);
                }
                Tag::Close(id) => {
                    if !self.open_scope_ids.is_empty() {
                        break;
                    }
                    self.close_scope_ids.push(id);
                }
                Tag::Open(id) => self.open_scope_ids.push(id),
            }
            self.tag_index += 1;
        }
        true
    }

    fn position(&self) -> Point {
        self.position
    }

    fn close_scope_ids(&self) -> Vec<ScopeId> {
        self.close_scope_ids.clone()
    }

    fn open_scope_ids(&self) -> Vec<ScopeId> {
        self.open_scope_ids.clone()
    }
}
