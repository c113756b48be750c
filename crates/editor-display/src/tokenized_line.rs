//! Tokenized lines and their token iterator.
//!
//! A [`TokenizedLine`] is one buffer row decomposed into a tag sequence (see [`crate::scope`]):
//! non-negative tags are text runs measured in chars, negative tags open or close scopes. The
//! positive tags of a line always sum to the row's length.

use crate::line_ending::LineEnding;
use crate::scope::{ScopeId, ScopeRegistry, Tag};
use std::sync::Arc;

/// A run of text and the scopes that apply to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Token text.
    pub value: String,
    /// Scope names, outermost first.
    pub scopes: Vec<String>,
}

/// One row of tokenized text.
#[derive(Debug, Clone)]
pub struct TokenizedLine {
    text: String,
    tags: Vec<i32>,
    open_scopes: Vec<ScopeId>,
    line_ending: LineEnding,
    registry: Arc<ScopeRegistry>,
}

impl TokenizedLine {
    /// Build a line from tokenizer output.
    ///
    /// `open_scopes` are the scopes inherited from the previous row.
    pub fn new(
        text: impl Into<String>,
        tags: Vec<i32>,
        open_scopes: Vec<ScopeId>,
        line_ending: LineEnding,
        registry: Arc<ScopeRegistry>,
    ) -> Self {
        Self {
            text: text.into(),
            tags,
            open_scopes,
            line_ending,
            registry,
        }
    }

    /// A single-token line wrapped in `root`, used before a row is tokenized and when
    /// tokenization is skipped altogether.
    pub fn placeholder(
        text: impl Into<String>,
        root: ScopeId,
        line_ending: LineEnding,
        registry: Arc<ScopeRegistry>,
    ) -> Self {
        let text = text.into();
        let len = text.chars().count() as i32;
        Self::new(
            text,
            vec![root.open_tag(), len, root.close_tag()],
            Vec::new(),
            line_ending,
            registry,
        )
    }

    /// A line with no tags at all.
    pub fn untagged(text: impl Into<String>, line_ending: LineEnding, registry: Arc<ScopeRegistry>) -> Self {
        Self::new(text, Vec::new(), Vec::new(), line_ending, registry)
    }

    /// Row text without terminator.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Raw tag sequence.
    pub fn tags(&self) -> &[i32] {
        &self.tags
    }

    /// Scopes inherited from the previous row.
    pub fn open_scopes(&self) -> &[ScopeId] {
        &self.open_scopes
    }

    /// The row terminator.
    pub fn line_ending(&self) -> LineEnding {
        self.line_ending
    }

    /// The registry used to name scope ids.
    pub fn registry(&self) -> &Arc<ScopeRegistry> {
        &self.registry
    }

    /// Start iterating tokens.
    pub fn token_iterator(&self) -> TokenIterator<'_> {
        TokenIterator::new(self)
    }

    /// Scope ids still open at the end of the row.
    pub fn scopes_at_end(&self) -> Vec<ScopeId> {
        scopes_from_tags(&self.open_scopes, &self.tags)
    }

    /// All tokens of the row.
    pub fn tokens(&self) -> Vec<Token> {
        let mut out = Vec::new();
        let mut iter = self.token_iterator();
        while iter.next() {
            out.push(Token {
                value: iter.text().to_string(),
                scopes: iter.scopes(),
            });
        }
        out
    }

    /// Index of the token covering `column`; past the end this is the last token.
    pub fn token_index_at_buffer_column(&self, column: usize) -> Option<usize> {
        let mut end = 0usize;
        let mut count = 0usize;
        for tag in &self.tags {
            if let Tag::Text(len) = Tag::decode(*tag) {
                end += len;
                if end > column {
                    return Some(count);
                }
                count += 1;
            }
        }
        count.checked_sub(1)
    }

    /// The token covering `column`.
    pub fn token_at_buffer_column(&self, column: usize) -> Option<Token> {
        let index = self.token_index_at_buffer_column(column)?;
        self.tokens().into_iter().nth(index)
    }

    /// Start column of the token covering `column`.
    pub fn token_start_column_for_buffer_column(&self, column: usize) -> usize {
        let mut start = 0usize;
        for tag in &self.tags {
            if let Tag::Text(len) = Tag::decode(*tag) {
                let next = start + len;
                if next > column {
                    break;
                }
                start = next;
            }
        }
        start
    }

    /// Scope ids applying at `column`.
    ///
    /// Scans to the first token whose end exceeds `column`. When the scan runs off the end of the
    /// row, the scopes closed by the final boundary are re-appended so that a position at the end
    /// of a row still reports its innermost scope.
    pub fn scope_ids_at_column(&self, column: usize) -> Vec<ScopeId> {
        let mut iter = self.token_iterator();
        while iter.next() {
            if iter.buffer_end() > column {
                return iter.scope_ids().to_vec();
            }
        }
        let mut scopes = iter.scope_ids().to_vec();
        scopes.extend(iter.scope_end_ids().iter().rev());
        scopes
    }

    /// Returns true when the row belongs to a comment: a comment scope is inherited from the
    /// previous row, or opens before the first non-whitespace text.
    pub fn is_comment(&self) -> bool {
        if self
            .open_scopes
            .iter()
            .any(|id| self.is_comment_scope_id(*id))
        {
            return true;
        }

        let mut chars = self.text.chars();
        for tag in &self.tags {
            match Tag::decode(*tag) {
                Tag::Text(len) => {
                    let run: String = chars.by_ref().take(len).collect();
                    if !run.chars().all(char::is_whitespace) {
                        return false;
                    }
                }
                Tag::Open(id) if self.is_comment_scope_id(id) => return true,
                _ => {}
            }
        }
        false
    }

    fn is_comment_scope_id(&self, id: ScopeId) -> bool {
        self.registry
            .scope_for_id(id)
            .is_some_and(is_comment_scope)
    }
}

/// Returns true if a scope name contains `comment` as a word (`_` counts as a separator).
pub fn is_comment_scope(scope: &str) -> bool {
    let is_word = |c: char| c.is_alphanumeric();
    scope.match_indices("comment").any(|(at, m)| {
        let before = scope[..at].chars().next_back();
        let after = scope[at + m.len()..].chars().next();
        !before.is_some_and(is_word) && !after.is_some_and(is_word)
    })
}

/// Replays `tags` on top of `open`, returning the scopes open afterwards.
///
/// A close tag pops back to its matching open scope; unmatched closes are ignored.
pub fn scopes_from_tags(open: &[ScopeId], tags: &[i32]) -> Vec<ScopeId> {
    let mut scopes = open.to_vec();
    for tag in tags {
        match Tag::decode(*tag) {
            Tag::Open(id) => scopes.push(id),
            Tag::Close(id) => {
                if let Some(pos) = scopes.iter().rposition(|s| *s == id) {
                    scopes.truncate(pos);
                }
            }
            Tag::Text(_) => {}
        }
    }
    scopes
}

/// Cursor over the tokens of a [`TokenizedLine`].
///
/// Call [`TokenIterator::next`] before reading; each successful call positions the iterator on
/// the next text token and records the scopes that opened and closed since the previous token.
#[derive(Debug)]
pub struct TokenIterator<'a> {
    line: &'a TokenizedLine,
    index: Option<usize>,
    start_column: usize,
    end_column: usize,
    start_byte: usize,
    end_byte: usize,
    scopes: Vec<ScopeId>,
    scope_starts: Vec<ScopeId>,
    scope_ends: Vec<ScopeId>,
}

impl<'a> TokenIterator<'a> {
    fn new(line: &'a TokenizedLine) -> Self {
        Self {
            line,
            index: None,
            start_column: 0,
            end_column: 0,
            start_byte: 0,
            end_byte: 0,
            scopes: line.open_scopes.clone(),
            scope_starts: line.open_scopes.clone(),
            scope_ends: Vec::new(),
        }
    }

    /// Advance to the next text token. Returns false at the end of the row.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> bool {
        let tags = &self.line.tags;
        let mut index = match self.index {
            Some(i) => {
                self.start_column = self.end_column;
                self.start_byte = self.end_byte;
                self.scope_starts.clear();
                self.scope_ends.clear();
                i + 1
            }
            None => 0,
        };

        while index < tags.len() {
            match Tag::decode(tags[index]) {
                Tag::Close(id) => {
                    if self.scope_starts.last() == Some(&id) {
                        self.scope_starts.pop();
                    } else {
                        self.scope_ends.push(id);
                    }
                    self.scopes.pop();
                }
                Tag::Open(id) => {
                    self.scope_starts.push(id);
                    self.scopes.push(id);
                }
                Tag::Text(len) => {
                    self.end_column += len;
                    let rest = &self.line.text[self.start_byte..];
                    self.end_byte = self.start_byte
                        + rest
                            .char_indices()
                            .nth(len)
                            .map(|(i, _)| i)
                            .unwrap_or(rest.len());
                    self.index = Some(index);
                    return true;
                }
            }
            index += 1;
        }
        self.index = Some(index);
        false
    }

    /// Scope ids applying to the current token.
    pub fn scope_ids(&self) -> &[ScopeId] {
        &self.scopes
    }

    /// Scope names applying to the current token.
    pub fn scopes(&self) -> Vec<String> {
        self.line.registry.names_for_ids(&self.scopes)
    }

    /// Scope ids opened right before the current token.
    pub fn scope_start_ids(&self) -> &[ScopeId] {
        &self.scope_starts
    }

    /// Scope names opened right before the current token.
    pub fn scope_starts(&self) -> Vec<String> {
        self.line.registry.names_for_ids(&self.scope_starts)
    }

    /// Scope ids closed right before the current token.
    pub fn scope_end_ids(&self) -> &[ScopeId] {
        &self.scope_ends
    }

    /// Scope names closed right before the current token.
    pub fn scope_ends(&self) -> Vec<String> {
        self.line.registry.names_for_ids(&self.scope_ends)
    }

    /// Start column of the current token.
    pub fn buffer_start(&self) -> usize {
        self.start_column
    }

    /// End column of the current token.
    pub fn buffer_end(&self) -> usize {
        self.end_column
    }

    /// Text of the current token.
    pub fn text(&self) -> &'a str {
        let line: &'a TokenizedLine = self.line;
        line.text.get(self.start_byte..self.end_byte).unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn registry() -> (Arc<ScopeRegistry>, ScopeId, ScopeId, ScopeId) {
        let mut r = ScopeRegistry::new();
        let source = r.register("source.js");
        let string = r.register("string.quoted.js");
        let comment = r.register("comment.line.js");
        (Arc::new(r), source, string, comment)
    }

    #[test]
    fn test_tokens_carry_full_scope_stack() {
        let (r, source, string, _) = registry();
        let line = TokenizedLine::new(
            "a = 'b'",
            vec![
                source.open_tag(),
                4,
                string.open_tag(),
                3,
                string.close_tag(),
                source.close_tag(),
            ],
            Vec::new(),
            LineEnding::None,
            r,
        );
        let tokens = line.tokens();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].value, "a = ");
        assert_eq!(tokens[0].scopes, vec!["source.js"]);
        assert_eq!(tokens[1].value, "'b'");
        assert_eq!(tokens[1].scopes, vec!["source.js", "string.quoted.js"]);
    }

    #[test]
    fn test_column_lookup() {
        let (r, source, string, _) = registry();
        let line = TokenizedLine::new(
            "ab'cd'",
            vec![source.open_tag(), 2, string.open_tag(), 4, string.close_tag(), source.close_tag()],
            Vec::new(),
            LineEnding::None,
            r,
        );
        assert_eq!(line.token_index_at_buffer_column(1), Some(0));
        assert_eq!(line.token_index_at_buffer_column(2), Some(1));
        assert_eq!(line.token_index_at_buffer_column(99), Some(1));
        assert_eq!(line.token_start_column_for_buffer_column(4), 2);
        assert_eq!(line.token_at_buffer_column(3).unwrap().value, "'cd'");
    }

    #[test]
    fn test_scopes_at_end_of_row_include_closed_scopes() {
        let (r, source, string, _) = registry();
        let line = TokenizedLine::new(
            "x'y'",
            vec![source.open_tag(), 1, string.open_tag(), 3, string.close_tag(), source.close_tag()],
            Vec::new(),
            LineEnding::None,
            r,
        );
        assert_eq!(line.scope_ids_at_column(2), vec![source, string]);
        assert_eq!(line.scope_ids_at_column(4), vec![source, string]);
    }

    #[test]
    fn test_iterator_reports_scope_boundaries() {
        let (r, source, string, _) = registry();
        let line = TokenizedLine::new(
            "'a'b",
            vec![source.open_tag(), string.open_tag(), 3, string.close_tag(), 1, source.close_tag()],
            Vec::new(),
            LineEnding::None,
            r,
        );
        let mut it = line.token_iterator();
        assert!(it.next());
        assert_eq!(it.scope_starts(), vec!["source.js", "string.quoted.js"]);
        assert!(it.next());
        assert_eq!(it.scope_ends(), vec!["string.quoted.js"]);
        assert_eq!((it.buffer_start(), it.buffer_end()), (3, 4));
        assert_eq!(it.text(), "b");
        assert!(!it.next());
    }

    #[test]
    fn test_comment_detection() {
        let (r, source, _, comment) = registry();
        let commented = TokenizedLine::new(
            "  // hi",
            vec![source.open_tag(), 2, comment.open_tag(), 5, comment.close_tag(), source.close_tag()],
            Vec::new(),
            LineEnding::None,
            r.clone(),
        );
        assert!(commented.is_comment());

        let trailing = TokenizedLine::new(
            "x // hi",
            vec![source.open_tag(), 2, comment.open_tag(), 5, comment.close_tag(), source.close_tag()],
            Vec::new(),
            LineEnding::None,
            r.clone(),
        );
        assert!(!trailing.is_comment());

        let inherited = TokenizedLine::new("still", vec![5], vec![source, comment], LineEnding::None, r);
        assert!(inherited.is_comment());
    }

    #[test]
    fn test_comment_scope_names() {
        assert!(is_comment_scope("comment.block.js"));
        assert!(is_comment_scope("punctuation.definition.comment.js"));
        assert!(is_comment_scope("line_comment"));
        assert!(!is_comment_scope("commentary.js"));
    }

    #[test]
    fn test_placeholder_tag_lengths_sum_to_text() {
        let (r, source, _, _) = registry();
        let line = TokenizedLine::placeholder("héllo", source, LineEnding::Lf, r);
        let sum: i32 = line.tags().iter().filter(|t| **t >= 0).sum();
        assert_eq!(sum as usize, line.text().chars().count());
    }
}
