use crate::grammar::compiler::{CompiledMatch, ContextId, MatchAction, YamlGrammar};
use crate::grammar::{Grammar, LineTokens};
use editor_display::{ScopeId, ScopeRegistry, ScopeSelector};
use onig::{Region, SearchOptions};
use std::sync::Arc;

/// The rule stack of a [`YamlGrammar`]: the contexts open at the end of a row, outermost first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextStack {
    frames: Vec<ContextId>,
}

impl ContextStack {
    /// Context ids, outermost first. Use [`YamlGrammar::context_name`] to name them.
    pub fn frames(&self) -> &[usize] {
        &self.frames
    }

    /// Number of open contexts.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

impl Grammar for YamlGrammar {
    type RuleStack = ContextStack;

    fn scope_name(&self) -> &str {
        self.scope()
    }

    fn registry(&self) -> &Arc<ScopeRegistry> {
        self.registry_handle()
    }

    fn tokenize_line(
        &self,
        text: &str,
        rule_stack: Option<&ContextStack>,
        first_line: bool,
    ) -> LineTokens<ContextStack> {
        LineTokenizer::new(self, text, rule_stack, first_line).run()
    }

    fn injection_selector(&self) -> Option<&ScopeSelector> {
        self.injection()
    }
}

// A scope instance: the id plus the serial of the frame, match or capture that opened it. Two
// adjacent instances of one scope id are closed and reopened rather than merged.
type Instance = (ScopeId, u32);

#[derive(Debug, Clone, Copy)]
struct Frame {
    context: ContextId,
    serial: u32,
}

struct Found<'g> {
    start: usize,
    end: usize,
    pattern: &'g CompiledMatch,
    region: Region,
}

struct LineTokenizer<'g, 'a> {
    grammar: &'g YamlGrammar,
    text: &'a str,
    haystack: String,
    first_line: bool,
    stack: Vec<Frame>,
    open: Vec<Instance>,
    tags: Vec<i32>,
    next_serial: u32,
}

// Serials below this are reserved for frames inherited from the previous row (depth + 1).
const FRESH_SERIAL_BASE: u32 = 1 << 20;

impl<'g, 'a> LineTokenizer<'g, 'a> {
    fn new(
        grammar: &'g YamlGrammar,
        text: &'a str,
        rule_stack: Option<&ContextStack>,
        first_line: bool,
    ) -> Self {
        let inherited = rule_stack.is_some();
        let frames = rule_stack
            .map(|s| s.frames.clone())
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| vec![grammar.main]);
        let stack: Vec<Frame> = frames
            .into_iter()
            .enumerate()
            .map(|(depth, context)| Frame {
                context,
                serial: depth as u32 + 1,
            })
            .collect();

        let mut tokenizer = Self {
            grammar,
            text,
            haystack: format!("{text}\n"),
            first_line,
            stack,
            open: Vec::new(),
            tags: Vec::new(),
            next_serial: FRESH_SERIAL_BASE,
        };
        if inherited {
            tokenizer.open = tokenizer.content_scopes(&tokenizer.stack);
        }
        tokenizer
    }

    fn run(mut self) -> LineTokens<ContextStack> {
        let len = self.text.len();
        let mut pos = 0usize;
        let mut iterations = 0usize;
        let max_iterations = (len + 1).saturating_mul(32).max(128);

        while pos <= len {
            iterations += 1;
            if iterations > max_iterations {
                tracing::warn!(
                    scope = %self.grammar.scope(),
                    column = pos,
                    "tokenizer exceeded its iteration limit; treating the rest of the row as text"
                );
                self.emit_content(pos, len);
                break;
            }

            let Some(found) = self.find_next_match(pos) else {
                self.emit_content(pos, len);
                break;
            };

            self.emit_content(pos, found.start);
            let depth_before = self.stack.len();
            let top_before = self.stack.last().map(|f| f.serial);
            self.apply_match(&found);
            pos = found.end;

            let unchanged = depth_before == self.stack.len()
                && top_before == self.stack.last().map(|f| f.serial);
            if found.start == found.end && unchanged {
                if pos >= len {
                    break;
                }
                let step = self.text[pos..]
                    .chars()
                    .next()
                    .map(char::len_utf8)
                    .unwrap_or(1);
                self.emit_content(pos, pos + step);
                pos += step;
            }
        }

        let target = self.content_scopes(&self.stack);
        self.transition(&target);

        LineTokens {
            tags: self.tags,
            rule_stack: ContextStack {
                frames: self.stack.iter().map(|f| f.context).collect(),
            },
        }
    }

    fn find_next_match(&self, from: usize) -> Option<Found<'g>> {
        let grammar: &'g YamlGrammar = self.grammar;
        let top = self.stack.last()?;
        let context = &grammar.contexts[top.context];

        let mut best: Option<Found<'g>> = None;
        for index in &context.patterns {
            let pattern = &grammar.patterns[*index];
            if pattern.document_start_only && (!self.first_line || from > 0) {
                continue;
            }
            let mut region = Region::new();
            let matched = pattern.regex.search_with_options(
                &self.haystack,
                from,
                self.haystack.len(),
                SearchOptions::SEARCH_OPTION_NONE,
                Some(&mut region),
            );
            if matched.is_none() {
                continue;
            }
            let Some((start, end)) = region.pos(0) else {
                continue;
            };
            let start = start.min(self.text.len());
            let end = end.min(self.text.len());

            // Earliest match wins; ties go to the first pattern in context order.
            if best.as_ref().is_none_or(|b| start < b.start) {
                best = Some(Found {
                    start,
                    end,
                    pattern,
                    region,
                });
            }
        }
        best
    }

    fn apply_match(&mut self, found: &Found<'g>) {
        let pattern = found.pattern;
        match &pattern.action {
            MatchAction::None => {
                let base = self.content_scopes(&self.stack);
                self.emit_match(found, base);
            }
            MatchAction::Push(contexts) => {
                let pushed = self.fresh_frames(contexts);
                let mut frames = self.stack.clone();
                let (last, rest) = split_last(&pushed);
                frames.extend_from_slice(rest);
                let mut base = self.content_scopes(&frames);
                if let Some(last) = last {
                    base.extend(self.meta_scopes(last));
                }
                self.emit_match(found, base);
                self.stack.extend(pushed);
            }
            MatchAction::Set(contexts) => {
                let pushed = self.fresh_frames(contexts);
                let keep = self.stack.len().saturating_sub(1);
                let mut frames = self.stack[..keep].to_vec();
                let (last, rest) = split_last(&pushed);
                frames.extend_from_slice(rest);
                let mut base = self.content_scopes(&frames);
                if let Some(last) = last {
                    base.extend(self.meta_scopes(last));
                }
                self.emit_match(found, base);
                self.stack.truncate(keep);
                self.stack.extend(pushed);
            }
            MatchAction::Pop(count) => {
                // The main context is never popped.
                let count = (*count).min(self.stack.len().saturating_sub(1));
                if count == 0 {
                    let base = self.content_scopes(&self.stack);
                    self.emit_match(found, base);
                    return;
                }
                let keep = self.stack.len() - count;
                let mut base = self.content_scopes(&self.stack[..keep]);
                base.extend(self.meta_scopes(&self.stack[keep]));
                self.emit_match(found, base);
                self.stack.truncate(keep);
            }
        }
    }

    fn fresh_frames(&mut self, contexts: &[ContextId]) -> Vec<Frame> {
        contexts
            .iter()
            .map(|context| Frame {
                context: *context,
                serial: self.fresh_serial(),
            })
            .collect()
    }

    fn fresh_serial(&mut self) -> u32 {
        let serial = self.next_serial;
        self.next_serial = self.next_serial.wrapping_add(1).max(FRESH_SERIAL_BASE);
        serial
    }

    /// Emit the matched text split by its captures. `base` are the scopes enclosing the match.
    fn emit_match(&mut self, found: &Found<'g>, mut base: Vec<Instance>) {
        if found.start == found.end {
            return;
        }
        let serial = self.fresh_serial();
        base.extend(found.pattern.scope.iter().map(|id| (*id, serial)));

        let mut captures: Vec<(usize, usize, Vec<Instance>)> = Vec::new();
        for (group, scopes) in &found.pattern.captures {
            let Some((start, end)) = found.region.pos(*group) else {
                continue;
            };
            let start = start.clamp(found.start, found.end);
            let end = end.clamp(found.start, found.end);
            if start >= end {
                continue;
            }
            let serial = self.fresh_serial();
            captures.push((start, end, scopes.iter().map(|id| (*id, serial)).collect()));
        }
        captures.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

        let mut cuts = vec![found.start, found.end];
        for (start, end, _) in &captures {
            cuts.push(*start);
            cuts.push(*end);
        }
        cuts.sort_unstable();
        cuts.dedup();

        for window in cuts.windows(2) {
            let (from, to) = (window[0], window[1]);
            let mut target = base.clone();
            for (start, end, scopes) in &captures {
                if *start <= from && to <= *end {
                    target.extend_from_slice(scopes);
                }
            }
            self.transition(&target);
            self.push_text(from, to);
        }
    }

    fn emit_content(&mut self, from: usize, to: usize) {
        if from >= to {
            return;
        }
        let target = self.content_scopes(&self.stack);
        self.transition(&target);
        self.push_text(from, to);
    }

    /// Close and open scopes until the open list equals `target`.
    fn transition(&mut self, target: &[Instance]) {
        let common = self
            .open
            .iter()
            .zip(target)
            .take_while(|(a, b)| a == b)
            .count();
        while self.open.len() > common {
            if let Some((id, _)) = self.open.pop() {
                self.push_tag(id.close_tag());
            }
        }
        for instance in &target[common..] {
            self.push_tag(instance.0.open_tag());
            self.open.push(*instance);
        }
    }

    fn push_tag(&mut self, tag: i32) {
        // An open immediately followed by its close carries no text.
        if tag < 0
            && tag % 2 == 0
            && self.tags.last() == Some(&(tag + 1))
        {
            self.tags.pop();
            return;
        }
        self.tags.push(tag);
    }

    fn push_text(&mut self, from: usize, to: usize) {
        let chars = self.text[from..to].chars().count() as i32;
        if chars == 0 {
            return;
        }
        match self.tags.last_mut() {
            Some(last) if *last >= 0 => *last += chars,
            _ => self.tags.push(chars),
        }
    }

    fn content_scopes(&self, frames: &[Frame]) -> Vec<Instance> {
        let mut out = vec![(self.grammar.root, 0)];
        for frame in frames {
            let context = &self.grammar.contexts[frame.context];
            out.extend(context.meta_scope.iter().map(|id| (*id, frame.serial)));
            out.extend(
                context
                    .meta_content_scope
                    .iter()
                    .map(|id| (*id, frame.serial)),
            );
        }
        out
    }

    fn meta_scopes(&self, frame: &Frame) -> Vec<Instance> {
        self.grammar.contexts[frame.context]
            .meta_scope
            .iter()
            .map(|id| (*id, frame.serial))
            .collect()
    }
}

fn split_last(frames: &[Frame]) -> (Option<&Frame>, &[Frame]) {
    match frames.split_last() {
        Some((last, rest)) => (Some(last), rest),
        None => (None, &[]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use editor_display::Tag;

    fn grammar(source: &str) -> YamlGrammar {
        YamlGrammar::from_yaml(source).unwrap()
    }

    fn describe(grammar: &YamlGrammar, tags: &[i32]) -> Vec<String> {
        let registry = grammar.registry();
        tags.iter()
            .map(|tag| match Tag::decode(*tag) {
                Tag::Text(n) => n.to_string(),
                Tag::Open(id) => format!("+{}", registry.scope_for_id(id).unwrap_or("?")),
                Tag::Close(id) => format!("-{}", registry.scope_for_id(id).unwrap_or("?")),
            })
            .collect()
    }

    const STRINGS: &str = r#"
scope: source.demo
contexts:
  main:
    - match: '"'
      scope: punctuation.begin.demo
      push: string
    - match: '\d+'
      scope: constant.numeric.demo
  string:
    - meta_scope: string.quoted.demo
    - match: '"'
      scope: punctuation.end.demo
      pop: true
"#;

    #[test]
    fn test_first_row_opens_root_scope() {
        let grammar = grammar(STRINGS);
        let line = grammar.tokenize_line("x 1", None, true);
        assert_eq!(
            describe(&grammar, &line.tags),
            vec!["+source.demo", "2", "+constant.numeric.demo", "1", "-constant.numeric.demo"]
        );
        assert_eq!(line.rule_stack.depth(), 1);
    }

    #[test]
    fn test_adjacent_strings_are_separate_scopes() {
        let grammar = grammar(STRINGS);
        let line = grammar.tokenize_line("\"a\"\"b\"", None, true);
        let opens = line
            .tags
            .iter()
            .filter(|t| **t < 0 && **t % 2 != 0)
            .filter(|t| {
                matches!(Tag::decode(**t), Tag::Open(id)
                    if grammar.registry().scope_for_id(id) == Some("string.quoted.demo"))
            })
            .count();
        assert_eq!(opens, 2);
    }

    #[test]
    fn test_unterminated_string_continues_on_next_row() {
        let grammar = grammar(STRINGS);
        let first = grammar.tokenize_line("\"ab", None, true);
        assert_eq!(first.rule_stack.depth(), 2);
        let second = grammar.tokenize_line("c\" 2", Some(&first.rule_stack), false);
        assert_eq!(
            describe(&grammar, &second.tags),
            vec![
                "1",
                "+punctuation.end.demo",
                "1",
                "-punctuation.end.demo",
                "-string.quoted.demo",
                "1",
                "+constant.numeric.demo",
                "1",
                "-constant.numeric.demo",
            ]
        );
        assert_eq!(second.rule_stack.depth(), 1);
    }

    #[test]
    fn test_zero_width_patterns_make_progress() {
        let grammar = grammar(
            r#"
scope: source.demo
contexts:
  main:
    - match: '(?=x)'
    - match: 'y'
      scope: keyword.demo
"#,
        );
        let line = grammar.tokenize_line("xxy", None, true);
        assert_eq!(
            describe(&grammar, &line.tags),
            vec!["+source.demo", "2", "+keyword.demo", "1", "-keyword.demo"]
        );
    }

    #[test]
    fn test_captures_nest_inside_match_scope() {
        let grammar = grammar(
            r#"
scope: source.demo
contexts:
  main:
    - match: '(\w+)(\()'
      scope: meta.call.demo
      captures:
        1: entity.name.function.demo
        2: punctuation.demo
"#,
        );
        let line = grammar.tokenize_line("f(", None, true);
        assert_eq!(
            describe(&grammar, &line.tags),
            vec![
                "+source.demo",
                "+meta.call.demo",
                "+entity.name.function.demo",
                "1",
                "-entity.name.function.demo",
                "+punctuation.demo",
                "1",
                "-punctuation.demo",
                "-meta.call.demo",
            ]
        );
    }
}
