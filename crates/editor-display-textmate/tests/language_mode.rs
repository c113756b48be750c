use std::sync::{Arc, Mutex};

use editor_display::{
    BufferText, EditorSettings, HighlightIterator, INFINITY, LanguageMode, LanguageModeEvent,
    LanguageModeId, Point, Range, ScopedSettings, Workspace,
};
use editor_display::config::{COMMENT_START, DECREASE_INDENT_PATTERN, FOLD_END_PATTERN, INCREASE_INDENT_PATTERN};
use editor_display::workspace::LanguageModeFactory;
use editor_display_textmate::{
    LARGE_FILE_THRESHOLD, TextMateLanguageMode, TextMateOptions, YamlGrammar,
};
use pretty_assertions::assert_eq;

fn javascript() -> Arc<YamlGrammar> {
    Arc::new(YamlGrammar::from_yaml(include_str!("fixtures/javascript.yaml")).unwrap())
}

fn js_settings() -> ScopedSettings {
    let mut settings = ScopedSettings::with_defaults();
    settings.set(".source.js", INCREASE_INDENT_PATTERN, r"\{\s*$");
    settings.set(".source.js", DECREASE_INDENT_PATTERN, r"^\s*\}");
    settings.set(".source.js", COMMENT_START, "// ");
    settings
}

fn mode_with(text: &BufferText, settings: ScopedSettings) -> TextMateLanguageMode {
    TextMateLanguageMode::new(
        LanguageModeId::from_raw(1),
        Some(javascript()),
        text,
        Arc::new(settings),
    )
}

fn tokenized(text: &BufferText) -> TextMateLanguageMode {
    let mut mode = mode_with(text, js_settings());
    while mode.tokenize_next_chunk(text) {}
    mode
}

fn record_events(mode: &mut TextMateLanguageMode) -> Arc<Mutex<Vec<LanguageModeEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    mode.subscribe(Box::new(move |event| sink.lock().unwrap().push(event.clone())));
    events
}

fn scopes_at(mode: &TextMateLanguageMode, text: &BufferText, row: usize, column: usize) -> Vec<String> {
    mode.scope_descriptor_for_position(text, Point::new(row, column))
        .scopes_array()
        .to_vec()
}

#[test]
fn test_tokenizes_in_chunks() {
    let source = vec!["var a"; 120].join("\n");
    let text = BufferText::from_text(&source);
    let mut mode = mode_with(&text, js_settings());
    let events = record_events(&mut mode);

    assert!(!mode.is_fully_tokenized());
    assert!(mode.has_pending_work());
    assert_eq!(mode.invalid_rows(), [0]);

    assert!(mode.tokenize_next_chunk(&text));
    assert!(mode.is_row_tokenized(49));
    assert!(!mode.is_row_tokenized(50));
    assert!(mode.tokenize_next_chunk(&text));
    assert!(!mode.tokenize_next_chunk(&text));
    assert!(mode.is_fully_tokenized());
    assert!(!mode.has_pending_work());

    let events = events.lock().unwrap();
    assert_eq!(
        *events,
        vec![
            LanguageModeEvent::DidChangeHighlighting {
                range: Range::new((0, 0), (50, 0))
            },
            LanguageModeEvent::DidChangeHighlighting {
                range: Range::new((50, 0), (100, 0))
            },
            LanguageModeEvent::DidChangeHighlighting {
                range: Range::new((100, 0), (120, 0))
            },
            LanguageModeEvent::DidTokenize,
        ]
    );
}

#[test]
fn test_chunk_size_is_configurable() {
    let text = BufferText::from_text("a\nb\nc\nd\ne");
    let mut mode = TextMateLanguageMode::new_with_options(
        LanguageModeId::from_raw(1),
        Some(javascript()),
        &text,
        Arc::new(js_settings()),
        TextMateOptions {
            chunk_size: 2,
            large_file_mode: None,
        },
    );
    let mut slices = 1;
    while mode.tokenize_next_chunk(&text) {
        slices += 1;
    }
    assert_eq!(slices, 3);
}

#[test]
fn test_untokenized_rows_read_as_placeholders() {
    let text = BufferText::from_text("var a\n// b");
    let mode = mode_with(&text, js_settings());
    let line = mode.tokenized_line_for_row(&text, 1);
    assert_eq!(line.tokens().len(), 1);
    assert_eq!(line.tokens()[0].scopes, vec!["source.js"]);
    assert!(!mode.is_row_commented(&text, 1));
}

#[test]
fn test_edit_that_opens_a_string_spills_into_following_rows() {
    let mut text = BufferText::from_text("var a = 1\nx\ny\nz");
    let mut mode = tokenized(&text);
    let events = record_events(&mut mode);
    assert_eq!(scopes_at(&mode, &text, 2, 0), vec!["source.js"]);

    let change = text.set_text_in_range(Range::new((0, 8), (0, 8)), "\"");
    mode.buffer_did_change(&text, &change);
    assert_eq!(mode.invalid_rows(), [1]);
    assert!(!mode.is_fully_tokenized());
    // Rows below the edit keep their old tokenization until background work runs.
    assert_eq!(scopes_at(&mode, &text, 2, 0), vec!["source.js"]);

    assert!(!mode.tokenize_next_chunk(&text));
    assert!(mode.is_fully_tokenized());
    assert_eq!(
        scopes_at(&mode, &text, 2, 0),
        vec!["source.js", "string.quoted.double.js"]
    );
    assert_eq!(
        *events.lock().unwrap(),
        vec![LanguageModeEvent::DidChangeHighlighting {
            range: Range::new((1, 0), (4, 0))
        }]
    );
}

#[test]
fn test_edit_that_keeps_the_rule_stack_does_not_spill() {
    let mut text = BufferText::from_text("var a = 1\nx\ny");
    let mut mode = tokenized(&text);
    let change = text.set_text_in_range(Range::new((0, 9), (0, 9)), "2");
    mode.buffer_did_change(&text, &change);
    assert!(mode.invalid_rows().is_empty());
    assert!(mode.is_fully_tokenized());
    assert_eq!(
        scopes_at(&mode, &text, 0, 8),
        vec!["source.js", "constant.numeric.js"]
    );
}

#[test]
fn test_inserted_rows_shift_invalid_rows() {
    let source = vec!["x"; 80].join("\n");
    let mut text = BufferText::from_text(&source);
    let mut mode = mode_with(&text, js_settings());
    assert!(mode.tokenize_next_chunk(&text));
    assert_eq!(mode.invalid_rows(), [50]);

    let change = text.set_text_in_range(Range::new((10, 0), (10, 0)), "a\nb\n");
    mode.buffer_did_change(&text, &change);
    assert_eq!(mode.invalid_rows(), [52]);
    assert!(mode.is_row_tokenized(12));

    while mode.tokenize_next_chunk(&text) {}
    assert!(mode.is_row_tokenized(81));
}

#[test]
fn test_null_grammar_is_immediately_complete() {
    let text = BufferText::from_text("a\nb");
    let mut mode = TextMateLanguageMode::<YamlGrammar>::new(
        LanguageModeId::from_raw(1),
        None,
        &text,
        Arc::new(ScopedSettings::with_defaults()),
    );
    assert!(mode.is_fully_tokenized());
    assert!(!mode.has_pending_work());
    assert!(!mode.tokenize_next_chunk(&text));
    assert_eq!(
        mode.root_scope_descriptor().scopes_array(),
        ["text.plain.null-grammar"]
    );
    assert_eq!(
        mode.tokenized_line_for_row(&text, 1).tokens()[0].scopes,
        vec!["text.plain.null-grammar"]
    );
    assert!(mode.foldable_ranges(&text, 2).is_empty());
}

#[test]
fn test_large_files_skip_tokenization() {
    let text = BufferText::from_text(&"a".repeat(LARGE_FILE_THRESHOLD));
    let mode = mode_with(&text, js_settings());
    assert!(mode.is_large_file_mode());
    assert!(mode.is_fully_tokenized());
    assert!(!mode.has_pending_work());

    let mut text = BufferText::from_text("var a");
    let mut mode = TextMateLanguageMode::new_with_options(
        LanguageModeId::from_raw(1),
        Some(javascript()),
        &text,
        Arc::new(js_settings()),
        TextMateOptions {
            large_file_mode: Some(true),
            ..TextMateOptions::default()
        },
    );
    let change = text.set_text_in_range(Range::new((0, 5), (0, 5)), "\nvar b");
    mode.buffer_did_change(&text, &change);
    assert!(!mode.is_row_tokenized(0));
    assert_eq!(scopes_at(&mode, &text, 1, 0), vec!["source.js"]);
}

#[test]
fn test_highlight_iterator_walks_boundaries() {
    let text = BufferText::from_text("var x\n1");
    let mode = tokenized(&text);
    let names = |ids: Vec<editor_display::ScopeId>| -> Vec<String> {
        ids.into_iter().filter_map(|id| mode.scope_name_for_id(id)).collect()
    };

    let mut iterator = mode.build_highlight_iterator(&text);
    assert!(iterator.seek(Point::new(0, 0)).is_empty());
    assert_eq!(iterator.position(), Point::new(0, 0));
    assert_eq!(names(iterator.open_scope_ids()), vec!["source.js", "keyword.control.js"]);

    assert!(iterator.move_to_successor());
    assert_eq!(iterator.position(), Point::new(0, 3));
    assert_eq!(names(iterator.close_scope_ids()), vec!["keyword.control.js"]);
    assert!(iterator.open_scope_ids().is_empty());

    assert!(iterator.move_to_successor());
    assert_eq!(iterator.position(), Point::new(1, 0));
    assert_eq!(names(iterator.open_scope_ids()), vec!["constant.numeric.js"]);

    assert!(iterator.move_to_successor());
    assert_eq!(iterator.position(), Point::new(1, 1));
    assert_eq!(names(iterator.close_scope_ids()), vec!["constant.numeric.js"]);

    assert!(!iterator.move_to_successor());

    let containing = iterator.seek(Point::new(0, 4));
    assert_eq!(names(containing), vec!["source.js"]);
    assert_eq!(iterator.position(), Point::new(0, 5));
}

#[test]
fn test_scope_queries() {
    let text = BufferText::from_text("x = \"ab\" + 1");
    let mode = tokenized(&text);

    assert_eq!(
        scopes_at(&mode, &text, 0, 5),
        vec!["source.js", "string.quoted.double.js"]
    );
    assert_eq!(
        scopes_at(&mode, &text, 0, 4),
        vec![
            "source.js",
            "string.quoted.double.js",
            "punctuation.definition.string.begin.js"
        ]
    );
    assert_eq!(
        mode.buffer_range_for_scope_at_position(&text, "string.quoted", Point::new(0, 6)),
        Some(Range::new((0, 4), (0, 8)))
    );
    assert_eq!(
        mode.buffer_range_for_scope_at_position(&text, "string.quoted", Point::new(0, 3)),
        None
    );

    let token = mode.token_for_position(&text, Point::new(0, 6)).unwrap();
    assert_eq!(token.value, "ab");
    assert_eq!(
        mode.token_start_position_for_position(&text, Point::new(0, 6)),
        Point::new(0, 5)
    );
    assert_eq!(
        mode.comment_strings_for_position(&text, Point::new(0, 0)).comment_start.as_deref(),
        Some("// ")
    );
    assert!(mode.non_word_characters(&text, Point::new(0, 0)).contains('('));
}

#[test]
fn test_comment_rows_fold_together() {
    let text = BufferText::from_text("/* a\n b */\nx");
    let mode = tokenized(&text);
    assert!(mode.is_row_commented(&text, 0));
    assert!(mode.is_row_commented(&text, 1));
    assert!(!mode.is_row_commented(&text, 2));
    assert!(mode.is_foldable_at_row(&text, 0));
    assert!(!mode.is_foldable_at_row(&text, 1));
    assert_eq!(
        mode.foldable_ranges(&text, 2),
        vec![Range::new((0, INFINITY), (1, INFINITY))]
    );
}

const NESTED: &str = "function f() {\n  if (x) {\n    return 1\n  }\n}";

#[test]
fn test_indentation_folds() {
    let text = BufferText::from_text(NESTED);
    let mode = tokenized(&text);

    assert_eq!(
        mode.foldable_ranges(&text, 2),
        vec![
            Range::new((0, INFINITY), (3, INFINITY)),
            Range::new((1, INFINITY), (2, INFINITY)),
        ]
    );
    assert_eq!(
        mode.foldable_ranges_at_indent_level(&text, 1, 2),
        vec![Range::new((1, INFINITY), (2, INFINITY))]
    );
    assert!(mode.is_foldable_at_row(&text, 0));
    assert!(!mode.is_foldable_at_row(&text, 2));
    assert_eq!(
        mode.foldable_range_containing_point(&text, Point::new(2, 3), 2),
        Some(Range::new((1, INFINITY), (2, INFINITY)))
    );
    assert_eq!(
        mode.foldable_range_containing_point(&text, Point::new(1, 10), 2),
        Some(Range::new((1, INFINITY), (2, INFINITY)))
    );
}

#[test]
fn test_fold_end_pattern_extends_folds() {
    let text = BufferText::from_text(NESTED);
    let mut settings = js_settings();
    settings.set(".source.js", FOLD_END_PATTERN, r"^\s*\}");
    let mut mode = mode_with(&text, settings);
    while mode.tokenize_next_chunk(&text) {}

    assert_eq!(
        mode.foldable_ranges(&text, 2),
        vec![
            Range::new((0, INFINITY), (4, INFINITY)),
            Range::new((1, INFINITY), (3, INFINITY)),
        ]
    );
}

#[test]
fn test_suggested_indentation() {
    let text = BufferText::from_text("function f() {\n\n  x\n");
    let mode = tokenized(&text);
    assert_eq!(mode.suggested_indent_for_buffer_row(&text, 1, 2, true), 1.0);
    assert_eq!(mode.suggested_indent_for_line_at_buffer_row(&text, 3, "}", 2), 0.0);

    let text = BufferText::from_text("if (a) {\n    }");
    let mode = tokenized(&text);
    assert_eq!(mode.suggested_indent_for_edited_buffer_row(&text, 1, 2), Some(0.0));
    assert_eq!(mode.suggested_indent_for_edited_buffer_row(&text, 0, 2), None);
}

#[test]
fn test_commented_rows_do_not_increase_indentation() {
    let text = BufferText::from_text("// {\nx");
    let mut mode = mode_with(&text, js_settings());
    // Before tokenization row 0 is not known to be a comment.
    assert_eq!(mode.suggested_indent_for_buffer_row(&text, 1, 2, true), 1.0);
    while mode.tokenize_next_chunk(&text) {}
    assert_eq!(mode.suggested_indent_for_buffer_row(&text, 1, 2, true), 0.0);
}

#[test]
fn test_injection_grammar_triggers_retokenization() {
    let todo = YamlGrammar::from_yaml(
        "scope: text.todo\ninjection_selector: string.quoted\ncontexts:\n  main:\n    - match: TODO\n      scope: keyword.todo\n",
    )
    .unwrap();

    let text = BufferText::from_text("var a = 1");
    let mut mode = tokenized(&text);
    mode.update_for_injection(&todo, &text);
    assert!(mode.is_row_tokenized(0));

    let text = BufferText::from_text("var a = \"TODO\"");
    let mut mode = tokenized(&text);
    mode.update_for_injection(&todo, &text);
    assert!(!mode.is_row_tokenized(0));
    assert_eq!(mode.invalid_rows(), [0]);
}

#[test]
fn test_destroyed_mode_does_no_work() {
    let text = BufferText::from_text("var a");
    let mut mode = mode_with(&text, js_settings());
    mode.destroy();
    assert!(!mode.is_alive());
    assert!(!mode.has_pending_work());
    assert!(!mode.tokenize_next_chunk(&text));
}

#[test]
fn test_workspace_renders_textmate_tokens() {
    let grammar = javascript();
    let factory: LanguageModeFactory<'_> = Box::new(
        move |id: LanguageModeId, text: &BufferText, settings: Arc<ScopedSettings>| -> Box<dyn LanguageMode> {
            Box::new(TextMateLanguageMode::new(id, Some(grammar), text, settings))
        },
    );
    let mut workspace = Workspace::new();
    let buffer = workspace
        .open_buffer_with_language_mode(None, "var x = 1", factory)
        .unwrap();
    while workspace.buffer_mut(buffer).unwrap().tokenize_next_chunk() {}

    let editor_id = workspace
        .create_editor(buffer, EditorSettings::default())
        .unwrap();
    let editor = workspace.editor(editor_id).unwrap();
    let tokens: Vec<(String, Vec<String>)> = editor
        .screen_line_tokens(0)
        .into_iter()
        .map(|t| (t.text, t.scopes))
        .collect();
    assert_eq!(
        tokens,
        vec![
            ("var".to_string(), vec!["source.js".to_string(), "keyword.control.js".to_string()]),
            (" x = ".to_string(), vec!["source.js".to_string()]),
            ("1".to_string(), vec!["source.js".to_string(), "constant.numeric.js".to_string()]),
        ]
    );
    assert_eq!(
        editor.scope_descriptor_for_buffer_position(Point::new(0, 0)).scopes_array(),
        ["source.js", "keyword.control.js"]
    );
}
