use std::sync::{Arc, Mutex};

use editor_display::config::{COMMENT_START, DECREASE_INDENT_PATTERN, INCREASE_INDENT_PATTERN};
use editor_display::workspace::LanguageModeFactory;
use editor_display::{
    BufferText, EditorSettings, HighlightIterator, INFINITY, LanguageMode, LanguageModeEvent,
    LanguageModeId, NullLanguageMode, Point, Range, ScopedSettings, Workspace,
};
use editor_display_treesitter::{
    FoldBoundary, FoldSpec, ScopeRule, TreeSitterGrammar, TreeSitterGrammarConfig,
    TreeSitterLanguageMode, TreeSitterUpdateMode,
};
use pretty_assertions::assert_eq;

const SAMPLE: &str = include_str!("fixtures/sample.rs.txt");

fn rust_config() -> TreeSitterGrammarConfig {
    TreeSitterGrammarConfig::new(tree_sitter_rust::LANGUAGE.into(), "source.rust")
        .with_name("Rust")
        .with_file_types(["rs"])
        .with_simple_scopes([
            ("source_file", "source.rust"),
            ("line_comment", "comment.line.double-slash"),
            ("block_comment", "comment.block"),
            ("\"fn\"", "storage.type.function"),
            ("\"let\"", "storage.modifier"),
            ("function_item > identifier", "entity.name.function"),
            ("string_literal", "string.quoted.double"),
            ("integer_literal", "constant.numeric"),
            ("primitive_type", "support.type"),
        ])
        .with_scope("identifier", ScopeRule::matching("^[A-Z][A-Z0-9_]*$", "constant.other"))
        .with_fold(
            FoldSpec::for_types(["block", "field_declaration_list"])
                .start(FoldBoundary::child(0))
                .end(FoldBoundary::child(-1)),
        )
        .with_comment_strings("// ", None)
}

fn grammar_from(config: TreeSitterGrammarConfig) -> Arc<TreeSitterGrammar> {
    Arc::new(TreeSitterGrammar::new(config).unwrap())
}

fn rust_settings() -> ScopedSettings {
    let mut settings = ScopedSettings::with_defaults();
    settings.set(".source.rust", INCREASE_INDENT_PATTERN, r"\{\s*$");
    settings.set(".source.rust", DECREASE_INDENT_PATTERN, r"^\s*\}");
    settings
}

fn mode_for(text: &BufferText, config: TreeSitterGrammarConfig) -> TreeSitterLanguageMode {
    TreeSitterLanguageMode::new(
        LanguageModeId::from_raw(1),
        grammar_from(config),
        text,
        Arc::new(rust_settings()),
    )
    .unwrap()
}

fn parsed(text: &BufferText) -> TreeSitterLanguageMode {
    let mut mode = mode_for(text, rust_config());
    mode.update_highlights(text);
    mode
}

fn record_events(mode: &mut TreeSitterLanguageMode) -> Arc<Mutex<Vec<LanguageModeEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    mode.subscribe(Box::new(move |event| sink.lock().unwrap().push(event.clone())));
    events
}

fn scopes_at(mode: &TreeSitterLanguageMode, text: &BufferText, row: usize, column: usize) -> Vec<String> {
    mode.scope_descriptor_for_position(text, Point::new(row, column))
        .scopes_array()
        .to_vec()
}

fn edit(mode: &mut TreeSitterLanguageMode, text: &mut BufferText, range: Range, new_text: &str) {
    let change = text.set_text_in_range(range, new_text);
    mode.buffer_did_change(text, &change);
}

#[test]
fn test_first_update_reports_whole_document() {
    let text = BufferText::from_text(SAMPLE);
    let mut mode = mode_for(&text, rust_config());
    assert_eq!(mode.last_update_mode(), TreeSitterUpdateMode::Initial);
    assert!(mode.tree().is_some());
    assert!(mode.has_pending_work());

    let events = record_events(&mut mode);
    let whole = Range::new(Point::zero(), text.end_position());
    assert_eq!(mode.update_highlights(&text), vec![whole]);
    assert!(!mode.has_pending_work());
    assert!(mode.is_fully_tokenized());

    assert_eq!(mode.update_highlights(&text), Vec::<Range>::new());
    assert_eq!(mode.last_update_mode(), TreeSitterUpdateMode::Skipped);
    assert_eq!(
        *events.lock().unwrap(),
        vec![
            LanguageModeEvent::DidChangeHighlighting { range: whole },
            LanguageModeEvent::DidTokenize,
        ]
    );
}

#[test]
fn test_tokenize_next_chunk_finishes_in_one_slice() {
    let text = BufferText::from_text(SAMPLE);
    let mut mode = mode_for(&text, rust_config());
    assert!(!mode.tokenize_next_chunk(&text));
    assert!(!mode.has_pending_work());
}

#[test]
fn test_scope_descriptors() {
    let text = BufferText::from_text(SAMPLE);
    let mode = parsed(&text);

    assert_eq!(scopes_at(&mode, &text, 0, 3), ["source.rust", "comment.line.double-slash"]);
    assert_eq!(scopes_at(&mode, &text, 2, 8), ["source.rust", "support.type"]);
    assert_eq!(scopes_at(&mode, &text, 6, 4), ["source.rust", "entity.name.function"]);
    assert_eq!(scopes_at(&mode, &text, 7, 5), ["source.rust", "storage.modifier"]);
    assert_eq!(scopes_at(&mode, &text, 7, 20), ["source.rust", "string.quoted.double"]);
    assert_eq!(scopes_at(&mode, &text, 11, 16), ["source.rust", "constant.numeric"]);
    assert_eq!(scopes_at(&mode, &text, 5, 0), ["source.rust"]);
}

#[test]
fn test_root_scope_is_prepended_when_unmapped() {
    let text = BufferText::from_text("fn main() {}");
    let config = TreeSitterGrammarConfig::new(tree_sitter_rust::LANGUAGE.into(), "source.rust")
        .with_simple_scopes([("function_item > identifier", "entity.name.function")]);
    let mut mode = mode_for(&text, config);
    mode.update_highlights(&text);
    assert_eq!(scopes_at(&mode, &text, 0, 4), ["source.rust", "entity.name.function"]);
    assert_eq!(scopes_at(&mode, &text, 0, 0), ["source.rust"]);
}

#[test]
fn test_leaf_rules_inspect_node_text() {
    let text = BufferText::from_text("let x = MAX;");
    let mode = parsed(&text);
    assert_eq!(scopes_at(&mode, &text, 0, 4), ["source.rust"]);
    assert_eq!(scopes_at(&mode, &text, 0, 9), ["source.rust", "constant.other"]);
}

#[test]
fn test_highlight_iterator_boundaries() {
    let text = BufferText::from_text("let x = 1;");
    let mode = parsed(&text);
    let mut iterator = mode.build_highlight_iterator(&text);
    let names = |ids: Vec<_>| -> Vec<String> {
        ids.into_iter()
            .filter_map(|id| mode.scope_name_for_id(id))
            .collect()
    };

    let containing = iterator.seek(Point::zero());
    assert!(containing.is_empty());
    let mut boundaries = vec![(
        iterator.position(),
        names(iterator.close_scope_ids()),
        names(iterator.open_scope_ids()),
    )];
    while iterator.move_to_successor() {
        boundaries.push((
            iterator.position(),
            names(iterator.close_scope_ids()),
            names(iterator.open_scope_ids()),
        ));
    }

    let s = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    assert_eq!(
        boundaries,
        vec![
            (Point::new(0, 0), s(&[]), s(&["source.rust", "storage.modifier"])),
            (Point::new(0, 3), s(&["storage.modifier"]), s(&[])),
            (Point::new(0, 8), s(&[]), s(&["constant.numeric"])),
            (Point::new(0, 9), s(&["constant.numeric"]), s(&[])),
            (Point::new(0, 10), s(&["source.rust"]), s(&[])),
        ]
    );
    assert_eq!(iterator.position(), text.end_position());
}

#[test]
fn test_seek_reports_containing_scopes() {
    let text = BufferText::from_text(SAMPLE);
    let mode = parsed(&text);
    let mut iterator = mode.build_highlight_iterator(&text);
    let containing: Vec<String> = iterator
        .seek(Point::new(7, 22))
        .into_iter()
        .filter_map(|id| mode.scope_name_for_id(id))
        .collect();
    assert_eq!(containing, ["source.rust", "string.quoted.double"]);

    assert!(iterator.move_to_successor());
    assert_eq!(iterator.position(), Point::new(7, 26));
    assert_eq!(
        iterator
            .close_scope_ids()
            .into_iter()
            .filter_map(|id| mode.scope_name_for_id(id))
            .collect::<Vec<_>>(),
        ["string.quoted.double"]
    );
}

#[test]
fn test_incremental_edit() {
    let mut text = BufferText::from_text("fn a() {}\nfn b() {}\n");
    let mut mode = parsed(&text);
    let events = record_events(&mut mode);

    edit(&mut mode, &mut text, Range::new((1, 3), (1, 4)), "bee");
    assert!(mode.has_pending_work());
    assert!(!mode.is_fully_tokenized());

    let changed = mode.update_highlights(&text);
    assert_eq!(mode.last_update_mode(), TreeSitterUpdateMode::Incremental);
    assert!(!changed.is_empty());
    assert!(changed.iter().all(|range| range.start.row == 1));
    assert_eq!(scopes_at(&mode, &text, 1, 5), ["source.rust", "entity.name.function"]);

    let events = events.lock().unwrap();
    assert!(!events.contains(&LanguageModeEvent::DidTokenize));
    assert_eq!(events.len(), changed.len());
}

#[test]
fn test_edits_accumulate_until_reparse() {
    let mut text = BufferText::from_text("fn a() {}\n");
    let mut mode = parsed(&text);

    edit(&mut mode, &mut text, Range::new((0, 9), (0, 9)), "\nfn b() {}");
    edit(&mut mode, &mut text, Range::new((1, 3), (1, 4)), "c");
    mode.update_highlights(&text);

    assert_eq!(text.line_for_row(1), "fn c() {}");
    assert_eq!(scopes_at(&mode, &text, 1, 3), ["source.rust", "entity.name.function"]);
    assert_eq!(scopes_at(&mode, &text, 0, 3), ["source.rust", "entity.name.function"]);
}

#[test]
fn test_syntax_change_reports_changed_ranges() {
    let mut text = BufferText::from_text("fn a() {}\nfn b() {}\n");
    let mut mode = parsed(&text);

    edit(&mut mode, &mut text, Range::new((1, 9), (1, 9)), " */");
    mode.update_highlights(&text);
    edit(&mut mode, &mut text, Range::new((0, 0), (0, 0)), "/* ");
    let changed = mode.update_highlights(&text);
    assert!(!changed.is_empty());
    assert_eq!(scopes_at(&mode, &text, 1, 3), ["source.rust", "comment.block"]);
}

#[test]
fn test_fold_ranges() {
    let text = BufferText::from_text(SAMPLE);
    let mode = parsed(&text);

    let struct_fold = Range::new((1, INFINITY), (4, 0));
    let main_fold = Range::new((6, INFINITY), (13, 0));
    let if_fold = Range::new((10, INFINITY), (12, 4));

    assert_eq!(mode.foldable_ranges(&text, 4), vec![struct_fold, main_fold, if_fold]);
    assert_eq!(mode.foldable_ranges_at_indent_level(&text, 0, 4), vec![struct_fold, main_fold]);
    assert_eq!(mode.foldable_ranges_at_indent_level(&text, 1, 4), vec![if_fold]);
    assert_eq!(mode.foldable_ranges_at_indent_level(&text, 2, 4), Vec::<Range>::new());

    assert_eq!(mode.foldable_range_containing_point(&text, Point::new(11, 9), 4), Some(if_fold));
    assert_eq!(mode.foldable_range_containing_point(&text, Point::new(7, 6), 4), Some(main_fold));
    assert_eq!(mode.foldable_range_containing_point(&text, Point::new(0, 3), 4), None);
}

#[test]
fn test_foldable_rows() {
    let text = BufferText::from_text(SAMPLE);
    let mode = parsed(&text);
    let foldable: Vec<usize> = (0..text.line_count())
        .filter(|row| mode.is_foldable_at_row(&text, *row))
        .collect();
    assert_eq!(foldable, vec![1, 6, 10]);
    assert!(!mode.is_foldable_at_row(&text, 100));
}

#[test]
fn test_fold_end_before_word_character() {
    let text = BufferText::from_text(
        "fn f() {\n    if x {\n        a();\n    } else {\n        b();\n    }\n}\n",
    );
    let mode = parsed(&text);
    assert_eq!(
        mode.foldable_range_containing_point(&text, Point::new(2, 9), 4),
        Some(Range::new((1, INFINITY), (2, INFINITY)))
    );
    assert_eq!(
        mode.foldable_range_containing_point(&text, Point::new(4, 9), 4),
        Some(Range::new((3, INFINITY), (5, 4)))
    );
}

#[test]
fn test_foldable_cache_is_invalidated_by_edits() {
    let mut text = BufferText::from_text("fn a() {}\n");
    let mut mode = parsed(&text);
    assert!(!mode.is_foldable_at_row(&text, 0));

    edit(&mut mode, &mut text, Range::new((0, 8), (0, 8)), "\n");
    mode.update_highlights(&text);
    assert!(mode.is_foldable_at_row(&text, 0));
    assert_eq!(mode.foldable_ranges(&text, 4), vec![Range::new((0, INFINITY), (1, 0))]);
}

#[test]
fn test_folds_query_captures_fold_over_node() {
    let text = BufferText::from_text("struct P {\n    x: i32,\n}\n");
    let config = TreeSitterGrammarConfig::new(tree_sitter_rust::LANGUAGE.into(), "source.rust")
        .with_folds_query("(struct_item) @fold");
    let mut mode = mode_for(&text, config);
    mode.update_highlights(&text);
    assert_eq!(mode.foldable_ranges(&text, 4), vec![Range::new((0, INFINITY), (2, 1))]);
    assert!(mode.is_foldable_at_row(&text, 0));
}

#[test]
fn test_lone_carriage_return_rows() {
    let text = BufferText::from_text("fn a() {\r    1\r}\r");
    let mode = parsed(&text);
    assert_eq!(mode.foldable_ranges(&text, 4), vec![Range::new((0, INFINITY), (2, 0))]);
    assert_eq!(scopes_at(&mode, &text, 1, 4), ["source.rust", "constant.numeric"]);
}

#[test]
fn test_commented_rows() {
    let text = BufferText::from_text(SAMPLE);
    let mode = parsed(&text);
    assert!(mode.is_row_commented(&text, 0));
    assert!(mode.is_row_commented(&text, 8));
    assert!(mode.is_row_commented(&text, 9));
    assert!(!mode.is_row_commented(&text, 5));
    assert!(!mode.is_row_commented(&text, 7));
}

#[test]
fn test_ranges_for_scopes_and_syntax_nodes() {
    let text = BufferText::from_text(SAMPLE);
    let mode = parsed(&text);

    assert_eq!(
        mode.buffer_range_for_scope_at_position(&text, "string_literal", Point::new(7, 21)),
        Some(Range::new((7, 19), (7, 26)))
    );
    assert_eq!(
        mode.buffer_range_for_scope_at_position(&text, "block", Point::new(11, 12)),
        Some(Range::new((10, 12), (12, 5)))
    );
    assert_eq!(
        mode.buffer_range_for_scope_at_position(&text, "enum_item", Point::new(11, 12)),
        None
    );
    assert_eq!(
        mode.range_for_syntax_node_containing_range(&text, Range::new((7, 20), (7, 25))),
        Some(Range::new((7, 19), (7, 26)))
    );
}

#[test]
fn test_indentation_uses_settings_at_root_scope() {
    let text = BufferText::from_text("fn a() {\n\n}\n    }");
    let mode = parsed(&text);
    assert_eq!(mode.suggested_indent_for_buffer_row(&text, 1, 4, true), 1.0);
    assert_eq!(mode.suggested_indent_for_buffer_row(&text, 2, 4, true), 0.0);
    assert_eq!(mode.suggested_indent_for_line_at_buffer_row(&text, 1, "}", 4), 0.0);
    assert_eq!(mode.suggested_indent_for_edited_buffer_row(&text, 3, 4), Some(0.0));
    assert_eq!(mode.indent_level_for_line("\t  x", 2), 2.0);
}

#[test]
fn test_comment_strings_and_word_characters() {
    let text = BufferText::from_text(SAMPLE);
    let mode = parsed(&text);
    let comments = mode.comment_strings_for_position(&text, Point::new(7, 4));
    assert_eq!(comments.comment_start.as_deref(), Some("// "));
    assert_eq!(comments.comment_end, None);

    let mut settings = rust_settings();
    settings.set(".source.rust", COMMENT_START, "# ");
    let config = TreeSitterGrammarConfig::new(tree_sitter_rust::LANGUAGE.into(), "source.rust");
    let plain = TreeSitterLanguageMode::new(
        LanguageModeId::from_raw(2),
        grammar_from(config),
        &text,
        Arc::new(settings),
    )
    .unwrap();
    assert_eq!(
        plain
            .comment_strings_for_position(&text, Point::zero())
            .comment_start
            .as_deref(),
        Some("# ")
    );

    assert!(mode.non_word_characters(&text, Point::new(7, 4)).contains('('));
}

#[test]
fn test_tokenized_lines_are_untagged() {
    let text = BufferText::from_text(SAMPLE);
    let mode = parsed(&text);
    let line = mode.tokenized_line_for_row(&text, 7);
    assert_eq!(line.text(), "    let greeting = \"hello\";");
}

#[test]
fn test_destroyed_mode_does_no_work() {
    let text = BufferText::from_text(SAMPLE);
    let mut mode = parsed(&text);
    mode.destroy();
    assert!(!mode.is_alive());
    assert!(!mode.has_pending_work());
    assert_eq!(mode.update_highlights(&text), Vec::<Range>::new());
    assert!(mode.foldable_ranges(&text, 4).is_empty());
    assert!(!mode.is_foldable_at_row(&text, 1));

    let mut iterator = mode.build_highlight_iterator(&text);
    iterator.seek(Point::zero());
    assert!(!iterator.move_to_successor());
}

#[test]
fn test_workspace_renders_tree_sitter_scopes() {
    let grammar = grammar_from(rust_config());
    let factory: LanguageModeFactory<'_> = Box::new(
        move |id: LanguageModeId, text: &BufferText, settings: Arc<ScopedSettings>| -> Box<dyn LanguageMode> {
            match TreeSitterLanguageMode::new(id, grammar, text, settings.clone()) {
                Ok(mode) => Box::new(mode),
                Err(_) => Box::new(NullLanguageMode::new(id, settings)),
            }
        },
    );
    let mut workspace = Workspace::new();
    let buffer = workspace
        .open_buffer_with_language_mode(None, "fn main() {}", factory)
        .unwrap();
    workspace.buffer_mut(buffer).unwrap().update_highlights();

    let editor_id = workspace
        .create_editor(buffer, EditorSettings::default())
        .unwrap();
    let editor = workspace.editor(editor_id).unwrap();
    let tokens: Vec<(String, Vec<String>)> = editor
        .screen_line_tokens(0)
        .into_iter()
        .map(|t| (t.text, t.scopes))
        .collect();
    let scopes = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    assert_eq!(
        tokens,
        vec![
            ("fn".to_string(), scopes(&["source.rust", "storage.type.function"])),
            (" ".to_string(), scopes(&["source.rust"])),
            ("main".to_string(), scopes(&["source.rust", "entity.name.function"])),
            ("() {}".to_string(), scopes(&["source.rust"])),
        ]
    );
    assert_eq!(
        editor.scope_descriptor_for_buffer_position(Point::new(0, 5)).scopes_array(),
        ["source.rust", "entity.name.function"]
    );
}
