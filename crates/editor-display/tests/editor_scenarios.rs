use editor_display::{
    ClipDirection, EditorError, EditorId, EditorSettings, INFINITY, Point, Range, SelectionOptions,
    Workspace,
};
use pretty_assertions::assert_eq;

const SAMPLE_JS: &str = "var quicksort = function () {
  var sort = function(items) {
    if (items.length <= 1) return items;
    var pivot = items.shift(), current, left = [], right = [];
    while(items.length > 0) {
      current = items.shift();
      current < pivot ? left.push(current) : right.push(current);
    }
    return sort(left).concat(pivot).concat(sort(right));
  };

  return sort(Array.apply(this, arguments));
};
";

fn settings() -> EditorSettings {
    EditorSettings {
        auto_indent: false,
        ..EditorSettings::default()
    }
}

fn open(text: &str, settings: EditorSettings) -> (Workspace, EditorId) {
    let mut workspace = Workspace::new();
    let buffer = workspace.open_buffer(None, text).unwrap();
    let editor = workspace.create_editor(buffer, settings).unwrap();
    (workspace, editor)
}

#[test]
fn test_move_left_within_indented_row() {
    let (mut workspace, id) = open(SAMPLE_JS, settings());
    let mut editor = workspace.editor(id).unwrap();

    editor.set_cursor_screen_position(Point::new(1, 8));
    editor.move_left(1);
    assert_eq!(editor.cursor_screen_position(), Point::new(1, 7));

    editor.set_cursor_screen_position(Point::new(1, 8));
    editor.move_left(4);
    assert_eq!(editor.cursor_screen_position(), Point::new(1, 4));
}

#[test]
fn test_move_right_wraps_into_following_empty_row() {
    let (mut workspace, id) = open(SAMPLE_JS, settings());
    let mut editor = workspace.editor(id).unwrap();

    editor.set_cursor_screen_position(Point::new(9, 4));
    editor.move_right(1);
    assert_eq!(editor.cursor_buffer_position(), Point::new(10, 0));

    editor.move_right(1);
    assert_eq!(editor.cursor_buffer_position(), Point::new(11, 0));
}

#[test]
fn test_move_line_down_carries_the_fold_along() {
    let (mut workspace, id) = open(SAMPLE_JS, settings());
    let mut editor = workspace.editor(id).unwrap();

    editor.fold_buffer_range(Range::new((4, INFINITY), (7, INFINITY)));
    assert!(editor.is_folded_at_buffer_row(5));
    assert_eq!(editor.screen_line_count(), 11);

    editor.set_selected_buffer_range(
        Range::new((4, 2), (4, 9)),
        SelectionOptions {
            reversed: false,
            preserve_folds: true,
        },
    );
    editor.move_line_down().unwrap();

    assert_eq!(
        editor.line_text_for_buffer_row(4),
        "    return sort(left).concat(pivot).concat(sort(right));"
    );
    assert_eq!(editor.line_text_for_buffer_row(5), "    while(items.length > 0) {");
    assert_eq!(editor.line_text_for_buffer_row(8), "    }");
    let folds: Vec<Range> = editor.folds().into_iter().map(|(_, range)| range).collect();
    assert_eq!(folds, vec![Range::new((5, 29), (8, 5))]);
    assert!(!editor.is_folded_at_buffer_row(4));
    assert!(editor.is_folded_at_buffer_row(6));
    assert_eq!(editor.selected_buffer_range(), Range::new((5, 2), (5, 9)));
    assert_eq!(editor.screen_line_count(), 11);

    editor.move_line_up().unwrap();
    assert_eq!(editor.text(), SAMPLE_JS);
    let folds: Vec<Range> = editor.folds().into_iter().map(|(_, range)| range).collect();
    assert_eq!(folds, vec![Range::new((4, 29), (7, 5))]);
    assert_eq!(editor.selected_buffer_range(), Range::new((4, 2), (4, 9)));
}

#[test]
fn test_move_line_down_groups_adjacent_selections() {
    let (mut workspace, id) = open("a\nb\nc\nd", settings());
    let mut editor = workspace.editor(id).unwrap();
    editor.set_selected_buffer_ranges(
        &[Range::new((0, 0), (1, 0)), Range::empty_at(Point::new(1, 1))],
        SelectionOptions::default(),
    );
    assert_eq!(editor.selections().len(), 2);
    editor.move_line_down().unwrap();
    assert_eq!(editor.text(), "c\na\nb\nd");
    let ranges: Vec<Range> = editor
        .selections_ordered_by_buffer_position()
        .iter()
        .map(|s| s.range)
        .collect();
    assert_eq!(ranges, vec![Range::new((1, 0), (2, 0)), Range::empty_at(Point::new(2, 1))]);
}

#[test]
fn test_moving_the_last_line_keeps_the_line_count() {
    let (mut workspace, id) = open("one\ntwo", settings());
    let mut editor = workspace.editor(id).unwrap();

    editor.set_cursor_buffer_position(Point::new(1, 0));
    editor.move_line_up().unwrap();
    assert_eq!(editor.text(), "two\none");

    editor.set_cursor_buffer_position(Point::new(0, 1));
    editor.move_line_down().unwrap();
    assert_eq!(editor.text(), "one\ntwo");
    assert_eq!(editor.cursor_buffer_position(), Point::new(1, 1));
}

#[test]
fn test_previous_subword_boundaries() {
    let (mut workspace, id) = open(" getPreviousWord\n", settings());
    let mut editor = workspace.editor(id).unwrap();
    editor.set_cursor_buffer_position(Point::new(0, 16));

    let mut columns = Vec::new();
    for _ in 0..3 {
        editor.move_to_previous_subword_boundary();
        columns.push(editor.cursor_buffer_position().column);
    }
    assert_eq!(columns, vec![12, 4, 1]);
}

#[test]
fn test_indentation_levels_follow_tab_length() {
    let (mut workspace, id) = open("    hello\n   hello\n\t  hello", settings());
    let mut editor = workspace.editor(id).unwrap();
    assert_eq!(editor.indentation_for_buffer_row(0), 2.0);
    assert_eq!(editor.indentation_for_buffer_row(1), 1.5);
    assert_eq!(editor.indentation_for_buffer_row(2), 2.0);

    editor.set_settings(EditorSettings {
        tab_length: 4,
        ..settings()
    });
    assert_eq!(editor.indentation_for_buffer_row(0), 1.0);
}

#[test]
fn test_vertical_moves_remember_the_goal_column() {
    let (mut workspace, id) = open("abcdef\nab\nabcdef", settings());
    let mut editor = workspace.editor(id).unwrap();
    editor.set_cursor_buffer_position(Point::new(0, 5));
    editor.move_down(1);
    assert_eq!(editor.cursor_buffer_position(), Point::new(1, 2));
    editor.move_down(1);
    assert_eq!(editor.cursor_buffer_position(), Point::new(2, 5));

    editor.move_left(1);
    editor.move_up(2);
    assert_eq!(editor.cursor_buffer_position(), Point::new(0, 4));
}

#[test]
fn test_vertical_moves_step_over_folds_and_wrapped_rows() {
    let (mut workspace, id) = open(
        "first\nhidden\nhidden\nlast row that wraps around",
        EditorSettings {
            soft_wrap: true,
            soft_wrap_column: 10,
            ..settings()
        },
    );
    let mut editor = workspace.editor(id).unwrap();
    editor.fold_buffer_range(Range::new((0, 5), (2, 6)));
    assert_eq!(editor.screen_line_for_screen_row(0).unwrap().text, "first⋯");

    editor.move_down(1);
    assert_eq!(editor.cursor_buffer_position(), Point::new(3, 0));
    editor.move_down(1);
    assert_eq!(editor.cursor_screen_position().row, 2);
    assert!(editor.cursor_buffer_position().column > 0);
}

#[test]
fn test_read_only_editor_allows_navigation_and_folding() {
    let (mut workspace, id) = open(
        "a\nb\nc",
        EditorSettings {
            read_only: true,
            ..settings()
        },
    );
    let mut editor = workspace.editor(id).unwrap();
    assert!(editor.is_read_only());

    for result in [editor.backspace(), editor.delete(), editor.undo().map(|_| ()), editor.move_line_up()] {
        assert!(matches!(result, Err(EditorError::ReadOnly { .. })));
    }
    editor.move_to_bottom();
    assert_eq!(editor.cursor_buffer_position(), Point::new(2, 1));
    editor.fold_buffer_range(Range::new((0, 1), (1, 1)));
    assert_eq!(editor.screen_line_count(), 2);

    editor.set_read_only(false);
    editor.insert_text("!").unwrap();
    assert_eq!(editor.text(), "a\nb\nc!");
}

#[test]
fn test_screen_positions_clip_inside_hard_tabs() {
    let (mut workspace, id) = open(
        "\tx",
        EditorSettings {
            tab_length: 4,
            ..settings()
        },
    );
    let editor = workspace.editor(id).unwrap();
    assert_eq!(editor.clip_screen_position(Point::new(0, 1), ClipDirection::Closest), Point::new(0, 0));
    assert_eq!(editor.clip_screen_position(Point::new(0, 3), ClipDirection::Closest), Point::new(0, 4));
    assert_eq!(
        editor.buffer_position_for_screen_position(Point::new(0, 5), ClipDirection::Closest),
        Point::new(0, 2)
    );
}

#[test]
fn test_fold_commands_without_a_grammar_do_nothing() {
    let (mut workspace, id) = open("a\n  b\nc", settings());
    let mut editor = workspace.editor(id).unwrap();
    assert!(editor.fold_current_row().is_none());
    assert!(editor.fold_buffer_row(0).is_none());
    editor.fold_all();
    assert!(editor.folds().is_empty());
}

#[test]
fn test_fold_selected_lines_and_toggle() {
    let (mut workspace, id) = open("a\nb\nc\nd", settings());
    let mut editor = workspace.editor(id).unwrap();
    editor.set_selected_buffer_range(Range::new((0, 1), (2, 1)), SelectionOptions::default());
    editor.fold_selected_lines();
    assert_eq!(editor.screen_line_count(), 2);
    assert_eq!(editor.cursor_buffer_position(), Point::new(2, 1));

    editor.toggle_fold_at_buffer_row(1);
    assert!(editor.folds().is_empty());

    editor.fold_buffer_range(Range::new((1, 1), (3, 1)));
    assert_eq!(editor.unfold_all().len(), 1);
    assert_eq!(editor.screen_line_count(), 4);
}
