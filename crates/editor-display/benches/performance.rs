use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use editor_display::{ClipDirection, EditorSettings, Point, Range, Workspace};

fn large_text(line_count: usize) -> String {
    let mut out = String::with_capacity(line_count * 64);
    for i in 0..line_count {
        out.push_str(&format!(
            "{i:06}\tthe quick brown fox jumps over the lazy dog (editor-display benchmark line)\n"
        ));
    }
    out.pop();
    out
}

fn wrapped() -> EditorSettings {
    EditorSettings {
        soft_wrap: true,
        soft_wrap_column: 40,
        auto_indent: false,
        ..EditorSettings::default()
    }
}

fn bench_screen_line_count(c: &mut Criterion) {
    let text = large_text(20_000);
    c.bench_function("screen_line_count/20k_lines_wrapped", |b| {
        b.iter_batched(
            || {
                let mut workspace = Workspace::new();
                let buffer = workspace.open_buffer(None, &text).unwrap();
                let editor = workspace.create_editor(buffer, wrapped()).unwrap();
                (workspace, editor)
            },
            |(mut workspace, editor)| {
                let editor = workspace.editor(editor).unwrap();
                black_box(editor.screen_line_count());
            },
            BatchSize::LargeInput,
        )
    });
}

fn bench_position_translation(c: &mut Criterion) {
    let text = large_text(20_000);
    let mut workspace = Workspace::new();
    let buffer = workspace.open_buffer(None, &text).unwrap();
    let editor = workspace.create_editor(buffer, wrapped()).unwrap();
    let mut editor = workspace.editor(editor).unwrap();
    for row in (0..20_000).step_by(10) {
        editor.fold_buffer_range(Range::new((row, 10), (row + 2, 5)));
    }
    // Warm the layout cache.
    black_box(editor.screen_line_count());

    c.bench_function("translate_buffer_position/1k_points", |b| {
        b.iter(|| {
            for row in (0..20_000).step_by(20) {
                black_box(editor.screen_position_for_buffer_position(
                    Point::new(row, 30),
                    ClipDirection::Closest,
                ));
            }
        })
    });
}

fn bench_typing_in_middle(c: &mut Criterion) {
    let text = large_text(20_000);
    c.bench_function("typing_middle/100_inserts", |b| {
        b.iter_batched(
            || {
                let mut workspace = Workspace::new();
                let buffer = workspace.open_buffer(None, &text).unwrap();
                let editor = workspace.create_editor(buffer, wrapped()).unwrap();
                workspace
                    .editor(editor)
                    .unwrap()
                    .set_cursor_buffer_position(Point::new(10_000, 8));
                (workspace, editor)
            },
            |(mut workspace, editor)| {
                let mut editor = workspace.editor(editor).unwrap();
                for _ in 0..100 {
                    editor.insert_text("x").unwrap();
                    black_box(editor.screen_lines(5_000, 5_060));
                }
            },
            BatchSize::LargeInput,
        )
    });
}

criterion_group!(
    benches,
    bench_screen_line_count,
    bench_position_translation,
    bench_typing_in_middle
);
criterion_main!(benches);
