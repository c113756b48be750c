//! Buffer ↔ screen coordinate mapping.
//!
//! A [`DisplayLayer`] renders the text of a [`TextBuffer`] through one editor's folds and
//! [`EditorSettings`]. Each buffer row (or run of rows joined by folds) becomes a *display line*,
//! which soft wrap may split into several [`ScreenLine`]s. Screen lines are made of
//! [`ScreenSpan`]s, each mapping a run of screen columns to a run of buffer positions.
//!
//! Screen columns count the chars of the rendered [`ScreenLine::text`]. A hard tab renders as
//! spaces up to the next tab stop, a fold as a single `⋯`, and continuation rows start with
//! spaces for the soft-wrap indent. Cell widths (`unicode-width`) only matter for deciding where
//! rows wrap.
//!
//! The layout is rebuilt lazily: it is cached against the buffer version and dropped whenever
//! folds or settings change.

use crate::buffer_text::BufferText;
use crate::config::EditorSettings;
use crate::ids::{MarkerId, MarkerLayerId};
use crate::layout::{self, LayoutUnit};
use crate::line_ending::LineEnding;
use crate::marker::{InvalidationStrategy, MarkerOptions};
use crate::point::{ClipDirection, INFINITY, Point, Range};
use crate::text_buffer::TextBuffer;
use std::cell::RefCell;
use std::sync::Arc;
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

/// Glyph drawn in place of folded text.
pub const FOLD_PLACEHOLDER: char = '⋯';

/// What a span of a screen line renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanKind {
    /// Plain characters, one screen column per buffer column.
    Text,
    /// A multi-char grapheme cluster.
    Cluster,
    /// A hard tab expanded to the next tab stop.
    HardTab,
    /// A leading run of `tab_length` spaces treated as one unit.
    AtomicSoftTab,
    /// A fold placeholder.
    Fold,
    /// Indentation of a soft-wrapped continuation row.
    SoftWrapIndent,
    /// Invisible glyphs drawn for the line ending.
    LineEnding,
}

/// A run of screen columns and the buffer text it renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenSpan {
    /// What the span renders.
    pub kind: SpanKind,
    /// First screen column.
    pub screen_start: usize,
    /// Screen column just past the span.
    pub screen_end: usize,
    /// Buffer position of the first rendered char.
    pub buffer_start: Point,
    /// Buffer position just past the rendered text.
    pub buffer_end: Point,
}

impl ScreenSpan {
    /// Returns true if cursors may not land strictly inside this span.
    pub fn is_atomic(&self) -> bool {
        !matches!(self.kind, SpanKind::Text)
    }

    /// Returns true if the span renders buffer text (as opposed to decoration).
    pub fn is_content(&self) -> bool {
        !matches!(self.kind, SpanKind::SoftWrapIndent | SpanKind::LineEnding)
    }
}

/// One rendered row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenLine {
    /// Screen row.
    pub screen_row: usize,
    /// Rendered text, including soft-wrap indent and invisibles.
    pub text: String,
    /// Spans tiling `text` from column 0.
    pub spans: Vec<ScreenSpan>,
    /// Buffer position of the first rendered content.
    pub buffer_start: Point,
    /// Buffer position just past the rendered content.
    pub buffer_end: Point,
    /// Columns of soft-wrap indentation at the start of the row.
    pub soft_wrap_indent: usize,
    /// Screen column just past the content (before any line-ending glyphs).
    pub content_end: usize,
    /// True if the display line continues on the next screen row.
    pub soft_wrapped: bool,
}

impl ScreenLine {
    /// The first column a cursor can occupy.
    pub fn first_column(&self) -> usize {
        self.soft_wrap_indent
    }

    /// The last column a cursor can occupy.
    ///
    /// The end of a soft-wrapped row is the same buffer position as the start of the next
    /// row, so only the latter is addressable.
    pub fn max_column(&self) -> usize {
        if !self.soft_wrapped || self.content_end <= self.first_column() {
            return self.content_end;
        }
        let candidate = self.content_end - 1;
        match self.atomic_span_around(candidate) {
            Some(span) => span.screen_start.max(self.first_column()),
            None => candidate,
        }
    }

    /// Width of the rendered text in columns.
    pub fn len(&self) -> usize {
        self.spans.last().map_or(0, |s| s.screen_end)
    }

    /// Returns true if nothing is rendered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn atomic_span_around(&self, column: usize) -> Option<&ScreenSpan> {
        self.spans
            .iter()
            .find(|s| s.is_content() && s.is_atomic() && s.screen_start < column && column < s.screen_end)
    }

    fn buffer_position_for_column(&self, column: usize) -> Point {
        for span in self.spans.iter().filter(|s| s.is_content()) {
            if column >= span.screen_end {
                continue;
            }
            if column <= span.screen_start || span.is_atomic() {
                return span.buffer_start;
            }
            return span
                .buffer_start
                .translate(0, (column - span.screen_start) as isize);
        }
        self.buffer_end
    }
}

/// How [`DisplayLayer::clip_screen_position`] snaps invalid positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClipOptions {
    /// Snap direction.
    pub direction: ClipDirection,
    /// Clip positions inside a soft-wrap indent to the indent's end, never to the previous row.
    pub skip_soft_wrap_indentation: bool,
}

impl From<ClipDirection> for ClipOptions {
    fn from(direction: ClipDirection) -> Self {
        Self {
            direction,
            skip_soft_wrap_indentation: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DisplayLine {
    start_row: usize,
    end_row: usize,
    first_screen_row: usize,
    screen_row_count: usize,
}

#[derive(Debug, Default)]
struct ScreenLayout {
    display_lines: Vec<DisplayLine>,
    screen_lines: Vec<ScreenLine>,
}

impl ScreenLayout {
    fn display_line_for_buffer_row(&self, row: usize) -> &DisplayLine {
        let index = self
            .display_lines
            .partition_point(|dl| dl.start_row <= row)
            .saturating_sub(1);
        &self.display_lines[index]
    }

    fn display_line_for_screen_row(&self, screen_row: usize) -> &DisplayLine {
        let index = self
            .display_lines
            .partition_point(|dl| dl.first_screen_row <= screen_row)
            .saturating_sub(1);
        &self.display_lines[index]
    }
}

#[derive(Debug, Clone)]
struct Unit {
    kind: SpanKind,
    screen_text: String,
    buffer_start: Point,
    buffer_end: Point,
    cells: usize,
    is_whitespace: bool,
}

/// Renders one editor's view of a buffer.
#[derive(Debug)]
pub struct DisplayLayer {
    fold_layer: MarkerLayerId,
    settings: EditorSettings,
    cache: RefCell<Option<(u64, Arc<ScreenLayout>)>>,
}

impl DisplayLayer {
    /// Create a display layer with its own fold layer in `buffer`.
    pub fn new(buffer: &mut TextBuffer, settings: EditorSettings) -> Self {
        let fold_layer = buffer.markers_mut().add_layer(true);
        Self {
            fold_layer,
            settings,
            cache: RefCell::new(None),
        }
    }

    /// The marker layer holding this layer's folds.
    pub fn fold_layer(&self) -> MarkerLayerId {
        self.fold_layer
    }

    /// Current settings.
    pub fn settings(&self) -> &EditorSettings {
        &self.settings
    }

    /// Replace the settings.
    pub fn set_settings(&mut self, settings: EditorSettings) {
        self.settings = settings;
        self.invalidate();
    }

    /// Remove the fold layer from `buffer`.
    pub fn destroy(&mut self, buffer: &mut TextBuffer) {
        buffer.markers_mut().destroy_layer(self.fold_layer);
        self.invalidate();
    }

    fn invalidate(&self) {
        self.cache.borrow_mut().take();
    }

    fn layout(&self, buffer: &TextBuffer) -> Arc<ScreenLayout> {
        if let Some((version, layout)) = self.cache.borrow().as_ref()
            && *version == buffer.version()
        {
            return Arc::clone(layout);
        }
        let layout = Arc::new(self.build_layout(buffer));
        *self.cache.borrow_mut() = Some((buffer.version(), Arc::clone(&layout)));
        layout
    }

    /// Number of screen rows.
    pub fn screen_line_count(&self, buffer: &TextBuffer) -> usize {
        self.layout(buffer).screen_lines.len()
    }

    /// The last screen row.
    pub fn last_screen_row(&self, buffer: &TextBuffer) -> usize {
        self.screen_line_count(buffer).saturating_sub(1)
    }

    /// The screen line at `screen_row`.
    pub fn screen_line_for_screen_row(&self, buffer: &TextBuffer, screen_row: usize) -> Option<ScreenLine> {
        self.layout(buffer).screen_lines.get(screen_row).cloned()
    }

    /// Screen lines `[start, end)`.
    pub fn screen_lines(&self, buffer: &TextBuffer, start: usize, end: usize) -> Vec<ScreenLine> {
        let layout = self.layout(buffer);
        let end = end.min(layout.screen_lines.len());
        layout
            .screen_lines
            .get(start.min(end)..end)
            .map(<[ScreenLine]>::to_vec)
            .unwrap_or_default()
    }

    /// Snap a screen position onto the nearest valid one.
    pub fn clip_screen_position(
        &self,
        buffer: &TextBuffer,
        position: Point,
        options: impl Into<ClipOptions>,
    ) -> Point {
        let layout = self.layout(buffer);
        clip_screen_position_in(&layout, position, options.into())
    }

    /// Map a buffer position to the screen.
    pub fn translate_buffer_position(
        &self,
        buffer: &TextBuffer,
        position: Point,
        direction: ClipDirection,
    ) -> Point {
        let layout = self.layout(buffer);
        let position = buffer.text().clip_position(position);
        let display_line = layout.display_line_for_buffer_row(position.row);
        let lines = &layout.screen_lines
            [display_line.first_screen_row..display_line.first_screen_row + display_line.screen_row_count];
        let index = lines
            .partition_point(|line| line.buffer_start <= position)
            .saturating_sub(1);
        let line = &lines[index];

        let mut column = line.first_column();
        for span in line.spans.iter().filter(|s| s.is_content()) {
            if position <= span.buffer_start {
                column = span.screen_start;
                break;
            }
            if position < span.buffer_end {
                column = match span.kind {
                    SpanKind::Text => span.screen_start + (position.column - span.buffer_start.column),
                    SpanKind::Fold => match direction {
                        ClipDirection::Forward => span.screen_end,
                        _ => span.screen_start,
                    },
                    _ => {
                        let before = position.column - span.buffer_start.column;
                        let after = span.buffer_end.column - position.column;
                        match direction {
                            ClipDirection::Backward => span.screen_start,
                            ClipDirection::Forward => span.screen_end,
                            ClipDirection::Closest if before <= after => span.screen_start,
                            ClipDirection::Closest => span.screen_end,
                        }
                    }
                };
                break;
            }
            column = span.screen_end;
        }
        // An atomic span ending a wrapped row resolves onto the next row.
        clip_screen_position_in(&layout, Point::new(line.screen_row, column), direction.into())
    }

    /// Map a screen position (clipped first) to the buffer.
    pub fn translate_screen_position(
        &self,
        buffer: &TextBuffer,
        position: Point,
        options: impl Into<ClipOptions>,
    ) -> Point {
        let layout = self.layout(buffer);
        let clipped = clip_screen_position_in(&layout, position, options.into());
        layout.screen_lines[clipped.row].buffer_position_for_column(clipped.column)
    }

    /// Snap a buffer position onto one that can be displayed.
    pub fn clip_buffer_position(&self, buffer: &TextBuffer, position: Point, direction: ClipDirection) -> Point {
        let screen = self.translate_buffer_position(buffer, position, direction);
        self.translate_screen_position(buffer, screen, direction)
    }

    /// Map a buffer range to the screen.
    pub fn translate_buffer_range(&self, buffer: &TextBuffer, range: Range) -> Range {
        Range::new(
            self.translate_buffer_position(buffer, range.start, ClipDirection::Closest),
            self.translate_buffer_position(buffer, range.end, ClipDirection::Closest),
        )
    }

    /// Map a screen range to the buffer.
    pub fn translate_screen_range(&self, buffer: &TextBuffer, range: Range) -> Range {
        Range::new(
            self.translate_screen_position(buffer, range.start, ClipDirection::Closest),
            self.translate_screen_position(buffer, range.end, ClipDirection::Closest),
        )
    }

    /// Buffer row rendered at the start of `screen_row`.
    pub fn buffer_row_for_screen_row(&self, buffer: &TextBuffer, screen_row: usize) -> usize {
        let layout = self.layout(buffer);
        let row = screen_row.min(layout.screen_lines.len().saturating_sub(1));
        layout.screen_lines[row].buffer_start.row
    }

    /// First screen row rendering `buffer_row` (the fold's row for folded rows).
    pub fn screen_row_for_buffer_row(&self, buffer: &TextBuffer, buffer_row: usize) -> usize {
        self.translate_buffer_position(buffer, Point::new(buffer_row, 0), ClipDirection::Backward)
            .row
    }

    /// First buffer row of the display line containing `buffer_row`.
    pub fn find_boundary_preceding_buffer_row(&self, buffer: &TextBuffer, buffer_row: usize) -> usize {
        let layout = self.layout(buffer);
        layout.display_line_for_buffer_row(buffer_row).start_row
    }

    /// First buffer row of the display line after the one containing `buffer_row`, or
    /// `buffer_row` itself if a display line starts there.
    pub fn find_boundary_following_buffer_row(&self, buffer: &TextBuffer, buffer_row: usize) -> usize {
        let line_count = buffer.text().line_count();
        if buffer_row >= line_count {
            return line_count;
        }
        let layout = self.layout(buffer);
        let display_line = layout.display_line_for_buffer_row(buffer_row);
        if display_line.start_row == buffer_row {
            buffer_row
        } else {
            display_line.end_row + 1
        }
    }

    /// Screen row of the first screen line of the display line containing `screen_row`.
    pub fn first_screen_row_of_display_line(&self, buffer: &TextBuffer, screen_row: usize) -> usize {
        self.layout(buffer)
            .display_line_for_screen_row(screen_row)
            .first_screen_row
    }

    /// Fold `range`. Empty ranges are ignored.
    pub fn fold_buffer_range(&mut self, buffer: &mut TextBuffer, range: Range) -> Option<MarkerId> {
        let range = buffer.text().clip_range(range);
        if range.is_empty() {
            return None;
        }
        let id = buffer.markers_mut().mark_range(
            self.fold_layer,
            range,
            MarkerOptions::exclusive(InvalidationStrategy::Overlap),
        )?;
        self.invalidate();
        tracing::debug!(range = %range, "folded buffer range");
        Some(id)
    }

    /// Remove one fold.
    pub fn destroy_fold(&mut self, buffer: &mut TextBuffer, id: MarkerId) -> bool {
        self.invalidate();
        buffer.markers_mut().destroy_marker(self.fold_layer, id)
    }

    /// Every fold, ordered by start position.
    pub fn folds(&self, buffer: &TextBuffer) -> Vec<(MarkerId, Range)> {
        buffer
            .markers()
            .layer(self.fold_layer)
            .map(|layer| layer.markers().into_iter().map(|m| (m.id, m.range)).collect())
            .unwrap_or_default()
    }

    /// Folds intersecting `range` (touching folds included).
    pub fn folds_intersecting_buffer_range(&self, buffer: &TextBuffer, range: Range) -> Vec<(MarkerId, Range)> {
        buffer
            .markers()
            .layer(self.fold_layer)
            .map(|layer| {
                layer
                    .find_markers_intersecting_range(range, false)
                    .into_iter()
                    .map(|m| (m.id, m.range))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns true if any fold touches `buffer_row`.
    pub fn is_folded_at_buffer_row(&self, buffer: &TextBuffer, buffer_row: usize) -> bool {
        let row_range = Range::new(
            Point::new(buffer_row, 0),
            Point::new(buffer_row, buffer.text().line_length_for_row(buffer_row)),
        );
        !self.folds_intersecting_buffer_range(buffer, row_range).is_empty()
    }

    fn destroy_folds(&mut self, buffer: &mut TextBuffer, folds: Vec<(MarkerId, Range)>) -> Vec<Range> {
        for (id, _) in &folds {
            buffer.markers_mut().destroy_marker(self.fold_layer, *id);
        }
        if !folds.is_empty() {
            self.invalidate();
        }
        folds.into_iter().map(|(_, range)| range).collect()
    }

    /// Remove the folds intersecting `range`, returning their ranges.
    pub fn destroy_folds_intersecting_buffer_range(&mut self, buffer: &mut TextBuffer, range: Range) -> Vec<Range> {
        let folds = self.folds_intersecting_buffer_range(buffer, range);
        self.destroy_folds(buffer, folds)
    }

    /// Remove the folds containing any of `positions`, returning their ranges.
    ///
    /// With `exclude_endpoints`, a fold starting or ending exactly at a position survives.
    pub fn destroy_folds_containing_buffer_positions(
        &mut self,
        buffer: &mut TextBuffer,
        positions: &[Point],
        exclude_endpoints: bool,
    ) -> Vec<Range> {
        let folds: Vec<(MarkerId, Range)> = self
            .folds(buffer)
            .into_iter()
            .filter(|(_, range)| {
                positions.iter().any(|&p| {
                    if exclude_endpoints {
                        range.contains_point_exclusive(p)
                    } else {
                        range.contains_point(p)
                    }
                })
            })
            .collect();
        self.destroy_folds(buffer, folds)
    }

    /// Remove every fold, returning their ranges.
    pub fn destroy_all_folds(&mut self, buffer: &mut TextBuffer) -> Vec<Range> {
        let folds = self.folds(buffer);
        self.destroy_folds(buffer, folds)
    }

    fn merged_folds(&self, text: &BufferText, buffer: &TextBuffer) -> Vec<Range> {
        let mut merged: Vec<Range> = Vec::new();
        let Some(layer) = buffer.markers().layer(self.fold_layer) else {
            return merged;
        };
        for marker in layer.markers() {
            if !marker.valid {
                continue;
            }
            let range = text.clip_range(marker.range);
            if range.is_empty() {
                continue;
            }
            match merged.last_mut() {
                Some(last) if range.start < last.end => last.end = last.end.max(range.end),
                _ => merged.push(range),
            }
        }
        merged
    }

    fn build_layout(&self, buffer: &TextBuffer) -> ScreenLayout {
        let text = buffer.text();
        let folds = self.merged_folds(text, buffer);
        let mut layout = ScreenLayout::default();
        let mut fold_index = 0usize;
        let mut row = 0usize;
        let line_count = text.line_count();

        while row < line_count {
            let mut units = Vec::new();
            let mut x = 0usize;
            let mut cursor = Point::new(row, 0);
            let mut line = text.line_for_row(row);
            let mut bounds = whitespace_bounds(&line);
            let first_line = line.clone();

            loop {
                while fold_index < folds.len() && folds[fold_index].start < cursor {
                    fold_index += 1;
                }
                let line_length = line.chars().count();
                let fold = folds
                    .get(fold_index)
                    .filter(|f| f.start.row == cursor.row && f.start.column <= line_length)
                    .copied();
                let end_column = fold.map_or(line_length, |f| f.start.column);
                self.push_text_units(
                    &mut units,
                    &mut x,
                    &line,
                    cursor.row,
                    cursor.column,
                    end_column,
                    bounds,
                    cursor.row == row,
                );
                let Some(fold) = fold else {
                    break;
                };
                units.push(Unit {
                    kind: SpanKind::Fold,
                    screen_text: FOLD_PLACEHOLDER.to_string(),
                    buffer_start: fold.start,
                    buffer_end: fold.end,
                    cells: 1,
                    is_whitespace: false,
                });
                x += 1;
                fold_index += 1;
                if fold.end.row != cursor.row {
                    line = text.line_for_row(fold.end.row);
                    bounds = whitespace_bounds(&line);
                }
                cursor = fold.end;
            }

            let end_row = cursor.row;
            let line_ending = text.line_ending_for_row(end_row);
            let first_screen_row = layout.screen_lines.len();
            self.push_screen_lines(&mut layout.screen_lines, units, &first_line, row, line_ending);
            layout.display_lines.push(DisplayLine {
                start_row: row,
                end_row,
                first_screen_row,
                screen_row_count: layout.screen_lines.len() - first_screen_row,
            });
            row = end_row + 1;
        }
        layout
    }

    #[allow(clippy::too_many_arguments)]
    fn push_text_units(
        &self,
        units: &mut Vec<Unit>,
        x: &mut usize,
        line: &str,
        row: usize,
        start_column: usize,
        end_column: usize,
        (leading_end, trailing_start): (usize, usize),
        at_row_start: bool,
    ) {
        let tab_length = self.settings.tab_length.max(1);
        let show = self.settings.show_invisibles;
        let glyphs = &self.settings.invisibles;
        let mut clusters = Vec::new();
        let mut column = 0usize;
        for grapheme in line.graphemes(true) {
            let len = grapheme.chars().count();
            if column >= start_column && column + len <= end_column {
                clusters.push((column, grapheme));
            } else if column < end_column && column + len > start_column {
                // A fold cut through this cluster: keep the chars on our side as plain text.
                for (offset, (byte, ch)) in grapheme.char_indices().enumerate() {
                    let c = column + offset;
                    if c >= start_column && c < end_column {
                        clusters.push((c, &grapheme[byte..byte + ch.len_utf8()]));
                    }
                }
            }
            column += len;
        }

        let mut index = 0usize;
        while index < clusters.len() {
            let (column, grapheme) = clusters[index];
            let start = Point::new(row, column);

            if self.settings.atomic_soft_tabs
                && at_row_start
                && grapheme == " "
                && column + tab_length <= leading_end
                && *x % tab_length == 0
                && clusters
                    .get(index..index + tab_length)
                    .is_some_and(|run| run.iter().enumerate().all(|(i, (c, g))| *g == " " && *c == column + i))
            {
                let glyph = if show { glyphs.space.unwrap_or(' ') } else { ' ' };
                units.push(Unit {
                    kind: SpanKind::AtomicSoftTab,
                    screen_text: std::iter::repeat_n(glyph, tab_length).collect(),
                    buffer_start: start,
                    buffer_end: start.translate(0, tab_length as isize),
                    cells: tab_length,
                    is_whitespace: true,
                });
                *x += tab_length;
                index += tab_length;
                continue;
            }

            if grapheme == "\t" {
                let cells = layout::cell_width_at('\t', *x, tab_length);
                let mut screen_text = String::with_capacity(cells);
                match glyphs.tab.filter(|_| show) {
                    Some(glyph) => {
                        screen_text.push(glyph);
                        screen_text.extend(std::iter::repeat_n(' ', cells - 1));
                    }
                    None => screen_text.extend(std::iter::repeat_n(' ', cells)),
                }
                units.push(Unit {
                    kind: SpanKind::HardTab,
                    screen_text,
                    buffer_start: start,
                    buffer_end: start.translate(0, 1),
                    cells,
                    is_whitespace: true,
                });
                *x += cells;
                index += 1;
                continue;
            }

            let len = grapheme.chars().count();
            let (kind, cells, is_whitespace, screen_text) = if len > 1 {
                (SpanKind::Cluster, grapheme.width(), false, grapheme.to_string())
            } else {
                let ch = grapheme.chars().next().unwrap_or(' ');
                let visible = match glyphs.space {
                    Some(glyph) if show && ch == ' ' && (column < leading_end || column >= trailing_start) => glyph,
                    _ => ch,
                };
                (
                    SpanKind::Text,
                    layout::char_width(ch),
                    ch.is_whitespace(),
                    visible.to_string(),
                )
            };
            units.push(Unit {
                kind,
                screen_text,
                buffer_start: start,
                buffer_end: start.translate(0, len as isize),
                cells,
                is_whitespace,
            });
            *x += cells;
            index += 1;
        }
    }

    fn push_screen_lines(
        &self,
        screen_lines: &mut Vec<ScreenLine>,
        units: Vec<Unit>,
        first_line: &str,
        row: usize,
        line_ending: LineEnding,
    ) {
        let settings = &self.settings;
        let (wrap_points, indent) = if settings.soft_wrap && settings.soft_wrap_column > 0 {
            let indent = layout::soft_wrap_indent_columns(
                first_line,
                settings.soft_wrap_hanging_indent,
                settings.soft_wrap_column,
                settings.tab_length,
            );
            let layout_units: Vec<LayoutUnit> = units
                .iter()
                .map(|u| LayoutUnit {
                    cells: u.cells,
                    is_whitespace: u.is_whitespace,
                })
                .collect();
            (
                layout::soft_wrap_points(&layout_units, settings.soft_wrap_column, indent),
                indent,
            )
        } else {
            (Vec::new(), 0)
        };

        let mut boundaries = Vec::with_capacity(wrap_points.len() + 2);
        boundaries.push(0);
        boundaries.extend(wrap_points);
        boundaries.push(units.len());
        let segment_count = boundaries.len() - 1;

        for segment in 0..segment_count {
            let segment_units = &units[boundaries[segment]..boundaries[segment + 1]];
            let is_last = segment + 1 == segment_count;
            let soft_wrap_indent = if segment == 0 { 0 } else { indent };
            let mut text = String::new();
            let mut spans: Vec<ScreenSpan> = Vec::new();
            let mut column = 0usize;

            let segment_start = segment_units
                .first()
                .map_or(Point::new(row, 0), |u| u.buffer_start);
            if soft_wrap_indent > 0 {
                text.extend(std::iter::repeat_n(' ', soft_wrap_indent));
                spans.push(ScreenSpan {
                    kind: SpanKind::SoftWrapIndent,
                    screen_start: 0,
                    screen_end: soft_wrap_indent,
                    buffer_start: segment_start,
                    buffer_end: segment_start,
                });
                column = soft_wrap_indent;
            }

            for unit in segment_units {
                let width = unit.screen_text.chars().count();
                text.push_str(&unit.screen_text);
                match spans.last_mut() {
                    Some(last)
                        if unit.kind == SpanKind::Text
                            && last.kind == SpanKind::Text
                            && last.buffer_end == unit.buffer_start =>
                    {
                        last.screen_end += width;
                        last.buffer_end = unit.buffer_end;
                    }
                    _ => spans.push(ScreenSpan {
                        kind: unit.kind,
                        screen_start: column,
                        screen_end: column + width,
                        buffer_start: unit.buffer_start,
                        buffer_end: unit.buffer_end,
                    }),
                }
                column += width;
            }

            let content_end = column;
            let buffer_end = segment_units.last().map_or(segment_start, |u| u.buffer_end);
            if is_last && settings.show_invisibles {
                let glyphs = &settings.invisibles;
                let mut eol = String::new();
                match line_ending {
                    LineEnding::Crlf => eol.extend(glyphs.cr.into_iter().chain(glyphs.eol)),
                    LineEnding::Lf => eol.extend(glyphs.eol),
                    LineEnding::Cr => eol.extend(glyphs.cr),
                    LineEnding::None => {}
                }
                if !eol.is_empty() {
                    let width = eol.chars().count();
                    text.push_str(&eol);
                    spans.push(ScreenSpan {
                        kind: SpanKind::LineEnding,
                        screen_start: column,
                        screen_end: column + width,
                        buffer_start: buffer_end,
                        buffer_end,
                    });
                }
            }

            screen_lines.push(ScreenLine {
                screen_row: screen_lines.len(),
                text,
                spans,
                buffer_start: segment_start,
                buffer_end,
                soft_wrap_indent,
                content_end,
                soft_wrapped: !is_last,
            });
        }
    }
}

/// Char columns `(end of leading whitespace, start of trailing whitespace)` of `line`.
fn whitespace_bounds(line: &str) -> (usize, usize) {
    let mut leading_end = 0usize;
    let mut trailing_start = 0usize;
    let mut in_leading = true;
    for (column, ch) in line.chars().enumerate() {
        let is_space = ch == ' ' || ch == '\t';
        if in_leading && is_space {
            leading_end = column + 1;
        } else {
            in_leading = false;
        }
        if !is_space {
            trailing_start = column + 1;
        }
    }
    (leading_end, trailing_start)
}

fn clip_screen_position_in(layout: &ScreenLayout, position: Point, options: ClipOptions) -> Point {
    let last_row = layout.screen_lines.len().saturating_sub(1);
    let (row, column) = if position.row > last_row {
        (last_row, INFINITY)
    } else {
        (position.row, position.column)
    };
    let line = &layout.screen_lines[row];
    let first = line.first_column();
    let max = line.max_column();

    if column > max {
        if options.direction == ClipDirection::Forward && line.soft_wrapped {
            let next = &layout.screen_lines[row + 1];
            return Point::new(row + 1, next.first_column());
        }
        return Point::new(row, max);
    }

    if column < first {
        if options.direction == ClipDirection::Backward && !options.skip_soft_wrap_indentation && row > 0 {
            let previous = &layout.screen_lines[row - 1];
            return Point::new(row - 1, previous.max_column());
        }
        return Point::new(row, first);
    }

    let Some(span) = line.atomic_span_around(column) else {
        return Point::new(row, column);
    };
    let end_is_valid = span.screen_end <= max;
    let snap_forward = match options.direction {
        ClipDirection::Backward => false,
        ClipDirection::Forward => true,
        ClipDirection::Closest => column - span.screen_start > span.screen_end - column,
    };
    if !snap_forward {
        return Point::new(row, span.screen_start);
    }
    if end_is_valid {
        return Point::new(row, span.screen_end);
    }
    if options.direction == ClipDirection::Forward && line.soft_wrapped {
        let next = &layout.screen_lines[row + 1];
        return Point::new(row + 1, next.first_column());
    }
    Point::new(row, span.screen_start)
}
