//! Per-editor selections stored as markers.
//!
//! Every selection is a marker in the editor's own selection layer of the shared buffer, so
//! edits made through any editor move it automatically. The cursor is the selection's head.
//! Goal columns (the column vertical movement tries to return to) live next to the marker ids.

use crate::ids::{MarkerId, MarkerLayerId};
use crate::marker::{InvalidationStrategy, MarkerOptions, MarkerStore};
use crate::point::{Point, Range};
use crate::text_buffer::SavedSelection;

/// A snapshot of one selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionState {
    /// Marker backing the selection.
    pub id: MarkerId,
    /// Buffer range.
    pub range: Range,
    /// Whether the head (cursor) is at the start of the range.
    pub reversed: bool,
    /// Screen column vertical movement aims for.
    pub goal_column: Option<usize>,
}

impl SelectionState {
    /// The cursor position.
    pub fn head(&self) -> Point {
        if self.reversed { self.range.start } else { self.range.end }
    }

    /// The anchored end.
    pub fn tail(&self) -> Point {
        if self.reversed { self.range.end } else { self.range.start }
    }

    /// Returns true if the selection is just a cursor.
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    marker: MarkerId,
    goal_column: Option<usize>,
}

/// The selections of one editor, in creation order.
#[derive(Debug)]
pub(crate) struct SelectionSet {
    layer: MarkerLayerId,
    entries: Vec<Entry>,
}

fn selection_options(reversed: bool) -> MarkerOptions {
    MarkerOptions {
        reversed,
        invalidate: InvalidationStrategy::Never,
        ..MarkerOptions::default()
    }
}

impl SelectionSet {
    /// Create the selection layer with a single cursor at the origin.
    pub(crate) fn new(markers: &mut MarkerStore) -> Self {
        let layer = markers.add_layer(false);
        let mut set = Self {
            layer,
            entries: Vec::new(),
        };
        set.ensure_one(markers);
        set
    }

    pub(crate) fn layer(&self) -> MarkerLayerId {
        self.layer
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn contains(&self, id: MarkerId) -> bool {
        self.entries.iter().any(|e| e.marker == id)
    }

    pub(crate) fn state(&self, markers: &MarkerStore, id: MarkerId) -> Option<SelectionState> {
        let entry = self.entries.iter().find(|e| e.marker == id)?;
        let marker = markers.marker(self.layer, entry.marker)?;
        Some(SelectionState {
            id: entry.marker,
            range: marker.range,
            reversed: marker.reversed,
            goal_column: entry.goal_column,
        })
    }

    /// Every selection in creation order.
    pub(crate) fn states(&self, markers: &MarkerStore) -> Vec<SelectionState> {
        self.entries
            .iter()
            .filter_map(|e| self.state(markers, e.marker))
            .collect()
    }

    /// Every selection ordered by buffer position.
    pub(crate) fn ordered_states(&self, markers: &MarkerStore) -> Vec<SelectionState> {
        let mut states = self.states(markers);
        states.sort_by(|a, b| {
            a.range
                .start
                .cmp(&b.range.start)
                .then_with(|| a.range.end.cmp(&b.range.end))
        });
        states
    }

    pub(crate) fn last(&self, markers: &MarkerStore) -> Option<SelectionState> {
        let entry = self.entries.last()?;
        self.state(markers, entry.marker)
    }

    pub(crate) fn add(&mut self, markers: &mut MarkerStore, range: Range, reversed: bool) -> Option<MarkerId> {
        let marker = markers.mark_range(self.layer, range, selection_options(reversed))?;
        self.entries.push(Entry {
            marker,
            goal_column: None,
        });
        Some(marker)
    }

    pub(crate) fn set_range(&mut self, markers: &mut MarkerStore, id: MarkerId, range: Range, reversed: bool) {
        markers.set_marker_range(self.layer, id, range, reversed);
    }

    pub(crate) fn set_goal_column(&mut self, id: MarkerId, goal_column: Option<usize>) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.marker == id) {
            entry.goal_column = goal_column;
        }
    }

    /// Remove a selection. The last one is never removed; it collapses to the origin instead.
    pub(crate) fn destroy(&mut self, markers: &mut MarkerStore, id: MarkerId) {
        self.destroy_allowing_empty(markers, id);
        self.ensure_one(markers);
    }

    fn destroy_allowing_empty(&mut self, markers: &mut MarkerStore, id: MarkerId) {
        markers.destroy_marker(self.layer, id);
        self.entries.retain(|e| e.marker != id);
    }

    fn ensure_one(&mut self, markers: &mut MarkerStore) {
        if self.entries.is_empty() {
            self.add(markers, Range::empty_at(Point::zero()), false);
        }
    }

    /// Remove every selection except the first one.
    pub(crate) fn consolidate(&mut self, markers: &mut MarkerStore) -> bool {
        if self.entries.len() <= 1 {
            return false;
        }
        for entry in self.entries.split_off(1) {
            markers.destroy_marker(self.layer, entry.marker);
        }
        true
    }

    /// Destroy every cursor whose position duplicates an earlier cursor's.
    pub(crate) fn merge_cursors(&mut self, markers: &mut MarkerStore) {
        let mut seen = Vec::new();
        for state in self.states(markers) {
            let head = state.head();
            if seen.contains(&head) {
                self.destroy_allowing_empty(markers, state.id);
            } else {
                seen.push(head);
            }
        }
    }

    /// Merge selections that intersect, walking them in buffer order.
    ///
    /// Two non-empty selections must overlap to merge; a cursor merges with anything it touches.
    /// The survivor keeps its `reversed` flag unless `reversed` overrides it.
    pub(crate) fn merge_intersecting(&mut self, markers: &mut MarkerStore, reversed: Option<bool>) {
        let mut ordered = self.ordered_states(markers).into_iter();
        let Some(mut previous) = ordered.next() else {
            return;
        };
        for current in ordered {
            let exclusive = !current.is_empty() && !previous.is_empty();
            if previous.range.intersects_with(&current.range, exclusive) {
                let union = previous.range.union(&current.range);
                let reversed = reversed.unwrap_or(previous.reversed);
                self.set_range(markers, previous.id, union, reversed);
                self.destroy_allowing_empty(markers, current.id);
                previous.range = union;
                previous.reversed = reversed && !union.is_empty();
            } else {
                previous = current;
            }
        }
    }

    /// Selections as recorded in undo history.
    pub(crate) fn saved(&self, markers: &MarkerStore) -> Vec<SavedSelection> {
        self.states(markers)
            .into_iter()
            .map(|s| SavedSelection {
                range: s.range,
                reversed: s.reversed,
            })
            .collect()
    }

    /// Replace every selection with `saved`.
    pub(crate) fn restore(&mut self, markers: &mut MarkerStore, saved: &[SavedSelection]) {
        if saved.is_empty() {
            return;
        }
        for entry in std::mem::take(&mut self.entries) {
            markers.destroy_marker(self.layer, entry.marker);
        }
        for selection in saved {
            self.add(markers, selection.range, selection.reversed);
        }
    }

    /// Remove the selection layer.
    pub(crate) fn destroy_layer(&mut self, markers: &mut MarkerStore) {
        markers.destroy_layer(self.layer);
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_with(ranges: &[(Range, bool)]) -> (MarkerStore, SelectionSet) {
        let mut markers = MarkerStore::new();
        let mut set = SelectionSet::new(&mut markers);
        let first = set.last(&markers).unwrap().id;
        set.set_range(&mut markers, first, ranges[0].0, ranges[0].1);
        for (range, reversed) in &ranges[1..] {
            set.add(&mut markers, *range, *reversed);
        }
        (markers, set)
    }

    #[test]
    fn test_starts_with_a_cursor_at_the_origin() {
        let mut markers = MarkerStore::new();
        let set = SelectionSet::new(&mut markers);
        let states = set.states(&markers);
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].head(), Point::zero());
    }

    #[test]
    fn test_merge_cursors_keeps_first_of_duplicates() {
        let p = Point::new(0, 2);
        let (mut markers, mut set) = set_with(&[
            (Range::empty_at(p), false),
            (Range::empty_at(Point::new(1, 0)), false),
            (Range::empty_at(p), false),
        ]);
        set.merge_cursors(&mut markers);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_touching_selections_do_not_merge_but_cursors_do() {
        let (mut markers, mut set) = set_with(&[
            (Range::new((0, 0), (0, 3)), false),
            (Range::new((0, 3), (0, 6)), false),
        ]);
        set.merge_intersecting(&mut markers, None);
        assert_eq!(set.len(), 2);

        let (mut markers, mut set) = set_with(&[
            (Range::new((0, 0), (0, 3)), false),
            (Range::empty_at(Point::new(0, 3)), false),
        ]);
        set.merge_intersecting(&mut markers, None);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_merge_keeps_previous_reversed_flag_unless_overridden() {
        let (mut markers, mut set) = set_with(&[
            (Range::new((0, 0), (0, 4)), true),
            (Range::new((0, 2), (0, 8)), false),
        ]);
        set.merge_intersecting(&mut markers, None);
        let merged = set.states(&markers)[0];
        assert_eq!(merged.range, Range::new((0, 0), (0, 8)));
        assert!(merged.reversed);

        let (mut markers, mut set) = set_with(&[
            (Range::new((0, 0), (0, 4)), true),
            (Range::new((0, 2), (0, 8)), false),
        ]);
        set.merge_intersecting(&mut markers, Some(false));
        assert!(!set.states(&markers)[0].reversed);
    }

    #[test]
    fn test_destroying_the_last_selection_recreates_a_cursor() {
        let mut markers = MarkerStore::new();
        let mut set = SelectionSet::new(&mut markers);
        let id = set.last(&markers).unwrap().id;
        set.set_range(&mut markers, id, Range::new((1, 0), (1, 2)), false);
        set.destroy(&mut markers, id);
        let states = set.states(&markers);
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].range, Range::empty_at(Point::zero()));
    }
}
