//! Position-tracking markers.
//!
//! Markers live in layers. A buffer owns one [`MarkerStore`]; every editor attached to the buffer
//! creates its own layers (selections, folds, decorations) so that cursor and fold state stays
//! per-editor while the text is shared.
//!
//! All markers of all layers are moved by a single pass in [`MarkerStore::splice`] for each
//! buffer change.

use crate::buffer_text::BufferChange;
use crate::ids::{MarkerId, MarkerLayerId};
use crate::point::{Point, Range};
use std::collections::BTreeMap;

/// Which edits invalidate a marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvalidationStrategy {
    /// The marker is never invalidated.
    Never,
    /// Invalidated by changes that completely surround it.
    Surround,
    /// Invalidated by changes that overlap its interior or surround it.
    #[default]
    Overlap,
    /// Invalidated by changes entirely inside it.
    Inside,
    /// Invalidated by any change that touches it, including at its boundaries.
    Touch,
}

/// Options used when creating a marker.
#[derive(Debug, Clone, Default)]
pub struct MarkerOptions {
    /// Whether the head precedes the tail.
    pub reversed: bool,
    /// Whether insertions at the boundaries stay outside the marker.
    pub exclusive: bool,
    /// Invalidation strategy.
    pub invalidate: InvalidationStrategy,
    /// Arbitrary string properties (decoration classes, fold markers, ...).
    pub properties: BTreeMap<String, String>,
}

impl MarkerOptions {
    /// Options for an exclusive marker with the given strategy.
    pub fn exclusive(invalidate: InvalidationStrategy) -> Self {
        Self {
            exclusive: true,
            invalidate,
            ..Self::default()
        }
    }
}

/// A tracked range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    /// Id of the marker.
    pub id: MarkerId,
    /// Current range.
    pub range: Range,
    /// Whether the head is at `range.start`.
    pub reversed: bool,
    /// Whether insertions at the boundaries stay outside the marker.
    pub exclusive: bool,
    /// Invalidation strategy.
    pub invalidate: InvalidationStrategy,
    /// Cleared once an edit invalidates the marker.
    pub valid: bool,
    /// Arbitrary string properties.
    pub properties: BTreeMap<String, String>,
}

impl Marker {
    /// The moving end of the marker.
    pub fn head(&self) -> Point {
        if self.reversed {
            self.range.start
        } else {
            self.range.end
        }
    }

    /// The anchored end of the marker.
    pub fn tail(&self) -> Point {
        if self.reversed {
            self.range.end
        } else {
            self.range.start
        }
    }

    fn invalidated_by(&self, change: &BufferChange) -> bool {
        let start = change.old_range.start;
        let end = change.old_range.end;
        let m = self.range;
        match self.invalidate {
            InvalidationStrategy::Never => false,
            InvalidationStrategy::Surround => start < end && start <= m.start && end >= m.end,
            InvalidationStrategy::Overlap => start < m.end && end > m.start,
            InvalidationStrategy::Inside => {
                start >= m.start && end <= m.end && !(start == end && (start == m.start || start == m.end))
            }
            InvalidationStrategy::Touch => start <= m.end && end >= m.start,
        }
    }

    fn splice(&mut self, change: &BufferChange) {
        let empty = self.range.is_empty();
        let start = map_point(self.range.start, Endpoint::Start, self.exclusive, empty, change);
        let end = map_point(self.range.end, Endpoint::End, self.exclusive, empty, change);
        self.range = Range::new(start, end);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    Start,
    End,
}

fn map_point(
    point: Point,
    endpoint: Endpoint,
    exclusive: bool,
    empty: bool,
    change: &BufferChange,
) -> Point {
    let start = change.old_range.start;
    let old_end = change.old_range.end;
    let new_end = change.new_range.end;

    if point < start {
        return point;
    }
    if point > old_end {
        return if point.row == old_end.row {
            Point::new(new_end.row, new_end.column + (point.column - old_end.column))
        } else {
            Point::new(
                (point.row as isize + change.row_delta()).max(0) as usize,
                point.column,
            )
        };
    }

    if start == old_end {
        // Pure insertion exactly at `point`.
        return match (empty, endpoint, exclusive) {
            (true, _, true) => point,
            (true, _, false) => new_end,
            (false, Endpoint::Start, true) => new_end,
            (false, Endpoint::Start, false) => point,
            (false, Endpoint::End, true) => point,
            (false, Endpoint::End, false) => new_end,
        };
    }

    if point == start {
        point
    } else if point == old_end || empty || endpoint == Endpoint::End {
        new_end
    } else {
        start
    }
}

/// A namespace of markers.
#[derive(Debug, Clone, Default)]
pub struct MarkerLayer {
    id: Option<MarkerLayerId>,
    markers: BTreeMap<MarkerId, Marker>,
    destroy_invalidated: bool,
}

impl MarkerLayer {
    /// Id of this layer.
    pub fn id(&self) -> Option<MarkerLayerId> {
        self.id
    }

    /// Number of markers.
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    /// Returns true if the layer has no markers.
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Look up a marker.
    pub fn marker(&self, id: MarkerId) -> Option<&Marker> {
        self.markers.get(&id)
    }

    /// All markers, ordered by start then end position.
    pub fn markers(&self) -> Vec<&Marker> {
        let mut out: Vec<&Marker> = self.markers.values().collect();
        out.sort_by(|a, b| {
            a.range
                .start
                .cmp(&b.range.start)
                .then_with(|| a.range.end.cmp(&b.range.end))
        });
        out
    }

    /// Markers intersecting `range`. With `exclusive`, touching markers are excluded.
    pub fn find_markers_intersecting_range(&self, range: Range, exclusive: bool) -> Vec<&Marker> {
        self.markers()
            .into_iter()
            .filter(|m| m.range.intersects_with(&range, exclusive))
            .collect()
    }

    /// Markers whose rows cover `row`.
    pub fn find_markers_intersecting_row(&self, row: usize) -> Vec<&Marker> {
        self.markers()
            .into_iter()
            .filter(|m| m.range.intersects_row(row))
            .collect()
    }

    /// Markers that contain `point` (boundaries included).
    pub fn find_markers_containing_point(&self, point: Point) -> Vec<&Marker> {
        self.markers()
            .into_iter()
            .filter(|m| m.range.contains_point(point))
            .collect()
    }
}

/// All marker layers of one buffer.
#[derive(Debug, Clone, Default)]
pub struct MarkerStore {
    next_id: u64,
    layers: BTreeMap<MarkerLayerId, MarkerLayer>,
}

impl MarkerStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn next_raw(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Create a layer. With `destroy_invalidated`, invalidated markers are removed on splice.
    pub fn add_layer(&mut self, destroy_invalidated: bool) -> MarkerLayerId {
        let id = MarkerLayerId::from_raw(self.next_raw());
        self.layers.insert(
            id,
            MarkerLayer {
                id: Some(id),
                markers: BTreeMap::new(),
                destroy_invalidated,
            },
        );
        id
    }

    /// Remove a layer and all of its markers.
    pub fn destroy_layer(&mut self, id: MarkerLayerId) -> bool {
        self.layers.remove(&id).is_some()
    }

    /// Look up a layer.
    pub fn layer(&self, id: MarkerLayerId) -> Option<&MarkerLayer> {
        self.layers.get(&id)
    }

    /// Number of live layers.
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Create a marker in `layer`.
    pub fn mark_range(
        &mut self,
        layer: MarkerLayerId,
        range: Range,
        options: MarkerOptions,
    ) -> Option<MarkerId> {
        let id = MarkerId::from_raw(self.next_raw());
        let layer = self.layers.get_mut(&layer)?;
        layer.markers.insert(
            id,
            Marker {
                id,
                range,
                reversed: options.reversed && !range.is_empty(),
                exclusive: options.exclusive,
                invalidate: options.invalidate,
                valid: true,
                properties: options.properties,
            },
        );
        Some(id)
    }

    /// Look up a marker.
    pub fn marker(&self, layer: MarkerLayerId, id: MarkerId) -> Option<&Marker> {
        self.layers.get(&layer)?.markers.get(&id)
    }

    /// Move a marker.
    pub fn set_marker_range(
        &mut self,
        layer: MarkerLayerId,
        id: MarkerId,
        range: Range,
        reversed: bool,
    ) -> bool {
        let Some(marker) = self
            .layers
            .get_mut(&layer)
            .and_then(|l| l.markers.get_mut(&id))
        else {
            return false;
        };
        marker.range = range;
        marker.reversed = reversed && !range.is_empty();
        true
    }

    /// Replace a marker property.
    pub fn set_marker_property(
        &mut self,
        layer: MarkerLayerId,
        id: MarkerId,
        key: &str,
        value: impl Into<String>,
    ) {
        if let Some(marker) = self
            .layers
            .get_mut(&layer)
            .and_then(|l| l.markers.get_mut(&id))
        {
            marker.properties.insert(key.to_string(), value.into());
        }
    }

    /// Remove a marker.
    pub fn destroy_marker(&mut self, layer: MarkerLayerId, id: MarkerId) -> bool {
        self.layers
            .get_mut(&layer)
            .is_some_and(|l| l.markers.remove(&id).is_some())
    }

    /// Remove every marker of a layer, keeping the layer.
    pub fn clear_layer(&mut self, layer: MarkerLayerId) {
        if let Some(layer) = self.layers.get_mut(&layer) {
            layer.markers.clear();
        }
    }

    /// Apply a buffer change to every marker of every layer.
    pub fn splice(&mut self, change: &BufferChange) {
        for layer in self.layers.values_mut() {
            let mut destroyed = Vec::new();
            for marker in layer.markers.values_mut() {
                if marker.valid && marker.invalidated_by(change) {
                    marker.valid = false;
                    if layer.destroy_invalidated {
                        destroyed.push(marker.id);
                        continue;
                    }
                }
                marker.splice(change);
            }
            for id in destroyed {
                layer.markers.remove(&id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer_text::BufferText;

    fn change(text: &mut BufferText, range: Range, new_text: &str) -> BufferChange {
        text.set_text_in_range(range, new_text)
    }

    #[test]
    fn test_markers_shift_after_edits_on_the_same_row() {
        let mut text = BufferText::from_text("hello world");
        let mut store = MarkerStore::new();
        let layer = store.add_layer(false);
        let id = store
            .mark_range(layer, Range::new((0, 6), (0, 11)), MarkerOptions::default())
            .unwrap();

        let c = change(&mut text, Range::new((0, 0), (0, 0)), ">> ");
        store.splice(&c);
        assert_eq!(store.marker(layer, id).unwrap().range, Range::new((0, 9), (0, 14)));
    }

    #[test]
    fn test_exclusive_markers_do_not_absorb_boundary_insertions() {
        let mut text = BufferText::from_text("abcdef");
        let mut store = MarkerStore::new();
        let layer = store.add_layer(false);
        let inclusive = store
            .mark_range(layer, Range::new((0, 2), (0, 4)), MarkerOptions::default())
            .unwrap();
        let exclusive = store
            .mark_range(
                layer,
                Range::new((0, 2), (0, 4)),
                MarkerOptions::exclusive(InvalidationStrategy::Never),
            )
            .unwrap();

        let c = change(&mut text, Range::new((0, 4), (0, 4)), "XY");
        store.splice(&c);
        assert_eq!(store.marker(layer, inclusive).unwrap().range.end, Point::new(0, 6));
        assert_eq!(store.marker(layer, exclusive).unwrap().range.end, Point::new(0, 4));
    }

    #[test]
    fn test_empty_marker_follows_insertion() {
        let mut text = BufferText::from_text("ab");
        let mut store = MarkerStore::new();
        let layer = store.add_layer(false);
        let cursor = store
            .mark_range(layer, Range::empty_at(Point::new(0, 1)), MarkerOptions::default())
            .unwrap();
        let c = change(&mut text, Range::empty_at(Point::new(0, 1)), "\nxx");
        store.splice(&c);
        assert_eq!(store.marker(layer, cursor).unwrap().range.start, Point::new(1, 2));
    }

    #[test]
    fn test_overlap_invalidation_destroys_markers_when_requested() {
        let mut text = BufferText::from_text("a\nb\nc\nd\n");
        let mut store = MarkerStore::new();
        let layer = store.add_layer(true);
        store
            .mark_range(
                layer,
                Range::new((0, 1), (2, 1)),
                MarkerOptions::exclusive(InvalidationStrategy::Overlap),
            )
            .unwrap();
        let c = change(&mut text, Range::new((1, 0), (1, 1)), "B");
        store.splice(&c);
        assert!(store.layer(layer).unwrap().is_empty());
    }

    #[test]
    fn test_row_deletion_shifts_following_markers() {
        let mut text = BufferText::from_text("a\nb\nc\nd");
        let mut store = MarkerStore::new();
        let layer = store.add_layer(false);
        let id = store
            .mark_range(layer, Range::new((3, 0), (3, 1)), MarkerOptions::default())
            .unwrap();
        let c = change(&mut text, Range::new((0, 0), (2, 0)), "");
        store.splice(&c);
        assert_eq!(store.marker(layer, id).unwrap().range, Range::new((1, 0), (1, 1)));
    }
}
