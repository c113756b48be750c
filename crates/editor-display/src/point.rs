//! Buffer and screen coordinates.
//!
//! Both buffer positions and screen positions are represented by [`Point`]. The two flavors share
//! a representation but not a meaning: a buffer point addresses raw characters of a buffer row,
//! a screen point addresses rendered columns after folds, tabs, soft wraps and invisibles.
//!
//! Columns count Unicode scalar values (`char`s). A column (or row) of `usize::MAX` is accepted
//! everywhere as "end of row" / "end of document" and is clipped, never rejected.

use std::cmp::Ordering;
use std::fmt;

/// Sentinel used for "end of row" or "end of document".
pub const INFINITY: usize = usize::MAX;

/// A `(row, column)` coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Point {
    /// Zero-based row.
    pub row: usize,
    /// Zero-based column (in `char`s).
    pub column: usize,
}

impl Point {
    /// Create a new point.
    pub const fn new(row: usize, column: usize) -> Self {
        Self { row, column }
    }

    /// The origin `(0, 0)`.
    pub const fn zero() -> Self {
        Self { row: 0, column: 0 }
    }

    /// A point at the end of `row`.
    pub const fn end_of_row(row: usize) -> Self {
        Self {
            row,
            column: INFINITY,
        }
    }

    /// Returns true if the column is the "end of row" sentinel.
    pub fn is_end_of_row(self) -> bool {
        self.column == INFINITY
    }

    /// Add a row/column delta to this point (saturating).
    pub fn translate(self, row_delta: isize, column_delta: isize) -> Self {
        Self {
            row: offset(self.row, row_delta),
            column: offset(self.column, column_delta),
        }
    }

    /// Traverse by an extent: if the extent spans rows, the column is replaced rather than added.
    pub fn traverse(self, extent: Point) -> Self {
        if extent.row == 0 {
            Self::new(self.row, self.column.saturating_add(extent.column))
        } else {
            Self::new(self.row.saturating_add(extent.row), extent.column)
        }
    }

    /// Inverse of [`Point::traverse`]: the extent from `origin` to `self`.
    pub fn traversal_from(self, origin: Point) -> Self {
        if self.row == origin.row {
            Self::new(0, self.column.saturating_sub(origin.column))
        } else {
            Self::new(self.row.saturating_sub(origin.row), self.column)
        }
    }

    /// Lexicographic minimum.
    pub fn min(self, other: Point) -> Point {
        if self <= other { self } else { other }
    }

    /// Lexicographic maximum.
    pub fn max(self, other: Point) -> Point {
        if self >= other { self } else { other }
    }
}

fn offset(value: usize, delta: isize) -> usize {
    if delta >= 0 {
        value.saturating_add(delta as usize)
    } else {
        value.saturating_sub(delta.unsigned_abs())
    }
}

impl Ord for Point {
    fn cmp(&self, other: &Self) -> Ordering {
        self.row
            .cmp(&other.row)
            .then_with(|| self.column.cmp(&other.column))
    }
}

impl PartialOrd for Point {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<(usize, usize)> for Point {
    fn from((row, column): (usize, usize)) -> Self {
        Self::new(row, column)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.column == INFINITY {
            write!(f, "({}, ∞)", self.row)
        } else {
            write!(f, "({}, {})", self.row, self.column)
        }
    }
}

/// An ordered pair of points with `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Range {
    /// Inclusive start.
    pub start: Point,
    /// Exclusive end.
    pub end: Point,
}

impl Range {
    /// Create a range, swapping the endpoints if they are out of order.
    pub fn new(a: impl Into<Point>, b: impl Into<Point>) -> Self {
        let a = a.into();
        let b = b.into();
        if a <= b {
            Self { start: a, end: b }
        } else {
            Self { start: b, end: a }
        }
    }

    /// A zero-width range at `point`.
    pub fn empty_at(point: Point) -> Self {
        Self {
            start: point,
            end: point,
        }
    }

    /// Returns true when `start == end`.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Returns true if the range spans a single row.
    pub fn is_single_line(&self) -> bool {
        self.start.row == self.end.row
    }

    /// Row span as `(start_row, end_row)`.
    pub fn rows(&self) -> (usize, usize) {
        (self.start.row, self.end.row)
    }

    /// Returns true if `point` lies within the range (inclusive on both ends).
    pub fn contains_point(&self, point: Point) -> bool {
        self.start <= point && point <= self.end
    }

    /// Returns true if `point` lies strictly inside the range.
    pub fn contains_point_exclusive(&self, point: Point) -> bool {
        self.start < point && point < self.end
    }

    /// Returns true if `other` lies entirely within this range.
    pub fn contains_range(&self, other: &Range) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Returns true if `row` is covered by this range.
    pub fn intersects_row(&self, row: usize) -> bool {
        self.start.row <= row && row <= self.end.row
    }

    /// Returns true if the two ranges share at least one point.
    ///
    /// With `exclusive`, ranges that merely touch at an endpoint do not intersect.
    pub fn intersects_with(&self, other: &Range, exclusive: bool) -> bool {
        if exclusive {
            self.start < other.end && other.start < self.end
        } else {
            self.start <= other.end && other.start <= self.end
        }
    }

    /// Smallest range covering both.
    pub fn union(&self, other: &Range) -> Range {
        Range {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Translate both endpoints.
    pub fn translate(&self, start_delta: (isize, isize), end_delta: (isize, isize)) -> Range {
        Range::new(
            self.start.translate(start_delta.0, start_delta.1),
            self.end.translate(end_delta.0, end_delta.1),
        )
    }

    /// Translate both endpoints by a row delta only.
    pub fn translate_rows(&self, delta: isize) -> Range {
        self.translate((delta, 0), (delta, 0))
    }
}

impl<A: Into<Point>, B: Into<Point>> From<(A, B)> for Range {
    fn from((a, b): (A, B)) -> Self {
        Range::new(a, b)
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} - {}]", self.start, self.end)
    }
}

/// Direction to snap a position that lands on an invalid location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClipDirection {
    /// Snap toward the start of the document.
    Backward,
    /// Snap toward the end of the document.
    Forward,
    /// Snap to whichever side is nearer (ties snap backward).
    #[default]
    Closest,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_points_order_lexicographically() {
        assert!(Point::new(1, 10) < Point::new(2, 0));
        assert!(Point::new(2, 1) > Point::new(2, 0));
        assert_eq!(Point::new(3, 4).min(Point::new(3, 2)), Point::new(3, 2));
    }

    #[test]
    fn test_range_normalizes_endpoints() {
        let r = Range::new((4, 0), (1, 3));
        assert_eq!(r.start, Point::new(1, 3));
        assert_eq!(r.end, Point::new(4, 0));
    }

    #[test]
    fn test_traverse_and_traversal_from() {
        let p = Point::new(2, 5);
        assert_eq!(p.traverse(Point::new(0, 3)), Point::new(2, 8));
        assert_eq!(p.traverse(Point::new(1, 3)), Point::new(3, 3));
        assert_eq!(Point::new(3, 3).traversal_from(p), Point::new(1, 3));
        assert_eq!(Point::new(2, 8).traversal_from(p), Point::new(0, 3));
    }

    #[test]
    fn test_intersection_respects_exclusivity() {
        let a = Range::new((0, 0), (0, 5));
        let b = Range::new((0, 5), (0, 9));
        assert!(a.intersects_with(&b, false));
        assert!(!a.intersects_with(&b, true));
    }

    #[test]
    fn test_translate_saturates_at_zero() {
        assert_eq!(Point::new(1, 1).translate(-3, -3), Point::zero());
    }
}
