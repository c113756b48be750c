use super::TreeSitterLanguageMode;
use crate::fold_spec::fold_range_for_node;
use editor_display::{BufferText, INFINITY, Point, Range};
use tree_sitter::Node;

fn fold_range(mode: &TreeSitterLanguageMode, text: &BufferText, node: Node<'_>) -> Option<Range> {
    fold_range_for_node(
        mode.grammar.folds(),
        node,
        text,
        mode.fold_nodes.contains(&node.id()),
    )
}

fn row_at(text: &BufferText, byte: usize) -> usize {
    text.position_for_byte_index(byte).row
}

/// Fold ranges of the whole tree, sorted by start row. A later fold spanning the same rows as an
/// earlier one replaces it.
///
/// With a `goal_level`, only folds nested exactly that many folds deep are returned (a child
/// spanning the same rows as its parent does not count as a level of its own).
pub(super) fn foldable_ranges_at_indent_level(
    mode: &TreeSitterLanguageMode,
    text: &BufferText,
    goal_level: Option<usize>,
) -> Vec<Range> {
    let Some(tree) = mode.tree.as_ref().filter(|_| mode.alive) else {
        return Vec::new();
    };

    let mut result: Vec<Range> = Vec::new();
    let mut stack = vec![(tree.root_node(), 0usize)];
    while let Some((node, level)) = stack.pop() {
        let range = fold_range(mode, text, node);
        if let Some(range) = range
            && goal_level.is_none_or(|goal| goal == level)
        {
            match result
                .iter_mut()
                .find(|r| r.start.row == range.start.row && r.end.row == range.end.row)
            {
                Some(existing) => *existing = range,
                None => result.push(range),
            }
        }

        let parent_start_row = row_at(text, node.start_byte());
        let parent_end_row = row_at(text, node.end_byte());
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            let child_start = text.position_for_byte_index(child.start_byte());
            let child_end = text.position_for_byte_index(child.end_byte());
            if child_end.row <= child_start.row {
                continue;
            }
            if child_start.row == parent_start_row && child_end.row == parent_end_row {
                stack.push((child, level));
                continue;
            }
            let child_level = match range {
                Some(range) if range.contains_point(child_start) && range.contains_point(child_end) => {
                    level + 1
                }
                _ => level,
            };
            if goal_level.is_none_or(|goal| child_level <= goal) {
                stack.push((child, child_level));
            }
        }
    }

    result.sort_by_key(|range| range.start.row);
    result
}

/// The innermost fold around `point`.
///
/// With `existence_only`, the search stops at the first node starting above `point`'s row, which
/// is enough to tell whether a fold starts on that row.
pub(super) fn foldable_range_containing_point(
    mode: &TreeSitterLanguageMode,
    text: &BufferText,
    point: Point,
    existence_only: bool,
) -> Option<Range> {
    let tree = mode.tree.as_ref().filter(|_| mode.alive)?;
    let point = text.clip_position(point);
    let byte = text.byte_index_for_position(point);

    let mut node = tree.root_node().descendant_for_byte_range(byte, byte);
    while let Some(current) = node {
        if existence_only && row_at(text, current.start_byte()) < point.row {
            return None;
        }
        if row_at(text, current.end_byte()) > point.row
            && let Some(range) = fold_range(mode, text, current)
        {
            return Some(range);
        }
        node = current.parent();
    }
    None
}

pub(super) fn is_foldable_at_row(mode: &TreeSitterLanguageMode, text: &BufferText, row: usize) -> bool {
    if !mode.alive || row > text.last_row() {
        return false;
    }
    if let Some(Some(cached)) = mode.is_foldable_cache.borrow().get(row) {
        return *cached;
    }

    let foldable = foldable_range_containing_point(mode, text, Point::new(row, INFINITY), true)
        .is_some_and(|range| range.start.row == row);

    let mut cache = mode.is_foldable_cache.borrow_mut();
    if cache.len() <= row {
        cache.resize(text.line_count().max(row + 1), None);
    }
    cache[row] = Some(foldable);
    foldable
}
