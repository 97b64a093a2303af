//! Line index: a red-black tree of document lines.
//!
//! Each node is one physical line and stores its total length (text plus delimiter) and its
//! delimiter length. Subtree aggregates (total length and line count) turn "line by number"
//! and "line by offset" into `O(log n)` rank searches, and a line's number and start offset
//! are derived from its position in the tree rather than stored.

use crate::rb_tree::{Augment, NodeId, RbTree};
use crate::segment::Segment;

/// Stable handle to a line.
///
/// The handle stays valid while the line exists, even as lines before it are inserted or
/// removed. Once the line is merged away or removed, [`crate::Document::line_by_id`] returns
/// `None` for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineId(pub(crate) NodeId);

/// Snapshot of one line, taken when it was queried.
///
/// Line numbers are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentLine {
    /// Handle of the line.
    pub id: LineId,
    /// 1-based line number.
    pub line_number: usize,
    /// Start offset of the line.
    pub offset: usize,
    /// Length including the delimiter.
    pub total_length: usize,
    /// Length of the delimiter (0 for the last line, 1 for `\n`/`\r`, 2 for `\r\n`).
    pub delimiter_length: usize,
}

impl DocumentLine {
    /// Length excluding the delimiter.
    pub fn length(&self) -> usize {
        self.total_length - self.delimiter_length
    }

    /// End offset excluding the delimiter.
    pub fn end_offset(&self) -> usize {
        self.offset + self.length()
    }

    /// End offset including the delimiter.
    pub fn end_offset_with_delimiter(&self) -> usize {
        self.offset + self.total_length
    }
}

impl Segment for DocumentLine {
    fn offset(&self) -> usize {
        self.offset
    }

    fn length(&self) -> usize {
        DocumentLine::length(self)
    }
}

#[derive(Debug)]
pub(crate) struct LineNode {
    pub(crate) total_length: usize,
    pub(crate) delimiter_length: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct LineSummary {
    total_length: usize,
    count: usize,
}

impl Augment for LineNode {
    type Summary = LineSummary;

    fn summarize(&self, left: Option<&LineSummary>, right: Option<&LineSummary>) -> LineSummary {
        let mut summary = LineSummary {
            total_length: self.total_length,
            count: 1,
        };
        for child in [left, right].into_iter().flatten() {
            summary.total_length += child.total_length;
            summary.count += child.count;
        }
        summary
    }
}

/// The document's line index. Always holds at least one line.
pub(crate) struct LineTree {
    tree: RbTree<LineNode>,
}

impl LineTree {
    pub(crate) fn new() -> Self {
        let mut tree = RbTree::new();
        tree.insert_root(LineNode {
            total_length: 0,
            delimiter_length: 0,
        });
        Self { tree }
    }

    fn root(&self) -> NodeId {
        match self.tree.root() {
            Some(root) => root,
            None => unreachable!("line tree always holds at least one line"),
        }
    }

    pub(crate) fn line_count(&self) -> usize {
        self.tree.summary(self.root()).count
    }

    pub(crate) fn text_length(&self) -> usize {
        self.tree.summary(self.root()).total_length
    }

    pub(crate) fn contains(&self, id: LineId) -> bool {
        self.tree.contains(id.0)
    }

    fn left_summary(&self, id: NodeId) -> LineSummary {
        self.tree
            .left(id)
            .map(|l| self.tree.summary(l).clone())
            .unwrap_or_default()
    }

    /// Line with the given 1-based number.
    pub(crate) fn get_by_number(&self, number: usize) -> Option<LineId> {
        if number == 0 || number > self.line_count() {
            return None;
        }
        let mut index = number - 1;
        let mut node = self.root();
        loop {
            let left_count = self.left_summary(node).count;
            if index < left_count {
                node = self.tree.left(node)?;
            } else if index == left_count {
                return Some(LineId(node));
            } else {
                index -= left_count + 1;
                node = self.tree.right(node)?;
            }
        }
    }

    /// Line containing `offset`. The end of the text maps to the last line.
    pub(crate) fn get_by_offset(&self, offset: usize) -> Option<LineId> {
        let text_length = self.text_length();
        if offset > text_length {
            return None;
        }
        if offset == text_length {
            return self.tree.last().map(LineId);
        }
        let mut offset = offset;
        let mut node = self.root();
        loop {
            let left_total = self.left_summary(node).total_length;
            if offset < left_total {
                node = self.tree.left(node)?;
                continue;
            }
            offset -= left_total;
            let own = self.tree.get(node).total_length;
            if offset < own {
                return Some(LineId(node));
            }
            offset -= own;
            node = self.tree.right(node)?;
        }
    }

    pub(crate) fn line_number_of(&self, id: LineId) -> usize {
        let mut number = self.left_summary(id.0).count + 1;
        let mut node = id.0;
        while let Some(parent) = self.tree.parent(node) {
            if self.tree.right(parent) == Some(node) {
                number += self.left_summary(parent).count + 1;
            }
            node = parent;
        }
        number
    }

    pub(crate) fn offset_of(&self, id: LineId) -> usize {
        let mut offset = self.left_summary(id.0).total_length;
        let mut node = id.0;
        while let Some(parent) = self.tree.parent(node) {
            if self.tree.right(parent) == Some(node) {
                offset += self.left_summary(parent).total_length + self.tree.get(parent).total_length;
            }
            node = parent;
        }
        offset
    }

    pub(crate) fn line(&self, id: LineId) -> DocumentLine {
        let node = self.tree.get(id.0);
        DocumentLine {
            id,
            line_number: self.line_number_of(id),
            offset: self.offset_of(id),
            total_length: node.total_length,
            delimiter_length: node.delimiter_length,
        }
    }

    pub(crate) fn total_length(&self, id: LineId) -> usize {
        self.tree.get(id.0).total_length
    }

    pub(crate) fn delimiter_length(&self, id: LineId) -> usize {
        self.tree.get(id.0).delimiter_length
    }

    pub(crate) fn set_total_length(&mut self, id: LineId, total_length: usize) {
        self.tree.get_mut(id.0).total_length = total_length;
        self.tree.update_augmented(id.0);
    }

    pub(crate) fn set_delimiter_length(&mut self, id: LineId, delimiter_length: usize) {
        self.tree.get_mut(id.0).delimiter_length = delimiter_length;
    }

    pub(crate) fn next(&self, id: LineId) -> Option<LineId> {
        self.tree.next(id.0).map(LineId)
    }

    pub(crate) fn prev(&self, id: LineId) -> Option<LineId> {
        self.tree.prev(id.0).map(LineId)
    }

    pub(crate) fn first(&self) -> LineId {
        LineId(self.tree.leftmost(self.root()))
    }

    pub(crate) fn insert_line_after(&mut self, id: LineId, total_length: usize) -> LineId {
        LineId(self.tree.insert_after(
            id.0,
            LineNode {
                total_length,
                delimiter_length: 0,
            },
        ))
    }

    pub(crate) fn remove_line(&mut self, id: LineId) {
        debug_assert!(self.tree.len() > 1, "the last line cannot be removed");
        self.tree.remove(id.0);
    }

    /// Replaces all lines with `(total_length, delimiter_length)` pairs, in order.
    pub(crate) fn rebuild(&mut self, lines: Vec<(usize, usize)>) -> Vec<LineId> {
        let nodes = lines
            .into_iter()
            .map(|(total_length, delimiter_length)| LineNode {
                total_length,
                delimiter_length,
            })
            .collect();
        self.tree.rebuild(nodes).into_iter().map(LineId).collect()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = LineId> + '_ {
        self.tree.iter().map(LineId)
    }

    #[cfg(any(test, debug_assertions))]
    pub(crate) fn check_invariants(&self) {
        self.tree.check_invariants();
        assert!(self.tree.len() >= 1, "line tree must not be empty");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_of(lines: &[(usize, usize)]) -> LineTree {
        let mut tree = LineTree::new();
        tree.rebuild(lines.to_vec());
        tree
    }

    #[test]
    fn test_new_tree_has_one_empty_line() {
        let tree = LineTree::new();
        assert_eq!(tree.line_count(), 1);
        assert_eq!(tree.text_length(), 0);
        let line = tree.line(tree.get_by_offset(0).unwrap());
        assert_eq!(line.line_number, 1);
        assert_eq!(line.total_length, 0);
    }

    #[test]
    fn test_rank_queries() {
        // "abc\ndef\nghi"
        let tree = tree_of(&[(4, 1), (4, 1), (3, 0)]);
        assert_eq!(tree.text_length(), 11);
        let second = tree.get_by_number(2).unwrap();
        assert_eq!(tree.offset_of(second), 4);
        assert_eq!(tree.line_number_of(tree.get_by_offset(5).unwrap()), 2);
        assert_eq!(tree.line_number_of(tree.get_by_offset(3).unwrap()), 1);
        assert_eq!(tree.line_number_of(tree.get_by_offset(8).unwrap()), 3);
        assert_eq!(tree.line_number_of(tree.get_by_offset(11).unwrap()), 3);
        assert!(tree.get_by_offset(12).is_none());
        assert!(tree.get_by_number(0).is_none());
        assert!(tree.get_by_number(4).is_none());
    }

    #[test]
    fn test_insert_and_remove_lines() {
        let mut tree = LineTree::new();
        let mut last = tree.first();
        tree.set_total_length(last, 2);
        tree.set_delimiter_length(last, 1);
        for i in 0..500 {
            last = tree.insert_line_after(last, 2);
            tree.set_delimiter_length(last, 1);
            if i % 100 == 0 {
                tree.check_invariants();
            }
        }
        assert_eq!(tree.line_count(), 501);
        assert_eq!(tree.text_length(), 1002);
        let middle = tree.get_by_number(250).unwrap();
        assert_eq!(tree.offset_of(middle), 498);
        tree.remove_line(middle);
        tree.check_invariants();
        assert_eq!(tree.line_count(), 500);
        assert!(!tree.contains(middle));
        for (index, id) in tree.iter().enumerate() {
            assert_eq!(tree.line_number_of(id), index + 1);
            assert_eq!(tree.offset_of(id), index * 2);
        }
    }
}
