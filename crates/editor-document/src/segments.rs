//! Tracked text segments.
//!
//! A [`TextSegmentCollection`] stores `[start, end)` ranges in a red-black tree ordered by
//! start offset. Start offsets are delta-encoded: each node stores the distance from the start
//! of its in-order predecessor, so shifting every segment behind an edit only touches one node
//! and its path to the root. Each subtree also caches the largest segment end it contains,
//! which lets overlap queries skip subtrees that end before the query range.
//!
//! When an edit happens, segment starts move like after-insertion anchors and ends like
//! before-insertion anchors. Removals shrink segments down to zero length but never delete
//! them.

use tracing::trace;

use crate::change::{DocumentChangeEvent, OffsetChangeMapEntry};
use crate::document::{ChangeListener, Document};
use crate::rb_tree::{Augment, NodeId, RbTree};
use crate::segment::Segment;

/// Stable handle to a segment inside a [`TextSegmentCollection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentId(NodeId);

/// A segment together with its current bounds, as returned by queries.
#[derive(Debug)]
pub struct SegmentEntry<'a, T> {
    /// Handle of the segment.
    pub id: SegmentId,
    /// Current start offset.
    pub start_offset: usize,
    /// Current length.
    pub length: usize,
    /// Value attached to the segment.
    pub value: &'a T,
}

impl<T> Clone for SegmentEntry<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SegmentEntry<'_, T> {}

impl<T> Segment for SegmentEntry<'_, T> {
    fn offset(&self) -> usize {
        self.start_offset
    }

    fn length(&self) -> usize {
        self.length
    }
}

struct SegmentNode<T> {
    /// Distance from the start of the in-order predecessor (or from 0 for the first node).
    node_length: usize,
    segment_length: usize,
    value: T,
}

/// Subtree aggregate. `max_end` is relative to the start of the segment preceding the subtree.
#[derive(Debug, Clone, Default, PartialEq)]
struct SegmentSummary {
    total_node_length: usize,
    max_end: usize,
}

impl<T> Augment for SegmentNode<T> {
    type Summary = SegmentSummary;

    fn summarize(
        &self,
        left: Option<&SegmentSummary>,
        right: Option<&SegmentSummary>,
    ) -> SegmentSummary {
        let left = left.cloned().unwrap_or_default();
        let start = left.total_node_length + self.node_length;
        let mut max_end = left.max_end.max(start + self.segment_length);
        let mut total_node_length = start;
        if let Some(right) = right {
            max_end = max_end.max(start + right.max_end);
            total_node_length += right.total_node_length;
        }
        SegmentSummary {
            total_node_length,
            max_end,
        }
    }
}

enum Position {
    Root,
    Before(NodeId),
    After(NodeId),
}

/// Collection of segments that keep their position as the text around them is edited.
///
/// A collection only follows a document once it is registered with
/// [`Document::add_change_listener`]; otherwise [`Self::update_offsets`] must be called for
/// every change.
pub struct TextSegmentCollection<T> {
    tree: RbTree<SegmentNode<T>>,
}

impl<T> Default for TextSegmentCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TextSegmentCollection<T> {
    /// Empty collection.
    pub fn new() -> Self {
        Self {
            tree: RbTree::new(),
        }
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Whether the collection holds no segments.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Whether `id` refers to a segment of this collection.
    pub fn contains(&self, id: SegmentId) -> bool {
        self.tree.contains(id.0)
    }

    /// Adds a segment covering `start..start + length`.
    pub fn add(&mut self, start: usize, length: usize, value: T) -> SegmentId {
        let node = SegmentNode {
            node_length: 0,
            segment_length: length,
            value,
        };
        let id = match self.position_for(start) {
            (Position::Root, node_length) => self.tree.insert_root(SegmentNode {
                node_length,
                ..node
            }),
            (Position::Before(at), node_length) => self.tree.insert_before(
                at,
                SegmentNode {
                    node_length,
                    ..node
                },
            ),
            (Position::After(at), node_length) => self.tree.insert_after(
                at,
                SegmentNode {
                    node_length,
                    ..node
                },
            ),
        };
        SegmentId(id)
    }

    /// Removes a segment and returns its value.
    pub fn remove(&mut self, id: SegmentId) -> Option<T> {
        if !self.contains(id) {
            return None;
        }
        self.unlink(id.0);
        Some(self.tree.remove(id.0).value)
    }

    /// Moves the segment to `start..start + length`, keeping its id.
    pub fn set_range(&mut self, id: SegmentId, start: usize, length: usize) -> bool {
        if !self.contains(id) {
            return false;
        }
        self.unlink(id.0);
        self.tree.detach(id.0);
        let (position, node_length) = self.position_for(start);
        {
            let node = self.tree.get_mut(id.0);
            node.node_length = node_length;
            node.segment_length = length;
        }
        match position {
            Position::Root => self.tree.reattach_root(id.0),
            Position::Before(at) => self.tree.reattach_before(at, id.0),
            Position::After(at) => self.tree.reattach_after(at, id.0),
        }
        true
    }

    /// Changes the length of a segment without moving its start.
    pub fn set_length(&mut self, id: SegmentId, length: usize) -> bool {
        if !self.contains(id) {
            return false;
        }
        self.tree.get_mut(id.0).segment_length = length;
        self.tree.update_augmented(id.0);
        true
    }

    /// Removes every segment.
    pub fn clear(&mut self) {
        self.tree.clear();
    }

    /// The segment with handle `id`.
    pub fn get(&self, id: SegmentId) -> Option<SegmentEntry<'_, T>> {
        self.contains(id).then(|| self.entry(id.0))
    }

    /// Mutable access to the value of a segment.
    pub fn value_mut(&mut self, id: SegmentId) -> Option<&mut T> {
        if !self.contains(id) {
            return None;
        }
        Some(&mut self.tree.get_mut(id.0).value)
    }

    /// Current start offset of a segment.
    pub fn start_offset(&self, id: SegmentId) -> Option<usize> {
        self.contains(id).then(|| self.start_of(id.0))
    }

    /// Current end offset of a segment.
    pub fn end_offset(&self, id: SegmentId) -> Option<usize> {
        self.contains(id)
            .then(|| self.start_of(id.0) + self.tree.get(id.0).segment_length)
    }

    /// Segment with the smallest start offset.
    pub fn first_segment(&self) -> Option<SegmentEntry<'_, T>> {
        self.tree.first().map(|id| self.entry(id))
    }

    /// Segment with the largest start offset.
    pub fn last_segment(&self) -> Option<SegmentEntry<'_, T>> {
        self.tree.last().map(|id| self.entry(id))
    }

    /// Segment following `id` in start-offset order.
    pub fn next_segment(&self, id: SegmentId) -> Option<SegmentEntry<'_, T>> {
        if !self.contains(id) {
            return None;
        }
        self.tree.next(id.0).map(|id| self.entry(id))
    }

    /// Segment preceding `id` in start-offset order.
    pub fn previous_segment(&self, id: SegmentId) -> Option<SegmentEntry<'_, T>> {
        if !self.contains(id) {
            return None;
        }
        self.tree.prev(id.0).map(|id| self.entry(id))
    }

    /// Iterates all segments in start-offset order.
    pub fn iter(&self) -> impl Iterator<Item = SegmentEntry<'_, T>> + '_ {
        let mut offset = 0;
        self.tree.iter().map(move |id| {
            let node = self.tree.get(id);
            offset += node.node_length;
            SegmentEntry {
                id: SegmentId(id),
                start_offset: offset,
                length: node.segment_length,
                value: &node.value,
            }
        })
    }

    /// First segment starting at or after `offset`.
    pub fn find_first_segment_with_start_after(&self, offset: usize) -> Option<SegmentEntry<'_, T>> {
        self.first_node_with_start_after(offset)
            .map(|id| self.entry(id))
    }

    /// Segments containing `offset`, including segments that start or end at it.
    pub fn find_segments_containing(&self, offset: usize) -> Vec<SegmentEntry<'_, T>> {
        self.find_overlapping_segments(offset, 0)
    }

    /// Segments overlapping `offset..offset + length`. Touching endpoints count as overlap.
    pub fn find_overlapping_segments(&self, offset: usize, length: usize) -> Vec<SegmentEntry<'_, T>> {
        self.overlapping_ids(offset, length)
            .into_iter()
            .map(|id| self.entry(id))
            .collect()
    }

    /// Applies every entry of a document change.
    pub fn update_offsets(&mut self, event: &DocumentChangeEvent) {
        for entry in event.offset_change_map().entries() {
            self.update_offsets_for_entry(entry);
        }
    }

    /// Applies a single offset change.
    pub fn update_offsets_for_entry(&mut self, change: &OffsetChangeMapEntry) {
        trace!(
            offset = change.offset,
            removal = change.removal_length,
            insertion = change.insertion_length,
            segments = self.len(),
            "updating segment offsets"
        );
        if change.removal_length == 0 {
            self.insert_text(change.offset, change.insertion_length);
        } else {
            self.replace_text(change);
        }
        #[cfg(debug_assertions)]
        self.check_invariants();
    }

    fn insert_text(&mut self, offset: usize, length: usize) {
        if length == 0 {
            return;
        }
        // Grow segments that strictly contain the insertion point.
        for id in self.overlapping_ids(offset, 0) {
            let start = self.start_of(id);
            let segment_length = self.tree.get(id).segment_length;
            if start < offset && offset < start + segment_length {
                self.tree.get_mut(id).segment_length = segment_length + length;
                self.tree.update_augmented(id);
            }
        }
        if let Some(node) = self.first_node_with_start_after(offset) {
            self.tree.get_mut(node).node_length += length;
            self.tree.update_augmented(node);
        }
    }

    fn replace_text(&mut self, change: &OffsetChangeMapEntry) {
        let offset = change.offset;
        let removal_end = change.removal_end();
        for id in self.overlapping_ids(offset, change.removal_length) {
            let start = self.start_of(id);
            let end = start + self.tree.get(id).segment_length;
            if start <= offset {
                let new_length = if end >= removal_end {
                    // Replacement inside the segment.
                    end - start + change.insertion_length - change.removal_length
                } else {
                    // Replacement runs past the segment end: cut the segment at the edit point.
                    offset - start
                };
                self.tree.get_mut(id).segment_length = new_length;
                self.tree.update_augmented(id);
            } else {
                // Replacement runs into the segment from the front: keep the end, move the start
                // behind the removed range. The shift below brings it to the edit point.
                let remaining = end.saturating_sub(removal_end);
                self.move_node(id, removal_end, remaining);
            }
        }
        if let Some(node) = self.first_node_with_start_after(offset + 1) {
            let node_length = self.tree.get(node).node_length;
            debug_assert!(node_length >= change.removal_length);
            self.tree.get_mut(node).node_length =
                (node_length + change.insertion_length).saturating_sub(change.removal_length);
            self.tree.update_augmented(node);
        }
    }

    fn move_node(&mut self, id: NodeId, start: usize, length: usize) {
        self.unlink(id);
        self.tree.detach(id);
        let (position, node_length) = self.position_for(start);
        {
            let node = self.tree.get_mut(id);
            node.node_length = node_length;
            node.segment_length = length;
        }
        match position {
            Position::Root => self.tree.reattach_root(id),
            Position::Before(at) => self.tree.reattach_before(at, id),
            Position::After(at) => self.tree.reattach_after(at, id),
        }
    }

    fn entry(&self, id: NodeId) -> SegmentEntry<'_, T> {
        let node = self.tree.get(id);
        SegmentEntry {
            id: SegmentId(id),
            start_offset: self.start_of(id),
            length: node.segment_length,
            value: &node.value,
        }
    }

    fn total_node_length(&self, id: Option<NodeId>) -> usize {
        id.map_or(0, |id| self.tree.summary(id).total_node_length)
    }

    fn start_of(&self, id: NodeId) -> usize {
        let mut offset = self.tree.get(id).node_length + self.total_node_length(self.tree.left(id));
        let mut node = id;
        while let Some(parent) = self.tree.parent(node) {
            if self.tree.right(parent) == Some(node) {
                offset += self.total_node_length(self.tree.left(parent))
                    + self.tree.get(parent).node_length;
            }
            node = parent;
        }
        offset
    }

    /// Gives the successor the node length of `id` before `id` leaves the tree.
    fn unlink(&mut self, id: NodeId) {
        if let Some(successor) = self.tree.next(id) {
            let node_length = self.tree.get(id).node_length;
            self.tree.get_mut(successor).node_length += node_length;
            self.tree.update_augmented(successor);
        }
    }

    /// Finds where a segment starting at `start` goes. When it goes in front of an existing
    /// node, that node's length is already shortened accordingly.
    fn position_for(&mut self, start: usize) -> (Position, usize) {
        let Some(root) = self.tree.root() else {
            return (Position::Root, start);
        };
        let total = self.tree.summary(root).total_node_length;
        if start >= total {
            return (Position::After(self.tree.rightmost(root)), start - total);
        }
        match self.find_node(start) {
            (Some(node), remaining) => {
                self.tree.get_mut(node).node_length -= remaining;
                self.tree.update_augmented(node);
                (Position::Before(node), remaining)
            }
            (None, _) => (Position::After(self.tree.rightmost(root)), start - total),
        }
    }

    /// First node starting after `offset`, and the distance from its predecessor's start to
    /// `offset`. `None` when no node starts after `offset`; the distance is then measured from
    /// the last node's start.
    fn find_node(&self, offset: usize) -> (Option<NodeId>, usize) {
        let mut offset = offset;
        let mut current = self.tree.root();
        while let Some(node) = current {
            let left_total = self.total_node_length(self.tree.left(node));
            if offset < left_total {
                current = self.tree.left(node);
                continue;
            }
            offset -= left_total;
            let node_length = self.tree.get(node).node_length;
            if offset < node_length {
                return (Some(node), offset);
            }
            offset -= node_length;
            current = self.tree.right(node);
        }
        (None, offset)
    }

    fn first_node_with_start_after(&self, offset: usize) -> Option<NodeId> {
        let root = self.tree.root()?;
        if offset == 0 {
            return Some(self.tree.leftmost(root));
        }
        let (mut node, mut remaining) = self.find_node(offset);
        // A zero distance means the predecessor starts exactly at `offset`; walk back over all
        // segments that start there.
        while remaining == 0 {
            let previous = match node {
                Some(n) => self.tree.prev(n)?,
                None => self.tree.rightmost(root),
            };
            remaining += self.tree.get(previous).node_length;
            node = Some(previous);
        }
        node
    }

    fn overlapping_ids(&self, offset: usize, length: usize) -> Vec<NodeId> {
        let mut results = Vec::new();
        if let Some(root) = self.tree.root() {
            let low = offset as isize;
            self.collect_overlapping(&mut results, root, low, low + length as isize);
        }
        results
    }

    /// `low` and `high` are relative to the start of the segment preceding `node`'s subtree.
    fn collect_overlapping(&self, results: &mut Vec<NodeId>, node: NodeId, low: isize, high: isize) {
        if high < 0 || (self.tree.summary(node).max_end as isize) < low {
            return;
        }
        let left = self.tree.left(node);
        let shift = (self.total_node_length(left) + self.tree.get(node).node_length) as isize;
        let (node_low, node_high) = (low - shift, high - shift);
        if let Some(left) = left {
            self.collect_overlapping(results, left, low, high);
        }
        if node_high < 0 {
            return;
        }
        if node_low <= self.tree.get(node).segment_length as isize {
            results.push(node);
        }
        if let Some(right) = self.tree.right(node) {
            self.collect_overlapping(results, right, node_low, node_high);
        }
    }

    /// Asserts the tree structure and cached aggregates.
    #[cfg(any(test, debug_assertions))]
    pub(crate) fn check_invariants(&self) {
        self.tree.check_invariants();
    }
}

impl<T> ChangeListener for TextSegmentCollection<T> {
    fn document_changed(&mut self, _document: &Document, event: &DocumentChangeEvent) {
        self.update_offsets(event);
    }
}
