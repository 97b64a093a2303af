//! Visual heights of lines and collapsed (hidden) line ranges.
//!
//! A [`HeightTree`] mirrors the document's lines one node per line. Each node stores the line's
//! height, and subtree sums turn "which line is at y" and "where does line n start" into rank
//! searches. A collapsed section hides a contiguous range of lines: their height counts as zero
//! until the section is uncollapsed.
//!
//! Sections are recorded in two places. A node's *line* set lists sections that hide that line
//! alone; its *subtree* set lists sections that hide the node and everything below it. Marking a
//! range therefore touches `O(log n)` nodes. Subtree marks are pushed down to the children before
//! a rotation or a structural edit near the node, so their meaning never changes when the shape
//! of the tree does.
//!
//! Registered as a [`LineTracker`], the tree follows line insertions and removals: a line inserted
//! inside a collapsed range is collapsed too, and a section whose first or last line is removed
//! shrinks to the remaining lines.

use std::collections::HashMap;

use tracing::trace;

use crate::error::{DocumentError, Result};
use crate::line_manager::LineTracker;
use crate::line_tree::DocumentLine;
use crate::rb_tree::{Augment, NodeId, RbTree};

/// Handle to a collapsed section of a [`HeightTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CollapsedSectionId(u64);

/// Current extent of a collapsed section, in 1-based line numbers (inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollapsedSection {
    /// First hidden line.
    pub start_line: usize,
    /// Last hidden line.
    pub end_line: usize,
}

#[derive(Debug, Clone, Copy)]
struct SectionNodes {
    start: NodeId,
    end: NodeId,
}

#[derive(Debug)]
struct HeightNode {
    height: f64,
    line_sections: Vec<CollapsedSectionId>,
    subtree_sections: Vec<CollapsedSectionId>,
}

impl HeightNode {
    fn new(height: f64) -> Self {
        Self {
            height,
            line_sections: Vec::new(),
            subtree_sections: Vec::new(),
        }
    }

    /// Height of this line alone, ignoring marks on ancestors.
    fn own_height(&self) -> f64 {
        if self.line_sections.is_empty() && self.subtree_sections.is_empty() {
            self.height
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct HeightSummary {
    count: usize,
    total_height: f64,
}

impl Augment for HeightNode {
    type Summary = HeightSummary;

    fn summarize(
        &self,
        left: Option<&HeightSummary>,
        right: Option<&HeightSummary>,
    ) -> HeightSummary {
        let mut summary = HeightSummary {
            count: 1,
            total_height: self.own_height(),
        };
        for child in [left, right].into_iter().flatten() {
            summary.count += child.count;
            summary.total_height += child.total_height;
        }
        if !self.subtree_sections.is_empty() {
            summary.total_height = 0.0;
        }
        summary
    }

    fn before_rotate(tree: &mut RbTree<Self>, upper: NodeId, lower: NodeId) {
        push_down(tree, upper);
        push_down(tree, lower);
    }
}

fn add_unique(set: &mut Vec<CollapsedSectionId>, id: CollapsedSectionId) {
    if !set.contains(&id) {
        set.push(id);
    }
}

fn remove_from(set: &mut Vec<CollapsedSectionId>, id: CollapsedSectionId) -> bool {
    match set.iter().position(|s| *s == id) {
        Some(index) => {
            set.swap_remove(index);
            true
        }
        None => false,
    }
}

/// Moves the subtree marks of `id` onto its own line and onto its children's subtrees.
///
/// The subtree summary of `id` is unchanged, so ancestors need no update.
fn push_down(tree: &mut RbTree<HeightNode>, id: NodeId) {
    let sections = std::mem::take(&mut tree.get_mut(id).subtree_sections);
    if sections.is_empty() {
        return;
    }
    for child in [tree.left(id), tree.right(id)].into_iter().flatten() {
        let node = tree.get_mut(child);
        for &section in &sections {
            add_unique(&mut node.subtree_sections, section);
        }
        tree.refresh(child);
    }
    let node = tree.get_mut(id);
    for section in sections {
        add_unique(&mut node.line_sections, section);
    }
    tree.refresh(id);
}

/// Line heights and collapsed line ranges for one view of a document.
pub struct HeightTree {
    tree: RbTree<HeightNode>,
    default_line_height: f64,
    sections: HashMap<CollapsedSectionId, SectionNodes>,
    next_section: u64,
}

impl HeightTree {
    /// Creates a tree for `line_count` lines (at least one), all of `default_line_height`.
    pub fn new(line_count: usize, default_line_height: f64) -> Self {
        let mut tree = Self {
            tree: RbTree::new(),
            default_line_height,
            sections: HashMap::new(),
            next_section: 0,
        };
        tree.rebuild(line_count);
        tree
    }

    fn rebuild(&mut self, line_count: usize) {
        let nodes = (0..line_count.max(1))
            .map(|_| HeightNode::new(self.default_line_height))
            .collect();
        self.tree.rebuild(nodes);
        self.sections.clear();
    }

    fn root(&self) -> NodeId {
        match self.tree.root() {
            Some(root) => root,
            None => unreachable!("height tree always holds at least one line"),
        }
    }

    fn count_of(&self, id: Option<NodeId>) -> usize {
        id.map_or(0, |id| self.tree.summary(id).count)
    }

    fn height_of(&self, id: Option<NodeId>) -> f64 {
        id.map_or(0.0, |id| self.tree.summary(id).total_height)
    }

    /// Number of lines.
    pub fn line_count(&self) -> usize {
        self.tree.summary(self.root()).count
    }

    /// Sum of the heights of all visible lines.
    pub fn total_height(&self) -> f64 {
        self.tree.summary(self.root()).total_height
    }

    /// Height new lines are created with.
    pub fn default_line_height(&self) -> f64 {
        self.default_line_height
    }

    /// Changes the default height; lines that still had the old default take the new one.
    pub fn set_default_line_height(&mut self, height: f64) {
        let old = self.default_line_height;
        if old == height {
            return;
        }
        self.default_line_height = height;
        let ids: Vec<NodeId> = self.tree.iter().collect();
        for id in ids {
            if self.tree.get(id).height == old {
                self.tree.get_mut(id).height = height;
                self.tree.update_augmented(id);
            }
        }
    }

    fn node_at(&self, index: usize) -> Option<NodeId> {
        if index >= self.line_count() {
            return None;
        }
        let mut index = index;
        let mut node = self.root();
        loop {
            let left_count = self.count_of(self.tree.left(node));
            if index < left_count {
                node = self.tree.left(node)?;
            } else if index == left_count {
                return Some(node);
            } else {
                index -= left_count + 1;
                node = self.tree.right(node)?;
            }
        }
    }

    fn index_of(&self, id: NodeId) -> usize {
        let mut index = self.count_of(self.tree.left(id));
        let mut node = id;
        while let Some(parent) = self.tree.parent(node) {
            if self.tree.right(parent) == Some(node) {
                index += self.count_of(self.tree.left(parent)) + 1;
            }
            node = parent;
        }
        index
    }

    fn node_for_line(&self, line: usize) -> Result<NodeId> {
        line.checked_sub(1)
            .and_then(|index| self.node_at(index))
            .ok_or(DocumentError::LineOutOfRange {
                line,
                line_count: self.line_count(),
            })
    }

    /// Height of a 1-based line, regardless of whether it is collapsed.
    pub fn height(&self, line: usize) -> Result<f64> {
        let node = self.node_for_line(line)?;
        Ok(self.tree.get(node).height)
    }

    /// Sets the height of a 1-based line.
    pub fn set_height(&mut self, line: usize, height: f64) -> Result<()> {
        let node = self.node_for_line(line)?;
        if self.tree.get(node).height != height {
            self.tree.get_mut(node).height = height;
            self.tree.update_augmented(node);
        }
        Ok(())
    }

    /// Whether any collapsed section hides the 1-based line.
    pub fn is_collapsed(&self, line: usize) -> Result<bool> {
        let node = self.node_for_line(line)?;
        if !self.tree.get(node).line_sections.is_empty() {
            return Ok(true);
        }
        let mut current = Some(node);
        while let Some(id) = current {
            if !self.tree.get(id).subtree_sections.is_empty() {
                return Ok(true);
            }
            current = self.tree.parent(id);
        }
        Ok(false)
    }

    /// Sections hiding the 1-based line.
    pub fn collapsed_sections_at(&self, line: usize) -> Result<Vec<CollapsedSectionId>> {
        let node = self.node_for_line(line)?;
        let mut result = self.tree.get(node).line_sections.clone();
        let mut current = Some(node);
        while let Some(id) = current {
            for &section in &self.tree.get(id).subtree_sections {
                add_unique(&mut result, section);
            }
            current = self.tree.parent(id);
        }
        Ok(result)
    }

    /// Y coordinate of the top of the 1-based line.
    ///
    /// A hidden line reports the position of the top of the range hiding it.
    pub fn visual_position(&self, line: usize) -> Result<f64> {
        let node = self.node_for_line(line)?;
        let mut position = self.height_of(self.tree.left(node));
        let mut current = node;
        loop {
            if !self.tree.get(current).subtree_sections.is_empty() {
                position = 0.0;
            }
            let Some(parent) = self.tree.parent(current) else {
                break;
            };
            if self.tree.right(parent) == Some(current) {
                position += self.height_of(self.tree.left(parent));
                let parent_node = self.tree.get(parent);
                if parent_node.line_sections.is_empty() {
                    position += parent_node.height;
                }
            }
            current = parent;
        }
        Ok(position)
    }

    /// 1-based number of the visible line at `position`.
    ///
    /// Positions past the end map to the last visible line.
    pub fn line_by_visual_position(&self, position: f64) -> usize {
        let mut position = position.max(0.0);
        let mut node = self.root();
        loop {
            let left = self.tree.left(node);
            let after_left = position - self.height_of(left);
            if let Some(left) = left
                && after_left < 0.0
            {
                node = left;
                continue;
            }
            let own = self.tree.get(node).own_height();
            let before_right = after_left - own;
            if before_right < 0.0 {
                return self.index_of(node) + 1;
            }
            match self.tree.right(node) {
                Some(right) if self.tree.summary(right).total_height > 0.0 => {
                    position = before_right;
                    node = right;
                }
                _ => {
                    if own > 0.0 {
                        return self.index_of(node) + 1;
                    }
                    match left {
                        Some(left) => {
                            // Past the end: find the last visible line on the left.
                            position = self.height_of(Some(left));
                            node = left;
                        }
                        None => return self.index_of(node) + 1,
                    }
                }
            }
        }
    }

    /// Hides lines `start_line..=end_line` (1-based).
    pub fn collapse_text(
        &mut self,
        start_line: usize,
        end_line: usize,
    ) -> Result<CollapsedSectionId> {
        let start = self.node_for_line(start_line)?;
        let end = self.node_for_line(end_line)?;
        if start_line > end_line {
            return Err(DocumentError::invalid_argument(format!(
                "collapsed section starts at line {start_line} after its end line {end_line}"
            )));
        }
        let id = CollapsedSectionId(self.next_section);
        self.next_section += 1;
        self.sections.insert(id, SectionNodes { start, end });
        self.mark(id, start, end, end_line - start_line + 1);
        trace!(start_line, end_line, ?id, "collapse lines");
        Ok(id)
    }

    /// Makes a section's lines visible again. Returns `false` if it was no longer collapsed.
    pub fn uncollapse(&mut self, id: CollapsedSectionId) -> bool {
        let Some(section) = self.sections.remove(&id) else {
            return false;
        };
        self.unmark(id, section);
        true
    }

    /// Current extent of a section, or `None` once it was uncollapsed or its lines were removed.
    pub fn section(&self, id: CollapsedSectionId) -> Option<CollapsedSection> {
        let section = self.sections.get(&id)?;
        Some(CollapsedSection {
            start_line: self.index_of(section.start) + 1,
            end_line: self.index_of(section.end) + 1,
        })
    }

    /// Whether the section still hides any lines.
    pub fn is_section_collapsed(&self, id: CollapsedSectionId) -> bool {
        self.sections.contains_key(&id)
    }

    /// Number of live collapsed sections.
    pub fn collapsed_section_count(&self) -> usize {
        self.sections.len()
    }

    /// Marks `length` lines starting at `start`, walking up from `start` and then down to `end`.
    fn mark(&mut self, id: CollapsedSectionId, start: NodeId, end: NodeId, mut length: usize) {
        let mut node = start;
        loop {
            add_unique(&mut self.tree.get_mut(node).line_sections, id);
            length -= 1;
            if length == 0 {
                break;
            }
            if let Some(right) = self.tree.right(node) {
                let right_count = self.tree.summary(right).count;
                if right_count < length {
                    add_unique(&mut self.tree.get_mut(right).subtree_sections, id);
                    self.tree.refresh(right);
                    length -= right_count;
                } else {
                    self.mark_down(id, right, length);
                    break;
                }
            }
            // Climb to the next node in order.
            let mut child = node;
            let mut parent = self.tree.parent(child);
            while let Some(p) = parent
                && self.tree.right(p) == Some(child)
            {
                child = p;
                parent = self.tree.parent(p);
            }
            match parent {
                Some(p) => node = p,
                None => break,
            }
        }
        self.tree.update_to_root(start);
        self.tree.update_to_root(end);
    }

    fn mark_down(&mut self, id: CollapsedSectionId, mut node: NodeId, mut length: usize) {
        loop {
            if let Some(left) = self.tree.left(node) {
                let left_count = self.tree.summary(left).count;
                if left_count < length {
                    add_unique(&mut self.tree.get_mut(left).subtree_sections, id);
                    self.tree.refresh(left);
                    length -= left_count;
                } else {
                    node = left;
                    continue;
                }
            }
            add_unique(&mut self.tree.get_mut(node).line_sections, id);
            length -= 1;
            if length == 0 {
                return;
            }
            match self.tree.right(node) {
                Some(right) => node = right,
                None => return,
            }
        }
    }

    fn unmark(&mut self, id: CollapsedSectionId, section: SectionNodes) {
        let low = self.index_of(section.start);
        let high = self.index_of(section.end);
        let root = self.root();
        self.unmark_in(root, 0, id, low, high);
    }

    /// Removes every mark of `id` in the subtree of `node`, whose first line has index `first`.
    fn unmark_in(
        &mut self,
        node: NodeId,
        first: usize,
        id: CollapsedSectionId,
        low: usize,
        high: usize,
    ) {
        let count = self.tree.summary(node).count;
        if first > high || first + count <= low {
            return;
        }
        if remove_from(&mut self.tree.get_mut(node).subtree_sections, id) {
            self.tree.refresh(node);
            return;
        }
        let left = self.tree.left(node);
        if let Some(left) = left {
            self.unmark_in(left, first, id, low, high);
        }
        let index = first + self.count_of(left);
        if (low..=high).contains(&index) {
            remove_from(&mut self.tree.get_mut(node).line_sections, id);
        }
        if let Some(right) = self.tree.right(node) {
            self.unmark_in(right, index + 1, id, low, high);
        }
        self.tree.refresh(node);
    }

    /// Pushes down every subtree mark on the path from the root to `id`, so all sections hiding
    /// `id` end up in its line set.
    fn push_down_path(&mut self, id: NodeId) {
        let mut path = vec![id];
        let mut current = id;
        while let Some(parent) = self.tree.parent(current) {
            path.push(parent);
            current = parent;
        }
        for node in path.into_iter().rev() {
            push_down(&mut self.tree, node);
        }
    }

    fn remove_node(&mut self, node: NodeId) {
        // The successor may be relinked into this position; it must not carry subtree marks.
        let relinked = match (self.tree.left(node), self.tree.right(node)) {
            (Some(_), Some(right)) => self.tree.leftmost(right),
            _ => node,
        };
        self.push_down_path(relinked);
        push_down(&mut self.tree, node);
        self.tree.remove(node);
    }

    #[cfg(test)]
    fn check_invariants(&self) {
        self.tree.check_invariants();
        for (&id, section) in &self.sections {
            let low = self.index_of(section.start);
            let high = self.index_of(section.end);
            assert!(low <= high, "section {id:?} is reversed");
            for line in low + 1..=high + 1 {
                let covering = self.collapsed_sections_at(line).unwrap_or_default();
                assert!(covering.contains(&id), "line {line} not hidden by {id:?}");
            }
        }
        for node in self.tree.iter() {
            let value = self.tree.get(node);
            for id in value.line_sections.iter().chain(&value.subtree_sections) {
                assert!(self.sections.contains_key(id), "stale mark {id:?}");
            }
        }
    }
}

impl LineTracker for HeightTree {
    fn before_remove_line(&mut self, line: &DocumentLine) {
        let Some(node) = self.node_at(line.line_number - 1) else {
            return;
        };
        self.push_down_path(node);
        let covering = self.tree.get(node).line_sections.clone();
        for id in covering {
            let Some(section) = self.sections.get(&id).copied() else {
                continue;
            };
            if section.start == node && section.end == node {
                self.sections.remove(&id);
                remove_from(&mut self.tree.get_mut(node).line_sections, id);
                self.tree.update_augmented(node);
            } else if section.start == node {
                self.unmark(id, section);
                if let Some(next) = self.tree.next(node) {
                    let length = self.index_of(section.end) - self.index_of(next) + 1;
                    let moved = SectionNodes {
                        start: next,
                        end: section.end,
                    };
                    self.sections.insert(id, moved);
                    self.mark(id, next, section.end, length);
                }
            } else if section.end == node {
                self.unmark(id, section);
                if let Some(prev) = self.tree.prev(node) {
                    let length = self.index_of(prev) - self.index_of(section.start) + 1;
                    let moved = SectionNodes {
                        start: section.start,
                        end: prev,
                    };
                    self.sections.insert(id, moved);
                    self.mark(id, section.start, prev, length);
                }
            }
        }
        self.remove_node(node);
    }

    fn line_inserted(&mut self, inserted_after: &DocumentLine, _new_line: &DocumentLine) {
        let Some(node) = self.node_at(inserted_after.line_number - 1) else {
            return;
        };
        let mut new_node = HeightNode::new(self.default_line_height);
        match self.tree.right(node) {
            None => {
                self.push_down_path(node);
                // Inserting directly after `node`: inherit sections that continue past it.
                for &id in &self.tree.get(node).line_sections {
                    if self.sections.get(&id).is_some_and(|s| s.end != node) {
                        new_node.line_sections.push(id);
                    }
                }
                let new_id = self.tree.insert_after(node, new_node);
                self.tree.update_to_root(new_id);
            }
            Some(right) => {
                let before = self.tree.leftmost(right);
                self.push_down_path(before);
                // Inserting directly before `before`: inherit sections that started earlier.
                for &id in &self.tree.get(before).line_sections {
                    if self.sections.get(&id).is_some_and(|s| s.start != before) {
                        new_node.line_sections.push(id);
                    }
                }
                let new_id = self.tree.insert_before(before, new_node);
                self.tree.update_to_root(new_id);
            }
        }
    }

    fn rebuild_document(&mut self, line_count: usize) {
        self.rebuild(line_count);
    }
}

#[cfg(test)]
mod tests {
    use rand::Rng;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::line_tree::LineId;

    fn line(number: usize) -> DocumentLine {
        DocumentLine {
            id: LineId(NodeId::dangling()),
            line_number: number,
            offset: 0,
            total_length: 1,
            delimiter_length: 1,
        }
    }

    /// Model: per line (height, set of sections hiding it).
    struct Model {
        heights: Vec<f64>,
        hidden: Vec<Vec<CollapsedSectionId>>,
    }

    impl Model {
        fn visible_height(&self, index: usize) -> f64 {
            if self.hidden[index].is_empty() {
                self.heights[index]
            } else {
                0.0
            }
        }

        fn check(&self, tree: &HeightTree) {
            tree.check_invariants();
            assert_eq!(tree.line_count(), self.heights.len());
            let mut y = 0.0;
            for index in 0..self.heights.len() {
                let line = index + 1;
                assert_eq!(tree.is_collapsed(line), Ok(!self.hidden[index].is_empty()));
                if self.hidden[index].is_empty() {
                    assert_eq!(tree.visual_position(line), Ok(y), "line {line}");
                }
                y += self.visible_height(index);
            }
            assert_eq!(tree.total_height(), y);
        }
    }

    #[test]
    fn test_heights_and_positions() {
        let mut tree = HeightTree::new(5, 10.0);
        assert_eq!(tree.line_count(), 5);
        assert_eq!(tree.total_height(), 50.0);
        tree.set_height(3, 25.0).unwrap();
        assert_eq!(tree.height(3), Ok(25.0));
        assert_eq!(tree.total_height(), 65.0);
        assert_eq!(tree.visual_position(1), Ok(0.0));
        assert_eq!(tree.visual_position(4), Ok(45.0));
        assert_eq!(tree.line_by_visual_position(0.0), 1);
        assert_eq!(tree.line_by_visual_position(19.9), 2);
        assert_eq!(tree.line_by_visual_position(20.0), 3);
        assert_eq!(tree.line_by_visual_position(44.0), 3);
        assert_eq!(tree.line_by_visual_position(1000.0), 5);
        assert!(matches!(
            tree.height(6),
            Err(DocumentError::LineOutOfRange { line: 6, line_count: 5 })
        ));
    }

    #[test]
    fn test_default_height_change_keeps_custom_heights() {
        let mut tree = HeightTree::new(3, 10.0);
        tree.set_height(2, 30.0).unwrap();
        tree.set_default_line_height(12.0);
        assert_eq!(tree.height(1), Ok(12.0));
        assert_eq!(tree.height(2), Ok(30.0));
        assert_eq!(tree.total_height(), 54.0);
    }

    #[test]
    fn test_collapse_and_uncollapse_restore_heights() {
        let mut tree = HeightTree::new(20, 10.0);
        let before: Vec<f64> = (1..=20).map(|l| tree.visual_position(l).unwrap()).collect();
        let section = tree.collapse_text(4, 12).unwrap();
        tree.check_invariants();
        assert_eq!(tree.total_height(), 110.0);
        assert!(tree.is_collapsed(4).unwrap());
        assert!(tree.is_collapsed(12).unwrap());
        assert!(!tree.is_collapsed(13).unwrap());
        assert_eq!(tree.visual_position(13), Ok(30.0));
        assert_eq!(tree.line_by_visual_position(30.0), 13);
        assert_eq!(
            tree.section(section),
            Some(CollapsedSection {
                start_line: 4,
                end_line: 12
            })
        );

        assert!(tree.uncollapse(section));
        assert!(!tree.uncollapse(section));
        tree.check_invariants();
        let after: Vec<f64> = (1..=20).map(|l| tree.visual_position(l).unwrap()).collect();
        assert_eq!(before, after);
        assert_eq!(tree.total_height(), 200.0);
    }

    #[test]
    fn test_inserted_line_inherits_surrounding_sections() {
        let mut tree = HeightTree::new(6, 1.0);
        let section = tree.collapse_text(2, 4).unwrap();
        // Insert after line 3: inside the section.
        tree.line_inserted(&line(3), &line(4));
        // Insert after line 4 (the section's new end is line 5): outside.
        tree.line_inserted(&line(5), &line(6));
        tree.check_invariants();
        assert_eq!(
            tree.section(section),
            Some(CollapsedSection {
                start_line: 2,
                end_line: 5
            })
        );
        assert!(tree.is_collapsed(4).unwrap());
        assert!(!tree.is_collapsed(6).unwrap());
        // Insert after line 1 (directly before the section start): outside.
        tree.line_inserted(&line(1), &line(2));
        tree.check_invariants();
        assert!(!tree.is_collapsed(2).unwrap());
        assert_eq!(tree.section(section).map(|s| s.start_line), Some(3));
    }

    #[test]
    fn test_removing_section_boundaries_shrinks_section() {
        let mut tree = HeightTree::new(8, 1.0);
        let section = tree.collapse_text(3, 6).unwrap();
        tree.before_remove_line(&line(3));
        tree.check_invariants();
        assert_eq!(
            tree.section(section),
            Some(CollapsedSection {
                start_line: 3,
                end_line: 5
            })
        );
        tree.before_remove_line(&line(5));
        tree.check_invariants();
        assert_eq!(
            tree.section(section),
            Some(CollapsedSection {
                start_line: 3,
                end_line: 4
            })
        );
        tree.before_remove_line(&line(4));
        tree.before_remove_line(&line(3));
        tree.check_invariants();
        assert_eq!(tree.section(section), None);
        assert_eq!(tree.total_height(), 4.0);
    }

    #[test]
    fn test_rebuild_drops_sections() {
        let mut tree = HeightTree::new(4, 2.0);
        let section = tree.collapse_text(1, 2).unwrap();
        tree.rebuild_document(7);
        assert_eq!(tree.section(section), None);
        assert_eq!(tree.line_count(), 7);
        assert_eq!(tree.total_height(), 14.0);
    }

    #[test]
    fn test_random_operations_match_model() {
        let mut rng = StdRng::seed_from_u64(0x4e16);
        let mut tree = HeightTree::new(10, 1.0);
        let mut model = Model {
            heights: vec![1.0; 10],
            hidden: vec![Vec::new(); 10],
        };
        let mut live: Vec<CollapsedSectionId> = Vec::new();

        for _ in 0..600 {
            let count = model.heights.len();
            match rng.gen_range(0..5) {
                0 => {
                    let start = rng.gen_range(0..count);
                    let end = rng.gen_range(start..count.min(start + 12));
                    let id = tree.collapse_text(start + 1, end + 1).unwrap();
                    for hidden in &mut model.hidden[start..=end] {
                        hidden.push(id);
                    }
                    live.push(id);
                }
                1 if !live.is_empty() => {
                    let id = live.swap_remove(rng.gen_range(0..live.len()));
                    tree.uncollapse(id);
                    for hidden in &mut model.hidden {
                        hidden.retain(|s| *s != id);
                    }
                }
                2 => {
                    let after = rng.gen_range(0..count);
                    tree.line_inserted(&line(after + 1), &line(after + 2));
                    // The new line is hidden by sections covering both neighbours.
                    let inherited: Vec<CollapsedSectionId> = match model.hidden.get(after + 1) {
                        Some(next) => model.hidden[after]
                            .iter()
                            .filter(|id| next.contains(id))
                            .copied()
                            .collect(),
                        None => Vec::new(),
                    };
                    model.heights.insert(after + 1, 1.0);
                    model.hidden.insert(after + 1, inherited);
                }
                3 if count > 1 => {
                    let index = rng.gen_range(0..count);
                    tree.before_remove_line(&line(index + 1));
                    model.heights.remove(index);
                    let removed = model.hidden.remove(index);
                    for id in removed {
                        if !model.hidden.iter().any(|h| h.contains(&id)) {
                            live.retain(|s| *s != id);
                        }
                    }
                }
                _ => {
                    let index = rng.gen_range(0..count);
                    let height = f64::from(rng.gen_range(1..4u8));
                    tree.set_height(index + 1, height).unwrap();
                    model.heights[index] = height;
                }
            }
            model.check(&tree);
            assert_eq!(tree.collapsed_section_count(), live.len());
        }
    }
}
