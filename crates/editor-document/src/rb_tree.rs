//! Arena-backed red-black tree with per-node aggregates.
//!
//! Every tree in this crate (lines, segments, anchors, heights) is an instance of [`RbTree`].
//! Nodes live in a slot arena and link to each other through [`NodeId`]s, so node identity
//! survives rotations and removals of other nodes. Each node caches a summary of its subtree
//! (an "augmentation") that is recomputed bottom-up after every structural change; the
//! concrete trees use those summaries for rank queries such as "line by offset".
//!
//! The tree has no ordering key: callers decide where a node goes by inserting it before or
//! after an existing node.

use std::fmt;

/// Generational handle to a node inside an [`RbTree`].
///
/// A handle keeps pointing at the same node for the node's whole lifetime. Once the node is
/// removed its slot may be reused, but the generation changes so the stale handle no longer
/// resolves.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    /// A handle that never resolves, for building detached snapshots in tests.
    #[cfg(test)]
    pub(crate) fn dangling() -> Self {
        Self {
            index: u32::MAX,
            generation: u32::MAX,
        }
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Color {
    Red,
    Black,
}

/// Payload of a tree node together with the aggregate it contributes to its subtree.
pub(crate) trait Augment: Sized {
    /// Aggregate cached on every node for its whole subtree.
    type Summary: Clone + Default + PartialEq;

    /// Computes the subtree summary of a node from its own payload and the summaries of its
    /// children.
    fn summarize(&self, left: Option<&Self::Summary>, right: Option<&Self::Summary>)
    -> Self::Summary;

    /// Hook invoked before `upper` is rotated with its child `lower`.
    ///
    /// Trees that store data describing whole subtrees use it to push that data down so the
    /// rotation does not change its meaning.
    fn before_rotate(_tree: &mut RbTree<Self>, _upper: NodeId, _lower: NodeId) {}
}

struct Node<T: Augment> {
    parent: Option<NodeId>,
    left: Option<NodeId>,
    right: Option<NodeId>,
    color: Color,
    value: T,
    summary: T::Summary,
}

struct Slot<T: Augment> {
    generation: u32,
    node: Option<Node<T>>,
}

/// Index-linked red-black tree.
pub(crate) struct RbTree<T: Augment> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    root: Option<NodeId>,
    len: usize,
}

impl<T: Augment> RbTree<T> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: None,
            len: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Whether `id` still refers to a live node of this tree.
    pub(crate) fn contains(&self, id: NodeId) -> bool {
        self.slots
            .get(id.index as usize)
            .is_some_and(|slot| slot.generation == id.generation && slot.node.is_some())
    }

    fn node(&self, id: NodeId) -> &Node<T> {
        let slot = &self.slots[id.index as usize];
        match &slot.node {
            Some(node) if slot.generation == id.generation => node,
            _ => panic!("stale red-black tree node {id:?}"),
        }
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node<T> {
        let slot = &mut self.slots[id.index as usize];
        match &mut slot.node {
            Some(node) if slot.generation == id.generation => node,
            _ => panic!("stale red-black tree node {id:?}"),
        }
    }

    pub(crate) fn get(&self, id: NodeId) -> &T {
        &self.node(id).value
    }

    /// Mutable access to a node payload.
    ///
    /// Callers that change anything the summary depends on must follow up with
    /// [`RbTree::update_augmented`].
    pub(crate) fn get_mut(&mut self, id: NodeId) -> &mut T {
        &mut self.node_mut(id).value
    }

    pub(crate) fn summary(&self, id: NodeId) -> &T::Summary {
        &self.node(id).summary
    }

    pub(crate) fn left(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).left
    }

    pub(crate) fn right(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).right
    }

    pub(crate) fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub(crate) fn leftmost(&self, mut id: NodeId) -> NodeId {
        while let Some(left) = self.left(id) {
            id = left;
        }
        id
    }

    pub(crate) fn rightmost(&self, mut id: NodeId) -> NodeId {
        while let Some(right) = self.right(id) {
            id = right;
        }
        id
    }

    pub(crate) fn first(&self) -> Option<NodeId> {
        self.root.map(|root| self.leftmost(root))
    }

    pub(crate) fn last(&self) -> Option<NodeId> {
        self.root.map(|root| self.rightmost(root))
    }

    /// In-order successor.
    pub(crate) fn next(&self, id: NodeId) -> Option<NodeId> {
        if let Some(right) = self.right(id) {
            return Some(self.leftmost(right));
        }
        let mut node = id;
        let mut parent = self.parent(node);
        while let Some(p) = parent {
            if self.right(p) != Some(node) {
                return Some(p);
            }
            node = p;
            parent = self.parent(p);
        }
        None
    }

    /// In-order predecessor.
    pub(crate) fn prev(&self, id: NodeId) -> Option<NodeId> {
        if let Some(left) = self.left(id) {
            return Some(self.rightmost(left));
        }
        let mut node = id;
        let mut parent = self.parent(node);
        while let Some(p) = parent {
            if self.left(p) != Some(node) {
                return Some(p);
            }
            node = p;
            parent = self.parent(p);
        }
        None
    }

    /// Iterates node ids in order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.first(), move |&id| self.next(id))
    }

    fn alloc(&mut self, value: T) -> NodeId {
        let node = Node {
            parent: None,
            left: None,
            right: None,
            color: Color::Red,
            summary: value.summarize(None, None),
            value,
        };
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            NodeId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = u32::try_from(self.slots.len()).unwrap_or_else(|_| {
                panic!("red-black tree exceeded {} nodes", u32::MAX);
            });
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            NodeId {
                index,
                generation: 0,
            }
        }
    }

    fn release(&mut self, id: NodeId) -> T {
        let slot = &mut self.slots[id.index as usize];
        let node = match slot.node.take() {
            Some(node) if slot.generation == id.generation => node,
            _ => panic!("stale red-black tree node {id:?}"),
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.len -= 1;
        node.value
    }

    /// Recomputes the summary of `id` from its payload and children. Returns whether it changed.
    fn recompute(&mut self, id: NodeId) -> bool {
        let node = self.node(id);
        let left = node.left.map(|l| self.node(l).summary.clone());
        let right = node.right.map(|r| self.node(r).summary.clone());
        let summary = node.value.summarize(left.as_ref(), right.as_ref());
        let node = self.node_mut(id);
        if node.summary == summary {
            false
        } else {
            node.summary = summary;
            true
        }
    }

    /// Recomputes the summary of `id` only, assuming its children are up to date.
    pub(crate) fn refresh(&mut self, id: NodeId) -> bool {
        self.recompute(id)
    }

    /// Recomputes summaries from `id` towards the root, stopping once nothing changes.
    pub(crate) fn update_augmented(&mut self, id: NodeId) {
        let mut current = Some(id);
        while let Some(node) = current {
            if !self.recompute(node) {
                return;
            }
            current = self.parent(node);
        }
    }

    /// Recomputes summaries on the whole path from `id` to the root.
    pub(crate) fn update_to_root(&mut self, id: NodeId) {
        let mut current = Some(id);
        while let Some(node) = current {
            self.recompute(node);
            current = self.parent(node);
        }
    }

    /// Inserts into an empty tree.
    pub(crate) fn insert_root(&mut self, value: T) -> NodeId {
        debug_assert!(self.root.is_none());
        let id = self.alloc(value);
        self.node_mut(id).color = Color::Black;
        self.root = Some(id);
        id
    }

    /// Inserts `value` directly after `at` in in-order sequence.
    pub(crate) fn insert_after(&mut self, at: NodeId, value: T) -> NodeId {
        let id = self.alloc(value);
        self.link_after(at, id);
        id
    }

    /// Inserts `value` directly before `at` in in-order sequence.
    pub(crate) fn insert_before(&mut self, at: NodeId, value: T) -> NodeId {
        let id = self.alloc(value);
        self.link_before(at, id);
        id
    }

    fn link_after(&mut self, at: NodeId, id: NodeId) {
        match self.right(at) {
            None => self.attach(at, false, id),
            Some(right) => {
                let parent = self.leftmost(right);
                self.attach(parent, true, id);
            }
        }
    }

    fn link_before(&mut self, at: NodeId, id: NodeId) {
        match self.left(at) {
            None => self.attach(at, true, id),
            Some(left) => {
                let parent = self.rightmost(left);
                self.attach(parent, false, id);
            }
        }
    }

    /// Unlinks `id` from the tree but keeps its slot, so it can be put back somewhere else
    /// with one of the `reattach_*` methods under the same id.
    pub(crate) fn detach(&mut self, id: NodeId) {
        self.unlink(id);
        self.len -= 1;
    }

    fn prepare_reattach(&mut self, id: NodeId) {
        self.len += 1;
        let node = self.node_mut(id);
        debug_assert!(node.parent.is_none() && node.left.is_none() && node.right.is_none());
        node.color = Color::Red;
        self.recompute(id);
    }

    /// Puts a detached node back as the root of an empty tree.
    pub(crate) fn reattach_root(&mut self, id: NodeId) {
        debug_assert!(self.root.is_none());
        self.prepare_reattach(id);
        self.set_color(id, Color::Black);
        self.root = Some(id);
    }

    /// Puts a detached node back directly before `at`.
    pub(crate) fn reattach_before(&mut self, at: NodeId, id: NodeId) {
        self.prepare_reattach(id);
        self.link_before(at, id);
    }

    /// Puts a detached node back directly after `at`.
    pub(crate) fn reattach_after(&mut self, at: NodeId, id: NodeId) {
        self.prepare_reattach(id);
        self.link_after(at, id);
    }

    /// Appends after the last node (or creates the root).
    #[cfg(test)]
    pub(crate) fn push_back(&mut self, value: T) -> NodeId {
        match self.last() {
            Some(last) => self.insert_after(last, value),
            None => self.insert_root(value),
        }
    }

    /// Prepends before the first node (or creates the root).
    #[cfg(test)]
    pub(crate) fn push_front(&mut self, value: T) -> NodeId {
        match self.first() {
            Some(first) => self.insert_before(first, value),
            None => self.insert_root(value),
        }
    }

    fn attach(&mut self, parent: NodeId, as_left: bool, id: NodeId) {
        self.node_mut(id).parent = Some(parent);
        if as_left {
            debug_assert!(self.left(parent).is_none());
            self.node_mut(parent).left = Some(id);
        } else {
            debug_assert!(self.right(parent).is_none());
            self.node_mut(parent).right = Some(id);
        }
        self.update_to_root(parent);
        self.fix_after_insert(id);
    }

    /// Removes `id` from the tree and returns its payload.
    pub(crate) fn remove(&mut self, id: NodeId) -> T {
        self.unlink(id);
        self.release(id)
    }

    fn unlink(&mut self, removed: NodeId) {
        let (left, right) = (self.left(removed), self.right(removed));
        if let (Some(_), Some(right)) = (left, right) {
            // Put the in-order successor into the removed node's place.
            let successor = self.leftmost(right);
            self.unlink(successor);
            // Unlinking the successor may have rotated around the removed node, so re-read links.
            self.replace_node(removed, Some(successor));
            let removed_node = self.node(removed);
            let (left, right, color) = (removed_node.left, removed_node.right, removed_node.color);
            {
                let node = self.node_mut(successor);
                node.left = left;
                node.right = right;
                node.color = color;
            }
            if let Some(left) = left {
                self.node_mut(left).parent = Some(successor);
            }
            if let Some(right) = right {
                self.node_mut(right).parent = Some(successor);
            }
            let removed_node = self.node_mut(removed);
            removed_node.left = None;
            removed_node.right = None;
            self.update_to_root(successor);
            return;
        }

        let parent = self.parent(removed);
        let child = left.or(right);
        self.replace_node(removed, child);
        {
            let node = self.node_mut(removed);
            node.left = None;
            node.right = None;
        }
        if let Some(parent) = parent {
            self.update_to_root(parent);
        }
        if self.node(removed).color == Color::Black {
            match child {
                Some(child) if self.node(child).color == Color::Red => {
                    self.node_mut(child).color = Color::Black;
                }
                _ => self.fix_after_delete(child, parent),
            }
        }
    }

    /// Makes `replacement` take `replaced`'s position under its parent.
    fn replace_node(&mut self, replaced: NodeId, replacement: Option<NodeId>) {
        let parent = self.parent(replaced);
        match parent {
            None => self.root = replacement,
            Some(p) => {
                if self.left(p) == Some(replaced) {
                    self.node_mut(p).left = replacement;
                } else {
                    self.node_mut(p).right = replacement;
                }
            }
        }
        if let Some(r) = replacement {
            self.node_mut(r).parent = parent;
        }
        self.node_mut(replaced).parent = None;
    }

    fn color(&self, id: Option<NodeId>) -> Color {
        id.map_or(Color::Black, |id| self.node(id).color)
    }

    fn set_color(&mut self, id: NodeId, color: Color) {
        self.node_mut(id).color = color;
    }

    fn rotate_left(&mut self, p: NodeId) {
        let Some(q) = self.right(p) else {
            return;
        };
        T::before_rotate(self, p, q);
        self.replace_node(p, Some(q));
        let q_left = self.left(q);
        self.node_mut(p).right = q_left;
        if let Some(b) = q_left {
            self.node_mut(b).parent = Some(p);
        }
        self.node_mut(q).left = Some(p);
        self.node_mut(p).parent = Some(q);
        self.recompute(p);
        self.recompute(q);
    }

    fn rotate_right(&mut self, p: NodeId) {
        let Some(q) = self.left(p) else {
            return;
        };
        T::before_rotate(self, p, q);
        self.replace_node(p, Some(q));
        let q_right = self.right(q);
        self.node_mut(p).left = q_right;
        if let Some(b) = q_right {
            self.node_mut(b).parent = Some(p);
        }
        self.node_mut(q).right = Some(p);
        self.node_mut(p).parent = Some(q);
        self.recompute(p);
        self.recompute(q);
    }

    fn fix_after_insert(&mut self, mut node: NodeId) {
        loop {
            let Some(parent) = self.parent(node) else {
                self.set_color(node, Color::Black);
                return;
            };
            if self.node(parent).color == Color::Black {
                return;
            }
            // A red parent is never the root, so the grandparent exists.
            let Some(grandparent) = self.parent(parent) else {
                self.set_color(parent, Color::Black);
                return;
            };
            let parent_is_left = self.left(grandparent) == Some(parent);
            let uncle = if parent_is_left {
                self.right(grandparent)
            } else {
                self.left(grandparent)
            };
            if let Some(uncle) = uncle
                && self.node(uncle).color == Color::Red
            {
                self.set_color(parent, Color::Black);
                self.set_color(uncle, Color::Black);
                self.set_color(grandparent, Color::Red);
                node = grandparent;
                continue;
            }

            let node_is_left = self.left(parent) == Some(node);
            if !node_is_left && parent_is_left {
                self.rotate_left(parent);
                node = parent;
            } else if node_is_left && !parent_is_left {
                self.rotate_right(parent);
                node = parent;
            }

            let Some(parent) = self.parent(node) else {
                return;
            };
            let Some(grandparent) = self.parent(parent) else {
                return;
            };
            self.set_color(parent, Color::Black);
            self.set_color(grandparent, Color::Red);
            if self.left(parent) == Some(node) && self.left(grandparent) == Some(parent) {
                self.rotate_right(grandparent);
            } else {
                self.rotate_left(grandparent);
            }
            return;
        }
    }

    fn sibling(&self, node: Option<NodeId>, parent: NodeId) -> Option<NodeId> {
        if self.left(parent) == node {
            self.right(parent)
        } else {
            self.left(parent)
        }
    }

    fn fix_after_delete(&mut self, mut node: Option<NodeId>, mut parent: Option<NodeId>) {
        while let Some(p) = parent {
            let Some(mut sibling) = self.sibling(node, p) else {
                return;
            };
            if self.node(sibling).color == Color::Red {
                self.set_color(p, Color::Red);
                self.set_color(sibling, Color::Black);
                if self.left(p) == node {
                    self.rotate_left(p);
                } else {
                    self.rotate_right(p);
                }
                match self.sibling(node, p) {
                    Some(s) => sibling = s,
                    None => return,
                }
            }

            let sibling_children_black = self.color(self.left(sibling)) == Color::Black
                && self.color(self.right(sibling)) == Color::Black;

            if self.node(p).color == Color::Black
                && self.node(sibling).color == Color::Black
                && sibling_children_black
            {
                self.set_color(sibling, Color::Red);
                node = Some(p);
                parent = self.parent(p);
                continue;
            }

            if self.node(p).color == Color::Red
                && self.node(sibling).color == Color::Black
                && sibling_children_black
            {
                self.set_color(sibling, Color::Red);
                self.set_color(p, Color::Black);
                return;
            }

            let node_is_left = self.left(p) == node;
            if node_is_left
                && self.node(sibling).color == Color::Black
                && self.color(self.left(sibling)) == Color::Red
                && self.color(self.right(sibling)) == Color::Black
            {
                self.set_color(sibling, Color::Red);
                if let Some(sl) = self.left(sibling) {
                    self.set_color(sl, Color::Black);
                }
                self.rotate_right(sibling);
            } else if !node_is_left
                && self.node(sibling).color == Color::Black
                && self.color(self.right(sibling)) == Color::Red
                && self.color(self.left(sibling)) == Color::Black
            {
                self.set_color(sibling, Color::Red);
                if let Some(sr) = self.right(sibling) {
                    self.set_color(sr, Color::Black);
                }
                self.rotate_left(sibling);
            }

            let Some(sibling) = self.sibling(node, p) else {
                return;
            };
            let parent_color = self.node(p).color;
            self.set_color(sibling, parent_color);
            self.set_color(p, Color::Black);
            if node_is_left {
                if let Some(sr) = self.right(sibling) {
                    self.set_color(sr, Color::Black);
                }
                self.rotate_left(p);
            } else {
                if let Some(sl) = self.left(sibling) {
                    self.set_color(sl, Color::Black);
                }
                self.rotate_right(p);
            }
            return;
        }
    }

    /// Removes every node.
    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.root = None;
        self.len = 0;
    }

    /// Replaces the whole tree with a perfectly balanced tree over `values` (in order).
    ///
    /// Returns the new node ids in order. Ids of the previous nodes become stale.
    pub(crate) fn rebuild(&mut self, values: Vec<T>) -> Vec<NodeId> {
        // Bump generations so old handles stop resolving.
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.node.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
            }
        }
        self.len = 0;
        self.root = None;
        let ids: Vec<NodeId> = values.into_iter().map(|v| self.alloc(v)).collect();
        let height = tree_height(ids.len());
        self.root = self.build_subtree(&ids, height);
        if let Some(root) = self.root {
            self.node_mut(root).parent = None;
            self.set_color(root, Color::Black);
        }
        ids
    }

    fn build_subtree(&mut self, ids: &[NodeId], height: usize) -> Option<NodeId> {
        if ids.is_empty() {
            return None;
        }
        let middle = ids.len() / 2;
        let id = ids[middle];
        let left = self.build_subtree(&ids[..middle], height.saturating_sub(1));
        let right = self.build_subtree(&ids[middle + 1..], height.saturating_sub(1));
        {
            let node = self.node_mut(id);
            node.left = left;
            node.right = right;
            node.color = if height == 1 { Color::Red } else { Color::Black };
        }
        if let Some(left) = left {
            self.node_mut(left).parent = Some(id);
        }
        if let Some(right) = right {
            self.node_mut(right).parent = Some(id);
        }
        self.recompute(id);
        Some(id)
    }

    /// Asserts the red-black properties, parent links and cached summaries.
    #[cfg(any(test, debug_assertions))]
    pub(crate) fn check_invariants(&self)
    where
        T::Summary: fmt::Debug,
    {
        let Some(root) = self.root else {
            assert_eq!(self.len, 0, "empty tree with non-zero length");
            return;
        };
        assert_eq!(self.node(root).color, Color::Black, "root must be black");
        assert!(self.parent(root).is_none(), "root must not have a parent");
        let mut count = 0;
        self.check_node(root, &mut count);
        assert_eq!(count, self.len, "node count mismatch");
    }

    #[cfg(any(test, debug_assertions))]
    fn check_node(&self, id: NodeId, count: &mut usize) -> usize
    where
        T::Summary: fmt::Debug,
    {
        *count += 1;
        let node = self.node(id);
        let mut black_height = [0usize; 2];
        for (slot, child) in [node.left, node.right].into_iter().enumerate() {
            if let Some(child) = child {
                assert_eq!(self.parent(child), Some(id), "broken parent link");
                if node.color == Color::Red {
                    assert_eq!(self.node(child).color, Color::Black, "red node with red child");
                }
                black_height[slot] = self.check_node(child, count);
            }
        }
        assert_eq!(black_height[0], black_height[1], "unequal black height");
        let left = node.left.map(|l| self.node(l).summary.clone());
        let right = node.right.map(|r| self.node(r).summary.clone());
        let expected = node.value.summarize(left.as_ref(), right.as_ref());
        assert_eq!(node.summary, expected, "stale summary at {id:?}");
        black_height[0] + usize::from(node.color == Color::Black)
    }
}

impl<T: Augment> Default for RbTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn tree_height(size: usize) -> usize {
    if size == 0 { 0 } else { tree_height(size / 2) + 1 }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counts nodes and sums values, enough to exercise rank queries.
    struct Weight(usize);

    #[derive(Clone, Default, PartialEq, Debug)]
    struct Sum {
        count: usize,
        total: usize,
    }

    impl Augment for Weight {
        type Summary = Sum;

        fn summarize(&self, left: Option<&Sum>, right: Option<&Sum>) -> Sum {
            let mut sum = Sum {
                count: 1,
                total: self.0,
            };
            for child in [left, right].into_iter().flatten() {
                sum.count += child.count;
                sum.total += child.total;
            }
            sum
        }
    }

    fn values(tree: &RbTree<Weight>) -> Vec<usize> {
        tree.iter().map(|id| tree.get(id).0).collect()
    }

    #[test]
    fn test_push_back_keeps_order_and_balance() {
        let mut tree = RbTree::new();
        for i in 0..200 {
            tree.push_back(Weight(i));
            tree.check_invariants();
        }
        assert_eq!(values(&tree), (0..200).collect::<Vec<_>>());
        let root = tree.root().unwrap();
        assert_eq!(tree.summary(root).count, 200);
        assert_eq!(tree.summary(root).total, (0..200).sum::<usize>());
    }

    #[test]
    fn test_insert_before_and_after() {
        let mut tree = RbTree::new();
        let b = tree.insert_root(Weight(2));
        tree.insert_before(b, Weight(1));
        let c = tree.insert_after(b, Weight(3));
        tree.insert_after(c, Weight(4));
        tree.push_front(Weight(0));
        tree.check_invariants();
        assert_eq!(values(&tree), vec![0, 1, 2, 3, 4]);
        assert_eq!(tree.next(b), Some(c));
        assert_eq!(tree.prev(c), Some(b));
    }

    #[test]
    fn test_remove_keeps_identity_of_other_nodes() {
        let mut tree = RbTree::new();
        let ids: Vec<NodeId> = (0..64).map(|i| tree.push_back(Weight(i))).collect();
        for (i, id) in ids.iter().enumerate() {
            if i % 3 == 0 {
                assert_eq!(tree.remove(*id).0, i);
                tree.check_invariants();
            }
        }
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(tree.contains(*id), i % 3 != 0);
            if i % 3 != 0 {
                assert_eq!(tree.get(*id).0, i);
            }
        }
        let expected: Vec<usize> = (0..64).filter(|i| i % 3 != 0).collect();
        assert_eq!(values(&tree), expected);
    }

    #[test]
    fn test_stale_id_after_slot_reuse() {
        let mut tree = RbTree::new();
        let a = tree.push_back(Weight(1));
        tree.remove(a);
        let b = tree.push_back(Weight(2));
        assert!(!tree.contains(a));
        assert!(tree.contains(b));
    }

    #[test]
    fn test_detach_and_reattach_keeps_id() {
        let mut tree = RbTree::new();
        let ids: Vec<NodeId> = (0..20).map(|i| tree.push_back(Weight(i))).collect();
        tree.detach(ids[3]);
        tree.check_invariants();
        tree.reattach_after(ids[15], ids[3]);
        tree.check_invariants();
        assert_eq!(tree.get(ids[3]).0, 3);
        assert_eq!(tree.next(ids[15]), Some(ids[3]));
        tree.detach(ids[0]);
        tree.reattach_before(ids[19], ids[0]);
        tree.check_invariants();
        assert_eq!(tree.len(), 20);

        let mut single = RbTree::new();
        let only = single.push_back(Weight(1));
        single.detach(only);
        assert!(single.is_empty());
        single.reattach_root(only);
        single.check_invariants();
        assert_eq!(single.first(), Some(only));
    }

    #[test]
    fn test_rebuild_is_balanced() {
        let mut tree = RbTree::new();
        tree.push_back(Weight(99));
        for n in [0, 1, 2, 3, 7, 8, 100, 1000] {
            let ids = tree.rebuild((0..n).map(Weight).collect());
            tree.check_invariants();
            assert_eq!(ids.len(), n);
            assert_eq!(values(&tree), (0..n).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_random_inserts_and_removes() {
        use rand::{Rng, SeedableRng, rngs::StdRng};

        let mut rng = StdRng::seed_from_u64(7);
        let mut tree = RbTree::new();
        let mut model: Vec<(NodeId, usize)> = Vec::new();
        for step in 0..2000 {
            if model.is_empty() || rng.gen_bool(0.6) {
                let pos = rng.gen_range(0..=model.len());
                let id = if model.is_empty() {
                    tree.insert_root(Weight(step))
                } else if pos == model.len() {
                    tree.insert_after(model[pos - 1].0, Weight(step))
                } else {
                    tree.insert_before(model[pos].0, Weight(step))
                };
                model.insert(pos, (id, step));
            } else {
                let pos = rng.gen_range(0..model.len());
                let (id, value) = model.remove(pos);
                assert_eq!(tree.remove(id).0, value);
            }
            if step % 50 == 0 {
                tree.check_invariants();
            }
        }
        tree.check_invariants();
        let expected: Vec<usize> = model.iter().map(|(_, v)| *v).collect();
        assert_eq!(values(&tree), expected);
    }
}
