//! Text anchors.
//!
//! Anchors are kept in a red-black tree ordered by offset, with each node storing the distance
//! from the previous anchor. Nodes reference their [`TextAnchor`] weakly: dropping the last
//! handle queues the node for release, and the queue is compacted when the next edit is applied.
//! The internal node count therefore lags one edit behind the live handles.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use crate::change::{AnchorMovementType, OffsetChangeMapEntry};
use crate::document::Document;
use crate::error::{DocumentError, Result};
use crate::location::TextLocation;
use crate::rb_tree::{Augment, NodeId, RbTree};

type ReleaseQueue = Rc<Cell<Vec<NodeId>>>;
type DeletedCallback = Box<dyn FnMut(&TextAnchor)>;

struct AnchorState {
    tree: Weak<RefCell<AnchorTree>>,
    released: Weak<Cell<Vec<NodeId>>>,
    node: Cell<Option<NodeId>>,
    movement: Cell<AnchorMovementType>,
    survive_deletion: Cell<bool>,
    deleted: Cell<bool>,
    on_deleted: RefCell<Vec<DeletedCallback>>,
}

impl Drop for AnchorState {
    fn drop(&mut self) {
        if let Some(node) = self.node.get()
            && let Some(queue) = self.released.upgrade()
        {
            queue_release(&queue, node);
        }
    }
}

fn queue_release(queue: &Cell<Vec<NodeId>>, node: NodeId) {
    let mut queued = queue.take();
    queued.push(node);
    queue.set(queued);
}

/// A position in a document that moves with edits.
///
/// Handles are cheap to clone; the anchor stays tracked as long as at least one handle exists.
/// Created through [`Document::create_anchor`].
#[derive(Clone)]
pub struct TextAnchor(Rc<AnchorState>);

impl TextAnchor {
    /// Current offset.
    ///
    /// Fails with [`DocumentError::AnchorDeleted`] once the anchor was deleted and with
    /// [`DocumentError::NoDocument`] once its document is gone.
    pub fn offset(&self) -> Result<usize> {
        let tree = self.0.tree.upgrade().ok_or(DocumentError::NoDocument)?;
        let node = self.0.node.get().ok_or(DocumentError::AnchorDeleted)?;
        let tree = tree
            .try_borrow()
            .map_err(|_| DocumentError::invalid_operation("anchors are being updated"))?;
        Ok(tree.offset_of(node))
    }

    /// Current line and column, resolved through `document`.
    pub fn location(&self, document: &Document) -> Result<TextLocation> {
        document.get_location(self.offset()?)
    }

    /// Current 1-based line number, resolved through `document`.
    pub fn line(&self, document: &Document) -> Result<usize> {
        Ok(self.location(document)?.line)
    }

    /// How the anchor reacts to text inserted at its position.
    pub fn movement_type(&self) -> AnchorMovementType {
        self.0.movement.get()
    }

    /// Sets the movement policy.
    pub fn set_movement_type(&self, movement: AnchorMovementType) {
        self.0.movement.set(movement);
    }

    /// Whether the anchor survives the removal of text around it.
    pub fn survive_deletion(&self) -> bool {
        self.0.survive_deletion.get()
    }

    /// Lets the anchor survive removals; it then moves to the start of the removed range.
    pub fn set_survive_deletion(&self, survive: bool) {
        self.0.survive_deletion.set(survive);
    }

    /// Whether the anchor was deleted by a removal.
    pub fn is_deleted(&self) -> bool {
        self.0.deleted.get()
    }

    /// Registers a callback fired once when the anchor is deleted.
    ///
    /// Callbacks run after the document finished applying the change that deleted the anchor.
    pub fn on_deleted(&self, callback: impl FnMut(&TextAnchor) + 'static) {
        self.0.on_deleted.borrow_mut().push(Box::new(callback));
    }

    /// Whether both handles refer to the same anchor.
    pub fn ptr_eq(&self, other: &TextAnchor) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn fire_deleted(&self) {
        let callbacks = std::mem::take(&mut *self.0.on_deleted.borrow_mut());
        for mut callback in callbacks {
            callback(self);
        }
    }

    fn mark_deleted(&self) {
        self.0.node.set(None);
        self.0.deleted.set(true);
    }
}

impl PartialEq for TextAnchor {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for TextAnchor {}

impl fmt::Debug for TextAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("TextAnchor");
        match self.offset() {
            Ok(offset) => s.field("offset", &offset),
            Err(_) => s.field("deleted", &self.is_deleted()),
        };
        s.field("movement", &self.movement_type())
            .field("survive_deletion", &self.survive_deletion())
            .finish()
    }
}

struct AnchorNode {
    /// Distance from the previous anchor (or from 0 for the first one).
    length: usize,
    anchor: Weak<AnchorState>,
}

impl Augment for AnchorNode {
    type Summary = usize;

    fn summarize(&self, left: Option<&usize>, right: Option<&usize>) -> usize {
        self.length + left.copied().unwrap_or(0) + right.copied().unwrap_or(0)
    }
}

/// Offset-ordered anchor storage of a document.
pub(crate) struct AnchorTree {
    tree: RbTree<AnchorNode>,
    released: ReleaseQueue,
}

impl AnchorTree {
    pub(crate) fn new() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            tree: RbTree::new(),
            released: Rc::new(Cell::new(Vec::new())),
        }))
    }

    /// Number of nodes, including nodes of dropped anchors not compacted yet.
    pub(crate) fn node_count(&self) -> usize {
        self.tree.len()
    }

    /// Creates an anchor at `offset`. The caller validates the offset.
    pub(crate) fn create_anchor(this: &Rc<RefCell<Self>>, offset: usize) -> TextAnchor {
        let state = Rc::new(AnchorState {
            tree: Rc::downgrade(this),
            released: Rc::downgrade(&this.borrow().released),
            node: Cell::new(None),
            movement: Cell::new(AnchorMovementType::Default),
            survive_deletion: Cell::new(false),
            deleted: Cell::new(false),
            on_deleted: RefCell::new(Vec::new()),
        });
        let node = this.borrow_mut().insert(offset, Rc::downgrade(&state));
        state.node.set(Some(node));
        TextAnchor(state)
    }

    fn insert(&mut self, offset: usize, anchor: Weak<AnchorState>) -> NodeId {
        let Some(root) = self.tree.root() else {
            return self.tree.insert_root(AnchorNode {
                length: offset,
                anchor,
            });
        };
        let total = *self.tree.summary(root);
        if offset >= total {
            let last = self.tree.rightmost(root);
            return self.tree.insert_after(
                last,
                AnchorNode {
                    length: offset - total,
                    anchor,
                },
            );
        }
        match self.find_node(offset) {
            (Some(node), remaining) => {
                self.tree.get_mut(node).length -= remaining;
                self.tree.update_augmented(node);
                self.tree.insert_before(
                    node,
                    AnchorNode {
                        length: remaining,
                        anchor,
                    },
                )
            }
            (None, _) => {
                let last = self.tree.rightmost(root);
                self.tree.insert_after(
                    last,
                    AnchorNode {
                        length: offset - total,
                        anchor,
                    },
                )
            }
        }
    }

    fn total_length(&self, id: Option<NodeId>) -> usize {
        id.map_or(0, |id| *self.tree.summary(id))
    }

    fn length(&self, id: NodeId) -> usize {
        self.tree.get(id).length
    }

    fn set_length(&mut self, id: NodeId, length: usize) {
        self.tree.get_mut(id).length = length;
        self.tree.update_augmented(id);
    }

    pub(crate) fn offset_of(&self, id: NodeId) -> usize {
        let mut offset = self.length(id) + self.total_length(self.tree.left(id));
        let mut node = id;
        while let Some(parent) = self.tree.parent(node) {
            if self.tree.right(parent) == Some(node) {
                offset += self.total_length(self.tree.left(parent)) + self.length(parent);
            }
            node = parent;
        }
        offset
    }

    /// First node positioned after `offset`, and the distance from its predecessor to `offset`.
    fn find_node(&self, offset: usize) -> (Option<NodeId>, usize) {
        let mut offset = offset;
        let mut current = self.tree.root();
        while let Some(node) = current {
            let left_total = self.total_length(self.tree.left(node));
            if offset < left_total {
                current = self.tree.left(node);
                continue;
            }
            offset -= left_total;
            let length = self.length(node);
            if offset < length {
                return (Some(node), offset);
            }
            offset -= length;
            current = self.tree.right(node);
        }
        (None, offset)
    }

    /// Applies one change entry. Anchors deleted by the change are pushed to `deleted`; their
    /// callbacks are fired by the caller once the document is consistent again.
    pub(crate) fn handle_text_change(
        &mut self,
        entry: &OffsetChangeMapEntry,
        deleted: &mut Vec<TextAnchor>,
    ) {
        self.compact_released();
        if entry.removal_length == 0 {
            self.insert_text(
                entry.offset,
                entry.insertion_length,
                entry.default_anchor_movement_is_before_insertion,
            );
        } else {
            self.replace_text(entry, deleted);
        }
        self.compact_released();
        #[cfg(debug_assertions)]
        self.check_invariants();
    }

    fn replace_text(&mut self, entry: &OffsetChangeMapEntry, deleted: &mut Vec<TextAnchor>) {
        let Some(root) = self.tree.root() else {
            return;
        };
        if entry.offset >= *self.tree.summary(root) {
            return;
        }
        let (mut node, mut offset) = self.find_node(entry.offset);
        let mut remaining_removal = entry.removal_length;
        let mut first_survivor = None;
        while let Some(n) = node
            && offset + remaining_removal > self.length(n)
        {
            let anchor = self.tree.get(n).anchor.upgrade();
            match anchor {
                Some(anchor)
                    if anchor.survive_deletion.get()
                        || entry.removal_never_causes_anchor_deletion =>
                {
                    // Keep the node but put it in front of the removed range.
                    first_survivor.get_or_insert(n);
                    remaining_removal -= self.length(n) - offset;
                    self.set_length(n, offset);
                    offset = 0;
                    node = self.tree.next(n);
                }
                anchor => {
                    let successor = self.tree.next(n);
                    remaining_removal -= self.length(n);
                    self.tree.remove(n);
                    if let Some(anchor) = anchor {
                        let anchor = TextAnchor(anchor);
                        anchor.mark_deleted();
                        deleted.push(anchor);
                    }
                    node = successor;
                }
            }
        }
        // `node` is the first anchor behind the removed range.
        if let Some(n) = node {
            let length = self.length(n);
            debug_assert!(length >= remaining_removal);
            self.tree.get_mut(n).length = length.saturating_sub(remaining_removal);
        }
        if entry.insertion_length > 0 {
            if let Some(first_survivor) = first_survivor {
                self.perform_insert_text(
                    first_survivor,
                    node,
                    entry.insertion_length,
                    entry.default_anchor_movement_is_before_insertion,
                );
            } else if let Some(n) = node {
                self.tree.get_mut(n).length += entry.insertion_length;
            }
        }
        if let Some(n) = node {
            self.tree.update_to_root(n);
        }
        trace!(
            offset = entry.offset,
            deleted = deleted.len(),
            "moved anchors over replacement"
        );
    }

    fn insert_text(&mut self, offset: usize, length: usize, default_before: bool) {
        let Some(root) = self.tree.root() else {
            return;
        };
        let total = *self.tree.summary(root);
        if length == 0 || offset > total {
            return;
        }
        if offset == total {
            let last = self.tree.rightmost(root);
            if let Some(begin) = self.find_actual_begin_node(Some(last)) {
                self.perform_insert_text(begin, None, length, default_before);
            }
            return;
        }
        let (Some(end_node), remaining) = self.find_node(offset) else {
            return;
        };
        if remaining > 0 {
            // No anchor sits exactly at `offset`.
            let new_length = self.length(end_node) + length;
            self.set_length(end_node, new_length);
        } else if let Some(begin) = self.find_actual_begin_node(self.tree.prev(end_node)) {
            self.perform_insert_text(begin, Some(end_node), length, default_before);
        }
    }

    /// First of the anchors sharing the position of `node`.
    fn find_actual_begin_node(&self, node: Option<NodeId>) -> Option<NodeId> {
        let mut node = node;
        while let Some(n) = node
            && self.length(n) == 0
        {
            node = self.tree.prev(n);
        }
        node.or_else(|| self.tree.first())
    }

    /// Reorders the anchors in `begin..end` (which share one position) so the ones staying
    /// before the insertion come first, then inserts `length` between the two groups.
    fn perform_insert_text(
        &mut self,
        begin: NodeId,
        end: Option<NodeId>,
        length: usize,
        default_before: bool,
    ) {
        let mut before_insert = Vec::new();
        let mut current = Some(begin);
        while let Some(node) = current
            && current != end
        {
            match self.tree.get(node).anchor.upgrade() {
                None => queue_release(&self.released, node),
                Some(anchor) => {
                    let movement = anchor.movement.get();
                    let stays_before = if default_before {
                        movement != AnchorMovementType::AfterInsertion
                    } else {
                        movement == AnchorMovementType::BeforeInsertion
                    };
                    if stays_before {
                        before_insert.push(node);
                    }
                }
            }
            current = self.tree.next(node);
        }

        let mut after_insert = Some(begin);
        for node in before_insert {
            let Some(target) = after_insert else {
                break;
            };
            self.swap_anchors(node, target);
            after_insert = self.tree.next(target);
        }
        if let Some(node) = after_insert.or(end) {
            let new_length = self.length(node) + length;
            self.set_length(node, new_length);
        }
    }

    fn swap_anchors(&mut self, n1: NodeId, n2: NodeId) {
        if n1 == n2 {
            return;
        }
        let a1 = self.tree.get(n1).anchor.clone();
        let a2 = self.tree.get(n2).anchor.clone();
        let (s1, s2) = (a1.upgrade(), a2.upgrade());
        if s1.is_none() && s2.is_none() {
            return;
        }
        self.tree.get_mut(n1).anchor = a2;
        self.tree.get_mut(n2).anchor = a1;
        match (s1, s2) {
            (Some(s1), Some(s2)) => {
                s1.node.set(Some(n2));
                s2.node.set(Some(n1));
            }
            (Some(s1), None) => {
                s1.node.set(Some(n2));
                queue_release(&self.released, n1);
            }
            (None, Some(s2)) => {
                s2.node.set(Some(n1));
                queue_release(&self.released, n2);
            }
            (None, None) => {}
        }
    }

    /// Removes the nodes of dropped anchors.
    pub(crate) fn compact_released(&mut self) {
        let queued = self.released.take();
        if queued.is_empty() {
            return;
        }
        let mut removed = 0;
        for id in queued {
            if self.tree.contains(id) && self.tree.get(id).anchor.strong_count() == 0 {
                if let Some(successor) = self.tree.next(id) {
                    let length = self.length(successor) + self.length(id);
                    self.set_length(successor, length);
                }
                self.tree.remove(id);
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(removed, remaining = self.tree.len(), "released dropped anchors");
        }
    }

    #[cfg(any(test, debug_assertions))]
    pub(crate) fn check_invariants(&self) {
        self.tree.check_invariants();
        for id in self.tree.iter() {
            if let Some(anchor) = self.tree.get(id).anchor.upgrade() {
                assert_eq!(anchor.node.get(), Some(id), "anchor does not point back to its node");
            }
        }
    }
}
