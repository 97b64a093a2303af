//! The document: text, lines, anchors and undo history behind one editing interface.
//!
//! Every edit is a replacement of `length` characters at `offset`. A replacement runs through
//! a fixed pipeline:
//!
//! 1. validate the range (and the offset map, if one was given),
//! 2. dispatch [`DocumentEvent::Changing`] and record the change for undo,
//! 3. append the change to the version chain,
//! 4. edit the buffer and restructure the line tree (line trackers follow along),
//! 5. move anchors, then tell line trackers the change is complete,
//! 6. fire the callbacks of anchors deleted by the change,
//! 7. notify change listeners and dispatch [`DocumentEvent::Changed`].
//!
//! Edits always happen inside an update group; a single call opens its own. `TextChanged` and
//! `LineCountChanged` are coalesced until the outermost group ends.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::thread::{self, ThreadId};

use tracing::{debug, trace};

use crate::anchors::{AnchorTree, TextAnchor};
use crate::buffer::{TextBuffer, TextSnapshot};
use crate::change::{
    AnchorMovementType, DocumentChangeEvent, OffsetChangeMap, OffsetChangeMapEntry,
    OffsetChangeMappingType, TextSourceVersion, VersionProvider,
};
use crate::error::{DocumentError, Result};
use crate::line_manager::{LineManager, SharedLineTracker};
use crate::line_tree::{DocumentLine, LineId};
use crate::location::TextLocation;
use crate::segment::Segment;
use crate::undo::UndoStack;

/// Receives every change after the document is consistent again.
///
/// Segment collections and folding managers implement this to keep their offsets in sync.
pub trait ChangeListener {
    /// Called once per change, after anchors and lines were updated.
    fn document_changed(&mut self, document: &Document, event: &DocumentChangeEvent);
}

/// Shared handle to a change listener, as registered with a document.
pub type SharedChangeListener = Rc<RefCell<dyn ChangeListener>>;

/// Notification delivered to [`Document::subscribe`] callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentEvent<'a> {
    /// The outermost update group was opened.
    UpdateStarted,
    /// A change is about to be applied; the document still holds the old text.
    Changing(&'a DocumentChangeEvent),
    /// A change was applied.
    Changed(&'a DocumentChangeEvent),
    /// The text changed during the update group that is ending.
    TextChanged,
    /// The number of lines differs from the one at the previous notification.
    LineCountChanged,
    /// The outermost update group was closed.
    UpdateFinished,
}

/// Handle returned by [`Document::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Box<dyn FnMut(&Document, &DocumentEvent<'_>)>;

/// Construction options for a [`Document`].
#[derive(Debug, Clone)]
pub struct DocumentOptions {
    /// Maximum number of undo steps kept.
    pub undo_size_limit: usize,
    /// Thread allowed to access the document.
    pub owner_thread: ThreadId,
}

impl Default for DocumentOptions {
    fn default() -> Self {
        Self {
            undo_size_limit: usize::MAX,
            owner_thread: thread::current().id(),
        }
    }
}

/// A text document with a line index, anchors and undo history.
///
/// # Example
///
/// ```rust
/// use editor_document::Document;
///
/// let mut document = Document::from_text("abc\ndef");
/// document.insert(3, "\nxyz").unwrap();
/// assert_eq!(document.line_count(), 3);
/// assert_eq!(document.get_line_by_number(2).unwrap().offset, 4);
/// ```
pub struct Document {
    buffer: TextBuffer,
    lines: LineManager,
    anchors: Rc<RefCell<AnchorTree>>,
    undo_stack: UndoStack,
    versions: VersionProvider,
    owner: ThreadId,
    update_depth: usize,
    fire_text_changed: bool,
    old_line_count: usize,
    change_listeners: Vec<Weak<RefCell<dyn ChangeListener>>>,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: u64,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("text_length", &self.buffer.len())
            .field("line_count", &self.line_count())
            .field("update_depth", &self.update_depth)
            .finish_non_exhaustive()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Creates an empty document owned by the current thread.
    pub fn new() -> Self {
        Self::with_options("", DocumentOptions::default())
    }

    /// Creates a document holding `text`, owned by the current thread.
    pub fn from_text(text: &str) -> Self {
        Self::with_options(text, DocumentOptions::default())
    }

    /// Creates a document holding `text` with explicit options.
    pub fn with_options(text: &str, options: DocumentOptions) -> Self {
        let buffer = TextBuffer::from_text(text);
        let mut lines = LineManager::new();
        lines.rebuild(&buffer);
        let old_line_count = lines.tree().line_count();
        Self {
            buffer,
            lines,
            anchors: AnchorTree::new(),
            undo_stack: UndoStack::new(options.undo_size_limit),
            versions: VersionProvider::new(),
            owner: options.owner_thread,
            update_depth: 0,
            fire_text_changed: false,
            old_line_count,
            change_listeners: Vec::new(),
            subscribers: Vec::new(),
            next_subscription: 0,
        }
    }

    // ---- Thread ownership ----

    /// Fails with [`DocumentError::WrongThread`] unless called from the owner thread.
    pub fn verify_access(&self) -> Result<()> {
        let current = thread::current().id();
        if current != self.owner {
            return Err(DocumentError::WrongThread {
                owner: self.owner,
                current,
            });
        }
        Ok(())
    }

    /// Thread currently allowed to access the document.
    pub fn owner_thread(&self) -> ThreadId {
        self.owner
    }

    /// Transfers ownership to `owner`. Must be called from the current owner thread.
    pub fn set_owner_thread(&mut self, owner: ThreadId) -> Result<()> {
        self.verify_access()?;
        self.owner = owner;
        Ok(())
    }

    // ---- Text queries ----

    /// The whole text.
    pub fn text(&self) -> String {
        self.buffer.text()
    }

    /// Number of characters.
    pub fn text_length(&self) -> usize {
        self.buffer.len()
    }

    /// Number of lines (at least 1).
    pub fn line_count(&self) -> usize {
        self.lines.tree().line_count()
    }

    /// `length` characters starting at `offset`.
    pub fn get_text(&self, offset: usize, length: usize) -> Result<String> {
        self.verify_access()?;
        self.buffer.substring(offset, length)
    }

    /// Text covered by `segment`.
    pub fn get_text_of(&self, segment: &impl Segment) -> Result<String> {
        self.get_text(segment.offset(), segment.length())
    }

    /// Character at `offset`.
    pub fn char_at(&self, offset: usize) -> Result<char> {
        self.verify_access()?;
        self.buffer.char_at(offset)
    }

    /// Immutable copy of the current text that may be sent to other threads.
    pub fn create_snapshot(&self) -> TextSnapshot {
        self.buffer.snapshot()
    }

    /// Checkpoint identifying the current text.
    pub fn version(&self) -> TextSourceVersion {
        self.versions.current()
    }

    // ---- Lines and locations ----

    /// Line with the 1-based `number`.
    pub fn get_line_by_number(&self, number: usize) -> Result<DocumentLine> {
        self.verify_access()?;
        let tree = self.lines.tree();
        tree.get_by_number(number)
            .map(|id| tree.line(id))
            .ok_or(DocumentError::LineOutOfRange {
                line: number,
                line_count: tree.line_count(),
            })
    }

    /// Line containing `offset`. The text end belongs to the last line.
    pub fn get_line_by_offset(&self, offset: usize) -> Result<DocumentLine> {
        self.verify_access()?;
        self.buffer.check_offset(offset)?;
        let tree = self.lines.tree();
        tree.get_by_offset(offset)
            .map(|id| tree.line(id))
            .ok_or(DocumentError::OffsetOutOfRange {
                offset,
                text_length: self.buffer.len(),
            })
    }

    /// Offset of a 1-based line and column. Columns outside the line clamp to its ends.
    pub fn get_offset(&self, line: usize, column: usize) -> Result<usize> {
        let line = self.get_line_by_number(line)?;
        if column == 0 {
            return Ok(line.offset);
        }
        if column > line.length() {
            return Ok(line.end_offset());
        }
        Ok(line.offset + column - 1)
    }

    /// Offset of `location`.
    pub fn get_offset_at(&self, location: TextLocation) -> Result<usize> {
        self.get_offset(location.line, location.column)
    }

    /// 1-based line and column of `offset`.
    pub fn get_location(&self, offset: usize) -> Result<TextLocation> {
        let line = self.get_line_by_offset(offset)?;
        Ok(TextLocation::new(line.line_number, offset - line.offset + 1))
    }

    /// Line containing `offset`, with `offset` clamped to the text.
    pub(crate) fn line_containing(&self, offset: usize) -> DocumentLine {
        let tree = self.lines.tree();
        let id = tree
            .get_by_offset(offset.min(self.buffer.len()))
            .unwrap_or_else(|| tree.first());
        tree.line(id)
    }

    /// All lines in order.
    pub fn lines(&self) -> impl Iterator<Item = DocumentLine> + '_ {
        let tree = self.lines.tree();
        tree.iter().map(|id| tree.line(id))
    }

    /// Current state of a line, or `None` once it was removed.
    pub fn line_by_id(&self, id: LineId) -> Option<DocumentLine> {
        let tree = self.lines.tree();
        tree.contains(id).then(|| tree.line(id))
    }

    /// Line after `line`, if `line` still exists and is not the last one.
    pub fn next_line(&self, line: &DocumentLine) -> Option<DocumentLine> {
        let tree = self.lines.tree();
        if !tree.contains(line.id) {
            return None;
        }
        tree.next(line.id).map(|id| tree.line(id))
    }

    /// Line before `line`, if `line` still exists and is not the first one.
    pub fn previous_line(&self, line: &DocumentLine) -> Option<DocumentLine> {
        let tree = self.lines.tree();
        if !tree.contains(line.id) {
            return None;
        }
        tree.prev(line.id).map(|id| tree.line(id))
    }

    // ---- Anchors ----

    /// Creates an anchor at `offset`.
    pub fn create_anchor(&mut self, offset: usize) -> Result<TextAnchor> {
        self.verify_access()?;
        self.buffer.check_offset(offset)?;
        Ok(AnchorTree::create_anchor(&self.anchors, offset))
    }

    /// Number of nodes in the anchor tree, including dropped anchors not released yet.
    pub fn anchor_node_count(&self) -> usize {
        self.anchors.borrow().node_count()
    }

    // ---- Collaborators ----

    /// Registers `listener` for [`ChangeListener::document_changed`]. The document only holds
    /// it weakly.
    pub fn add_change_listener(&mut self, listener: &SharedChangeListener) {
        self.change_listeners.push(Rc::downgrade(listener));
    }

    /// Unregisters `listener`. Returns `false` if it was not registered.
    pub fn remove_change_listener(&mut self, listener: &SharedChangeListener) -> bool {
        let before = self.change_listeners.len();
        let target = Rc::downgrade(listener);
        self.change_listeners.retain(|l| !Weak::ptr_eq(l, &target));
        self.change_listeners.len() != before
    }

    /// Registers a line tracker. The document only holds it weakly.
    ///
    /// The tracker must already mirror the current lines (e.g. a height tree created with
    /// [`Self::line_count`] lines).
    pub fn add_line_tracker(&mut self, tracker: &SharedLineTracker) {
        self.lines.add_tracker(tracker);
    }

    /// Unregisters a line tracker. Returns `false` if it was not registered.
    pub fn remove_line_tracker(&mut self, tracker: &SharedLineTracker) -> bool {
        self.lines.remove_tracker(tracker)
    }

    /// Calls `callback` for every [`DocumentEvent`] until [`Self::unsubscribe`].
    pub fn subscribe(
        &mut self,
        callback: impl FnMut(&Document, &DocumentEvent<'_>) + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    /// Removes a subscription. Returns `false` if it did not exist.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(s, _)| *s != id);
        self.subscribers.len() != before
    }

    fn dispatch(&mut self, event: &DocumentEvent<'_>) {
        if self.subscribers.is_empty() {
            return;
        }
        // Callbacks only see `&Document`, so they cannot add subscriptions while we iterate.
        let mut subscribers = std::mem::take(&mut self.subscribers);
        for (_, callback) in &mut subscribers {
            callback(self, event);
        }
        self.subscribers = subscribers;
    }

    fn notify_changed(&mut self, event: &DocumentChangeEvent) {
        self.change_listeners.retain(|l| l.strong_count() > 0);
        let listeners: Vec<SharedChangeListener> =
            self.change_listeners.iter().filter_map(Weak::upgrade).collect();
        for listener in listeners {
            listener.borrow_mut().document_changed(self, event);
        }
        self.dispatch(&DocumentEvent::Changed(event));
    }

    // ---- Update groups ----

    /// Whether an update group is open.
    pub fn is_in_update(&self) -> bool {
        self.update_depth > 0
    }

    /// Opens an update group. Groups nest; the outermost one forms a single undo step.
    pub fn begin_update(&mut self) -> Result<()> {
        self.verify_access()?;
        self.update_depth += 1;
        if self.update_depth == 1 {
            self.undo_stack.start_undo_group();
            self.dispatch(&DocumentEvent::UpdateStarted);
        }
        Ok(())
    }

    /// Closes an update group. Closing the outermost one fires the coalesced events.
    pub fn end_update(&mut self) -> Result<()> {
        self.verify_access()?;
        match self.update_depth {
            0 => Err(DocumentError::invalid_operation("no update is active")),
            1 => {
                self.fire_change_events();
                // The update closes even if the undo groups were unbalanced through
                // `undo_stack_mut`.
                let closed = self.undo_stack.end_undo_group();
                self.update_depth = 0;
                self.dispatch(&DocumentEvent::UpdateFinished);
                closed
            }
            _ => {
                self.update_depth -= 1;
                Ok(())
            }
        }
    }

    fn fire_change_events(&mut self) {
        if !self.fire_text_changed {
            return;
        }
        self.fire_text_changed = false;
        self.dispatch(&DocumentEvent::TextChanged);
        let line_count = self.line_count();
        if line_count != self.old_line_count {
            self.old_line_count = line_count;
            self.dispatch(&DocumentEvent::LineCountChanged);
        }
    }

    // ---- Editing ----

    /// Inserts `text` at `offset`. Anchors at `offset` move after the text unless they ask
    /// otherwise.
    pub fn insert(&mut self, offset: usize, text: &str) -> Result<()> {
        self.replace(offset, 0, text)
    }

    /// Inserts `text` at `offset`; anchors with default movement at `offset` follow `movement`.
    pub fn insert_with_movement(
        &mut self,
        offset: usize,
        text: &str,
        movement: AnchorMovementType,
    ) -> Result<()> {
        let mapping = if movement == AnchorMovementType::BeforeInsertion {
            OffsetChangeMappingType::KeepAnchorBeforeInsertion
        } else {
            OffsetChangeMappingType::Normal
        };
        self.replace_with_mapping(offset, 0, text, mapping)
    }

    /// Removes `length` characters at `offset`.
    pub fn remove(&mut self, offset: usize, length: usize) -> Result<()> {
        self.replace(offset, length, "")
    }

    /// Replaces `length` characters at `offset` with `text`.
    pub fn replace(&mut self, offset: usize, length: usize, text: &str) -> Result<()> {
        self.replace_checked(offset, length, text, None)
    }

    /// Replaces text, choosing how anchors and segments inside the range move.
    pub fn replace_with_mapping(
        &mut self,
        offset: usize,
        length: usize,
        text: &str,
        mapping: OffsetChangeMappingType,
    ) -> Result<()> {
        let insertion_length = text.chars().count();
        let map = match mapping {
            OffsetChangeMappingType::Normal => None,
            OffsetChangeMappingType::KeepAnchorBeforeInsertion => {
                Some(OffsetChangeMap::from_entry(OffsetChangeMapEntry::with_flags(
                    offset,
                    length,
                    insertion_length,
                    false,
                    true,
                )))
            }
            OffsetChangeMappingType::RemoveAndInsert if length > 0 && insertion_length > 0 => {
                Some(OffsetChangeMap::from_iter([
                    OffsetChangeMapEntry::new(offset, length, 0),
                    OffsetChangeMapEntry::new(offset, 0, insertion_length),
                ]))
            }
            OffsetChangeMappingType::CharacterReplace if length > 0 && insertion_length > 0 => {
                if insertion_length > length {
                    // Grow at the end so anchors inside the replaced characters stay in place.
                    Some(OffsetChangeMap::from_entry(OffsetChangeMapEntry::new(
                        offset + length - 1,
                        1,
                        1 + insertion_length - length,
                    )))
                } else if insertion_length < length {
                    Some(OffsetChangeMap::from_entry(OffsetChangeMapEntry::with_flags(
                        offset + insertion_length,
                        length - insertion_length,
                        0,
                        true,
                        false,
                    )))
                } else {
                    Some(OffsetChangeMap::new())
                }
            }
            OffsetChangeMappingType::RemoveAndInsert | OffsetChangeMappingType::CharacterReplace => {
                None
            }
        };
        self.replace_checked(offset, length, text, map)
    }

    /// Replaces text with an explicit offset map, which must describe exactly this change.
    pub fn replace_with_offset_map(
        &mut self,
        offset: usize,
        length: usize,
        text: &str,
        map: OffsetChangeMap,
    ) -> Result<()> {
        if !map.is_valid_for_document_change(offset, length, text.chars().count()) {
            return Err(DocumentError::invalid_argument(
                "offset change map does not describe this change",
            ));
        }
        self.replace_checked(offset, length, text, Some(map))
    }

    /// Replaces the whole text.
    pub fn set_text(&mut self, text: &str) -> Result<()> {
        self.replace(0, self.buffer.len(), text)
    }

    fn replace_checked(
        &mut self,
        offset: usize,
        length: usize,
        text: &str,
        map: Option<OffsetChangeMap>,
    ) -> Result<()> {
        self.verify_access()?;
        self.buffer.check_range(offset, length)?;
        self.begin_update()?;
        let result = self.do_replace(offset, length, text, map);
        self.end_update()?;
        result
    }

    fn do_replace(
        &mut self,
        offset: usize,
        length: usize,
        text: &str,
        map: Option<OffsetChangeMap>,
    ) -> Result<()> {
        let insertion_length = text.chars().count();
        if length == 0 && insertion_length == 0 {
            return Ok(());
        }
        // Replacing one character by another never moves anchors.
        let map = match map {
            None if length == 1 && insertion_length == 1 => Some(OffsetChangeMap::new()),
            map => map,
        };
        let removed = self.buffer.substring(offset, length)?;
        let event = DocumentChangeEvent::with_offset_map(offset, &removed, text, map);

        self.dispatch(&DocumentEvent::Changing(&event));
        self.undo_stack.push(event.clone());
        self.fire_text_changed = true;
        self.versions.append_change(event.clone());

        if offset == 0 && length == self.buffer.len() {
            self.buffer.clear();
            self.buffer.insert(0, text)?;
            self.lines.rebuild(&self.buffer);
        } else {
            self.buffer.remove(offset, length)?;
            self.lines.remove(&self.buffer, offset, length);
            if !text.is_empty() {
                self.buffer.insert(offset, text)?;
                self.lines.insert(&self.buffer, offset, text);
            }
        }
        #[cfg(debug_assertions)]
        self.lines.tree().check_invariants();
        trace!(offset, length, insertion_length, "replaced text");

        let mut deleted = Vec::new();
        {
            let mut anchors = self.anchors.borrow_mut();
            for entry in event.offset_change_map().entries() {
                anchors.handle_text_change(entry, &mut deleted);
            }
        }
        self.lines.change_complete(&event);
        for anchor in &deleted {
            anchor.fire_deleted();
        }
        self.notify_changed(&event);
        Ok(())
    }

    // ---- Undo ----

    /// The undo history.
    pub fn undo_stack(&self) -> &UndoStack {
        &self.undo_stack
    }

    /// The undo history, for grouping and limits.
    pub fn undo_stack_mut(&mut self) -> &mut UndoStack {
        &mut self.undo_stack
    }

    /// Reverts the newest undo step. Returns `false` if there was nothing to undo.
    pub fn undo(&mut self) -> Result<bool> {
        self.check_can_replay()?;
        let Some(changes) = self.undo_stack.begin_undo() else {
            return Ok(false);
        };
        let inverted: Vec<DocumentChangeEvent> =
            changes.iter().rev().map(DocumentChangeEvent::invert).collect();
        let result = self.replay(&inverted);
        self.undo_stack.finish_replay();
        result.map(|()| true)
    }

    /// Re-applies the newest redo step. Returns `false` if there was nothing to redo.
    pub fn redo(&mut self) -> Result<bool> {
        self.check_can_replay()?;
        let Some(changes) = self.undo_stack.begin_redo() else {
            return Ok(false);
        };
        let result = self.replay(&changes);
        self.undo_stack.finish_replay();
        result.map(|()| true)
    }

    fn check_can_replay(&self) -> Result<()> {
        self.verify_access()?;
        if self.update_depth > 0 {
            return Err(DocumentError::invalid_operation(
                "cannot undo or redo while an update group is open",
            ));
        }
        if self.undo_stack.is_group_open() {
            return Err(DocumentError::invalid_operation(
                "cannot undo or redo while an undo group is open",
            ));
        }
        Ok(())
    }

    fn replay(&mut self, changes: &[DocumentChangeEvent]) -> Result<()> {
        debug!(changes = changes.len(), "replaying changes");
        self.begin_update()?;
        let mut result = Ok(());
        for change in changes {
            result = self
                .buffer
                .check_range(change.offset(), change.removal_length())
                .and_then(|()| {
                    self.do_replace(
                        change.offset(),
                        change.removal_length(),
                        change.inserted_text(),
                        Some(change.offset_change_map().clone()),
                    )
                });
            if result.is_err() {
                break;
            }
        }
        self.end_update()?;
        result
    }
}
