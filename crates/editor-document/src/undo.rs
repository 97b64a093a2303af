//! Undo/redo history of document changes.
//!
//! The document records every change while it is being applied. Changes made inside one
//! top-level update group form a single undo step; undoing a step replays the inverted
//! changes in reverse order.

use std::collections::VecDeque;

use tracing::debug;

use crate::change::DocumentChangeEvent;
use crate::error::{DocumentError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UndoState {
    Listening,
    Undoing,
    Redoing,
}

#[derive(Debug, Clone, Default)]
struct UndoStep {
    changes: Vec<DocumentChangeEvent>,
}

/// Grouped undo/redo history owned by a [`crate::Document`].
#[derive(Debug)]
pub struct UndoStack {
    undo_stack: VecDeque<UndoStep>,
    redo_stack: VecDeque<UndoStep>,
    size_limit: usize,
    state: UndoState,
    group_depth: usize,
    /// Changes pushed now extend the step on top of the undo stack.
    open_step: bool,
    /// The last group may be continued by `start_continued_undo_group`.
    allow_continue: bool,
    /// Undo stack length at which the text equals the original file. `None` once unreachable.
    original_index: Option<usize>,
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new(usize::MAX)
    }
}

impl UndoStack {
    /// Creates an empty history keeping at most `size_limit` steps.
    pub fn new(size_limit: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            size_limit,
            state: UndoState::Listening,
            group_depth: 0,
            open_step: false,
            allow_continue: false,
            original_index: Some(0),
        }
    }

    /// Whether there is a step to undo.
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    /// Whether there is a step to redo.
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Number of undo steps.
    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    /// Number of redo steps.
    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    /// Maximum number of steps kept on each stack.
    pub fn size_limit(&self) -> usize {
        self.size_limit
    }

    /// Changes the limit, dropping the oldest steps if necessary.
    pub fn set_size_limit(&mut self, size_limit: usize) {
        self.size_limit = size_limit;
        self.enforce_size_limit();
    }

    /// Whether undo/redo is replaying changes right now.
    pub fn is_replaying(&self) -> bool {
        self.state != UndoState::Listening
    }

    /// Whether the text is back at the state last marked with [`Self::mark_as_original_file`].
    pub fn is_original_file(&self) -> bool {
        self.original_index == Some(self.undo_stack.len())
    }

    /// Marks the current state as the original file (e.g. after saving).
    pub fn mark_as_original_file(&mut self) {
        self.original_index = Some(self.undo_stack.len());
        self.allow_continue = false;
    }

    /// Drops both stacks.
    pub fn clear_all(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.open_step = false;
        self.allow_continue = false;
        if self.original_index != Some(0) {
            self.original_index = None;
        }
    }

    /// Drops the redo stack.
    pub fn clear_redo_stack(&mut self) {
        if self.redo_stack.is_empty() {
            return;
        }
        // An original state in the redo area becomes unreachable.
        if let Some(index) = self.original_index
            && index > self.undo_stack.len()
        {
            self.original_index = None;
        }
        self.redo_stack.clear();
    }

    /// Whether a group opened by [`Self::start_undo_group`] is still open.
    pub fn is_group_open(&self) -> bool {
        self.group_depth > 0
    }

    /// Opens a group; all changes until the matching [`Self::end_undo_group`] form one step.
    pub fn start_undo_group(&mut self) {
        if self.group_depth == 0 {
            self.open_step = false;
        }
        self.group_depth += 1;
    }

    /// Opens a group that extends the previous step if nothing happened in between.
    pub fn start_continued_undo_group(&mut self) {
        if self.group_depth == 0 {
            self.open_step = self.allow_continue
                && !self.undo_stack.is_empty()
                && !self.is_original_file();
        }
        self.group_depth += 1;
    }

    /// Closes a group opened by [`Self::start_undo_group`] or
    /// [`Self::start_continued_undo_group`].
    pub fn end_undo_group(&mut self) -> Result<()> {
        if self.group_depth == 0 {
            return Err(DocumentError::invalid_operation(
                "end_undo_group without a matching start",
            ));
        }
        self.group_depth -= 1;
        if self.group_depth == 0 {
            self.allow_continue = self.open_step;
            self.open_step = false;
            self.enforce_size_limit();
        }
        Ok(())
    }

    /// Records a change. Ignored while undo/redo replays changes.
    pub(crate) fn push(&mut self, change: DocumentChangeEvent) {
        if self.state != UndoState::Listening {
            return;
        }
        self.clear_redo_stack();
        // Extending a step that is marked original would hide the modification.
        let extend = self.open_step && !self.is_original_file();
        match self.undo_stack.back_mut() {
            Some(step) if extend => step.changes.push(change),
            _ => self.undo_stack.push_back(UndoStep {
                changes: vec![change],
            }),
        }
        if self.group_depth == 0 {
            self.allow_continue = true;
            self.enforce_size_limit();
        } else {
            self.open_step = true;
        }
    }

    /// Moves the newest undo step to the redo stack and returns its changes, oldest first.
    ///
    /// The stack ignores pushes until [`Self::finish_replay`].
    pub(crate) fn begin_undo(&mut self) -> Option<Vec<DocumentChangeEvent>> {
        let step = self.undo_stack.pop_back()?;
        let changes = step.changes.clone();
        self.redo_stack.push_back(step);
        self.state = UndoState::Undoing;
        self.allow_continue = false;
        debug!(changes = changes.len(), "undo");
        Some(changes)
    }

    /// Moves the newest redo step back to the undo stack and returns its changes, oldest first.
    pub(crate) fn begin_redo(&mut self) -> Option<Vec<DocumentChangeEvent>> {
        let step = self.redo_stack.pop_back()?;
        let changes = step.changes.clone();
        self.undo_stack.push_back(step);
        self.state = UndoState::Redoing;
        self.allow_continue = false;
        debug!(changes = changes.len(), "redo");
        Some(changes)
    }

    pub(crate) fn finish_replay(&mut self) {
        self.state = UndoState::Listening;
    }

    fn enforce_size_limit(&mut self) {
        if self.state != UndoState::Listening || self.group_depth > 0 {
            return;
        }
        while self.undo_stack.len() > self.size_limit {
            self.undo_stack.pop_front();
            self.original_index = match self.original_index {
                Some(0) | None => None,
                Some(index) => Some(index - 1),
            };
        }
        while self.redo_stack.len() > self.size_limit {
            self.redo_stack.pop_front();
        }
        if let Some(index) = self.original_index
            && index > self.undo_stack.len() + self.redo_stack.len()
        {
            self.original_index = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert(offset: usize, text: &str) -> DocumentChangeEvent {
        DocumentChangeEvent::new(offset, "", text)
    }

    #[test]
    fn test_ungrouped_pushes_are_separate_steps() {
        let mut stack = UndoStack::default();
        stack.push(insert(0, "a"));
        stack.push(insert(1, "b"));
        assert_eq!(stack.undo_depth(), 2);
        assert!(!stack.is_original_file());
    }

    #[test]
    fn test_group_forms_one_step() {
        let mut stack = UndoStack::default();
        stack.start_undo_group();
        stack.push(insert(0, "a"));
        stack.start_undo_group();
        stack.push(insert(1, "b"));
        stack.end_undo_group().unwrap();
        stack.push(insert(2, "c"));
        stack.end_undo_group().unwrap();
        assert_eq!(stack.undo_depth(), 1);

        let changes = stack.begin_undo().unwrap();
        assert_eq!(changes.len(), 3);
        assert_eq!(changes[2].inserted_text(), "c");
        stack.finish_replay();
        assert!(stack.can_redo());
        assert!(stack.is_original_file());
    }

    #[test]
    fn test_unbalanced_end_group_fails() {
        let mut stack = UndoStack::default();
        assert!(matches!(
            stack.end_undo_group(),
            Err(DocumentError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_group_open_until_outermost_end() {
        let mut stack = UndoStack::default();
        stack.start_undo_group();
        stack.start_continued_undo_group();
        stack.end_undo_group().unwrap();
        assert!(stack.is_group_open());
        stack.end_undo_group().unwrap();
        assert!(!stack.is_group_open());
    }

    #[test]
    fn test_empty_group_records_nothing() {
        let mut stack = UndoStack::default();
        stack.start_undo_group();
        stack.end_undo_group().unwrap();
        assert!(!stack.can_undo());
    }

    #[test]
    fn test_continued_group_extends_previous_step() {
        let mut stack = UndoStack::default();
        stack.start_undo_group();
        stack.push(insert(0, "a"));
        stack.end_undo_group().unwrap();
        stack.start_continued_undo_group();
        stack.push(insert(1, "b"));
        stack.end_undo_group().unwrap();
        assert_eq!(stack.undo_depth(), 1);

        // Undo breaks the chain.
        let _ = stack.begin_undo();
        stack.finish_replay();
        let _ = stack.begin_redo();
        stack.finish_replay();
        stack.start_continued_undo_group();
        stack.push(insert(2, "c"));
        stack.end_undo_group().unwrap();
        assert_eq!(stack.undo_depth(), 2);
    }

    #[test]
    fn test_replay_is_not_recorded() {
        let mut stack = UndoStack::default();
        stack.push(insert(0, "a"));
        let changes = stack.begin_undo().unwrap();
        stack.push(changes[0].invert());
        stack.finish_replay();
        assert_eq!(stack.undo_depth(), 0);
        assert_eq!(stack.redo_depth(), 1);
    }

    #[test]
    fn test_new_change_clears_redo_and_unreachable_original() {
        let mut stack = UndoStack::default();
        stack.push(insert(0, "a"));
        stack.mark_as_original_file();
        let _ = stack.begin_undo();
        stack.finish_replay();
        assert!(!stack.is_original_file());
        stack.push(insert(0, "b"));
        assert!(!stack.can_redo());
        assert!(!stack.is_original_file());
        let _ = stack.begin_undo();
        stack.finish_replay();
        assert!(!stack.is_original_file());
    }

    #[test]
    fn test_original_file_tracking_through_undo_redo() {
        let mut stack = UndoStack::default();
        assert!(stack.is_original_file());
        stack.push(insert(0, "a"));
        assert!(!stack.is_original_file());
        let _ = stack.begin_undo();
        stack.finish_replay();
        assert!(stack.is_original_file());
        let _ = stack.begin_redo();
        stack.finish_replay();
        assert!(!stack.is_original_file());
    }

    #[test]
    fn test_size_limit_drops_oldest_steps() {
        let mut stack = UndoStack::new(2);
        for i in 0..5 {
            stack.push(insert(i, "x"));
        }
        assert_eq!(stack.undo_depth(), 2);
        let changes = stack.begin_undo().unwrap();
        assert_eq!(changes[0].offset(), 4);
        stack.finish_replay();
        stack.set_size_limit(0);
        assert_eq!(stack.undo_depth(), 0);
        assert_eq!(stack.redo_depth(), 0);
        assert!(!stack.is_original_file());
    }
}
