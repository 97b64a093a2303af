//! Keeps the line tree in sync with buffer edits.
//!
//! The buffer is edited first; the line manager then splits, shortens and merges line nodes so
//! that every node again covers exactly one line of the new text. Registered [`LineTracker`]s
//! see each structural step as it happens.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use crate::buffer::TextBuffer;
use crate::change::DocumentChangeEvent;
use crate::line_ending;
use crate::line_tree::{DocumentLine, LineId, LineTree};

/// Observer of line-level structure changes.
///
/// Trackers are notified while the line tree is being updated, so the document must not be
/// queried from these callbacks except through the line snapshots passed in. Every method has
/// an empty default.
pub trait LineTracker {
    /// `line` is about to be removed.
    fn before_remove_line(&mut self, _line: &DocumentLine) {}

    /// `line` is about to change its total length to `new_total_length`.
    fn set_line_length(&mut self, _line: &DocumentLine, _new_total_length: usize) {}

    /// `new_line` was inserted directly after `inserted_after`.
    fn line_inserted(&mut self, _inserted_after: &DocumentLine, _new_line: &DocumentLine) {}

    /// All lines were replaced; the document now has `line_count` lines.
    fn rebuild_document(&mut self, _line_count: usize) {}

    /// The line tree is consistent again after `event`.
    fn change_complete(&mut self, _event: &DocumentChangeEvent) {}
}

/// Shared handle to a line tracker, as registered with a document.
pub type SharedLineTracker = Rc<RefCell<dyn LineTracker>>;

pub(crate) struct LineManager {
    tree: LineTree,
    trackers: Vec<Weak<RefCell<dyn LineTracker>>>,
}

impl LineManager {
    pub(crate) fn new() -> Self {
        Self {
            tree: LineTree::new(),
            trackers: Vec::new(),
        }
    }

    pub(crate) fn tree(&self) -> &LineTree {
        &self.tree
    }

    pub(crate) fn add_tracker(&mut self, tracker: &SharedLineTracker) {
        let tracker = Rc::downgrade(tracker);
        if !self.trackers.iter().any(|t| Weak::ptr_eq(t, &tracker)) {
            self.trackers.push(tracker);
        }
    }

    pub(crate) fn remove_tracker(&mut self, tracker: &SharedLineTracker) -> bool {
        let before = self.trackers.len();
        let target = Rc::downgrade(tracker);
        self.trackers.retain(|t| !Weak::ptr_eq(t, &target));
        self.trackers.len() != before
    }

    fn has_trackers(&self) -> bool {
        !self.trackers.is_empty()
    }

    fn notify(&mut self, mut f: impl FnMut(&mut dyn LineTracker)) {
        self.trackers.retain(|t| t.strong_count() > 0);
        for tracker in &self.trackers {
            if let Some(tracker) = tracker.upgrade() {
                f(&mut *tracker.borrow_mut());
            }
        }
    }

    /// Updates the lines after `length` characters at `offset` were removed from `buffer`.
    pub(crate) fn remove(&mut self, buffer: &TextBuffer, offset: usize, length: usize) {
        if length == 0 {
            return;
        }
        let Some(start_line) = self.tree.get_by_offset(offset) else {
            return;
        };
        let start_offset = self.tree.offset_of(start_line);
        let start_total = self.tree.total_length(start_line);
        let start_length = start_total - self.tree.delimiter_length(start_line);
        if offset > start_offset + start_length {
            // The removal starts between '\r' and '\n': drop the '\n' part first.
            self.set_line_length(buffer, start_line, start_total - 1);
            self.remove(buffer, offset, length - 1);
            return;
        }
        if offset + length < start_offset + start_total {
            self.set_line_length(buffer, start_line, start_total - length);
            return;
        }

        let removed_in_start_line = start_offset + start_total - offset;
        let Some(end_line) = self.tree.get_by_offset(offset + length) else {
            return;
        };
        if end_line == start_line {
            // Removing the tail of the last line.
            self.set_line_length(buffer, start_line, start_total - length);
            return;
        }
        let end_offset = self.tree.offset_of(end_line);
        let left_in_end_line = end_offset + self.tree.total_length(end_line) - (offset + length);

        let mut next = self.tree.next(start_line);
        while let Some(line) = next {
            next = self.tree.next(line);
            self.remove_line(line);
            if line == end_line {
                break;
            }
        }
        let merged = self.tree.total_length(start_line) - removed_in_start_line + left_in_end_line;
        trace!(offset, length, "merged lines after removal");
        self.set_line_length(buffer, start_line, merged);
    }

    /// Updates the lines after `text` was inserted into `buffer` at `offset`.
    pub(crate) fn insert(&mut self, buffer: &TextBuffer, offset: usize, text: &str) {
        let Some(mut line) = self.tree.get_by_offset(offset) else {
            return;
        };
        let line_offset = self.tree.offset_of(line);
        let total = self.tree.total_length(line);
        if offset > line_offset + total - self.tree.delimiter_length(line) {
            // Inserting between '\r' and '\n': split the delimiter across two lines.
            self.set_line_length(buffer, line, total - 1);
            line = self.insert_line_after(line, 1);
            line = self.set_line_length(buffer, line, 1);
        }

        let text_length = text.chars().count();
        let mut last_delimiter_end = 0;
        for delimiter in line_ending::delimiters(text.chars()) {
            let line_break_offset = offset + delimiter.offset + delimiter.length;
            let line_offset = self.tree.offset_of(line);
            let length_after_insertion =
                line_offset + self.tree.total_length(line) - (offset + last_delimiter_end);
            line = self.set_line_length(buffer, line, line_break_offset - line_offset);
            let new_line = self.insert_line_after(line, length_after_insertion);
            line = self.set_line_length(buffer, new_line, length_after_insertion);
            last_delimiter_end = delimiter.offset + delimiter.length;
        }
        if last_delimiter_end != text_length {
            let total = self.tree.total_length(line);
            self.set_line_length(buffer, line, total + text_length - last_delimiter_end);
        }
    }

    /// Recreates every line from the buffer's text.
    pub(crate) fn rebuild(&mut self, buffer: &TextBuffer) {
        let mut lines = Vec::new();
        let mut last_delimiter_end = 0;
        for delimiter in line_ending::delimiters(buffer.chars()) {
            let end = delimiter.offset + delimiter.length;
            lines.push((end - last_delimiter_end, delimiter.length));
            last_delimiter_end = end;
        }
        lines.push((buffer.len() - last_delimiter_end, 0));
        let line_count = lines.len();
        self.tree.rebuild(lines);
        debug!(line_count, "rebuilt line tree");
        self.notify(|t| t.rebuild_document(line_count));
    }

    pub(crate) fn change_complete(&mut self, event: &DocumentChangeEvent) {
        self.notify(|t| t.change_complete(event));
    }

    fn remove_line(&mut self, line: LineId) {
        if self.has_trackers() {
            let snapshot = self.tree.line(line);
            self.notify(|t| t.before_remove_line(&snapshot));
        }
        self.tree.remove_line(line);
    }

    fn insert_line_after(&mut self, line: LineId, total_length: usize) -> LineId {
        let new_line = self.tree.insert_line_after(line, total_length);
        if self.has_trackers() {
            let (after, inserted) = (self.tree.line(line), self.tree.line(new_line));
            self.notify(|t| t.line_inserted(&after, &inserted));
        }
        new_line
    }

    /// Sets the total length of `line` and recomputes its delimiter from the buffer.
    ///
    /// A line consisting of a lone `'\n'` right after a `'\r'` is joined into the previous
    /// line; the returned id is the line that now holds the text.
    fn set_line_length(&mut self, buffer: &TextBuffer, line: LineId, new_total: usize) -> LineId {
        if new_total != self.tree.total_length(line) {
            if self.has_trackers() {
                let snapshot = self.tree.line(line);
                self.notify(|t| t.set_line_length(&snapshot, new_total));
            }
            self.tree.set_total_length(line, new_total);
        }
        if new_total == 0 {
            self.tree.set_delimiter_length(line, 0);
            return line;
        }
        let line_offset = self.tree.offset_of(line);
        let char_at = |offset: usize| buffer.char_at(offset).ok();
        let delimiter_length = match char_at(line_offset + new_total - 1) {
            Some('\r') => 1,
            Some('\n') if new_total >= 2 && char_at(line_offset + new_total - 2) == Some('\r') => 2,
            Some('\n')
                if new_total == 1 && line_offset > 0 && char_at(line_offset - 1) == Some('\r') =>
            {
                if let Some(previous) = self.tree.prev(line) {
                    self.remove_line(line);
                    let previous_total = self.tree.total_length(previous);
                    return self.set_line_length(buffer, previous, previous_total + 1);
                }
                1
            }
            Some('\n') => 1,
            _ => 0,
        };
        self.tree.set_delimiter_length(line, delimiter_length);
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    struct Fixture {
        buffer: TextBuffer,
        lines: LineManager,
    }

    impl Fixture {
        fn new(text: &str) -> Self {
            let buffer = TextBuffer::from_text(text);
            let mut lines = LineManager::new();
            lines.rebuild(&buffer);
            Self { buffer, lines }
        }

        fn insert(&mut self, offset: usize, text: &str) {
            self.buffer.insert(offset, text).unwrap();
            self.lines.insert(&self.buffer, offset, text);
        }

        fn remove(&mut self, offset: usize, length: usize) {
            self.buffer.remove(offset, length).unwrap();
            self.lines.remove(&self.buffer, offset, length);
        }

        fn layout(&self) -> Vec<(usize, usize)> {
            let tree = self.lines.tree();
            tree.iter()
                .map(|id| (tree.total_length(id), tree.delimiter_length(id)))
                .collect()
        }

        fn assert_consistent(&self) {
            self.lines.tree().check_invariants();
            let expected = Fixture::new(&self.buffer.text());
            assert_eq!(self.layout(), expected.layout(), "text: {:?}", self.buffer.text());
            assert_eq!(self.lines.tree().text_length(), self.buffer.len());
        }
    }

    #[test]
    fn test_insert_splits_lines() {
        let mut f = Fixture::new("abc\ndef\nghi");
        f.insert(4, "XY");
        assert_eq!(f.layout(), vec![(4, 1), (6, 1), (3, 0)]);
        f.insert(1, "1\n2\r\n3");
        f.assert_consistent();
        assert_eq!(f.lines.tree().line_count(), 5);
    }

    #[test]
    fn test_remove_merges_lines() {
        let mut f = Fixture::new("abc\ndef\nghi");
        f.remove(3, 1);
        assert_eq!(f.layout(), vec![(7, 1), (3, 0)]);
        f.remove(2, 6);
        f.assert_consistent();
        assert_eq!(f.layout(), vec![(3, 0)]);
    }

    #[test]
    fn test_cr_and_lf_join_across_edits() {
        let mut f = Fixture::new("a\rb");
        f.remove(2, 1);
        f.insert(2, "\n");
        assert_eq!(f.layout(), vec![(3, 2), (0, 0)]);

        let mut f = Fixture::new("a\rX\nb");
        f.remove(2, 1);
        f.assert_consistent();
        assert_eq!(f.layout(), vec![(3, 2), (1, 0)]);
    }

    #[test]
    fn test_insert_and_remove_inside_crlf() {
        let mut f = Fixture::new("a\r\nb");
        f.insert(2, "X");
        f.assert_consistent();
        assert_eq!(f.layout(), vec![(2, 1), (2, 1), (1, 0)]);

        let mut f = Fixture::new("a\r\nb");
        f.insert(2, "\n");
        f.assert_consistent();

        let mut f = Fixture::new("a\r\nb\r\nc");
        f.remove(2, 3);
        f.assert_consistent();
    }

    #[derive(Default)]
    struct Recorder {
        inserted: usize,
        removed: usize,
        rebuilt: Option<usize>,
    }

    impl LineTracker for Recorder {
        fn before_remove_line(&mut self, _line: &DocumentLine) {
            self.removed += 1;
        }

        fn line_inserted(&mut self, inserted_after: &DocumentLine, new_line: &DocumentLine) {
            assert_eq!(inserted_after.line_number + 1, new_line.line_number);
            self.inserted += 1;
        }

        fn rebuild_document(&mut self, line_count: usize) {
            self.rebuilt = Some(line_count);
        }
    }

    #[test]
    fn test_trackers_see_structure_changes() {
        let mut f = Fixture::new("one");
        let recorder = Rc::new(RefCell::new(Recorder::default()));
        let shared: SharedLineTracker = recorder.clone();
        f.lines.add_tracker(&shared);
        f.insert(3, "\ntwo\nthree");
        f.remove(0, 5);
        assert_eq!(recorder.borrow().inserted, 2);
        assert_eq!(recorder.borrow().removed, 1);
        f.lines.rebuild(&f.buffer);
        assert_eq!(recorder.borrow().rebuilt, Some(2));

        assert!(f.lines.remove_tracker(&shared));
        drop(shared);
        drop(recorder);
        f.insert(0, "\n");
        assert!(f.lines.trackers.is_empty());
    }

    #[test]
    fn test_random_edits_match_rebuild() {
        const ALPHABET: &[&str] = &["a", "b", "\n", "\r", "\r\n", "xy", "\n\n"];
        let mut rng = StdRng::seed_from_u64(42);
        let mut f = Fixture::new("");
        for step in 0..1500 {
            let len = f.buffer.len();
            if len == 0 || rng.gen_bool(0.55) {
                let offset = rng.gen_range(0..=len);
                let text: String = (0..rng.gen_range(1..4))
                    .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())])
                    .collect();
                f.insert(offset, &text);
            } else {
                let offset = rng.gen_range(0..len);
                let length = rng.gen_range(1..=(len - offset).min(6));
                f.remove(offset, length);
            }
            if step % 25 == 0 {
                f.assert_consistent();
            }
        }
        f.assert_consistent();
    }
}
