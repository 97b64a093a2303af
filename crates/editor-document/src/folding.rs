//! Code folding.
//!
//! A [`FoldingManager`] keeps foldings as segments of a [`TextSegmentCollection`], so they
//! follow edits like any other tracked range. A folded section hides the lines after its first
//! line up to and including its last line in every attached [`HeightTree`]. After each document
//! change the foldings touched by the change are revalidated: empty foldings are removed and
//! collapsed line ranges are recreated when the folding's lines moved.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::change::DocumentChangeEvent;
use crate::document::{ChangeListener, Document, SharedChangeListener};
use crate::error::{DocumentError, Result};
use crate::height_tree::{CollapsedSection, CollapsedSectionId, HeightTree};
use crate::line_manager::SharedLineTracker;
use crate::segments::{SegmentEntry, SegmentId, TextSegmentCollection};

/// Handle to a folding inside a [`FoldingManager`].
pub type FoldingId = SegmentId;

/// A folding as stored by the manager.
#[derive(Debug)]
pub struct FoldingSection {
    title: String,
    is_folded: bool,
    /// Collapsed range per attached height tree, in attachment order.
    collapsed: Vec<Option<CollapsedSectionId>>,
}

impl FoldingSection {
    /// Placeholder text shown while folded.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Whether the folding is collapsed.
    pub fn is_folded(&self) -> bool {
        self.is_folded
    }
}

/// A folding proposed by a folding strategy, passed to [`FoldingManager::update_foldings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFolding {
    /// Start offset.
    pub start_offset: usize,
    /// End offset.
    pub end_offset: usize,
    /// Placeholder text shown while folded.
    pub name: String,
    /// Fold it when the foldings are first computed for a document.
    pub default_closed: bool,
}

impl NewFolding {
    /// Folding over `start_offset..end_offset` with the default placeholder.
    pub fn new(start_offset: usize, end_offset: usize) -> Self {
        Self {
            start_offset,
            end_offset,
            name: String::from("..."),
            default_closed: false,
        }
    }
}

/// Foldings of one document.
pub struct FoldingManager {
    foldings: TextSegmentCollection<FoldingSection>,
    height_trees: Vec<Rc<RefCell<HeightTree>>>,
    is_first_update: bool,
}

impl FoldingManager {
    /// Create an empty folding manager for `document`.
    ///
    /// The manager only follows edits once it is registered as a change listener; see
    /// [`Self::install`].
    pub fn new(document: &Document) -> Result<Self> {
        document.verify_access()?;
        Ok(Self {
            foldings: TextSegmentCollection::new(),
            height_trees: Vec::new(),
            is_first_update: true,
        })
    }

    /// Create a folding manager and register it with `document`.
    pub fn install(document: &mut Document) -> Result<Rc<RefCell<Self>>> {
        let manager = Rc::new(RefCell::new(Self::new(document)?));
        let listener: SharedChangeListener = manager.clone();
        document.add_change_listener(&listener);
        Ok(manager)
    }

    /// Mirror folded sections into `tree`, which is also registered as a line tracker.
    ///
    /// `tree` must have one line per document line.
    pub fn attach_height_tree(
        &mut self,
        document: &mut Document,
        tree: &Rc<RefCell<HeightTree>>,
    ) -> Result<()> {
        if self.height_trees.iter().any(|t| Rc::ptr_eq(t, tree)) {
            return Ok(());
        }
        let tree_lines = tree.borrow().line_count();
        if tree_lines != document.line_count() {
            return Err(DocumentError::invalid_argument(format!(
                "height tree has {tree_lines} lines, document has {}",
                document.line_count()
            )));
        }
        let tracker: SharedLineTracker = tree.clone();
        document.add_line_tracker(&tracker);
        self.height_trees.push(Rc::clone(tree));
        let ids: Vec<FoldingId> = self.foldings.iter().map(|f| f.id).collect();
        for id in ids {
            if let Some(section) = self.foldings.value_mut(id) {
                section.collapsed.push(None);
            }
            self.validate_collapsed(document, id)?;
        }
        Ok(())
    }

    /// Stop mirroring into `tree`, expanding everything it hides. Returns `false` if it was not
    /// attached.
    pub fn detach_height_tree(&mut self, tree: &Rc<RefCell<HeightTree>>) -> bool {
        let Some(index) = self.height_trees.iter().position(|t| Rc::ptr_eq(t, tree)) else {
            return false;
        };
        let ids: Vec<FoldingId> = self.foldings.iter().map(|f| f.id).collect();
        for id in ids {
            if let Some(section) = self.foldings.value_mut(id)
                && let Some(collapsed) = section.collapsed.remove(index)
            {
                tree.borrow_mut().uncollapse(collapsed);
            }
        }
        self.height_trees.remove(index);
        true
    }

    /// Create a folding over `start_offset..end_offset`.
    pub fn create_folding(
        &mut self,
        document: &Document,
        start_offset: usize,
        end_offset: usize,
    ) -> Result<FoldingId> {
        if start_offset >= end_offset {
            return Err(DocumentError::invalid_argument(
                "folding start must be less than its end",
            ));
        }
        if end_offset > document.text_length() {
            return Err(DocumentError::invalid_argument(
                "folding must lie within the document",
            ));
        }
        let section = FoldingSection {
            title: String::from("..."),
            is_folded: false,
            collapsed: vec![None; self.height_trees.len()],
        };
        Ok(self
            .foldings
            .add(start_offset, end_offset - start_offset, section))
    }

    /// Remove a folding, expanding it first. Returns `false` for an unknown id.
    pub fn remove_folding(&mut self, id: FoldingId) -> bool {
        if !self.foldings.contains(id) {
            return false;
        }
        self.remove_collapsed(id);
        self.foldings.remove(id).is_some()
    }

    /// Remove all foldings.
    pub fn clear(&mut self) {
        let ids: Vec<FoldingId> = self.foldings.iter().map(|f| f.id).collect();
        for id in ids {
            self.remove_collapsed(id);
        }
        self.foldings.clear();
    }

    /// Number of foldings.
    pub fn len(&self) -> usize {
        self.foldings.len()
    }

    /// Whether there are no foldings.
    pub fn is_empty(&self) -> bool {
        self.foldings.is_empty()
    }

    /// A folding by id.
    pub fn folding(&self, id: FoldingId) -> Option<SegmentEntry<'_, FoldingSection>> {
        self.foldings.get(id)
    }

    /// All foldings, ordered by start offset.
    pub fn all_foldings(&self) -> impl Iterator<Item = SegmentEntry<'_, FoldingSection>> + '_ {
        self.foldings.iter()
    }

    /// Foldings starting exactly at `start_offset`.
    pub fn get_foldings_at(&self, start_offset: usize) -> Vec<SegmentEntry<'_, FoldingSection>> {
        let mut result = Vec::new();
        let mut current = self.foldings.find_first_segment_with_start_after(start_offset);
        while let Some(folding) = current
            && folding.start_offset == start_offset
        {
            result.push(folding);
            current = self.foldings.next_segment(folding.id);
        }
        result
    }

    /// Foldings containing `offset` (ends inclusive).
    pub fn get_foldings_containing(&self, offset: usize) -> Vec<SegmentEntry<'_, FoldingSection>> {
        self.foldings.find_segments_containing(offset)
    }

    /// First folding starting at or after `offset`.
    pub fn get_next_folding(&self, offset: usize) -> Option<SegmentEntry<'_, FoldingSection>> {
        self.foldings.find_first_segment_with_start_after(offset)
    }

    /// Start of the first folded folding starting at or after `offset`.
    pub fn get_next_folded_folding_start(&self, offset: usize) -> Option<usize> {
        let mut current = self.foldings.find_first_segment_with_start_after(offset);
        while let Some(folding) = current {
            if folding.value.is_folded {
                return Some(folding.start_offset);
            }
            current = self.foldings.next_segment(folding.id);
        }
        None
    }

    /// Change the placeholder text of a folding.
    pub fn set_title(&mut self, id: FoldingId, title: impl Into<String>) -> bool {
        match self.foldings.value_mut(id) {
            Some(section) => {
                section.title = title.into();
                true
            }
            None => false,
        }
    }

    /// Fold or unfold a folding.
    pub fn set_folded(&mut self, document: &Document, id: FoldingId, folded: bool) -> Result<()> {
        let section = self
            .foldings
            .value_mut(id)
            .ok_or(DocumentError::UnknownSegment)?;
        if section.is_folded == folded {
            return Ok(());
        }
        section.is_folded = folded;
        self.validate_collapsed(document, id)
    }

    /// Replace the foldings with `new_foldings`, which must be sorted by start offset.
    ///
    /// Existing foldings whose start matches a new folding are kept (with their folded state),
    /// the rest are removed. Old foldings at or after `first_error_offset` survive, so a parse
    /// error does not unfold the rest of the file.
    ///
    /// Empty new foldings are skipped, unlike in [`Self::create_folding`] which rejects them.
    pub fn update_foldings(
        &mut self,
        document: &Document,
        new_foldings: &[NewFolding],
        first_error_offset: Option<usize>,
    ) -> Result<()> {
        let mut previous_start = 0;
        for folding in new_foldings {
            if folding.start_offset < previous_start {
                return Err(DocumentError::invalid_argument(
                    "new foldings must be sorted by start offset",
                ));
            }
            if folding.start_offset > folding.end_offset
                || folding.end_offset > document.text_length()
            {
                return Err(DocumentError::invalid_argument(format!(
                    "folding {}..{} is not a valid range",
                    folding.start_offset, folding.end_offset
                )));
            }
            previous_start = folding.start_offset;
        }
        let first_error_offset = first_error_offset.unwrap_or(usize::MAX);

        let old: Vec<(FoldingId, usize)> =
            self.foldings.iter().map(|f| (f.id, f.start_offset)).collect();
        let mut old_index = 0;
        let mut created = 0;
        for folding in new_foldings {
            if folding.start_offset == folding.end_offset {
                continue;
            }
            while let Some(&(id, start)) = old.get(old_index)
                && folding.start_offset > start
            {
                self.remove_folding(id);
                old_index += 1;
            }
            let length = folding.end_offset - folding.start_offset;
            let id = match old.get(old_index) {
                Some(&(id, start)) if start == folding.start_offset => {
                    old_index += 1;
                    self.foldings.set_length(id, length);
                    self.validate_collapsed(document, id)?;
                    id
                }
                _ => {
                    let id =
                        self.create_folding(document, folding.start_offset, folding.end_offset)?;
                    created += 1;
                    // Only fold by default when the document is first opened.
                    if self.is_first_update && folding.default_closed {
                        self.set_folded(document, id, true)?;
                    }
                    id
                }
            };
            self.set_title(id, folding.name.clone());
        }
        self.is_first_update = false;
        for &(id, start) in &old[old_index.min(old.len())..] {
            if start >= first_error_offset {
                break;
            }
            self.remove_folding(id);
        }
        debug!(foldings = self.foldings.len(), created, "updated foldings");
        Ok(())
    }

    fn remove_collapsed(&mut self, id: FoldingId) {
        let Some(section) = self.foldings.value_mut(id) else {
            return;
        };
        for (tree, collapsed) in self.height_trees.iter().zip(section.collapsed.iter_mut()) {
            if let Some(collapsed) = collapsed.take() {
                tree.borrow_mut().uncollapse(collapsed);
            }
        }
    }

    /// Bring the collapsed line ranges of a folding in line with its state and position.
    fn validate_collapsed(&mut self, document: &Document, id: FoldingId) -> Result<()> {
        let Some((is_folded, start, end)) = self
            .foldings
            .get(id)
            .map(|f| (f.value.is_folded, f.start_offset, f.start_offset + f.length))
        else {
            return Ok(());
        };
        if !is_folded {
            self.remove_collapsed(id);
            return Ok(());
        }
        let start_line = document.line_containing(start).line_number;
        let end_line = document.line_containing(end).line_number;
        if start_line == end_line {
            self.remove_collapsed(id);
            return Ok(());
        }
        let wanted = CollapsedSection {
            start_line: start_line + 1,
            end_line,
        };
        let Some(section) = self.foldings.value_mut(id) else {
            return Ok(());
        };
        for (tree, collapsed) in self.height_trees.iter().zip(section.collapsed.iter_mut()) {
            let mut tree = tree.borrow_mut();
            let current = collapsed.and_then(|c| tree.section(c));
            if current == Some(wanted) {
                continue;
            }
            if let Some(stale) = collapsed.take() {
                tree.uncollapse(stale);
            }
            *collapsed = Some(tree.collapse_text(wanted.start_line, wanted.end_line)?);
        }
        Ok(())
    }
}

impl ChangeListener for FoldingManager {
    fn document_changed(&mut self, document: &Document, event: &DocumentChangeEvent) {
        self.foldings.update_offsets(event);
        // Revalidate everything up to the end of the last changed line.
        let end_line = document.line_containing(event.offset() + event.insertion_length());
        let end = end_line.end_offset_with_delimiter();
        let affected: Vec<(FoldingId, usize)> = self
            .foldings
            .find_overlapping_segments(event.offset(), end - event.offset())
            .iter()
            .map(|f| (f.id, f.length))
            .collect();
        for (id, length) in affected {
            if length == 0 {
                self.remove_folding(id);
            } else if let Err(error) = self.validate_collapsed(document, id) {
                warn!(%error, "could not revalidate folding");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folded_lines(tree: &Rc<RefCell<HeightTree>>) -> Vec<usize> {
        let tree = tree.borrow();
        (1..=tree.line_count())
            .filter(|&line| tree.is_collapsed(line).unwrap_or(false))
            .collect()
    }

    fn setup(text: &str) -> (Document, Rc<RefCell<FoldingManager>>, Rc<RefCell<HeightTree>>) {
        let mut document = Document::from_text(text);
        let manager = FoldingManager::install(&mut document).unwrap();
        let tree = Rc::new(RefCell::new(HeightTree::new(document.line_count(), 1.0)));
        manager
            .borrow_mut()
            .attach_height_tree(&mut document, &tree)
            .unwrap();
        (document, manager, tree)
    }

    #[test]
    fn test_folding_hides_following_lines() {
        let (document, manager, tree) = setup("fn a() {\n  x\n  y\n}\nrest");
        let id = manager
            .borrow_mut()
            .create_folding(&document, 7, 18)
            .unwrap();
        manager
            .borrow_mut()
            .set_folded(&document, id, true)
            .unwrap();
        assert_eq!(folded_lines(&tree), [2, 3, 4]);
        assert_eq!(tree.borrow().total_height(), 2.0);

        manager
            .borrow_mut()
            .set_folded(&document, id, false)
            .unwrap();
        assert!(folded_lines(&tree).is_empty());
        assert_eq!(tree.borrow().total_height(), 5.0);
    }

    #[test]
    fn test_invalid_foldings_are_rejected() {
        let (document, manager, _tree) = setup("abc");
        let mut manager = manager.borrow_mut();
        assert!(matches!(
            manager.create_folding(&document, 2, 2),
            Err(DocumentError::InvalidArgument(_))
        ));
        assert!(matches!(
            manager.create_folding(&document, 0, 4),
            Err(DocumentError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_edits_revalidate_collapsed_lines() {
        let (mut document, manager, tree) = setup("a {\nb\nc\n}\nd");
        let id = manager
            .borrow_mut()
            .create_folding(&document, 2, 9)
            .unwrap();
        manager
            .borrow_mut()
            .set_folded(&document, id, true)
            .unwrap();
        assert_eq!(folded_lines(&tree), [2, 3, 4]);

        // A new line inside the folding is hidden as well.
        document.insert(5, "\nb2").unwrap();
        assert_eq!(folded_lines(&tree), [2, 3, 4, 5]);

        // Pulling the closing brace onto the first line leaves nothing to hide.
        document.remove(3, 8).unwrap();
        assert_eq!(document.text(), "a {}\nd");
        assert!(folded_lines(&tree).is_empty());
        let manager = manager.borrow();
        let folding = manager.folding(id).unwrap();
        assert!(folding.value.is_folded());
    }

    #[test]
    fn test_removed_text_drops_empty_folding() {
        let (mut document, manager, tree) = setup("x\n{\ny\n}\n");
        let id = manager
            .borrow_mut()
            .create_folding(&document, 2, 7)
            .unwrap();
        manager
            .borrow_mut()
            .set_folded(&document, id, true)
            .unwrap();
        document.remove(2, 5).unwrap();
        assert!(manager.borrow().is_empty());
        assert!(folded_lines(&tree).is_empty());
    }

    #[test]
    fn test_update_foldings_keeps_folded_state() {
        let text = "a{\n1\n}\nb{\n2\n}\nc{\n3\n}";
        let (document, manager, tree) = setup(text);
        let mut manager = manager.borrow_mut();
        let initial = [NewFolding::new(1, 6), NewFolding::new(8, 13), NewFolding::new(15, 20)];
        manager.update_foldings(&document, &initial, None).unwrap();
        assert_eq!(manager.len(), 3);
        let second = manager.get_foldings_at(8)[0].id;
        manager.set_folded(&document, second, true).unwrap();
        assert_eq!(manager.get_next_folded_folding_start(0), Some(8));

        // Same starts: folded state survives; the first folding disappears.
        let next = [NewFolding::new(8, 13), NewFolding::new(15, 20)];
        manager.update_foldings(&document, &next, None).unwrap();
        assert_eq!(manager.len(), 2);
        assert!(manager.folding(second).is_some_and(|f| f.value.is_folded()));
        assert_eq!(folded_lines(&tree), [5, 6]);

        // Foldings behind a parse error are kept.
        manager.update_foldings(&document, &[], Some(10)).unwrap();
        assert_eq!(manager.len(), 1);
        assert!(manager.folding(second).is_none());
    }

    #[test]
    fn test_update_foldings_rejects_unsorted_input() {
        let (document, manager, _tree) = setup("0123456789");
        let mut manager = manager.borrow_mut();
        let unsorted = [NewFolding::new(5, 8), NewFolding::new(1, 3)];
        assert!(matches!(
            manager.update_foldings(&document, &unsorted, None),
            Err(DocumentError::InvalidArgument(_))
        ));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_default_closed_applies_on_first_update_only() {
        let text = "a{\n1\n}\nb{\n2\n}";
        let (document, manager, _tree) = setup(text);
        let mut manager = manager.borrow_mut();
        let mut closed = NewFolding::new(1, 6);
        closed.default_closed = true;
        manager
            .update_foldings(&document, &[closed.clone()], None)
            .unwrap();
        assert_eq!(manager.get_next_folded_folding_start(0), Some(1));

        let mut later = NewFolding::new(8, 13);
        later.default_closed = true;
        manager
            .update_foldings(&document, &[closed, later], None)
            .unwrap();
        assert_eq!(manager.get_foldings_at(8).len(), 1);
        assert!(!manager.get_foldings_at(8)[0].value.is_folded());
    }

    #[test]
    fn test_clear_and_detach_expand_everything() {
        let (mut document, manager, tree) = setup("a\nb\nc\nd");
        let id = manager
            .borrow_mut()
            .create_folding(&document, 0, 7)
            .unwrap();
        manager
            .borrow_mut()
            .set_folded(&document, id, true)
            .unwrap();
        assert_eq!(folded_lines(&tree), [2, 3, 4]);
        assert!(manager.borrow_mut().detach_height_tree(&tree));
        assert!(folded_lines(&tree).is_empty());

        manager
            .borrow_mut()
            .attach_height_tree(&mut document, &tree)
            .unwrap();
        assert_eq!(folded_lines(&tree), [2, 3, 4]);
        manager.borrow_mut().clear();
        assert!(folded_lines(&tree).is_empty());
        assert!(manager.borrow().is_empty());
    }
}
