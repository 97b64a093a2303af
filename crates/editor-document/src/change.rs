//! Change descriptions: offset maps, change events and version checkpoints.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, OnceLock};

use crate::error::{DocumentError, Result};

/// How an offset reacts to text inserted exactly at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnchorMovementType {
    /// Follow the change entry's default, which is "after insertion" unless the entry asks
    /// otherwise (see [`OffsetChangeMapEntry::default_anchor_movement_is_before_insertion`]).
    #[default]
    Default,
    /// Stay in front of inserted text.
    BeforeInsertion,
    /// Move behind inserted text.
    AfterInsertion,
}

/// Strategy used to derive the offset map of a replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OffsetChangeMappingType {
    /// One entry removing the old text and inserting the new text. Anchors inside the replaced
    /// range are deleted.
    #[default]
    Normal,
    /// A removal entry followed by an insertion entry. Anchors inside the replaced range move
    /// to its start instead of being deleted.
    RemoveAndInsert,
    /// Character-wise replacement of equal-length text. Anchors keep their relative position
    /// inside the replaced range. Falls back to [`Self::Normal`] for unequal lengths.
    CharacterReplace,
    /// Like [`Self::Normal`] but anchors at the edit point stay before the inserted text and
    /// removed anchors are never deleted.
    KeepAnchorBeforeInsertion,
}

/// One removal-then-insertion at a single offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OffsetChangeMapEntry {
    /// Offset of the change.
    pub offset: usize,
    /// Number of removed characters.
    pub removal_length: usize,
    /// Number of inserted characters.
    pub insertion_length: usize,
    /// Anchors inside the removed range survive and move to [`Self::offset`].
    pub removal_never_causes_anchor_deletion: bool,
    /// Anchors with [`AnchorMovementType::Default`] stay in front of inserted text.
    pub default_anchor_movement_is_before_insertion: bool,
}

impl OffsetChangeMapEntry {
    /// Entry with default flags.
    pub const fn new(offset: usize, removal_length: usize, insertion_length: usize) -> Self {
        Self {
            offset,
            removal_length,
            insertion_length,
            removal_never_causes_anchor_deletion: false,
            default_anchor_movement_is_before_insertion: false,
        }
    }

    /// Entry with both anchor flags given explicitly.
    pub const fn with_flags(
        offset: usize,
        removal_length: usize,
        insertion_length: usize,
        removal_never_causes_anchor_deletion: bool,
        default_anchor_movement_is_before_insertion: bool,
    ) -> Self {
        Self {
            offset,
            removal_length,
            insertion_length,
            removal_never_causes_anchor_deletion,
            default_anchor_movement_is_before_insertion,
        }
    }

    /// End of the removed range (in the old text).
    pub fn removal_end(&self) -> usize {
        self.offset + self.removal_length
    }

    /// Maps an offset from before this change to after it.
    pub fn get_new_offset(&self, old_offset: usize, movement: AnchorMovementType) -> usize {
        // An insertion exactly at the offset is the only ambiguous case; everything else is
        // decided by position alone.
        if !(self.removal_length == 0 && old_offset == self.offset) {
            if old_offset <= self.offset {
                return old_offset;
            }
            if old_offset >= self.removal_end() {
                return old_offset + self.insertion_length - self.removal_length;
            }
        }
        match movement {
            AnchorMovementType::AfterInsertion => self.offset + self.insertion_length,
            AnchorMovementType::BeforeInsertion => self.offset,
            AnchorMovementType::Default if self.default_anchor_movement_is_before_insertion => {
                self.offset
            }
            AnchorMovementType::Default => self.offset + self.insertion_length,
        }
    }
}

/// Ordered list of change entries describing how one document change moves offsets.
///
/// Each entry's offset refers to the text as left by the previous entries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OffsetChangeMap {
    entries: Vec<OffsetChangeMapEntry>,
}

impl OffsetChangeMap {
    /// Map without entries.
    pub fn new() -> Self {
        Self::default()
    }

    /// Map holding a single entry.
    pub fn from_entry(entry: OffsetChangeMapEntry) -> Self {
        Self {
            entries: vec![entry],
        }
    }

    /// Appends an entry.
    pub fn push(&mut self, entry: OffsetChangeMapEntry) {
        self.entries.push(entry);
    }

    /// The entries, in application order.
    pub fn entries(&self) -> &[OffsetChangeMapEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maps an offset through every entry in turn.
    pub fn get_new_offset(&self, offset: usize, movement: AnchorMovementType) -> usize {
        self.entries
            .iter()
            .fold(offset, |offset, entry| entry.get_new_offset(offset, movement))
    }

    /// Whether the entries stay inside the changed range and add up to the change's length
    /// delta.
    pub fn is_valid_for_document_change(
        &self,
        offset: usize,
        removal_length: usize,
        insertion_length: usize,
    ) -> bool {
        let mut end_offset = offset + removal_length;
        for entry in &self.entries {
            if entry.offset < offset || entry.removal_end() > end_offset {
                return false;
            }
            end_offset = end_offset + entry.insertion_length - entry.removal_length;
        }
        end_offset == offset + insertion_length
    }

    /// Map that undoes this one: entries reversed with removal and insertion swapped.
    pub fn invert(&self) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .rev()
                .map(|e| OffsetChangeMapEntry::new(e.offset, e.insertion_length, e.removal_length))
                .collect(),
        }
    }
}

impl FromIterator<OffsetChangeMapEntry> for OffsetChangeMap {
    fn from_iter<I: IntoIterator<Item = OffsetChangeMapEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// A single text replacement, as delivered to listeners and recorded for undo.
///
/// Lengths are character counts. The texts are shared so events are cheap to clone and may
/// be sent to other threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChangeEvent {
    offset: usize,
    removed_text: Arc<str>,
    inserted_text: Arc<str>,
    removal_length: usize,
    insertion_length: usize,
    offset_change_map: OffsetChangeMap,
}

impl DocumentChangeEvent {
    /// Event whose offset map is the single obvious entry.
    pub fn new(offset: usize, removed_text: &str, inserted_text: &str) -> Self {
        Self::with_offset_map(offset, removed_text, inserted_text, None)
    }

    /// Event with an explicit offset map; `None` means the single obvious entry.
    pub fn with_offset_map(
        offset: usize,
        removed_text: &str,
        inserted_text: &str,
        offset_change_map: Option<OffsetChangeMap>,
    ) -> Self {
        Self::from_shared(
            offset,
            Arc::from(removed_text),
            Arc::from(inserted_text),
            offset_change_map,
        )
    }

    fn from_shared(
        offset: usize,
        removed_text: Arc<str>,
        inserted_text: Arc<str>,
        offset_change_map: Option<OffsetChangeMap>,
    ) -> Self {
        let removal_length = removed_text.chars().count();
        let insertion_length = inserted_text.chars().count();
        let offset_change_map = offset_change_map.unwrap_or_else(|| {
            OffsetChangeMap::from_entry(OffsetChangeMapEntry::new(
                offset,
                removal_length,
                insertion_length,
            ))
        });
        Self {
            offset,
            removed_text,
            inserted_text,
            removal_length,
            insertion_length,
            offset_change_map,
        }
    }

    /// Offset of the change.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Text that was removed.
    pub fn removed_text(&self) -> &str {
        &self.removed_text
    }

    /// Text that was inserted.
    pub fn inserted_text(&self) -> &str {
        &self.inserted_text
    }

    /// Number of removed characters.
    pub fn removal_length(&self) -> usize {
        self.removal_length
    }

    /// Number of inserted characters.
    pub fn insertion_length(&self) -> usize {
        self.insertion_length
    }

    /// How offsets move through this change.
    pub fn offset_change_map(&self) -> &OffsetChangeMap {
        &self.offset_change_map
    }

    /// Maps an offset from before this change to after it.
    pub fn get_new_offset(&self, offset: usize, movement: AnchorMovementType) -> usize {
        self.offset_change_map.get_new_offset(offset, movement)
    }

    /// The change that undoes this one.
    pub fn invert(&self) -> Self {
        Self::from_shared(
            self.offset,
            Arc::clone(&self.inserted_text),
            Arc::clone(&self.removed_text),
            Some(self.offset_change_map.invert()),
        )
    }
}

static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(1);

struct VersionNode {
    document: u64,
    id: u64,
    next: OnceLock<(DocumentChangeEvent, Arc<VersionNode>)>,
}

impl Drop for VersionNode {
    // Unlink iteratively so dropping an old checkpoint does not recurse through every later one.
    fn drop(&mut self) {
        let mut next = self.next.take();
        while let Some((_, node)) = next {
            next = match Arc::try_unwrap(node) {
                Ok(mut node) => node.next.take(),
                Err(_) => None,
            };
        }
    }
}

/// A checkpoint in a document's change history.
///
/// Versions of the same document form a chain; the changes between two checkpoints can be
/// retrieved to move offsets recorded at one version to another. Versions are `Send + Sync`.
#[derive(Clone)]
pub struct TextSourceVersion {
    node: Arc<VersionNode>,
}

impl std::fmt::Debug for TextSourceVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextSourceVersion")
            .field("document", &self.node.document)
            .field("id", &self.node.id)
            .finish()
    }
}

impl PartialEq for TextSourceVersion {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }
}

impl Eq for TextSourceVersion {}

impl TextSourceVersion {
    /// Whether both versions come from the same document.
    pub fn belongs_to_same_document(&self, other: &TextSourceVersion) -> bool {
        self.node.document == other.node.document
    }

    /// Orders the versions by age; `Less` means `self` is older.
    pub fn compare_age(&self, other: &TextSourceVersion) -> Result<Ordering> {
        if !self.belongs_to_same_document(other) {
            return Err(DocumentError::invalid_argument(
                "versions belong to different documents",
            ));
        }
        Ok(self.node.id.cmp(&other.node.id))
    }

    /// Changes that lead from `self` to `other`. When `other` is older the inverted changes are
    /// returned, newest first.
    pub fn changes_to(&self, other: &TextSourceVersion) -> Result<Vec<DocumentChangeEvent>> {
        match self.compare_age(other)? {
            Ordering::Less => Ok(self.forward_changes(other)),
            Ordering::Greater => Ok(other
                .forward_changes(self)
                .iter()
                .rev()
                .map(DocumentChangeEvent::invert)
                .collect()),
            Ordering::Equal => Ok(Vec::new()),
        }
    }

    fn forward_changes(&self, newer: &TextSourceVersion) -> Vec<DocumentChangeEvent> {
        let mut changes = Vec::new();
        let mut node = &self.node;
        while !Arc::ptr_eq(node, &newer.node) {
            match node.next.get() {
                Some((change, next)) => {
                    changes.push(change.clone());
                    node = next;
                }
                None => break,
            }
        }
        changes
    }

    /// Maps `offset` recorded at `self` to the corresponding offset at `other`.
    pub fn move_offset_to(
        &self,
        other: &TextSourceVersion,
        offset: usize,
        movement: AnchorMovementType,
    ) -> Result<usize> {
        Ok(self
            .changes_to(other)?
            .iter()
            .fold(offset, |offset, change| change.get_new_offset(offset, movement)))
    }
}

/// Appends changes to a document's version chain.
pub(crate) struct VersionProvider {
    current: Arc<VersionNode>,
}

impl VersionProvider {
    pub(crate) fn new() -> Self {
        Self {
            current: Arc::new(VersionNode {
                document: NEXT_DOCUMENT_ID.fetch_add(1, AtomicOrdering::Relaxed),
                id: 0,
                next: OnceLock::new(),
            }),
        }
    }

    pub(crate) fn current(&self) -> TextSourceVersion {
        TextSourceVersion {
            node: Arc::clone(&self.current),
        }
    }

    pub(crate) fn append_change(&mut self, change: DocumentChangeEvent) {
        let next = Arc::new(VersionNode {
            document: self.current.document,
            id: self.current.id + 1,
            next: OnceLock::new(),
        });
        // The current node is the chain's tail, so its link is always unset.
        let _ = self.current.next.set((change, Arc::clone(&next)));
        self.current = next;
    }
}
