//! Read-only sections.
//!
//! A [`ReadOnlySectionProvider`] decides where text may be inserted and which parts of a range
//! may be deleted. Editing front-ends route user edits through [`remove_deletable`] and
//! [`replace_deletable`], which only touch the parts the provider allows.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::trace;

use crate::document::{Document, SharedChangeListener};
use crate::error::{DocumentError, Result};
use crate::segment::{Segment, SimpleSegment};
use crate::segments::TextSegmentCollection;

/// Decides which parts of a document may be edited.
pub trait ReadOnlySectionProvider {
    /// Whether text may be inserted at `offset`.
    fn can_insert(&self, offset: usize) -> bool;

    /// The deletable parts of `segment`, sorted and non-overlapping.
    fn get_deletable_segments(&self, segment: SimpleSegment) -> Vec<SimpleSegment>;
}

/// Everything is editable.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReadOnlySections;

impl ReadOnlySectionProvider for NoReadOnlySections {
    fn can_insert(&self, _offset: usize) -> bool {
        true
    }

    fn get_deletable_segments(&self, segment: SimpleSegment) -> Vec<SimpleSegment> {
        vec![segment]
    }
}

/// Nothing is editable.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOnlyDocument;

impl ReadOnlySectionProvider for ReadOnlyDocument {
    fn can_insert(&self, _offset: usize) -> bool {
        false
    }

    fn get_deletable_segments(&self, _segment: SimpleSegment) -> Vec<SimpleSegment> {
        Vec::new()
    }
}

/// Treats every segment of a [`TextSegmentCollection`] as read-only.
///
/// Inserting at the boundary of a read-only segment is allowed; inserting strictly inside is
/// not.
pub struct TextSegmentReadOnlySectionProvider<T> {
    segments: Rc<RefCell<TextSegmentCollection<T>>>,
}

impl<T: 'static> TextSegmentReadOnlySectionProvider<T> {
    /// Creates an empty collection that follows the edits of `document`.
    pub fn new(document: &mut Document) -> Self {
        let segments = Rc::new(RefCell::new(TextSegmentCollection::new()));
        let listener: SharedChangeListener = segments.clone();
        document.add_change_listener(&listener);
        Self { segments }
    }
}

impl<T> TextSegmentReadOnlySectionProvider<T> {
    /// Wraps an existing collection. Keeping it in sync with the document is up to the caller.
    pub fn from_segments(segments: Rc<RefCell<TextSegmentCollection<T>>>) -> Self {
        Self { segments }
    }

    /// The read-only segments.
    pub fn segments(&self) -> &Rc<RefCell<TextSegmentCollection<T>>> {
        &self.segments
    }
}

impl<T> ReadOnlySectionProvider for TextSegmentReadOnlySectionProvider<T> {
    fn can_insert(&self, offset: usize) -> bool {
        self.segments
            .borrow()
            .find_segments_containing(offset)
            .iter()
            .all(|s| s.start_offset >= offset || offset >= s.end_offset())
    }

    fn get_deletable_segments(&self, segment: SimpleSegment) -> Vec<SimpleSegment> {
        if segment.length == 0 && self.can_insert(segment.offset) {
            return vec![segment];
        }
        let segments = self.segments.borrow();
        let mut deletable = Vec::new();
        let mut read_only_until = segment.offset;
        for read_only in segments.find_overlapping_segments(segment.offset, segment.length) {
            let start = read_only.start_offset;
            let end = read_only.end_offset();
            if start > read_only_until {
                deletable.push(SimpleSegment::from_bounds(read_only_until, start));
            }
            read_only_until = read_only_until.max(end);
        }
        if read_only_until < segment.end_offset() {
            deletable.push(SimpleSegment::from_bounds(read_only_until, segment.end_offset()));
        }
        deletable
    }
}

/// Asks `provider` for the deletable parts of `segment` and checks the answer.
///
/// Fails with [`DocumentError::InvalidOperation`] if a returned part lies outside `segment`,
/// or if the parts are out of order or overlap.
pub fn get_deletable_segments(
    provider: &dyn ReadOnlySectionProvider,
    segment: SimpleSegment,
) -> Result<Vec<SimpleSegment>> {
    let deletable = provider.get_deletable_segments(segment);
    let mut last_end = segment.offset;
    for part in &deletable {
        if part.offset < last_end {
            return Err(DocumentError::invalid_operation(
                "read-only section provider returned segments outside the input or out of order",
            ));
        }
        last_end = part.end_offset();
    }
    if last_end > segment.end_offset() {
        return Err(DocumentError::invalid_operation(
            "read-only section provider returned segments outside the input",
        ));
    }
    Ok(deletable)
}

/// Removes the deletable parts of `segment` in one update group and returns them.
pub fn remove_deletable(
    document: &mut Document,
    provider: &dyn ReadOnlySectionProvider,
    segment: SimpleSegment,
) -> Result<Vec<SimpleSegment>> {
    let deletable = get_deletable_segments(provider, segment)?;
    trace!(parts = deletable.len(), "remove deletable");
    document.begin_update()?;
    let removed = deletable
        .iter()
        .rev()
        .try_for_each(|part| document.remove(part.offset, part.length));
    document.end_update()?;
    removed.map(|()| deletable)
}

/// Replaces the editable part of `segment` with `text`.
///
/// The last deletable part receives the text and the others are removed. Returns `false` when
/// no part of `segment` is editable, in which case the document is left unchanged.
pub fn replace_deletable(
    document: &mut Document,
    provider: &dyn ReadOnlySectionProvider,
    segment: SimpleSegment,
    text: &str,
) -> Result<bool> {
    let deletable = get_deletable_segments(provider, segment)?;
    let Some((last, rest)) = deletable.split_last() else {
        return Ok(false);
    };
    document.begin_update()?;
    let replaced = document
        .replace(last.offset, last.length, text)
        .and_then(|()| {
            rest.iter()
                .rev()
                .try_for_each(|part| document.remove(part.offset, part.length))
        });
    document.end_update()?;
    replaced.map(|()| true)
}
