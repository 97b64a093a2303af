//! Plain text ranges.

/// A range of text described by a start offset and a length.
pub trait Segment {
    /// Start offset.
    fn offset(&self) -> usize;

    /// Length in characters.
    fn length(&self) -> usize;

    /// Exclusive end offset.
    fn end_offset(&self) -> usize {
        self.offset() + self.length()
    }

    /// Whether `offset` lies within `[start, end]` (both ends inclusive).
    fn contains_offset(&self, offset: usize) -> bool {
        self.offset() <= offset && offset <= self.end_offset()
    }
}

/// A free-standing `[offset, offset + length)` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SimpleSegment {
    /// Start offset.
    pub offset: usize,
    /// Length in characters.
    pub length: usize,
}

impl SimpleSegment {
    /// Create a segment from a start offset and a length.
    pub const fn new(offset: usize, length: usize) -> Self {
        Self { offset, length }
    }

    /// Create a segment from start and exclusive end offsets.
    pub fn from_bounds(start: usize, end: usize) -> Self {
        Self {
            offset: start,
            length: end.saturating_sub(start),
        }
    }

    /// Intersection with `other`, or `None` when they do not touch.
    pub fn intersect(&self, other: &impl Segment) -> Option<SimpleSegment> {
        let start = self.offset.max(other.offset());
        let end = self.end_offset().min(other.end_offset());
        (start <= end).then(|| SimpleSegment::from_bounds(start, end))
    }
}

impl Segment for SimpleSegment {
    fn offset(&self) -> usize {
        self.offset
    }

    fn length(&self) -> usize {
        self.length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_segment_bounds() {
        let s = SimpleSegment::from_bounds(3, 8);
        assert_eq!(s.length(), 5);
        assert_eq!(s.end_offset(), 8);
        assert!(s.contains_offset(3));
        assert!(s.contains_offset(8));
        assert!(!s.contains_offset(9));
    }

    #[test]
    fn test_intersect() {
        let a = SimpleSegment::new(0, 10);
        assert_eq!(
            a.intersect(&SimpleSegment::new(5, 10)),
            Some(SimpleSegment::new(5, 5))
        );
        assert_eq!(
            a.intersect(&SimpleSegment::new(10, 3)),
            Some(SimpleSegment::new(10, 0))
        );
        assert_eq!(a.intersect(&SimpleSegment::new(11, 3)), None);
    }
}
