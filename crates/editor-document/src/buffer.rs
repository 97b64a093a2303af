//! Text storage.
//!
//! [`TextBuffer`] is the mutable character store behind a document. It is backed by a
//! [`ropey::Rope`], a balanced B-tree of text chunks whose nodes are shared through `Arc`, so
//! every operation is `O(log n)` and taking a [`TextSnapshot`] is `O(1)` copy-on-write.
//!
//! All offsets and lengths are counted in `char`s.

use ropey::Rope;

use crate::error::{DocumentError, Result};
use crate::segment::Segment;

/// Mutable rope-backed text.
#[derive(Debug, Clone, Default)]
pub struct TextBuffer {
    rope: Rope,
}

impl TextBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self { rope: Rope::new() }
    }

    /// Create a buffer holding `text`.
    pub fn from_text(text: &str) -> Self {
        Self {
            rope: Rope::from_str(text),
        }
    }

    /// Number of characters.
    pub fn len(&self) -> usize {
        self.rope.len_chars()
    }

    /// Whether the buffer holds no text.
    pub fn is_empty(&self) -> bool {
        self.rope.len_chars() == 0
    }

    pub(crate) fn check_offset(&self, offset: usize) -> Result<()> {
        let text_length = self.len();
        if offset > text_length {
            return Err(DocumentError::OffsetOutOfRange {
                offset,
                text_length,
            });
        }
        Ok(())
    }

    pub(crate) fn check_range(&self, offset: usize, length: usize) -> Result<()> {
        self.check_offset(offset)?;
        let text_length = self.len();
        if length > text_length - offset {
            return Err(DocumentError::LengthOutOfRange {
                offset,
                length,
                text_length,
            });
        }
        Ok(())
    }

    /// Insert `text` at `offset`.
    pub fn insert(&mut self, offset: usize, text: &str) -> Result<()> {
        self.check_offset(offset)?;
        if !text.is_empty() {
            self.rope.insert(offset, text);
        }
        Ok(())
    }

    /// Remove `length` characters starting at `offset`.
    pub fn remove(&mut self, offset: usize, length: usize) -> Result<()> {
        self.check_range(offset, length)?;
        if length > 0 {
            self.rope.remove(offset..offset + length);
        }
        Ok(())
    }

    /// Remove all text.
    pub fn clear(&mut self) {
        self.rope = Rope::new();
    }

    /// Copy of the characters in `offset..offset + length`.
    pub fn substring(&self, offset: usize, length: usize) -> Result<String> {
        self.check_range(offset, length)?;
        Ok(self.rope.slice(offset..offset + length).to_string())
    }

    /// Character at `offset`.
    pub fn char_at(&self, offset: usize) -> Result<char> {
        let text_length = self.len();
        if offset >= text_length {
            return Err(DocumentError::OffsetOutOfRange {
                offset,
                text_length,
            });
        }
        Ok(self.rope.char(offset))
    }

    /// Offset of the first occurrence of `c` within `start..start + count`.
    pub fn index_of(&self, c: char, start: usize, count: usize) -> Result<Option<usize>> {
        self.index_of_any(&[c], start, count)
    }

    /// Offset of the first character out of `chars` within `start..start + count`.
    pub fn index_of_any(&self, chars: &[char], start: usize, count: usize) -> Result<Option<usize>> {
        self.check_range(start, count)?;
        Ok(self
            .rope
            .chars_at(start)
            .take(count)
            .position(|c| chars.contains(&c))
            .map(|pos| start + pos))
    }

    /// Iterate characters starting at `offset`.
    pub fn chars_at(&self, offset: usize) -> Result<ropey::iter::Chars<'_>> {
        self.check_offset(offset)?;
        Ok(self.rope.chars_at(offset))
    }

    /// Iterate all characters.
    pub fn chars(&self) -> ropey::iter::Chars<'_> {
        self.rope.chars()
    }

    /// Whole text.
    pub fn text(&self) -> String {
        self.rope.to_string()
    }

    /// Immutable `O(1)` copy of the current text.
    pub fn snapshot(&self) -> TextSnapshot {
        TextSnapshot {
            rope: self.rope.clone(),
        }
    }
}

/// Immutable view of a buffer at one point in time.
///
/// Snapshots share storage with the buffer they came from and are `Send + Sync`, so a
/// background reader (a tokenizer, a search) may keep one while the owner thread keeps
/// editing the live document.
#[derive(Debug, Clone, Default)]
pub struct TextSnapshot {
    rope: Rope,
}

impl TextSnapshot {
    /// Number of characters.
    pub fn len(&self) -> usize {
        self.rope.len_chars()
    }

    /// Whether the snapshot holds no text.
    pub fn is_empty(&self) -> bool {
        self.rope.len_chars() == 0
    }

    /// Whole text.
    pub fn text(&self) -> String {
        self.rope.to_string()
    }

    /// Copy of the characters in `offset..offset + length`.
    pub fn substring(&self, offset: usize, length: usize) -> Result<String> {
        let text_length = self.len();
        if offset > text_length {
            return Err(DocumentError::OffsetOutOfRange {
                offset,
                text_length,
            });
        }
        if length > text_length - offset {
            return Err(DocumentError::LengthOutOfRange {
                offset,
                length,
                text_length,
            });
        }
        Ok(self.rope.slice(offset..offset + length).to_string())
    }

    /// Text covered by `segment`.
    pub fn text_of(&self, segment: &impl Segment) -> Result<String> {
        self.substring(segment.offset(), segment.length())
    }

    /// Character at `offset`.
    pub fn char_at(&self, offset: usize) -> Result<char> {
        let text_length = self.len();
        if offset >= text_length {
            return Err(DocumentError::OffsetOutOfRange {
                offset,
                text_length,
            });
        }
        Ok(self.rope.char(offset))
    }

    /// Number of lines as counted by `\r\n`, `\n` and `\r` delimiters.
    pub fn line_count(&self) -> usize {
        crate::line_ending::delimiters(self.rope.chars()).count() + 1
    }

    /// Underlying rope.
    pub fn rope(&self) -> &Rope {
        &self.rope
    }
}
