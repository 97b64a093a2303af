//! Error type shared by every document operation.

use std::thread::ThreadId;

use thiserror::Error;

/// Result alias used throughout `editor-document`.
pub type Result<T> = std::result::Result<T, DocumentError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// Errors produced by the document, its trees and its collaborators.
pub enum DocumentError {
    #[error("offset {offset} is out of range 0..={text_length}")]
    /// An offset lies outside `0..=text_length`.
    OffsetOutOfRange {
        /// Offending offset.
        offset: usize,
        /// Text length at the time of the call.
        text_length: usize,
    },

    #[error("length {length} at offset {offset} exceeds text length {text_length}")]
    /// `offset + length` lies past the end of the text.
    LengthOutOfRange {
        /// Start offset of the range.
        offset: usize,
        /// Requested length.
        length: usize,
        /// Text length at the time of the call.
        text_length: usize,
    },

    #[error("line {line} is out of range 1..={line_count}")]
    /// A 1-based line number outside the document.
    LineOutOfRange {
        /// Offending line number.
        line: usize,
        /// Number of lines in the document.
        line_count: usize,
    },

    #[error("document is owned by thread {owner:?}, accessed from {current:?}")]
    /// A structural query or mutation was issued from a thread that does not own the document.
    WrongThread {
        /// Thread that owns the document.
        owner: ThreadId,
        /// Thread that attempted the access.
        current: ThreadId,
    },

    #[error("the owning document no longer exists")]
    /// A handle outlived the document it belongs to.
    NoDocument,

    #[error("anchor was deleted")]
    /// The anchor's surrounding text was removed and it did not survive deletion.
    AnchorDeleted,

    #[error("segment is not part of this collection")]
    /// A segment id that is stale or belongs to another collection.
    UnknownSegment,

    #[error("invalid argument: {0}")]
    /// An argument violates a documented precondition.
    InvalidArgument(String),

    #[error("invalid operation: {0}")]
    /// The operation is not allowed in the current state, or a collaborator broke its contract.
    InvalidOperation(String),
}

impl DocumentError {
    /// Build an `InvalidOperation` error from any message.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation(message.into())
    }

    /// Build an `InvalidArgument` error from any message.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}
