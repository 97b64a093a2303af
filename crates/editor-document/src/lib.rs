#![warn(missing_docs)]
//! Editor Document - Headless Text Document Model for Code Editors
//!
//! # Overview
//!
//! `editor-document` is the document layer of a code editor: a text buffer with a line index,
//! positions that survive edits, code folding and undo/redo. It does not render anything;
//! views observe the document through change listeners, line trackers and events.
//!
//! # Core Features
//!
//! - **Rope Text Storage**: `ropey` backed buffer with O(log n) edits and cheap snapshots
//! - **Line Tree**: O(log n) line lookup by number or offset, lines keep their identity across edits
//! - **Segments & Anchors**: tracked ranges and weakly held positions that follow every edit
//! - **Height Tree**: per-line heights, visual positions and collapsed sections
//! - **Code Folding**: folding sections synchronized with any number of height trees
//! - **Undo/Redo**: grouped history replayed through the regular edit pipeline
//! - **Change Model**: offset change maps, change events and text versions
//!
//! # Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Document (edits, update groups, events)    │  ← Public API
//! ├─────────────────────────────────────────────┤
//! │  Folding / Read-only Sections / Undo        │  ← Editing Services
//! ├─────────────────────────────────────────────┤
//! │  Segments, Anchors, Height Tree             │  ← Position Tracking
//! ├─────────────────────────────────────────────┤
//! │  Line Tree & Line Manager                   │  ← Line Access
//! ├─────────────────────────────────────────────┤
//! │  Rope Text Buffer                           │  ← Text Storage
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use editor_document::{Document, TextLocation};
//!
//! let mut document = Document::from_text("abc\ndef\nghi");
//! assert_eq!(document.line_count(), 3);
//!
//! let anchor = document.create_anchor(5).unwrap();
//! document.insert(4, "new line\n").unwrap();
//! assert_eq!(anchor.offset().unwrap(), 14);
//! assert_eq!(document.get_location(14).unwrap(), TextLocation::new(3, 2));
//!
//! document.undo().unwrap();
//! assert_eq!(document.text(), "abc\ndef\nghi");
//! ```
//!
//! ## Folding
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use editor_document::{Document, FoldingManager, HeightTree};
//!
//! let mut document = Document::from_text("fn main() {\n    body();\n}\n");
//! let folding = FoldingManager::install(&mut document).unwrap();
//! let heights = Rc::new(RefCell::new(HeightTree::new(document.line_count(), 16.0)));
//! folding
//!     .borrow_mut()
//!     .attach_height_tree(&mut document, &heights)
//!     .unwrap();
//!
//! let section = folding.borrow_mut().create_folding(&document, 10, 25).unwrap();
//! folding.borrow_mut().set_folded(&document, section, true).unwrap();
//! assert!(heights.borrow().is_collapsed(2).unwrap());
//! ```
//!
//! # Module Description
//!
//! - [`buffer`] - Rope text storage and snapshots
//! - [`line_tree`] / [`line_manager`] - line index and line trackers
//! - [`segments`] - tracked text segments
//! - [`anchors`] - weakly held text anchors
//! - [`height_tree`] - line heights and collapsed sections
//! - [`folding`] - folding sections
//! - [`undo`] - undo/redo history
//! - [`change`] - offset change maps, change events and versions
//! - [`read_only`] - read-only section providers
//! - [`document`] - the document itself
//!
//! # Threading
//!
//! A document belongs to one thread and is `!Send`. Edits and all `Result`-returning queries
//! verify the owner thread; infallible accessors such as [`Document::text`] and
//! [`Document::lines`] do not. Hand [`TextSnapshot`]s or [`TextSourceVersion`]s to other
//! threads instead; both are `Send + Sync`.

pub mod anchors;
pub mod buffer;
pub mod change;
pub mod document;
pub mod error;
pub mod folding;
pub mod height_tree;
pub mod line_ending;
pub mod line_manager;
pub mod line_tree;
pub mod location;
pub mod read_only;
mod rb_tree;
pub mod segment;
pub mod segments;
pub mod undo;

pub use anchors::TextAnchor;
pub use buffer::{TextBuffer, TextSnapshot};
pub use change::{
    AnchorMovementType, DocumentChangeEvent, OffsetChangeMap, OffsetChangeMapEntry,
    OffsetChangeMappingType, TextSourceVersion,
};
pub use document::{
    ChangeListener, Document, DocumentEvent, DocumentOptions, SharedChangeListener,
    SubscriptionId,
};
pub use error::{DocumentError, Result};
pub use folding::{FoldingId, FoldingManager, FoldingSection, NewFolding};
pub use height_tree::{CollapsedSection, CollapsedSectionId, HeightTree};
pub use line_ending::LineEnding;
pub use line_manager::{LineTracker, SharedLineTracker};
pub use line_tree::{DocumentLine, LineId};
pub use location::TextLocation;
pub use read_only::{
    NoReadOnlySections, ReadOnlyDocument, ReadOnlySectionProvider,
    TextSegmentReadOnlySectionProvider, get_deletable_segments, remove_deletable,
    replace_deletable,
};
pub use segment::{Segment, SimpleSegment};
pub use segments::{SegmentEntry, SegmentId, TextSegmentCollection};
pub use undo::UndoStack;
