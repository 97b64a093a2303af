use std::cell::RefCell;
use std::rc::Rc;

use editor_document::{
    CollapsedSection, Document, DocumentError, FoldingManager, HeightTree, NewFolding,
};

const SIX_LINES: &str = "a\nb\nc\nd\ne\nf";

type Setup = (Document, Rc<RefCell<FoldingManager>>, Rc<RefCell<HeightTree>>);

fn folding_setup(text: &str) -> Setup {
    let mut document = Document::from_text(text);
    let manager = FoldingManager::install(&mut document).unwrap();
    let heights = Rc::new(RefCell::new(HeightTree::new(document.line_count(), 10.0)));
    manager
        .borrow_mut()
        .attach_height_tree(&mut document, &heights)
        .unwrap();
    (document, manager, heights)
}

#[test]
fn test_collapse_then_uncollapse_restores_heights() {
    let mut tree = HeightTree::new(8, 10.0);
    for line in 1..=8 {
        tree.set_height(line, line as f64).unwrap();
    }
    let heights: Vec<f64> = (1..=8).map(|l| tree.height(l).unwrap()).collect();
    let positions: Vec<f64> = (1..=8).map(|l| tree.visual_position(l).unwrap()).collect();
    let total = tree.total_height();

    let section = tree.collapse_text(1, 5).unwrap();
    assert_eq!(tree.total_height(), total - 15.0);
    assert_eq!(tree.visual_position(6).unwrap(), 0.0);
    assert!(tree.uncollapse(section));

    assert_eq!(tree.total_height(), total);
    for line in 1..=8 {
        assert_eq!(tree.height(line).unwrap(), heights[line - 1]);
        assert_eq!(tree.visual_position(line).unwrap(), positions[line - 1]);
        assert!(!tree.is_collapsed(line).unwrap());
    }
    assert!(!tree.uncollapse(section));
}

#[test]
fn test_folded_section_hides_inner_lines() {
    let (document, manager, heights) = folding_setup(SIX_LINES);
    let id = manager.borrow_mut().create_folding(&document, 1, 9).unwrap();
    manager.borrow_mut().set_folded(&document, id, true).unwrap();

    let tree = heights.borrow();
    assert_eq!(tree.total_height(), 20.0);
    assert!(!tree.is_collapsed(1).unwrap());
    assert!((2..=5).all(|line| tree.is_collapsed(line).unwrap()));
    assert!(!tree.is_collapsed(6).unwrap());
    assert_eq!(tree.visual_position(6).unwrap(), 10.0);
    assert_eq!(tree.line_by_visual_position(15.0), 6);
}

#[test]
fn test_folding_follows_edits_inside_it() {
    let (mut document, manager, heights) = folding_setup(SIX_LINES);
    let id = manager.borrow_mut().create_folding(&document, 1, 9).unwrap();
    manager.borrow_mut().set_folded(&document, id, true).unwrap();

    document.insert(4, "x\n").unwrap();
    assert_eq!(heights.borrow().line_count(), 7);
    assert_eq!(heights.borrow().total_height(), 20.0);
    assert!(heights.borrow().is_collapsed(3).unwrap());
    {
        let manager = manager.borrow();
        let folding = manager.folding(id).unwrap();
        assert_eq!((folding.start_offset, folding.length), (1, 10));
        assert!(folding.value.is_folded());
    }

    // Lines added after the folding stay visible.
    document.insert(document.text_length(), "\ng").unwrap();
    assert_eq!(heights.borrow().total_height(), 30.0);

    manager.borrow_mut().set_folded(&document, id, false).unwrap();
    assert_eq!(heights.borrow().total_height(), 80.0);
    assert_eq!(heights.borrow().collapsed_section_count(), 0);
}

#[test]
fn test_folding_removed_with_its_text() {
    let (mut document, manager, heights) = folding_setup(SIX_LINES);
    let id = manager.borrow_mut().create_folding(&document, 1, 9).unwrap();
    manager.borrow_mut().set_folded(&document, id, true).unwrap();

    document.remove(1, 8).unwrap();
    assert_eq!(document.text(), "a\nf");
    assert!(manager.borrow().is_empty());
    assert!(manager.borrow().folding(id).is_none());
    assert_eq!(heights.borrow().line_count(), 2);
    assert_eq!(heights.borrow().collapsed_section_count(), 0);
    assert_eq!(heights.borrow().total_height(), 20.0);
}

#[test]
fn test_folding_survives_undo_redo() {
    let (mut document, manager, heights) = folding_setup(SIX_LINES);
    let id = manager.borrow_mut().create_folding(&document, 1, 9).unwrap();
    manager.borrow_mut().set_folded(&document, id, true).unwrap();

    document.insert(6, "new\n").unwrap();
    assert_eq!(heights.borrow().line_count(), 7);
    assert!(document.undo().unwrap());
    assert_eq!(document.text(), SIX_LINES);
    assert_eq!(heights.borrow().line_count(), 6);
    assert_eq!(heights.borrow().total_height(), 20.0);

    assert!(document.redo().unwrap());
    assert_eq!(heights.borrow().total_height(), 20.0);
    let manager = manager.borrow();
    let folding = manager.folding(id).unwrap();
    assert_eq!((folding.start_offset, folding.length), (1, 12));
}

#[test]
fn test_update_foldings_keeps_state_of_matching_starts() {
    let text = "fn a() {\n  x\n}\nfn b() {\n  y\n}\n";
    let (document, manager, heights) = folding_setup(text);
    let mut manager = manager.borrow_mut();

    let first = NewFolding {
        default_closed: true,
        ..NewFolding::new(7, 14)
    };
    let second = NewFolding {
        name: String::from("{...}"),
        ..NewFolding::new(22, 29)
    };
    manager
        .update_foldings(&document, &[first.clone(), second.clone()], None)
        .unwrap();
    assert_eq!(manager.len(), 2);
    let starts: Vec<(usize, bool)> = manager
        .all_foldings()
        .map(|f| (f.start_offset, f.value.is_folded()))
        .collect();
    assert_eq!(starts, vec![(7, true), (22, false)]);
    assert_eq!(manager.get_next_folded_folding_start(0), Some(7));
    assert_eq!(manager.get_foldings_at(22)[0].value.title(), "{...}");
    assert!(heights.borrow().is_collapsed(2).unwrap());

    // Default-closed only applies the first time foldings are computed.
    let reopened = NewFolding {
        default_closed: true,
        ..NewFolding::new(22, 29)
    };
    manager.update_foldings(&document, &[reopened], None).unwrap();
    assert_eq!(manager.len(), 1);
    assert!(!manager.get_foldings_at(22)[0].value.is_folded());
    assert_eq!(heights.borrow().collapsed_section_count(), 0);

    // Old foldings behind a parse error are kept.
    manager.update_foldings(&document, &[], Some(20)).unwrap();
    assert_eq!(manager.len(), 1);
    manager.update_foldings(&document, &[], None).unwrap();
    assert!(manager.is_empty());

    let unsorted = [second, first];
    assert!(matches!(
        manager.update_foldings(&document, &unsorted, None),
        Err(DocumentError::InvalidArgument(_))
    ));
}

#[test]
fn test_update_foldings_skips_empty_foldings() {
    let (document, manager, _heights) = folding_setup(SIX_LINES);
    let mut manager = manager.borrow_mut();
    assert!(matches!(
        manager.create_folding(&document, 4, 4),
        Err(DocumentError::InvalidArgument(_))
    ));

    let foldings = [NewFolding::new(2, 2), NewFolding::new(2, 7)];
    manager.update_foldings(&document, &foldings, None).unwrap();
    assert_eq!(manager.len(), 1);
    let folding = manager.all_foldings().next().unwrap();
    assert_eq!((folding.start_offset, folding.length), (2, 5));
}

#[test]
fn test_multiple_height_trees() {
    let (mut document, manager, first) = folding_setup(SIX_LINES);
    let id = manager.borrow_mut().create_folding(&document, 3, 9).unwrap();
    manager.borrow_mut().set_folded(&document, id, true).unwrap();

    // A tree attached later picks up existing folded sections.
    let second = Rc::new(RefCell::new(HeightTree::new(6, 20.0)));
    manager
        .borrow_mut()
        .attach_height_tree(&mut document, &second)
        .unwrap();
    assert_eq!(first.borrow().total_height(), 30.0);
    assert_eq!(second.borrow().total_height(), 60.0);

    assert!(manager.borrow_mut().detach_height_tree(&first));
    assert_eq!(first.borrow().total_height(), 60.0);
    assert_eq!(second.borrow().total_height(), 60.0);

    let mismatched = Rc::new(RefCell::new(HeightTree::new(2, 10.0)));
    assert!(matches!(
        manager
            .borrow_mut()
            .attach_height_tree(&mut document, &mismatched),
        Err(DocumentError::InvalidArgument(_))
    ));
}

#[test]
fn test_collapsed_section_shrinks_when_boundary_lines_removed() {
    let mut document = Document::from_text(SIX_LINES);
    let heights = Rc::new(RefCell::new(HeightTree::new(6, 10.0)));
    let tracker: editor_document::SharedLineTracker = heights.clone();
    document.add_line_tracker(&tracker);
    let section = heights.borrow_mut().collapse_text(2, 4).unwrap();

    // Remove line 2 ("b\n").
    document.remove(2, 2).unwrap();
    assert_eq!(
        heights.borrow().section(section),
        Some(CollapsedSection {
            start_line: 2,
            end_line: 3
        })
    );
    assert_eq!(heights.borrow().total_height(), 30.0);
}
