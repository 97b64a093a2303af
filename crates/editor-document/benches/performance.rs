use std::cell::RefCell;
use std::rc::Rc;

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use editor_document::{Document, FoldingManager, HeightTree, NewFolding};

fn large_text(line_count: usize) -> String {
    let mut out = String::with_capacity(line_count * 64);
    for i in 0..line_count {
        out.push_str(&format!(
            "{i:06} the quick brown fox jumps over the lazy dog (editor-document benchmark line)\n"
        ));
    }
    // Remove the final '\n' to avoid creating an extra trailing empty line.
    out.pop();
    out
}

fn bench_large_file_open(c: &mut Criterion) {
    let text = large_text(50_000);
    c.bench_function("large_file_open/50k_lines", |b| {
        b.iter(|| {
            let document = Document::from_text(black_box(&text));
            black_box(document.line_count());
        })
    });
}

fn bench_typing_in_middle(c: &mut Criterion) {
    let text = large_text(50_000);
    c.bench_function("typing_middle/100_inserts", |b| {
        b.iter_batched(
            || Document::from_text(&text),
            |mut document| {
                let mut offset = document.text_length() / 2;
                for _ in 0..100 {
                    document.insert(offset, "x").unwrap();
                    offset += 1;
                }
                black_box(document.text_length());
            },
            BatchSize::LargeInput,
        )
    });
}

fn bench_line_lookup(c: &mut Criterion) {
    let text = large_text(50_000);
    let document = Document::from_text(&text);
    let length = document.text_length();

    c.bench_function("line_lookup/1000_offsets", |b| {
        b.iter(|| {
            for i in 0..1000 {
                let offset = (i * 7919) % length;
                black_box(document.get_line_by_offset(offset).unwrap());
            }
        })
    });
}

fn bench_anchors_follow_edits(c: &mut Criterion) {
    let text = large_text(10_000);
    c.bench_function("anchors/10k_anchors_100_edits", |b| {
        b.iter_batched(
            || {
                let mut document = Document::from_text(&text);
                let anchors: Vec<_> = (0..10_000)
                    .map(|i| document.create_anchor(i * 50).unwrap())
                    .collect();
                (document, anchors)
            },
            |(mut document, anchors)| {
                for i in 0..100 {
                    document.insert(i * 4000, "line\n").unwrap();
                }
                black_box(anchors[5000].offset().unwrap());
            },
            BatchSize::LargeInput,
        )
    });
}

fn bench_folded_edits(c: &mut Criterion) {
    let text = large_text(20_000);
    c.bench_function("folding/edits_with_1000_folds", |b| {
        b.iter_batched(
            || {
                let mut document = Document::from_text(&text);
                let manager = FoldingManager::install(&mut document).unwrap();
                let heights = Rc::new(RefCell::new(HeightTree::new(document.line_count(), 14.0)));
                let foldings: Vec<NewFolding> = (0..1000)
                    .map(|i| {
                        let start = document.get_line_by_number(i * 20 + 1).unwrap();
                        let end = document.get_line_by_number(i * 20 + 10).unwrap();
                        NewFolding {
                            default_closed: true,
                            ..NewFolding::new(start.end_offset(), end.end_offset())
                        }
                    })
                    .collect();
                {
                    let mut manager = manager.borrow_mut();
                    manager.attach_height_tree(&mut document, &heights).unwrap();
                    manager.update_foldings(&document, &foldings, None).unwrap();
                }
                (document, manager, heights)
            },
            |(mut document, _manager, heights)| {
                for i in 0..100 {
                    let offset = document.get_line_by_number(i * 150 + 5).unwrap().offset;
                    document.insert(offset, "new line\n").unwrap();
                }
                black_box(heights.borrow().total_height());
            },
            BatchSize::LargeInput,
        )
    });
}

criterion_group!(
    benches,
    bench_large_file_open,
    bench_typing_in_middle,
    bench_line_lookup,
    bench_anchors_follow_edits,
    bench_folded_edits
);
criterion_main!(benches);
