use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;
use tabula_model::{CellRef, CellValue, DefinedNames, Range, SheetRange, Worksheet};

fn cell_set() -> impl Strategy<Value = BTreeSet<(u32, u32)>> {
    proptest::collection::btree_set((1u32..=12, 1u32..=8), 0..40)
}

/// Cells with a value and a style id (0 is the default style).
fn styled_cells() -> impl Strategy<Value = BTreeMap<(u32, u32), u32>> {
    proptest::collection::btree_map((1u32..=12, 1u32..=8), 0u32..4, 0..40)
}

/// Up to two merges of at least 2x2; overlapping ones are skipped when built.
fn merge_set() -> impl Strategy<Value = Vec<Range>> {
    proptest::collection::vec((1u32..=10, 1u32..=6, 1u32..=3, 1u32..=3), 0..=2).prop_map(
        |specs| {
            specs
                .into_iter()
                .map(|(row, col, h, w)| {
                    Range::new(CellRef::new(row, col), CellRef::new(row + h, col + w))
                })
                .collect()
        },
    )
}

fn build_sheet(cells: &BTreeMap<(u32, u32), u32>, merges: &[Range]) -> Worksheet {
    let mut ws = Worksheet::new("Data");
    for (&(row, col), &style_id) in cells {
        let addr = CellRef::new(row, col);
        ws.set_value(addr, (row * 100 + col) as f64);
        ws.set_style(addr, style_id);
    }
    for range in merges {
        let _ = ws.merge_cells(*range);
    }
    ws
}

fn assert_insert_delete_restores(before: &Worksheet, start: u32, count: u32) {
    let mut ws = before.clone();
    ws.splice_rows(start, 0, vec![vec![CellValue::from("new")]; count as usize]);
    ws.splice_rows(start, count, vec![]);
    assert_eq!(&ws, before, "rows at {start} x{count}");

    ws.splice_columns(start, 0, vec![vec![CellValue::from("new")]; count as usize]);
    ws.splice_columns(start, count, vec![]);
    assert_eq!(&ws, before, "columns at {start} x{count}");
}

#[test]
fn merge_straddling_the_splice_is_restored() {
    let mut cells = BTreeMap::new();
    cells.insert((2, 2), 3);
    cells.insert((3, 1), 1);
    cells.insert((5, 3), 2);
    let ws = build_sheet(&cells, &[Range::from_a1("B2:C4").unwrap()]);
    assert_eq!(ws.merges().len(), 1);
    assert_eq!(ws.cell(CellRef::new(4, 3)).unwrap().style_id, 3);

    for start in 1..=5 {
        for count in 1..=3 {
            assert_insert_delete_restores(&ws, start, count);
        }
    }
}

proptest! {
    #[test]
    fn reconstructed_ranges_partition_the_named_cells(cells in cell_set()) {
        let mut names = DefinedNames::new();
        for (row, col) in &cells {
            let loc = SheetRange::new("Data", Range::single(CellRef::new(*row, *col)));
            names.add_ex(&loc, "Picked").unwrap();
        }

        let mut covered = BTreeSet::new();
        for text in names.ranges("Picked") {
            let parsed = SheetRange::parse(&text).unwrap();
            prop_assert_eq!(parsed.sheet.as_deref(), Some("Data"));
            for addr in parsed.range.iter() {
                // Disjoint: no cell is emitted twice.
                prop_assert!(covered.insert((addr.row, addr.col)));
            }
        }
        prop_assert_eq!(covered, cells);
    }

    #[test]
    fn insert_then_delete_restores_sheet(
        cells in styled_cells(),
        merges in merge_set(),
        start in 1u32..=14,
        count in 1u32..=4,
    ) {
        let ws = build_sheet(&cells, &merges);
        assert_insert_delete_restores(&ws, start, count);
    }

    #[test]
    fn row_splice_shifts_every_value(
        cells in cell_set(),
        start in 1u32..=14,
        count in 1u32..=4,
    ) {
        let mut ws = Worksheet::new("Data");
        for (row, col) in &cells {
            ws.set_value(CellRef::new(*row, *col), (*row * 100 + *col) as f64);
        }
        ws.splice_rows(start, 0, vec![vec![]; count as usize]);
        for (row, col) in &cells {
            let moved = if *row >= start { row + count } else { *row };
            prop_assert_eq!(
                ws.value(CellRef::new(moved, *col)),
                &CellValue::Number((*row * 100 + *col) as f64)
            );
        }
    }
}
