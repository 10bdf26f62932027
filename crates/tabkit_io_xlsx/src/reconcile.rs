//! Cross-page reconciliation of page-local extraction results.

use indexmap::IndexSet;

use crate::spec::{
    SpecCombinedExtraction, SpecCombinedFormatting, SpecExtractionDocument, SpecPageFormatting,
    SpecSkippedDirective,
};

/// Fold ordered `(row_count, page formatting)` pairs into combined row space.
///
/// Block `n` is shifted down by the row count of blocks `0..n`. Merges keep
/// their page-then-entry order; a later block's border on the same combined
/// cell replaces an earlier one. Each dropped entry is tagged with the
/// ordinal of the block it came from.
pub fn reconcile_formatting<'a, I>(blocks: I) -> SpecCombinedFormatting
where
    I: IntoIterator<Item = (usize, &'a SpecPageFormatting)>,
{
    let mut combined = SpecCombinedFormatting::empty();
    let mut n_offset = 0usize;

    for (n_idx_block, (n_rows, page)) in blocks.into_iter().enumerate() {
        combined.merged_cells.extend(
            page.merged_cells
                .iter()
                .map(|merge| merge.with_row_offset(n_offset)),
        );
        for (&(n_row, n_col), border) in &page.cell_borders {
            combined
                .cell_borders
                .insert((n_row + n_offset, n_col), *border);
        }
        combined
            .header_rows
            .extend(page.header_rows.iter().map(|n_row| n_row + n_offset));
        combined
            .total_rows
            .extend(page.total_rows.iter().map(|n_row| n_row + n_offset));
        combined.bold_cells.extend(
            page.bold_cells
                .iter()
                .map(|&(n_row, n_col)| (n_row + n_offset, n_col)),
        );
        combined
            .dropped
            .extend(page.dropped.iter().map(|skipped| SpecSkippedDirective {
                idx_block: Some(n_idx_block),
                ..skipped.clone()
            }));

        n_offset += n_rows;
    }

    combined
}

/// Order-preserving union of column sets; first occurrence wins.
pub fn combine_columns<'a, I>(column_sets: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a [String]>,
{
    let mut set_columns: IndexSet<&str> = IndexSet::new();
    for l_cols in column_sets {
        set_columns.extend(l_cols.iter().map(String::as_str));
    }
    set_columns.into_iter().map(ToString::to_string).collect()
}

/// Fold every table block of a document into one sheet-ready data set.
///
/// Blocks are taken page by page, then in table order within a page.
pub fn reconcile_document(document: SpecExtractionDocument) -> SpecCombinedExtraction {
    let SpecExtractionDocument { source, pages } = document;

    let mut l_blocks = Vec::new();
    let mut l_warnings = Vec::new();
    for page in pages {
        l_blocks.extend(page.blocks);
        l_warnings.extend(page.warnings);
    }

    let columns = combine_columns(l_blocks.iter().map(|block| block.columns.as_slice()));
    let formatting = reconcile_formatting(
        l_blocks
            .iter()
            .map(|block| (block.rows.len(), &block.formatting)),
    );
    let rows = l_blocks.into_iter().flat_map(|block| block.rows).collect();

    SpecCombinedExtraction {
        source,
        columns,
        rows,
        formatting,
        warnings: l_warnings,
    }
}
