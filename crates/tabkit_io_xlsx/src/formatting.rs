//! Lenient parsing of one page's `formatting` document.
//!
//! Every entry is validated on its own; a bad entry is dropped into
//! [`SpecFormattingModel::dropped`] and never spoils its siblings.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::spec::{
    EnumDirectiveKind, EnumSkipReason, SpecCellBorder, SpecFormattingModel, SpecMergedCellRange,
    SpecPageFormatting, SpecSkippedDirective,
};
use crate::util::{derive_bounded_index, derive_index_from_json, parse_cell_key};

const C_KEY_MERGED_CELLS: &str = "merged_cells";
const C_KEY_CELL_BORDERS: &str = "cell_borders";
const C_KEY_HEADER_ROWS: &str = "header_rows";
const C_KEY_TOTAL_ROWS: &str = "total_rows";
const C_KEY_BOLD_CELLS: &str = "bold_cells";

/// Parse one page's formatting against its `n_rows x n_cols` grid.
///
/// Absent or `null` formatting degrades to an empty model. Marker rows are
/// not directives: invalid entries there only produce a warning.
pub fn parse_page_formatting(
    value: Option<&Value>,
    n_rows: usize,
    n_cols: usize,
    warnings: &mut Vec<String>,
) -> SpecPageFormatting {
    let mut model = SpecPageFormatting::default();

    let Some(value) = value.filter(|v| !v.is_null()) else {
        return model;
    };
    let Some(dict_formatting) = value.as_object() else {
        warnings.push(format!("formatting is not an object ({value}); ignored"));
        return model;
    };

    let mut ctx = SpecParseContext {
        n_rows,
        n_cols,
        model: &mut model,
    };
    ctx.parse_merged_cells(dict_formatting.get(C_KEY_MERGED_CELLS));
    ctx.parse_cell_borders(dict_formatting.get(C_KEY_CELL_BORDERS));
    ctx.parse_bold_cells(dict_formatting.get(C_KEY_BOLD_CELLS));

    model.header_rows = parse_marker_rows(
        dict_formatting.get(C_KEY_HEADER_ROWS),
        C_KEY_HEADER_ROWS,
        n_rows,
        warnings,
    );
    model.total_rows = parse_marker_rows(
        dict_formatting.get(C_KEY_TOTAL_ROWS),
        C_KEY_TOTAL_ROWS,
        n_rows,
        warnings,
    );
    model
}

struct SpecParseContext<'a, S> {
    n_rows: usize,
    n_cols: usize,
    model: &'a mut SpecFormattingModel<S>,
}

impl<S> SpecParseContext<'_, S> {
    fn keep<T>(
        &mut self,
        kind: EnumDirectiveKind,
        directive: impl FnOnce() -> String,
        outcome: Result<T, EnumSkipReason>,
    ) -> Option<T> {
        match outcome {
            Ok(val) => Some(val),
            Err(reason) => {
                self.model.dropped.push(SpecSkippedDirective {
                    kind,
                    directive: directive(),
                    reason,
                    idx_block: None,
                });
                None
            }
        }
    }

    fn derive_cell(&self, n_row: i64, n_col: i64) -> Result<(usize, usize), EnumSkipReason> {
        match (
            derive_bounded_index(n_row, self.n_rows),
            derive_bounded_index(n_col, self.n_cols),
        ) {
            (Some(n_row), Some(n_col)) => Ok((n_row, n_col)),
            _ => Err(EnumSkipReason::OutOfBounds),
        }
    }

    fn parse_merged_cells(&mut self, value: Option<&Value>) {
        let Some(value) = value.filter(|v| !v.is_null()) else {
            return;
        };
        let Some(l_entries) = value.as_array() else {
            self.keep::<()>(
                EnumDirectiveKind::Merge,
                || format!("{C_KEY_MERGED_CELLS}: {value}"),
                Err(EnumSkipReason::Malformed("not an array".to_string())),
            );
            return;
        };

        for entry in l_entries {
            let outcome = self.derive_merge(entry);
            if let Some(merge) = self.keep(EnumDirectiveKind::Merge, || entry.to_string(), outcome)
            {
                self.model.merged_cells.push(merge);
            }
        }
    }

    fn derive_merge(&self, entry: &Value) -> Result<SpecMergedCellRange, EnumSkipReason> {
        let Some(dict_entry) = entry.as_object() else {
            return Err(EnumSkipReason::Malformed("not an object".to_string()));
        };

        let n_row_start = derive_required_index(dict_entry, "start_row")?;
        let n_col_start = derive_required_index(dict_entry, "start_col")?;
        let n_row_end = derive_required_index(dict_entry, "end_row")?;
        let n_col_end = derive_required_index(dict_entry, "end_col")?;

        if n_row_end < n_row_start || n_col_end < n_col_start {
            return Err(EnumSkipReason::Malformed("end before start".to_string()));
        }

        let (row_idx_start, col_idx_start) = self.derive_cell(n_row_start, n_col_start)?;
        let (row_idx_end, col_idx_end) = self.derive_cell(n_row_end, n_col_end)?;

        let text = match dict_entry.get("value") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };

        Ok(SpecMergedCellRange {
            row_idx_start,
            col_idx_start,
            row_idx_end,
            col_idx_end,
            text,
        })
    }

    fn parse_cell_borders(&mut self, value: Option<&Value>) {
        let Some(value) = value.filter(|v| !v.is_null()) else {
            return;
        };
        let Some(dict_entries) = value.as_object() else {
            self.keep::<()>(
                EnumDirectiveKind::Border,
                || format!("{C_KEY_CELL_BORDERS}: {value}"),
                Err(EnumSkipReason::Malformed("not an object".to_string())),
            );
            return;
        };

        for (c_key, entry) in dict_entries {
            let outcome = self.derive_border(c_key, entry);
            if let Some((tup_cell, border)) = self.keep(
                EnumDirectiveKind::Border,
                || format!("{c_key:?}: {entry}"),
                outcome,
            ) {
                self.model.cell_borders.insert(tup_cell, border);
            }
        }
    }

    fn derive_border(
        &self,
        key: &str,
        entry: &Value,
    ) -> Result<((usize, usize), SpecCellBorder), EnumSkipReason> {
        let (n_row, n_col) = parse_cell_key(key).map_err(EnumSkipReason::Malformed)?;
        let Some(dict_flags) = entry.as_object() else {
            return Err(EnumSkipReason::Malformed("flags are not an object".to_string()));
        };

        let border = SpecCellBorder {
            top: derive_border_flag(dict_flags, "top")?,
            bottom: derive_border_flag(dict_flags, "bottom")?,
            left: derive_border_flag(dict_flags, "left")?,
            right: derive_border_flag(dict_flags, "right")?,
        };
        Ok((self.derive_cell(n_row, n_col)?, border))
    }

    fn parse_bold_cells(&mut self, value: Option<&Value>) {
        let Some(value) = value.filter(|v| !v.is_null()) else {
            return;
        };
        let Some(l_entries) = value.as_array() else {
            self.keep::<()>(
                EnumDirectiveKind::Bold,
                || format!("{C_KEY_BOLD_CELLS}: {value}"),
                Err(EnumSkipReason::Malformed("not an array".to_string())),
            );
            return;
        };

        for entry in l_entries {
            let outcome = self.derive_bold(entry);
            if let Some(tup_cell) =
                self.keep(EnumDirectiveKind::Bold, || entry.to_string(), outcome)
            {
                self.model.bold_cells.insert(tup_cell);
            }
        }
    }

    fn derive_bold(&self, entry: &Value) -> Result<(usize, usize), EnumSkipReason> {
        let l_pair = match entry.as_array() {
            Some(l_pair) if l_pair.len() == 2 => l_pair,
            _ => {
                return Err(EnumSkipReason::Malformed(
                    "expected a [row, col] pair".to_string(),
                ));
            }
        };
        let n_row = derive_index_from_json(&l_pair[0]).map_err(EnumSkipReason::Malformed)?;
        let n_col = derive_index_from_json(&l_pair[1]).map_err(EnumSkipReason::Malformed)?;
        self.derive_cell(n_row, n_col)
    }
}

fn derive_required_index(dict_entry: &Map<String, Value>, key: &str) -> Result<i64, EnumSkipReason> {
    let Some(value) = dict_entry.get(key) else {
        return Err(EnumSkipReason::Malformed(format!("missing {key}")));
    };
    derive_index_from_json(value).map_err(|err| EnumSkipReason::Malformed(format!("{key}: {err}")))
}

fn derive_border_flag(dict_flags: &Map<String, Value>, key: &str) -> Result<bool, EnumSkipReason> {
    match dict_flags.get(key) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(EnumSkipReason::Malformed(format!(
            "flag {key} is not a boolean: {other}"
        ))),
    }
}

fn parse_marker_rows(
    value: Option<&Value>,
    key: &str,
    n_rows: usize,
    warnings: &mut Vec<String>,
) -> BTreeSet<usize> {
    let mut set_rows = BTreeSet::new();
    let Some(value) = value.filter(|v| !v.is_null()) else {
        return set_rows;
    };
    let Some(l_entries) = value.as_array() else {
        warnings.push(format!("{key} is not an array ({value}); ignored"));
        return set_rows;
    };

    for entry in l_entries {
        match derive_index_from_json(entry)
            .ok()
            .and_then(|n| derive_bounded_index(n, n_rows))
        {
            Some(n_row) => {
                set_rows.insert(n_row);
            }
            None => warnings.push(format!("{key} entry {entry} is invalid; ignored")),
        }
    }
    set_rows
}
