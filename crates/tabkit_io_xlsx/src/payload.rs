//! Lenient parsing of extraction payloads into page and document models.
//!
//! Accepted document shapes:
//! - `[page, page, ...]`
//! - `{"source": "...", "pages": [page, ...]}`
//!
//! A page either lists `tables` (each with its own `columns`, `rows` and
//! `formatting`) or carries the flattened `columns` / `rows` / `formatting`
//! fields directly. Only an unusable top level fails the job; everything
//! below it degrades to warnings or dropped directives.

use indexmap::IndexSet;
use serde_json::{Map, Value};

use crate::formatting::parse_page_formatting;
use crate::spec::{
    EnumCellValue, ExportXlsxError, SpecExtractionDocument, SpecPageExtraction, SpecRow,
    SpecTableBlock,
};
use crate::util::derive_cell_value_from_json;

/// Parse a JSON document payload.
///
/// `source` overrides any `source` field carried by the payload.
pub fn parse_extraction_document(
    payload_json: &str,
    source: Option<&str>,
) -> Result<SpecExtractionDocument, ExportXlsxError> {
    let value: Value = serde_json::from_str(payload_json)
        .map_err(|err| ExportXlsxError::InvalidPayload(format!("not valid JSON: {err}")))?;
    derive_extraction_document(&value, source)
}

/// Build a document from an already decoded JSON value.
pub fn derive_extraction_document(
    value: &Value,
    source: Option<&str>,
) -> Result<SpecExtractionDocument, ExportXlsxError> {
    let (l_pages, source_payload) = match value {
        Value::Array(l_pages) => (l_pages, None),
        Value::Object(dict_payload) => {
            let Some(value_pages) = dict_payload.get("pages") else {
                return Err(ExportXlsxError::InvalidPayload(
                    "object payload has no \"pages\" field".to_string(),
                ));
            };
            let Some(l_pages) = value_pages.as_array() else {
                return Err(ExportXlsxError::InvalidPayload(
                    "\"pages\" is not an array".to_string(),
                ));
            };
            (l_pages, dict_payload.get("source").and_then(Value::as_str))
        }
        _ => {
            return Err(ExportXlsxError::InvalidPayload(
                "expected an array of pages or an object with \"pages\"".to_string(),
            ));
        }
    };

    let pages = l_pages
        .iter()
        .enumerate()
        .map(|(n_idx, page)| derive_page_extraction(page, n_idx + 1))
        .collect();

    Ok(SpecExtractionDocument {
        source: source.or(source_payload).map(ToString::to_string),
        pages,
    })
}

/// Build one page. `n_page` is 1-based and only used in warnings.
pub fn derive_page_extraction(value: &Value, n_page: usize) -> SpecPageExtraction {
    let mut page = SpecPageExtraction::default();
    let Some(dict_page) = value.as_object() else {
        page.warnings
            .push(format!("page {n_page}: not an object; skipped"));
        return page;
    };

    let l_tables = dict_page
        .get("tables")
        .and_then(Value::as_array)
        .filter(|l| !l.is_empty());

    match l_tables {
        Some(l_tables) => {
            for (n_idx, table) in l_tables.iter().enumerate() {
                let c_prefix = format!("page {n_page} table {}", n_idx + 1);
                let Some(dict_table) = table.as_object() else {
                    page.warnings.push(format!("{c_prefix}: not an object; skipped"));
                    continue;
                };
                page.blocks
                    .push(derive_table_block(dict_table, &c_prefix, &mut page.warnings));
            }
        }
        None => {
            let c_prefix = format!("page {n_page}");
            page.blocks
                .push(derive_table_block(dict_page, &c_prefix, &mut page.warnings));
        }
    }
    page
}

/// Build one table block from its `columns` / `rows` / `formatting` fields.
pub fn derive_table_block(
    dict_table: &Map<String, Value>,
    prefix: &str,
    warnings: &mut Vec<String>,
) -> SpecTableBlock {
    let mut l_warnings_block = Vec::new();

    let l_rows_raw: Vec<&Map<String, Value>> = match dict_table.get("rows") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(l_rows)) => l_rows
            .iter()
            .enumerate()
            .filter_map(|(n_idx, row)| {
                let dict_row = row.as_object();
                if dict_row.is_none() {
                    l_warnings_block.push(format!("row {n_idx} is not an object; dropped"));
                }
                dict_row
            })
            .collect(),
        Some(other) => {
            l_warnings_block.push(format!("rows is not an array ({other}); ignored"));
            Vec::new()
        }
    };

    let mut set_columns: IndexSet<String> = IndexSet::new();
    match dict_table.get("columns") {
        None | Some(Value::Null) => {}
        Some(Value::Array(l_cols)) => {
            for col in l_cols {
                match col {
                    Value::String(s) => {
                        set_columns.insert(s.clone());
                    }
                    Value::Null => l_warnings_block.push("null column name; dropped".to_string()),
                    other => {
                        set_columns.insert(other.to_string());
                    }
                }
            }
        }
        Some(other) => {
            l_warnings_block.push(format!("columns is not an array ({other}); ignored"));
        }
    }
    if set_columns.is_empty() {
        for dict_row in &l_rows_raw {
            set_columns.extend(dict_row.keys().cloned());
        }
    }
    let columns: Vec<String> = set_columns.into_iter().collect();

    let rows: Vec<SpecRow> = l_rows_raw
        .iter()
        .map(|dict_row| {
            columns
                .iter()
                .map(|c_col| {
                    let value = dict_row
                        .get(c_col)
                        .map(derive_cell_value_from_json)
                        .unwrap_or(EnumCellValue::None);
                    (c_col.clone(), value)
                })
                .collect()
        })
        .collect();

    let formatting = parse_page_formatting(
        dict_table.get("formatting"),
        rows.len(),
        columns.len(),
        &mut l_warnings_block,
    );

    warnings.extend(
        l_warnings_block
            .into_iter()
            .map(|c_warning| format!("{prefix}: {c_warning}")),
    );

    SpecTableBlock {
        columns,
        rows,
        formatting,
    }
}
