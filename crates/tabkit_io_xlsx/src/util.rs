//! Stateless helper utilities shared by the parser, reconciler and renderer.

use rust_xlsxwriter::{Format, FormatBorder, XlsxError};
use serde_json::Value;

use crate::conf::{C_SHEET_NAME_DEFAULT, N_LEN_EXCEL_SHEET_NAME_MAX, TUP_EXCEL_ILLEGAL};
use crate::spec::{EnumCellValue, SpecCellFormat, SpecXlsxValuePolicy};

////////////////////////////////////////////////////////////////////////////////
// #region WireValues

/// Parse a `"row,col"` border key into signed coordinates.
///
/// Whitespace around either part is tolerated. Sign is kept so that the
/// caller can report negative coordinates as out of bounds.
pub fn parse_cell_key(key: &str) -> Result<(i64, i64), String> {
    let mut l_parts = key.split(',');
    let (Some(c_row), Some(c_col), None) = (l_parts.next(), l_parts.next(), l_parts.next()) else {
        return Err(format!("cell key {key:?} is not \"row,col\""));
    };

    let n_row = c_row
        .trim()
        .parse::<i64>()
        .map_err(|_| format!("cell key {key:?} has non-integer row"))?;
    let n_col = c_col
        .trim()
        .parse::<i64>()
        .map_err(|_| format!("cell key {key:?} has non-integer column"))?;
    Ok((n_row, n_col))
}

/// Read a JSON integer index. Integral floats (`2.0`) are accepted.
pub fn derive_index_from_json(value: &Value) -> Result<i64, String> {
    if let Some(n) = value.as_i64() {
        return Ok(n);
    }
    if let Some(x) = value.as_f64()
        && x.is_finite()
        && x.fract() == 0.0
        && x.abs() < i64::MAX as f64
    {
        return Ok(x as i64);
    }
    Err(format!("{value} is not an integer index"))
}

/// Map a signed coordinate into `[0, n_len)`.
pub fn derive_bounded_index(value: i64, n_len: usize) -> Option<usize> {
    usize::try_from(value).ok().filter(|n| *n < n_len)
}

/// Normalize one wire scalar into a cell value.
///
/// Booleans become `True` / `False`; arrays and objects keep their JSON text.
pub fn derive_cell_value_from_json(value: &Value) -> EnumCellValue {
    match value {
        Value::Null => EnumCellValue::None,
        Value::String(s) => EnumCellValue::String(s.clone()),
        Value::Number(n) => match n.as_f64() {
            Some(x) if x.is_finite() => EnumCellValue::Number(x),
            _ => EnumCellValue::String(n.to_string()),
        },
        Value::Bool(b) => EnumCellValue::String(if *b { "True" } else { "False" }.to_string()),
        Value::Array(_) | Value::Object(_) => EnumCellValue::String(value.to_string()),
    }
}

/// Resolve the value actually written for one cell under the missing-value policy.
pub fn convert_cell_value(
    value: &EnumCellValue,
    if_keep_missing_values: bool,
    value_policy: &SpecXlsxValuePolicy,
) -> EnumCellValue {
    match value {
        EnumCellValue::None if if_keep_missing_values => {
            EnumCellValue::String(value_policy.missing_value_str.clone())
        }
        _ => value.clone(),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SheetNormalization

/// Replace invalid chars and trim to valid Excel sheet name.
pub fn sanitize_sheet_name(name: &str, replace_to: &str) -> String {
    let mut c_name = name.to_string();
    for c_illegal in TUP_EXCEL_ILLEGAL {
        c_name = c_name.replace(c_illegal, replace_to);
    }
    // Excel also rejects names wrapped in apostrophes.
    c_name = c_name.trim().trim_matches('\'').trim().to_string();
    if c_name.is_empty() {
        c_name = C_SHEET_NAME_DEFAULT.to_string();
    }

    c_name.chars().take(N_LEN_EXCEL_SHEET_NAME_MAX).collect()
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region WidthEstimation

/// Estimate displayed width units for one normalized cell value.
///
/// Used by autofit inference logic.
pub fn estimate_width_len(value: &EnumCellValue) -> usize {
    match value {
        EnumCellValue::None => 0,
        EnumCellValue::String(s) => estimate_unicode_string_width(s),
        EnumCellValue::Number(n) => {
            if n.fract() == 0.0 && n.abs() < 1e15 {
                (*n as i64).to_string().len()
            } else {
                n.to_string().len()
            }
        }
    }
}

/// Width of text where non-ASCII glyphs count as 1.6 units.
pub fn estimate_unicode_string_width(s: &str) -> usize {
    let n_ascii = s.chars().filter(|chr| chr.is_ascii()).count();
    let n_non_ascii = s.chars().count().saturating_sub(n_ascii);
    n_ascii + (n_non_ascii as f64 * 1.6).round() as usize
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region XlsxAdapters

/// Build a `rust_xlsxwriter` format from a cell format specification.
///
/// Any present border flag becomes a thin border.
pub fn derive_rust_xlsx_format(spec: &SpecCellFormat) -> Format {
    let mut format = Format::new();

    if spec.bold.unwrap_or(false) {
        format = format.set_bold();
    }
    if spec.italic.unwrap_or(false) {
        format = format.set_italic();
    }
    if let Some(val) = &spec.num_format {
        format = format.set_num_format(val.clone());
    }

    if spec.border.unwrap_or(false) {
        format = format.set_border(FormatBorder::Thin);
    }
    if spec.top.unwrap_or(false) {
        format = format.set_border_top(FormatBorder::Thin);
    }
    if spec.bottom.unwrap_or(false) {
        format = format.set_border_bottom(FormatBorder::Thin);
    }
    if spec.left.unwrap_or(false) {
        format = format.set_border_left(FormatBorder::Thin);
    }
    if spec.right.unwrap_or(false) {
        format = format.set_border_right(FormatBorder::Thin);
    }

    if spec.text_wrap.unwrap_or(false) {
        format = format.set_text_wrap();
    }

    format
}

pub(crate) fn cast_row_num(value: usize) -> Result<u32, String> {
    u32::try_from(value).map_err(|_| format!("row index overflow: {value}"))
}

pub(crate) fn cast_col_num(value: usize) -> Result<u16, String> {
    u16::try_from(value).map_err(|_| format!("column index overflow: {value}"))
}

pub(crate) fn derive_xlsx_error_text(err: XlsxError) -> String {
    format!("xlsx write error: {err}")
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Workers

/// Resolve the worker count for a batch.
///
/// Explicit values are clamped to `[1, n_cpu]`; the default is `min(n_cpu, 8)`.
pub fn calculate_worker_limit(num_workers_max: Option<usize>) -> usize {
    let n_cpu = std::thread::available_parallelism()
        .map(|v| v.get())
        .unwrap_or(1);

    match num_workers_max {
        Some(n) => n.clamp(1, n_cpu),
        None => n_cpu.clamp(1, 8),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_cell_key_accepts_padded_and_rejects_garbage() {
        assert_eq!(parse_cell_key("2,3"), Ok((2, 3)));
        assert_eq!(parse_cell_key(" 4 , 0 "), Ok((4, 0)));
        assert_eq!(parse_cell_key("-1,0"), Ok((-1, 0)));
        assert!(parse_cell_key("2").is_err());
        assert!(parse_cell_key("2,3,4").is_err());
        assert!(parse_cell_key("a,b").is_err());
        assert!(parse_cell_key("1.5,2").is_err());
    }

    #[test]
    fn test_derive_index_from_json_accepts_integral_floats_only() {
        assert_eq!(derive_index_from_json(&json!(3)), Ok(3));
        assert_eq!(derive_index_from_json(&json!(2.0)), Ok(2));
        assert_eq!(derive_index_from_json(&json!(-1)), Ok(-1));
        assert!(derive_index_from_json(&json!(2.5)).is_err());
        assert!(derive_index_from_json(&json!("2")).is_err());
        assert!(derive_index_from_json(&Value::Null).is_err());
    }

    #[test]
    fn test_derive_bounded_index() {
        assert_eq!(derive_bounded_index(0, 10), Some(0));
        assert_eq!(derive_bounded_index(9, 10), Some(9));
        assert_eq!(derive_bounded_index(10, 10), None);
        assert_eq!(derive_bounded_index(-1, 10), None);
    }

    #[test]
    fn test_derive_cell_value_from_json_normalizes_scalars() {
        assert_eq!(derive_cell_value_from_json(&Value::Null), EnumCellValue::None);
        assert_eq!(
            derive_cell_value_from_json(&json!(12.5)),
            EnumCellValue::Number(12.5)
        );
        assert_eq!(
            derive_cell_value_from_json(&json!(true)),
            EnumCellValue::String("True".to_string())
        );
        assert_eq!(
            derive_cell_value_from_json(&json!([1, 2])),
            EnumCellValue::String("[1,2]".to_string())
        );
    }

    #[test]
    fn test_convert_cell_value_respects_keep_missing() {
        let value_policy = SpecXlsxValuePolicy {
            missing_value_str: "-".to_string(),
        };
        assert_eq!(
            convert_cell_value(&EnumCellValue::None, true, &value_policy),
            EnumCellValue::String("-".to_string())
        );
        assert_eq!(
            convert_cell_value(&EnumCellValue::None, false, &value_policy),
            EnumCellValue::None
        );
        assert_eq!(
            convert_cell_value(&EnumCellValue::Number(1.0), true, &value_policy),
            EnumCellValue::Number(1.0)
        );
    }

    #[test]
    fn test_sanitize_sheet_name() {
        assert_eq!(sanitize_sheet_name("a/b:c", "_"), "a_b_c");
        assert_eq!(sanitize_sheet_name("  ", "_"), "Data");
        assert_eq!(sanitize_sheet_name("'quoted'", "_"), "quoted");
        assert_eq!(sanitize_sheet_name(&"x".repeat(40), "_").len(), 31);
    }

    #[test]
    fn test_estimate_width_len() {
        assert_eq!(estimate_width_len(&EnumCellValue::None), 0);
        assert_eq!(estimate_width_len(&EnumCellValue::Number(1200.0)), 4);
        assert_eq!(estimate_width_len(&EnumCellValue::Number(1.25)), 4);
        assert_eq!(
            estimate_width_len(&EnumCellValue::String("Summa".to_string())),
            5
        );
        // 3 ascii + 2 non-ascii (2 * 1.6 = 3.2 -> 3)
        assert_eq!(estimate_unicode_string_width("abcöä"), 6);
    }

    #[test]
    fn test_calculate_worker_limit_bounds() {
        let n_cpu = std::thread::available_parallelism()
            .map(|v| v.get())
            .unwrap_or(1);
        assert_eq!(calculate_worker_limit(Some(0)), 1);
        assert_eq!(calculate_worker_limit(Some(usize::MAX)), n_cpu);
        assert_eq!(calculate_worker_limit(None), n_cpu.clamp(1, 8));
    }
}
