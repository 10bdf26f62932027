//! Export constants and default preset factories.

use std::collections::BTreeMap;

use crate::spec::{SpecCellFormat, SpecXlsxExportOptions};

/// Excel worksheet maximum row count.
pub const N_NROWS_EXCEL_MAX: usize = 1_048_576;
/// Excel worksheet maximum column count.
pub const N_NCOLS_EXCEL_MAX: usize = 16_384;
/// Excel sheet name maximum length.
pub const N_LEN_EXCEL_SHEET_NAME_MAX: usize = 31;
/// Characters not allowed in sheet names.
pub const TUP_EXCEL_ILLEGAL: [&str; 7] = ["*", ":", "?", "/", "\\", "[", "]"];

/// Rows occupied by the header above the first data row.
pub const N_ROWS_HEADER: usize = 1;
/// Number of distinct top/bottom/left/right border combinations.
pub const N_BORDER_STYLE_KEYS: usize = 16;

/// Sheet name used when the caller does not pick one.
pub const C_SHEET_NAME_DEFAULT: &str = "Data";
/// Marker the extraction collaborator writes for cells it could not read.
pub const C_VALUE_NOT_FOUND: &str = "UNREADABLE";
/// Text written for missing values when keep-missing is enabled.
pub const C_VALUE_MISSING_DEFAULT: &str = "";

/// Build default named format presets used by [`crate::writer::XlsxRenderer`].
///
/// - `body`: data cells; borders come only from formatting directives.
/// - `header`: the column-name row and merged blocks.
pub fn derive_default_xlsx_formats() -> BTreeMap<String, SpecCellFormat> {
    let mut dict_fmt = BTreeMap::new();
    dict_fmt.insert("body".to_string(), SpecCellFormat::default());
    dict_fmt.insert("header".to_string(), derive_default_header_format());
    dict_fmt
}

/// Bold text with a thin border on every side.
pub fn derive_default_header_format() -> SpecCellFormat {
    SpecCellFormat {
        bold: Some(true),
        border: Some(true),
        ..Default::default()
    }
}

/// Build default export options.
pub fn derive_default_xlsx_export_options() -> SpecXlsxExportOptions {
    SpecXlsxExportOptions::default()
}
