//! `tabkit_io_xlsx` v1:
//! Rust-side reconciliation and XLSX rendering kernel for scanned tables.
//!
//! Pipeline: payload -> page models -> combined model -> workbook bytes.
//! - `conf`       : constants and default presets
//! - `spec`       : specs/models/options/errors
//! - `util`       : pure helper functions
//! - `formatting` : lenient page formatting parser
//! - `payload`    : lenient page/document payload parser
//! - `reconcile`  : cross-page fold into combined row space
//! - `border`     : 16-entry border-style cache
//! - `report`     : export report model and builder
//! - `writer`     : pure-Rust workbook renderer
//! - `batch`      : parallel independent export jobs
pub mod batch;
pub mod border;
pub mod conf;
pub mod formatting;
pub mod payload;
pub mod reconcile;
pub mod report;
pub mod spec;
pub mod util;
pub mod writer;

pub use batch::{EnumExportJob, export_batch, run_export_job};
pub use border::BorderStyleCache;
pub use conf::{
    C_SHEET_NAME_DEFAULT, C_VALUE_NOT_FOUND, N_BORDER_STYLE_KEYS, N_LEN_EXCEL_SHEET_NAME_MAX,
    N_NCOLS_EXCEL_MAX, N_NROWS_EXCEL_MAX, N_ROWS_HEADER, TUP_EXCEL_ILLEGAL,
};
pub use formatting::parse_page_formatting;
pub use payload::{derive_extraction_document, derive_page_extraction, parse_extraction_document};
pub use reconcile::{combine_columns, reconcile_document, reconcile_formatting};
pub use report::{ReportExport, ReportExportBuilder};
pub use spec::{
    EnumAutofitColumnsRule, EnumCellValue, EnumDirectiveKind, EnumSkipReason, ExportXlsxError,
    SpaceCombined, SpacePage, SpecAutofitCellsPolicy, SpecBorderStyleKey, SpecCellBorder,
    SpecCellFormat, SpecCombinedExtraction, SpecCombinedFormatting, SpecExportArtifact,
    SpecExtractionDocument, SpecFormattingModel, SpecMergedCellRange, SpecPageExtraction,
    SpecPageFormatting, SpecRow, SpecSkippedDirective, SpecTableBlock, SpecXlsxExportOptions,
    SpecXlsxValuePolicy,
};
pub use util::sanitize_sheet_name;
pub use writer::{XlsxRenderer, write_artifact_to_path};
