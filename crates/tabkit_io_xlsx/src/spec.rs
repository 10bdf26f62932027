//! Shared specification models for page extraction, formatting and export.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::marker::PhantomData;
use std::path::PathBuf;

use indexmap::IndexMap;

use crate::conf::{
    C_SHEET_NAME_DEFAULT, C_VALUE_MISSING_DEFAULT, C_VALUE_NOT_FOUND,
    derive_default_header_format,
};
use crate::report::ReportExport;

////////////////////////////////////////////////////////////////////////////////
// #region CellValues

/// Normalized cell value during conversion/write pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum EnumCellValue {
    /// Missing/blank value.
    None,
    /// Text value.
    String(String),
    /// Numeric value.
    Number(f64),
}

impl EnumCellValue {
    /// Whether the collaborator flagged this cell as unreadable.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::String(s) if s == C_VALUE_NOT_FOUND)
    }
}

/// One extracted table row: column name to value, in extraction order.
pub type SpecRow = IndexMap<String, EnumCellValue>;

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region CellFormatSpecification

/// Cell format specification.
///
/// Border fields only carry presence; every present border is rendered thin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SpecCellFormat {
    /// Bold style.
    pub bold: Option<bool>,
    /// Italic style.
    pub italic: Option<bool>,
    /// Border on all sides.
    pub border: Option<bool>,
    /// Text wrap.
    pub text_wrap: Option<bool>,

    /// Top border override.
    pub top: Option<bool>,
    /// Bottom border override.
    pub bottom: Option<bool>,
    /// Left border override.
    pub left: Option<bool>,
    /// Right border override.
    pub right: Option<bool>,

    /// Number format code.
    pub num_format: Option<String>,
}

impl SpecCellFormat {
    /// Return a new format by overlaying `patch` onto `self`.
    pub fn with_(&self, patch: SpecCellFormat) -> SpecCellFormat {
        self.merge(&patch)
    }

    /// Merge two formats with right-side non-`None` overwrite semantics.
    pub fn merge(&self, other: &SpecCellFormat) -> SpecCellFormat {
        SpecCellFormat {
            bold: other.bold.or(self.bold),
            italic: other.italic.or(self.italic),
            border: other.border.or(self.border),
            text_wrap: other.text_wrap.or(self.text_wrap),
            top: other.top.or(self.top),
            bottom: other.bottom.or(self.bottom),
            left: other.left.or(self.left),
            right: other.right.or(self.right),
            num_format: other.num_format.clone().or_else(|| self.num_format.clone()),
        }
    }
}

/// Border presence for top/bottom/left/right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SpecCellBorder {
    /// Top border.
    pub top: bool,
    /// Bottom border.
    pub bottom: bool,
    /// Left border.
    pub left: bool,
    /// Right border.
    pub right: bool,
}

impl SpecCellBorder {
    /// Border on every side.
    pub fn all() -> Self {
        Self {
            top: true,
            bottom: true,
            left: true,
            right: true,
        }
    }

    /// Canonical cache key of this combination.
    pub fn key(&self) -> SpecBorderStyleKey {
        SpecBorderStyleKey::from_border(self)
    }
}

/// Canonical 4-bit encoding of a [`SpecCellBorder`].
///
/// Bits: top=1, bottom=2, left=4, right=8. Every value is in `0..16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SpecBorderStyleKey(u8);

impl SpecBorderStyleKey {
    const N_BIT_TOP: u8 = 0b0001;
    const N_BIT_BOTTOM: u8 = 0b0010;
    const N_BIT_LEFT: u8 = 0b0100;
    const N_BIT_RIGHT: u8 = 0b1000;

    /// Encode border flags.
    pub fn from_border(border: &SpecCellBorder) -> Self {
        let mut n_bits = 0u8;
        if border.top {
            n_bits |= Self::N_BIT_TOP;
        }
        if border.bottom {
            n_bits |= Self::N_BIT_BOTTOM;
        }
        if border.left {
            n_bits |= Self::N_BIT_LEFT;
        }
        if border.right {
            n_bits |= Self::N_BIT_RIGHT;
        }
        Self(n_bits)
    }

    /// Build from raw bits; only the low four bits are kept.
    pub fn from_bits(n_bits: u8) -> Self {
        Self(n_bits & 0b1111)
    }

    /// Table index in `0..16`.
    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    /// Decode back into border flags.
    pub fn to_border(self) -> SpecCellBorder {
        SpecCellBorder {
            top: self.0 & Self::N_BIT_TOP != 0,
            bottom: self.0 & Self::N_BIT_BOTTOM != 0,
            left: self.0 & Self::N_BIT_LEFT != 0,
            right: self.0 & Self::N_BIT_RIGHT != 0,
        }
    }

    /// All 16 keys in index order.
    pub fn all() -> impl Iterator<Item = SpecBorderStyleKey> {
        (0u8..16).map(Self)
    }
}

impl fmt::Display for SpecBorderStyleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let border = self.to_border();
        write!(
            f,
            "{},{},{},{}",
            border.top, border.bottom, border.left, border.right
        )
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region FormattingModel

/// Merged-cell range, inclusive on both ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecMergedCellRange {
    /// Start row index (inclusive).
    pub row_idx_start: usize,
    /// Start column index (inclusive).
    pub col_idx_start: usize,
    /// End row index (inclusive).
    pub row_idx_end: usize,
    /// End column index (inclusive).
    pub col_idx_end: usize,
    /// Merge display text.
    pub text: String,
}

impl SpecMergedCellRange {
    /// A one-cell range; legal, but nothing to merge.
    pub fn is_single_cell(&self) -> bool {
        self.row_idx_start == self.row_idx_end && self.col_idx_start == self.col_idx_end
    }

    /// Whether the two ranges share at least one cell.
    pub fn overlaps(&self, other: &SpecMergedCellRange) -> bool {
        self.row_idx_start <= other.row_idx_end
            && other.row_idx_start <= self.row_idx_end
            && self.col_idx_start <= other.col_idx_end
            && other.col_idx_start <= self.col_idx_end
    }

    /// Whether the range lies inside `[0, n_rows) x [0, n_cols)`.
    pub fn is_within(&self, n_rows: usize, n_cols: usize) -> bool {
        self.row_idx_start <= self.row_idx_end
            && self.col_idx_start <= self.col_idx_end
            && self.row_idx_end < n_rows
            && self.col_idx_end < n_cols
    }

    pub(crate) fn with_row_offset(&self, n_offset: usize) -> SpecMergedCellRange {
        SpecMergedCellRange {
            row_idx_start: self.row_idx_start + n_offset,
            row_idx_end: self.row_idx_end + n_offset,
            ..self.clone()
        }
    }
}

impl fmt::Display for SpecMergedCellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "merge rows {}..={} cols {}..={} {:?}",
            self.row_idx_start, self.row_idx_end, self.col_idx_start, self.col_idx_end, self.text
        )
    }
}

/// Coordinate-space marker: rows are local to one page/table block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpacePage;

/// Coordinate-space marker: rows index the combined row sequence of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpaceCombined;

/// Visual-structure metadata tagged with the coordinate space it lives in.
///
/// Use the [`SpecPageFormatting`] and [`SpecCombinedFormatting`] aliases.
/// Only [`crate::reconcile`] turns page models into a combined model.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecFormattingModel<S> {
    /// Merge ranges in insertion order.
    pub merged_cells: Vec<SpecMergedCellRange>,
    /// Border flags by `(row, col)`.
    pub cell_borders: BTreeMap<(usize, usize), SpecCellBorder>,
    /// Rows marked as header rows.
    pub header_rows: BTreeSet<usize>,
    /// Rows marked as total rows.
    pub total_rows: BTreeSet<usize>,
    /// Bold cells by `(row, col)`.
    pub bold_cells: BTreeSet<(usize, usize)>,
    /// Directives rejected while this model was parsed.
    pub dropped: Vec<SpecSkippedDirective>,
    space: PhantomData<S>,
}

/// Formatting with page-local row coordinates.
pub type SpecPageFormatting = SpecFormattingModel<SpacePage>;
/// Formatting with row coordinates in the combined row sequence.
pub type SpecCombinedFormatting = SpecFormattingModel<SpaceCombined>;

impl<S> SpecFormattingModel<S> {
    pub(crate) fn empty() -> Self {
        Self {
            merged_cells: Vec::new(),
            cell_borders: BTreeMap::new(),
            header_rows: BTreeSet::new(),
            total_rows: BTreeSet::new(),
            bold_cells: BTreeSet::new(),
            dropped: Vec::new(),
            space: PhantomData,
        }
    }

    /// Number of renderable merge/border/bold directives held.
    pub fn directive_count(&self) -> usize {
        self.merged_cells.len() + self.cell_borders.len() + self.bold_cells.len()
    }

    /// Whether the model holds nothing at all, dropped entries included.
    pub fn is_empty(&self) -> bool {
        self.directive_count() == 0
            && self.header_rows.is_empty()
            && self.total_rows.is_empty()
            && self.dropped.is_empty()
    }
}

impl Default for SpecPageFormatting {
    fn default() -> Self {
        Self::empty()
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Directives

/// Formatting directive category used for counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EnumDirectiveKind {
    /// One merged-cell range.
    Merge,
    /// One `cell_borders` entry.
    Border,
    /// One `bold_cells` coordinate.
    Bold,
}

impl EnumDirectiveKind {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Merge => "merge",
            Self::Border => "border",
            Self::Bold => "bold",
        }
    }
}

/// Why a directive was left out of the artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnumSkipReason {
    /// Structurally invalid entry.
    Malformed(String),
    /// Coordinates outside the sheet or page.
    OutOfBounds,
    /// Merge range overlapping an already applied range.
    Conflict,
}

impl fmt::Display for EnumSkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(msg) => write!(f, "malformed: {msg}"),
            Self::OutOfBounds => write!(f, "out of bounds"),
            Self::Conflict => write!(f, "overlaps an applied merge"),
        }
    }
}

/// One skipped directive with enough context to report it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecSkippedDirective {
    /// Directive category.
    pub kind: EnumDirectiveKind,
    /// Human-readable directive text.
    pub directive: String,
    /// Skip reason.
    pub reason: EnumSkipReason,
    /// Zero-based block ordinal for drops made while parsing a page.
    pub idx_block: Option<usize>,
}

impl fmt::Display for SpecSkippedDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.idx_block {
            Some(n_idx) => write!(
                f,
                "[{}] block {n_idx}: {} ({})",
                self.kind.as_str(),
                self.directive,
                self.reason
            ),
            None => write!(
                f,
                "[{}] {} ({})",
                self.kind.as_str(),
                self.directive,
                self.reason
            ),
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ExtractionModels

/// One table inside a page: its own rows, columns and formatting.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecTableBlock {
    /// Ordered unique column names.
    pub columns: Vec<String>,
    /// Extracted rows.
    pub rows: Vec<SpecRow>,
    /// Page-local formatting.
    pub formatting: SpecPageFormatting,
}

/// Extraction result for one page.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecPageExtraction {
    /// Table blocks in reading order.
    pub blocks: Vec<SpecTableBlock>,
    /// Non-fatal payload warnings.
    pub warnings: Vec<String>,
}

/// All pages of one source document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecExtractionDocument {
    /// Source label used for the optional source column.
    pub source: Option<String>,
    /// Pages in document order.
    pub pages: Vec<SpecPageExtraction>,
}

/// Pages of one document folded into one sheet-ready data set.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecCombinedExtraction {
    /// Source label used for the optional source column.
    pub source: Option<String>,
    /// Column-set union in first-seen order.
    pub columns: Vec<String>,
    /// All rows in page order.
    pub rows: Vec<SpecRow>,
    /// Formatting in combined row space.
    pub formatting: SpecCombinedFormatting,
    /// Page warnings carried forward.
    pub warnings: Vec<String>,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ExportOptions

/// Value conversion policy for missing values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecXlsxValuePolicy {
    /// Replacement text for missing value when keep-missing is enabled.
    pub missing_value_str: String,
}

impl Default for SpecXlsxValuePolicy {
    fn default() -> Self {
        Self {
            missing_value_str: C_VALUE_MISSING_DEFAULT.to_string(),
        }
    }
}

/// Autofit rule for column width inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumAutofitColumnsRule {
    /// Disable autofit.
    None,
    /// Infer width from header cells only.
    Header,
    /// Infer width from body cells only.
    Body,
    /// Infer width from both header and body cells (default).
    #[default]
    All,
}

/// Autofit policy for the rendered sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecAutofitCellsPolicy {
    /// Autofit width inference rule.
    pub rule_columns: EnumAutofitColumnsRule,
    /// Max body rows inspected when body-based inference is active.
    pub height_body_inferred_max: Option<usize>,
    /// Minimum final width.
    pub width_cell_min: usize,
    /// Maximum final width.
    pub width_cell_max: usize,
    /// Width padding added after inference.
    pub width_cell_padding: usize,
}

impl SpecAutofitCellsPolicy {
    /// Final width of one column from its recorded header/body widths.
    ///
    /// The result is `padding + recorded`, clamped into `[min, max]` with
    /// `min >= 1` and `max <= 255`.
    pub fn derive_column_width(&self, n_width_header: usize, n_width_body: usize) -> usize {
        let n_min = usize::max(1, self.width_cell_min);
        let n_max = usize::min(255, usize::max(n_min, self.width_cell_max));

        let n_width_recorded = match self.rule_columns {
            EnumAutofitColumnsRule::Header => n_width_header,
            EnumAutofitColumnsRule::Body => n_width_body,
            EnumAutofitColumnsRule::All | EnumAutofitColumnsRule::None => {
                usize::max(n_width_header, n_width_body)
            }
        };
        usize::min(n_max, usize::max(n_min, n_width_recorded + self.width_cell_padding))
    }
}

impl Default for SpecAutofitCellsPolicy {
    fn default() -> Self {
        Self {
            rule_columns: EnumAutofitColumnsRule::All,
            height_body_inferred_max: Some(20_000),
            width_cell_min: 1,
            width_cell_max: 50,
            width_cell_padding: 2,
        }
    }
}

/// Options for one rendered workbook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecXlsxExportOptions {
    /// Worksheet name; sanitized before use.
    pub sheet_name: String,
    /// Name of the trailing source column; `None` disables it.
    pub source_column: Option<String>,
    /// Write `value_policy.missing_value_str` instead of blanks.
    pub keep_missing_values: bool,
    /// Value conversion policy.
    pub value_policy: SpecXlsxValuePolicy,
    /// Column autofit policy.
    pub policy_autofit: SpecAutofitCellsPolicy,
    /// Freeze the header row.
    pub if_freeze_header: bool,
    /// Render `header_rows` / `total_rows` markers as bold rows.
    pub if_bold_marker_rows: bool,
    /// Base format for data cells.
    pub fmt_body: SpecCellFormat,
    /// Format for the header row and merged blocks.
    pub fmt_header: SpecCellFormat,
}

impl Default for SpecXlsxExportOptions {
    fn default() -> Self {
        Self {
            sheet_name: C_SHEET_NAME_DEFAULT.to_string(),
            source_column: None,
            keep_missing_values: false,
            value_policy: SpecXlsxValuePolicy::default(),
            policy_autofit: SpecAutofitCellsPolicy::default(),
            if_freeze_header: true,
            if_bold_marker_rows: false,
            fmt_body: SpecCellFormat::default(),
            fmt_header: derive_default_header_format(),
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ResultsAndErrors

/// Rendered workbook bytes plus the diagnostics of the run.
#[derive(Debug, Clone)]
pub struct SpecExportArtifact {
    /// XLSX file bytes.
    pub bytes: Vec<u8>,
    /// Applied/skipped directive counts and warnings.
    pub report: ReportExport,
}

/// Job-level failures. Directive-level problems never surface here.
#[derive(Debug, thiserror::Error)]
pub enum ExportXlsxError {
    /// Payload is not JSON or has no recognizable page structure.
    #[error("Invalid extraction payload: {0}")]
    InvalidPayload(String),
    /// Workbook could not be materialized.
    #[error("{0}")]
    ArtifactWrite(String),
    /// Workbook bytes could not be written to the destination.
    #[error("Failed to write artifact to {}: {message}", .path.display())]
    ArtifactDestination {
        /// Destination path.
        path: PathBuf,
        /// Underlying IO error text.
        message: String,
    },
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
