//! Spreadsheet renderer that turns a combined extraction into XLSX bytes.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use rust_xlsxwriter::{Format, Workbook, Worksheet};

use crate::border::BorderStyleCache;
use crate::conf::{N_NCOLS_EXCEL_MAX, N_NROWS_EXCEL_MAX, N_ROWS_HEADER};
use crate::report::ReportExportBuilder;
use crate::spec::{
    EnumAutofitColumnsRule, EnumCellValue, EnumDirectiveKind, EnumSkipReason, ExportXlsxError,
    SpecBorderStyleKey, SpecCombinedExtraction, SpecCombinedFormatting, SpecExportArtifact,
    SpecMergedCellRange, SpecXlsxExportOptions,
};
use crate::util::{
    cast_col_num, cast_row_num, convert_cell_value, derive_rust_xlsx_format,
    derive_xlsx_error_text, estimate_unicode_string_width, estimate_width_len,
    sanitize_sheet_name,
};

////////////////////////////////////////////////////////////////////////////////
// #region Renderer

/// Stateless workbook renderer.
///
/// Holds only immutable state (options and the border-style cache), so one
/// instance can serve many jobs, concurrently included.
#[derive(Debug, Clone)]
pub struct XlsxRenderer {
    options: SpecXlsxExportOptions,
    cache: BorderStyleCache,
    fmt_header: Format,
}

impl XlsxRenderer {
    /// Create renderer; the border-style cache is built here, before any job.
    pub fn new(options: SpecXlsxExportOptions) -> Self {
        let cache = BorderStyleCache::new(&options.fmt_body);
        let fmt_header = derive_rust_xlsx_format(&options.fmt_header);
        Self {
            options,
            cache,
            fmt_header,
        }
    }

    /// Render `combined` into in-memory XLSX bytes.
    ///
    /// Invalid formatting directives are skipped and reported; only a
    /// workbook that cannot be materialized fails.
    pub fn export_to_buffer(
        &self,
        combined: &SpecCombinedExtraction,
    ) -> Result<SpecExportArtifact, ExportXlsxError> {
        let n_rows = combined.rows.len();
        let n_cols_data = combined.columns.len();
        let n_cols_total = n_cols_data + usize::from(self.options.source_column.is_some());

        if n_rows + N_ROWS_HEADER > N_NROWS_EXCEL_MAX {
            return Err(ExportXlsxError::ArtifactWrite(format!(
                "Excel limit exceeded: {n_rows} data rows (max {}).",
                N_NROWS_EXCEL_MAX - N_ROWS_HEADER
            )));
        }
        if n_cols_total > N_NCOLS_EXCEL_MAX {
            return Err(ExportXlsxError::ArtifactWrite(format!(
                "Excel limit exceeded: {n_cols_total} columns (max {N_NCOLS_EXCEL_MAX})."
            )));
        }

        let mut builder = ReportExportBuilder::default();
        for c_warning in &combined.warnings {
            builder.add_warning(c_warning.clone());
        }
        builder.set_shape(n_rows, n_cols_total);

        let plan = plan_cell_styles(
            &combined.formatting,
            n_rows,
            n_cols_data,
            self.options.if_bold_marker_rows,
            &mut builder,
        );

        let bytes = self
            .write_workbook(combined, &plan, &mut builder)
            .map_err(ExportXlsxError::ArtifactWrite)?;

        let report = builder.build();
        log::debug!("rendered {} bytes: {report}", bytes.len());
        Ok(SpecExportArtifact { bytes, report })
    }

    /// Render `combined` and write it to `path_file_out`.
    ///
    /// The file only appears once the full workbook is on disk.
    pub fn export_to_path(
        &self,
        combined: &SpecCombinedExtraction,
        path_file_out: &Path,
    ) -> Result<SpecExportArtifact, ExportXlsxError> {
        let artifact = self.export_to_buffer(combined)?;
        write_artifact_to_path(&artifact.bytes, path_file_out)?;
        Ok(artifact)
    }

    fn write_workbook(
        &self,
        combined: &SpecCombinedExtraction,
        plan: &SpecCellStylePlan,
        builder: &mut ReportExportBuilder,
    ) -> Result<Vec<u8>, String> {
        let options = &self.options;
        let n_cols_data = combined.columns.len();

        let mut l_header: Vec<&str> = combined.columns.iter().map(String::as_str).collect();
        if let Some(c_source_column) = &options.source_column {
            l_header.push(c_source_column);
            if combined.source.is_none() {
                builder.add_warning(format!(
                    "source column {c_source_column:?} requested but the document has no source; left blank"
                ));
            }
        }
        let value_source = combined
            .source
            .as_ref()
            .map_or(EnumCellValue::None, |s| EnumCellValue::String(s.clone()));

        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet
            .set_name(sanitize_sheet_name(&options.sheet_name, "_"))
            .map_err(derive_xlsx_error_text)?;

        let if_autofit_columns = !matches!(
            options.policy_autofit.rule_columns,
            EnumAutofitColumnsRule::None
        );
        let mut l_width_by_col_header = vec![0usize; l_header.len()];
        let mut l_width_by_col_body = vec![0usize; l_header.len()];

        for (n_idx_col, c_name) in l_header.iter().enumerate() {
            worksheet
                .write_string_with_format(0, cast_col_num(n_idx_col)?, *c_name, &self.fmt_header)
                .map_err(derive_xlsx_error_text)?;
            l_width_by_col_header[n_idx_col] = estimate_unicode_string_width(c_name);
        }

        let n_rows_body_inferred_max = options
            .policy_autofit
            .height_body_inferred_max
            .unwrap_or(usize::MAX);

        for (n_idx_row, row) in combined.rows.iter().enumerate() {
            let n_row_display = n_idx_row + N_ROWS_HEADER;
            let if_infer_width = if_autofit_columns && n_idx_row < n_rows_body_inferred_max;

            for (n_idx_col, c_col) in combined.columns.iter().enumerate() {
                let value_raw = row.get(c_col).unwrap_or(&EnumCellValue::None);
                if value_raw.is_not_found() {
                    builder.add_cell_not_found();
                }
                let value = convert_cell_value(
                    value_raw,
                    options.keep_missing_values,
                    &options.value_policy,
                );

                let (key, if_bold) = plan.derive_cell_style(n_idx_row, n_idx_col);
                write_cell_with_format(
                    worksheet,
                    n_row_display,
                    n_idx_col,
                    &value,
                    self.cache.get_with_bold(key, if_bold),
                )?;

                if if_infer_width {
                    l_width_by_col_body[n_idx_col] =
                        usize::max(l_width_by_col_body[n_idx_col], estimate_width_len(&value));
                }
            }

            if options.source_column.is_some() {
                write_cell_with_format(
                    worksheet,
                    n_row_display,
                    n_cols_data,
                    &value_source,
                    self.cache.get(SpecBorderStyleKey::default()),
                )?;
                if if_infer_width {
                    l_width_by_col_body[n_cols_data] = usize::max(
                        l_width_by_col_body[n_cols_data],
                        estimate_width_len(&value_source),
                    );
                }
            }
        }

        // Merges go last so their label and style win over the cell writes.
        for merge in &plan.l_merges {
            worksheet
                .merge_range(
                    cast_row_num(merge.row_idx_start + N_ROWS_HEADER)?,
                    cast_col_num(merge.col_idx_start)?,
                    cast_row_num(merge.row_idx_end + N_ROWS_HEADER)?,
                    cast_col_num(merge.col_idx_end)?,
                    &merge.text,
                    &self.fmt_header,
                )
                .map_err(derive_xlsx_error_text)?;
        }

        if options.if_freeze_header {
            worksheet
                .set_freeze_panes(cast_row_num(N_ROWS_HEADER)?, 0)
                .map_err(derive_xlsx_error_text)?;
        }

        if if_autofit_columns {
            for n_idx_col in 0..l_header.len() {
                let n_width_final = options.policy_autofit.derive_column_width(
                    l_width_by_col_header[n_idx_col],
                    l_width_by_col_body[n_idx_col],
                );
                worksheet
                    .set_column_width(cast_col_num(n_idx_col)?, n_width_final as f64)
                    .map_err(derive_xlsx_error_text)?;
            }
        }

        workbook.save_to_buffer().map_err(derive_xlsx_error_text)
    }
}

/// Write artifact bytes to `path_file_out` through a sibling `.partial` file.
///
/// Either the complete file is renamed into place or nothing is left behind.
pub fn write_artifact_to_path(bytes: &[u8], path_file_out: &Path) -> Result<(), ExportXlsxError> {
    let derive_error = |err: std::io::Error| ExportXlsxError::ArtifactDestination {
        path: path_file_out.to_path_buf(),
        message: err.to_string(),
    };

    let Some(c_file_name) = path_file_out.file_name() else {
        return Err(ExportXlsxError::ArtifactDestination {
            path: path_file_out.to_path_buf(),
            message: "path has no file name".to_string(),
        });
    };
    let mut c_file_name_partial = c_file_name.to_os_string();
    c_file_name_partial.push(".partial");
    let path_file_partial: PathBuf = path_file_out.with_file_name(c_file_name_partial);

    fs::write(&path_file_partial, bytes).map_err(derive_error)?;
    if let Err(err) = fs::rename(&path_file_partial, path_file_out) {
        let _ = fs::remove_file(&path_file_partial);
        return Err(derive_error(err));
    }
    Ok(())
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region DirectivePlanning

/// Validated, renderable subset of a combined formatting model.
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct SpecCellStylePlan {
    /// Applied multi-cell merges in insertion order.
    pub(crate) l_merges: Vec<SpecMergedCellRange>,
    pub(crate) dict_border_keys: BTreeMap<(usize, usize), SpecBorderStyleKey>,
    pub(crate) set_bold_cells: BTreeSet<(usize, usize)>,
    /// Marker rows rendered bold; empty unless marker emphasis is on.
    pub(crate) set_bold_rows: BTreeSet<usize>,
}

impl SpecCellStylePlan {
    fn derive_cell_style(&self, n_row: usize, n_col: usize) -> (SpecBorderStyleKey, bool) {
        let key = self
            .dict_border_keys
            .get(&(n_row, n_col))
            .copied()
            .unwrap_or_default();
        let if_bold =
            self.set_bold_cells.contains(&(n_row, n_col)) || self.set_bold_rows.contains(&n_row);
        (key, if_bold)
    }
}

/// Validate every directive against the `n_rows x n_cols` data grid.
///
/// Parse-time drops are recorded first. Merges are checked in insertion
/// order against the merges already accepted; a one-cell range is accepted
/// but not merged. Borders and bold cells only need to be in bounds.
pub(crate) fn plan_cell_styles(
    formatting: &SpecCombinedFormatting,
    n_rows: usize,
    n_cols: usize,
    if_bold_marker_rows: bool,
    builder: &mut ReportExportBuilder,
) -> SpecCellStylePlan {
    for skipped in &formatting.dropped {
        builder.record_skipped(skipped.clone());
    }

    let mut l_merges: Vec<SpecMergedCellRange> = Vec::new();
    for merge in &formatting.merged_cells {
        let outcome = if !merge.is_within(n_rows, n_cols) {
            Err(EnumSkipReason::OutOfBounds)
        } else if l_merges.iter().any(|merge_applied| merge_applied.overlaps(merge)) {
            Err(EnumSkipReason::Conflict)
        } else {
            Ok(merge)
        };
        if let Some(merge) = builder.settle(EnumDirectiveKind::Merge, outcome, || merge.to_string())
            && !merge.is_single_cell()
        {
            l_merges.push(merge.clone());
        }
    }

    let mut dict_border_keys = BTreeMap::new();
    for (&(n_row, n_col), border) in &formatting.cell_borders {
        let outcome = if n_row < n_rows && n_col < n_cols {
            Ok(border.key())
        } else {
            Err(EnumSkipReason::OutOfBounds)
        };
        if let Some(key) = builder.settle(EnumDirectiveKind::Border, outcome, || {
            format!("border ({n_row}, {n_col}) {key}", key = border.key())
        }) {
            dict_border_keys.insert((n_row, n_col), key);
        }
    }

    let mut set_bold_cells = BTreeSet::new();
    for &(n_row, n_col) in &formatting.bold_cells {
        let outcome = if n_row < n_rows && n_col < n_cols {
            Ok((n_row, n_col))
        } else {
            Err(EnumSkipReason::OutOfBounds)
        };
        if let Some(tup_cell) = builder.settle(EnumDirectiveKind::Bold, outcome, || {
            format!("bold ({n_row}, {n_col})")
        }) {
            set_bold_cells.insert(tup_cell);
        }
    }

    let set_bold_rows = if if_bold_marker_rows {
        formatting
            .header_rows
            .iter()
            .chain(&formatting.total_rows)
            .copied()
            .filter(|n_row| *n_row < n_rows)
            .collect()
    } else {
        BTreeSet::new()
    };

    SpecCellStylePlan {
        l_merges,
        dict_border_keys,
        set_bold_cells,
        set_bold_rows,
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region CellWrites

fn write_cell_with_format(
    worksheet: &mut Worksheet,
    row_idx: usize,
    col_idx: usize,
    value: &EnumCellValue,
    format: &Format,
) -> Result<(), String> {
    match value {
        EnumCellValue::None => {
            worksheet
                .write_blank(cast_row_num(row_idx)?, cast_col_num(col_idx)?, format)
                .map_err(derive_xlsx_error_text)?;
        }
        EnumCellValue::String(val) => {
            worksheet
                .write_string_with_format(
                    cast_row_num(row_idx)?,
                    cast_col_num(col_idx)?,
                    val,
                    format,
                )
                .map_err(derive_xlsx_error_text)?;
        }
        EnumCellValue::Number(val) => {
            worksheet
                .write_number_with_format(
                    cast_row_num(row_idx)?,
                    cast_col_num(col_idx)?,
                    *val,
                    format,
                )
                .map_err(derive_xlsx_error_text)?;
        }
    }
    Ok(())
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read};
    use std::time::{SystemTime, UNIX_EPOCH};

    use quick_xml::Reader;
    use quick_xml::events::{BytesStart, Event};
    use quick_xml::name::QName;

    use super::*;
    use crate::payload::parse_extraction_document;
    use crate::reconcile::reconcile_document;
    use crate::spec::SpecCellBorder;

    struct TestDir {
        path: PathBuf,
    }

    impl TestDir {
        fn new() -> Self {
            let n = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos();
            let path = std::env::temp_dir().join(format!("tabkit_xlsx_test_{n}"));
            std::fs::create_dir_all(&path).expect("create test dir");
            Self { path }
        }

        fn path(&self) -> &Path {
            &self.path
        }
    }

    impl Drop for TestDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.path);
        }
    }

    fn read_zip_text(bytes: &[u8], name: &str) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).expect("open xlsx zip");
        let mut file = archive.by_name(name).expect("find zip entry");
        let mut txt = String::new();
        file.read_to_string(&mut txt).expect("read zip entry");
        txt
    }

    const TAG_CELL: QName = QName(b"c");
    const TAG_MERGE_CELL: QName = QName(b"mergeCell");
    const TAG_SHEET: QName = QName(b"sheet");
    const TAG_TEXT: QName = QName(b"t");
    const TAG_FORMAT_INDEXES: QName = QName(b"cellXfs");
    const TAG_FORMAT_INDEX: QName = QName(b"xf");
    const TAG_FONTS: QName = QName(b"fonts");
    const TAG_FONT: QName = QName(b"font");
    const TAG_BOLD: QName = QName(b"b");
    const TAG_BORDERS: QName = QName(b"borders");
    const TAG_BORDER: QName = QName(b"border");

    fn derive_xml_reader(xml: &str) -> Reader<&[u8]> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().expand_empty_elements = true;
        reader
    }

    fn derive_xml_attr(event: &BytesStart<'_>, name: &str) -> Option<String> {
        event
            .try_get_attribute(name)
            .expect("read xml attribute")
            .map(|attr| attr.unescape_value().expect("unescape xml attribute").into_owned())
    }

    fn derive_xml_index(event: &BytesStart<'_>, name: &str) -> usize {
        derive_xml_attr(event, name).map_or(0, |val| val.parse().expect("xml index"))
    }

    /// Values of `attr` on every `tag` element, in document order.
    fn derive_attr_values(xml: &str, tag: QName<'_>, attr: &str) -> Vec<String> {
        let mut reader = derive_xml_reader(xml);
        let mut l_values = Vec::new();
        loop {
            match reader.read_event().expect("read xml event") {
                Event::Start(event) if event.name() == tag => {
                    l_values.extend(derive_xml_attr(&event, attr));
                }
                Event::Eof => break,
                _ => {}
            }
        }
        l_values
    }

    /// Text of every `<t>` element, e.g. the shared-string table.
    fn derive_text_values(xml: &str) -> Vec<String> {
        let mut reader = derive_xml_reader(xml);
        let mut l_values = Vec::new();
        let mut if_text = false;
        loop {
            match reader.read_event().expect("read xml event") {
                Event::Start(event) if event.name() == TAG_TEXT => {
                    if_text = true;
                    l_values.push(String::new());
                }
                Event::End(event) if event.name() == TAG_TEXT => if_text = false,
                Event::Text(event) if if_text => {
                    if let Some(c_value) = l_values.last_mut() {
                        c_value.push_str(&event.xml_content().expect("decode xml text"));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }
        l_values
    }

    fn derive_cell_refs(bytes: &[u8]) -> BTreeSet<String> {
        let xml_sheet = read_zip_text(bytes, "xl/worksheets/sheet1.xml");
        derive_attr_values(&xml_sheet, TAG_CELL, "r").into_iter().collect()
    }

    fn derive_merge_refs(bytes: &[u8]) -> Vec<String> {
        let xml_sheet = read_zip_text(bytes, "xl/worksheets/sheet1.xml");
        derive_attr_values(&xml_sheet, TAG_MERGE_CELL, "ref")
    }

    fn derive_cell_xf_index(xml_sheet: &str, cell_ref: &str) -> usize {
        let mut reader = derive_xml_reader(xml_sheet);
        loop {
            match reader.read_event().expect("read sheet xml") {
                Event::Start(event)
                    if event.name() == TAG_CELL
                        && derive_xml_attr(&event, "r").as_deref() == Some(cell_ref) =>
                {
                    return derive_xml_index(&event, "s");
                }
                Event::Eof => panic!("cell {cell_ref} not found"),
                _ => {}
            }
        }
    }

    /// Cell formats (`fontId`, `borderId`), bold fonts and thin borders of a styles part.
    #[derive(Debug, Default)]
    struct SpecStylesXml {
        l_xfs: Vec<(usize, usize)>,
        l_font_bold: Vec<bool>,
        l_border_thin: Vec<bool>,
    }

    fn parse_styles_xml(xml_styles: &str) -> SpecStylesXml {
        let mut styles = SpecStylesXml::default();
        let mut reader = derive_xml_reader(xml_styles);
        let mut if_xfs = false;
        let mut if_fonts = false;
        let mut if_borders = false;

        loop {
            match reader.read_event().expect("read styles xml") {
                Event::Start(event) if event.name() == TAG_FORMAT_INDEXES => if_xfs = true,
                Event::End(event) if event.name() == TAG_FORMAT_INDEXES => if_xfs = false,
                Event::Start(event) if event.name() == TAG_FONTS => if_fonts = true,
                Event::End(event) if event.name() == TAG_FONTS => if_fonts = false,
                Event::Start(event) if event.name() == TAG_BORDERS => if_borders = true,
                Event::End(event) if event.name() == TAG_BORDERS => if_borders = false,

                Event::Start(event) if if_xfs && event.name() == TAG_FORMAT_INDEX => {
                    styles.l_xfs.push((
                        derive_xml_index(&event, "fontId"),
                        derive_xml_index(&event, "borderId"),
                    ));
                }
                Event::Start(event) if if_fonts && event.name() == TAG_FONT => {
                    styles.l_font_bold.push(false);
                }
                Event::Start(event) if if_fonts && event.name() == TAG_BOLD => {
                    if let Some(if_bold) = styles.l_font_bold.last_mut() {
                        *if_bold = true;
                    }
                }
                Event::Start(event) if if_borders && event.name() == TAG_BORDER => {
                    styles.l_border_thin.push(false);
                }
                Event::Start(event)
                    if if_borders && derive_xml_attr(&event, "style").as_deref() == Some("thin") =>
                {
                    if let Some(if_thin) = styles.l_border_thin.last_mut() {
                        *if_thin = true;
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }
        styles
    }

    /// `(is_bold, has_thin_border)` of the rendered cell at `cell_ref`.
    fn derive_cell_style(bytes: &[u8], cell_ref: &str) -> (bool, bool) {
        let n_xf = derive_cell_xf_index(
            &read_zip_text(bytes, "xl/worksheets/sheet1.xml"),
            cell_ref,
        );
        let styles = parse_styles_xml(&read_zip_text(bytes, "xl/styles.xml"));

        let (n_font, n_border) = styles.l_xfs[n_xf];
        (styles.l_font_bold[n_font], styles.l_border_thin[n_border])
    }

    fn render(payload_json: &str, options: SpecXlsxExportOptions) -> SpecExportArtifact {
        let document = parse_extraction_document(payload_json, None).expect("parse payload");
        XlsxRenderer::new(options)
            .export_to_buffer(&reconcile_document(document))
            .expect("render workbook")
    }

    fn payload_rows(n_rows: usize, formatting: &str) -> String {
        let l_rows: Vec<String> = (0..n_rows)
            .map(|n| format!(r#"{{"A": "a{n}", "B": {n}, "C": "c{n}"}}"#))
            .collect();
        format!(
            r#"[{{"columns": ["A", "B", "C"], "rows": [{}], "formatting": {formatting}}}]"#,
            l_rows.join(",")
        )
    }

    #[test]
    fn test_empty_formatting_renders_header_and_rows_only() {
        let artifact = render(&payload_rows(3, "null"), SpecXlsxExportOptions::default());
        let report = &artifact.report;

        assert_eq!(report.cnt_rows, 3);
        assert_eq!(report.cnt_columns, 3);
        assert_eq!(report.cnt_merges_applied + report.cnt_merges_skipped, 0);
        assert_eq!(report.cnt_borders_applied + report.cnt_borders_skipped, 0);
        assert_eq!(report.cnt_bold_applied + report.cnt_bold_skipped, 0);
        assert!(report.skipped.is_empty());

        let set_refs = derive_cell_refs(&artifact.bytes);
        assert!(set_refs.contains("A1"));
        assert!(set_refs.contains("C4"));
        assert!(!set_refs.contains("A5"));
        assert!(derive_merge_refs(&artifact.bytes).is_empty());
        assert_eq!(derive_cell_style(&artifact.bytes, "A1"), (true, true));
        assert_eq!(derive_cell_style(&artifact.bytes, "A2"), (false, false));
    }

    #[test]
    fn test_bold_and_border_compose_on_one_cell() {
        let artifact = render(
            &payload_rows(
                3,
                r#"{"cell_borders": {"1,1": {"top": true, "bottom": true, "left": true, "right": true}},
                    "bold_cells": [[1, 1]]}"#,
            ),
            SpecXlsxExportOptions::default(),
        );

        assert_eq!(artifact.report.cnt_borders_applied, 1);
        assert_eq!(artifact.report.cnt_bold_applied, 1);
        assert_eq!(derive_cell_style(&artifact.bytes, "B3"), (true, true));
        assert_eq!(derive_cell_style(&artifact.bytes, "B2"), (false, false));
    }

    #[test]
    fn test_out_of_bounds_bold_is_skipped_and_counted() {
        let artifact = render(
            &payload_rows(10, r#"{"bold_cells": [[-1, 0], [1000, 0], [9, 0]]}"#),
            SpecXlsxExportOptions::default(),
        );
        let report = &artifact.report;

        assert!(!artifact.bytes.is_empty());
        assert_eq!(report.cnt_bold_applied, 1);
        assert_eq!(report.cnt_bold_skipped, 2);
        assert!(
            report
                .skipped
                .iter()
                .all(|d| d.kind == EnumDirectiveKind::Bold && d.reason == EnumSkipReason::OutOfBounds)
        );
        assert_eq!(derive_cell_style(&artifact.bytes, "A11"), (true, false));
    }

    #[test]
    fn test_overlapping_merge_first_wins() {
        let artifact = render(
            &payload_rows(
                4,
                r#"{"merged_cells": [
                    {"start_row": 0, "start_col": 0, "end_row": 1, "end_col": 1, "value": "first"},
                    {"start_row": 1, "start_col": 1, "end_row": 2, "end_col": 2, "value": "second"}
                ]}"#,
            ),
            SpecXlsxExportOptions::default(),
        );
        let report = &artifact.report;

        assert_eq!(report.cnt_merges_applied, 1);
        assert_eq!(report.cnt_merges_skipped, 1);
        assert_eq!(report.skipped[0].reason, EnumSkipReason::Conflict);
        assert!(report.skipped[0].directive.contains("second"));

        assert_eq!(derive_merge_refs(&artifact.bytes), vec!["A2:B3"]);
    }

    #[test]
    fn test_merge_on_third_page_is_rebased_by_earlier_pages() {
        let derive_page = |n_rows: usize, formatting: &str| {
            let l_rows: Vec<String> = (0..n_rows)
                .map(|n| format!(r#"{{"A": {n}, "B": {n}}}"#))
                .collect();
            format!(
                r#"{{"columns": ["A", "B"], "rows": [{}], "formatting": {formatting}}}"#,
                l_rows.join(",")
            )
        };
        let c_payload = format!(
            "[{}, {}, {}]",
            derive_page(5, "null"),
            derive_page(3, "null"),
            derive_page(
                7,
                r#"{"merged_cells": [{"start_row": 0, "start_col": 0, "end_row": 0, "end_col": 1, "value": "Kokku"}]}"#
            )
        );

        let document = parse_extraction_document(&c_payload, None).expect("parse payload");
        let combined = reconcile_document(document);
        assert_eq!(combined.formatting.merged_cells[0].row_idx_start, 8);

        let artifact = XlsxRenderer::new(SpecXlsxExportOptions::default())
            .export_to_buffer(&combined)
            .expect("render workbook");

        assert_eq!(artifact.report.cnt_rows, 15);
        assert_eq!(artifact.report.cnt_merges_applied, 1);
        assert_eq!(derive_merge_refs(&artifact.bytes), vec!["A10:B10"]);
    }

    #[test]
    fn test_plan_handles_single_cell_and_out_of_bounds_merges() {
        let mut formatting = SpecCombinedFormatting::empty();
        formatting.merged_cells = vec![
            SpecMergedCellRange {
                row_idx_start: 0,
                col_idx_start: 0,
                row_idx_end: 0,
                col_idx_end: 0,
                text: "one".to_string(),
            },
            SpecMergedCellRange {
                row_idx_start: 0,
                col_idx_start: 0,
                row_idx_end: 1,
                col_idx_end: 1,
                text: "square".to_string(),
            },
            SpecMergedCellRange {
                row_idx_start: 4,
                col_idx_start: 0,
                row_idx_end: 5,
                col_idx_end: 0,
                text: "outside".to_string(),
            },
        ];
        formatting.cell_borders.insert((9, 0), SpecCellBorder::all());
        formatting.total_rows.insert(2);

        let mut builder = ReportExportBuilder::default();
        let plan = plan_cell_styles(&formatting, 5, 2, true, &mut builder);
        let report = builder.build();

        assert_eq!(plan.l_merges.len(), 1);
        assert_eq!(plan.l_merges[0].text, "square");
        assert_eq!(report.cnt_merges_applied, 2);
        assert_eq!(report.cnt_merges_skipped, 1);
        assert_eq!(report.cnt_borders_skipped, 1);
        assert_eq!(plan.derive_cell_style(2, 1), (SpecBorderStyleKey::default(), true));
        assert_eq!(plan.derive_cell_style(3, 1), (SpecBorderStyleKey::default(), false));
    }

    #[test]
    fn test_marker_rows_are_plain_by_default() {
        let mut formatting = SpecCombinedFormatting::empty();
        formatting.header_rows.insert(0);

        let mut builder = ReportExportBuilder::default();
        let plan = plan_cell_styles(&formatting, 3, 3, false, &mut builder);
        assert!(plan.set_bold_rows.is_empty());
        assert_eq!(builder.build(), Default::default());
    }

    #[test]
    fn test_source_column_and_missing_values() {
        let document = parse_extraction_document(
            r#"{"pages": [{"columns": ["A", "B"], "rows": [{"A": "UNREADABLE"}, {"A": "x", "B": 1}]}]}"#,
            Some("scan_01.pdf"),
        )
        .expect("parse payload");
        let combined = reconcile_document(document);
        let options = SpecXlsxExportOptions {
            source_column: Some("Allikas".to_string()),
            keep_missing_values: true,
            ..Default::default()
        };

        let artifact = XlsxRenderer::new(options)
            .export_to_buffer(&combined)
            .expect("render workbook");

        assert_eq!(artifact.report.cnt_columns, 3);
        assert_eq!(artifact.report.cnt_cells_not_found, 1);
        let l_strings = derive_text_values(&read_zip_text(&artifact.bytes, "xl/sharedStrings.xml"));
        for c_expected in ["Allikas", "scan_01.pdf", "UNREADABLE"] {
            assert!(l_strings.iter().any(|c| c == c_expected), "missing {c_expected}");
        }
        assert!(derive_cell_refs(&artifact.bytes).contains("C3"));
    }

    #[test]
    fn test_sheet_name_is_sanitized() {
        let options = SpecXlsxExportOptions {
            sheet_name: "Andmed/2024".to_string(),
            ..Default::default()
        };
        let artifact = render(&payload_rows(1, "{}"), options);
        let xml_workbook = read_zip_text(&artifact.bytes, "xl/workbook.xml");
        assert_eq!(
            derive_attr_values(&xml_workbook, TAG_SHEET, "name"),
            vec!["Andmed_2024"]
        );
    }

    #[test]
    fn test_excel_column_limit_is_an_artifact_error() {
        let combined = SpecCombinedExtraction {
            source: None,
            columns: (0..=N_NCOLS_EXCEL_MAX).map(|n| format!("c{n}")).collect(),
            rows: vec![],
            formatting: SpecCombinedFormatting::empty(),
            warnings: vec![],
        };
        let res = XlsxRenderer::new(SpecXlsxExportOptions::default()).export_to_buffer(&combined);
        assert!(matches!(res, Err(ExportXlsxError::ArtifactWrite(_))));
    }

    #[test]
    fn test_export_to_path_writes_complete_file() {
        let tmp = TestDir::new();
        let path_file_out = tmp.path().join("out.xlsx");
        let document = parse_extraction_document(&payload_rows(2, "{}"), None).expect("parse");

        let artifact = XlsxRenderer::new(SpecXlsxExportOptions::default())
            .export_to_path(&reconcile_document(document), &path_file_out)
            .expect("export to path");

        let bytes_on_disk = std::fs::read(&path_file_out).expect("read output");
        assert_eq!(bytes_on_disk, artifact.bytes);
        assert!(!tmp.path().join("out.xlsx.partial").exists());
    }

    #[test]
    fn test_export_to_missing_directory_is_destination_error() {
        let tmp = TestDir::new();
        let path_file_out = tmp.path().join("missing").join("out.xlsx");

        let res = write_artifact_to_path(b"xlsx", &path_file_out);

        assert!(matches!(
            res,
            Err(ExportXlsxError::ArtifactDestination { ref path, .. }) if path == &path_file_out
        ));
        assert!(!path_file_out.exists());
    }
}
