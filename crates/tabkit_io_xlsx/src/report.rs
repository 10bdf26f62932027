//! Export report models and mutable report builder.

use std::collections::BTreeMap;
use std::fmt;

use crate::spec::{EnumDirectiveKind, EnumSkipReason, SpecSkippedDirective};

/// Aggregate counters and diagnostics for one rendered workbook.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReportExport {
    /// Data rows written below the header.
    pub cnt_rows: u64,
    /// Columns written, source column included.
    pub cnt_columns: u64,
    /// Merge ranges applied.
    pub cnt_merges_applied: u64,
    /// Merge ranges skipped.
    pub cnt_merges_skipped: u64,
    /// Border entries applied.
    pub cnt_borders_applied: u64,
    /// Border entries skipped.
    pub cnt_borders_skipped: u64,
    /// Bold cells applied.
    pub cnt_bold_applied: u64,
    /// Bold cells skipped.
    pub cnt_bold_skipped: u64,
    /// Cells carrying the not-found sentinel.
    pub cnt_cells_not_found: u64,
    /// Non-fatal warnings collected while parsing or rendering.
    pub warnings: Vec<String>,
    /// Every skipped directive, parse-time drops first.
    pub skipped: Vec<SpecSkippedDirective>,
}

impl ReportExport {
    /// Number of skipped directives of every kind.
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    /// Number of collected warnings.
    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    /// Machine-readable counters.
    pub fn to_dict(&self) -> BTreeMap<String, u64> {
        let mut dict_counts = BTreeMap::new();
        dict_counts.insert("cnt_rows".to_string(), self.cnt_rows);
        dict_counts.insert("cnt_columns".to_string(), self.cnt_columns);
        dict_counts.insert("cnt_merges_applied".to_string(), self.cnt_merges_applied);
        dict_counts.insert("cnt_merges_skipped".to_string(), self.cnt_merges_skipped);
        dict_counts.insert("cnt_borders_applied".to_string(), self.cnt_borders_applied);
        dict_counts.insert("cnt_borders_skipped".to_string(), self.cnt_borders_skipped);
        dict_counts.insert("cnt_bold_applied".to_string(), self.cnt_bold_applied);
        dict_counts.insert("cnt_bold_skipped".to_string(), self.cnt_bold_skipped);
        dict_counts.insert("cnt_cells_not_found".to_string(), self.cnt_cells_not_found);
        dict_counts.insert("cnt_warnings".to_string(), self.warning_count() as u64);
        dict_counts
    }

    /// Human-readable one-line summary.
    pub fn format(&self, prefix: &str) -> String {
        let dict_counts = self.to_dict();
        format!(
            "{prefix} rows={} columns={} merges={}/{} borders={}/{} bold={}/{} not_found={} warnings={}",
            dict_counts["cnt_rows"],
            dict_counts["cnt_columns"],
            dict_counts["cnt_merges_applied"],
            dict_counts["cnt_merges_skipped"],
            dict_counts["cnt_borders_applied"],
            dict_counts["cnt_borders_skipped"],
            dict_counts["cnt_bold_applied"],
            dict_counts["cnt_bold_skipped"],
            dict_counts["cnt_cells_not_found"],
            dict_counts["cnt_warnings"]
        )
    }
}

impl fmt::Display for ReportExport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format("[XLSX]"))
    }
}

/// Mutable accumulator for export statistics.
#[derive(Debug, Default, Clone)]
pub struct ReportExportBuilder {
    report: ReportExport,
}

impl ReportExportBuilder {
    /// Apply-or-record: pass `Ok` values through and count them as applied;
    /// record `Err` reasons as skipped directives.
    ///
    /// `describe` is only called for skipped directives.
    pub fn settle<T>(
        &mut self,
        kind: EnumDirectiveKind,
        outcome: Result<T, EnumSkipReason>,
        describe: impl FnOnce() -> String,
    ) -> Option<T> {
        match outcome {
            Ok(val) => {
                *self.derive_counter(kind, true) += 1;
                Some(val)
            }
            Err(reason) => {
                self.record_skipped(SpecSkippedDirective {
                    kind,
                    directive: describe(),
                    reason,
                    idx_block: None,
                });
                None
            }
        }
    }

    /// Count one directive dropped earlier, e.g. while its page was parsed.
    pub fn record_skipped(&mut self, skipped: SpecSkippedDirective) {
        log::debug!("skipped formatting directive {skipped}");
        *self.derive_counter(skipped.kind, false) += 1;
        self.report.skipped.push(skipped);
    }

    /// Add warning message.
    pub fn add_warning(&mut self, warning: String) {
        self.report.warnings.push(warning);
    }

    /// Set the written sheet shape.
    pub fn set_shape(&mut self, n_rows: usize, n_cols: usize) {
        self.report.cnt_rows = n_rows as u64;
        self.report.cnt_columns = n_cols as u64;
    }

    /// Increment not-found count by one.
    pub fn add_cell_not_found(&mut self) {
        self.report.cnt_cells_not_found += 1;
    }

    /// Finalize builder into immutable report.
    pub fn build(self) -> ReportExport {
        self.report
    }

    fn derive_counter(&mut self, kind: EnumDirectiveKind, if_applied: bool) -> &mut u64 {
        let report = &mut self.report;
        match (kind, if_applied) {
            (EnumDirectiveKind::Merge, true) => &mut report.cnt_merges_applied,
            (EnumDirectiveKind::Merge, false) => &mut report.cnt_merges_skipped,
            (EnumDirectiveKind::Border, true) => &mut report.cnt_borders_applied,
            (EnumDirectiveKind::Border, false) => &mut report.cnt_borders_skipped,
            (EnumDirectiveKind::Bold, true) => &mut report.cnt_bold_applied,
            (EnumDirectiveKind::Bold, false) => &mut report.cnt_bold_skipped,
        }
    }
}
