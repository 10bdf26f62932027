use std::collections::BTreeMap;
use std::path::PathBuf;

use pyo3::exceptions::{PyOSError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyAny, PyBytes};
use tabkit_io_xlsx::conf::{derive_default_xlsx_export_options, derive_default_xlsx_formats};
use tabkit_io_xlsx::{
    EnumExportJob, ExportXlsxError, ReportExport, SpecCellFormat, SpecExportArtifact,
    SpecSkippedDirective, SpecXlsxExportOptions, XlsxRenderer, export_batch,
    parse_extraction_document, reconcile_document,
};

const N_BRIDGE_ABI_VERSION: u64 = 1;
const C_BRIDGE_CONTRACT_VERSION: &str = "tabkit.xlsx.export.v1";
const C_BRIDGE_TRANSPORT: &str = "rust_native";

#[pyclass(name = "SkippedDirective")]
#[derive(Debug, Clone)]
struct PySpecSkippedDirective {
    #[pyo3(get)]
    kind: String,
    #[pyo3(get)]
    directive: String,
    #[pyo3(get)]
    reason: String,
    #[pyo3(get)]
    idx_block: Option<usize>,
}

impl From<SpecSkippedDirective> for PySpecSkippedDirective {
    fn from(skipped: SpecSkippedDirective) -> Self {
        Self {
            kind: skipped.kind.as_str().to_string(),
            directive: skipped.directive,
            reason: skipped.reason.to_string(),
            idx_block: skipped.idx_block,
        }
    }
}

#[pymethods]
impl PySpecSkippedDirective {
    fn __repr__(&self) -> String {
        format!(
            "SkippedDirective(kind={:?}, directive={:?}, reason={:?})",
            self.kind, self.directive, self.reason
        )
    }
}

#[pyclass(name = "ReportExport")]
#[derive(Debug, Clone)]
struct PyReportExport {
    inner: ReportExport,
    #[pyo3(get)]
    cnt_rows: u64,
    #[pyo3(get)]
    cnt_columns: u64,
    #[pyo3(get)]
    cnt_merges_applied: u64,
    #[pyo3(get)]
    cnt_merges_skipped: u64,
    #[pyo3(get)]
    cnt_borders_applied: u64,
    #[pyo3(get)]
    cnt_borders_skipped: u64,
    #[pyo3(get)]
    cnt_bold_applied: u64,
    #[pyo3(get)]
    cnt_bold_skipped: u64,
    #[pyo3(get)]
    cnt_cells_not_found: u64,
    #[pyo3(get)]
    warnings: Vec<String>,
    #[pyo3(get)]
    skipped: Vec<PySpecSkippedDirective>,
}

impl From<ReportExport> for PyReportExport {
    fn from(report: ReportExport) -> Self {
        Self {
            cnt_rows: report.cnt_rows,
            cnt_columns: report.cnt_columns,
            cnt_merges_applied: report.cnt_merges_applied,
            cnt_merges_skipped: report.cnt_merges_skipped,
            cnt_borders_applied: report.cnt_borders_applied,
            cnt_borders_skipped: report.cnt_borders_skipped,
            cnt_bold_applied: report.cnt_bold_applied,
            cnt_bold_skipped: report.cnt_bold_skipped,
            cnt_cells_not_found: report.cnt_cells_not_found,
            warnings: report.warnings.clone(),
            skipped: report
                .skipped
                .iter()
                .cloned()
                .map(PySpecSkippedDirective::from)
                .collect(),
            inner: report,
        }
    }
}

#[pymethods]
impl PyReportExport {
    #[getter]
    fn skipped_count(&self) -> usize {
        self.inner.skipped_count()
    }

    #[getter]
    fn warning_count(&self) -> usize {
        self.inner.warning_count()
    }

    fn to_dict(&self) -> BTreeMap<String, u64> {
        self.inner.to_dict()
    }

    #[pyo3(signature = (prefix = "[XLSX]"))]
    fn format(&self, prefix: &str) -> String {
        self.inner.format(prefix)
    }

    fn __str__(&self) -> String {
        self.inner.to_string()
    }
}

fn map_export_xlsx_error(exception: ExportXlsxError) -> PyErr {
    match exception {
        ExportXlsxError::InvalidPayload(_) => PyValueError::new_err(exception.to_string()),
        ExportXlsxError::ArtifactWrite(_) | ExportXlsxError::ArtifactDestination { .. } => {
            PyOSError::new_err(exception.to_string())
        }
    }
}

fn derive_preset_format(name: &str) -> PyResult<SpecCellFormat> {
    derive_default_xlsx_formats()
        .get(name)
        .cloned()
        .ok_or_else(|| PyValueError::new_err(format!("Missing default format: {name}")))
}

fn parse_spec_cell_format(obj: Option<&Bound<'_, PyAny>>) -> PyResult<Option<SpecCellFormat>> {
    let Some(obj) = obj else {
        return Ok(None);
    };
    if obj.is_none() {
        return Ok(None);
    }

    Ok(Some(SpecCellFormat {
        bold: extract_optional_attr::<bool>(obj, "bold")?,
        italic: extract_optional_attr::<bool>(obj, "italic")?,
        border: extract_optional_attr::<bool>(obj, "border")?,
        text_wrap: extract_optional_attr::<bool>(obj, "text_wrap")?,
        top: extract_optional_attr::<bool>(obj, "top")?,
        bottom: extract_optional_attr::<bool>(obj, "bottom")?,
        left: extract_optional_attr::<bool>(obj, "left")?,
        right: extract_optional_attr::<bool>(obj, "right")?,
        num_format: extract_optional_attr::<String>(obj, "num_format")?,
    }))
}

fn extract_optional_attr<T>(obj: &Bound<'_, PyAny>, attr: &str) -> PyResult<Option<T>>
where
    for<'a> T: FromPyObject<'a>,
{
    if !obj.hasattr(attr)? {
        return Ok(None);
    }
    let val = obj.getattr(attr)?;
    if val.is_none() {
        return Ok(None);
    }
    Ok(Some(val.extract::<T>()?))
}

fn derive_export_options(
    sheet_name: &str,
    source_column: Option<String>,
    keep_missing_values: bool,
    if_bold_marker_rows: bool,
    fmt_body: Option<&Bound<'_, PyAny>>,
    fmt_header: Option<&Bound<'_, PyAny>>,
) -> PyResult<SpecXlsxExportOptions> {
    let cfg_fmt_body_default = derive_preset_format("body")?;
    let cfg_fmt_header_default = derive_preset_format("header")?;

    Ok(SpecXlsxExportOptions {
        sheet_name: sheet_name.to_string(),
        source_column,
        keep_missing_values,
        if_bold_marker_rows,
        fmt_body: parse_spec_cell_format(fmt_body)?.unwrap_or(cfg_fmt_body_default),
        fmt_header: parse_spec_cell_format(fmt_header)?.unwrap_or(cfg_fmt_header_default),
        ..derive_default_xlsx_export_options()
    })
}

fn derive_py_artifact(
    py: Python<'_>,
    artifact: SpecExportArtifact,
) -> (Py<PyBytes>, PyReportExport) {
    let SpecExportArtifact { bytes, report } = artifact;
    (
        PyBytes::new(py, &bytes).unbind(),
        PyReportExport::from(report),
    )
}

#[pyfunction(name = "export_xlsx")]
#[pyo3(signature = (
    payload_json,
    file_out = None,
    sheet_name = "Data",
    source = None,
    source_column = None,
    keep_missing_values = false,
    if_bold_marker_rows = false,
    fmt_body = None,
    fmt_header = None
))]
#[allow(clippy::too_many_arguments)]
fn export_xlsx_py(
    py: Python<'_>,
    payload_json: String,
    file_out: Option<String>,
    sheet_name: &str,
    source: Option<String>,
    source_column: Option<String>,
    keep_missing_values: bool,
    if_bold_marker_rows: bool,
    fmt_body: Option<&Bound<'_, PyAny>>,
    fmt_header: Option<&Bound<'_, PyAny>>,
) -> PyResult<(Py<PyBytes>, PyReportExport)> {
    let cfg_options = derive_export_options(
        sheet_name,
        source_column,
        keep_missing_values,
        if_bold_marker_rows,
        fmt_body,
        fmt_header,
    )?;

    let artifact = py.allow_threads(|| {
        let renderer = XlsxRenderer::new(cfg_options);
        let document = parse_extraction_document(&payload_json, source.as_deref())?;
        let combined = reconcile_document(document);
        match file_out {
            Some(file_out) => renderer.export_to_path(&combined, &PathBuf::from(file_out)),
            None => renderer.export_to_buffer(&combined),
        }
    });
    let artifact = artifact.map_err(map_export_xlsx_error)?;
    Ok(derive_py_artifact(py, artifact))
}

type TupBatchItem = (Option<Py<PyBytes>>, Option<PyReportExport>, Option<String>);

#[pyfunction(name = "export_xlsx_batch")]
#[pyo3(signature = (
    payloads_json,
    sources = None,
    sheet_name = "Data",
    source_column = None,
    keep_missing_values = false,
    if_bold_marker_rows = false,
    fmt_body = None,
    fmt_header = None,
    num_workers_max = None
))]
#[allow(clippy::too_many_arguments)]
fn export_xlsx_batch_py(
    py: Python<'_>,
    payloads_json: Vec<String>,
    sources: Option<Vec<Option<String>>>,
    sheet_name: &str,
    source_column: Option<String>,
    keep_missing_values: bool,
    if_bold_marker_rows: bool,
    fmt_body: Option<&Bound<'_, PyAny>>,
    fmt_header: Option<&Bound<'_, PyAny>>,
    num_workers_max: Option<usize>,
) -> PyResult<Vec<TupBatchItem>> {
    let l_sources = match sources {
        Some(l_sources) if l_sources.len() != payloads_json.len() => {
            return Err(PyValueError::new_err(format!(
                "sources has {} entries but payloads_json has {}.",
                l_sources.len(),
                payloads_json.len()
            )));
        }
        Some(l_sources) => l_sources,
        None => vec![None; payloads_json.len()],
    };
    let cfg_options = derive_export_options(
        sheet_name,
        source_column,
        keep_missing_values,
        if_bold_marker_rows,
        fmt_body,
        fmt_header,
    )?;

    let l_jobs: Vec<EnumExportJob> = payloads_json
        .into_iter()
        .zip(l_sources)
        .map(|(payload_json, source)| EnumExportJob::Payload {
            payload_json,
            source,
        })
        .collect();

    let l_results = py.allow_threads(|| {
        let renderer = XlsxRenderer::new(cfg_options);
        export_batch(l_jobs, &renderer, num_workers_max)
    });

    Ok(l_results
        .into_iter()
        .map(|res| match res {
            Ok(artifact) => {
                let (bytes, report) = derive_py_artifact(py, artifact);
                (Some(bytes), Some(report), None)
            }
            Err(err) => (None, None, Some(err.to_string())),
        })
        .collect())
}

#[pymodule]
fn _tabkit_io_xlsx_rs(module: &Bound<'_, PyModule>) -> PyResult<()> {
    module.add_class::<PySpecSkippedDirective>()?;
    module.add_class::<PyReportExport>()?;
    module.add_function(wrap_pyfunction!(export_xlsx_py, module)?)?;
    module.add_function(wrap_pyfunction!(export_xlsx_batch_py, module)?)?;
    module.add("__bridge_abi__", N_BRIDGE_ABI_VERSION)?;
    module.add("__bridge_contract__", C_BRIDGE_CONTRACT_VERSION)?;
    module.add("__bridge_transport__", C_BRIDGE_TRANSPORT)?;
    Ok(())
}
