//! Independent export jobs run on a shared worker pool.

use rayon::ThreadPoolBuilder;
use rayon::prelude::*;

use crate::payload::parse_extraction_document;
use crate::reconcile::reconcile_document;
use crate::spec::{ExportXlsxError, SpecExportArtifact, SpecExtractionDocument};
use crate::util::calculate_worker_limit;
use crate::writer::XlsxRenderer;

/// One unit of batch work.
#[derive(Debug, Clone)]
pub enum EnumExportJob {
    /// Raw JSON payload plus an optional source label.
    Payload {
        /// Document payload text.
        payload_json: String,
        /// Source label; overrides the payload's own `source`.
        source: Option<String>,
    },
    /// Already parsed document.
    Document(SpecExtractionDocument),
}

/// Parse (when needed), reconcile and render one job.
pub fn run_export_job(
    job: EnumExportJob,
    renderer: &XlsxRenderer,
) -> Result<SpecExportArtifact, ExportXlsxError> {
    let document = match job {
        EnumExportJob::Payload {
            payload_json,
            source,
        } => parse_extraction_document(&payload_json, source.as_deref())?,
        EnumExportJob::Document(document) => document,
    };
    renderer.export_to_buffer(&reconcile_document(document))
}

/// Run every job and return results in input order.
///
/// Jobs share only `renderer`. One failing job leaves its siblings untouched.
pub fn export_batch(
    l_jobs: Vec<EnumExportJob>,
    renderer: &XlsxRenderer,
    num_workers_max: Option<usize>,
) -> Vec<Result<SpecExportArtifact, ExportXlsxError>> {
    let n_workers_max = calculate_worker_limit(num_workers_max);

    if n_workers_max <= 1 || l_jobs.len() <= 1 {
        return l_jobs
            .into_iter()
            .map(|job| run_export_job(job, renderer))
            .collect();
    }

    let thread_pool = ThreadPoolBuilder::new().num_threads(n_workers_max).build();
    let Ok(thread_pool) = thread_pool else {
        log::warn!(
            "Failed to initialize thread pool (workers={n_workers_max}); fallback to serial export."
        );
        return l_jobs
            .into_iter()
            .map(|job| run_export_job(job, renderer))
            .collect();
    };

    thread_pool.install(|| {
        l_jobs
            .into_par_iter()
            .map(|job| run_export_job(job, renderer))
            .collect()
    })
}
