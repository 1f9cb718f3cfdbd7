//! One batch job from start to export.

use std::path::{Path, PathBuf};

use loraforge_core::error::CoreError;
use loraforge_core::session::DatasetSession;
use loraforge_pipeline::{BatchGenerator, GeneratorError};
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Generator(#[from] GeneratorError),

    #[error(transparent)]
    Session(#[from] CoreError),

    #[error("Failed to write export {path}: {source}")]
    Export {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    /// A model call failed; accepted records were kept and exported.
    Failed(String),
    /// The job was abandoned; nothing was written to the session.
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub outcome: JobOutcome,
    pub accepted: usize,
    pub gaps: usize,
    pub exported: Option<PathBuf>,
}

/// Run one job, store its records in `session` and write the export.
///
/// The session epoch is captured before the first call, so a session
/// cleared while the job was running rejects the results.
pub async fn run_job(
    generator: &BatchGenerator,
    session: &mut DatasetSession,
    export_path: &Path,
    cancel: &CancellationToken,
) -> Result<JobReport, WorkerError> {
    let epoch = session.epoch();
    let mut job = generator.new_job(format!("Batch {}", epoch + 1));

    let outcome = match generator.run(&mut job, cancel).await {
        Ok(()) => JobOutcome::Completed,
        Err(GeneratorError::Abandoned) => {
            return Ok(JobReport {
                outcome: JobOutcome::Abandoned,
                accepted: 0,
                gaps: 0,
                exported: None,
            });
        }
        Err(GeneratorError::Model { chunk, source }) => {
            tracing::error!(chunk, error = %source, "Batch job failed; keeping accepted records");
            JobOutcome::Failed(source.to_string())
        }
        Err(e) => return Err(e.into()),
    };

    let gaps = job.gaps();
    let accepted = session.accept(epoch, job.take_records())?;
    write_export(session, export_path).await?;

    tracing::info!(
        accepted,
        gaps,
        total = session.len(),
        path = %export_path.display(),
        "Export written",
    );

    Ok(JobReport {
        outcome,
        accepted,
        gaps,
        exported: Some(export_path.to_path_buf()),
    })
}

/// Write the session's JSONL export to `path`.
pub async fn write_export(session: &DatasetSession, path: &Path) -> Result<(), WorkerError> {
    let body = session.export_jsonl()?;
    tokio::fs::write(path, body)
        .await
        .map_err(|source| WorkerError::Export {
            path: path.to_path_buf(),
            source,
        })
}
