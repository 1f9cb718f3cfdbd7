//! Batch prompt-set worker.
//!
//! Wires configuration, the model client, the batch generator and a dataset
//! session together for one generation run.

pub mod config;
pub mod run;

use std::sync::Arc;

use loraforge_core::session::DatasetSession;
use loraforge_llm::GeminiClient;
use loraforge_pipeline::BatchGenerator;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;
use crate::run::{run_job, JobReport, WorkerError};

/// Build the client and generator from `config` and run one job.
pub async fn run(config: WorkerConfig, cancel: CancellationToken) -> Result<JobReport, WorkerError> {
    let client = GeminiClient::new(config.api_url, config.model, config.credential);
    let generator = BatchGenerator::new(Arc::new(client), config.batch, config.brief)?;

    let mut events = generator.subscribe();
    let event_log = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => tracing::debug!(event = %json, "Batch event"),
                    Err(e) => tracing::warn!(error = %e, "Unserializable batch event"),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Batch event log lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let mut session = DatasetSession::new();
    let report = run_job(&generator, &mut session, &config.export_path, &cancel).await;

    drop(generator);
    let _ = event_log.await;
    report
}
