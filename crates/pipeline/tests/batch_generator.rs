//! Integration tests for [`BatchGenerator`] with a scripted model.
//!
//! The scripted model pops one reply per call in call order. `join_all`
//! polls its futures in order, so chunk N of a wave always receives the
//! Nth scripted reply.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use loraforge_core::batch::{BatchConfig, BatchState};
use loraforge_core::instructions::{GenerationBrief, TargetSchema};
use loraforge_llm::{ChunkRequest, ModelError, PromptModel};
use loraforge_pipeline::{BatchEvent, BatchGenerator, GeneratorError};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

enum Reply {
    Text(String),
    Status(u16),
    Hang,
}

struct ScriptedModel {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<ChunkRequest>>,
}

impl ScriptedModel {
    fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<ChunkRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PromptModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &ChunkRequest) -> Result<String, ModelError> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Status(status)) => Err(ModelError::ApiError {
                status,
                body: "scripted failure".into(),
            }),
            Some(Reply::Hang) => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            None => Err(ModelError::EmptyResponse),
        }
    }
}

fn item(i: usize) -> serde_json::Value {
    serde_json::json!({
        "subject": {"description": format!("climber {i}"), "body": "wiry forearms, lean torso"},
        "background": {"description": "limestone crag"}
    })
}

/// A fenced JSON array of items `from..=to`, plus any raw extras.
fn reply(range: std::ops::RangeInclusive<usize>, extras: &[serde_json::Value]) -> Reply {
    let mut items: Vec<serde_json::Value> = range.map(item).collect();
    items.extend_from_slice(extras);
    Reply::Text(format!(
        "```json\n{}\n```",
        serde_json::to_string(&items).unwrap()
    ))
}

fn config(target_total: usize, chunk_size: usize, max_concurrency: usize) -> BatchConfig {
    BatchConfig {
        target_total,
        chunk_size,
        max_concurrency,
        call_timeout: Duration::from_secs(5),
        ..BatchConfig::default()
    }
}

fn generator(model: Arc<ScriptedModel>, config: BatchConfig) -> BatchGenerator {
    let brief = GenerationBrief::new("bouldering session", TargetSchema::SimpleSubject);
    BatchGenerator::new(model, config, brief).unwrap()
}

fn drain(rx: &mut broadcast::Receiver<BatchEvent>) -> Vec<BatchEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ---------------------------------------------------------------------------
// Test: retry pass recovers failed items
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ten_items_two_invalid_recovered_by_retry() {
    let invalid = [serde_json::json!({"note": "no schema"}), serde_json::json!("prose")];
    let model = ScriptedModel::new(vec![reply(1..=8, &invalid), reply(9..=10, &[])]);
    let generator = generator(model.clone(), config(10, 10, 5));
    let mut rx = generator.subscribe();
    let mut job = generator.new_job("Batch 1");

    generator.run(&mut job, &CancellationToken::new()).await.unwrap();

    assert_eq!(job.current_count(), 10);
    assert!(job.failed_indices().is_empty());
    assert_eq!(job.gaps(), 0);
    assert_eq!(job.state(), &BatchState::Complete);

    let requests = model.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].count, 10);
    assert_eq!(requests[1].count, 2);

    let events = drain(&mut rx);
    assert!(events.contains(&BatchEvent::RetryPass { pass: 1, pending: 2 }));
    assert_eq!(
        events.last(),
        Some(&BatchEvent::Completed {
            accepted: 10,
            gaps: 0
        })
    );
}

#[tokio::test]
async fn items_failing_retry_become_gaps() {
    let model = ScriptedModel::new(vec![
        reply(1..=2, &[]),
        Reply::Text("I could not produce another prompt.".into()),
    ]);
    let generator = generator(model, config(3, 3, 1));
    let mut job = generator.new_job("Batch 1");

    generator.run(&mut job, &CancellationToken::new()).await.unwrap();

    assert_eq!(job.current_count(), 2);
    assert_eq!(job.gaps(), 1);
    assert_eq!(job.state(), &BatchState::Complete);
}

#[tokio::test]
async fn zero_retries_surrenders_immediately() {
    let model = ScriptedModel::new(vec![reply(1..=1, &[])]);
    let generator = generator(
        model.clone(),
        BatchConfig {
            max_retries: 0,
            ..config(2, 2, 1)
        },
    );
    let mut job = generator.new_job("Batch 1");

    generator.run(&mut job, &CancellationToken::new()).await.unwrap();

    assert_eq!(job.gaps(), 1);
    assert_eq!(model.requests().len(), 1);
}

// ---------------------------------------------------------------------------
// Test: waves, chunk sizes and duplicate hints
// ---------------------------------------------------------------------------

#[tokio::test]
async fn chunks_are_sized_to_remaining_and_carry_hints() {
    let model = ScriptedModel::new(vec![reply(1..=5, &[]), reply(6..=7, &[])]);
    let generator = generator(model.clone(), config(7, 5, 1));
    let mut job = generator.new_job("Batch 1");

    generator.run(&mut job, &CancellationToken::new()).await.unwrap();

    let requests = model.requests();
    assert_eq!(requests.iter().map(|r| r.count).collect::<Vec<_>>(), vec![5, 2]);
    assert!(!requests[0].instructions.contains("climber 1"));
    assert!(requests[1].instructions.contains("climber 5"));
    assert_eq!(job.current_count(), 7);
}

#[tokio::test]
async fn duplicates_across_chunks_are_retried() {
    let model = ScriptedModel::new(vec![
        reply(1..=2, &[]),
        reply(2..=3, &[]),
        reply(4..=4, &[]),
    ]);
    let generator = generator(model, config(4, 2, 2));
    let mut job = generator.new_job("Batch 1");

    generator.run(&mut job, &CancellationToken::new()).await.unwrap();

    assert_eq!(job.current_count(), 4);
    let prompts: Vec<String> = job.records().iter().map(|r| r.display_text()).collect();
    let mut unique = prompts.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), prompts.len());
}

// ---------------------------------------------------------------------------
// Test: fatal model errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn api_error_halts_job_and_keeps_accepted_records() {
    let model = ScriptedModel::new(vec![reply(1..=5, &[]), Reply::Status(401)]);
    let generator = generator(model, config(10, 5, 2));
    let mut rx = generator.subscribe();
    let mut job = generator.new_job("Batch 1");

    let result = generator.run(&mut job, &CancellationToken::new()).await;

    assert_matches!(
        result,
        Err(GeneratorError::Model {
            chunk: 2,
            source: ModelError::ApiError { status: 401, .. }
        })
    );
    assert_matches!(job.state(), BatchState::Error(_));
    assert_eq!(job.current_count(), 5);
    assert_eq!(job.records().len(), 5);

    let events = drain(&mut rx);
    assert_matches!(events.last(), Some(BatchEvent::Failed { accepted: 5, .. }));
}

#[tokio::test]
async fn hung_call_times_out() {
    let model = ScriptedModel::new(vec![Reply::Hang]);
    let generator = generator(
        model,
        BatchConfig {
            call_timeout: Duration::from_millis(50),
            ..config(2, 2, 1)
        },
    );
    let mut job = generator.new_job("Batch 1");

    let result = generator.run(&mut job, &CancellationToken::new()).await;

    assert_matches!(
        result,
        Err(GeneratorError::Model {
            source: ModelError::Timeout(_),
            ..
        })
    );
    assert_eq!(job.current_count(), 0);
}

// ---------------------------------------------------------------------------
// Test: cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancelled_before_start_makes_no_calls() {
    let model = ScriptedModel::new(vec![reply(1..=2, &[])]);
    let generator = generator(model.clone(), config(2, 2, 1));
    let mut job = generator.new_job("Batch 1");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = generator.run(&mut job, &cancel).await;

    assert_matches!(result, Err(GeneratorError::Abandoned));
    assert!(model.requests().is_empty());
}

#[tokio::test]
async fn cancel_mid_wave_discards_in_flight_results() {
    let model = ScriptedModel::new(vec![reply(1..=5, &[]), Reply::Hang]);
    let generator = generator(model, config(10, 5, 1));
    let mut rx = generator.subscribe();
    let mut job = generator.new_job("Batch 1");
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let result = generator.run(&mut job, &cancel).await;

    assert_matches!(result, Err(GeneratorError::Abandoned));
    assert_eq!(job.current_count(), 5);
    assert_eq!(job.state(), &BatchState::Idle);
    assert_eq!(job.open_slots(), 5);

    let events = drain(&mut rx);
    assert_eq!(events.last(), Some(&BatchEvent::Abandoned { accepted: 5 }));
}

// ---------------------------------------------------------------------------
// Test: construction
// ---------------------------------------------------------------------------

#[test]
fn invalid_config_rejected() {
    let model = ScriptedModel::new(Vec::new());
    let brief = GenerationBrief::new("x", TargetSchema::default());
    let result = BatchGenerator::new(model, config(10, 0, 1), brief);
    assert_matches!(result.err(), Some(GeneratorError::Config(_)));
}

#[test]
fn blank_brief_rejected() {
    let model = ScriptedModel::new(Vec::new());
    let brief = GenerationBrief::new(" ", TargetSchema::default());
    let result = BatchGenerator::new(model, config(10, 5, 1), brief);
    assert_matches!(result.err(), Some(GeneratorError::Config(_)));
}
