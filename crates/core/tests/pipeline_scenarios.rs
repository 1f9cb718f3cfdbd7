//! End-to-end tests for the synchronous pipeline.
//!
//! Drives raw model text through extraction, classification, normalisation
//! and compilation the way a dataset session does, and exercises the batch
//! job bookkeeping without an async runtime.

use loraforge_core::batch::{BatchJob, BatchState};
use loraforge_core::classify::{classify, Mode};
use loraforge_core::compiler::{self, NEGATIVE_PROMPT};
use loraforge_core::extract::extract;
use loraforge_core::normalize::normalize;
use loraforge_core::record::{PromptRecord, RecordMeta};
use loraforge_core::scrub::{leaks_identity, scrub};
use loraforge_core::session::DatasetSession;

// ---------------------------------------------------------------------------
// Test: fenced rich analysis payload
// ---------------------------------------------------------------------------

#[test]
fn fenced_rich_payload_normalizes_identity() {
    let raw = "```json\n{\"subject_core\":{\"identity\":\"a woman\",\"styling\":\"casual\"}}\n```";

    let parsed = extract(raw);
    assert!(parsed.is_some());
    let classified = classify(parsed.as_ref());
    assert_eq!(classified.mode(), Mode::RichAnalysis);

    let canonical = normalize(&classified).expect("structured record normalizes");
    assert_eq!(canonical.identity, "a woman");
    assert_eq!(canonical.styling, "casual");
    assert_eq!(canonical.atmosphere.mood, "N/A");
}

// ---------------------------------------------------------------------------
// Test: plain prose degrades to raw text
// ---------------------------------------------------------------------------

#[test]
fn prose_falls_back_to_raw_text() {
    let raw = "A photo of a sunset.";

    assert_eq!(extract(raw), None);
    let classified = classify(None);
    assert_eq!(classified.mode(), Mode::Unstructured);
    assert_eq!(normalize(&classified), None);

    let record = PromptRecord::new(raw, RecordMeta::manual());
    assert_eq!(record.display_text(), raw);
}

// ---------------------------------------------------------------------------
// Test: batch of ten with two failures recovered on retry
// ---------------------------------------------------------------------------

fn dense_item(i: usize) -> String {
    format!(
        r#"{{"generation_data":{{"final_prompt_string":"pose {i}","components":{{"framing":"full-body shot","action":"stretch variation {i}","body_stack":"long toned legs, narrow waist, blonde hair","realism_stack":"visible pores"}}}}}}"#
    )
}

#[test]
fn batch_of_ten_recovers_two_failures_in_one_retry() {
    let mut job = BatchJob::new(10, "Session 1");

    let wave = job.plan_wave(10, 5).expect("idle job plans a wave");
    assert_eq!(wave.len(), 1);

    let mut returned: Vec<String> = (1..=8).map(dense_item).collect();
    returned.insert(2, "```json\n{\"generation_data\": {\"final_prompt_str".to_string());
    returned.insert(6, "I'm sorry, I can only produce eight.".to_string());
    let outcome = job.apply_chunk(&wave[0], returned);
    assert_eq!(outcome.accepted, 8);
    assert_eq!(outcome.failed, 2);
    assert_eq!(job.finish_wave(), &BatchState::Idle);

    let retry = job.plan_retry(10).expect("retry after partial failure");
    let outcome = job.apply_chunk(&retry[0], vec![dense_item(9), dense_item(10)]);
    assert_eq!(outcome.accepted, 2);

    assert_eq!(job.finish_wave(), &BatchState::Complete);
    assert_eq!(job.current_count(), 10);
    assert!(job.failed_indices().is_empty());

    for record in job.records() {
        let prompt = record.display_text();
        assert!(!prompt.contains("blonde"), "{prompt}");
        assert!(!leaks_identity(&prompt), "{prompt}");
    }

    let mut session = DatasetSession::new();
    let epoch = session.epoch();
    session.accept(epoch, job.take_records()).expect("same epoch");
    assert_eq!(session.len(), 10);
}

// ---------------------------------------------------------------------------
// Test: compiled body never carries identity
// ---------------------------------------------------------------------------

#[test]
fn compiled_prompt_drops_hair_colour_from_body() {
    let classified = classify(
        extract(
            r#"{"subject":{"description":"climber","body":"wiry forearms, auburn hair, chalked hands"},"background":{"elements":["granite wall","rope"]}}"#,
        )
        .as_ref(),
    );
    let final_prompt = compiler::finalize(&classified).expect("structured");

    assert_eq!(
        final_prompt.text,
        "climber granite wall, rope wiry forearms, chalked hands"
    );
    assert_eq!(final_prompt.negative_prompt, NEGATIVE_PROMPT);
    assert_eq!(scrub(&final_prompt.text), final_prompt.text);
}

// ---------------------------------------------------------------------------
// Test: body, wardrobe and realism text survives finalisation
// ---------------------------------------------------------------------------

#[test]
fn finalized_prompt_keeps_body_wardrobe_and_props() {
    let classified = classify(
        extract(
            r#"{
                "subject_core": {"identity": "a woman", "styling": "athleisure"},
                "anatomical_details": {
                    "body_morphology": "a woman with toned arms and smooth skin",
                    "posture_and_spine": "standing tall"
                },
                "environment": {"setting": "kitchen island", "elements": ["two wine glasses on the table"]},
                "attire": {"top": {"type": "cropped tank"}, "bottom": {"type": "skin-tight leggings", "color": "black"}},
                "texture": {"skin": "soft light, skin texture"},
                "tech_meta": {"framing": "three-quarter shot"}
            }"#,
        )
        .as_ref(),
    );
    let final_prompt = compiler::finalize(&classified).expect("structured");

    assert_eq!(
        final_prompt.text,
        "three-quarter shot a woman, athleisure standing tall \
         kitchen island, two wine glasses on the table \
         a woman with toned arms and smooth skin \
         cropped tank, black skin-tight leggings soft light, skin texture"
    );
    assert_eq!(final_prompt.text, final_prompt.compiled.final_string);
    assert!(final_prompt.warnings.is_empty(), "{:?}", final_prompt.warnings);
}

#[test]
fn identity_beside_body_text_goes_and_body_stays() {
    let classified = classify(
        extract(r#"{"subject":{"description":"a man with green eyes and broad shoulders","body":"a woman with fair skin, muscular thighs"},"background":{"description":"gym floor"}}"#)
            .as_ref(),
    );
    let final_prompt = compiler::finalize(&classified).expect("structured");

    assert_eq!(
        final_prompt.text,
        "a man and broad shoulders gym floor a woman, muscular thighs"
    );
    assert!(!leaks_identity(&final_prompt.text));
}
