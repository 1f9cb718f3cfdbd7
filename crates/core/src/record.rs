//! Prompt records.
//!
//! A [`PromptRecord`] stores only its raw model text and provenance. Every
//! derived view (parsed JSON, mode, canonical record, final prompt) is
//! recomputed from the raw text on demand, so an edit can never leave a
//! stale derived field behind.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::classify::{self, ClassifiedRecord, Mode};
use crate::compiler::{self, FinalPrompt};
use crate::extract;
use crate::normalize::{self, CanonicalDisplayRecord};
use crate::scrub;
use crate::types::{RecordId, Timestamp};

/// How a record entered the dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    Batch,
    Manual,
}

/// Generation provenance, fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMeta {
    #[serde(rename = "type")]
    pub kind: RecordSource,
    /// 1-based position within the batch.
    pub index: usize,
    pub total: usize,
    pub label: String,
}

impl RecordMeta {
    pub fn batch(index: usize, total: usize, label: impl Into<String>) -> Self {
        Self {
            kind: RecordSource::Batch,
            index,
            total,
            label: label.into(),
        }
    }

    pub fn manual() -> Self {
        Self {
            kind: RecordSource::Manual,
            index: 1,
            total: 1,
            label: "Manual entry".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptRecord {
    id: RecordId,
    raw_text: String,
    meta: RecordMeta,
    copied: bool,
    created_at: Timestamp,
}

impl PromptRecord {
    pub fn new(raw_text: impl Into<String>, meta: RecordMeta) -> Self {
        Self {
            id: uuid::Uuid::now_v7(),
            raw_text: raw_text.into(),
            meta,
            copied: false,
            created_at: chrono::Utc::now(),
        }
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    pub fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    pub fn copied(&self) -> bool {
        self.copied
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    // ---- derived views ----

    pub fn parsed(&self) -> Option<Value> {
        extract::extract(&self.raw_text)
    }

    pub fn classified(&self) -> ClassifiedRecord {
        classify::classify(self.parsed().as_ref())
    }

    pub fn mode(&self) -> Mode {
        classify::detect_mode(self.parsed().as_ref())
    }

    pub fn normalized(&self) -> Option<CanonicalDisplayRecord> {
        normalize::normalize(&self.classified())
    }

    pub fn finalized(&self) -> Option<FinalPrompt> {
        compiler::finalize(&self.classified())
    }

    /// The text shown and exported for this record.
    ///
    /// Dense records show their pre-compiled string, other structured
    /// records their compiled prompt, and anything else the raw text
    /// verbatim. Structured records that produce no text fall back to the
    /// raw text as well.
    pub fn display_text(&self) -> String {
        let classified = self.classified();
        let text = match &classified {
            ClassifiedRecord::DenseTraining(dense) => dense
                .generation_data
                .final_prompt_string
                .as_deref()
                .map(scrub::scrub)
                .or_else(|| compiler::finalize(&classified).map(|f| f.text)),
            ClassifiedRecord::Unstructured => None,
            _ => compiler::finalize(&classified).map(|f| f.text),
        };
        text.filter(|t| !t.is_empty())
            .unwrap_or_else(|| self.raw_text.clone())
    }

    // ---- mutations ----

    /// Replace the raw text. Derived views follow on the next read.
    pub fn edit(&mut self, raw_text: impl Into<String>) {
        self.raw_text = raw_text.into();
    }

    pub fn toggle_copied(&mut self) -> bool {
        self.copied = !self.copied;
        self.copied
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const RICH: &str =
        "```json\n{\"subject_core\":{\"identity\":\"a woman\",\"styling\":\"casual\"}}\n```";

    #[test]
    fn new_record_is_not_copied() {
        let record = PromptRecord::new("text", RecordMeta::manual());
        assert!(!record.copied());
        assert_eq!(record.meta().kind, RecordSource::Manual);
        assert_eq!(record.id().get_version_num(), 7);
    }

    #[test]
    fn ids_are_unique() {
        let a = PromptRecord::new("a", RecordMeta::manual());
        let b = PromptRecord::new("a", RecordMeta::manual());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn rich_record_views() {
        let record = PromptRecord::new(RICH, RecordMeta::batch(1, 10, "Batch 1"));
        assert_eq!(record.mode(), Mode::RichAnalysis);
        assert_eq!(record.normalized().unwrap().identity, "a woman");
        assert_eq!(record.display_text(), "a woman, casual");
    }

    #[test]
    fn prose_displays_verbatim() {
        let record = PromptRecord::new("A photo of a sunset.", RecordMeta::manual());
        assert_eq!(record.parsed(), None);
        assert_eq!(record.mode(), Mode::Unstructured);
        assert_eq!(record.normalized(), None);
        assert_eq!(record.display_text(), "A photo of a sunset.");
    }

    #[test]
    fn dense_displays_scrubbed_final_string() {
        let record = PromptRecord::new(
            r#"{"generation_data":{"final_prompt_string":"full body shot, a woman with brown hair, toned legs"}}"#,
            RecordMeta::manual(),
        );
        assert_eq!(record.display_text(), "full body shot, a woman, toned legs");
    }

    #[test]
    fn edit_recomputes_derived_views() {
        let mut record = PromptRecord::new("plain text", RecordMeta::manual());
        let id = record.id();
        assert_eq!(record.mode(), Mode::Unstructured);

        record.edit(RICH);
        assert_eq!(record.mode(), Mode::RichAnalysis);
        assert_eq!(record.id(), id);
    }

    #[test]
    fn toggle_copied_flips_flag_only() {
        let mut record = PromptRecord::new(RICH, RecordMeta::manual());
        let before = record.display_text();
        assert!(record.toggle_copied());
        assert!(!record.toggle_copied());
        assert_eq!(record.display_text(), before);
    }

    #[test]
    fn meta_serializes_kind_as_type() {
        let json = serde_json::to_value(RecordMeta::batch(2, 5, "Batch 1")).unwrap();
        assert_eq!(json["type"], "batch");
        assert_eq!(json["index"], 2);
    }
}
