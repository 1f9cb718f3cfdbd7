//! Dataset session: the ordered set of records a user is assembling.
//!
//! The session carries an epoch that increments on every [`DatasetSession::clear`].
//! Batch jobs capture the epoch when they start and hand it back with their
//! results; results from an older epoch are rejected instead of leaking
//! into the new session.

use serde::Serialize;

use crate::classify::Mode;
use crate::error::CoreError;
use crate::record::{PromptRecord, RecordMeta};
use crate::types::RecordId;

#[derive(Debug)]
pub struct DatasetSession {
    id: uuid::Uuid,
    records: Vec<PromptRecord>,
    epoch: u64,
}

/// One line of the JSONL export.
#[derive(Debug, Serialize)]
struct ExportLine<'a> {
    id: RecordId,
    meta: &'a RecordMeta,
    mode: Mode,
    prompt: String,
    negative_prompt: Option<String>,
    copied: bool,
}

impl Default for DatasetSession {
    fn default() -> Self {
        Self::new()
    }
}

impl DatasetSession {
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::now_v7(),
            records: Vec::new(),
            epoch: 0,
        }
    }

    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn records(&self) -> &[PromptRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append records produced under `epoch`.
    ///
    /// Fails with [`CoreError::Conflict`] when the session has been cleared
    /// since the epoch was captured.
    pub fn accept(&mut self, epoch: u64, records: Vec<PromptRecord>) -> Result<usize, CoreError> {
        if epoch != self.epoch {
            return Err(CoreError::Conflict(format!(
                "Session epoch moved from {epoch} to {}; results discarded",
                self.epoch
            )));
        }
        let count = records.len();
        self.records.extend(records);
        Ok(count)
    }

    /// Add a hand-written record.
    pub fn add_manual(&mut self, raw_text: impl Into<String>) -> Result<RecordId, CoreError> {
        let raw_text = raw_text.into();
        if raw_text.trim().is_empty() {
            return Err(CoreError::Validation(
                "Manual prompt text must not be empty".to_string(),
            ));
        }
        let record = PromptRecord::new(raw_text, RecordMeta::manual());
        let id = record.id();
        self.records.push(record);
        Ok(id)
    }

    pub fn get(&self, id: RecordId) -> Result<&PromptRecord, CoreError> {
        self.records
            .iter()
            .find(|r| r.id() == id)
            .ok_or_else(|| not_found(id))
    }

    pub fn get_mut(&mut self, id: RecordId) -> Result<&mut PromptRecord, CoreError> {
        self.records
            .iter_mut()
            .find(|r| r.id() == id)
            .ok_or_else(|| not_found(id))
    }

    pub fn remove(&mut self, id: RecordId) -> Result<PromptRecord, CoreError> {
        let pos = self
            .records
            .iter()
            .position(|r| r.id() == id)
            .ok_or_else(|| not_found(id))?;
        Ok(self.records.remove(pos))
    }

    pub fn toggle_copied(&mut self, id: RecordId) -> Result<bool, CoreError> {
        Ok(self.get_mut(id)?.toggle_copied())
    }

    /// Drop every record and start a new epoch.
    pub fn clear(&mut self) {
        self.records.clear();
        self.epoch += 1;
    }

    /// Display text of each record, one per line.
    pub fn export_lines(&self) -> String {
        self.records
            .iter()
            .map(|r| r.display_text().replace('\n', " "))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// One JSON object per record, newline-terminated.
    pub fn export_jsonl(&self) -> Result<String, CoreError> {
        let mut out = String::new();
        for record in &self.records {
            let line = ExportLine {
                id: record.id(),
                meta: record.meta(),
                mode: record.mode(),
                prompt: record.display_text(),
                negative_prompt: record.finalized().map(|f| f.negative_prompt),
                copied: record.copied(),
            };
            let json = serde_json::to_string(&line)
                .map_err(|e| CoreError::Internal(format!("Failed to serialize record: {e}")))?;
            out.push_str(&json);
            out.push('\n');
        }
        Ok(out)
    }
}

fn not_found(id: RecordId) -> CoreError {
    CoreError::NotFound {
        entity: "PromptRecord",
        id: id.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
