//! Schema classification.
//!
//! A parsed object is assigned to exactly one [`Mode`] by checking marker
//! fields in a fixed priority order. The shapes overlap (a dense record may
//! also carry `subject_core`), so the order encodes which producer wins:
//!
//! 1. `generation_data` -> [`Mode::DenseTraining`]
//! 2. `subject_core` -> [`Mode::RichAnalysis`]
//! 3. `subject` and `background` -> [`Mode::SimpleSubject`]
//! 4. anything else, including no parse at all -> [`Mode::Unstructured`]

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::schema::{self, DenseTrainingRecord, RichAnalysisRecord, SimpleSubjectRecord};

/// Marker key for dense training records.
pub const MARKER_GENERATION_DATA: &str = "generation_data";
/// Marker key for rich analysis records.
pub const MARKER_SUBJECT_CORE: &str = "subject_core";
/// First marker key for simple subject/background records.
pub const MARKER_SUBJECT: &str = "subject";
/// Second marker key for simple subject/background records.
pub const MARKER_BACKGROUND: &str = "background";

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    DenseTraining,
    RichAnalysis,
    SimpleSubject,
    Unstructured,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DenseTraining => "dense_training",
            Self::RichAnalysis => "rich_analysis",
            Self::SimpleSubject => "simple_subject",
            Self::Unstructured => "unstructured",
        }
    }

    pub fn is_structured(self) -> bool {
        !matches!(self, Self::Unstructured)
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Classified record
// ---------------------------------------------------------------------------

/// A parsed payload together with its typed schema view.
///
/// Produced once by [`classify`]; downstream code matches on the variant
/// instead of re-probing the JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifiedRecord {
    DenseTraining(DenseTrainingRecord),
    RichAnalysis(RichAnalysisRecord),
    SimpleSubject(SimpleSubjectRecord),
    Unstructured,
}

impl ClassifiedRecord {
    pub fn mode(&self) -> Mode {
        match self {
            Self::DenseTraining(_) => Mode::DenseTraining,
            Self::RichAnalysis(_) => Mode::RichAnalysis,
            Self::SimpleSubject(_) => Mode::SimpleSubject,
            Self::Unstructured => Mode::Unstructured,
        }
    }
}

/// Determine the mode of a parsed payload.
pub fn detect_mode(parsed: Option<&Value>) -> Mode {
    let Some(Value::Object(map)) = parsed else {
        return Mode::Unstructured;
    };

    if is_present(map, MARKER_GENERATION_DATA) {
        Mode::DenseTraining
    } else if is_present(map, MARKER_SUBJECT_CORE) {
        Mode::RichAnalysis
    } else if is_present(map, MARKER_SUBJECT) && is_present(map, MARKER_BACKGROUND) {
        Mode::SimpleSubject
    } else {
        Mode::Unstructured
    }
}

/// Classify a parsed payload and build its typed view.
pub fn classify(parsed: Option<&Value>) -> ClassifiedRecord {
    match (detect_mode(parsed), parsed) {
        (Mode::DenseTraining, Some(value)) => ClassifiedRecord::DenseTraining(schema::view(value)),
        (Mode::RichAnalysis, Some(value)) => ClassifiedRecord::RichAnalysis(schema::view(value)),
        (Mode::SimpleSubject, Some(value)) => ClassifiedRecord::SimpleSubject(schema::view(value)),
        _ => ClassifiedRecord::Unstructured,
    }
}

/// A marker counts as present when the key exists and its value is truthy:
/// not `null`, `false`, `0` or the empty string. Empty objects and arrays
/// are present.
fn is_present(map: &Map<String, Value>, key: &str) -> bool {
    match map.get(key) {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(_) => true,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
