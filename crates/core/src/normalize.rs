//! Mode normalisation into one presentation-ready record.
//!
//! Each structured mode has its own mapping table onto
//! [`CanonicalDisplayRecord`]. Every leaf has a fallback, so consumers never
//! see a missing field regardless of what the model produced.

use serde::Serialize;

use crate::classify::ClassifiedRecord;
use crate::schema::{
    Attire, ClothingItem, DenseTrainingRecord, ReferenceLogic, RichAnalysisRecord,
    SimpleSubjectRecord,
};

/// Fallback for scalar fields with no value.
pub const NOT_AVAILABLE: &str = "N/A";
/// Fallback for detail fields that live in a free-text description instead.
pub const SEE_DESCRIPTION: &str = "See Description";
/// Fallback for styling and for empty element lists.
pub const STANDARD: &str = "Standard";
/// Identity shown for dense records whose reference logic names no image.
pub const REFERENCE_IMAGE: &str = "Reference Image";

// ---------------------------------------------------------------------------
// Canonical record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalDisplayRecord {
    pub identity: String,
    pub styling: String,
    pub environment: String,
    pub atmosphere: Atmosphere,
    pub details: Details,
    pub clothing: Clothing,
    pub tech_meta: TechMeta,
    /// Reference-image weighting, dense records only.
    pub reference: Option<ReferenceLogic>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Atmosphere {
    pub mood: String,
    pub lighting_source: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Details {
    pub head_and_gaze: String,
    pub posture_and_spine: String,
    pub hands_and_fingers: String,
    pub limb_placement: String,
}

impl Details {
    fn filled_with(fallback: &str) -> Self {
        Self {
            head_and_gaze: fallback.to_string(),
            posture_and_spine: fallback.to_string(),
            hands_and_fingers: fallback.to_string(),
            limb_placement: fallback.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Clothing {
    pub top: Option<ClothingItem>,
    pub bottom: Option<ClothingItem>,
}

impl From<&Attire> for Clothing {
    fn from(attire: &Attire) -> Self {
        Self {
            top: attire.top.clone(),
            bottom: attire.bottom.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TechMeta {
    pub medium: Option<String>,
    pub visual_fidelity: Option<String>,
}

// ---------------------------------------------------------------------------
// Normalisation
// ---------------------------------------------------------------------------

/// Map a classified record onto the canonical display shape.
///
/// Returns `None` only for [`ClassifiedRecord::Unstructured`].
pub fn normalize(record: &ClassifiedRecord) -> Option<CanonicalDisplayRecord> {
    match record {
        ClassifiedRecord::DenseTraining(dense) => Some(from_dense(dense)),
        ClassifiedRecord::RichAnalysis(rich) => Some(from_rich(rich)),
        ClassifiedRecord::SimpleSubject(simple) => Some(from_simple(simple)),
        ClassifiedRecord::Unstructured => None,
    }
}

fn from_dense(record: &DenseTrainingRecord) -> CanonicalDisplayRecord {
    let data = &record.generation_data;
    let components = data.components.clone().unwrap_or_default();
    let reference = data.reference_logic.clone();

    let identity = reference
        .as_ref()
        .and_then(|r| r.primary_ref.clone())
        .unwrap_or_else(|| REFERENCE_IMAGE.to_string());

    let mut details = Details::filled_with(SEE_DESCRIPTION);
    if let Some(body) = &components.body_stack {
        details.posture_and_spine = body.clone();
    }
    if let Some(action) = &components.action {
        details.limb_placement = action.clone();
    }

    CanonicalDisplayRecord {
        identity,
        styling: or_default(&components.archetype, STANDARD),
        environment: or_default(&components.environment, STANDARD),
        atmosphere: Atmosphere {
            mood: NOT_AVAILABLE.to_string(),
            lighting_source: NOT_AVAILABLE.to_string(),
        },
        details,
        clothing: Clothing {
            top: components.wardrobe.clone().map(|kind| ClothingItem {
                kind: Some(kind),
                color: None,
            }),
            bottom: None,
        },
        tech_meta: TechMeta {
            medium: components.tech_specs.clone(),
            visual_fidelity: components.realism_stack.clone(),
        },
        reference,
    }
}

fn from_rich(record: &RichAnalysisRecord) -> CanonicalDisplayRecord {
    let anatomy = &record.anatomical_details;

    CanonicalDisplayRecord {
        identity: or_default(&record.subject_core.identity, NOT_AVAILABLE),
        styling: or_default(&record.subject_core.styling, STANDARD),
        environment: join_or_standard(&record.environment.elements),
        atmosphere: Atmosphere {
            mood: or_default(&record.atmosphere.mood, NOT_AVAILABLE),
            lighting_source: or_default(&record.atmosphere.lighting_source, NOT_AVAILABLE),
        },
        details: Details {
            head_and_gaze: or_default(&anatomy.head_and_gaze, NOT_AVAILABLE),
            posture_and_spine: or_default(&anatomy.posture_and_spine, NOT_AVAILABLE),
            hands_and_fingers: or_default(&anatomy.hands_and_fingers, NOT_AVAILABLE),
            limb_placement: or_default(&anatomy.limb_placement, NOT_AVAILABLE),
        },
        clothing: Clothing::from(&record.attire),
        tech_meta: TechMeta {
            medium: record.tech_meta.medium.clone(),
            visual_fidelity: record.tech_meta.visual_fidelity.clone(),
        },
        reference: None,
    }
}

fn from_simple(record: &SimpleSubjectRecord) -> CanonicalDisplayRecord {
    let subject = &record.subject;

    let mut details = Details::filled_with(SEE_DESCRIPTION);
    if let Some(body) = &subject.body {
        details.posture_and_spine = body.clone();
    }

    CanonicalDisplayRecord {
        identity: or_default(&subject.description, NOT_AVAILABLE),
        styling: subject
            .clothing
            .describe()
            .unwrap_or_else(|| STANDARD.to_string()),
        environment: join_or_standard(&record.background.elements),
        atmosphere: Atmosphere {
            mood: or_default(&subject.expression, NOT_AVAILABLE),
            lighting_source: or_default(&record.tech_specs.lighting_physics, NOT_AVAILABLE),
        },
        details,
        clothing: Clothing::from(&subject.clothing),
        tech_meta: TechMeta {
            medium: record.tech_specs.medium.clone(),
            visual_fidelity: record.tech_specs.visual_fidelity.clone(),
        },
        reference: None,
    }
}

fn or_default(value: &Option<String>, fallback: &str) -> String {
    value.clone().unwrap_or_else(|| fallback.to_string())
}

fn join_or_standard(items: &[String]) -> String {
    if items.is_empty() {
        STANDARD.to_string()
    } else {
        items.join(", ")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
