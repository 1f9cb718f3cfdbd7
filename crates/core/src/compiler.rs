//! Prompt compilation.
//!
//! A final prompt is assembled from eight ordered semantic slots. The body
//! slot is the only one describing physical morphology and is always run
//! through the identity scrubber before assembly: the face stays silent,
//! the body stays loud. The assembled string is scrubbed once more by
//! [`finalize`] before it is stored.

use serde::{Deserialize, Serialize};

use crate::classify::ClassifiedRecord;
use crate::error::CoreError;
use crate::schema::{DenseTrainingRecord, RichAnalysisRecord, SimpleSubjectRecord};
use crate::scrub;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Undesired-quality tags attached to every compiled prompt.
pub const NEGATIVE_PROMPT: &str = "cartoon, anime, 3d render, cgi, illustration, painting, drawing, \
plastic skin, airbrushed skin, over-smoothed skin, doll-like, blurry, out of focus, lowres, \
jpeg artifacts, watermark, text, logo, signature, deformed, disfigured, bad anatomy, \
extra limbs, extra fingers, missing fingers, fused fingers, mutated hands, poorly drawn hands, \
long neck, cropped, worst quality, low quality, oversaturated";

/// Maximum length for a compiled prompt in characters.
pub const MAX_PROMPT_LENGTH: usize = 10_000;

/// Maximum length for a negative prompt in characters.
pub const MAX_NEGATIVE_PROMPT_LENGTH: usize = 5_000;

/// Rough CLIP token budget before a prompt is flagged as overlong.
pub const TOKEN_BUDGET: usize = 225;

/// Multiplier for rough CLIP token estimation from word count.
const TOKEN_ESTIMATE_MULTIPLIER: f64 = 1.3;

// ---------------------------------------------------------------------------
// Components and segments
// ---------------------------------------------------------------------------

/// Raw text for each of the eight slots. Empty strings are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptComponents {
    pub framing: String,
    pub archetype: String,
    pub action: String,
    pub environment: String,
    pub body_stack: String,
    pub wardrobe: String,
    pub realism_stack: String,
    pub tech_specs: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Framing,
    Archetype,
    Action,
    Environment,
    Body,
    Wardrobe,
    Realism,
    TechSpecs,
}

impl SegmentKind {
    /// Assembly order of the final prompt.
    pub const ORDER: [SegmentKind; 8] = [
        SegmentKind::Framing,
        SegmentKind::Archetype,
        SegmentKind::Action,
        SegmentKind::Environment,
        SegmentKind::Body,
        SegmentKind::Wardrobe,
        SegmentKind::Realism,
        SegmentKind::TechSpecs,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Framing => "framing",
            Self::Archetype => "archetype",
            Self::Action => "action",
            Self::Environment => "environment",
            Self::Body => "body",
            Self::Wardrobe => "wardrobe",
            Self::Realism => "realism",
            Self::TechSpecs => "tech_specs",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub kind: SegmentKind,
    pub text: String,
}

/// Quality problems that degrade a prompt without invalidating it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QualityWarning {
    /// No body description survived scrubbing.
    EmptyBody,
    /// Identity text was removed from the body slot.
    BodyScrubbed { rules: Vec<String> },
    /// The prompt is longer than the text encoder will read.
    TokenBudgetExceeded { estimated: usize, budget: usize },
}

impl std::fmt::Display for QualityWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyBody => f.write_str("body description is empty"),
            Self::BodyScrubbed { rules } => {
                write!(f, "identity text removed from body ({})", rules.join(", "))
            }
            Self::TokenBudgetExceeded { estimated, budget } => {
                write!(f, "estimated {estimated} tokens exceeds budget of {budget}")
            }
        }
    }
}

/// Output of [`compile`]: all eight slots in order plus the assembled string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledPrompt {
    pub segments: Vec<Segment>,
    pub final_string: String,
    pub negative_prompt: String,
    pub warnings: Vec<QualityWarning>,
}

impl CompiledPrompt {
    /// Text of a single slot (empty when the slot was empty).
    pub fn segment(&self, kind: SegmentKind) -> &str {
        self.segments
            .iter()
            .find(|s| s.kind == kind)
            .map(|s| s.text.as_str())
            .unwrap_or("")
    }
}

// ---------------------------------------------------------------------------
// Compilation
// ---------------------------------------------------------------------------

/// Assemble the final prompt from its components.
///
/// Slots are trimmed and joined with a single space in [`SegmentKind::ORDER`];
/// empty slots leave no separator behind. The body slot is scrubbed first.
pub fn compile(components: &PromptComponents) -> CompiledPrompt {
    let mut warnings = Vec::new();

    let raw_body = components.body_stack.trim();
    let leaked = scrub::matched_rules(raw_body);
    let body = scrub::scrub(raw_body);
    if !leaked.is_empty() {
        warnings.push(QualityWarning::BodyScrubbed {
            rules: leaked.into_iter().map(String::from).collect(),
        });
    }
    if body.is_empty() {
        warnings.push(QualityWarning::EmptyBody);
    }

    let segments: Vec<Segment> = SegmentKind::ORDER
        .iter()
        .map(|&kind| {
            let text = match kind {
                SegmentKind::Framing => components.framing.trim().to_string(),
                SegmentKind::Archetype => components.archetype.trim().to_string(),
                SegmentKind::Action => components.action.trim().to_string(),
                SegmentKind::Environment => components.environment.trim().to_string(),
                SegmentKind::Body => body.clone(),
                SegmentKind::Wardrobe => components.wardrobe.trim().to_string(),
                SegmentKind::Realism => components.realism_stack.trim().to_string(),
                SegmentKind::TechSpecs => components.tech_specs.trim().to_string(),
            };
            Segment { kind, text }
        })
        .collect();

    let final_string = segments
        .iter()
        .map(|s| s.text.as_str())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    let estimated = estimate_token_count(&final_string);
    if estimated > TOKEN_BUDGET {
        warnings.push(QualityWarning::TokenBudgetExceeded {
            estimated,
            budget: TOKEN_BUDGET,
        });
    }

    CompiledPrompt {
        segments,
        final_string,
        negative_prompt: NEGATIVE_PROMPT.to_string(),
        warnings,
    }
}

/// Rough CLIP token estimate based on word count.
///
/// Uses the heuristic: tokens ~= words * 1.3.
pub fn estimate_token_count(text: &str) -> usize {
    let word_count = text.split_whitespace().count();
    (word_count as f64 * TOKEN_ESTIMATE_MULTIPLIER).ceil() as usize
}

// ---------------------------------------------------------------------------
// Component derivation
// ---------------------------------------------------------------------------

/// Map a structured record onto the compiler slots.
///
/// Returns `None` for unstructured records, which have no slots.
pub fn components_for(record: &ClassifiedRecord) -> Option<PromptComponents> {
    match record {
        ClassifiedRecord::DenseTraining(dense) => Some(dense_components(dense)),
        ClassifiedRecord::RichAnalysis(rich) => Some(rich_components(rich)),
        ClassifiedRecord::SimpleSubject(simple) => Some(simple_components(simple)),
        ClassifiedRecord::Unstructured => None,
    }
}

fn dense_components(record: &DenseTrainingRecord) -> PromptComponents {
    let data = &record.generation_data;
    match &data.components {
        Some(c) if !c.is_empty() => PromptComponents {
            framing: text(&c.framing),
            archetype: text(&c.archetype),
            action: text(&c.action),
            environment: text(&c.environment),
            body_stack: text(&c.body_stack),
            wardrobe: text(&c.wardrobe),
            realism_stack: text(&c.realism_stack),
            tech_specs: text(&c.tech_specs),
        },
        // Only the pre-compiled string is available; it travels whole.
        _ => PromptComponents {
            action: text(&data.final_prompt_string),
            ..PromptComponents::default()
        },
    }
}

fn rich_components(record: &RichAnalysisRecord) -> PromptComponents {
    let anatomy = &record.anatomical_details;
    PromptComponents {
        framing: text(&record.tech_meta.framing),
        archetype: join(&[&record.subject_core.identity, &record.subject_core.styling]),
        action: join(&[
            &anatomy.posture_and_spine,
            &anatomy.limb_placement,
            &anatomy.hands_and_fingers,
            &anatomy.head_and_gaze,
        ]),
        environment: join_with_elements(&record.environment.setting, &record.environment.elements),
        body_stack: text(&anatomy.body_morphology),
        wardrobe: record.attire.describe().unwrap_or_default(),
        realism_stack: join(&[
            &record.texture.skin,
            &record.texture.fabric,
            &record.tech_meta.visual_fidelity,
        ]),
        tech_specs: join(&[
            &record.tech_meta.medium,
            &record.atmosphere.lighting_source,
            &record.atmosphere.mood,
        ]),
    }
}

fn simple_components(record: &SimpleSubjectRecord) -> PromptComponents {
    let subject = &record.subject;
    let tech = &record.tech_specs;
    PromptComponents {
        framing: text(&tech.framing),
        archetype: text(&subject.description),
        action: text(&subject.expression),
        environment: join_with_elements(&record.background.description, &record.background.elements),
        body_stack: text(&subject.body),
        wardrobe: subject.clothing.describe().unwrap_or_default(),
        realism_stack: join(&[&subject.imperfections, &tech.visual_fidelity]),
        tech_specs: join(&[&tech.medium, &tech.lighting_physics]),
    }
}

fn text(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn join(parts: &[&Option<String>]) -> String {
    parts
        .iter()
        .filter_map(|p| p.as_deref())
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_with_elements(lead: &Option<String>, elements: &[String]) -> String {
    lead.iter()
        .map(String::as_str)
        .chain(elements.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(", ")
}

// ---------------------------------------------------------------------------
// Finalisation
// ---------------------------------------------------------------------------

/// A compiled prompt ready for storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinalPrompt {
    /// The assembled prompt after a whole-string identity scrub.
    pub text: String,
    pub negative_prompt: String,
    pub warnings: Vec<QualityWarning>,
    pub compiled: CompiledPrompt,
}

/// Derive components, compile, and scrub the assembled string.
///
/// Returns `None` for unstructured records.
pub fn finalize(record: &ClassifiedRecord) -> Option<FinalPrompt> {
    let components = components_for(record)?;
    let mut compiled = compile(&components);
    // The body already sits inside the pre-compiled string.
    if carries_precompiled(record) {
        compiled.warnings.retain(|w| *w != QualityWarning::EmptyBody);
    }
    Some(FinalPrompt {
        text: scrub::scrub(&compiled.final_string),
        negative_prompt: compiled.negative_prompt.clone(),
        warnings: compiled.warnings.clone(),
        compiled,
    })
}

fn carries_precompiled(record: &ClassifiedRecord) -> bool {
    match record {
        ClassifiedRecord::DenseTraining(dense) => {
            !matches!(&dense.generation_data.components, Some(c) if !c.is_empty())
        }
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a positive prompt: must be non-empty and within length limit.
pub fn validate_prompt(text: &str) -> Result<(), CoreError> {
    if text.trim().is_empty() {
        return Err(CoreError::Validation(
            "Positive prompt must not be empty".to_string(),
        ));
    }
    if text.len() > MAX_PROMPT_LENGTH {
        return Err(CoreError::Validation(format!(
            "Positive prompt exceeds maximum length of {MAX_PROMPT_LENGTH} characters (got {})",
            text.len()
        )));
    }
    Ok(())
}

/// Validate a negative prompt: length check only (can be empty).
pub fn validate_negative_prompt(text: &str) -> Result<(), CoreError> {
    if text.len() > MAX_NEGATIVE_PROMPT_LENGTH {
        return Err(CoreError::Validation(format!(
            "Negative prompt exceeds maximum length of {MAX_NEGATIVE_PROMPT_LENGTH} characters (got {})",
            text.len()
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
