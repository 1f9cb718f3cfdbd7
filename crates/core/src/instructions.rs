//! Meta-prompt construction for batch generation.
//!
//! [`build_instructions`] turns a [`GenerationBrief`] into the text sent to
//! the external model for one chunk: the silent-face / loud-body directive,
//! the exact JSON shape to emit, the item count and the list of prompts
//! already produced.

use std::fmt::Write as _;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::classify::Mode;
use crate::error::CoreError;

/// Maximum length of a generation concept in characters.
pub const MAX_CONCEPT_LENGTH: usize = 2_000;

/// Longest avoid-list entry forwarded to the model, in characters.
const AVOID_ENTRY_CHARS: usize = 160;

const DIRECTIVE: &str = "\
You write text-to-image prompts for a likeness fine-tuning dataset.
Identity comes ONLY from the reference image. Never describe the face, \
hair, eyes, skin tone, ethnicity, age or glasses of the subject.
Describe the body densely: build, proportions, musculature, posture, \
limb placement and how clothing sits on the body.
Every prompt must differ from every other prompt in framing, action and environment.";

const DENSE_SHAPE: &str = r#"{"generation_data": {"final_prompt_string": "...", "components": {"framing": "...", "archetype": "...", "action": "...", "environment": "...", "body_stack": "...", "wardrobe": "...", "realism_stack": "...", "tech_specs": "..."}, "reference_logic": {"primary_ref": "...", "secondary_ref": "..."}}}"#;

const RICH_SHAPE: &str = r#"{"subject_core": {"identity": "...", "styling": "..."}, "atmosphere": {"mood": "...", "lighting_source": "..."}, "anatomical_details": {"body_morphology": "...", "head_and_gaze": "...", "posture_and_spine": "...", "hands_and_fingers": "...", "limb_placement": "..."}, "attire": {"top": {"type": "...", "color": "..."}, "bottom": {"type": "...", "color": "..."}}, "environment": {"setting": "...", "elements": ["..."]}, "tech_meta": {"medium": "...", "visual_fidelity": "...", "framing": "..."}, "texture": {"skin": "...", "fabric": "..."}}"#;

const SIMPLE_SHAPE: &str = r#"{"subject": {"description": "...", "expression": "...", "body": "...", "imperfections": "...", "clothing": {"top": "...", "bottom": "..."}}, "background": {"description": "...", "elements": ["..."]}, "tech_specs": {"lighting_physics": "...", "medium": "...", "visual_fidelity": "...", "framing": "..."}}"#;

/// Record shape the model is asked to produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetSchema {
    #[default]
    DenseTraining,
    RichAnalysis,
    SimpleSubject,
}

impl TargetSchema {
    pub fn as_str(self) -> &'static str {
        self.mode().as_str()
    }

    /// The mode a conforming record classifies as.
    pub fn mode(self) -> Mode {
        match self {
            Self::DenseTraining => Mode::DenseTraining,
            Self::RichAnalysis => Mode::RichAnalysis,
            Self::SimpleSubject => Mode::SimpleSubject,
        }
    }

    /// Example JSON object with every recognised field.
    pub fn shape(self) -> &'static str {
        match self {
            Self::DenseTraining => DENSE_SHAPE,
            Self::RichAnalysis => RICH_SHAPE,
            Self::SimpleSubject => SIMPLE_SHAPE,
        }
    }
}

impl FromStr for TargetSchema {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dense_training" | "dense" => Ok(Self::DenseTraining),
            "rich_analysis" | "rich" => Ok(Self::RichAnalysis),
            "simple_subject" | "simple" => Ok(Self::SimpleSubject),
            other => Err(CoreError::Validation(format!(
                "Unknown target schema '{other}'. Must be one of: dense_training, rich_analysis, simple_subject"
            ))),
        }
    }
}

/// What the user wants a batch of prompts about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationBrief {
    pub concept: String,
    pub style: Option<String>,
    pub schema: TargetSchema,
}

impl GenerationBrief {
    pub fn new(concept: impl Into<String>, schema: TargetSchema) -> Self {
        Self {
            concept: concept.into(),
            style: None,
            schema,
        }
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.concept.trim().is_empty() {
            return Err(CoreError::Validation(
                "Generation concept must not be empty".to_string(),
            ));
        }
        if self.concept.len() > MAX_CONCEPT_LENGTH {
            return Err(CoreError::Validation(format!(
                "Generation concept exceeds maximum length of {MAX_CONCEPT_LENGTH} characters (got {})",
                self.concept.len()
            )));
        }
        Ok(())
    }
}

/// Build the model instructions for one chunk of `count` prompts.
///
/// `avoid` lists prompts already accepted; callers pass the most recent
/// entries only.
pub fn build_instructions(brief: &GenerationBrief, count: usize, avoid: &[String]) -> String {
    let mut out = String::with_capacity(2048);
    out.push_str(DIRECTIVE);
    out.push_str("\n\n");

    let _ = writeln!(out, "Concept: {}", brief.concept.trim());
    if let Some(style) = brief.style.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let _ = writeln!(out, "Style: {style}");
    }

    let _ = writeln!(
        out,
        "\nReturn a JSON array of exactly {count} objects and nothing else. \
         Each object must have this shape:\n{}",
        brief.schema.shape()
    );

    if !avoid.is_empty() {
        out.push_str("\nDo not repeat or closely paraphrase any of these existing prompts:\n");
        for prompt in avoid {
            let _ = writeln!(out, "- {}", truncate_chars(prompt, AVOID_ENTRY_CHARS));
        }
    }
    out
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::classify::detect_mode;

    // -- TargetSchema --

    #[test]
    fn schema_parses_names_and_aliases() {
        assert_eq!("dense_training".parse::<TargetSchema>().unwrap(), TargetSchema::DenseTraining);
        assert_eq!(" Rich ".parse::<TargetSchema>().unwrap(), TargetSchema::RichAnalysis);
        assert_matches!("video".parse::<TargetSchema>(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn every_shape_classifies_as_its_mode() {
        for schema in [
            TargetSchema::DenseTraining,
            TargetSchema::RichAnalysis,
            TargetSchema::SimpleSubject,
        ] {
            let value: serde_json::Value = serde_json::from_str(schema.shape()).unwrap();
            assert_eq!(detect_mode(Some(&value)), schema.mode(), "{schema:?}");
        }
    }

    // -- GenerationBrief --

    #[test]
    fn blank_concept_rejected() {
        let brief = GenerationBrief::new("  ", TargetSchema::default());
        assert_matches!(brief.validate(), Err(CoreError::Validation(_)));
    }

    // -- build_instructions --

    #[test]
    fn instructions_name_count_concept_and_shape() {
        let brief = GenerationBrief::new("beach volleyball", TargetSchema::SimpleSubject)
            .with_style("editorial");
        let text = build_instructions(&brief, 5, &[]);
        assert!(text.contains("exactly 5 objects"));
        assert!(text.contains("Concept: beach volleyball"));
        assert!(text.contains("Style: editorial"));
        assert!(text.contains(SIMPLE_SHAPE));
        assert!(!text.contains("Do not repeat"));
    }

    #[test]
    fn instructions_list_avoided_prompts() {
        let brief = GenerationBrief::new("yoga", TargetSchema::DenseTraining);
        let avoid = vec!["warrior pose on a mat".to_string(), "x".repeat(500)];
        let text = build_instructions(&brief, 2, &avoid);
        assert!(text.contains("- warrior pose on a mat\n"));
        assert!(text.contains(&format!("- {}\n", "x".repeat(AVOID_ENTRY_CHARS))));
        assert!(!text.contains(&"x".repeat(AVOID_ENTRY_CHARS + 1)));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }
}
