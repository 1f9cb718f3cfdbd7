//! Typed views over the JSON shapes model producers emit.
//!
//! Every field is optional and deserialised leniently: a value of the wrong
//! JSON type is treated as absent, scalars are coerced to text, and a
//! single string stands in for a one-element list. Deserialising any JSON
//! object into these structs therefore cannot fail.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Lenient field decoders
// ---------------------------------------------------------------------------

/// Coerce a JSON value to display text.
///
/// Strings are trimmed (blank -> `None`), numbers and booleans are
/// stringified, arrays are flattened and joined with `", "`; objects and
/// `null` have no text form.
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(value_text).collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        Value::Object(_) | Value::Null => None,
    }
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_text(&value))
}

fn lenient_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items.iter().filter_map(value_text).collect(),
        other => value_text(&other).into_iter().collect(),
    })
}

fn lenient_section<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Object(_) => serde_json::from_value(value).unwrap_or_default(),
        _ => T::default(),
    })
}

fn lenient_optional_section<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Object(_) => serde_json::from_value(value).ok(),
        _ => None,
    })
}

fn lenient_clothing<'de, D>(deserializer: D) -> Result<Option<ClothingItem>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Object(_) => serde_json::from_value::<ClothingItem>(value)
            .ok()
            .filter(|item| !item.is_empty()),
        other => value_text(&other).map(|kind| ClothingItem {
            kind: Some(kind),
            color: None,
        }),
    })
}

/// Deserialise a parsed object into a schema view, falling back to the
/// empty view for anything that is not an object.
pub fn view<T: DeserializeOwned + Default>(value: &Value) -> T {
    match value {
        Value::Object(_) => serde_json::from_value(value.clone()).unwrap_or_default(),
        _ => T::default(),
    }
}

// ---------------------------------------------------------------------------
// Shared pieces
// ---------------------------------------------------------------------------

/// One garment, given either as a bare string or as `{type, color}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClothingItem {
    #[serde(rename = "type", default, deserialize_with = "lenient_text")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub color: Option<String>,
}

impl ClothingItem {
    pub fn is_empty(&self) -> bool {
        self.kind.is_none() && self.color.is_none()
    }

    /// Prompt phrase for the garment, e.g. `"white tank top"`.
    pub fn describe(&self) -> Option<String> {
        match (self.color.as_deref(), self.kind.as_deref()) {
            (Some(color), Some(kind)) => Some(format!("{color} {kind}")),
            (None, Some(kind)) => Some(kind.to_string()),
            (Some(color), None) => Some(color.to_string()),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attire {
    #[serde(default, deserialize_with = "lenient_clothing")]
    pub top: Option<ClothingItem>,
    #[serde(default, deserialize_with = "lenient_clothing")]
    pub bottom: Option<ClothingItem>,
}

impl Attire {
    /// Garment phrases joined with `", "`, or `None` when nothing is worn.
    pub fn describe(&self) -> Option<String> {
        let parts: Vec<String> = [&self.top, &self.bottom]
            .into_iter()
            .flatten()
            .filter_map(ClothingItem::describe)
            .collect();
        (!parts.is_empty()).then(|| parts.join(", "))
    }
}

// ---------------------------------------------------------------------------
// Dense training records
// ---------------------------------------------------------------------------

/// `{"generation_data": {...}}`: a pre-compiled prompt plus reference-image
/// weighting, used for likeness fine-tuning datasets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DenseTrainingRecord {
    #[serde(default, deserialize_with = "lenient_section")]
    pub generation_data: GenerationData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationData {
    #[serde(default, deserialize_with = "lenient_text")]
    pub final_prompt_string: Option<String>,
    #[serde(default, deserialize_with = "lenient_optional_section")]
    pub components: Option<DenseComponents>,
    #[serde(default, deserialize_with = "lenient_optional_section")]
    pub reference_logic: Option<ReferenceLogic>,
}

/// The eight compiler slots as a dense record carries them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenseComponents {
    #[serde(default, deserialize_with = "lenient_text")]
    pub framing: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub archetype: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub action: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub environment: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub body_stack: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub wardrobe: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub realism_stack: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub tech_specs: Option<String>,
}

impl DenseComponents {
    pub fn is_empty(&self) -> bool {
        [
            &self.framing,
            &self.archetype,
            &self.action,
            &self.environment,
            &self.body_stack,
            &self.wardrobe,
            &self.realism_stack,
            &self.tech_specs,
        ]
        .iter()
        .all(|slot| slot.is_none())
    }
}

/// Which reference images carry identity, and how they are weighted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceLogic {
    #[serde(default, deserialize_with = "lenient_text")]
    pub primary_ref: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub secondary_ref: Option<String>,
}

// ---------------------------------------------------------------------------
// Rich analysis records
// ---------------------------------------------------------------------------

/// `{"subject_core": {...}, ...}`: the multi-section breakdown produced by
/// an image-analysis pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RichAnalysisRecord {
    #[serde(default, deserialize_with = "lenient_section")]
    pub subject_core: SubjectCore,
    #[serde(default, deserialize_with = "lenient_section")]
    pub atmosphere: AtmosphereSection,
    #[serde(default, deserialize_with = "lenient_section")]
    pub anatomical_details: AnatomicalDetails,
    #[serde(default, deserialize_with = "lenient_section")]
    pub attire: Attire,
    #[serde(default, deserialize_with = "lenient_section")]
    pub environment: EnvironmentSection,
    #[serde(default, deserialize_with = "lenient_section")]
    pub tech_meta: TechSection,
    #[serde(default, deserialize_with = "lenient_section")]
    pub texture: TextureSection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectCore {
    #[serde(default, deserialize_with = "lenient_text")]
    pub identity: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub styling: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtmosphereSection {
    #[serde(default, deserialize_with = "lenient_text")]
    pub mood: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub lighting_source: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnatomicalDetails {
    #[serde(default, deserialize_with = "lenient_text")]
    pub body_morphology: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub head_and_gaze: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub posture_and_spine: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub hands_and_fingers: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub limb_placement: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSection {
    #[serde(default, deserialize_with = "lenient_text")]
    pub setting: Option<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub elements: Vec<String>,
}

/// Technical metadata shared by rich (`tech_meta`) and simple
/// (`tech_specs`) records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechSection {
    #[serde(default, deserialize_with = "lenient_text")]
    pub medium: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub visual_fidelity: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub framing: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub lighting_physics: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureSection {
    #[serde(default, deserialize_with = "lenient_text")]
    pub skin: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub fabric: Option<String>,
}

// ---------------------------------------------------------------------------
// Simple subject/background records
// ---------------------------------------------------------------------------

/// `{"subject": {...}, "background": {...}}`: the loose two-part shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimpleSubjectRecord {
    #[serde(default, deserialize_with = "lenient_section")]
    pub subject: SubjectSection,
    #[serde(default, deserialize_with = "lenient_section")]
    pub background: BackgroundSection,
    #[serde(default, deserialize_with = "lenient_section")]
    pub tech_specs: TechSection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectSection {
    #[serde(default, deserialize_with = "lenient_text")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub expression: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub body: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub imperfections: Option<String>,
    #[serde(default, deserialize_with = "lenient_section")]
    pub clothing: Attire,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackgroundSection {
    #[serde(default, deserialize_with = "lenient_text")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub elements: Vec<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn value_text_coerces_scalars_and_lists() {
        assert_eq!(value_text(&json!("  hi ")), Some("hi".into()));
        assert_eq!(value_text(&json!("   ")), None);
        assert_eq!(value_text(&json!(3)), Some("3".into()));
        assert_eq!(value_text(&json!(true)), Some("true".into()));
        assert_eq!(value_text(&json!(["a", 1, null, ""])), Some("a, 1".into()));
        assert_eq!(value_text(&json!({"a": 1})), None);
        assert_eq!(value_text(&json!(null)), None);
    }

    #[test]
    fn wrong_types_become_absent() {
        let record: RichAnalysisRecord = view(&json!({
            "subject_core": "not an object",
            "atmosphere": {"mood": {"nested": true}, "lighting_source": 5600},
            "environment": {"elements": "single element"},
        }));
        assert_eq!(record.subject_core, SubjectCore::default());
        assert_eq!(record.atmosphere.mood, None);
        assert_eq!(record.atmosphere.lighting_source.as_deref(), Some("5600"));
        assert_eq!(record.environment.elements, vec!["single element".to_string()]);
    }

    #[test]
    fn clothing_accepts_string_or_object() {
        let attire: Attire = view(&json!({
            "top": "linen shirt",
            "bottom": {"type": "jeans", "color": "indigo"},
        }));
        assert_eq!(attire.describe().as_deref(), Some("linen shirt, indigo jeans"));
    }

    #[test]
    fn empty_clothing_object_is_absent() {
        let attire: Attire = view(&json!({"top": {}, "bottom": null}));
        assert_eq!(attire.top, None);
        assert_eq!(attire.describe(), None);
    }

    #[test]
    fn dense_components_detect_emptiness() {
        let record: DenseTrainingRecord = view(&json!({
            "generation_data": {"final_prompt_string": "x", "components": {}}
        }));
        let components = record.generation_data.components.unwrap();
        assert!(components.is_empty());
    }

    #[test]
    fn view_of_non_object_is_default() {
        let record: SimpleSubjectRecord = view(&json!([1, 2]));
        assert_eq!(record, SimpleSubjectRecord::default());
    }
}
