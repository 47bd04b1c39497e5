use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::numbers::parse_number;
use crate::table::PageRange;

/// Document-level context handed to the model alongside the raw items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentContext {
    pub source: Option<String>,
    pub page_range: Option<PageRange>,
    pub text: String,
}

/// Why an item was altered or needs a human look.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemFlag {
    QuantityMovedToWeight,
    QuantityMovedToLength,
    QuantityMovedToArea,
    SuspectQuantityNulled,
    PassThrough,
}

/// A validated line item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedItem {
    pub raw_index: usize,
    pub description: Option<String>,
    pub material_spec: Option<String>,
    pub quantity: Option<u64>,
    pub unit: Option<String>,
    pub size: Option<String>,
    pub weight_kg: Option<f64>,
    pub length_m: Option<f64>,
    pub area_m2: Option<f64>,
    pub remarks: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<ItemFlag>,
}

impl NormalizedItem {
    pub fn is_flagged(&self, flag: ItemFlag) -> bool {
        self.flags.contains(&flag)
    }
}

/// Final output of the normalization stage.
///
/// Notes are kept one per entry and serialized as a single newline-joined
/// string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub document_understanding: Value,
    pub metadata: Value,
    pub items: Vec<NormalizedItem>,
    #[serde(
        default,
        serialize_with = "joined_notes",
        deserialize_with = "lenient_notes"
    )]
    pub extraction_notes: Vec<String>,
    pub confidence: f64,
    pub needs_review: bool,
}

/// A scalar the model may send as a number, a string or a boolean.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Lenient {
    Number(f64),
    Text(String),
    Bool(bool),
}

impl Lenient {
    /// Numeric value; strings are parsed leniently (`"12,5"`, `"1,250"`).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Lenient::Number(n) if n.is_finite() => Some(*n),
            Lenient::Number(_) => None,
            Lenient::Text(s) => parse_number(s),
            Lenient::Bool(_) => None,
        }
    }

    /// Text value, `None` when blank.
    pub fn as_text(&self) -> Option<String> {
        let text = match self {
            Lenient::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            Lenient::Number(n) => n.to_string(),
            Lenient::Text(s) => s.trim().to_string(),
            Lenient::Bool(b) => b.to_string(),
        };
        let lowered = text.to_ascii_lowercase();
        if text.is_empty() || lowered == "null" || lowered == "n/a" {
            None
        } else {
            Some(text)
        }
    }

    /// Non-negative integer value, used for indices.
    pub fn as_index(&self) -> Option<usize> {
        self.as_f64()
            .filter(|n| *n >= 0.0 && n.fract() == 0.0)
            .map(|n| n as usize)
    }
}

/// One item as the model returned it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ModelItem {
    #[serde(alias = "index")]
    pub raw_index: Option<Lenient>,
    pub description: Option<Lenient>,
    #[serde(alias = "material", alias = "spec")]
    pub material_spec: Option<Lenient>,
    pub quantity: Option<Lenient>,
    pub unit: Option<Lenient>,
    pub size: Option<Lenient>,
    #[serde(alias = "weight")]
    pub weight_kg: Option<Lenient>,
    #[serde(alias = "length")]
    pub length_m: Option<Lenient>,
    #[serde(alias = "area")]
    pub area_m2: Option<Lenient>,
    #[serde(alias = "notes")]
    pub remarks: Option<Lenient>,
}

/// The JSON object the model is asked to produce. Only `items` is required.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ModelResponse {
    #[serde(default)]
    pub document_understanding: Option<Value>,
    #[serde(default)]
    pub metadata: Option<Value>,
    pub items: Vec<ModelItem>,
    #[serde(default, deserialize_with = "lenient_notes")]
    pub extraction_notes: Vec<String>,
    #[serde(default)]
    pub confidence: Option<Lenient>,
}

impl ModelResponse {
    pub fn confidence(&self) -> Option<f64> {
        self.confidence.as_ref().and_then(Lenient::as_f64)
    }
}

pub(crate) fn empty_object() -> Value {
    Value::Object(Map::new())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NotesRepr {
    One(String),
    Many(Vec<Value>),
}

fn joined_notes<S: Serializer>(notes: &[String], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&notes.join("\n"))
}

fn lenient_notes<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let notes = match Option::<NotesRepr>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(NotesRepr::One(note)) if note.trim().is_empty() => Vec::new(),
        Some(NotesRepr::One(note)) => vec![note],
        Some(NotesRepr::Many(values)) => values
            .into_iter()
            .filter_map(|value| match value {
                Value::Null => None,
                Value::String(s) => Some(s),
                other => Some(other.to_string()),
            })
            .collect(),
    };
    Ok(notes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lenient_numbers_from_strings() {
        let value: Lenient = serde_json::from_str(r#""12,5""#).unwrap();
        assert_eq!(value.as_f64(), Some(12.5));
        let value: Lenient = serde_json::from_str("4").unwrap();
        assert_eq!(value.as_f64(), Some(4.0));
        assert_eq!(value.as_text().as_deref(), Some("4"));
        assert_eq!(value.as_index(), Some(4));
    }

    #[test]
    fn test_lenient_blank_text_is_none() {
        assert_eq!(Lenient::Text("  ".into()).as_text(), None);
        assert_eq!(Lenient::Text("N/A".into()).as_text(), None);
        assert_eq!(Lenient::Text("Pipe".into()).as_text().as_deref(), Some("Pipe"));
    }

    #[test]
    fn test_model_response_accepts_loose_shapes() {
        let response: ModelResponse = serde_json::from_str(
            r#"{
                "items": [{"index": "0", "material": "A105", "quantity": "4", "extra": 1}],
                "extraction_notes": "one note",
                "confidence": "0.8"
            }"#,
        )
        .unwrap();

        assert_eq!(response.items.len(), 1);
        assert_eq!(response.items[0].raw_index.as_ref().and_then(Lenient::as_index), Some(0));
        assert_eq!(
            response.items[0].material_spec.as_ref().and_then(Lenient::as_text).as_deref(),
            Some("A105")
        );
        assert_eq!(response.extraction_notes, vec!["one note".to_string()]);
        assert_eq!(response.confidence(), Some(0.8));
    }

    #[test]
    fn test_pipeline_output_notes_serialize_as_one_string() {
        let output = PipelineOutput {
            document_understanding: empty_object(),
            metadata: empty_object(),
            items: Vec::new(),
            extraction_notes: vec!["first".into(), "second".into()],
            confidence: 0.5,
            needs_review: false,
        };

        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["extraction_notes"], "first\nsecond");

        let back: PipelineOutput = serde_json::from_value(json).unwrap();
        assert_eq!(back.extraction_notes, vec!["first\nsecond".to_string()]);
    }

    #[test]
    fn test_model_response_requires_items() {
        assert!(serde_json::from_str::<ModelResponse>(r#"{"confidence": 1}"#).is_err());
    }
}
