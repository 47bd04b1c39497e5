use thiserror::Error;

use super::types::{
    empty_object, ItemFlag, Lenient, ModelItem, ModelResponse, NormalizedItem, PipelineOutput,
};
use crate::keywords::{classify_header, companion_field, CompanionField, HeaderGroup};
use crate::line_items::RawItem;
use crate::numbers::{parse_number, uses_decimal_comma};

/// Largest quantity still accepted as a piece count.
pub const MAX_PIECE_QUANTITY: f64 = 100_000.0;

pub const DEFAULT_CONFIDENCE: f64 = 0.7;
pub const REPAIR_PENALTY: f64 = 0.1;
pub const UNIT_FIX_PENALTY: f64 = 0.05;
pub const FALLBACK_CONFIDENCE_CAP: f64 = 0.2;

/// The model returned a different number of items than it was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("expected {expected} items, model returned {actual}")]
pub struct CardinalityMismatch {
    pub expected: usize,
    pub actual: usize,
}

/// Check the item count and restore raw order.
///
/// Items are reordered only when their `raw_index` values form a complete
/// 0-based or 1-based permutation; otherwise the returned order is kept.
pub fn align_items(
    items: Vec<ModelItem>,
    expected: usize,
) -> Result<Vec<ModelItem>, CardinalityMismatch> {
    if items.len() != expected {
        return Err(CardinalityMismatch {
            expected,
            actual: items.len(),
        });
    }

    let indices: Option<Vec<usize>> = items
        .iter()
        .map(|item| item.raw_index.as_ref().and_then(Lenient::as_index))
        .collect();
    let Some(indices) = indices else {
        return Ok(items);
    };

    let Some(base) = permutation_base(&indices) else {
        return Ok(items);
    };

    let mut slots: Vec<Option<ModelItem>> = vec![None; expected];
    for (item, index) in items.into_iter().zip(indices) {
        slots[index - base] = Some(item);
    }
    Ok(slots.into_iter().flatten().collect())
}

fn permutation_base(indices: &[usize]) -> Option<usize> {
    let mut sorted = indices.to_vec();
    sorted.sort_unstable();
    [0, 1].into_iter().find(|base| {
        sorted
            .iter()
            .enumerate()
            .all(|(position, index)| *index == position + base)
    })
}

/// Build the final output from a model response whose items match the raw
/// items one to one.
pub fn finalize_output(
    raw_items: &[RawItem],
    response: ModelResponse,
    repaired: bool,
) -> Result<PipelineOutput, CardinalityMismatch> {
    let model_confidence = response.confidence();
    let items = align_items(response.items, raw_items.len())?;

    let mut notes = response.extraction_notes;
    if repaired {
        notes.push(format!(
            "item count corrected by a repair request ({} items)",
            raw_items.len()
        ));
    }

    let mut fixes = 0;
    let items: Vec<NormalizedItem> = raw_items
        .iter()
        .zip(items)
        .map(|(raw, item)| {
            let (normalized, fixed) = normalize_item(raw, &item, &mut notes);
            fixes += usize::from(fixed);
            normalized
        })
        .collect();

    let needs_review = items
        .iter()
        .any(|item| item.is_flagged(ItemFlag::SuspectQuantityNulled));

    Ok(PipelineOutput {
        document_understanding: response.document_understanding.unwrap_or_else(empty_object),
        metadata: response.metadata.unwrap_or_else(empty_object),
        items,
        extraction_notes: notes,
        confidence: adjust_confidence(model_confidence, repaired, fixes),
        needs_review,
    })
}

/// Output built from the raw items alone, used when the model could not be
/// brought to the right item count.
pub fn fallback_output(
    raw_items: &[RawItem],
    reason: &str,
    model_confidence: Option<f64>,
) -> PipelineOutput {
    let mut notes = vec![format!(
        "model normalization abandoned ({reason}); {} items passed through from the table",
        raw_items.len()
    )];
    let items = pass_through_items(raw_items, &mut notes);
    let confidence = model_confidence
        .unwrap_or(DEFAULT_CONFIDENCE)
        .clamp(0.0, 1.0)
        .min(FALLBACK_CONFIDENCE_CAP);

    PipelineOutput {
        document_understanding: empty_object(),
        metadata: empty_object(),
        items,
        extraction_notes: notes,
        confidence,
        needs_review: true,
    }
}

/// Normalize raw items by header classification only.
pub fn pass_through_items(raw_items: &[RawItem], notes: &mut Vec<String>) -> Vec<NormalizedItem> {
    raw_items
        .iter()
        .map(|raw| {
            let (mut item, _) = normalize_item(raw, &model_item_from_raw(raw), notes);
            item.flags.push(ItemFlag::PassThrough);
            item
        })
        .collect()
}

/// Model confidence clamped to `[0, 1]` and reduced for each correction.
pub fn adjust_confidence(model: Option<f64>, repaired: bool, unit_fixes: usize) -> f64 {
    let mut confidence = model.unwrap_or(DEFAULT_CONFIDENCE).clamp(0.0, 1.0);
    if repaired {
        confidence -= REPAIR_PENALTY;
    }
    confidence -= UNIT_FIX_PENALTY * unit_fixes as f64;
    confidence.clamp(0.0, 1.0)
}

fn model_item_from_raw(raw: &RawItem) -> ModelItem {
    let joined = |group: HeaderGroup, sep: &str| -> Option<Lenient> {
        let values: Vec<&str> = raw
            .fields
            .iter()
            .filter(|f| !f.value.is_empty() && companion_field(&f.header).is_none())
            .filter(|f| classify_header(&f.header).contains(group))
            .map(|f| f.value.as_str())
            .collect();
        (!values.is_empty()).then(|| Lenient::Text(values.join(sep)))
    };
    let companion = |field: CompanionField| -> Option<Lenient> {
        raw.fields
            .iter()
            .find(|f| !f.value.is_empty() && companion_field(&f.header) == Some(field))
            .map(|f| Lenient::Text(f.value.clone()))
    };

    let remarks: Vec<String> = raw
        .fields
        .iter()
        .filter(|f| !f.value.is_empty() && companion_field(&f.header).is_none())
        .filter(|f| {
            let groups = classify_header(&f.header);
            groups.is_empty()
                || groups
                    .iter()
                    .all(|g| matches!(g, HeaderGroup::Revision | HeaderGroup::Approval))
        })
        .map(|f| format!("{}: {}", f.header, f.value))
        .collect();

    ModelItem {
        raw_index: Some(Lenient::Number(raw.index as f64)),
        description: joined(HeaderGroup::Description, " "),
        material_spec: joined(HeaderGroup::Material, " "),
        quantity: joined(HeaderGroup::Quantity, " "),
        unit: joined(HeaderGroup::Unit, " "),
        size: joined(HeaderGroup::Dimension, " x "),
        weight_kg: companion(CompanionField::Weight),
        length_m: companion(CompanionField::Length),
        area_m2: companion(CompanionField::Area),
        remarks: (!remarks.is_empty()).then(|| Lenient::Text(remarks.join("; "))),
    }
}

/// What a unit string measures, with the factor to kg, m or m².
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnitKind {
    Piece,
    Weight(f64),
    Length(f64),
    Area(f64),
    Other,
}

impl UnitKind {
    fn companion(self) -> Option<(CompanionField, f64)> {
        match self {
            UnitKind::Weight(factor) => Some((CompanionField::Weight, factor)),
            UnitKind::Length(factor) => Some((CompanionField::Length, factor)),
            UnitKind::Area(factor) => Some((CompanionField::Area, factor)),
            UnitKind::Piece | UnitKind::Other => None,
        }
    }
}

/// Classify a unit of measure. An empty unit counts as pieces.
pub fn unit_kind(unit: &str) -> UnitKind {
    let unit: String = unit
        .trim()
        .to_ascii_uppercase()
        .replace('²', "2")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();

    match unit.as_str() {
        "" | "EA" | "EACH" | "PC" | "PCS" | "SET" | "SETS" | "NOS" | "NO" | "NR" | "UNIT"
        | "UNITS" => UnitKind::Piece,
        "KG" | "KGS" => UnitKind::Weight(1.0),
        "T" | "TON" | "TONS" | "MT" => UnitKind::Weight(1000.0),
        "LB" | "LBS" => UnitKind::Weight(0.453_592_37),
        "G" => UnitKind::Weight(0.001),
        "M" | "MTR" | "MTRS" | "LM" | "RM" => UnitKind::Length(1.0),
        "MM" => UnitKind::Length(0.001),
        "FT" => UnitKind::Length(0.3048),
        "M2" | "SQM" | "SQMTR" => UnitKind::Area(1.0),
        _ => UnitKind::Other,
    }
}

const WEIGHT_MARKERS: &[&str] = &["kg", "kgs", "ton", "tons", "lbs"];
const LENGTH_MARKERS: &[&str] = &["mtr", "mtrs", "lm", "rm"];
const AREA_MARKERS: &[&str] = &["m2", "sqm"];

/// Companion field the raw row points at: a weight/length/area column, a
/// unit cell naming such a unit, or a unit marker written in a cell.
fn raw_companion(raw: &RawItem) -> Option<(CompanionField, f64)> {
    if let Some(field) = raw
        .fields
        .iter()
        .filter(|f| !f.value.is_empty())
        .find_map(|f| companion_field(&f.header))
    {
        return Some((field, 1.0));
    }

    if let Some(found) = raw
        .value_for(HeaderGroup::Unit)
        .and_then(|unit| unit_kind(unit).companion())
    {
        return Some(found);
    }

    raw.fields.iter().find_map(|f| marker_in(&f.value))
}

fn marker_in(value: &str) -> Option<(CompanionField, f64)> {
    let lowered = value.to_lowercase();
    lowered
        .split(|c: char| c.is_whitespace() || matches!(c, '/' | '(' | ')' | ',' | ';'))
        .map(|token| token.trim_start_matches(|c: char| c.is_ascii_digit() || c == '.'))
        .find_map(|token| {
            if WEIGHT_MARKERS.contains(&token) {
                Some((CompanionField::Weight, 1.0))
            } else if LENGTH_MARKERS.contains(&token) {
                Some((CompanionField::Length, 1.0))
            } else if AREA_MARKERS.contains(&token) {
                Some((CompanionField::Area, 1.0))
            } else {
                None
            }
        })
}

fn text(value: &Option<Lenient>) -> Option<String> {
    value.as_ref().and_then(Lenient::as_text)
}

fn number(value: &Option<Lenient>) -> Option<f64> {
    value.as_ref().and_then(Lenient::as_f64)
}

/// Convert one model item, correcting quantity/unit confusion against the
/// raw row. Returns the item and whether a correction was made.
fn normalize_item(
    raw: &RawItem,
    item: &ModelItem,
    notes: &mut Vec<String>,
) -> (NormalizedItem, bool) {
    let mut out = NormalizedItem {
        raw_index: raw.index,
        description: text(&item.description)
            .or_else(|| raw.value_for(HeaderGroup::Description).map(str::to_string)),
        material_spec: text(&item.material_spec),
        quantity: None,
        unit: text(&item.unit),
        size: text(&item.size),
        weight_kg: number(&item.weight_kg),
        length_m: number(&item.length_m),
        area_m2: number(&item.area_m2),
        remarks: text(&item.remarks),
        flags: Vec::new(),
    };

    let Some(quantity) = number(&item.quantity) else {
        return (out, false);
    };

    let kind = unit_kind(out.unit.as_deref().unwrap_or(""));
    let raw_cell = raw.value_for(HeaderGroup::Quantity).unwrap_or("");
    let suspect = quantity.fract() != 0.0
        || quantity < 0.0
        || quantity > MAX_PIECE_QUANTITY
        || kind.companion().is_some()
        || uses_decimal_comma(raw_cell);

    if !suspect {
        out.quantity = Some(quantity as u64);
        return (out, false);
    }

    let unit_label = out.unit.clone().unwrap_or_default();
    let target = kind.companion().or_else(|| raw_companion(raw));
    let moved = match target {
        Some((CompanionField::Weight, factor)) if out.weight_kg.is_none() && quantity >= 0.0 => {
            out.weight_kg = Some(quantity * factor);
            Some((ItemFlag::QuantityMovedToWeight, "weight_kg"))
        }
        Some((CompanionField::Length, factor)) if out.length_m.is_none() && quantity >= 0.0 => {
            out.length_m = Some(quantity * factor);
            Some((ItemFlag::QuantityMovedToLength, "length_m"))
        }
        Some((CompanionField::Area, factor)) if out.area_m2.is_none() && quantity >= 0.0 => {
            out.area_m2 = Some(quantity * factor);
            Some((ItemFlag::QuantityMovedToArea, "area_m2"))
        }
        _ => None,
    };

    match moved {
        Some((flag, field)) => {
            out.unit = None;
            out.flags.push(flag);
            notes.push(format!(
                "item {}: quantity {quantity} {unit_label} is not a piece count; moved to {field}",
                raw.index
            ));
        }
        None => {
            out.flags.push(ItemFlag::SuspectQuantityNulled);
            notes.push(format!(
                "item {}: quantity {quantity} {unit_label} is not a piece count; cleared for review",
                raw.index
            ));
        }
    }

    (out, true)
}
