//! Table candidate scoring
//!
//! Scores how much a table looks like a line-item table. Scoring is additive:
//! every contribution is recorded in [`ScoreResult::reasons`] and the total
//! is always the sum of those contributions.

use serde::{Deserialize, Serialize};

use crate::keywords::{classify_header, GroupSet, HeaderGroup};
use crate::numbers::is_numeric;
use crate::table::TableCandidate;

/// Minimum score a table needs to be selected as the line-item table.
pub const MIN_SCORE_THRESHOLD: i32 = 45;

/// Number of data rows sampled for the numeric-density metrics.
pub const SAMPLE_ROWS: usize = 10;

/// Scoring weights. Tuned against sample documents; override them in the
/// `[scoring]` section of the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub item: i32,
    pub description: i32,
    pub quantity: i32,
    pub material: i32,
    pub dimension: i32,
    pub unit: i32,
    pub revision_penalty: i32,
    pub approval_penalty: i32,
    pub line_item_override: i32,
    pub multi_group_bonus: i32,
    pub multi_group_min: usize,
    pub quantity_numeric_bonus: i32,
    pub quantity_numeric_ratio: f64,
    pub min_score_threshold: i32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            item: 40,
            description: 30,
            quantity: 30,
            material: 20,
            dimension: 15,
            unit: 10,
            revision_penalty: -30,
            approval_penalty: -20,
            line_item_override: 60,
            multi_group_bonus: 20,
            multi_group_min: 3,
            quantity_numeric_bonus: 10,
            quantity_numeric_ratio: 0.6,
            min_score_threshold: MIN_SCORE_THRESHOLD,
        }
    }
}

impl ScoringWeights {
    fn group_weight(&self, group: HeaderGroup) -> i32 {
        match group {
            HeaderGroup::Item => self.item,
            HeaderGroup::Description => self.description,
            HeaderGroup::Quantity => self.quantity,
            HeaderGroup::Material => self.material,
            HeaderGroup::Dimension => self.dimension,
            HeaderGroup::Unit => self.unit,
            HeaderGroup::Revision | HeaderGroup::Approval => 0,
        }
    }
}

/// Flags and metrics derived from a table's headers and sample rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalSet {
    pub has_item_group: bool,
    pub has_description_group: bool,
    pub has_quantity_group: bool,
    pub has_unit_group: bool,
    pub has_material_group: bool,
    pub has_dimension_group: bool,
    pub has_revision_group: bool,
    pub has_approval_group: bool,
    pub line_item_override_applied: bool,
    pub core_group_count: usize,
    pub numeric_cell_ratio: f64,
    pub quantity_numeric_ratio: f64,
    pub sampled_rows: usize,
}

impl SignalSet {
    fn from_groups(present: GroupSet) -> Self {
        SignalSet {
            has_item_group: present.contains(HeaderGroup::Item),
            has_description_group: present.contains(HeaderGroup::Description),
            has_quantity_group: present.contains(HeaderGroup::Quantity),
            has_unit_group: present.contains(HeaderGroup::Unit),
            has_material_group: present.contains(HeaderGroup::Material),
            has_dimension_group: present.contains(HeaderGroup::Dimension),
            has_revision_group: present.contains(HeaderGroup::Revision),
            has_approval_group: present.contains(HeaderGroup::Approval),
            core_group_count: HeaderGroup::CORE
                .iter()
                .filter(|g| present.contains(**g))
                .count(),
            ..SignalSet::default()
        }
    }

    /// True when any header classified into a group.
    pub fn any_group(&self) -> bool {
        self.has_item_group
            || self.has_description_group
            || self.has_quantity_group
            || self.has_unit_group
            || self.has_material_group
            || self.has_dimension_group
            || self.has_revision_group
            || self.has_approval_group
    }

    /// Item, quantity and a description or material column together.
    /// Item and quantity together mark a line-item table; audit columns
    /// are then not penalised.
    pub fn has_item_and_quantity(&self) -> bool {
        self.has_item_group && self.has_quantity_group
    }

    pub fn has_line_item_core(&self) -> bool {
        self.has_item_group
            && self.has_quantity_group
            && (self.has_description_group || self.has_material_group)
    }
}

/// One named contribution to a score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    pub label: String,
    pub points: i32,
}

/// The outcome of scoring one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub score: i32,
    pub signals: SignalSet,
    pub reasons: Vec<Contribution>,
}

impl ScoreResult {
    fn new(signals: SignalSet, reasons: Vec<Contribution>) -> Self {
        ScoreResult {
            score: reasons.iter().map(|r| r.points).sum(),
            signals,
            reasons,
        }
    }

    /// Reasons rendered as `"+40 item/line-number column"`.
    pub fn reason_lines(&self) -> Vec<String> {
        self.reasons
            .iter()
            .map(|r| format!("{:+} {}", r.points, r.label))
            .collect()
    }
}

fn push(reasons: &mut Vec<Contribution>, points: i32, label: impl Into<String>) {
    if points != 0 {
        reasons.push(Contribution {
            label: label.into(),
            points,
        });
    }
}

fn group_label(group: HeaderGroup) -> &'static str {
    match group {
        HeaderGroup::Item => "item/line-number column",
        HeaderGroup::Description => "description column",
        HeaderGroup::Quantity => "quantity column",
        HeaderGroup::Unit => "unit column",
        HeaderGroup::Material => "material/spec column",
        HeaderGroup::Dimension => "size/dimension column",
        HeaderGroup::Revision | HeaderGroup::Approval => "",
    }
}

/// Score a table from its headers and (optionally) its data rows.
///
/// Pass an empty `rows` slice for header-only scoring; row-derived metrics
/// are then zero.
pub fn score(headers: &[String], rows: &[Vec<String>], weights: &ScoringWeights) -> ScoreResult {
    let classes: Vec<GroupSet> = headers.iter().map(|h| classify_header(h)).collect();
    let present = classes
        .iter()
        .fold(GroupSet::empty(), |acc, g| acc.union(*g));
    let mut signals = SignalSet::from_groups(present);
    let mut reasons = Vec::new();

    for group in [
        HeaderGroup::Item,
        HeaderGroup::Description,
        HeaderGroup::Quantity,
        HeaderGroup::Material,
        HeaderGroup::Dimension,
        HeaderGroup::Unit,
    ] {
        if present.contains(group) {
            push(&mut reasons, weights.group_weight(group), group_label(group));
        }
    }

    if signals.core_group_count >= weights.multi_group_min {
        push(
            &mut reasons,
            weights.multi_group_bonus,
            format!("{} core groups co-occur", signals.core_group_count),
        );
    }

    if !signals.has_item_and_quantity() {
        if signals.has_revision_group {
            push(&mut reasons, weights.revision_penalty, "revision/date columns");
        }
        if signals.has_approval_group {
            push(&mut reasons, weights.approval_penalty, "approval/signature columns");
        }
    }
    if (signals.has_revision_group || signals.has_approval_group) && signals.has_line_item_core()
    {
        signals.line_item_override_applied = true;
        push(
            &mut reasons,
            weights.line_item_override,
            "line-item override (item + quantity + description/material)",
        );
    }

    let sample = &rows[..rows.len().min(SAMPLE_ROWS)];
    signals.sampled_rows = sample.len();
    signals.numeric_cell_ratio = numeric_ratio(sample.iter().flat_map(|row| row.iter()));

    if let Some(qty_col) = classes
        .iter()
        .position(|g| g.contains(HeaderGroup::Quantity))
    {
        signals.quantity_numeric_ratio =
            numeric_ratio(sample.iter().filter_map(|row| row.get(qty_col)));
        if !sample.is_empty() && signals.quantity_numeric_ratio >= weights.quantity_numeric_ratio
        {
            push(
                &mut reasons,
                weights.quantity_numeric_bonus,
                "quantity column is numeric",
            );
        }
    }

    ScoreResult::new(signals, reasons)
}

/// Score a candidate using its headers and sample rows.
pub fn score_table(table: &TableCandidate, weights: &ScoringWeights) -> ScoreResult {
    score(&table.headers, &table.rows, weights)
}

fn numeric_ratio<'a>(cells: impl Iterator<Item = &'a String>) -> f64 {
    let (numeric, total) = cells
        .filter(|cell| !cell.trim().is_empty())
        .fold((0usize, 0usize), |(numeric, total), cell| {
            (numeric + usize::from(is_numeric(cell)), total + 1)
        });
    if total == 0 {
        0.0
    } else {
        numeric as f64 / total as f64
    }
}
