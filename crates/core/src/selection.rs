use serde::Serialize;

use crate::error::ExtractionError;
use crate::grouping::group_related_line_item_tables;
use crate::scoring::{score_table, ScoreResult, ScoringWeights};
use crate::table::{PageRange, TableCandidate};

/// A scored table with its position in the ranking (1-based).
#[derive(Debug, Clone, Serialize)]
pub struct RankedTable {
    pub rank: usize,
    pub table: TableCandidate,
    pub score: ScoreResult,
}

/// Serializable summary of one ranked table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableDiagnostic {
    pub rank: usize,
    pub pages: PageRange,
    pub score: i32,
    pub row_count: usize,
    pub column_count: usize,
    pub headers: Vec<String>,
    pub reasons: Vec<String>,
    pub line_item_override_applied: bool,
}

impl RankedTable {
    pub fn diagnostic(&self) -> TableDiagnostic {
        TableDiagnostic {
            rank: self.rank,
            pages: self.table.page_range,
            score: self.score.score,
            row_count: self.table.row_count,
            column_count: self.table.column_count,
            headers: self.table.headers.clone(),
            reasons: self.score.reason_lines(),
            line_item_override_applied: self.score.signals.line_item_override_applied,
        }
    }
}

/// Outcome of best-table selection.
#[derive(Debug, Clone, Serialize)]
pub struct TableSelection {
    /// The winner, when it reached the threshold.
    pub best: Option<RankedTable>,
    pub ranked: Vec<RankedTable>,
    pub threshold: i32,
}

impl TableSelection {
    /// The winning table, or `NoLineItemTable` when nothing reached the
    /// threshold.
    pub fn into_best(self) -> Result<RankedTable, ExtractionError> {
        let best_score = self.ranked.first().map(|r| r.score.score);
        self.best.ok_or(ExtractionError::NoLineItemTable {
            best_score,
            threshold: self.threshold,
        })
    }

    pub fn diagnostics(&self) -> Vec<TableDiagnostic> {
        self.ranked.iter().map(RankedTable::diagnostic).collect()
    }
}

/// Score every candidate and pick the best line-item table.
///
/// Ties on score prefer the table with more rows, then the one that starts
/// on an earlier page.
pub fn pick_best_table(tables: Vec<TableCandidate>, weights: &ScoringWeights) -> TableSelection {
    let mut scored: Vec<(TableCandidate, ScoreResult)> = tables
        .into_iter()
        .map(|table| {
            let score = score_table(&table, weights);
            (table, score)
        })
        .collect();

    scored.sort_by(|(table_a, score_a), (table_b, score_b)| {
        score_b
            .score
            .cmp(&score_a.score)
            .then(table_b.row_count.cmp(&table_a.row_count))
            .then(table_a.page_range.start.cmp(&table_b.page_range.start))
    });

    let ranked: Vec<RankedTable> = scored
        .into_iter()
        .enumerate()
        .map(|(index, (table, score))| RankedTable {
            rank: index + 1,
            table,
            score,
        })
        .collect();

    let best = ranked
        .first()
        .filter(|r| r.score.score >= weights.min_score_threshold)
        .cloned();

    TableSelection {
        best,
        ranked,
        threshold: weights.min_score_threshold,
    }
}

/// Rank every table of a document, standalone and merged.
///
/// Tables continuing across pages are grouped first; each merged group
/// competes alongside the individual fragments.
pub fn select_line_item_table(
    tables: Vec<TableCandidate>,
    weights: &ScoringWeights,
) -> TableSelection {
    let merged: Vec<TableCandidate> = group_related_line_item_tables(tables.clone())
        .into_iter()
        .filter(|group| group.members().len() > 1)
        .map(|group| group.into_merged())
        .collect();

    let mut pool = tables;
    pool.extend(merged);
    pick_best_table(pool, weights)
}
