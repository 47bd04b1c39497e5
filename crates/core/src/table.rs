//! Table candidates and the ingestion boundary
//!
//! Layout-analysis services return loosely shaped tables: ragged rows,
//! declared counts that disagree with the cells, title rows above the real
//! header, page numbers that may be relative to the analysed range. Every
//! table passes through [`ingest_layout_tables`] once and comes out as a
//! strict [`TableCandidate`]; anything suspicious is reported as a warning.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ExtractionError;
use crate::keywords::Signature;
use crate::scoring::{score, ScoringWeights};

/// Number of leading rows searched for the header row.
pub const HEADER_SCAN_ROWS: usize = 3;

/// Inclusive, 1-based page range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    pub fn new(start: u32, end: u32) -> Result<Self, ExtractionError> {
        if start == 0 || end < start {
            return Err(ExtractionError::InvalidPageRange(format!("{start}-{end}")));
        }
        Ok(PageRange { start, end })
    }

    pub fn single(page: u32) -> Self {
        let page = page.max(1);
        PageRange {
            start: page,
            end: page,
        }
    }

    /// Parse `"4"` or `"3-9"`.
    pub fn parse(s: &str) -> Result<Self, ExtractionError> {
        let invalid = || ExtractionError::InvalidPageRange(s.to_string());
        let (start, end) = match s.trim().split_once('-') {
            Some((start, end)) => (start.trim(), end.trim()),
            None => (s.trim(), s.trim()),
        };
        let start = start.parse::<u32>().map_err(|_| invalid())?;
        let end = end.parse::<u32>().map_err(|_| invalid())?;
        PageRange::new(start, end).map_err(|_| invalid())
    }

    pub fn page_count(&self) -> u32 {
        self.end - self.start + 1
    }

    pub fn contains(&self, page: u32) -> bool {
        (self.start..=self.end).contains(&page)
    }

    pub fn union(&self, other: PageRange) -> PageRange {
        PageRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// A table as returned by the layout-analysis service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutTable {
    #[serde(default)]
    pub row_count: usize,
    #[serde(default)]
    pub column_count: usize,
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
    #[serde(default, alias = "pages")]
    pub page_numbers: Vec<u32>,
}

/// The layout-analysis output for one page range.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutPages {
    #[serde(default)]
    pub raw_pages: u32,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub tables: Vec<LayoutTable>,
}

/// A table that may hold the document's line items.
///
/// Headers and every row share the same width. `row_count` counts data rows
/// only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableCandidate {
    pub page_range: PageRange,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub row_count: usize,
    pub column_count: usize,
    pub header_detected: bool,
    pub signature: Signature,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl TableCandidate {
    pub fn new(page_range: PageRange, headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let column_count = rows
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(headers.len()))
            .max()
            .unwrap_or(0);
        let headers = fit_width(headers, column_count);
        let rows: Vec<Vec<String>> = rows
            .into_iter()
            .map(|row| fit_width(row, column_count))
            .collect();
        let signature = Signature::of(&headers);

        TableCandidate {
            page_range,
            header_detected: signature.is_classified(),
            row_count: rows.len(),
            column_count,
            headers,
            rows,
            signature,
            warnings: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    /// True when both tables carry the same pages, headers and rows.
    pub fn same_content(&self, other: &TableCandidate) -> bool {
        self.page_range == other.page_range
            && self.headers == other.headers
            && self.rows == other.rows
    }
}

/// Pad with empty cells or truncate so the row is exactly `width` wide.
pub fn fit_width(mut row: Vec<String>, width: usize) -> Vec<String> {
    row.resize(width, String::new());
    row
}

/// Convert raw layout tables into candidates.
///
/// `range` is the page range the tables were analysed for; reported page
/// numbers outside it are treated as relative to the range start.
pub fn ingest_layout_tables(
    tables: &[LayoutTable],
    range: PageRange,
    weights: &ScoringWeights,
) -> (Vec<TableCandidate>, Vec<String>) {
    let relative = tables
        .iter()
        .flat_map(|t| t.page_numbers.iter())
        .any(|page| !range.contains(*page));

    let mut candidates = Vec::new();
    let mut warnings = Vec::new();

    for (index, table) in tables.iter().enumerate() {
        let pages = table_pages(table, range, relative);
        match ingest_table(table, pages, weights) {
            Some(candidate) => candidates.push(candidate),
            None => warnings.push(format!(
                "table {} on page {pages} has no content; skipped",
                index + 1
            )),
        }
    }

    (candidates, warnings)
}

fn table_pages(table: &LayoutTable, range: PageRange, relative: bool) -> PageRange {
    let rebase = |page: u32| -> u32 {
        if relative {
            (range.start + page.max(1) - 1).min(range.end)
        } else {
            page.clamp(range.start, range.end)
        }
    };

    let start = table.page_numbers.iter().copied().map(rebase).min();
    let end = table.page_numbers.iter().copied().map(rebase).max();
    match (start, end) {
        (Some(start), Some(end)) => PageRange { start, end },
        _ => PageRange::single(range.start),
    }
}

fn ingest_table(
    table: &LayoutTable,
    pages: PageRange,
    weights: &ScoringWeights,
) -> Option<TableCandidate> {
    let mut warnings = Vec::new();

    let rows: Vec<Vec<String>> = table
        .rows
        .iter()
        .map(|row| row.iter().map(|cell| cell.trim().to_string()).collect::<Vec<_>>())
        .filter(|row| row.iter().any(|cell| !cell.is_empty()))
        .collect();

    if rows.is_empty() {
        return None;
    }

    let dropped = table.rows.len() - rows.len();
    if dropped > 0 {
        warnings.push(format!("{dropped} empty row(s) dropped"));
    }

    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    let ragged = rows.iter().filter(|row| row.len() != width).count();
    if ragged > 0 {
        warnings.push(format!("{ragged} ragged row(s) padded to {width} columns"));
    }
    if table.column_count != 0 && table.column_count != width {
        warnings.push(format!(
            "declared column count {} differs from observed {width}",
            table.column_count
        ));
    }
    if table.row_count != 0 && table.row_count != table.rows.len() {
        warnings.push(format!(
            "declared row count {} differs from observed {}",
            table.row_count,
            table.rows.len()
        ));
    }

    let header_index = detect_header_row(&rows, weights);
    if header_index > 0 {
        warnings.push(format!(
            "{header_index} title row(s) above the header dropped"
        ));
    }

    let mut rows = rows.into_iter().skip(header_index);
    let headers = rows.next().unwrap_or_default();
    let candidate = TableCandidate::new(pages, headers, rows.collect());

    Some(candidate.with_warnings(warnings))
}

/// Index of the row that most looks like a header among the first
/// [`HEADER_SCAN_ROWS`] rows. Falls back to the first row.
pub fn detect_header_row(rows: &[Vec<String>], weights: &ScoringWeights) -> usize {
    let mut best: Option<(usize, i32)> = None;

    for (index, row) in rows.iter().take(HEADER_SCAN_ROWS).enumerate() {
        let result = score(row, &[], weights);
        if !result.signals.any_group() {
            continue;
        }
        if best.map_or(true, |(_, best_score)| result.score > best_score) {
            best = Some((index, result.score));
        }
    }

    best.map_or(0, |(index, _)| index)
}
