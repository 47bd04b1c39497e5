//! Chunk planning and stitching
//!
//! Large documents exceed the layout service's per-call page limit, so the
//! requested page range is split into consecutive chunks. The shell calls
//! the service per chunk; this module plans the split and stitches the
//! per-chunk results back into one [`DocumentResult`], tolerating failed
//! chunks.

use serde::Serialize;

use crate::error::ExtractionError;
use crate::grouping::{are_tables_related, merge_line_item_tables};
use crate::scoring::ScoringWeights;
use crate::table::{ingest_layout_tables, LayoutPages, PageRange, TableCandidate};

/// Minimum number of leading data rows that must repeat the previous
/// chunk's table before they are treated as a boundary overlap.
const OVERLAP_PROBE_ROWS: usize = 3;

/// Consecutive, non-overlapping chunks covering `range` exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkPlan {
    pub range: PageRange,
    pub chunks: Vec<PageRange>,
}

impl ChunkPlan {
    pub fn is_chunked(&self) -> bool {
        self.chunks.len() > 1
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}

/// Split `range` into chunks of at most `budget` pages.
pub fn plan_chunks(range: PageRange, budget: u32) -> Result<ChunkPlan, ExtractionError> {
    if budget == 0 {
        return Err(ExtractionError::ZeroPageBudget);
    }

    let mut chunks = Vec::new();
    let mut start = range.start;
    while start <= range.end {
        let end = start.saturating_add(budget - 1).min(range.end);
        chunks.push(PageRange { start, end });
        start = end + 1;
    }

    Ok(ChunkPlan { range, chunks })
}

/// The outcome of analysing one chunk.
#[derive(Debug, Clone)]
pub struct ChunkResult {
    pub range: PageRange,
    pub pages_returned: u32,
    pub tables: Vec<TableCandidate>,
    pub text: String,
    pub success: bool,
    pub error: Option<String>,
    pub elapsed_ms: u64,
    pub warnings: Vec<String>,
}

impl ChunkResult {
    /// Ingest a successful layout response for `range`.
    pub fn succeeded(
        range: PageRange,
        pages: LayoutPages,
        weights: &ScoringWeights,
        elapsed_ms: u64,
    ) -> Self {
        let (tables, warnings) = ingest_layout_tables(&pages.tables, range, weights);
        let pages_returned = if pages.raw_pages == 0 {
            range.page_count()
        } else {
            pages.raw_pages
        };

        ChunkResult {
            range,
            pages_returned,
            tables,
            text: pages.text,
            success: true,
            error: None,
            elapsed_ms,
            warnings: warnings
                .into_iter()
                .map(|w| format!("pages {range}: {w}"))
                .collect(),
        }
    }

    pub fn failed(range: PageRange, error: impl Into<String>, elapsed_ms: u64) -> Self {
        ChunkResult {
            range,
            pages_returned: 0,
            tables: Vec::new(),
            text: String::new(),
            success: false,
            error: Some(error.into()),
            elapsed_ms,
            warnings: Vec::new(),
        }
    }

    pub fn detail(&self) -> ChunkDetail {
        ChunkDetail {
            range: self.range,
            success: self.success,
            pages_returned: self.pages_returned,
            table_count: self.tables.len(),
            error: self.error.clone(),
            elapsed_ms: self.elapsed_ms,
        }
    }
}

/// Per-chunk diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkDetail {
    pub range: PageRange,
    pub success: bool,
    pub pages_returned: u32,
    pub table_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

/// Layout analysis of a whole document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResult {
    pub raw_pages: u32,
    pub text: String,
    pub tables: Vec<TableCandidate>,
    pub chunked: bool,
    pub chunk_count: usize,
    pub chunk_details: Vec<ChunkDetail>,
    pub warnings: Vec<String>,
}

impl DocumentResult {
    pub fn failed_chunks(&self) -> usize {
        self.chunk_details.iter().filter(|c| !c.success).count()
    }
}

/// Stitch chunk results into one document, in page order.
///
/// Text of successful chunks is concatenated. Tables are concatenated with
/// exact duplicates removed. At each boundary between adjacent successful
/// chunks, the first table of the later chunk is merged into the earlier
/// chunk's last table when it continues it: either it opens by repeating
/// that table's trailing rows (the repeated rows are skipped, the rest are
/// appended) or it is a related fragment on the next page.
pub fn stitch_chunks(
    total_pages: u32,
    mut results: Vec<ChunkResult>,
    chunked: bool,
) -> DocumentResult {
    results.sort_by_key(|r| r.range.start);

    let mut texts = Vec::new();
    let mut tables: Vec<TableCandidate> = Vec::new();
    let mut warnings = Vec::new();
    let mut chunk_details = Vec::with_capacity(results.len());
    let mut boundary_tail: Option<usize> = None;
    let mut previous_end: Option<u32> = None;

    for result in results {
        chunk_details.push(result.detail());

        if !result.success {
            warnings.push(format!(
                "pages {}: chunk failed: {}",
                result.range,
                result.error.as_deref().unwrap_or("unknown error")
            ));
            boundary_tail = None;
            previous_end = None;
            continue;
        }

        warnings.extend(result.warnings);
        if !result.text.trim().is_empty() {
            texts.push(result.text);
        }

        let adjacent = previous_end.is_some_and(|end| end + 1 == result.range.start);
        let mut tail = if adjacent { boundary_tail } else { None };
        let mut last_touched = None;

        for table in result.tables {
            if tables.iter().any(|t| t.same_content(&table)) {
                warnings.push(format!("page {}: duplicate table dropped", table.page_range));
                continue;
            }

            if let Some(index) = tail.take() {
                let overlap = boundary_overlap(&tables[index], &table);
                if overlap > 0 {
                    warnings.push(format!(
                        "page {}: {overlap} row(s) repeated across chunk boundary skipped",
                        table.page_range
                    ));
                    let rest = TableCandidate::new(
                        table.page_range,
                        table.headers.clone(),
                        table.rows[overlap..].to_vec(),
                    )
                    .with_warnings(table.warnings.clone());
                    if let Some(merged) = merge_line_item_tables(&[tables[index].clone(), rest]) {
                        tables[index] = merged;
                        last_touched = Some(index);
                        continue;
                    }
                }
                if are_tables_related(&tables[index], &table) {
                    let pair = [tables[index].clone(), table.clone()];
                    if let Some(merged) = merge_line_item_tables(&pair) {
                        tables[index] = merged;
                        last_touched = Some(index);
                        continue;
                    }
                }
            }

            tables.push(table);
            last_touched = Some(tables.len() - 1);
        }

        boundary_tail = last_touched;
        previous_end = Some(result.range.end);
    }

    DocumentResult {
        raw_pages: total_pages,
        text: texts.join("\n"),
        tables,
        chunked,
        chunk_count: chunk_details.len(),
        chunk_details,
        warnings,
    }
}

/// Number of leading rows of `later` that repeat the trailing rows of
/// `earlier`, or zero when the repeat is shorter than the probe window.
fn boundary_overlap(earlier: &TableCandidate, later: &TableCandidate) -> usize {
    if !earlier.signature.matches(&later.signature) || later.rows.is_empty() {
        return 0;
    }
    let longest = earlier.rows.len().min(later.rows.len());
    let min_overlap = longest.min(OVERLAP_PROBE_ROWS).max(1);

    (min_overlap..=longest)
        .rev()
        .find(|&k| earlier.rows[earlier.rows.len() - k..] == later.rows[..k])
        .unwrap_or(0)
}
