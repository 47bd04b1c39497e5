use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use takeoff_core::chunking::{plan_chunks, stitch_chunks, ChunkResult, DocumentResult};
use takeoff_core::config::ChunkingConfig;
use takeoff_core::scoring::ScoringWeights;
use takeoff_core::table::{LayoutPages, PageRange};

use crate::error::Error;
use crate::layout::{count_pages, LayoutError, LayoutService};

#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    pub page_budget_per_call: u32,
    pub max_concurrency: usize,
    pub chunk_timeout: Duration,
    /// Restrict analysis to these pages.
    pub pages: Option<PageRange>,
}

impl AnalyzeOptions {
    pub fn from_config(config: &ChunkingConfig, pages: Option<PageRange>) -> Self {
        Self {
            page_budget_per_call: config.page_budget_per_call,
            max_concurrency: config.max_concurrency,
            chunk_timeout: Duration::from_secs(config.chunk_timeout_secs),
            pages,
        }
    }
}

/// Run layout analysis over a whole document, chunking it when it exceeds
/// the per-call page budget.
pub async fn analyze_document<S: LayoutService>(
    service: &S,
    document: &[u8],
    mime_type: &str,
    options: &AnalyzeOptions,
    weights: &ScoringWeights,
) -> Result<DocumentResult, Error> {
    let total_pages = count_pages(document, mime_type)?;
    let range = requested_range(total_pages, options.pages)?;
    log::debug!("Document has {total_pages} page(s); analysing pages {range}");

    analyze_pages(service, document, mime_type, total_pages, range, options, weights).await
}

/// The restriction clamped to the document, or the whole document.
fn requested_range(total_pages: u32, pages: Option<PageRange>) -> Result<PageRange, Error> {
    match pages {
        None => Ok(PageRange {
            start: 1,
            end: total_pages.max(1),
        }),
        Some(pages) if pages.start > total_pages => Err(Error::InvalidInput(format!(
            "page range {pages} is outside the document ({total_pages} pages)"
        ))),
        Some(pages) => Ok(PageRange {
            start: pages.start,
            end: pages.end.min(total_pages),
        }),
    }
}

pub async fn analyze_pages<S: LayoutService>(
    service: &S,
    document: &[u8],
    mime_type: &str,
    total_pages: u32,
    range: PageRange,
    options: &AnalyzeOptions,
    weights: &ScoringWeights,
) -> Result<DocumentResult, Error> {
    let plan = plan_chunks(range, options.page_budget_per_call)?;

    if !plan.is_chunked() {
        let result =
            analyze_chunk(service, document, mime_type, range, options.chunk_timeout, weights)
                .await;
        if !result.success {
            return Err(Error::LayoutFailure(format!(
                "pages {range}: {}",
                result.error.unwrap_or_default()
            )));
        }
        return Ok(stitch_chunks(total_pages, vec![result], false));
    }

    log::info!(
        "Analysing pages {range} in {} chunks of up to {} pages ({} at a time)",
        plan.chunk_count(),
        options.page_budget_per_call,
        options.max_concurrency
    );

    let results: Vec<ChunkResult> = stream::iter(plan.chunks.iter().copied())
        .map(|chunk| {
            analyze_chunk(service, document, mime_type, chunk, options.chunk_timeout, weights)
        })
        .buffer_unordered(options.max_concurrency.max(1))
        .collect()
        .await;

    let failed = results.iter().filter(|r| !r.success).count();
    if failed == results.len() {
        return Err(Error::LayoutFailure(format!(
            "all {failed} chunks of pages {range} failed"
        )));
    }
    if failed > 0 {
        log::warn!("{failed} of {} chunks failed; continuing with the rest", results.len());
    }

    Ok(stitch_chunks(total_pages, results, true))
}

async fn analyze_chunk<S: LayoutService>(
    service: &S,
    document: &[u8],
    mime_type: &str,
    range: PageRange,
    timeout: Duration,
    weights: &ScoringWeights,
) -> ChunkResult {
    log::debug!("Analysing pages {range}");
    let started = Instant::now();

    let outcome = tokio::time::timeout(timeout, service.analyze(document, mime_type, range)).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let error = match outcome {
        Ok(Ok(pages)) => {
            let result = ChunkResult::succeeded(range, pages, weights, elapsed_ms);
            log::debug!(
                "Pages {range}: {} table(s) in {elapsed_ms}ms",
                result.tables.len()
            );
            return result;
        }
        Ok(Err(err)) => err,
        Err(_) => LayoutError::Timeout(timeout.as_millis() as u64),
    };

    log::warn!("Pages {range} failed: {error}");
    ChunkResult::failed(range, error.to_string(), elapsed_ms)
}

/// Treat a pre-computed layout response as a single, unchunked analysis.
pub fn document_from_layout(pages: LayoutPages, weights: &ScoringWeights) -> DocumentResult {
    let last_page = pages
        .tables
        .iter()
        .flat_map(|t| t.page_numbers.iter().copied())
        .max()
        .unwrap_or(1);
    let total_pages = pages.raw_pages.max(last_page).max(1);
    let range = PageRange {
        start: 1,
        end: total_pages,
    };

    let result = ChunkResult::succeeded(range, pages, weights, 0);
    stitch_chunks(total_pages, vec![result], false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use takeoff_core::table::LayoutTable;

    /// Returns one line-item table per chunk, on the chunk's first page,
    /// reported relative to the chunk.
    #[derive(Default)]
    struct MockLayout {
        failing: Vec<u32>,
        slow: Vec<u32>,
        calls: Mutex<Vec<PageRange>>,
    }

    impl LayoutService for MockLayout {
        async fn analyze(
            &self,
            _document: &[u8],
            _mime_type: &str,
            range: PageRange,
        ) -> Result<LayoutPages, LayoutError> {
            self.calls.lock().unwrap().push(range);

            if self.slow.contains(&range.start) {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            if self.failing.contains(&range.start) {
                return Err(LayoutError::Status {
                    status: 500,
                    body: "internal error".into(),
                });
            }

            let rows = vec![
                vec!["Item".to_string(), "Description".into(), "Qty".into()],
                vec![range.start.to_string(), format!("Part {}", range.start), "2".into()],
            ];
            Ok(LayoutPages {
                raw_pages: range.page_count(),
                text: format!("pages {range}"),
                tables: vec![LayoutTable {
                    row_count: 2,
                    column_count: 3,
                    rows,
                    page_numbers: vec![1],
                }],
            })
        }
    }

    fn options(budget: u32) -> AnalyzeOptions {
        AnalyzeOptions {
            page_budget_per_call: budget,
            max_concurrency: 2,
            chunk_timeout: Duration::from_millis(200),
            pages: None,
        }
    }

    fn range(start: u32, end: u32) -> PageRange {
        PageRange { start, end }
    }

    async fn run(
        service: &MockLayout,
        total_pages: u32,
        pages: PageRange,
        budget: u32,
    ) -> Result<DocumentResult, Error> {
        let weights = ScoringWeights::default();
        analyze_pages(
            service,
            b"",
            "application/pdf",
            total_pages,
            pages,
            &options(budget),
            &weights,
        )
        .await
    }

    #[tokio::test]
    async fn test_single_call_within_budget() {
        let service = MockLayout::default();

        let doc = run(&service, 4, range(1, 4), 10).await.unwrap();

        assert!(!doc.chunked);
        assert_eq!(doc.chunk_count, 1);
        assert_eq!(service.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_chunked_document_survives_failed_chunk() {
        let service = MockLayout {
            failing: vec![11],
            ..MockLayout::default()
        };

        let doc = run(&service, 25, range(1, 25), 10).await.unwrap();

        assert_eq!(doc.raw_pages, 25);
        assert!(doc.chunked);
        assert_eq!(doc.chunk_count, 3);
        assert_eq!(doc.failed_chunks(), 1);
        assert!(doc.tables.iter().all(|t| !range(11, 20).contains(t.page_range.start)));
        let starts: Vec<u32> = doc.tables.iter().map(|t| t.page_range.start).collect();
        assert_eq!(starts, vec![1, 21]);
    }

    #[tokio::test]
    async fn test_timed_out_chunk_is_a_failed_chunk() {
        let service = MockLayout {
            slow: vec![3],
            ..MockLayout::default()
        };

        let doc = run(&service, 4, range(1, 4), 2).await.unwrap();

        assert_eq!(doc.chunk_count, 2);
        let failed = &doc.chunk_details[1];
        assert!(!failed.success);
        assert!(failed.error.as_deref().unwrap_or("").contains("timed out"));
    }

    #[tokio::test]
    async fn test_all_chunks_failing_is_fatal() {
        let service = MockLayout {
            failing: vec![1, 3],
            ..MockLayout::default()
        };

        let err = run(&service, 4, range(1, 4), 2).await.unwrap_err();

        assert!(matches!(err, Error::LayoutFailure(_)));
    }

    #[tokio::test]
    async fn test_single_call_failure_is_fatal() {
        let service = MockLayout {
            failing: vec![1],
            ..MockLayout::default()
        };

        let err = run(&service, 2, range(1, 2), 10).await.unwrap_err();

        assert!(matches!(err, Error::LayoutFailure(_)));
    }

    #[tokio::test]
    async fn test_image_documents_are_one_page() {
        let service = MockLayout::default();

        let weights = ScoringWeights::default();
        let doc = analyze_document(&service, b"png", "image/png", &options(10), &weights)
            .await
            .unwrap();

        assert_eq!(doc.raw_pages, 1);
        assert_eq!(*service.calls.lock().unwrap(), vec![range(1, 1)]);
    }

    #[test]
    fn test_requested_range_is_clamped() {
        assert_eq!(requested_range(5, None).unwrap(), range(1, 5));
        assert_eq!(requested_range(5, Some(range(3, 9))).unwrap(), range(3, 5));
        assert!(matches!(
            requested_range(5, Some(range(6, 9))),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_document_from_layout_spans_reported_pages() {
        let pages = LayoutPages {
            raw_pages: 0,
            text: String::new(),
            tables: vec![LayoutTable {
                row_count: 2,
                column_count: 2,
                rows: vec![
                    vec!["Item".into(), "Qty".into()],
                    vec!["1".into(), "3".into()],
                ],
                page_numbers: vec![4],
            }],
        };

        let doc = document_from_layout(pages, &ScoringWeights::default());

        assert_eq!(doc.raw_pages, 4);
        assert_eq!(doc.tables[0].page_range, PageRange::single(4));
    }
}
