use takeoff_core::chunking::DocumentResult;
use takeoff_core::config::PipelineConfig;
use takeoff_core::line_items::extract_line_items_from_table;
use takeoff_core::normalize::DocumentContext;
use takeoff_core::report::{Diagnostics, ExtractionReport};
use takeoff_core::selection::select_line_item_table;
use takeoff_core::table::PageRange;

use crate::error::Error;
use crate::layout::LayoutService;
use crate::model::CompletionModel;
use crate::normalizer::normalize_with_model;
use crate::orchestrator::{analyze_document, AnalyzeOptions};

/// Everything one extraction needs: the model handle and the configuration.
pub struct PipelineRun<'a, M> {
    pub model: &'a M,
    pub config: &'a PipelineConfig,
}

impl<'a, M: CompletionModel> PipelineRun<'a, M> {
    pub fn new(model: &'a M, config: &'a PipelineConfig) -> Self {
        Self { model, config }
    }

    /// Analyse a document with the layout service, then extract its items.
    pub async fn run_document<S: LayoutService>(
        &self,
        service: &S,
        document: &[u8],
        mime_type: &str,
        pages: Option<PageRange>,
        source: Option<String>,
    ) -> Result<ExtractionReport, Error> {
        let options = AnalyzeOptions::from_config(&self.config.chunking, pages);
        let analysed =
            analyze_document(service, document, mime_type, &options, &self.config.scoring).await?;
        self.run_layout(analysed, source).await
    }

    /// Select the line-item table of an analysed document and normalize it.
    pub async fn run_layout(
        &self,
        document: DocumentResult,
        source: Option<String>,
    ) -> Result<ExtractionReport, Error> {
        log::debug!(
            "{} table(s) over {} page(s)",
            document.tables.len(),
            document.raw_pages
        );

        let selection = select_line_item_table(document.tables.clone(), &self.config.scoring);
        let mut diagnostics = Diagnostics::from_document(&document, selection.diagnostics());

        for ranked in selection.ranked.iter().take(3) {
            log::debug!(
                "#{} pages {} scored {} ({} rows)",
                ranked.rank,
                ranked.table.page_range,
                ranked.score.score,
                ranked.table.row_count
            );
        }

        let best = selection.into_best()?;
        log::info!(
            "Selected table on pages {} (score {}, {} rows)",
            best.table.page_range,
            best.score.score,
            best.table.row_count
        );
        diagnostics
            .warnings
            .extend(best.table.warnings.iter().cloned());

        let raw_items = extract_line_items_from_table(&best.table);
        diagnostics.raw_item_count = raw_items.len();

        let context = DocumentContext {
            source,
            page_range: Some(best.table.page_range),
            text: document.text,
        };

        let outcome =
            normalize_with_model(self.model, &raw_items, &context, &self.config.normalization)
                .await?;

        diagnostics.attempts = outcome.attempts;
        diagnostics.repaired = outcome.repaired;
        diagnostics.fell_back = outcome.fell_back;

        Ok(ExtractionReport {
            output: outcome.output,
            diagnostics,
        })
    }
}
