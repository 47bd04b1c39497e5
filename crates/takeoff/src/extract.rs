use std::path::PathBuf;

use colored::Colorize;
use takeoff_core::config::PipelineConfig;
use takeoff_core::normalize::NormalizedItem;
use takeoff_core::report::ExtractionReport;
use takeoff_core::table::{LayoutPages, PageRange};

use crate::config::load_config;
use crate::layout::{mime_from_path, HttpLayoutService};
use crate::model::OllamaModel;
use crate::orchestrator::document_from_layout;
use crate::pipeline::PipelineRun;
use crate::prelude::{eprintln, println, *};

#[derive(Debug, clap::Args, Clone)]
pub struct ExtractOptions {
    /// Document to extract from (PDF or image)
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Layout-analysis service endpoint
    #[arg(long, env = "TAKEOFF_LAYOUT_URL")]
    pub layout_url: Option<String>,

    /// Bearer token for the layout-analysis service
    #[arg(long, env = "TAKEOFF_LAYOUT_API_KEY", hide_env_values = true)]
    pub layout_api_key: Option<String>,

    /// Use a pre-computed layout-analysis JSON file instead of calling the service
    #[arg(long, value_name = "JSON")]
    pub layout_json: Option<PathBuf>,

    /// Restrict extraction to a page range, e.g. `3-9`
    #[arg(long)]
    pub pages: Option<String>,

    /// Maximum pages per layout-service call
    #[arg(long)]
    pub page_budget: Option<u32>,

    /// Maximum concurrent layout-service calls
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Ollama base URL
    #[arg(long, env = "OLLAMA_URL", default_value = "http://localhost:11434")]
    pub ollama_url: String,

    /// Model name used for normalization
    #[arg(long, env = "TAKEOFF_MODEL", default_value = "llama3.1")]
    pub model: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(options: ExtractOptions, global: crate::Global) -> Result<()> {
    let config = resolve_config(&options, &global)?;
    let pages = options
        .pages
        .as_deref()
        .map(PageRange::parse)
        .transpose()
        .map_err(|e| Error::InvalidConfig(e.to_string()))?;
    let source = options
        .file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());

    if global.verbose {
        eprintln!("Ollama URL: {}", options.ollama_url);
        eprintln!("Model: {}", options.model);
        eprintln!(
            "Page budget: {} | Concurrency: {}",
            config.chunking.page_budget_per_call, config.chunking.max_concurrency
        );
    }

    let model = OllamaModel::new(&options.ollama_url, options.model.clone())?;
    let pipeline = PipelineRun::new(&model, &config);

    let report = match &options.layout_json {
        Some(path) => {
            let content = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| eyre!("Failed to read '{}': {}", path.display(), e))?;
            let layout: LayoutPages = serde_json::from_str(&content).map_err(|e| {
                Error::InvalidInput(f!("{} is not a layout JSON file: {e}", path.display()))
            })?;
            if pages.is_some() {
                log::warn!("--pages is ignored with --layout-json");
            }
            let document = document_from_layout(layout, &config.scoring);
            pipeline.run_layout(document, source).await?
        }
        None => {
            let url = options
                .layout_url
                .clone()
                .ok_or_eyre("Either --layout-url or --layout-json is required")?;
            let mime_type = mime_from_path(&options.file).ok_or_else(|| {
                Error::InvalidInput(f!("unsupported file type: {}", options.file.display()))
            })?;
            let document = tokio::fs::read(&options.file)
                .await
                .map_err(|e| eyre!("Failed to read '{}': {}", options.file.display(), e))?;

            let service = HttpLayoutService::new(url, options.layout_api_key.clone());
            pipeline
                .run_document(&service, &document, mime_type, pages, source)
                .await?
        }
    };

    if options.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", format_report_text(&report, global.verbose));
    }

    Ok(())
}

/// File configuration with command-line overrides applied.
fn resolve_config(options: &ExtractOptions, global: &crate::Global) -> Result<PipelineConfig> {
    let mut config = load_config(global.config.as_deref())?;

    if let Some(budget) = options.page_budget {
        config.chunking.page_budget_per_call = budget;
    }
    if let Some(concurrency) = options.concurrency {
        config.chunking.max_concurrency = concurrency;
    }

    config
        .validate()
        .map_err(|e| Error::InvalidConfig(e.to_string()))?;
    Ok(config)
}

fn cell(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn number_cell(value: Option<f64>) -> String {
    value.map(|v| f!("{v}")).unwrap_or_default()
}

fn flags_cell(item: &NormalizedItem) -> String {
    item.flags
        .iter()
        .map(|flag| {
            serde_json::to_value(flag)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default()
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Render the report as coloured text with the items in a table.
fn format_report_text(report: &ExtractionReport, verbose: bool) -> String {
    let output = &report.output;
    let diagnostics = &report.diagnostics;
    let mut result = String::new();

    result.push_str(&f!("\n{}\n", "=".repeat(80).bright_cyan()));
    result.push_str(&f!(
        "{}\n",
        f!("LINE ITEMS ({})", output.items.len()).bright_cyan().bold()
    ));
    result.push_str(&f!("{}\n\n", "=".repeat(80).bright_cyan()));

    let mut table = new_table();
    table.add_row(prettytable::row![
        "#", "Description", "Material", "Qty", "Unit", "Size", "Weight kg", "Length m", "Area m2",
        "Flags"
    ]);
    for item in &output.items {
        table.add_row(prettytable::row![
            item.raw_index + 1,
            cell(&item.description),
            cell(&item.material_spec),
            item.quantity.map(|q| q.to_string()).unwrap_or_default(),
            cell(&item.unit),
            cell(&item.size),
            number_cell(item.weight_kg),
            number_cell(item.length_m),
            number_cell(item.area_m2),
            flags_cell(item)
        ]);
    }
    result.push_str(&table.to_string());

    let confidence = f!("{:.2}", output.confidence);
    result.push_str(&f!(
        "\n{}: {} | {}: {}\n",
        "Confidence".green(),
        if output.confidence >= 0.5 {
            confidence.bright_green()
        } else {
            confidence.bright_red()
        },
        "Needs review".green(),
        if output.needs_review {
            "yes".bright_red().bold()
        } else {
            "no".bright_green()
        }
    ));

    if !output.extraction_notes.is_empty() {
        result.push_str(&f!("\n{}\n", "Notes".yellow().bold()));
        for note in &output.extraction_notes {
            result.push_str(&f!("  - {note}\n"));
        }
    }

    if verbose {
        result.push_str(&f!("\n{}\n", "Diagnostics".bright_yellow().bold()));
        result.push_str(&f!(
            "  Chunks: {} ({}) | Raw items: {} | Model calls: {} | Repaired: {} | Fallback: {}\n",
            diagnostics.chunk_count,
            if diagnostics.chunked { "chunked" } else { "single call" },
            diagnostics.raw_item_count,
            diagnostics.attempts,
            diagnostics.repaired,
            diagnostics.fell_back
        ));
        for chunk in diagnostics.chunks.iter().filter(|c| !c.success) {
            result.push_str(&f!(
                "  {} pages {}: {}\n",
                "Failed".red(),
                chunk.range,
                chunk.error.as_deref().unwrap_or("unknown error")
            ));
        }
        result.push_str(&crate::tables::format_rankings(&diagnostics.tables));
        for warning in &diagnostics.warnings {
            result.push_str(&f!("  {} {warning}\n", "warning:".yellow()));
        }
    }

    result
}
