use std::path::PathBuf;

use colored::Colorize;
use takeoff_core::scoring::ScoringWeights;
use takeoff_core::selection::{select_line_item_table, TableDiagnostic};
use takeoff_core::table::LayoutPages;

use crate::config::load_config;
use crate::orchestrator::document_from_layout;
use crate::prelude::{println, *};

#[derive(Debug, clap::Args, Clone)]
pub struct TablesOptions {
    /// Layout-analysis JSON file (`{ rawPages, text, tables }`)
    #[arg(value_name = "LAYOUT_JSON")]
    pub layout_json: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Offline table ranking for a layout file.
#[derive(Debug, serde::Serialize)]
pub struct TablesReport {
    pub threshold: i32,
    pub selected: Option<usize>,
    pub tables: Vec<TableDiagnostic>,
    pub warnings: Vec<String>,
}

pub async fn run(options: TablesOptions, global: crate::Global) -> Result<()> {
    let config = load_config(global.config.as_deref())?;

    let content = tokio::fs::read_to_string(&options.layout_json)
        .await
        .map_err(|e| eyre!("Failed to read '{}': {}", options.layout_json.display(), e))?;
    let layout: LayoutPages = serde_json::from_str(&content).map_err(|e| {
        Error::InvalidInput(f!(
            "{} is not a layout JSON file: {e}",
            options.layout_json.display()
        ))
    })?;

    let report = rank_tables(layout, &config.scoring);

    if options.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if report.tables.is_empty() {
        println!("{}", "No tables found.".yellow());
        return Ok(());
    }

    print!("{}", format_rankings(&report.tables));
    match report.selected {
        Some(rank) => println!(
            "\n{} table #{rank} (threshold {})",
            "Selected".bright_green().bold(),
            report.threshold
        ),
        None => println!(
            "\n{} no table reached the threshold of {}",
            "No line-item table:".bright_red().bold(),
            report.threshold
        ),
    }

    if global.verbose {
        for warning in &report.warnings {
            println!("  {} {warning}", "warning:".yellow());
        }
    }

    Ok(())
}

pub fn rank_tables(layout: LayoutPages, weights: &ScoringWeights) -> TablesReport {
    let document = document_from_layout(layout, weights);
    let selection = select_line_item_table(document.tables, weights);

    TablesReport {
        threshold: selection.threshold,
        selected: selection.best.as_ref().map(|best| best.rank),
        tables: selection.diagnostics(),
        warnings: document.warnings,
    }
}

/// Ranked tables with their score reasons.
pub fn format_rankings(tables: &[TableDiagnostic]) -> String {
    let mut table = new_table();
    table.add_row(prettytable::row![
        "Rank", "Pages", "Score", "Rows", "Cols", "Override", "Headers", "Reasons"
    ]);

    for diagnostic in tables {
        table.add_row(prettytable::row![
            diagnostic.rank,
            diagnostic.pages,
            diagnostic.score,
            diagnostic.row_count,
            diagnostic.column_count,
            if diagnostic.line_item_override_applied { "yes" } else { "" },
            diagnostic.headers.join(" | "),
            diagnostic.reasons.join("\n")
        ]);
    }

    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use takeoff_core::table::LayoutTable;

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_rank_tables_scores_every_table() {
        let layout = LayoutPages {
            raw_pages: 1,
            text: String::new(),
            tables: vec![
                LayoutTable {
                    rows: vec![
                        strings(&[
                            "Rev",
                            "Date",
                            "Description",
                            "Prepared By",
                            "Checked By",
                            "Approved By",
                        ]),
                        strings(&["0", "2024-01-01", "IFC", "AB", "CD", "EF"]),
                        strings(&["1", "2024-03-01", "As built", "AB", "CD", "EF"]),
                    ],
                    page_numbers: vec![1],
                    ..LayoutTable::default()
                },
                LayoutTable {
                    rows: vec![
                        strings(&[
                            "Item", "Detail", "Pipe Spec", "Qty", "Unit", "Size1", "Size2",
                            "Notes", "Rev",
                        ]),
                        strings(&["1", "Elbow", "A1", "4", "EA", "2", "", "", "0"]),
                        strings(&["2", "Tee", "A1", "2", "EA", "2", "1", "", "0"]),
                        strings(&["3", "Pipe", "A1", "6", "M", "2", "", "", "0"]),
                    ],
                    page_numbers: vec![1],
                    ..LayoutTable::default()
                },
            ],
        };

        let report = rank_tables(layout, &ScoringWeights::default());

        assert_eq!(report.tables.len(), 2);
        assert_eq!(report.selected, Some(1));
        assert_eq!(report.tables[0].headers[0], "Item");
        assert!(report.tables[0].line_item_override_applied);
        assert!(report.tables[1].score < report.threshold);
    }

    #[test]
    fn test_format_rankings_lists_reasons() {
        colored::control::set_override(false);
        let diagnostics = vec![TableDiagnostic {
            rank: 1,
            pages: takeoff_core::table::PageRange::single(2),
            score: 90,
            row_count: 3,
            column_count: 4,
            headers: strings(&["Item", "Qty"]),
            reasons: strings(&["+40 item/line-number column", "+30 quantity column"]),
            line_item_override_applied: false,
        }];

        let text = format_rankings(&diagnostics);

        assert!(text.contains("+40 item/line-number column"));
        assert!(text.contains("Item | Qty"));
    }
}
