//! The pipeline's final report: validated output plus diagnostics.

use serde::Serialize;

use crate::chunking::{ChunkDetail, DocumentResult};
use crate::normalize::PipelineOutput;
use crate::selection::TableDiagnostic;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    /// Ranked table scores with their reasons, best first.
    pub tables: Vec<TableDiagnostic>,
    pub chunked: bool,
    pub chunk_count: usize,
    pub chunks: Vec<ChunkDetail>,
    /// Ingestion, merge and stitching warnings.
    pub warnings: Vec<String>,
    pub raw_item_count: usize,
    /// Model calls made, including retries and the repair call.
    pub attempts: u32,
    pub repaired: bool,
    pub fell_back: bool,
}

impl Diagnostics {
    /// Diagnostics of the layout and selection stages.
    pub fn from_document(document: &DocumentResult, tables: Vec<TableDiagnostic>) -> Self {
        Diagnostics {
            tables,
            chunked: document.chunked,
            chunk_count: document.chunk_count,
            chunks: document.chunk_details.clone(),
            warnings: document.warnings.clone(),
            ..Diagnostics::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionReport {
    #[serde(flatten)]
    pub output: PipelineOutput,
    pub diagnostics: Diagnostics,
}
