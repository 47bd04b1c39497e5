//! Hybrid normalization
//!
//! The raw items frozen from the selected table are handed to a generative
//! model for normalization only. Everything the model sends back is checked
//! here: the item count must match, quantities must be piece counts, and
//! anything that cannot be trusted falls back to the raw table values.
//!
//! The model call itself lives in the shell; this module builds the
//! prompts and judges the responses.

mod parse;
mod prompt;
mod types;
mod validate;

pub use parse::{parse_model_response, ParseError};
pub use prompt::{
    build_normalization_prompt, build_repair_prompt, trim_context, NORMALIZATION_PREAMBLE,
};
pub use types::{
    DocumentContext, ItemFlag, Lenient, ModelItem, ModelResponse, NormalizedItem, PipelineOutput,
};
pub use validate::{
    adjust_confidence, align_items, fallback_output, finalize_output, pass_through_items,
    unit_kind, CardinalityMismatch, UnitKind, MAX_PIECE_QUANTITY,
};
