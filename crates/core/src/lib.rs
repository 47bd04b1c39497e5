//! Core library for takeoff
//!
//! This crate implements the **Functional Core** of the takeoff line-item
//! extraction pipeline, following the Functional Core - Imperative Shell
//! pattern. The `takeoff` binary crate is the shell: it talks to the layout
//! service and the generative model, and feeds their outputs through the
//! pure transforms defined here.
//!
//! # Pipeline
//!
//! 1. [`table`]: layout-service tables become strict [`table::TableCandidate`]s.
//! 2. [`scoring`]: each candidate is scored on its header groups
//!    ([`keywords`]) and numeric density ([`numbers`]).
//! 3. [`grouping`]: fragments of one table split across pages are merged.
//! 4. [`selection`]: the best-scoring table above the threshold wins.
//! 5. [`line_items`]: its rows are frozen into raw items.
//! 6. [`normalize`]: model output is parsed, count-checked and corrected.
//!
//! Large documents are analysed in chunks; [`chunking`] plans the split and
//! stitches the results back together.
//!
//! Nothing here performs I/O or logs. Problems that do not stop the
//! pipeline are returned as warnings and notes.
//!
//! # Example
//!
//! ```rust,ignore
//! use takeoff_core::scoring::{score, ScoringWeights};
//!
//! let headers = vec!["Item".to_string(), "Description".to_string(), "Qty".to_string()];
//! let result = score(&headers, &[], &ScoringWeights::default());
//!
//! assert!(result.score >= 45);
//! assert_eq!(result.score, result.reasons.iter().map(|r| r.points).sum::<i32>());
//! ```

pub mod chunking;
pub mod config;
pub mod error;
pub mod grouping;
pub mod keywords;
pub mod line_items;
pub mod normalize;
pub mod numbers;
pub mod report;
pub mod scoring;
pub mod selection;
pub mod table;
