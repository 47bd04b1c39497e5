use thiserror::Error;

/// Errors raised by the structural extraction stages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    /// No table scored at or above the selection threshold.
    #[error("no line-item table found (best score {best_score:?}, threshold {threshold})")]
    NoLineItemTable {
        best_score: Option<i32>,
        threshold: i32,
    },

    #[error("invalid page range: {0}")]
    InvalidPageRange(String),

    #[error("page budget per call must be at least 1")]
    ZeroPageBudget,
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
