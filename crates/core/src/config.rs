//! Pipeline configuration
//!
//! Parsed from an optional TOML file. Every section and field has a
//! default, so an empty file is a valid configuration:
//!
//! ```toml
//! [scoring]
//! revision_penalty = -30
//!
//! [chunking]
//! page_budget_per_call = 10
//! max_concurrency = 2
//!
//! [normalization.retry]
//! max_attempts = 3
//! backoff_ms = [1000, 2000, 4000]
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::scoring::ScoringWeights;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub scoring: ScoringWeights,
    pub chunking: ChunkingConfig,
    pub normalization: NormalizationConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub page_budget_per_call: u32,
    pub max_concurrency: usize,
    pub chunk_timeout_secs: u64,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            page_budget_per_call: 10,
            max_concurrency: 2,
            chunk_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationConfig {
    pub model_timeout_secs: u64,
    pub max_context_chars: usize,
    pub retry: RetryPolicy,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            model_timeout_secs: 180,
            max_context_chars: 4000,
            retry: RetryPolicy::default(),
        }
    }
}

/// Bounded retry for model calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before each retry. The last value repeats when there are more
    /// retries than entries.
    pub backoff_ms: Vec<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: vec![1000, 2000, 4000],
        }
    }
}

impl RetryPolicy {
    /// A policy that retries immediately.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff_ms: Vec::new(),
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff_for(&self, retry: u32) -> u64 {
        let index = retry.saturating_sub(1) as usize;
        self.backoff_ms
            .get(index)
            .or(self.backoff_ms.last())
            .copied()
            .unwrap_or(0)
    }
}

impl PipelineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig =
            toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunking.page_budget_per_call == 0 {
            return Err(ConfigError::Invalid(
                "chunking.page_budget_per_call must be at least 1".into(),
            ));
        }
        if self.chunking.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "chunking.max_concurrency must be at least 1".into(),
            ));
        }
        if self.chunking.chunk_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "chunking.chunk_timeout_secs must be at least 1".into(),
            ));
        }
        if self.normalization.model_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "normalization.model_timeout_secs must be at least 1".into(),
            ));
        }
        if self.normalization.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "normalization.retry.max_attempts must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.scoring.quantity_numeric_ratio) {
            return Err(ConfigError::Invalid(
                "scoring.quantity_numeric_ratio must be between 0 and 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(PipelineConfig::from_toml_str("").unwrap(), PipelineConfig::default());
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [scoring]
            revision_penalty = -10

            [chunking]
            page_budget_per_call = 5

            [normalization.retry]
            backoff_ms = [0]
            "#,
        )
        .unwrap();

        assert_eq!(config.scoring.revision_penalty, -10);
        assert_eq!(config.scoring.item, 40);
        assert_eq!(config.chunking.page_budget_per_call, 5);
        assert_eq!(config.chunking.max_concurrency, 2);
        assert_eq!(config.normalization.retry.max_attempts, 3);
        assert_eq!(config.normalization.retry.backoff_ms, vec![0]);
        assert_eq!(config.normalization.max_context_chars, 4000);
    }

    #[test]
    fn test_rejects_zero_budget() {
        let err =
            PipelineConfig::from_toml_str("[chunking]\npage_budget_per_call = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_bad_toml() {
        let err = PipelineConfig::from_toml_str("[chunking\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_backoff_repeats_last_value() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for(1), 1000);
        assert_eq!(policy.backoff_for(3), 4000);
        assert_eq!(policy.backoff_for(7), 4000);
        assert_eq!(RetryPolicy::immediate(2).backoff_for(1), 0);
    }
}
