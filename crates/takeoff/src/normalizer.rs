use std::time::Duration;

use takeoff_core::config::NormalizationConfig;
use takeoff_core::line_items::RawItem;
use takeoff_core::normalize::{
    build_normalization_prompt, build_repair_prompt, fallback_output, finalize_output,
    parse_model_response, DocumentContext, ModelResponse, PipelineOutput, NORMALIZATION_PREAMBLE,
};

use crate::error::Error;
use crate::model::{CompletionModel, ModelError};

#[derive(Debug, Clone)]
pub struct NormalizationOutcome {
    pub output: PipelineOutput,
    /// Model calls made, retries included.
    pub attempts: u32,
    pub repaired: bool,
    pub fell_back: bool,
}

/// Normalize the raw items with the model, enforcing the item count.
///
/// A count mismatch gets one repair request; if that also fails, the raw
/// items pass through unnormalized and the output is marked for review. An
/// unreachable model degrades the same way. Only a first call that keeps
/// answering with unparseable output is an error.
pub async fn normalize_with_model<M: CompletionModel>(
    model: &M,
    raw_items: &[RawItem],
    context: &DocumentContext,
    config: &NormalizationConfig,
) -> Result<NormalizationOutcome, Error> {
    if raw_items.is_empty() {
        return Err(Error::NoLineItems(
            "the selected table has no data rows".into(),
        ));
    }

    let mut attempts = 0;
    let prompt = build_normalization_prompt(raw_items, context, config.max_context_chars);
    log::debug!(
        "Normalizing {} raw items with {} ({} prompt chars)",
        raw_items.len(),
        model.name(),
        prompt.len()
    );

    let response = match request_with_retry(model, &prompt, config, &mut attempts).await {
        Ok(response) => response,
        Err(Error::Network(message)) => {
            log::warn!("Model unavailable after {attempts} attempt(s): {message}");
            let reason = format!("model unavailable: {message}");
            return Ok(NormalizationOutcome {
                output: fallback_output(raw_items, &reason, None),
                attempts,
                repaired: false,
                fell_back: true,
            });
        }
        Err(err) => return Err(err),
    };
    let first_confidence = response.confidence();

    let mismatch = match finalize_output(raw_items, response, false) {
        Ok(output) => {
            return Ok(NormalizationOutcome {
                output,
                attempts,
                repaired: false,
                fell_back: false,
            })
        }
        Err(mismatch) => mismatch,
    };

    log::warn!("Cardinality mismatch ({mismatch}); requesting a repair");
    let repair_prompt = build_repair_prompt(
        raw_items,
        context,
        mismatch.actual,
        config.max_context_chars,
    );

    let reason = match request_with_retry(model, &repair_prompt, config, &mut attempts).await {
        Ok(response) => {
            let confidence = response.confidence().or(first_confidence);
            match finalize_output(raw_items, response, true) {
                Ok(output) => {
                    log::info!("Repair request restored {} items", raw_items.len());
                    return Ok(NormalizationOutcome {
                        output,
                        attempts,
                        repaired: true,
                        fell_back: false,
                    });
                }
                Err(again) => (format!("repair request failed: {again}"), confidence),
            }
        }
        Err(err) => (format!("repair request failed: {err}"), first_confidence),
    };

    log::warn!("Falling back to raw table values: {}", reason.0);
    let mut output = fallback_output(raw_items, &reason.0, reason.1);
    output
        .extraction_notes
        .insert(0, format!("first model answer: {mismatch}"));

    Ok(NormalizationOutcome {
        output,
        attempts,
        repaired: false,
        fell_back: true,
    })
}

/// Call the model until it returns parseable output or the retry policy is
/// exhausted. Timeouts and transport failures are retried the same way.
async fn request_with_retry<M: CompletionModel>(
    model: &M,
    prompt: &str,
    config: &NormalizationConfig,
    attempts: &mut u32,
) -> Result<ModelResponse, Error> {
    let policy = &config.retry;
    let max_attempts = policy.max_attempts.max(1);
    let timeout = Duration::from_secs(config.model_timeout_secs);
    let mut last_error: Option<Error> = None;

    for attempt in 1..=max_attempts {
        if let Some(err) = &last_error {
            let delay = policy.backoff_for(attempt - 1);
            log::warn!("Model call failed ({err}); retry {attempt}/{max_attempts} in {delay}ms");
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }

        *attempts += 1;
        let call = model.complete(NORMALIZATION_PREAMBLE, prompt);
        let text = match tokio::time::timeout(timeout, call).await {
            Ok(Ok(text)) => text,
            Ok(Err(err)) => {
                last_error = Some(Error::Network(err.to_string()));
                continue;
            }
            Err(_) => {
                let err = ModelError::Timeout(config.model_timeout_secs);
                last_error = Some(Error::Network(err.to_string()));
                continue;
            }
        };

        match parse_model_response(&text) {
            Ok(response) => return Ok(response),
            Err(err) => {
                let preview: String = text.chars().take(200).collect();
                log::debug!("Unparseable model output: {preview}");
                last_error = Some(Error::MalformedModelOutput {
                    attempts: attempt,
                    message: err.to_string(),
                });
            }
        }
    }

    Err(match last_error {
        Some(Error::MalformedModelOutput { message, .. }) => Error::MalformedModelOutput {
            attempts: max_attempts,
            message,
        },
        Some(err) => err,
        None => Error::Network("model was never called".into()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use takeoff_core::config::RetryPolicy;
    use takeoff_core::line_items::RawField;
    use takeoff_core::normalize::ItemFlag;

    /// Replays canned completions in order; the last one repeats.
    struct ScriptedModel {
        replies: Mutex<VecDeque<Result<String, ModelError>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<Result<String, ModelError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn prompts(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CompletionModel for ScriptedModel {
        async fn complete(&self, _preamble: &str, prompt: &str) -> Result<String, ModelError> {
            self.calls.lock().unwrap().push(prompt.to_string());
            let mut replies = self.replies.lock().unwrap();
            if replies.len() > 1 {
                replies.pop_front().unwrap()
            } else {
                replies.front().cloned().unwrap()
            }
        }

        fn name(&self) -> String {
            "scripted".into()
        }
    }

    fn raw_items(count: usize) -> Vec<RawItem> {
        (0..count)
            .map(|index| RawItem {
                index,
                page: Some(1),
                fields: vec![
                    RawField {
                        header: "Item".into(),
                        value: (index + 1).to_string(),
                    },
                    RawField {
                        header: "Description".into(),
                        value: format!("Flange {index}"),
                    },
                    RawField {
                        header: "Qty".into(),
                        value: "2".into(),
                    },
                ],
            })
            .collect()
    }

    fn reply(count: usize) -> Result<String, ModelError> {
        let items: Vec<serde_json::Value> = (0..count)
            .map(|i| {
                serde_json::json!({
                    "raw_index": i,
                    "description": format!("Flange {i}"),
                    "quantity": 2,
                    "unit": "EA"
                })
            })
            .collect();
        Ok(serde_json::json!({ "items": items, "confidence": 0.9 }).to_string())
    }

    fn config() -> NormalizationConfig {
        NormalizationConfig {
            model_timeout_secs: 5,
            max_context_chars: 1000,
            retry: RetryPolicy::immediate(3),
        }
    }

    async fn run(model: &ScriptedModel, count: usize) -> Result<NormalizationOutcome, Error> {
        normalize_with_model(model, &raw_items(count), &DocumentContext::default(), &config()).await
    }

    #[tokio::test]
    async fn test_exact_count_is_accepted() {
        let model = ScriptedModel::new(vec![reply(3)]);

        let outcome = run(&model, 3).await.unwrap();

        assert_eq!(outcome.output.items.len(), 3);
        assert_eq!(outcome.attempts, 1);
        assert!(!outcome.repaired);
        assert!(!outcome.fell_back);
        assert_eq!(outcome.output.items[2].quantity, Some(2));
    }

    #[tokio::test]
    async fn test_too_few_items_are_repaired() {
        let model = ScriptedModel::new(vec![reply(2), reply(3)]);

        let outcome = run(&model, 3).await.unwrap();

        assert_eq!(outcome.output.items.len(), 3);
        assert!(outcome.repaired);
        assert_eq!(outcome.attempts, 2);
        assert!(model.prompts()[1].contains("Your previous answer contained 2 items"));
        assert!((outcome.output.confidence - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_persistent_mismatch_falls_back_to_raw_items() {
        let model = ScriptedModel::new(vec![reply(2), reply(1)]);

        let outcome = run(&model, 3).await.unwrap();

        assert_eq!(outcome.output.items.len(), 3);
        assert!(outcome.fell_back);
        assert!(outcome.output.needs_review);
        assert!(outcome.output.confidence <= 0.2);
        assert!(outcome
            .output
            .items
            .iter()
            .all(|item| item.is_flagged(ItemFlag::PassThrough)));
        assert_eq!(outcome.output.items[1].description.as_deref(), Some("Flange 1"));
    }

    #[tokio::test]
    async fn test_too_many_items_never_leak_through() {
        let model = ScriptedModel::new(vec![reply(5)]);

        let outcome = run(&model, 3).await.unwrap();

        assert_eq!(outcome.output.items.len(), 3);
        assert!(outcome.fell_back);
    }

    #[tokio::test]
    async fn test_malformed_output_is_retried() {
        let model = ScriptedModel::new(vec![Ok("Sorry, I cannot help.".into()), reply(3)]);

        let outcome = run(&model, 3).await.unwrap();

        assert_eq!(outcome.attempts, 2);
        assert!(!outcome.repaired);
    }

    #[tokio::test]
    async fn test_exhausted_malformed_output_is_fatal() {
        let model = ScriptedModel::new(vec![Ok("not json".into())]);

        let err = run(&model, 3).await.unwrap_err();

        assert!(matches!(err, Error::MalformedModelOutput { attempts: 3, .. }));
        assert_eq!(model.prompts().len(), 3);
    }

    #[tokio::test]
    async fn test_malformed_repair_falls_back() {
        let model = ScriptedModel::new(vec![reply(2), Ok("```\nnope\n```".into())]);

        let outcome = run(&model, 3).await.unwrap();

        assert!(outcome.fell_back);
        assert_eq!(outcome.attempts, 4);
        assert_eq!(outcome.output.items.len(), 3);
    }

    #[tokio::test]
    async fn test_unreachable_model_falls_back_to_raw_items() {
        let model = ScriptedModel::new(vec![Err(ModelError::Request("connection refused".into()))]);

        let outcome = run(&model, 3).await.unwrap();

        assert_eq!(model.prompts().len(), 3);
        assert_eq!(outcome.attempts, 3);
        assert!(outcome.fell_back);
        assert!(outcome.output.needs_review);
        assert_eq!(outcome.output.items.len(), 3);
        assert!(outcome.output.confidence <= 0.2);
        assert!(outcome.output.extraction_notes[0].contains("model unavailable"));
        assert!(outcome.output.extraction_notes[0].contains("connection refused"));
    }

    #[tokio::test]
    async fn test_transport_failure_then_answer_is_retried() {
        let model = ScriptedModel::new(vec![
            Err(ModelError::Request("connection reset".into())),
            reply(3),
        ]);

        let outcome = run(&model, 3).await.unwrap();

        assert_eq!(outcome.attempts, 2);
        assert!(!outcome.fell_back);
    }

    #[tokio::test]
    async fn test_no_raw_items_is_no_line_items() {
        let model = ScriptedModel::new(vec![reply(0)]);

        let err = run(&model, 0).await.unwrap_err();

        assert!(matches!(err, Error::NoLineItems(_)));
        assert!(model.prompts().is_empty());
    }
}
