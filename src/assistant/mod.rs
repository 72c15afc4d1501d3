//! Post-onboarding assistant: intent routing, the welfare-search and
//! general-query handlers, and response normalization for speech.

pub mod general;
pub mod normalizer;
pub mod router;
pub mod welfare;

pub use general::GeneralQueryHandler;
pub use normalizer::ResponseNormalizer;
pub use router::IntentRouter;
pub use welfare::WelfareSearchHandler;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use rust_decimal::Decimal;

    use crate::error::LlmError;
    use crate::llm::{CompletionRequest, CompletionResponse, FinishReason, LlmProvider};

    /// Returns a fixed reply (or fails) and records every user prompt.
    pub struct RecordingLlm {
        reply: Option<String>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl RecordingLlm {
        pub fn replying(reply: &str) -> Self {
            Self {
                reply: Some(reply.to_string()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn failing() -> Self {
            Self {
                reply: None,
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }

        pub fn last_prompt(&self) -> String {
            self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl LlmProvider for RecordingLlm {
        fn model_name(&self) -> &str {
            "recording"
        }
        fn cost_per_token(&self) -> (Decimal, Decimal) {
            (Decimal::ZERO, Decimal::ZERO)
        }
        async fn complete(&self, req: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            let prompt = req
                .messages
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            self.prompts.lock().unwrap().push(prompt);
            match &self.reply {
                Some(reply) => Ok(CompletionResponse {
                    content: reply.clone(),
                    input_tokens: 0,
                    output_tokens: 0,
                    finish_reason: FinishReason::Stop,
                    response_id: None,
                }),
                None => Err(LlmError::Timeout {
                    provider: "recording".into(),
                    timeout: std::time::Duration::from_secs(30),
                }),
            }
        }
    }
}
