use std::sync::Arc;

use serde::Serialize;

use crate::errors::{ScribeError, ScribeResult};
use crate::llm::normalize::{normalize, Described};
use crate::llm::provider::LlmProvider;
use crate::llm::types::{CallConfig, CompletionRequest};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JourneySummary {
    pub name: String,
    pub description: String,
}

impl From<Described> for JourneySummary {
    fn from(d: Described) -> Self {
        Self {
            name: d.name,
            description: d.description,
        }
    }
}

/// `Step 1: …` lines, one per step, in order.
pub fn format_steps(steps: &[String]) -> String {
    steps
        .iter()
        .enumerate()
        .map(|(i, step)| format!("Step {}: {}", i + 1, step))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Folds an ordered list of step descriptions into one name/description pair.
pub struct JourneyAggregator {
    backend: Arc<dyn LlmProvider>,
    call: CallConfig,
    /// Prompt template; `{steps}` is replaced with [`format_steps`] output.
    template: String,
}

impl JourneyAggregator {
    pub fn new(backend: Arc<dyn LlmProvider>, call: CallConfig, template: String) -> Self {
        Self {
            backend,
            call,
            template,
        }
    }

    pub fn prompt_for(&self, steps: &[String]) -> String {
        self.template.replace("{steps}", &format_steps(steps))
    }

    pub async fn summarize(&self, steps: &[String]) -> ScribeResult<JourneySummary> {
        if steps.is_empty() {
            return Err(ScribeError::InputValidation("No steps provided".into()));
        }
        let request = CompletionRequest::text(self.prompt_for(steps), self.call.journey_max_tokens);
        let raw = self.backend.complete(&request, &self.call).await?;
        let summary = JourneySummary::from(normalize(&raw));
        tracing::info!(steps = steps.len(), name = %summary.name, "journey summarised");
        Ok(summary)
    }
}
