//! The four insight extractors.
//!
//! Each extractor fills a fixed instruction template with caller-assembled
//! context and sends it to the [`LanguageModel`] in a single call. A failed
//! call is never propagated: the extractor logs a warning and returns a
//! string starting with [`DEGRADED_PREFIX`], which downstream scoring
//! treats as a failed extraction.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::llm::LanguageModel;

/// Marker that starts every degraded extractor result.
pub const DEGRADED_PREFIX: &str = "Error during ";

pub const NOT_FOUND: &str = "Not found";
pub const NO_RISKS: &str = "No risks identified";

/// Returns true if `value` came from a failed model call.
pub fn is_degraded(value: &str) -> bool {
    value.starts_with(DEGRADED_PREFIX)
}

/// Sampling parameters forwarded on every call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 512,
        }
    }
}

/// Categorical part of a sentiment answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    /// Finds the first label mentioned in a free-text answer.
    pub fn parse(answer: &str) -> Option<Self> {
        let lower = answer.to_lowercase();
        [
            ("positive", SentimentLabel::Positive),
            ("negative", SentimentLabel::Negative),
            ("neutral", SentimentLabel::Neutral),
        ]
        .into_iter()
        .filter_map(|(word, label)| lower.find(word).map(|pos| (pos, label)))
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, label)| label)
    }

    /// `1.0`, `-1.0` or `0.0`; used as a numeric drift feature.
    pub fn score(self) -> f64 {
        match self {
            SentimentLabel::Positive => 1.0,
            SentimentLabel::Negative => -1.0,
            SentimentLabel::Neutral => 0.0,
        }
    }
}

fn metric_prompt(context: &str, metric: &str) -> String {
    format!(
        "You are given excerpts from a financial filing:\n{context}\n\n\
         Extract the value of this financial metric: {metric}\n\
         If the filing does not state it, answer exactly '{NOT_FOUND}'.\n\
         Value:"
    )
}

fn sentiment_prompt(context: &str) -> String {
    format!(
        "Classify the sentiment of this financial text as Positive, Negative or Neutral, \
         then justify the label in one or two sentences.\n\
         Text: {context}\n\
         Sentiment:"
    )
}

fn risk_prompt(context: &str) -> String {
    format!(
        "List the risks disclosed in these financial filing excerpts, one per line. \
         If none are disclosed, answer exactly '{NO_RISKS}'.\n\
         Text: {context}\n\
         Risks:"
    )
}

fn summary_prompt(context: &str) -> String {
    format!(
        "Write a concise summary of the financial content below, covering performance, \
         position and outlook.\n\
         Text: {context}\n\
         Summary:"
    )
}

/// Stateless extractors sharing one model handle.
#[derive(Clone)]
pub struct InsightExtractors {
    model: Arc<dyn LanguageModel>,
    settings: GenerationSettings,
}

impl InsightExtractors {
    pub fn new(model: Arc<dyn LanguageModel>, settings: GenerationSettings) -> Self {
        Self { model, settings }
    }

    pub fn model_version(&self) -> &str {
        self.model.model_name()
    }

    pub async fn extract_metric(&self, context: &str, metric: &str) -> String {
        self.run("extraction", metric_prompt(context, metric)).await
    }

    pub async fn analyze_sentiment(&self, context: &str) -> String {
        self.run("analysis", sentiment_prompt(context)).await
    }

    pub async fn identify_risks(&self, context: &str) -> String {
        self.run("identification", risk_prompt(context)).await
    }

    pub async fn summarize(&self, context: &str) -> String {
        self.run("generation", summary_prompt(context)).await
    }

    async fn run(&self, task: &str, prompt: String) -> String {
        match self
            .model
            .complete(&prompt, self.settings.temperature, self.settings.max_tokens)
            .await
        {
            Ok(answer) => answer.trim().to_string(),
            Err(e) => {
                warn!(task, model = self.model.model_name(), error = %e, "extraction degraded");
                format!("{DEGRADED_PREFIX}{task}: {e}")
            }
        }
    }
}
