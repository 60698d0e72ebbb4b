//! Language-model boundary.
//!
//! The pipeline treats the model as a black-box text completion function.
//! Concrete HTTP backends live in the app crate; [`MockModel`] is a
//! deterministic stand-in for tests and offline runs.

use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Identifier recorded as `model_version` on insights and predictions.
    fn model_name(&self) -> &str;

    async fn complete(&self, prompt: &str, temperature: f32, max_tokens: u32) -> Result<String>;
}

/// Scripted language model.
///
/// Returns the response of the first rule whose needle occurs in the
/// prompt, else the default response. In failing mode every call errors.
///
/// ```
/// use filing_intel_core::llm::{LanguageModel, MockModel};
///
/// # tokio_test_block(async {
/// let model = MockModel::new("fallback").with_rule("Total Revenue", "$10M");
/// assert_eq!(model.complete("Extract Total Revenue", 0.0, 16).await.unwrap(), "$10M");
/// assert_eq!(model.complete("Summarize", 0.0, 16).await.unwrap(), "fallback");
/// assert_eq!(model.call_count(), 2);
/// # });
/// # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Runtime::new().unwrap().block_on(f)
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MockModel {
    name: String,
    default_response: String,
    rules: Vec<(String, String)>,
    failing: bool,
    call_count: Arc<Mutex<usize>>,
}

impl MockModel {
    pub fn new(default_response: impl Into<String>) -> Self {
        Self {
            name: "mock-model".to_string(),
            default_response: default_response.into(),
            rules: Vec::new(),
            failing: false,
            call_count: Arc::new(Mutex::new(0)),
        }
    }

    /// A model whose every call fails.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::new("")
        }
    }

    pub fn with_rule(mut self, needle: impl Into<String>, response: impl Into<String>) -> Self {
        self.rules.push((needle.into(), response.into()));
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }
}

impl Default for MockModel {
    fn default() -> Self {
        Self::new("Default mock response")
    }
}

#[async_trait]
impl LanguageModel for MockModel {
    fn model_name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, prompt: &str, _temperature: f32, _max_tokens: u32) -> Result<String> {
        *self.call_count.lock().unwrap() += 1;
        if self.failing {
            bail!("mock model configured to fail");
        }
        let response = self
            .rules
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| self.default_response.clone());
        Ok(response)
    }
}
