//! Anthropic Messages API client.
//!
//! One client serves both the explanation generator and the script repairer.
//! Transport failures are retried `max_retries` times with `2^attempt` second
//! back-off; anything above that (timeouts on the whole generation, the
//! fallback prompt) belongs to the chat pipeline.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::config::AnthropicConfig;
use crate::domain::{Generation, GenerationError, RepairError};
use crate::ports::{ExplanationGenerator, ScriptRepairer};

const API_VERSION: &str = "2023-06-01";
const GENERATION_MAX_TOKENS: u32 = 4000;
const PING_MAX_TOKENS: u32 = 5;

const GENERATE_SYSTEM: &str =
    "You are an expert educator and Python programmer specializing in Manim animations.";

const GENERATE_INSTRUCTIONS: &str = "\
Provide a clear, educational explanation of the concept (2-3 short paragraphs), \
then complete, executable Manim (v0.19+) code in a single ```python code block. \
The code must start with `from manim import *` and define exactly one `Scene` \
subclass with a `construct` method. Build the animation step by step with \
readable text and pauses between steps.";

const SIMPLE_SYSTEM: &str = "\
You are a helpful educational assistant. Give a clear explanation in 2-3 sentences, \
then simple Manim code in a ```python code block that directly demonstrates the concept. \
Use only basic shapes, Text, Create/FadeIn/FadeOut/Transform and basic colors. \
Avoid LaTeX, custom fonts and external files. Keep the animation under 10 seconds.";

const REPAIR_SYSTEM: &str = "\
You are an expert Python and Manim debugger. Given code that fails with an error, \
fix the code so it works in Manim v0.19.0+. Return ONLY the fixed code, no explanation.";

static PYTHON_BLOCK: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)```python(.*?)(?:```|$)").ok());

static ANY_FENCE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)^```[A-Za-z0-9_-]*\s*\n(.*?)\n?```\s*$").ok());

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "str::is_empty")]
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: Vec<TextBlock<'a>>,
}

#[derive(Debug, Serialize)]
struct TextBlock<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

pub struct AnthropicClient {
    client: Client,
    config: AnthropicConfig,
}

impl AnthropicClient {
    pub fn new(config: AnthropicConfig) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                GenerationError::RequestFailed(format!("failed to build HTTP client: {e}"))
            })?;
        Ok(Self { client, config })
    }

    fn messages_url(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{base}/messages")
        } else {
            format!("{base}/v1/messages")
        }
    }

    /// Sends one conversation turn and returns the concatenated text blocks.
    async fn complete(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
    ) -> Result<String, GenerationError> {
        let body = build_request(&self.config.model, system, user, max_tokens);
        let mut attempt = 0;
        loop {
            match self.send_once(&body).await {
                Ok(text) => return Ok(text),
                Err(e) if attempt < self.config.max_retries => {
                    let delay = Duration::from_secs(1u64 << attempt.min(6));
                    tracing::warn!(
                        attempt = attempt + 1,
                        max = self.config.max_retries + 1,
                        "model request failed, retrying in {:?}: {}",
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once(&self, body: &MessagesRequest<'_>) -> Result<String, GenerationError> {
        let response = self
            .client
            .post(self.messages_url())
            .header("x-api-key", self.config.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| GenerationError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GenerationError::RequestFailed(format!("{status} - {text}")));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::MalformedResponse(e.to_string()))?;
        Ok(collect_text(parsed))
    }
}

#[async_trait]
impl ExplanationGenerator for AnthropicClient {
    async fn generate(&self, prompt: &str) -> Result<Generation, GenerationError> {
        let user = format!("{GENERATE_INSTRUCTIONS}\n\nUSER INPUT:\nText: {prompt}");
        let text = self
            .complete(GENERATE_SYSTEM, &user, GENERATION_MAX_TOKENS)
            .await?;
        Ok(split_generation(&text))
    }

    async fn generate_simple(&self, prompt: &str) -> Result<Generation, GenerationError> {
        let text = self
            .complete(SIMPLE_SYSTEM, prompt, GENERATION_MAX_TOKENS)
            .await?;
        Ok(split_generation(&text))
    }

    async fn ping(&self) -> Result<(), GenerationError> {
        self.complete("", "Hello, this is a test message.", PING_MAX_TOKENS)
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl ScriptRepairer for AnthropicClient {
    async fn repair(&self, script: &str, error: &str) -> Result<String, RepairError> {
        let user = format!(
            "The following Manim code fails with this error:\n{error}\n\
             Please fix the code so it works in Manim v0.19.0+. Return only the fixed code.\n\
             \nCODE:\n{script}"
        );
        let text = self
            .complete(REPAIR_SYSTEM, &user, GENERATION_MAX_TOKENS)
            .await
            .map_err(|e| RepairError::RequestFailed(e.to_string()))?;
        let fixed = strip_code_fence(&text);
        if fixed.is_empty() {
            return Err(RepairError::Empty);
        }
        Ok(fixed)
    }
}

fn build_request<'a>(
    model: &'a str,
    system: &'a str,
    user: &'a str,
    max_tokens: u32,
) -> MessagesRequest<'a> {
    MessagesRequest {
        model,
        max_tokens,
        temperature: 0.7,
        system,
        messages: vec![Message {
            role: "user",
            content: vec![TextBlock {
                kind: "text",
                text: user,
            }],
        }],
    }
}

fn collect_text(response: MessagesResponse) -> String {
    response
        .content
        .into_iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text),
            ContentBlock::Other => None,
        })
        .collect()
}

/// Explanation is everything before the first ```python fence; the script is
/// that block (an unterminated block runs to the end of the text).
fn split_generation(text: &str) -> Generation {
    let script = PYTHON_BLOCK
        .as_ref()
        .and_then(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());

    match script {
        Some(script) => {
            let explanation = text.split("```python").next().unwrap_or_default().trim();
            Generation::new(explanation, Some(script))
        }
        None => Generation::explanation_only(text.trim()),
    }
}

/// Repair answers should be bare code, but models like to fence them anyway.
fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    if let Some(m) = PYTHON_BLOCK
        .as_ref()
        .and_then(|re| re.captures(trimmed))
        .and_then(|caps| caps.get(1))
    {
        return m.as_str().trim().to_string();
    }
    ANY_FENCE
        .as_ref()
        .and_then(|re| re.captures(trimmed))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| trimmed.to_string())
}
