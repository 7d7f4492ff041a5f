//! [`Generator`] backed by the Anthropic Messages API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use seoforge_shared::{AnthropicConfig, Result, SeoforgeError, read_secret};

use crate::generation::{GenerationRequest, Generator};
use crate::prompts;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const WEB_SEARCH_TOOL: &str = "web_search_20250305";

/// Connection and sampling settings for [`AnthropicGenerator`].
#[derive(Debug, Clone)]
pub struct AnthropicOptions {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub max_searches: u32,
}

impl AnthropicOptions {
    /// Build options from the `[anthropic]` config section, reading the API key
    /// from the environment variable it names.
    pub fn from_config(config: &AnthropicConfig) -> Result<Self> {
        Ok(Self {
            api_key: read_secret(&config.api_key_env)?,
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout_secs: config.timeout_secs,
            max_searches: config.max_searches,
        })
    }
}

pub struct AnthropicGenerator {
    client: Client,
    opts: AnthropicOptions,
}

impl AnthropicGenerator {
    pub fn new(opts: AnthropicOptions) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(opts.timeout_secs))
            .build()
            .map_err(|e| SeoforgeError::config(format!("failed to build Anthropic client: {e}")))?;
        Ok(Self { client, opts })
    }
}

#[async_trait]
impl Generator for AnthropicGenerator {
    #[instrument(skip_all, fields(stage = request.stage.name(), model = %self.opts.model))]
    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String> {
        let stage = request.stage.name();
        let system = prompts::system_prompt(request.profile, request.brief);
        let user = prompts::user_prompt(request);

        let tools = if request.profile.uses_web_search() {
            vec![Tool {
                kind: WEB_SEARCH_TOOL,
                name: "web_search",
                max_uses: self.opts.max_searches,
            }]
        } else {
            Vec::new()
        };

        let body = MessagesRequest {
            model: &self.opts.model,
            max_tokens: self.opts.max_tokens,
            temperature: self.opts.temperature,
            system: &system,
            messages: vec![Message {
                role: "user",
                content: &user,
            }],
            tools,
        };

        let url = format!("{}/v1/messages", self.opts.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.opts.api_key.trim())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| SeoforgeError::generation(stage, format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(SeoforgeError::generation(
                stage,
                format!("Anthropic returned {status}: {text}"),
            ));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| SeoforgeError::generation(stage, format!("invalid response: {e}")))?;

        let text: String = parsed
            .content
            .into_iter()
            .filter_map(|block| match block {
                ResponseBlock::Text { text } => Some(text),
                ResponseBlock::Other => None,
            })
            .collect();

        if text.trim().is_empty() {
            return Err(SeoforgeError::generation(
                stage,
                "response contained no text content",
            ));
        }

        debug!(
            chars = text.len(),
            input_tokens = parsed.usage.as_ref().map(|u| u.input_tokens),
            output_tokens = parsed.usage.as_ref().map(|u| u.output_tokens),
            "generation complete"
        );
        Ok(text)
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct Tool {
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'static str,
    max_uses: u32,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}
