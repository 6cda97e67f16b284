//! OpenAI-compatible chat completions
//!
//! Works against OpenAI, OpenRouter and Gemini's OpenAI-compatible surface.
//! The API base and default model are derived from the key when not given.

use crate::*;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, trace};

const OPENROUTER_BASE: &str = "https://openrouter.ai/api/v1";
const OPENAI_BASE: &str = "https://api.openai.com/v1";
const GEMINI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

/// Which service a key belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vendor {
    OpenRouter,
    Gemini,
    OpenAi,
}

impl Vendor {
    fn detect(api_key: &str, api_base: Option<&str>) -> Self {
        if let Some(base) = api_base {
            if base.contains("openrouter") {
                return Vendor::OpenRouter;
            }
            if base.contains("generativelanguage") {
                return Vendor::Gemini;
            }
        }
        if api_key.starts_with("sk-or-") {
            Vendor::OpenRouter
        } else if api_key.starts_with("AIza") {
            Vendor::Gemini
        } else {
            Vendor::OpenAi
        }
    }

    fn base(self) -> &'static str {
        match self {
            Vendor::OpenRouter => OPENROUTER_BASE,
            Vendor::Gemini => GEMINI_BASE,
            Vendor::OpenAi => OPENAI_BASE,
        }
    }

    fn model(self) -> &'static str {
        match self {
            Vendor::OpenRouter => "google/gemini-2.0-flash-001",
            Vendor::Gemini => "gemini-2.0-flash",
            Vendor::OpenAi => "gpt-4o-mini",
        }
    }
}

/// OpenAI-compatible provider
pub struct CompatProvider {
    client: Client,
    api_key: String,
    api_base: String,
    default_model: String,
    vendor: Vendor,
}

impl CompatProvider {
    pub fn new(
        api_key: impl Into<String>,
        api_base: Option<String>,
        default_model: Option<String>,
    ) -> Self {
        let api_key = api_key.into();
        let vendor = Vendor::detect(&api_key, api_base.as_deref());
        let api_base = api_base
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| vendor.base().to_string());
        let default_model = default_model
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| vendor.model().to_string());

        Self {
            client: Client::new(),
            api_key,
            api_base: api_base.trim_end_matches('/').to_string(),
            default_model,
            vendor,
        }
    }

    pub fn vendor(&self) -> Vendor {
        self.vendor
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn build_request(&self, params: &ChatParams) -> serde_json::Value {
        let model = if params.model.is_empty() {
            self.default_model.clone()
        } else {
            params.model.clone()
        };

        json!({
            "model": model,
            "messages": params.messages,
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
        })
    }

    fn parse_response(&self, json: serde_json::Value) -> Result<ChatResponse> {
        let choice = json["choices"]
            .get(0)
            .ok_or(ProviderError::InvalidResponse)?;
        let content = choice["message"]["content"].as_str().map(|s| s.to_string());
        let finish_reason = choice["finish_reason"]
            .as_str()
            .unwrap_or("stop")
            .to_string();

        let usage = match json["usage"].as_object() {
            Some(usage) => {
                let count = |key: &str| usage.get(key).and_then(|v| v.as_u64()).unwrap_or(0) as u32;
                Usage {
                    prompt_tokens: count("prompt_tokens"),
                    completion_tokens: count("completion_tokens"),
                    total_tokens: count("total_tokens"),
                }
            }
            None => Usage::default(),
        };

        Ok(ChatResponse {
            content,
            finish_reason,
            usage,
        })
    }
}

#[async_trait::async_trait]
impl Provider for CompatProvider {
    async fn chat(&self, params: ChatParams) -> Result<ChatResponse> {
        if !self.is_configured() {
            return Err(ProviderError::NoApiKey);
        }
        trace!("◆ chat request to {}", self.api_base);

        let url = format!("{}/chat/completions", self.api_base);
        let body = self.build_request(&params);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited);
        }

        let json: serde_json::Value = response.json().await?;

        if !status.is_success() {
            let error = json["error"]["message"]
                .as_str()
                .map(|s| s.to_string())
                .unwrap_or_else(|| format!("status {}", status));
            return Err(ProviderError::Api(error));
        }

        let parsed = self.parse_response(json)?;
        debug!(
            "◆ chat response: {} completion tokens, finish={}",
            parsed.usage.completion_tokens, parsed.finish_reason
        );
        Ok(parsed)
    }

    fn default_model(&self) -> String {
        self.default_model.clone()
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}
