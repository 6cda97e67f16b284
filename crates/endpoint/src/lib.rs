//! HTTP tool endpoint
//!
//! `POST {base}/api/tool/{name}/invoke` with the arguments as a JSON object,
//! `GET {base}/api/toolset` for the listing.

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::Value;
use std::time::Duration;
use toolshell_engine::{Arguments, Command, RawContent, RawResult, RemoteError, ToolEndpoint, ToolInfo};
use tracing::{debug, trace, warn};

/// Tool server reached over HTTP
pub struct HttpToolEndpoint {
    client: Client,
    base_url: String,
}

impl HttpToolEndpoint {
    /// `timeout` bounds each request on the client side
    pub fn try_new(base_url: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Like [`Self::try_new`]; falls back to a client without the timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url = base_url.into();
        match Self::try_new(base_url.clone(), timeout) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                warn!("◆ cannot build HTTP client with {:?} timeout: {}", timeout, e);
                Self::with_client(Client::new(), base_url)
            }
        }
    }

    fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Base URL extended by path segments, each one percent-encoded
    fn url_for(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let invalid = || RemoteError::Unreachable(format!("invalid endpoint URL: {}", self.base_url));
        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn invoke_url(&self, tool_name: &str) -> Result<Url, RemoteError> {
        self.url_for(&["api", "tool", tool_name, "invoke"])
    }

    fn toolset_url(&self) -> Result<Url, RemoteError> {
        self.url_for(&["api", "toolset"])
    }
}

fn transport_error(e: reqwest::Error) -> RemoteError {
    if e.is_connect() {
        RemoteError::Unreachable(e.to_string())
    } else {
        RemoteError::Failed(e.to_string())
    }
}

/// Failure text from a non-2xx body
fn error_text(status: reqwest::StatusCode, body: &str) -> String {
    let from_json = serde_json::from_str::<Value>(body).ok().and_then(|json| {
        let error = json.get("error").or_else(|| json.get("message"))?;
        match error {
            Value::String(s) => Some(s.clone()),
            other => other
                .get("message")
                .and_then(|m| m.as_str())
                .map(|s| s.to_string())
                .or_else(|| Some(other.to_string())),
        }
    });

    match from_json {
        Some(text) => text,
        None if body.trim().is_empty() => format!("HTTP {}", status),
        None => format!("HTTP {}: {}", status, body.trim()),
    }
}

/// Interpret a 2xx body
pub fn parse_body(body: &str) -> RawResult {
    match serde_json::from_str::<Value>(body) {
        Ok(json) => parse_json(json),
        Err(_) => RawResult::text(body),
    }
}

fn parse_json(json: Value) -> RawResult {
    if let Some(items) = json.get("content").and_then(|c| c.as_array()) {
        let is_error = json
            .get("isError")
            .or_else(|| json.get("is_error"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        return RawResult {
            content: items.iter().map(content_item).collect(),
            is_error,
        };
    }

    match json.get("result") {
        Some(Value::String(text)) => RawResult::text(text.clone()),
        Some(other) => RawResult::text(other.to_string()),
        None => RawResult::text(json.to_string()),
    }
}

fn content_item(item: &Value) -> RawContent {
    let kind = item
        .get("type")
        .and_then(|t| t.as_str())
        .unwrap_or("other")
        .to_string();
    let field = |name: &str| item.get(name).cloned();

    match kind.as_str() {
        "text" => RawContent::other(kind, field("text").unwrap_or_else(|| item.clone())),
        "binary" | "image" | "audio" | "blob" => RawContent {
            payload: field("data")
                .or_else(|| field("blob"))
                .unwrap_or_else(|| item.clone()),
            mime_type: item
                .get("mimeType")
                .or_else(|| item.get("mime_type"))
                .and_then(|m| m.as_str())
                .map(|s| s.to_string()),
            kind,
        },
        _ => RawContent::other(kind, item.clone()),
    }
}

/// Tool listing in either map or array form
pub fn parse_toolset(json: &Value) -> Vec<ToolInfo> {
    let description = |v: &Value| {
        v.get("description")
            .and_then(|d| d.as_str())
            .unwrap_or("")
            .to_string()
    };

    if let Some(map) = json.get("tools").and_then(|t| t.as_object()) {
        return map
            .iter()
            .map(|(name, spec)| ToolInfo {
                name: name.clone(),
                description: description(spec),
            })
            .collect();
    }

    let list = json
        .as_array()
        .or_else(|| json.get("tools").and_then(|t| t.as_array()));
    list.map(|items| {
        items
            .iter()
            .filter_map(|item| {
                let name = item.get("name")?.as_str()?.to_string();
                Some(ToolInfo {
                    name,
                    description: description(item),
                })
            })
            .collect()
    })
    .unwrap_or_default()
}

#[async_trait]
impl ToolEndpoint for HttpToolEndpoint {
    async fn call(
        &self,
        tool_name: &str,
        arguments: &Arguments,
    ) -> Result<RawResult, RemoteError> {
        let url = self.invoke_url(tool_name)?;
        let body = Command {
            tool_name: tool_name.to_string(),
            arguments: arguments.clone(),
        }
        .arguments_json();
        trace!("◆ POST {} {}", url, body);

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;
        debug!("◆ {} answered {} ({} bytes)", tool_name, status, text.len());

        if !status.is_success() {
            return Err(RemoteError::Failed(error_text(status, &text)));
        }

        Ok(parse_body(&text))
    }

    async fn list_tools(&self) -> Result<Vec<ToolInfo>, RemoteError> {
        let response = self
            .client
            .get(self.toolset_url()?)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(RemoteError::Failed(error_text(status, &text)));
        }

        let json: Value = serde_json::from_str(&text)
            .map_err(|e| RemoteError::Failed(format!("malformed toolset: {}", e)))?;
        Ok(parse_toolset(&json))
    }
}
