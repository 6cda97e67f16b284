//! Single tool call execution
//!
//! One call, one [`StepOutcome`]. Remote failures, timeouts and failures the
//! server reports inside a successful response all become data here.

use crate::classify::{ErrorClassifier, ErrorInfo, ErrorKind};
use crate::value::{Arguments, Command};
use async_trait::async_trait;
use base64::Engine as _;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Text marker a server uses to report a failed operation
pub const ERROR_MARKER: &str = "ERROR:";

const DEFAULT_MIME: &str = "application/octet-stream";

/// Tool endpoint errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("tool call failed: {0}")]
    Failed(String),

    #[error("endpoint unreachable: {0}")]
    Unreachable(String),
}

/// One content item as the server sent it
#[derive(Debug, Clone, PartialEq)]
pub struct RawContent {
    pub kind: String,
    pub payload: serde_json::Value,
    pub mime_type: Option<String>,
}

impl RawContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            payload: serde_json::Value::String(text.into()),
            mime_type: None,
        }
    }

    pub fn binary(base64_data: impl Into<String>, mime_type: Option<String>) -> Self {
        Self {
            kind: "binary".to_string(),
            payload: serde_json::Value::String(base64_data.into()),
            mime_type,
        }
    }

    pub fn other(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
            mime_type: None,
        }
    }
}

/// A call result before normalisation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawResult {
    pub content: Vec<RawContent>,
    pub is_error: bool,
}

impl RawResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![RawContent::text(text)],
            is_error: false,
        }
    }
}

/// A tool advertised by an endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}

/// Where tool calls go
#[async_trait]
pub trait ToolEndpoint: Send + Sync {
    async fn call(&self, tool_name: &str, arguments: &Arguments)
        -> Result<RawResult, RemoteError>;

    async fn list_tools(&self) -> Result<Vec<ToolInfo>, RemoteError>;
}

/// Normalised content item
#[derive(Debug, Clone, PartialEq)]
pub enum ContentItem {
    Text(String),
    Binary { data: Vec<u8>, mime_type: String },
    Other { tag: String, raw: serde_json::Value },
}

impl ContentItem {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentItem::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Result of one executed step
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub step_index: usize,
    pub tool_name: String,
    pub arguments: Arguments,
    pub success: bool,
    pub content: Vec<ContentItem>,
    pub error: Option<ErrorInfo>,
    pub elapsed: Duration,
}

impl StepOutcome {
    /// All text items joined by newlines
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentItem::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Normalise raw items, keeping server order
pub fn normalize(content: Vec<RawContent>) -> Vec<ContentItem> {
    content.into_iter().map(normalize_item).collect()
}

fn normalize_item(item: RawContent) -> ContentItem {
    match item.kind.as_str() {
        "text" => match item.payload {
            serde_json::Value::String(text) => ContentItem::Text(text),
            other => ContentItem::Text(other.to_string()),
        },
        "binary" | "image" | "audio" | "blob" => {
            let decoded = item
                .payload
                .as_str()
                .and_then(|data| base64::engine::general_purpose::STANDARD.decode(data).ok());
            match decoded {
                Some(data) => ContentItem::Binary {
                    data,
                    mime_type: item.mime_type.unwrap_or_else(|| DEFAULT_MIME.to_string()),
                },
                None => ContentItem::Other {
                    tag: item.kind,
                    raw: item.payload,
                },
            }
        }
        _ => ContentItem::Other {
            tag: item.kind,
            raw: item.payload,
        },
    }
}

/// Runs single tool calls under a time bound
pub struct Executor {
    endpoint: Arc<dyn ToolEndpoint>,
    timeout: Duration,
    classifier: ErrorClassifier,
}

impl Executor {
    pub fn new(endpoint: Arc<dyn ToolEndpoint>) -> Self {
        Self {
            endpoint,
            timeout: Duration::from_secs(60),
            classifier: ErrorClassifier::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &Arc<dyn ToolEndpoint> {
        &self.endpoint
    }

    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    pub async fn execute(&self, step_index: usize, command: &Command) -> StepOutcome {
        let started = Instant::now();
        debug!(
            "◆ step {}: calling {} with {} argument(s)",
            step_index + 1,
            command.tool_name,
            command.arguments.len()
        );

        let call = self.endpoint.call(&command.tool_name, &command.arguments);
        let (content, error) = match tokio::time::timeout(self.timeout, call).await {
            Err(_) => (
                Vec::new(),
                Some(ErrorInfo::new(
                    ErrorKind::RemoteCallTimeout,
                    format!(
                        "The tool call did not finish within {}s.",
                        self.timeout.as_secs()
                    ),
                    format!("{} timed out after {:?}", command.tool_name, self.timeout),
                )),
            ),
            Ok(Err(RemoteError::Unreachable(raw))) => (
                Vec::new(),
                Some(ErrorInfo::from_kind(ErrorKind::EndpointUnreachable, raw)),
            ),
            Ok(Err(RemoteError::Failed(raw))) => {
                (Vec::new(), Some(self.remote_failure(raw)))
            }
            Ok(Ok(raw)) => {
                let is_error = raw.is_error;
                let content = normalize(raw.content);
                let error = self.application_error(&content, is_error);
                (content, error)
            }
        };

        if let Some(error) = &error {
            warn!("◆ step {} failed: {} ({})", step_index + 1, error.kind, error.raw);
        }

        StepOutcome {
            step_index,
            tool_name: command.tool_name.clone(),
            arguments: command.arguments.clone(),
            success: error.is_none(),
            content,
            error,
            elapsed: started.elapsed(),
        }
    }

    fn remote_failure(&self, raw: String) -> ErrorInfo {
        let classified = self.classifier.classify(&raw);
        let message = match classified.kind {
            ErrorKind::Unclassified => ErrorKind::RemoteCallFailed.message_for(&raw),
            _ => classified.message,
        };
        ErrorInfo::new(ErrorKind::RemoteCallFailed, message, raw)
    }

    fn application_error(&self, content: &[ContentItem], is_error: bool) -> Option<ErrorInfo> {
        let texts: Vec<&str> = content.iter().filter_map(ContentItem::as_text).collect();
        let marked: Vec<&str> = texts
            .iter()
            .copied()
            .filter(|text| text.contains(ERROR_MARKER))
            .collect();

        if marked.is_empty() && !is_error {
            return None;
        }

        let raw = if marked.is_empty() {
            texts.join("\n")
        } else {
            marked.join("\n")
        };

        let info = self.classifier.classify(&raw);
        match info.kind {
            ErrorKind::Unclassified => Some(ErrorInfo::from_kind(ErrorKind::ApplicationError, raw)),
            _ => Some(info),
        }
    }
}
