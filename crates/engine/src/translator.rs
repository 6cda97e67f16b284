//! Natural language to command translation
//!
//! The translator backend is untrusted and optional. Every failure degrades
//! to passing the user's text through unchanged, with a warning attached.

use crate::classify::{ErrorInfo, ErrorKind};
use crate::value::Value;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use toolshell_provider::{ChatParams, Message, Provider, ProviderError};
use tracing::{debug, warn};

/// Translator backend errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompletionError {
    #[error("translator unavailable: {0}")]
    Unavailable(String),

    #[error("translator failed: {0}")]
    Failed(String),
}

/// Text in, text out
#[async_trait]
pub trait Completion: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        system_instruction: &str,
    ) -> Result<String, CompletionError>;
}

/// [`Completion`] over a chat [`Provider`], with optional bounded memory
pub struct ChatCompletion<P: Provider> {
    provider: P,
    model: String,
    temperature: f32,
    max_tokens: u32,
    history: Option<Mutex<Vec<Message>>>,
    max_history: usize,
}

impl<P: Provider> ChatCompletion<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            model: String::new(),
            temperature: 0.1,
            max_tokens: 1024,
            history: None,
            max_history: 0,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Remember up to `max_messages` prior user/assistant messages
    pub fn with_history(mut self, max_messages: usize) -> Self {
        self.history = Some(Mutex::new(Vec::new()));
        self.max_history = max_messages;
        self
    }

    pub async fn history_len(&self) -> usize {
        match &self.history {
            Some(history) => history.lock().await.len(),
            None => 0,
        }
    }
}

#[async_trait]
impl<P: Provider> Completion for ChatCompletion<P> {
    async fn complete(
        &self,
        prompt: &str,
        system_instruction: &str,
    ) -> Result<String, CompletionError> {
        if !self.provider.is_configured() {
            return Err(CompletionError::Unavailable(
                "no api key configured".to_string(),
            ));
        }

        let mut messages = vec![Message::system(system_instruction)];
        if let Some(history) = &self.history {
            messages.extend(history.lock().await.iter().cloned());
        }
        messages.push(Message::user(prompt));

        let params = ChatParams {
            model: self.model.clone(),
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self.provider.chat(params).await.map_err(|e| match e {
            ProviderError::NoApiKey => CompletionError::Unavailable(e.to_string()),
            ProviderError::Request(ref inner) if inner.is_connect() => {
                CompletionError::Unavailable(e.to_string())
            }
            other => CompletionError::Failed(other.to_string()),
        })?;
        let text = response.text_or_empty().trim().to_string();

        if let Some(history) = &self.history {
            let mut history = history.lock().await;
            history.push(Message::user(prompt));
            history.push(Message::assistant(text.clone()));
            if history.len() > self.max_history {
                let excess = history.len() - self.max_history;
                history.drain(..excess);
            }
        }

        Ok(text)
    }
}

/// What the translator made of the input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslationResult {
    Direct(String),
    NeedsInfo(String),
    MultiStep(Vec<String>),
}

impl TranslationResult {
    /// Executable steps in order; none for `NeedsInfo`
    pub fn steps(&self) -> Vec<String> {
        match self {
            TranslationResult::Direct(command) => vec![command.clone()],
            TranslationResult::NeedsInfo(_) => Vec::new(),
            TranslationResult::MultiStep(steps) => steps.clone(),
        }
    }
}

/// A translation and the degradation warning, if any
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub result: TranslationResult,
    pub warning: Option<ErrorInfo>,
}

impl Translation {
    fn direct(input: &str) -> Self {
        Self {
            result: TranslationResult::Direct(input.to_string()),
            warning: None,
        }
    }

    fn degraded(input: &str, warning: ErrorInfo) -> Self {
        warn!("◆ translator degraded to pass-through: {}", warning.raw);
        Self {
            result: TranslationResult::Direct(input.to_string()),
            warning: Some(warning),
        }
    }
}

/// Prefixes recognised in translator output
#[derive(Debug, Clone)]
pub struct Sentinels {
    pub needs_info: Vec<String>,
    pub multi_step: Vec<String>,
    pub separator: String,
}

impl Default for Sentinels {
    fn default() -> Self {
        Self {
            needs_info: vec![
                "Need more info:".to_string(),
                "More information needed:".to_string(),
                "More information needed".to_string(),
            ],
            multi_step: vec!["Multi-step:".to_string(), "Multistep:".to_string()],
            separator: "&&".to_string(),
        }
    }
}

/// Extra facts handed to the translator with a request
pub type TranslationContext = BTreeMap<String, Value>;

/// Translator adapter
pub struct Translator {
    backend: Option<Arc<dyn Completion>>,
    system_instruction: String,
    sentinels: Sentinels,
    timeout: Duration,
}

impl Translator {
    /// No backend: every input is used as a literal command
    pub fn passthrough() -> Self {
        Self {
            backend: None,
            system_instruction: String::new(),
            sentinels: Sentinels::default(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn new(backend: Arc<dyn Completion>, system_instruction: impl Into<String>) -> Self {
        Self {
            backend: Some(backend),
            system_instruction: system_instruction.into(),
            ..Self::passthrough()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_sentinels(mut self, sentinels: Sentinels) -> Self {
        self.sentinels = sentinels;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.backend.is_some()
    }

    pub async fn translate(
        &self,
        input: &str,
        context: Option<&TranslationContext>,
    ) -> Translation {
        let Some(backend) = &self.backend else {
            return Translation::direct(input);
        };

        let prompt = build_prompt(input, context);
        let call = backend.complete(&prompt, &self.system_instruction);

        match tokio::time::timeout(self.timeout, call).await {
            Err(_) => Translation::degraded(
                input,
                ErrorInfo::new(
                    ErrorKind::TranslatorTimeout,
                    format!(
                        "The translator did not answer within {}s; the input was used as a literal command.",
                        self.timeout.as_secs()
                    ),
                    format!("no answer after {:?}", self.timeout),
                ),
            ),
            Ok(Err(e)) => Translation::degraded(
                input,
                ErrorInfo::new(
                    ErrorKind::TranslatorUnavailable,
                    "The translator is unavailable; the input was used as a literal command.",
                    e.to_string(),
                ),
            ),
            Ok(Ok(output)) => {
                if strip_fence(&output).is_empty() {
                    return Translation::degraded(
                        input,
                        ErrorInfo::new(
                            ErrorKind::TranslatorUnavailable,
                            "The translator returned nothing; the input was used as a literal command.",
                            "empty output",
                        ),
                    );
                }
                let result = self.interpret(&output);
                debug!("◆ translated {:?} -> {:?}", input, result);
                Translation {
                    result,
                    warning: None,
                }
            }
        }
    }

    /// Classify raw translator output
    pub fn interpret(&self, output: &str) -> TranslationResult {
        let text = strip_fence(output);

        if let Some(rest) = strip_prefix_ci(text, &self.sentinels.needs_info) {
            return TranslationResult::NeedsInfo(rest.trim().to_string());
        }
        if let Some(rest) = strip_prefix_ci(text, &self.sentinels.multi_step) {
            return TranslationResult::MultiStep(split_steps(rest, &self.sentinels.separator));
        }

        TranslationResult::Direct(text.to_string())
    }
}

fn build_prompt(input: &str, context: Option<&TranslationContext>) -> String {
    match context.filter(|ctx| !ctx.is_empty()) {
        None => input.to_string(),
        Some(ctx) => {
            let lines = ctx
                .iter()
                .map(|(key, value)| format!("- {}: {}", key, value))
                .collect::<Vec<_>>()
                .join("\n");
            format!("Context:\n{}\n\nRequest: {}", lines, input)
        }
    }
}

fn strip_prefix_ci<'a>(text: &'a str, prefixes: &[String]) -> Option<&'a str> {
    prefixes.iter().find_map(|prefix| {
        text.get(..prefix.len())
            .filter(|head| head.eq_ignore_ascii_case(prefix))
            .map(|_| &text[prefix.len()..])
    })
}

/// Remove one surrounding ``` fence, if present
pub fn strip_fence(output: &str) -> &str {
    let text = output.trim();
    if !text.starts_with("```") {
        return text;
    }

    match text.split_once('\n') {
        // First line is the fence plus an optional language tag
        Some((_, body)) => {
            let body = body.trim_end();
            body.strip_suffix("```").unwrap_or(body).trim()
        }
        None => text.trim_matches('`').trim(),
    }
}

/// Split a plan on a standalone separator token outside quotes
pub fn split_steps(body: &str, separator: &str) -> Vec<String> {
    let chars: Vec<char> = body.chars().collect();
    let sep: Vec<char> = separator.chars().collect();
    let is_boundary = |i: usize| i == 0 || i >= chars.len() || chars[i].is_whitespace();

    let mut steps = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match quote {
            Some(q) => {
                current.push(c);
                if c == '\\' && q == '"' && i + 1 < chars.len() {
                    current.push(chars[i + 1]);
                    i += 2;
                    continue;
                }
                if c == q {
                    quote = None;
                }
            }
            None => {
                if c == '\\' && i + 1 < chars.len() {
                    current.push(c);
                    current.push(chars[i + 1]);
                    i += 2;
                    continue;
                }
                if c == '\'' || c == '"' {
                    quote = Some(c);
                    current.push(c);
                } else if !sep.is_empty()
                    && chars[i..].starts_with(&sep)
                    && (i == 0 || is_boundary(i - 1))
                    && is_boundary(i + sep.len())
                {
                    push_step(&mut steps, &current);
                    current.clear();
                    i += sep.len();
                    continue;
                } else {
                    current.push(c);
                }
            }
        }
        i += 1;
    }
    push_step(&mut steps, &current);

    steps
}

fn push_step(steps: &mut Vec<String>, step: &str) {
    let step = step.trim();
    if !step.is_empty() {
        steps.push(step.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_fence_with_language() {
        assert_eq!(strip_fence("```bash\nlist_tables\n```"), "list_tables");
        assert_eq!(strip_fence("  list_tables  "), "list_tables");
        assert_eq!(strip_fence("```list_tables```"), "list_tables");
    }

    #[test]
    fn test_prefix_is_case_insensitive() {
        let prefixes = vec!["Need more info:".to_string()];
        assert_eq!(
            strip_prefix_ci("NEED MORE INFO: which zone?", &prefixes),
            Some(" which zone?")
        );
        assert_eq!(strip_prefix_ci("Need", &prefixes), None);
    }

    #[test]
    fn test_prefix_on_multibyte_text() {
        let prefixes = vec!["Multi-step:".to_string()];
        assert_eq!(strip_prefix_ci("ééééé", &prefixes), None);
    }

    #[test]
    fn test_build_prompt_with_context() {
        let mut ctx = TranslationContext::new();
        ctx.insert("project".to_string(), Value::from("p1"));
        let prompt = build_prompt("list buckets", Some(&ctx));
        assert_eq!(prompt, "Context:\n- project: p1\n\nRequest: list buckets");
        assert_eq!(build_prompt("x", Some(&TranslationContext::new())), "x");
    }

    #[test]
    fn test_separator_must_stand_alone() {
        assert_eq!(
            split_steps("a url=x?p=1&&q=2 && b", "&&"),
            vec!["a url=x?p=1&&q=2".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn test_unterminated_quote_keeps_remainder() {
        assert_eq!(
            split_steps("a && b x='oops && c", "&&"),
            vec!["a".to_string(), "b x='oops && c".to_string()]
        );
    }
}
