//! Error taxonomy and classification of raw failure text

use regex::{Captures, Regex};
use std::fmt;

/// What went wrong
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    EmptyCommand,
    ParseFailure,
    TranslatorUnavailable,
    TranslatorTimeout,
    NeedsInfo,
    RemoteCallFailed,
    RemoteCallTimeout,
    EndpointUnreachable,
    ApplicationError,
    MissingParameter { field: String },
    NotFound,
    PermissionDenied,
    InvalidValue { field: String },
    /// Machine type changed on an instance that is still running
    ResizeWhileRunning,
    Unclassified,
    SequenceBudgetExceeded,
}

impl ErrorKind {
    /// Ends the current submission without retry
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ErrorKind::SequenceBudgetExceeded | ErrorKind::EndpointUnreachable
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::EmptyCommand => "empty_command",
            ErrorKind::ParseFailure => "parse_failure",
            ErrorKind::TranslatorUnavailable => "translator_unavailable",
            ErrorKind::TranslatorTimeout => "translator_timeout",
            ErrorKind::NeedsInfo => "needs_info",
            ErrorKind::RemoteCallFailed => "remote_call_failed",
            ErrorKind::RemoteCallTimeout => "remote_call_timeout",
            ErrorKind::EndpointUnreachable => "endpoint_unreachable",
            ErrorKind::ApplicationError => "application_error",
            ErrorKind::MissingParameter { .. } => "missing_parameter",
            ErrorKind::NotFound => "not_found",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::InvalidValue { .. } => "invalid_value",
            ErrorKind::ResizeWhileRunning => "resize_while_running",
            ErrorKind::Unclassified => "unclassified",
            ErrorKind::SequenceBudgetExceeded => "sequence_budget_exceeded",
        }
    }

    /// Fixed user-facing message for this kind
    pub fn message_for(&self, raw: &str) -> String {
        match self {
            ErrorKind::EmptyCommand => "Nothing to run: the command is empty.".to_string(),
            ErrorKind::ParseFailure => {
                "Could not parse the command: check for unbalanced quotes.".to_string()
            }
            ErrorKind::TranslatorUnavailable => "The translator is unavailable.".to_string(),
            ErrorKind::TranslatorTimeout => "The translator did not answer in time.".to_string(),
            ErrorKind::NeedsInfo => first_line(raw).to_string(),
            ErrorKind::RemoteCallFailed => format!("The tool call failed: {}", first_line(raw)),
            ErrorKind::RemoteCallTimeout => "The tool call did not finish in time.".to_string(),
            ErrorKind::EndpointUnreachable => {
                "The tool server is unreachable. Check that it is running.".to_string()
            }
            ErrorKind::ApplicationError => {
                format!("The operation reported an error: {}", first_line(raw))
            }
            ErrorKind::MissingParameter { field } => format!(
                "A required parameter is missing: '{}'. Provide a value for '{}' and try again.",
                field, field
            ),
            ErrorKind::NotFound => {
                "Resource not found. Check the name, or list the available resources first."
                    .to_string()
            }
            ErrorKind::PermissionDenied => {
                "Permission denied. The active account lacks the permissions this operation needs."
                    .to_string()
            }
            ErrorKind::InvalidValue { field } => format!(
                "Invalid value provided for '{}'. Check the accepted values for this field.",
                field
            ),
            ErrorKind::ResizeWhileRunning => "Cannot change the machine type while the instance \
                 is running. Stop it, run set-machine-type, then start it again."
                .to_string(),
            ErrorKind::Unclassified => format!("Command failed: {}", first_line(raw)),
            ErrorKind::SequenceBudgetExceeded => {
                "The sequence exceeded its step budget and was stopped.".to_string()
            }
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::MissingParameter { field } | ErrorKind::InvalidValue { field } => {
                write!(f, "{}({})", self.label(), field)
            }
            _ => f.write_str(self.label()),
        }
    }
}

/// A classified failure; `raw` is always the untouched source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
    pub raw: String,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, message: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            raw: raw.into(),
        }
    }

    /// Uses the kind's message template
    pub fn from_kind(kind: ErrorKind, raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let message = kind.message_for(&raw);
        Self { kind, message, raw }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

fn first_line(raw: &str) -> &str {
    raw.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("")
}

type KindBuilder = fn(&Captures) -> ErrorKind;

struct Rule {
    pattern: Regex,
    build: KindBuilder,
}

fn missing(caps: &Captures) -> ErrorKind {
    ErrorKind::MissingParameter {
        field: field(caps),
    }
}

fn resize_while_running(_: &Captures) -> ErrorKind {
    ErrorKind::ResizeWhileRunning
}

fn not_found(_: &Captures) -> ErrorKind {
    ErrorKind::NotFound
}

fn permission_denied(_: &Captures) -> ErrorKind {
    ErrorKind::PermissionDenied
}

fn invalid(caps: &Captures) -> ErrorKind {
    ErrorKind::InvalidValue {
        field: field(caps),
    }
}

fn field(caps: &Captures) -> String {
    caps.get(1)
        .map(|m| m.as_str().trim_start_matches('-').to_string())
        .unwrap_or_default()
}

const FIELD: &str = r#"['"\[]?(-{0,2}[A-Za-z0-9_.-]+)['"\]]?"#;

/// Ordered pattern rules; first match wins
pub struct ErrorClassifier {
    rules: Vec<Rule>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        let table: Vec<(String, KindBuilder)> = vec![
            (
                r"(?is)set-machine-type.*(?:not found|cannot)|(?:not found|cannot).*set-machine-type"
                    .to_string(),
                resize_while_running,
            ),
            (r"Specify the \[(-{0,2}[A-Za-z0-9_.-]+)\] flag".to_string(), missing),
            (format!(r"(?i)argument {}: must be specified", FIELD), missing),
            (
                format!(
                    r"(?i)missing (?:a )?(?:required )?(?:parameter|argument|field|flag)s?:?\s+{}",
                    FIELD
                ),
                missing,
            ),
            (format!(r"(?i)required flag:?\s+{}", FIELD), missing),
            (format!(r"(?i){} is required", FIELD), missing),
            (
                r"(?i)was not found|could not fetch resource|not found|no such ".to_string(),
                not_found,
            ),
            (
                r"(?i)permission[_ ]denied|does not have permission|access denied".to_string(),
                permission_denied,
            ),
            (
                format!(
                    r"(?i)invalid value for (?:field |parameter |argument )?{}",
                    FIELD
                ),
                invalid,
            ),
        ];

        let rules = table
            .into_iter()
            .filter_map(|(pattern, build)| {
                Regex::new(&pattern).ok().map(|pattern| Rule { pattern, build })
            })
            .collect();

        Self { rules }
    }
}

impl ErrorClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classify_kind(&self, raw: &str) -> ErrorKind {
        self.rules
            .iter()
            .find_map(|rule| rule.pattern.captures(raw).map(|caps| (rule.build)(&caps)))
            .unwrap_or(ErrorKind::Unclassified)
    }

    pub fn classify(&self, raw: &str) -> ErrorInfo {
        ErrorInfo::from_kind(self.classify_kind(raw), raw)
    }
}
