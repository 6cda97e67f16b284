//! Command string parsing
//!
//! `tool key=value key2="quoted value" list=[1,2]`. Tokenizing follows shell
//! quoting rules; values are coerced to the narrowest matching type.

use crate::value::{Command, Value};
use thiserror::Error;
use tracing::warn;

/// Parse errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty command")]
    EmptyCommand,

    #[error("unbalanced quoting in: {0}")]
    UnbalancedQuotes(String),
}

pub type Result<T> = std::result::Result<T, ParseError>;

/// A command plus the tokens that were dropped while parsing it
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    pub command: Command,
    pub skipped: Vec<String>,
}

/// Parse a `tool key=value ...` string
pub fn parse(input: &str) -> Result<Command> {
    parse_reporting(input).map(|parsed| parsed.command)
}

/// Like [`parse`], also returning tokens skipped for lacking `key=`
pub fn parse_reporting(input: &str) -> Result<Parsed> {
    let mut tokens = tokenize(input)?.into_iter();
    let tool_name = tokens
        .next()
        .filter(|name| !name.is_empty())
        .ok_or(ParseError::EmptyCommand)?;

    let mut command = Command::new(tool_name);
    let mut skipped = Vec::new();

    for token in tokens {
        match token.split_once('=') {
            Some((key, raw)) if !key.is_empty() => {
                command.arguments.insert(key.to_string(), coerce(raw));
            }
            _ => {
                warn!("◆ skipping token without key=value: {}", token);
                skipped.push(token);
            }
        }
    }

    Ok(Parsed { command, skipped })
}

/// Parse a whole line as an argv list handed to one fixed tool
pub fn parse_argv(
    input: &str,
    tool: &str,
    argument: &str,
    strip_prefix: Option<&str>,
) -> Result<Command> {
    let mut tokens = tokenize(input)?;
    if let Some(prefix) = strip_prefix {
        if tokens.first().map(|t| t == prefix).unwrap_or(false) {
            tokens.remove(0);
        }
    }
    if tokens.is_empty() {
        return Err(ParseError::EmptyCommand);
    }

    let argv = tokens.into_iter().map(Value::String).collect::<Vec<_>>();
    Ok(Command::new(tool).with_arg(argument, Value::List(argv)))
}

fn tokenize(input: &str) -> Result<Vec<String>> {
    shell_words::split(input).map_err(|_| ParseError::UnbalancedQuotes(input.to_string()))
}

/// Coerce a raw value: bool, then integer, then bracketed JSON, else string
pub fn coerce(raw: &str) -> Value {
    if raw.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }

    if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
        // Out of i64 range stays textual
        return raw
            .parse::<i64>()
            .map(Value::Int)
            .unwrap_or_else(|_| Value::String(raw.to_string()));
    }

    let bracketed = (raw.starts_with('[') && raw.ends_with(']'))
        || (raw.starts_with('{') && raw.ends_with('}'));
    if bracketed {
        let normalized = raw.replace('\'', "\"");
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(&normalized) {
            return Value::from(json);
        }
    }

    Value::String(raw.to_string())
}

/// How a command string maps onto a tool call
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CommandStyle {
    #[default]
    KeyValue,
    Argv {
        tool: String,
        argument: String,
        strip_prefix: Option<String>,
    },
}

impl CommandStyle {
    pub fn parse(&self, input: &str) -> Result<Parsed> {
        match self {
            CommandStyle::KeyValue => parse_reporting(input),
            CommandStyle::Argv {
                tool,
                argument,
                strip_prefix,
            } => parse_argv(input, tool, argument, strip_prefix.as_deref()).map(|command| Parsed {
                command,
                skipped: Vec::new(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_bool_case_insensitive() {
        assert_eq!(coerce("TRUE"), Value::Bool(true));
        assert_eq!(coerce("False"), Value::Bool(false));
    }

    #[test]
    fn test_coerce_integers() {
        assert_eq!(coerce("42"), Value::Int(42));
        assert_eq!(coerce("007"), Value::Int(7));
        assert_eq!(coerce("-3"), Value::from("-3"));
        assert_eq!(coerce("1.5"), Value::from("1.5"));
    }

    #[test]
    fn test_coerce_overflow_stays_string() {
        let big = "99999999999999999999";
        assert_eq!(coerce(big), Value::from(big));
    }

    #[test]
    fn test_coerce_single_quoted_json() {
        assert_eq!(
            coerce("['a','b']"),
            Value::List(vec![Value::from("a"), Value::from("b")])
        );
    }

    #[test]
    fn test_coerce_bad_json_falls_back() {
        assert_eq!(coerce("[not json]"), Value::from("[not json]"));
        assert_eq!(coerce("{"), Value::from("{"));
    }

    #[test]
    fn test_coerce_empty() {
        assert_eq!(coerce(""), Value::from(""));
    }

    #[test]
    fn test_empty_key_skipped() {
        let parsed = parse_reporting("tool =x a=1").unwrap();
        assert_eq!(parsed.skipped, vec!["=x".to_string()]);
        assert_eq!(parsed.command.arguments.len(), 1);
    }

    #[test]
    fn test_quoted_empty_tool_name() {
        assert_eq!(parse("'' a=1"), Err(ParseError::EmptyCommand));
    }
}
