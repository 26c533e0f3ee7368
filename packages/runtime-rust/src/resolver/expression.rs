//! Deferred expressions evaluated against each event.
//!
//! Grammar (whitespace around tokens is ignored):
//!
//! ```text
//! #[ root(.segment)* ( ?? <json literal> )? ]
//!
//! root := payload | vars.<name> | config.<key> | correlationId
//! ```
//!
//! Segments walk nested maps by key and arrays by index. A missing or null
//! result falls back to the literal after `??`, or to `null` without one.

use std::fmt;

use opbind_core::Value;

use crate::configuration::ConfigurationLookup;
use crate::error::ResolutionError;
use crate::event::{Event, Payload};

const OPEN: &str = "#[";
const CLOSE: &str = "]";
const FALLBACK: &str = "??";

/// Reasons an expression string cannot be parsed.
#[derive(Debug, thiserror::Error)]
pub enum ExpressionError {
    #[error("expression is empty")]
    Empty,
    #[error("unknown expression root '{0}'")]
    UnknownRoot(String),
    #[error("'{0}' must be followed by a name")]
    MissingName(&'static str),
    #[error("expression contains an empty path segment")]
    EmptySegment,
    #[error("'{0}' does not take a path")]
    UnexpectedPath(&'static str),
    #[error("fallback is not a valid JSON literal: {0}")]
    InvalidFallback(#[source] serde_json::Error),
}

/// Where an expression reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpressionRoot {
    Payload,
    Variable(String),
    Configuration(String),
    CorrelationId,
}

/// A parsed `#[...]` expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: ExpressionRoot,
    path: Vec<String>,
    fallback: Option<Value>,
}

impl Expression {
    /// True if `raw` has the `#[...]` shape of a deferred expression.
    #[must_use]
    pub fn is_expression(raw: &str) -> bool {
        let trimmed = raw.trim();
        trimmed.starts_with(OPEN) && trimmed.ends_with(CLOSE)
    }

    /// Parses an expression.
    ///
    /// # Errors
    ///
    /// Returns [`ExpressionError`] if the body is empty, names an unknown root,
    /// contains empty segments or has a malformed fallback literal.
    pub fn parse(raw: &str) -> Result<Self, ExpressionError> {
        let trimmed = raw.trim();
        let body = trimmed
            .strip_prefix(OPEN)
            .and_then(|rest| rest.strip_suffix(CLOSE))
            .unwrap_or(trimmed)
            .trim();

        let (path_part, fallback) = match body.split_once(FALLBACK) {
            Some((path, literal)) => {
                let value: serde_json::Value =
                    serde_json::from_str(literal.trim()).map_err(ExpressionError::InvalidFallback)?;
                (path.trim(), Some(Value::from(value)))
            }
            None => (body, None),
        };
        if path_part.is_empty() {
            return Err(ExpressionError::Empty);
        }

        let mut segments = path_part.split('.').map(str::trim);
        let head = segments.next().ok_or(ExpressionError::Empty)?;
        let root = match head {
            "payload" => ExpressionRoot::Payload,
            "correlationId" => ExpressionRoot::CorrelationId,
            "vars" => ExpressionRoot::Variable(named(segments.next(), "vars")?),
            "config" => ExpressionRoot::Configuration(named(segments.next(), "config")?),
            other => return Err(ExpressionError::UnknownRoot(other.to_string())),
        };

        let path = segments
            .map(|s| {
                if s.is_empty() {
                    Err(ExpressionError::EmptySegment)
                } else {
                    Ok(s.to_string())
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        if root == ExpressionRoot::CorrelationId && !path.is_empty() {
            return Err(ExpressionError::UnexpectedPath("correlationId"));
        }

        Ok(Self {
            source: trimmed.to_string(),
            root,
            path,
            fallback,
        })
    }

    #[must_use]
    pub fn root(&self) -> &ExpressionRoot {
        &self.root
    }

    /// True if evaluation needs the event's configuration.
    #[must_use]
    pub fn reads_configuration(&self) -> bool {
        matches!(self.root, ExpressionRoot::Configuration(_))
    }

    /// Evaluates the expression for `event`.
    ///
    /// `configuration` is consulted only by `config.*` expressions.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError::StreamedValue`] when the expression reads a
    /// cursor payload, or the lookup's own error.
    pub fn evaluate(
        &self,
        event: &Event,
        configuration: &dyn ConfigurationLookup,
    ) -> Result<Value, ResolutionError> {
        let found = match &self.root {
            ExpressionRoot::CorrelationId => Some(Value::String(event.correlation_id().to_string())),
            ExpressionRoot::Payload => self.walk(event.payload())?,
            ExpressionRoot::Variable(name) => match event.variable(name) {
                Some(payload) => self.walk(payload)?,
                None => None,
            },
            ExpressionRoot::Configuration(key) => configuration
                .lookup(event)?
                .and_then(|config| config.parameter(key).and_then(|v| v.get_path(&self.path)).cloned()),
        };

        Ok(match found {
            Some(value) if !value.is_null() => value,
            _ => self.fallback.clone().unwrap_or(Value::Null),
        })
    }

    fn walk(&self, payload: &Payload) -> Result<Option<Value>, ResolutionError> {
        let value = payload.as_value().ok_or_else(|| ResolutionError::StreamedValue {
            expression: self.source.clone(),
        })?;
        Ok(value.get_path(&self.path).cloned())
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn named(segment: Option<&str>, root: &'static str) -> Result<String, ExpressionError> {
    match segment {
        Some(name) if !name.is_empty() => Ok(name.to_string()),
        _ => Err(ExpressionError::MissingName(root)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
