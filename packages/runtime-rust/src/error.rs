//! Error types surfaced by binding and invocation.
//!
//! - [`BindError`]: raised by `bind()` / `build()`, before any processor exists.
//! - [`ResolutionError`]: deferred, raised while evaluating parameters or
//!   looking up configuration for a specific event.
//! - [`InvocationError`]: everything a built processor can fail with.
//! - [`CursorError`]: failures while consuming a paged result.

use opbind_core::CoercionError;

use crate::resolver::ExpressionError;

/// Declaration-time failures. Never retried.
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error("operation '{operation}' is missing required parameter '{parameter}'")]
    MissingParameter { operation: String, parameter: String },
    #[error("parameter '{parameter}' of '{operation}' has the wrong type: {source}")]
    TypeCoercion {
        operation: String,
        parameter: String,
        #[source]
        source: CoercionError,
    },
    #[error("parameter '{parameter}' of '{operation}' has an invalid expression: {source}")]
    InvalidExpression {
        operation: String,
        parameter: String,
        #[source]
        source: ExpressionError,
    },
    /// Lookup, registration or injection failure. Always carries its cause.
    #[error("failed to bind operation '{operation}': {source}")]
    Binding {
        operation: String,
        #[source]
        source: anyhow::Error,
    },
}

impl BindError {
    pub(crate) fn binding(operation: &str, source: impl Into<anyhow::Error>) -> Self {
        BindError::Binding {
            operation: operation.to_string(),
            source: source.into(),
        }
    }
}

/// Failures evaluating a resolver or looking up configuration for an event.
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("parameter '{parameter}' resolved to a value of the wrong type: {source}")]
    Coercion {
        parameter: String,
        #[source]
        source: CoercionError,
    },
    #[error("required parameter '{parameter}' resolved to null")]
    MissingValue { parameter: String },
    #[error("expression '{expression}' refers to a streamed payload")]
    StreamedValue { expression: String },
    #[error("configuration lookup failed: {0}")]
    Configuration(#[source] anyhow::Error),
}

/// Failures of a built processor, surfaced per invocation.
#[derive(Debug, thiserror::Error)]
pub enum InvocationError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error("operation '{operation}' requires a configuration but none was found")]
    ConfigurationRequired { operation: String },
    #[error("no executor was injected for operation '{operation}'")]
    ExecutorNotInjected { operation: String },
    #[error("operation '{operation}' produced {found} output, expected {expected}")]
    UnexpectedOutput {
        operation: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("operation '{operation}' failed: {source}")]
    Execution {
        operation: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("invocation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("runtime overloaded, try again later")]
    Overloaded,
    #[error(transparent)]
    Cursor(#[from] CursorError),
}

impl InvocationError {
    /// Short label used for the `outcome` metric dimension.
    #[must_use]
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Resolution(_) => "resolution_error",
            Self::ConfigurationRequired { .. } => "configuration_required",
            Self::ExecutorNotInjected { .. } | Self::UnexpectedOutput { .. } => "binding_error",
            Self::Execution { .. } => "execution_error",
            Self::Timeout { .. } => "timeout",
            Self::Overloaded => "overloaded",
            Self::Cursor(_) => "cursor_error",
        }
    }
}

/// Failures while consuming a paged result.
#[derive(Debug, thiserror::Error)]
pub enum CursorError {
    #[error("streaming cursor has already been opened")]
    Consumed,
    #[error("repeatable cursor exceeded its buffer of {limit} items")]
    BufferLimitExceeded { limit: usize },
    #[error("could not obtain a connection: {0}")]
    Connection(#[source] anyhow::Error),
    #[error("failed to fetch page: {0}")]
    Page(#[source] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_error_keeps_cause() {
        let err = BindError::binding("search", anyhow::anyhow!("registry unavailable"));
        assert_eq!(
            err.to_string(),
            "failed to bind operation 'search': registry unavailable"
        );
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "registry unavailable");
    }

    #[test]
    fn resolution_error_is_transparent_in_invocation() {
        let err: InvocationError = ResolutionError::MissingValue {
            parameter: "query".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "required parameter 'query' resolved to null");
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(InvocationError::Overloaded.outcome(), "overloaded");
        assert_eq!(InvocationError::Timeout { timeout_ms: 5 }.outcome(), "timeout");
        let cursor: InvocationError = CursorError::Consumed.into();
        assert_eq!(cursor.outcome(), "cursor_error");
    }
}
