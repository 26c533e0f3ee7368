//! Value resolvers: how a single parameter obtains its value per event.

use std::fmt;
use std::sync::Arc;

use opbind_core::{coerce, DataType, TypeTable, Value};

use crate::configuration::ConfigurationLookup;
use crate::error::ResolutionError;
use crate::event::Event;
use crate::resolver::Expression;

/// Produces a parameter value for an event.
pub trait ValueResolver: Send + Sync + fmt::Debug {
    /// Resolves the value for `event`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError`] if evaluation or coercion fails.
    fn resolve(&self, event: &Event) -> Result<Value, ResolutionError>;

    /// True if the result may differ between events.
    fn is_dynamic(&self) -> bool;
}

/// A constant, coerced once at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticResolver {
    value: Value,
}

impl StaticResolver {
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl ValueResolver for StaticResolver {
    fn resolve(&self, _event: &Event) -> Result<Value, ResolutionError> {
        Ok(self.value.clone())
    }

    fn is_dynamic(&self) -> bool {
        false
    }
}

/// Evaluates an [`Expression`] per event and coerces the result to the
/// declared type.
pub struct ExpressionResolver {
    parameter: String,
    expression: Expression,
    data_type: DataType,
    types: Arc<TypeTable>,
    configuration: Arc<dyn ConfigurationLookup>,
}

impl ExpressionResolver {
    #[must_use]
    pub fn new(
        parameter: impl Into<String>,
        expression: Expression,
        data_type: DataType,
        types: Arc<TypeTable>,
        configuration: Arc<dyn ConfigurationLookup>,
    ) -> Self {
        Self {
            parameter: parameter.into(),
            expression,
            data_type,
            types,
            configuration,
        }
    }

    #[must_use]
    pub fn expression(&self) -> &Expression {
        &self.expression
    }
}

impl fmt::Debug for ExpressionResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpressionResolver")
            .field("parameter", &self.parameter)
            .field("expression", &self.expression.to_string())
            .field("data_type", &self.data_type)
            .finish_non_exhaustive()
    }
}

impl ValueResolver for ExpressionResolver {
    fn resolve(&self, event: &Event) -> Result<Value, ResolutionError> {
        let raw = self.expression.evaluate(event, self.configuration.as_ref())?;
        coerce(raw, &self.data_type, &self.types).map_err(|source| ResolutionError::Coercion {
            parameter: self.parameter.clone(),
            source,
        })
    }

    fn is_dynamic(&self) -> bool {
        true
    }
}

/// Reads a default from the active configuration instance's parameter `key`.
///
/// Resolves to `Null` when no configuration is active or the instance does not
/// carry the key.
pub struct ConfigurationDefaultResolver {
    parameter: String,
    key: String,
    data_type: DataType,
    types: Arc<TypeTable>,
    lookup: Arc<dyn ConfigurationLookup>,
}

impl ConfigurationDefaultResolver {
    #[must_use]
    pub fn new(
        parameter: impl Into<String>,
        key: impl Into<String>,
        data_type: DataType,
        types: Arc<TypeTable>,
        lookup: Arc<dyn ConfigurationLookup>,
    ) -> Self {
        Self {
            parameter: parameter.into(),
            key: key.into(),
            data_type,
            types,
            lookup,
        }
    }
}

impl fmt::Debug for ConfigurationDefaultResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigurationDefaultResolver")
            .field("parameter", &self.parameter)
            .field("key", &self.key)
            .field("data_type", &self.data_type)
            .finish_non_exhaustive()
    }
}

impl ValueResolver for ConfigurationDefaultResolver {
    fn resolve(&self, event: &Event) -> Result<Value, ResolutionError> {
        let raw = self
            .lookup
            .lookup(event)?
            .and_then(|config| config.parameter(&self.key).cloned())
            .unwrap_or_default();
        coerce(raw, &self.data_type, &self.types).map_err(|source| ResolutionError::Coercion {
            parameter: self.parameter.clone(),
            source,
        })
    }

    fn is_dynamic(&self) -> bool {
        true
    }
}
