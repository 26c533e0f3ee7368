//! Turns raw parameter maps into resolver sets.

use std::collections::BTreeMap;
use std::sync::Arc;

use opbind_core::{coerce, DataType, DefaultValue, OperationDeclaration, ParameterDeclaration, TypeTable, Value};
use tracing::debug;

use crate::configuration::ConfigurationLookup;
use crate::error::BindError;
use crate::resolver::{
    ConfigurationDefaultResolver, Expression, ExpressionResolver, ResolverSet, StaticResolver,
    ValueResolver,
};

/// Raw parameter values keyed by parameter name. Values are literals or
/// `#[...]` expression strings.
pub type RawParameterMap = BTreeMap<String, Value>;

/// Builds resolvers from a raw parameter map.
///
/// The configuration lookup is captured so that configuration defaults and
/// `config.*` expressions can read the per-event configuration later.
#[derive(Clone)]
pub struct ParametersResolver {
    raw: RawParameterMap,
    configuration: Arc<dyn ConfigurationLookup>,
}

impl ParametersResolver {
    #[must_use]
    pub fn from_values(raw: RawParameterMap, configuration: Arc<dyn ConfigurationLookup>) -> Self {
        Self { raw, configuration }
    }

    #[must_use]
    pub fn raw(&self) -> &RawParameterMap {
        &self.raw
    }

    /// Wraps a single raw value: expressions become dynamic resolvers, anything
    /// else is coerced now and held as a constant.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::InvalidExpression`] for unparseable expressions and
    /// [`BindError::TypeCoercion`] for literals that do not fit `data_type`.
    pub fn resolve_value(
        &self,
        owner: &str,
        parameter: &str,
        raw: Value,
        data_type: &DataType,
        types: &Arc<TypeTable>,
    ) -> Result<Arc<dyn ValueResolver>, BindError> {
        if let Some(text) = raw.as_str().filter(|s| Expression::is_expression(s)) {
            let expression =
                Expression::parse(text).map_err(|source| BindError::InvalidExpression {
                    operation: owner.to_string(),
                    parameter: parameter.to_string(),
                    source,
                })?;
            return Ok(Arc::new(ExpressionResolver::new(
                parameter,
                expression,
                data_type.clone(),
                Arc::clone(types),
                Arc::clone(&self.configuration),
            )));
        }

        literal(owner, parameter, raw, data_type, types)
    }

    /// Builds one resolver per declared parameter of `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::MissingParameter`] when a mandatory parameter has no
    /// raw value (or an explicit `null`), plus any error of
    /// [`ParametersResolver::resolve_value`].
    pub fn resolver_set(
        &self,
        owner: &str,
        parameters: &[ParameterDeclaration],
        types: &Arc<TypeTable>,
    ) -> Result<ResolverSet, BindError> {
        for name in self.raw.keys() {
            if !parameters.iter().any(|p| &p.name == name) {
                debug!(owner, parameter = %name, "ignoring undeclared parameter");
            }
        }

        let mut set = ResolverSet::new();
        for param in parameters {
            let supplied = self.raw.get(&param.name).filter(|v| !v.is_null()).cloned();
            let resolver = match (supplied, &param.default) {
                (Some(raw), _) => self.resolve_value(owner, &param.name, raw, &param.data_type, types)?,
                (None, Some(DefaultValue::Literal(value))) => {
                    literal(owner, &param.name, value.clone(), &param.data_type, types)?
                }
                (None, Some(DefaultValue::Configuration(key))) => {
                    Arc::new(ConfigurationDefaultResolver::new(
                        param.name.clone(),
                        key.clone(),
                        param.data_type.clone(),
                        Arc::clone(types),
                        Arc::clone(&self.configuration),
                    ))
                }
                (None, None) if param.required => {
                    return Err(BindError::MissingParameter {
                        operation: owner.to_string(),
                        parameter: param.name.clone(),
                    });
                }
                (None, None) => Arc::new(StaticResolver::new(Value::Null)),
            };
            debug!(
                owner,
                parameter = %param.name,
                dynamic = resolver.is_dynamic(),
                "parameter resolver built"
            );
            set.add(param.name.clone(), resolver, param.required);
        }
        Ok(set)
    }

    /// Builds the resolver set for an operation's declared parameters.
    ///
    /// # Errors
    ///
    /// See [`ParametersResolver::resolver_set`].
    pub fn parameters_as_resolver_set(
        &self,
        operation: &OperationDeclaration,
        types: &Arc<TypeTable>,
    ) -> Result<ResolverSet, BindError> {
        self.resolver_set(&operation.name, &operation.parameters, types)
    }
}

/// Coerces a literal and holds it as a constant. Declared defaults take this
/// path even when they look like expressions.
fn literal(
    owner: &str,
    parameter: &str,
    value: Value,
    data_type: &DataType,
    types: &TypeTable,
) -> Result<Arc<dyn ValueResolver>, BindError> {
    let value = coerce(value, data_type, types).map_err(|source| BindError::TypeCoercion {
        operation: owner.to_string(),
        parameter: parameter.to_string(),
        source,
    })?;
    Ok(Arc::new(StaticResolver::new(value)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
