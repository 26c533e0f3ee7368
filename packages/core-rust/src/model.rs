//! Immutable extension and operation declarations.
//!
//! Declarations are produced once, when an extension is loaded (see
//! [`crate::loader`]), and are read-only afterwards. The runtime shares them
//! through `Arc`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::capability::{CapabilitySet, PagedCapability};
use crate::types::{DataType, TypeTable, Value};

/// Where a parameter's value comes from when the caller does not supply one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultValue {
    /// A constant value.
    Literal(Value),
    /// The parameter of the given name on the active configuration instance.
    Configuration(String),
}

/// A single declared parameter of an operation or configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDeclaration {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<DefaultValue>,
}

impl ParameterDeclaration {
    /// A required parameter without default.
    #[must_use]
    pub fn required(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            required: true,
            default: None,
        }
    }

    /// An optional parameter without default (resolves to `Null` when absent).
    #[must_use]
    pub fn optional(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            required: false,
            default: None,
        }
    }

    /// Sets the default value.
    #[must_use]
    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    /// True if the parameter must be supplied by the caller.
    #[must_use]
    pub fn is_mandatory(&self) -> bool {
        self.required && self.default.is_none()
    }
}

/// Declaration of a single invocable operation.
#[derive(Debug, Clone)]
pub struct OperationDeclaration {
    pub name: String,
    /// Parameters in declaration order.
    pub parameters: Vec<ParameterDeclaration>,
    /// Whether invocations fail when no configuration instance is found.
    pub requires_configuration: bool,
    pub capabilities: CapabilitySet,
}

impl OperationDeclaration {
    #[must_use]
    pub fn new(name: impl Into<String>, parameters: Vec<ParameterDeclaration>) -> Self {
        Self {
            name: name.into(),
            parameters,
            requires_configuration: false,
            capabilities: CapabilitySet::new(),
        }
    }

    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&ParameterDeclaration> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// True if the operation yields its results through a paged cursor.
    #[must_use]
    pub fn is_paged(&self) -> bool {
        self.capabilities.contains::<PagedCapability>()
    }
}

/// Declaration of an extension's configuration.
#[derive(Debug, Clone)]
pub struct ConfigurationDeclaration {
    pub name: String,
    pub parameters: Vec<ParameterDeclaration>,
}

impl ConfigurationDeclaration {
    /// True if every parameter can be filled without caller input, which is
    /// what allows an implicit configuration to be synthesized.
    #[must_use]
    pub fn is_implicitly_instantiable(&self) -> bool {
        self.parameters.iter().all(|p| {
            !p.required || matches!(p.default, Some(DefaultValue::Literal(_)))
        })
    }
}

/// Declaration of a loaded extension.
#[derive(Debug, Clone)]
pub struct ExtensionDeclaration {
    pub name: String,
    pub version: String,
    /// Type table every coercion for this extension resolves against.
    pub types: Arc<TypeTable>,
    pub configuration: Option<ConfigurationDeclaration>,
    pub operations: Vec<OperationDeclaration>,
    pub capabilities: CapabilitySet,
}

impl ExtensionDeclaration {
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            types: Arc::new(TypeTable::new()),
            configuration: None,
            operations: Vec::new(),
            capabilities: CapabilitySet::new(),
        }
    }

    #[must_use]
    pub fn operation(&self, name: &str) -> Option<&OperationDeclaration> {
        self.operations.iter().find(|op| op.name == name)
    }
}
