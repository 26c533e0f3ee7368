use serde::{Deserialize, Serialize};

use crate::capability::Marker;
use crate::model::ParameterDeclaration;
use crate::types::TypeTable;

/// Serialized form of an extension, as shipped alongside its implementation.
///
/// ```json
/// {
///   "name": "search-connector",
///   "version": "1.0.0",
///   "markers": [{"kind": "xml"}],
///   "operations": [
///     {"name": "search", "markers": [{"kind": "paged"}],
///      "parameters": [{"name": "query", "type": "string", "required": true}]}
///   ]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionDescriptor {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub markers: Vec<Marker>,
    #[serde(default)]
    pub types: TypeTable,
    #[serde(default)]
    pub configuration: Option<ConfigurationDescriptor>,
    #[serde(default)]
    pub operations: Vec<OperationDescriptor>,
}

/// Serialized form of an operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationDescriptor {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<ParameterDeclaration>,
    #[serde(default)]
    pub markers: Vec<Marker>,
    #[serde(default)]
    pub requires_configuration: bool,
}

/// Serialized form of an extension's configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigurationDescriptor {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<ParameterDeclaration>,
}
