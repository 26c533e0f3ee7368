//! Extension loading: descriptor validation and capability extraction.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::capability::{CapabilityError, CapabilityExtractors, DeclarationContext, DeclarationKind};
use crate::coerce::{coerce, CoercionError};
use crate::descriptor::{ConfigurationDescriptor, ExtensionDescriptor, OperationDescriptor};
use crate::model::{
    ConfigurationDeclaration, DefaultValue, ExtensionDeclaration, OperationDeclaration,
    ParameterDeclaration,
};
use crate::types::{DataType, TypeDefinition, TypeTable};

/// Errors raised while turning a descriptor into a declaration.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("invalid {what} name '{name}'")]
    InvalidName { what: &'static str, name: String },
    #[error("duplicate operation '{0}'")]
    DuplicateOperation(String),
    #[error("duplicate parameter '{parameter}' in '{owner}'")]
    DuplicateParameter { owner: String, parameter: String },
    #[error("parameter '{parameter}' in '{owner}' uses unknown type '{type_name}'")]
    UnknownType {
        owner: String,
        parameter: String,
        type_name: String,
    },
    #[error("parameter '{parameter}' in '{owner}' uses alias '{type_name}', which refers back to itself")]
    CyclicAlias {
        owner: String,
        parameter: String,
        type_name: String,
    },
    #[error("default of parameter '{parameter}' in '{owner}' is invalid: {source}")]
    InvalidDefault {
        owner: String,
        parameter: String,
        #[source]
        source: CoercionError,
    },
    #[error(transparent)]
    Capability(#[from] CapabilityError),
    #[error("malformed descriptor: {0}")]
    Malformed(#[from] serde_json::Error),
}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_.-]*$").unwrap_or_else(|e| unreachable!("{e}"))
    })
}

/// Builds [`ExtensionDeclaration`]s from descriptors.
#[derive(Default)]
pub struct ExtensionLoader {
    extractors: CapabilityExtractors,
}

impl ExtensionLoader {
    /// Creates a loader using the given capability extractors.
    #[must_use]
    pub fn new(extractors: CapabilityExtractors) -> Self {
        Self { extractors }
    }

    /// Parses and loads a JSON descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Malformed`] for invalid JSON, or any error from
    /// [`ExtensionLoader::load`].
    pub fn load_json(&self, json: &str) -> Result<ExtensionDeclaration, LoadError> {
        let descriptor: ExtensionDescriptor = serde_json::from_str(json)?;
        self.load(descriptor)
    }

    /// Validates a descriptor and extracts its capabilities.
    ///
    /// # Errors
    ///
    /// Returns a [`LoadError`] describing the first invalid element found.
    pub fn load(&self, descriptor: ExtensionDescriptor) -> Result<ExtensionDeclaration, LoadError> {
        validate_name("extension", &descriptor.name)?;

        let extension_ctx = DeclarationContext {
            kind: DeclarationKind::Extension,
            name: &descriptor.name,
            extension_name: &descriptor.name,
            extension_version: &descriptor.version,
        };
        let capabilities = self.extractors.extract_all(&descriptor.markers, &extension_ctx)?;

        let configuration = descriptor
            .configuration
            .map(|config| load_configuration(config, &descriptor.types))
            .transpose()?;

        let mut seen = HashSet::new();
        let mut operations = Vec::with_capacity(descriptor.operations.len());
        for op in descriptor.operations {
            if !seen.insert(op.name.clone()) {
                return Err(LoadError::DuplicateOperation(op.name));
            }
            operations.push(self.load_operation(
                op,
                &descriptor.name,
                &descriptor.version,
                &descriptor.types,
            )?);
        }

        debug!(
            extension = %descriptor.name,
            version = %descriptor.version,
            operations = operations.len(),
            capabilities = capabilities.len(),
            "extension loaded"
        );

        Ok(ExtensionDeclaration {
            name: descriptor.name,
            version: descriptor.version,
            types: Arc::new(descriptor.types),
            configuration,
            operations,
            capabilities,
        })
    }

    fn load_operation(
        &self,
        op: OperationDescriptor,
        extension_name: &str,
        extension_version: &str,
        types: &TypeTable,
    ) -> Result<OperationDeclaration, LoadError> {
        validate_name("operation", &op.name)?;
        validate_parameters(&op.name, &op.parameters, types)?;

        let ctx = DeclarationContext {
            kind: DeclarationKind::Operation,
            name: &op.name,
            extension_name,
            extension_version,
        };
        let capabilities = self.extractors.extract_all(&op.markers, &ctx)?;

        Ok(OperationDeclaration {
            name: op.name,
            parameters: op.parameters,
            requires_configuration: op.requires_configuration,
            capabilities,
        })
    }
}

fn load_configuration(
    config: ConfigurationDescriptor,
    types: &TypeTable,
) -> Result<ConfigurationDeclaration, LoadError> {
    validate_name("configuration", &config.name)?;
    validate_parameters(&config.name, &config.parameters, types)?;
    Ok(ConfigurationDeclaration {
        name: config.name,
        parameters: config.parameters,
    })
}

fn validate_name(what: &'static str, name: &str) -> Result<(), LoadError> {
    if name_pattern().is_match(name) {
        Ok(())
    } else {
        Err(LoadError::InvalidName {
            what,
            name: name.to_string(),
        })
    }
}

fn validate_parameters(
    owner: &str,
    parameters: &[ParameterDeclaration],
    types: &TypeTable,
) -> Result<(), LoadError> {
    let mut seen = HashSet::new();
    for param in parameters {
        validate_name("parameter", &param.name)?;
        if !seen.insert(param.name.as_str()) {
            return Err(LoadError::DuplicateParameter {
                owner: owner.to_string(),
                parameter: param.name.clone(),
            });
        }
        match check_named_types(&param.data_type, types, &mut Vec::new()) {
            Ok(()) => {}
            Err(TypeProblem::Unknown(type_name)) => {
                return Err(LoadError::UnknownType {
                    owner: owner.to_string(),
                    parameter: param.name.clone(),
                    type_name,
                });
            }
            Err(TypeProblem::Cycle(type_name)) => {
                return Err(LoadError::CyclicAlias {
                    owner: owner.to_string(),
                    parameter: param.name.clone(),
                    type_name,
                });
            }
        }
        if let Some(DefaultValue::Literal(value)) = &param.default {
            coerce(value.clone(), &param.data_type, types).map_err(|source| {
                LoadError::InvalidDefault {
                    owner: owner.to_string(),
                    parameter: param.name.clone(),
                    source,
                }
            })?;
        }
    }
    Ok(())
}

enum TypeProblem {
    Unknown(String),
    Cycle(String),
}

/// Walks every named type reachable from `data_type`. `path` holds the alias
/// names currently being expanded.
fn check_named_types<'a>(
    data_type: &'a DataType,
    types: &'a TypeTable,
    path: &mut Vec<&'a str>,
) -> Result<(), TypeProblem> {
    match data_type {
        DataType::Array(item) => check_named_types(item, types, path),
        DataType::Named(name) => {
            if path.contains(&name.as_str()) {
                return Err(TypeProblem::Cycle(name.clone()));
            }
            match types.get(name) {
                None => Err(TypeProblem::Unknown(name.clone())),
                Some(TypeDefinition::Alias(target)) => {
                    path.push(name);
                    let result = check_named_types(target, types, path);
                    path.pop();
                    result
                }
                Some(TypeDefinition::Enumeration(_)) => Ok(()),
            }
        }
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
