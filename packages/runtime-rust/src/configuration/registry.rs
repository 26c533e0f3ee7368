//! Per-extension configuration providers and implicit default configurations.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use opbind_core::{coerce, DefaultValue, ExtensionDeclaration, OperationDeclaration, Value};
use tracing::{debug, warn};

use crate::configuration::{ConfigurationInstance, ConfigurationProvider};
use crate::error::ResolutionError;
use crate::event::Event;

/// Suffix of the names given to implicitly created configurations.
pub const IMPLICIT_SUFFIX: &str = "-implicit";

// ---------------------------------------------------------------------------
// ConfigurationRegistry trait
// ---------------------------------------------------------------------------

/// Model-level source of configuration for an extension/operation pair.
pub trait ConfigurationRegistry: Send + Sync {
    /// The provider implied by the pair, if one can be determined.
    fn get_configuration_provider(
        &self,
        extension: &ExtensionDeclaration,
        operation: &OperationDeclaration,
    ) -> Option<Arc<dyn ConfigurationProvider>>;

    /// The default configuration for the pair, if any.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError`] when the default cannot be materialized.
    fn get_configuration(
        &self,
        extension: &ExtensionDeclaration,
        operation: &OperationDeclaration,
        event: &Event,
    ) -> Result<Option<Arc<ConfigurationInstance>>, ResolutionError>;
}

// ---------------------------------------------------------------------------
// ExtensionConfigurationRegistry
// ---------------------------------------------------------------------------

/// In-memory registry keyed by extension name.
///
/// - `get_configuration_provider` answers only when exactly one provider is
///   registered for the extension; with several, the choice is ambiguous and
///   nothing is returned.
/// - `get_configuration` synthesizes an implicit instance from the extension's
///   configuration declaration when every parameter can be filled without
///   caller input. The instance is created once per extension.
#[derive(Default)]
pub struct ExtensionConfigurationRegistry {
    providers: DashMap<String, Vec<Arc<dyn ConfigurationProvider>>>,
    implicit: DashMap<String, Arc<ConfigurationInstance>>,
}

impl ExtensionConfigurationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider for the extension it declares.
    ///
    /// # Errors
    ///
    /// Fails if a provider with the same name is already registered for that
    /// extension.
    pub fn register_provider(&self, provider: Arc<dyn ConfigurationProvider>) -> anyhow::Result<()> {
        let mut entry = self.providers.entry(provider.extension().to_string()).or_default();
        if entry.iter().any(|p| p.name() == provider.name()) {
            anyhow::bail!(
                "configuration provider '{}' is already registered for extension '{}'",
                provider.name(),
                provider.extension()
            );
        }
        debug!(
            extension = provider.extension(),
            provider = provider.name(),
            "configuration provider registered"
        );
        entry.push(provider);
        Ok(())
    }

    /// Number of providers registered for `extension`.
    #[must_use]
    pub fn provider_count(&self, extension: &str) -> usize {
        self.providers.get(extension).map_or(0, |p| p.len())
    }

    fn implicit_instance(
        extension: &ExtensionDeclaration,
    ) -> Result<Option<ConfigurationInstance>, ResolutionError> {
        let Some(declaration) = &extension.configuration else {
            return Ok(None);
        };
        if !declaration.is_implicitly_instantiable() {
            return Ok(None);
        }

        let mut parameters = BTreeMap::new();
        for param in &declaration.parameters {
            let value = match &param.default {
                Some(DefaultValue::Literal(value)) => coerce(value.clone(), &param.data_type, &extension.types)
                    .map_err(|source| ResolutionError::Coercion {
                        parameter: param.name.clone(),
                        source,
                    })?,
                _ => Value::Null,
            };
            parameters.insert(param.name.clone(), value);
        }
        Ok(Some(ConfigurationInstance::new(
            format!("{}{IMPLICIT_SUFFIX}", declaration.name),
            extension.name.clone(),
            parameters,
        )))
    }
}

impl ConfigurationRegistry for ExtensionConfigurationRegistry {
    fn get_configuration_provider(
        &self,
        extension: &ExtensionDeclaration,
        operation: &OperationDeclaration,
    ) -> Option<Arc<dyn ConfigurationProvider>> {
        let providers = self.providers.get(&extension.name)?;
        match providers.as_slice() {
            [only] => Some(Arc::clone(only)),
            [] => None,
            many => {
                warn!(
                    extension = %extension.name,
                    operation = %operation.name,
                    providers = many.len(),
                    "several configuration providers registered, none selected"
                );
                None
            }
        }
    }

    fn get_configuration(
        &self,
        extension: &ExtensionDeclaration,
        _operation: &OperationDeclaration,
        _event: &Event,
    ) -> Result<Option<Arc<ConfigurationInstance>>, ResolutionError> {
        if let Some(cached) = self.implicit.get(&extension.name) {
            return Ok(Some(Arc::clone(cached.value())));
        }
        let Some(instance) = Self::implicit_instance(extension)? else {
            return Ok(None);
        };
        let instance = self
            .implicit
            .entry(extension.name.clone())
            .or_insert_with(|| {
                debug!(extension = %extension.name, name = instance.name(), "implicit configuration created");
                Arc::new(instance)
            })
            .clone();
        Ok(Some(instance))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
