//! Configuration instances and the providers that produce them.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use opbind_core::{ConfigurationDeclaration, TypeTable, Value};
use quick_cache::sync::Cache;
use tracing::debug;

use crate::configuration::NoConfiguration;
use crate::error::{BindError, ResolutionError};
use crate::event::Event;
use crate::resolver::{ParametersResolver, RawParameterMap, ResolverSet};

/// A concrete set of configuration parameter values.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigurationInstance {
    name: String,
    extension: String,
    parameters: BTreeMap<String, Value>,
}

impl ConfigurationInstance {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        extension: impl Into<String>,
        parameters: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            name: name.into(),
            extension: extension.into(),
            parameters,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn extension(&self) -> &str {
        &self.extension
    }

    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    #[must_use]
    pub fn parameters(&self) -> &BTreeMap<String, Value> {
        &self.parameters
    }
}

/// Source of configuration instances for an extension.
pub trait ConfigurationProvider: Send + Sync + fmt::Debug {
    /// Name the provider is registered under.
    fn name(&self) -> &str;

    /// Extension the provider configures.
    fn extension(&self) -> &str;

    /// Produces the instance for `event`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError`] when the instance's parameters cannot be
    /// resolved.
    fn get(&self, event: &Event) -> Result<Option<Arc<ConfigurationInstance>>, ResolutionError>;
}

/// Always returns the same instance.
#[derive(Debug, Clone)]
pub struct StaticConfigurationProvider {
    instance: Arc<ConfigurationInstance>,
}

impl StaticConfigurationProvider {
    #[must_use]
    pub fn new(instance: ConfigurationInstance) -> Self {
        Self {
            instance: Arc::new(instance),
        }
    }
}

impl ConfigurationProvider for StaticConfigurationProvider {
    fn name(&self) -> &str {
        self.instance.name()
    }

    fn extension(&self) -> &str {
        self.instance.extension()
    }

    fn get(&self, _event: &Event) -> Result<Option<Arc<ConfigurationInstance>>, ResolutionError> {
        Ok(Some(Arc::clone(&self.instance)))
    }
}

/// Instances kept by a [`DynamicConfigurationProvider`] unless configured
/// otherwise.
pub const DEFAULT_INSTANCE_CAPACITY: usize = 1024;

/// Resolves configuration parameters per event and caches one instance per
/// distinct set of resolved values.
///
/// The cache is bounded; once full, rarely used instances are evicted and
/// recreated on their next use.
pub struct DynamicConfigurationProvider {
    name: String,
    extension: String,
    resolvers: ResolverSet,
    instances: Cache<String, Arc<ConfigurationInstance>>,
    capacity: usize,
}

impl DynamicConfigurationProvider {
    #[must_use]
    pub fn new(name: impl Into<String>, extension: impl Into<String>, resolvers: ResolverSet) -> Self {
        Self::with_capacity(name, extension, resolvers, DEFAULT_INSTANCE_CAPACITY)
    }

    /// Like [`DynamicConfigurationProvider::new`] with an explicit cache bound.
    #[must_use]
    pub fn with_capacity(
        name: impl Into<String>,
        extension: impl Into<String>,
        resolvers: ResolverSet,
        capacity: usize,
    ) -> Self {
        let capacity = capacity.max(1);
        Self {
            name: name.into(),
            extension: extension.into(),
            resolvers,
            instances: Cache::new(capacity),
            capacity,
        }
    }

    /// Builds a provider from the extension's configuration declaration and raw
    /// (possibly expression) parameter values.
    ///
    /// # Errors
    ///
    /// Returns [`BindError`] when a raw value is missing, malformed or of the
    /// wrong type.
    pub fn from_declaration(
        name: impl Into<String>,
        extension: impl Into<String>,
        declaration: &ConfigurationDeclaration,
        raw: RawParameterMap,
        types: &Arc<TypeTable>,
    ) -> Result<Self, BindError> {
        let name = name.into();
        let resolvers = ParametersResolver::from_values(raw, Arc::new(NoConfiguration))
            .resolver_set(&name, &declaration.parameters, types)?;
        Ok(Self::new(name, extension, resolvers))
    }

    /// Replaces the cache bound, dropping any cached instances.
    #[must_use]
    pub fn capacity(self, capacity: usize) -> Self {
        Self::with_capacity(self.name, self.extension, self.resolvers, capacity)
    }

    /// Number of instances currently cached.
    #[must_use]
    pub fn cached_instances(&self) -> usize {
        self.instances.len()
    }
}

impl fmt::Debug for DynamicConfigurationProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicConfigurationProvider")
            .field("name", &self.name)
            .field("extension", &self.extension)
            .field("resolvers", &self.resolvers)
            .field("cached_instances", &self.instances.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl ConfigurationProvider for DynamicConfigurationProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn extension(&self) -> &str {
        &self.extension
    }

    fn get(&self, event: &Event) -> Result<Option<Arc<ConfigurationInstance>>, ResolutionError> {
        let resolved = self.resolvers.resolve(event)?;
        let key = resolved.cache_key();
        let instance = self
            .instances
            .get_or_insert_with(&key, || {
                debug!(provider = %self.name, "creating configuration instance");
                Ok::<_, ResolutionError>(Arc::new(ConfigurationInstance::new(
                    self.name.clone(),
                    self.extension.clone(),
                    resolved.into_map(),
                )))
            })?;
        Ok(Some(instance))
    }
}

#[cfg(test)]
mod tests {
    use opbind_core::{DataType, ParameterDeclaration};

    use super::*;
    use crate::configuration::ConfigurationLookup;

    fn declaration() -> ConfigurationDeclaration {
        ConfigurationDeclaration {
            name: "config".to_string(),
            parameters: vec![
                ParameterDeclaration::required("tenant", DataType::String),
                ParameterDeclaration::optional("retries", DataType::Int),
            ],
        }
    }

    #[test]
    fn static_provider_shares_instance() {
        let provider = StaticConfigurationProvider::new(ConfigurationInstance::new(
            "cfg",
            "ext",
            BTreeMap::new(),
        ));
        let a = provider.get(&Event::default()).unwrap().unwrap();
        let b = provider.get(&Event::default()).unwrap().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(provider.name(), "cfg");
        assert_eq!(provider.extension(), "ext");
    }

    #[test]
    fn dynamic_provider_caches_by_resolved_values() {
        let mut raw = RawParameterMap::new();
        raw.insert("tenant".to_string(), Value::from("#[vars.tenant]"));
        let provider = DynamicConfigurationProvider::from_declaration(
            "dynamic",
            "ext",
            &declaration(),
            raw,
            &Arc::new(TypeTable::new()),
        )
        .unwrap();

        let acme = Event::default().with_variable("tenant", Value::from("acme"));
        let globex = Event::default().with_variable("tenant", Value::from("globex"));

        let first = provider.get(&acme).unwrap().unwrap();
        let again = provider.get(&acme).unwrap().unwrap();
        let other = provider.get(&globex).unwrap().unwrap();

        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(other.parameter("tenant"), Some(&Value::from("globex")));
        assert_eq!(provider.cached_instances(), 2);
    }

    #[test]
    fn dynamic_provider_cache_is_bounded() {
        let mut raw = RawParameterMap::new();
        raw.insert("tenant".to_string(), Value::from("#[correlationId]"));
        let provider = DynamicConfigurationProvider::from_declaration(
            "per-event",
            "ext",
            &declaration(),
            raw,
            &Arc::new(TypeTable::new()),
        )
        .unwrap()
        .capacity(64);

        for _ in 0..5_000 {
            let event = Event::default();
            let instance = provider.get(&event).unwrap().unwrap();
            assert_eq!(
                instance.parameter("tenant"),
                Some(&Value::from(event.correlation_id().to_string()))
            );
        }
        let cached = provider.cached_instances();
        assert!(cached > 0);
        assert!(cached <= 128, "cache grew to {cached} instances");
    }

    #[test]
    fn dynamic_provider_fails_when_required_value_is_absent() {
        let mut raw = RawParameterMap::new();
        raw.insert("tenant".to_string(), Value::from("#[vars.tenant]"));
        let provider = DynamicConfigurationProvider::from_declaration(
            "dynamic",
            "ext",
            &declaration(),
            raw,
            &Arc::new(TypeTable::new()),
        )
        .unwrap();

        assert!(matches!(
            provider.get(&Event::default()),
            Err(ResolutionError::MissingValue { .. })
        ));
    }

    #[test]
    fn provider_wraps_as_lookup() {
        let provider: Arc<dyn ConfigurationProvider> = Arc::new(StaticConfigurationProvider::new(
            ConfigurationInstance::new("cfg", "ext", BTreeMap::new()),
        ));
        let lookup = move |event: &Event| provider.get(event);
        let found = lookup.lookup(&Event::default()).unwrap().unwrap();
        assert_eq!(found.name(), "cfg");
    }
}
