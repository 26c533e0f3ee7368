//! Per-invocation selection of the configuration instance backing an
//! operation call.

use std::fmt;
use std::sync::Arc;

use opbind_core::{ExtensionDeclaration, OperationDeclaration};
use tracing::debug;

use crate::configuration::{
    ConfigurationInstance, ConfigurationLookup, ConfigurationProvider, ConfigurationRegistry,
};
use crate::error::ResolutionError;
use crate::event::Event;

/// Decides which configuration instance backs a call, in strict order:
///
/// 1. The explicit provider, when one was supplied. Its answer is final, even
///    when it yields nothing.
/// 2. The provider the registry associates with the extension/operation pair.
/// 3. The registry's default configuration for the pair, consulted only when
///    step 2 has no provider or its provider yields nothing.
#[derive(Clone)]
pub struct ConfigurationBinder {
    extension: Arc<ExtensionDeclaration>,
    operation: Arc<OperationDeclaration>,
    explicit: Option<Arc<dyn ConfigurationProvider>>,
    registry: Arc<dyn ConfigurationRegistry>,
}

impl ConfigurationBinder {
    #[must_use]
    pub fn new(
        extension: Arc<ExtensionDeclaration>,
        operation: Arc<OperationDeclaration>,
        explicit: Option<Arc<dyn ConfigurationProvider>>,
        registry: Arc<dyn ConfigurationRegistry>,
    ) -> Self {
        Self {
            extension,
            operation,
            explicit,
            registry,
        }
    }

    #[must_use]
    pub fn has_explicit_provider(&self) -> bool {
        self.explicit.is_some()
    }

    /// Resolves the configuration instance for `event`.
    ///
    /// `Ok(None)` means no source produced an instance.
    ///
    /// # Errors
    ///
    /// Propagates provider and registry failures.
    pub fn resolve_configuration(
        &self,
        event: &Event,
    ) -> Result<Option<Arc<ConfigurationInstance>>, ResolutionError> {
        if let Some(explicit) = &self.explicit {
            return explicit.get(event);
        }

        if let Some(provider) = self
            .registry
            .get_configuration_provider(&self.extension, &self.operation)
        {
            if let Some(instance) = provider.get(event)? {
                return Ok(Some(instance));
            }
            debug!(
                extension = %self.extension.name,
                operation = %self.operation.name,
                provider = provider.name(),
                "registry provider returned no configuration, using default"
            );
        }

        self.registry
            .get_configuration(&self.extension, &self.operation, event)
    }
}

impl ConfigurationLookup for ConfigurationBinder {
    fn lookup(&self, event: &Event) -> Result<Option<Arc<ConfigurationInstance>>, ResolutionError> {
        self.resolve_configuration(event)
    }
}

impl fmt::Debug for ConfigurationBinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigurationBinder")
            .field("extension", &self.extension.name)
            .field("operation", &self.operation.name)
            .field("explicit", &self.explicit.as_ref().map(|p| p.name().to_string()))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::configuration::StaticConfigurationProvider;

    fn instance(name: &str) -> ConfigurationInstance {
        ConfigurationInstance::new(name, "ext", BTreeMap::new())
    }

    /// Registry stub with a fixed provider and default, counting lookups.
    #[derive(Default)]
    struct StubRegistry {
        provider: Option<Arc<dyn ConfigurationProvider>>,
        default: Option<Arc<ConfigurationInstance>>,
        provider_lookups: AtomicUsize,
        default_lookups: AtomicUsize,
    }

    impl ConfigurationRegistry for StubRegistry {
        fn get_configuration_provider(
            &self,
            _extension: &ExtensionDeclaration,
            _operation: &OperationDeclaration,
        ) -> Option<Arc<dyn ConfigurationProvider>> {
            self.provider_lookups.fetch_add(1, Ordering::SeqCst);
            self.provider.clone()
        }

        fn get_configuration(
            &self,
            _extension: &ExtensionDeclaration,
            _operation: &OperationDeclaration,
            _event: &Event,
        ) -> Result<Option<Arc<ConfigurationInstance>>, ResolutionError> {
            self.default_lookups.fetch_add(1, Ordering::SeqCst);
            Ok(self.default.clone())
        }
    }

    /// Provider that never yields an instance.
    #[derive(Debug)]
    struct EmptyProvider;

    impl ConfigurationProvider for EmptyProvider {
        fn name(&self) -> &str {
            "empty"
        }

        fn extension(&self) -> &str {
            "ext"
        }

        fn get(&self, _event: &Event) -> Result<Option<Arc<ConfigurationInstance>>, ResolutionError> {
            Ok(None)
        }
    }

    fn binder(
        explicit: Option<Arc<dyn ConfigurationProvider>>,
        registry: Arc<StubRegistry>,
    ) -> ConfigurationBinder {
        ConfigurationBinder::new(
            Arc::new(ExtensionDeclaration::new("ext", "1.0")),
            Arc::new(OperationDeclaration::new("op", vec![])),
            explicit,
            registry,
        )
    }

    #[test]
    fn explicit_provider_wins_over_registry() {
        let registry = Arc::new(StubRegistry {
            provider: Some(Arc::new(StaticConfigurationProvider::new(instance("registry")))),
            default: Some(Arc::new(instance("default"))),
            ..StubRegistry::default()
        });
        let explicit: Arc<dyn ConfigurationProvider> =
            Arc::new(StaticConfigurationProvider::new(instance("explicit")));

        let binder = binder(Some(explicit), Arc::clone(&registry));
        let found = binder.resolve_configuration(&Event::default()).unwrap().unwrap();

        assert_eq!(found.name(), "explicit");
        assert_eq!(registry.provider_lookups.load(Ordering::SeqCst), 0);
        assert_eq!(registry.default_lookups.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn empty_explicit_provider_is_authoritative() {
        let registry = Arc::new(StubRegistry {
            default: Some(Arc::new(instance("default"))),
            ..StubRegistry::default()
        });
        let binder = binder(Some(Arc::new(EmptyProvider)), Arc::clone(&registry));
        assert!(binder.resolve_configuration(&Event::default()).unwrap().is_none());
        assert_eq!(registry.default_lookups.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn registry_provider_before_default() {
        let registry = Arc::new(StubRegistry {
            provider: Some(Arc::new(StaticConfigurationProvider::new(instance("registry")))),
            default: Some(Arc::new(instance("default"))),
            ..StubRegistry::default()
        });
        let binder = binder(None, Arc::clone(&registry));
        let found = binder.resolve_configuration(&Event::default()).unwrap().unwrap();
        assert_eq!(found.name(), "registry");
        assert_eq!(registry.default_lookups.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn default_used_when_registry_provider_is_empty() {
        let registry = Arc::new(StubRegistry {
            provider: Some(Arc::new(EmptyProvider)),
            default: Some(Arc::new(instance("default"))),
            ..StubRegistry::default()
        });
        let binder = binder(None, Arc::clone(&registry));
        let found = binder.resolve_configuration(&Event::default()).unwrap().unwrap();
        assert_eq!(found.name(), "default");
    }

    #[test]
    fn nothing_found_is_not_an_error() {
        let binder = binder(None, Arc::new(StubRegistry::default()));
        assert!(binder.resolve_configuration(&Event::default()).unwrap().is_none());
    }
}
