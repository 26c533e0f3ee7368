//! Factory assembling processors from resolved parts.
//!
//! [`OperationProcessorFactory`] picks the processor variant from the
//! operation's capabilities, wires the paged variant's cursor factory and
//! connection supplier, and runs the injection step on every processor it
//! builds.

use std::sync::Arc;

use opbind_core::{ExtensionDeclaration, OperationDeclaration};
use tracing::debug;

use crate::config::BinderConfig;
use crate::configuration::ConfigurationBinder;
use crate::error::BindError;
use crate::processor::{
    ComponentRegistry, CursorProviderFactory, Injector, OperationProcessor,
    PagedOperationProcessor, ProcessorCore, RegistryInjector, RepeatableCursorProviderFactory,
    StandardOperationProcessor, StreamingCursorProviderFactory,
};
use crate::resolver::ResolverSet;

/// Builds [`OperationProcessor`]s.
pub struct OperationProcessorFactory {
    components: Arc<ComponentRegistry>,
    injector: Arc<dyn Injector>,
    default_cursor_factory: Arc<dyn CursorProviderFactory>,
}

impl OperationProcessorFactory {
    /// Creates a factory. The default cursor factory for paged operations
    /// follows `config.repeatable_cursors`.
    #[must_use]
    pub fn new(
        components: Arc<ComponentRegistry>,
        injector: Arc<dyn Injector>,
        config: &BinderConfig,
    ) -> Self {
        let default_cursor_factory: Arc<dyn CursorProviderFactory> = if config.repeatable_cursors {
            Arc::new(RepeatableCursorProviderFactory::new(config.cursor_buffer_items))
        } else {
            Arc::new(StreamingCursorProviderFactory)
        };
        Self {
            components,
            injector,
            default_cursor_factory,
        }
    }

    /// Creates a factory injecting executors from `components`.
    #[must_use]
    pub fn with_registry_injector(components: Arc<ComponentRegistry>, config: &BinderConfig) -> Self {
        let injector = Arc::new(RegistryInjector::new(Arc::clone(&components)));
        Self::new(components, injector, config)
    }

    /// Builds a processor for `operation`.
    ///
    /// Paged operations get the given cursor factory, or the default one when
    /// `None`.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::Binding`] when a paged operation finds no connection
    /// supplier or when injection fails. No processor is returned in that case.
    pub fn build(
        &self,
        extension: Arc<ExtensionDeclaration>,
        operation: Arc<OperationDeclaration>,
        resolver_set: ResolverSet,
        configuration: ConfigurationBinder,
        target: Option<String>,
        cursor_factory: Option<Arc<dyn CursorProviderFactory>>,
    ) -> Result<OperationProcessor, BindError> {
        let name = operation.name.clone();
        let paged = operation.is_paged();
        let core = ProcessorCore::new(extension, operation, resolver_set, configuration, target);

        let mut processor = if paged {
            let connections = self.components.connection_supplier().ok_or_else(|| {
                BindError::binding(&name, anyhow::anyhow!("no connection supplier registered"))
            })?;
            let cursor_factory =
                cursor_factory.unwrap_or_else(|| Arc::clone(&self.default_cursor_factory));
            debug!(operation = %name, cursor_factory = ?cursor_factory, "building paged processor");
            OperationProcessor::Paged(PagedOperationProcessor::new(core, cursor_factory, connections))
        } else {
            debug!(operation = %name, "building standard processor");
            OperationProcessor::Standard(StandardOperationProcessor::new(core))
        };

        self.injector
            .inject(&mut processor)
            .map_err(|source| BindError::binding(&name, source))?;
        Ok(processor)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use opbind_core::{PagedCapability, Value};

    use super::*;
    use crate::configuration::ExtensionConfigurationRegistry;
    use crate::processor::{
        CursorKind, DefaultConnectionSupplier, ExecutionContext, FnExecutor, OperationOutput,
        ProcessorKind, VecPagingProvider,
    };
    use crate::event::Event;

    fn declarations(paged: bool) -> (Arc<ExtensionDeclaration>, Arc<OperationDeclaration>) {
        let mut op = OperationDeclaration::new("list", vec![]);
        if paged {
            op.capabilities.insert(PagedCapability);
        }
        let mut ext = ExtensionDeclaration::new("store", "1.0");
        ext.operations.push(op.clone());
        (Arc::new(ext), Arc::new(op))
    }

    fn components(paged_output: bool) -> Arc<ComponentRegistry> {
        let components = Arc::new(ComponentRegistry::new());
        components.register_connection_supplier(Arc::new(DefaultConnectionSupplier::default()));
        components.register_executor(
            "store",
            "list",
            Arc::new(FnExecutor::new(move |_: ExecutionContext| {
                if paged_output {
                    Ok(OperationOutput::Paged(Box::new(VecPagingProvider::new(vec![vec![
                        Value::Int(7),
                    ]]))))
                } else {
                    Ok(OperationOutput::Value(Value::Int(7)))
                }
            })),
        );
        components
    }

    fn build(
        factory: &OperationProcessorFactory,
        paged: bool,
        cursor_factory: Option<Arc<dyn CursorProviderFactory>>,
    ) -> Result<OperationProcessor, BindError> {
        let (ext, op) = declarations(paged);
        let binder = ConfigurationBinder::new(
            Arc::clone(&ext),
            Arc::clone(&op),
            None,
            Arc::new(ExtensionConfigurationRegistry::new()),
        );
        factory.build(ext, op, ResolverSet::new(), binder, None, cursor_factory)
    }

    #[test]
    fn variant_follows_paged_capability() {
        let factory =
            OperationProcessorFactory::with_registry_injector(components(false), &BinderConfig::default());
        assert_eq!(build(&factory, false, None).unwrap().kind(), ProcessorKind::Standard);
        assert_eq!(build(&factory, true, None).unwrap().kind(), ProcessorKind::Paged);
    }

    #[test]
    fn injection_always_runs() {
        let factory =
            OperationProcessorFactory::with_registry_injector(components(false), &BinderConfig::default());
        assert!(build(&factory, false, None).unwrap().has_executor());
    }

    #[test]
    fn missing_executor_fails_build() {
        let components = Arc::new(ComponentRegistry::new());
        let factory =
            OperationProcessorFactory::with_registry_injector(components, &BinderConfig::default());
        let err = build(&factory, false, None).unwrap_err();
        assert!(matches!(err, BindError::Binding { operation, .. } if operation == "list"));
    }

    #[test]
    fn paged_build_needs_connection_supplier() {
        let components = Arc::new(ComponentRegistry::new());
        components.register_executor(
            "store",
            "list",
            Arc::new(FnExecutor::new(|_: ExecutionContext| {
                Ok(OperationOutput::Value(Value::Null))
            })),
        );
        let factory =
            OperationProcessorFactory::with_registry_injector(components, &BinderConfig::default());
        assert!(build(&factory, false, None).is_ok());
        let err = build(&factory, true, None).unwrap_err();
        assert!(err.to_string().contains("no connection supplier"));
    }

    #[tokio::test]
    async fn cursor_factory_defaults_follow_config() {
        let config = BinderConfig {
            repeatable_cursors: true,
            ..BinderConfig::default()
        };
        let factory = OperationProcessorFactory::with_registry_injector(components(true), &config);
        let processor = build(&factory, true, None).unwrap();

        let event = processor.invoke(Event::default()).await.unwrap();
        let provider = event.payload().as_cursor().unwrap();
        assert_eq!(provider.kind(), CursorKind::Repeatable);

        let explicit: Arc<dyn CursorProviderFactory> = Arc::new(StreamingCursorProviderFactory);
        let processor = build(&factory, true, Some(explicit)).unwrap();
        let event = processor.invoke(Event::default()).await.unwrap();
        assert_eq!(event.payload().as_cursor().unwrap().kind(), CursorKind::Streaming);
    }
}
