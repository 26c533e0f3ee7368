//! The top-level bind entry point.

use std::sync::Arc;

use opbind_core::ExtensionDeclaration;
use tracing::info;

use crate::config::BinderConfig;
use crate::configuration::{ConfigurationBinder, ConfigurationProvider, ConfigurationRegistry};
use crate::error::BindError;
use crate::processor::{ComponentRegistry, CursorProviderFactory, OperationProcessor, OperationProcessorFactory};
use crate::resolver::{ParametersResolver, RawParameterMap};

/// Everything needed to bind one operation. Immutable once built.
#[derive(Clone)]
pub struct BuildRequest {
    extension: Arc<ExtensionDeclaration>,
    operation: String,
    parameters: RawParameterMap,
    configuration_provider: Option<Arc<dyn ConfigurationProvider>>,
    target: Option<String>,
    cursor_factory: Option<Arc<dyn CursorProviderFactory>>,
}

impl BuildRequest {
    #[must_use]
    pub fn new(extension: Arc<ExtensionDeclaration>, operation: impl Into<String>) -> Self {
        Self {
            extension,
            operation: operation.into(),
            parameters: RawParameterMap::new(),
            configuration_provider: None,
            target: None,
            cursor_factory: None,
        }
    }

    #[must_use]
    pub fn with_parameters(mut self, parameters: RawParameterMap) -> Self {
        self.parameters = parameters;
        self
    }

    /// Supplies an explicit configuration provider, which takes precedence
    /// over anything the registry would pick.
    #[must_use]
    pub fn with_configuration_provider(mut self, provider: Arc<dyn ConfigurationProvider>) -> Self {
        self.configuration_provider = Some(provider);
        self
    }

    /// Stores the output in this variable instead of the payload.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    #[must_use]
    pub fn with_cursor_factory(mut self, factory: Arc<dyn CursorProviderFactory>) -> Self {
        self.cursor_factory = Some(factory);
        self
    }

    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }
}

/// Turns [`BuildRequest`]s into processors.
pub struct OperationBinder {
    registry: Arc<dyn ConfigurationRegistry>,
    factory: OperationProcessorFactory,
}

impl OperationBinder {
    /// Creates a binder that injects executors from `components`.
    #[must_use]
    pub fn new(
        components: Arc<ComponentRegistry>,
        registry: Arc<dyn ConfigurationRegistry>,
        config: &BinderConfig,
    ) -> Self {
        Self {
            registry,
            factory: OperationProcessorFactory::with_registry_injector(components, config),
        }
    }

    #[must_use]
    pub fn with_factory(registry: Arc<dyn ConfigurationRegistry>, factory: OperationProcessorFactory) -> Self {
        Self { registry, factory }
    }

    /// Binds the requested operation.
    ///
    /// # Errors
    ///
    /// - [`BindError::Binding`] when the extension does not declare the
    ///   operation, or the factory cannot wire it
    /// - [`BindError::MissingParameter`], [`BindError::TypeCoercion`] or
    ///   [`BindError::InvalidExpression`] for bad parameter values
    pub fn bind(&self, request: BuildRequest) -> Result<OperationProcessor, BindError> {
        let BuildRequest {
            extension,
            operation,
            parameters,
            configuration_provider,
            target,
            cursor_factory,
        } = request;

        let declaration = extension.operation(&operation).cloned().ok_or_else(|| {
            BindError::binding(
                &operation,
                anyhow::anyhow!("extension '{}' does not declare this operation", extension.name),
            )
        })?;
        let declaration = Arc::new(declaration);

        let configuration = ConfigurationBinder::new(
            Arc::clone(&extension),
            Arc::clone(&declaration),
            configuration_provider,
            Arc::clone(&self.registry),
        );
        let resolver_set = ParametersResolver::from_values(parameters, Arc::new(configuration.clone()))
            .parameters_as_resolver_set(&declaration, &extension.types)?;

        let processor = self.factory.build(
            Arc::clone(&extension),
            declaration,
            resolver_set,
            configuration,
            target,
            cursor_factory,
        )?;

        info!(
            extension = %extension.name,
            operation = %operation,
            kind = ?processor.kind(),
            dynamic = processor.resolver_set().is_dynamic(),
            "operation bound"
        );
        Ok(processor)
    }
}

#[cfg(test)]
mod tests {
    use opbind_core::{DataType, OperationDeclaration, ParameterDeclaration, Value};

    use super::*;
    use crate::configuration::ExtensionConfigurationRegistry;
    use crate::processor::{DefaultConnectionSupplier, ExecutionContext, FnExecutor, OperationOutput};

    fn binder() -> OperationBinder {
        let components = Arc::new(ComponentRegistry::new());
        components.register_connection_supplier(Arc::new(DefaultConnectionSupplier::default()));
        components.register_executor(
            "echo",
            "say",
            Arc::new(FnExecutor::new(|ctx: ExecutionContext| {
                Ok(OperationOutput::Value(ctx.argument("text").cloned().unwrap_or_default()))
            })),
        );
        OperationBinder::new(
            components,
            Arc::new(ExtensionConfigurationRegistry::new()),
            &BinderConfig::default(),
        )
    }

    fn extension() -> Arc<ExtensionDeclaration> {
        let mut ext = ExtensionDeclaration::new("echo", "1.0");
        ext.operations.push(OperationDeclaration::new(
            "say",
            vec![ParameterDeclaration::required("text", DataType::String)],
        ));
        Arc::new(ext)
    }

    #[test]
    fn undeclared_operation_fails() {
        let err = binder()
            .bind(BuildRequest::new(extension(), "shout"))
            .unwrap_err();
        assert!(matches!(err, BindError::Binding { operation, .. } if operation == "shout"));
    }

    #[test]
    fn parameter_errors_surface_from_bind() {
        let err = binder().bind(BuildRequest::new(extension(), "say")).unwrap_err();
        assert!(matches!(err, BindError::MissingParameter { parameter, .. } if parameter == "text"));
    }

    #[tokio::test]
    async fn bound_processor_runs() {
        let mut parameters = RawParameterMap::new();
        parameters.insert("text".to_string(), Value::from("hi"));
        let processor = binder()
            .bind(
                BuildRequest::new(extension(), "say")
                    .with_parameters(parameters)
                    .with_target("said"),
            )
            .unwrap();

        let event = processor.invoke(crate::event::Event::default()).await.unwrap();
        assert_eq!(
            event.variable("said").and_then(crate::event::Payload::as_value),
            Some(&Value::from("hi"))
        );
    }
}
