//! Built operation processors and their invocation.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use opbind_core::{ExtensionDeclaration, OperationDeclaration};
use tower::Service;
use tracing::debug;

use crate::configuration::ConfigurationBinder;
use crate::error::InvocationError;
use crate::event::{Event, Payload};
use crate::processor::{
    ConnectionSupplier, CursorProviderFactory, ExecutionContext, OperationExecutor,
    OperationOutput, PagedCursor,
};
use crate::resolver::ResolverSet;

/// Variant of a built processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorKind {
    Standard,
    Paged,
}

// ---------------------------------------------------------------------------
// ProcessorCore
// ---------------------------------------------------------------------------

/// State shared by both processor variants.
#[derive(Clone)]
pub struct ProcessorCore {
    extension: Arc<ExtensionDeclaration>,
    operation: Arc<OperationDeclaration>,
    resolver_set: Arc<ResolverSet>,
    configuration: Arc<ConfigurationBinder>,
    target: Option<String>,
    executor: Option<Arc<dyn OperationExecutor>>,
}

impl ProcessorCore {
    #[must_use]
    pub fn new(
        extension: Arc<ExtensionDeclaration>,
        operation: Arc<OperationDeclaration>,
        resolver_set: ResolverSet,
        configuration: ConfigurationBinder,
        target: Option<String>,
    ) -> Self {
        Self {
            extension,
            operation,
            resolver_set: Arc::new(resolver_set),
            configuration: Arc::new(configuration),
            target,
            executor: None,
        }
    }

    /// Resolves configuration and arguments, then runs the executor.
    async fn execute(&self, event: &Event) -> Result<(ExecutionContext, OperationOutput), InvocationError> {
        let executor = self
            .executor
            .clone()
            .ok_or_else(|| InvocationError::ExecutorNotInjected {
                operation: self.operation.name.clone(),
            })?;

        let configuration = self.configuration.resolve_configuration(event)?;
        if configuration.is_none() && self.operation.requires_configuration {
            return Err(InvocationError::ConfigurationRequired {
                operation: self.operation.name.clone(),
            });
        }

        let arguments = self.resolver_set.resolve(event)?;
        let ctx = ExecutionContext {
            extension: Arc::clone(&self.extension),
            operation: Arc::clone(&self.operation),
            arguments,
            configuration,
            event: event.clone(),
        };

        let output = executor
            .execute(ctx.clone())
            .await
            .map_err(|source| InvocationError::Execution {
                operation: self.operation.name.clone(),
                source,
            })?;
        Ok((ctx, output))
    }

    fn unexpected(&self, expected: &'static str, output: &OperationOutput) -> InvocationError {
        InvocationError::UnexpectedOutput {
            operation: self.operation.name.clone(),
            expected,
            found: output.kind(),
        }
    }

    fn deliver(&self, mut event: Event, payload: Payload) -> Event {
        match &self.target {
            Some(target) => event.set_variable(target.clone(), payload),
            None => event.set_payload(payload),
        }
        event
    }
}

// ---------------------------------------------------------------------------
// Variants
// ---------------------------------------------------------------------------

/// Processor for operations returning a complete value.
#[derive(Clone)]
pub struct StandardOperationProcessor {
    core: ProcessorCore,
}

impl StandardOperationProcessor {
    #[must_use]
    pub fn new(core: ProcessorCore) -> Self {
        Self { core }
    }

    async fn invoke(&self, event: Event) -> Result<Event, InvocationError> {
        let (_, output) = self.core.execute(&event).await?;
        match output {
            OperationOutput::Value(value) => Ok(self.core.deliver(event, Payload::Value(value))),
            other @ OperationOutput::Paged(_) => Err(self.core.unexpected("value", &other)),
        }
    }
}

/// Processor for operations returning paged results through a cursor.
#[derive(Clone)]
pub struct PagedOperationProcessor {
    core: ProcessorCore,
    cursor_factory: Arc<dyn CursorProviderFactory>,
    connections: Arc<dyn ConnectionSupplier>,
}

impl PagedOperationProcessor {
    #[must_use]
    pub fn new(
        core: ProcessorCore,
        cursor_factory: Arc<dyn CursorProviderFactory>,
        connections: Arc<dyn ConnectionSupplier>,
    ) -> Self {
        Self {
            core,
            cursor_factory,
            connections,
        }
    }

    #[must_use]
    pub fn cursor_factory(&self) -> &Arc<dyn CursorProviderFactory> {
        &self.cursor_factory
    }

    async fn invoke(&self, event: Event) -> Result<Event, InvocationError> {
        let (ctx, output) = self.core.execute(&event).await?;
        match output {
            OperationOutput::Paged(provider) => {
                let cursor = PagedCursor::new(
                    self.core.operation.name.clone(),
                    provider,
                    Arc::clone(&self.connections),
                    ctx.configuration,
                );
                let provider = self.cursor_factory.create(cursor);
                Ok(self.core.deliver(event, Payload::Cursor(provider)))
            }
            other @ OperationOutput::Value(_) => Err(self.core.unexpected("paged", &other)),
        }
    }
}

// ---------------------------------------------------------------------------
// OperationProcessor
// ---------------------------------------------------------------------------

/// An operation bound to its parameters and configuration, ready to invoke.
#[derive(Clone)]
pub enum OperationProcessor {
    Standard(StandardOperationProcessor),
    Paged(PagedOperationProcessor),
}

impl OperationProcessor {
    fn core(&self) -> &ProcessorCore {
        match self {
            OperationProcessor::Standard(p) => &p.core,
            OperationProcessor::Paged(p) => &p.core,
        }
    }

    fn core_mut(&mut self) -> &mut ProcessorCore {
        match self {
            OperationProcessor::Standard(p) => &mut p.core,
            OperationProcessor::Paged(p) => &mut p.core,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ProcessorKind {
        match self {
            OperationProcessor::Standard(_) => ProcessorKind::Standard,
            OperationProcessor::Paged(_) => ProcessorKind::Paged,
        }
    }

    #[must_use]
    pub fn extension(&self) -> &ExtensionDeclaration {
        &self.core().extension
    }

    #[must_use]
    pub fn operation(&self) -> &OperationDeclaration {
        &self.core().operation
    }

    #[must_use]
    pub fn resolver_set(&self) -> &ResolverSet {
        &self.core().resolver_set
    }

    #[must_use]
    pub fn configuration_binder(&self) -> &ConfigurationBinder {
        &self.core().configuration
    }

    #[must_use]
    pub fn target(&self) -> Option<&str> {
        self.core().target.as_deref()
    }

    #[must_use]
    pub fn has_executor(&self) -> bool {
        self.core().executor.is_some()
    }

    /// Sets the executor the processor calls on each invocation.
    pub fn inject_executor(&mut self, executor: Arc<dyn OperationExecutor>) {
        self.core_mut().executor = Some(executor);
    }

    /// Runs the operation for `event` and returns the resulting event.
    ///
    /// The output replaces the payload, or lands in `variables[target]` when
    /// a target was set, leaving the payload untouched.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError`] when configuration or arguments cannot be
    /// resolved, the executor fails, or it returns the wrong kind of output.
    pub async fn invoke(&self, event: Event) -> Result<Event, InvocationError> {
        debug!(
            operation = %self.operation().name,
            correlation_id = %event.correlation_id(),
            kind = ?self.kind(),
            "invoking operation"
        );
        match self {
            OperationProcessor::Standard(p) => p.invoke(event).await,
            OperationProcessor::Paged(p) => p.invoke(event).await,
        }
    }
}

impl std::fmt::Debug for OperationProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationProcessor")
            .field("kind", &self.kind())
            .field("extension", &self.extension().name)
            .field("operation", &self.operation().name)
            .field("parameters", &self.resolver_set().names().collect::<Vec<_>>())
            .field("target", &self.target())
            .finish_non_exhaustive()
    }
}

impl Service<Event> for OperationProcessor {
    type Response = Event;
    type Error = InvocationError;
    type Future = Pin<Box<dyn Future<Output = Result<Event, InvocationError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: Event) -> Self::Future {
        let processor = self.clone();
        Box::pin(async move { processor.invoke(event).await })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use opbind_core::{DataType, ParameterDeclaration, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::configuration::{
        ConfigurationInstance, ConfigurationProvider, ExtensionConfigurationRegistry,
        StaticConfigurationProvider,
    };
    use crate::processor::{
        DefaultConnectionSupplier, FnExecutor, StreamingCursorProviderFactory, VecPagingProvider,
    };
    use crate::resolver::ParametersResolver;

    fn declarations(requires_configuration: bool) -> (Arc<ExtensionDeclaration>, Arc<OperationDeclaration>) {
        let mut op = OperationDeclaration::new(
            "greet",
            vec![ParameterDeclaration::required("name", DataType::String)],
        );
        op.requires_configuration = requires_configuration;
        let mut ext = ExtensionDeclaration::new("hello", "1.0");
        ext.operations.push(op.clone());
        (Arc::new(ext), Arc::new(op))
    }

    fn core(
        requires_configuration: bool,
        explicit: Option<Arc<dyn ConfigurationProvider>>,
        target: Option<String>,
    ) -> ProcessorCore {
        let (ext, op) = declarations(requires_configuration);
        let binder = ConfigurationBinder::new(
            Arc::clone(&ext),
            Arc::clone(&op),
            explicit,
            Arc::new(ExtensionConfigurationRegistry::new()),
        );
        let mut raw = BTreeMap::new();
        raw.insert("name".to_string(), Value::from("#[payload]"));
        let set = ParametersResolver::from_values(raw, Arc::new(binder.clone()))
            .parameters_as_resolver_set(&op, &ext.types)
            .unwrap();
        ProcessorCore::new(ext, op, set, binder, target)
    }

    fn greeter() -> Arc<dyn OperationExecutor> {
        Arc::new(FnExecutor::new(|ctx: ExecutionContext| {
            let name = ctx.argument("name").cloned().unwrap_or_default();
            Ok(OperationOutput::Value(Value::String(format!("hello {name}"))))
        }))
    }

    fn standard(core: ProcessorCore) -> OperationProcessor {
        let mut processor = OperationProcessor::Standard(StandardOperationProcessor::new(core));
        processor.inject_executor(greeter());
        processor
    }

    #[tokio::test]
    async fn output_replaces_payload() {
        let processor = standard(core(false, None, None));
        let result = processor.invoke(Event::new(Value::from("ada"))).await.unwrap();
        assert_eq!(result.payload().as_value(), Some(&Value::from("hello ada")));
    }

    #[tokio::test]
    async fn output_goes_to_target_variable() {
        let processor = standard(core(false, None, Some("greeting".to_string())));
        assert_eq!(processor.target(), Some("greeting"));

        let result = processor.invoke(Event::new(Value::from("ada"))).await.unwrap();
        assert_eq!(result.payload().as_value(), Some(&Value::from("ada")));
        assert_eq!(
            result.variable("greeting").and_then(Payload::as_value),
            Some(&Value::from("hello ada"))
        );
    }

    #[tokio::test]
    async fn missing_executor_fails_per_invocation() {
        let processor = OperationProcessor::Standard(StandardOperationProcessor::new(core(false, None, None)));
        assert!(!processor.has_executor());
        let err = processor.invoke(Event::new(Value::from("ada"))).await.unwrap_err();
        assert!(matches!(err, InvocationError::ExecutorNotInjected { .. }));
    }

    #[tokio::test]
    async fn required_configuration_is_enforced() {
        let processor = standard(core(true, None, None));
        let err = processor.invoke(Event::new(Value::from("ada"))).await.unwrap_err();
        assert!(matches!(err, InvocationError::ConfigurationRequired { operation } if operation == "greet"));

        let explicit: Arc<dyn ConfigurationProvider> = Arc::new(StaticConfigurationProvider::new(
            ConfigurationInstance::new("cfg", "hello", BTreeMap::new()),
        ));
        let processor = standard(core(true, Some(explicit), None));
        assert!(processor.invoke(Event::new(Value::from("ada"))).await.is_ok());
    }

    #[tokio::test]
    async fn unresolvable_argument_fails_invocation() {
        let processor = standard(core(false, None, None));
        let err = processor.invoke(Event::default()).await.unwrap_err();
        assert!(matches!(err, InvocationError::Resolution(_)));
    }

    #[tokio::test]
    async fn paged_processor_places_cursor() {
        let mut processor = OperationProcessor::Paged(PagedOperationProcessor::new(
            core(false, None, None),
            Arc::new(StreamingCursorProviderFactory),
            Arc::new(DefaultConnectionSupplier::default()),
        ));
        processor.inject_executor(Arc::new(FnExecutor::new(|_: ExecutionContext| {
            Ok(OperationOutput::Paged(Box::new(VecPagingProvider::new(vec![vec![
                Value::Int(1),
                Value::Int(2),
            ]]))))
        })));
        assert_eq!(processor.kind(), ProcessorKind::Paged);

        let result = processor.invoke(Event::new(Value::from("ada"))).await.unwrap();
        let cursor = result.payload().as_cursor().unwrap().open().unwrap();
        assert_eq!(cursor.collect_all().await.unwrap(), vec![Value::Int(1), Value::Int(2)]);
    }

    #[tokio::test]
    async fn paged_processor_rejects_plain_values() {
        let mut processor = OperationProcessor::Paged(PagedOperationProcessor::new(
            core(false, None, None),
            Arc::new(StreamingCursorProviderFactory),
            Arc::new(DefaultConnectionSupplier::default()),
        ));
        processor.inject_executor(greeter());
        let err = processor.invoke(Event::new(Value::from("ada"))).await.unwrap_err();
        assert!(matches!(
            err,
            InvocationError::UnexpectedOutput { expected: "paged", found: "value", .. }
        ));
    }

    #[tokio::test]
    async fn processor_is_a_tower_service() {
        let processor = standard(core(false, None, None));
        let result = processor.oneshot(Event::new(Value::from("bob"))).await.unwrap();
        assert_eq!(result.payload().as_value(), Some(&Value::from("hello bob")));
    }
}
