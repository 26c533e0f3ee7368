//! Component registry and the injection step run on every built processor.

use std::any::{Any, TypeId};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::processor::{ConnectionSupplier, OperationExecutor, OperationProcessor};

// ---------------------------------------------------------------------------
// ComponentRegistry
// ---------------------------------------------------------------------------

/// Registry of runtime components the binder wires into processors.
///
/// Provides two lookup mechanisms:
/// - **By type** (`get::<T>`): singleton components keyed by `TypeId`, such as
///   the connection supplier
/// - **By operation** (`executor`): the executor for an extension/operation
///   pair
#[derive(Default)]
pub struct ComponentRegistry {
    by_type: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    executors: DashMap<(String, String), Arc<dyn OperationExecutor>>,
}

impl ComponentRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a component under its concrete type, replacing any previous
    /// component of that type.
    pub fn register<T: Any + Send + Sync>(&self, component: T) {
        self.by_type.insert(TypeId::of::<T>(), Arc::new(component));
    }

    /// Retrieves a component by its concrete type.
    #[must_use]
    pub fn get<T: Any + Send + Sync + Clone>(&self) -> Option<T> {
        self.by_type
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.value().downcast_ref::<T>().cloned())
    }

    pub fn register_connection_supplier(&self, supplier: Arc<dyn ConnectionSupplier>) {
        self.register(supplier);
    }

    #[must_use]
    pub fn connection_supplier(&self) -> Option<Arc<dyn ConnectionSupplier>> {
        self.get::<Arc<dyn ConnectionSupplier>>()
    }

    /// Registers the executor for `extension`/`operation`.
    pub fn register_executor(
        &self,
        extension: impl Into<String>,
        operation: impl Into<String>,
        executor: Arc<dyn OperationExecutor>,
    ) {
        let key = (extension.into(), operation.into());
        debug!(extension = %key.0, operation = %key.1, "executor registered");
        self.executors.insert(key, executor);
    }

    #[must_use]
    pub fn executor(&self, extension: &str, operation: &str) -> Option<Arc<dyn OperationExecutor>> {
        self.executors
            .get(&(extension.to_string(), operation.to_string()))
            .map(|entry| Arc::clone(entry.value()))
    }
}

// ---------------------------------------------------------------------------
// Injection
// ---------------------------------------------------------------------------

/// Final build step: binds runtime dependencies into a freshly built processor.
pub trait Injector: Send + Sync {
    /// Injects dependencies into `processor`.
    ///
    /// # Errors
    ///
    /// Fails when a dependency cannot be found; the processor must then be
    /// discarded.
    fn inject(&self, processor: &mut OperationProcessor) -> anyhow::Result<()>;
}

/// Injects the executor registered for the processor's operation.
pub struct RegistryInjector {
    components: Arc<ComponentRegistry>,
}

impl RegistryInjector {
    #[must_use]
    pub fn new(components: Arc<ComponentRegistry>) -> Self {
        Self { components }
    }
}

impl Injector for RegistryInjector {
    fn inject(&self, processor: &mut OperationProcessor) -> anyhow::Result<()> {
        let extension = processor.extension().name.clone();
        let operation = processor.operation().name.clone();
        let executor = self
            .components
            .executor(&extension, &operation)
            .ok_or_else(|| {
                anyhow::anyhow!("no executor registered for '{extension}/{operation}'")
            })?;
        processor.inject_executor(executor);
        Ok(())
    }
}
