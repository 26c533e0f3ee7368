//! Operation processors: construction, invocation and paged results.
//!
//! - [`binder`]: `bind(BuildRequest)` entry point
//! - [`factory`]: variant selection and injection
//! - [`operation`]: the built processors
//! - [`cursor`]: lazily fetched paged results
//! - [`executor`]: seams to the code that runs an operation
//! - [`components`]: component registry and injection step
//! - [`middleware`]: tower layers wrapping a processor

pub mod binder;
pub mod components;
pub mod cursor;
pub mod executor;
pub mod factory;
pub mod middleware;
pub mod operation;

pub use binder::{BuildRequest, OperationBinder};
pub use components::{ComponentRegistry, Injector, RegistryInjector};
pub use cursor::{
    Cursor, CursorKind, CursorProvider, CursorProviderFactory, PagedCursor,
    RepeatableCursorProviderFactory, StreamingCursorProviderFactory,
};
pub use executor::{
    Connection, ConnectionSupplier, DefaultConnectionSupplier, ExecutionContext, FnExecutor,
    OperationExecutor, OperationOutput, PagingProvider, VecPagingProvider,
};
pub use factory::OperationProcessorFactory;
pub use middleware::build_invocation_pipeline;
pub use operation::{
    OperationProcessor, PagedOperationProcessor, ProcessorCore, ProcessorKind,
    StandardOperationProcessor,
};
