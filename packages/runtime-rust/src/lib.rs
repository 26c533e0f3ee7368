//! opbind runtime: turns declared operations into executable processors.
//!
//! Binding takes an operation declaration, raw parameter values and an
//! optional configuration provider, and produces an [`OperationProcessor`]
//! with parameters resolved into static or per-event resolvers and a
//! per-event configuration lookup.

pub mod config;
pub mod configuration;
pub mod error;
pub mod event;
pub mod logging;
pub mod processor;
pub mod resolver;

pub use config::BinderConfig;
pub use configuration::{
    ConfigurationBinder, ConfigurationInstance, ConfigurationLookup, ConfigurationProvider,
    ConfigurationRegistry, DynamicConfigurationProvider, ExtensionConfigurationRegistry,
    NoConfiguration, StaticConfigurationProvider,
};
pub use error::{BindError, CursorError, InvocationError, ResolutionError};
pub use event::{Event, Payload};
pub use processor::{
    build_invocation_pipeline, BuildRequest, ComponentRegistry, OperationBinder,
    OperationProcessor, OperationProcessorFactory, ProcessorKind,
};
pub use resolver::{ParametersResolver, RawParameterMap, ResolverSet, ValueResolver};
