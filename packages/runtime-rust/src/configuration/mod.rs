//! Configuration instances, providers and per-event configuration lookup.
//!
//! - [`instance`]: the instances themselves and the providers that produce
//!   them.
//! - [`registry`]: per-extension provider registry and implicit defaults.
//! - [`binder`]: the ordered precedence deciding which instance backs a call.

pub mod binder;
pub mod instance;
pub mod registry;

use std::sync::Arc;

pub use binder::ConfigurationBinder;
pub use instance::{
    ConfigurationInstance, ConfigurationProvider, DynamicConfigurationProvider,
    StaticConfigurationProvider,
};
pub use registry::{ConfigurationRegistry, ExtensionConfigurationRegistry};

use crate::error::ResolutionError;
use crate::event::Event;

/// Per-event configuration lookup captured by resolvers and processors.
pub trait ConfigurationLookup: Send + Sync {
    /// Returns the configuration instance active for `event`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError`] when a provider fails to produce its
    /// instance.
    fn lookup(&self, event: &Event) -> Result<Option<Arc<ConfigurationInstance>>, ResolutionError>;
}

impl<F> ConfigurationLookup for F
where
    F: Fn(&Event) -> Result<Option<Arc<ConfigurationInstance>>, ResolutionError> + Send + Sync,
{
    fn lookup(&self, event: &Event) -> Result<Option<Arc<ConfigurationInstance>>, ResolutionError> {
        self(event)
    }
}

/// Lookup that never finds a configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoConfiguration;

impl ConfigurationLookup for NoConfiguration {
    fn lookup(&self, _event: &Event) -> Result<Option<Arc<ConfigurationInstance>>, ResolutionError> {
        Ok(None)
    }
}
