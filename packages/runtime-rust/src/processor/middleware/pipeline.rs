//! Pipeline composition: combines all middleware layers into a single service stack.

use tower::ServiceBuilder;

use super::load_shed::LoadShedLayer;
use super::metrics::MetricsLayer;
use super::timeout::TimeoutLayer;
use crate::config::BinderConfig;
use crate::error::InvocationError;
use crate::event::Event;
use crate::processor::OperationProcessor;

/// Wraps a bound processor with the invocation middleware.
///
/// Layer order (outermost to innermost):
/// 1. `LoadShedLayer` -- reject when overloaded (fail fast before doing any work)
/// 2. `TimeoutLayer` -- enforce the invocation timeout
/// 3. `MetricsLayer` -- record timing and outcome (closest to the processor)
///
/// The returned service implements `tower::Service<Event>`.
#[must_use]
pub fn build_invocation_pipeline(
    processor: OperationProcessor,
    config: &BinderConfig,
) -> impl tower::Service<Event, Response = Event, Error = InvocationError> + Clone {
    let metrics = MetricsLayer::new(&processor.extension().name, &processor.operation().name);
    ServiceBuilder::new()
        .layer(LoadShedLayer::new(config.max_concurrent_invocations))
        .layer(TimeoutLayer::new(config.invocation_timeout_ms))
        .layer(metrics)
        .service(processor)
}
