//! Metrics middleware for invocations.
//!
//! Records invocation duration and outcome in a `tracing` span and through the
//! `metrics` facade (`opbind_invocations_total`,
//! `opbind_invocation_duration_seconds`), labelled by extension and operation.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::error::InvocationError;
use crate::event::Event;

/// Instruments invocations of one bound operation.
#[derive(Debug, Clone)]
pub struct MetricsLayer {
    extension: Arc<str>,
    operation: Arc<str>,
}

impl MetricsLayer {
    #[must_use]
    pub fn new(extension: &str, operation: &str) -> Self {
        Self {
            extension: Arc::from(extension),
            operation: Arc::from(operation),
        }
    }
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService {
            inner,
            extension: Arc::clone(&self.extension),
            operation: Arc::clone(&self.operation),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
    extension: Arc<str>,
    operation: Arc<str>,
}

impl<S> Service<Event> for MetricsService<S>
where
    S: Service<Event, Response = Event, Error = InvocationError> + Send,
    S::Future: Send + 'static,
{
    type Response = Event;
    type Error = InvocationError;
    type Future = Pin<Box<dyn Future<Output = Result<Event, InvocationError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, event: Event) -> Self::Future {
        let extension = Arc::clone(&self.extension);
        let operation = Arc::clone(&self.operation);
        let span = info_span!(
            "invocation",
            extension = %extension,
            operation = %operation,
            correlation_id = %event.correlation_id(),
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let invocation = self.inner.call(event);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = invocation.await;
                let elapsed = start.elapsed();

                let outcome = match &result {
                    Ok(_) => "ok",
                    Err(err) => err.outcome(),
                };

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = elapsed.as_millis() as u64;
                let current = tracing::Span::current();
                current.record("duration_ms", duration_ms);
                current.record("outcome", outcome);

                ::metrics::counter!(
                    "opbind_invocations_total",
                    "extension" => extension.to_string(),
                    "operation" => operation.to_string(),
                    "outcome" => outcome
                )
                .increment(1);
                ::metrics::histogram!(
                    "opbind_invocation_duration_seconds",
                    "extension" => extension.to_string(),
                    "operation" => operation.to_string()
                )
                .record(elapsed.as_secs_f64());

                match &result {
                    Ok(_) => tracing::debug!(duration_ms, outcome, "invocation complete"),
                    Err(err) => tracing::debug!(duration_ms, outcome, error = %err, "invocation failed"),
                }

                result
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use opbind_core::Value;
    use tower::ServiceExt;

    use super::*;

    /// Marks the payload, or fails when the event carries a `fail` variable.
    struct Marker;

    impl Service<Event> for Marker {
        type Response = Event;
        type Error = InvocationError;
        type Future = Pin<Box<dyn Future<Output = Result<Event, InvocationError>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, mut event: Event) -> Self::Future {
            if event.variable("fail").is_some() {
                return Box::pin(async { Err(InvocationError::Overloaded) });
            }
            event.set_payload(Value::from("done"));
            Box::pin(async move { Ok(event) })
        }
    }

    #[tokio::test]
    async fn passes_response_through() {
        let svc = MetricsLayer::new("catalog", "search").layer(Marker);
        let resp = svc.oneshot(Event::default()).await.unwrap();
        assert_eq!(resp.payload().as_value(), Some(&Value::from("done")));
    }

    #[tokio::test]
    async fn passes_errors_through() {
        let svc = MetricsLayer::new("catalog", "search").layer(Marker);
        let err = svc
            .oneshot(Event::default().with_variable("fail", Value::Bool(true)))
            .await
            .unwrap_err();
        assert!(matches!(err, InvocationError::Overloaded));
    }
}
