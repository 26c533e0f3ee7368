//! Timeout middleware for invocations.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tower::{Layer, Service};
use tracing::warn;

use crate::error::InvocationError;
use crate::event::Event;

/// Bounds every invocation by a fixed deadline. A deadline of 0 disables the
/// bound.
#[derive(Debug, Clone)]
pub struct TimeoutLayer {
    timeout_ms: u64,
}

impl TimeoutLayer {
    #[must_use]
    pub fn new(timeout_ms: u64) -> Self {
        Self { timeout_ms }
    }
}

impl<S> Layer<S> for TimeoutLayer {
    type Service = TimeoutService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimeoutService {
            inner,
            timeout_ms: self.timeout_ms,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimeoutService<S> {
    inner: S,
    timeout_ms: u64,
}

impl<S> Service<Event> for TimeoutService<S>
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
        let timeout_ms = self.timeout_ms;
        let correlation_id = event.correlation_id();
        let invocation = self.inner.call(event);
        if timeout_ms == 0 {
            return Box::pin(invocation);
        }

        Box::pin(async move {
            let deadline = Duration::from_millis(timeout_ms);
            if let Ok(result) = tokio::time::timeout(deadline, invocation).await {
                result
            } else {
                warn!(%correlation_id, timeout_ms, "invocation timed out");
                ::metrics::counter!("opbind_invocations_timed_out_total").increment(1);
                Err(InvocationError::Timeout { timeout_ms })
            }
        })
    }
}
