//! Load-shedding middleware for invocations.
//!
//! Invocations beyond `max_concurrent_invocations` fail fast with
//! `InvocationError::Overloaded`; nothing is queued.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::Semaphore;
use tower::{Layer, Service};
use tracing::warn;

use crate::error::InvocationError;
use crate::event::Event;

/// Limits in-flight invocations across every service built from this layer.
///
/// Services produced by one layer share its permits, so a layer applied to
/// several processors bounds their combined concurrency.
#[derive(Debug, Clone)]
pub struct LoadShedLayer {
    permits: Arc<Semaphore>,
    limit: u32,
}

impl LoadShedLayer {
    #[must_use]
    pub fn new(max_concurrent: u32) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent as usize)),
            limit: max_concurrent,
        }
    }

    /// Permits currently free.
    #[must_use]
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

impl<S> Layer<S> for LoadShedLayer {
    type Service = LoadShedService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoadShedService {
            inner,
            permits: Arc::clone(&self.permits),
            limit: self.limit,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadShedService<S> {
    inner: S,
    permits: Arc<Semaphore>,
    limit: u32,
}

impl<S> Service<Event> for LoadShedService<S>
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
        let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
            warn!(
                correlation_id = %event.correlation_id(),
                limit = self.limit,
                "invocation shed"
            );
            ::metrics::counter!("opbind_invocations_shed_total").increment(1);
            return Box::pin(async { Err(InvocationError::Overloaded) });
        };

        let invocation = self.inner.call(event);
        Box::pin(async move {
            let _permit = permit;
            invocation.await
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tower::ServiceExt;

    use super::*;

    #[derive(Clone)]
    struct Sleeper {
        delay_ms: u64,
    }

    impl Service<Event> for Sleeper {
        type Response = Event;
        type Error = InvocationError;
        type Future = Pin<Box<dyn Future<Output = Result<Event, InvocationError>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, event: Event) -> Self::Future {
            let delay = self.delay_ms;
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok(event)
            })
        }
    }

    #[tokio::test]
    async fn permits_are_returned_after_completion() {
        let layer = LoadShedLayer::new(2);
        let svc = layer.layer(Sleeper { delay_ms: 1 });
        assert!(svc.oneshot(Event::default()).await.is_ok());
        assert_eq!(layer.available(), 2);
    }

    #[tokio::test]
    async fn sheds_across_services_of_one_layer() {
        let layer = LoadShedLayer::new(1);
        let mut busy = layer.layer(Sleeper { delay_ms: 200 });
        let in_flight = tokio::spawn(busy.call(Event::default()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(layer.available(), 0);

        let other = layer.layer(Sleeper { delay_ms: 1 });
        let err = other.oneshot(Event::default()).await.unwrap_err();
        assert!(matches!(err, InvocationError::Overloaded));

        assert!(in_flight.await.unwrap().is_ok());
        assert_eq!(layer.available(), 1);
    }
}
