//! Cursors over paged operation results.
//!
//! A [`PagedCursor`] fetches pages lazily from a [`PagingProvider`], taking a
//! connection from the [`ConnectionSupplier`] for each page and releasing it
//! right after. A [`CursorProviderFactory`] wraps the cursor into a
//! [`CursorProvider`], which decides whether results can be read once
//! (streaming) or replayed (repeatable).

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use futures_util::stream::{self, Stream};
use opbind_core::Value;
use tracing::{debug, warn};

use crate::configuration::ConfigurationInstance;
use crate::error::CursorError;
use crate::processor::{Connection, ConnectionSupplier, PagingProvider};

// ---------------------------------------------------------------------------
// PagedCursor
// ---------------------------------------------------------------------------

/// Lazily fetches pages and yields their items in order.
///
/// The paging provider is closed exactly once: when the results run out, when
/// a page fetch fails, on [`PagedCursor::close`], or in the background when
/// the cursor is dropped early.
pub struct PagedCursor {
    operation: String,
    /// `None` once the provider has been closed.
    provider: Option<Box<dyn PagingProvider>>,
    connections: Arc<dyn ConnectionSupplier>,
    configuration: Option<Arc<ConfigurationInstance>>,
    buffer: VecDeque<Value>,
    pages_fetched: usize,
}

impl PagedCursor {
    #[must_use]
    pub fn new(
        operation: impl Into<String>,
        provider: Box<dyn PagingProvider>,
        connections: Arc<dyn ConnectionSupplier>,
        configuration: Option<Arc<ConfigurationInstance>>,
    ) -> Self {
        Self {
            operation: operation.into(),
            provider: Some(provider),
            connections,
            configuration,
            buffer: VecDeque::new(),
            pages_fetched: 0,
        }
    }

    /// Returns the next item, fetching a page when the buffer runs dry.
    ///
    /// A failed page fetch ends the results: the error is returned once and
    /// later calls yield `None`.
    ///
    /// # Errors
    ///
    /// Returns [`CursorError::Connection`] or [`CursorError::Page`] when a page
    /// cannot be fetched.
    pub async fn next_item(&mut self) -> Result<Option<Value>, CursorError> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Ok(Some(item));
            }
            if self.provider.is_none() {
                return Ok(None);
            }
            self.fetch_page().await?;
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.provider.is_none()
    }

    /// Closes the paging provider and discards buffered items. Closing an
    /// already closed cursor does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`CursorError::Connection`] when no connection can be obtained
    /// for the close, or [`CursorError::Page`] when the provider fails to close.
    pub async fn close(&mut self) -> Result<(), CursorError> {
        self.buffer.clear();
        if self.provider.is_none() {
            return Ok(());
        }
        let connection = self
            .connections
            .connect(self.configuration.clone())
            .await
            .map_err(CursorError::Connection)?;
        debug!(operation = %self.operation, pages = self.pages_fetched, "closing paged cursor");
        self.finish(connection).await
    }

    /// Puts an item back at the front of the buffer.
    fn unread(&mut self, item: Value) {
        self.buffer.push_front(item);
    }

    async fn fetch_page(&mut self) -> Result<(), CursorError> {
        let connection = self
            .connections
            .connect(self.configuration.clone())
            .await
            .map_err(CursorError::Connection)?;

        let Some(provider) = self.provider.as_mut() else {
            self.connections.release(connection).await;
            return Ok(());
        };
        let fetched = provider.next_page(&connection).await;

        match fetched {
            Ok(page) if !page.is_empty() => {
                self.pages_fetched += 1;
                self.buffer.extend(page);
                self.connections.release(connection).await;
                Ok(())
            }
            Ok(_) => {
                debug!(
                    operation = %self.operation,
                    pages = self.pages_fetched,
                    "paged results exhausted"
                );
                self.finish(connection).await
            }
            Err(e) => {
                if let Err(close_err) = self.finish(connection).await {
                    warn!(operation = %self.operation, error = %close_err, "failed to close paging provider");
                }
                Err(CursorError::Page(e))
            }
        }
    }

    /// Closes the provider over `connection`, then releases the connection.
    async fn finish(&mut self, connection: Connection) -> Result<(), CursorError> {
        let closed = match self.provider.take() {
            Some(mut provider) => provider.close(&connection).await.map_err(CursorError::Page),
            None => Ok(()),
        };
        self.connections.release(connection).await;
        closed
    }
}

impl Drop for PagedCursor {
    fn drop(&mut self) {
        let Some(mut provider) = self.provider.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(operation = %self.operation, "paged cursor dropped outside a runtime, provider left open");
            return;
        };
        let connections = Arc::clone(&self.connections);
        let configuration = self.configuration.clone();
        let operation = std::mem::take(&mut self.operation);
        runtime.spawn(async move {
            match connections.connect(configuration).await {
                Ok(connection) => {
                    if let Err(e) = provider.close(&connection).await {
                        warn!(%operation, error = %e, "failed to close abandoned paging provider");
                    }
                    connections.release(connection).await;
                    debug!(%operation, "closed abandoned paged cursor");
                }
                Err(e) => {
                    warn!(%operation, error = %e, "no connection to close abandoned paging provider");
                }
            }
        });
    }
}

impl fmt::Debug for PagedCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PagedCursor")
            .field("operation", &self.operation)
            .field("pages_fetched", &self.pages_fetched)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// CursorProvider
// ---------------------------------------------------------------------------

/// Whether a cursor provider can be opened more than once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorKind {
    Streaming,
    Repeatable,
}

struct ReplayBuffer {
    source: PagedCursor,
    items: Vec<Value>,
    complete: bool,
    limit: usize,
}

#[derive(Clone)]
enum ProviderState {
    Streaming(Arc<parking_lot::Mutex<Option<PagedCursor>>>),
    Repeatable(Arc<tokio::sync::Mutex<ReplayBuffer>>),
}

/// Handle to paged results, placed into an event payload or variable.
#[derive(Clone)]
pub struct CursorProvider {
    state: ProviderState,
}

impl CursorProvider {
    #[must_use]
    pub fn kind(&self) -> CursorKind {
        match self.state {
            ProviderState::Streaming(_) => CursorKind::Streaming,
            ProviderState::Repeatable(_) => CursorKind::Repeatable,
        }
    }

    /// Opens a cursor over the results.
    ///
    /// # Errors
    ///
    /// Returns [`CursorError::Consumed`] when a streaming provider is opened a
    /// second time.
    pub fn open(&self) -> Result<Cursor, CursorError> {
        match &self.state {
            ProviderState::Streaming(slot) => slot
                .lock()
                .take()
                .map(|cursor| Cursor {
                    inner: CursorInner::Streaming(cursor),
                })
                .ok_or(CursorError::Consumed),
            ProviderState::Repeatable(buffer) => Ok(Cursor {
                inner: CursorInner::Repeatable {
                    buffer: Arc::clone(buffer),
                    position: 0,
                },
            }),
        }
    }
}

impl CursorProvider {
    /// Closes the underlying paging provider.
    ///
    /// An unopened streaming provider becomes consumed. A repeatable provider
    /// keeps what it already buffered; later opens replay only those items.
    ///
    /// # Errors
    ///
    /// See [`PagedCursor::close`].
    pub async fn close(&self) -> Result<(), CursorError> {
        match &self.state {
            ProviderState::Streaming(slot) => {
                let unopened = slot.lock().take();
                match unopened {
                    Some(mut cursor) => cursor.close().await,
                    None => Ok(()),
                }
            }
            ProviderState::Repeatable(buffer) => {
                let mut buffer = buffer.lock().await;
                buffer.complete = true;
                buffer.source.close().await
            }
        }
    }
}

impl fmt::Debug for CursorProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CursorProvider")
            .field("kind", &self.kind())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Cursor
// ---------------------------------------------------------------------------

enum CursorInner {
    Streaming(PagedCursor),
    Repeatable {
        buffer: Arc<tokio::sync::Mutex<ReplayBuffer>>,
        position: usize,
    },
}

/// An open read position over paged results.
pub struct Cursor {
    inner: CursorInner,
}

impl Cursor {
    /// Returns the next item, or `None` once the results are exhausted.
    ///
    /// # Errors
    ///
    /// Page fetch failures, or [`CursorError::BufferLimitExceeded`] when a
    /// repeatable cursor would buffer more items than allowed.
    pub async fn next(&mut self) -> Result<Option<Value>, CursorError> {
        match &mut self.inner {
            CursorInner::Streaming(cursor) => cursor.next_item().await,
            CursorInner::Repeatable { buffer, position } => {
                let mut buffer = buffer.lock().await;
                if let Some(item) = buffer.items.get(*position) {
                    *position += 1;
                    return Ok(Some(item.clone()));
                }
                if buffer.complete {
                    return Ok(None);
                }
                match buffer.source.next_item().await? {
                    Some(item) => {
                        if buffer.items.len() >= buffer.limit {
                            buffer.source.unread(item);
                            return Err(CursorError::BufferLimitExceeded {
                                limit: buffer.limit,
                            });
                        }
                        buffer.items.push(item.clone());
                        *position += 1;
                        Ok(Some(item))
                    }
                    None => {
                        buffer.complete = true;
                        Ok(None)
                    }
                }
            }
        }
    }

    /// Stops reading. A streaming cursor closes its paging provider; a
    /// repeatable cursor leaves the shared buffer to other readers.
    ///
    /// # Errors
    ///
    /// See [`PagedCursor::close`].
    pub async fn close(self) -> Result<(), CursorError> {
        match self.inner {
            CursorInner::Streaming(mut cursor) => cursor.close().await,
            CursorInner::Repeatable { .. } => Ok(()),
        }
    }

    /// Reads every remaining item.
    ///
    /// # Errors
    ///
    /// See [`Cursor::next`].
    pub async fn collect_all(mut self) -> Result<Vec<Value>, CursorError> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await? {
            items.push(item);
        }
        Ok(items)
    }

    /// Converts the cursor into a stream that ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<Value, CursorError>> + Send {
        stream::unfold(Some(self), |state| async move {
            let mut cursor = state?;
            match cursor.next().await {
                Ok(Some(item)) => Some((Ok(item), Some(cursor))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            CursorInner::Streaming(cursor) => f.debug_tuple("Cursor").field(cursor).finish(),
            CursorInner::Repeatable { position, .. } => f
                .debug_struct("Cursor")
                .field("position", position)
                .finish_non_exhaustive(),
        }
    }
}

// ---------------------------------------------------------------------------
// Factories
// ---------------------------------------------------------------------------

/// Wraps a paged cursor into a provider placed on the event.
pub trait CursorProviderFactory: Send + Sync + fmt::Debug {
    fn create(&self, cursor: PagedCursor) -> CursorProvider;
}

/// Results can be read exactly once.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamingCursorProviderFactory;

impl CursorProviderFactory for StreamingCursorProviderFactory {
    fn create(&self, cursor: PagedCursor) -> CursorProvider {
        CursorProvider {
            state: ProviderState::Streaming(Arc::new(parking_lot::Mutex::new(Some(cursor)))),
        }
    }
}

/// Results are buffered as they are read, so every `open` replays them from
/// the start.
#[derive(Debug, Clone, Copy)]
pub struct RepeatableCursorProviderFactory {
    pub max_buffered_items: usize,
}

impl RepeatableCursorProviderFactory {
    #[must_use]
    pub fn new(max_buffered_items: usize) -> Self {
        Self { max_buffered_items }
    }
}

impl CursorProviderFactory for RepeatableCursorProviderFactory {
    fn create(&self, cursor: PagedCursor) -> CursorProvider {
        CursorProvider {
            state: ProviderState::Repeatable(Arc::new(tokio::sync::Mutex::new(ReplayBuffer {
                source: cursor,
                items: Vec::new(),
                complete: false,
                limit: self.max_buffered_items,
            }))),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
