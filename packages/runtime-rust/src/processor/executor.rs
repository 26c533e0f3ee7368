//! Seams to the code that actually runs an operation: executors, paging
//! providers and connection suppliers.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use opbind_core::{ExtensionDeclaration, OperationDeclaration, Value};

use crate::configuration::ConfigurationInstance;
use crate::event::Event;
use crate::resolver::ResolverSetResult;

// ---------------------------------------------------------------------------
// Execution context and output
// ---------------------------------------------------------------------------

/// Everything an executor receives for one invocation.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub extension: Arc<ExtensionDeclaration>,
    pub operation: Arc<OperationDeclaration>,
    /// Resolved argument values, one per declared parameter.
    pub arguments: ResolverSetResult,
    pub configuration: Option<Arc<ConfigurationInstance>>,
    pub event: Event,
}

impl ExecutionContext {
    #[must_use]
    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments.get(name)
    }
}

/// What an executor produced.
pub enum OperationOutput {
    /// A complete result.
    Value(Value),
    /// A paged result, fetched lazily as the cursor is consumed.
    Paged(Box<dyn PagingProvider>),
}

impl OperationOutput {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            OperationOutput::Value(_) => "value",
            OperationOutput::Paged(_) => "paged",
        }
    }
}

impl fmt::Debug for OperationOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationOutput::Value(v) => f.debug_tuple("Value").field(v).finish(),
            OperationOutput::Paged(_) => f.write_str("Paged(..)"),
        }
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Runs an operation with resolved arguments.
#[async_trait]
pub trait OperationExecutor: Send + Sync {
    /// Executes the operation.
    ///
    /// # Errors
    ///
    /// Any failure of the underlying operation.
    async fn execute(&self, ctx: ExecutionContext) -> anyhow::Result<OperationOutput>;
}

/// Source of result pages for a paged operation.
#[async_trait]
pub trait PagingProvider: Send {
    /// Fetches the next page. An empty page means the results are exhausted.
    ///
    /// # Errors
    ///
    /// Any failure fetching the page.
    async fn next_page(&mut self, connection: &Connection) -> anyhow::Result<Vec<Value>>;

    /// Releases provider resources. Called once per provider: after the last
    /// page, after a failed fetch, or when the cursor is closed or dropped.
    ///
    /// # Errors
    ///
    /// Any failure releasing resources.
    async fn close(&mut self, _connection: &Connection) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A connection handed to a paging provider for one page fetch.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: u64,
    pub configuration: Option<Arc<ConfigurationInstance>>,
}

/// Hands out connections for page fetches.
#[async_trait]
pub trait ConnectionSupplier: Send + Sync {
    /// Obtains a connection for the given configuration.
    ///
    /// # Errors
    ///
    /// Any failure establishing the connection.
    async fn connect(
        &self,
        configuration: Option<Arc<ConfigurationInstance>>,
    ) -> anyhow::Result<Connection>;

    /// Returns a connection obtained from [`ConnectionSupplier::connect`].
    async fn release(&self, connection: Connection);
}

// ---------------------------------------------------------------------------
// In-memory implementations
// ---------------------------------------------------------------------------

/// Connection supplier that numbers connections and counts the open ones.
#[derive(Debug, Default)]
pub struct DefaultConnectionSupplier {
    next_id: AtomicU64,
    active: AtomicUsize,
}

impl DefaultConnectionSupplier {
    /// Total connections handed out so far.
    #[must_use]
    pub fn connections_opened(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst)
    }

    /// Connections handed out and not yet released.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionSupplier for DefaultConnectionSupplier {
    async fn connect(
        &self,
        configuration: Option<Arc<ConfigurationInstance>>,
    ) -> anyhow::Result<Connection> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.active.fetch_add(1, Ordering::SeqCst);
        Ok(Connection { id, configuration })
    }

    async fn release(&self, _connection: Connection) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Executor backed by a synchronous closure.
pub struct FnExecutor<F> {
    f: F,
}

impl<F> FnExecutor<F>
where
    F: Fn(ExecutionContext) -> anyhow::Result<OperationOutput> + Send + Sync,
{
    #[must_use]
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> OperationExecutor for FnExecutor<F>
where
    F: Fn(ExecutionContext) -> anyhow::Result<OperationOutput> + Send + Sync,
{
    async fn execute(&self, ctx: ExecutionContext) -> anyhow::Result<OperationOutput> {
        (self.f)(ctx)
    }
}

/// Paging provider serving pre-built pages.
#[derive(Debug, Default)]
pub struct VecPagingProvider {
    pages: VecDeque<Vec<Value>>,
}

impl VecPagingProvider {
    #[must_use]
    pub fn new(pages: Vec<Vec<Value>>) -> Self {
        Self {
            pages: pages.into(),
        }
    }
}

#[async_trait]
impl PagingProvider for VecPagingProvider {
    async fn next_page(&mut self, _connection: &Connection) -> anyhow::Result<Vec<Value>> {
        Ok(self.pages.pop_front().unwrap_or_default())
    }
}
