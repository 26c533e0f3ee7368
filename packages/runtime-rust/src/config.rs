/// Runtime configuration for binding and invocation.
///
/// Controls invocation timeouts, concurrency limits, and paged result buffering.
#[derive(Debug, Clone)]
pub struct BinderConfig {
    /// Timeout applied by the invocation pipeline, in milliseconds.
    pub invocation_timeout_ms: u64,
    /// Maximum number of concurrent invocations before load shedding.
    pub max_concurrent_invocations: u32,
    /// Item limit of repeatable cursors created by the default factory.
    pub cursor_buffer_items: usize,
    /// Whether paged operations default to repeatable cursors instead of
    /// streaming ones.
    pub repeatable_cursors: bool,
}

impl Default for BinderConfig {
    fn default() -> Self {
        Self {
            invocation_timeout_ms: 30_000,
            max_concurrent_invocations: 1000,
            cursor_buffer_items: 10_000,
            repeatable_cursors: false,
        }
    }
}
