use crate::types::{OrgId, SeriesId};
use std::sync::Arc;

/// Structured, in-process event hook for observability.
///
/// This crate is a library; emitting logs directly (e.g. `println!`) is not
/// acceptable for production. Instead, callers can provide an implementation
/// that forwards these events to `tracing`, `log`, metrics, or custom sinks.
pub trait IdxEventListener: std::fmt::Debug + Send + Sync + 'static {
    fn on_event(&self, event: IdxEvent);
}

/// Structured events emitted by the core.
#[derive(Debug, Clone)]
pub enum IdxEvent {
    SeriesAdded { org: OrgId, id: SeriesId },
    SeriesUpdated { org: OrgId, id: SeriesId },
    SeriesDeleted { org: OrgId, id: SeriesId },

    CardinalityLimitHit { org: OrgId, limit: u64 },
}

#[derive(Debug)]
pub struct NoopEventListener;

impl IdxEventListener for NoopEventListener {
    #[inline]
    fn on_event(&self, _event: IdxEvent) {}
}

pub fn noop_event_listener() -> Arc<dyn IdxEventListener> {
    Arc::new(NoopEventListener)
}
