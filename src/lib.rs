#![doc = include_str!("../README.md")]
// Declare modules
pub mod core;
pub mod error;
pub mod index;
pub mod query;
pub mod store;
pub mod telemetry;
pub mod types;

/// Configuration options for the metadata index.
pub use crate::core::IndexConfig;
/// Main entry point: the multi-tenant metric-metadata index.
pub use crate::core::MetaIndex;
/// Error type for index and query operations.
pub use crate::error::IdxError;
/// The inverted tag index structure.
pub use crate::index::TagIndex;
/// A compiled tag query clause.
pub use crate::query::TagExpr;
/// A compiled, validated tag query.
pub use crate::query::TagQuery;
/// Per-organization series metadata store.
pub use crate::store::SeriesStore;
/// Structured event hook for observability.
pub use crate::telemetry::{noop_event_listener, IdxEvent, IdxEventListener};
/// A metric series record as delivered by ingestion.
pub use crate::types::MetricRecord;
/// Stored metadata for one series.
pub use crate::types::SeriesMeta;
/// Organization (tenant) identifier.
pub use crate::types::OrgId;
/// Stable series identifier.
pub use crate::types::SeriesId;
