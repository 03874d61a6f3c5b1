//! # hubsync Engine
//!
//! Incremental sync from the HubSpot CRM API into a PostgREST destination.
//!
//! This crate provides:
//! - Watermark-based full/incremental mode selection
//! - Lazy pagination over listing and search endpoints, with association enrichment
//! - Foreign-key validity snapshots that null dangling references
//! - Typed row transformers, one per entity type
//! - Streaming batch upserts with per-table counters
//! - A dependency-ordered orchestrator with a phase state machine
//! - HTTP transport and PostgREST store abstractions, plus in-memory doubles
//!
//! ## Architecture
//!
//! A run resolves its mode first, then loads entity types in reference order:
//! owners, pipelines and stages, contacts, deals, line items, commissions.
//! Each type streams page by page from the source through its transformer
//! into the sink, so memory stays bounded by one page plus one batch.
//!
//! ## Key Invariants
//!
//! - A reference column holds an id only if that id is in the validity snapshot
//! - Every row carries `_extracted_at` and `_source_system`
//! - A failing table never stops later tables
//! - Upserts are idempotent by conflict key

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod destination;
mod enrich;
mod entity;
mod error;
mod http;
mod mode;
mod orchestrator;
mod pagination;
mod postgrest;
mod records;
mod report;
pub mod sanitize;
mod sink;
mod snapshot;
mod transform;
mod transport;

pub use config::{SyncConfig, DEFAULT_HUBSPOT_BASE_URL};
pub use destination::{DestinationStore, MemoryStore, EXTRACTED_AT_COLUMN};
pub use enrich::AssociationEnricher;
pub use entity::EntityKind;
pub use error::{SyncError, SyncResult};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, HubSpotTransport};
pub use mode::{SyncMode, SyncModeResolver, SyncPlan};
pub use orchestrator::{SyncOrchestrator, SyncPhase};
pub use pagination::{PaginatedSource, RecordStream};
pub use postgrest::PostgrestStore;
pub use records::{
    CommissionRow, ContactRow, DealRow, LineItemRow, OwnerRow, PipelineRow, PipelineStageRow,
    Provenance,
};
pub use report::{SyncReport, TableReport};
pub use sink::StreamingUpsertSink;
pub use snapshot::ForeignKeySnapshot;
pub use transform::{
    CommissionTransformer, ContactTransformer, DealTransformer, EntityTransformer,
    LineItemTransformer, OwnerTransformer, PipelineTransformer, CONTACT_ASSOCIATION,
    DEAL_ASSOCIATION,
};
pub use transport::{MockTransport, SourceCall, SourceTransport};
