//! # hubsync Protocol
//!
//! Wire types for the HubSpot CRM v3 endpoints the sync engine reads from.
//!
//! This crate provides:
//! - `SourceRecord`, the raw CRM object as returned by list, search and batch-read calls
//! - `Associations` for the linkage HubSpot reports between objects
//! - `ListEndpoint` for cursor-paginated listings (GET or POST style)
//! - `SearchRequest` for filtered search pagination
//! - `BatchReadRequest` / `BatchReadResponse` for association lookups
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod listing;
mod messages;
mod record;

pub use listing::{ListEndpoint, ListMethod};
pub use messages::{
    BatchInput, BatchReadRequest, BatchReadResponse, Filter, FilterGroup, FilterOperator,
    ListPage, NextPage, Paging, SearchRequest,
};
pub use record::{AssociatedId, AssociationList, Associations, SourceRecord};
