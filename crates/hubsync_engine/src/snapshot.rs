//! Validity snapshots for foreign-key pruning.
//!
//! A snapshot holds, per entity type, the ids known to exist in the
//! destination. Transformers consult it to decide whether a reference may
//! be written; a miss nulls the reference instead of failing the record.

use crate::destination::DestinationStore;
use crate::entity::EntityKind;
use crate::sanitize::canonical_id;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Per-entity sets of valid identifiers.
#[derive(Debug, Default)]
pub struct ForeignKeySnapshot {
    sets: HashMap<EntityKind, HashSet<String>>,
}

impl ForeignKeySnapshot {
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-loads the ids of `kind` from the destination.
    ///
    /// Reads only the identifier column, `page_size` rows at a time, until an
    /// empty page. The destination may return fewer rows than asked for
    /// (PostgREST caps responses at its max-rows setting), so the offset
    /// advances by the rows actually read. A failing read keeps whatever was
    /// loaded so far; the remaining references will simply not validate.
    /// Returns the set size.
    pub fn load(
        &mut self,
        kind: EntityKind,
        store: &dyn DestinationStore,
        page_size: usize,
    ) -> usize {
        let page_size = page_size.max(1);
        let table = kind.table();
        let id_column = kind.id_column();
        let set = self.sets.entry(kind).or_default();
        let mut offset = 0;

        loop {
            let page = match store.scan_ids(table, id_column, offset, page_size) {
                Ok(page) => page,
                Err(err) => {
                    warn!(%table, offset, error = %err, "id scan failed, snapshot is partial");
                    break;
                }
            };
            let read = page.len();
            if read == 0 {
                break;
            }
            set.extend(page.iter().filter_map(canonical_id));
            debug!(%table, offset, read, "scanned id page");
            offset += read;
        }

        set.len()
    }

    /// Records `id` as valid for `kind`.
    pub fn insert(&mut self, kind: EntityKind, id: impl Into<String>) {
        self.sets.entry(kind).or_default().insert(id.into());
    }

    /// Returns true if `id` is a known `kind` identifier.
    pub fn contains(&self, kind: EntityKind, id: &str) -> bool {
        self.sets.get(&kind).is_some_and(|set| set.contains(id))
    }

    /// Passes `id` through if it is valid for `kind`, otherwise returns `None`.
    pub fn validate(&self, kind: EntityKind, id: Option<String>) -> Option<String> {
        id.filter(|id| self.contains(kind, id))
    }

    /// Number of ids held for `kind`.
    pub fn len(&self, kind: EntityKind) -> usize {
        self.sets.get(&kind).map_or(0, HashSet::len)
    }

    /// Returns true if no ids are held for any kind.
    pub fn is_empty(&self) -> bool {
        self.sets.values().all(HashSet::is_empty)
    }

    /// Drops the set for `kind` and frees its memory.
    pub fn release(&mut self, kind: EntityKind) {
        if let Some(set) = self.sets.remove(&kind) {
            debug!(%kind, ids = set.len(), "released validity set");
        }
    }

    /// Kinds that currently hold a set.
    pub fn loaded_kinds(&self) -> Vec<EntityKind> {
        let mut kinds: Vec<_> = self.sets.keys().copied().collect();
        kinds.sort();
        kinds
    }
}
