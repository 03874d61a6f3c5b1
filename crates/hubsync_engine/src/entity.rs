//! Entity types and their destination tables.

use std::fmt;

/// The entity types the engine synchronizes, in extraction order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    /// CRM users that own records.
    Owner,
    /// Deal pipelines.
    Pipeline,
    /// Stages of a deal pipeline.
    PipelineStage,
    /// Contacts.
    Contact,
    /// Deals.
    Deal,
    /// Deal line items.
    LineItem,
    /// Commission custom objects.
    Commission,
}

impl EntityKind {
    /// Every entity type, in dependency order.
    pub const ALL: [EntityKind; 7] = [
        EntityKind::Owner,
        EntityKind::Pipeline,
        EntityKind::PipelineStage,
        EntityKind::Contact,
        EntityKind::Deal,
        EntityKind::LineItem,
        EntityKind::Commission,
    ];

    /// Destination table name.
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Owner => "hubspot_owners",
            EntityKind::Pipeline => "hubspot_pipelines",
            EntityKind::PipelineStage => "hubspot_pipeline_stages",
            EntityKind::Contact => "hubspot_contacts",
            EntityKind::Deal => "hubspot_deals",
            EntityKind::LineItem => "hubspot_line_items",
            EntityKind::Commission => "hubspot_commissions_obj",
        }
    }

    /// Identity column, which is also the upsert conflict key.
    pub fn id_column(&self) -> &'static str {
        match self {
            EntityKind::PipelineStage => "stage_id",
            _ => "hubspot_id",
        }
    }

    /// Upsert conflict key.
    pub fn conflict_key(&self) -> &'static str {
        self.id_column()
    }

    /// Looks a kind up by its table name.
    pub fn from_table(table: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.table() == table)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Owner => "owners",
            EntityKind::Pipeline => "pipelines",
            EntityKind::PipelineStage => "pipeline stages",
            EntityKind::Contact => "contacts",
            EntityKind::Deal => "deals",
            EntityKind::LineItem => "line items",
            EntityKind::Commission => "commissions",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_table_uses_stage_id() {
        assert_eq!(EntityKind::PipelineStage.conflict_key(), "stage_id");
        assert_eq!(EntityKind::Deal.conflict_key(), "hubspot_id");
    }

    #[test]
    fn table_lookup_round_trips() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_table(kind.table()), Some(kind));
        }
        assert_eq!(EntityKind::from_table("nope"), None);
    }
}
