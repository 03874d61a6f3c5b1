//! Raw record to destination row transformers.
//!
//! Each transformer maps one raw source record to at most one typed row.
//! Malformed scalars become absent columns and references the snapshot
//! does not know become absent references; only a record without a usable
//! id is dropped.

use crate::entity::EntityKind;
use crate::records::{
    CommissionRow, ContactRow, DealRow, LineItemRow, OwnerRow, PipelineRow, PipelineStageRow,
    Provenance,
};
use crate::sanitize::{canonical_id, safe_float, safe_int, safe_str, timestamp_value, truncate_date};
use crate::snapshot::ForeignKeySnapshot;
use hubsync_protocol::SourceRecord;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

/// Association type under which deals list their contacts.
pub const CONTACT_ASSOCIATION: &str = "contacts";
/// Association type under which line items list their deals.
pub const DEAL_ASSOCIATION: &str = "deals";

/// Maps raw records of one entity type to destination rows.
pub trait EntityTransformer {
    /// The destination row type.
    type Row: Serialize;

    /// The entity type this transformer produces.
    fn kind(&self) -> EntityKind;

    /// Transforms one record, registering its id in `snapshot` when other
    /// entity types may reference it.
    ///
    /// Returns `None` only when the record has no usable id.
    fn transform(&self, raw: SourceRecord, snapshot: &mut ForeignKeySnapshot) -> Option<Self::Row>;
}

fn record_id(kind: EntityKind, raw: &SourceRecord) -> Option<String> {
    let id = canonical_id(&raw.id);
    if id.is_none() {
        debug!(%kind, "discarding record without id");
    }
    id
}

fn property_id(raw: &SourceRecord, name: &str) -> Option<String> {
    raw.property(name).and_then(canonical_id)
}

fn raw_blob(properties: &Map<String, Value>) -> String {
    serde_json::to_string(properties).unwrap_or_else(|_| String::from("{}"))
}

/// Transforms owners.
#[derive(Debug, Clone)]
pub struct OwnerTransformer {
    provenance: Provenance,
}

impl OwnerTransformer {
    /// Creates a transformer stamping rows with `provenance`.
    pub fn new(provenance: Provenance) -> Self {
        Self { provenance }
    }
}

impl EntityTransformer for OwnerTransformer {
    type Row = OwnerRow;

    fn kind(&self) -> EntityKind {
        EntityKind::Owner
    }

    fn transform(&self, raw: SourceRecord, snapshot: &mut ForeignKeySnapshot) -> Option<OwnerRow> {
        let id = record_id(EntityKind::Owner, &raw)?;
        snapshot.insert(EntityKind::Owner, id.clone());
        Some(OwnerRow {
            hubspot_id: id,
            email: safe_str(raw.field("email")),
            first_name: safe_str(raw.field("firstName")),
            last_name: safe_str(raw.field("lastName")),
            provenance: self.provenance.clone(),
        })
    }
}

/// Transforms pipelines and the stages nested in them.
#[derive(Debug, Clone)]
pub struct PipelineTransformer {
    provenance: Provenance,
    object_type: String,
}

impl PipelineTransformer {
    /// Creates a transformer for pipelines of `object_type`.
    pub fn new(provenance: Provenance, object_type: impl Into<String>) -> Self {
        Self {
            provenance,
            object_type: object_type.into(),
        }
    }

    /// Splits a pipeline payload into its own row and one row per stage.
    ///
    /// Stages without an id are skipped; every kept stage id is registered
    /// in the stage set.
    pub fn split(
        &self,
        raw: SourceRecord,
        snapshot: &mut ForeignKeySnapshot,
    ) -> Option<(PipelineRow, Vec<PipelineStageRow>)> {
        let stages = raw.field("stages").cloned();
        let pipeline = self.transform(raw, snapshot)?;

        let stages = match stages {
            Some(Value::Array(stages)) => stages,
            _ => Vec::new(),
        };
        let stage_rows = stages
            .iter()
            .filter_map(|stage| {
                let stage_id = stage.get("id").and_then(canonical_id)?;
                snapshot.insert(EntityKind::PipelineStage, stage_id.clone());
                Some(PipelineStageRow {
                    stage_id,
                    pipeline_id: pipeline.hubspot_id.clone(),
                    label: safe_str(stage.get("label")),
                    display_order: safe_int(stage.get("displayOrder")),
                    provenance: self.provenance.clone(),
                })
            })
            .collect();
        Some((pipeline, stage_rows))
    }
}

impl EntityTransformer for PipelineTransformer {
    type Row = PipelineRow;

    fn kind(&self) -> EntityKind {
        EntityKind::Pipeline
    }

    fn transform(
        &self,
        raw: SourceRecord,
        snapshot: &mut ForeignKeySnapshot,
    ) -> Option<PipelineRow> {
        let id = record_id(EntityKind::Pipeline, &raw)?;
        snapshot.insert(EntityKind::Pipeline, id.clone());
        Some(PipelineRow {
            hubspot_id: id,
            label: safe_str(raw.field("label")),
            object_type: self.object_type.clone(),
            provenance: self.provenance.clone(),
        })
    }
}

/// Transforms contacts.
#[derive(Debug, Clone)]
pub struct ContactTransformer {
    provenance: Provenance,
}

impl ContactTransformer {
    /// Properties requested from the source.
    pub const PROPERTIES: &'static [&'static str] = &[
        "firstname",
        "lastname",
        "email",
        "phone",
        "lifecyclestage",
        "hubspot_owner_id",
        "hs_lastmodifieddate",
    ];

    /// Creates a transformer stamping rows with `provenance`.
    pub fn new(provenance: Provenance) -> Self {
        Self { provenance }
    }
}

impl EntityTransformer for ContactTransformer {
    type Row = ContactRow;

    fn kind(&self) -> EntityKind {
        EntityKind::Contact
    }

    fn transform(&self, raw: SourceRecord, snapshot: &mut ForeignKeySnapshot) -> Option<ContactRow> {
        let id = record_id(EntityKind::Contact, &raw)?;
        snapshot.insert(EntityKind::Contact, id.clone());
        Some(ContactRow {
            hubspot_id: id,
            email: safe_str(raw.property("email")),
            first_name: safe_str(raw.property("firstname")),
            last_name: safe_str(raw.property("lastname")),
            phone: safe_str(raw.property("phone")),
            lifecycle_stage: safe_str(raw.property("lifecyclestage")),
            owner_id: snapshot.validate(EntityKind::Owner, property_id(&raw, "hubspot_owner_id")),
            created_at: timestamp_value(Some(&raw.created_at)),
            updated_at: timestamp_value(Some(&raw.updated_at)),
            archived: raw.is_archived(),
            provenance: self.provenance.clone(),
        })
    }
}

/// Transforms deals.
#[derive(Debug, Clone)]
pub struct DealTransformer {
    provenance: Provenance,
}

impl DealTransformer {
    /// Properties requested from the source. Those without a column of
    /// their own are kept in `raw_data`.
    pub const PROPERTIES: &'static [&'static str] = &[
        "dealname",
        "amount",
        "closedate",
        "createdate",
        "pipeline",
        "dealstage",
        "hubspot_owner_id",
        "produto",
        "unidade",
        "segmento",
        "tempo_de_contrato",
        "tipo_de_fechamento",
        "e_venda_de_impacto_",
        "hs_lastmodifieddate",
    ];

    /// Creates a transformer stamping rows with `provenance`.
    pub fn new(provenance: Provenance) -> Self {
        Self { provenance }
    }
}

impl EntityTransformer for DealTransformer {
    type Row = DealRow;

    fn kind(&self) -> EntityKind {
        EntityKind::Deal
    }

    fn transform(&self, raw: SourceRecord, snapshot: &mut ForeignKeySnapshot) -> Option<DealRow> {
        let id = record_id(EntityKind::Deal, &raw)?;
        snapshot.insert(EntityKind::Deal, id.clone());

        let contact = raw.first_association(CONTACT_ASSOCIATION).and_then(canonical_id);
        Some(DealRow {
            hubspot_id: id,
            deal_name: safe_str(raw.property("dealname")),
            amount: safe_float(raw.property("amount")),
            close_date: truncate_date(raw.property("closedate")),
            create_date: timestamp_value(raw.property("createdate")),
            pipeline_id: snapshot.validate(EntityKind::Pipeline, property_id(&raw, "pipeline")),
            pipeline_stage_id: snapshot
                .validate(EntityKind::PipelineStage, property_id(&raw, "dealstage")),
            deal_stage: safe_str(raw.property("dealstage")),
            owner_id: snapshot.validate(EntityKind::Owner, property_id(&raw, "hubspot_owner_id")),
            contact_id: snapshot.validate(EntityKind::Contact, contact),
            created_at: timestamp_value(Some(&raw.created_at)),
            updated_at: timestamp_value(Some(&raw.updated_at)),
            archived: raw.is_archived(),
            raw_data: raw_blob(&raw.properties),
            provenance: self.provenance.clone(),
        })
    }
}

/// Transforms line items.
#[derive(Debug, Clone)]
pub struct LineItemTransformer {
    provenance: Provenance,
}

impl LineItemTransformer {
    /// Properties requested from the source.
    pub const PROPERTIES: &'static [&'static str] = &[
        "quantity",
        "price",
        "hs_product_id",
        "name",
        "amount",
        "description",
        "hs_lastmodifieddate",
    ];

    /// Creates a transformer stamping rows with `provenance`.
    pub fn new(provenance: Provenance) -> Self {
        Self { provenance }
    }
}

impl EntityTransformer for LineItemTransformer {
    type Row = LineItemRow;

    fn kind(&self) -> EntityKind {
        EntityKind::LineItem
    }

    fn transform(
        &self,
        raw: SourceRecord,
        snapshot: &mut ForeignKeySnapshot,
    ) -> Option<LineItemRow> {
        let id = record_id(EntityKind::LineItem, &raw)?;
        let deal = raw.first_association(DEAL_ASSOCIATION).and_then(canonical_id);
        Some(LineItemRow {
            hubspot_id: id,
            deal_id: snapshot.validate(EntityKind::Deal, deal),
            product_id: safe_str(raw.property("hs_product_id")),
            name: safe_str(raw.property("name")),
            quantity: safe_float(raw.property("quantity")),
            unit_price: safe_float(raw.property("price")),
            amount: safe_float(raw.property("amount")),
            description: safe_str(raw.property("description")),
            provenance: self.provenance.clone(),
        })
    }
}

/// Transforms commission custom objects.
#[derive(Debug, Clone)]
pub struct CommissionTransformer {
    provenance: Provenance,
    object_type_id: String,
}

impl CommissionTransformer {
    /// Properties requested from the source. All of them are kept in
    /// `raw_properties`.
    pub const PROPERTIES: &'static [&'static str] = &[
        "hubspot_owner_id",
        "data_de_fechamento",
        "valor_do_negocio",
        "item",
        "posicoes",
        "peso",
        "porcentagem",
        "status_financeiro",
        "status_comercial",
        "status_juridico",
        "hs_pipeline",
        "hs_pipeline_stage",
        "nome_do_cliente",
        "sdr_responsavel",
        "venda_de_impacto_",
        "hs_lastmodifieddate",
    ];

    /// Creates a transformer for objects of `object_type_id`.
    pub fn new(provenance: Provenance, object_type_id: impl Into<String>) -> Self {
        Self {
            provenance,
            object_type_id: object_type_id.into(),
        }
    }
}

impl EntityTransformer for CommissionTransformer {
    type Row = CommissionRow;

    fn kind(&self) -> EntityKind {
        EntityKind::Commission
    }

    fn transform(
        &self,
        raw: SourceRecord,
        snapshot: &mut ForeignKeySnapshot,
    ) -> Option<CommissionRow> {
        let id = record_id(EntityKind::Commission, &raw)?;
        Some(CommissionRow {
            hubspot_id: id,
            object_type_id: self.object_type_id.clone(),
            name: safe_str(raw.property("nome_do_cliente")),
            owner_id: snapshot.validate(EntityKind::Owner, property_id(&raw, "hubspot_owner_id")),
            commission_amount: safe_float(raw.property("valor_do_negocio")),
            commission_percentage: safe_float(raw.property("porcentagem")),
            commission_type: safe_str(raw.property("item")),
            payment_status: safe_str(raw.property("status_financeiro")),
            created_at: timestamp_value(Some(&raw.created_at)),
            updated_at: timestamp_value(Some(&raw.updated_at)),
            archived: raw.is_archived(),
            raw_properties: raw_blob(&raw.properties),
            provenance: self.provenance.clone(),
        })
    }
}
