//! Typed destination rows.
//!
//! One struct per destination table. Every optional column serializes as
//! `null` rather than being skipped, so all rows of a batch share one shape.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Provenance columns stamped on every row at extraction time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// When extraction of the row's entity type started.
    #[serde(rename = "_extracted_at")]
    pub extracted_at: DateTime<Utc>,
    /// Fixed tag naming the source system.
    #[serde(rename = "_source_system")]
    pub source_system: String,
}

impl Provenance {
    /// Stamps the current time.
    pub fn now(source_system: impl Into<String>) -> Self {
        Self::at(Utc::now(), source_system)
    }

    /// Stamps a fixed time.
    pub fn at(extracted_at: DateTime<Utc>, source_system: impl Into<String>) -> Self {
        Self {
            extracted_at,
            source_system: source_system.into(),
        }
    }
}

/// A row of `hubspot_owners`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerRow {
    /// Native owner id.
    pub hubspot_id: String,
    /// Email address.
    pub email: Option<String>,
    /// Given name.
    pub first_name: Option<String>,
    /// Family name.
    pub last_name: Option<String>,
    /// Provenance.
    #[serde(flatten)]
    pub provenance: Provenance,
}

/// A row of `hubspot_pipelines`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRow {
    /// Native pipeline id.
    pub hubspot_id: String,
    /// Display label.
    pub label: Option<String>,
    /// Object type the pipeline applies to.
    pub object_type: String,
    /// Provenance.
    #[serde(flatten)]
    pub provenance: Provenance,
}

/// A row of `hubspot_pipeline_stages`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStageRow {
    /// Native stage id.
    pub stage_id: String,
    /// Owning pipeline.
    pub pipeline_id: String,
    /// Display label.
    pub label: Option<String>,
    /// Position within the pipeline.
    pub display_order: Option<i64>,
    /// Provenance.
    #[serde(flatten)]
    pub provenance: Provenance,
}

/// A row of `hubspot_contacts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactRow {
    /// Native contact id.
    pub hubspot_id: String,
    /// Email address.
    pub email: Option<String>,
    /// Given name.
    pub first_name: Option<String>,
    /// Family name.
    pub last_name: Option<String>,
    /// Phone number.
    pub phone: Option<String>,
    /// Lifecycle stage.
    pub lifecycle_stage: Option<String>,
    /// Validated owner reference.
    pub owner_id: Option<String>,
    /// Creation time at the source.
    pub created_at: Option<DateTime<Utc>>,
    /// Last update time at the source.
    pub updated_at: Option<DateTime<Utc>>,
    /// Whether the source archived the record.
    pub archived: bool,
    /// Provenance.
    #[serde(flatten)]
    pub provenance: Provenance,
}

/// A row of `hubspot_deals`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealRow {
    /// Native deal id.
    pub hubspot_id: String,
    /// Deal name.
    pub deal_name: Option<String>,
    /// Amount.
    pub amount: Option<f64>,
    /// Close date, without its time part.
    pub close_date: Option<NaiveDate>,
    /// Creation date property.
    pub create_date: Option<DateTime<Utc>>,
    /// Validated pipeline reference.
    pub pipeline_id: Option<String>,
    /// Validated stage reference.
    pub pipeline_stage_id: Option<String>,
    /// Stage as reported by the source, unvalidated.
    pub deal_stage: Option<String>,
    /// Validated owner reference.
    pub owner_id: Option<String>,
    /// Validated reference to the first associated contact.
    pub contact_id: Option<String>,
    /// Creation time at the source.
    pub created_at: Option<DateTime<Utc>>,
    /// Last update time at the source.
    pub updated_at: Option<DateTime<Utc>>,
    /// Whether the source archived the record.
    pub archived: bool,
    /// Full property map as a JSON document.
    pub raw_data: String,
    /// Provenance.
    #[serde(flatten)]
    pub provenance: Provenance,
}

/// A row of `hubspot_line_items`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItemRow {
    /// Native line item id.
    pub hubspot_id: String,
    /// Validated reference to the first associated deal.
    pub deal_id: Option<String>,
    /// Product id.
    pub product_id: Option<String>,
    /// Name.
    pub name: Option<String>,
    /// Quantity.
    pub quantity: Option<f64>,
    /// Unit price.
    pub unit_price: Option<f64>,
    /// Amount.
    pub amount: Option<f64>,
    /// Description.
    pub description: Option<String>,
    /// Provenance.
    #[serde(flatten)]
    pub provenance: Provenance,
}

/// A row of `hubspot_commissions_obj`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionRow {
    /// Native object id.
    pub hubspot_id: String,
    /// Custom object type id the row was read from.
    pub object_type_id: String,
    /// Name.
    pub name: Option<String>,
    /// Validated owner reference.
    pub owner_id: Option<String>,
    /// Deal value the commission applies to.
    pub commission_amount: Option<f64>,
    /// Commission rate.
    pub commission_percentage: Option<f64>,
    /// Commission item.
    pub commission_type: Option<String>,
    /// Financial status.
    pub payment_status: Option<String>,
    /// Creation time at the source.
    pub created_at: Option<DateTime<Utc>>,
    /// Last update time at the source.
    pub updated_at: Option<DateTime<Utc>>,
    /// Whether the source archived the record.
    pub archived: bool,
    /// Full property map as a JSON document.
    pub raw_properties: String,
    /// Provenance.
    #[serde(flatten)]
    pub provenance: Provenance,
}
