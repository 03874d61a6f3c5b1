//! Raw CRM records.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A raw object as returned by the source API.
///
/// CRM objects (contacts, deals, ...) carry their attributes under
/// `properties`. Owners and pipelines put them at the top level instead;
/// those land in `extra`. Scalars are kept as untyped JSON so that a
/// malformed field never fails decoding of the whole page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Native id; usually a string, sometimes a number.
    #[serde(default)]
    pub id: Value,
    /// CRM property map.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,
    /// Creation timestamp as reported by the source.
    #[serde(rename = "createdAt", default, skip_serializing_if = "Value::is_null")]
    pub created_at: Value,
    /// Last update timestamp as reported by the source.
    #[serde(rename = "updatedAt", default, skip_serializing_if = "Value::is_null")]
    pub updated_at: Value,
    /// Archived flag.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub archived: Value,
    /// Linked objects, keyed by association type (e.g. `contacts`).
    #[serde(default, skip_serializing_if = "Associations::is_empty")]
    pub associations: Associations,
    /// Every other top-level field.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SourceRecord {
    /// Creates a record with the given id and no attributes.
    pub fn new(id: impl Into<Value>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Adds a property.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Adds a top-level field.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }

    /// Adds one associated id under `kind`.
    pub fn with_association(mut self, kind: impl Into<String>, id: impl Into<Value>) -> Self {
        self.associations.push(kind, id);
        self
    }

    /// Looks up a CRM property.
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Looks up a top-level field that is not part of the typed envelope.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.extra.get(name)
    }

    /// Returns the archived flag, treating anything but `true` as false.
    pub fn is_archived(&self) -> bool {
        self.archived.as_bool().unwrap_or(false)
    }

    /// Returns the id of the first object associated under `kind`.
    pub fn first_association(&self, kind: &str) -> Option<&Value> {
        self.associations.first(kind)
    }
}

/// Association linkage, keyed by association type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Associations(BTreeMap<String, AssociationList>);

impl Associations {
    /// Creates an empty association set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if no association type is present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the associated objects of one type.
    pub fn get(&self, kind: &str) -> Option<&AssociationList> {
        self.0.get(kind)
    }

    /// Returns the id of the first associated object of one type.
    pub fn first(&self, kind: &str) -> Option<&Value> {
        self.0
            .get(kind)
            .and_then(|list| list.results.first())
            .map(|assoc| &assoc.id)
    }

    /// Appends an associated id under `kind`.
    pub fn push(&mut self, kind: impl Into<String>, id: impl Into<Value>) {
        self.0
            .entry(kind.into())
            .or_default()
            .results
            .push(AssociatedId {
                id: id.into(),
                kind: None,
            });
    }
}

/// The objects associated under one association type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssociationList {
    /// Associated objects in source order.
    #[serde(default)]
    pub results: Vec<AssociatedId>,
}

/// A single associated object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociatedId {
    /// Id of the associated object.
    #[serde(default)]
    pub id: Value,
    /// Association label, e.g. `deal_to_contact`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}
