use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::{ActorId, AttributeValue, Id, SlotValue, Timestamp};

/// Raw JSON values keyed by attribute slug, as accepted by every write.
pub type ValueMap = Map<String, JsonValue>;

/// A record (or list entry) as the query pipeline sees it: metadata plus decoded slot
/// values keyed by attribute id.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordRow {
    pub id: Id,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub position: Option<i64>,
    pub values: HashMap<Id, SlotValue>,
}

impl RecordRow {
    pub fn new(id: Id, created_at: Timestamp, updated_at: Timestamp, position: Option<i64>) -> Self {
        Self {
            id,
            created_at,
            updated_at,
            position,
            values: HashMap::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordView {
    pub id: Id,
    pub object_id: Id,
    pub created_at: Timestamp,
    pub created_by: Option<ActorId>,
    pub updated_at: Timestamp,
    pub position: Option<i64>,
    pub values: BTreeMap<String, AttributeValue>,
}

impl RecordView {
    pub fn value(&self, slug: &str) -> Option<&AttributeValue> {
        self.values.get(slug)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRecordInput {
    pub object_id: Id,
    #[serde(default)]
    pub values: ValueMap,
    #[serde(default)]
    pub actor: Option<ActorId>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRecordInput {
    pub object_id: Id,
    pub record_id: Id,
    /// Only the slugs present are touched; null or empty clears.
    pub values: ValueMap,
    #[serde(default)]
    pub actor: Option<ActorId>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertRecordInput {
    pub object_id: Id,
    pub matching_attribute: String,
    pub matching_value: JsonValue,
    #[serde(default)]
    pub values: ValueMap,
    #[serde(default)]
    pub actor: Option<ActorId>,
}

/// A record that points at another through a record_reference attribute.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedRecord {
    pub record_id: Id,
    pub object_id: Id,
    pub attribute_id: Id,
    pub attribute_slug: String,
}

/// A record_reference value of this record resolved to a live target.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardReference {
    pub attribute_id: Id,
    pub attribute_slug: String,
    pub target_record_id: Id,
    pub target_object_id: Id,
}
