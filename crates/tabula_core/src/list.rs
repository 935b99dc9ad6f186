use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{ActorId, AttributeValue, Id, RecordView, Timestamp, ValueMap};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct List {
    pub id: Id,
    pub object_id: Id,
    pub name: String,
    pub slug: String,
    pub is_private: bool,
    pub created_by: Option<ActorId>,
    pub created_at: Timestamp,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateListInput {
    pub object_id: Id,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub actor: Option<ActorId>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateListInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_private: Option<bool>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddListEntryInput {
    pub list_id: Id,
    pub record_id: Id,
    #[serde(default)]
    pub values: ValueMap,
    #[serde(default)]
    pub actor: Option<ActorId>,
}

/// A list entry with its list-local values and the underlying record.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEntryView {
    pub id: Id,
    pub list_id: Id,
    pub record_id: Id,
    pub created_at: Timestamp,
    pub created_by: Option<ActorId>,
    pub updated_at: Timestamp,
    pub values: BTreeMap<String, AttributeValue>,
    pub record: RecordView,
}

impl ListEntryView {
    pub fn value(&self, slug: &str) -> Option<&AttributeValue> {
        self.values.get(slug)
    }
}
