use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::{
    AttributeType, Id, Slot, TabulaError, TabulaResult, Timestamp, WorkspaceId, supports_multiselect,
};

pub const MAX_SLUG_LEN: usize = 64;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Object {
    pub id: Id,
    pub workspace_id: WorkspaceId,
    pub slug: String,
    pub singular_name: String,
    pub plural_name: String,
    pub icon: Option<String>,
    pub is_system: bool,
    pub created_at: Timestamp,
}

/// Owner of an attribute: an Object's shared schema or one List's extra fields.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum AttributeParent {
    Object(Id),
    List(Id),
}

impl AttributeParent {
    pub const OBJECT_KIND: i16 = 1;
    pub const LIST_KIND: i16 = 2;

    pub fn id(self) -> Id {
        match self {
            AttributeParent::Object(id) | AttributeParent::List(id) => id,
        }
    }

    pub fn kind_code(self) -> i16 {
        match self {
            AttributeParent::Object(_) => Self::OBJECT_KIND,
            AttributeParent::List(_) => Self::LIST_KIND,
        }
    }

    pub fn from_parts(kind_code: i16, id: Id) -> Option<Self> {
        match kind_code {
            Self::OBJECT_KIND => Some(AttributeParent::Object(id)),
            Self::LIST_KIND => Some(AttributeParent::List(id)),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectOption {
    pub id: Id,
    pub attribute_id: Id,
    pub title: String,
    pub color: Option<String>,
    pub sort_order: i32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub id: Id,
    pub attribute_id: Id,
    pub title: String,
    pub color: Option<String>,
    pub sort_order: i32,
    pub is_active: bool,
    pub celebration_enabled: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribute {
    pub id: Id,
    pub parent: AttributeParent,
    pub slug: String,
    pub title: String,
    #[serde(rename = "type")]
    pub attribute_type: AttributeType,
    pub config: JsonValue,
    pub is_system: bool,
    pub is_required: bool,
    pub is_unique: bool,
    pub is_multiselect: bool,
    pub sort_order: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<SelectOption>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statuses: Vec<Status>,
    pub created_at: Timestamp,
}

impl Attribute {
    /// Multiselect values always live in one structured row holding the set.
    pub fn storage_slot(&self) -> Slot {
        if self.is_multiselect {
            Slot::Structured
        } else {
            self.attribute_type.slot()
        }
    }

    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(JsonValue::as_str)
    }

    pub fn config_u64(&self, key: &str) -> Option<u64> {
        self.config.get(key).and_then(JsonValue::as_u64)
    }

    pub fn has_option(&self, option_id: Id) -> bool {
        self.options.iter().any(|option| option.id == option_id)
    }

    pub fn has_status(&self, status_id: Id) -> bool {
        self.statuses.iter().any(|status| status.id == status_id)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateObjectInput {
    pub workspace_id: WorkspaceId,
    pub slug: String,
    pub singular_name: String,
    pub plural_name: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub is_system: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateObjectInput {
    #[serde(default)]
    pub singular_name: Option<String>,
    #[serde(default)]
    pub plural_name: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSelectOption {
    pub title: String,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStatus {
    pub title: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub celebration_enabled: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAttributeInput {
    pub parent: AttributeParent,
    pub slug: String,
    pub title: String,
    #[serde(rename = "type")]
    pub attribute_type: AttributeType,
    #[serde(default)]
    pub config: Option<JsonValue>,
    #[serde(default)]
    pub is_system: bool,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default)]
    pub is_unique: bool,
    #[serde(default)]
    pub is_multiselect: bool,
    #[serde(default)]
    pub sort_order: Option<i32>,
    #[serde(default)]
    pub options: Vec<NewSelectOption>,
    #[serde(default)]
    pub statuses: Vec<NewStatus>,
}

impl CreateAttributeInput {
    pub fn new(
        parent: AttributeParent,
        slug: impl Into<String>,
        title: impl Into<String>,
        attribute_type: AttributeType,
    ) -> Self {
        Self {
            parent,
            slug: slug.into(),
            title: title.into(),
            attribute_type,
            config: None,
            is_system: false,
            is_required: false,
            is_unique: false,
            is_multiselect: false,
            sort_order: None,
            options: Vec::new(),
            statuses: Vec::new(),
        }
    }

    /// Shape checks that need no storage access.
    pub fn validate(&self) -> TabulaResult<()> {
        validate_slug(&self.slug)?;
        if self.title.trim().is_empty() {
            return Err(TabulaError::validation("attribute title is required"));
        }
        if self.is_multiselect && !supports_multiselect(self.attribute_type) {
            return Err(TabulaError::validation(format!(
                "{} attributes cannot be multiselect",
                self.attribute_type
            )));
        }
        if !self.options.is_empty() && self.attribute_type != AttributeType::Select {
            return Err(TabulaError::validation(
                "options are only allowed on select attributes",
            ));
        }
        if !self.statuses.is_empty() && self.attribute_type != AttributeType::Status {
            return Err(TabulaError::validation(
                "statuses are only allowed on status attributes",
            ));
        }
        if let Some(config) = &self.config {
            if !config.is_object() {
                return Err(TabulaError::validation("attribute config must be an object"));
            }
        }
        Ok(())
    }

    pub fn config_or_default(&self) -> JsonValue {
        self.config
            .clone()
            .unwrap_or_else(|| JsonValue::Object(Map::new()))
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAttributeInput {
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, rename = "type")]
    pub attribute_type: Option<AttributeType>,
    #[serde(default)]
    pub config: Option<JsonValue>,
    #[serde(default)]
    pub is_required: Option<bool>,
    #[serde(default)]
    pub is_unique: Option<bool>,
    #[serde(default)]
    pub is_multiselect: Option<bool>,
    #[serde(default)]
    pub sort_order: Option<i32>,
}

/// Slugs are the public field identifiers: `[a-z][a-z0-9_]*`.
pub fn validate_slug(slug: &str) -> TabulaResult<()> {
    let mut chars = slug.chars();
    let Some(first) = chars.next() else {
        return Err(TabulaError::validation("slug is required"));
    };
    if slug.len() > MAX_SLUG_LEN {
        return Err(TabulaError::validation(format!(
            "slug '{slug}' is longer than {MAX_SLUG_LEN} characters"
        )));
    }
    let valid = first.is_ascii_lowercase()
        && chars.all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_');
    if !valid {
        return Err(TabulaError::validation(format!(
            "slug '{slug}' must match [a-z][a-z0-9_]*"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_shape_is_enforced() {
        assert!(validate_slug("deal_stage2").is_ok());
        assert!(validate_slug("").is_err());
        assert!(validate_slug("2fast").is_err());
        assert!(validate_slug("Amount").is_err());
        assert!(validate_slug("$position").is_err());
        assert!(validate_slug(&"a".repeat(MAX_SLUG_LEN + 1)).is_err());
    }

    #[test]
    fn create_input_rejects_mismatched_children() {
        let parent = AttributeParent::Object(Id::new());
        let mut input = CreateAttributeInput::new(parent, "stage", "Stage", AttributeType::Text);
        input.options.push(NewSelectOption {
            title: "Lead".to_string(),
            color: None,
        });
        assert!(input.validate().is_err());

        let mut input = CreateAttributeInput::new(parent, "done", "Done", AttributeType::Checkbox);
        input.is_multiselect = true;
        assert!(input.validate().is_err());

        let mut input = CreateAttributeInput::new(parent, "tags", "Tags", AttributeType::Select);
        input.is_multiselect = true;
        assert!(input.validate().is_ok());
    }

    #[test]
    fn parent_kind_codes_roundtrip() {
        let id = Id::new();
        for parent in [AttributeParent::Object(id), AttributeParent::List(id)] {
            assert_eq!(AttributeParent::from_parts(parent.kind_code(), id), Some(parent));
        }
        assert_eq!(AttributeParent::from_parts(9, id), None);
    }
}
