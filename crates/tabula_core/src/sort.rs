//! Sort compiler.
//!
//! Missing values always sort after present ones, whatever the direction, and the row id
//! closes every ordering so pages are reproducible.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{
    Attribute, AttributeType, Id, RecordRow, SlotValue, TabulaResult, UnknownAttributes,
    normalize_text,
};

pub const SORT_CREATED_AT: &str = "$created_at";
pub const SORT_UPDATED_AT: &str = "$updated_at";
pub const SORT_POSITION: &str = "$position";

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SortSpec {
    pub attribute: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn asc(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            direction: SortDirection::Desc,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SortField {
    CreatedAt,
    UpdatedAt,
    Position,
    /// Select and status keys carry the option rank so they order like the picker.
    Attribute { id: Id, ranks: HashMap<Id, i32> },
}

#[derive(Clone, Debug, PartialEq)]
pub struct SortKey {
    pub field: SortField,
    pub direction: SortDirection,
}

impl SortKey {
    fn compare(&self, left: &RecordRow, right: &RecordRow) -> Ordering {
        let ordering = match &self.field {
            SortField::CreatedAt => Some(left.created_at.cmp(&right.created_at)),
            SortField::UpdatedAt => Some(left.updated_at.cmp(&right.updated_at)),
            SortField::Position => nulls_last(left.position.as_ref(), right.position.as_ref(), Ord::cmp),
            SortField::Attribute { id, ranks } => {
                nulls_last(left.values.get(id), right.values.get(id), |a, b| {
                    compare_slots(a, b, ranks)
                })
            }
        };
        match (ordering, self.direction) {
            // Exactly one side missing: `missing_last` decides.
            (None, _) => Ordering::Equal,
            (Some(ordering), SortDirection::Asc) => ordering,
            (Some(ordering), SortDirection::Desc) => ordering.reverse(),
        }
        .then_with(|| missing_last(&self.field, left, right))
    }
}

/// `None` when exactly one side is missing; the caller orders that case separately.
fn nulls_last<T>(
    left: Option<&T>,
    right: Option<&T>,
    compare: impl Fn(&T, &T) -> Ordering,
) -> Option<Ordering> {
    match (left, right) {
        (Some(left), Some(right)) => Some(compare(left, right)),
        (None, None) => Some(Ordering::Equal),
        _ => None,
    }
}

fn missing_last(field: &SortField, left: &RecordRow, right: &RecordRow) -> Ordering {
    let present = |row: &RecordRow| match field {
        SortField::CreatedAt | SortField::UpdatedAt => true,
        SortField::Position => row.position.is_some(),
        SortField::Attribute { id, .. } => row.values.contains_key(id),
    };
    present(right).cmp(&present(left))
}

fn compare_slots(left: &SlotValue, right: &SlotValue, ranks: &HashMap<Id, i32>) -> Ordering {
    match (left, right) {
        (SlotValue::Text(a), SlotValue::Text(b)) => normalize_text(a).cmp(&normalize_text(b)),
        (SlotValue::Number { value: a, .. }, SlotValue::Number { value: b, .. }) => a.total_cmp(b),
        (SlotValue::Boolean(a), SlotValue::Boolean(b)) => a.cmp(b),
        (SlotValue::Date(a), SlotValue::Date(b)) => a.cmp(b),
        (SlotValue::Reference(a), SlotValue::Reference(b)) => match (ranks.get(a), ranks.get(b)) {
            (Some(rank_a), Some(rank_b)) => rank_a.cmp(rank_b),
            _ => a.to_uuid_string().cmp(&b.to_uuid_string()),
        },
        (SlotValue::Structured(a), SlotValue::Structured(b)) => a.to_string().cmp(&b.to_string()),
        _ => Ordering::Equal,
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompiledSort {
    pub keys: Vec<SortKey>,
}

impl CompiledSort {
    pub fn compare(&self, left: &RecordRow, right: &RecordRow) -> Ordering {
        self.keys
            .iter()
            .map(|key| key.compare(left, right))
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or_else(|| left.id.cmp(&right.id))
    }

    pub fn sort(&self, rows: &mut [RecordRow]) {
        rows.sort_by(|left, right| self.compare(left, right));
    }

    pub fn attribute_ids(&self) -> HashSet<Id> {
        self.keys
            .iter()
            .filter_map(|key| match &key.field {
                SortField::Attribute { id, .. } => Some(*id),
                _ => None,
            })
            .collect()
    }
}

pub fn compile_sorts(
    sorts: &[SortSpec],
    attributes: &[Attribute],
    unknown: UnknownAttributes,
) -> TabulaResult<CompiledSort> {
    let mut keys = Vec::with_capacity(sorts.len() + 1);
    for requested in sorts {
        let field = match requested.attribute.as_str() {
            SORT_CREATED_AT => SortField::CreatedAt,
            SORT_UPDATED_AT => SortField::UpdatedAt,
            SORT_POSITION => SortField::Position,
            slug => match unknown.resolve(attributes, slug, "sort")? {
                Some(attribute) => SortField::Attribute {
                    id: attribute.id,
                    ranks: option_ranks(attribute),
                },
                None => continue,
            },
        };
        keys.push(SortKey {
            field,
            direction: requested.direction,
        });
    }
    if keys.is_empty() {
        keys.push(SortKey {
            field: SortField::CreatedAt,
            direction: SortDirection::Desc,
        });
    }
    Ok(CompiledSort { keys })
}

fn option_ranks(attribute: &Attribute) -> HashMap<Id, i32> {
    match attribute.attribute_type {
        AttributeType::Select => attribute
            .options
            .iter()
            .map(|option| (option.id, option.sort_order))
            .collect(),
        AttributeType::Status => attribute
            .statuses
            .iter()
            .map(|status| (status.id, status.sort_order))
            .collect(),
        _ => HashMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{AttributeParent, TabulaError, Timestamp};

    fn number_attribute(slug: &str) -> Attribute {
        Attribute {
            id: Id::new(),
            parent: AttributeParent::Object(Id::new()),
            slug: slug.to_string(),
            title: slug.to_string(),
            attribute_type: AttributeType::Number,
            config: json!({}),
            is_system: false,
            is_required: false,
            is_unique: false,
            is_multiselect: false,
            sort_order: 0,
            options: Vec::new(),
            statuses: Vec::new(),
            created_at: Timestamp::now(),
        }
    }

    fn row(attribute: &Attribute, value: Option<f64>) -> RecordRow {
        let now = Timestamp::now();
        let mut row = RecordRow::new(Id::new(), now, now, None);
        if let Some(value) = value {
            row.values.insert(attribute.id, SlotValue::number(value));
        }
        row
    }

    fn values(attribute: &Attribute, rows: &[RecordRow]) -> Vec<Option<f64>> {
        rows.iter()
            .map(|row| match row.values.get(&attribute.id) {
                Some(SlotValue::Number { value, .. }) => Some(*value),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn missing_values_sort_last_in_both_directions() {
        let score = number_attribute("score");
        let attributes = vec![score.clone()];
        let mut rows = vec![
            row(&score, None),
            row(&score, Some(2.0)),
            row(&score, Some(1.0)),
            row(&score, Some(3.0)),
        ];

        let asc = compile_sorts(&[SortSpec::asc("score")], &attributes, UnknownAttributes::Reject)
            .unwrap();
        asc.sort(&mut rows);
        assert_eq!(values(&score, &rows), vec![Some(1.0), Some(2.0), Some(3.0), None]);

        let desc =
            compile_sorts(&[SortSpec::desc("score")], &attributes, UnknownAttributes::Reject)
                .unwrap();
        desc.sort(&mut rows);
        assert_eq!(values(&score, &rows), vec![Some(3.0), Some(2.0), Some(1.0), None]);
    }

    #[test]
    fn default_order_is_newest_first() {
        let score = number_attribute("score");
        let first = row(&score, None);
        let second = row(&score, None);
        let compiled = compile_sorts(&[], &[], UnknownAttributes::Ignore).unwrap();
        let mut rows = vec![first.clone(), second.clone()];
        compiled.sort(&mut rows);
        assert_eq!(rows[0].id, second.id);
        assert_eq!(rows[1].id, first.id);
    }

    #[test]
    fn ties_fall_back_to_row_id() {
        let score = number_attribute("score");
        let mut rows: Vec<RecordRow> = (0..5).map(|_| row(&score, Some(7.0))).collect();
        let compiled =
            compile_sorts(&[SortSpec::desc("score")], &[score.clone()], UnknownAttributes::Ignore)
                .unwrap();
        compiled.sort(&mut rows);
        let ids: Vec<Id> = rows.iter().map(|row| row.id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn unknown_sort_attributes_follow_policy() {
        let score = number_attribute("score");
        let attributes = vec![score];
        let specs = [SortSpec::asc("ghost"), SortSpec::asc(SORT_POSITION)];
        let compiled = compile_sorts(&specs, &attributes, UnknownAttributes::Ignore).unwrap();
        assert_eq!(compiled.keys.len(), 1);
        assert_eq!(compiled.keys[0].field, SortField::Position);
        let err = compile_sorts(&specs, &attributes, UnknownAttributes::Reject).unwrap_err();
        assert!(matches!(err, TabulaError::Validation { .. }));
    }

    #[test]
    fn position_sort_puts_unpositioned_rows_last() {
        let score = number_attribute("score");
        let now = Timestamp::now();
        let rows = vec![
            RecordRow::new(Id::new(), now, now, None),
            RecordRow::new(Id::new(), now, now, Some(1)),
            RecordRow::new(Id::new(), now, now, Some(0)),
        ];
        let compiled =
            compile_sorts(&[SortSpec::asc(SORT_POSITION)], &[score], UnknownAttributes::Ignore)
                .unwrap();
        let mut sorted = rows.clone();
        compiled.sort(&mut sorted);
        let positions: Vec<Option<i64>> = sorted.iter().map(|row| row.position).collect();
        assert_eq!(positions, vec![Some(0), Some(1), None]);
    }
}
