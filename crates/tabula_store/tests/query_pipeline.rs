use std::path::Path;

use serde_json::{Map, Value, json};
use tabula_store::{
    AttributeParent, AttributeType, CatalogApi, CreateAttributeInput, CreateObjectInput,
    CreateRecordInput, FilterCondition, FilterGroup, FilterOperator, Id, LimitsConfig,
    ListRecordsInput, NewSelectOption, Object, QueryApi, RecordApi, RecordPage, SORT_POSITION,
    SortSpec, TabulaConfig, TabulaError, TabulaResult, TabulaStore, UnknownAttributes,
    WorkspaceId,
};
use tempfile::tempdir;

fn values(payload: Value) -> Map<String, Value> {
    match payload {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

async fn open_with(base: &Path, configure: impl FnOnce(&mut TabulaConfig)) -> TabulaResult<TabulaStore> {
    let mut config = TabulaConfig::default_sqlite(base.join("tabula.sqlite").to_string_lossy());
    configure(&mut config);
    TabulaStore::connect(&config, base).await
}

async fn deals_object(store: &TabulaStore) -> TabulaResult<Object> {
    let deals = store
        .create_object(CreateObjectInput {
            workspace_id: WorkspaceId(Id::new()),
            slug: "deals".to_string(),
            singular_name: "Deal".to_string(),
            plural_name: "Deals".to_string(),
            icon: None,
            is_system: false,
        })
        .await?;
    let parent = AttributeParent::Object(deals.id);
    store
        .create_attribute(CreateAttributeInput::new(parent, "name", "Name", AttributeType::Text))
        .await?;
    store
        .create_attribute(CreateAttributeInput::new(
            parent,
            "value",
            "Value",
            AttributeType::Number,
        ))
        .await?;
    Ok(deals)
}

async fn seed(store: &TabulaStore, object_id: Id, rows: &[Value]) -> TabulaResult<Vec<Id>> {
    let mut ids = Vec::new();
    for row in rows {
        let record = store
            .create_record(CreateRecordInput {
                object_id,
                values: values(row.clone()),
                actor: None,
            })
            .await?;
        ids.push(record.id);
    }
    Ok(ids)
}

fn numbers(page: &RecordPage, slug: &str) -> Vec<Option<f64>> {
    page.records
        .iter()
        .map(|record| record.value(slug).and_then(|value| value.as_number()))
        .collect()
}

fn names(page: &RecordPage) -> Vec<String> {
    page.records
        .iter()
        .map(|record| {
            record
                .value("name")
                .and_then(|value| value.as_text())
                .unwrap_or_default()
                .to_string()
        })
        .collect()
}

#[tokio::test]
async fn threshold_filter_sorts_descending() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open_with(dir.path(), |_| {}).await?;
    let deals = deals_object(&store).await?;
    seed(
        &store,
        deals.id,
        &[
            json!({ "name": "small", "value": 50 }),
            json!({ "name": "medium", "value": 150 }),
            json!({ "name": "large", "value": 300 }),
            json!({ "name": "unpriced" }),
        ],
    )
    .await?;

    let page = store
        .list_records(
            deals.id,
            ListRecordsInput::default()
                .with_filter(FilterGroup::and([FilterCondition::new(
                    "value",
                    FilterOperator::GreaterThanOrEquals,
                    json!(100),
                )
                .into()]))
                .with_sort(SortSpec::desc("value")),
        )
        .await?;
    assert_eq!(page.total, 2);
    assert_eq!(numbers(&page, "value"), vec![Some(300.0), Some(150.0)]);
    Ok(())
}

#[tokio::test]
async fn missing_values_sort_last_both_ways() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open_with(dir.path(), |_| {}).await?;
    let deals = deals_object(&store).await?;
    seed(
        &store,
        deals.id,
        &[
            json!({ "name": "a", "value": 20 }),
            json!({ "name": "b" }),
            json!({ "name": "c", "value": 10 }),
        ],
    )
    .await?;

    let ascending = store
        .list_records(deals.id, ListRecordsInput::default().with_sort(SortSpec::asc("value")))
        .await?;
    assert_eq!(numbers(&ascending, "value"), vec![Some(10.0), Some(20.0), None]);
    let descending = store
        .list_records(deals.id, ListRecordsInput::default().with_sort(SortSpec::desc("value")))
        .await?;
    assert_eq!(numbers(&descending, "value"), vec![Some(20.0), Some(10.0), None]);

    // Newest first without explicit sorts.
    let default = store.list_records(deals.id, ListRecordsInput::default()).await?;
    assert_eq!(names(&default), vec!["c", "b", "a"]);
    Ok(())
}

#[tokio::test]
async fn negated_and_empty_operators_cover_missing_rows() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open_with(dir.path(), |_| {}).await?;
    let deals = deals_object(&store).await?;
    seed(
        &store,
        deals.id,
        &[
            json!({ "name": "Acme renewal", "value": 5 }),
            json!({ "name": "Globex" }),
            json!({ "value": 7 }),
        ],
    )
    .await?;

    let not_equals = store
        .list_records(
            deals.id,
            ListRecordsInput::default().with_filter(FilterGroup::and([FilterCondition::new(
                "name",
                FilterOperator::NotEquals,
                json!("globex"),
            )
            .into()])),
        )
        .await?;
    assert_eq!(not_equals.total, 2);

    let empty = store
        .list_records(
            deals.id,
            ListRecordsInput::default().with_filter(FilterGroup::and([FilterCondition::new(
                "name",
                FilterOperator::IsEmpty,
                Value::Null,
            )
            .into()])),
        )
        .await?;
    assert_eq!(empty.total, 1);
    assert_eq!(numbers(&empty, "value"), vec![Some(7.0)]);

    let either = store
        .list_records(
            deals.id,
            ListRecordsInput::default()
                .with_filter(FilterGroup::or([
                    FilterCondition::new("name", FilterOperator::Contains, json!("ACME")).into(),
                    FilterCondition::new("value", FilterOperator::GreaterThan, json!(6)).into(),
                ]))
                .with_sort(SortSpec::asc("value")),
        )
        .await?;
    assert_eq!(numbers(&either, "value"), vec![Some(5.0), Some(7.0)]);
    Ok(())
}

#[tokio::test]
async fn search_narrows_listing_and_total() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open_with(dir.path(), |_| {}).await?;
    let deals = deals_object(&store).await?;
    seed(
        &store,
        deals.id,
        &[
            json!({ "name": "Acme renewal", "value": 5 }),
            json!({ "name": "Globex upsell", "value": 9 }),
            json!({ "name": "ACME expansion", "value": 3 }),
        ],
    )
    .await?;

    let page = store
        .list_records(
            deals.id,
            ListRecordsInput::default()
                .with_search(" acme ")
                .with_sort(SortSpec::asc("value")),
        )
        .await?;
    assert_eq!(page.total, 2);
    assert_eq!(names(&page), vec!["ACME expansion", "Acme renewal"]);

    let none = store
        .list_records(deals.id, ListRecordsInput::default().with_search("9"))
        .await?;
    assert_eq!(none.total, 0);
    Ok(())
}

#[tokio::test]
async fn pages_are_clamped_to_configured_limits() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open_with(dir.path(), |config| {
        config.limits = Some(LimitsConfig {
            default_page_size: Some(2),
            max_page_size: Some(3),
        });
    })
    .await?;
    let deals = deals_object(&store).await?;
    let rows: Vec<Value> = (0..5).map(|value| json!({ "value": value })).collect();
    seed(&store, deals.id, &rows).await?;

    let first = store
        .list_records(deals.id, ListRecordsInput::default().with_sort(SortSpec::asc("value")))
        .await?;
    assert_eq!(first.total, 5);
    assert_eq!(numbers(&first, "value"), vec![Some(0.0), Some(1.0)]);

    let clamped = store
        .list_records(
            deals.id,
            ListRecordsInput::default()
                .with_sort(SortSpec::asc("value"))
                .with_limit(100),
        )
        .await?;
    assert_eq!(clamped.records.len(), 3);

    let tail = store
        .list_records(
            deals.id,
            ListRecordsInput::default()
                .with_sort(SortSpec::asc("value"))
                .with_offset(4),
        )
        .await?;
    assert_eq!(numbers(&tail, "value"), vec![Some(4.0)]);
    assert_eq!(tail.total, 5);

    let beyond = store
        .list_records(deals.id, ListRecordsInput::default().with_offset(50))
        .await?;
    assert!(beyond.records.is_empty());
    assert_eq!(beyond.total, 5);
    Ok(())
}

#[tokio::test]
async fn unknown_filter_attributes_follow_policy() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let lenient = open_with(dir.path(), |_| {}).await?;
    let deals = deals_object(&lenient).await?;
    seed(&lenient, deals.id, &[json!({ "value": 1 }), json!({ "value": 2 })]).await?;
    let input = ListRecordsInput::default()
        .with_filter(FilterGroup::and([FilterCondition::new(
            "ghost",
            FilterOperator::Equals,
            json!("boo"),
        )
        .into()]))
        .with_sort(SortSpec::asc("ghost"));

    let page = lenient.list_records(deals.id, input.clone()).await?;
    assert_eq!(page.total, 2);

    let strict = open_with(dir.path(), |config| {
        config.unknown_filter_attributes = Some(UnknownAttributes::Reject);
    })
    .await?;
    let err = strict
        .list_records(deals.id, input)
        .await
        .expect_err("unknown slug rejected");
    assert!(matches!(err, TabulaError::Validation { .. }));

    let err = lenient
        .list_records(
            deals.id,
            ListRecordsInput::default().with_filter(FilterGroup::and([FilterCondition::new(
                "value",
                FilterOperator::StartsWith,
                json!("1"),
            )
            .into()])),
        )
        .await
        .expect_err("operator not valid for numbers");
    assert!(matches!(err, TabulaError::Validation { .. }));
    Ok(())
}

#[tokio::test]
async fn select_values_sort_by_option_order() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open_with(dir.path(), |_| {}).await?;
    let deals = deals_object(&store).await?;
    let mut priority = CreateAttributeInput::new(
        AttributeParent::Object(deals.id),
        "priority",
        "Priority",
        AttributeType::Select,
    );
    priority.options = ["High", "Medium", "Low"]
        .into_iter()
        .map(|title| NewSelectOption {
            title: title.to_string(),
            color: None,
        })
        .collect();
    let priority = store.create_attribute(priority).await?;
    let [high, medium, low] = [0, 1, 2].map(|index| priority.options[index].id.to_string());
    seed(
        &store,
        deals.id,
        &[
            json!({ "name": "low", "priority": low }),
            json!({ "name": "high", "priority": high }),
            json!({ "name": "medium", "priority": medium }),
        ],
    )
    .await?;

    let page = store
        .list_records(deals.id, ListRecordsInput::default().with_sort(SortSpec::asc("priority")))
        .await?;
    assert_eq!(names(&page), vec!["high", "medium", "low"]);

    let filtered = store
        .list_records(
            deals.id,
            ListRecordsInput::default().with_filter(FilterGroup::and([FilterCondition::new(
                "priority",
                FilterOperator::In,
                json!([high, low]),
            )
            .into()])),
        )
        .await?;
    assert_eq!(filtered.total, 2);
    Ok(())
}

#[tokio::test]
async fn manual_order_is_persisted() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open_with(dir.path(), |_| {}).await?;
    let deals = deals_object(&store).await?;
    let ids = seed(
        &store,
        deals.id,
        &[json!({ "name": "a" }), json!({ "name": "b" }), json!({ "name": "c" })],
    )
    .await?;

    store
        .reorder_records(deals.id, vec![ids[1], ids[2], ids[0]])
        .await?;
    let page = store
        .list_records(deals.id, ListRecordsInput::default().with_sort(SortSpec::asc(SORT_POSITION)))
        .await?;
    assert_eq!(names(&page), vec!["b", "c", "a"]);
    assert_eq!(page.records[0].position, Some(0));

    let err = store
        .reorder_records(deals.id, vec![ids[0], Id::new()])
        .await
        .expect_err("foreign id");
    assert!(matches!(err, TabulaError::Validation { .. }));
    let err = store
        .reorder_records(deals.id, vec![ids[0], ids[0]])
        .await
        .expect_err("duplicate id");
    assert!(matches!(err, TabulaError::Validation { .. }));
    Ok(())
}
