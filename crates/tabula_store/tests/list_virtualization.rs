use serde_json::{Map, Value, json};
use tabula_store::{
    AddListEntryInput, AttributeParent, AttributeType, CatalogApi, CreateAttributeInput,
    CreateListInput, CreateObjectInput, CreateRecordInput, FilterCondition, FilterGroup,
    FilterOperator, Id, List, ListApi, ListEntriesInput, Object, RecordApi, RecordView, SortSpec,
    TabulaConfig, TabulaError, TabulaResult, TabulaStore, UpdateListInput, WorkspaceId,
};
use tempfile::tempdir;

fn values(payload: Value) -> Map<String, Value> {
    match payload {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

async fn open(base: &std::path::Path) -> TabulaResult<TabulaStore> {
    let config = TabulaConfig::default_sqlite(base.join("tabula.sqlite").to_string_lossy());
    TabulaStore::connect(&config, base).await
}

async fn object(store: &TabulaStore, workspace: WorkspaceId, slug: &str) -> TabulaResult<Object> {
    let object = store
        .create_object(CreateObjectInput {
            workspace_id: workspace,
            slug: slug.to_string(),
            singular_name: slug.to_string(),
            plural_name: slug.to_string(),
            icon: None,
            is_system: false,
        })
        .await?;
    store
        .create_attribute(CreateAttributeInput::new(
            AttributeParent::Object(object.id),
            "name",
            "Name",
            AttributeType::Text,
        ))
        .await?;
    Ok(object)
}

async fn record(store: &TabulaStore, object_id: Id, name: &str) -> TabulaResult<RecordView> {
    store
        .create_record(CreateRecordInput {
            object_id,
            values: values(json!({ "name": name })),
            actor: None,
        })
        .await
}

async fn pipeline(store: &TabulaStore, object_id: Id) -> TabulaResult<List> {
    let list = store
        .create_list(CreateListInput {
            object_id,
            name: "Sales pipeline".to_string(),
            slug: "pipeline".to_string(),
            is_private: false,
            actor: None,
        })
        .await?;
    store
        .create_attribute(CreateAttributeInput::new(
            AttributeParent::List(list.id),
            "amount",
            "Amount",
            AttributeType::Number,
        ))
        .await?;
    Ok(list)
}

#[tokio::test]
async fn list_lifecycle() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path()).await?;
    let companies = object(&store, WorkspaceId(Id::new()), "companies").await?;
    let list = pipeline(&store, companies.id).await?;

    let err = store
        .create_list(CreateListInput {
            object_id: companies.id,
            name: "Again".to_string(),
            slug: "pipeline".to_string(),
            is_private: true,
            actor: None,
        })
        .await
        .expect_err("duplicate list slug");
    assert!(matches!(err, TabulaError::Conflict { .. }));

    let found = store
        .get_list_by_slug(companies.id, "pipeline")
        .await?
        .expect("list");
    assert_eq!(found.id, list.id);
    assert_eq!(store.lists_for_object(companies.id).await?.len(), 1);

    let renamed = store
        .update_list(
            list.id,
            UpdateListInput {
                name: Some("Q3 pipeline".to_string()),
                is_private: Some(true),
            },
        )
        .await?;
    assert_eq!(renamed.name, "Q3 pipeline");
    assert!(renamed.is_private);
    assert_eq!(store.get_list(list.id).await?, Some(renamed));

    let acme = record(&store, companies.id, "Acme").await?;
    store
        .add_list_entry(AddListEntryInput {
            list_id: list.id,
            record_id: acme.id,
            values: values(json!({ "amount": 10 })),
            actor: None,
        })
        .await?;
    store.delete_list(list.id).await?;
    assert!(store.get_list(list.id).await?.is_none());
    assert!(store.get_attributes_for_list(list.id).await?.is_empty());
    assert!(store.get_record(companies.id, acme.id).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn entries_carry_list_local_values() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path()).await?;
    let workspace = WorkspaceId(Id::new());
    let companies = object(&store, workspace, "companies").await?;
    let people = object(&store, workspace, "people").await?;
    let list = pipeline(&store, companies.id).await?;
    let acme = record(&store, companies.id, "Acme").await?;
    let globex = record(&store, companies.id, "Globex").await?;
    let ada = record(&store, people.id, "Ada").await?;

    let entry = store
        .add_list_entry(AddListEntryInput {
            list_id: list.id,
            record_id: acme.id,
            values: values(json!({ "amount": 500 })),
            actor: None,
        })
        .await?;
    assert_eq!(entry.record.id, acme.id);
    assert_eq!(entry.value("amount").and_then(|v| v.as_number()), Some(500.0));
    assert!(entry.record.value("amount").is_none());

    let err = store
        .add_list_entry(AddListEntryInput {
            list_id: list.id,
            record_id: acme.id,
            values: Map::new(),
            actor: None,
        })
        .await
        .expect_err("duplicate entry");
    assert!(matches!(err, TabulaError::Conflict { .. }));

    let err = store
        .add_list_entry(AddListEntryInput {
            list_id: list.id,
            record_id: ada.id,
            values: Map::new(),
            actor: None,
        })
        .await
        .expect_err("record of another object");
    assert!(matches!(err, TabulaError::Validation { .. }));

    let err = store
        .add_list_entry(AddListEntryInput {
            list_id: Id::new(),
            record_id: acme.id,
            values: Map::new(),
            actor: None,
        })
        .await
        .expect_err("missing list");
    assert!(matches!(err, TabulaError::NotFound { .. }));

    store
        .add_list_entry(AddListEntryInput {
            list_id: list.id,
            record_id: globex.id,
            values: values(json!({ "amount": 50 })),
            actor: None,
        })
        .await?;

    let page = store
        .list_entries(
            list.id,
            ListEntriesInput::default()
                .with_filter(FilterGroup::and([FilterCondition::new(
                    "amount",
                    FilterOperator::GreaterThan,
                    json!(100),
                )
                .into()])),
        )
        .await?;
    assert_eq!(page.total, 1);
    assert_eq!(page.entries[0].record_id, acme.id);

    let sorted = store
        .list_entries(list.id, ListEntriesInput::default().with_sort(SortSpec::asc("amount")))
        .await?;
    let order: Vec<Id> = sorted.entries.iter().map(|entry| entry.record_id).collect();
    assert_eq!(order, vec![globex.id, acme.id]);

    let updated = store
        .update_entry_values(entry.id, values(json!({ "amount": null })), None)
        .await?;
    assert!(updated.value("amount").is_none());

    store.remove_list_entry(entry.id).await?;
    assert!(store.get_list_entry(entry.id).await?.is_none());
    assert!(store.get_record(companies.id, acme.id).await?.is_some());
    let err = store
        .remove_list_entry(entry.id)
        .await
        .expect_err("already removed");
    assert!(matches!(err, TabulaError::NotFound { .. }));
    Ok(())
}

#[tokio::test]
async fn available_records_exclude_listed_ones() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path()).await?;
    let workspace = WorkspaceId(Id::new());
    let companies = object(&store, workspace, "companies").await?;
    let people = object(&store, workspace, "people").await?;
    let list = pipeline(&store, companies.id).await?;
    let acme = record(&store, companies.id, "Acme").await?;
    let globex = record(&store, companies.id, "Globex").await?;
    let initech = record(&store, companies.id, "Initech").await?;
    store
        .add_list_entry(AddListEntryInput {
            list_id: list.id,
            record_id: acme.id,
            values: Map::new(),
            actor: None,
        })
        .await?;

    let available = store.get_available_records(list.id, companies.id, None).await?;
    let ids: Vec<Id> = available.iter().map(|record| record.id).collect();
    assert_eq!(ids, vec![initech.id, globex.id]);

    let searched = store
        .get_available_records(list.id, companies.id, Some("  GLOB ".to_string()))
        .await?;
    assert_eq!(searched.len(), 1);
    assert_eq!(searched[0].id, globex.id);

    let none = store
        .get_available_records(list.id, companies.id, Some("acme".to_string()))
        .await?;
    assert!(none.is_empty());

    let err = store
        .get_available_records(list.id, people.id, None)
        .await
        .expect_err("list of another object");
    assert!(matches!(err, TabulaError::Validation { .. }));
    Ok(())
}

#[tokio::test]
async fn available_records_search_personal_names() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path()).await?;
    let people = store
        .create_object(CreateObjectInput {
            workspace_id: WorkspaceId(Id::new()),
            slug: "people".to_string(),
            singular_name: "Person".to_string(),
            plural_name: "People".to_string(),
            icon: None,
            is_system: false,
        })
        .await?;
    store
        .create_attribute(CreateAttributeInput::new(
            AttributeParent::Object(people.id),
            "name",
            "Name",
            AttributeType::PersonalName,
        ))
        .await?;
    let ada = store
        .create_record(CreateRecordInput {
            object_id: people.id,
            values: values(json!({ "name": { "firstName": "Ada", "lastName": "Lovelace" } })),
            actor: None,
        })
        .await?;
    store
        .create_record(CreateRecordInput {
            object_id: people.id,
            values: values(json!({ "name": "Grace Hopper" })),
            actor: None,
        })
        .await?;
    let list = store
        .create_list(CreateListInput {
            object_id: people.id,
            name: "Speakers".to_string(),
            slug: "speakers".to_string(),
            is_private: false,
            actor: None,
        })
        .await?;

    assert_eq!(store.get_available_records(list.id, people.id, None).await?.len(), 2);
    for search in ["ada", "LOVELACE", "ada love"] {
        let found = store
            .get_available_records(list.id, people.id, Some(search.to_string()))
            .await?;
        let ids: Vec<Id> = found.iter().map(|record| record.id).collect();
        assert_eq!(ids, vec![ada.id], "{search}");
    }
    Ok(())
}
