use std::path::Path;

use serde_json::{Map, Value, json};
use tabula_store::{
    AddListEntryInput, AttributeParent, AttributeType, CatalogApi, CreateAttributeInput,
    CreateListInput, CreateObjectInput, CreateRecordInput, FAILPOINT_AFTER_ATTRIBUTE_INSERT,
    FAILPOINT_AFTER_ENTRY_DELETE, FAILPOINT_AFTER_OPTION_INSERT, FAILPOINT_AFTER_VALUE_DELETE, Id,
    ListApi, NewSelectOption, Object, RecordApi, TabulaConfig, TabulaError, TabulaResult,
    TabulaStore, WorkspaceId,
};
use tempfile::tempdir;

fn values(payload: Value) -> Map<String, Value> {
    match payload {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

async fn open(base: &Path, failpoints: &[&str]) -> TabulaResult<TabulaStore> {
    let mut config = TabulaConfig::default_sqlite(base.join("tabula.sqlite").to_string_lossy());
    if !failpoints.is_empty() {
        config.failpoints = Some(failpoints.iter().map(|key| key.to_string()).collect());
    }
    TabulaStore::connect(&config, base).await
}

async fn companies(store: &TabulaStore) -> TabulaResult<Object> {
    store
        .create_object(CreateObjectInput {
            workspace_id: WorkspaceId(Id::new()),
            slug: "companies".to_string(),
            singular_name: "Company".to_string(),
            plural_name: "Companies".to_string(),
            icon: None,
            is_system: false,
        })
        .await
}

fn is_failpoint(err: &TabulaError) -> bool {
    matches!(err, TabulaError::Storage { message } if message.starts_with("failpoint"))
}

#[tokio::test]
async fn attribute_creation_rolls_back() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let base = dir.path();
    let object = companies(&open(base, &[]).await?).await?;
    let parent = AttributeParent::Object(object.id);

    let failing = open(base, &[FAILPOINT_AFTER_ATTRIBUTE_INSERT]).await?;
    let err = failing
        .create_attribute(CreateAttributeInput::new(parent, "name", "Name", AttributeType::Text))
        .await
        .expect_err("failpoint");
    assert!(is_failpoint(&err));
    assert!(failing.get_attributes_for_object(object.id).await?.is_empty());

    let failing = open(base, &[FAILPOINT_AFTER_OPTION_INSERT]).await?;
    let mut stage = CreateAttributeInput::new(parent, "stage", "Stage", AttributeType::Select);
    stage.options = vec![
        NewSelectOption {
            title: "Open".to_string(),
            color: None,
        },
        NewSelectOption {
            title: "Closed".to_string(),
            color: None,
        },
    ];
    let err = failing.create_attribute(stage).await.expect_err("failpoint");
    assert!(is_failpoint(&err));
    assert!(failing.get_attributes_for_object(object.id).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn record_deletion_rolls_back() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let base = dir.path();
    let store = open(base, &[]).await?;
    let object = companies(&store).await?;
    store
        .create_attribute(CreateAttributeInput::new(
            AttributeParent::Object(object.id),
            "name",
            "Name",
            AttributeType::Text,
        ))
        .await?;
    let record = store
        .create_record(CreateRecordInput {
            object_id: object.id,
            values: values(json!({ "name": "Acme" })),
            actor: None,
        })
        .await?;
    let list = store
        .create_list(CreateListInput {
            object_id: object.id,
            name: "Targets".to_string(),
            slug: "targets".to_string(),
            is_private: false,
            actor: None,
        })
        .await?;
    let entry = store
        .add_list_entry(AddListEntryInput {
            list_id: list.id,
            record_id: record.id,
            values: Map::new(),
            actor: None,
        })
        .await?;

    for failpoint in [FAILPOINT_AFTER_ENTRY_DELETE, FAILPOINT_AFTER_VALUE_DELETE] {
        let failing = open(base, &[failpoint]).await?;
        let err = failing
            .delete_record(object.id, record.id)
            .await
            .expect_err("failpoint");
        assert!(is_failpoint(&err));
        let kept = store
            .get_record(object.id, record.id)
            .await?
            .expect("record kept");
        assert_eq!(kept.value("name").and_then(|v| v.as_text()), Some("Acme"));
        assert!(store.get_list_entry(entry.id).await?.is_some());
    }

    let failing = open(base, &[FAILPOINT_AFTER_ENTRY_DELETE]).await?;
    let err = failing.delete_list(list.id).await.expect_err("failpoint");
    assert!(is_failpoint(&err));
    assert!(store.get_list_entry(entry.id).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn attribute_deletion_rolls_back() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let base = dir.path();
    let store = open(base, &[]).await?;
    let object = companies(&store).await?;
    let name = store
        .create_attribute(CreateAttributeInput::new(
            AttributeParent::Object(object.id),
            "name",
            "Name",
            AttributeType::Text,
        ))
        .await?;
    let record = store
        .create_record(CreateRecordInput {
            object_id: object.id,
            values: values(json!({ "name": "Acme" })),
            actor: None,
        })
        .await?;

    let failing = open(base, &[FAILPOINT_AFTER_VALUE_DELETE]).await?;
    let err = failing.delete_attribute(name.id).await.expect_err("failpoint");
    assert!(is_failpoint(&err));
    assert!(store.get_attribute(name.id).await?.is_some());
    let kept = store
        .get_record(object.id, record.id)
        .await?
        .expect("record");
    assert!(kept.value("name").is_some());

    let err = failing.delete_object(object.id).await.expect_err("failpoint");
    assert!(is_failpoint(&err));
    assert!(store.get_object_by_id(object.id).await?.is_some());

    store.delete_attribute(name.id).await?;
    let stripped = store
        .get_record(object.id, record.id)
        .await?
        .expect("record");
    assert!(stripped.values.is_empty());
    Ok(())
}
