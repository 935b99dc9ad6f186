use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::DatabaseBackend;

use crate::db::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();

        manager
            .create_table(
                Table::create()
                    .table(TabulaObjects::Table)
                    .if_not_exists()
                    .col(id_col(backend, TabulaObjects::ObjectId, false))
                    .col(id_col(backend, TabulaObjects::WorkspaceId, false))
                    .col(ColumnDef::new(TabulaObjects::Slug).string_len(64).not_null())
                    .col(ColumnDef::new(TabulaObjects::SingularName).string().not_null())
                    .col(ColumnDef::new(TabulaObjects::PluralName).string().not_null())
                    .col(ColumnDef::new(TabulaObjects::Icon).string())
                    .col(ColumnDef::new(TabulaObjects::IsSystem).boolean().not_null())
                    .col(ColumnDef::new(TabulaObjects::CreatedAt).big_integer().not_null())
                    .primary_key(
                        Index::create()
                            .name("pk_tabula_objects")
                            .col(TabulaObjects::ObjectId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TabulaAttributes::Table)
                    .if_not_exists()
                    .col(id_col(backend, TabulaAttributes::AttributeId, false))
                    .col(
                        ColumnDef::new(TabulaAttributes::ParentKind)
                            .small_integer()
                            .not_null(),
                    )
                    .col(id_col(backend, TabulaAttributes::ParentId, false))
                    .col(ColumnDef::new(TabulaAttributes::Slug).string_len(64).not_null())
                    .col(ColumnDef::new(TabulaAttributes::Title).string().not_null())
                    .col(
                        ColumnDef::new(TabulaAttributes::AttributeType)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(ColumnDef::new(TabulaAttributes::ConfigJson).text().not_null())
                    .col(ColumnDef::new(TabulaAttributes::IsSystem).boolean().not_null())
                    .col(ColumnDef::new(TabulaAttributes::IsRequired).boolean().not_null())
                    .col(ColumnDef::new(TabulaAttributes::IsUnique).boolean().not_null())
                    .col(
                        ColumnDef::new(TabulaAttributes::IsMultiselect)
                            .boolean()
                            .not_null(),
                    )
                    .col(ColumnDef::new(TabulaAttributes::SortOrder).integer().not_null())
                    .col(
                        ColumnDef::new(TabulaAttributes::CreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .name("pk_tabula_attributes")
                            .col(TabulaAttributes::AttributeId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TabulaSelectOptions::Table)
                    .if_not_exists()
                    .col(id_col(backend, TabulaSelectOptions::OptionId, false))
                    .col(id_col(backend, TabulaSelectOptions::AttributeId, false))
                    .col(ColumnDef::new(TabulaSelectOptions::Title).string().not_null())
                    .col(ColumnDef::new(TabulaSelectOptions::Color).string())
                    .col(
                        ColumnDef::new(TabulaSelectOptions::SortOrder)
                            .integer()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .name("pk_tabula_select_options")
                            .col(TabulaSelectOptions::OptionId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TabulaStatuses::Table)
                    .if_not_exists()
                    .col(id_col(backend, TabulaStatuses::StatusId, false))
                    .col(id_col(backend, TabulaStatuses::AttributeId, false))
                    .col(ColumnDef::new(TabulaStatuses::Title).string().not_null())
                    .col(ColumnDef::new(TabulaStatuses::Color).string())
                    .col(ColumnDef::new(TabulaStatuses::SortOrder).integer().not_null())
                    .col(ColumnDef::new(TabulaStatuses::IsActive).boolean().not_null())
                    .col(
                        ColumnDef::new(TabulaStatuses::CelebrationEnabled)
                            .boolean()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .name("pk_tabula_statuses")
                            .col(TabulaStatuses::StatusId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TabulaRecords::Table)
                    .if_not_exists()
                    .col(id_col(backend, TabulaRecords::RecordId, false))
                    .col(id_col(backend, TabulaRecords::ObjectId, false))
                    .col(ColumnDef::new(TabulaRecords::Position).big_integer())
                    .col(ColumnDef::new(TabulaRecords::CreatedAt).big_integer().not_null())
                    .col(id_col(backend, TabulaRecords::CreatedBy, true))
                    .col(ColumnDef::new(TabulaRecords::UpdatedAt).big_integer().not_null())
                    .primary_key(
                        Index::create()
                            .name("pk_tabula_records")
                            .col(TabulaRecords::RecordId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TabulaLists::Table)
                    .if_not_exists()
                    .col(id_col(backend, TabulaLists::ListId, false))
                    .col(id_col(backend, TabulaLists::ObjectId, false))
                    .col(ColumnDef::new(TabulaLists::Name).string().not_null())
                    .col(ColumnDef::new(TabulaLists::Slug).string_len(64).not_null())
                    .col(ColumnDef::new(TabulaLists::IsPrivate).boolean().not_null())
                    .col(id_col(backend, TabulaLists::CreatedBy, true))
                    .col(ColumnDef::new(TabulaLists::CreatedAt).big_integer().not_null())
                    .primary_key(
                        Index::create()
                            .name("pk_tabula_lists")
                            .col(TabulaLists::ListId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TabulaListEntries::Table)
                    .if_not_exists()
                    .col(id_col(backend, TabulaListEntries::EntryId, false))
                    .col(id_col(backend, TabulaListEntries::ListId, false))
                    .col(id_col(backend, TabulaListEntries::RecordId, false))
                    .col(
                        ColumnDef::new(TabulaListEntries::CreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(id_col(backend, TabulaListEntries::CreatedBy, true))
                    .col(
                        ColumnDef::new(TabulaListEntries::UpdatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .name("pk_tabula_list_entries")
                            .col(TabulaListEntries::EntryId),
                    )
                    .to_owned(),
            )
            .await?;

        create_value_table(manager, backend, ValueTable::Record, "pk_tabula_record_values")
            .await?;
        create_value_table(
            manager,
            backend,
            ValueTable::ListEntry,
            "pk_tabula_list_entry_values",
        )
        .await?;

        create_indexes(manager).await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ValueTable::ListEntry).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ValueTable::Record).if_exists().to_owned())
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(TabulaListEntries::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(TabulaLists::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(TabulaRecords::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(TabulaStatuses::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(TabulaSelectOptions::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(TabulaAttributes::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(TabulaObjects::Table).if_exists().to_owned())
            .await?;
        Ok(())
    }
}

async fn create_value_table(
    manager: &SchemaManager<'_>,
    backend: DatabaseBackend,
    table: ValueTable,
    pk_name: &str,
) -> Result<(), DbErr> {
    manager
        .create_table(
            Table::create()
                .table(table)
                .if_not_exists()
                .col(id_col(backend, ValueCol::OwnerId, false))
                .col(id_col(backend, ValueCol::AttributeId, false))
                .col(ColumnDef::new(ValueCol::ValueText).text())
                .col(ColumnDef::new(ValueCol::ValueNumber).double())
                .col(ColumnDef::new(ValueCol::ValueBool).boolean())
                .col(ColumnDef::new(ValueCol::ValueDate).big_integer())
                .col(ColumnDef::new(ValueCol::ValueJson).text())
                .col(id_col(backend, ValueCol::ValueRef, true))
                .col(ColumnDef::new(ValueCol::UniqueKey).string_len(255))
                .col(ColumnDef::new(ValueCol::UpdatedAt).big_integer().not_null())
                .primary_key(
                    Index::create()
                        .name(pk_name)
                        .col(ValueCol::OwnerId)
                        .col(ValueCol::AttributeId),
                )
                .to_owned(),
        )
        .await
}

async fn create_indexes(manager: &SchemaManager<'_>) -> Result<(), DbErr> {
    manager
        .create_index(
            Index::create()
                .name("tabula_objects_workspace_slug_uidx")
                .table(TabulaObjects::Table)
                .col(TabulaObjects::WorkspaceId)
                .col(TabulaObjects::Slug)
                .unique()
                .to_owned(),
        )
        .await?;
    manager
        .create_index(
            Index::create()
                .name("tabula_attributes_parent_slug_uidx")
                .table(TabulaAttributes::Table)
                .col(TabulaAttributes::ParentKind)
                .col(TabulaAttributes::ParentId)
                .col(TabulaAttributes::Slug)
                .unique()
                .to_owned(),
        )
        .await?;
    manager
        .create_index(
            Index::create()
                .name("tabula_select_options_attribute_idx")
                .table(TabulaSelectOptions::Table)
                .col(TabulaSelectOptions::AttributeId)
                .to_owned(),
        )
        .await?;
    manager
        .create_index(
            Index::create()
                .name("tabula_statuses_attribute_idx")
                .table(TabulaStatuses::Table)
                .col(TabulaStatuses::AttributeId)
                .to_owned(),
        )
        .await?;
    manager
        .create_index(
            Index::create()
                .name("tabula_records_object_created_idx")
                .table(TabulaRecords::Table)
                .col(TabulaRecords::ObjectId)
                .col(TabulaRecords::CreatedAt)
                .to_owned(),
        )
        .await?;
    manager
        .create_index(
            Index::create()
                .name("tabula_lists_object_slug_uidx")
                .table(TabulaLists::Table)
                .col(TabulaLists::ObjectId)
                .col(TabulaLists::Slug)
                .unique()
                .to_owned(),
        )
        .await?;
    manager
        .create_index(
            Index::create()
                .name("tabula_list_entries_list_record_uidx")
                .table(TabulaListEntries::Table)
                .col(TabulaListEntries::ListId)
                .col(TabulaListEntries::RecordId)
                .unique()
                .to_owned(),
        )
        .await?;
    manager
        .create_index(
            Index::create()
                .name("tabula_list_entries_record_idx")
                .table(TabulaListEntries::Table)
                .col(TabulaListEntries::RecordId)
                .to_owned(),
        )
        .await?;
    for (table, name) in [
        (ValueTable::Record, "tabula_record_values_unique_key_uidx"),
        (ValueTable::ListEntry, "tabula_list_entry_values_unique_key_uidx"),
    ] {
        manager
            .create_index(
                Index::create()
                    .name(name)
                    .table(table)
                    .col(ValueCol::AttributeId)
                    .col(ValueCol::UniqueKey)
                    .unique()
                    .to_owned(),
            )
            .await?;
    }
    manager
        .create_index(
            Index::create()
                .name("tabula_record_values_ref_idx")
                .table(ValueTable::Record)
                .col(ValueCol::ValueRef)
                .to_owned(),
        )
        .await?;
    Ok(())
}

fn id_col(backend: DatabaseBackend, col: impl Iden, nullable: bool) -> ColumnDef {
    let mut col_def = ColumnDef::new(col);
    match backend {
        DatabaseBackend::Postgres => {
            col_def.uuid();
        }
        DatabaseBackend::MySql => {
            col_def.binary_len(16);
        }
        _ => {
            col_def.string_len(36);
        }
    }
    if nullable {
        col_def.null();
    } else {
        col_def.not_null();
    }
    col_def.to_owned()
}
