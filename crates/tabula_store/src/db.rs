use sea_orm::sea_query;
use sea_orm_migration::prelude::Iden;

#[derive(Iden, Clone, Copy)]
pub enum TabulaObjects {
    Table,
    ObjectId,
    WorkspaceId,
    Slug,
    SingularName,
    PluralName,
    Icon,
    IsSystem,
    CreatedAt,
}

/// Object attributes and list attributes share this table, told apart by `parent_kind`.
#[derive(Iden, Clone, Copy)]
pub enum TabulaAttributes {
    Table,
    AttributeId,
    ParentKind,
    ParentId,
    Slug,
    Title,
    AttributeType,
    ConfigJson,
    IsSystem,
    IsRequired,
    IsUnique,
    IsMultiselect,
    SortOrder,
    CreatedAt,
}

#[derive(Iden, Clone, Copy)]
pub enum TabulaSelectOptions {
    Table,
    OptionId,
    AttributeId,
    Title,
    Color,
    SortOrder,
}

#[derive(Iden, Clone, Copy)]
pub enum TabulaStatuses {
    Table,
    StatusId,
    AttributeId,
    Title,
    Color,
    SortOrder,
    IsActive,
    CelebrationEnabled,
}

#[derive(Iden, Clone, Copy)]
pub enum TabulaRecords {
    Table,
    RecordId,
    ObjectId,
    Position,
    CreatedAt,
    CreatedBy,
    UpdatedAt,
}

#[derive(Iden, Clone, Copy)]
pub enum TabulaLists {
    Table,
    ListId,
    ObjectId,
    Name,
    Slug,
    IsPrivate,
    CreatedBy,
    CreatedAt,
}

#[derive(Iden, Clone, Copy)]
pub enum TabulaListEntries {
    Table,
    EntryId,
    ListId,
    RecordId,
    CreatedAt,
    CreatedBy,
    UpdatedAt,
}

/// The two EAV value tables. Both have the [`ValueCol`] layout; the owner is a record or
/// a list entry.
#[derive(Iden, Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValueTable {
    #[iden = "tabula_record_values"]
    Record,
    #[iden = "tabula_list_entry_values"]
    ListEntry,
}

#[derive(Iden, Clone, Copy)]
pub enum ValueCol {
    OwnerId,
    AttributeId,
    ValueText,
    ValueNumber,
    ValueBool,
    ValueDate,
    ValueJson,
    ValueRef,
    UniqueKey,
    UpdatedAt,
}
