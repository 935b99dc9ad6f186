use async_trait::async_trait;

use crate::{
    ActorId, AddListEntryInput, AssertRecordInput, Attribute, CreateAttributeInput,
    CreateListInput, CreateObjectInput, CreateRecordInput, ForwardReference, Id, List,
    ListEntriesInput, ListEntryPage, ListEntryView, ListRecordsInput, NewSelectOption,
    NewStatus, Object, RecordPage, RecordView, RelatedRecord, SelectOption, Status,
    TabulaResult, UpdateAttributeInput, UpdateListInput, UpdateObjectInput, UpdateRecordInput,
    ValueMap, WorkspaceId,
};

#[async_trait]
pub trait CatalogApi {
    async fn create_object(&self, input: CreateObjectInput) -> TabulaResult<Object>;
    async fn get_object(&self, workspace: WorkspaceId, slug: &str) -> TabulaResult<Option<Object>>;
    async fn get_object_by_id(&self, object_id: Id) -> TabulaResult<Option<Object>>;
    async fn list_objects(&self, workspace: WorkspaceId) -> TabulaResult<Vec<Object>>;
    async fn update_object(&self, object_id: Id, input: UpdateObjectInput)
    -> TabulaResult<Object>;
    async fn delete_object(&self, object_id: Id) -> TabulaResult<()>;

    async fn get_attributes_for_object(&self, object_id: Id) -> TabulaResult<Vec<Attribute>>;
    async fn get_attributes_for_list(&self, list_id: Id) -> TabulaResult<Vec<Attribute>>;
    async fn get_attribute(&self, attribute_id: Id) -> TabulaResult<Option<Attribute>>;
    async fn create_attribute(&self, input: CreateAttributeInput) -> TabulaResult<Attribute>;
    async fn update_attribute(
        &self,
        attribute_id: Id,
        input: UpdateAttributeInput,
    ) -> TabulaResult<Attribute>;
    async fn delete_attribute(&self, attribute_id: Id) -> TabulaResult<()>;

    async fn add_select_option(
        &self,
        attribute_id: Id,
        option: NewSelectOption,
    ) -> TabulaResult<SelectOption>;
    async fn add_status(&self, attribute_id: Id, status: NewStatus) -> TabulaResult<Status>;
    async fn remove_select_option(&self, option_id: Id) -> TabulaResult<()>;
    async fn remove_status(&self, status_id: Id) -> TabulaResult<()>;
}

#[async_trait]
pub trait RecordApi {
    async fn create_record(&self, input: CreateRecordInput) -> TabulaResult<RecordView>;
    async fn update_record(&self, input: UpdateRecordInput) -> TabulaResult<RecordView>;
    async fn delete_record(&self, object_id: Id, record_id: Id) -> TabulaResult<()>;
    async fn get_record(&self, object_id: Id, record_id: Id)
    -> TabulaResult<Option<RecordView>>;
    /// Creates or updates the record whose matching attribute equals the given value.
    async fn assert_record(&self, input: AssertRecordInput) -> TabulaResult<RecordView>;
    async fn get_related_records(&self, record_id: Id) -> TabulaResult<Vec<RelatedRecord>>;
    async fn get_forward_references(
        &self,
        object_id: Id,
        record_id: Id,
    ) -> TabulaResult<Vec<ForwardReference>>;
}

#[async_trait]
pub trait QueryApi {
    async fn list_records(
        &self,
        object_id: Id,
        input: ListRecordsInput,
    ) -> TabulaResult<RecordPage>;
    async fn reorder_records(&self, object_id: Id, ordered_ids: Vec<Id>) -> TabulaResult<()>;
}

#[async_trait]
pub trait ListApi {
    async fn create_list(&self, input: CreateListInput) -> TabulaResult<List>;
    async fn get_list(&self, list_id: Id) -> TabulaResult<Option<List>>;
    async fn get_list_by_slug(&self, object_id: Id, slug: &str) -> TabulaResult<Option<List>>;
    async fn lists_for_object(&self, object_id: Id) -> TabulaResult<Vec<List>>;
    async fn update_list(&self, list_id: Id, input: UpdateListInput) -> TabulaResult<List>;
    async fn delete_list(&self, list_id: Id) -> TabulaResult<()>;

    async fn add_list_entry(&self, input: AddListEntryInput) -> TabulaResult<ListEntryView>;
    async fn get_list_entry(&self, entry_id: Id) -> TabulaResult<Option<ListEntryView>>;
    async fn list_entries(
        &self,
        list_id: Id,
        input: ListEntriesInput,
    ) -> TabulaResult<ListEntryPage>;
    async fn update_entry_values(
        &self,
        entry_id: Id,
        values: ValueMap,
        actor: Option<ActorId>,
    ) -> TabulaResult<ListEntryView>;
    async fn remove_list_entry(&self, entry_id: Id) -> TabulaResult<()>;
    /// Records of the list's object that are not yet entries, optionally text-searched.
    async fn get_available_records(
        &self,
        list_id: Id,
        object_id: Id,
        search: Option<String>,
    ) -> TabulaResult<Vec<RecordView>>;
}
