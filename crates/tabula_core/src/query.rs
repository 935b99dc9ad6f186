use serde::{Deserialize, Serialize};

use crate::{FilterGroup, ListEntryView, RecordView, SortSpec};

/// Filter, sort and window for a record or list-entry listing.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryInput {
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub filter: Option<FilterGroup>,
    #[serde(default)]
    pub sorts: Vec<SortSpec>,
    /// Case-insensitive free text matched against text-bearing attributes.
    #[serde(default)]
    pub search: Option<String>,
}

pub type ListRecordsInput = QueryInput;
pub type ListEntriesInput = QueryInput;

impl QueryInput {
    pub fn with_filter(mut self, filter: FilterGroup) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sorts.push(sort);
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Page size after applying the default and the upper bound.
    pub fn effective_limit(&self, default_limit: u32, max_limit: u32) -> u32 {
        self.limit.unwrap_or(default_limit).min(max_limit)
    }
}

/// `total` counts matches at filter time; a record deleted before hydration is missing
/// from `records` but still counted.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPage {
    pub records: Vec<RecordView>,
    pub total: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEntryPage {
    pub entries: Vec<ListEntryView>,
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::QueryInput;

    #[test]
    fn limits_default_and_clamp() {
        let input = QueryInput::default();
        assert_eq!(input.effective_limit(50, 200), 50);
        assert_eq!(input.clone().with_limit(500).effective_limit(50, 200), 200);
        assert_eq!(input.with_limit(0).effective_limit(50, 200), 0);
    }
}
