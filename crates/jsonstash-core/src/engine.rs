use crate::codec::{self, Record};
use crate::error::{JsonStashError, Result};
use crate::group::{group_by, GroupedRecords};
use crate::sort::{sort_by, SortOrder};
use crate::store::RecordStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const INSERT_MESSAGE: &str = "Record added successfully";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertResponse {
    pub message: String,
    pub dataset: String,
    pub record_id: u64,
}

/// Either grouped or sorted records, never both.
///
/// Serializes as `{"groupedRecords": {...}}` or `{"sortedRecords": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryResponse {
    GroupedRecords(GroupedRecords),
    SortedRecords(Vec<Record>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    #[serde(default)]
    pub group_by: Option<String>,
    #[serde(default)]
    pub sort_by: Option<String>,
    /// `asc` / `desc`, any case. Defaults to `asc`.
    #[serde(default)]
    pub order: Option<String>,
}

impl QueryRequest {
    pub fn grouped(field: impl Into<String>) -> Self {
        Self {
            group_by: Some(field.into()),
            ..Default::default()
        }
    }

    pub fn sorted(field: impl Into<String>, order: impl Into<String>) -> Self {
        Self {
            sort_by: Some(field.into()),
            order: Some(order.into()),
            ..Default::default()
        }
    }
}

/// Ingest and query front door over a [`RecordStore`].
///
/// Holds no per-request state; clones share the store.
#[derive(Clone)]
pub struct QueryEngine {
    store: Arc<dyn RecordStore>,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn insert(&self, dataset: &str, record: &Record) -> Result<InsertResponse> {
        if record.is_empty() {
            return Err(JsonStashError::InvalidArgument(
                "JSON body cannot be empty".into(),
            ));
        }
        let json = codec::encode(record)?;
        let record_id = self.store.save(dataset, &json)?;
        tracing::debug!(dataset, record_id, "record inserted");
        Ok(InsertResponse {
            message: INSERT_MESSAGE.to_string(),
            dataset: dataset.to_string(),
            record_id,
        })
    }

    /// Group takes precedence: with a non-empty `group_by`, `sort_by` and
    /// `order` are not applied (though `order` is still validated). An empty
    /// `order` means ascending.
    pub fn query(&self, dataset: &str, request: &QueryRequest) -> Result<QueryResponse> {
        let order = match non_empty(&request.order) {
            Some(o) => o.parse::<SortOrder>()?,
            None => SortOrder::default(),
        };

        let raw = self.store.find_all(dataset)?;
        if raw.is_empty() {
            return Err(JsonStashError::DatasetNotFound {
                dataset: dataset.to_string(),
            });
        }
        let records = raw
            .iter()
            .map(|json| codec::decode(json))
            .collect::<Result<Vec<_>>>()?;

        if let Some(field) = non_empty(&request.group_by) {
            tracing::debug!(dataset, field, records = records.len(), "grouping");
            return Ok(QueryResponse::GroupedRecords(group_by(records, field)?));
        }
        match non_empty(&request.sort_by) {
            Some(field) => {
                tracing::debug!(dataset, field, ?order, records = records.len(), "sorting");
                Ok(QueryResponse::SortedRecords(sort_by(records, field, order)?))
            }
            None => Ok(QueryResponse::SortedRecords(records)),
        }
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|f| !f.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn engine() -> QueryEngine {
        QueryEngine::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn response_shapes_serialize_with_camel_case_tags() {
        let insert = InsertResponse {
            message: INSERT_MESSAGE.into(),
            dataset: "people".into(),
            record_id: 1,
        };
        assert_eq!(
            serde_json::to_value(&insert).unwrap(),
            json!({"message": "Record added successfully", "dataset": "people", "recordId": 1})
        );

        let sorted = QueryResponse::SortedRecords(vec![]);
        assert_eq!(serde_json::to_value(&sorted).unwrap(), json!({"sortedRecords": []}));
        let grouped = QueryResponse::GroupedRecords(GroupedRecords::new());
        assert_eq!(serde_json::to_value(&grouped).unwrap(), json!({"groupedRecords": {}}));
    }

    #[test]
    fn bad_order_is_rejected_before_fetch() {
        // the dataset does not exist, so reaching the store would be NotFound
        let err = engine()
            .query("missing", &QueryRequest::sorted("age", "sideways"))
            .unwrap_err();
        assert!(matches!(err, JsonStashError::InvalidArgument(_)));
    }

    #[test]
    fn bad_order_is_rejected_even_when_grouping() -> Result<()> {
        let engine = engine();
        engine.insert("people", json!({"city": "Paris"}).as_object().unwrap())?;
        let req = QueryRequest {
            group_by: Some("city".into()),
            order: Some("up".into()),
            ..Default::default()
        };
        let err = engine.query("people", &req).unwrap_err();
        assert!(matches!(err, JsonStashError::InvalidArgument(_)));
        Ok(())
    }

    #[test]
    fn empty_order_sorts_ascending() -> Result<()> {
        let engine = engine();
        for age in [30, 10, 20] {
            engine.insert("d", json!({"age": age}).as_object().unwrap())?;
        }
        let QueryResponse::SortedRecords(rows) =
            engine.query("d", &QueryRequest::sorted("age", ""))?
        else {
            panic!("expected sorted records");
        };
        let ages: Vec<_> = rows.iter().map(|r| r["age"].clone()).collect();
        assert_eq!(ages, vec![json!(10), json!(20), json!(30)]);
        Ok(())
    }

    #[test]
    fn empty_record_is_rejected() {
        let err = engine().insert("people", &Record::new()).unwrap_err();
        assert!(matches!(err, JsonStashError::InvalidArgument(ref m) if m == "JSON body cannot be empty"));
    }

    #[test]
    fn empty_field_names_mean_no_operation() -> Result<()> {
        let engine = engine();
        for age in [3, 1, 2] {
            engine.insert("d", json!({"age": age}).as_object().unwrap())?;
        }
        let req = QueryRequest {
            group_by: Some(String::new()),
            sort_by: Some(String::new()),
            order: None,
        };
        let QueryResponse::SortedRecords(rows) = engine.query("d", &req)? else {
            panic!("expected sorted records");
        };
        let ages: Vec<_> = rows.iter().map(|r| r["age"].clone()).collect();
        assert_eq!(ages, vec![json!(3), json!(1), json!(2)]);
        Ok(())
    }
}
