use crate::codec::Record;
use crate::compare::render_key;
use crate::error::{JsonStashError, Result};
use indexmap::IndexMap;

/// Group key -> records, in first-seen group order.
pub type GroupedRecords = IndexMap<String, Vec<Record>>;

/// Partition `records` by the rendered value of `field`.
///
/// A present `null` is a regular key. An absent key fails the whole call with
/// the fetch position of the first record lacking it.
pub fn group_by(records: Vec<Record>, field: &str) -> Result<GroupedRecords> {
    let mut groups = GroupedRecords::new();
    for (position, record) in records.into_iter().enumerate() {
        let key = match record.get(field) {
            Some(v) => render_key(v).into_owned(),
            None => {
                return Err(JsonStashError::MissingField {
                    field: field.to_string(),
                    position,
                })
            }
        };
        groups.entry(key).or_default().push(record);
    }
    Ok(groups)
}
