use crate::codec::Record;
use crate::compare::compare_values;
use crate::error::{JsonStashError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortOrder {
    type Err = JsonStashError;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("asc") {
            Ok(SortOrder::Asc)
        } else if s.eq_ignore_ascii_case("desc") {
            Ok(SortOrder::Desc)
        } else {
            Err(JsonStashError::InvalidArgument(
                "Order must be 'asc' or 'desc'".into(),
            ))
        }
    }
}

/// Stable sort of `records` by `field`.
///
/// `Desc` reverses the stable ascending result, so records with equal keys come
/// out in reverse fetch order. Every record must carry the field; nothing is
/// sorted otherwise.
pub fn sort_by(records: Vec<Record>, field: &str, order: SortOrder) -> Result<Vec<Record>> {
    let mut keyed = Vec::with_capacity(records.len());
    for (position, record) in records.into_iter().enumerate() {
        let Some(key) = record.get(field).cloned() else {
            return Err(JsonStashError::MissingField {
                field: field.to_string(),
                position,
            });
        };
        keyed.push((key, record));
    }
    keyed.sort_by(|(a, _), (b, _)| compare_values(a, b));
    if order == SortOrder::Desc {
        keyed.reverse();
    }
    Ok(keyed.into_iter().map(|(_, record)| record).collect())
}
