//! Ordering and key rendering for dynamically typed field values.
//!
//! Rendering rules (these are the group keys and the fallback sort keys):
//!
//! | value          | rendering                                  |
//! |----------------|--------------------------------------------|
//! | string         | raw content, no quotes                     |
//! | integer        | decimal digits, e.g. `30`, `-4`            |
//! | float          | shortest round-trip text, e.g. `4.5`, `1.0`|
//! | boolean        | `true` / `false`                           |
//! | null           | `null`                                     |
//! | object / array | compact JSON text                          |
//!
//! So `1` and `"1"` land in the same group while `1` and `1.0` do not.

use serde_json::Value;
use std::borrow::Cow;
use std::cmp::Ordering;

pub fn render_key(v: &Value) -> Cow<'_, str> {
    match v {
        Value::String(s) => Cow::Borrowed(s.as_str()),
        Value::Number(n) => Cow::Owned(n.to_string()),
        Value::Bool(b) => Cow::Borrowed(if *b { "true" } else { "false" }),
        Value::Null => Cow::Borrowed("null"),
        other => Cow::Owned(other.to_string()),
    }
}

/// Two numbers compare by value; anything else compares by rendering.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    if let (Value::Number(x), Value::Number(y)) = (a, b) {
        if let (Some(x), Some(y)) = (x.as_f64(), y.as_f64()) {
            return x.total_cmp(&y);
        }
    }
    render_key(a).cmp(&render_key(b))
}
