/// Identity matching over register records.
///
/// Every `(key, value)` pair is applied as a filter in turn, so a record
/// matches only when all of its keyed fields agree at once. A record that
/// has no field for a key never matches; nothing here returns an error.
use serde_json::Value;

use crate::models::{Course, Session};

/// Register field names that make up a session's identity.
pub const SESSION_KEY_FIELDS: [&str; 3] = ["date", "time", "length"];

/// A record whose fields can be looked up by their register name.
pub trait Record {
    /// Value of `key`, or `None` if the record has no such field.
    fn field(&self, key: &str) -> Option<&str>;
}

impl Record for Session {
    fn field(&self, key: &str) -> Option<&str> {
        match key {
            "presenter" => Some(&self.presenter),
            "date" => Some(&self.date),
            "time" => Some(&self.time),
            "length" => Some(&self.length),
            "link" => Some(&self.link),
            "notes" => Some(&self.notes),
            "file" => Some(&self.file),
            _ => None,
        }
    }
}

impl Record for Course {
    fn field(&self, key: &str) -> Option<&str> {
        match key {
            "courseName" => Some(&self.name),
            "courseCode" => Some(&self.code),
            _ => None,
        }
    }
}

impl Record for Value {
    fn field(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }
}

/// Indices of the records in `collection` matching every key/value pair.
///
/// `keys` and `values` are paired positionally; mismatched lengths describe
/// no valid key and match nothing.
pub fn find_positions<R: Record>(collection: &[R], keys: &[&str], values: &[&str]) -> Vec<usize> {
    if keys.len() != values.len() {
        return Vec::new();
    }

    let mut positions: Vec<usize> = (0..collection.len()).collect();
    for (key, value) in keys.iter().zip(values) {
        positions.retain(|&i| collection[i].field(key) == Some(*value));
        if positions.is_empty() {
            break;
        }
    }
    positions
}

/// Records in `collection` matching every key/value pair, in input order.
pub fn find<'a, R: Record>(collection: &'a [R], keys: &[&str], values: &[&str]) -> Vec<&'a R> {
    find_positions(collection, keys, values)
        .into_iter()
        .map(|i| &collection[i])
        .collect()
}

/// Position of the first session sharing the `(date, time, length)` identity.
pub fn find_session(sessions: &[Session], date: &str, time: &str, length: &str) -> Option<usize> {
    find_positions(sessions, &SESSION_KEY_FIELDS, &[date, time, length])
        .first()
        .copied()
}
