//! Records: typed attribute bags persisted by a [`RecordStore`](super::RecordStore).

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

/// Store-assigned record identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One attribute value inside a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Field {
    Null,
    Str(String),
    Long(i64),
    Double(f64),
    Bool(bool),
    Bytes(Vec<u8>),
    Date(DateTime<Utc>),
    Ref(RecordId),
}

impl Field {
    pub fn is_null(&self) -> bool {
        matches!(self, Field::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Field::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            Field::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Field::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_ref_id(&self) -> Option<RecordId> {
        match self {
            Field::Ref(id) => Some(*id),
            _ => None,
        }
    }

    /// Ordering used by `ORDERBY`. Nulls sort first; mismatched kinds compare equal.
    pub fn sort_cmp(&self, other: &Field) -> Ordering {
        match (self, other) {
            (Field::Null, Field::Null) => Ordering::Equal,
            (Field::Null, _) => Ordering::Less,
            (_, Field::Null) => Ordering::Greater,
            (Field::Long(a), Field::Long(b)) => a.cmp(b),
            (Field::Double(a), Field::Double(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Field::Str(a), Field::Str(b)) => a.cmp(b),
            (Field::Bool(a), Field::Bool(b)) => a.cmp(b),
            (Field::Date(a), Field::Date(b)) => a.cmp(b),
            (Field::Ref(a), Field::Ref(b)) => a.cmp(b),
            (Field::Bytes(a), Field::Bytes(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

impl From<&str> for Field { fn from(v: &str) -> Self { Field::Str(v.to_owned()) } }
impl From<String> for Field { fn from(v: String) -> Self { Field::Str(v) } }
impl From<i64> for Field { fn from(v: i64) -> Self { Field::Long(v) } }
impl From<u64> for Field { fn from(v: u64) -> Self { Field::Long(v as i64) } }
impl From<bool> for Field { fn from(v: bool) -> Self { Field::Bool(v) } }
impl From<RecordId> for Field { fn from(v: RecordId) -> Self { Field::Ref(v) } }
impl<T: Into<Field>> From<Option<T>> for Field {
    fn from(v: Option<T>) -> Self { v.map(Into::into).unwrap_or(Field::Null) }
}

/// A typed, mutable attribute bag. `id` is `None` until the record is bound to a
/// store identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub kind: String,
    pub id: Option<RecordId>,
    pub fields: HashMap<String, Field>,
}

impl Record {
    /// A fresh record with no identity.
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into(), id: None, fields: HashMap::new() }
    }

    /// A record bound to an existing identity.
    pub fn bound(kind: impl Into<String>, id: RecordId) -> Self {
        Self { kind: kind.into(), id: Some(id), fields: HashMap::new() }
    }

    pub fn with(mut self, key: &str, value: impl Into<Field>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<Field>) {
        self.fields.insert(key.to_string(), value.into());
    }

    /// Missing attributes read as `Null`.
    pub fn get(&self, key: &str) -> &Field {
        const NULL: Field = Field::Null;
        self.fields.get(key).unwrap_or(&NULL)
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.get(key).as_str()
    }

    pub fn long(&self, key: &str) -> Option<i64> {
        self.get(key).as_long()
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        self.get(key).as_bool()
    }

    pub fn reference(&self, key: &str) -> Option<RecordId> {
        self.get(key).as_ref_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_is_null() {
        let r = Record::new("Node").with("name", "a");
        assert_eq!(r.str("name"), Some("a"));
        assert!(r.get("parent").is_null());
        assert_eq!(r.reference("parent"), None);
    }

    #[test]
    fn test_option_into_field() {
        let none: Option<RecordId> = None;
        assert_eq!(Field::from(none), Field::Null);
        assert_eq!(Field::from(Some(RecordId(4))), Field::Ref(RecordId(4)));
    }

    #[test]
    fn test_sort_cmp() {
        assert_eq!(Field::Long(1).sort_cmp(&Field::Long(2)), Ordering::Less);
        assert_eq!(Field::Null.sort_cmp(&Field::Long(0)), Ordering::Less);
        assert_eq!(Field::Str("b".into()).sort_cmp(&Field::Str("a".into())), Ordering::Greater);
    }
}
