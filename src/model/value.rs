//! Property kinds and the raw scalar carried by a single value.

use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// The kind of every value held by a property. Fixed when the property is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PropertyType {
    String,
    Long,
    Double,
    Decimal,
    Date,
    Boolean,
    Binary,
    Entity,
}

impl PropertyType {
    pub const ALL: [PropertyType; 8] = [
        PropertyType::String,
        PropertyType::Long,
        PropertyType::Double,
        PropertyType::Decimal,
        PropertyType::Date,
        PropertyType::Boolean,
        PropertyType::Binary,
        PropertyType::Entity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::String => "STRING",
            PropertyType::Long => "LONG",
            PropertyType::Double => "DOUBLE",
            PropertyType::Decimal => "DECIMAL",
            PropertyType::Date => "DATE",
            PropertyType::Boolean => "BOOLEAN",
            PropertyType::Binary => "BINARY",
            PropertyType::Entity => "ENTITY",
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        PropertyType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::Repository(format!("unsupported property type '{s}'")))
    }
}

/// Reference to another persisted entity, by type name and numeric identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub type_name: String,
    pub id: u64,
}

impl EntityRef {
    pub fn new(type_name: impl Into<String>, id: u64) -> Self {
        Self { type_name: type_name.into(), id }
    }
}

/// Renders as `TypeName;id`.
impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{}", self.type_name, self.id)
    }
}

impl FromStr for EntityRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (type_name, id) = s
            .rsplit_once(';')
            .ok_or_else(|| Error::Repository(format!("malformed entity reference '{s}'")))?;
        if type_name.is_empty() {
            return Err(Error::Repository(format!("entity reference without type '{s}'")));
        }
        let id = id
            .parse::<u64>()
            .map_err(|_| Error::Repository(format!("malformed entity id in '{s}'")))?;
        Ok(Self::new(type_name, id))
    }
}

/// One typed scalar, the payload of a single value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    String(String),
    Long(i64),
    Double(f64),
    Decimal(BigDecimal),
    Date(DateTime<Utc>),
    Boolean(bool),
    Binary(Vec<u8>),
    Entity(EntityRef),
}

impl Scalar {
    /// The form a value is stored in. Dates keep millisecond precision, the
    /// resolution of the backing store and of the file codec.
    pub fn normalized(self) -> Self {
        match self {
            Scalar::Date(d) => Scalar::Date(d.trunc_subsecs(3)),
            other => other,
        }
    }

    pub fn property_type(&self) -> PropertyType {
        match self {
            Scalar::String(_) => PropertyType::String,
            Scalar::Long(_) => PropertyType::Long,
            Scalar::Double(_) => PropertyType::Double,
            Scalar::Decimal(_) => PropertyType::Decimal,
            Scalar::Date(_) => PropertyType::Date,
            Scalar::Boolean(_) => PropertyType::Boolean,
            Scalar::Binary(_) => PropertyType::Binary,
            Scalar::Entity(_) => PropertyType::Entity,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            Scalar::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Scalar::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<&BigDecimal> {
        match self {
            Scalar::Decimal(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Scalar::Date(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Scalar::Binary(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&EntityRef> {
        match self {
            Scalar::Entity(v) => Some(v),
            _ => None,
        }
    }
}

// ============================================================================
// Conversions (From impls)
// ============================================================================

impl From<String> for Scalar { fn from(v: String) -> Self { Scalar::String(v) } }
impl From<&str> for Scalar { fn from(v: &str) -> Self { Scalar::String(v.to_owned()) } }
impl From<i64> for Scalar { fn from(v: i64) -> Self { Scalar::Long(v) } }
impl From<i32> for Scalar { fn from(v: i32) -> Self { Scalar::Long(v as i64) } }
impl From<f64> for Scalar { fn from(v: f64) -> Self { Scalar::Double(v) } }
impl From<BigDecimal> for Scalar { fn from(v: BigDecimal) -> Self { Scalar::Decimal(v) } }
impl From<DateTime<Utc>> for Scalar { fn from(v: DateTime<Utc>) -> Self { Scalar::Date(v) } }
impl From<bool> for Scalar { fn from(v: bool) -> Self { Scalar::Boolean(v) } }
impl From<Vec<u8>> for Scalar { fn from(v: Vec<u8>) -> Self { Scalar::Binary(v) } }
impl From<&[u8]> for Scalar { fn from(v: &[u8]) -> Self { Scalar::Binary(v.to_vec()) } }
impl From<EntityRef> for Scalar { fn from(v: EntityRef) -> Self { Scalar::Entity(v) } }

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::String(s) => write!(f, "\"{}\"", s.replace('"', "\\\"")),
            Scalar::Long(v) => write!(f, "{v}"),
            Scalar::Double(v) => write!(f, "{v}"),
            Scalar::Decimal(v) => write!(f, "{v}"),
            Scalar::Date(v) => write!(f, "{}", v.to_rfc3339()),
            Scalar::Boolean(v) => write!(f, "{v}"),
            Scalar::Binary(v) => write!(f, "<bytes[{}]>", v.len()),
            Scalar::Entity(v) => write!(f, "{v}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_type_names() {
        for t in PropertyType::ALL {
            assert_eq!(t.as_str().parse::<PropertyType>().unwrap(), t);
        }
        assert_eq!("long".parse::<PropertyType>().unwrap(), PropertyType::Long);
        assert!("VECTOR".parse::<PropertyType>().is_err());
    }

    #[test]
    fn test_entity_ref_text() {
        let e: EntityRef = "Invoice;42".parse().unwrap();
        assert_eq!(e, EntityRef::new("Invoice", 42));
        assert_eq!(e.to_string(), "Invoice;42");
        assert!("Invoice".parse::<EntityRef>().is_err());
        assert!(";3".parse::<EntityRef>().is_err());
        assert!("Invoice;x".parse::<EntityRef>().is_err());
    }

    #[test]
    fn test_scalar_from() {
        assert_eq!(Scalar::from("hello"), Scalar::String("hello".into()));
        assert_eq!(Scalar::from(42), Scalar::Long(42));
        assert_eq!(Scalar::from(true).property_type(), PropertyType::Boolean);
        assert_eq!(Scalar::from(vec![1u8, 2]).as_bytes(), Some(&[1u8, 2][..]));
        assert_eq!(Scalar::from(1.5).as_long(), None);
    }

    #[test]
    fn test_normalized_truncates_dates_to_millis() {
        let precise = DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap();
        let Scalar::Date(stored) = Scalar::from(precise).normalized() else {
            panic!("not a date");
        };
        assert_eq!(stored.timestamp_millis(), precise.timestamp_millis());
        assert_eq!(stored.timestamp_subsec_nanos(), 123_000_000);
        assert_eq!(Scalar::from(7).normalized(), Scalar::Long(7));
    }
}
