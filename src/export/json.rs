//! The JSON node document and the per-kind value transformers.

use std::fs;
use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bigdecimal::BigDecimal;
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::model::{EntityRef, PropertyType, Scalar};
use crate::{Error, Result};

/// One exported node: `{"type": ..., "properties": {...}, "children": {...}}`.
///
/// `children` maps each child name to a placeholder: `{}` for an ordinary
/// child stored in `<name>.json`, `[]` for an array child stored as a
/// directory of items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeDocument {
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub children: Map<String, Value>,
}

impl NodeDocument {
    pub fn read(file: &Path) -> Result<Self> {
        let bytes = fs::read(file)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn write(&self, file: &Path) -> Result<()> {
        write_json(file, self)
    }
}

/// Pretty-print `value` into `file`, creating parent directories.
pub fn write_json<T: Serialize + ?Sized>(file: &Path, value: &T) -> Result<()> {
    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(file, serde_json::to_vec_pretty(value)?)?;
    Ok(())
}

/// `name@TYPE`
pub fn property_key(name: &str, ptype: PropertyType) -> String {
    format!("{name}@{ptype}")
}

pub fn parse_property_key(key: &str) -> Result<(&str, PropertyType)> {
    let (name, ptype) = key
        .rsplit_once('@')
        .ok_or_else(|| Error::Repository(format!("property key '{key}' has no @TYPE suffix")))?;
    if name.is_empty() {
        return Err(Error::Repository(format!("property key '{key}' has an empty name")));
    }
    Ok((name, ptype.parse()?))
}

/// Encode one scalar as its JSON representation.
pub fn to_json(raw: &Scalar) -> Result<Value> {
    let value = match raw {
        Scalar::String(s) => Value::String(s.clone()),
        Scalar::Long(v) => Value::from(*v),
        Scalar::Double(v) => Number::from_f64(*v)
            .map(Value::Number)
            .ok_or_else(|| Error::Repository(format!("double {v} has no JSON representation")))?,
        Scalar::Decimal(d) => {
            let number: Number = serde_json::from_str(&d.to_string())?;
            Value::Number(number)
        }
        Scalar::Date(d) => Value::from(d.timestamp_millis()),
        Scalar::Boolean(b) => Value::Bool(*b),
        Scalar::Binary(b) => Value::String(STANDARD.encode(b)),
        Scalar::Entity(e) => Value::String(e.to_string()),
    };
    Ok(value)
}

/// Decode one JSON value as a scalar of kind `ptype`.
pub fn from_json(ptype: PropertyType, value: &Value) -> Result<Scalar> {
    let mismatch = || Error::Repository(format!("{value} is not a valid {ptype} value"));
    let scalar = match ptype {
        PropertyType::String => Scalar::String(value.as_str().ok_or_else(mismatch)?.to_string()),
        PropertyType::Long => Scalar::Long(value.as_i64().ok_or_else(mismatch)?),
        PropertyType::Double => Scalar::Double(value.as_f64().ok_or_else(mismatch)?),
        PropertyType::Decimal => {
            let text = match value {
                Value::Number(n) => n.to_string(),
                Value::String(s) => s.clone(),
                _ => return Err(mismatch()),
            };
            Scalar::Decimal(text.parse::<BigDecimal>().map_err(|_| mismatch())?)
        }
        PropertyType::Date => {
            let millis = value.as_i64().ok_or_else(mismatch)?;
            Scalar::Date(DateTime::from_timestamp_millis(millis).ok_or_else(mismatch)?)
        }
        PropertyType::Boolean => Scalar::Boolean(value.as_bool().ok_or_else(mismatch)?),
        PropertyType::Binary => {
            let text = value.as_str().ok_or_else(mismatch)?;
            Scalar::Binary(STANDARD.decode(text).map_err(|_| mismatch())?)
        }
        PropertyType::Entity => {
            let text = value.as_str().ok_or_else(mismatch)?;
            Scalar::Entity(text.parse::<EntityRef>()?)
        }
    };
    Ok(scalar)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_wire_shapes() {
        let date = Utc.timestamp_millis_opt(1_600_000_000_000).unwrap();
        assert_eq!(to_json(&Scalar::from("hi")).unwrap(), json!("hi"));
        assert_eq!(to_json(&Scalar::from(7i64)).unwrap(), json!(7));
        assert_eq!(to_json(&Scalar::from(true)).unwrap(), json!(true));
        assert_eq!(to_json(&Scalar::from(date)).unwrap(), json!(1_600_000_000_000i64));
        assert_eq!(to_json(&Scalar::from(vec![1u8, 2, 3])).unwrap(), json!("AQID"));
        assert_eq!(
            to_json(&Scalar::from(EntityRef::new("Account", 12))).unwrap(),
            json!("Account;12")
        );
    }

    #[test]
    fn test_decimal_keeps_precision() {
        let d: BigDecimal = "3.141592653589793238462643383279".parse().unwrap();
        let encoded = to_json(&Scalar::from(d.clone())).unwrap();
        assert!(encoded.is_number());
        assert_eq!(from_json(PropertyType::Decimal, &encoded).unwrap(), Scalar::Decimal(d.clone()));
        assert_eq!(
            from_json(PropertyType::Decimal, &json!("3.141592653589793238462643383279")).unwrap(),
            Scalar::Decimal(d)
        );
    }

    #[test]
    fn test_mismatched_json_rejected() {
        assert!(from_json(PropertyType::Long, &json!("7")).is_err());
        assert!(from_json(PropertyType::Binary, &json!("***")).is_err());
        assert!(from_json(PropertyType::Entity, &json!("no-separator")).is_err());
        assert!(to_json(&Scalar::Double(f64::NAN)).is_err());
    }

    #[test]
    fn test_property_key() {
        assert_eq!(property_key("title", PropertyType::String), "title@STRING");
        assert_eq!(parse_property_key("a@b@LONG").unwrap(), ("a@b", PropertyType::Long));
        assert!(parse_property_key("title").is_err());
        assert!(parse_property_key("@LONG").is_err());
        assert!(parse_property_key("x@COLOR").is_err());
    }

    #[test]
    fn test_document_omits_empty_sections() {
        let doc = NodeDocument { node_type: "folder".into(), ..Default::default() };
        assert_eq!(serde_json::to_value(&doc).unwrap(), json!({"type": "folder"}));
        let back: NodeDocument = serde_json::from_value(json!({"type": "folder"})).unwrap();
        assert_eq!(back, doc);
    }
}
