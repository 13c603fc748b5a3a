//! Single values and their record encoding.

use bigdecimal::BigDecimal;

use crate::model::{EntityRef, PropertyType, Scalar};
use crate::storage::{Field, Record};
use crate::{Error, Result};
use super::{attr, EntityHandle, PropertyHandle, Session, ValueEntry, ValueHandle};

/// Encode a scalar as the `data` and `entityType` attributes of a value record.
pub(super) fn scalar_to_fields(raw: &Scalar) -> (Field, Field) {
    match raw {
        Scalar::String(s) => (Field::Str(s.clone()), Field::Null),
        Scalar::Long(v) => (Field::Long(*v), Field::Null),
        Scalar::Double(v) => (Field::Double(*v), Field::Null),
        Scalar::Decimal(d) => (Field::Str(d.to_string()), Field::Null),
        Scalar::Date(d) => (Field::Date(*d), Field::Null),
        Scalar::Boolean(b) => (Field::Bool(*b), Field::Null),
        Scalar::Binary(b) => (Field::Bytes(b.clone()), Field::Null),
        Scalar::Entity(e) => (Field::Long(e.id as i64), Field::Str(e.type_name.clone())),
    }
}

/// Decode the `data` attribute of a value record according to its property kind.
pub(super) fn scalar_from_record(ptype: PropertyType, record: &Record) -> Result<Scalar> {
    let data = record.get(attr::DATA);
    let scalar = match (ptype, data) {
        (PropertyType::String, Field::Str(s)) => Scalar::String(s.clone()),
        (PropertyType::Long, Field::Long(v)) => Scalar::Long(*v),
        (PropertyType::Double, Field::Double(v)) => Scalar::Double(*v),
        (PropertyType::Double, Field::Long(v)) => Scalar::Double(*v as f64),
        (PropertyType::Decimal, Field::Str(s)) => Scalar::Decimal(
            s.parse::<BigDecimal>()
                .map_err(|e| Error::Repository(format!("malformed decimal '{s}': {e}")))?,
        ),
        (PropertyType::Date, Field::Date(d)) => Scalar::Date(*d),
        (PropertyType::Boolean, Field::Bool(b)) => Scalar::Boolean(*b),
        (PropertyType::Binary, Field::Bytes(b)) => Scalar::Binary(b.clone()),
        (PropertyType::Entity, Field::Long(id)) => {
            let type_name = record
                .str(attr::ENTITY_TYPE)
                .ok_or_else(|| Error::Repository(format!("entity value {:?} has no entity type", record.id)))?;
            Scalar::Entity(EntityRef::new(type_name, *id as u64))
        }
        (ptype, other) => {
            return Err(Error::Repository(format!(
                "value {:?} holds {other:?}, expected {ptype}",
                record.id
            )));
        }
    };
    Ok(scalar)
}

impl Session {
    pub fn value(&self, value: ValueHandle) -> &Scalar {
        &self.values[value.0].raw
    }

    pub fn value_index(&self, value: ValueHandle) -> u64 {
        self.values[value.0].index
    }

    pub fn value_owner(&self, value: ValueHandle) -> PropertyHandle {
        self.values[value.0].owner
    }

    /// Stage one value for removal. Later values shift down by one.
    pub fn remove_value(&mut self, value: ValueHandle) -> Result<()> {
        self.ensure_writable()?;
        let entity = EntityHandle::Value(value);
        if !self.is_live(entity) {
            return Err(Error::ValueNotFound(self.values[value.0].index));
        }
        self.remove_value_entry(value)?;
        self.property_changed(self.values[value.0].owner);
        Ok(())
    }

    pub(super) fn create_value(
        &mut self,
        property: PropertyHandle,
        index: Option<u64>,
        raw: Scalar,
    ) -> Result<ValueHandle> {
        let index = match index {
            Some(i) => {
                self.with_value_indexer(property, |m, src| m.reserve_through(i, src))?;
                i
            }
            None => {
                // Explicitly placed values may leave gaps; append after the last one.
                let live = self.value_handles(property)?;
                let last = live.iter().map(|v| self.values[v.0].index).max();
                self.with_value_indexer(property, |m, src| {
                    if let Some(last) = last {
                        m.reserve_through(last, src)?;
                    }
                    m.pull_next_child_index(src)
                })?
            }
        };
        self.values.push(ValueEntry { record_id: None, owner: property, index, raw, detached: false });
        let value = ValueHandle(self.values.len() - 1);
        self.with_values(property, |idx, src| idx.retain(value, &*src));
        self.staging
            .create_persist(EntityHandle::Value(value), Some(EntityHandle::Property(property)));
        Ok(value)
    }

    pub(super) fn update_value(&mut self, value: ValueHandle, raw: Scalar) {
        let owner = self.values[value.0].owner;
        self.values[value.0].raw = raw;
        self.staging
            .create_persist(EntityHandle::Value(value), Some(EntityHandle::Property(owner)));
    }

    pub(super) fn remove_value_entry(&mut self, value: ValueHandle) -> Result<()> {
        let owner = self.values[value.0].owner;
        self.staging
            .create_removable(EntityHandle::Value(value), Some(EntityHandle::Property(owner)));
        self.with_values(owner, |idx, src| idx.close_gap(value, src))?;
        self.with_value_indexer(owner, |m, src| m.release(src))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{kinds, RecordId};
    use chrono::{TimeZone, Utc};

    fn value_record(data: Field, entity_type: Field) -> Record {
        Record::bound(kinds::VALUE, RecordId(7))
            .with(attr::DATA, data)
            .with(attr::ENTITY_TYPE, entity_type)
    }

    #[test]
    fn test_every_kind_decodes_what_it_encodes() {
        let samples = vec![
            Scalar::from("text"),
            Scalar::from(42i64),
            Scalar::from(1.5f64),
            Scalar::from("12345678901234567890.000001".parse::<BigDecimal>().unwrap()),
            Scalar::from(Utc.timestamp_millis_opt(1_700_000_000_123).unwrap()),
            Scalar::from(true),
            Scalar::from(vec![0u8, 255, 7]),
            Scalar::from(EntityRef::new("Account", 99)),
        ];
        for raw in samples {
            let (data, entity_type) = scalar_to_fields(&raw);
            let back = scalar_from_record(raw.property_type(), &value_record(data, entity_type)).unwrap();
            assert_eq!(back, raw);
        }
    }

    #[test]
    fn test_kind_mismatch_is_an_error() {
        let record = value_record(Field::Str("x".into()), Field::Null);
        assert!(matches!(
            scalar_from_record(PropertyType::Long, &record),
            Err(Error::Repository(_))
        ));
    }

    #[test]
    fn test_entity_needs_type() {
        let record = value_record(Field::Long(3), Field::Null);
        assert!(scalar_from_record(PropertyType::Entity, &record).is_err());
    }
}
