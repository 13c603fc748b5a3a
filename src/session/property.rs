//! Property operations: typed getters and setters over the value index.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};

use crate::model::{EntityRef, PropertyType, Scalar};
use crate::{Error, Result};
use super::{EntityHandle, NodeHandle, PropertyHandle, Session, ValueHandle};

/// One getter pair per value kind. A getter of the wrong kind yields nothing.
macro_rules! typed_getters {
    ($($variant:ident => $t:ty, $get:ident, $get_all:ident;)*) => {
        impl Session {
            $(
                pub fn $get(&mut self, property: PropertyHandle) -> Result<Option<$t>> {
                    match self.get_value(property)? {
                        Some(Scalar::$variant(v)) => Ok(Some(v)),
                        _ => Ok(None),
                    }
                }

                pub fn $get_all(&mut self, property: PropertyHandle) -> Result<Vec<$t>> {
                    if self.properties[property.0].ptype != PropertyType::$variant {
                        return Ok(Vec::new());
                    }
                    Ok(self
                        .get_values(property)?
                        .into_iter()
                        .filter_map(|s| match s {
                            Scalar::$variant(v) => Some(v),
                            _ => None,
                        })
                        .collect())
                }
            )*
        }
    };
}

typed_getters! {
    String => String, get_string, get_strings;
    Long => i64, get_long, get_longs;
    Double => f64, get_double, get_doubles;
    Decimal => BigDecimal, get_decimal, get_decimals;
    Date => DateTime<Utc>, get_date, get_dates;
    Boolean => bool, get_boolean, get_booleans;
    Binary => Vec<u8>, get_binary, get_binaries;
    Entity => EntityRef, get_entity, get_entities;
}

impl Session {
    pub fn property_name(&self, property: PropertyHandle) -> &str {
        &self.properties[property.0].name
    }

    pub fn property_type(&self, property: PropertyHandle) -> PropertyType {
        self.properties[property.0].ptype
    }

    pub fn is_multi_valued(&self, property: PropertyHandle) -> bool {
        self.properties[property.0].multi
    }

    pub fn property_owner(&self, property: PropertyHandle) -> NodeHandle {
        self.properties[property.0].owner
    }

    pub fn property_index(&self, property: PropertyHandle) -> u64 {
        self.properties[property.0].index
    }

    /// Live values in index order.
    pub fn value_handles(&mut self, property: PropertyHandle) -> Result<Vec<ValueHandle>> {
        self.with_values(property, |idx, src| idx.items(src))
    }

    /// The first value, or `None` when the property is empty.
    pub fn get_value(&mut self, property: PropertyHandle) -> Result<Option<Scalar>> {
        let first = if self.properties[property.0].multi {
            self.value_handles(property)?.first().copied()
        } else {
            self.with_values(property, |idx, src| idx.item(&0, src))?
        };
        Ok(first.map(|v| self.values[v.0].raw.clone()))
    }

    pub fn get_values(&mut self, property: PropertyHandle) -> Result<Vec<Scalar>> {
        let handles = self.value_handles(property)?;
        Ok(handles.into_iter().map(|v| self.values[v.0].raw.clone()).collect())
    }

    pub fn count_values(&mut self, property: PropertyHandle) -> Result<u64> {
        self.with_values(property, |idx, src| idx.item_count(src))
    }

    fn ensure_property_live(&self, property: PropertyHandle) -> Result<()> {
        if self.is_live(EntityHandle::Property(property)) {
            Ok(())
        } else {
            Err(Error::PropertyNotFound(self.properties[property.0].name.clone()))
        }
    }

    fn check_value_write(&self, property: PropertyHandle, raw: &Scalar) -> Result<()> {
        self.ensure_writable()?;
        self.ensure_property_live(property)?;
        let expected = self.properties[property.0].ptype;
        let got = raw.property_type();
        if expected != got {
            return Err(Error::TypeMismatch { expected, got });
        }
        Ok(())
    }

    /// Set the sole value. On a multi-valued property this replaces the value
    /// at index 0 and removes every later value.
    pub fn set_value(&mut self, property: PropertyHandle, raw: impl Into<Scalar>) -> Result<()> {
        let raw = Scalar::normalized(raw.into());
        self.check_value_write(property, &raw)?;
        let existing = self.value_handles(property)?;
        for &surplus in existing.iter().skip(1).rev() {
            self.remove_value_entry(surplus)?;
        }
        match existing.first() {
            Some(&v) => self.update_value(v, raw),
            None => {
                self.create_value(property, Some(0), raw)?;
            }
        }
        self.property_changed(property);
        Ok(())
    }

    /// Set the value at `index` of a multi-valued property, creating it if absent.
    ///
    /// An index past the end creates the value there and leaves the positions in
    /// between empty. Gaps are kept through flush; only removals renumber.
    pub fn set_value_at(&mut self, property: PropertyHandle, index: u64, raw: impl Into<Scalar>) -> Result<()> {
        let raw = Scalar::normalized(raw.into());
        self.check_value_write(property, &raw)?;
        if !self.properties[property.0].multi {
            return Err(Error::Repository(format!(
                "property '{}' is single-valued",
                self.properties[property.0].name
            )));
        }
        match self.with_values(property, |idx, src| idx.item(&index, src))? {
            Some(v) => self.update_value(v, raw),
            None => {
                self.create_value(property, Some(index), raw)?;
            }
        }
        self.property_changed(property);
        Ok(())
    }

    /// Replace the full ordered value list.
    pub fn set_values<I>(&mut self, property: PropertyHandle, raws: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<Scalar>,
    {
        let raws: Vec<Scalar> = raws.into_iter().map(|r| Scalar::normalized(r.into())).collect();
        self.ensure_writable()?;
        self.ensure_property_live(property)?;
        if !self.properties[property.0].multi && raws.len() > 1 {
            return Err(Error::Repository(format!(
                "property '{}' is single-valued, got {} values",
                self.properties[property.0].name,
                raws.len()
            )));
        }
        for raw in &raws {
            self.check_value_write(property, raw)?;
        }

        let existing = self.value_handles(property)?;
        if existing.len() > raws.len() {
            for &surplus in existing[raws.len()..].iter().rev() {
                self.remove_value_entry(surplus)?;
            }
        }
        for (i, raw) in raws.into_iter().enumerate() {
            match existing.get(i) {
                Some(&v) => self.update_value(v, raw),
                None => {
                    self.create_value(property, None, raw)?;
                }
            }
        }
        self.property_changed(property);
        Ok(())
    }

    /// Append a value. Degrades to [`Session::set_value`] on a single-valued property.
    pub fn add_value(&mut self, property: PropertyHandle, raw: impl Into<Scalar>) -> Result<()> {
        if !self.properties[property.0].multi {
            return self.set_value(property, raw);
        }
        let raw = Scalar::normalized(raw.into());
        self.check_value_write(property, &raw)?;
        self.create_value(property, None, raw)?;
        self.property_changed(property);
        Ok(())
    }
}
