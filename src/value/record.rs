//! The `Record` entity: a typed attribute bag with dirty tracking.

use super::types::{AttrValue, Scalar};
use crate::error::StoreError;
use std::collections::{BTreeMap, BTreeSet};

static NULL: AttrValue = AttrValue::Null;

/// One row of an entity, owned by the caller's `Session`
///
/// Attributes that were never assigned read as [`AttrValue::Null`]. `set`
/// marks an attribute as changed only when the value actually differs, so
/// `is_changed()` reflects real pending writes.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    entity: String,
    primary_key: String,
    attributes: BTreeMap<String, AttrValue>,
    changed: BTreeSet<String>,
    persisted: bool,
}

impl Record {
    /// A new, not yet persisted record with primary key column `id`
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            primary_key: "id".to_string(),
            attributes: BTreeMap::new(),
            changed: BTreeSet::new(),
            persisted: false,
        }
    }

    /// A record as read from the store: persisted, nothing changed
    pub fn loaded<I, K, V>(entity: impl Into<String>, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<AttrValue>,
    {
        let mut record = Self::new(entity);
        record.attributes = attributes
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        record.persisted = true;
        record
    }

    /// Build a new record from a JSON object
    ///
    /// # Errors
    ///
    /// Returns `StoreError::ParseError` when `value` is not an object or an
    /// attribute is not a scalar, array of scalars, or null.
    pub fn from_json(entity: impl Into<String>, value: serde_json::Value) -> Result<Self, StoreError> {
        let entity = entity.into();
        let serde_json::Value::Object(map) = value else {
            return Err(StoreError::ParseError(format!(
                "expected a JSON object for {entity}"
            )));
        };
        let mut record = Self::new(entity);
        for (name, raw) in map {
            let parsed: AttrValue = serde_json::from_value(raw)
                .map_err(|e| StoreError::ParseError(format!("attribute {name}: {e}")))?;
            record.set(name, parsed);
        }
        Ok(record)
    }

    pub fn with_primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    /// Builder-style `set`
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Primary key value, if assigned
    pub fn id(&self) -> Option<&Scalar> {
        self.get(&self.primary_key).as_scalar()
    }

    pub fn get(&self, name: &str) -> &AttrValue {
        self.attributes.get(name).unwrap_or(&NULL)
    }

    /// Assign an attribute; returns whether the value changed
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> bool {
        let name = name.into();
        let value = value.into();
        if self.get(&name) == &value {
            return false;
        }
        self.attributes.insert(name.clone(), value);
        self.changed.insert(name);
        true
    }

    pub fn attributes(&self) -> &BTreeMap<String, AttrValue> {
        &self.attributes
    }

    pub fn is_new_record(&self) -> bool {
        !self.persisted
    }

    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    pub fn is_changed(&self) -> bool {
        !self.changed.is_empty()
    }

    pub fn is_attribute_changed(&self, name: &str) -> bool {
        self.changed.contains(name)
    }

    pub fn changed_attributes(&self) -> impl Iterator<Item = &str> {
        self.changed.iter().map(String::as_str)
    }

    /// Called by a store after a successful write of the whole row
    pub fn mark_persisted(&mut self) {
        self.persisted = true;
        self.changed.clear();
    }

    /// Called by a store after writing a single attribute
    pub fn clear_change(&mut self, name: &str) {
        self.changed.remove(name);
    }

    /// Append `value` to an array attribute unless already present
    ///
    /// A null attribute is treated as the empty array. Returns whether the
    /// attribute changed.
    pub fn push_unique(&mut self, name: &str, value: Scalar) -> bool {
        let mut items = self.get(name).elements().to_vec();
        if items.contains(&value) {
            return false;
        }
        items.push(value);
        self.set(name, AttrValue::Array(items))
    }

    /// Remove every occurrence of `value` from an array attribute
    pub fn remove_all(&mut self, name: &str, value: &Scalar) -> bool {
        let items = self.get(name).elements();
        if !items.contains(value) {
            return false;
        }
        let kept: Vec<Scalar> = items.iter().filter(|item| *item != value).cloned().collect();
        self.set(name, AttrValue::Array(kept))
    }
}
