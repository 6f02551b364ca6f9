//! In-process store.
//!
//! Tables are vectors of records keyed by entity name. `begin` pushes a
//! snapshot of all tables, `rollback` restores it, so nested units of work
//! behave like savepoints. Validators run on `save(.., true)`; constraints
//! run on every write, the way database constraints would.

use super::{check_rules, Fetcher, Predicate, Rule, StoreWriter, UnitOfWork};
use crate::error::StoreError;
use crate::value::{AttrValue, Record, Scalar};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default)]
struct Tables {
    rows: BTreeMap<String, Vec<Record>>,
    next_ids: HashMap<String, i64>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RefCell<Tables>,
    snapshots: RefCell<Vec<Tables>>,
    validators: RefCell<HashMap<String, Vec<Rule>>>,
    constraints: RefCell<HashMap<String, Vec<Rule>>>,
    fetches: RefCell<Vec<(String, Predicate)>>,
    writes: RefCell<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a validation run by `save(record, true)`
    pub fn add_validator<F>(&self, entity: &str, rule: F)
    where
        F: Fn(&Record) -> Result<(), String> + 'static,
    {
        self.validators
            .borrow_mut()
            .entry(entity.to_string())
            .or_default()
            .push(Box::new(rule));
    }

    /// Add a constraint checked on every write
    pub fn add_constraint<F>(&self, entity: &str, rule: F)
    where
        F: Fn(&Record) -> Result<(), String> + 'static,
    {
        self.constraints
            .borrow_mut()
            .entry(entity.to_string())
            .or_default()
            .push(Box::new(rule));
    }

    /// Insert a row directly, bypassing rules; returns the stored copy
    pub fn seed(&self, record: Record) -> Record {
        let mut record = record;
        let mut tables = self.tables.borrow_mut();
        assign_id(&mut tables, &mut record);
        record.mark_persisted();
        tables
            .rows
            .entry(record.entity().to_string())
            .or_default()
            .push(record.clone());
        record
    }

    pub fn find(&self, entity: &str, id: &Scalar) -> Option<Record> {
        self.tables
            .borrow()
            .rows
            .get(entity)?
            .iter()
            .find(|row| row.id() == Some(id))
            .cloned()
    }

    pub fn rows(&self, entity: &str) -> Vec<Record> {
        self.tables
            .borrow()
            .rows
            .get(entity)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of `fetch` calls so far
    pub fn fetch_count(&self) -> usize {
        self.fetches.borrow().len()
    }

    /// Every `fetch` call so far, in order
    pub fn fetches(&self) -> Vec<(String, Predicate)> {
        self.fetches.borrow().clone()
    }

    /// Number of successful `save` and `update_attribute` calls
    pub fn write_count(&self) -> usize {
        *self.writes.borrow()
    }

    fn check_constraints(&self, record: &Record) -> Result<(), StoreError> {
        check_rules(&self.constraints.borrow(), record).map_err(|e| {
            StoreError::QueryError(format!(
                "constraint violated on {}: {}",
                e.entity,
                e.messages.join(", ")
            ))
        })
    }
}

fn assign_id(tables: &mut Tables, record: &mut Record) {
    let entity = record.entity().to_string();
    let max_existing = tables
        .rows
        .get(&entity)
        .into_iter()
        .flatten()
        .filter_map(|row| match row.id() {
            Some(Scalar::Int(i)) => Some(*i),
            _ => None,
        })
        .max()
        .unwrap_or(0);
    let next = tables.next_ids.entry(entity).or_insert(0);

    match record.id() {
        Some(Scalar::Int(i)) => *next = (*next).max(*i),
        Some(_) => {}
        None => {
            *next = (*next).max(max_existing) + 1;
            let pk = record.primary_key().to_string();
            record.set(pk, *next);
        }
    }
}

impl Fetcher for MemoryStore {
    fn fetch(&self, entity: &str, predicate: &Predicate) -> Result<Vec<Record>, StoreError> {
        self.fetches
            .borrow_mut()
            .push((entity.to_string(), predicate.clone()));
        let tables = self.tables.borrow();
        Ok(tables
            .rows
            .get(entity)
            .map(|rows| rows.iter().filter(|row| predicate.matches(row)).cloned().collect())
            .unwrap_or_default())
    }
}

impl StoreWriter for MemoryStore {
    fn save(&self, record: &mut Record, validate: bool) -> Result<(), StoreError> {
        if validate {
            check_rules(&self.validators.borrow(), record)?;
        }
        self.check_constraints(record)?;

        let mut tables = self.tables.borrow_mut();
        if record.is_new_record() {
            assign_id(&mut tables, record);
            let mut stored = record.clone();
            stored.mark_persisted();
            tables
                .rows
                .entry(record.entity().to_string())
                .or_default()
                .push(stored);
        } else {
            let id = record
                .id()
                .cloned()
                .ok_or_else(|| StoreError::Other(format!("{} record has no primary key", record.entity())))?;
            let row = tables
                .rows
                .get_mut(record.entity())
                .and_then(|rows| rows.iter_mut().find(|row| row.id() == Some(&id)))
                .ok_or_else(|| StoreError::Other(format!("{} {id} does not exist", record.entity())))?;
            let mut stored = record.clone();
            stored.mark_persisted();
            *row = stored;
        }
        record.mark_persisted();
        *self.writes.borrow_mut() += 1;
        Ok(())
    }

    fn update_attribute(
        &self,
        record: &mut Record,
        name: &str,
        value: AttrValue,
    ) -> Result<(), StoreError> {
        if record.is_new_record() {
            return Err(StoreError::Other(format!(
                "cannot update {name} on a new {} record",
                record.entity()
            )));
        }
        let id = record
            .id()
            .cloned()
            .ok_or_else(|| StoreError::Other(format!("{} record has no primary key", record.entity())))?;

        let mut candidate = record.clone();
        candidate.set(name, value.clone());
        self.check_constraints(&candidate)?;

        let mut tables = self.tables.borrow_mut();
        let row = tables
            .rows
            .get_mut(record.entity())
            .and_then(|rows| rows.iter_mut().find(|row| row.id() == Some(&id)))
            .ok_or_else(|| StoreError::Other(format!("{} {id} does not exist", record.entity())))?;
        row.set(name, value.clone());
        row.clear_change(name);

        record.set(name, value);
        record.clear_change(name);
        *self.writes.borrow_mut() += 1;
        Ok(())
    }
}

impl UnitOfWork for MemoryStore {
    fn begin(&self) -> Result<(), StoreError> {
        let snapshot = self.tables.borrow().clone();
        self.snapshots.borrow_mut().push(snapshot);
        Ok(())
    }

    fn commit(&self) -> Result<(), StoreError> {
        self.snapshots
            .borrow_mut()
            .pop()
            .map(|_| ())
            .ok_or_else(|| StoreError::Other("commit without an open unit of work".to_string()))
    }

    fn rollback(&self) -> Result<(), StoreError> {
        let snapshot = self
            .snapshots
            .borrow_mut()
            .pop()
            .ok_or_else(|| StoreError::Other("rollback without an open unit of work".to_string()))?;
        *self.tables.borrow_mut() = snapshot;
        Ok(())
    }
}
