//! Store collaborators.
//!
//! The engine never talks to a database directly. It reads through a
//! [`Fetcher`], writes through a [`StoreWriter`], and leaves transaction
//! boundaries to the caller's [`UnitOfWork`]. Two implementations ship with
//! the crate:
//!
//! - [`MemoryStore`] - in-process tables with snapshots and validators
//! - [`PgStore`] - PostgreSQL through an [`Executor`](crate::executor::Executor)

pub mod memory;
pub mod postgres;
pub mod predicate;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use predicate::Predicate;

use crate::error::{RelationError, StoreError, ValidationError};
use crate::session::Session;
use crate::value::{AttrValue, Record};
use std::collections::HashMap;

/// Validation or constraint rule: `Err(message)` rejects the record
pub type Rule = Box<dyn Fn(&Record) -> Result<(), String>>;

/// Run the rules registered for the record's entity, collecting every message
pub(crate) fn check_rules(
    rules: &HashMap<String, Vec<Rule>>,
    record: &Record,
) -> Result<(), ValidationError> {
    let messages: Vec<String> = rules
        .get(record.entity())
        .map(|rules| rules.iter().filter_map(|rule| rule(record).err()).collect())
        .unwrap_or_default();
    if messages.is_empty() {
        Ok(())
    } else {
        Err(ValidationError {
            entity: record.entity().to_string(),
            messages,
        })
    }
}

/// Read side of a store
pub trait Fetcher {
    /// All records of `entity` matching `predicate`, as persisted records
    fn fetch(&self, entity: &str, predicate: &Predicate) -> Result<Vec<Record>, StoreError>;
}

/// Write side of a store
pub trait StoreWriter {
    /// Insert a new record or update a persisted one
    ///
    /// Entity validations run only when `validate` is true; a failure is
    /// reported as `StoreError::Validation`. On success the record is marked
    /// persisted and its primary key is filled in.
    fn save(&self, record: &mut Record, validate: bool) -> Result<(), StoreError>;

    /// Write a single attribute of a persisted record, skipping validations
    fn update_attribute(
        &self,
        record: &mut Record,
        name: &str,
        value: AttrValue,
    ) -> Result<(), StoreError>;
}

/// Transaction boundary owned by the caller
pub trait UnitOfWork {
    fn begin(&self) -> Result<(), StoreError>;
    fn commit(&self) -> Result<(), StoreError>;
    fn rollback(&self) -> Result<(), StoreError>;
}

/// Run `f` inside a unit of work
///
/// Commits when `f` returns `Ok`. On `Err` (an `AbortUnitOfWork` in
/// particular) or a failed commit the store is rolled back and `session` is
/// restored to its state before `f` ran, so no pending change survives the
/// failed attempt.
pub fn within_unit_of_work<U, T, F>(
    store: &U,
    session: &mut Session,
    f: F,
) -> Result<T, RelationError>
where
    U: UnitOfWork + ?Sized,
    F: FnOnce(&mut Session) -> Result<T, RelationError>,
{
    let snapshot = session.clone();
    store.begin()?;

    let result = f(session).and_then(|value| {
        store.commit()?;
        Ok(value)
    });
    if let Err(err) = &result {
        log::debug!("rolling back unit of work: {err}");
        if let Err(rollback_err) = store.rollback() {
            log::warn!("rollback failed after {err}: {rollback_err}");
        }
        *session = snapshot;
    }
    result
}
