//! Session: the records of one unit of work and their association state.
//!
//! The session is an arena. Records are addressed by [`RecordId`], and the
//! identity map guarantees that a row read twice (for example a tag shared
//! by two videos) is a single record. Association state lives beside the
//! records, keyed by `(RecordId, relation name)`, so inverse links between
//! records never form ownership cycles.
//!
//! A record that is already present is never overwritten by a later fetch:
//! in-memory changes win within the unit of work.

use crate::value::{Record, Scalar};
use std::collections::HashMap;
use std::fmt;

/// Handle to a record inside a [`Session`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(usize);

impl RecordId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What an association currently points at
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AssociationTarget {
    #[default]
    Empty,
    One(RecordId),
    Many(Vec<RecordId>),
}

impl AssociationTarget {
    pub fn ids(&self) -> &[RecordId] {
        match self {
            AssociationTarget::Empty => &[],
            AssociationTarget::One(id) => std::slice::from_ref(id),
            AssociationTarget::Many(ids) => ids,
        }
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.ids().contains(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.ids().is_empty()
    }
}

/// A relation change buffered until the owner's own save
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingChange {
    Append(RecordId),
    Remove(RecordId),
}

impl PendingChange {
    pub fn target(self) -> RecordId {
        match self {
            PendingChange::Append(id) | PendingChange::Remove(id) => id,
        }
    }
}

/// State attached to one (record, relation) pair
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssociationState {
    pub loaded: bool,
    pub target: AssociationTarget,
    pub inversed: bool,
    pub pending: Vec<PendingChange>,
}

impl AssociationState {
    /// Add `id` to a to-many target, never duplicating it
    pub fn push_target(&mut self, id: RecordId) -> bool {
        match &mut self.target {
            AssociationTarget::Many(ids) => {
                if ids.contains(&id) {
                    return false;
                }
                ids.push(id);
            }
            AssociationTarget::Empty => self.target = AssociationTarget::Many(vec![id]),
            AssociationTarget::One(existing) => {
                if *existing == id {
                    return false;
                }
                self.target = AssociationTarget::Many(vec![*existing, id]);
            }
        }
        true
    }

    pub fn remove_target(&mut self, id: RecordId) -> bool {
        match &mut self.target {
            AssociationTarget::Many(ids) => {
                let before = ids.len();
                ids.retain(|existing| *existing != id);
                before != ids.len()
            }
            AssociationTarget::One(existing) if *existing == id => {
                self.target = AssociationTarget::Empty;
                true
            }
            _ => false,
        }
    }

    /// Buffer a change; an append cancels a pending remove of the same
    /// target (and vice versa), and repeats collapse.
    pub fn buffer(&mut self, change: PendingChange) {
        let target = change.target();
        self.pending.retain(|existing| existing.target() != target);
        self.pending.push(change);
    }
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    records: Vec<Option<Record>>,
    identity: HashMap<(String, Scalar), RecordId>,
    associations: HashMap<(RecordId, String), AssociationState>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record to the session
    ///
    /// A persisted record whose identity is already known resolves to the
    /// existing id; the passed copy is dropped.
    pub fn add(&mut self, record: Record) -> RecordId {
        if let Some(existing) = self.lookup(&record) {
            return existing;
        }
        let id = RecordId(self.records.len());
        if record.is_persisted() {
            if let Some(pk) = record.id() {
                self.identity.insert((record.entity().to_string(), pk.clone()), id);
            }
        }
        self.records.push(Some(record));
        id
    }

    fn lookup(&self, record: &Record) -> Option<RecordId> {
        if !record.is_persisted() {
            return None;
        }
        let pk = record.id()?;
        self.identity.get(&(record.entity().to_string(), pk.clone())).copied()
    }

    /// Find a loaded record by entity and primary key
    pub fn find(&self, entity: &str, pk: &Scalar) -> Option<RecordId> {
        self.identity.get(&(entity.to_string(), pk.clone())).copied()
    }

    pub fn get(&self, id: RecordId) -> Option<&Record> {
        self.records.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: RecordId) -> Option<&mut Record> {
        self.records.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.get(id).is_some()
    }

    /// Re-register the identity of a record after its primary key was
    /// assigned by a save.
    pub fn refresh_identity(&mut self, id: RecordId) {
        let Some(record) = self.get(id) else {
            return;
        };
        if let (true, Some(pk)) = (record.is_persisted(), record.id()) {
            let key = (record.entity().to_string(), pk.clone());
            self.identity.insert(key, id);
        }
    }

    /// Drop a record together with its identity entry and association state
    pub fn discard(&mut self, id: RecordId) -> Option<Record> {
        let record = self.records.get_mut(id.0).and_then(Option::take)?;
        self.identity.retain(|_, existing| *existing != id);
        self.associations.retain(|(owner, _), _| *owner != id);
        Some(record)
    }

    /// State of `relation` on `id`, if it was ever touched
    pub fn association(&self, id: RecordId, relation: &str) -> Option<&AssociationState> {
        self.associations.get(&(id, relation.to_string()))
    }

    /// State of `relation` on `id`, created on first access
    pub fn association_mut(&mut self, id: RecordId, relation: &str) -> &mut AssociationState {
        self.associations.entry((id, relation.to_string())).or_default()
    }

    pub fn is_loaded(&self, id: RecordId, relation: &str) -> bool {
        self.association(id, relation).is_some_and(|state| state.loaded)
    }

    /// Current target ids of `relation` on `id`
    pub fn targets(&self, id: RecordId, relation: &str) -> Vec<RecordId> {
        self.association(id, relation)
            .map(|state| state.target.ids().to_vec())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_map_returns_same_id() {
        let mut session = Session::new();
        let first = session.add(Record::loaded("tags", [("id", 1i64)]));
        let second = session.add(Record::loaded("tags", [("id", 1i64)]).with("name", "changed"));
        assert_eq!(first, second);
        // the in-memory copy wins
        assert!(session.get(first).unwrap().get("name").is_null());
        assert_eq!(session.find("tags", &Scalar::Int(1)), Some(first));
    }

    #[test]
    fn test_new_records_are_never_merged() {
        let mut session = Session::new();
        let a = session.add(Record::new("tags").with("id", 1i64));
        let b = session.add(Record::new("tags").with("id", 1i64));
        assert_ne!(a, b);
    }

    #[test]
    fn test_discard_drops_state() {
        let mut session = Session::new();
        let video = session.add(Record::loaded("videos", [("id", 1i64)]));
        session.association_mut(video, "tags").loaded = true;

        assert!(session.discard(video).is_some());
        assert!(!session.contains(video));
        assert!(session.association(video, "tags").is_none());
        assert_eq!(session.find("videos", &Scalar::Int(1)), None);
    }

    #[test]
    fn test_state_push_target_deduplicates() {
        let mut state = AssociationState::default();
        assert!(state.push_target(RecordId(1)));
        assert!(!state.push_target(RecordId(1)));
        assert!(state.push_target(RecordId(2)));
        assert_eq!(state.target.ids(), &[RecordId(1), RecordId(2)]);
        assert!(state.remove_target(RecordId(1)));
        assert_eq!(state.target.ids(), &[RecordId(2)]);
    }

    #[test]
    fn test_buffer_collapses_changes() {
        let mut state = AssociationState::default();
        state.buffer(PendingChange::Append(RecordId(3)));
        state.buffer(PendingChange::Append(RecordId(3)));
        assert_eq!(state.pending, vec![PendingChange::Append(RecordId(3))]);
        state.buffer(PendingChange::Remove(RecordId(3)));
        assert_eq!(state.pending, vec![PendingChange::Remove(RecordId(3))]);
    }
}
