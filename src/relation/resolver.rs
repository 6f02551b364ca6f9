//! Batch resolution of relations.
//!
//! This uses the "selectin" strategy for every connection:
//! 1. Skip owners whose relation is already loaded
//! 2. Index the remaining owners by their key elements ([`OwnerIndex`])
//! 3. Fetch all candidate targets in one query
//! 4. Group the targets by their key elements and assign them to owners
//! 5. Fill in the inverse relation on every target
//!
//! Resolving is idempotent: a second call for the same owners finds every
//! owner loaded and issues no fetch.

use super::codec::{KeyCodec, KeyValue};
use super::def::{Cardinality, KeySide, RelationDescriptor};
use super::index::OwnerIndex;
use super::registry::RelationRegistry;
use super::strategy::strategy_for;
use crate::error::RelationError;
use crate::session::{AssociationTarget, RecordId, Session};
use crate::store::{Fetcher, Predicate};
use crate::value::{Record, Scalar};
use std::collections::HashMap;
use std::time::Instant;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

pub struct Resolver<'a, F: Fetcher + ?Sized> {
    fetcher: &'a F,
    registry: &'a RelationRegistry,
}

impl<'a, F: Fetcher + ?Sized> Resolver<'a, F> {
    pub fn new(fetcher: &'a F, registry: &'a RelationRegistry) -> Self {
        Self { fetcher, registry }
    }

    /// Resolve the relation named `relation` for `owners`
    ///
    /// All owners must belong to the same entity.
    pub fn resolve_named(
        &self,
        session: &mut Session,
        owners: &[RecordId],
        relation: &str,
    ) -> Result<(), RelationError> {
        let Some(&first) = owners.first() else {
            return Ok(());
        };
        let entity = session
            .get(first)
            .ok_or(RelationError::RecordNotFound(first))?
            .entity()
            .to_string();
        let descriptor = self.registry.lookup(&entity, relation)?;
        self.resolve(session, owners, descriptor)
    }

    /// Resolve `descriptor` for every owner not loaded yet
    ///
    /// # Errors
    ///
    /// - `RecordNotFound` if an owner is not part of the session
    /// - `MultipleResults` if an array-connected `has_one` matches more than
    ///   one target for an owner; no association state is changed then
    /// - `Store` if the fetch fails
    pub fn resolve(
        &self,
        session: &mut Session,
        owners: &[RecordId],
        descriptor: &RelationDescriptor,
    ) -> Result<(), RelationError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::resolve_span(&descriptor.owner_entity, &descriptor.name, owners.len())
            .entered();

        let mut pending: Vec<RecordId> = Vec::with_capacity(owners.len());
        for &owner in owners {
            let record = session.get(owner).ok_or(RelationError::RecordNotFound(owner))?;
            if pending.contains(&owner) || session.is_loaded(owner, &descriptor.name) {
                continue;
            }
            if record.is_new_record() {
                // nothing to read for an unsaved owner; its state is whatever was assigned
                session.association_mut(owner, &descriptor.name).loaded = true;
                continue;
            }
            pending.push(owner);
        }

        if pending.is_empty() {
            log::debug!(
                "{}.{} already loaded for {} owners",
                descriptor.owner_entity,
                descriptor.name,
                owners.len()
            );
            return Ok(());
        }

        if descriptor.polymorphic {
            return self.resolve_polymorphic(session, &pending, descriptor);
        }
        self.resolve_batch(session, &pending, descriptor, &descriptor.target_entity)
    }

    /// Targets of `relation` on one owner, resolving it first if needed
    pub fn targets(
        &self,
        session: &mut Session,
        owner: RecordId,
        descriptor: &RelationDescriptor,
    ) -> Result<Vec<RecordId>, RelationError> {
        self.resolve(session, &[owner], descriptor)?;
        Ok(session.targets(owner, &descriptor.name))
    }

    /// One fetch per target entity named in the owners' type column
    fn resolve_polymorphic(
        &self,
        session: &mut Session,
        owners: &[RecordId],
        descriptor: &RelationDescriptor,
    ) -> Result<(), RelationError> {
        let type_column = descriptor
            .foreign_type
            .as_deref()
            .ok_or_else(|| {
                RelationError::Configuration(format!(
                    "polymorphic relation {} has no type column",
                    descriptor.name
                ))
            })?;

        let mut groups: Vec<(String, Vec<RecordId>)> = Vec::new();
        let mut untyped = Vec::new();
        for &owner in owners {
            let record = session.get(owner).ok_or(RelationError::RecordNotFound(owner))?;
            match record.get(type_column).as_scalar() {
                Some(Scalar::Text(entity)) => match groups.iter_mut().find(|(e, _)| e.as_str() == entity.as_str()) {
                    Some((_, members)) => members.push(owner),
                    None => groups.push((entity.clone(), vec![owner])),
                },
                _ => untyped.push(owner),
            }
        }

        for (entity, members) in &groups {
            self.resolve_batch(session, members, descriptor, entity)?;
        }
        for owner in untyped {
            let state = session.association_mut(owner, &descriptor.name);
            state.loaded = true;
            state.target = AssociationTarget::Empty;
        }
        Ok(())
    }

    fn resolve_batch(
        &self,
        session: &mut Session,
        owners: &[RecordId],
        descriptor: &RelationDescriptor,
        target_entity: &str,
    ) -> Result<(), RelationError> {
        let codec = KeyCodec::new(descriptor);
        let strategy = strategy_for(descriptor);
        let index = OwnerIndex::build(session, owners, |record| codec.encode_owner_key(record));

        let fetched = if index.is_empty() {
            Vec::new()
        } else {
            let predicate = strategy.predicate(descriptor, index.keys());
            self.fetch(target_entity, &predicate)?
        };
        // records already in the session keep their in-memory state, so keys
        // are read from the session copy rather than the fetched row
        let target_ids: Vec<RecordId> = distinct_by_identity(fetched)
            .into_iter()
            .map(|target| session.add(target))
            .collect();
        let target_records = target_ids
            .iter()
            .enumerate()
            .filter_map(|(position, &id)| session.get(id).map(|record| (position, record)));

        // owner -> positions in `target_ids`, in assignment order
        let mut assigned: HashMap<RecordId, Vec<usize>> = HashMap::new();
        match descriptor.key_side() {
            KeySide::Target => {
                for (position, target) in target_records {
                    for key in strategy.target_keys(descriptor, target) {
                        for &owner in index.owners_for(&key) {
                            push_unique(assigned.entry(owner).or_default(), position);
                        }
                    }
                }
            }
            KeySide::Owner => {
                let mut by_key: HashMap<Scalar, usize> = HashMap::new();
                for (position, target) in target_records {
                    for key in strategy.target_keys(descriptor, target) {
                        by_key.entry(key).or_insert(position);
                    }
                }
                // owner array order, duplicate entries collapse
                for &owner in owners {
                    let record = session.get(owner).ok_or(RelationError::RecordNotFound(owner))?;
                    for key in strategy.owner_keys(descriptor, record) {
                        if let Some(&position) = by_key.get(&key) {
                            push_unique(assigned.entry(owner).or_default(), position);
                        }
                    }
                }
            }
        }

        if descriptor.cardinality() == Cardinality::One && descriptor.is_array() {
            for &owner in owners {
                let count = assigned.get(&owner).map_or(0, Vec::len);
                if count > 1 {
                    return Err(RelationError::MultipleResults {
                        relation: descriptor.name.clone(),
                        owner,
                        count,
                    });
                }
            }
        }

        // owner key scalars, needed for the inverse loaded check
        let owner_scalars: HashMap<RecordId, Option<Scalar>> = owners
            .iter()
            .map(|&owner| {
                let scalar = session
                    .get(owner)
                    .and_then(|record| codec.encode_owner_key(record))
                    .and_then(|key| match key {
                        KeyValue::Scalar(s) => Some(s),
                        KeyValue::Array(_) => None,
                    });
                (owner, scalar)
            })
            .collect();

        let inverse = self.registry.inverse_on(descriptor, target_entity);
        let mut assigned_total = 0;
        for &owner in owners {
            let mut ids: Vec<RecordId> = Vec::new();
            for &position in assigned.get(&owner).map(Vec::as_slice).unwrap_or(&[]) {
                push_unique(&mut ids, target_ids[position]);
            }
            assigned_total += ids.len();

            let state = session.association_mut(owner, &descriptor.name);
            state.loaded = true;
            state.target = match descriptor.cardinality() {
                Cardinality::One => ids.first().map_or(AssociationTarget::Empty, |&id| AssociationTarget::One(id)),
                Cardinality::Many => AssociationTarget::Many(ids.clone()),
            };

            if let Some(inverse) = inverse {
                let owner_key = owner_scalars.get(&owner).cloned().flatten();
                for &target in &ids {
                    set_inverse(session, descriptor, inverse, owner, owner_key.as_ref(), target);
                }
            }
        }

        log::debug!(
            "resolved {}.{} for {} owners ({} assignments)",
            descriptor.owner_entity,
            descriptor.name,
            owners.len(),
            assigned_total
        );
        Ok(())
    }

    fn fetch(&self, entity: &str, predicate: &Predicate) -> Result<Vec<Record>, RelationError> {
        let start = Instant::now();
        let result = self.fetcher.fetch(entity, predicate);
        let elapsed = start.elapsed();

        match &result {
            Ok(records) => {
                log::debug!("fetched {} {entity} where {predicate} in {elapsed:?}", records.len());
                #[cfg(feature = "metrics")]
                METRICS.record_fetch(entity, elapsed);
            }
            Err(e) => {
                log::debug!("fetch of {entity} where {predicate} failed: {e}");
                #[cfg(feature = "metrics")]
                METRICS.record_fetch_error(entity);
            }
        }
        result.map_err(RelationError::Store)
    }
}

/// Record the owner on the target's inverse relation
///
/// A to-one inverse is fully known from this pass. A to-many inverse is
/// only marked loaded when the target holds the array and that array is
/// exactly the owner's key; any other shape may still have members that
/// were not part of this fetch.
fn set_inverse(
    session: &mut Session,
    descriptor: &RelationDescriptor,
    inverse: &RelationDescriptor,
    owner: RecordId,
    owner_key: Option<&Scalar>,
    target: RecordId,
) {
    let complete = match (descriptor.array_side(), owner_key, session.get(target)) {
        (Some(KeySide::Target), Some(key), Some(record)) => {
            record.get(&descriptor.target_key).elements() == std::slice::from_ref(key)
        }
        _ => false,
    };

    let state = session.association_mut(target, &inverse.name);
    match inverse.cardinality() {
        Cardinality::One => {
            state.target = AssociationTarget::One(owner);
            state.loaded = true;
        }
        Cardinality::Many => {
            state.push_target(owner);
            state.loaded = state.loaded || complete;
        }
    }
    state.inversed = true;
}

fn push_unique<T: PartialEq>(items: &mut Vec<T>, item: T) {
    if !items.contains(&item) {
        items.push(item);
    }
}

fn distinct_by_identity(records: Vec<Record>) -> Vec<Record> {
    let mut distinct: Vec<Record> = Vec::with_capacity(records.len());
    for record in records {
        let duplicate = record.id().is_some()
            && distinct
                .iter()
                .any(|existing| existing.entity() == record.entity() && existing.id() == record.id());
        if !duplicate {
            distinct.push(record);
        }
    }
    distinct
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::MemoryStore;
    use crate::value::AttrValue;

    struct FailingFetcher;

    impl Fetcher for FailingFetcher {
        fn fetch(&self, _entity: &str, _predicate: &Predicate) -> Result<Vec<Record>, StoreError> {
            Err(StoreError::QueryError("connection reset".to_string()))
        }
    }

    fn registry() -> RelationRegistry {
        let mut registry = RelationRegistry::new();
        registry
            .register(RelationDescriptor::belongs_to_many("videos", "tags").build().unwrap())
            .unwrap();
        registry
            .register(RelationDescriptor::has_many("tags", "videos").array().build().unwrap())
            .unwrap();
        registry
    }

    #[test]
    fn test_fetch_error_passes_through() {
        let registry = registry();
        let mut session = Session::new();
        let video = session.add(Record::loaded(
            "videos",
            [("id", AttrValue::from(1i64)), ("tag_ids", vec![1i64].into())],
        ));
        let err = Resolver::new(&FailingFetcher, &registry)
            .resolve_named(&mut session, &[video], "tags")
            .unwrap_err();
        assert!(matches!(err, RelationError::Store(StoreError::QueryError(_))));
        assert!(!session.is_loaded(video, "tags"));
    }

    #[test]
    fn test_empty_owner_keys_skip_fetch() {
        let registry = registry();
        let store = MemoryStore::new();
        let mut session = Session::new();
        let video = session.add(Record::loaded("videos", [("id", 1i64)]));

        Resolver::new(&store, &registry)
            .resolve_named(&mut session, &[video], "tags")
            .unwrap();
        assert_eq!(store.fetch_count(), 0);
        assert!(session.is_loaded(video, "tags"));
        assert!(session.targets(video, "tags").is_empty());
    }

    #[test]
    fn test_new_owner_is_not_fetched() {
        let registry = registry();
        let store = MemoryStore::new();
        let mut session = Session::new();
        let video = session.add(Record::new("videos").with("tag_ids", vec![1i64]));

        Resolver::new(&store, &registry)
            .resolve_named(&mut session, &[video], "tags")
            .unwrap();
        assert_eq!(store.fetch_count(), 0);
        assert!(session.is_loaded(video, "tags"));
    }

    #[test]
    fn test_unknown_owner() {
        let registry = registry();
        let store = MemoryStore::new();
        let mut session = Session::new();
        let video = session.add(Record::loaded("videos", [("id", 1i64)]));
        session.discard(video);
        let desc = registry.get("videos", "tags").unwrap().clone();
        assert!(matches!(
            Resolver::new(&store, &registry).resolve(&mut session, &[video], &desc),
            Err(RelationError::RecordNotFound(_))
        ));
    }

    #[test]
    fn test_distinct_by_identity() {
        let records = vec![
            Record::loaded("tags", [("id", 1i64)]),
            Record::loaded("tags", [("id", 1i64)]),
            Record::loaded("tags", [("id", 2i64)]),
        ];
        assert_eq!(distinct_by_identity(records).len(), 2);
    }
}
