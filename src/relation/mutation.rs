//! Relation mutation and autosave ordering.
//!
//! Where a change is written depends on which record holds the key:
//!
//! - **Owner-held** (`belongs_to`, `belongs_to_many`): the owner's own
//!   column changes. A persisted owner is updated right away with
//!   `update_attribute`; a new owner buffers the change and applies it in
//!   the `before_save` phase of [`MutationCoordinator::persist`], ahead of
//!   its own row write.
//! - **Target-held** (`has_one`, `has_many`): the target's column changes
//!   and the target is saved as a dependent save. A new owner buffers the
//!   change until after its own row write, when its key exists.
//!
//! Every failure inside `before_save` and every failed dependent save is
//! converted into `RelationError::AbortUnitOfWork`, which the caller maps to
//! a rollback (see [`within_unit_of_work`](crate::store::within_unit_of_work)).

use super::def::{Cardinality, KeySide, RelationDescriptor};
use super::registry::RelationRegistry;
use super::resolver::Resolver;
use crate::config::EngineConfig;
use crate::error::{RelationError, ValidationError};
use crate::session::{AssociationTarget, PendingChange, RecordId, Session};
use crate::store::{Fetcher, Predicate, StoreWriter};
use crate::value::{AttrValue, Record, Scalar};
use std::collections::HashSet;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

pub struct MutationCoordinator<'a, S: Fetcher + StoreWriter + ?Sized> {
    store: &'a S,
    registry: &'a RelationRegistry,
    config: &'a EngineConfig,
    // (owner, relation) pairs being flushed by the current persist call
    in_progress: HashSet<(RecordId, String)>,
}

impl<'a, S: Fetcher + StoreWriter + ?Sized> MutationCoordinator<'a, S> {
    pub fn new(store: &'a S, registry: &'a RelationRegistry, config: &'a EngineConfig) -> Self {
        Self {
            store,
            registry,
            config,
            in_progress: HashSet::new(),
        }
    }

    // ------------------------------------------------------------------
    // Public operations
    // ------------------------------------------------------------------

    /// Add `target` to `relation` on `owner`
    ///
    /// Appending a target that is already present is a no-op. On a to-one
    /// relation the previous target is replaced (and detached, for
    /// `has_one`). A persisted `belongs_to_many` owner is not resolved
    /// first: its array column alone decides the write.
    pub fn append(
        &mut self,
        session: &mut Session,
        owner: RecordId,
        relation: &str,
        target: RecordId,
    ) -> Result<(), RelationError> {
        let desc = self.descriptor(session, owner, relation)?;
        self.check_target(session, desc, target)?;
        let owner_new = record(session, owner)?.is_new_record();
        let column_only = !owner_new && holds_key_array(desc);
        if !owner_new && !column_only {
            self.resolver().resolve(session, &[owner], desc)?;
        }

        let previous: Vec<RecordId> = match desc.cardinality() {
            Cardinality::One => session
                .targets(owner, &desc.name)
                .into_iter()
                .filter(|&existing| existing != target)
                .collect(),
            Cardinality::Many => Vec::new(),
        };
        if previous.is_empty() && session.targets(owner, &desc.name).contains(&target) {
            log::debug!("{}.{}: {target} already present", desc.owner_entity, desc.name);
            return Ok(());
        }

        match desc.key_side() {
            KeySide::Owner => self.append_owner_held(session, owner, desc, target, owner_new)?,
            KeySide::Target => {
                self.append_target_held(session, owner, desc, target, &previous, owner_new)?
            }
        }

        for old in previous {
            self.unlink(session, owner, desc, old);
        }
        if column_only && !session.is_loaded(owner, &desc.name) {
            // the owner's targets load from the updated column on the next resolve
            self.link_inverse(session, owner, desc, target);
        } else {
            self.link(session, owner, desc, target);
        }
        Ok(())
    }

    /// Remove `target` from `relation` on `owner`
    pub fn remove(
        &mut self,
        session: &mut Session,
        owner: RecordId,
        relation: &str,
        target: RecordId,
    ) -> Result<(), RelationError> {
        let desc = self.descriptor(session, owner, relation)?;
        record(session, target)?;
        let owner_new = record(session, owner)?.is_new_record();
        if !owner_new && !holds_key_array(desc) {
            self.resolver().resolve(session, &[owner], desc)?;
        }

        if owner_new {
            session
                .association_mut(owner, &desc.name)
                .buffer(PendingChange::Remove(target));
        } else {
            match desc.key_side() {
                KeySide::Owner => self.write_owner_key(session, owner, desc, target, false)?,
                KeySide::Target => {
                    let owner_key = owner_key(session, owner, desc)?;
                    self.detach(session, &owner_key, desc, target)?;
                }
            }
        }

        self.unlink(session, owner, desc, target);
        Ok(())
    }

    /// Make `targets` the exact contents of `relation` on `owner`
    pub fn replace(
        &mut self,
        session: &mut Session,
        owner: RecordId,
        relation: &str,
        targets: &[RecordId],
    ) -> Result<(), RelationError> {
        let desc = self.descriptor(session, owner, relation)?;
        if desc.cardinality() == Cardinality::One && targets.len() > 1 {
            return Err(RelationError::MultipleResults {
                relation: desc.name.clone(),
                owner,
                count: targets.len(),
            });
        }

        let current = self.current_targets(session, owner, desc)?;
        for &old in current.iter().filter(|old| !targets.contains(old)) {
            self.remove(session, owner, relation, old)?;
        }
        for &new in targets {
            if !current.contains(&new) {
                self.append(session, owner, relation, new)?;
            }
        }

        if desc.cardinality() == Cardinality::Many {
            let mut ordered: Vec<RecordId> = Vec::with_capacity(targets.len());
            for &target in targets {
                if !ordered.contains(&target) {
                    ordered.push(target);
                }
            }
            self.reorder_owner_array(session, owner, desc, &ordered)?;
            session.association_mut(owner, &desc.name).target = AssociationTarget::Many(ordered);
        }
        Ok(())
    }

    /// Remove every target of `relation` on `owner`
    pub fn clear(
        &mut self,
        session: &mut Session,
        owner: RecordId,
        relation: &str,
    ) -> Result<(), RelationError> {
        self.replace(session, owner, relation, &[])
    }

    /// Keys of the records `relation` on `owner` points at
    ///
    /// For a persisted owner holding the key, this reads the owner's column
    /// without a fetch.
    pub fn ids(
        &self,
        session: &mut Session,
        owner: RecordId,
        relation: &str,
    ) -> Result<Vec<Scalar>, RelationError> {
        let desc = self.descriptor(session, owner, relation)?;
        let owner_record = record(session, owner)?;
        let has_pending = session
            .association(owner, &desc.name)
            .is_some_and(|state| !state.pending.is_empty());

        if desc.key_side() == KeySide::Owner && owner_record.is_persisted() && !has_pending {
            return Ok(owner_record.get(&desc.owner_key).elements().to_vec());
        }

        let targets = self.current_targets(session, owner, desc)?;
        Ok(targets
            .into_iter()
            .filter_map(|target| target_reference(session, desc, target))
            .collect())
    }

    /// Replace `relation` on `owner` with the records identified by `ids`
    ///
    /// # Errors
    ///
    /// Returns `RelationError::MissingRecords` if some ids do not exist.
    pub fn set_ids(
        &mut self,
        session: &mut Session,
        owner: RecordId,
        relation: &str,
        ids: &[Scalar],
    ) -> Result<(), RelationError> {
        let desc = self.descriptor(session, owner, relation)?;
        let column = match desc.key_side() {
            KeySide::Owner => desc.target_key.clone(),
            KeySide::Target => "id".to_string(),
        };

        let mut wanted: Vec<Scalar> = Vec::with_capacity(ids.len());
        for id in ids {
            if !wanted.contains(id) {
                wanted.push(id.clone());
            }
        }

        let records = if wanted.is_empty() {
            Vec::new()
        } else {
            self.store.fetch(
                &desc.target_entity,
                &Predicate::In {
                    column: column.clone(),
                    values: wanted.clone(),
                },
            )?
        };

        let mut by_key: Vec<(Scalar, RecordId)> = Vec::with_capacity(records.len());
        for fetched in records {
            let key = fetched.get(&column).as_scalar().cloned();
            let id = session.add(fetched);
            if let Some(key) = key {
                by_key.push((key, id));
            }
        }

        let mut targets = Vec::with_capacity(wanted.len());
        let mut missing = Vec::new();
        for id in &wanted {
            match by_key.iter().find(|(key, _)| key == id) {
                Some(&(_, record_id)) => targets.push(record_id),
                None => missing.push(id.to_string()),
            }
        }
        if !missing.is_empty() {
            return Err(RelationError::MissingRecords {
                entity: desc.target_entity.clone(),
                ids: missing,
            });
        }

        self.replace(session, owner, relation, &targets)
    }

    /// Save `owner` together with its pending relation changes
    ///
    /// 1. `before_save`: owner-held relations are flushed (new targets are
    ///    saved first, then their keys are written into the owner); any
    ///    failure becomes `AbortUnitOfWork`. Required relations are checked.
    /// 2. The owner's own row is written; a validation failure is returned
    ///    as `RelationError::Validation`.
    /// 3. `after_save`: target-held relations are flushed with dependent
    ///    saves.
    pub fn persist(&mut self, session: &mut Session, owner: RecordId) -> Result<(), RelationError> {
        self.persist_with(session, owner, true)
    }

    // ------------------------------------------------------------------
    // Persist phases
    // ------------------------------------------------------------------

    fn persist_with(
        &mut self,
        session: &mut Session,
        owner: RecordId,
        validate: bool,
    ) -> Result<(), RelationError> {
        let entity = record(session, owner)?.entity().to_string();

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::persist_span(&entity).entered();

        let registry = self.registry;
        let relations = registry.relations_of(&entity);

        if validate {
            for desc in relations.iter().filter(|desc| desc.required) {
                if self.is_blank(session, owner, desc)? {
                    return Err(RelationError::Validation(ValidationError::new(
                        entity.clone(),
                        format!("{} must exist", desc.name),
                    )));
                }
            }
        }

        for desc in relations.iter().filter(|desc| desc.key_side() == KeySide::Owner) {
            if !self.enter(owner, desc) {
                continue;
            }
            let result = self.before_save(session, owner, desc);
            self.leave(owner, desc);
            result.map_err(|err| abort(desc, err))?;
        }

        let saved = {
            let owner_record = record_mut(session, owner)?;
            if owner_record.is_new_record() || owner_record.is_changed() {
                self.store.save(owner_record, validate)?;
                true
            } else {
                false
            }
        };
        if saved {
            session.refresh_identity(owner);
            log::debug!("saved {entity} {owner}");
        }

        for desc in relations.iter().filter(|desc| desc.key_side() == KeySide::Target) {
            if !self.enter(owner, desc) {
                continue;
            }
            let result = self.after_save(session, owner, desc);
            self.leave(owner, desc);
            result?;
        }
        Ok(())
    }

    /// Flush an owner-held relation into the owner's own columns
    fn before_save(
        &mut self,
        session: &mut Session,
        owner: RecordId,
        desc: &RelationDescriptor,
    ) -> Result<(), RelationError> {
        let pending = pending_changes(session, owner, desc);

        for change in &pending {
            match *change {
                PendingChange::Append(target) => {
                    self.ensure_persisted(session, target)?;
                    let key = target_reference(session, desc, target)
                        .ok_or_else(|| missing_key(desc, target))?;
                    let target_entity = record(session, target)?.entity().to_string();
                    let owner_record = record_mut(session, owner)?;
                    match desc.cardinality() {
                        Cardinality::Many => {
                            owner_record.push_unique(&desc.owner_key, key);
                        }
                        Cardinality::One => {
                            owner_record.set(desc.owner_key.clone(), key);
                            if let Some(type_column) = &desc.foreign_type {
                                owner_record.set(type_column.clone(), target_entity);
                            }
                        }
                    }
                }
                PendingChange::Remove(target) => {
                    if let Some(key) = target_reference(session, desc, target) {
                        clear_owner_key(record_mut(session, owner)?, desc, &key);
                    }
                }
            }
        }

        if desc.autosave {
            for target in session.targets(owner, &desc.name) {
                let needs_save = record(session, target)
                    .map(|r| r.is_new_record() || r.is_changed())?;
                if needs_save {
                    self.persist_with(session, target, true)?;
                }
            }
        }

        session.association_mut(owner, &desc.name).pending.clear();
        Ok(())
    }

    /// Flush a target-held relation once the owner has its key
    fn after_save(
        &mut self,
        session: &mut Session,
        owner: RecordId,
        desc: &RelationDescriptor,
    ) -> Result<(), RelationError> {
        let pending = pending_changes(session, owner, desc);
        let Some(key) = record(session, owner)?.get(&desc.owner_key).as_scalar().cloned() else {
            return Ok(());
        };

        for change in &pending {
            match *change {
                PendingChange::Append(target) => self.attach(session, &key, desc, target)?,
                PendingChange::Remove(target) => self.detach(session, &key, desc, target)?,
            }
        }

        for target in session.targets(owner, &desc.name) {
            let target_record = record(session, target)?;
            let needs_save = match desc.cardinality() {
                // a has_one target must always point back at its owner
                Cardinality::One => {
                    target_record.is_new_record()
                        || !target_record.get(&desc.target_key).contains(&key)
                        || (desc.autosave && target_record.is_changed())
                }
                Cardinality::Many => {
                    desc.autosave && (target_record.is_new_record() || target_record.is_changed())
                }
            };
            if needs_save {
                self.attach(session, &key, desc, target)?;
            }
        }

        session.association_mut(owner, &desc.name).pending.clear();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Key writes
    // ------------------------------------------------------------------

    fn append_owner_held(
        &mut self,
        session: &mut Session,
        owner: RecordId,
        desc: &RelationDescriptor,
        target: RecordId,
        owner_new: bool,
    ) -> Result<(), RelationError> {
        if owner_new {
            session
                .association_mut(owner, &desc.name)
                .buffer(PendingChange::Append(target));
            return Ok(());
        }
        self.ensure_persisted(session, target)
            .map_err(|err| abort(desc, err))?;
        self.write_owner_key(session, owner, desc, target, true)
    }

    fn append_target_held(
        &mut self,
        session: &mut Session,
        owner: RecordId,
        desc: &RelationDescriptor,
        target: RecordId,
        previous: &[RecordId],
        owner_new: bool,
    ) -> Result<(), RelationError> {
        if owner_new {
            let state = session.association_mut(owner, &desc.name);
            for &old in previous {
                state.buffer(PendingChange::Remove(old));
            }
            state.buffer(PendingChange::Append(target));
            return Ok(());
        }

        let key = owner_key(session, owner, desc)?;
        for &old in previous {
            self.detach(session, &key, desc, old)?;
        }
        self.attach(session, &key, desc, target)
    }

    /// Add or remove the target's key in the owner's column and write it
    fn write_owner_key(
        &mut self,
        session: &mut Session,
        owner: RecordId,
        desc: &RelationDescriptor,
        target: RecordId,
        add: bool,
    ) -> Result<(), RelationError> {
        let Some(key) = target_reference(session, desc, target) else {
            return Ok(());
        };
        let target_entity = record(session, target)?.entity().to_string();
        let owner_record = record_mut(session, owner)?;

        let value = match (desc.cardinality(), add) {
            (Cardinality::Many, true) => {
                let mut items = owner_record.get(&desc.owner_key).elements().to_vec();
                if items.contains(&key) {
                    return Ok(());
                }
                items.push(key);
                AttrValue::Array(items)
            }
            (Cardinality::Many, false) => {
                let items = owner_record.get(&desc.owner_key).elements();
                if !items.contains(&key) {
                    return Ok(());
                }
                AttrValue::Array(items.iter().filter(|item| **item != key).cloned().collect())
            }
            (Cardinality::One, true) => AttrValue::Scalar(key),
            (Cardinality::One, false) => {
                if owner_record.get(&desc.owner_key).as_scalar() != Some(&key) {
                    return Ok(());
                }
                AttrValue::Null
            }
        };

        self.store
            .update_attribute(owner_record, &desc.owner_key, value)?;
        if let Some(type_column) = &desc.foreign_type {
            let type_value = if add {
                AttrValue::from(target_entity)
            } else {
                AttrValue::Null
            };
            self.store
                .update_attribute(owner_record, type_column, type_value)?;
        }
        Ok(())
    }

    /// Make the owner's array follow `ordered`
    ///
    /// A persisted owner's column is rewritten. A new owner has its buffered
    /// appends reordered, since `before_save` applies them in buffer order.
    fn reorder_owner_array(
        &mut self,
        session: &mut Session,
        owner: RecordId,
        desc: &RelationDescriptor,
        ordered: &[RecordId],
    ) -> Result<(), RelationError> {
        if desc.key_side() != KeySide::Owner {
            return Ok(());
        }
        if record(session, owner)?.is_new_record() {
            let state = session.association_mut(owner, &desc.name);
            let (mut rebuilt, appends): (Vec<PendingChange>, Vec<PendingChange>) = state
                .pending
                .drain(..)
                .partition(|change| matches!(change, PendingChange::Remove(_)));
            rebuilt.extend(
                ordered
                    .iter()
                    .map(|&target| PendingChange::Append(target))
                    .filter(|append| appends.contains(append)),
            );
            state.pending = rebuilt;
            return Ok(());
        }
        let keys: Vec<Scalar> = ordered
            .iter()
            .filter_map(|&target| target_reference(session, desc, target))
            .collect();
        let owner_record = record_mut(session, owner)?;
        let current = owner_record.get(&desc.owner_key).elements();
        let mut expected = Vec::with_capacity(current.len());
        for key in keys.iter().chain(current.iter()) {
            if current.contains(key) && !expected.contains(key) {
                expected.push(key.clone());
            }
        }
        if current != expected.as_slice() {
            self.store
                .update_attribute(owner_record, &desc.owner_key, AttrValue::Array(expected))?;
        }
        Ok(())
    }

    /// Point a target-held key at the owner and save the target
    fn attach(
        &mut self,
        session: &mut Session,
        owner_key: &Scalar,
        desc: &RelationDescriptor,
        target: RecordId,
    ) -> Result<(), RelationError> {
        let target_record = record_mut(session, target)?;
        let changed = if desc.is_array() {
            target_record.push_unique(&desc.target_key, owner_key.clone())
        } else {
            target_record.set(desc.target_key.clone(), owner_key.clone())
        };
        if changed || target_record.is_new_record() || target_record.is_changed() {
            self.dependent_save(session, desc, target, self.config.validate_dependents)?;
        }
        Ok(())
    }

    /// Drop the owner from a target-held key and save the target
    fn detach(
        &mut self,
        session: &mut Session,
        owner_key: &Scalar,
        desc: &RelationDescriptor,
        target: RecordId,
    ) -> Result<(), RelationError> {
        let target_record = record_mut(session, target)?;
        let changed = if desc.is_array() {
            target_record.remove_all(&desc.target_key, owner_key)
        } else if target_record.get(&desc.target_key).as_scalar() == Some(owner_key) {
            target_record.set(desc.target_key.clone(), AttrValue::Null)
        } else {
            false
        };
        if changed && target_record.is_persisted() {
            self.dependent_save(session, desc, target, self.config.validate_dependents)?;
        }
        Ok(())
    }

    fn dependent_save(
        &mut self,
        session: &mut Session,
        desc: &RelationDescriptor,
        target: RecordId,
        validate: bool,
    ) -> Result<(), RelationError> {
        #[cfg(feature = "metrics")]
        METRICS.record_dependent_save(&desc.name);
        log::debug!("dependent save of {target} for {}.{}", desc.owner_entity, desc.name);
        self.persist_with(session, target, validate)
            .map_err(|err| abort(desc, err))
    }

    fn ensure_persisted(&mut self, session: &mut Session, target: RecordId) -> Result<(), RelationError> {
        if record(session, target)?.is_new_record() {
            self.persist_with(session, target, true)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // In-memory association state
    // ------------------------------------------------------------------

    fn link(&self, session: &mut Session, owner: RecordId, desc: &RelationDescriptor, target: RecordId) {
        let state = session.association_mut(owner, &desc.name);
        match desc.cardinality() {
            Cardinality::One => state.target = AssociationTarget::One(target),
            Cardinality::Many => {
                state.push_target(target);
            }
        }
        self.link_inverse(session, owner, desc, target);
    }

    fn link_inverse(&self, session: &mut Session, owner: RecordId, desc: &RelationDescriptor, target: RecordId) {
        if let Some(inverse) = self.inverse_for(session, desc, target) {
            let state = session.association_mut(target, &inverse.name);
            match inverse.cardinality() {
                Cardinality::One => {
                    state.target = AssociationTarget::One(owner);
                    state.loaded = true;
                }
                Cardinality::Many => {
                    state.push_target(owner);
                }
            }
            state.inversed = true;
        }
    }

    fn unlink(&self, session: &mut Session, owner: RecordId, desc: &RelationDescriptor, target: RecordId) {
        session.association_mut(owner, &desc.name).remove_target(target);
        if let Some(inverse) = self.inverse_for(session, desc, target) {
            session.association_mut(target, &inverse.name).remove_target(owner);
        }
    }

    fn inverse_for(
        &self,
        session: &Session,
        desc: &RelationDescriptor,
        target: RecordId,
    ) -> Option<&'a RelationDescriptor> {
        let registry = self.registry;
        let entity = session.get(target)?.entity();
        registry.inverse_on(desc, entity)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn resolver(&self) -> Resolver<'a, S> {
        Resolver::new(self.store, self.registry)
    }

    fn descriptor(
        &self,
        session: &Session,
        owner: RecordId,
        relation: &str,
    ) -> Result<&'a RelationDescriptor, RelationError> {
        let registry = self.registry;
        registry.lookup(record(session, owner)?.entity(), relation)
    }

    fn check_target(
        &self,
        session: &Session,
        desc: &RelationDescriptor,
        target: RecordId,
    ) -> Result<(), RelationError> {
        let found = record(session, target)?.entity();
        if !desc.polymorphic && found != desc.target_entity {
            return Err(RelationError::TypeMismatch {
                relation: desc.name.clone(),
                expected: desc.target_entity.clone(),
                found: found.to_string(),
            });
        }
        Ok(())
    }

    fn current_targets(
        &self,
        session: &mut Session,
        owner: RecordId,
        desc: &RelationDescriptor,
    ) -> Result<Vec<RecordId>, RelationError> {
        if record(session, owner)?.is_new_record() {
            return Ok(session.targets(owner, &desc.name));
        }
        self.resolver().targets(session, owner, desc)
    }

    fn is_blank(
        &self,
        session: &mut Session,
        owner: RecordId,
        desc: &RelationDescriptor,
    ) -> Result<bool, RelationError> {
        if !session.targets(owner, &desc.name).is_empty() {
            return Ok(false);
        }
        if desc.key_side() == KeySide::Owner {
            let has_key = !record(session, owner)?.get(&desc.owner_key).elements().is_empty();
            let has_pending = session
                .association(owner, &desc.name)
                .is_some_and(|state| state.pending.iter().any(|c| matches!(c, PendingChange::Append(_))));
            return Ok(!has_key && !has_pending);
        }
        Ok(self.current_targets(session, owner, desc)?.is_empty())
    }

    fn enter(&mut self, owner: RecordId, desc: &RelationDescriptor) -> bool {
        self.in_progress.insert((owner, desc.name.clone()))
    }

    fn leave(&mut self, owner: RecordId, desc: &RelationDescriptor) {
        self.in_progress.remove(&(owner, desc.name.clone()));
    }
}

fn abort(desc: &RelationDescriptor, err: RelationError) -> RelationError {
    if !err.is_abort() {
        log::warn!(
            "aborting unit of work: {}.{} failed: {err}",
            desc.owner_entity,
            desc.name
        );
        #[cfg(feature = "metrics")]
        METRICS.record_abort(&desc.name);
    }
    RelationError::abort(&desc.name, err)
}

/// `belongs_to_many`: the owner's array column is the whole relation
fn holds_key_array(desc: &RelationDescriptor) -> bool {
    desc.key_side() == KeySide::Owner && desc.cardinality() == Cardinality::Many
}

fn record(session: &Session, id: RecordId) -> Result<&Record, RelationError> {
    session.get(id).ok_or(RelationError::RecordNotFound(id))
}

fn record_mut(session: &mut Session, id: RecordId) -> Result<&mut Record, RelationError> {
    session.get_mut(id).ok_or(RelationError::RecordNotFound(id))
}

fn pending_changes(session: &Session, owner: RecordId, desc: &RelationDescriptor) -> Vec<PendingChange> {
    session
        .association(owner, &desc.name)
        .map(|state| state.pending.clone())
        .unwrap_or_default()
}

/// Scalar key of a persisted owner, for target-held relations
fn owner_key(session: &Session, owner: RecordId, desc: &RelationDescriptor) -> Result<Scalar, RelationError> {
    record(session, owner)?
        .get(&desc.owner_key)
        .as_scalar()
        .cloned()
        .ok_or_else(|| missing_key(desc, owner))
}

/// The value identifying `target` for this relation: the referenced column
/// for owner-held keys, the primary key otherwise
fn target_reference(session: &Session, desc: &RelationDescriptor, target: RecordId) -> Option<Scalar> {
    let target = session.get(target)?;
    match desc.key_side() {
        KeySide::Owner => target.get(&desc.target_key).as_scalar().cloned(),
        KeySide::Target => target.id().cloned(),
    }
}

fn clear_owner_key(owner: &mut Record, desc: &RelationDescriptor, key: &Scalar) {
    match desc.cardinality() {
        Cardinality::Many => {
            owner.remove_all(&desc.owner_key, key);
        }
        Cardinality::One => {
            if owner.get(&desc.owner_key).as_scalar() == Some(key) {
                owner.set(desc.owner_key.clone(), AttrValue::Null);
                if let Some(type_column) = &desc.foreign_type {
                    owner.set(type_column.clone(), AttrValue::Null);
                }
            }
        }
    }
}

fn missing_key(desc: &RelationDescriptor, id: RecordId) -> RelationError {
    RelationError::Store(crate::error::StoreError::Other(format!(
        "{id} has no key for {}.{}",
        desc.owner_entity, desc.name
    )))
}
