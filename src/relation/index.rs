//! Fan-out index from scalar key to owners.
//!
//! An owner whose key is the array `[1, 2]` is reachable from both `1` and
//! `2`, which is what lets a whole batch of array-keyed owners be resolved
//! with one set-based fetch.

use super::codec::KeyValue;
use crate::session::{RecordId, Session};
use crate::value::{Record, Scalar};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct OwnerIndex {
    keys: Vec<Scalar>,
    owners: HashMap<Scalar, Vec<RecordId>>,
}

impl OwnerIndex {
    /// Index `owners` under every element of their key
    ///
    /// Owners missing from the session or without a key are left out. An
    /// owner is listed at most once per key.
    pub fn build<F>(session: &Session, owners: &[RecordId], key_fn: F) -> Self
    where
        F: Fn(&Record) -> Option<KeyValue>,
    {
        let mut index = Self::default();
        for &owner in owners {
            let Some(key) = session.get(owner).and_then(&key_fn) else {
                continue;
            };
            for element in key.elements() {
                index.insert(element.clone(), owner);
            }
        }
        index
    }

    fn insert(&mut self, key: Scalar, owner: RecordId) {
        let owners = self.owners.entry(key.clone()).or_insert_with(|| {
            self.keys.push(key);
            Vec::new()
        });
        if !owners.contains(&owner) {
            owners.push(owner);
        }
    }

    /// Distinct keys in first-seen order
    pub fn keys(&self) -> &[Scalar] {
        &self.keys
    }

    pub fn owners_for(&self, key: &Scalar) -> &[RecordId] {
        self.owners.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }
}
