//! Connection strategies.
//!
//! The resolver handles every relation the same way: index the owners by
//! their key elements, fetch the targets matching the union of those keys,
//! then distribute each target under its own key elements. Only three
//! things depend on how the pair is connected, and they are what a
//! [`ConnectionStrategy`] provides.

use super::codec::{KeyCodec, KeyValue};
use super::def::{Connection, KeySide, RelationDescriptor};
use crate::store::Predicate;
use crate::value::{Record, Scalar};

pub trait ConnectionStrategy {
    /// Predicate selecting every target of the given owner key elements
    fn predicate(&self, descriptor: &RelationDescriptor, keys: &[Scalar]) -> Predicate;

    /// Key elements an owner is indexed under
    fn owner_keys(&self, descriptor: &RelationDescriptor, owner: &Record) -> Vec<Scalar> {
        elements(KeyCodec::new(descriptor).encode_owner_key(owner))
    }

    /// Key elements a fetched target is grouped under
    fn target_keys(&self, descriptor: &RelationDescriptor, target: &Record) -> Vec<Scalar> {
        elements(KeyCodec::new(descriptor).encode_target_key(target))
    }
}

fn elements(key: Option<KeyValue>) -> Vec<Scalar> {
    match key {
        Some(KeyValue::Scalar(s)) => vec![s],
        Some(KeyValue::Array(items)) => items,
        None => Vec::new(),
    }
}

/// Conventional equality connection
#[derive(Debug, Clone, Copy, Default)]
pub struct ScalarConnection;

impl ConnectionStrategy for ScalarConnection {
    fn predicate(&self, descriptor: &RelationDescriptor, keys: &[Scalar]) -> Predicate {
        match keys {
            [single] => Predicate::Eq {
                column: descriptor.target_key.clone(),
                value: single.clone(),
            },
            _ => Predicate::In {
                column: descriptor.target_key.clone(),
                values: keys.to_vec(),
            },
        }
    }
}

/// Membership connection through an array column
#[derive(Debug, Clone, Copy, Default)]
pub struct ArrayConnection;

impl ConnectionStrategy for ArrayConnection {
    fn predicate(&self, descriptor: &RelationDescriptor, keys: &[Scalar]) -> Predicate {
        match descriptor.array_side() {
            // targets hold the array: any overlap with the owner ids
            Some(KeySide::Target) => Predicate::ArrayOverlaps {
                column: descriptor.target_key.clone(),
                values: keys.to_vec(),
            },
            // owners hold the array: targets whose key is one of its elements
            _ => Predicate::In {
                column: descriptor.target_key.clone(),
                values: keys.to_vec(),
            },
        }
    }
}

/// Strategy for a descriptor's connection
pub fn strategy_for(descriptor: &RelationDescriptor) -> &'static dyn ConnectionStrategy {
    match descriptor.connection {
        Connection::Scalar => &ScalarConnection,
        Connection::Array => &ArrayConnection,
    }
}
