//! Relation module: array-connected relations between entities.
//!
//! A relation joins an owner entity to a target entity through a key column.
//! Besides the conventional scalar (equality) connection, either side may
//! hold a PostgreSQL array of keys:
//! - `belongs_to_many`: the owner holds an array of target keys
//! - `has_many` / `has_one` with `.array()`: the target holds an array of
//!   owner keys
//!
//! # Architecture
//!
//! - **Def**: the immutable [`RelationDescriptor`] and its builder
//! - **Registry**: descriptors per entity and inverse discovery
//! - **Codec**: key extraction, matching and literal rendering
//! - **Index / Strategy**: fan-out indexing of owners and the fetch predicate
//!   per connection kind
//! - **Resolver**: batch loading of one relation for many owners
//! - **Mutation**: append/remove/replace and autosave ordering

pub mod codec;
pub mod def;
pub mod index;
pub mod mutation;
pub mod registry;
pub mod resolver;
pub mod strategy;

#[doc(inline)]
pub use codec::{KeyCodec, KeyValue};
#[doc(inline)]
pub use def::{Cardinality, Connection, KeySide, RelationBuilder, RelationDescriptor, RelationType};
#[doc(inline)]
pub use index::OwnerIndex;
#[doc(inline)]
pub use mutation::MutationCoordinator;
#[doc(inline)]
pub use registry::RelationRegistry;
#[doc(inline)]
pub use resolver::Resolver;
#[doc(inline)]
pub use strategy::{strategy_for, ArrayConnection, ConnectionStrategy, ScalarConnection};
