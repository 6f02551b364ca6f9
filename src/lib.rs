//! # Lifeguard Arrays
//!
//! Array-connected relations for PostgreSQL on the `may` runtime.
//!
//! Besides the conventional `belongs_to` / `has_one` / `has_many` joined by
//! an equality on a scalar key, a relation can be connected through an array
//! column: `videos.tag_ids bigint[]` makes `videos belongs_to_many tags`, and
//! seen from the other side `tags has_many videos` through the same array.
//!
//! - [`relation::Resolver`] loads one relation for many owners with a single
//!   fetch (`"tag_ids" && '{1,2}'` or `"id" IN (1, 2)`)
//! - [`relation::MutationCoordinator`] appends, removes and replaces targets
//!   and orders the saves so keys exist before they are referenced
//! - [`store::MemoryStore`] and [`store::PgStore`] are the two shipped stores
//!
//! ```
//! use lifeguard_arrays::relation::{RelationDescriptor, RelationRegistry, Resolver};
//! use lifeguard_arrays::store::MemoryStore;
//! use lifeguard_arrays::{Record, Session};
//!
//! let mut registry = RelationRegistry::new();
//! registry.register(RelationDescriptor::belongs_to_many("videos", "tags").build()?)?;
//!
//! let store = MemoryStore::new();
//! store.seed(Record::new("tags").with("id", 1i64).with("name", "drama"));
//! let video = store.seed(Record::new("videos").with("tag_ids", vec![1i64]));
//!
//! let mut session = Session::new();
//! let video = session.add(video);
//! Resolver::new(&store, &registry).resolve_named(&mut session, &[video], "tags")?;
//! assert_eq!(session.targets(video, "tags").len(), 1);
//! # Ok::<(), lifeguard_arrays::RelationError>(())
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
pub mod inflector;
pub mod metrics;
pub mod relation;
pub mod session;
pub mod store;
pub mod transaction;
pub mod value;

pub use config::EngineConfig;
pub use connection::{connect, ConnectionError};
pub use error::{RelationError, StoreError, ValidationError};
pub use executor::{Executor, MayPostgresExecutor};
pub use relation::{
    MutationCoordinator, RelationDescriptor, RelationRegistry, RelationType, Resolver,
};
pub use session::{AssociationState, AssociationTarget, PendingChange, RecordId, Session};
pub use store::{within_unit_of_work, Fetcher, MemoryStore, PgStore, Predicate, StoreWriter, UnitOfWork};
pub use value::{AttrValue, Record, Scalar};
