//! Shared fixtures for the MemoryStore-driven suites.
#![allow(dead_code)]

use lifeguard_arrays::relation::{RelationDescriptor, RelationRegistry};
use lifeguard_arrays::{AttrValue, EngineConfig, MemoryStore, Record, RecordId, Scalar, Session};

/// Registry covering every connection shape used by the suites:
///
/// - `videos.tag_ids bigint[]` <-> `tags.id` (belongs_to_many / has_many)
/// - `books.author_ids bigint[]` <-> `authors.id`
/// - `profiles.user_ids bigint[]` -> `users.id` (has_one through an array)
/// - `accounts.user_id` -> `users.id` (scalar has_one)
/// - `comments.commentable_id` + `commentable_type` (polymorphic belongs_to)
pub fn registry(config: &EngineConfig) -> RelationRegistry {
    let mut registry = RelationRegistry::with_config(config);
    let descriptors = [
        RelationDescriptor::belongs_to_many("videos", "tags").build_with(config),
        RelationDescriptor::has_many("tags", "videos").array().build_with(config),
        RelationDescriptor::belongs_to_many("books", "authors").build_with(config),
        RelationDescriptor::has_many("authors", "books").array().build_with(config),
        RelationDescriptor::has_one("users", "profile")
            .array()
            .foreign_key("user_ids")
            .build_with(config),
        RelationDescriptor::has_one("users", "account").build_with(config),
        RelationDescriptor::belongs_to("comments", "commentable")
            .polymorphic()
            .build_with(config),
    ];
    for descriptor in descriptors {
        registry.register(descriptor.unwrap()).unwrap();
    }
    registry
}

/// Seed a row into the store and load it into the session
pub fn load(store: &MemoryStore, session: &mut Session, record: Record) -> RecordId {
    session.add(store.seed(record))
}

pub fn tag(id: i64, name: &str) -> Record {
    Record::new("tags").with("id", id).with("name", name)
}

pub fn video(id: i64, tag_ids: Vec<i64>) -> Record {
    Record::new("videos").with("id", id).with("tag_ids", tag_ids)
}

pub fn pk(session: &Session, id: RecordId) -> Scalar {
    session.get(id).unwrap().id().cloned().unwrap()
}

pub fn stored(store: &MemoryStore, session: &Session, id: RecordId, column: &str) -> AttrValue {
    let record = session.get(id).unwrap();
    store
        .find(record.entity(), record.id().unwrap())
        .unwrap()
        .get(column)
        .clone()
}
