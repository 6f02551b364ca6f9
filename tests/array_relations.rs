//! Resolution of array-connected relations against the in-memory store.

mod common;

use common::{load, registry, tag, video};
use lifeguard_arrays::relation::{RelationDescriptor, Resolver};
use lifeguard_arrays::{
    AttrValue, EngineConfig, MemoryStore, Predicate, Record, RelationError, Scalar, Session,
};

#[test]
fn test_belongs_to_many_keeps_owner_array_order() {
    let config = EngineConfig::default();
    let registry = registry(&config);
    let store = MemoryStore::new();
    let mut session = Session::new();
    let drama = load(&store, &mut session, tag(1, "drama"));
    let comedy = load(&store, &mut session, tag(2, "comedy"));
    let clip = load(&store, &mut session, video(1, vec![2, 1]));

    Resolver::new(&store, &registry)
        .resolve_named(&mut session, &[clip], "tags")
        .unwrap();

    assert_eq!(session.targets(clip, "tags"), vec![comedy, drama]);
    assert_eq!(store.fetch_count(), 1);
    assert_eq!(store.fetches()[0].1.column(), "id");
}

#[test]
fn test_belongs_to_many_batches_owners_and_shares_targets() {
    let config = EngineConfig::default();
    let registry = registry(&config);
    let store = MemoryStore::new();
    store.seed(tag(1, "drama"));
    store.seed(tag(2, "comedy"));
    let mut session = Session::new();
    let first = load(&store, &mut session, video(1, vec![1, 2]));
    let second = load(&store, &mut session, video(2, vec![2]));
    let untagged = load(&store, &mut session, Record::new("videos").with("id", 3i64));

    Resolver::new(&store, &registry)
        .resolve_named(&mut session, &[first, second, untagged], "tags")
        .unwrap();

    assert_eq!(store.fetch_count(), 1);
    let comedy = session.find("tags", &Scalar::Int(2)).unwrap();
    assert_eq!(session.targets(first, "tags").len(), 2);
    assert_eq!(session.targets(second, "tags"), vec![comedy]);
    assert!(session.targets(untagged, "tags").is_empty());
    assert!(session.is_loaded(untagged, "tags"));
}

#[test]
fn test_has_many_through_array_fans_out() {
    let config = EngineConfig::default();
    let registry = registry(&config);
    let store = MemoryStore::new();
    let mut session = Session::new();
    let five = load(&store, &mut session, Record::new("authors").with("id", 5i64));
    let six = load(&store, &mut session, Record::new("authors").with("id", 6i64));
    let seven = load(&store, &mut session, Record::new("authors").with("id", 7i64));
    store.seed(Record::new("books").with("id", 1i64).with("author_ids", vec![5i64, 6]));
    store.seed(Record::new("books").with("id", 2i64).with("author_ids", vec![6i64]));

    Resolver::new(&store, &registry)
        .resolve_named(&mut session, &[five, six, seven], "books")
        .unwrap();

    let shared = session.find("books", &Scalar::Int(1)).unwrap();
    let solo = session.find("books", &Scalar::Int(2)).unwrap();
    assert_eq!(session.targets(five, "books"), vec![shared]);
    assert_eq!(session.targets(six, "books"), vec![shared, solo]);
    assert!(session.targets(seven, "books").is_empty());

    assert_eq!(store.fetch_count(), 1);
    assert!(matches!(
        &store.fetches()[0].1,
        Predicate::ArrayOverlaps { column, .. } if column == "author_ids"
    ));
}

#[test]
fn test_inverse_is_filled_and_loaded_only_when_complete() {
    let config = EngineConfig::default();
    let registry = registry(&config);
    let store = MemoryStore::new();
    let mut session = Session::new();
    let five = load(&store, &mut session, Record::new("authors").with("id", 5i64));
    let six = load(&store, &mut session, Record::new("authors").with("id", 6i64));
    store.seed(Record::new("books").with("id", 1i64).with("author_ids", vec![5i64, 6]));
    store.seed(Record::new("books").with("id", 2i64).with("author_ids", vec![6i64]));

    Resolver::new(&store, &registry)
        .resolve_named(&mut session, &[five, six], "books")
        .unwrap();

    let shared = session.find("books", &Scalar::Int(1)).unwrap();
    let solo = session.find("books", &Scalar::Int(2)).unwrap();

    let shared_state = session.association(shared, "authors").unwrap();
    assert!(shared_state.inversed);
    assert_eq!(shared_state.target.ids(), &[five, six]);
    // book 1 may reference authors outside this batch
    assert!(!shared_state.loaded);

    // book 2's array is exactly the owner's key
    assert!(session.is_loaded(solo, "authors"));
    assert_eq!(session.targets(solo, "authors"), vec![six]);
}

#[test]
fn test_automatic_inverse_on_belongs_to_many() {
    let config = EngineConfig::default();
    let registry = registry(&config);
    let store = MemoryStore::new();
    let mut session = Session::new();
    let drama = load(&store, &mut session, tag(1, "drama"));
    let clip = load(&store, &mut session, video(1, vec![1]));

    Resolver::new(&store, &registry)
        .resolve_named(&mut session, &[clip], "tags")
        .unwrap();

    let state = session.association(drama, "videos").unwrap();
    assert!(state.inversed);
    assert_eq!(state.target.ids(), &[clip]);
    // other videos may carry the same tag
    assert!(!state.loaded);
}

#[test]
fn test_automatic_inverse_can_be_disabled() {
    let config = EngineConfig {
        automatic_inverse: false,
        ..EngineConfig::default()
    };
    let registry = registry(&config);
    let store = MemoryStore::new();
    let mut session = Session::new();
    let drama = load(&store, &mut session, tag(1, "drama"));
    let clip = load(&store, &mut session, video(1, vec![1]));

    Resolver::new(&store, &registry)
        .resolve_named(&mut session, &[clip], "tags")
        .unwrap();

    assert_eq!(session.targets(clip, "tags"), vec![drama]);
    assert!(session.association(drama, "videos").is_none());
}

#[test]
fn test_resolve_is_idempotent() {
    let config = EngineConfig::default();
    let registry = registry(&config);
    let store = MemoryStore::new();
    let mut session = Session::new();
    load(&store, &mut session, tag(1, "drama"));
    let clip = load(&store, &mut session, video(1, vec![1]));
    let resolver = Resolver::new(&store, &registry);

    resolver.resolve_named(&mut session, &[clip], "tags").unwrap();
    let first = session.association(clip, "tags").cloned();
    resolver.resolve_named(&mut session, &[clip], "tags").unwrap();

    assert_eq!(session.association(clip, "tags").cloned(), first);
    assert_eq!(store.fetch_count(), 1);
}

#[test]
fn test_in_memory_changes_win_over_fetched_rows() {
    let config = EngineConfig::default();
    let registry = registry(&config);
    let store = MemoryStore::new();
    let mut session = Session::new();
    let drama = load(&store, &mut session, tag(1, "drama"));
    session.get_mut(drama).unwrap().set("name", "tragedy");
    let clip = load(&store, &mut session, video(1, vec![1]));

    Resolver::new(&store, &registry)
        .resolve_named(&mut session, &[clip], "tags")
        .unwrap();

    assert_eq!(session.targets(clip, "tags"), vec![drama]);
    assert_eq!(session.get(drama).unwrap().get("name"), &AttrValue::from("tragedy"));
}

#[test]
fn test_in_memory_array_edit_decides_grouping() {
    let config = EngineConfig::default();
    let registry = registry(&config);
    let store = MemoryStore::new();
    let mut session = Session::new();
    let five = load(&store, &mut session, Record::new("authors").with("id", 5i64));
    let six = load(&store, &mut session, Record::new("authors").with("id", 6i64));
    let book = load(
        &store,
        &mut session,
        Record::new("books").with("id", 1i64).with("author_ids", vec![5i64, 6]),
    );
    session.get_mut(book).unwrap().set("author_ids", vec![6i64]);

    Resolver::new(&store, &registry)
        .resolve_named(&mut session, &[five, six], "books")
        .unwrap();

    // the stored row still lists author 5, the session copy does not
    assert!(session.targets(five, "books").is_empty());
    assert_eq!(session.targets(six, "books"), vec![book]);
    assert_eq!(session.targets(book, "authors"), vec![six]);
    assert_eq!(
        session.get(book).unwrap().get("author_ids"),
        &AttrValue::from(vec![6i64])
    );
}

#[test]
fn test_has_one_through_array_rejects_multiple_matches() {
    let config = EngineConfig::default();
    let registry = registry(&config);
    let store = MemoryStore::new();
    let mut session = Session::new();
    let user = load(&store, &mut session, Record::new("users").with("id", 7i64));
    store.seed(Record::new("profiles").with("id", 1i64).with("user_ids", vec![7i64]));
    store.seed(Record::new("profiles").with("id", 2i64).with("user_ids", vec![7i64, 8]));

    let err = Resolver::new(&store, &registry)
        .resolve_named(&mut session, &[user], "profile")
        .unwrap_err();

    match err {
        RelationError::MultipleResults { relation, owner, count } => {
            assert_eq!(relation, "profile");
            assert_eq!(owner, user);
            assert_eq!(count, 2);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!session.is_loaded(user, "profile"));
}

#[test]
fn test_has_one_through_array_single_match() {
    let config = EngineConfig::default();
    let registry = registry(&config);
    let store = MemoryStore::new();
    let mut session = Session::new();
    let user = load(&store, &mut session, Record::new("users").with("id", 7i64));
    store.seed(Record::new("profiles").with("id", 1i64).with("user_ids", vec![7i64, 8]));

    Resolver::new(&store, &registry)
        .resolve_named(&mut session, &[user], "profile")
        .unwrap();

    let profile = session.find("profiles", &Scalar::Int(1)).unwrap();
    assert_eq!(session.targets(user, "profile"), vec![profile]);
}

#[test]
fn test_scalar_has_one_uses_equality() {
    let config = EngineConfig::default();
    let registry = registry(&config);
    let store = MemoryStore::new();
    let mut session = Session::new();
    let user = load(&store, &mut session, Record::new("users").with("id", 3i64));
    store.seed(Record::new("accounts").with("id", 1i64).with("user_id", 3i64));

    Resolver::new(&store, &registry)
        .resolve_named(&mut session, &[user], "account")
        .unwrap();

    assert_eq!(session.targets(user, "account").len(), 1);
    assert_eq!(
        store.fetches()[0].1,
        Predicate::Eq {
            column: "user_id".to_string(),
            value: Scalar::Int(3),
        }
    );
}

#[test]
fn test_polymorphic_belongs_to_fetches_per_type() {
    let config = EngineConfig::default();
    let registry = registry(&config);
    let store = MemoryStore::new();
    let mut session = Session::new();
    let clip = load(&store, &mut session, video(1, vec![]));
    let drama = load(&store, &mut session, tag(1, "drama"));
    let on_video = load(
        &store,
        &mut session,
        Record::new("comments")
            .with("commentable_type", "videos")
            .with("commentable_id", 1i64),
    );
    let on_tag = load(
        &store,
        &mut session,
        Record::new("comments")
            .with("commentable_type", "tags")
            .with("commentable_id", 1i64),
    );
    let orphan = load(&store, &mut session, Record::new("comments"));

    Resolver::new(&store, &registry)
        .resolve_named(&mut session, &[on_video, on_tag, orphan], "commentable")
        .unwrap();

    assert_eq!(session.targets(on_video, "commentable"), vec![clip]);
    assert_eq!(session.targets(on_tag, "commentable"), vec![drama]);
    assert!(session.targets(orphan, "commentable").is_empty());
    assert!(session.is_loaded(orphan, "commentable"));
    assert_eq!(store.fetch_count(), 2);
}

#[test]
fn test_array_connection_cannot_be_polymorphic() {
    let err = RelationDescriptor::has_many("tags", "items")
        .array()
        .polymorphic()
        .build()
        .unwrap_err();
    assert!(matches!(err, RelationError::Configuration(_)));

    let err = RelationDescriptor::belongs_to_many("notes", "subjects")
        .polymorphic()
        .build()
        .unwrap_err();
    assert!(matches!(err, RelationError::Configuration(_)));
}

#[test]
fn test_unknown_relation() {
    let config = EngineConfig::default();
    let registry = registry(&config);
    let store = MemoryStore::new();
    let mut session = Session::new();
    let clip = load(&store, &mut session, video(1, vec![]));

    let err = Resolver::new(&store, &registry)
        .resolve_named(&mut session, &[clip], "actors")
        .unwrap_err();
    assert!(matches!(err, RelationError::UnknownRelation { .. }));
}

#[test]
fn test_overlap_predicate_sql_quotes_text_elements() {
    let predicate = Predicate::ArrayOverlaps {
        column: "labels".to_string(),
        values: vec![
            Scalar::Text("a b".to_string()),
            Scalar::Text("plain".to_string()),
            Scalar::Text("O'Brien".to_string()),
        ],
    };
    assert_eq!(
        predicate.to_condition(),
        r#""labels" && '{"a b",plain,"O''Brien"}'"#
    );
    let sql = predicate.to_sql("notes");
    assert!(sql.starts_with(r#"SELECT * FROM "notes" WHERE"#), "got {sql}");
    assert!(sql.contains(r#"'{"a b",plain,"O''Brien"}'"#), "got {sql}");
}
