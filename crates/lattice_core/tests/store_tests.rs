//! End-to-end store behavior over the in-memory backend.

use lattice_core::{
    Operator, Query, Record, SchemaDocument, SearchOptions, Store, StoreError, Value,
};
use std::collections::BTreeMap;

fn users_schema() -> SchemaDocument {
    SchemaDocument::new(1).collection(
        "users",
        [
            ("*id", "str"),
            ("+email", "str"),
            ("age", "int"),
            ("~tags", "str[]"),
        ],
    )
}

fn open_users() -> Store {
    Store::open("mem:", Some(users_schema())).unwrap()
}

fn record(pairs: Vec<(&str, Value)>) -> Record {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn dict(pairs: Vec<(&str, Value)>) -> Value {
    Value::Dict(
        pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect::<BTreeMap<_, _>>(),
    )
}

fn user(id: &str, email: &str, age: i64) -> Record {
    record(vec![
        ("id", Value::Str(id.into())),
        ("email", Value::Str(email.into())),
        ("age", Value::Int(age)),
    ])
}

fn search(store: &Store, predicate: Value) -> Vec<Record> {
    let query = Query::parse(&predicate).unwrap();
    store
        .search("users", &query, &SearchOptions::new())
        .unwrap()
        .records
}

#[test]
fn insert_then_search_by_primary() {
    let store = open_users();
    store.insert("users", user("u1", "a@x.com", 30)).unwrap();

    let found = search(&store, dict(vec![("id", Value::Str("u1".into()))]));
    assert_eq!(found, vec![user("u1", "a@x.com", 30)]);
}

#[test]
fn duplicate_unique_email_rejected() {
    let store = open_users();
    store.insert("users", user("u1", "a@x.com", 30)).unwrap();

    let result = store.insert("users", user("u2", "a@x.com", 20));
    assert!(matches!(result, Err(StoreError::DuplicateKey { .. })));

    // The failed insert left nothing behind.
    let all = search(&store, dict(vec![]));
    assert_eq!(all.len(), 1);
}

#[test]
fn duplicate_primary_rejected() {
    let store = open_users();
    store.insert("users", user("u1", "a@x.com", 30)).unwrap();

    let result = store.insert("users", user("u1", "b@x.com", 20));
    assert!(matches!(result, Err(StoreError::DuplicateKey { .. })));
}

#[test]
fn insert_missing_primary_rejected() {
    let store = open_users();
    let result = store.insert(
        "users",
        record(vec![("email", Value::Str("a@x.com".into()))]),
    );
    assert!(matches!(result, Err(StoreError::Validation { .. })));
}

#[test]
fn insert_unknown_collection_rejected() {
    let store = open_users();
    let result = store.insert("orders", user("o1", "a@x.com", 1));
    assert!(matches!(result, Err(StoreError::UnknownCollection { .. })));
}

#[test]
fn search_by_unique_secondary() {
    let store = open_users();
    store.insert("users", user("u1", "a@x.com", 30)).unwrap();
    store.insert("users", user("u2", "b@x.com", 40)).unwrap();

    let found = search(&store, dict(vec![("email", Value::Str("b@x.com".into()))]));
    assert_eq!(found, vec![user("u2", "b@x.com", 40)]);
}

#[test]
fn update_changes_value_and_index() {
    let store = open_users();
    store.insert("users", user("u1", "a@x.com", 30)).unwrap();

    let query = Query::parse(&dict(vec![("id", Value::Str("u1".into()))])).unwrap();
    let outcomes = store
        .update("users", &query, &record(vec![("age", Value::Int(31))]))
        .unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].is_ok());

    let found = search(&store, dict(vec![("id", Value::Str("u1".into()))]));
    assert_eq!(found[0]["age"], Value::Int(31));
}

#[test]
fn update_missing_record_is_noop() {
    let store = open_users();
    let query = Query::parse(&dict(vec![("id", Value::Str("ghost".into()))])).unwrap();
    let outcomes = store
        .update("users", &query, &record(vec![("age", Value::Int(1))]))
        .unwrap();
    assert!(outcomes.is_empty());
}

#[test]
fn update_primary_rejected() {
    let store = open_users();
    store.insert("users", user("u1", "a@x.com", 30)).unwrap();

    let query = Query::parse(&dict(vec![("id", Value::Str("u1".into()))])).unwrap();
    let result = store.update(
        "users",
        &query,
        &record(vec![("id", Value::Str("u9".into()))]),
    );
    assert!(matches!(result, Err(StoreError::Validation { .. })));
}

#[test]
fn update_unique_attribute_repoints_index() {
    let store = open_users();
    store.insert("users", user("u1", "a@x.com", 30)).unwrap();

    let query = Query::parse(&dict(vec![("id", Value::Str("u1".into()))])).unwrap();
    store
        .update(
            "users",
            &query,
            &record(vec![("email", Value::Str("new@x.com".into()))]),
        )
        .unwrap();

    // Old pointer gone, new pointer live.
    assert!(search(&store, dict(vec![("email", Value::Str("a@x.com".into()))])).is_empty());
    let found = search(&store, dict(vec![("email", Value::Str("new@x.com".into()))]));
    assert_eq!(found.len(), 1);

    // The freed value is usable by another record again.
    store.insert("users", user("u2", "a@x.com", 20)).unwrap();
}

#[test]
fn update_unique_collision_is_per_record_error() {
    let store = open_users();
    store.insert("users", user("u1", "a@x.com", 30)).unwrap();
    store.insert("users", user("u2", "b@x.com", 40)).unwrap();

    let query = Query::parse(&dict(vec![("id", Value::Str("u2".into()))])).unwrap();
    let outcomes = store
        .update(
            "users",
            &query,
            &record(vec![("email", Value::Str("a@x.com".into()))]),
        )
        .unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(matches!(
        outcomes[0].result,
        Err(StoreError::DuplicateKey { .. })
    ));

    // Nothing changed.
    let found = search(&store, dict(vec![("id", Value::Str("u2".into()))]));
    assert_eq!(found[0]["email"], Value::Str("b@x.com".into()));
}

#[test]
fn delete_removes_record_and_pointers() {
    let store = open_users();
    store.insert("users", user("u1", "a@x.com", 30)).unwrap();

    let query = Query::parse(&dict(vec![("id", Value::Str("u1".into()))])).unwrap();
    let outcomes = store.delete("users", &query).unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].is_ok());

    assert!(search(&store, dict(vec![])).is_empty());
    assert!(search(&store, dict(vec![("email", Value::Str("a@x.com".into()))])).is_empty());

    // The primary and unique values are reusable.
    store.insert("users", user("u1", "a@x.com", 31)).unwrap();
}

#[test]
fn containment_any_and_all() {
    let store = open_users();
    let mut r1 = user("u1", "a@x.com", 30);
    r1.insert("tags".into(), Value::from(vec!["x", "y"]));
    let mut r2 = user("u2", "b@x.com", 40);
    r2.insert("tags".into(), Value::from(vec!["y", "z"]));
    let mut r3 = user("u3", "c@x.com", 50);
    r3.insert("tags".into(), Value::from(vec!["w"]));
    store.insert("users", r1).unwrap();
    store.insert("users", r2).unwrap();
    store.insert("users", r3).unwrap();

    let any = search(
        &store,
        dict(vec![("tags", dict(vec![("$any", Value::from(vec!["x", "y"]))]))]),
    );
    let mut ids: Vec<&Value> = any.iter().map(|r| &r["id"]).collect();
    ids.sort_by_key(|v| v.as_str().unwrap().to_string());
    assert_eq!(ids, vec![&Value::Str("u1".into()), &Value::Str("u2".into())]);

    let all = search(
        &store,
        dict(vec![("tags", dict(vec![("$all", Value::from(vec!["x", "y"]))]))]),
    );
    assert_eq!(all.len(), 1);
    assert_eq!(all[0]["id"], Value::Str("u1".into()));
}

#[test]
fn in_with_duplicates_returns_each_once() {
    let store = open_users();
    store.insert("users", user("a", "a@x.com", 1)).unwrap();
    store.insert("users", user("b", "b@x.com", 2)).unwrap();

    let found = search(
        &store,
        dict(vec![(
            "id",
            dict(vec![("$in", Value::from(vec!["a", "a", "b", "ghost"]))]),
        )]),
    );
    assert_eq!(found.len(), 2);
}

#[test]
fn residual_filter_applies_on_indexed_scan() {
    let store = open_users();
    store.insert("users", user("u1", "a@x.com", 30)).unwrap();
    store.insert("users", user("u2", "b@x.com", 40)).unwrap();

    // email drives the scan, age filters residually.
    let found = search(
        &store,
        dict(vec![
            ("email", Value::Str("a@x.com".into())),
            ("age", Value::Int(99)),
        ]),
    );
    assert!(found.is_empty());
}

#[test]
fn ne_and_nin_match_absent_attributes() {
    let store = open_users();
    store.insert("users", user("u1", "a@x.com", 30)).unwrap();
    store
        .insert(
            "users",
            record(vec![
                ("id", Value::Str("u2".into())),
                ("email", Value::Str("b@x.com".into())),
            ]),
        )
        .unwrap();

    let found = search(&store, dict(vec![("age", dict(vec![("$ne", Value::Int(30))]))]));
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["id"], Value::Str("u2".into()));
}

#[test]
fn or_query_unions_and_deduplicates() {
    let store = open_users();
    store.insert("users", user("u1", "a@x.com", 30)).unwrap();
    store.insert("users", user("u2", "b@x.com", 40)).unwrap();

    // Both groups match u1; the union must return it once.
    let by_id = Query::parse(&dict(vec![("id", Value::Str("u1".into()))])).unwrap();
    let by_age = Query::parse(&dict(vec![("age", dict(vec![("$lte", Value::Int(40))]))]))
        .unwrap();
    let union = Query::any_of([by_id, by_age]);

    let found = store
        .search("users", &union, &SearchOptions::new())
        .unwrap()
        .records;
    assert_eq!(found.len(), 2);
}

#[test]
fn fields_projection_keeps_primary() {
    let store = open_users();
    store.insert("users", user("u1", "a@x.com", 30)).unwrap();

    let query = Query::parse(&dict(vec![("id", Value::Str("u1".into()))])).unwrap();
    let found = store
        .search("users", &query, &SearchOptions::new().fields(["age"]))
        .unwrap()
        .records;
    assert_eq!(
        found[0],
        record(vec![("id", Value::Str("u1".into())), ("age", Value::Int(30))])
    );
}

#[test]
fn offset_and_limit() {
    let store = open_users();
    for i in 0..5 {
        store
            .insert("users", user(&format!("u{i}"), &format!("{i}@x.com"), i))
            .unwrap();
    }

    let found = store
        .search(
            "users",
            &Query::all(),
            &SearchOptions::new().offset(1).limit(2),
        )
        .unwrap()
        .records;
    assert_eq!(found.len(), 2);
    assert_eq!(found[0]["id"], Value::Str("u1".into()));
    assert_eq!(found[1]["id"], Value::Str("u2".into()));
}

#[test]
fn lock_conflict_and_release() {
    let store = open_users();
    store.insert("users", user("u1", "a@x.com", 30)).unwrap();
    store.insert("users", user("u2", "b@x.com", 40)).unwrap();

    // t1 locks the full set.
    store
        .search("users", &Query::all(), &SearchOptions::new().lock("t1"))
        .unwrap();

    // t2 conflicts on the overlapping set.
    let query = Query::parse(&dict(vec![("id", Value::Str("u1".into()))])).unwrap();
    let result = store.search("users", &query, &SearchOptions::new().lock("t2"));
    assert!(matches!(result, Err(StoreError::LockConflict { .. })));

    // Re-acquiring under the same token is fine.
    store
        .search("users", &query, &SearchOptions::new().lock("t1"))
        .unwrap();

    // A release under the wrong token does not free the records.
    store
        .search("users", &Query::all(), &SearchOptions::new().unlock("t2"))
        .unwrap();
    let still = store.search("users", &query, &SearchOptions::new().lock("t2"));
    assert!(matches!(still, Err(StoreError::LockConflict { .. })));

    // After the owner releases, t2 can acquire.
    store
        .search("users", &Query::all(), &SearchOptions::new().unlock("t1"))
        .unwrap();
    store
        .search("users", &query, &SearchOptions::new().lock("t2"))
        .unwrap();
}

#[test]
fn failed_lock_acquisition_rolls_back() {
    let store = open_users();
    store.insert("users", user("u1", "a@x.com", 30)).unwrap();
    store.insert("users", user("u2", "b@x.com", 40)).unwrap();

    let q1 = Query::parse(&dict(vec![("id", Value::Str("u1".into()))])).unwrap();
    store
        .search("users", &q1, &SearchOptions::new().lock("t1"))
        .unwrap();

    // t2 over {u1, u2} fails on u1; u2 must remain free.
    let result = store.search("users", &Query::all(), &SearchOptions::new().lock("t2"));
    assert!(matches!(result, Err(StoreError::LockConflict { .. })));

    let q2 = Query::parse(&dict(vec![("id", Value::Str("u2".into()))])).unwrap();
    store
        .search("users", &q2, &SearchOptions::new().lock("t3"))
        .unwrap();
}

#[test]
fn concurrent_inserts_cannot_both_claim_a_unique_value() {
    use std::sync::Arc;

    let store = Arc::new(open_users());
    let mut handles = Vec::new();
    for i in 0..8 {
        let store = Arc::clone(&store);
        handles.push(std::thread::spawn(move || {
            store.insert("users", user(&format!("u{i}"), "same@x.com", i))
        }));
    }

    let successes = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(Result::is_ok)
        .count();
    assert_eq!(successes, 1);

    let found = search(&store, dict(vec![("email", Value::Str("same@x.com".into()))]));
    assert_eq!(found.len(), 1);
}

#[test]
fn empty_query_on_empty_collection() {
    let store = open_users();
    assert!(search(&store, dict(vec![])).is_empty());
}

#[test]
fn multi_record_update_reports_each_outcome() {
    let store = open_users();
    for i in 0..3 {
        store
            .insert("users", user(&format!("u{i}"), &format!("{i}@x.com"), 10))
            .unwrap();
    }

    let query = Query::parse(&dict(vec![("age", Value::Int(10))])).unwrap();
    let outcomes = store
        .update("users", &query, &record(vec![("age", Value::Int(11))]))
        .unwrap();
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.iter().all(|o| o.is_ok()));

    let found = search(&store, dict(vec![("age", Value::Int(11))]));
    assert_eq!(found.len(), 3);
}

#[test]
fn operator_validation_errors() {
    let store = open_users();

    // Scalar operator on an array attribute.
    let query = Query::parse(&dict(vec![("tags", Value::Str("x".into()))])).unwrap();
    assert!(matches!(
        store.search("users", &query, &SearchOptions::new()),
        Err(StoreError::Validation { .. })
    ));

    // Containment on a scalar attribute.
    let query = Query::parse(&dict(vec![(
        "age",
        dict(vec![("$any", Value::from(vec![1i64]))]),
    )]))
    .unwrap();
    assert!(matches!(
        store.search("users", &query, &SearchOptions::new()),
        Err(StoreError::Validation { .. })
    ));
}

#[test]
fn query_builder_equivalent_to_parse() {
    let store = open_users();
    store.insert("users", user("u1", "a@x.com", 30)).unwrap();

    let built = Query::all()
        .with("age", Operator::Gte, Value::Int(30))
        .unwrap();
    let found = store
        .search("users", &built, &SearchOptions::new())
        .unwrap()
        .records;
    assert_eq!(found.len(), 1);
}
