// Integration tests for the storage abstraction over the in-memory backend,
// driven through the registry and collection handles the way application
// code uses them.

use polystore_core::{
    BackendConfig, Document, FindOptions, MemoryBackend, Predicate, Registry, SortOrder,
    StoreError, UpdateSpec,
};
use serde_json::{json, Value};
use std::sync::Arc;

fn setup_registry() -> Registry {
    Registry::with_backend(Arc::new(MemoryBackend::new()))
}

fn doc(value: Value) -> Document {
    Document::from_value(value).unwrap()
}

fn ids(documents: &[Document]) -> Vec<String> {
    documents
        .iter()
        .map(|d| d.id().unwrap().as_str().unwrap().to_string())
        .collect()
}

#[test]
fn test_insert_find_roundtrip_preserves_every_field() {
    let registry = setup_registry();
    let players = registry.handle_for("players");

    let original = doc(json!({
        "id": uuid::Uuid::new_v4().to_string(),
        "player_name": "Jordan Lake",
        "grad_class": "2026",
        "gpa": 3.7,
        "verified": false,
        "positions": ["QB", "WR"],
        "address": {"city": "Austin", "state": "TX"},
        "notes": null
    }));
    players.insert_one(original.clone()).unwrap();

    let found = players
        .find_one(&Predicate::eq("id", original.id().unwrap().clone()))
        .unwrap()
        .expect("inserted document must be findable by id");
    assert_eq!(found, original);
}

#[test]
fn test_partial_update_changes_only_named_fields() {
    let registry = setup_registry();
    let players = registry.handle_for("players");

    let original = doc(json!({
        "id": "p1",
        "player_name": "Jordan Lake",
        "grad_class": "2026",
        "verified": false,
        "positions": ["QB"]
    }));
    players.insert_one(original.clone()).unwrap();

    let result = players
        .update_one(
            &Predicate::eq("id", json!("p1")),
            &UpdateSpec::new()
                .set("verified", json!(true))
                .set("grad_class", json!("2027")),
        )
        .unwrap();
    assert_eq!(result.matched_count, 1);
    assert_eq!(result.modified_count, 1);

    let updated = players
        .find_one(&Predicate::eq("id", json!("p1")))
        .unwrap()
        .unwrap();
    assert_eq!(updated.get("verified").unwrap(), &json!(true));
    assert_eq!(updated.get("grad_class").unwrap(), &json!("2027"));
    // Everything unnamed is untouched.
    assert_eq!(updated.get("player_name"), original.get("player_name"));
    assert_eq!(updated.get("positions"), original.get("positions"));
}

#[test]
fn test_or_predicate_truth_table_through_handle() {
    let registry = setup_registry();
    let players = registry.handle_for("players");

    players
        .insert_one(doc(json!({"id": "only_first", "primary_position": "QB"})))
        .unwrap();
    players
        .insert_one(doc(json!({"id": "only_second", "secondary_position": "QB"})))
        .unwrap();
    players
        .insert_one(doc(
            json!({"id": "both", "primary_position": "QB", "secondary_position": "QB"}),
        ))
        .unwrap();
    players
        .insert_one(doc(json!({"id": "neither", "primary_position": "WR"})))
        .unwrap();

    let either_position = Predicate::any([
        Predicate::eq("primary_position", json!("QB")),
        Predicate::eq("secondary_position", json!("QB")),
    ]);
    let matched: Vec<Document> = players
        .find(&either_position, &FindOptions::new())
        .unwrap()
        .collect();
    assert_eq!(ids(&matched), vec!["only_first", "only_second", "both"]);
}

#[test]
fn test_unique_index_admits_exactly_one() {
    let registry = setup_registry();
    let staff = registry.handle_for("staff_users");
    staff.create_index("email", true).unwrap();

    staff
        .insert_one(doc(json!({"id": "u1", "email": "admin@hwh.io"})))
        .unwrap();
    let err = staff
        .insert_one(doc(json!({"id": "u2", "email": "admin@hwh.io"})))
        .unwrap_err();
    assert!(matches!(err, StoreError::DuplicateKey(_)));
    assert_eq!(staff.count_documents(&Predicate::empty()).unwrap(), 1);
}

#[test]
fn test_find_one_without_match_is_a_value() {
    let registry = setup_registry();
    let players = registry.handle_for("players");
    let missing = players
        .find_one(&Predicate::eq("id", json!("ghost")))
        .unwrap();
    assert!(missing.is_none());
}

#[test]
fn test_delete_then_zero_counts() {
    let registry = setup_registry();
    let tokens = registry.handle_for("password_reset_tokens");

    tokens
        .insert_one(doc(json!({"id": "t1", "email": "a@hwh.io"})))
        .unwrap();
    assert_eq!(
        tokens
            .delete_one(&Predicate::eq("id", json!("t1")))
            .unwrap()
            .deleted_count,
        1
    );
    // Deleting again is a zero-count value, not an error.
    assert_eq!(
        tokens
            .delete_one(&Predicate::eq("id", json!("t1")))
            .unwrap()
            .deleted_count,
        0
    );
}

#[test]
fn test_cursor_abandoned_mid_stream_leaves_store_intact() {
    let registry = setup_registry();
    let players = registry.handle_for("players");
    for i in 0..5 {
        players
            .insert_one(doc(json!({"id": format!("p{}", i)})))
            .unwrap();
    }

    let mut cursor = players.find(&Predicate::empty(), &FindOptions::new()).unwrap();
    let _first = cursor.next();
    drop(cursor);

    assert_eq!(players.count_documents(&Predicate::empty()).unwrap(), 5);
}

#[test]
fn test_sort_skip_limit_pagination() {
    let registry = setup_registry();
    let players = registry.handle_for("players");
    for (id, class) in [("a", "2028"), ("b", "2025"), ("c", "2027"), ("d", "2026")] {
        players
            .insert_one(doc(json!({"id": id, "grad_class": class})))
            .unwrap();
    }

    let page: Vec<Document> = players
        .find(
            &Predicate::empty(),
            &FindOptions::new()
                .with_sort("grad_class", SortOrder::Descending)
                .with_skip(1)
                .with_limit(2),
        )
        .unwrap()
        .collect();
    assert_eq!(ids(&page), vec!["c", "d"]);

    // count_documents is independent of skip/limit.
    assert_eq!(players.count_documents(&Predicate::empty()).unwrap(), 4);
}

// The end-to-end scenario the layer is contractually held to: insertion
// order survives mutation, so a re-run of the same find after an update
// returns [p1, p2], not [p2, p1].
#[test]
fn test_players_scenario_sort_stability_uses_insertion_order() {
    let registry = Registry::new(&BackendConfig::InMemory).unwrap();
    let players = registry.handle_for("players");
    assert_eq!(players.count_documents(&Predicate::empty()).unwrap(), 0);

    players
        .insert_one(doc(
            json!({"id": "p1", "grad_class": "2026", "verified": false}),
        ))
        .unwrap();
    players
        .insert_one(doc(
            json!({"id": "p2", "grad_class": "2027", "verified": true}),
        ))
        .unwrap();

    let verified: Vec<Document> = players
        .find(&Predicate::eq("verified", json!(true)), &FindOptions::new())
        .unwrap()
        .collect();
    assert_eq!(ids(&verified), vec!["p2"]);

    assert_eq!(players.count_documents(&Predicate::empty()).unwrap(), 2);

    let result = players
        .update_one(
            &Predicate::eq("id", json!("p1")),
            &UpdateSpec::new().set("verified", json!(true)),
        )
        .unwrap();
    assert_eq!(result.matched_count, 1);
    assert_eq!(result.modified_count, 1);

    let verified: Vec<Document> = players
        .find(&Predicate::eq("verified", json!(true)), &FindOptions::new())
        .unwrap()
        .collect();
    assert_eq!(ids(&verified), vec!["p1", "p2"]);
}

#[test]
fn test_list_all_with_empty_predicate() {
    let registry = setup_registry();
    let projects = registry.handle_for("projects");
    for i in 0..3 {
        projects
            .insert_one(doc(json!({"id": format!("proj{}", i)})))
            .unwrap();
    }
    let all: Vec<Document> = projects
        .find(&Predicate::empty(), &FindOptions::new())
        .unwrap()
        .collect();
    assert_eq!(all.len(), 3);
}
