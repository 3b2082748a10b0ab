use normgraph_engine::{NormalizeContext, NormalizedTables, Normalizer};
use normgraph_schema::{EntityDef, SchemaGraph};
use serde_json::{json, Value};

fn membership_graph() -> SchemaGraph {
    SchemaGraph::builder()
        .register(
            EntityDef::new("users")
                .attr("id", Value::Null)
                .many_to_many("roles", "roles", "role_user", "user_id", "role_id"),
        )
        .register(EntityDef::new("roles").attr("id", Value::Null))
        .register(
            EntityDef::new("role_user")
                .composite_key(["role_id", "user_id"])
                .attr("role_id", Value::Null)
                .attr("user_id", Value::Null),
        )
        .build()
        .expect("valid graph")
}

#[test]
fn each_pair_becomes_one_pivot_keyed_by_the_declared_key() {
    let graph = membership_graph();
    let normalizer = Normalizer::new(&graph);
    let mut ctx = NormalizeContext::new();
    let persisted = NormalizedTables::new();

    let tables = normalizer
        .normalize(
            &mut ctx,
            &persisted,
            "users",
            &json!({"id": 1, "roles": [{"id": 2}, {"id": 3}]}),
        )
        .expect("normalize");

    let pivots = tables.table("role_user").expect("pivot table");
    assert_eq!(pivots.len(), 2);

    let first = tables.record("role_user", "[2,1]").expect("pivot [2,1]");
    assert_eq!(first.get("$id"), Some(&json!([2, 1])));
    assert_eq!(first.get("role_id"), Some(&json!(2)));
    assert_eq!(first.get("user_id"), Some(&json!(1)));
    assert!(tables.contains_record("role_user", "[3,1]"));

    // The owner-side field is cleared; the pivot table is the linkage.
    assert_eq!(
        tables.record("users", "1").and_then(|u| u.get("roles")),
        Some(&json!([]))
    );
}

#[test]
fn owners_sharing_a_role_produce_distinct_pairs() {
    let graph = membership_graph();
    let normalizer = Normalizer::new(&graph);
    let mut ctx = NormalizeContext::new();
    let persisted = NormalizedTables::new();

    let tables = normalizer
        .normalize(
            &mut ctx,
            &persisted,
            "users",
            &json!([
                {"id": 1, "roles": [{"id": 2}]},
                {"id": 2, "roles": [{"id": 2}]},
            ]),
        )
        .expect("normalize");

    let pivots = tables.table("role_user").expect("pivot table");
    assert_eq!(pivots.len(), 2);
    assert!(tables.contains_record("role_user", "[2,1]"));
    assert!(tables.contains_record("role_user", "[2,2]"));
}

#[test]
fn a_pair_repeated_within_one_batch_synthesizes_once() {
    let graph = membership_graph();
    let normalizer = Normalizer::new(&graph);
    let mut ctx = NormalizeContext::new();
    let persisted = NormalizedTables::new();

    let tables = normalizer
        .normalize(
            &mut ctx,
            &persisted,
            "users",
            &json!([
                {"id": 1, "roles": [{"id": 2}]},
                {"id": 1, "roles": [{"id": 2}]},
            ]),
        )
        .expect("normalize");

    assert_eq!(tables.table("role_user").map(|t| t.len()), Some(1));
}

#[test]
fn persisted_pairs_are_not_synthesized_again() {
    let graph = membership_graph();
    let normalizer = Normalizer::new(&graph);
    let mut ctx = NormalizeContext::new();
    let mut persisted = NormalizedTables::new();

    let input = json!({"id": 1, "roles": [{"id": 2}, {"id": 3}]});
    let batch = normalizer
        .normalize(&mut ctx, &persisted, "users", &input)
        .expect("normalize");
    persisted.merge(batch);

    let again = normalizer
        .normalize(&mut ctx, &persisted, "users", &input)
        .expect("normalize");

    assert!(again.table("role_user").is_none());
    // The second pass still re-emits the owner and related records.
    assert!(again.contains_record("users", "1"));
    assert!(again.contains_record("roles", "2"));
}

#[test]
fn an_added_role_synthesizes_only_the_new_pair() {
    let graph = membership_graph();
    let normalizer = Normalizer::new(&graph);
    let mut ctx = NormalizeContext::new();
    let mut persisted = NormalizedTables::new();

    let batch = normalizer
        .normalize(
            &mut ctx,
            &persisted,
            "users",
            &json!({"id": 1, "roles": [{"id": 2}]}),
        )
        .expect("normalize");
    persisted.merge(batch);

    let again = normalizer
        .normalize(
            &mut ctx,
            &persisted,
            "users",
            &json!({"id": 1, "roles": [{"id": 2}, {"id": 3}]}),
        )
        .expect("normalize");

    let pivots = again.table("role_user").expect("pivot table");
    assert_eq!(pivots.len(), 1);
    assert!(again.contains_record("role_user", "[3,1]"));
}

#[test]
fn scalar_references_form_pairs_without_related_records() {
    let graph = membership_graph();
    let normalizer = Normalizer::new(&graph);
    let mut ctx = NormalizeContext::new();
    let persisted = NormalizedTables::new();

    let tables = normalizer
        .normalize(
            &mut ctx,
            &persisted,
            "users",
            &json!({"id": 1, "roles": [2, "3"]}),
        )
        .expect("normalize");

    assert!(tables.contains_record("role_user", "[2,1]"));
    assert!(tables.contains_record("role_user", "[3,1]"));
    assert!(tables.table("roles").is_none());
}

// Pivot entities with their own auto-increment key cannot express the pair
// in the key; dedup then works on the pair fields themselves.
#[test]
fn increment_keyed_pivots_still_deduplicate_pairs() {
    let graph = SchemaGraph::builder()
        .register(
            EntityDef::new("users")
                .attr("id", Value::Null)
                .many_to_many("tags", "tags", "taggings", "user_id", "tag_id"),
        )
        .register(EntityDef::new("tags").attr("id", Value::Null))
        .register(
            EntityDef::new("taggings")
                .increment("id")
                .attr("user_id", Value::Null)
                .attr("tag_id", Value::Null),
        )
        .build()
        .expect("valid graph");
    let normalizer = Normalizer::new(&graph);
    let mut ctx = NormalizeContext::new();
    let mut persisted = NormalizedTables::new();

    let input = json!({"id": 1, "tags": [{"id": 5}, {"id": 6}]});
    let batch = normalizer
        .normalize(&mut ctx, &persisted, "users", &input)
        .expect("normalize");

    let pivots = batch.table("taggings").expect("pivot table");
    assert_eq!(pivots.len(), 2);
    let mut ids: Vec<i64> = pivots
        .values()
        .filter_map(|p| p.get("id").and_then(Value::as_i64))
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, [1, 2]);

    persisted.merge(batch);
    let again = normalizer
        .normalize(&mut ctx, &persisted, "users", &input)
        .expect("normalize");
    assert!(again.table("taggings").is_none());
}

// Keyless records of increment-keyed entities are numbered while the batch
// decomposes, so pair synthesis sees a real id on both sides.
#[test]
fn keyless_owners_with_increment_keys_form_real_pairs() {
    let graph = SchemaGraph::builder()
        .register(
            EntityDef::new("users")
                .increment("id")
                .attr("name", "")
                .many_to_many("roles", "roles", "role_user", "user_id", "role_id"),
        )
        .register(EntityDef::new("roles").increment("id").attr("name", ""))
        .register(
            EntityDef::new("role_user")
                .composite_key(["role_id", "user_id"])
                .attr("role_id", Value::Null)
                .attr("user_id", Value::Null),
        )
        .build()
        .expect("valid graph");
    let normalizer = Normalizer::new(&graph);
    let mut ctx = NormalizeContext::new();
    let persisted = NormalizedTables::new();

    let tables = normalizer
        .normalize(
            &mut ctx,
            &persisted,
            "users",
            &json!({
                "name": "John Doe",
                "roles": [{"name": "view-post"}, {"name": "view-comment"}],
            }),
        )
        .expect("normalize");

    let user = tables.record("users", "1").expect("user 1");
    assert_eq!(user.get("$id"), Some(&json!(1)));
    assert_eq!(user.get("id"), Some(&json!(1)));
    assert_eq!(user.get("name"), Some(&json!("John Doe")));
    assert_eq!(user.get("roles"), Some(&json!([])));

    assert_eq!(
        tables.record("roles", "1").and_then(|r| r.get("name")),
        Some(&json!("view-post"))
    );
    assert_eq!(
        tables.record("roles", "2").and_then(|r| r.get("name")),
        Some(&json!("view-comment"))
    );

    let pivots = tables.table("role_user").expect("pivot table");
    assert_eq!(pivots.len(), 2);
    let first = tables.record("role_user", "[1,1]").expect("pivot [1,1]");
    assert_eq!(first.get("$id"), Some(&json!([1, 1])));
    assert_eq!(first.get("role_id"), Some(&json!(1)));
    assert_eq!(first.get("user_id"), Some(&json!(1)));
    let second = tables.record("role_user", "[2,1]").expect("pivot [2,1]");
    assert_eq!(second.get("role_id"), Some(&json!(2)));
    assert_eq!(second.get("user_id"), Some(&json!(1)));
}
