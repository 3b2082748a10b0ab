use normgraph_engine::{NormalizeContext, NormalizedTables, Normalizer};
use normgraph_schema::{EntityDef, SchemaGraph};
use serde_json::{json, Value};

fn blog_graph() -> SchemaGraph {
    SchemaGraph::builder()
        .register(
            EntityDef::new("users")
                .attr("id", Value::Null)
                .attr("name", "")
                .has_one("profile", "profiles", "user_id")
                .has_many("posts", "posts", "user_id"),
        )
        .register(
            EntityDef::new("profiles")
                .attr("id", Value::Null)
                .attr("user_id", Value::Null),
        )
        .register(
            EntityDef::new("posts")
                .attr("id", Value::Null)
                .attr("user_id", Value::Null)
                .attr("title", "untitled")
                .belongs_to("author", "users", "user_id")
                .morph_many("comments", "comments", "commentable_id", "commentable_type"),
        )
        .register(
            EntityDef::new("comments")
                .attr("id", Value::Null)
                .attr("body", "")
                .attr("commentable_id", Value::Null)
                .attr("commentable_type", Value::Null),
        )
        .build()
        .expect("valid graph")
}

fn normalize(graph: &SchemaGraph, entity: &str, input: Value) -> NormalizedTables {
    let normalizer = Normalizer::new(graph);
    let mut ctx = NormalizeContext::new();
    let persisted = NormalizedTables::new();
    normalizer
        .normalize(&mut ctx, &persisted, entity, &input)
        .expect("normalize")
}

#[test]
fn flat_record_round_trips_with_defaults() {
    let graph = blog_graph();
    let tables = normalize(&graph, "users", json!({"id": 1, "name": "ada"}));

    assert_eq!(tables.len(), 1);
    let user = tables.record("users", "1").expect("user 1");
    assert_eq!(user.get("$id"), Some(&json!(1)));
    assert_eq!(user.get("id"), Some(&json!(1)));
    assert_eq!(user.get("name"), Some(&json!("ada")));
    assert_eq!(user.get("profile"), Some(&json!(null)));
    assert_eq!(user.get("posts"), Some(&json!([])));
}

#[test]
fn numeric_string_keys_coerce_to_numbers() {
    let graph = blog_graph();
    let tables = normalize(&graph, "users", json!({"id": "2"}));

    let user = tables.record("users", "2").expect("keyed by decimal text");
    assert_eq!(user.get("$id"), Some(&json!(2)));
    assert_eq!(user.get("id"), Some(&json!("2")));
}

#[test]
fn nested_to_many_records_flatten_and_attach() {
    let graph = blog_graph();
    let tables = normalize(
        &graph,
        "users",
        json!({"id": 1, "posts": [{"id": 7}, {"id": 8, "title": "b"}]}),
    );

    let user = tables.record("users", "1").expect("user 1");
    assert_eq!(user.get("posts"), Some(&json!([7, 8])));

    let post = tables.record("posts", "7").expect("post 7");
    assert_eq!(post.get("user_id"), Some(&json!(1)));
    assert_eq!(post.get("title"), Some(&json!("untitled")));
    let post = tables.record("posts", "8").expect("post 8");
    assert_eq!(post.get("user_id"), Some(&json!(1)));
    assert_eq!(post.get("title"), Some(&json!("b")));
}

#[test]
fn explicit_foreign_keys_are_never_overwritten() {
    let graph = blog_graph();
    let tables = normalize(
        &graph,
        "users",
        json!({"id": 1, "posts": [{"id": 7, "user_id": 99}]}),
    );

    let post = tables.record("posts", "7").expect("post 7");
    assert_eq!(post.get("user_id"), Some(&json!(99)));
}

#[test]
fn nested_to_one_record_flattens_and_attaches() {
    let graph = blog_graph();
    let tables = normalize(&graph, "users", json!({"id": 1, "profile": {"id": 4}}));

    let user = tables.record("users", "1").expect("user 1");
    assert_eq!(user.get("profile"), Some(&json!(4)));
    let profile = tables.record("profiles", "4").expect("profile 4");
    assert_eq!(profile.get("user_id"), Some(&json!(1)));
}

#[test]
fn nested_parent_sets_the_owners_foreign_key() {
    let graph = blog_graph();
    let tables = normalize(
        &graph,
        "posts",
        json!({"id": 5, "author": {"id": 3, "name": "grace"}}),
    );

    let post = tables.record("posts", "5").expect("post 5");
    assert_eq!(post.get("user_id"), Some(&json!(3)));
    assert_eq!(post.get("author"), Some(&json!(3)));
    let user = tables.record("users", "3").expect("user 3");
    assert_eq!(user.get("name"), Some(&json!("grace")));
}

#[test]
fn polymorphic_children_receive_id_and_type() {
    let graph = blog_graph();
    let tables = normalize(
        &graph,
        "posts",
        json!({"id": 1, "comments": [{"id": 10, "body": "hi"}, {"id": 11}]}),
    );

    let post = tables.record("posts", "1").expect("post 1");
    assert_eq!(post.get("comments"), Some(&json!([10, 11])));

    for key in ["10", "11"] {
        let comment = tables.record("comments", key).expect("comment");
        assert_eq!(comment.get("commentable_id"), Some(&json!(1)));
        assert_eq!(comment.get("commentable_type"), Some(&json!("posts")));
    }
}

#[test]
fn scalar_relation_values_are_kept_as_references() {
    let graph = blog_graph();
    let tables = normalize(
        &graph,
        "users",
        json!({"id": 1, "profile": 4, "posts": [7, "8"]}),
    );

    let user = tables.record("users", "1").expect("user 1");
    assert_eq!(user.get("profile"), Some(&json!(4)));
    assert_eq!(user.get("posts"), Some(&json!([7, 8])));
    // References alone emit no related records.
    assert!(tables.table("profiles").is_none());
    assert!(tables.table("posts").is_none());
}

#[test]
fn keyless_records_receive_synthetic_keys() {
    let graph = blog_graph();
    let normalizer = Normalizer::new(&graph);
    let mut ctx = NormalizeContext::new();
    let persisted = NormalizedTables::new();

    let tables = normalizer
        .normalize(
            &mut ctx,
            &persisted,
            "users",
            &json!([{"name": "a"}, {"name": "b"}]),
        )
        .expect("normalize");

    let first = tables.record("users", "_no_key_1").expect("first");
    assert_eq!(first.get("$id"), Some(&json!("_no_key_1")));
    assert_eq!(first.get("id"), Some(&json!(null)));
    assert!(tables.contains_record("users", "_no_key_2"));

    // A reset context restarts the sequence.
    ctx.reset_synthetic_keys();
    let tables = normalizer
        .normalize(&mut ctx, &persisted, "users", &json!({"name": "c"}))
        .expect("normalize");
    assert!(tables.contains_record("users", "_no_key_1"));
}

#[test]
fn duplicate_keys_in_one_batch_merge_with_later_fields_winning() {
    let graph = blog_graph();
    let tables = normalize(
        &graph,
        "users",
        json!([
            {"id": 1, "name": "first"},
            {"id": 1, "name": "second"},
        ]),
    );

    let table = tables.table("users").expect("users table");
    assert_eq!(table.len(), 1);
    assert_eq!(
        tables.record("users", "1").and_then(|u| u.get("name")),
        Some(&json!("second"))
    );
}

#[test]
fn three_level_nesting_flattens_every_level() {
    let graph = blog_graph();
    let tables = normalize(
        &graph,
        "users",
        json!({
            "id": 1,
            "posts": [{
                "id": 2,
                "comments": [{"id": 3, "body": "deep"}],
            }],
        }),
    );

    assert_eq!(tables.len(), 3);
    let comment = tables.record("comments", "3").expect("comment 3");
    assert_eq!(comment.get("commentable_id"), Some(&json!(2)));
    assert_eq!(comment.get("commentable_type"), Some(&json!("posts")));
    assert_eq!(
        tables.record("posts", "2").and_then(|p| p.get("user_id")),
        Some(&json!(1))
    );
}

// ============================================================================
// Polymorphic owner (type named by the record's own discriminator)
// ============================================================================

fn morph_owner_graph() -> SchemaGraph {
    SchemaGraph::builder()
        .register(
            EntityDef::new("comments")
                .attr("id", Value::Null)
                .attr("commentable_id", Value::Null)
                .attr("commentable_type", Value::Null)
                .morph_to("commentable", "commentable_id", "commentable_type"),
        )
        .register(EntityDef::new("posts").attr("id", Value::Null))
        .register(EntityDef::new("videos").attr("id", Value::Null))
        .build()
        .expect("valid graph")
}

#[test]
fn nested_owner_target_normalizes_into_the_type_named_table() {
    let graph = morph_owner_graph();
    let tables = normalize(
        &graph,
        "comments",
        json!({"id": 1, "commentable_type": "posts", "commentable": {"id": 9}}),
    );

    assert!(tables.contains_record("posts", "9"));
    assert!(tables.table("videos").is_none());
    let comment = tables.record("comments", "1").expect("comment 1");
    assert_eq!(comment.get("commentable_id"), Some(&json!(9)));
    assert_eq!(comment.get("commentable"), Some(&json!(9)));
}

#[test]
fn unresolvable_owner_target_is_dropped() {
    let graph = morph_owner_graph();

    // Unregistered type name.
    let tables = normalize(
        &graph,
        "comments",
        json!({"id": 1, "commentable_type": "articles", "commentable": {"id": 9}}),
    );
    assert_eq!(tables.len(), 1);
    let comment = tables.record("comments", "1").expect("comment 1");
    assert_eq!(comment.get("commentable"), Some(&json!(null)));

    // Missing type field entirely.
    let tables = normalize(&graph, "comments", json!({"id": 2, "commentable": {"id": 9}}));
    assert_eq!(
        tables.record("comments", "2").and_then(|c| c.get("commentable")),
        Some(&json!(null))
    );
}

// ============================================================================
// Composite keys
// ============================================================================

#[test]
fn composite_keys_encode_in_declared_order() {
    let graph = SchemaGraph::builder()
        .register(
            EntityDef::new("memberships")
                .composite_key(["role_id", "user_id"])
                .attr("role_id", Value::Null)
                .attr("user_id", Value::Null),
        )
        .build()
        .expect("valid graph");

    let tables = normalize(&graph, "memberships", json!({"user_id": 1, "role_id": 2}));

    let record = tables.record("memberships", "[2,1]").expect("membership");
    assert_eq!(record.get("$id"), Some(&json!([2, 1])));
}

#[test]
fn composite_owner_key_decomposes_across_foreign_keys() {
    let graph = SchemaGraph::builder()
        .register(
            EntityDef::new("workspaces")
                .composite_key(["region", "id"])
                .attr("region", Value::Null)
                .attr("id", Value::Null)
                .relation(
                    "boards",
                    normgraph_schema::RelationDef::has_many_composite(
                        "boards",
                        ["workspace_region", "workspace_id"],
                    ),
                ),
        )
        .register(
            EntityDef::new("boards")
                .attr("id", Value::Null)
                .attr("workspace_region", Value::Null)
                .attr("workspace_id", Value::Null),
        )
        .build()
        .expect("valid graph");

    let tables = normalize(
        &graph,
        "workspaces",
        json!({"region": "eu", "id": 2, "boards": [{"id": 5}]}),
    );

    let board = tables.record("boards", "5").expect("board 5");
    assert_eq!(board.get("workspace_region"), Some(&json!("eu")));
    assert_eq!(board.get("workspace_id"), Some(&json!(2)));
}
