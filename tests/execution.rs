//! End-to-end execution scenarios.

mod common;

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use trellis::{
    Coordinate, DataFetcherResult, ExecutionStrategy, FieldError, FieldResolverDispatcher,
    FieldResult, GraphQLContext, LazyObjectData, PathSegment, RequiredSelectionSet, ResolvedValue,
    ResolverEnvironment, StaticRegistry, Value, engine_value,
    ast::OperationType,
};

use common::*;

fn string_of(v: &ResolvedValue) -> String {
    match v {
        ResolvedValue::Scalar(s) => s.as_str().expect("string scalar").to_string(),
        other => panic!("expected a string scalar, got {other:?}"),
    }
}

#[tokio::test]
async fn simple_scalar_query() {
    let schema = Arc::new(
        base_schema()
            .with_type(object_meta("Query", vec![("hello", named("String"))]))
            .finish(),
    );
    let registry = Arc::new(StaticRegistry::new().with_field_resolver(
        Coordinate::new("Query", "hello"),
        value_resolver(ResolvedValue::scalar("world")),
    ));
    let strategy = ExecutionStrategy::new(schema, registry);

    let result = strategy
        .execute(request(
            document(OperationType::Query, vec![field("hello")]),
            "{ hello }",
        ))
        .await;

    assert_eq!(result.errors, vec![]);
    assert_eq!(result.data, engine_value!({"hello": "world"}));
    assert_eq!(
        serde_json::to_value(&result).unwrap(),
        serde_json::json!({"data": {"hello": "world"}, "errors": []}),
    );
}

#[tokio::test]
async fn non_null_failure_bubbles_to_the_root() {
    let schema = Arc::new(
        base_schema()
            .with_type(object_meta("Query", vec![("a", non_null("A"))]))
            .with_type(object_meta("A", vec![("b", non_null("Int"))]))
            .finish(),
    );
    let registry = Arc::new(
        StaticRegistry::new()
            .with_field_resolver(
                Coordinate::new("Query", "a"),
                value_resolver(ResolvedValue::object(Vec::<(&str, ResolvedValue)>::new())),
            )
            .with_field_resolver(Coordinate::new("A", "b"), failing_resolver("boom")),
    );
    let strategy = ExecutionStrategy::new(schema, registry);

    let result = strategy
        .execute(request(
            document(
                OperationType::Query,
                vec![object_field("a", vec![field("b")])],
            ),
            "{ a { b } }",
        ))
        .await;

    assert_eq!(result.data, Value::Null);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].message, "boom");
    assert_eq!(
        result.errors[0].path,
        Some(vec![
            PathSegment::Key("a".into()),
            PathSegment::Key("b".into()),
        ]),
    );
}

#[tokio::test]
async fn list_reports_per_item_failures_in_place() {
    let schema = Arc::new(
        base_schema()
            .with_type(object_meta("Query", vec![("xs", list_of(named("Int")))]))
            .finish(),
    );
    let registry = Arc::new(StaticRegistry::new().with_field_resolver(
        Coordinate::new("Query", "xs"),
        value_resolver(ResolvedValue::list(vec![
            ResolvedValue::scalar(0),
            ResolvedValue::scalar(1),
            // An object where an Int belongs: this element fails to
            // resolve while its siblings stay intact.
            ResolvedValue::object(vec![("oops", ResolvedValue::scalar(true))]),
            ResolvedValue::scalar(3),
        ])),
    ));
    let strategy = ExecutionStrategy::new(schema, registry);

    let result = strategy
        .execute(request(
            document(OperationType::Query, vec![field("xs")]),
            "{ xs }",
        ))
        .await;

    assert_eq!(result.data, engine_value!({"xs": [0, 1, null, 3]}));
    assert_eq!(result.errors.len(), 1);
    assert_eq!(
        result.errors[0].path,
        Some(vec![PathSegment::Key("xs".into()), PathSegment::Index(2)]),
    );
}

#[tokio::test]
async fn denied_mutation_field_never_fetches() {
    let schema = Arc::new(
        base_schema()
            .with_type(object_meta("Query", vec![("ping", named("Int"))]))
            .with_type(object_meta("Mutation", vec![("m", named("Int"))]))
            .with_mutation("Mutation")
            .finish(),
    );
    let fetches = Arc::new(AtomicUsize::new(0));
    let seen = fetches.clone();
    let registry = Arc::new(
        StaticRegistry::new()
            .with_field_resolver(
                Coordinate::new("Mutation", "m"),
                resolver(move |_| {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok(ResolvedValue::scalar(1).into())
                }),
            )
            .with_field_checker(Coordinate::new("Mutation", "m"), deny_checker("denied")),
    );
    let strategy = ExecutionStrategy::new(schema, registry);

    let result = strategy
        .execute(request(
            document(OperationType::Mutation, vec![field("m")]),
            "mutation { m }",
        ))
        .await;

    assert_eq!(fetches.load(Ordering::SeqCst), 0, "fetcher must not run");
    assert_eq!(result.data, engine_value!({"m": null}));
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].message, "denied");
    assert_eq!(
        result.errors[0].path,
        Some(vec![PathSegment::Key("m".into())]),
    );
}

#[derive(Debug)]
struct FullNameResolver {
    selections: Arc<RequiredSelectionSet>,
}

#[async_trait]
impl FieldResolverDispatcher for FullNameResolver {
    fn object_selection_set(&self) -> Option<&Arc<RequiredSelectionSet>> {
        Some(&self.selections)
    }

    async fn resolve(&self, env: &ResolverEnvironment) -> FieldResult<DataFetcherResult> {
        // The declared selections are guaranteed resolved by now; both
        // reads settle without running any new fetch.
        let first = env
            .object_value
            .get("firstName")
            .await
            .map_err(FieldError::from)?;
        let last = env
            .object_value
            .get("lastName")
            .await
            .map_err(FieldError::from)?;
        Ok(ResolvedValue::scalar(format!("{} {}", string_of(&first), string_of(&last))).into())
    }
}

#[tokio::test]
async fn resolver_sees_its_required_selections_resolved_first() {
    let schema = Arc::new(
        base_schema()
            .with_type(object_meta("Query", vec![("user", named("User"))]))
            .with_type(object_meta(
                "User",
                vec![
                    ("firstName", named("String")),
                    ("lastName", named("String")),
                    ("fullName", named("String")),
                ],
            ))
            .finish(),
    );
    let registry = Arc::new(
        StaticRegistry::new()
            .with_field_resolver(
                Coordinate::new("Query", "user"),
                value_resolver(ResolvedValue::object(vec![
                    ("firstName", ResolvedValue::scalar("Ada")),
                    ("lastName", ResolvedValue::scalar("Lovelace")),
                ])),
            )
            .with_field_resolver(
                Coordinate::new("User", "fullName"),
                Arc::new(FullNameResolver {
                    selections: Arc::new(RequiredSelectionSet::new(
                        "User",
                        vec![field("firstName"), field("lastName")],
                    )),
                }),
            ),
    );
    let strategy = ExecutionStrategy::new(schema, registry);

    let result = strategy
        .execute(request(
            document(
                OperationType::Query,
                vec![object_field("user", vec![field("fullName")])],
            ),
            "{ user { fullName } }",
        ))
        .await;

    assert_eq!(result.errors, vec![]);
    assert_eq!(
        result.data,
        engine_value!({"user": {"fullName": "Ada Lovelace"}}),
    );
}

#[derive(Debug)]
struct LazyUser;

#[async_trait]
impl LazyObjectData for LazyUser {
    async fn resolve_data(&self, _context: &GraphQLContext) -> FieldResult<ResolvedValue> {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        Ok(ResolvedValue::object(vec![
            ("name", ResolvedValue::scalar("Ada")),
        ]))
    }
}

#[tokio::test]
async fn lazy_object_data_completes_like_eager_data() {
    let schema = || {
        Arc::new(
            base_schema()
                .with_type(object_meta("Query", vec![("user", named("User"))]))
                .with_type(object_meta("User", vec![("name", named("String"))]))
                .finish(),
        )
    };
    let doc = || {
        document(
            OperationType::Query,
            vec![object_field("user", vec![field("name")])],
        )
    };

    let lazy_registry = Arc::new(StaticRegistry::new().with_field_resolver(
        Coordinate::new("Query", "user"),
        value_resolver(ResolvedValue::Lazy(Arc::new(LazyUser))),
    ));
    let eager_registry = Arc::new(StaticRegistry::new().with_field_resolver(
        Coordinate::new("Query", "user"),
        value_resolver(ResolvedValue::object(vec![(
            "name",
            ResolvedValue::scalar("Ada"),
        )])),
    ));

    let lazy = ExecutionStrategy::new(schema(), lazy_registry)
        .execute(request(doc(), "{ user { name } }"))
        .await;
    let eager = ExecutionStrategy::new(schema(), eager_registry)
        .execute(request(doc(), "{ user { name } }"))
        .await;

    assert_eq!(lazy.errors, vec![]);
    assert_eq!(lazy.data, engine_value!({"user": {"name": "Ada"}}));
    assert_eq!(lazy.data, eager.data);
    assert_eq!(lazy.errors, eager.errors);
}
