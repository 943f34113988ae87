//! Ordering, memoization, and caching guarantees.

mod common;

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use trellis::{
    Coordinate, DataFetcherResult, ExecutionStrategy, FieldError, FieldResolverDispatcher,
    FieldResult, PathSegment, RequiredSelectionSet, ResolvedValue, ResolverEnvironment,
    StaticRegistry, engine_value,
    ast::{InputValue, OperationType, Variables},
};

use common::*;

#[derive(Debug)]
struct DoublingResolver {
    selections: Arc<RequiredSelectionSet>,
}

#[async_trait]
impl FieldResolverDispatcher for DoublingResolver {
    fn object_selection_set(&self) -> Option<&Arc<RequiredSelectionSet>> {
        Some(&self.selections)
    }

    async fn resolve(&self, env: &ResolverEnvironment) -> FieldResult<DataFetcherResult> {
        let expensive = env
            .object_value
            .get("expensive")
            .await
            .map_err(FieldError::from)?;
        match expensive {
            ResolvedValue::Scalar(s) => {
                let n = s.as_int().ok_or("expected an Int")?;
                Ok(ResolvedValue::scalar(n * 2).into())
            }
            other => Err(format!("unexpected dependency value: {other:?}").into()),
        }
    }
}

/// A field position is fetched once, no matter how many selections and
/// dependency plans cover it.
#[tokio::test]
async fn at_most_once_fetch_per_field_position() {
    let schema = Arc::new(
        base_schema()
            .with_type(object_meta(
                "Query",
                vec![("expensive", named("Int")), ("doubled", named("Int"))],
            ))
            .finish(),
    );
    let fetches = Arc::new(AtomicUsize::new(0));
    let seen = fetches.clone();
    let registry = Arc::new(
        StaticRegistry::new()
            .with_field_resolver(
                Coordinate::new("Query", "expensive"),
                resolver(move |_| {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok(ResolvedValue::scalar(21).into())
                }),
            )
            .with_field_resolver(
                Coordinate::new("Query", "doubled"),
                Arc::new(DoublingResolver {
                    selections: Arc::new(RequiredSelectionSet::new(
                        "Query",
                        vec![field("expensive")],
                    )),
                }),
            ),
    );
    let strategy = ExecutionStrategy::new(schema, registry);

    // The user selects `expensive` directly AND `doubled` depends on it.
    let result = strategy
        .execute(request(
            document(
                OperationType::Query,
                vec![field("expensive"), field("doubled")],
            ),
            "{ expensive doubled }",
        ))
        .await;

    assert_eq!(result.errors, vec![]);
    assert_eq!(result.data, engine_value!({"expensive": 21, "doubled": 42}));
    assert_eq!(fetches.load(Ordering::SeqCst), 1);
}

/// In serial mode, field N+1's fetcher starts only after field N's whole
/// subtree has completed.
#[tokio::test]
async fn mutation_top_level_fields_run_serially() {
    let schema = Arc::new(
        base_schema()
            .with_type(object_meta("Query", vec![("ping", named("Int"))]))
            .with_type(object_meta(
                "Mutation",
                vec![("first", named("Int")), ("second", named("Int"))],
            ))
            .with_mutation("Mutation")
            .finish(),
    );
    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    #[derive(Debug)]
    struct SlowResolver {
        label: &'static str,
        delay_ms: u64,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl FieldResolverDispatcher for SlowResolver {
        async fn resolve(&self, _env: &ResolverEnvironment) -> FieldResult<DataFetcherResult> {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
            self.log.lock().unwrap().push(self.label);
            Ok(ResolvedValue::scalar(1).into())
        }
    }

    let registry = Arc::new(
        StaticRegistry::new()
            .with_field_resolver(
                Coordinate::new("Mutation", "first"),
                Arc::new(SlowResolver {
                    label: "first",
                    delay_ms: 50,
                    log: log.clone(),
                }),
            )
            .with_field_resolver(
                Coordinate::new("Mutation", "second"),
                Arc::new(SlowResolver {
                    label: "second",
                    delay_ms: 0,
                    log: log.clone(),
                }),
            ),
    );
    let strategy = ExecutionStrategy::new(schema, registry);

    let result = strategy
        .execute(request(
            document(OperationType::Mutation, vec![field("first"), field("second")]),
            "mutation { first second }",
        ))
        .await;

    assert_eq!(result.errors, vec![]);
    // A parallel dispatch would log "second" first: it has no delay.
    assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
}

/// The same document against the same schema plans once.
#[tokio::test]
async fn plan_cache_is_idempotent_per_key() {
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

    for _ in 0..3 {
        let result = strategy
            .execute(request(
                document(OperationType::Query, vec![field("hello")]),
                "{ hello }",
            ))
            .await;
        assert_eq!(result.errors, vec![]);
    }
    assert_eq!(strategy.cached_plan_count(), 1);

    let other = strategy
        .execute(request(
            document(OperationType::Query, vec![field("hello")]),
            "query Other { hello }",
        ))
        .await;
    assert_eq!(other.errors, vec![]);
    assert_eq!(strategy.cached_plan_count(), 2);

    strategy.invalidate_plan_cache();
    assert_eq!(strategy.cached_plan_count(), 0);
}

/// Outside the serial root, the fetch runs alongside the checker and a
/// denial overrides the fetched value.
#[tokio::test]
async fn query_checker_denial_overrides_the_fetched_value() {
    let schema = Arc::new(
        base_schema()
            .with_type(object_meta("Query", vec![("secret", named("String"))]))
            .finish(),
    );
    let fetches = Arc::new(AtomicUsize::new(0));
    let seen = fetches.clone();
    let registry = Arc::new(
        StaticRegistry::new()
            .with_field_resolver(
                Coordinate::new("Query", "secret"),
                resolver(move |_| {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok(ResolvedValue::scalar("hunter2").into())
                }),
            )
            .with_field_checker(Coordinate::new("Query", "secret"), deny_checker("nope")),
    );
    let strategy = ExecutionStrategy::new(schema, registry);

    let result = strategy
        .execute(request(
            document(OperationType::Query, vec![field("secret")]),
            "{ secret }",
        ))
        .await;

    assert_eq!(fetches.load(Ordering::SeqCst), 1, "the fetch is kept");
    assert_eq!(result.data, engine_value!({"secret": null}));
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].message, "nope");
}

/// `@skip` and `@include` evaluate against the request variables.
#[tokio::test]
async fn conditional_directives_follow_variables() {
    let schema = Arc::new(
        base_schema()
            .with_type(object_meta(
                "Query",
                vec![("a", named("Int")), ("b", named("Int"))],
            ))
            .finish(),
    );
    let registry = Arc::new(
        StaticRegistry::new()
            .with_field_resolver(
                Coordinate::new("Query", "a"),
                value_resolver(ResolvedValue::scalar(1)),
            )
            .with_field_resolver(
                Coordinate::new("Query", "b"),
                value_resolver(ResolvedValue::scalar(2)),
            ),
    );
    let strategy = ExecutionStrategy::new(schema, registry);

    let doc = document(
        OperationType::Query,
        vec![
            with_directive(field("a"), "skip", InputValue::variable("flag")),
            with_directive(field("b"), "include", InputValue::variable("flag")),
        ],
    );
    let mut req = request(doc, "($flag: Boolean!) { a @skip(if: $flag) b @include(if: $flag) }");
    let mut variables = Variables::default();
    variables.insert("flag".into(), InputValue::scalar(true));
    req.variables = variables;

    let result = strategy.execute(req).await;

    assert_eq!(result.errors, vec![]);
    assert_eq!(result.data, engine_value!({"b": 2}));
}

/// Aliased selections with different arguments are distinct field
/// positions and fetch independently.
#[tokio::test]
async fn aliases_with_distinct_arguments_fetch_separately() {
    let schema = Arc::new(
        base_schema()
            .with_type(object_meta("Query", vec![("square", named("Int"))]))
            .finish(),
    );
    let fetches = Arc::new(AtomicUsize::new(0));
    let seen = fetches.clone();
    let registry = Arc::new(StaticRegistry::new().with_field_resolver(
        Coordinate::new("Query", "square"),
        resolver(move |env: &ResolverEnvironment| {
            seen.fetch_add(1, Ordering::SeqCst);
            let n = env
                .arguments
                .get("of")
                .and_then(InputValue::as_scalar)
                .and_then(|s| s.as_int())
                .ok_or("missing argument")?;
            Ok(ResolvedValue::scalar(n * n).into())
        }),
    ));
    let strategy = ExecutionStrategy::new(schema, registry);

    let result = strategy
        .execute(request(
            document(
                OperationType::Query,
                vec![
                    aliased_field("two", "square", vec![("of", InputValue::scalar(2))], None),
                    aliased_field("three", "square", vec![("of", InputValue::scalar(3))], None),
                ],
            ),
            "{ two: square(of: 2) three: square(of: 3) }",
        ))
        .await;

    assert_eq!(result.errors, vec![]);
    assert_eq!(result.data, engine_value!({"two": 4, "three": 9}));
    assert_eq!(fetches.load(Ordering::SeqCst), 2);
}

/// Abstract-typed fields resolve their concrete type from the data and
/// apply inline fragments accordingly.
#[tokio::test]
async fn union_values_resolve_their_concrete_type() {
    let schema = Arc::new(
        base_schema()
            .with_type(object_meta("Query", vec![("pet", named("Pet"))]))
            .with_type(object_meta("Dog", vec![("barks", named("Boolean"))]))
            .with_type(object_meta("Cat", vec![("meows", named("Boolean"))]))
            .with_type(union_meta("Pet", vec!["Dog", "Cat"]))
            .finish(),
    );
    let registry = Arc::new(StaticRegistry::new().with_field_resolver(
        Coordinate::new("Query", "pet"),
        value_resolver(ResolvedValue::object(vec![
            ("__typename", ResolvedValue::scalar("Dog")),
            ("barks", ResolvedValue::scalar(true)),
            ("meows", ResolvedValue::scalar(false)),
        ])),
    ));
    let strategy = ExecutionStrategy::new(schema, registry);

    let result = strategy
        .execute(request(
            document(
                OperationType::Query,
                vec![object_field(
                    "pet",
                    vec![
                        field("__typename"),
                        inline_fragment("Dog", vec![field("barks")]),
                        inline_fragment("Cat", vec![field("meows")]),
                    ],
                )],
            ),
            "{ pet { __typename ... on Dog { barks } ... on Cat { meows } } }",
        ))
        .await;

    assert_eq!(result.errors, vec![]);
    assert_eq!(
        result.data,
        engine_value!({"pet": {"__typename": "Dog", "barks": true}}),
    );
}

/// Partial errors and extensions from a fetcher surface in the result
/// without failing the field.
#[tokio::test]
async fn fetcher_side_channels_reach_the_result() {
    let schema = Arc::new(
        base_schema()
            .with_type(object_meta("Query", vec![("flaky", named("Int"))]))
            .finish(),
    );
    let registry = Arc::new(StaticRegistry::new().with_field_resolver(
        Coordinate::new("Query", "flaky"),
        resolver(|_| {
            Ok(DataFetcherResult {
                data: ResolvedValue::scalar(5),
                errors: vec![trellis::GraphQLError::new("upstream hiccup")],
                local_context: None,
                extensions: Some(
                    [("traceId", trellis::Value::scalar("abc123"))]
                        .into_iter()
                        .collect(),
                ),
            })
        }),
    ));
    let strategy = ExecutionStrategy::new(schema, registry);

    let result = strategy
        .execute(request(
            document(OperationType::Query, vec![field("flaky")]),
            "{ flaky }",
        ))
        .await;

    assert_eq!(result.data, engine_value!({"flaky": 5}));
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].message, "upstream hiccup");
    assert_eq!(
        result.errors[0].path,
        Some(vec![PathSegment::Key("flaky".into())]),
    );
    let extensions = result.extensions.expect("extensions merged");
    assert_eq!(
        extensions.get_field_value("traceId"),
        Some(&trellis::Value::scalar("abc123")),
    );
}
