//! Shared fixtures for the integration tests: hand-built documents,
//! schemas, and closure-backed dispatchers.

#![allow(dead_code)]

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use trellis::{
    CheckerDispatcher, CheckerEnvironment, CheckerResult, DataFetcherResult, ExecutionRequest,
    FieldResolverDispatcher, FieldResult, ResolvedValue, ResolverEnvironment,
    ast::{
        ArgumentsNode, Definition, Directive, Field, InputValue, Operation, OperationType,
        OwnedDocument, Selection, Spanning, Type,
    },
    schema::{
        SchemaBuilder,
        meta::{ObjectMeta, ScalarMeta, UnionMeta},
    },
};

pub fn spanned<T>(item: T) -> Spanning<T> {
    Spanning::unlocated(item)
}

pub fn make_field(
    name: &str,
    selection_set: Option<Vec<Selection>>,
    args: Vec<(&str, InputValue)>,
) -> Field {
    Field {
        alias: None,
        name: spanned(name.into()),
        arguments: if args.is_empty() {
            None
        } else {
            Some(spanned(ArgumentsNode {
                items: args
                    .into_iter()
                    .map(|(k, v)| (spanned(k.into()), spanned(v)))
                    .collect(),
            }))
        },
        directives: None,
        selection_set,
    }
}

/// A leaf field selection.
pub fn field(name: &str) -> Selection {
    Selection::Field(spanned(make_field(name, None, vec![])))
}

/// A composite field selection.
pub fn object_field(name: &str, selections: Vec<Selection>) -> Selection {
    Selection::Field(spanned(make_field(name, Some(selections), vec![])))
}

/// A leaf field selection with arguments.
pub fn field_with_args(name: &str, args: Vec<(&str, InputValue)>) -> Selection {
    Selection::Field(spanned(make_field(name, None, args)))
}

/// An aliased composite field selection with arguments.
pub fn aliased_field(
    alias: &str,
    name: &str,
    args: Vec<(&str, InputValue)>,
    selections: Option<Vec<Selection>>,
) -> Selection {
    let mut f = make_field(name, selections, args);
    f.alias = Some(spanned(alias.into()));
    Selection::Field(spanned(f))
}

/// Attaches a `@skip`/`@include`-style directive to a field selection.
pub fn with_directive(selection: Selection, directive: &str, if_value: InputValue) -> Selection {
    match selection {
        Selection::Field(mut f) => {
            f.item.directives = Some(vec![spanned(Directive {
                name: spanned(directive.into()),
                arguments: Some(spanned(ArgumentsNode {
                    items: vec![(spanned("if".into()), spanned(if_value))],
                })),
            })]);
            Selection::Field(f)
        }
        other => other,
    }
}

/// An inline fragment selection.
pub fn inline_fragment(type_condition: &str, selections: Vec<Selection>) -> Selection {
    Selection::InlineFragment(spanned(trellis::ast::InlineFragment {
        type_condition: Some(spanned(type_condition.into())),
        directives: None,
        selection_set: selections,
    }))
}

/// A single-operation document.
pub fn document(operation_type: OperationType, selections: Vec<Selection>) -> Arc<OwnedDocument> {
    Arc::new(vec![Definition::Operation(spanned(Operation {
        operation_type,
        name: None,
        variables_definition: None,
        directives: None,
        selection_set: selections,
    }))])
}

/// A request with empty variables and a unit context.
pub fn request(document: Arc<OwnedDocument>, text: &str) -> ExecutionRequest {
    ExecutionRequest {
        document,
        document_text: text.into(),
        document_key: None,
        operation_name: None,
        variables: Default::default(),
        context: Arc::new(()),
        locale: None,
    }
}

// Schema shorthand.

pub fn named(name: &str) -> Type {
    Type::Named(name.into())
}

pub fn non_null(name: &str) -> Type {
    Type::NonNullNamed(name.into())
}

pub fn list_of(inner: Type) -> Type {
    Type::List(Box::new(inner))
}

pub fn object_meta(name: &str, fields: Vec<(&str, Type)>) -> ObjectMeta {
    ObjectMeta {
        name: name.into(),
        fields: fields
            .into_iter()
            .map(|(n, t)| trellis::schema::meta::Field::new(n, t))
            .collect(),
        interface_names: vec![],
    }
}

pub fn union_meta(name: &str, members: Vec<&str>) -> UnionMeta {
    UnionMeta {
        name: name.into(),
        of_type_names: members.into_iter().map(Into::into).collect(),
    }
}

/// A builder pre-loaded with the built-in scalars.
pub fn base_schema() -> SchemaBuilder {
    let mut builder = trellis::Schema::build("Query");
    for scalar in ["Int", "Float", "String", "Boolean", "ID"] {
        builder = builder.with_type(ScalarMeta {
            name: scalar.into(),
        });
    }
    builder
}

// Closure-backed dispatchers.

pub struct FnResolver<F>(pub F);

impl<F> fmt::Debug for FnResolver<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnResolver")
    }
}

#[async_trait]
impl<F> FieldResolverDispatcher for FnResolver<F>
where
    F: Fn(&ResolverEnvironment) -> FieldResult<DataFetcherResult> + Send + Sync,
{
    async fn resolve(&self, env: &ResolverEnvironment) -> FieldResult<DataFetcherResult> {
        (self.0)(env)
    }
}

/// A resolver computed synchronously from its environment.
pub fn resolver<F>(f: F) -> Arc<dyn FieldResolverDispatcher>
where
    F: Fn(&ResolverEnvironment) -> FieldResult<DataFetcherResult> + Send + Sync + 'static,
{
    Arc::new(FnResolver(f))
}

/// A resolver always producing the same value.
pub fn value_resolver(value: ResolvedValue) -> Arc<dyn FieldResolverDispatcher> {
    resolver(move |_| Ok(value.clone().into()))
}

/// A resolver that always fails.
pub fn failing_resolver(message: &str) -> Arc<dyn FieldResolverDispatcher> {
    let message = message.to_string();
    resolver(move |_| Err(message.as_str().into()))
}

pub struct FnChecker<F>(pub F);

impl<F> fmt::Debug for FnChecker<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnChecker")
    }
}

#[async_trait]
impl<F> CheckerDispatcher for FnChecker<F>
where
    F: Fn(&CheckerEnvironment) -> CheckerResult + Send + Sync,
{
    async fn execute(&self, env: &CheckerEnvironment) -> CheckerResult {
        (self.0)(env)
    }
}

/// A checker that always denies with `message`.
pub fn deny_checker(message: &str) -> Arc<dyn CheckerDispatcher> {
    let message = message.to_string();
    Arc::new(FnChecker(move |_: &CheckerEnvironment| {
        CheckerResult::Error(message.as_str().into())
    }))
}

/// A checker that always allows.
pub fn allow_checker() -> Arc<dyn CheckerDispatcher> {
    Arc::new(FnChecker(|_: &CheckerEnvironment| CheckerResult::Ok))
}
