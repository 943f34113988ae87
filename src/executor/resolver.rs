//! The resolution pipeline: populating result stores field by field.
//!
//! [`fetch_object`] collects the fields of one object and dispatches each
//! of them concurrently; [`fetch_object_serially`] is the mutation-root
//! variant where field N+1 only starts after field N's whole subtree is
//! done. Each field funnels through its cell's at-most-once barrier, so a
//! field position is fetched a single time no matter how many plans select
//! it.

use std::sync::Arc;

use futures::{FutureExt as _, future::BoxFuture};
use tracing::trace;

use crate::{
    ast::{InputValue, Type, Variables},
    error::{EngineError, FieldError, GraphQLError},
    eventual::Eventual,
    plan::{CollectedField, QueryPlan},
    registry::{CheckerResult, DataFetcherResult, LocalContext, ResolvedValue, ResolverEnvironment},
};

use super::{
    ExecutionParameters, FieldPath, access,
    instrumentation::InstrumentationInfo,
    object_result::{
        Cell, CellKey, EngineData, EngineValue, FieldResolutionResult, ResolutionPolicy,
    },
    variables::resolve_variables,
};

/// The two completion horizons of one field dispatch.
pub struct FieldDispatch {
    /// Settles once the data fetcher has produced a result and the checker
    /// outcome has been combined.
    pub immediate: Eventual<()>,
    /// Settles once `immediate` is done and every nested traversal and
    /// lazy resolution beneath the field is done too.
    pub overall: Eventual<()>,
}

/// Fetches every field of the object `params` points at, concurrently.
///
/// The returned [`Eventual`] settles when the whole subtree is done. The
/// store's resolution state is completed as soon as every immediate
/// outcome has settled, which is what completion synchronizes on.
pub fn fetch_object(params: ExecutionParameters) -> Eventual<()> {
    let fields = match collect(&params) {
        Ok(fields) => fields,
        Err(e) => {
            if params.owns_resolution {
                params.parent_oer.complete_resolution(Err(e.clone()));
            }
            return Eventual::err(e);
        }
    };

    let constants = params.constants.clone();
    let fetch_ctx = constants.instrumentation.begin_fetch_object(&InstrumentationInfo {
        coordinate: None,
        object_type: Some(params.parent_oer.object_type().clone()),
        attribution: params.attribution.clone(),
    });
    fetch_ctx.on_dispatched();

    let dispatches: Vec<FieldDispatch> = fields
        .iter()
        .filter(|f| !f.field.is_typename())
        .map(|f| resolve_field(&params, f))
        .collect();

    if params.owns_resolution {
        let immediates = Eventual::join_all(dispatches.iter().map(|d| d.immediate.clone()));
        let oer = params.parent_oer.clone();
        params.supervisor().spawn(async move {
            let _ = immediates.resolve().await;
            oer.complete_resolution(Ok(()));
            Ok(())
        });
    }

    Eventual::join_all(dispatches.into_iter().map(|d| d.overall))
        .then(move |r| {
            fetch_ctx.on_completed(r.as_ref().err());
            Eventual::ready(r)
        })
        .settle()
}

/// Serial variant for the top-level selection set of a mutation: each
/// field's dispatch begins only after the previous field's subtree has
/// fully completed, success or not.
pub fn fetch_object_serially(params: ExecutionParameters) -> Eventual<()> {
    let fields = match collect(&params) {
        Ok(fields) => fields,
        Err(e) => {
            if params.owns_resolution {
                params.parent_oer.complete_resolution(Err(e.clone()));
            }
            return Eventual::err(e);
        }
    };

    let fetch_ctx = params
        .constants
        .instrumentation
        .begin_fetch_object(&InstrumentationInfo {
            coordinate: None,
            object_type: Some(params.parent_oer.object_type().clone()),
            attribution: params.attribution.clone(),
        });
    fetch_ctx.on_dispatched();

    Eventual::from_future(async move {
        for collected in fields.iter().filter(|f| !f.field.is_typename()) {
            let dispatch = resolve_field(&params, collected);
            let _ = dispatch.overall.resolve().await;
        }
        if params.owns_resolution {
            params.parent_oer.complete_resolution(Ok(()));
        }
        fetch_ctx.on_completed(None);
        Ok(())
    })
}

fn collect(params: &ExecutionParameters) -> Result<Arc<Vec<CollectedField>>, EngineError> {
    let constants = &params.constants;
    let type_name = params.parent_oer.object_type().clone();
    let object_type = constants
        .schema
        .object_type_by_name(&type_name)
        .ok_or_else(|| {
            EngineError::internal(format!("unknown concrete object type {type_name:?}"))
        })?;
    let Some(selection_set) = &params.selection_set else {
        return Ok(Arc::new(Vec::new()));
    };
    constants.collect_cache.collect(
        object_type,
        selection_set,
        &params.variables,
        &params.fragments,
    )
}

/// Dispatches one collected field.
///
/// Child plans launch up front, once per field; the cell initializer is
/// the at-most-once fetch barrier, so re-dispatching a position another
/// plan already claimed just observes the existing outcome.
pub fn resolve_field(params: &ExecutionParameters, collected: &CollectedField) -> FieldDispatch {
    let field = &collected.field;
    let constants = &params.constants;
    let field_path = params.path.child_key(field.response_key().clone());

    let exec_ctx = constants
        .instrumentation
        .begin_field_execution(&InstrumentationInfo {
            coordinate: field.metadata.resolver_coordinate.clone(),
            object_type: Some(params.parent_oer.object_type().clone()),
            attribution: params.attribution.clone(),
        });
    exec_ctx.on_dispatched();

    let dependencies = Eventual::join_all(
        collected
            .child_plans
            .iter()
            .filter(|p| p.execution_condition.passes(&params.variables))
            .map(|p| launch_plan(params, p.clone()).settle()),
    )
    .settle();

    let const_args = const_arguments(&field.arguments, &params.variables);
    let key = CellKey::new(field.name.clone(), field.alias.clone(), &const_args);

    let cell = params.parent_oer.compute_if_absent(key, || {
        trace!(field = %field.name, parent = %params.parent_oer.object_type(), "dispatching field");
        let fetch = params.supervisor().spawn(fetch_field(FieldExecution {
            params: params.clone(),
            collected: collected.clone(),
            const_args,
            path: field_path.clone(),
            dependencies,
        }));
        let raw = fetch.clone().map(|(result, _)| result);
        let checker = fetch.map(|(_, checker)| checker);
        Cell {
            raw,
            checker,
            bypass_checks_during_completion: false,
        }
    });

    let immediate =
        Eventual::join_all(vec![cell.raw.clone().settle(), cell.checker.clone().settle()])
            .map(|_| ());
    // The descent below the field belongs to this traversal, not to the
    // memoized cell: another plan claiming the same position descends with
    // its own sub-selections.
    let overall = params
        .supervisor()
        .spawn(overall_work(
            params.clone(),
            collected.clone(),
            field_path,
            cell.raw.clone(),
        ))
        .then(move |r| {
            exec_ctx.on_completed(r.as_ref().err());
            Eventual::ready(r)
        })
        .settle();
    FieldDispatch { immediate, overall }
}

/// Launches a dependency plan on the request scope.
///
/// The plan's own dependencies settle first, then its variables resolve
/// (possibly reading engine data those dependencies produced), then its
/// selections execute against the appropriate store: the query root's for
/// query-typed plans, the current object's otherwise.
pub(crate) fn launch_plan(params: &ExecutionParameters, plan: Arc<QueryPlan>) -> Eventual<()> {
    let params = params.clone();
    params.constants.supervisor.clone().spawn(async move {
        let dependencies = Eventual::join_all(
            plan.child_plans
                .iter()
                .filter(|p| p.execution_condition.passes(&params.variables))
                .map(|p| launch_plan(&params, p.clone()).settle()),
        );
        let _ = dependencies.resolve().await;

        let constants = &params.constants;
        let variables = resolve_variables(constants, &plan, &params.parent_oer).await?;

        let (target_oer, source) = if constants.schema.is_query_type(&plan.parent_type)
            && !constants.schema.is_query_type(params.parent_oer.object_type())
        {
            (constants.query_oer.clone(), ResolvedValue::Null)
        } else {
            (params.parent_oer.clone(), params.source.clone())
        };

        let child_params = ExecutionParameters::for_plan(
            constants.clone(),
            &plan,
            Arc::new(variables),
            target_oer,
            source,
            false,
            false,
        );
        fetch_object(child_params).resolve().await
    })
}

struct FieldExecution {
    params: ExecutionParameters,
    collected: CollectedField,
    const_args: Vec<(arcstr::ArcStr, InputValue)>,
    path: Arc<FieldPath>,
    dependencies: Eventual<()>,
}

/// The direct fetch of one field: dependency wait, checker sequencing,
/// data fetcher invocation, and transformation into a
/// [`FieldResolutionResult`].
async fn fetch_field(
    ctx: FieldExecution,
) -> Result<(FieldResolutionResult, Option<CheckerResult>), EngineError> {
    let FieldExecution {
        params,
        collected,
        const_args,
        path,
        dependencies,
    } = ctx;
    let field = &collected.field;
    let constants = &params.constants;

    // Every dependency plan must have settled, success or failure, before
    // the dispatcher may run.
    let _ = dependencies.resolve().await;

    let arguments: Variables = const_args
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();

    let field_checker = access::field_check(&params, &field.name, &arguments);

    // Top-level mutation and subscription fields only fetch if the checker
    // does not deny; everywhere else the checker runs alongside the fetch.
    if params.is_serial_root() {
        if let Some(checker) = field_checker.clone() {
            match checker.resolve().await? {
                CheckerResult::Ok => {}
                CheckerResult::Error(error) => {
                    return Err(EngineError::AccessCheck {
                        error,
                        path: path.to_segments(),
                        location: Some(field.position),
                    });
                }
            }
        }
    }

    let info = InstrumentationInfo {
        coordinate: field.metadata.resolver_coordinate.clone(),
        object_type: Some(params.parent_oer.object_type().clone()),
        attribution: params.attribution.clone(),
    };
    let fetching_ctx = constants.instrumentation.begin_field_fetching(&info);
    fetching_ctx.on_dispatched();
    let fetched = fetch_data(&params, &collected, &arguments, &path, &info).await;
    fetching_ctx.on_completed(fetched.as_ref().err());
    let mut fetched = fetched?;

    if let Some(extensions) = fetched.extensions.take() {
        constants.extensions.merge(extensions);
    }
    let errors_from_fetch: Vec<GraphQLError> = fetched
        .errors
        .drain(..)
        .map(|e| {
            if e.path.is_none() {
                e.with_path(path.to_segments())
            } else {
                e
            }
        })
        .collect();

    let mut result = resolve_value(
        &params,
        &collected,
        &field.field_type,
        fetched.data,
        fetched.local_context,
        params.resolution_policy,
        path.clone(),
    )?;
    result.errors_from_fetch = errors_from_fetch;

    // Object results get their concrete type's checker combined in; the
    // per-type dependency plan launches now, on first observation of the
    // type.
    let type_checker = result.engine_result().map(|oer| oer.object_type().clone()).and_then(
        |observed_type| {
            let dependencies = collected
                .field_type_child_plans
                .get(&observed_type)
                .map(|plan| launch_plan(&params, plan.clone()).settle())
                .unwrap_or_else(Eventual::unit);
            access::type_check(
                &params,
                &observed_type,
                result.original.clone(),
                &arguments,
                dependencies,
            )
        },
    );
    let combined = access::combine(field_checker, type_checker).resolve().await?;

    Ok((result, combined))
}

/// Invokes the data fetcher for a field: the registered dispatcher if one
/// exists (and the position is not parent-managed), property access on the
/// enclosing object's data otherwise.
async fn fetch_data(
    params: &ExecutionParameters,
    collected: &CollectedField,
    arguments: &Variables,
    path: &Arc<FieldPath>,
    info: &InstrumentationInfo,
) -> Result<DataFetcherResult, EngineError> {
    let field = &collected.field;
    let constants = &params.constants;

    let dispatcher = match params.resolution_policy {
        ResolutionPolicy::ParentManaged => None,
        ResolutionPolicy::Default => constants
            .registry
            .field_resolver_dispatcher(params.parent_oer.object_type(), &field.name),
    };

    match dispatcher {
        Some(dispatcher) => {
            let dispatcher = constants
                .instrumentation
                .instrument_data_fetcher(dispatcher, info);
            let env = ResolverEnvironment {
                arguments: arguments.clone(),
                object_value: EngineData::proxy(params.parent_oer.clone()),
                query_value: EngineData::proxy(constants.query_oer.clone()),
                selections: collected.selection_set.clone(),
                context: constants.context.clone(),
                local_context: params.local_context.clone(),
                locale: constants.locale.clone(),
            };
            dispatcher
                .resolve(&env)
                .await
                .map_err(|error| EngineError::FieldFetching {
                    error,
                    path: path.to_segments(),
                    location: Some(field.position),
                })
        }
        None => Ok(params
            .source
            .property(&field.name)
            .cloned()
            .unwrap_or(ResolvedValue::Null)
            .into()),
    }
}

/// Transforms fetched data into the engine's resolved form by recursing on
/// the field's declared type.
fn resolve_value(
    params: &ExecutionParameters,
    collected: &CollectedField,
    field_type: &Type,
    data: ResolvedValue,
    local_context: LocalContext,
    policy: ResolutionPolicy,
    path: Arc<FieldPath>,
) -> Result<FieldResolutionResult, EngineError> {
    let field = &collected.field;
    let constants = &params.constants;

    // Nullability is enforced during completion; resolution just descends
    // through the wrapper.
    if field_type.is_non_null() {
        return resolve_value(
            params,
            collected,
            &field_type.nullable(),
            data,
            local_context,
            policy,
            path,
        );
    }

    let (data, policy) = match data {
        ResolvedValue::ParentManaged(inner) => (*inner, ResolutionPolicy::ParentManaged),
        data => (data, policy),
    };

    let error_path = path.to_segments();
    let fetch_error = |message: String| EngineError::FieldFetching {
        error: FieldError::from(message),
        path: error_path.clone(),
        location: Some(field.position),
    };

    let original = data.clone();
    let value = match field_type {
        Type::NonNullNamed(_) | Type::NonNullList(_) => unreachable!("stripped above"),
        Type::List(inner) => match data {
            ResolvedValue::Null => EngineValue::Null,
            ResolvedValue::List(items) => {
                let cells = items
                    .into_iter()
                    .enumerate()
                    .map(|(index, item)| {
                        let item_path = path.child_index(index);
                        resolve_list_item(
                            params,
                            collected,
                            inner,
                            item,
                            local_context.clone(),
                            policy,
                            item_path,
                        )
                    })
                    .collect();
                EngineValue::List(cells)
            }
            _ => {
                return Err(fetch_error(format!(
                    "resolver for {} returned a non-list value for a list-typed field",
                    field.name,
                )));
            }
        },
        Type::Named(type_name) => {
            let meta = constants
                .schema
                .concrete_type_by_name(type_name)
                .ok_or_else(|| {
                    EngineError::internal(format!("unknown type {type_name:?} in field type"))
                })?;
            if meta.is_leaf() {
                match data {
                    ResolvedValue::Null => EngineValue::Null,
                    ResolvedValue::Scalar(s) => EngineValue::Scalar(s),
                    _ => {
                        return Err(fetch_error(format!(
                            "resolver for {} returned non-scalar data for a leaf-typed field",
                            field.name,
                        )));
                    }
                }
            } else {
                match &data {
                    ResolvedValue::Null => EngineValue::Null,
                    ResolvedValue::Object(_) | ResolvedValue::Lazy(_) => {
                        let concrete = if meta.is_abstract() {
                            constants.type_resolver.resolve_type(
                                &constants.context,
                                &data,
                                meta,
                                &constants.schema,
                            )?
                        } else {
                            type_name.clone()
                        };
                        EngineValue::Object(super::object_result::ObjectEngineResult::new(
                            concrete,
                        ))
                    }
                    _ => {
                        return Err(fetch_error(format!(
                            "resolver for {} returned non-object data for an object-typed field",
                            field.name,
                        )));
                    }
                }
            }
        }
    };

    Ok(FieldResolutionResult {
        value,
        local_context,
        resolution_policy: policy,
        original,
        errors_from_fetch: Vec::new(),
        extensions: None,
    })
}

/// Wraps one list element in its own cell: the raw slot holds the
/// recursive resolution, the checker slot the element's type check when it
/// resolved to an object.
fn resolve_list_item(
    params: &ExecutionParameters,
    collected: &CollectedField,
    item_type: &Type,
    item: ResolvedValue,
    local_context: LocalContext,
    policy: ResolutionPolicy,
    item_path: Arc<FieldPath>,
) -> Arc<Cell> {
    match resolve_value(
        params,
        collected,
        item_type,
        item,
        local_context,
        policy,
        item_path,
    ) {
        Ok(item_result) => {
            let checker = match item_result.engine_result() {
                Some(oer) => {
                    let observed_type = oer.object_type().clone();
                    let dependencies = collected
                        .field_type_child_plans
                        .get(&observed_type)
                        .map(|plan| launch_plan(params, plan.clone()).settle())
                        .unwrap_or_else(Eventual::unit);
                    access::combine(
                        None,
                        access::type_check(
                            params,
                            &observed_type,
                            item_result.original.clone(),
                            &Variables::default(),
                            dependencies,
                        ),
                    )
                }
                None => Eventual::ok(None),
            };
            Arc::new(Cell {
                raw: Eventual::ok(item_result),
                checker,
                bypass_checks_during_completion: false,
            })
        }
        Err(e) => Arc::new(Cell {
            raw: Eventual::err(e),
            checker: Eventual::ok(None),
            bypass_checks_during_completion: false,
        }),
    }
}

/// Drives everything beneath a field after its immediate result is in:
/// nested object traversals and lazy resolutions.
async fn overall_work(
    params: ExecutionParameters,
    collected: CollectedField,
    path: Arc<FieldPath>,
    raw: Eventual<FieldResolutionResult>,
) -> Result<(), EngineError> {
    match raw.resolve().await {
        Err(_) => Ok(()),
        Ok(result) => descend_value(&params, &collected, result, path).await,
    }
}

fn descend_value<'a>(
    params: &'a ExecutionParameters,
    collected: &'a CollectedField,
    result: FieldResolutionResult,
    path: Arc<FieldPath>,
) -> BoxFuture<'a, Result<(), EngineError>> {
    async move {
        match result.value {
            EngineValue::Null | EngineValue::Scalar(_) => Ok(()),
            EngineValue::Object(oer) => match result.original {
                ResolvedValue::Lazy(lazy) => {
                    // Lazy data materializes once per store, on the request
                    // scope; every traversal that reaches the store shares
                    // the outcome.
                    let source = oer.lazy_source_or_init(|| {
                        let context = params.constants.context.clone();
                        let lazy_path = path.clone();
                        params.supervisor().spawn(async move {
                            lazy.resolve_data(&context).await.map_err(|error| {
                                EngineError::FieldFetching {
                                    error,
                                    path: lazy_path.to_segments(),
                                    location: None,
                                }
                            })
                        })
                    });
                    match source.resolve().await {
                        Ok(data) => {
                            let child = params.descend(
                                oer,
                                collected.selection_set.clone(),
                                data,
                                result.local_context.clone(),
                                result.resolution_policy,
                                path,
                            );
                            let _ = fetch_object(child).resolve().await;
                            Ok(())
                        }
                        Err(e) => {
                            if params.owns_resolution {
                                oer.complete_resolution(Err(e));
                            }
                            Ok(())
                        }
                    }
                }
                original => {
                    let child = params.descend(
                        oer,
                        collected.selection_set.clone(),
                        original,
                        result.local_context.clone(),
                        result.resolution_policy,
                        path,
                    );
                    let _ = fetch_object(child).resolve().await;
                    Ok(())
                }
            },
            EngineValue::List(cells) => {
                let descents = cells.into_iter().enumerate().filter_map(|(index, cell)| {
                    cell.raw.peek().and_then(Result::ok).map(|item_result| {
                        descend_value(params, collected, item_result, path.child_index(index))
                    })
                });
                let _ = futures::future::join_all(descents).await;
                Ok(())
            }
        }
    }
    .boxed()
}

/// Folds a field's raw arguments to constants using the executing plan's
/// variables. An unbound variable reads as an explicit null.
pub(crate) fn const_arguments(
    arguments: &[(arcstr::ArcStr, InputValue)],
    variables: &Variables,
) -> Vec<(arcstr::ArcStr, InputValue)> {
    arguments
        .iter()
        .map(|(name, value)| {
            (
                name.clone(),
                value
                    .clone()
                    .into_const(variables)
                    .unwrap_or(InputValue::Null),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::{
        ast::{InputValue, Variables},
        value::ScalarValue,
    };

    use super::const_arguments;

    #[test]
    fn const_arguments_fold_variables() {
        let mut variables = Variables::default();
        variables.insert("id".into(), InputValue::scalar(7));
        let folded = const_arguments(
            &[
                ("id".into(), InputValue::variable("id")),
                ("missing".into(), InputValue::variable("nope")),
            ],
            &variables,
        );
        assert_eq!(folded[0].1, InputValue::scalar(7));
        assert_eq!(folded[1].1, InputValue::Null);
    }

    #[test]
    fn scalar_coercion_is_preserved() {
        let folded = const_arguments(
            &[("flag".into(), InputValue::Scalar(ScalarValue::Boolean(true)))],
            &Variables::default(),
        );
        assert_eq!(folded[0].1, InputValue::scalar(true));
    }
}
