//! The completion pipeline: turning populated result stores into the
//! response tree.
//!
//! Completion never polls. It suspends on each store's resolution state,
//! then on each cell's raw slot, so it always observes settled outcomes.
//! Errors recorded here follow the GraphQL rules: a failing field becomes
//! `null` with an error entry carrying its path and location, and a `null`
//! in non-null position bubbles to the nearest nullable ancestor.

use std::sync::Arc;

use futures::{FutureExt as _, future::BoxFuture};

use crate::{
    ast::Type,
    error::EngineError,
    plan::CollectedField,
    registry::CheckerResult,
    value::{Object, Value},
};

use super::{
    ExecutionParameters, FieldPath,
    instrumentation::InstrumentationInfo,
    object_result::{Cell, CellKey, EngineValue},
    resolver::const_arguments,
};

/// Why a (sub)tree could not produce a value.
#[derive(Debug)]
pub enum CompletionError {
    /// A `null` hit a non-null position; the nearest nullable ancestor
    /// absorbs it. The underlying error, if any, is already recorded.
    NonNull,
    /// The operation cannot produce a result at all.
    Fatal(EngineError),
}

/// Completes the object `params` points at into a response value.
///
/// Returns [`Value::Null`] (with the error recorded) when the store
/// resolved exceptionally, and bubbles [`CompletionError::NonNull`] out of
/// any non-null field that came up `null`.
pub fn complete_object<'a>(
    params: &'a ExecutionParameters,
) -> BoxFuture<'a, Result<Value, CompletionError>> {
    async move {
        let constants = &params.constants;
        let complete_ctx = constants
            .instrumentation
            .begin_complete_object(&InstrumentationInfo {
                coordinate: None,
                object_type: Some(params.parent_oer.object_type().clone()),
                attribution: params.attribution.clone(),
            });
        complete_ctx.on_dispatched();

        let result = complete_object_inner(params).await;
        complete_ctx.on_completed(match &result {
            Err(CompletionError::Fatal(e)) => Some(e),
            _ => None,
        });
        result
    }
    .boxed()
}

async fn complete_object_inner(
    params: &ExecutionParameters,
) -> Result<Value, CompletionError> {
    let constants = &params.constants;

    // Synchronize with resolution; pending stores (lazy data) are never
    // consumed before this settles.
    if let Err(e) = params.parent_oer.resolution_state().resolve().await {
        constants
            .errors
            .push_engine_error(&e, &params.path.to_segments(), None);
        return Ok(Value::Null);
    }

    let object_type = constants
        .schema
        .object_type_by_name(params.parent_oer.object_type())
        .ok_or_else(|| {
            CompletionError::Fatal(EngineError::internal(format!(
                "unknown concrete object type {:?}",
                params.parent_oer.object_type().as_str(),
            )))
        })?;
    let Some(selection_set) = &params.selection_set else {
        return Ok(Value::Object(Object::with_capacity(0)));
    };
    let fields = constants
        .collect_cache
        .collect(
            object_type,
            selection_set,
            &params.variables,
            &params.fragments,
        )
        .map_err(CompletionError::Fatal)?;

    let mut object = Object::with_capacity(fields.len());
    for collected in fields.iter() {
        let field_path = params.path.child_key(collected.response_key.clone());

        if collected.field.is_typename() {
            object.add_field(
                collected.response_key.to_string(),
                Value::scalar(params.parent_oer.object_type().clone()),
            );
            continue;
        }

        let field_ctx = constants
            .instrumentation
            .begin_field_completion(&InstrumentationInfo {
                coordinate: collected.field.metadata.resolver_coordinate.clone(),
                object_type: Some(params.parent_oer.object_type().clone()),
                attribution: params.attribution.clone(),
            });
        field_ctx.on_dispatched();

        let key = CellKey::new(
            collected.field.name.clone(),
            collected.field.alias.clone(),
            &const_arguments(&collected.field.arguments, &params.variables),
        );
        let cell = params.parent_oer.cell(&key).ok_or_else(|| {
            CompletionError::Fatal(EngineError::internal(format!(
                "no resolution cell for field {:?} on {}",
                collected.field.name.as_str(),
                params.parent_oer.object_type(),
            )))
        })?;

        let completed = complete_field(params, collected, &cell, field_path).await;
        field_ctx.on_completed(match &completed {
            Err(CompletionError::Fatal(e)) => Some(e),
            _ => None,
        });
        object.add_field(collected.response_key.to_string(), completed?);
    }

    Ok(Value::Object(object))
}

/// Completes one field position: awaits its raw slot, honors the checker
/// outcome, then walks the value per the declared type.
async fn complete_field(
    params: &ExecutionParameters,
    collected: &CollectedField,
    cell: &Arc<Cell>,
    field_path: Arc<FieldPath>,
) -> Result<Value, CompletionError> {
    let constants = &params.constants;
    let field = &collected.field;
    let non_null = field.field_type.is_non_null();

    let result = match cell.raw.clone().resolve().await {
        Err(e) => {
            constants
                .errors
                .push_engine_error(&e, &field_path.to_segments(), Some(field.position));
            return if non_null {
                Err(CompletionError::NonNull)
            } else {
                Ok(Value::Null)
            };
        }
        Ok(result) => result,
    };

    for error in &result.errors_from_fetch {
        constants.errors.push(error.clone());
    }

    if !cell.bypass_checks_during_completion {
        let denial = match cell.checker.clone().resolve().await {
            Ok(Some(CheckerResult::Error(error))) => Some(EngineError::AccessCheck {
                error,
                path: field_path.to_segments(),
                location: Some(field.position),
            }),
            Ok(_) => None,
            Err(e) => Some(e),
        };
        if let Some(denial) = denial {
            constants
                .errors
                .push_engine_error(&denial, &field_path.to_segments(), Some(field.position));
            return if non_null {
                Err(CompletionError::NonNull)
            } else {
                Ok(Value::Null)
            };
        }
    }

    complete_value(
        params,
        collected,
        &field.field_type,
        result.value,
        field_path,
    )
    .await
}

/// Completes a resolved value against its declared type, recursing through
/// list elements and nested objects.
fn complete_value<'a>(
    params: &'a ExecutionParameters,
    collected: &'a CollectedField,
    field_type: &'a Type,
    value: EngineValue,
    path: Arc<FieldPath>,
) -> BoxFuture<'a, Result<Value, CompletionError>> {
    async move {
        let constants = &params.constants;
        let field = &collected.field;
        let non_null = field_type.is_non_null();
        let nullable = field_type.nullable();

        match value {
            EngineValue::Null => {
                if non_null {
                    constants.errors.push(
                        crate::error::GraphQLError::new(format!(
                            "Cannot return null for non-nullable field {}.{}.",
                            params.parent_oer.object_type(),
                            field.name,
                        ))
                        .with_path(path.to_segments())
                        .at(field.position),
                    );
                    Err(CompletionError::NonNull)
                } else {
                    Ok(Value::Null)
                }
            }
            EngineValue::Scalar(s) => Ok(Value::Scalar(s)),
            EngineValue::List(cells) => {
                let Some(inner_type) = nullable.list_inner() else {
                    return Err(CompletionError::Fatal(EngineError::internal(format!(
                        "list value resolved for non-list field {}",
                        field.name,
                    ))));
                };
                let list_ctx = constants.instrumentation.begin_field_list_completion(
                    &InstrumentationInfo {
                        coordinate: field.metadata.resolver_coordinate.clone(),
                        object_type: Some(params.parent_oer.object_type().clone()),
                        attribution: params.attribution.clone(),
                    },
                );
                list_ctx.on_dispatched();
                let completed =
                    complete_list(params, collected, inner_type, cells, &path, non_null).await;
                list_ctx.on_completed(match &completed {
                    Err(CompletionError::Fatal(e)) => Some(e),
                    _ => None,
                });
                completed
            }
            EngineValue::Object(oer) => {
                let child = params.descend(
                    oer,
                    collected.selection_set.clone(),
                    crate::registry::ResolvedValue::Null,
                    None,
                    super::object_result::ResolutionPolicy::Default,
                    path,
                );
                match complete_object(&child).await {
                    // A bare null only comes out of an exceptionally
                    // resolved store; the error is already recorded.
                    Ok(Value::Null) if non_null => Err(CompletionError::NonNull),
                    Ok(v) => Ok(v),
                    Err(CompletionError::NonNull) if non_null => Err(CompletionError::NonNull),
                    Err(CompletionError::NonNull) => Ok(Value::Null),
                    Err(fatal) => Err(fatal),
                }
            }
        }
    }
    .boxed()
}

/// Completes list elements one by one, reporting failures element-wise and
/// preserving the list unless a non-null element forces nullification.
async fn complete_list(
    params: &ExecutionParameters,
    collected: &CollectedField,
    inner_type: &Type,
    cells: Vec<Arc<Cell>>,
    path: &Arc<FieldPath>,
    list_non_null: bool,
) -> Result<Value, CompletionError> {
    let constants = &params.constants;
    let field = &collected.field;
    let inner_non_null = inner_type.is_non_null();

    let nullify = |e| {
        if list_non_null {
            Err(e)
        } else {
            Ok(Value::Null)
        }
    };

    let mut items = Vec::with_capacity(cells.len());
    for (index, cell) in cells.iter().enumerate() {
        let item_path = path.child_index(index);

        let item_result = match cell.raw.clone().resolve().await {
            Err(e) => {
                constants
                    .errors
                    .push_engine_error(&e, &item_path.to_segments(), Some(field.position));
                if inner_non_null {
                    return nullify(CompletionError::NonNull);
                }
                items.push(Value::Null);
                continue;
            }
            Ok(result) => result,
        };

        if !cell.bypass_checks_during_completion {
            if let Ok(Some(CheckerResult::Error(error))) = cell.checker.clone().resolve().await {
                let denial = EngineError::AccessCheck {
                    error,
                    path: item_path.to_segments(),
                    location: Some(field.position),
                };
                constants
                    .errors
                    .push_engine_error(&denial, &item_path.to_segments(), Some(field.position));
                if inner_non_null {
                    return nullify(CompletionError::NonNull);
                }
                items.push(Value::Null);
                continue;
            }
        }

        match complete_value(params, collected, inner_type, item_result.value, item_path).await {
            Ok(v) => items.push(v),
            Err(CompletionError::NonNull) => return nullify(CompletionError::NonNull),
            Err(fatal) => return Err(fatal),
        }
    }
    Ok(Value::List(items))
}
