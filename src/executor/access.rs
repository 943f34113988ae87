//! Running and combining access checks.
//!
//! Field checkers gate individual field positions, type checkers gate
//! concrete object values. Their outcomes combine with a strict policy: a
//! denial always beats a success, and the first denial (field checker
//! before type checker) wins.

use arcstr::ArcStr;

use crate::{
    ast::Variables,
    eventual::Eventual,
    registry::{CheckerEnvironment, CheckerResult, ResolvedValue},
};

use super::{ExecutionParameters, instrumentation::InstrumentationInfo, object_result::EngineData};

/// Runs the field checker registered for the executing field, if any.
///
/// The check is spawned on the request scope, so it proceeds concurrently
/// with whatever the caller does next; gating callers await the returned
/// [`Eventual`] before fetching.
pub fn field_check(
    params: &ExecutionParameters,
    field_name: &str,
    arguments: &Variables,
) -> Option<Eventual<CheckerResult>> {
    let constants = &params.constants;
    let checker = constants
        .registry
        .field_checker_dispatcher(params.parent_oer.object_type(), field_name)?;
    let checker = constants.instrumentation.instrument_access_check(
        checker,
        &InstrumentationInfo {
            coordinate: Some(crate::registry::Coordinate::new(
                params.parent_oer.object_type().clone(),
                field_name,
            )),
            object_type: None,
            attribution: params.attribution.clone(),
        },
    );
    let env = CheckerEnvironment {
        arguments: arguments.clone(),
        object_value: EngineData::checker_proxy(params.parent_oer.clone()),
        query_value: EngineData::checker_proxy(params.constants.query_oer.clone()),
        observed: None,
        context: constants.context.clone(),
        local_context: params.local_context.clone(),
        locale: constants.locale.clone(),
    };
    Some(
        params
            .supervisor()
            .spawn(async move { Ok(checker.execute(&env).await) }),
    )
}

/// Runs the type checker registered for a concrete object type, if any.
///
/// `dependencies` are the per-type checker selections; they settle before
/// the checker executes.
pub fn type_check(
    params: &ExecutionParameters,
    object_type: &ArcStr,
    observed: ResolvedValue,
    arguments: &Variables,
    dependencies: Eventual<()>,
) -> Option<Eventual<CheckerResult>> {
    let constants = &params.constants;
    let checker = constants.registry.type_checker_dispatcher(object_type)?;
    let checker = constants.instrumentation.instrument_access_check(
        checker,
        &InstrumentationInfo {
            coordinate: None,
            object_type: Some(object_type.clone()),
            attribution: params.attribution.clone(),
        },
    );
    let env = CheckerEnvironment {
        arguments: arguments.clone(),
        object_value: EngineData::checker_proxy(params.parent_oer.clone()),
        query_value: EngineData::checker_proxy(params.constants.query_oer.clone()),
        observed: Some(observed),
        context: constants.context.clone(),
        local_context: params.local_context.clone(),
        locale: constants.locale.clone(),
    };
    Some(params.supervisor().spawn(async move {
        let _ = dependencies.resolve().await;
        Ok(checker.execute(&env).await)
    }))
}

/// Merges a field-checker outcome with a type-checker outcome.
///
/// `None` inputs mean no checker is registered on that side. The combined
/// result denies if either denies; the field checker's denial wins when
/// both do.
pub fn combine(
    field: Option<Eventual<CheckerResult>>,
    type_: Option<Eventual<CheckerResult>>,
) -> Eventual<Option<CheckerResult>> {
    match (field, type_) {
        (None, None) => Eventual::ok(None),
        (Some(f), None) => f.map(Some),
        (None, Some(t)) => t.map(Some),
        (Some(f), Some(t)) => Eventual::join_all(vec![f, t]).map(|outcomes| {
            outcomes
                .iter()
                .find(|o| o.is_denied())
                .or(outcomes.first())
                .cloned()
        }),
    }
}
