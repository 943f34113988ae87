//! Variable resolution for plans and their dependencies.
//!
//! The request supplies the operation's variables directly; dependency
//! plans derive theirs by folding their declared variable resolvers
//! left-to-right, each possibly reading engine data its own required
//! selections produced.

use std::sync::Arc;

use crate::{
    ast::Variables,
    error::EngineError,
    plan::QueryPlan,
    registry::VariableResolverEnvironment,
};

use super::{Constants, object_result::{EngineData, ObjectEngineResult}};

/// Folds the request-supplied variables with the operation's declared
/// defaults.
///
/// A variable missing from the request picks up its default value; an
/// explicitly supplied value always wins.
pub fn coerce_request_variables(plan: &QueryPlan, supplied: Variables) -> Variables {
    let mut variables = supplied;
    for (name, definition) in &plan.variable_definitions {
        if let Some(default) = &definition.default_value {
            variables
                .entry(name.to_string())
                .or_insert_with(|| default.item.clone());
        }
    }
    variables
}

/// Resolves the variables of a dependency plan.
///
/// Resolvers run left-to-right; each sees the values accumulated so far.
/// A resolver with its own required selections reads them through a proxy
/// over the engine data those selections were resolved against: the query
/// root store for query-typed selections, the current object's store
/// otherwise. Any resolver failure is fatal for the enclosing plan.
pub async fn resolve_variables(
    constants: &Arc<Constants>,
    plan: &QueryPlan,
    current_oer: &Arc<ObjectEngineResult>,
) -> Result<Variables, EngineError> {
    let mut variables = Variables::default();
    for resolver in &plan.variables_resolvers {
        let data = resolver.required_selection_set().map(|required| {
            let oer = if constants.schema.is_query_type(&required.type_name) {
                &constants.query_oer
            } else {
                current_oer
            };
            if resolver.for_checker() {
                EngineData::checker_proxy(oer.clone())
            } else {
                EngineData::proxy(oer.clone())
            }
        });
        let env = VariableResolverEnvironment {
            variables: variables.clone(),
            data,
            context: constants.context.clone(),
            locale: constants.locale.clone(),
        };
        let value =
            resolver
                .resolve(&env)
                .await
                .map_err(|e| EngineError::VariableResolution {
                    variable: resolver.variable().to_string(),
                    message: e.message().to_string(),
                })?;
        variables.insert(resolver.variable().to_string(), value);
    }
    Ok(variables)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::{
        ast::{InputValue, OperationType, Spanning, Type, VariableDefinition, Variables},
        plan::{ExecutionCondition, QueryPlan, SelectionSet},
    };

    use super::coerce_request_variables;

    fn plan_with_default(name: &str, default: InputValue) -> QueryPlan {
        QueryPlan {
            operation_type: OperationType::Query,
            parent_type: "Query".into(),
            selection_set: Arc::new(SelectionSet { items: Vec::new() }),
            fragments: Default::default(),
            variable_definitions: vec![(
                name.into(),
                VariableDefinition {
                    var_type: Spanning::unlocated(Type::Named("Int".into())),
                    default_value: Some(Spanning::unlocated(default)),
                },
            )],
            variables_resolvers: Vec::new(),
            child_plans: Vec::new(),
            execution_condition: ExecutionCondition::Always,
            attribution: None,
        }
    }

    #[test]
    fn defaults_fill_missing_variables() {
        let plan = plan_with_default("limit", InputValue::scalar(10));
        let coerced = coerce_request_variables(&plan, Variables::default());
        assert_eq!(coerced.get("limit"), Some(&InputValue::scalar(10)));
    }

    #[test]
    fn supplied_values_beat_defaults() {
        let plan = plan_with_default("limit", InputValue::scalar(10));
        let mut supplied = Variables::default();
        supplied.insert("limit".into(), InputValue::scalar(3));
        let coerced = coerce_request_variables(&plan, supplied);
        assert_eq!(coerced.get("limit"), Some(&InputValue::scalar(3)));
    }
}
