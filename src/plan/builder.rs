//! Turns a validated operation into a [`QueryPlan`].
//!
//! Recursive descent over the operation AST. Each field selection gets its
//! applicability constraints composed from its ancestors, its dependency
//! plans discovered through the dispatcher registry (resolver and checker
//! required selections, variable-resolver required selections, per-type
//! checker selections), and its sub-selections planned recursively.
//! Fragments expand once and are shared; required-selection-set cycles are
//! broken by identity.

use std::sync::Arc;

use arcstr::ArcStr;
use fnv::{FnvHashMap, FnvHashSet};
use itertools::Itertools as _;
use tracing::debug;

use crate::{
    ast::{
        self, Definition, Document, Operation, OperationType, Spanning, Type, VariableDefinition,
    },
    registry::{Coordinate, DispatcherRegistry, RequiredSelectionSet},
    schema::Schema,
};

use super::{
    Constraints, Disposition, ExecutionCondition, FieldMetadata, PlanError, PlanField,
    PlanFragment, PlanFragmentSpread, PlanInlineFragment, PlanSelection, QueryPlan, SelectionSet,
};

/// Switches consulted while building a plan.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlanOptions {
    /// Plan checker required selections even for fields whose resolver
    /// declares none.
    pub execute_access_checks_in_engine: bool,
}

/// Finds the requested operation in a document.
pub fn get_operation<'d>(
    document: &'d Document,
    operation_name: Option<&str>,
) -> Result<&'d Spanning<Operation>, PlanError> {
    let mut operation = None;
    for def in document {
        if let Definition::Operation(op) = def {
            if operation_name.is_none() && operation.is_some() {
                return Err(PlanError::MultipleOperations);
            }
            let matches = operation_name.is_none()
                || op.item.name.as_ref().map(|s| s.item.as_str()) == operation_name;
            if matches {
                operation = Some(op);
            }
        }
    }
    operation.ok_or(PlanError::UnknownOperation)
}

/// Builds the plan of the named operation in `document`.
pub fn build_operation_plan(
    document: &Document,
    operation_name: Option<&str>,
    schema: &Schema,
    registry: &dyn DispatcherRegistry,
    options: PlanOptions,
) -> Result<Arc<QueryPlan>, PlanError> {
    let operation = get_operation(document, operation_name)?;

    let parent_type = match operation.item.operation_type {
        OperationType::Query => Some(schema.query_type_name()),
        OperationType::Mutation => schema.mutation_type_name(),
        OperationType::Subscription => schema.subscription_type_name(),
    }
    .ok_or(PlanError::UnsupportedOperation(
        operation.item.operation_type,
    ))?
    .clone();

    let mut builder = Builder {
        schema,
        registry,
        options,
        fragment_asts: document
            .iter()
            .filter_map(|def| match def {
                Definition::Fragment(f) => Some((f.item.name.item.clone(), &f.item)),
                Definition::Operation(_) => None,
            })
            .collect(),
        built_fragments: FnvHashMap::default(),
        building_fragments: Vec::new(),
        seen_dependencies: FnvHashSet::default(),
    };

    let selection_set = builder.build_selection_set(
        &operation.item.selection_set,
        &parent_type,
        &Constraints::none(),
    )?;

    let variable_definitions = operation
        .item
        .variables_definition
        .as_ref()
        .map(|defs| {
            defs.item
                .iter()
                .map(|(name, def)| (name.item.clone(), def.clone()))
                .collect::<Vec<(ArcStr, VariableDefinition)>>()
        })
        .unwrap_or_default();

    let attribution = operation.item.name.as_ref().map(|n| n.item.clone());
    debug!(
        operation = %operation.item.operation_type,
        parent_type = %parent_type,
        "built query plan",
    );

    Ok(Arc::new(QueryPlan {
        operation_type: operation.item.operation_type,
        parent_type,
        selection_set,
        fragments: builder.built_fragments,
        variable_definitions,
        variables_resolvers: Vec::new(),
        child_plans: Vec::new(),
        execution_condition: ExecutionCondition::Always,
        attribution,
    }))
}

struct Builder<'a> {
    schema: &'a Schema,
    registry: &'a dyn DispatcherRegistry,
    options: PlanOptions,
    fragment_asts: FnvHashMap<ArcStr, &'a ast::Fragment>,
    built_fragments: FnvHashMap<ArcStr, Arc<PlanFragment>>,
    building_fragments: Vec<ArcStr>,
    /// Required-selection-set identities expanded on the current build path.
    seen_dependencies: FnvHashSet<usize>,
}

impl<'a> Builder<'a> {
    fn build_selection_set(
        &mut self,
        selections: &[ast::Selection],
        parent_type: &ArcStr,
        parent_constraints: &Constraints,
    ) -> Result<Arc<SelectionSet>, PlanError> {
        let mut items = Vec::with_capacity(selections.len());
        for selection in selections {
            match selection {
                ast::Selection::Field(field) => {
                    if let Some(planned) =
                        self.build_field(field, parent_type, parent_constraints)?
                    {
                        items.push(PlanSelection::Field(Arc::new(planned)));
                    }
                }
                ast::Selection::InlineFragment(frag) => {
                    let condition = frag
                        .item
                        .type_condition
                        .as_ref()
                        .map(|c| c.item.clone())
                        .unwrap_or_else(|| parent_type.clone());
                    self.check_type_exists(&condition)?;
                    let constraints = parent_constraints
                        .with_directives(frag.item.directives.as_deref())?
                        .narrow_types(self.schema.possible_type_names(&condition));
                    if constraints.solve_static() == Some(Disposition::Drop) {
                        continue;
                    }
                    let selection_set = self.build_selection_set(
                        &frag.item.selection_set,
                        &condition,
                        &constraints,
                    )?;
                    items.push(PlanSelection::InlineFragment(PlanInlineFragment {
                        selection_set,
                        constraints,
                    }));
                }
                ast::Selection::FragmentSpread(spread) => {
                    let name = spread.item.name.item.clone();
                    let fragment = self.build_fragment(&name)?;
                    let constraints = parent_constraints
                        .with_directives(spread.item.directives.as_deref())?
                        .narrow_types(
                            self.schema.possible_type_names(&fragment.type_condition),
                        );
                    if constraints.solve_static() == Some(Disposition::Drop) {
                        continue;
                    }
                    items.push(PlanSelection::FragmentSpread(PlanFragmentSpread {
                        name,
                        constraints,
                    }));
                }
            }
        }
        Ok(Arc::new(SelectionSet { items }))
    }

    fn build_field(
        &mut self,
        field: &Spanning<ast::Field>,
        parent_type: &ArcStr,
        parent_constraints: &Constraints,
    ) -> Result<Option<PlanField>, PlanError> {
        let ast_field = &field.item;
        let name = ast_field.name.item.clone();
        let constraints = parent_constraints
            .with_directives(ast_field.directives.as_deref())?
            .narrow_types(self.schema.possible_type_names(parent_type));
        if constraints.solve_static() == Some(Disposition::Drop) {
            return Ok(None);
        }

        let arguments: Vec<(ArcStr, ast::InputValue)> = ast_field
            .arguments
            .as_ref()
            .map(|args| {
                args.item
                    .iter()
                    .map(|(k, v)| (k.item.clone(), v.item.clone()))
                    .collect()
            })
            .unwrap_or_default();

        if name == "__typename" {
            return Ok(Some(PlanField {
                name,
                alias: ast_field.alias.as_ref().map(|a| a.item.clone()),
                constraints,
                arguments,
                field_type: Type::NonNullNamed("String".into()),
                selection_set: None,
                child_plans: Vec::new(),
                field_type_child_plans: FnvHashMap::default(),
                metadata: FieldMetadata::default(),
                position: *field.start(),
            }));
        }

        let parent_meta = self.schema.concrete_type_by_name(parent_type).ok_or_else(|| {
            PlanError::UnknownType {
                name: parent_type.to_string(),
            }
        })?;
        let field_def =
            parent_meta
                .field_by_name(&name)
                .cloned()
                .ok_or_else(|| PlanError::UnknownField {
                    type_name: parent_type.to_string(),
                    field_name: name.to_string(),
                })?;

        // Dependencies come from every concrete type the parent can be at
        // runtime: the resolver and checker registered for each possible
        // coordinate contribute their required selections.
        let possible_parents = self.schema.possible_type_names(parent_type);
        let mut dependencies: Vec<Arc<RequiredSelectionSet>> = Vec::new();
        let mut resolver_coordinate = None;
        for concrete in &possible_parents {
            dependencies.extend(
                self.registry
                    .field_resolver_required_selection_sets(concrete, &name),
            );
            dependencies.extend(self.registry.field_checker_required_selection_sets(
                concrete,
                &name,
                self.options.execute_access_checks_in_engine,
            ));
            if resolver_coordinate.is_none()
                && self
                    .registry
                    .field_resolver_dispatcher(concrete, &name)
                    .is_some()
            {
                resolver_coordinate = Some(Coordinate::new(concrete.clone(), name.clone()));
            }
        }
        let mut child_plans = Vec::new();
        for required in dependencies
            .into_iter()
            .unique_by(RequiredSelectionSet::identity)
        {
            if let Some(plan) = self.build_dependency_plan(&required, &name)? {
                child_plans.push(plan);
            }
        }

        // Per-concrete-result-type checker dependencies, launched only when
        // a value of that type is observed.
        let mut field_type_child_plans = FnvHashMap::default();
        let result_type_name: ArcStr = field_def.field_type.innermost_name().into();
        if self
            .schema
            .concrete_type_by_name(&result_type_name)
            .is_some_and(|t| t.is_composite())
        {
            for concrete in self.schema.possible_type_names(&result_type_name) {
                let sets = self.registry.type_checker_required_selection_sets(
                    &concrete,
                    self.options.execute_access_checks_in_engine,
                );
                let mut plans = Vec::new();
                for required in sets.into_iter().unique_by(RequiredSelectionSet::identity) {
                    if let Some(plan) = self.build_dependency_plan(&required, &concrete)? {
                        plans.push(plan);
                    }
                }
                if let Some(plan) = self.merge_plans(plans, &concrete) {
                    field_type_child_plans.insert(concrete, plan);
                }
            }
        }

        let selection_set = match &ast_field.selection_set {
            Some(selections)
                if self
                    .schema
                    .concrete_type_by_name(&result_type_name)
                    .is_some_and(|t| t.is_composite()) =>
            {
                Some(self.build_selection_set(selections, &result_type_name, &constraints)?)
            }
            Some(_) | None => None,
        };

        Ok(Some(PlanField {
            name,
            alias: ast_field.alias.as_ref().map(|a| a.item.clone()),
            constraints,
            arguments,
            field_type: field_def.field_type,
            selection_set,
            child_plans,
            field_type_child_plans,
            metadata: FieldMetadata {
                resolver_coordinate,
            },
            position: *field.start(),
        }))
    }

    /// Plans one required selection set, unless it is already being
    /// expanded on the current path. The owning dispatcher still runs once
    /// per field either way; a revisited dependency just adds no new plan.
    fn build_dependency_plan(
        &mut self,
        required: &Arc<RequiredSelectionSet>,
        attribution: &str,
    ) -> Result<Option<Arc<QueryPlan>>, PlanError> {
        let identity = required.identity();
        if !self.seen_dependencies.insert(identity) {
            return Ok(None);
        }
        let result = self.build_dependency_plan_inner(required, attribution);
        self.seen_dependencies.remove(&identity);
        result.map(Some)
    }

    fn build_dependency_plan_inner(
        &mut self,
        required: &Arc<RequiredSelectionSet>,
        attribution: &str,
    ) -> Result<Arc<QueryPlan>, PlanError> {
        self.check_type_exists(&required.type_name)?;
        let selection_set =
            self.build_selection_set(&required.selection_set, &required.type_name, &Constraints::none())?;

        let mut child_plans = Vec::new();
        for resolver in &required.variables_resolvers {
            if let Some(inner) = resolver.required_selection_set() {
                if let Some(plan) = self.build_dependency_plan(inner, resolver.variable())? {
                    child_plans.push(plan);
                }
            }
        }

        Ok(Arc::new(QueryPlan {
            operation_type: OperationType::Query,
            parent_type: required.type_name.clone(),
            selection_set,
            fragments: self.built_fragments.clone(),
            variable_definitions: Vec::new(),
            variables_resolvers: required.variables_resolvers.clone(),
            child_plans,
            execution_condition: ExecutionCondition::Always,
            attribution: Some(format!("required-selections:{attribution}").into()),
        }))
    }

    /// Folds several dependency plans into one launchable unit.
    fn merge_plans(
        &self,
        mut plans: Vec<Arc<QueryPlan>>,
        type_name: &ArcStr,
    ) -> Option<Arc<QueryPlan>> {
        match plans.len() {
            0 => None,
            1 => plans.pop(),
            _ => Some(Arc::new(QueryPlan {
                operation_type: OperationType::Query,
                parent_type: type_name.clone(),
                selection_set: Arc::new(SelectionSet { items: Vec::new() }),
                fragments: FnvHashMap::default(),
                variable_definitions: Vec::new(),
                variables_resolvers: Vec::new(),
                child_plans: plans,
                execution_condition: ExecutionCondition::Always,
                attribution: Some(format!("type-checks:{type_name}").into()),
            })),
        }
    }

    fn build_fragment(&mut self, name: &ArcStr) -> Result<Arc<PlanFragment>, PlanError> {
        if let Some(built) = self.built_fragments.get(name) {
            return Ok(built.clone());
        }
        if self.building_fragments.contains(name) {
            return Err(PlanError::FragmentCycle {
                name: name.to_string(),
            });
        }
        let ast_fragment =
            self.fragment_asts
                .get(name)
                .copied()
                .ok_or_else(|| PlanError::UnknownFragment {
                    name: name.to_string(),
                })?;
        let type_condition = ast_fragment.type_condition.item.clone();
        self.check_type_exists(&type_condition)?;

        self.building_fragments.push(name.clone());
        let constraints =
            Constraints::none().narrow_types(self.schema.possible_type_names(&type_condition));
        let selection_set =
            self.build_selection_set(&ast_fragment.selection_set, &type_condition, &constraints);
        self.building_fragments.pop();

        let fragment = Arc::new(PlanFragment {
            type_condition,
            selection_set: selection_set?,
        });
        self.built_fragments.insert(name.clone(), fragment.clone());
        Ok(fragment)
    }

    fn check_type_exists(&self, name: &str) -> Result<(), PlanError> {
        if self.schema.concrete_type_by_name(name).is_none() {
            return Err(PlanError::UnknownType {
                name: name.to_string(),
            });
        }
        Ok(())
    }
}
