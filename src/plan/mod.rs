//! Query plans: the reusable, pre-computed form of an operation.
//!
//! A [`QueryPlan`] is pure immutable data derived from a validated operation
//! and a schema. It records merged selections with their applicability
//! [`Constraints`], the dependencies each field needs resolved before its
//! resolver may run (child plans), and the variable machinery those
//! dependencies use. Plans are built once, cached process-wide, and shared
//! across requests.

pub mod builder;
pub mod cache;
pub mod collect;
mod constraints;

use std::{fmt, sync::Arc};

use arcstr::ArcStr;
use derive_more::Display;
use fnv::FnvHashMap;

use crate::{
    ast::{InputValue, OperationType, SourcePosition, Type, VariableDefinition, Variables},
    error::EngineError,
    registry::{Coordinate, VariableResolver},
};

pub use self::{
    builder::{PlanOptions, build_operation_plan},
    cache::{QueryPlanCache, QueryPlanCacheKey},
    collect::{CollectCache, CollectedField, collect_fields},
    constraints::{BoolInput, Constraints, DirectiveCondition, Disposition},
};

/// An error raised while turning an operation into a [`QueryPlan`].
#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub enum PlanError {
    /// No operation definition matched the requested name.
    #[display("unknown operation name")]
    UnknownOperation,
    /// Several operations exist but no name was requested.
    #[display("must provide operation name if query contains multiple operations")]
    MultipleOperations,
    /// The schema does not support the requested operation kind.
    #[display("schema does not define a {_0} root type")]
    UnsupportedOperation(OperationType),
    /// A selection referenced a type the schema does not declare.
    #[display("unknown type {name:?}")]
    UnknownType {
        /// The missing type name.
        name: String,
    },
    /// A selection referenced a field its parent type does not declare.
    #[display("unknown field {field_name:?} on type {type_name:?}")]
    UnknownField {
        /// The parent type name.
        type_name: String,
        /// The missing field name.
        field_name: String,
    },
    /// A spread referenced a fragment the document does not define.
    #[display("unknown fragment {name:?}")]
    UnknownFragment {
        /// The missing fragment name.
        name: String,
    },
    /// Fragment definitions spread each other in a cycle.
    #[display("fragment cycle involving {name:?}")]
    FragmentCycle {
        /// A fragment on the cycle.
        name: String,
    },
    /// A conditional directive carried an unusable `if` argument.
    #[display("malformed @{name} directive")]
    MalformedDirective {
        /// The directive name.
        name: String,
    },
    /// The plan build was interrupted before finishing.
    #[display("plan build interrupted: {message}")]
    Interrupted {
        /// What happened.
        message: String,
    },
}

impl std::error::Error for PlanError {}

impl From<PlanError> for EngineError {
    fn from(e: PlanError) -> EngineError {
        EngineError::Plan {
            message: e.to_string(),
        }
    }
}

/// An ordered selection set inside a plan.
///
/// Wrapped in [`Arc`] everywhere so that per-request caches can key on its
/// identity.
#[derive(Debug)]
pub struct SelectionSet {
    /// The selections, in document order.
    pub items: Vec<PlanSelection>,
}

impl SelectionSet {
    /// Identity of this selection set, for identity-keyed caches.
    pub fn identity(self: &Arc<Self>) -> usize {
        Arc::as_ptr(self) as usize
    }
}

/// One selection inside a plan.
#[derive(Clone, Debug)]
pub enum PlanSelection {
    /// A field selection.
    Field(Arc<PlanField>),
    /// An inline fragment, kept structurally.
    InlineFragment(PlanInlineFragment),
    /// A named fragment spread; its selections live in
    /// [`QueryPlan::fragments`].
    FragmentSpread(PlanFragmentSpread),
}

/// Metadata attached to a planned field.
#[derive(Clone, Debug, Default)]
pub struct FieldMetadata {
    /// Coordinate of the registered resolver serving the field, if any.
    pub resolver_coordinate: Option<Coordinate>,
}

/// A field selection inside a plan.
#[derive(Debug)]
pub struct PlanField {
    /// Name of the field in the schema.
    pub name: ArcStr,
    /// Response alias, if any.
    pub alias: Option<ArcStr>,
    /// Conditions under which the selection applies.
    pub constraints: Constraints,
    /// Raw arguments, possibly containing variable references.
    pub arguments: Vec<(ArcStr, InputValue)>,
    /// Declared result type.
    pub field_type: Type,
    /// Sub-selections, for composite-typed fields.
    pub selection_set: Option<Arc<SelectionSet>>,
    /// Plans that must be resolved before this field's resolver runs.
    pub child_plans: Vec<Arc<QueryPlan>>,
    /// Type-checker dependency plans per possible concrete result type.
    /// Launched only when a value of that type is observed.
    pub field_type_child_plans: FnvHashMap<ArcStr, Arc<QueryPlan>>,
    /// Field metadata.
    pub metadata: FieldMetadata,
    /// Source position of the selection.
    pub position: SourcePosition,
}

impl PlanField {
    /// The key under which this field appears in the response.
    pub fn response_key(&self) -> &ArcStr {
        self.alias.as_ref().unwrap_or(&self.name)
    }

    /// Is this the `__typename` meta-field?
    pub fn is_typename(&self) -> bool {
        self.name == "__typename"
    }
}

/// An inline fragment inside a plan.
#[derive(Clone, Debug)]
pub struct PlanInlineFragment {
    /// The fragment's selections.
    pub selection_set: Arc<SelectionSet>,
    /// Conditions (directives plus narrowed types) of the fragment.
    pub constraints: Constraints,
}

/// A named fragment spread inside a plan.
#[derive(Clone, Debug)]
pub struct PlanFragmentSpread {
    /// Name of the spread fragment.
    pub name: ArcStr,
    /// Conditions (directives plus narrowed types) of the spread.
    pub constraints: Constraints,
}

/// A named fragment of a plan, expanded once and shared.
#[derive(Debug)]
pub struct PlanFragment {
    /// The type condition of the fragment definition.
    pub type_condition: ArcStr,
    /// The fragment's planned selections.
    pub selection_set: Arc<SelectionSet>,
}

/// Gate deciding whether a child plan executes for a given request.
#[derive(Clone)]
pub enum ExecutionCondition {
    /// The plan always executes.
    Always,
    /// The plan executes when the predicate holds for the request
    /// variables.
    Predicate(Arc<dyn Fn(&Variables) -> bool + Send + Sync>),
}

impl ExecutionCondition {
    /// Evaluates the gate.
    pub fn passes(&self, variables: &Variables) -> bool {
        match self {
            ExecutionCondition::Always => true,
            ExecutionCondition::Predicate(p) => p(variables),
        }
    }
}

impl fmt::Debug for ExecutionCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionCondition::Always => f.write_str("Always"),
            ExecutionCondition::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// The immutable execution plan of one operation or one required selection
/// set.
#[derive(Debug)]
pub struct QueryPlan {
    /// Kind of the operation the plan belongs to.
    pub operation_type: OperationType,
    /// Composite type the selections apply to.
    pub parent_type: ArcStr,
    /// The planned selections.
    pub selection_set: Arc<SelectionSet>,
    /// Named fragments referenced by the selections, expanded once.
    pub fragments: FnvHashMap<ArcStr, Arc<PlanFragment>>,
    /// Variables declared by the operation.
    pub variable_definitions: Vec<(ArcStr, VariableDefinition)>,
    /// Resolvers producing this plan's variables, in declaration order.
    pub variables_resolvers: Vec<Arc<dyn VariableResolver>>,
    /// Plans that must be resolved before any field of this plan.
    pub child_plans: Vec<Arc<QueryPlan>>,
    /// Gate deciding whether the plan executes at all.
    pub execution_condition: ExecutionCondition,
    /// Opaque observability label.
    pub attribution: Option<ArcStr>,
}

impl fmt::Display for QueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "plan of {} on {}", self.operation_type, self.parent_type)?;
        if let Some(attribution) = &self.attribution {
            write!(f, " ({attribution})")?;
        }
        Ok(())
    }
}
