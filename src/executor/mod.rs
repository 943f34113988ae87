//! The execution engine: resolution, access checks, and completion.
//!
//! [`strategy::ExecutionStrategy`] is the entry point. It plans the
//! operation, spins up a [`supervisor::RequestSupervisor`], lets
//! [`resolver`] populate the per-object result stores concurrently, and
//! drives [`completer`] over those stores to assemble the response.

pub mod access;
pub mod completer;
pub mod instrumentation;
pub mod object_result;
pub mod resolver;
pub mod strategy;
pub mod supervisor;
pub mod variables;

use std::{
    num::NonZeroUsize,
    sync::{Arc, Mutex, RwLock},
};

use arcstr::ArcStr;
use fnv::FnvHashMap;
use serde::Serialize;

use crate::{
    ast::{OperationType, SourcePosition, Variables},
    error::{EngineError, GraphQLError, PathSegment},
    plan::{CollectCache, PlanFragment, QueryPlan, SelectionSet},
    registry::{DispatcherRegistry, GraphQLContext, LocalContext, ResolvedValue, TypeResolver},
    schema::Schema,
    value::{Object, Value, merge_key_into},
};

use self::{
    instrumentation::Instrumentation,
    object_result::{ObjectEngineResult, ResolutionPolicy},
    supervisor::RequestSupervisor,
};

/// Engine-level switches.
#[derive(Clone, Debug)]
pub struct EngineOptions {
    /// Plan checker required selections even for fields whose resolver
    /// declares none.
    pub execute_access_checks_in_engine: bool,
    /// Bypass the process-wide query-plan cache.
    pub disable_query_plan_cache: bool,
    /// Capacity of the query-plan cache.
    pub plan_cache_capacity: NonZeroUsize,
}

impl Default for EngineOptions {
    fn default() -> EngineOptions {
        EngineOptions {
            execute_access_checks_in_engine: false,
            disable_query_plan_cache: false,
            plan_cache_capacity: NonZeroUsize::new(512).expect("non-zero"),
        }
    }
}

/// The position of the executing selection inside the response, kept as a
/// persistent linked list so that descending copies are cheap.
#[derive(Debug)]
pub enum FieldPath {
    /// The response root.
    Root,
    /// A field hop.
    Key(ArcStr, Arc<FieldPath>),
    /// A list-element hop.
    Index(usize, Arc<FieldPath>),
}

impl FieldPath {
    /// The root path.
    pub fn root() -> Arc<FieldPath> {
        Arc::new(FieldPath::Root)
    }

    /// Descends into a field.
    pub fn child_key(self: &Arc<FieldPath>, key: ArcStr) -> Arc<FieldPath> {
        Arc::new(FieldPath::Key(key, self.clone()))
    }

    /// Descends into a list element.
    pub fn child_index(self: &Arc<FieldPath>, index: usize) -> Arc<FieldPath> {
        Arc::new(FieldPath::Index(index, self.clone()))
    }

    fn construct(&self, acc: &mut Vec<PathSegment>) {
        match self {
            FieldPath::Root => {}
            FieldPath::Key(key, parent) => {
                parent.construct(acc);
                acc.push(PathSegment::Key(key.to_string()));
            }
            FieldPath::Index(index, parent) => {
                parent.construct(acc);
                acc.push(PathSegment::Index(*index));
            }
        }
    }

    /// The response path from the root to this position.
    pub fn to_segments(&self) -> Vec<PathSegment> {
        let mut acc = Vec::new();
        self.construct(&mut acc);
        acc
    }
}

/// The request-level collector of response errors.
#[derive(Clone, Default)]
pub struct ErrorAccumulator {
    inner: Arc<RwLock<Vec<GraphQLError>>>,
}

impl ErrorAccumulator {
    /// An empty accumulator.
    pub fn new() -> ErrorAccumulator {
        ErrorAccumulator::default()
    }

    /// Records a response error.
    pub fn push(&self, error: GraphQLError) {
        self.inner
            .write()
            .expect("error accumulator poisoned")
            .push(error);
    }

    /// Records an engine error at the given position.
    pub fn push_engine_error(
        &self,
        error: &EngineError,
        path: &[PathSegment],
        location: Option<SourcePosition>,
    ) {
        self.push(GraphQLError::from_engine_error(error, path, location));
    }

    /// Number of recorded errors.
    pub fn len(&self) -> usize {
        self.inner.read().expect("error accumulator poisoned").len()
    }

    /// Have no errors been recorded?
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drains into the final, deterministically ordered error list.
    pub fn into_sorted(self) -> Vec<GraphQLError> {
        let mut errors = std::mem::take(
            &mut *self.inner.write().expect("error accumulator poisoned"),
        );
        errors.sort_by(|a, b| {
            (&a.locations, &a.path, &a.message).cmp(&(&b.locations, &b.path, &b.message))
        });
        errors
    }
}

/// The request-level collector of response `extensions`.
#[derive(Clone, Default)]
pub struct ExtensionsAccumulator {
    inner: Arc<Mutex<Object>>,
}

impl ExtensionsAccumulator {
    /// Merges resolver-produced extensions entries.
    pub fn merge(&self, extensions: Object) {
        let mut guard = self.inner.lock().expect("extensions accumulator poisoned");
        for (key, value) in extensions {
            merge_key_into(&mut guard, &key, value);
        }
    }

    /// The merged extensions, if any resolver produced some.
    pub fn into_value(self) -> Option<Object> {
        let merged = std::mem::take(
            &mut *self.inner.lock().expect("extensions accumulator poisoned"),
        );
        (merged.field_count() > 0).then_some(merged)
    }
}

/// Immutable request-wide context shared by every traversal position.
pub struct Constants {
    /// The executing schema.
    pub schema: Arc<Schema>,
    /// The dispatcher registry.
    pub registry: Arc<dyn DispatcherRegistry>,
    /// Opaque request context handed to dispatchers.
    pub context: GraphQLContext,
    /// Request locale.
    pub locale: Option<ArcStr>,
    /// The request's task scope.
    pub supervisor: Arc<RequestSupervisor>,
    /// Collector of response errors.
    pub errors: ErrorAccumulator,
    /// Collector of response extensions.
    pub extensions: ExtensionsAccumulator,
    /// Per-request field-collection cache.
    pub collect_cache: CollectCache,
    /// Installed instrumentation.
    pub instrumentation: Arc<dyn Instrumentation>,
    /// Abstract-type resolution capability.
    pub type_resolver: Arc<dyn TypeResolver>,
    /// Engine switches.
    pub options: EngineOptions,
    /// Kind of the executing operation.
    pub operation_type: OperationType,
    /// Result store of the operation root.
    pub root_oer: Arc<ObjectEngineResult>,
    /// Result store of the query root; distinct from `root_oer` for
    /// mutations and subscriptions.
    pub query_oer: Arc<ObjectEngineResult>,
}

/// The traversal-specific execution state: request-wide constants plus the
/// current position. Copied (with changes) on every descent; never outlives
/// the request supervisor.
#[derive(Clone)]
pub struct ExecutionParameters {
    /// Request-wide context.
    pub constants: Arc<Constants>,
    /// Variables of the executing plan.
    pub variables: Arc<Variables>,
    /// Fragments of the executing plan.
    pub fragments: Arc<FnvHashMap<ArcStr, Arc<PlanFragment>>>,
    /// Selections being executed at this position.
    pub selection_set: Option<Arc<SelectionSet>>,
    /// Result store being populated at this position.
    pub parent_oer: Arc<ObjectEngineResult>,
    /// The data the enclosing fetcher produced for this object, for
    /// property access.
    pub source: ResolvedValue,
    /// Context the enclosing resolver threaded down.
    pub local_context: LocalContext,
    /// How selections at this position resolve.
    pub resolution_policy: ResolutionPolicy,
    /// Position inside the response.
    pub path: Arc<FieldPath>,
    /// Observability label of the executing plan.
    pub attribution: Option<ArcStr>,
    /// Is this the operation's top-level selection set?
    pub is_root: bool,
    /// Does this traversal own its stores' resolution-state transitions?
    ///
    /// True for the response traversal, false for dependency-plan
    /// traversals: a dependency plan populates shared stores but must not
    /// signal them complete on behalf of selections it knows nothing
    /// about.
    pub owns_resolution: bool,
}

impl ExecutionParameters {
    /// Parameters for the top of a plan: the operation root or a launched
    /// child plan.
    pub fn for_plan(
        constants: Arc<Constants>,
        plan: &QueryPlan,
        variables: Arc<Variables>,
        parent_oer: Arc<ObjectEngineResult>,
        source: ResolvedValue,
        is_root: bool,
        owns_resolution: bool,
    ) -> ExecutionParameters {
        ExecutionParameters {
            constants,
            variables,
            fragments: Arc::new(plan.fragments.clone()),
            selection_set: Some(plan.selection_set.clone()),
            parent_oer,
            source,
            local_context: None,
            resolution_policy: ResolutionPolicy::Default,
            path: FieldPath::root(),
            attribution: plan.attribution.clone(),
            is_root,
            owns_resolution,
        }
    }

    /// Parameters for descending into a nested object.
    pub fn descend(
        &self,
        parent_oer: Arc<ObjectEngineResult>,
        selection_set: Option<Arc<SelectionSet>>,
        source: ResolvedValue,
        local_context: LocalContext,
        resolution_policy: ResolutionPolicy,
        path: Arc<FieldPath>,
    ) -> ExecutionParameters {
        ExecutionParameters {
            constants: self.constants.clone(),
            variables: self.variables.clone(),
            fragments: self.fragments.clone(),
            selection_set,
            parent_oer,
            source,
            local_context,
            resolution_policy,
            path,
            attribution: self.attribution.clone(),
            is_root: false,
            owns_resolution: self.owns_resolution,
        }
    }

    /// The supervisor shortcut.
    pub fn supervisor(&self) -> &RequestSupervisor {
        &self.constants.supervisor
    }

    /// Is the executing position the top level of a serial-or-gated
    /// operation (mutation or subscription root)?
    pub fn is_serial_root(&self) -> bool {
        self.is_root
            && matches!(
                self.constants.operation_type,
                OperationType::Mutation | OperationType::Subscription,
            )
    }
}

/// The final outcome of executing an operation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExecutionResult {
    /// The response data; [`Value::Null`] when a non-null violation reached
    /// the root or the operation failed fatally.
    pub data: Value,
    /// Every error collected during execution, deterministically ordered.
    pub errors: Vec<GraphQLError>,
    /// Merged resolver-produced extensions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Object>,
}

#[cfg(test)]
mod tests {
    use crate::error::PathSegment;

    use super::FieldPath;

    #[test]
    fn field_paths_render_keys_and_indices() {
        let path = FieldPath::root()
            .child_key("xs".into())
            .child_index(2)
            .child_key("name".into());
        assert_eq!(
            path.to_segments(),
            vec![
                PathSegment::Key("xs".into()),
                PathSegment::Index(2),
                PathSegment::Key("name".into()),
            ],
        );
    }
}
