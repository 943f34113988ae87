//! The dispatcher surface: how the engine finds user-provided resolvers,
//! checkers, and their declared data dependencies.
//!
//! Everything here is an interface plus plain data. Dispatchers are the
//! indirection layer between a schema coordinate and the user code that
//! serves it; the engine owns when and how often they run, the
//! implementations own what they compute.

use std::{any::Any, fmt, sync::Arc};

use arcstr::ArcStr;
use async_trait::async_trait;
use fnv::FnvHashMap;

use crate::{
    ast::{InputValue, Selection, Variables},
    error::{EngineError, FieldError, FieldResult, GraphQLError},
    executor::object_result::EngineData,
    plan::SelectionSet,
    schema::{Schema, meta::MetaType},
    value::{Object, ScalarValue},
};

/// Identifies a field definition in the schema: `(type name, field name)`.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Coordinate {
    /// Name of the type declaring the field.
    pub type_name: ArcStr,
    /// Name of the field.
    pub field_name: ArcStr,
}

impl Coordinate {
    /// Builds a new [`Coordinate`].
    pub fn new(type_name: impl Into<ArcStr>, field_name: impl Into<ArcStr>) -> Coordinate {
        Coordinate {
            type_name: type_name.into(),
            field_name: field_name.into(),
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.type_name, self.field_name)
    }
}

/// Opaque request-wide context shared with every dispatcher.
pub type GraphQLContext = Arc<dyn Any + Send + Sync>;

/// Per-field context a resolver may thread down to its subtree.
pub type LocalContext = Option<Arc<dyn Any + Send + Sync>>;

/// Field-addressable object data produced by a resolver.
pub type ObjectData = FnvHashMap<String, ResolvedValue>;

/// Dynamic data returned by data fetchers and consumed by the engine.
///
/// This is the untyped world the engine navigates before completion coerces
/// it into the response tree.
#[derive(Clone, Debug)]
pub enum ResolvedValue {
    /// Absent value.
    Null,
    /// Leaf value.
    Scalar(ScalarValue),
    /// Sequence value for list-typed fields.
    List(Vec<ResolvedValue>),
    /// Plain object data: child fields without their own resolver read
    /// equally-named properties from it.
    Object(Arc<ObjectData>),
    /// Object data that materializes on first access; the engine creates a
    /// pending result store for it and resolves it off the hot path.
    Lazy(Arc<dyn LazyObjectData>),
    /// Marks the contained value as fully parent-managed: the whole subtree
    /// beneath resolves by property access, without dispatcher lookups.
    ParentManaged(Box<ResolvedValue>),
}

impl ResolvedValue {
    /// Builds object data from `(key, value)` pairs.
    pub fn object<K, I>(entries: I) -> ResolvedValue
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, ResolvedValue)>,
    {
        ResolvedValue::Object(Arc::new(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    /// Builds a scalar value.
    pub fn scalar<T: Into<ScalarValue>>(v: T) -> ResolvedValue {
        ResolvedValue::Scalar(v.into())
    }

    /// Builds a list value.
    pub fn list<I: IntoIterator<Item = ResolvedValue>>(items: I) -> ResolvedValue {
        ResolvedValue::List(items.into_iter().collect())
    }

    /// Does this value represent null?
    pub fn is_null(&self) -> bool {
        matches!(self, ResolvedValue::Null)
    }

    /// Reads an equally-named property from object data.
    pub fn property(&self, name: &str) -> Option<&ResolvedValue> {
        match self {
            ResolvedValue::Object(o) => o.get(name),
            ResolvedValue::ParentManaged(inner) => inner.property(name),
            _ => None,
        }
    }

    /// The `__typename` property of object data, if present.
    pub fn type_name(&self) -> Option<&str> {
        match self.property("__typename") {
            Some(ResolvedValue::Scalar(s)) => s.as_str(),
            _ => None,
        }
    }
}

impl From<ScalarValue> for ResolvedValue {
    fn from(s: ScalarValue) -> ResolvedValue {
        ResolvedValue::Scalar(s)
    }
}

impl<T> From<Option<T>> for ResolvedValue
where
    ResolvedValue: From<T>,
{
    fn from(v: Option<T>) -> ResolvedValue {
        match v {
            Some(v) => v.into(),
            None => ResolvedValue::Null,
        }
    }
}

impl From<i32> for ResolvedValue {
    fn from(i: i32) -> ResolvedValue {
        ResolvedValue::scalar(i)
    }
}

impl From<&str> for ResolvedValue {
    fn from(s: &str) -> ResolvedValue {
        ResolvedValue::scalar(s)
    }
}

impl From<String> for ResolvedValue {
    fn from(s: String) -> ResolvedValue {
        ResolvedValue::scalar(s)
    }
}

impl From<bool> for ResolvedValue {
    fn from(b: bool) -> ResolvedValue {
        ResolvedValue::scalar(b)
    }
}

/// Object data whose fields are produced on demand.
///
/// A resolver may return this instead of a plain map when materializing the
/// object is expensive. The engine creates the object's result store in a
/// pending state, calls [`resolve_data`](LazyObjectData::resolve_data) on
/// the request scope, and only then resolves the store (or fails it).
#[async_trait]
pub trait LazyObjectData: Send + Sync + fmt::Debug {
    /// Produces the concrete object data this value stands for.
    async fn resolve_data(&self, context: &GraphQLContext) -> FieldResult<ResolvedValue>;
}

/// What a data fetcher hands back: the value itself plus out-of-band parts.
///
/// Fetchers that only have a value convert into this via [`From`].
#[derive(Clone, Debug)]
pub struct DataFetcherResult {
    /// The fetched value.
    pub data: ResolvedValue,
    /// Partial errors to merge into the response without failing the field.
    pub errors: Vec<GraphQLError>,
    /// Context handed to the subtree below this field.
    pub local_context: LocalContext,
    /// Entries to merge into the response `extensions`.
    pub extensions: Option<Object>,
}

impl From<ResolvedValue> for DataFetcherResult {
    fn from(data: ResolvedValue) -> DataFetcherResult {
        DataFetcherResult {
            data,
            errors: Vec::new(),
            local_context: None,
            extensions: None,
        }
    }
}

/// A declared data dependency of a resolver, checker, or variable resolver:
/// a selection set against a composite type that must be resolved before
/// its owner can run.
///
/// Dependencies compare by identity (their [`Arc`] allocation), never
/// structurally; the planner relies on this to break cycles.
#[derive(Debug)]
pub struct RequiredSelectionSet {
    /// Composite type the selections apply to.
    pub type_name: ArcStr,
    /// The selections themselves, in operation-AST form.
    pub selection_set: Vec<Selection>,
    /// Resolvers for variables referenced inside `selection_set`.
    pub variables_resolvers: Vec<Arc<dyn VariableResolver>>,
}

impl RequiredSelectionSet {
    /// Builds a dependency with no variable resolvers.
    pub fn new(type_name: impl Into<ArcStr>, selection_set: Vec<Selection>) -> RequiredSelectionSet {
        RequiredSelectionSet {
            type_name: type_name.into(),
            selection_set,
            variables_resolvers: Vec::new(),
        }
    }

    /// Identity of this dependency, for cycle detection.
    pub fn identity(self: &Arc<Self>) -> usize {
        Arc::as_ptr(self) as usize
    }
}

/// Descriptive metadata a resolver dispatcher can expose for observability.
#[derive(Clone, Debug, Default)]
pub struct ResolverMetadata {
    /// Stable name of the resolver implementation.
    pub name: Option<ArcStr>,
}

/// Everything a field resolver gets to see when it runs.
pub struct ResolverEnvironment {
    /// Coerced, constant arguments of the field.
    pub arguments: Variables,
    /// View over the enclosing object's resolved fields; the resolver's
    /// object-typed required selections are readable here.
    pub object_value: EngineData,
    /// View over the query root's resolved fields.
    pub query_value: EngineData,
    /// The field's sub-selections, for lookahead.
    pub selections: Option<Arc<SelectionSet>>,
    /// Request-wide context.
    pub context: GraphQLContext,
    /// Context the parent resolver threaded down.
    pub local_context: LocalContext,
    /// Request locale, if the caller supplied one.
    pub locale: Option<ArcStr>,
}

/// Locates and runs the user resolver for one schema coordinate.
#[async_trait]
pub trait FieldResolverDispatcher: Send + Sync + fmt::Debug {
    /// Selections this resolver needs resolved on its enclosing object
    /// before it runs.
    fn object_selection_set(&self) -> Option<&Arc<RequiredSelectionSet>> {
        None
    }

    /// Selections this resolver needs resolved on the query root before it
    /// runs.
    fn query_selection_set(&self) -> Option<&Arc<RequiredSelectionSet>> {
        None
    }

    /// Does this resolver declare any required selections?
    fn has_required_selection_sets(&self) -> bool {
        self.object_selection_set().is_some() || self.query_selection_set().is_some()
    }

    /// Observability metadata.
    fn resolver_metadata(&self) -> ResolverMetadata {
        ResolverMetadata::default()
    }

    /// Computes the field's value. Invoked at most once per field position
    /// and request, and only after the declared required selections have
    /// settled.
    async fn resolve(&self, env: &ResolverEnvironment) -> FieldResult<DataFetcherResult>;
}

/// Verdict of an access checker.
#[derive(Clone, Debug)]
pub enum CheckerResult {
    /// Access granted.
    Ok,
    /// Access denied, with the error to surface.
    Error(FieldError),
}

impl CheckerResult {
    /// Did the checker deny access?
    pub fn is_denied(&self) -> bool {
        matches!(self, CheckerResult::Error(_))
    }
}

/// Which engine value an access checker's required selections read from.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CheckerRole {
    /// Selections against the enclosing object's type.
    ObjectValue,
    /// Selections against the query root type.
    QueryValue,
}

/// One required-selection-set declaration of a checker.
#[derive(Clone, Debug)]
pub struct CheckerRequirement {
    /// Which engine value the selections read from.
    pub role: CheckerRole,
    /// The declared selections.
    pub selections: Arc<RequiredSelectionSet>,
}

/// Everything an access checker gets to see when it runs.
pub struct CheckerEnvironment {
    /// Coerced, constant arguments of the gated field.
    pub arguments: Variables,
    /// View over the enclosing object's resolved fields.
    pub object_value: EngineData,
    /// View over the query root's resolved fields.
    pub query_value: EngineData,
    /// For type checks: the concrete value being checked.
    pub observed: Option<ResolvedValue>,
    /// Request-wide context.
    pub context: GraphQLContext,
    /// Context the parent resolver threaded down.
    pub local_context: LocalContext,
    /// Request locale, if the caller supplied one.
    pub locale: Option<ArcStr>,
}

/// Locates and runs the user access checker for a field or a type.
#[async_trait]
pub trait CheckerDispatcher: Send + Sync + fmt::Debug {
    /// Required selections of this checker, per role.
    fn required_selection_sets(&self) -> Vec<CheckerRequirement> {
        Vec::new()
    }

    /// Runs the check.
    async fn execute(&self, env: &CheckerEnvironment) -> CheckerResult;
}

/// Locates the user node resolver for a type.
///
/// Node resolvers are part of the registry surface for callers that
/// implement global object identification; the engine only exposes the
/// lookup.
#[async_trait]
pub trait NodeResolverDispatcher: Send + Sync + fmt::Debug {
    /// Resolves a node of the dispatcher's type by `id`.
    async fn resolve_node(
        &self,
        id: &str,
        context: &GraphQLContext,
    ) -> FieldResult<ResolvedValue>;
}

/// Everything a variable resolver gets to see when it runs.
pub struct VariableResolverEnvironment {
    /// Variables already resolved for the same plan, left-to-right.
    pub variables: Variables,
    /// View over the engine data this resolver's required selections were
    /// resolved against.
    pub data: Option<EngineData>,
    /// Request-wide context.
    pub context: GraphQLContext,
    /// Request locale, if the caller supplied one.
    pub locale: Option<ArcStr>,
}

/// Produces the value of one declared variable of a plan.
#[async_trait]
pub trait VariableResolver: Send + Sync + fmt::Debug {
    /// Name of the variable this resolver produces.
    fn variable(&self) -> &str;

    /// Selections this resolver needs resolved before it runs.
    fn required_selection_set(&self) -> Option<&Arc<RequiredSelectionSet>> {
        None
    }

    /// Whether the produced variable feeds a checker's selections; checker
    /// reads go through the checker-flavored engine-data proxy.
    fn for_checker(&self) -> bool {
        false
    }

    /// Computes the variable value.
    async fn resolve(&self, env: &VariableResolverEnvironment) -> FieldResult<InputValue>;
}

/// Resolves the concrete object type of an abstract-typed value.
///
/// Injectable: the engine installs [`TypenameTypeResolver`] unless the
/// caller supplies one. Implementations must error on unresolvable values;
/// the error surfaces as a field error at the completion stage.
pub trait TypeResolver: Send + Sync + fmt::Debug {
    /// Determines the concrete object type name for `data`.
    fn resolve_type(
        &self,
        context: &GraphQLContext,
        data: &ResolvedValue,
        abstract_type: &MetaType,
        schema: &Schema,
    ) -> Result<ArcStr, EngineError>;
}

/// Default [`TypeResolver`]: reads the `__typename` property off object
/// data and verifies it is a possible type of the abstract type.
#[derive(Debug, Default)]
pub struct TypenameTypeResolver;

impl TypeResolver for TypenameTypeResolver {
    fn resolve_type(
        &self,
        _context: &GraphQLContext,
        data: &ResolvedValue,
        abstract_type: &MetaType,
        schema: &Schema,
    ) -> Result<ArcStr, EngineError> {
        let name = data.type_name().ok_or_else(|| EngineError::TypeResolution {
            message: format!(
                "could not determine the concrete type of a {} value: no __typename property",
                abstract_type.name(),
            ),
        })?;
        let possible = schema.possible_types(abstract_type);
        possible
            .iter()
            .find(|o| o.name == name)
            .map(|o| o.name.clone())
            .ok_or_else(|| EngineError::TypeResolution {
                message: format!("{name} is not a possible type of {}", abstract_type.name()),
            })
    }
}

/// Lookup surface over every dispatcher the schema's code registry offers.
///
/// Implementations are read-only and shared across requests.
pub trait DispatcherRegistry: Send + Sync {
    /// The field resolver for a coordinate, if one is registered.
    fn field_resolver_dispatcher(
        &self,
        type_name: &str,
        field_name: &str,
    ) -> Option<Arc<dyn FieldResolverDispatcher>>;

    /// The field access checker for a coordinate, if one is registered.
    fn field_checker_dispatcher(
        &self,
        type_name: &str,
        field_name: &str,
    ) -> Option<Arc<dyn CheckerDispatcher>>;

    /// The type access checker for a type, if one is registered.
    fn type_checker_dispatcher(&self, type_name: &str) -> Option<Arc<dyn CheckerDispatcher>>;

    /// The node resolver for a type, if one is registered.
    fn node_resolver_dispatcher(&self, type_name: &str)
    -> Option<Arc<dyn NodeResolverDispatcher>>;

    /// Required selections of the field resolver at a coordinate.
    fn field_resolver_required_selection_sets(
        &self,
        type_name: &str,
        field_name: &str,
    ) -> Vec<Arc<RequiredSelectionSet>> {
        self.field_resolver_dispatcher(type_name, field_name)
            .map(|d| {
                d.object_selection_set()
                    .into_iter()
                    .chain(d.query_selection_set())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Required selections of the field checker at a coordinate.
    ///
    /// When `execute_access_checks` is unset, checker selections only
    /// count for fields whose resolver also declares selections.
    fn field_checker_required_selection_sets(
        &self,
        type_name: &str,
        field_name: &str,
        execute_access_checks: bool,
    ) -> Vec<Arc<RequiredSelectionSet>> {
        let Some(checker) = self.field_checker_dispatcher(type_name, field_name) else {
            return Vec::new();
        };
        let planned = execute_access_checks
            || self
                .field_resolver_dispatcher(type_name, field_name)
                .is_some_and(|d| d.has_required_selection_sets());
        if !planned {
            return Vec::new();
        }
        checker
            .required_selection_sets()
            .into_iter()
            .map(|r| r.selections)
            .collect()
    }

    /// Required selections of the type checker of a type.
    fn type_checker_required_selection_sets(
        &self,
        type_name: &str,
        execute_access_checks: bool,
    ) -> Vec<Arc<RequiredSelectionSet>> {
        if !execute_access_checks {
            return Vec::new();
        }
        self.type_checker_dispatcher(type_name)
            .map(|c| {
                c.required_selection_sets()
                    .into_iter()
                    .map(|r| r.selections)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Map-backed [`DispatcherRegistry`] built up front.
#[derive(Default)]
pub struct StaticRegistry {
    field_resolvers: FnvHashMap<Coordinate, Arc<dyn FieldResolverDispatcher>>,
    field_checkers: FnvHashMap<Coordinate, Arc<dyn CheckerDispatcher>>,
    type_checkers: FnvHashMap<ArcStr, Arc<dyn CheckerDispatcher>>,
    node_resolvers: FnvHashMap<ArcStr, Arc<dyn NodeResolverDispatcher>>,
}

impl StaticRegistry {
    /// An empty registry.
    pub fn new() -> StaticRegistry {
        StaticRegistry::default()
    }

    /// Registers a field resolver.
    #[must_use]
    pub fn with_field_resolver(
        mut self,
        coordinate: Coordinate,
        dispatcher: Arc<dyn FieldResolverDispatcher>,
    ) -> StaticRegistry {
        self.field_resolvers.insert(coordinate, dispatcher);
        self
    }

    /// Registers a field access checker.
    #[must_use]
    pub fn with_field_checker(
        mut self,
        coordinate: Coordinate,
        dispatcher: Arc<dyn CheckerDispatcher>,
    ) -> StaticRegistry {
        self.field_checkers.insert(coordinate, dispatcher);
        self
    }

    /// Registers a type access checker.
    #[must_use]
    pub fn with_type_checker(
        mut self,
        type_name: impl Into<ArcStr>,
        dispatcher: Arc<dyn CheckerDispatcher>,
    ) -> StaticRegistry {
        self.type_checkers.insert(type_name.into(), dispatcher);
        self
    }

    /// Registers a node resolver.
    #[must_use]
    pub fn with_node_resolver(
        mut self,
        type_name: impl Into<ArcStr>,
        dispatcher: Arc<dyn NodeResolverDispatcher>,
    ) -> StaticRegistry {
        self.node_resolvers.insert(type_name.into(), dispatcher);
        self
    }
}

impl DispatcherRegistry for StaticRegistry {
    fn field_resolver_dispatcher(
        &self,
        type_name: &str,
        field_name: &str,
    ) -> Option<Arc<dyn FieldResolverDispatcher>> {
        self.field_resolvers
            .get(&Coordinate::new(type_name, field_name))
            .cloned()
    }

    fn field_checker_dispatcher(
        &self,
        type_name: &str,
        field_name: &str,
    ) -> Option<Arc<dyn CheckerDispatcher>> {
        self.field_checkers
            .get(&Coordinate::new(type_name, field_name))
            .cloned()
    }

    fn type_checker_dispatcher(&self, type_name: &str) -> Option<Arc<dyn CheckerDispatcher>> {
        self.type_checkers.get(type_name).cloned()
    }

    fn node_resolver_dispatcher(
        &self,
        type_name: &str,
    ) -> Option<Arc<dyn NodeResolverDispatcher>> {
        self.node_resolvers.get(type_name).cloned()
    }
}
