//! Per-object result stores.
//!
//! An [`ObjectEngineResult`] is both a memoization table and the
//! synchronization fabric between the resolution and completion pipelines.
//! Each field position of an object owns one [`Cell`] holding the raw
//! resolution outcome and the combined access-check outcome as separately
//! awaitable [`Eventual`]s; completion (and dependent resolvers) suspend on
//! those cells instead of polling. The store itself signals through
//! [`resolution_state`](ObjectEngineResult::resolution_state) once every
//! immediate raw value has settled, which is what makes lazily-populated
//! stores safe to consume.

use std::{
    fmt,
    sync::{Arc, Mutex},
};

use arcstr::ArcStr;
use fnv::FnvHashMap;
use itertools::Itertools as _;

use crate::{
    ast::InputValue,
    error::{EngineError, GraphQLError},
    eventual::{Completer, Eventual, EventualResult},
    registry::{CheckerResult, LocalContext, ResolvedValue},
    value::{Object, ScalarValue},
};

/// Identifies one field position of an object: field name, alias, and the
/// canonical form of its constant arguments.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct CellKey {
    /// Name of the field in the schema.
    pub field_name: ArcStr,
    /// Response alias, if any.
    pub alias: Option<ArcStr>,
    /// Canonical rendering of the coerced arguments.
    pub arguments: String,
}

impl CellKey {
    /// Builds the key for a field position from its constant arguments.
    pub fn new(
        field_name: ArcStr,
        alias: Option<ArcStr>,
        arguments: &[(ArcStr, InputValue)],
    ) -> CellKey {
        let arguments = arguments
            .iter()
            .sorted_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(name, value)| format!("{name}:{value}"))
            .join(",");
        CellKey {
            field_name,
            alias,
            arguments,
        }
    }
}

/// How selections beneath a field are resolved.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ResolutionPolicy {
    /// Dispatchers are looked up per coordinate, falling back to property
    /// access.
    #[default]
    Default,
    /// The parent supplied the whole subtree: resolve by property access
    /// only.
    ParentManaged,
}

/// What a field resolved to, as stored in its cell's raw slot.
#[derive(Clone, Debug)]
pub enum EngineValue {
    /// The field resolved to null.
    Null,
    /// A leaf value.
    Scalar(ScalarValue),
    /// A list; each element lives in its own [`Cell`].
    List(Vec<Arc<Cell>>),
    /// A nested object, with its own result store.
    Object(Arc<ObjectEngineResult>),
}

/// The raw outcome of resolving one field position.
#[derive(Clone, Debug)]
pub struct FieldResolutionResult {
    /// The value completion will walk.
    pub value: EngineValue,
    /// Context threaded to the subtree below.
    pub local_context: LocalContext,
    /// How the subtree below resolves.
    pub resolution_policy: ResolutionPolicy,
    /// The data exactly as the fetcher produced it, for property access.
    pub original: ResolvedValue,
    /// Partial errors the fetcher reported alongside its data.
    pub errors_from_fetch: Vec<GraphQLError>,
    /// Entries to merge into the response `extensions`.
    pub extensions: Option<Object>,
}

impl FieldResolutionResult {
    /// The nested result store, when the field resolved to an object.
    pub fn engine_result(&self) -> Option<&Arc<ObjectEngineResult>> {
        match &self.value {
            EngineValue::Object(oer) => Some(oer),
            _ => None,
        }
    }
}

/// The slots of one field position.
///
/// The raw slot is written exactly once, by the cell's initializer; all
/// consumers share the same [`Eventual`]s.
pub struct Cell {
    /// Raw resolution outcome.
    pub raw: Eventual<FieldResolutionResult>,
    /// Combined field/type checker outcome; `None` when no checker is
    /// registered.
    pub checker: Eventual<Option<CheckerResult>>,
    /// Suppresses checker errors during completion for this cell.
    pub bypass_checks_during_completion: bool,
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell")
            .field("raw", &self.raw.is_ready())
            .field("checker", &self.checker.is_ready())
            .finish_non_exhaustive()
    }
}

/// The per-object store of computed field values.
///
/// Created when the engine descends into an object (or up front for the
/// operation roots), discarded with the request. A store starts pending and
/// transitions to resolved or failed exactly once; late transitions are
/// no-ops.
pub struct ObjectEngineResult {
    object_type: ArcStr,
    cells: Mutex<FnvHashMap<CellKey, Arc<Cell>>>,
    resolution_completer: Completer<()>,
    resolution_state: Eventual<()>,
    lazy_source: Mutex<Option<Eventual<ResolvedValue>>>,
}

impl ObjectEngineResult {
    /// Creates a pending store for an object of `object_type`.
    pub fn new(object_type: ArcStr) -> Arc<ObjectEngineResult> {
        let (resolution_completer, resolution_state) = Eventual::promise();
        Arc::new(ObjectEngineResult {
            object_type,
            cells: Mutex::new(FnvHashMap::default()),
            resolution_completer,
            resolution_state,
            lazy_source: Mutex::new(None),
        })
    }

    /// Concrete type of the stored object.
    pub fn object_type(&self) -> &ArcStr {
        &self.object_type
    }

    /// Returns the cell for `key`, creating it with `init` if absent.
    ///
    /// `init` runs at most once per key, under the store lock, and must
    /// only launch work, not perform it. Every concurrent caller observes
    /// the same cell. This is the at-most-one-fetch barrier.
    pub fn compute_if_absent<F: FnOnce() -> Cell>(&self, key: CellKey, init: F) -> Arc<Cell> {
        let mut cells = self.cells.lock().expect("result store poisoned");
        cells
            .entry(key)
            .or_insert_with(|| Arc::new(init()))
            .clone()
    }

    /// Looks up an existing cell.
    pub fn cell(&self, key: &CellKey) -> Option<Arc<Cell>> {
        self.cells
            .lock()
            .expect("result store poisoned")
            .get(key)
            .cloned()
    }

    /// Looks up an existing cell by plain field name, preferring unaliased
    /// positions. This is how dependency selections read their data.
    pub fn cell_by_field_name(&self, field_name: &str) -> Option<Arc<Cell>> {
        let cells = self.cells.lock().expect("result store poisoned");
        cells
            .iter()
            .filter(|(k, _)| k.field_name == field_name)
            .sorted_by_key(|(k, _)| k.alias.is_some())
            .map(|(_, c)| c.clone())
            .next()
    }

    /// Number of populated cells.
    pub fn cell_count(&self) -> usize {
        self.cells.lock().expect("result store poisoned").len()
    }

    /// Settles when every cell's immediate raw value has resolved.
    /// Completion waits on this before touching cells, so pending stores
    /// are never consumed early.
    pub fn resolution_state(&self) -> Eventual<()> {
        self.resolution_state.clone()
    }

    /// Marks the store resolved (or failed). The first transition wins;
    /// repeats are no-ops.
    pub fn complete_resolution(&self, result: EventualResult<()>) -> bool {
        self.resolution_completer.complete(result)
    }

    /// Memoizes the one-shot materialization of lazily-supplied object
    /// data: `init` runs for the first traversal to reach this store, every
    /// later traversal shares the same outcome.
    pub fn lazy_source_or_init<F>(&self, init: F) -> Eventual<ResolvedValue>
    where
        F: FnOnce() -> Eventual<ResolvedValue>,
    {
        self.lazy_source
            .lock()
            .expect("result store poisoned")
            .get_or_insert_with(init)
            .clone()
    }
}

impl fmt::Debug for ObjectEngineResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectEngineResult")
            .field("object_type", &self.object_type)
            .field("cells", &self.cell_count())
            .finish_non_exhaustive()
    }
}

/// A read view over an [`ObjectEngineResult`], handed to resolvers and
/// checkers whose declared selections were resolved against it.
#[derive(Clone, Debug)]
pub struct EngineData {
    oer: Arc<ObjectEngineResult>,
    for_checker: bool,
}

impl EngineData {
    /// View for resolver dependency reads.
    pub fn proxy(oer: Arc<ObjectEngineResult>) -> EngineData {
        EngineData {
            oer,
            for_checker: false,
        }
    }

    /// View for checker dependency reads.
    pub fn checker_proxy(oer: Arc<ObjectEngineResult>) -> EngineData {
        EngineData {
            oer,
            for_checker: true,
        }
    }

    /// Is this the checker-flavored view?
    pub fn is_for_checker(&self) -> bool {
        self.for_checker
    }

    /// Concrete type of the viewed object.
    pub fn object_type(&self) -> &ArcStr {
        self.oer.object_type()
    }

    /// The underlying store.
    pub fn engine_result(&self) -> &Arc<ObjectEngineResult> {
        &self.oer
    }

    /// Awaits the resolved data of `field_name`.
    ///
    /// Only fields covered by the caller's declared selections are
    /// guaranteed to be present; anything else errors.
    pub async fn get(&self, field_name: &str) -> Result<ResolvedValue, EngineError> {
        let cell = self.oer.cell_by_field_name(field_name).ok_or_else(|| {
            EngineError::internal(format!(
                "field {field_name:?} of {} is not covered by the declared selections",
                self.oer.object_type(),
            ))
        })?;
        let result = cell.raw.clone().resolve().await?;
        Ok(result.original)
    }

    /// Reads the resolved data of `field_name` without suspending, if it
    /// has settled.
    pub fn try_get(&self, field_name: &str) -> Option<Result<ResolvedValue, EngineError>> {
        let cell = self.oer.cell_by_field_name(field_name)?;
        cell.raw
            .peek()
            .map(|result| result.map(|r| r.original))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use crate::{
        eventual::Eventual,
        registry::ResolvedValue,
    };

    use super::{
        Cell, CellKey, EngineValue, FieldResolutionResult, ObjectEngineResult, ResolutionPolicy,
    };

    fn ready_cell(value: EngineValue, original: ResolvedValue) -> Cell {
        Cell {
            raw: Eventual::ok(FieldResolutionResult {
                value,
                local_context: None,
                resolution_policy: ResolutionPolicy::Default,
                original,
                errors_from_fetch: Vec::new(),
                extensions: None,
            }),
            checker: Eventual::ok(None),
            bypass_checks_during_completion: false,
        }
    }

    fn key(name: &str) -> CellKey {
        CellKey::new(name.into(), None, &[])
    }

    #[test]
    fn compute_if_absent_initializes_at_most_once() {
        let oer = ObjectEngineResult::new("Query".into());
        let inits = Arc::new(AtomicUsize::new(0));

        let mut cells = Vec::new();
        for _ in 0..3 {
            let inits = inits.clone();
            cells.push(oer.compute_if_absent(key("hello"), move || {
                inits.fetch_add(1, Ordering::SeqCst);
                ready_cell(
                    EngineValue::Scalar("world".into()),
                    ResolvedValue::scalar("world"),
                )
            }));
        }

        assert_eq!(inits.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&cells[0], &cells[1]));
        assert!(Arc::ptr_eq(&cells[1], &cells[2]));
    }

    #[test]
    fn distinct_arguments_are_distinct_positions() {
        let a = CellKey::new(
            "user".into(),
            None,
            &[("id".into(), crate::ast::InputValue::scalar(1))],
        );
        let b = CellKey::new(
            "user".into(),
            None,
            &[("id".into(), crate::ast::InputValue::scalar(2))],
        );
        assert_ne!(a, b);
    }

    #[test]
    fn argument_order_does_not_matter() {
        let a = CellKey::new(
            "user".into(),
            None,
            &[
                ("x".into(), crate::ast::InputValue::scalar(1)),
                ("y".into(), crate::ast::InputValue::scalar(2)),
            ],
        );
        let b = CellKey::new(
            "user".into(),
            None,
            &[
                ("y".into(), crate::ast::InputValue::scalar(2)),
                ("x".into(), crate::ast::InputValue::scalar(1)),
            ],
        );
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn resolution_transitions_once() {
        let oer = ObjectEngineResult::new("Query".into());
        assert!(oer.complete_resolution(Ok(())));
        assert!(!oer.complete_resolution(Err(crate::error::EngineError::Cancelled)));
        assert_eq!(oer.resolution_state().resolve().await, Ok(()));
    }
}
