//! Field collection: flattening a plan's selections for one concrete
//! object type.
//!
//! This is the standard GraphQL CollectFields pass. Directives are
//! evaluated against the request variables, fragment conditions against the
//! concrete type, and selections sharing a response key merge into a single
//! [`CollectedField`] whose sub-selections concatenate. Results are cached
//! per request, keyed on identity: plans are immutable and a request's
//! variables are constant, so the same `(type, selection set)` pair always
//! collects the same way.

use std::sync::{Arc, Mutex};

use arcstr::ArcStr;
use fnv::FnvHashMap;
use indexmap::IndexMap;
use itertools::Itertools as _;

use crate::{ast::Variables, error::EngineError, schema::meta::ObjectMeta};

use super::{
    Disposition, PlanField, PlanFragment, PlanSelection, QueryPlan, SelectionSet,
};

/// A response-key-merged field, ready for execution. Unconditional: every
/// constraint has already been solved to [`Disposition::Keep`].
#[derive(Clone, Debug)]
pub struct CollectedField {
    /// Response key the field completes under.
    pub response_key: ArcStr,
    /// The merged field. The first occurrence wins for position, arguments
    /// and metadata.
    pub field: Arc<PlanField>,
    /// Concatenated sub-selections of every merged occurrence.
    pub selection_set: Option<Arc<SelectionSet>>,
    /// Dependency plans of every merged occurrence, identity-deduplicated.
    pub child_plans: Vec<Arc<QueryPlan>>,
    /// Type-checker dependency plans per possible concrete result type.
    pub field_type_child_plans: FnvHashMap<ArcStr, Arc<QueryPlan>>,
}

struct MergedEntry {
    field: Arc<PlanField>,
    sub_sets: Vec<Arc<SelectionSet>>,
    child_plans: Vec<Arc<QueryPlan>>,
    field_type_child_plans: FnvHashMap<ArcStr, Arc<QueryPlan>>,
}

/// Collects the fields of `selection_set` as seen by a value of
/// `object_type`.
///
/// Type conditions were narrowed into each selection's constraints at plan
/// time, so collection only needs the concrete type name to solve them.
pub fn collect_fields(
    object_type: &ObjectMeta,
    selection_set: &Arc<SelectionSet>,
    variables: &Variables,
    fragments: &FnvHashMap<ArcStr, Arc<PlanFragment>>,
) -> Result<Arc<Vec<CollectedField>>, EngineError> {
    let mut grouped: IndexMap<ArcStr, MergedEntry> = IndexMap::new();
    walk(object_type, selection_set, variables, fragments, &mut grouped)?;
    let collected = grouped
        .into_iter()
        .map(|(response_key, entry)| {
            let selection_set = match entry.sub_sets.len() {
                0 => None,
                1 => Some(entry.sub_sets.into_iter().next().expect("one sub-set")),
                _ => Some(Arc::new(SelectionSet {
                    items: entry
                        .sub_sets
                        .iter()
                        .flat_map(|s| s.items.iter().cloned())
                        .collect(),
                })),
            };
            CollectedField {
                response_key,
                field: entry.field,
                selection_set,
                child_plans: entry
                    .child_plans
                    .into_iter()
                    .unique_by(|p| Arc::as_ptr(p) as usize)
                    .collect(),
                field_type_child_plans: entry.field_type_child_plans,
            }
        })
        .collect();
    Ok(Arc::new(collected))
}

fn walk(
    object_type: &ObjectMeta,
    selection_set: &Arc<SelectionSet>,
    variables: &Variables,
    fragments: &FnvHashMap<ArcStr, Arc<PlanFragment>>,
    grouped: &mut IndexMap<ArcStr, MergedEntry>,
) -> Result<(), EngineError> {
    for selection in &selection_set.items {
        match selection {
            PlanSelection::Field(field) => {
                if field.constraints.solve(variables, Some(&object_type.name))
                    == Disposition::Drop
                {
                    continue;
                }
                match grouped.get_mut(field.response_key()) {
                    Some(entry) => {
                        entry.sub_sets.extend(field.selection_set.iter().cloned());
                        entry.child_plans.extend(field.child_plans.iter().cloned());
                        for (t, p) in &field.field_type_child_plans {
                            entry
                                .field_type_child_plans
                                .entry(t.clone())
                                .or_insert_with(|| p.clone());
                        }
                    }
                    None => {
                        grouped.insert(
                            field.response_key().clone(),
                            MergedEntry {
                                field: field.clone(),
                                sub_sets: field.selection_set.iter().cloned().collect(),
                                child_plans: field.child_plans.clone(),
                                field_type_child_plans: field.field_type_child_plans.clone(),
                            },
                        );
                    }
                }
            }
            PlanSelection::InlineFragment(frag) => {
                if frag.constraints.solve(variables, Some(&object_type.name))
                    == Disposition::Drop
                {
                    continue;
                }
                walk(object_type, &frag.selection_set, variables, fragments, grouped)?;
            }
            PlanSelection::FragmentSpread(spread) => {
                if spread.constraints.solve(variables, Some(&object_type.name))
                    == Disposition::Drop
                {
                    continue;
                }
                let fragment = fragments.get(&spread.name).ok_or_else(|| {
                    EngineError::internal(format!(
                        "plan references unexpanded fragment {:?}",
                        spread.name.as_str(),
                    ))
                })?;
                walk(
                    object_type,
                    &fragment.selection_set,
                    variables,
                    fragments,
                    grouped,
                )?;
            }
        }
    }
    Ok(())
}

/// Per-request memoization of [`collect_fields`] outcomes.
///
/// Keys are identities, not structures: the object type's address inside
/// the shared schema and the selection set's [`Arc`] address. Thread-safe;
/// the first computation for a key wins and every later call observes the
/// same [`Arc`]'d result.
#[derive(Clone, Default)]
pub struct CollectCache {
    inner: Arc<Mutex<FnvHashMap<(usize, usize), Arc<Vec<CollectedField>>>>>,
}

impl CollectCache {
    /// An empty cache.
    pub fn new() -> CollectCache {
        CollectCache::default()
    }

    /// Collects through the cache.
    pub fn collect(
        &self,
        object_type: &ObjectMeta,
        selection_set: &Arc<SelectionSet>,
        variables: &Variables,
        fragments: &FnvHashMap<ArcStr, Arc<PlanFragment>>,
    ) -> Result<Arc<Vec<CollectedField>>, EngineError> {
        let key = (
            std::ptr::from_ref(object_type) as usize,
            selection_set.identity(),
        );
        if let Some(hit) = self.inner.lock().expect("collect cache poisoned").get(&key) {
            return Ok(hit.clone());
        }
        let computed = collect_fields(object_type, selection_set, variables, fragments)?;
        let mut guard = self.inner.lock().expect("collect cache poisoned");
        Ok(guard.entry(key).or_insert(computed).clone())
    }
}
