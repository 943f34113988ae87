//! Process-wide query-plan cache.
//!
//! Bounded LRU keyed on everything a plan's shape depends on: the document
//! text, the caller's document key, the schema instance identity, and the
//! access-check planning flag. Entries are shared in-flight builds, so
//! concurrent requests for the same key coalesce onto one computation
//! instead of planning twice. `invalidate_all` supports schema hot swaps.

use std::{
    num::NonZeroUsize,
    sync::{Arc, Mutex},
};

use arcstr::ArcStr;
use futures::{
    FutureExt as _,
    future::{BoxFuture, Shared},
};
use tracing::debug;

use super::{PlanError, QueryPlan};

/// The cache key. Every input that can change the built plan is part of it.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct QueryPlanCacheKey {
    /// Full text of the executable document.
    pub document_text: Arc<str>,
    /// Caller-supplied discriminator (e.g. operation name).
    pub document_key: Option<ArcStr>,
    /// Identity of the schema instance the plan was built against.
    pub schema_identity: u64,
    /// Whether checker selections were planned unconditionally.
    pub execute_access_checks: bool,
}

/// A cached or in-flight plan build.
pub type SharedPlanBuild = Shared<BoxFuture<'static, Result<Arc<QueryPlan>, PlanError>>>;

/// Bounded, thread-safe store of plan builds.
pub struct QueryPlanCache {
    inner: Mutex<lru::LruCache<QueryPlanCacheKey, SharedPlanBuild>>,
}

impl QueryPlanCache {
    /// Creates a cache holding at most `capacity` plans.
    pub fn new(capacity: NonZeroUsize) -> QueryPlanCache {
        QueryPlanCache {
            inner: Mutex::new(lru::LruCache::new(capacity)),
        }
    }

    /// Returns the build for `key`, starting `make` exactly once per cached
    /// key. Repeated calls for the same key return the same shared build,
    /// and therefore the same plan instance.
    pub fn get_or_insert_with<F, Fut>(&self, key: QueryPlanCacheKey, make: F) -> SharedPlanBuild
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<QueryPlan>, PlanError>> + Send + 'static,
    {
        let mut guard = self.inner.lock().expect("plan cache poisoned");
        if let Some(hit) = guard.get(&key) {
            return hit.clone();
        }
        debug!(document_key = ?key.document_key, "planning uncached operation");
        let build = make().boxed().shared();
        guard.put(key, build.clone());
        build
    }

    /// Drops every cached plan. Called on schema hot swap.
    pub fn invalidate_all(&self) {
        self.inner.lock().expect("plan cache poisoned").clear();
    }

    /// Number of cached builds.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("plan cache poisoned").len()
    }

    /// Is the cache empty?
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
