//! Instrumentation hooks around the engine's moving parts.
//!
//! Each hook returns a per-call [`InstrumentationContext`]; the engine
//! calls `on_dispatched` when the instrumented work is launched and
//! `on_completed` exactly once when it settles. Several instrumentations
//! compose with [`ChainedInstrumentation`], whose contexts fan out in
//! registration order.

use std::sync::Arc;

use arcstr::ArcStr;

use crate::{
    error::EngineError,
    registry::{CheckerDispatcher, Coordinate, FieldResolverDispatcher},
};

/// Static description of the instrumented call site.
#[derive(Clone, Debug, Default)]
pub struct InstrumentationInfo {
    /// Schema coordinate being worked on, if field-scoped.
    pub coordinate: Option<Coordinate>,
    /// Concrete object type being worked on, if object-scoped.
    pub object_type: Option<ArcStr>,
    /// Observability label of the executing plan.
    pub attribution: Option<ArcStr>,
}

/// Per-call observer handed back by an instrumentation hook.
pub trait InstrumentationContext: Send + Sync {
    /// The instrumented work was launched.
    fn on_dispatched(&self) {}

    /// The instrumented work settled. Called exactly once per
    /// `on_dispatched`.
    fn on_completed(&self, error: Option<&EngineError>) {
        let _ = error;
    }
}

/// The do-nothing context.
pub struct NoopContext;

impl InstrumentationContext for NoopContext {}

/// Observer of engine execution.
///
/// Every hook has a no-op default, so implementations only override what
/// they care about.
pub trait Instrumentation: Send + Sync {
    /// An object's fields are about to be fetched.
    fn begin_fetch_object(&self, info: &InstrumentationInfo) -> Box<dyn InstrumentationContext> {
        let _ = info;
        Box::new(NoopContext)
    }

    /// An object's fields are about to be completed.
    fn begin_complete_object(
        &self,
        info: &InstrumentationInfo,
    ) -> Box<dyn InstrumentationContext> {
        let _ = info;
        Box::new(NoopContext)
    }

    /// A field is about to be executed (dispatch plus descent).
    fn begin_field_execution(
        &self,
        info: &InstrumentationInfo,
    ) -> Box<dyn InstrumentationContext> {
        let _ = info;
        Box::new(NoopContext)
    }

    /// A field's data fetcher is about to run.
    fn begin_field_fetching(&self, info: &InstrumentationInfo) -> Box<dyn InstrumentationContext> {
        let _ = info;
        Box::new(NoopContext)
    }

    /// A field value is about to be completed.
    fn begin_field_completion(
        &self,
        info: &InstrumentationInfo,
    ) -> Box<dyn InstrumentationContext> {
        let _ = info;
        Box::new(NoopContext)
    }

    /// A list field's elements are about to be completed.
    fn begin_field_list_completion(
        &self,
        info: &InstrumentationInfo,
    ) -> Box<dyn InstrumentationContext> {
        let _ = info;
        Box::new(NoopContext)
    }

    /// Chance to wrap a data fetcher before it runs.
    fn instrument_data_fetcher(
        &self,
        fetcher: Arc<dyn FieldResolverDispatcher>,
        info: &InstrumentationInfo,
    ) -> Arc<dyn FieldResolverDispatcher> {
        let _ = info;
        fetcher
    }

    /// Chance to wrap an access checker before it runs.
    fn instrument_access_check(
        &self,
        checker: Arc<dyn CheckerDispatcher>,
        info: &InstrumentationInfo,
    ) -> Arc<dyn CheckerDispatcher> {
        let _ = info;
        checker
    }
}

/// The do-nothing instrumentation.
#[derive(Debug, Default)]
pub struct NoopInstrumentation;

impl Instrumentation for NoopInstrumentation {}

struct ChainedContext {
    contexts: Vec<Box<dyn InstrumentationContext>>,
}

impl InstrumentationContext for ChainedContext {
    fn on_dispatched(&self) {
        for context in &self.contexts {
            context.on_dispatched();
        }
    }

    fn on_completed(&self, error: Option<&EngineError>) {
        for context in &self.contexts {
            context.on_completed(error);
        }
    }
}

/// Composes several instrumentations; contexts chain in registration
/// order.
pub struct ChainedInstrumentation {
    instrumentations: Vec<Arc<dyn Instrumentation>>,
}

impl ChainedInstrumentation {
    /// Chains `instrumentations`.
    pub fn new(instrumentations: Vec<Arc<dyn Instrumentation>>) -> ChainedInstrumentation {
        ChainedInstrumentation { instrumentations }
    }

    fn chain(
        &self,
        make: impl Fn(&dyn Instrumentation) -> Box<dyn InstrumentationContext>,
    ) -> Box<dyn InstrumentationContext> {
        Box::new(ChainedContext {
            contexts: self
                .instrumentations
                .iter()
                .map(|i| make(i.as_ref()))
                .collect(),
        })
    }
}

impl Instrumentation for ChainedInstrumentation {
    fn begin_fetch_object(&self, info: &InstrumentationInfo) -> Box<dyn InstrumentationContext> {
        self.chain(|i| i.begin_fetch_object(info))
    }

    fn begin_complete_object(
        &self,
        info: &InstrumentationInfo,
    ) -> Box<dyn InstrumentationContext> {
        self.chain(|i| i.begin_complete_object(info))
    }

    fn begin_field_execution(
        &self,
        info: &InstrumentationInfo,
    ) -> Box<dyn InstrumentationContext> {
        self.chain(|i| i.begin_field_execution(info))
    }

    fn begin_field_fetching(&self, info: &InstrumentationInfo) -> Box<dyn InstrumentationContext> {
        self.chain(|i| i.begin_field_fetching(info))
    }

    fn begin_field_completion(
        &self,
        info: &InstrumentationInfo,
    ) -> Box<dyn InstrumentationContext> {
        self.chain(|i| i.begin_field_completion(info))
    }

    fn begin_field_list_completion(
        &self,
        info: &InstrumentationInfo,
    ) -> Box<dyn InstrumentationContext> {
        self.chain(|i| i.begin_field_list_completion(info))
    }

    fn instrument_data_fetcher(
        &self,
        fetcher: Arc<dyn FieldResolverDispatcher>,
        info: &InstrumentationInfo,
    ) -> Arc<dyn FieldResolverDispatcher> {
        self.instrumentations
            .iter()
            .fold(fetcher, |f, i| i.instrument_data_fetcher(f, info))
    }

    fn instrument_access_check(
        &self,
        checker: Arc<dyn CheckerDispatcher>,
        info: &InstrumentationInfo,
    ) -> Arc<dyn CheckerDispatcher> {
        self.instrumentations
            .iter()
            .fold(checker, |c, i| i.instrument_access_check(c, info))
    }
}
