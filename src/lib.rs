//! Trellis is a GraphQL execution engine library.
//!
//! Given a validated operation, a [`Schema`], and a
//! [`DispatcherRegistry`] locating the user's resolvers and access
//! checkers, the engine drives the full resolution and response-assembly
//! pipeline:
//!
//! - operations compile into cached, shareable [`QueryPlan`]s that merge
//!   selections and pre-compute each field's data dependencies;
//! - resolvers and access checks run concurrently under a request-scoped
//!   supervisor, with at-most-once dispatch per field position and every
//!   declared dependency resolved before its owner runs;
//! - results accumulate in per-object stores
//!   ([`ObjectEngineResult`](executor::object_result::ObjectEngineResult))
//!   that double as the synchronization fabric between resolution and
//!   completion;
//! - completion walks those stores into the response tree, applying the
//!   GraphQL nullability and error-propagation rules, and always
//!   attempting partial results.
//!
//! The crate's boundary is code-level: parsing, validation, and transport
//! belong to the caller.
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use trellis::{ExecutionRequest, ExecutionStrategy, StaticRegistry, Schema};
//! # async fn example(schema: Arc<Schema>, document: Arc<trellis::ast::OwnedDocument>) {
//! let registry = Arc::new(StaticRegistry::new());
//! let strategy = ExecutionStrategy::new(schema, registry);
//! let result = strategy
//!     .execute(ExecutionRequest {
//!         document,
//!         document_text: "{ hello }".into(),
//!         document_key: None,
//!         operation_name: None,
//!         variables: Default::default(),
//!         context: Arc::new(()),
//!         locale: None,
//!     })
//!     .await;
//! assert!(result.errors.is_empty());
//! # }
//! ```

pub mod ast;
pub mod error;
pub mod eventual;
pub mod executor;
pub mod plan;
pub mod registry;
pub mod schema;
pub mod value;

pub use crate::{
    ast::{Document, InputValue, OperationType, OwnedDocument, Selection, Variables},
    error::{EngineError, FieldError, FieldResult, GraphQLError, Location, PathSegment},
    eventual::{Completer, Eventual, EventualResult},
    executor::{
        EngineOptions, ExecutionParameters, ExecutionResult,
        instrumentation::{Instrumentation, InstrumentationContext, InstrumentationInfo},
        object_result::{EngineData, ObjectEngineResult},
        strategy::{ExecutionRequest, ExecutionStrategy},
        supervisor::RequestSupervisor,
    },
    plan::{QueryPlan, QueryPlanCache, QueryPlanCacheKey},
    registry::{
        CheckerDispatcher, CheckerEnvironment, CheckerRequirement, CheckerResult, CheckerRole,
        Coordinate, DataFetcherResult, DispatcherRegistry, FieldResolverDispatcher, GraphQLContext,
        LazyObjectData, NodeResolverDispatcher, RequiredSelectionSet, ResolvedValue,
        ResolverEnvironment, ResolverMetadata, StaticRegistry, TypeResolver, TypenameTypeResolver,
        VariableResolver, VariableResolverEnvironment,
    },
    schema::{Schema, SchemaBuilder},
    value::{Object, ScalarValue, Value},
};
