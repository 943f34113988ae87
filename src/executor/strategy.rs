//! The execution entry point.
//!
//! [`ExecutionStrategy`] owns the long-lived pieces (schema, registry,
//! plan cache, instrumentation) and executes one request at a time under a
//! fresh [`RequestSupervisor`]: plan, launch resolution, drive completion,
//! assemble the result, tear down.

use std::sync::Arc;

use arcstr::ArcStr;
use tracing::{debug, instrument};

use crate::{
    ast::{OperationType, OwnedDocument, Variables},
    error::{EngineError, GraphQLError},
    plan::{
        PlanError, PlanOptions, QueryPlan, QueryPlanCache, QueryPlanCacheKey, build_operation_plan,
    },
    registry::{DispatcherRegistry, GraphQLContext, ResolvedValue, TypeResolver,
        TypenameTypeResolver},
    schema::Schema,
    value::Value,
};

use super::{
    Constants, EngineOptions, ErrorAccumulator, ExecutionParameters, ExecutionResult,
    ExtensionsAccumulator,
    completer::{self, CompletionError},
    instrumentation::{Instrumentation, NoopInstrumentation},
    object_result::ObjectEngineResult,
    resolver,
    supervisor::RequestSupervisor,
    variables::coerce_request_variables,
};

/// One operation execution request.
pub struct ExecutionRequest {
    /// The validated document, owned so plans can outlive the request.
    pub document: Arc<OwnedDocument>,
    /// Full source text of the document, for plan-cache keying.
    pub document_text: Arc<str>,
    /// Caller-supplied cache discriminator.
    pub document_key: Option<ArcStr>,
    /// Name of the operation to execute, when the document has several.
    pub operation_name: Option<String>,
    /// Request-supplied variable values, already coerced.
    pub variables: Variables,
    /// Opaque request context handed to dispatchers.
    pub context: GraphQLContext,
    /// Request locale.
    pub locale: Option<ArcStr>,
}

/// Drives operations against one schema and registry.
pub struct ExecutionStrategy {
    schema: Arc<Schema>,
    registry: Arc<dyn DispatcherRegistry>,
    plan_cache: QueryPlanCache,
    instrumentation: Arc<dyn Instrumentation>,
    type_resolver: Arc<dyn TypeResolver>,
    options: EngineOptions,
}

impl ExecutionStrategy {
    /// A strategy with default options, no instrumentation and
    /// `__typename`-based abstract-type resolution.
    pub fn new(schema: Arc<Schema>, registry: Arc<dyn DispatcherRegistry>) -> ExecutionStrategy {
        ExecutionStrategy::with_options(schema, registry, EngineOptions::default())
    }

    /// A strategy with explicit options.
    pub fn with_options(
        schema: Arc<Schema>,
        registry: Arc<dyn DispatcherRegistry>,
        options: EngineOptions,
    ) -> ExecutionStrategy {
        ExecutionStrategy {
            schema,
            registry,
            plan_cache: QueryPlanCache::new(options.plan_cache_capacity),
            instrumentation: Arc::new(NoopInstrumentation),
            type_resolver: Arc::new(TypenameTypeResolver),
            options,
        }
    }

    /// Installs an instrumentation.
    #[must_use]
    pub fn with_instrumentation(
        mut self,
        instrumentation: Arc<dyn Instrumentation>,
    ) -> ExecutionStrategy {
        self.instrumentation = instrumentation;
        self
    }

    /// Installs an abstract-type resolver.
    #[must_use]
    pub fn with_type_resolver(mut self, type_resolver: Arc<dyn TypeResolver>) -> ExecutionStrategy {
        self.type_resolver = type_resolver;
        self
    }

    /// The executing schema.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Drops every cached plan; call when hot-swapping the schema.
    pub fn invalidate_plan_cache(&self) {
        self.plan_cache.invalidate_all();
    }

    /// Number of plans currently cached.
    pub fn cached_plan_count(&self) -> usize {
        self.plan_cache.len()
    }

    /// Executes one operation to a final result.
    ///
    /// Never returns an `Err`: failures surface in the result's `errors`
    /// with `data: null`. On return the request's task tree has been
    /// cancelled and joined, success or failure.
    #[instrument(skip_all, fields(operation = ?request.operation_name))]
    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        let plan = match self.plan(&request).await {
            Ok(plan) => plan,
            Err(e) => return fatal_result(e),
        };

        let variables = Arc::new(coerce_request_variables(&plan, request.variables));
        let supervisor = Arc::new(RequestSupervisor::new());
        let root_oer = ObjectEngineResult::new(plan.parent_type.clone());
        let query_oer = if plan.operation_type == OperationType::Query {
            root_oer.clone()
        } else {
            ObjectEngineResult::new(self.schema.query_type_name().clone())
        };

        let constants = Arc::new(Constants {
            schema: self.schema.clone(),
            registry: self.registry.clone(),
            context: request.context.clone(),
            locale: request.locale.clone(),
            supervisor: supervisor.clone(),
            errors: ErrorAccumulator::new(),
            extensions: ExtensionsAccumulator::default(),
            collect_cache: crate::plan::CollectCache::new(),
            instrumentation: self.instrumentation.clone(),
            type_resolver: self.type_resolver.clone(),
            options: self.options.clone(),
            operation_type: plan.operation_type,
            root_oer: root_oer.clone(),
            query_oer,
        });

        let params = ExecutionParameters::for_plan(
            constants.clone(),
            &plan,
            variables,
            root_oer,
            ResolvedValue::Null,
            true,
            true,
        );

        // Resolution runs on the request scope; completion runs here and
        // synchronizes on the result stores.
        let resolution = match plan.operation_type {
            OperationType::Mutation => resolver::fetch_object_serially(params.clone()),
            OperationType::Query | OperationType::Subscription => {
                resolver::fetch_object(params.clone())
            }
        };
        supervisor.spawn(async move { resolution.resolve().await });

        let data = match completer::complete_object(&params).await {
            Ok(value) => value,
            Err(CompletionError::NonNull) => Value::Null,
            Err(CompletionError::Fatal(e)) => {
                debug!(error = %e, "operation failed fatally");
                constants.errors.push_engine_error(&e, &[], None);
                Value::Null
            }
        };

        supervisor.cancel_and_join().await;

        ExecutionResult {
            data,
            errors: constants.errors.clone().into_sorted(),
            extensions: constants.extensions.clone().into_value(),
        }
    }

    /// Resolves the request's plan, through the process-wide cache unless
    /// disabled. Builds run off the request's hot path and are shared by
    /// concurrent requests for the same key.
    async fn plan(&self, request: &ExecutionRequest) -> Result<Arc<QueryPlan>, EngineError> {
        let plan_options = PlanOptions {
            execute_access_checks_in_engine: self.options.execute_access_checks_in_engine,
        };

        if self.options.disable_query_plan_cache {
            return build_operation_plan(
                &request.document,
                request.operation_name.as_deref(),
                &self.schema,
                self.registry.as_ref(),
                plan_options,
            )
            .map_err(EngineError::from);
        }

        let key = QueryPlanCacheKey {
            document_text: request.document_text.clone(),
            document_key: request.document_key.clone(),
            schema_identity: self.schema.identity(),
            execute_access_checks: plan_options.execute_access_checks_in_engine,
        };
        let document = request.document.clone();
        let operation_name = request.operation_name.clone();
        let schema = self.schema.clone();
        let registry = self.registry.clone();
        let build = self.plan_cache.get_or_insert_with(key, move || async move {
            let built = tokio::task::spawn_blocking(move || {
                build_operation_plan(
                    &document,
                    operation_name.as_deref(),
                    &schema,
                    registry.as_ref(),
                    plan_options,
                )
            })
            .await;
            match built {
                Ok(result) => result,
                Err(join) => Err(PlanError::Interrupted {
                    message: join.to_string(),
                }),
            }
        });
        build.await.map_err(EngineError::from)
    }
}

fn fatal_result(e: EngineError) -> ExecutionResult {
    ExecutionResult {
        data: Value::Null,
        errors: vec![GraphQLError::from_engine_error(&e, &[], None)],
        extensions: None,
    }
}
